use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, PickFirst, serde_as};

use crate::state::{
    cost::Money,
    league::{HOLE_COUNT, League, LeagueError, Team, Transaction, TransactionKind},
};

/// Shared league document as stored by every backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeagueDocument {
    /// Teams in roster order.
    pub teams: Vec<TeamEntity>,
}

/// Persisted scorecard of one team.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamEntity {
    /// Team name, used as the identity of the team.
    pub name: String,
    /// Strokes per hole. Older documents stored them as strings.
    #[serde_as(as = "Vec<PickFirst<(_, DisplayFromStr)>>")]
    pub strokes: Vec<u32>,
    /// Net strokes added by transactions.
    #[serde(default)]
    pub adjustments: i64,
    /// Transactions bought by the team.
    #[serde(default)]
    pub transactions: Vec<TransactionEntity>,
}

/// Persisted transaction record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionEntity {
    /// `add` or `remove`.
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Positive number of strokes.
    pub amount: u32,
    /// Name of the target team.
    pub to: String,
    /// Price in dollars; absent in some older documents.
    #[serde(default)]
    pub cost: Money,
}

impl From<Transaction> for TransactionEntity {
    fn from(value: Transaction) -> Self {
        Self {
            kind: value.kind,
            amount: value.amount,
            to: value.to,
            cost: value.cost,
        }
    }
}

impl From<TransactionEntity> for Transaction {
    fn from(value: TransactionEntity) -> Self {
        Self {
            kind: value.kind,
            amount: value.amount,
            to: value.to,
            cost: value.cost,
        }
    }
}

impl From<Team> for TeamEntity {
    fn from(value: Team) -> Self {
        Self {
            name: value.name,
            strokes: value.strokes.to_vec(),
            adjustments: value.adjustments,
            transactions: value.transactions.into_iter().map(Into::into).collect(),
        }
    }
}

impl TryFrom<TeamEntity> for Team {
    type Error = LeagueError;

    fn try_from(value: TeamEntity) -> Result<Self, Self::Error> {
        let actual = value.strokes.len();
        let strokes = <[u32; HOLE_COUNT]>::try_from(value.strokes).map_err(|_| {
            LeagueError::HoleCount {
                team: value.name.clone(),
                actual,
            }
        })?;

        Ok(Self {
            name: value.name,
            strokes,
            adjustments: value.adjustments,
            transactions: value.transactions.into_iter().map(Into::into).collect(),
        })
    }
}

impl From<&League> for LeagueDocument {
    fn from(value: &League) -> Self {
        Self {
            teams: value.teams().iter().cloned().map(Into::into).collect(),
        }
    }
}

impl TryFrom<LeagueDocument> for League {
    type Error = LeagueError;

    fn try_from(value: LeagueDocument) -> Result<Self, Self::Error> {
        let teams = value
            .teams
            .into_iter()
            .map(Team::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        League::from_teams(teams)
    }
}
