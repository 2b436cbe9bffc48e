use serde::{Deserialize, Serialize};

use crate::dao::models::{LeagueDocument, TeamEntity};

/// League document keyed by its name in the collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoLeagueDocument {
    /// Document id, the league key.
    #[serde(rename = "_id")]
    pub id: String,
    /// Persisted teams.
    pub teams: Vec<TeamEntity>,
}

impl MongoLeagueDocument {
    /// Attach the league key to a document.
    pub fn new(id: impl Into<String>, league: LeagueDocument) -> Self {
        Self {
            id: id.into(),
            teams: league.teams,
        }
    }
}

impl From<MongoLeagueDocument> for LeagueDocument {
    fn from(value: MongoLeagueDocument) -> Self {
        Self { teams: value.teams }
    }
}
