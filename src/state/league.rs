//! In-memory league state. A [`League`] is an immutable revision: every
//! mutation hands back a fresh value and leaves the receiver untouched, so a
//! snapshot that is being rendered or persisted is never edited underneath.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::cost::{CostPolicy, CostSide, Money};

/// Number of holes on the course.
pub const HOLE_COUNT: usize = 18;
/// Number of teams taking part in the league.
pub const ROSTER_SIZE: usize = 12;
/// Longest raw stroke entry accepted from the score inputs.
const MAX_STROKE_INPUT_LEN: usize = 3;

/// Direction of a stroke adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Strokes were added to the target team.
    Add,
    /// Strokes were removed from the acting team itself.
    Remove,
}

/// A purchased adjustment, recorded in the acting team's log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Whether strokes were added or removed.
    pub kind: TransactionKind,
    /// Magnitude of the change, always positive.
    pub amount: u32,
    /// Name of the team whose adjustments changed.
    pub to: String,
    /// Price paid, fixed when the transaction was created.
    pub cost: Money,
}

impl Transaction {
    /// Signed stroke delta applied to the target team.
    pub fn signed_amount(&self) -> i64 {
        match self.kind {
            TransactionKind::Add => i64::from(self.amount),
            TransactionKind::Remove => -i64::from(self.amount),
        }
    }
}

/// Scorecard and purchase history of one team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    /// Display name, unique within the league.
    pub name: String,
    /// Strokes per hole; `0` means the hole has not been played yet.
    pub strokes: [u32; HOLE_COUNT],
    /// Net strokes added to (or removed from) this team by transactions.
    pub adjustments: i64,
    /// Transactions bought by this team, oldest first.
    pub transactions: Vec<Transaction>,
}

impl Team {
    /// Fresh team with an empty scorecard.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strokes: [0; HOLE_COUNT],
            adjustments: 0,
            transactions: Vec::new(),
        }
    }
}

/// Why an adjustment request was dropped without touching the league.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustmentRejection {
    /// A team may only remove strokes from itself.
    OpponentRemoval,
    /// Nothing to adjust.
    ZeroAmount,
}

/// Result of [`League::record_adjustment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdjustmentOutcome {
    /// The transaction was recorded.
    Applied {
        /// League revision including the new transaction.
        league: League,
        /// Transaction appended to the acting team's log.
        transaction: Transaction,
    },
    /// The request was a no-op.
    Rejected(AdjustmentRejection),
}

/// Errors raised while building or mutating a league.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeagueError {
    /// Team index outside the roster.
    #[error("unknown team index {index} (roster has {size} teams)")]
    UnknownTeam {
        /// Requested index.
        index: usize,
        /// Teams in the roster.
        size: usize,
    },
    /// Hole index outside the course.
    #[error("unknown hole index {index} (course has {count} holes)", count = HOLE_COUNT)]
    UnknownHole {
        /// Requested index.
        index: usize,
    },
    /// Roster does not have the expected number of teams.
    #[error("roster must contain {expected} teams, got {actual}")]
    RosterSize {
        /// Required number of teams.
        expected: usize,
        /// Teams supplied.
        actual: usize,
    },
    /// Two teams share a name.
    #[error("duplicate team name `{0}`")]
    DuplicateTeam(String),
    /// A persisted scorecard does not cover every hole.
    #[error("team `{team}` has {actual} stroke entries, expected {count}", count = HOLE_COUNT)]
    HoleCount {
        /// Team name.
        team: String,
        /// Stroke entries found.
        actual: usize,
    },
    /// The adjustment would push a team's total out of range.
    #[error("adjustments of team `{team}` would overflow")]
    AdjustmentOverflow {
        /// Team name.
        team: String,
    },
}

/// The complete state of every team at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct League {
    teams: Vec<Team>,
}

impl League {
    /// Create a brand-new league with the given team names.
    pub fn with_roster<I, S>(names: I) -> Result<Self, LeagueError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_teams(names.into_iter().map(Team::new).collect())
    }

    /// Wrap existing teams after checking the roster size and name uniqueness.
    pub fn from_teams(teams: Vec<Team>) -> Result<Self, LeagueError> {
        if teams.len() != ROSTER_SIZE {
            return Err(LeagueError::RosterSize {
                expected: ROSTER_SIZE,
                actual: teams.len(),
            });
        }

        let mut seen = HashSet::new();
        for team in &teams {
            if !seen.insert(team.name.as_str()) {
                return Err(LeagueError::DuplicateTeam(team.name.clone()));
            }
        }

        Ok(Self { teams })
    }

    /// Teams in roster order.
    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    /// Consume the league and return its teams.
    pub fn into_teams(self) -> Vec<Team> {
        self.teams
    }

    /// Borrow a team by roster index.
    pub fn team(&self, index: usize) -> Result<&Team, LeagueError> {
        self.teams.get(index).ok_or(LeagueError::UnknownTeam {
            index,
            size: self.teams.len(),
        })
    }

    /// Record the strokes played by `team` on `hole`. No transaction is created.
    pub fn record_score(&self, team: usize, hole: usize, value: u32) -> Result<League, LeagueError> {
        self.team(team)?;
        if hole >= HOLE_COUNT {
            return Err(LeagueError::UnknownHole { index: hole });
        }

        let mut next = self.clone();
        next.teams[team].strokes[hole] = value;
        Ok(next)
    }

    /// Price `acting` would pay right now for an adjustment on `target`.
    pub fn quote(
        &self,
        target: usize,
        acting: usize,
        policy: &CostPolicy,
    ) -> Result<Money, LeagueError> {
        self.team(target)?;
        let acting_team = self.team(acting)?;
        Ok(policy.quote(
            acting_team.transactions.len(),
            CostSide::for_teams(target, acting),
        ))
    }

    /// Buy an adjustment of `amount` strokes on `target` on behalf of `acting`.
    ///
    /// Negative amounts are only allowed on the acting team itself; other
    /// requests with a negative amount, or a zero amount, leave the league
    /// unchanged.
    pub fn record_adjustment(
        &self,
        target: usize,
        amount: i32,
        acting: usize,
        policy: &CostPolicy,
    ) -> Result<AdjustmentOutcome, LeagueError> {
        let cost = self.quote(target, acting, policy)?;

        if amount == 0 {
            return Ok(AdjustmentOutcome::Rejected(AdjustmentRejection::ZeroAmount));
        }
        if amount < 0 && target != acting {
            return Ok(AdjustmentOutcome::Rejected(
                AdjustmentRejection::OpponentRemoval,
            ));
        }

        let adjustments = self.teams[target]
            .adjustments
            .checked_add(i64::from(amount))
            .ok_or_else(|| LeagueError::AdjustmentOverflow {
                team: self.teams[target].name.clone(),
            })?;

        let mut next = self.clone();
        let transaction = Transaction {
            kind: if amount > 0 {
                TransactionKind::Add
            } else {
                TransactionKind::Remove
            },
            amount: amount.unsigned_abs(),
            to: next.teams[target].name.clone(),
            cost,
        };

        next.teams[acting].transactions.push(transaction.clone());
        next.teams[target].adjustments = adjustments;

        Ok(AdjustmentOutcome::Applied {
            league: next,
            transaction,
        })
    }
}

/// Turn a raw score entry into a stroke count.
///
/// Only one to three ASCII digits are accepted; anything else counts as `0`.
pub fn coerce_stroke_input(raw: &str) -> u32 {
    if raw.is_empty()
        || raw.len() > MAX_STROKE_INPUT_LEN
        || !raw.bytes().all(|b| b.is_ascii_digit())
    {
        return 0;
    }
    raw.parse().unwrap_or(0)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn roster() -> Vec<String> {
        (1..=ROSTER_SIZE).map(|n| format!("Team {n}")).collect()
    }

    pub(crate) fn league() -> League {
        League::with_roster(roster()).unwrap()
    }

    fn applied(outcome: AdjustmentOutcome) -> (League, Transaction) {
        match outcome {
            AdjustmentOutcome::Applied {
                league,
                transaction,
            } => (league, transaction),
            other => panic!("expected applied adjustment, got {other:?}"),
        }
    }

    fn adjustments_from_logs(league: &League, target: &str) -> i64 {
        league
            .teams()
            .iter()
            .flat_map(|team| team.transactions.iter())
            .filter(|tx| tx.to == target)
            .map(Transaction::signed_amount)
            .sum()
    }

    #[test]
    fn new_league_starts_blank() {
        let league = league();
        assert_eq!(league.teams().len(), ROSTER_SIZE);
        for team in league.teams() {
            assert_eq!(team.strokes, [0; HOLE_COUNT]);
            assert_eq!(team.adjustments, 0);
            assert!(team.transactions.is_empty());
        }
    }

    #[test]
    fn roster_must_have_twelve_unique_names() {
        assert_eq!(
            League::with_roster(["a", "b"]).unwrap_err(),
            LeagueError::RosterSize {
                expected: ROSTER_SIZE,
                actual: 2
            }
        );

        let mut names = roster();
        names[11] = names[0].clone();
        assert_eq!(
            League::with_roster(names).unwrap_err(),
            LeagueError::DuplicateTeam("Team 1".into())
        );
    }

    #[test]
    fn record_score_returns_new_revision() {
        let before = league();
        let after = before.record_score(3, 17, 5).unwrap();

        assert_eq!(after.team(3).unwrap().strokes[17], 5);
        assert_eq!(before.team(3).unwrap().strokes[17], 0);
        assert!(after.team(3).unwrap().transactions.is_empty());
    }

    #[test]
    fn record_score_rejects_out_of_range_indexes() {
        let league = league();
        assert_eq!(
            league.record_score(12, 0, 4).unwrap_err(),
            LeagueError::UnknownTeam {
                index: 12,
                size: ROSTER_SIZE
            }
        );
        assert_eq!(
            league.record_score(0, 18, 4).unwrap_err(),
            LeagueError::UnknownHole { index: 18 }
        );
    }

    #[test]
    fn removing_an_opponent_stroke_is_a_no_op() {
        let league = league();
        for (target, acting) in [(0, 1), (5, 2), (11, 0)] {
            let outcome = league
                .record_adjustment(target, -1, acting, &CostPolicy::STEEP)
                .unwrap();
            assert_eq!(
                outcome,
                AdjustmentOutcome::Rejected(AdjustmentRejection::OpponentRemoval)
            );
        }
    }

    #[test]
    fn zero_amount_is_a_no_op() {
        let outcome = league()
            .record_adjustment(0, 0, 0, &CostPolicy::STEEP)
            .unwrap();
        assert_eq!(
            outcome,
            AdjustmentOutcome::Rejected(AdjustmentRejection::ZeroAmount)
        );
    }

    #[test]
    fn adjustment_overflow_is_an_error() {
        let mut teams = league().into_teams();
        teams[0].adjustments = i64::MAX;
        let league = League::from_teams(teams).unwrap();

        assert_eq!(
            league
                .record_adjustment(0, 1, 1, &CostPolicy::STEEP)
                .unwrap_err(),
            LeagueError::AdjustmentOverflow {
                team: "Team 1".into()
            }
        );
        let (league, _) = applied(
            league
                .record_adjustment(0, -1, 0, &CostPolicy::STEEP)
                .unwrap(),
        );
        assert_eq!(league.team(0).unwrap().adjustments, i64::MAX - 1);
    }

    #[test]
    fn self_removal_costs_five_then_eight_seventy_five() {
        let policy = CostPolicy::STEEP;
        let start = league();
        assert_eq!(start.quote(2, 2, &policy).unwrap(), Money::from_cents(500));

        let (league, tx) = applied(start.record_adjustment(2, -1, 2, &policy).unwrap());
        assert_eq!(tx.kind, TransactionKind::Remove);
        assert_eq!(tx.amount, 1);
        assert_eq!(tx.to, "Team 3");
        assert_eq!(tx.cost, Money::from_cents(500));
        assert_eq!(league.team(2).unwrap().adjustments, -1);

        assert_eq!(league.quote(2, 2, &policy).unwrap(), Money::from_cents(875));
    }

    #[test]
    fn transaction_lands_in_acting_log_and_changes_target() {
        let (league, tx) = applied(
            league()
                .record_adjustment(4, 2, 1, &CostPolicy::STEEP)
                .unwrap(),
        );

        assert_eq!(league.team(1).unwrap().transactions, vec![tx.clone()]);
        assert!(league.team(4).unwrap().transactions.is_empty());
        assert_eq!(league.team(4).unwrap().adjustments, 2);
        assert_eq!(league.team(1).unwrap().adjustments, 0);
        assert_eq!(tx.kind, TransactionKind::Add);
    }

    #[test]
    fn cost_keys_off_acting_team_history_only() {
        let policy = CostPolicy::TAPERED;
        let (league, _) = applied(league().record_adjustment(0, 1, 1, &policy).unwrap());
        let (league, _) = applied(league.record_adjustment(0, 1, 1, &policy).unwrap());

        // Team 0 has been targeted twice but bought nothing itself.
        assert_eq!(league.quote(1, 0, &policy).unwrap(), Money::from_cents(500));
        assert_eq!(league.quote(0, 1, &policy).unwrap(), Money::from_cents(781));
        assert_eq!(league.quote(1, 1, &policy).unwrap(), Money::from_cents(1125));
    }

    #[test]
    fn quoted_cost_matches_stored_cost() {
        let policy = CostPolicy::STEEP;
        let mut league = league();
        let moves = [(3, 1, 0), (0, -1, 0), (7, 1, 0), (0, 1, 5), (5, -1, 5)];
        for (target, amount, acting) in moves {
            let quoted = league.quote(target, acting, &policy).unwrap();
            let (next, tx) = applied(
                league
                    .record_adjustment(target, amount, acting, &policy)
                    .unwrap(),
            );
            assert_eq!(tx.cost, quoted);
            league = next;
        }
    }

    #[test]
    fn adjustments_always_match_transaction_logs() {
        let policy = CostPolicy::STEEP;
        let mut league = league();
        let moves = [
            (3, 1, 0),
            (3, 1, 1),
            (3, -1, 3),
            (0, 2, 3),
            (0, -1, 3),
            (3, -2, 3),
            (9, 1, 9),
        ];
        for (target, amount, acting) in moves {
            if let AdjustmentOutcome::Applied { league: next, .. } = league
                .record_adjustment(target, amount, acting, &policy)
                .unwrap()
            {
                league = next;
            }
        }

        for team in league.teams() {
            assert_eq!(team.adjustments, adjustments_from_logs(&league, &team.name));
        }
    }

    #[test]
    fn stroke_input_coercion() {
        assert_eq!(coerce_stroke_input("4"), 4);
        assert_eq!(coerce_stroke_input("04"), 4);
        assert_eq!(coerce_stroke_input("123"), 123);
        assert_eq!(coerce_stroke_input(""), 0);
        assert_eq!(coerce_stroke_input("1234"), 0);
        assert_eq!(coerce_stroke_input("-3"), 0);
        assert_eq!(coerce_stroke_input("4a"), 0);
        assert_eq!(coerce_stroke_input(" 4"), 0);
    }
}
