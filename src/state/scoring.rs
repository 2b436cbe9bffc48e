//! Score aggregation: totals, par-relative scores, leaderboard and pot.

use serde::{Deserialize, Serialize};

use crate::state::{
    cost::Money,
    league::{HOLE_COUNT, League, Team},
};

/// Par of each hole, front nine then back nine.
const DEFAULT_PARS: [u32; HOLE_COUNT] = [4, 5, 4, 3, 4, 5, 4, 3, 4, 4, 5, 3, 4, 4, 4, 5, 3, 4];

/// Expected stroke count for every hole of the course.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParTable([u32; HOLE_COUNT]);

impl ParTable {
    /// Build a table from explicit per-hole pars.
    pub const fn new(pars: [u32; HOLE_COUNT]) -> Self {
        Self(pars)
    }

    /// Par of the hole at `index` (0-based).
    pub fn par(&self, index: usize) -> Option<u32> {
        self.0.get(index).copied()
    }

    /// All pars in hole order.
    pub fn pars(&self) -> &[u32; HOLE_COUNT] {
        &self.0
    }
}

impl Default for ParTable {
    fn default() -> Self {
        Self(DEFAULT_PARS)
    }
}

impl TryFrom<Vec<u32>> for ParTable {
    type Error = Vec<u32>;

    fn try_from(value: Vec<u32>) -> Result<Self, Self::Error> {
        <[u32; HOLE_COUNT]>::try_from(value).map(Self)
    }
}

/// Metric used to order the leaderboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardMetric {
    /// Score relative to par over the holes played so far.
    #[default]
    ParRelative,
    /// Raw strokes including adjustments.
    TotalStrokes,
}

/// One line of the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    /// 1-based position on the board.
    pub rank: usize,
    /// Roster index of the team.
    pub index: usize,
    /// Team name.
    pub name: String,
    /// Strokes including adjustments.
    pub total_strokes: i64,
    /// Score relative to par over the holes played.
    pub relative_to_par: i64,
}

/// Sum of all strokes plus adjustments.
pub fn total_strokes(team: &Team) -> i64 {
    team.strokes
        .iter()
        .map(|&s| i64::from(s))
        .sum::<i64>()
        .saturating_add(team.adjustments)
}

/// Strokes over (positive) or under (negative) par, counting only holes with
/// a recorded score. Adjustments always count.
pub fn relative_to_par(team: &Team, pars: &ParTable) -> i64 {
    let (strokes, par) = team
        .strokes
        .iter()
        .zip(pars.pars())
        .filter(|(strokes, _)| **strokes > 0)
        .fold((0i64, 0i64), |(strokes, par), (s, p)| {
            (strokes + i64::from(*s), par + i64::from(*p))
        });

    strokes.saturating_add(team.adjustments).saturating_sub(par)
}

/// Golf notation: `+3`, `E` for even, `-2`.
pub fn format_relative(score: i64) -> String {
    match score {
        0 => "E".to_string(),
        s if s > 0 => format!("+{s}"),
        s => s.to_string(),
    }
}

/// Signed adjustment display: `+2`, `0`, `-1`.
pub fn format_adjustment(adjustments: i64) -> String {
    if adjustments > 0 {
        format!("+{adjustments}")
    } else {
        adjustments.to_string()
    }
}

/// Teams sorted ascending by `metric`. Ties keep roster order.
pub fn leaderboard(
    league: &League,
    metric: LeaderboardMetric,
    pars: &ParTable,
) -> Vec<LeaderboardEntry> {
    let mut entries = league
        .teams()
        .iter()
        .enumerate()
        .map(|(index, team)| LeaderboardEntry {
            rank: 0,
            index,
            name: team.name.clone(),
            total_strokes: total_strokes(team),
            relative_to_par: relative_to_par(team, pars),
        })
        .collect::<Vec<_>>();

    // `sort_by_key` is stable.
    entries.sort_by_key(|entry| match metric {
        LeaderboardMetric::ParRelative => entry.relative_to_par,
        LeaderboardMetric::TotalStrokes => entry.total_strokes,
    });

    for (position, entry) in entries.iter_mut().enumerate() {
        entry.rank = position + 1;
    }
    entries
}

/// Money collected from every transaction of every team.
pub fn pot(league: &League) -> Money {
    league
        .teams()
        .iter()
        .flat_map(|team| team.transactions.iter())
        .map(|tx| tx.cost)
        .sum()
}
