//! Pricing of stroke adjustments. Every purchase gets more expensive for the
//! acting team, whatever team it targets.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Price of the very first adjustment bought by a team, in cents.
const BASE_COST_CENTS: f64 = 500.0;

/// Monetary amount held as whole cents so sums stay exact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(u64);

impl Money {
    /// Zero dollars.
    pub const ZERO: Money = Money(0);

    /// Build an amount from a number of cents.
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Convert a decimal dollar amount, rounding half-up to the nearest cent.
    ///
    /// Negative and non-finite inputs collapse to zero.
    pub fn from_dollars(dollars: f64) -> Self {
        round_to_cents(dollars * 100.0)
    }

    /// Number of cents.
    pub const fn cents(self) -> u64 {
        self.0
    }

    /// Dollar value as a float, for JSON payloads and persisted documents.
    pub fn as_dollars(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Add two amounts, saturating instead of wrapping.
    pub fn saturating_add(self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, Money::saturating_add)
    }
}

impl Serialize for Money {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_dollars())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let dollars = f64::deserialize(deserializer)?;
        Ok(Money::from_dollars(dollars))
    }
}

/// Which growth curve applies to an adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostSide {
    /// The acting team targets itself (the only way to remove strokes).
    OwnTeam,
    /// The acting team adds strokes to another team.
    Opponent,
}

impl CostSide {
    /// Pick the side from the target and acting team indexes.
    pub fn for_teams(target: usize, acting: usize) -> Self {
        if target == acting {
            CostSide::OwnTeam
        } else {
            CostSide::Opponent
        }
    }
}

/// Named cost curves that can be selected in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostPolicyKind {
    /// Both sides grow by 1.75 per prior purchase.
    #[default]
    Steep,
    /// Own-team adjustments grow by 1.5, opponent adjustments by 1.25.
    Tapered,
}

/// Geometric cost curve keyed off the acting team's transaction count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostPolicy {
    own_growth: f64,
    opponent_growth: f64,
}

impl CostPolicy {
    /// 1.75 for both sides.
    pub const STEEP: CostPolicy = CostPolicy {
        own_growth: 1.75,
        opponent_growth: 1.75,
    };

    /// 1.5 for own-team adjustments, 1.25 for opponents.
    pub const TAPERED: CostPolicy = CostPolicy {
        own_growth: 1.5,
        opponent_growth: 1.25,
    };

    /// Growth factor applied for the given side.
    pub fn growth(&self, side: CostSide) -> f64 {
        match side {
            CostSide::OwnTeam => self.own_growth,
            CostSide::Opponent => self.opponent_growth,
        }
    }

    /// Price of the next adjustment for a team that already owns
    /// `transaction_count` transactions.
    ///
    /// The same inputs always give the same price, so a quote shown before a
    /// purchase matches the cost stored on the resulting transaction.
    pub fn quote(&self, transaction_count: usize, side: CostSide) -> Money {
        let exponent = i32::try_from(transaction_count).unwrap_or(i32::MAX);
        round_to_cents(BASE_COST_CENTS * self.growth(side).powi(exponent))
    }
}

impl Default for CostPolicy {
    fn default() -> Self {
        CostPolicyKind::default().into()
    }
}

impl From<CostPolicyKind> for CostPolicy {
    fn from(kind: CostPolicyKind) -> Self {
        match kind {
            CostPolicyKind::Steep => CostPolicy::STEEP,
            CostPolicyKind::Tapered => CostPolicy::TAPERED,
        }
    }
}

// Half-up rounding; `as` saturates on overflow and maps NaN to zero.
fn round_to_cents(cents: f64) -> Money {
    if cents == f64::INFINITY {
        return Money(u64::MAX);
    }
    Money((cents + 0.5).floor().max(0.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_purchase_costs_five_dollars() {
        assert_eq!(CostPolicy::STEEP.quote(0, CostSide::OwnTeam), Money::from_cents(500));
        assert_eq!(CostPolicy::TAPERED.quote(0, CostSide::Opponent), Money::from_cents(500));
    }

    #[test]
    fn steep_policy_grows_by_one_point_seven_five() {
        let policy = CostPolicy::STEEP;
        assert_eq!(policy.quote(1, CostSide::OwnTeam), Money::from_cents(875));
        assert_eq!(policy.quote(2, CostSide::Opponent), Money::from_cents(1531));
        assert_eq!(policy.quote(3, CostSide::Opponent), Money::from_cents(2680));
    }

    #[test]
    fn tapered_policy_uses_distinct_growth_per_side() {
        let policy = CostPolicy::TAPERED;
        assert_eq!(policy.quote(1, CostSide::OwnTeam), Money::from_cents(750));
        assert_eq!(policy.quote(1, CostSide::Opponent), Money::from_cents(625));
        assert_eq!(policy.quote(2, CostSide::Opponent), Money::from_cents(781));
    }

    #[test]
    fn huge_counts_saturate() {
        assert_eq!(
            CostPolicy::STEEP.quote(10_000, CostSide::OwnTeam),
            Money::from_cents(u64::MAX)
        );
    }

    #[test]
    fn money_display_and_dollar_conversion() {
        assert_eq!(Money::from_cents(875).to_string(), "8.75");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_dollars(15.31), Money::from_cents(1531));
        assert_eq!(Money::from_dollars(-3.0), Money::ZERO);
    }

    #[test]
    fn side_follows_target_and_acting_team() {
        assert_eq!(CostSide::for_teams(2, 2), CostSide::OwnTeam);
        assert_eq!(CostSide::for_teams(1, 2), CostSide::Opponent);
    }
}
