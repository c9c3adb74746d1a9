//! Decimal helpers and the residue allocator.
//!
//! Every exact-sum guarantee in the engine goes through this module: values are
//! truncated with [`trunc2`], then [`balance_to_target`] hands out the missing
//! cents (or units) one at a time until the total matches.

use crate::errors::{Error, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::cmp::Reverse;

/// One hundredth, the increment used when balancing percentages and money.
pub const CENT: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Truncates to two decimals, towards negative infinity: `floor(x * 100) / 100`.
#[must_use]
pub fn trunc2(x: Decimal) -> Decimal {
    x.round_dp_with_strategy(2, RoundingStrategy::ToNegativeInfinity)
}

/// `part / whole * 100`, or zero when `whole` is zero.
#[must_use]
pub fn percent_of(part: Decimal, whole: Decimal) -> Decimal {
    (part * Decimal::ONE_HUNDRED)
        .checked_div(whole)
        .unwrap_or(Decimal::ZERO)
}

/// `value * percent / 100`.
#[must_use]
pub fn apply_percent(value: Decimal, percent: Decimal) -> Decimal {
    value * percent / Decimal::ONE_HUNDRED
}

/// Sums an iterator of decimals.
#[must_use]
pub fn sum<I>(values: I) -> Decimal
where
    I: IntoIterator<Item = Decimal>,
{
    values.into_iter().fold(Decimal::ZERO, |acc, v| acc + v)
}

/// A recipient of residue increments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allotment<K> {
    /// Identifies the recipient (usually an agency id)
    pub key: K,
    /// Current value (truncated base plus any increments received)
    pub value: Decimal,
    /// How many increments this recipient has received so far
    pub adjustments: i64,
}

impl<K> Allotment<K> {
    /// Creates a recipient with no adjustments yet.
    pub const fn new(key: K, value: Decimal) -> Self {
        Self {
            key,
            value,
            adjustments: 0,
        }
    }
}

/// Hands out `steps` increments of `unit` over `allotments`.
///
/// `allotments` must be ordered by descending priority. Each step goes to the
/// recipient with the fewest adjustments; ties go to the earlier (higher priority)
/// recipient. A negative `steps` takes `unit` away instead, picking the fewest
/// adjustments first and the later (lower priority) recipient on ties.
pub fn distribute_residue<K>(allotments: &mut [Allotment<K>], steps: i64, unit: Decimal) {
    if allotments.is_empty() {
        return;
    }

    for _ in 0..steps.unsigned_abs() {
        let chosen = if steps > 0 {
            allotments
                .iter()
                .enumerate()
                .min_by_key(|(_, a)| a.adjustments)
                .map(|(i, _)| i)
        } else {
            allotments
                .iter()
                .enumerate()
                .min_by_key(|(i, a)| (a.adjustments, Reverse(*i)))
                .map(|(i, _)| i)
        };

        if let Some(i) = chosen {
            let allotment = &mut allotments[i];
            allotment.adjustments += 1;
            if steps > 0 {
                allotment.value += unit;
            } else {
                allotment.value -= unit;
            }
        }
    }
}

/// Balances `allotments` so that their values sum to exactly `target`.
///
/// # Errors
/// Returns [`Error::SumInvariant`] when the gap is not a whole number of `unit`
/// or when the sum is still off afterwards.
pub fn balance_to_target<K>(
    allotments: &mut [Allotment<K>],
    target: Decimal,
    unit: Decimal,
    what: &str,
) -> Result<()> {
    let current = sum(allotments.iter().map(|a| a.value));
    let gap = target - current;

    if gap.is_zero() {
        return Ok(());
    }

    let steps = gap
        .checked_div(unit)
        .filter(|s| s.fract().is_zero())
        .and_then(|s| s.to_i64())
        .ok_or_else(|| Error::SumInvariant {
            what: what.to_string(),
            expected: target,
            actual: current,
        })?;

    if allotments.is_empty() {
        return Err(Error::SumInvariant {
            what: what.to_string(),
            expected: target,
            actual: current,
        });
    }

    distribute_residue(allotments, steps, unit);
    ensure_sum(allotments.iter().map(|a| a.value), target, what)
}

/// Checks that `values` sum to exactly `expected`.
///
/// # Errors
/// Returns [`Error::SumInvariant`] on any difference.
pub fn ensure_sum<I>(values: I, expected: Decimal, what: &str) -> Result<()>
where
    I: IntoIterator<Item = Decimal>,
{
    let actual = sum(values);
    if actual == expected {
        Ok(())
    } else {
        Err(Error::SumInvariant {
            what: what.to_string(),
            expected,
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::dec;

    #[test]
    fn test_trunc2_never_rounds_up() {
        assert_eq!(trunc2(dec("14.285714")), dec("14.28"));
        assert_eq!(trunc2(dec("0.999")), dec("0.99"));
        assert_eq!(trunc2(dec("60")), dec("60"));
        assert_eq!(trunc2(dec("-0.001")), dec("-0.01"));

        for raw in ["0", "0.005", "1.239", "99.999999", "123456.789", "33.3333"] {
            let x = dec(raw);
            assert!(trunc2(x) <= x, "trunc2({x}) > {x}");
            assert!(x - trunc2(x) < CENT);
        }
    }

    #[test]
    fn test_percent_helpers() {
        assert_eq!(percent_of(dec("600"), dec("1000")), dec("60"));
        assert_eq!(percent_of(dec("1"), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(apply_percent(dec("1000"), dec("14.29")), dec("142.9"));
    }

    #[test]
    fn test_residue_goes_to_fewest_adjustments_then_priority() {
        let mut allotments: Vec<_> = (1..=7).map(|k| Allotment::new(k, dec("14.28"))).collect();

        balance_to_target(&mut allotments, Decimal::ONE_HUNDRED, CENT, "percent").unwrap();

        let bumped: Vec<i32> = allotments
            .iter()
            .filter(|a| a.value == dec("14.29"))
            .map(|a| a.key)
            .collect();
        assert_eq!(bumped, vec![1, 2, 3, 4]);
        assert_eq!(sum(allotments.iter().map(|a| a.value)), Decimal::ONE_HUNDRED);
    }

    #[test]
    fn test_residue_wraps_around_keeping_spread_at_most_one() {
        let mut allotments: Vec<_> = (0..3).map(|k| Allotment::new(k, Decimal::ZERO)).collect();

        distribute_residue(&mut allotments, 7, Decimal::ONE);

        let counters: Vec<i64> = allotments.iter().map(|a| a.adjustments).collect();
        assert_eq!(counters, vec![3, 2, 2]);
        let max = counters.iter().max().unwrap();
        let min = counters.iter().min().unwrap();
        assert!(max - min <= 1);
    }

    #[test]
    fn test_negative_residue_takes_from_lowest_priority() {
        let mut allotments = vec![
            Allotment::new("a", dec("50.01")),
            Allotment::new("b", dec("30.01")),
            Allotment::new("c", dec("20.00")),
        ];

        balance_to_target(&mut allotments, Decimal::ONE_HUNDRED, CENT, "percent").unwrap();

        assert_eq!(allotments[0].value, dec("50.01"));
        assert_eq!(allotments[1].value, dec("30.00"));
        assert_eq!(allotments[2].value, dec("19.99"));
    }

    #[test]
    fn test_fractional_gap_is_sum_invariant() {
        let mut allotments = vec![Allotment::new(1, dec("99.995"))];
        let err = balance_to_target(&mut allotments, Decimal::ONE_HUNDRED, CENT, "percent")
            .unwrap_err();
        assert!(matches!(err, Error::SumInvariant { .. }));
    }

    #[test]
    fn test_ensure_sum() {
        assert!(ensure_sum([dec("60"), dec("40")], Decimal::ONE_HUNDRED, "percent").is_ok());
        assert!(ensure_sum([dec("60"), dec("39.99")], Decimal::ONE_HUNDRED, "percent").is_err());
    }
}
