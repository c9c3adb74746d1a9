//! Share calculator.
//!
//! Turns a roster with condition tags and weights (prior-period revenue, or the
//! percentages of an existing snapshot) into per-agency percentages and contract
//! counts. Three regimes exist, selected by which cohorts are present:
//!
//! - **all-continuing**: shares proportional to weight; the weight of exiting
//!   agencies is spread uniformly over the continuing ones;
//! - **all-new**: equal shares;
//! - **mixed**: the contract count is first split between the continuing and
//!   new cohorts by head count, then each cohort is allocated on its own rule,
//!   and the final percentages are derived from the resulting counts.
//!
//! Whatever the regime, percentages sum to exactly 100.00 and counts to exactly
//! the requested total. Ties are broken by revenue descending, then agency id
//! ascending, so the output is fully deterministic.

use crate::{
    core::money::{Allotment, CENT, balance_to_target, ensure_sum, percent_of, sum, trunc2},
    entities::AgencyCondition,
    errors::{Error, Result},
};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::cmp::Ordering;

/// An agency as seen by the share calculator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    /// Agency business code
    pub agency_id: i32,
    /// Condition in the period
    pub condition: AgencyCondition,
    /// Proportional weight (revenue or prior percentage)
    pub weight: Decimal,
    /// Priority key for residue distribution
    pub revenue: Decimal,
}

/// Which allocation regime produced a [`ShareTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    /// Only continuing agencies receive
    AllContinuing,
    /// Only new agencies receive
    AllNew,
    /// Both continuing and new agencies receive
    Mixed,
}

/// Final share of one receiving agency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareLine {
    /// Agency business code
    pub agency_id: i32,
    /// Condition in the period
    pub condition: AgencyCondition,
    /// Weight the share was computed from
    pub weight: Decimal,
    /// Priority key used for residues
    pub revenue: Decimal,
    /// Final percentage, two decimals
    pub percent: Decimal,
    /// Target number of contracts
    pub count: i64,
    /// Centi-points received while balancing the percentage
    pub percent_adjustments: i64,
    /// Units received while balancing the count
    pub count_adjustments: i64,
}

/// Output of [`compute_shares`], receiving agencies in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareTable {
    /// Regime applied
    pub regime: Regime,
    /// Contract count that was split
    pub total: i64,
    /// One line per receiving agency
    pub lines: Vec<ShareLine>,
}

impl ShareTable {
    /// Line of one agency.
    #[must_use]
    pub fn line(&self, agency_id: i32) -> Option<&ShareLine> {
        self.lines.iter().find(|l| l.agency_id == agency_id)
    }

    /// Sum of the final percentages.
    #[must_use]
    pub fn total_percent(&self) -> Decimal {
        sum(self.lines.iter().map(|l| l.percent))
    }

    /// Sum of the target counts.
    #[must_use]
    pub fn total_count(&self) -> i64 {
        self.lines.iter().map(|l| l.count).sum()
    }
}

fn by_priority(a: &&Standing, b: &&Standing) -> Ordering {
    b.revenue
        .cmp(&a.revenue)
        .then_with(|| a.agency_id.cmp(&b.agency_id))
}

fn to_count(value: Decimal) -> Result<i64> {
    value.to_i64().ok_or_else(|| Error::SumInvariant {
        what: "contract count out of range".to_string(),
        expected: value,
        actual: value,
    })
}

/// Equal percentages over `agencies`, in their given order.
fn uniform_percentages(agencies: &[&Standing]) -> Result<Vec<Allotment<i32>>> {
    let base = trunc2(Decimal::ONE_HUNDRED / Decimal::from(agencies.len()));
    let mut allotments: Vec<_> = agencies
        .iter()
        .map(|s| Allotment::new(s.agency_id, base))
        .collect();
    balance_to_target(&mut allotments, Decimal::ONE_HUNDRED, CENT, "uniform percent")?;
    Ok(allotments)
}

/// Weight-proportional percentages over the continuing cohort, with the share of
/// the exiting cohort spread uniformly over it.
fn continuing_percentages(
    continuing: &[&Standing],
    exiting: &[&Standing],
) -> Result<Vec<Allotment<i32>>> {
    let total_weight = sum(continuing.iter().chain(exiting).map(|s| s.weight));
    if total_weight.is_zero() {
        return uniform_percentages(continuing);
    }

    let exit_share = sum(exiting.iter().map(|s| percent_of(s.weight, total_weight)));
    let redistributed = exit_share / Decimal::from(continuing.len());

    let mut allotments: Vec<_> = continuing
        .iter()
        .map(|s| {
            let raw = percent_of(s.weight, total_weight);
            Allotment::new(s.agency_id, trunc2(raw + redistributed))
        })
        .collect();
    balance_to_target(&mut allotments, Decimal::ONE_HUNDRED, CENT, "continuing percent")?;
    Ok(allotments)
}

/// Splits `total` contracts following already balanced percentages.
fn counts_by_percent(percentages: &[Allotment<i32>], total: i64) -> Result<Vec<Allotment<i32>>> {
    let total = Decimal::from(total);
    let mut allotments: Vec<_> = percentages
        .iter()
        .map(|p| Allotment::new(p.key, (total * p.value / Decimal::ONE_HUNDRED).floor()))
        .collect();
    balance_to_target(&mut allotments, total, Decimal::ONE, "contract count")?;
    Ok(allotments)
}

/// Splits `total` contracts equally over `agencies`.
fn uniform_counts(agencies: &[&Standing], total: i64) -> Result<Vec<Allotment<i32>>> {
    let total = Decimal::from(total);
    let base = (total / Decimal::from(agencies.len())).floor();
    let mut allotments: Vec<_> = agencies
        .iter()
        .map(|s| Allotment::new(s.agency_id, base))
        .collect();
    balance_to_target(&mut allotments, total, Decimal::ONE, "new cohort count")?;
    Ok(allotments)
}

/// Computes per-agency percentages and contract counts for `total` contracts.
///
/// Agencies in a receiving condition get a line; decredentialed agencies only
/// contribute their weight to the redistributed exit share.
///
/// # Errors
/// Returns [`Error::SumInvariant`] if no agency can receive or if a sum cannot be
/// restored by residue balancing.
pub fn compute_shares(standings: &[Standing], total: i64) -> Result<ShareTable> {
    let mut continuing: Vec<&Standing> = standings
        .iter()
        .filter(|s| s.condition == AgencyCondition::Continuing)
        .collect();
    continuing.sort_by(by_priority);

    let mut new: Vec<&Standing> = standings
        .iter()
        .filter(|s| s.condition == AgencyCondition::New)
        .collect();
    new.sort_by_key(|s| s.agency_id);

    let exiting: Vec<&Standing> = standings
        .iter()
        .filter(|s| !s.condition.is_receiving())
        .collect();

    let regime = match (continuing.is_empty(), new.is_empty()) {
        (true, true) => {
            return Err(Error::SumInvariant {
                what: "share table without receiving agencies".to_string(),
                expected: Decimal::ONE_HUNDRED,
                actual: Decimal::ZERO,
            });
        }
        (false, true) => Regime::AllContinuing,
        (true, false) => Regime::AllNew,
        (false, false) => Regime::Mixed,
    };

    let (percentages, counts) = match regime {
        Regime::AllContinuing => {
            let percentages = continuing_percentages(&continuing, &exiting)?;
            let counts = counts_by_percent(&percentages, total)?;
            (percentages, counts)
        }
        Regime::AllNew => {
            let percentages = uniform_percentages(&new)?;
            let counts = counts_by_percent(&percentages, total)?;
            (percentages, counts)
        }
        Regime::Mixed => mixed(&continuing, &new, &exiting, total)?,
    };

    let ordered = continuing.iter().chain(new.iter());
    let lines = ordered
        .zip(percentages.iter().zip(counts.iter()))
        .map(|(standing, (percent, count))| {
            Ok(ShareLine {
                agency_id: standing.agency_id,
                condition: standing.condition,
                weight: standing.weight,
                revenue: standing.revenue,
                percent: percent.value,
                count: to_count(count.value)?,
                percent_adjustments: percent.adjustments,
                count_adjustments: count.adjustments,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let table = ShareTable {
        regime,
        total,
        lines,
    };
    ensure_sum(
        table.lines.iter().map(|l| l.percent),
        Decimal::ONE_HUNDRED,
        "final percent",
    )?;
    ensure_sum(
        table.lines.iter().map(|l| Decimal::from(l.count)),
        Decimal::from(total),
        "final count",
    )?;
    Ok(table)
}

/// Mixed regime. Returned allotments follow the order continuing, then new.
fn mixed(
    continuing: &[&Standing],
    new: &[&Standing],
    exiting: &[&Standing],
    total: i64,
) -> Result<(Vec<Allotment<i32>>, Vec<Allotment<i32>>)> {
    let cont_percentages = continuing_percentages(continuing, exiting)?;

    let cont_heads = i64::try_from(continuing.len()).unwrap_or(i64::MAX);
    let all_heads = i64::try_from(continuing.len() + new.len()).unwrap_or(i64::MAX);
    let cont_total = cont_heads * total / all_heads;
    let new_total = total - cont_total;

    let mut counts = counts_by_percent(&cont_percentages, cont_total)?;
    counts.extend(uniform_counts(new, new_total)?);

    let mut percentages: Vec<Allotment<i32>> = if total > 0 {
        counts
            .iter()
            .map(|c| {
                Allotment::new(
                    c.key,
                    trunc2(percent_of(c.value, Decimal::from(total))),
                )
            })
            .collect()
    } else {
        // No contracts to weigh by: split by cohort head count instead
        let heads = Decimal::from(all_heads);
        let cohort = Decimal::from(cont_heads) / heads;
        cont_percentages
            .iter()
            .map(|p| Allotment::new(p.key, trunc2(p.value * cohort)))
            .chain(
                new.iter()
                    .map(|s| Allotment::new(s.agency_id, trunc2(Decimal::ONE_HUNDRED / heads))),
            )
            .collect()
    };
    balance_to_target(&mut percentages, Decimal::ONE_HUNDRED, CENT, "mixed percent")?;

    Ok((percentages, counts))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::dec;

    fn standing(agency_id: i32, condition: AgencyCondition, weight: &str) -> Standing {
        Standing {
            agency_id,
            condition,
            weight: dec(weight),
            revenue: dec(weight),
        }
    }

    fn spread(values: impl Iterator<Item = i64>) -> i64 {
        let values: Vec<i64> = values.collect();
        values.iter().max().unwrap() - values.iter().min().unwrap()
    }

    #[test]
    fn test_all_continuing_proportional_to_revenue() {
        let roster = [
            standing(1, AgencyCondition::Continuing, "600"),
            standing(2, AgencyCondition::Continuing, "300"),
            standing(3, AgencyCondition::Continuing, "100"),
        ];

        let table = compute_shares(&roster, 1000).unwrap();

        assert_eq!(table.regime, Regime::AllContinuing);
        let percents: Vec<Decimal> = table.lines.iter().map(|l| l.percent).collect();
        assert_eq!(percents, vec![dec("60.00"), dec("30.00"), dec("10.00")]);
        let counts: Vec<i64> = table.lines.iter().map(|l| l.count).collect();
        assert_eq!(counts, vec![600, 300, 100]);
        assert_eq!(table.total_percent(), dec("100.00"));
        assert_eq!(table.total_count(), 1000);
    }

    #[test]
    fn test_all_new_residue_rounds() {
        let roster: Vec<Standing> = (1..=7)
            .map(|id| standing(id, AgencyCondition::New, "0"))
            .collect();

        let table = compute_shares(&roster, 100).unwrap();

        assert_eq!(table.regime, Regime::AllNew);
        let high = table.lines.iter().filter(|l| l.percent == dec("14.29")).count();
        let low = table.lines.iter().filter(|l| l.percent == dec("14.28")).count();
        assert_eq!((high, low), (4, 3));
        assert_eq!(table.total_percent(), dec("100.00"));
        assert_eq!(table.total_count(), 100);
        assert!(spread(table.lines.iter().map(|l| l.percent_adjustments)) <= 1);
        assert!(spread(table.lines.iter().map(|l| l.count_adjustments)) <= 1);
    }

    #[test]
    fn test_mixed_with_exit() {
        // X held 20% of the prior weight: 175 / (400 + 300 + 175)
        let roster = [
            standing(10, AgencyCondition::Continuing, "400"),
            standing(20, AgencyCondition::Continuing, "300"),
            standing(30, AgencyCondition::New, "0"),
            standing(40, AgencyCondition::New, "0"),
            standing(50, AgencyCondition::Decredentialed, "175"),
        ];

        let table = compute_shares(&roster, 200).unwrap();

        assert_eq!(table.regime, Regime::Mixed);
        assert!(table.line(50).is_none());
        let p = table.line(10).unwrap();
        let q = table.line(20).unwrap();
        assert_eq!(p.count + q.count, 100);
        assert_eq!((p.count, q.count), (56, 44));
        assert_eq!(table.line(30).unwrap().count, 50);
        assert_eq!(table.line(40).unwrap().count, 50);
        assert_eq!(p.percent, dec("28.00"));
        assert_eq!(table.line(30).unwrap().percent, dec("25.00"));
        assert_eq!(table.total_count(), 200);
        assert_eq!(table.total_percent(), dec("100.00"));
    }

    #[test]
    fn test_exit_share_is_spread_uniformly() {
        let roster = [
            standing(1, AgencyCondition::Continuing, "40"),
            standing(2, AgencyCondition::Continuing, "30"),
            standing(3, AgencyCondition::Continuing, "20"),
            standing(4, AgencyCondition::DecredentialedMidPeriod, "10"),
        ];

        let table = compute_shares(&roster, 0).unwrap();

        let percents: Vec<Decimal> = table.lines.iter().map(|l| l.percent).collect();
        assert_eq!(percents, vec![dec("43.34"), dec("33.33"), dec("23.33")]);
        assert_eq!(table.total_count(), 0);
    }

    #[test]
    fn test_zero_revenue_falls_back_to_equal_shares() {
        let roster = [
            standing(1, AgencyCondition::Continuing, "0"),
            standing(2, AgencyCondition::Continuing, "0"),
            standing(3, AgencyCondition::Continuing, "0"),
        ];

        let table = compute_shares(&roster, 10).unwrap();

        let percents: Vec<Decimal> = table.lines.iter().map(|l| l.percent).collect();
        assert_eq!(percents, vec![dec("33.34"), dec("33.33"), dec("33.33")]);
        let counts: Vec<i64> = table.lines.iter().map(|l| l.count).collect();
        assert_eq!(counts, vec![4, 3, 3]);
    }

    #[test]
    fn test_mixed_without_contracts_uses_head_count() {
        let roster = [
            standing(1, AgencyCondition::Continuing, "75"),
            standing(2, AgencyCondition::Continuing, "25"),
            standing(3, AgencyCondition::New, "0"),
        ];

        let table = compute_shares(&roster, 0).unwrap();

        assert_eq!(table.line(1).unwrap().percent, dec("50.01"));
        assert_eq!(table.line(2).unwrap().percent, dec("16.66"));
        assert_eq!(table.line(3).unwrap().percent, dec("33.33"));
        assert_eq!(table.total_percent(), dec("100.00"));
    }

    #[test]
    fn test_no_receivers_is_error() {
        let roster = [standing(1, AgencyCondition::Decredentialed, "10")];
        assert!(matches!(
            compute_shares(&roster, 10),
            Err(Error::SumInvariant { .. })
        ));
    }

    #[test]
    fn test_priority_ties_break_on_agency_id() {
        let roster = [
            standing(9, AgencyCondition::Continuing, "100"),
            standing(3, AgencyCondition::Continuing, "100"),
            standing(5, AgencyCondition::Continuing, "100"),
        ];

        let table = compute_shares(&roster, 100).unwrap();

        let order: Vec<i32> = table.lines.iter().map(|l| l.agency_id).collect();
        assert_eq!(order, vec![3, 5, 9]);
        assert_eq!(table.lines[0].percent, dec("33.34"));
        assert_eq!(table.lines[0].count, 34);
    }
}
