//! Goal projector.
//!
//! For each month touched by a period the monthly meta is the SISCOR value
//! pro-rated by the period's share of the month's business days. The stretch
//! factor is applied to that meta, and the stretched amount is split over the
//! agencies by the share snapshot in effect.
//!
//! A projection is dated with the latest snapshot of the period. When that
//! snapshot follows one or more mid-period exits:
//!
//! - months ending before the first exit are copied from the previous
//!   projection unchanged;
//! - in an exit month, the leaving agency keeps its pre-exit value scaled by
//!   the business days it was active, the others add up one truncated term per
//!   share segment;
//! - later months use the post-exit shares, and agencies that left get zero.
//!
//! Every month is balanced so the agency values sum to the stretched meta.

use crate::{
    config::settings::GoalSettings,
    core::{
        budget,
        calendar::{self, BusinessCalendar},
        money::{Allotment, CENT, apply_percent, balance_to_target, ensure_sum, sum, trunc2},
        redistribution::snapshot_history,
        roster,
    },
    entities::{
        AgencyMonthlyGoal, MonthlyGoal, PeriodGoal, PeriodModel, ShareSnapshotModel,
        agency_monthly_goal, monthly_goal, period_goal,
    },
    errors::{Error, Result},
};
use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    DatabaseConnection, QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;
use tracing::{debug, info, instrument};

/// Bonus target rate over arrecadacao.
pub const BONUS_RATE: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

/// Goal of one agency in one month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgencyGoal {
    /// Agency business code
    pub agency_id: i32,
    /// Collection target
    pub arrecadacao: Decimal,
    /// Bonus target
    pub bonificacao: Decimal,
}

/// Projection of one month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthProjection {
    /// `YYYY-MM`
    pub competence: String,
    /// SISCOR budget of the month
    pub siscor: Decimal,
    /// Business days of the full month
    pub business_days: u32,
    /// Business days inside the period window
    pub period_business_days: u32,
    /// Stretch factor applied
    pub stretch: Decimal,
    /// Stretched meta the agency goals sum to
    pub target: Decimal,
    /// Whether the month was copied from the previous projection
    pub copied: bool,
    /// One goal per agency that ever held a share in the period, by agency id
    pub agencies: Vec<AgencyGoal>,
}

/// A full projection of a period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalProjection {
    /// Edital
    pub edital_id: i32,
    /// Period
    pub period_id: i32,
    /// Reference date (the latest snapshot)
    pub dt_ref: NaiveDate,
    /// Months in order
    pub months: Vec<MonthProjection>,
}

impl GoalProjection {
    /// Projection of one competence.
    #[must_use]
    pub fn month(&self, competence: &str) -> Option<&MonthProjection> {
        self.months.iter().find(|m| m.competence == competence)
    }
}

impl MonthProjection {
    /// Arrecadacao of one agency, zero when absent.
    #[must_use]
    pub fn arrecadacao(&self, agency_id: i32) -> Decimal {
        self.agencies
            .iter()
            .find(|a| a.agency_id == agency_id)
            .map_or(Decimal::ZERO, |a| a.arrecadacao)
    }
}

/// Calendar and budget figures of one month of a period.
#[derive(Debug, Clone)]
struct MonthFrame {
    year: i32,
    month: u32,
    last: NaiveDate,
    business_days: u32,
    period_business_days: u32,
    siscor: Decimal,
    meta_period: Decimal,
}

impl MonthFrame {
    fn competence(&self) -> String {
        calendar::competence(self.year, self.month)
    }
}

fn ratio(value: Decimal, part: u32, whole: u32) -> Decimal {
    if whole == 0 {
        return Decimal::ZERO;
    }
    value * Decimal::from(part) / Decimal::from(whole)
}

async fn month_frames<C>(db: &C, period: &PeriodModel) -> Result<(BusinessCalendar, Vec<MonthFrame>)>
where
    C: ConnectionTrait,
{
    let business = BusinessCalendar::load(db, period.dt_begin, period.dt_end).await?;
    let mut frames = Vec::new();

    for (year, month) in calendar::months_between(period.dt_begin, period.dt_end) {
        let (first, last) = calendar::month_bounds(year, month)?;
        let business_days = business.business_days(year, month)?;
        let period_business_days =
            business.business_days_in(first.max(period.dt_begin), last.min(period.dt_end))?;
        let siscor = budget::monthly_siscor_or_zero(db, year, month).await?;

        frames.push(MonthFrame {
            year,
            month,
            last,
            business_days,
            period_business_days,
            siscor,
            meta_period: trunc2(ratio(siscor, period_business_days, business_days)),
        });
    }
    Ok((business, frames))
}

/// Writes a period goal row at `dt_ref` with the given stretch factor,
/// replacing any live row at the same date.
///
/// The SISCOR total and business days cover the part of each month that falls
/// inside the period window; missing budget months count as zero.
///
/// # Errors
/// [`Error::CalendarMiss`] when a month of the period has no calendar rows;
/// [`Error::Database`] on storage failures.
pub async fn record_period_goal<C>(
    db: &C,
    edital_id: i32,
    period_id: i32,
    dt_ref: NaiveDate,
    stretch: Decimal,
) -> Result<period_goal::Model>
where
    C: ConnectionTrait,
{
    let period = roster::load_period(db, edital_id, period_id).await?;
    let (_, frames) = month_frames(db, &period).await?;

    let siscor_total = sum(frames.iter().map(|f| f.meta_period));
    let business_days: u32 = frames.iter().map(|f| f.period_business_days).sum();
    let distributable_value = trunc2(siscor_total * stretch);
    let per_business_day = if business_days == 0 {
        Decimal::ZERO
    } else {
        trunc2(distributable_value / Decimal::from(business_days))
    };

    let now = Utc::now().naive_utc();
    PeriodGoal::update_many()
        .col_expr(period_goal::Column::DeletedAt, Expr::value(now))
        .filter(period_goal::Column::EditalId.eq(edital_id))
        .filter(period_goal::Column::PeriodId.eq(period_id))
        .filter(period_goal::Column::DtRef.eq(dt_ref))
        .filter(period_goal::Column::DeletedAt.is_null())
        .exec(db)
        .await?;

    let goal = period_goal::ActiveModel {
        dt_ref: Set(dt_ref),
        edital_id: Set(edital_id),
        period_id: Set(period_id),
        siscor_total: Set(siscor_total),
        business_days: Set(i32::try_from(business_days).unwrap_or(i32::MAX)),
        stretch_factor: Set(stretch),
        distributable_value: Set(distributable_value),
        per_business_day: Set(per_business_day),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(%dt_ref, %stretch, %distributable_value, "period goal recorded");
    Ok(goal)
}

/// Month and agency goals of the latest projection dated before `before`.
struct PriorProjection {
    months: HashMap<String, monthly_goal::Model>,
    agencies: HashMap<(String, i32), Decimal>,
}

async fn prior_projection<C>(
    db: &C,
    edital_id: i32,
    period_id: i32,
    before: NaiveDate,
) -> Result<Option<PriorProjection>>
where
    C: ConnectionTrait,
{
    let Some(latest) = MonthlyGoal::find()
        .filter(monthly_goal::Column::EditalId.eq(edital_id))
        .filter(monthly_goal::Column::PeriodId.eq(period_id))
        .filter(monthly_goal::Column::DtRef.lt(before))
        .filter(monthly_goal::Column::DeletedAt.is_null())
        .order_by_desc(monthly_goal::Column::DtRef)
        .one(db)
        .await?
    else {
        return Ok(None);
    };

    let months = MonthlyGoal::find()
        .filter(monthly_goal::Column::EditalId.eq(edital_id))
        .filter(monthly_goal::Column::PeriodId.eq(period_id))
        .filter(monthly_goal::Column::DtRef.eq(latest.dt_ref))
        .filter(monthly_goal::Column::DeletedAt.is_null())
        .all(db)
        .await?
        .into_iter()
        .map(|m| (m.competence.clone(), m))
        .collect();
    let agencies = AgencyMonthlyGoal::find()
        .filter(agency_monthly_goal::Column::EditalId.eq(edital_id))
        .filter(agency_monthly_goal::Column::PeriodId.eq(period_id))
        .filter(agency_monthly_goal::Column::DtRef.eq(latest.dt_ref))
        .filter(agency_monthly_goal::Column::DeletedAt.is_null())
        .all(db)
        .await?
        .into_iter()
        .map(|g| ((g.competence, g.agency_id), g.arrecadacao))
        .collect();

    debug!(dt_ref = %latest.dt_ref, "previous projection loaded");
    Ok(Some(PriorProjection { months, agencies }))
}

/// Snapshot lookups over the history of a period.
struct Shares<'a> {
    baseline: &'a [ShareSnapshotModel],
    history: &'a BTreeMap<NaiveDate, Vec<ShareSnapshotModel>>,
}

impl<'a> Shares<'a> {
    /// Snapshot in effect on `date`.
    fn on(&self, date: NaiveDate) -> &'a [ShareSnapshotModel] {
        self.history
            .range(..=date)
            .next_back()
            .map_or(self.baseline, |(_, rows)| rows.as_slice())
    }

    /// Snapshot in effect the day before `date`.
    fn before(&self, date: NaiveDate) -> &'a [ShareSnapshotModel] {
        self.history
            .range(..date)
            .next_back()
            .map_or(self.baseline, |(_, rows)| rows.as_slice())
    }
}

fn percent_in(snapshot: &[ShareSnapshotModel], agency_id: i32) -> Option<Decimal> {
    snapshot
        .iter()
        .find(|s| s.agency_id == agency_id)
        .map(|s| s.percent)
}

/// Snapshot rows ordered by percent descending, then agency id.
fn by_share(snapshot: &[ShareSnapshotModel]) -> Vec<(i32, Decimal)> {
    let mut lines: Vec<(i32, Decimal)> = snapshot.iter().map(|s| (s.agency_id, s.percent)).collect();
    lines.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    lines
}

/// Splits `target` by `snapshot`.
fn split_by_share(target: Decimal, snapshot: &[ShareSnapshotModel]) -> Result<BTreeMap<i32, Decimal>> {
    let mut allotments: Vec<Allotment<i32>> = by_share(snapshot)
        .into_iter()
        .map(|(agency, percent)| Allotment::new(agency, trunc2(apply_percent(target, percent))))
        .collect();
    balance_to_target(&mut allotments, target, CENT, "monthly arrecadacao")?;
    Ok(allotments.into_iter().map(|a| (a.key, a.value)).collect())
}

/// Splits `target` over a month in which agencies left on `events`.
///
/// A leaving agency keeps its pre-exit value scaled by the business days it
/// served, up to and including its exit day. Every other agency gets one
/// truncated term per share segment of the month. The cents lost to those
/// truncations are then handed out to the agencies still active at month end,
/// by share descending then id, so a continuing agency may sit a few cents
/// above its literal segment sum while the leaving agency never does.
fn split_event_month(
    frame: &MonthFrame,
    target: Decimal,
    events: &[NaiveDate],
    shares: &Shares<'_>,
    business: &BusinessCalendar,
    prior: Option<&PriorProjection>,
) -> Result<BTreeMap<i32, Decimal>> {
    let competence = frame.competence();
    let total = frame.business_days;
    let mut values = BTreeMap::new();

    // Agencies leaving this month keep their pre-exit value for the days served
    for event in events {
        let before = shares.before(*event);
        let after = shares.on(*event);
        let active = business.business_days_until(frame.year, frame.month, *event)?;
        for row in before.iter().filter(|r| percent_in(after, r.agency_id).is_none()) {
            let pre_exit = prior
                .and_then(|p| p.agencies.get(&(competence.clone(), row.agency_id)))
                .copied()
                .unwrap_or_else(|| trunc2(apply_percent(target, row.percent)));
            values.insert(row.agency_id, trunc2(ratio(pre_exit, active, total)));
        }
    }

    // One segment per snapshot in effect during the month
    let mut segments: Vec<(&[ShareSnapshotModel], u32)> = Vec::with_capacity(events.len() + 1);
    let mut start: Option<NaiveDate> = None;
    for event in events {
        let days = match start {
            None => business.business_days_until(frame.year, frame.month, *event)?,
            Some(s) => business.business_days_in(s, *event)?,
        };
        segments.push((shares.before(*event), days));
        start = event.succ_opt();
    }
    let tail = match start {
        Some(s) => business.business_days_in(s, frame.last)?,
        None => total,
    };
    segments.push((shares.on(frame.last), tail));

    let month_end = shares.on(frame.last);
    let mut allotments: Vec<Allotment<i32>> = by_share(month_end)
        .into_iter()
        .map(|(agency, _)| {
            let value = sum(segments.iter().map(|(snapshot, days)| {
                percent_in(snapshot, agency).map_or(Decimal::ZERO, |percent| {
                    trunc2(ratio(apply_percent(target, percent), *days, total))
                })
            }));
            Allotment::new(agency, value)
        })
        .collect();

    let leaving = sum(values.values().copied());
    balance_to_target(&mut allotments, target - leaving, CENT, "event month arrecadacao")?;
    values.extend(allotments.into_iter().map(|a| (a.key, a.value)));
    Ok(values)
}

fn agency_goals(agencies: &BTreeSet<i32>, values: &BTreeMap<i32, Decimal>) -> Vec<AgencyGoal> {
    agencies
        .iter()
        .map(|agency_id| {
            let arrecadacao = values.get(agency_id).copied().unwrap_or_default();
            AgencyGoal {
                agency_id: *agency_id,
                arrecadacao,
                bonificacao: trunc2(arrecadacao * BONUS_RATE),
            }
        })
        .collect()
}

async fn persist(
    db: &DatabaseConnection,
    projection: &GoalProjection,
    record_stretch: Option<Decimal>,
) -> Result<()> {
    let txn = db.begin().await?;
    let now = Utc::now().naive_utc();
    let (edital_id, period_id, dt_ref) =
        (projection.edital_id, projection.period_id, projection.dt_ref);

    MonthlyGoal::update_many()
        .col_expr(monthly_goal::Column::DeletedAt, Expr::value(now))
        .filter(monthly_goal::Column::EditalId.eq(edital_id))
        .filter(monthly_goal::Column::PeriodId.eq(period_id))
        .filter(monthly_goal::Column::DtRef.eq(dt_ref))
        .filter(monthly_goal::Column::DeletedAt.is_null())
        .exec(&txn)
        .await?;
    AgencyMonthlyGoal::update_many()
        .col_expr(agency_monthly_goal::Column::DeletedAt, Expr::value(now))
        .filter(agency_monthly_goal::Column::EditalId.eq(edital_id))
        .filter(agency_monthly_goal::Column::PeriodId.eq(period_id))
        .filter(agency_monthly_goal::Column::DtRef.eq(dt_ref))
        .filter(agency_monthly_goal::Column::DeletedAt.is_null())
        .exec(&txn)
        .await?;

    for month in &projection.months {
        monthly_goal::ActiveModel {
            dt_ref: Set(dt_ref),
            edital_id: Set(edital_id),
            period_id: Set(period_id),
            competence: Set(month.competence.clone()),
            siscor_value: Set(month.siscor),
            business_days: Set(i32::try_from(month.business_days).unwrap_or(i32::MAX)),
            period_business_days: Set(i32::try_from(month.period_business_days).unwrap_or(i32::MAX)),
            stretched_value: Set(month.target),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        if month.agencies.is_empty() {
            continue;
        }
        let rows = month.agencies.iter().map(|g| agency_monthly_goal::ActiveModel {
            dt_ref: Set(dt_ref),
            edital_id: Set(edital_id),
            period_id: Set(period_id),
            agency_id: Set(g.agency_id),
            competence: Set(month.competence.clone()),
            arrecadacao: Set(g.arrecadacao),
            bonificacao: Set(g.bonificacao),
            actuation: Set(None),
            liquidation: Set(None),
            created_at: Set(now),
            ..Default::default()
        });
        AgencyMonthlyGoal::insert_many(rows).exec(&txn).await?;
    }

    if let Some(stretch) = record_stretch {
        record_period_goal(&txn, edital_id, period_id, dt_ref, stretch).await?;
    }
    txn.commit().await?;
    Ok(())
}

/// Projects and stores the monthly goals of `(edital, period)`.
///
/// `stretch` overrides the stretch factor of every month and is recorded as a
/// new period goal; without it each month uses the period goal in effect at
/// its last day, or `settings.default_stretch`.
///
/// # Errors
/// [`Error::SnapshotMissing`] when the period was never distributed;
/// [`Error::CalendarMiss`] when a month of the period has no calendar rows;
/// [`Error::SumInvariant`] if a month cannot be balanced to its meta.
#[instrument(skip(db, settings))]
pub async fn project_goals(
    db: &DatabaseConnection,
    edital_id: i32,
    period_id: i32,
    stretch: Option<Decimal>,
    settings: &GoalSettings,
) -> Result<GoalProjection> {
    let period = roster::load_period(db, edital_id, period_id).await?;
    let history = snapshot_history(db, edital_id, period_id).await?;
    let (Some((&baseline_date, baseline)), Some(&dt_ref)) =
        (history.iter().next(), history.keys().next_back())
    else {
        return Err(Error::SnapshotMissing {
            edital_id,
            period_id,
            before: period.dt_end.succ_opt().unwrap_or(period.dt_end),
        });
    };

    let shares = Shares { baseline, history: &history };
    let events: Vec<NaiveDate> = history.keys().filter(|d| **d > baseline_date).copied().collect();
    let agencies: BTreeSet<i32> = history.values().flatten().map(|s| s.agency_id).collect();
    let prior = prior_projection(db, edital_id, period_id, dt_ref).await?;
    let (business, frames) = month_frames(db, &period).await?;

    let mut months = Vec::with_capacity(frames.len());
    for frame in &frames {
        let competence = frame.competence();
        let month_stretch = match stretch {
            Some(s) => s,
            None => {
                budget::stretch_factor(db, edital_id, period_id, frame.last, settings.default_stretch)
                    .await?
            }
        };

        let copied = events
            .first()
            .filter(|first| frame.last < **first)
            .and_then(|_| prior.as_ref())
            .and_then(|p| p.months.get(&competence).map(|m| (p, m)));
        if let Some((p, previous)) = copied {
            let values: BTreeMap<i32, Decimal> = agencies
                .iter()
                .filter_map(|a| p.agencies.get(&(competence.clone(), *a)).map(|v| (*a, *v)))
                .collect();
            months.push(MonthProjection {
                competence,
                siscor: previous.siscor_value,
                business_days: u32::try_from(previous.business_days).unwrap_or_default(),
                period_business_days: u32::try_from(previous.period_business_days)
                    .unwrap_or_default(),
                stretch: month_stretch,
                target: previous.stretched_value,
                copied: true,
                agencies: agency_goals(&agencies, &values),
            });
            continue;
        }

        let target = trunc2(frame.meta_period * month_stretch);
        let in_month: Vec<NaiveDate> = events
            .iter()
            .filter(|e| e.year() == frame.year && e.month() == frame.month)
            .copied()
            .collect();
        let values = if in_month.is_empty() {
            split_by_share(target, shares.on(frame.last))?
        } else {
            split_event_month(frame, target, &in_month, &shares, &business, prior.as_ref())?
        };
        ensure_sum(values.values().copied(), target, "monthly arrecadacao")?;

        months.push(MonthProjection {
            competence,
            siscor: frame.siscor,
            business_days: frame.business_days,
            period_business_days: frame.period_business_days,
            stretch: month_stretch,
            target,
            copied: false,
            agencies: agency_goals(&agencies, &values),
        });
    }

    let projection = GoalProjection {
        edital_id,
        period_id,
        dt_ref,
        months,
    };

    let record_stretch = match stretch {
        Some(s) => Some(s),
        None if budget::latest_period_goal(db, edital_id, period_id).await?.is_none() => {
            Some(settings.default_stretch)
        }
        None => None,
    };
    persist(db, &projection, record_stretch).await?;

    info!(%dt_ref, months = projection.months.len(), "goals projected");
    Ok(projection)
}

/// Human-readable summary of a projection.
#[must_use]
pub fn format_goal_projection(projection: &GoalProjection) -> String {
    let mut out = format!(
        "Goals edital {} period {} at {}\n",
        projection.edital_id, projection.period_id, projection.dt_ref
    );
    for m in &projection.months {
        let _ = writeln!(
            out,
            "  {} siscor {:>18} days {:>2}/{:>2} x{} = {:>18}{}",
            m.competence,
            m.siscor,
            m.period_business_days,
            m.business_days,
            m.stretch,
            m.target,
            if m.copied { " (kept)" } else { "" }
        );
        for a in &m.agencies {
            let _ = writeln!(
                out,
                "    agency {:>6} arrecadacao {:>18} bonificacao {:>16}",
                a.agency_id, a.arrecadacao, a.bonificacao
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::entities::{EditalModel, PeriodModel};
    use crate::test_utils::*;

    /// January to July 2025, 1,000,000.00 per month, Carnival on 03-03 and 03-04.
    async fn seed_period(db: &DatabaseConnection) -> Result<(EditalModel, PeriodModel)> {
        let (edital, period) = create_edital_period(db, "2025-01-01", "2025-07-31").await?;
        let holidays = [date("2025-03-03"), date("2025-03-04")];
        calendar::seed_calendar(db, date("2025-01-01"), date("2025-07-31"), &holidays).await?;
        for month in 1..=7 {
            add_budget(db, 202_500 + month, 1, "1000000.00").await?;
        }
        for (agency, percent) in [(1, "40"), (2, "30"), (3, "20"), (4, "10")] {
            add_snapshot(db, &edital, &period, "2025-01-15", agency, "0", percent).await?;
        }
        Ok((edital, period))
    }

    #[tokio::test]
    async fn test_plain_projection() -> Result<()> {
        let db = setup_test_db().await?;
        let (edital, period) = seed_period(&db).await?;

        let projection =
            project_goals(&db, edital.id, period.id, None, &GoalSettings::default()).await?;

        assert_eq!(projection.months.len(), 7);
        let march = projection.month("2025-03").unwrap();
        assert_eq!(march.business_days, 19);
        assert_eq!(march.target, dec("1000000.00"));
        assert_eq!(march.arrecadacao(1), dec("400000.00"));
        assert_eq!(march.agencies[3].bonificacao, dec("5000.00"));

        let goal = budget::latest_period_goal(&db, edital.id, period.id).await?.unwrap();
        assert_eq!(goal.stretch_factor, Decimal::ONE);
        assert_eq!(goal.siscor_total, dec("7000000.00"));
        Ok(())
    }

    #[tokio::test]
    async fn test_stretch_applies_after_meta() -> Result<()> {
        let db = setup_test_db().await?;
        let (edital, period) = seed_period(&db).await?;
        add_budget(&db, 202_502, 2, "333333.33").await?;

        let projection =
            project_goals(&db, edital.id, period.id, Some(dec("1.10")), &GoalSettings::default())
                .await?;

        let feb = projection.month("2025-02").unwrap();
        assert_eq!(feb.siscor, dec("333333.33"));
        assert_eq!(feb.target, dec("366666.66"));
        assert_eq!(sum(feb.agencies.iter().map(|a| a.arrecadacao)), dec("366666.66"));

        let goal = budget::latest_period_goal(&db, edital.id, period.id).await?.unwrap();
        assert_eq!(goal.stretch_factor, dec("1.10"));
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_window_and_missing_budget() -> Result<()> {
        let db = setup_test_db().await?;
        let (edital, period) = create_edital_period(&db, "2025-03-27", "2025-04-30").await?;
        calendar::seed_calendar(&db, date("2025-03-01"), date("2025-04-30"), &[
            date("2025-03-03"),
            date("2025-03-04"),
        ])
        .await?;
        add_budget(&db, 202_503, 1, "1900.00").await?;
        add_snapshot(&db, &edital, &period, "2025-03-27", 1, "0", "100").await?;

        let projection =
            project_goals(&db, edital.id, period.id, None, &GoalSettings::default()).await?;

        let march = projection.month("2025-03").unwrap();
        assert_eq!(march.period_business_days, 3);
        assert_eq!(march.target, dec("300.00"));
        let april = projection.month("2025-04").unwrap();
        assert_eq!(april.target, Decimal::ZERO);
        Ok(())
    }

    #[tokio::test]
    async fn test_mid_period_exit_pro_rates_event_month() -> Result<()> {
        let db = setup_test_db().await?;
        let (edital, period) = seed_period(&db).await?;
        let before = project_goals(&db, edital.id, period.id, None, &GoalSettings::default()).await?;
        assert_eq!(before.month("2025-03").unwrap().arrecadacao(4), dec("100000.00"));

        for (agency, percent) in [(1, "43.34"), (2, "33.33"), (3, "23.33")] {
            add_snapshot(&db, &edital, &period, "2025-03-26", agency, "0", percent).await?;
        }
        let after = project_goals(&db, edital.id, period.id, None, &GoalSettings::default()).await?;
        assert_eq!(after.dt_ref, date("2025-03-26"));

        for competence in ["2025-01", "2025-02"] {
            let month = after.month(competence).unwrap();
            assert!(month.copied);
            assert_eq!(month.agencies, before.month(competence).unwrap().agencies);
        }

        let march = after.month("2025-03").unwrap();
        assert_eq!(march.arrecadacao(4), dec("84210.52"));
        assert_eq!(march.arrecadacao(1), dec("405273.69"));
        assert_eq!(march.arrecadacao(2), dec("305257.89"));
        assert_eq!(march.arrecadacao(3), dec("205257.90"));
        assert_eq!(sum(march.agencies.iter().map(|a| a.arrecadacao)), march.target);

        for competence in ["2025-04", "2025-05", "2025-06", "2025-07"] {
            let month = after.month(competence).unwrap();
            assert_eq!(month.arrecadacao(4), Decimal::ZERO);
            assert_eq!(month.arrecadacao(1), dec("433400.00"));
        }

        let stored = AgencyMonthlyGoal::find()
            .filter(agency_monthly_goal::Column::DtRef.eq(date("2025-03-26")))
            .count(&db)
            .await?;
        assert_eq!(stored, 28);
        Ok(())
    }

    #[tokio::test]
    async fn test_reprojection_replaces_rows() -> Result<()> {
        let db = setup_test_db().await?;
        let (edital, period) = seed_period(&db).await?;
        project_goals(&db, edital.id, period.id, None, &GoalSettings::default()).await?;
        project_goals(&db, edital.id, period.id, None, &GoalSettings::default()).await?;

        let live = MonthlyGoal::find()
            .filter(monthly_goal::Column::DeletedAt.is_null())
            .count(&db)
            .await?;
        assert_eq!(live, 7);
        Ok(())
    }

    #[tokio::test]
    async fn test_requires_snapshot() -> Result<()> {
        let db = setup_test_db().await?;
        let (edital, period) = create_edital_period(&db, "2025-01-01", "2025-07-31").await?;
        assert!(matches!(
            project_goals(&db, edital.id, period.id, None, &GoalSettings::default()).await,
            Err(Error::SnapshotMissing { .. })
        ));
        Ok(())
    }
}
