//! SISCOR budget figures and period goal metadata.

use crate::{
    entities::{Budget, PeriodGoal, budget, period_goal},
    errors::{Error, Result},
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, Select, prelude::*};
use tracing::warn;

/// `YYYYMM` key used by the budget table.
#[must_use]
pub fn year_month_key(year: i32, month: u32) -> i32 {
    year * 100 + i32::try_from(month).unwrap_or_default()
}

/// SISCOR value for a month, taken from the highest budget phase recorded for it.
///
/// # Errors
/// Returns [`Error::BudgetMiss`] when the month has no budget rows.
pub async fn monthly_siscor<C>(db: &C, year: i32, month: u32) -> Result<Decimal>
where
    C: ConnectionTrait,
{
    let rows = Budget::find()
        .filter(budget::Column::YearMonth.eq(year_month_key(year, month)))
        .filter(budget::Column::DeletedAt.is_null())
        .all(db)
        .await?;

    let latest_phase = rows
        .iter()
        .map(|r| r.phase)
        .max()
        .ok_or(Error::BudgetMiss { year, month })?;

    Ok(rows
        .iter()
        .filter(|r| r.phase == latest_phase)
        .fold(Decimal::ZERO, |acc, r| acc + r.amount))
}

/// Like [`monthly_siscor`], but a missing month is logged and counted as zero.
pub async fn monthly_siscor_or_zero<C>(db: &C, year: i32, month: u32) -> Result<Decimal>
where
    C: ConnectionTrait,
{
    match monthly_siscor(db, year, month).await {
        Err(e @ Error::BudgetMiss { .. }) => {
            warn!(error = %e, "substituting zero");
            Ok(Decimal::ZERO)
        }
        other => other,
    }
}

/// The latest period goal row of a period.
pub async fn latest_period_goal<C>(
    db: &C,
    edital_id: i32,
    period_id: i32,
) -> Result<Option<period_goal::Model>>
where
    C: ConnectionTrait,
{
    period_goals(edital_id, period_id)
        .order_by_desc(period_goal::Column::DtRef)
        .order_by_desc(period_goal::Column::Id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// The period goal row in effect on `at` (latest `dt_ref <= at`).
pub async fn period_goal_at<C>(
    db: &C,
    edital_id: i32,
    period_id: i32,
    at: NaiveDate,
) -> Result<Option<period_goal::Model>>
where
    C: ConnectionTrait,
{
    period_goals(edital_id, period_id)
        .filter(period_goal::Column::DtRef.lte(at))
        .order_by_desc(period_goal::Column::DtRef)
        .order_by_desc(period_goal::Column::Id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Stretch factor of the period goal in force on `at`, or `default` when none
/// was recorded by then.
pub async fn stretch_factor<C>(
    db: &C,
    edital_id: i32,
    period_id: i32,
    at: NaiveDate,
    default: Decimal,
) -> Result<Decimal>
where
    C: ConnectionTrait,
{
    Ok(period_goal_at(db, edital_id, period_id, at)
        .await?
        .map_or(default, |g| g.stretch_factor))
}

fn period_goals(edital_id: i32, period_id: i32) -> Select<PeriodGoal> {
    PeriodGoal::find()
        .filter(period_goal::Column::EditalId.eq(edital_id))
        .filter(period_goal::Column::PeriodId.eq(period_id))
        .filter(period_goal::Column::DeletedAt.is_null())
}
