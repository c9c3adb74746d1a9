//! Period and agency roster lookups.
//!
//! Agencies, participations and periods are id-keyed aggregates; this module
//! resolves them into the flat [`RosterEntry`] list the allocators work on.

use crate::{
    entities::{
        Agency, AgencyCondition, AgencyRevenue, Edital, Participation, Period, agency,
        agency_revenue, participation, period,
    },
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, Set, prelude::*};
use std::collections::{BTreeMap, HashMap};

/// One agency of a period roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    /// Agency business code
    pub agency_id: i32,
    /// Abbreviated name
    pub short_name: String,
    /// Condition in this period
    pub condition: AgencyCondition,
    /// Exit date for mid-period decredentialing
    pub exit_date: Option<NaiveDate>,
}

impl RosterEntry {
    /// Whether the agency can receive contracts.
    #[must_use]
    pub const fn is_receiving(&self) -> bool {
        self.condition.is_receiving()
    }
}

/// Loads a period after checking it belongs to `edital_id`.
pub async fn load_period<C>(db: &C, edital_id: i32, period_id: i32) -> Result<period::Model>
where
    C: ConnectionTrait,
{
    Edital::find_by_id(edital_id)
        .filter(crate::entities::edital::Column::DeletedAt.is_null())
        .one(db)
        .await?
        .ok_or(Error::EditalNotFound { id: edital_id })?;

    Period::find_by_id(period_id)
        .filter(period::Column::EditalId.eq(edital_id))
        .filter(period::Column::DeletedAt.is_null())
        .one(db)
        .await?
        .ok_or(Error::PeriodNotFound {
            id: period_id,
            edital_id,
        })
}

/// The period that ended most recently before `current` starts, across editais.
pub async fn prior_period<C>(db: &C, current: &period::Model) -> Result<Option<period::Model>>
where
    C: ConnectionTrait,
{
    Period::find()
        .filter(period::Column::DtEnd.lt(current.dt_begin))
        .filter(period::Column::DeletedAt.is_null())
        .order_by_desc(period::Column::DtEnd)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Loads the roster of a period, ordered by agency id.
pub async fn load_roster<C>(db: &C, edital_id: i32, period_id: i32) -> Result<Vec<RosterEntry>>
where
    C: ConnectionTrait,
{
    let rows = Participation::find()
        .filter(participation::Column::EditalId.eq(edital_id))
        .filter(participation::Column::PeriodId.eq(period_id))
        .filter(participation::Column::DeletedAt.is_null())
        .order_by_asc(participation::Column::AgencyId)
        .find_also_related(Agency)
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .filter(|(_, agency)| agency.as_ref().is_some_and(|a| a.deleted_at.is_none()))
        .filter_map(|(p, agency)| {
            agency.map(|a| RosterEntry {
                agency_id: p.agency_id,
                short_name: a.short_name,
                condition: p.condition,
                exit_date: p.exit_date,
            })
        })
        .collect())
}

/// Agencies that can receive contracts, or [`Error::RosterInsufficient`] if none.
pub fn receiving(roster: &[RosterEntry], edital_id: i32, period_id: i32) -> Result<Vec<RosterEntry>> {
    let receivers: Vec<RosterEntry> = roster.iter().filter(|e| e.is_receiving()).cloned().collect();
    if receivers.is_empty() {
        return Err(Error::RosterInsufficient {
            edital_id,
            period_id,
        });
    }
    Ok(receivers)
}

/// Revenue collected by each roster agency during the prior period's window.
///
/// Agencies without revenue (including every agency when there is no prior
/// period) map to zero.
pub async fn prior_revenues<C>(
    db: &C,
    current: &period::Model,
    agency_ids: &[i32],
) -> Result<BTreeMap<i32, Decimal>>
where
    C: ConnectionTrait,
{
    let mut revenues: BTreeMap<i32, Decimal> =
        agency_ids.iter().map(|id| (*id, Decimal::ZERO)).collect();

    let Some(prior) = prior_period(db, current).await? else {
        return Ok(revenues);
    };

    let rows = AgencyRevenue::find()
        .filter(agency_revenue::Column::AgencyId.is_in(agency_ids.iter().copied()))
        .filter(agency_revenue::Column::CollectedOn.between(prior.dt_begin, prior.dt_end))
        .filter(agency_revenue::Column::DeletedAt.is_null())
        .all(db)
        .await?;

    for row in rows {
        *revenues.entry(row.agency_id).or_default() += row.amount;
    }
    Ok(revenues)
}

/// Marks an agency as decredentialed mid-period as of `exit_date`.
pub async fn mark_exit<C>(
    db: &C,
    edital_id: i32,
    period_id: i32,
    agency_id: i32,
    exit_date: NaiveDate,
) -> Result<participation::Model>
where
    C: ConnectionTrait,
{
    let row = Participation::find()
        .filter(participation::Column::EditalId.eq(edital_id))
        .filter(participation::Column::PeriodId.eq(period_id))
        .filter(participation::Column::AgencyId.eq(agency_id))
        .filter(participation::Column::DeletedAt.is_null())
        .one(db)
        .await?
        .ok_or_else(|| Error::AgencyNotEligible {
            agency_id,
            reason: "not part of the period roster".to_string(),
        })?;

    let mut active: participation::ActiveModel = row.into();
    active.condition = Set(AgencyCondition::DecredentialedMidPeriod);
    active.exit_date = Set(Some(exit_date));
    active.updated_at = Set(Some(Utc::now().naive_utc()));
    active.update(db).await.map_err(Into::into)
}

/// Short names of every agency, keyed by id.
pub async fn short_names<C>(db: &C) -> Result<HashMap<i32, String>>
where
    C: ConnectionTrait,
{
    Ok(Agency::find()
        .filter(agency::Column::DeletedAt.is_null())
        .all(db)
        .await?
        .into_iter()
        .map(|a| (a.id, a.short_name))
        .collect())
}
