//! Mid-period redistribution.
//!
//! When an agency leaves during a period, its contracts are handed to the
//! agencies that remain. Shares are re-derived from the latest snapshot older
//! than the exit date: the leaving agency's percent is spread uniformly over
//! the continuing agencies, and new agencies keep the head-count split of the
//! mixed regime. The contracts then go through phases 3 to 5 of the pipeline
//! under a redistribution criterion (code 8 and up), and a new snapshot is
//! written at the exit date.
//!
//! Running the same exit again soft-deletes the rows of the previous attempt
//! and recomputes them from the same inputs.

use crate::{
    core::{
        criteria, eligibility, goals,
        money::ensure_sum,
        pipeline::{self, AgencyOutcome, Anchors, Phase, PhaseOutcome, RunContext},
        roster,
        shares::{self, Standing},
    },
    entities::{
        AgencyCondition, Contract, Distribution, Limit, PeriodGoal, ShareSnapshot, contract,
        distribution, limit, period_goal, share_snapshot,
    },
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    DatabaseConnection, QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*,
    sea_query::Expr,
};
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use tracing::{info, instrument, warn};

/// One mid-period exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedistributionRequest {
    /// Edital
    pub edital_id: i32,
    /// Period
    pub period_id: i32,
    /// Agency leaving the period
    pub agency_id: i32,
    /// Exit date; also the reference date of every row written
    pub exit_date: NaiveDate,
    /// Redistribution criterion code (8 or above)
    pub criterion: i32,
    /// New stretch factor taking effect on the exit date
    pub stretch: Option<Decimal>,
}

/// Summary of a redistribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedistributionReport {
    /// Edital
    pub edital_id: i32,
    /// Period
    pub period_id: i32,
    /// Agency that left
    pub exiting_agency: i32,
    /// Exit date
    pub exit_date: NaiveDate,
    /// Criterion stamped on the rows
    pub criterion: i32,
    /// Whether earlier rows of the same exit were replaced
    pub rerun: bool,
    /// Whether an unfinished attempt was resumed
    pub resumed: bool,
    /// Contracts gathered from the leaving agency
    pub gathered: usize,
    /// Their total balance
    pub gathered_balance: Decimal,
    /// Phases run by this invocation
    pub phases: Vec<PhaseOutcome>,
    /// Contracts redistributed
    pub redistributed: usize,
    /// New shares of the remaining agencies, by agency id
    pub shares: Vec<AgencyOutcome>,
}

/// Run state key of a redistribution.
#[must_use]
pub fn redistribution_key(edital_id: i32, period_id: i32, agency_id: i32) -> String {
    format!("redistribution:{edital_id}:{period_id}:{agency_id}")
}

/// Every live snapshot of the period, grouped by reference date.
pub async fn snapshot_history<C>(
    db: &C,
    edital_id: i32,
    period_id: i32,
) -> Result<BTreeMap<NaiveDate, Vec<share_snapshot::Model>>>
where
    C: ConnectionTrait,
{
    let rows = ShareSnapshot::find()
        .filter(share_snapshot::Column::EditalId.eq(edital_id))
        .filter(share_snapshot::Column::PeriodId.eq(period_id))
        .filter(share_snapshot::Column::DeletedAt.is_null())
        .order_by_asc(share_snapshot::Column::DtRef)
        .order_by_asc(share_snapshot::Column::AgencyId)
        .all(db)
        .await?;

    let mut history: BTreeMap<NaiveDate, Vec<share_snapshot::Model>> = BTreeMap::new();
    for row in rows {
        history.entry(row.dt_ref).or_default().push(row);
    }
    Ok(history)
}

/// The latest snapshot strictly older than `before`.
///
/// This is the basis every redistribution and goal projection at `before`
/// starts from.
///
/// # Errors
/// [`Error::SnapshotMissing`] when no snapshot predates `before`.
pub async fn snapshot_before<C>(
    db: &C,
    edital_id: i32,
    period_id: i32,
    before: NaiveDate,
) -> Result<(NaiveDate, Vec<share_snapshot::Model>)>
where
    C: ConnectionTrait,
{
    snapshot_history(db, edital_id, period_id)
        .await?
        .into_iter()
        .rev()
        .find(|(dt_ref, _)| *dt_ref < before)
        .ok_or(Error::SnapshotMissing {
            edital_id,
            period_id,
            before,
        })
}

/// Contracts the exiting agency held before `d`, by distribution history or by
/// operational current agency.
async fn exiting_contract_ids<C>(db: &C, request: &RedistributionRequest) -> Result<Vec<i64>>
where
    C: ConnectionTrait,
{
    let holders = eligibility::latest_holders(
        db,
        request.edital_id,
        request.period_id,
        Some(request.exit_date),
    )
    .await?;
    let mut ids: Vec<i64> = holders
        .values()
        .filter(|h| h.agency_id == request.agency_id)
        .map(|h| h.contract_id)
        .collect();
    let operational: Vec<i64> = Contract::find()
        .select_only()
        .column(contract::Column::ContractId)
        .filter(contract::Column::CurrentAgencyId.eq(request.agency_id))
        .filter(contract::Column::DeletedAt.is_null())
        .into_tuple()
        .all(db)
        .await?;
    ids.extend(operational);
    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

/// Soft-deletes every row an earlier attempt at the same exit wrote, whatever
/// redistribution code that attempt used.
async fn discard_previous<C>(db: &C, request: &RedistributionRequest) -> Result<()>
where
    C: ConnectionTrait,
{
    let now = Utc::now().naive_utc();
    let (edital_id, period_id, d) = (request.edital_id, request.period_id, request.exit_date);

    let mut rows = 0;
    for chunk in exiting_contract_ids(db, request).await?.chunks(500) {
        rows += Distribution::update_many()
            .col_expr(distribution::Column::DeletedAt, Expr::value(now))
            .filter(distribution::Column::EditalId.eq(edital_id))
            .filter(distribution::Column::PeriodId.eq(period_id))
            .filter(distribution::Column::DtRef.eq(d))
            .filter(distribution::Column::Criterion.gte(criteria::FIRST_REDISTRIBUTION))
            .filter(distribution::Column::ContractId.is_in(chunk.iter().copied()))
            .filter(distribution::Column::DeletedAt.is_null())
            .exec(db)
            .await?
            .rows_affected;
    }
    Limit::update_many()
        .col_expr(limit::Column::DeletedAt, Expr::value(now))
        .filter(limit::Column::EditalId.eq(edital_id))
        .filter(limit::Column::PeriodId.eq(period_id))
        .filter(limit::Column::Criterion.gte(criteria::FIRST_REDISTRIBUTION))
        .filter(limit::Column::ApurationDate.eq(d))
        .filter(limit::Column::DeletedAt.is_null())
        .exec(db)
        .await?;
    ShareSnapshot::update_many()
        .col_expr(share_snapshot::Column::DeletedAt, Expr::value(now))
        .filter(share_snapshot::Column::EditalId.eq(edital_id))
        .filter(share_snapshot::Column::PeriodId.eq(period_id))
        .filter(share_snapshot::Column::DtRef.eq(d))
        .filter(share_snapshot::Column::DeletedAt.is_null())
        .exec(db)
        .await?;
    PeriodGoal::update_many()
        .col_expr(period_goal::Column::DeletedAt, Expr::value(now))
        .filter(period_goal::Column::EditalId.eq(edital_id))
        .filter(period_goal::Column::PeriodId.eq(period_id))
        .filter(period_goal::Column::DtRef.eq(d))
        .filter(period_goal::Column::DeletedAt.is_null())
        .exec(db)
        .await?;

    info!(distribution_rows = rows, "previous attempt discarded");
    Ok(())
}

/// Debtor to agency anchors for the contracts being redistributed.
///
/// A debtor is anchored to the remaining agency holding most of their other
/// contracts in the period, judged by the latest distribution row before the
/// exit date or, for contracts the period never distributed, by the
/// operational current agency.
async fn holder_anchors<C>(
    db: &C,
    request: &RedistributionRequest,
    receivers: &HashSet<i32>,
) -> Result<BTreeMap<String, i32>>
where
    C: ConnectionTrait,
{
    let gathered = eligibility::remaining(db).await?;
    let gathered_ids: HashSet<i64> = gathered.iter().map(|r| r.contract_id).collect();
    let mut debtors: Vec<String> = gathered.into_iter().map(|r| r.cpf_cnpj).collect();
    debtors.sort_unstable();
    debtors.dedup();
    let wanted: HashSet<&str> = debtors.iter().map(String::as_str).collect();

    let holders = eligibility::latest_holders(
        db,
        request.edital_id,
        request.period_id,
        Some(request.exit_date),
    )
    .await?;

    let mut held: Vec<(String, i32)> = holders
        .values()
        .filter(|h| !gathered_ids.contains(&h.contract_id))
        .filter(|h| receivers.contains(&h.agency_id) && wanted.contains(h.cpf_cnpj.as_str()))
        .map(|h| (h.cpf_cnpj.clone(), h.agency_id))
        .collect();

    for chunk in debtors.chunks(500) {
        let contracts = Contract::find()
            .filter(contract::Column::DebtorCpfCnpj.is_in(chunk.iter().cloned()))
            .filter(contract::Column::DeletedAt.is_null())
            .all(db)
            .await?;
        held.extend(contracts.into_iter().filter_map(|c| {
            let agency = c.current_agency_id?;
            let untracked =
                !holders.contains_key(&c.contract_id) && !gathered_ids.contains(&c.contract_id);
            (untracked && receivers.contains(&agency)).then_some((c.debtor_cpf_cnpj, agency))
        }));
    }

    Ok(pipeline::anchor_agencies(held))
}

async fn prepare(
    db: &DatabaseConnection,
    request: &RedistributionRequest,
    ctx: &RunContext,
    basis: &[share_snapshot::Model],
    rerun: bool,
) -> Result<(usize, Decimal)> {
    let txn = db.begin().await?;

    if rerun {
        discard_previous(&txn, request).await?;
    }
    roster::mark_exit(
        &txn,
        request.edital_id,
        request.period_id,
        request.agency_id,
        request.exit_date,
    )
    .await?;
    criteria::register_redistribution_criterion(&txn, request.criterion).await?;

    let (gathered, balance) = match eligibility::select_for_redistribution(
        &txn,
        request.edital_id,
        request.period_id,
        request.agency_id,
        request.exit_date,
    )
    .await
    {
        Ok(summary) => (summary.distributable, summary.total_balance),
        Err(Error::EmptyUniverse { .. }) => {
            eligibility::clear_working_sets(&txn).await?;
            (0, Decimal::ZERO)
        }
        Err(e) => return Err(e),
    };

    let weight_of = |agency_id: i32| {
        basis
            .iter()
            .find(|s| s.agency_id == agency_id)
            .map_or(Decimal::ZERO, |s| s.percent)
    };
    let mut standings: Vec<Standing> = ctx
        .roster
        .iter()
        .map(|e| Standing {
            agency_id: e.agency_id,
            condition: e.condition,
            weight: weight_of(e.agency_id),
            revenue: weight_of(e.agency_id),
        })
        .collect();
    standings.push(Standing {
        agency_id: request.agency_id,
        condition: AgencyCondition::DecredentialedMidPeriod,
        weight: weight_of(request.agency_id),
        revenue: weight_of(request.agency_id),
    });

    let total = i64::try_from(gathered).unwrap_or(i64::MAX);
    let table = shares::compute_shares(&standings, total)?;
    pipeline::write_limits(
        &txn,
        request.edital_id,
        request.period_id,
        request.criterion,
        request.exit_date,
        &table,
        balance,
    )
    .await?;
    pipeline::save_progress(&txn, &ctx.run_key, request.exit_date, 0).await?;
    txn.commit().await?;

    info!(gathered, balance = %balance, "redistribution prepared");
    Ok((gathered, balance))
}

async fn finalize(
    db: &DatabaseConnection,
    request: &RedistributionRequest,
    ctx: &RunContext,
    basis: &[share_snapshot::Model],
) -> Result<(usize, Vec<AgencyOutcome>)> {
    let txn = db.begin().await?;
    let rows = pipeline::run_rows(&txn, ctx).await?;
    pipeline::ensure_all_placed(&txn, &rows).await?;

    let limits = pipeline::run_limits(&txn, ctx).await?;
    ensure_sum(
        limits.iter().map(|l| l.final_percent),
        Decimal::ONE_HUNDRED,
        "redistribution final_percent",
    )?;

    let realized = pipeline::realized_by_agency(&rows);
    let now = Utc::now().naive_utc();
    let mut outcomes = Vec::with_capacity(limits.len());
    let mut snapshot = Vec::with_capacity(limits.len());

    for row in limits {
        let (count, balance) = realized.get(&row.agency_id).copied().unwrap_or_default();
        let saldo = basis
            .iter()
            .find(|s| s.agency_id == row.agency_id)
            .map_or(Decimal::ZERO, |s| s.saldo_devedor)
            + balance;

        outcomes.push(AgencyOutcome {
            agency_id: row.agency_id,
            percent: row.final_percent,
            max_count: count,
            realized: count,
            balance,
        });
        snapshot.push((row.agency_id, saldo, row.final_percent));

        let mut active: limit::ActiveModel = row.into();
        active.max_count = Set(count);
        active.max_value = Set(balance);
        active.updated_at = Set(Some(now));
        active.update(&txn).await?;
    }

    pipeline::write_snapshot(
        &txn,
        request.edital_id,
        request.period_id,
        request.exit_date,
        &snapshot,
    )
    .await?;

    if let Some(stretch) = request.stretch {
        goals::record_period_goal(
            &txn,
            request.edital_id,
            request.period_id,
            request.exit_date,
            stretch,
        )
        .await?;
    }

    pipeline::clear_progress(&txn, &ctx.run_key).await?;
    txn.commit().await?;
    Ok((rows.len(), outcomes))
}

/// Takes `request.agency_id` out of the period and re-homes its contracts.
///
/// The agency is marked as decredentialed on the exit date, shares of the
/// remaining agencies are recomputed from the basis snapshot, and the gathered
/// contracts go through phases 3 to 5. Limits are then set to the realized
/// counts and balances, and a new snapshot is written at the exit date.
/// Running the same exit again replaces the earlier attempt.
///
/// # Errors
/// [`Error::InvalidCriterion`] for a code below 8;
/// [`Error::AgencyNotEligible`] if the agency is not receiving in the period;
/// [`Error::RosterInsufficient`] if no other agency can receive;
/// [`Error::SnapshotMissing`] if no snapshot predates the exit.
/// None of these write anything.
#[instrument(skip(db, request), fields(edital_id = request.edital_id, period_id = request.period_id, agency_id = request.agency_id, exit_date = %request.exit_date))]
pub async fn run_redistribution(
    db: &DatabaseConnection,
    request: &RedistributionRequest,
) -> Result<RedistributionReport> {
    criteria::validate_redistribution_code(request.criterion)?;
    let period = roster::load_period(db, request.edital_id, request.period_id).await?;
    let run_roster = roster::load_roster(db, request.edital_id, period.id).await?;

    let exiting = run_roster
        .iter()
        .find(|e| e.agency_id == request.agency_id)
        .ok_or_else(|| Error::AgencyNotEligible {
            agency_id: request.agency_id,
            reason: "not part of the period roster".to_string(),
        })?;
    let rerun = exiting.condition == AgencyCondition::DecredentialedMidPeriod
        && exiting.exit_date == Some(request.exit_date);
    if !exiting.is_receiving() && !rerun {
        return Err(Error::AgencyNotEligible {
            agency_id: request.agency_id,
            reason: format!("condition is {:?}", exiting.condition),
        });
    }
    if !(period.dt_begin..=period.dt_end).contains(&request.exit_date) {
        return Err(Error::AgencyNotEligible {
            agency_id: request.agency_id,
            reason: format!("exit date {} is outside the period", request.exit_date),
        });
    }

    let remaining: Vec<roster::RosterEntry> = run_roster
        .iter()
        .filter(|e| e.is_receiving() && e.agency_id != request.agency_id)
        .cloned()
        .collect();
    let remaining = roster::receiving(&remaining, request.edital_id, request.period_id)?;
    let (basis_date, basis) = snapshot_before(
        db,
        request.edital_id,
        request.period_id,
        request.exit_date,
    )
    .await?;
    info!(%basis_date, remaining = remaining.len(), rerun, "redistributing");

    let run_key = redistribution_key(request.edital_id, request.period_id, request.agency_id);
    let receivers: HashSet<i32> = remaining.iter().map(|e| e.agency_id).collect();
    let mut ctx = RunContext {
        edital_id: request.edital_id,
        period_id: request.period_id,
        dt_ref: request.exit_date,
        limit_criterion: request.criterion,
        criterion_override: Some(request.criterion),
        roster: remaining,
        anchors: Anchors::Fixed(BTreeMap::new()),
        run_key,
    };

    let last = match pipeline::load_progress(db, &ctx.run_key).await? {
        Some((saved, last)) if saved == request.exit_date => {
            info!(last_phase = last, "resuming redistribution");
            Some(last)
        }
        Some((saved, _)) => {
            warn!(%saved, "discarding progress of a different exit date");
            None
        }
        None => None,
    };

    let (gathered, gathered_balance) = if last.is_some() {
        eligibility::selected_totals(db).await?
    } else {
        prepare(db, request, &ctx, &basis, rerun).await?
    };

    ctx.anchors = Anchors::Fixed(holder_anchors(db, request, &receivers).await?);

    let mut phases = Vec::new();
    for phase in Phase::REDISTRIBUTION
        .into_iter()
        .filter(|p| p.number() > last.unwrap_or(0))
    {
        phases.push(pipeline::execute_phase(db, &ctx, phase).await?);
    }

    let (redistributed, shares) = finalize(db, request, &ctx, &basis).await?;
    info!(redistributed, "redistribution complete");

    Ok(RedistributionReport {
        edital_id: request.edital_id,
        period_id: request.period_id,
        exiting_agency: request.agency_id,
        exit_date: request.exit_date,
        criterion: request.criterion,
        rerun,
        resumed: last.is_some(),
        gathered,
        gathered_balance,
        phases,
        redistributed,
        shares,
    })
}

/// Human-readable summary of a redistribution.
#[must_use]
pub fn format_redistribution_report(report: &RedistributionReport) -> String {
    let mut out = format!(
        "Redistribution of agency {} on {} (criterion {})\n",
        report.exiting_agency, report.exit_date, report.criterion
    );
    if report.rerun {
        out.push_str("  previous attempt replaced\n");
    }
    let _ = writeln!(
        out,
        "  gathered {} contracts, balance {}",
        report.gathered, report.gathered_balance
    );
    for p in &report.phases {
        let _ = writeln!(
            out,
            "  phase {} {:<24} {:>8}",
            p.phase.number(),
            p.phase.label(),
            p.placed
        );
    }
    let _ = writeln!(out, "  redistributed {}", report.redistributed);
    for s in &report.shares {
        let _ = writeln!(
            out,
            "  agency {:>6} {:>6}% received {:>8} balance {:>18}",
            s.agency_id, s.percent, s.realized, s.balance
        );
    }
    out
}
