//! Five-phase distribution pipeline.
//!
//! Each phase runs in its own transaction: it reads the unplaced rows of the
//! distributable set, plans its placements in memory, inserts the matching
//! distribution rows, marks the placed rows as consumed and records its number
//! in the run state before committing. A failed phase rolls back alone, and a
//! new invocation resumes after the last committed one.
//!
//! | phase | what is placed | criterion |
//! |---|---|---|
//! | 1 | active agreements held by a continuing agency | `ACORDO-CONTINUA` |
//! | 2 | active agreements held by a decredentialed agency | `ACORDO-DESCREDENCIADA` |
//! | 3 | other contracts of debtors placed by 1 and 2 | `ARRASTO` |
//! | 4 | debtors with two or more contracts, whole | `ARRASTO` |
//! | 5 | remaining single contracts | `DEMAIS` |
//!
//! Phases 4 and 5 pick the receiving agency that is least filled relative to
//! its `max_count`; see [`Ledger::least_filled`].

use crate::{
    config::settings::Settings,
    core::{
        criteria, eligibility,
        money::{Allotment, apply_percent, balance_to_target, ensure_sum, sum, trunc2},
        roster::{self, RosterEntry},
        shares::{self, ShareTable, Standing},
    },
    entities::{
        AgencyCondition, Agreement, AgreementState, Contract, Distributable, Distribution, Limit,
        PeriodModel, RunState, ShareSnapshot, agreement, contract, distributable, distribution, draggable,
        limit, run_state, share_snapshot,
    },
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use sea_orm::{
    DatabaseConnection, QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*,
    sea_query::{Expr, Query},
};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use tracing::{debug, info, instrument, warn};

const CHUNK: usize = 500;

/// One step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Active agreements at a continuing agency stay there
    AgreementsContinuing,
    /// Active agreements at a decredentialed agency go round-robin
    AgreementsDecredentialed,
    /// Debtors follow their agreement contracts
    DragWithAgreement,
    /// Multi-contract debtors are placed whole
    DragWithoutAgreement,
    /// Everything else
    Residual,
}

impl Phase {
    /// Every phase, in execution order.
    pub const ALL: [Self; 5] = [
        Self::AgreementsContinuing,
        Self::AgreementsDecredentialed,
        Self::DragWithAgreement,
        Self::DragWithoutAgreement,
        Self::Residual,
    ];

    /// Phases run by a redistribution.
    pub const REDISTRIBUTION: [Self; 3] = [
        Self::DragWithAgreement,
        Self::DragWithoutAgreement,
        Self::Residual,
    ];

    /// Phase number, 1 to 5.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::AgreementsContinuing => 1,
            Self::AgreementsDecredentialed => 2,
            Self::DragWithAgreement => 3,
            Self::DragWithoutAgreement => 4,
            Self::Residual => 5,
        }
    }

    /// Criterion code of the rows this phase inserts.
    #[must_use]
    pub const fn criterion(self) -> i32 {
        match self {
            Self::AgreementsContinuing => criteria::ACORDO_CONTINUA,
            Self::AgreementsDecredentialed => criteria::ACORDO_DESCREDENCIADA,
            Self::DragWithAgreement | Self::DragWithoutAgreement => criteria::ARRASTO,
            Self::Residual => criteria::DEMAIS,
        }
    }

    /// Short label for logs and reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::AgreementsContinuing => "agreements (continuing)",
            Self::AgreementsDecredentialed => "agreements (decredentialed)",
            Self::DragWithAgreement => "drag with agreement",
            Self::DragWithoutAgreement => "drag without agreement",
            Self::Residual => "residual",
        }
    }
}

/// A planned assignment of one contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Contract being placed
    pub contract_id: i64,
    /// Receiving agency
    pub agency_id: i32,
    /// Debtor document
    pub cpf_cnpj: String,
    /// Balance carried onto the distribution row
    pub balance: Decimal,
}

impl Placement {
    fn of_distributable(row: &distributable::Model, agency_id: i32) -> Self {
        Self {
            contract_id: row.contract_id,
            agency_id,
            cpf_cnpj: row.cpf_cnpj.clone(),
            balance: row.balance,
        }
    }

    fn of_draggable(row: &draggable::Model, agency_id: i32) -> Self {
        Self {
            contract_id: row.contract_id,
            agency_id,
            cpf_cnpj: row.cpf_cnpj.clone(),
            balance: row.balance,
        }
    }
}

/// Progress of one receiving agency against its limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgencyTarget {
    /// Agency business code
    pub agency_id: i32,
    /// Final percent of the limit row
    pub percent: Decimal,
    /// Target contract count
    pub max_count: i64,
    /// Contracts placed so far in this run
    pub placed: i64,
    /// Balance placed so far in this run
    pub placed_balance: Decimal,
}

impl AgencyTarget {
    /// Orders by fill ratio `placed / max_count`, a zero `max_count` counting as
    /// infinitely full, then by higher percent and lower agency id.
    fn fill_cmp(&self, other: &Self) -> Ordering {
        let ratio = match (self.max_count, other.max_count) {
            (0, 0) => Ordering::Equal,
            (0, _) => Ordering::Greater,
            (_, 0) => Ordering::Less,
            (a_max, b_max) => (i128::from(self.placed) * i128::from(b_max))
                .cmp(&(i128::from(other.placed) * i128::from(a_max))),
        };
        ratio
            .then_with(|| other.percent.cmp(&self.percent))
            .then_with(|| self.agency_id.cmp(&other.agency_id))
    }
}

/// Running fill state of every receiving agency.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    targets: Vec<AgencyTarget>,
}

impl Ledger {
    /// Builds a ledger, ordered by agency id.
    #[must_use]
    pub fn new(mut targets: Vec<AgencyTarget>) -> Self {
        targets.sort_by_key(|t| t.agency_id);
        Self { targets }
    }

    /// Every target, by agency id.
    #[must_use]
    pub fn targets(&self) -> &[AgencyTarget] {
        &self.targets
    }

    /// The least filled agency relative to its `max_count`.
    #[must_use]
    pub fn least_filled(&self) -> Option<i32> {
        self.targets
            .iter()
            .min_by(|a, b| a.fill_cmp(b))
            .map(|t| t.agency_id)
    }

    /// Agency ids by percent descending, then id ascending.
    #[must_use]
    pub fn priority_order(&self) -> Vec<i32> {
        let mut ordered: Vec<&AgencyTarget> = self.targets.iter().collect();
        ordered.sort_by(|a, b| {
            b.percent
                .cmp(&a.percent)
                .then_with(|| a.agency_id.cmp(&b.agency_id))
        });
        ordered.into_iter().map(|t| t.agency_id).collect()
    }

    /// Counts `count` contracts worth `balance` against `agency_id`.
    pub fn record(&mut self, agency_id: i32, count: i64, balance: Decimal) {
        if let Some(target) = self.targets.iter_mut().find(|t| t.agency_id == agency_id) {
            target.placed += count;
            target.placed_balance += balance;
        }
    }
}

/// How phase 3 finds the agency a debtor is anchored to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchors {
    /// The agency that received the debtor's agreement contracts in this run
    PlacedByAgreement,
    /// A fixed debtor to agency map computed before the run
    Fixed(BTreeMap<String, i32>),
}

/// Everything a phase needs to know about the run it belongs to.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Edital of the run
    pub edital_id: i32,
    /// Period of the run
    pub period_id: i32,
    /// Reference date stamped on every row
    pub dt_ref: NaiveDate,
    /// Criterion of the limit rows that drive the ledger
    pub limit_criterion: i32,
    /// Criterion stamped on every row instead of the phase's own code
    pub criterion_override: Option<i32>,
    /// Roster of the period as seen by this run
    pub roster: Vec<RosterEntry>,
    /// Anchor rule for phase 3
    pub anchors: Anchors,
    /// Run state key
    pub run_key: String,
}

impl RunContext {
    fn row_criterion(&self, phase: Phase) -> i32 {
        self.criterion_override.unwrap_or_else(|| phase.criterion())
    }

    fn row_criteria(&self) -> Vec<i32> {
        self.criterion_override
            .map_or_else(|| criteria::INITIAL_DISTRIBUTION_CODES.to_vec(), |c| vec![c])
    }
}

/// What one phase placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseOutcome {
    /// The phase
    pub phase: Phase,
    /// Contracts placed
    pub placed: usize,
    /// Balance placed
    pub balance: Decimal,
}

/// Outcome of one receiving agency at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgencyOutcome {
    /// Agency business code
    pub agency_id: i32,
    /// Final percent
    pub percent: Decimal,
    /// Limit count after balancing
    pub max_count: i64,
    /// Contracts received
    pub realized: i64,
    /// Balance received
    pub balance: Decimal,
}

/// Summary of a distribution run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionReport {
    /// Edital
    pub edital_id: i32,
    /// Period
    pub period_id: i32,
    /// Reference date
    pub dt_ref: NaiveDate,
    /// Last phase committed by an earlier invocation, when resuming
    pub resumed_after: Option<u8>,
    /// Selection counts, when this invocation ran the selection
    pub selection: Option<eligibility::SelectionSummary>,
    /// Phases run by this invocation
    pub phases: Vec<PhaseOutcome>,
    /// Rows distributed by the whole run
    pub distributed: usize,
    /// Per-agency outcome, by agency id
    pub agencies: Vec<AgencyOutcome>,
}

/// Run state key of a distribution run.
#[must_use]
pub fn distribution_key(edital_id: i32, period_id: i32) -> String {
    format!("distribution:{edital_id}:{period_id}")
}

/// Reads the `(dt_ref, last_phase)` recorded under `key`.
///
/// Returns `None` when no run is in progress under that key.
///
/// # Errors
/// [`Error::Config`] when the stored value is malformed.
pub async fn load_progress<C>(db: &C, key: &str) -> Result<Option<(NaiveDate, u8)>>
where
    C: ConnectionTrait,
{
    let Some(row) = RunState::find()
        .filter(run_state::Column::Key.eq(key))
        .one(db)
        .await?
    else {
        return Ok(None);
    };

    let malformed = || Error::Config {
        message: format!("malformed run state {key}: {}", row.value),
    };
    let (date, phase) = row.value.split_once('|').ok_or_else(malformed)?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| malformed())?;
    let phase = phase.parse::<u8>().map_err(|_| malformed())?;
    Ok(Some((date, phase)))
}

/// Records that `phase` of the run under `key` is committed.
pub async fn save_progress<C>(db: &C, key: &str, dt_ref: NaiveDate, phase: u8) -> Result<()>
where
    C: ConnectionTrait,
{
    let value = format!("{}|{phase}", dt_ref.format("%Y-%m-%d"));
    let now = Utc::now().naive_utc();

    match RunState::find()
        .filter(run_state::Column::Key.eq(key))
        .one(db)
        .await?
    {
        Some(row) => {
            let mut active: run_state::ActiveModel = row.into();
            active.value = Set(value);
            active.updated_at = Set(now);
            active.update(db).await?;
        }
        None => {
            run_state::ActiveModel {
                key: Set(key.to_string()),
                value: Set(value),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(db)
            .await?;
        }
    }
    Ok(())
}

/// Removes the run state of a finished run.
pub async fn clear_progress<C>(db: &C, key: &str) -> Result<()>
where
    C: ConnectionTrait,
{
    RunState::delete_many()
        .filter(run_state::Column::Key.eq(key))
        .exec(db)
        .await?;
    Ok(())
}

/// Phase 1: each contract keeps its continuing holder.
#[must_use]
pub fn plan_agreements_continuing(
    remaining: &[distributable::Model],
    holdings: &HashMap<i64, i32>,
    continuing: &HashSet<i32>,
) -> Vec<Placement> {
    remaining
        .iter()
        .filter_map(|row| {
            holdings
                .get(&row.contract_id)
                .filter(|agency| continuing.contains(agency))
                .map(|agency| Placement::of_distributable(row, *agency))
        })
        .collect()
}

/// Phase 2: contracts held by an agency outside `receivers` are dealt over
/// `receivers` in turn, in contract id order.
#[must_use]
pub fn plan_agreements_decredentialed(
    remaining: &[distributable::Model],
    holdings: &HashMap<i64, i32>,
    receivers: &[i32],
) -> Vec<Placement> {
    if receivers.is_empty() {
        return Vec::new();
    }

    remaining
        .iter()
        .filter(|row| {
            holdings
                .get(&row.contract_id)
                .is_some_and(|agency| !receivers.contains(agency))
        })
        .zip(receivers.iter().cycle())
        .map(|(row, agency)| Placement::of_distributable(row, *agency))
        .collect()
}

/// Phase 3: every remaining contract of an anchored debtor goes to the anchor.
#[must_use]
pub fn plan_drag_with_agreement(
    remaining: &[distributable::Model],
    anchors: &BTreeMap<String, i32>,
) -> Vec<Placement> {
    remaining
        .iter()
        .filter_map(|row| {
            anchors
                .get(&row.cpf_cnpj)
                .map(|agency| Placement::of_distributable(row, *agency))
        })
        .collect()
}

/// Phase 4: each debtor group goes whole to the least filled agency.
///
/// Groups are taken largest first, then by balance descending, then by document.
pub fn plan_drag_without_agreement(
    draggable: &[draggable::Model],
    ledger: &mut Ledger,
) -> Vec<Placement> {
    let mut groups: BTreeMap<&str, Vec<&draggable::Model>> = BTreeMap::new();
    for row in draggable {
        groups.entry(row.cpf_cnpj.as_str()).or_default().push(row);
    }

    let mut groups: Vec<(&str, Vec<&draggable::Model>, Decimal)> = groups
        .into_iter()
        .map(|(cpf, rows)| {
            let balance = sum(rows.iter().map(|r| r.balance));
            (cpf, rows, balance)
        })
        .collect();
    groups.sort_by(|a, b| {
        b.1.len()
            .cmp(&a.1.len())
            .then_with(|| b.2.cmp(&a.2))
            .then_with(|| a.0.cmp(b.0))
    });

    let mut placements = Vec::new();
    for (_, rows, balance) in groups {
        let Some(agency) = ledger.least_filled() else {
            break;
        };
        let count = i64::try_from(rows.len()).unwrap_or(i64::MAX);
        ledger.record(agency, count, balance);
        placements.extend(rows.into_iter().map(|r| Placement::of_draggable(r, agency)));
    }
    placements
}

/// Phase 5: single contracts, largest balance first, to the least filled agency.
pub fn plan_residual(remaining: &[distributable::Model], ledger: &mut Ledger) -> Vec<Placement> {
    let mut rows: Vec<&distributable::Model> = remaining.iter().collect();
    rows.sort_by(|a, b| {
        b.balance
            .cmp(&a.balance)
            .then_with(|| a.contract_id.cmp(&b.contract_id))
    });

    let mut placements = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(agency) = ledger.least_filled() else {
            break;
        };
        ledger.record(agency, 1, row.balance);
        placements.push(Placement::of_distributable(row, agency));
    }
    placements
}

/// The agency holding most of each debtor's contracts, lowest id on ties.
#[must_use]
pub fn anchor_agencies<I>(held: I) -> BTreeMap<String, i32>
where
    I: IntoIterator<Item = (String, i32)>,
{
    let mut tally: BTreeMap<String, BTreeMap<i32, usize>> = BTreeMap::new();
    for (cpf, agency) in held {
        *tally.entry(cpf).or_default().entry(agency).or_default() += 1;
    }

    tally
        .into_iter()
        .filter_map(|(cpf, counts)| {
            let mut best: Option<(i32, usize)> = None;
            for (agency, count) in counts {
                if best.is_none_or(|(_, c)| count > c) {
                    best = Some((agency, count));
                }
            }
            best.map(|(agency, _)| (cpf, agency))
        })
        .collect()
}

/// Active agreements among `remaining`, as contract id to current holder.
async fn agreement_holdings<C>(
    db: &C,
    remaining: &[distributable::Model],
) -> Result<HashMap<i64, i32>>
where
    C: ConnectionTrait,
{
    let wanted: HashSet<i64> = remaining.iter().map(|r| r.contract_id).collect();
    let mut ids: Vec<i64> = Agreement::find()
        .select_only()
        .column(agreement::Column::ContractId)
        .filter(agreement::Column::State.eq(AgreementState::Active))
        .filter(agreement::Column::DeletedAt.is_null())
        .into_tuple::<i64>()
        .all(db)
        .await?
        .into_iter()
        .filter(|id| wanted.contains(id))
        .collect();
    ids.sort_unstable();
    ids.dedup();

    let mut holdings = HashMap::with_capacity(ids.len());
    for chunk in ids.chunks(CHUNK) {
        let contracts = Contract::find()
            .filter(contract::Column::ContractId.is_in(chunk.iter().copied()))
            .all(db)
            .await?;
        for c in contracts {
            if let Some(agency) = c.current_agency_id {
                holdings.insert(c.contract_id, agency);
            }
        }
    }
    Ok(holdings)
}

/// Distribution rows written by this run so far.
///
/// Rows are scoped to the contracts of the current selection, placed or not,
/// so an earlier run at the same reference date is not counted again.
pub(crate) async fn run_rows<C>(db: &C, ctx: &RunContext) -> Result<Vec<distribution::Model>>
where
    C: ConnectionTrait,
{
    let selected = Query::select()
        .column(distributable::Column::ContractId)
        .from(Distributable)
        .to_owned();

    Distribution::find()
        .filter(distribution::Column::EditalId.eq(ctx.edital_id))
        .filter(distribution::Column::PeriodId.eq(ctx.period_id))
        .filter(distribution::Column::DtRef.eq(ctx.dt_ref))
        .filter(distribution::Column::Criterion.is_in(ctx.row_criteria()))
        .filter(distribution::Column::ContractId.in_subquery(selected))
        .filter(distribution::Column::DeletedAt.is_null())
        .order_by_asc(distribution::Column::ContractId)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Live limit rows of the run's criterion, by agency id.
pub(crate) async fn run_limits<C>(db: &C, ctx: &RunContext) -> Result<Vec<limit::Model>>
where
    C: ConnectionTrait,
{
    Limit::find()
        .filter(limit::Column::EditalId.eq(ctx.edital_id))
        .filter(limit::Column::PeriodId.eq(ctx.period_id))
        .filter(limit::Column::Criterion.eq(ctx.limit_criterion))
        .filter(limit::Column::DeletedAt.is_null())
        .order_by_asc(limit::Column::AgencyId)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Count and balance received by each agency.
pub(crate) fn realized_by_agency(rows: &[distribution::Model]) -> BTreeMap<i32, (i64, Decimal)> {
    let mut realized: BTreeMap<i32, (i64, Decimal)> = BTreeMap::new();
    for row in rows {
        let entry = realized.entry(row.agency_id).or_default();
        entry.0 += 1;
        entry.1 += row.balance;
    }
    realized
}

async fn load_ledger<C>(db: &C, ctx: &RunContext) -> Result<Ledger>
where
    C: ConnectionTrait,
{
    let limits = run_limits(db, ctx).await?;
    let realized = realized_by_agency(&run_rows(db, ctx).await?);

    Ok(Ledger::new(
        limits
            .into_iter()
            .map(|l| {
                let (placed, placed_balance) =
                    realized.get(&l.agency_id).copied().unwrap_or_default();
                AgencyTarget {
                    agency_id: l.agency_id,
                    percent: l.final_percent,
                    max_count: l.max_count,
                    placed,
                    placed_balance,
                }
            })
            .collect(),
    ))
}

async fn agreement_anchors<C>(db: &C, ctx: &RunContext) -> Result<BTreeMap<String, i32>>
where
    C: ConnectionTrait,
{
    let rows = Distribution::find()
        .filter(distribution::Column::EditalId.eq(ctx.edital_id))
        .filter(distribution::Column::PeriodId.eq(ctx.period_id))
        .filter(distribution::Column::DtRef.eq(ctx.dt_ref))
        .filter(distribution::Column::Criterion.is_in([
            criteria::ACORDO_CONTINUA,
            criteria::ACORDO_DESCREDENCIADA,
        ]))
        .filter(distribution::Column::DeletedAt.is_null())
        .all(db)
        .await?;
    Ok(anchor_agencies(
        rows.into_iter().map(|r| (r.cpf_cnpj, r.agency_id)),
    ))
}

/// Fails with [`Error::ContractCollision`] if a placement repeats a contract
/// within itself or against the rows already written by this run.
async fn ensure_no_collision<C>(db: &C, ctx: &RunContext, placements: &[Placement]) -> Result<()>
where
    C: ConnectionTrait,
{
    let mut seen = HashSet::with_capacity(placements.len());
    for p in placements {
        if !seen.insert(p.contract_id) {
            return Err(Error::ContractCollision {
                contract_id: p.contract_id,
            });
        }
    }

    let ids: Vec<i64> = placements.iter().map(|p| p.contract_id).collect();
    for chunk in ids.chunks(CHUNK) {
        let existing = Distribution::find()
            .filter(distribution::Column::EditalId.eq(ctx.edital_id))
            .filter(distribution::Column::PeriodId.eq(ctx.period_id))
            .filter(distribution::Column::DtRef.eq(ctx.dt_ref))
            .filter(distribution::Column::ContractId.is_in(chunk.iter().copied()))
            .filter(distribution::Column::DeletedAt.is_null())
            .one(db)
            .await?;
        if let Some(row) = existing {
            return Err(Error::ContractCollision {
                contract_id: row.contract_id,
            });
        }
    }
    Ok(())
}

async fn insert_placements<C>(
    db: &C,
    ctx: &RunContext,
    criterion: i32,
    placements: &[Placement],
) -> Result<()>
where
    C: ConnectionTrait,
{
    let now = Utc::now().naive_utc();
    for chunk in placements.chunks(CHUNK) {
        let rows = chunk.iter().map(|p| distribution::ActiveModel {
            dt_ref: Set(ctx.dt_ref),
            edital_id: Set(ctx.edital_id),
            period_id: Set(ctx.period_id),
            contract_id: Set(p.contract_id),
            agency_id: Set(p.agency_id),
            criterion: Set(criterion),
            cpf_cnpj: Set(p.cpf_cnpj.clone()),
            balance: Set(p.balance),
            created_at: Set(now),
            ..Default::default()
        });
        Distribution::insert_many(rows).exec(db).await?;
    }
    Ok(())
}

/// Plans and commits one phase of the run described by `ctx`.
///
/// The phase reads the unplaced rows of the distributable set, plans its
/// placements against the live limits of `ctx.limit_criterion`, and inserts
/// them together with the consumed markers and the run state update in a
/// single transaction. A phase with nothing to place still records progress.
///
/// # Errors
/// [`Error::ContractCollision`] if a planned contract already has a live row at
/// the run's reference date; [`Error::Database`] on any storage failure. The
/// transaction is rolled back in both cases and the run state keeps the last
/// committed phase.
#[instrument(skip(db, ctx), fields(edital_id = ctx.edital_id, period_id = ctx.period_id, phase = phase.number()))]
pub async fn execute_phase(
    db: &DatabaseConnection,
    ctx: &RunContext,
    phase: Phase,
) -> Result<PhaseOutcome> {
    let txn = db.begin().await?;
    let remaining = eligibility::remaining(&txn).await?;

    let placements = match phase {
        Phase::AgreementsContinuing => {
            let holdings = agreement_holdings(&txn, &remaining).await?;
            let continuing: HashSet<i32> = ctx
                .roster
                .iter()
                .filter(|e| e.condition == AgencyCondition::Continuing)
                .map(|e| e.agency_id)
                .collect();
            plan_agreements_continuing(&remaining, &holdings, &continuing)
        }
        Phase::AgreementsDecredentialed => {
            let holdings = agreement_holdings(&txn, &remaining).await?;
            let ledger = load_ledger(&txn, ctx).await?;
            plan_agreements_decredentialed(&remaining, &holdings, &ledger.priority_order())
        }
        Phase::DragWithAgreement => {
            let anchors = match &ctx.anchors {
                Anchors::PlacedByAgreement => agreement_anchors(&txn, ctx).await?,
                Anchors::Fixed(map) => map.clone(),
            };
            plan_drag_with_agreement(&remaining, &anchors)
        }
        Phase::DragWithoutAgreement => {
            eligibility::select_draggable(&txn).await?;
            let groups = eligibility::remaining_draggable(&txn).await?;
            let mut ledger = load_ledger(&txn, ctx).await?;
            plan_drag_without_agreement(&groups, &mut ledger)
        }
        Phase::Residual => {
            let mut ledger = load_ledger(&txn, ctx).await?;
            plan_residual(&remaining, &mut ledger)
        }
    };

    let outcome = PhaseOutcome {
        phase,
        placed: placements.len(),
        balance: sum(placements.iter().map(|p| p.balance)),
    };

    if placements.is_empty() {
        info!(phase = phase.label(), "nothing to place, phase skipped");
    } else {
        ensure_no_collision(&txn, ctx, &placements).await?;
        insert_placements(&txn, ctx, ctx.row_criterion(phase), &placements).await?;
        let ids: Vec<i64> = placements.iter().map(|p| p.contract_id).collect();
        eligibility::consume(&txn, &ids).await?;
        info!(
            phase = phase.label(),
            placed = outcome.placed,
            balance = %outcome.balance,
            "phase committed"
        );
    }

    save_progress(&txn, &ctx.run_key, ctx.dt_ref, phase.number()).await?;
    txn.commit().await?;
    Ok(outcome)
}

/// Soft-deletes the live limit rows of `criterion` and writes one per share line.
pub(crate) async fn write_limits<C>(
    db: &C,
    edital_id: i32,
    period_id: i32,
    criterion: i32,
    apuration_date: NaiveDate,
    table: &ShareTable,
    total_balance: Decimal,
) -> Result<()>
where
    C: ConnectionTrait,
{
    let now = Utc::now().naive_utc();
    Limit::update_many()
        .col_expr(limit::Column::DeletedAt, Expr::value(now))
        .filter(limit::Column::EditalId.eq(edital_id))
        .filter(limit::Column::PeriodId.eq(period_id))
        .filter(limit::Column::Criterion.eq(criterion))
        .filter(limit::Column::DeletedAt.is_null())
        .exec(db)
        .await?;

    let rows = table.lines.iter().map(|line| limit::ActiveModel {
        edital_id: Set(edital_id),
        period_id: Set(period_id),
        agency_id: Set(line.agency_id),
        criterion: Set(criterion),
        max_count: Set(line.count),
        max_value: Set(trunc2(apply_percent(total_balance, line.percent))),
        final_percent: Set(line.percent),
        revenue: Set(line.revenue),
        apuration_date: Set(apuration_date),
        created_at: Set(now),
        ..Default::default()
    });
    if !table.lines.is_empty() {
        Limit::insert_many(rows).exec(db).await?;
    }
    Ok(())
}

/// Soft-deletes the snapshot rows at `dt_ref` and writes `(agency, saldo, percent)` rows.
pub(crate) async fn write_snapshot<C>(
    db: &C,
    edital_id: i32,
    period_id: i32,
    dt_ref: NaiveDate,
    lines: &[(i32, Decimal, Decimal)],
) -> Result<()>
where
    C: ConnectionTrait,
{
    let now = Utc::now().naive_utc();
    ShareSnapshot::update_many()
        .col_expr(share_snapshot::Column::DeletedAt, Expr::value(now))
        .filter(share_snapshot::Column::EditalId.eq(edital_id))
        .filter(share_snapshot::Column::PeriodId.eq(period_id))
        .filter(share_snapshot::Column::DtRef.eq(dt_ref))
        .filter(share_snapshot::Column::DeletedAt.is_null())
        .exec(db)
        .await?;

    if lines.is_empty() {
        return Ok(());
    }
    let rows = lines.iter().map(|(agency, saldo, percent)| share_snapshot::ActiveModel {
        dt_ref: Set(dt_ref),
        edital_id: Set(edital_id),
        period_id: Set(period_id),
        agency_id: Set(*agency),
        saldo_devedor: Set(*saldo),
        percent: Set(*percent),
        created_at: Set(now),
        ..Default::default()
    });
    ShareSnapshot::insert_many(rows).exec(db).await?;
    Ok(())
}

/// Checks that every selected contract was placed by this run.
pub(crate) async fn ensure_all_placed<C>(db: &C, rows: &[distribution::Model]) -> Result<()>
where
    C: ConnectionTrait,
{
    let selected = eligibility::selected_count(db).await?;
    let leftover = eligibility::remaining(db).await?.len();
    let placed = u64::try_from(rows.len()).unwrap_or(u64::MAX);
    if leftover > 0 || placed != selected {
        return Err(Error::SumInvariant {
            what: "distributed contracts".to_string(),
            expected: Decimal::from(selected),
            actual: Decimal::from(placed),
        });
    }
    Ok(())
}

async fn select_and_limit(
    db: &DatabaseConnection,
    ctx: &RunContext,
    period: &PeriodModel,
    settings: &Settings,
) -> Result<eligibility::SelectionSummary> {
    let txn = db.begin().await?;

    let summary =
        eligibility::select_distributable(&txn, ctx.edital_id, ctx.period_id, &settings.eligibility)
            .await?;

    let ids: Vec<i32> = ctx.roster.iter().map(|e| e.agency_id).collect();
    let revenues = roster::prior_revenues(&txn, period, &ids).await?;
    let standings: Vec<Standing> = ctx
        .roster
        .iter()
        .map(|e| {
            let revenue = revenues.get(&e.agency_id).copied().unwrap_or_default();
            Standing {
                agency_id: e.agency_id,
                condition: e.condition,
                weight: revenue,
                revenue,
            }
        })
        .collect();

    let total = i64::try_from(summary.distributable).unwrap_or(i64::MAX);
    let table = shares::compute_shares(&standings, total)?;
    debug!(regime = ?table.regime, agencies = table.lines.len(), "shares computed");

    write_limits(
        &txn,
        ctx.edital_id,
        ctx.period_id,
        ctx.limit_criterion,
        ctx.dt_ref,
        &table,
        summary.total_balance,
    )
    .await?;
    save_progress(&txn, &ctx.run_key, ctx.dt_ref, 0).await?;
    txn.commit().await?;
    Ok(summary)
}

async fn finalize_distribution(
    db: &DatabaseConnection,
    ctx: &RunContext,
) -> Result<(usize, Vec<AgencyOutcome>)> {
    let txn = db.begin().await?;
    let rows = run_rows(&txn, ctx).await?;
    ensure_all_placed(&txn, &rows).await?;

    let mut limits = run_limits(&txn, ctx).await?;
    limits.sort_by(|a, b| {
        b.final_percent
            .cmp(&a.final_percent)
            .then_with(|| a.agency_id.cmp(&b.agency_id))
    });
    let mut allotments: Vec<Allotment<i32>> = limits
        .iter()
        .map(|l| Allotment::new(l.agency_id, Decimal::from(l.max_count)))
        .collect();
    balance_to_target(
        &mut allotments,
        Decimal::from(rows.len()),
        Decimal::ONE,
        "limit max_count",
    )?;
    ensure_sum(
        limits.iter().map(|l| l.final_percent),
        Decimal::ONE_HUNDRED,
        "limit final_percent",
    )?;

    let realized = realized_by_agency(&rows);
    let now = Utc::now().naive_utc();
    let mut outcomes = Vec::with_capacity(limits.len());
    let mut snapshot = Vec::with_capacity(limits.len());

    for (row, allotment) in limits.into_iter().zip(&allotments) {
        let max_count = allotment.value.to_i64().unwrap_or(row.max_count);
        let (count, balance) = realized.get(&row.agency_id).copied().unwrap_or_default();

        outcomes.push(AgencyOutcome {
            agency_id: row.agency_id,
            percent: row.final_percent,
            max_count,
            realized: count,
            balance,
        });
        snapshot.push((row.agency_id, balance, row.final_percent));

        if max_count != row.max_count {
            let mut active: limit::ActiveModel = row.into();
            active.max_count = Set(max_count);
            active.updated_at = Set(Some(now));
            active.update(&txn).await?;
        }
    }

    write_snapshot(&txn, ctx.edital_id, ctx.period_id, ctx.dt_ref, &snapshot).await?;
    clear_progress(&txn, &ctx.run_key).await?;
    txn.commit().await?;

    outcomes.sort_by_key(|o| o.agency_id);
    Ok((rows.len(), outcomes))
}

/// Runs the initial distribution of `(edital, period)` at `dt_ref`.
///
/// Selects the distributable set, computes shares from prior-period revenue
/// and writes the limits, then runs the five phases and balances the limits to
/// what was actually placed. The run ends by writing the share snapshot at the
/// reference date. A second run at the same date only handles the contracts of
/// its own selection.
///
/// If an earlier invocation left committed phases behind, the run resumes
/// after the last of them, keeping that invocation's reference date.
///
/// # Errors
/// [`Error::EmptyUniverse`] when nothing qualifies, with nothing written;
/// [`Error::RosterInsufficient`] when no agency can receive;
/// [`Error::SumInvariant`] or [`Error::ContractCollision`] when a phase or the
/// final balancing breaks an exact-sum rule, rolling that step back.
#[instrument(skip(db, settings))]
pub async fn run_distribution(
    db: &DatabaseConnection,
    edital_id: i32,
    period_id: i32,
    dt_ref: NaiveDate,
    settings: &Settings,
) -> Result<DistributionReport> {
    let period = roster::load_period(db, edital_id, period_id).await?;
    let run_roster = roster::load_roster(db, edital_id, period_id).await?;
    roster::receiving(&run_roster, edital_id, period_id)?;

    let run_key = distribution_key(edital_id, period_id);
    let progress = load_progress(db, &run_key).await?;

    let mut ctx = RunContext {
        edital_id,
        period_id,
        dt_ref,
        limit_criterion: criteria::INITIAL_DISTRIBUTION_LIMIT,
        criterion_override: None,
        roster: run_roster,
        anchors: Anchors::PlacedByAgreement,
        run_key,
    };

    let (resumed_after, selection) = match progress {
        Some((saved, last)) => {
            if saved != dt_ref {
                warn!(%saved, requested = %dt_ref, "resuming unfinished run with its own reference date");
            }
            ctx.dt_ref = saved;
            info!(last_phase = last, "resuming distribution");
            (Some(last), None)
        }
        None => {
            let summary = select_and_limit(db, &ctx, &period, settings).await?;
            (None, Some(summary))
        }
    };

    let last = resumed_after.unwrap_or(0);
    let mut phases = Vec::new();
    for phase in Phase::ALL.into_iter().filter(|p| p.number() > last) {
        phases.push(execute_phase(db, &ctx, phase).await?);
    }

    let (distributed, agencies) = finalize_distribution(db, &ctx).await?;
    info!(distributed, agencies = agencies.len(), "distribution complete");

    Ok(DistributionReport {
        edital_id,
        period_id,
        dt_ref: ctx.dt_ref,
        resumed_after,
        selection,
        phases,
        distributed,
        agencies,
    })
}

/// Human-readable summary of a distribution run.
#[must_use]
pub fn format_distribution_report(report: &DistributionReport) -> String {
    let mut out = format!(
        "Distribution edital {} period {} at {}\n",
        report.edital_id, report.period_id, report.dt_ref
    );
    if let Some(last) = report.resumed_after {
        let _ = writeln!(out, "  resumed after phase {last}");
    }
    if let Some(sel) = &report.selection {
        let _ = writeln!(
            out,
            "  selected {} (balance {}), non-distributable {}, suspended {}, excluded carrier {}",
            sel.distributable,
            sel.total_balance,
            sel.non_distributable,
            sel.suspended,
            sel.excluded_carrier
        );
    }
    for p in &report.phases {
        let _ = writeln!(
            out,
            "  phase {} {:<28} {:>8} contracts {:>18}",
            p.phase.number(),
            p.phase.label(),
            p.placed,
            p.balance
        );
    }
    let _ = writeln!(out, "  distributed {}", report.distributed);
    for a in &report.agencies {
        let _ = writeln!(
            out,
            "  agency {:>6} {:>6}% max {:>8} realized {:>8} balance {:>18}",
            a.agency_id, a.percent, a.max_count, a.realized, a.balance
        );
    }
    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::entities::NonDistributable;
    use crate::test_utils::*;

    fn row(contract_id: i64, cpf: &str, balance: &str) -> distributable::Model {
        distributable::Model {
            id: i32::try_from(contract_id).unwrap(),
            contract_id,
            cpf_cnpj: cpf.to_string(),
            balance: dec(balance),
            created_at: Utc::now().naive_utc(),
            updated_at: None,
            deleted_at: None,
        }
    }

    fn target(agency_id: i32, percent: &str, max_count: i64, placed: i64) -> AgencyTarget {
        AgencyTarget {
            agency_id,
            percent: dec(percent),
            max_count,
            placed,
            placed_balance: Decimal::ZERO,
        }
    }

    #[test]
    fn test_phase_criteria() {
        let codes: Vec<i32> = Phase::ALL.iter().map(|p| p.criterion()).collect();
        assert_eq!(codes, vec![1, 3, 6, 6, 4]);
        assert_eq!(Phase::Residual.number(), 5);
    }

    #[test]
    fn test_least_filled_by_ratio_then_share() {
        let ledger = Ledger::new(vec![
            target(1, "50.00", 10, 5),
            target(2, "30.00", 6, 2),
            target(3, "20.00", 4, 2),
        ]);
        assert_eq!(ledger.least_filled(), Some(2));

        let tied = Ledger::new(vec![target(5, "20.00", 4, 1), target(4, "40.00", 8, 2)]);
        assert_eq!(tied.least_filled(), Some(4));

        let zero = Ledger::new(vec![target(1, "0.00", 0, 0), target(2, "100.00", 3, 3)]);
        assert_eq!(zero.least_filled(), Some(2));
    }

    #[test]
    fn test_round_robin_over_receivers() {
        let remaining = vec![row(1, "a", "1"), row(2, "b", "1"), row(3, "c", "1"), row(4, "d", "1")];
        let holdings: HashMap<i64, i32> = [(1, 9), (2, 9), (3, 10), (4, 9)].into_iter().collect();

        let placed = plan_agreements_decredentialed(&remaining, &holdings, &[10, 20]);
        let got: Vec<(i64, i32)> = placed.iter().map(|p| (p.contract_id, p.agency_id)).collect();
        assert_eq!(got, vec![(1, 10), (2, 20), (4, 10)]);
    }

    #[test]
    fn test_groups_go_whole_largest_first() {
        let rows: Vec<draggable::Model> = [(1, "x", "10"), (2, "x", "10"), (3, "y", "5"), (4, "y", "5"), (5, "y", "5")]
            .into_iter()
            .map(|(id, cpf, bal)| draggable::Model {
                id,
                contract_id: i64::from(id),
                cpf_cnpj: cpf.to_string(),
                balance: dec(bal),
                created_at: Utc::now().naive_utc(),
                updated_at: None,
                deleted_at: None,
            })
            .collect();
        let mut ledger = Ledger::new(vec![target(1, "60.00", 3, 0), target(2, "40.00", 2, 0)]);

        let placed = plan_drag_without_agreement(&rows, &mut ledger);
        let got: Vec<(i64, i32)> = placed.iter().map(|p| (p.contract_id, p.agency_id)).collect();
        assert_eq!(got, vec![(3, 1), (4, 1), (5, 1), (1, 2), (2, 2)]);
        assert_eq!(ledger.targets()[0].placed, 3);
    }

    #[test]
    fn test_residual_fills_toward_targets() {
        let remaining: Vec<_> = (1..=10).map(|id| row(id, &format!("d{id}"), "1")).collect();
        let mut ledger = Ledger::new(vec![
            target(1, "60.00", 6, 0),
            target(2, "30.00", 3, 0),
            target(3, "10.00", 1, 0),
        ]);
        let placed = plan_residual(&remaining, &mut ledger);
        let counts: Vec<i64> = ledger.targets().iter().map(|t| t.placed).collect();
        assert_eq!(placed.len(), 10);
        assert_eq!(counts, vec![6, 3, 1]);
    }

    #[test]
    fn test_anchor_prefers_majority_then_lowest_id() {
        let anchors = anchor_agencies(vec![
            ("a".to_string(), 5),
            ("a".to_string(), 3),
            ("a".to_string(), 5),
            ("b".to_string(), 7),
            ("b".to_string(), 2),
        ]);
        assert_eq!(anchors["a"], 5);
        assert_eq!(anchors["b"], 2);
    }

    #[tokio::test]
    async fn test_run_state_round_trip() -> Result<()> {
        let db = setup_test_db().await?;
        assert!(load_progress(&db, "k").await?.is_none());
        save_progress(&db, "k", date("2025-01-15"), 2).await?;
        save_progress(&db, "k", date("2025-01-15"), 3).await?;
        assert_eq!(load_progress(&db, "k").await?, Some((date("2025-01-15"), 3)));
        clear_progress(&db, "k").await?;
        assert!(load_progress(&db, "k").await?.is_none());
        Ok(())
    }

    /// Three continuing agencies with prior revenues 600/300/100.
    async fn seed_three_agencies(
        db: &DatabaseConnection,
    ) -> Result<(crate::entities::EditalModel, crate::entities::PeriodModel)> {
        create_edital_period(db, "2024-07-01", "2024-12-31").await?;
        let (edital, period) = create_edital_period(db, "2025-01-01", "2025-07-31").await?;
        for (id, revenue) in [(1, "600"), (2, "300"), (3, "100")] {
            add_agency(db, &edital, &period, id, AgencyCondition::Continuing).await?;
            add_revenue(db, id, "2024-09-01", revenue).await?;
        }
        Ok((edital, period))
    }

    #[tokio::test]
    async fn test_all_continuing_run_matches_shares() -> Result<()> {
        let db = setup_test_db().await?;
        let (edital, period) = seed_three_agencies(&db).await?;
        for id in 1..=1000 {
            create_contract(&db, id, &format!("{id:011}"), "100.00", None).await?;
        }

        let report =
            run_distribution(&db, edital.id, period.id, date("2025-01-15"), &Settings::default())
                .await?;

        assert_eq!(report.distributed, 1000);
        let realized: Vec<i64> = report.agencies.iter().map(|a| a.realized).collect();
        assert_eq!(realized, vec![600, 300, 100]);
        let percents: Vec<Decimal> = report.agencies.iter().map(|a| a.percent).collect();
        assert_eq!(percents, vec![dec("60.00"), dec("30.00"), dec("10.00")]);

        let limits = Limit::find().all(&db).await?;
        assert_eq!(limits.iter().map(|l| l.max_count).sum::<i64>(), 1000);
        assert_eq!(sum(limits.iter().map(|l| l.final_percent)), dec("100.00"));

        let snapshot = ShareSnapshot::find().all(&db).await?;
        assert_eq!(snapshot.len(), 3);
        assert_eq!(sum(snapshot.iter().map(|s| s.saldo_devedor)), dec("100000.00"));
        assert!(load_progress(&db, &distribution_key(edital.id, period.id)).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_agreement_drags_debtor() -> Result<()> {
        let db = setup_test_db().await?;
        let (edital, period) = seed_three_agencies(&db).await?;
        // Debtor D: c1 has an active agreement at agency 3, c2 and c3 do not
        create_contract(&db, 1, "D", "10.00", Some(3)).await?;
        add_agreement(&db, 1, 3, AgreementState::Active).await?;
        create_contract(&db, 2, "D", "20.00", None).await?;
        create_contract(&db, 3, "D", "30.00", Some(1)).await?;
        for id in 4..=10 {
            create_contract(&db, id, &format!("S{id}"), "5.00", None).await?;
        }

        let report =
            run_distribution(&db, edital.id, period.id, date("2025-01-15"), &Settings::default())
                .await?;

        let rows = Distribution::find()
            .filter(distribution::Column::CpfCnpj.eq("D"))
            .order_by_asc(distribution::Column::ContractId)
            .all(&db)
            .await?;
        let placed: Vec<(i64, i32, i32)> =
            rows.iter().map(|r| (r.contract_id, r.agency_id, r.criterion)).collect();
        assert_eq!(placed, vec![(1, 3, 1), (2, 3, 6), (3, 3, 6)]);
        assert_eq!(report.phases[0].placed, 1);
        assert_eq!(report.phases[2].placed, 2);
        assert_eq!(report.distributed, 10);
        Ok(())
    }

    #[tokio::test]
    async fn test_decredentialed_agreements_and_drag_groups() -> Result<()> {
        let db = setup_test_db().await?;
        let (edital, period) = seed_three_agencies(&db).await?;
        add_agency(&db, &edital, &period, 9, AgencyCondition::Decredentialed).await?;

        create_contract(&db, 1, "A", "10.00", Some(9)).await?;
        add_agreement(&db, 1, 9, AgreementState::Active).await?;
        create_contract(&db, 2, "B", "10.00", Some(9)).await?;
        add_agreement(&db, 2, 9, AgreementState::Active).await?;
        // A broken agreement is not consequential
        create_contract(&db, 3, "C", "10.00", Some(9)).await?;
        add_agreement(&db, 3, 9, AgreementState::Broken).await?;
        for id in 4..=6 {
            create_contract(&db, id, "G", "1.00", None).await?;
        }
        for id in 7..=12 {
            create_contract(&db, id, &format!("S{id}"), "1.00", None).await?;
        }

        run_distribution(&db, edital.id, period.id, date("2025-01-15"), &Settings::default())
            .await?;

        let rows = Distribution::find()
            .order_by_asc(distribution::Column::Id)
            .all(&db)
            .await?;
        assert_eq!(rows.len(), 12);
        assert!(rows.iter().all(|r| r.agency_id != 9));

        let phase2: Vec<i32> = rows
            .iter()
            .filter(|r| r.criterion == criteria::ACORDO_DESCREDENCIADA)
            .map(|r| r.agency_id)
            .collect();
        assert_eq!(phase2, vec![1, 2]);

        let group: HashSet<i32> = rows
            .iter()
            .filter(|r| r.cpf_cnpj == "G")
            .map(|r| r.agency_id)
            .collect();
        assert_eq!(group.len(), 1);

        let ids: HashSet<i64> = rows.iter().map(|r| r.contract_id).collect();
        assert_eq!(ids.len(), 12);
        Ok(())
    }

    #[tokio::test]
    async fn test_every_contract_is_placed_or_residue() -> Result<()> {
        let db = setup_test_db().await?;
        let (edital, period) = seed_three_agencies(&db).await?;
        for id in 1..=20 {
            create_contract(&db, id, &format!("{}", id % 7), &format!("{id}.50"), None).await?;
        }
        let settings = Settings {
            eligibility: crate::config::settings::EligibilitySettings {
                min_balance: Some(dec("5.00")),
                ..Default::default()
            },
            ..Settings::default()
        };

        run_distribution(&db, edital.id, period.id, date("2025-01-15"), &settings).await?;

        let placed = Distribution::find().count(&db).await?;
        let residue = NonDistributable::find().count(&db).await?;
        assert_eq!(residue, 4);
        assert_eq!(placed + residue, 20);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_universe_writes_nothing() -> Result<()> {
        let db = setup_test_db().await?;
        let (edital, period) = seed_three_agencies(&db).await?;
        create_contract(&db, 1, "A", "10.00", None).await?;
        add_suspension(&db, 1).await?;
        let limits_before = Limit::find().all(&db).await?;

        let result =
            run_distribution(&db, edital.id, period.id, date("2025-01-15"), &Settings::default())
                .await;

        assert!(matches!(result, Err(Error::EmptyUniverse { .. })));
        assert_eq!(result.unwrap_err().exit_code(), 1);
        assert_eq!(Distribution::find().count(&db).await?, 0);
        assert_eq!(Limit::find().all(&db).await?, limits_before);
        assert!(load_progress(&db, &distribution_key(edital.id, period.id)).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_resume_after_committed_phase() -> Result<()> {
        let db = setup_test_db().await?;
        let (edital, period) = seed_three_agencies(&db).await?;
        create_contract(&db, 1, "A", "10.00", Some(2)).await?;
        add_agreement(&db, 1, 2, AgreementState::Active).await?;
        for id in 2..=10 {
            create_contract(&db, id, &format!("S{id}"), "1.00", None).await?;
        }

        // Simulate an invocation that stopped after phase 1
        let roster = roster::load_roster(&db, edital.id, period.id).await?;
        let ctx = RunContext {
            edital_id: edital.id,
            period_id: period.id,
            dt_ref: date("2025-01-15"),
            limit_criterion: criteria::INITIAL_DISTRIBUTION_LIMIT,
            criterion_override: None,
            roster,
            anchors: Anchors::PlacedByAgreement,
            run_key: distribution_key(edital.id, period.id),
        };
        let p = roster::load_period(&db, edital.id, period.id).await?;
        select_and_limit(&db, &ctx, &p, &Settings::default()).await?;
        execute_phase(&db, &ctx, Phase::AgreementsContinuing).await?;

        let report =
            run_distribution(&db, edital.id, period.id, date("2025-02-01"), &Settings::default())
                .await?;

        assert_eq!(report.resumed_after, Some(1));
        assert_eq!(report.dt_ref, date("2025-01-15"));
        assert_eq!(report.phases.len(), 4);
        assert_eq!(report.distributed, 10);
        let dates: HashSet<NaiveDate> =
            Distribution::find().all(&db).await?.iter().map(|r| r.dt_ref).collect();
        assert_eq!(dates.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_same_day_rerun_places_only_new_contracts() -> Result<()> {
        let db = setup_test_db().await?;
        let (edital, period) = seed_three_agencies(&db).await?;
        for id in 1..=10 {
            create_contract(&db, id, &format!("{id:011}"), "100.00", None).await?;
        }
        let dt_ref = date("2025-01-15");
        run_distribution(&db, edital.id, period.id, dt_ref, &Settings::default()).await?;

        for id in 11..=15 {
            create_contract(&db, id, &format!("{id:011}"), "100.00", None).await?;
        }
        let report = run_distribution(&db, edital.id, period.id, dt_ref, &Settings::default())
            .await?;

        assert_eq!(report.resumed_after, None);
        assert_eq!(report.distributed, 5);
        assert_eq!(report.agencies.iter().map(|a| a.realized).sum::<i64>(), 5);
        assert_eq!(report.agencies.iter().map(|a| a.max_count).sum::<i64>(), 5);
        assert_eq!(Distribution::find().count(&db).await?, 15);
        let live_limits = Limit::find()
            .filter(limit::Column::DeletedAt.is_null())
            .all(&db)
            .await?;
        assert_eq!(live_limits.iter().map(|l| l.max_count).sum::<i64>(), 5);
        assert!(load_progress(&db, &distribution_key(edital.id, period.id)).await?.is_none());

        // Nothing left to place on a third call
        let again = run_distribution(&db, edital.id, period.id, dt_ref, &Settings::default()).await;
        assert!(matches!(again, Err(Error::EmptyUniverse { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_collision_is_rejected() -> Result<()> {
        let db = setup_test_db().await?;
        let (edital, period) = create_edital_period(&db, "2025-01-01", "2025-07-31").await?;
        add_distribution(&db, &edital, &period, "2025-01-15", 1, 1, 4).await?;
        let ctx = RunContext {
            edital_id: edital.id,
            period_id: period.id,
            dt_ref: date("2025-01-15"),
            limit_criterion: criteria::INITIAL_DISTRIBUTION_LIMIT,
            criterion_override: None,
            roster: Vec::new(),
            anchors: Anchors::PlacedByAgreement,
            run_key: "k".to_string(),
        };
        let placement = Placement {
            contract_id: 1,
            agency_id: 2,
            cpf_cnpj: "x".to_string(),
            balance: dec("1"),
        };

        let err = ensure_no_collision(&db, &ctx, &[placement]).await.unwrap_err();
        assert!(matches!(err, Error::ContractCollision { contract_id: 1 }));
        assert_eq!(err.exit_code(), 2);
        Ok(())
    }
}
