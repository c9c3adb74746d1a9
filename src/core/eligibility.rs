//! Eligibility selector - fills the distributable and draggable working sets.
//!
//! A contract is distributable when its credit is active, no live judicial
//! suspension exists, its balance is positive, it is not held by an excluded
//! carrier and it has not been distributed yet in the `(edital, period)`.
//! Contracts that pass those checks but match a configured exclusion rule are
//! recorded as non-distributable residue instead, so nothing is silently dropped.
//!
//! Working-set rows are never hard-deleted while a run is in progress: the
//! pipeline stamps `deleted_at` on the rows it places.

use crate::{
    config::settings::EligibilitySettings,
    entities::{
        Contract, Distributable, Distribution, Draggable, JudicialSuspension, NonDistributable,
        contract, distributable, distribution, draggable, judicial_suspension, non_distributable,
    },
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, QuerySelect, Set, prelude::*, sea_query::Expr};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

const CHUNK: usize = 500;

/// Counts produced by one selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSummary {
    /// Contracts placed in the distributable set
    pub distributable: usize,
    /// Contracts recorded as non-distributable residue
    pub non_distributable: usize,
    /// Contracts skipped for a judicial suspension
    pub suspended: usize,
    /// Contracts skipped because an excluded carrier holds them
    pub excluded_carrier: usize,
    /// Contracts skipped because the period already distributed them
    pub already_distributed: usize,
    /// Sum of the balances in the distributable set
    pub total_balance: Decimal,
}

/// A contract entering a working set.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    contract_id: i64,
    cpf_cnpj: String,
    balance: Decimal,
}

/// Returns why a configured rule holds `contract` back, if one does.
#[must_use]
pub fn exclusion_reason(contract: &contract::Model, rules: &EligibilitySettings) -> Option<String> {
    if let Some(min) = rules.min_balance {
        if contract.outstanding_balance < min {
            return Some(format!("SALDO ABAIXO DE {min}"));
        }
    }
    rules
        .excluded_products
        .iter()
        .find(|p| p.eq_ignore_ascii_case(contract.product.trim()))
        .map(|p| format!("PRODUTO EXCLUIDO: {p}"))
}

/// Empties the distributable and draggable sets.
pub async fn clear_working_sets<C>(db: &C) -> Result<()>
where
    C: ConnectionTrait,
{
    Distributable::delete_many().exec(db).await?;
    Draggable::delete_many().exec(db).await?;
    Ok(())
}

async fn insert_distributable<C>(db: &C, entries: &[Entry]) -> Result<()>
where
    C: ConnectionTrait,
{
    let now = Utc::now().naive_utc();
    for chunk in entries.chunks(CHUNK) {
        let rows = chunk.iter().map(|e| distributable::ActiveModel {
            contract_id: Set(e.contract_id),
            cpf_cnpj: Set(e.cpf_cnpj.clone()),
            balance: Set(e.balance),
            created_at: Set(now),
            ..Default::default()
        });
        Distributable::insert_many(rows).exec(db).await?;
    }
    Ok(())
}

/// Contract ids already distributed in the `(edital, period)`.
pub async fn distributed_contract_ids<C>(db: &C, edital_id: i32, period_id: i32) -> Result<HashSet<i64>>
where
    C: ConnectionTrait,
{
    let ids: Vec<i64> = Distribution::find()
        .select_only()
        .column(distribution::Column::ContractId)
        .filter(distribution::Column::EditalId.eq(edital_id))
        .filter(distribution::Column::PeriodId.eq(period_id))
        .filter(distribution::Column::DeletedAt.is_null())
        .into_tuple()
        .all(db)
        .await?;
    Ok(ids.into_iter().collect())
}

/// Populates the distributable set for a standard run.
///
/// # Errors
/// Returns [`Error::EmptyUniverse`] before writing anything when no contract qualifies.
pub async fn select_distributable<C>(
    db: &C,
    edital_id: i32,
    period_id: i32,
    rules: &EligibilitySettings,
) -> Result<SelectionSummary>
where
    C: ConnectionTrait,
{
    let suspended: HashSet<i64> = JudicialSuspension::find()
        .filter(judicial_suspension::Column::DeletedAt.is_null())
        .all(db)
        .await?
        .into_iter()
        .map(|s| s.contract_id)
        .collect();
    let distributed = distributed_contract_ids(db, edital_id, period_id).await?;

    let contracts = Contract::find()
        .filter(contract::Column::CreditStatus.eq(contract::CREDIT_STATUS_ACTIVE))
        .filter(contract::Column::DeletedAt.is_null())
        .order_by_asc(contract::Column::ContractId)
        .all(db)
        .await?;

    let mut summary = SelectionSummary::default();
    let mut entries = Vec::new();
    let mut residue = Vec::new();

    for c in contracts {
        if c.outstanding_balance <= Decimal::ZERO {
            continue;
        }
        if suspended.contains(&c.contract_id) {
            summary.suspended += 1;
            continue;
        }
        if distributed.contains(&c.contract_id) {
            summary.already_distributed += 1;
            continue;
        }
        if c
            .current_agency_id
            .is_some_and(|a| rules.excluded_agencies.contains(&a))
        {
            summary.excluded_carrier += 1;
            continue;
        }

        let entry = Entry {
            contract_id: c.contract_id,
            cpf_cnpj: c.debtor_cpf_cnpj.clone(),
            balance: c.outstanding_balance,
        };
        match exclusion_reason(&c, rules) {
            Some(reason) => residue.push((entry, reason)),
            None => entries.push(entry),
        }
    }

    if entries.is_empty() {
        warn!(
            edital_id,
            period_id,
            suspended = summary.suspended,
            already_distributed = summary.already_distributed,
            "no distributable contracts"
        );
        return Err(Error::EmptyUniverse {
            edital_id,
            period_id,
        });
    }

    clear_working_sets(db).await?;
    insert_distributable(db, &entries).await?;

    let now = Utc::now().naive_utc();
    NonDistributable::update_many()
        .col_expr(non_distributable::Column::DeletedAt, Expr::value(now))
        .filter(non_distributable::Column::EditalId.eq(edital_id))
        .filter(non_distributable::Column::PeriodId.eq(period_id))
        .filter(non_distributable::Column::DeletedAt.is_null())
        .exec(db)
        .await?;
    for chunk in residue.chunks(CHUNK) {
        let rows = chunk.iter().map(|(e, reason)| non_distributable::ActiveModel {
            edital_id: Set(edital_id),
            period_id: Set(period_id),
            contract_id: Set(e.contract_id),
            cpf_cnpj: Set(e.cpf_cnpj.clone()),
            balance: Set(e.balance),
            reason: Set(reason.clone()),
            created_at: Set(now),
            ..Default::default()
        });
        NonDistributable::insert_many(rows).exec(db).await?;
    }

    summary.distributable = entries.len();
    summary.non_distributable = residue.len();
    summary.total_balance = entries.iter().fold(Decimal::ZERO, |acc, e| acc + e.balance);

    info!(
        distributable = summary.distributable,
        non_distributable = summary.non_distributable,
        suspended = summary.suspended,
        excluded_carrier = summary.excluded_carrier,
        "distributable set selected"
    );
    Ok(summary)
}

/// Latest live distribution row per contract in the `(edital, period)`,
/// optionally only rows dated strictly before `before`.
pub async fn latest_holders<C>(
    db: &C,
    edital_id: i32,
    period_id: i32,
    before: Option<NaiveDate>,
) -> Result<HashMap<i64, distribution::Model>>
where
    C: ConnectionTrait,
{
    let mut query = Distribution::find()
        .filter(distribution::Column::EditalId.eq(edital_id))
        .filter(distribution::Column::PeriodId.eq(period_id))
        .filter(distribution::Column::DeletedAt.is_null());
    if let Some(before) = before {
        query = query.filter(distribution::Column::DtRef.lt(before));
    }

    let rows = query
        .order_by_asc(distribution::Column::DtRef)
        .order_by_asc(distribution::Column::Id)
        .all(db)
        .await?;

    let mut holders = HashMap::with_capacity(rows.len());
    for row in rows {
        holders.insert(row.contract_id, row);
    }
    Ok(holders)
}

/// Populates the distributable set with every contract the exiting agency holds.
///
/// The holder of a contract is the agency of its latest distribution row in the
/// period dated before `before`, or its operational current agency when the
/// period never distributed it. Status and suspension filters do not apply.
///
/// # Errors
/// Returns [`Error::EmptyUniverse`] before writing anything when the agency holds
/// no contracts.
pub async fn select_for_redistribution<C>(
    db: &C,
    edital_id: i32,
    period_id: i32,
    exiting_agency: i32,
    before: NaiveDate,
) -> Result<SelectionSummary>
where
    C: ConnectionTrait,
{
    let holders = latest_holders(db, edital_id, period_id, Some(before)).await?;
    let operational = Contract::find()
        .filter(contract::Column::CurrentAgencyId.eq(exiting_agency))
        .filter(contract::Column::DeletedAt.is_null())
        .all(db)
        .await?;

    let mut gathered: BTreeMap<i64, Entry> = BTreeMap::new();
    let mut moved_away = 0_usize;
    for c in operational {
        if holders
            .get(&c.contract_id)
            .is_some_and(|h| h.agency_id != exiting_agency)
        {
            moved_away += 1;
            continue;
        }
        gathered.insert(
            c.contract_id,
            Entry {
                contract_id: c.contract_id,
                cpf_cnpj: c.debtor_cpf_cnpj,
                balance: c.outstanding_balance,
            },
        );
    }
    let operational_count = gathered.len();

    for h in holders.values().filter(|h| h.agency_id == exiting_agency) {
        gathered.entry(h.contract_id).or_insert_with(|| Entry {
            contract_id: h.contract_id,
            cpf_cnpj: h.cpf_cnpj.clone(),
            balance: h.balance,
        });
    }

    debug!(
        exiting_agency,
        operational = operational_count,
        from_history = gathered.len() - operational_count,
        moved_away,
        "redistribution contracts gathered"
    );

    if gathered.is_empty() {
        warn!(exiting_agency, "agency holds no contracts to redistribute");
        return Err(Error::EmptyUniverse {
            edital_id,
            period_id,
        });
    }

    let entries: Vec<Entry> = gathered.into_values().collect();
    clear_working_sets(db).await?;
    insert_distributable(db, &entries).await?;

    info!(
        exiting_agency,
        contracts = entries.len(),
        "redistribution set selected"
    );
    Ok(SelectionSummary {
        distributable: entries.len(),
        total_balance: entries.iter().fold(Decimal::ZERO, |acc, e| acc + e.balance),
        ..SelectionSummary::default()
    })
}

/// Rebuilds the draggable set from the unplaced distributable rows whose
/// debtor owns two or more of them. Returns the number of rows inserted.
pub async fn select_draggable<C>(db: &C) -> Result<usize>
where
    C: ConnectionTrait,
{
    Draggable::delete_many().exec(db).await?;

    let mut by_debtor: BTreeMap<String, Vec<distributable::Model>> = BTreeMap::new();
    for row in remaining(db).await? {
        by_debtor.entry(row.cpf_cnpj.clone()).or_default().push(row);
    }

    let now = Utc::now().naive_utc();
    let rows: Vec<draggable::ActiveModel> = by_debtor
        .into_values()
        .filter(|group| group.len() > 1)
        .flatten()
        .map(|row| draggable::ActiveModel {
            contract_id: Set(row.contract_id),
            cpf_cnpj: Set(row.cpf_cnpj),
            balance: Set(row.balance),
            created_at: Set(now),
            ..Default::default()
        })
        .collect();

    let inserted = rows.len();
    for chunk in rows.chunks(CHUNK) {
        Draggable::insert_many(chunk.to_vec()).exec(db).await?;
    }
    debug!(inserted, "draggable set selected");
    Ok(inserted)
}

/// Unplaced distributable rows, by contract id.
pub async fn remaining<C>(db: &C) -> Result<Vec<distributable::Model>>
where
    C: ConnectionTrait,
{
    Distributable::find()
        .filter(distributable::Column::DeletedAt.is_null())
        .order_by_asc(distributable::Column::ContractId)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Unplaced draggable rows, by debtor then contract id.
pub async fn remaining_draggable<C>(db: &C) -> Result<Vec<draggable::Model>>
where
    C: ConnectionTrait,
{
    Draggable::find()
        .filter(draggable::Column::DeletedAt.is_null())
        .order_by_asc(draggable::Column::CpfCnpj)
        .order_by_asc(draggable::Column::ContractId)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Number of rows selected into the distributable set, placed or not.
pub async fn selected_count<C>(db: &C) -> Result<u64>
where
    C: ConnectionTrait,
{
    Distributable::find().count(db).await.map_err(Into::into)
}

/// Number and total balance of the rows selected into the distributable set.
pub async fn selected_totals<C>(db: &C) -> Result<(usize, Decimal)>
where
    C: ConnectionTrait,
{
    let rows = Distributable::find().all(db).await?;
    Ok((rows.len(), rows.iter().fold(Decimal::ZERO, |acc, r| acc + r.balance)))
}

/// Marks contracts as placed in both working sets.
pub async fn consume<C>(db: &C, contract_ids: &[i64]) -> Result<()>
where
    C: ConnectionTrait,
{
    let now = Utc::now().naive_utc();
    for chunk in contract_ids.chunks(CHUNK) {
        Distributable::update_many()
            .col_expr(distributable::Column::DeletedAt, Expr::value(now))
            .filter(distributable::Column::ContractId.is_in(chunk.iter().copied()))
            .filter(distributable::Column::DeletedAt.is_null())
            .exec(db)
            .await?;
        Draggable::update_many()
            .col_expr(draggable::Column::DeletedAt, Expr::value(now))
            .filter(draggable::Column::ContractId.is_in(chunk.iter().copied()))
            .filter(draggable::Column::DeletedAt.is_null())
            .exec(db)
            .await?;
    }
    Ok(())
}
