//! Plain-text export files for downstream ingest.
//!
//! Rows are sorted by contract id and written with `\n` line endings.

use crate::{
    core::{criteria, roster},
    entities::{Contract, ContractModel, Distribution, DistributionModel, contract, distribution},
    errors::{Error, Result},
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, prelude::*};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

const DISTRIBUTION_HEADER: &str = "fkContratoSISCTR;NOVA_EMPRESA";
const REDISTRIBUTION_HEADER: &str = "fkContratoSISCTR;ID_EMPRESA";
const LOOKUP_CHUNK: usize = 500;

/// A file written by an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    /// Full path of the file
    pub path: PathBuf,
    /// Data rows, header and total lines excluded
    pub rows: usize,
}

fn stamp(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

fn write_file(dir: &Path, name: &str, body: &str, rows: usize) -> Result<ExportSummary> {
    fs::create_dir_all(dir)?;
    let path = dir.join(name);
    fs::write(&path, body)?;
    info!(path = %path.display(), rows, "export written");
    Ok(ExportSummary { path, rows })
}

fn semicolon_file(header: &str, rows: &[DistributionModel]) -> String {
    let mut body = String::with_capacity(header.len() + rows.len() * 16);
    body.push_str(header);
    body.push('\n');
    for row in rows {
        let _ = writeln!(body, "{};{}", row.contract_id, row.agency_id);
    }
    body
}

fn live_rows(edital_id: i32, period_id: i32) -> Select<Distribution> {
    Distribution::find()
        .filter(distribution::Column::EditalId.eq(edital_id))
        .filter(distribution::Column::PeriodId.eq(period_id))
        .filter(distribution::Column::DeletedAt.is_null())
}

/// Latest reference date of the initial distribution of a period.
async fn initial_dt_ref<C>(db: &C, edital_id: i32, period_id: i32) -> Result<NaiveDate>
where
    C: ConnectionTrait,
{
    live_rows(edital_id, period_id)
        .filter(distribution::Column::Criterion.is_in(criteria::INITIAL_DISTRIBUTION_CODES))
        .order_by_desc(distribution::Column::DtRef)
        .one(db)
        .await?
        .map(|row| row.dt_ref)
        .ok_or(Error::EmptyUniverse { edital_id, period_id })
}

/// Writes `DISTRIBUICAO_COBRANCA_YYYYMMDD_TI.TXT` for the initial distribution.
///
/// Uses the latest initial run of the period unless `dt_ref` is given.
#[instrument(skip(db, dir))]
pub async fn export_distribution<C>(
    db: &C,
    edital_id: i32,
    period_id: i32,
    dt_ref: Option<NaiveDate>,
    dir: &Path,
) -> Result<ExportSummary>
where
    C: ConnectionTrait,
{
    let dt_ref = match dt_ref {
        Some(d) => d,
        None => initial_dt_ref(db, edital_id, period_id).await?,
    };
    let rows = live_rows(edital_id, period_id)
        .filter(distribution::Column::DtRef.eq(dt_ref))
        .filter(distribution::Column::Criterion.is_in(criteria::INITIAL_DISTRIBUTION_CODES))
        .order_by_asc(distribution::Column::ContractId)
        .all(db)
        .await?;

    let name = format!("DISTRIBUICAO_COBRANCA_{}_TI.TXT", stamp(dt_ref));
    write_file(dir, &name, &semicolon_file(DISTRIBUTION_HEADER, &rows), rows.len())
}

/// Writes `REDISTRIBUICAO_COBRANCA_{agency}_{YYYYMMDD}_TI.TXT` for the exit of
/// `agency_id`, dated with its recorded exit date.
///
/// # Errors
/// [`Error::AgencyNotEligible`] when the agency has no exit recorded in the period.
#[instrument(skip(db, dir))]
pub async fn export_redistribution<C>(
    db: &C,
    edital_id: i32,
    period_id: i32,
    agency_id: i32,
    dir: &Path,
) -> Result<ExportSummary>
where
    C: ConnectionTrait,
{
    let exit_date = roster::load_roster(db, edital_id, period_id)
        .await?
        .into_iter()
        .find(|entry| entry.agency_id == agency_id)
        .and_then(|entry| entry.exit_date)
        .ok_or_else(|| Error::AgencyNotEligible {
            agency_id,
            reason: "no exit recorded in this period".to_string(),
        })?;

    let rows = live_rows(edital_id, period_id)
        .filter(distribution::Column::DtRef.eq(exit_date))
        .filter(distribution::Column::Criterion.gte(criteria::FIRST_REDISTRIBUTION))
        .order_by_asc(distribution::Column::ContractId)
        .all(db)
        .await?;

    let name = format!("REDISTRIBUICAO_COBRANCA_{agency_id}_{}_TI.TXT", stamp(exit_date));
    write_file(dir, &name, &semicolon_file(REDISTRIBUTION_HEADER, &rows), rows.len())
}

/// Left-aligns `value` in `width` columns, cutting what does not fit.
fn fit(value: &str, width: usize) -> String {
    let cut: String = value.chars().take(width).collect();
    format!("{cut:<width$}")
}

fn analytical_line(
    row: &DistributionModel,
    contract: Option<&ContractModel>,
    short_name: &str,
    description: &str,
) -> String {
    let (product, contract_no, days_overdue) = contract.map_or(("", "", 0), |c| {
        (c.product.as_str(), c.contract_no.as_str(), c.days_overdue)
    });
    format!(
        "{}{}{:>6}{}{}{:>18}{}{:>6}",
        fit(product, 10),
        fit(short_name, 15),
        row.agency_id,
        fit(contract_no, 20),
        fit(&row.cpf_cnpj, 14),
        format!("{:.2}", row.balance),
        fit(description, 30),
        days_overdue,
    )
}

async fn contracts_by_id<C>(db: &C, ids: &[i64]) -> Result<HashMap<i64, ContractModel>>
where
    C: ConnectionTrait,
{
    let mut found = HashMap::with_capacity(ids.len());
    for chunk in ids.chunks(LOOKUP_CHUNK) {
        let rows = Contract::find()
            .filter(contract::Column::ContractId.is_in(chunk.iter().copied()))
            .all(db)
            .await?;
        found.extend(rows.into_iter().map(|c| (c.contract_id, c)));
    }
    Ok(found)
}

/// Writes one `ANALITICO_{short_name}_{YYYYMMDD}.TXT` per agency with every
/// row assigned at `dt_ref` (the latest run of the period when omitted).
#[instrument(skip(db, dir))]
pub async fn export_analytical<C>(
    db: &C,
    edital_id: i32,
    period_id: i32,
    dt_ref: Option<NaiveDate>,
    dir: &Path,
) -> Result<Vec<ExportSummary>>
where
    C: ConnectionTrait,
{
    let dt_ref = match dt_ref {
        Some(d) => d,
        None => live_rows(edital_id, period_id)
            .order_by_desc(distribution::Column::DtRef)
            .one(db)
            .await?
            .map(|row| row.dt_ref)
            .ok_or(Error::EmptyUniverse { edital_id, period_id })?,
    };

    let rows = live_rows(edital_id, period_id)
        .filter(distribution::Column::DtRef.eq(dt_ref))
        .order_by_asc(distribution::Column::ContractId)
        .all(db)
        .await?;
    let ids: Vec<i64> = rows.iter().map(|r| r.contract_id).collect();
    let contracts = contracts_by_id(db, &ids).await?;
    let short_names = roster::short_names(db).await?;
    let descriptions = criteria::descriptions(db).await?;

    let mut by_agency: BTreeMap<i32, Vec<&DistributionModel>> = BTreeMap::new();
    for row in &rows {
        by_agency.entry(row.agency_id).or_default().push(row);
    }

    let mut written = Vec::with_capacity(by_agency.len());
    for (agency_id, agency_rows) in by_agency {
        let fallback = agency_id.to_string();
        let short_name = short_names.get(&agency_id).unwrap_or(&fallback);
        let mut body = String::new();
        let mut total = Decimal::ZERO;
        for row in &agency_rows {
            let description = descriptions.get(&row.criterion).map_or("", String::as_str);
            body.push_str(&analytical_line(
                row,
                contracts.get(&row.contract_id),
                short_name,
                description,
            ));
            body.push('\n');
            total += row.balance;
        }
        let _ = writeln!(body, "TOTAL {} {:.2}", agency_rows.len(), total);

        let name = format!("ANALITICO_{short_name}_{}.TXT", stamp(dt_ref));
        written.push(write_file(dir, &name, &body, agency_rows.len())?);
    }
    Ok(written)
}
