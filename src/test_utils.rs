//! Shared test utilities for the distribution engine.
//!
//! This module provides common helpers for setting up test databases and
//! seeding reference rows with sensible defaults.

use crate::{
    entities::{
        AgencyCondition, AgreementState, Contract, EditalModel, PeriodModel, agency,
        agency_revenue, agreement, budget, contract, distribution, edital, judicial_suspension,
        participation, period, share_snapshot,
    },
    errors::Result,
};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, PaginatorTrait, Set};
use std::str::FromStr;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Parses a decimal literal. Panics on malformed input.
#[allow(clippy::unwrap_used)]
pub fn dec(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap()
}

/// Parses a `YYYY-MM-DD` date. Panics on malformed input.
#[allow(clippy::unwrap_used)]
pub fn date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Creates a fresh edital holding a single period over `[begin, end]`.
///
/// # Defaults
/// * `nu_edital`: one more than the editais already present
/// * `year`: the year of `begin`
/// * `period_no`: 1
pub async fn create_edital_period(
    db: &DatabaseConnection,
    begin: &str,
    end: &str,
) -> Result<(EditalModel, PeriodModel)> {
    let existing = crate::entities::Edital::find().count(db).await?;
    let begin = date(begin);

    let edital = edital::ActiveModel {
        nu_edital: Set(i32::try_from(existing).unwrap_or_default() + 1),
        year: Set(begin.year()),
        description: Set(format!("EDITAL {}", existing + 1)),
        created_at: Set(now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    let period = period::ActiveModel {
        edital_id: Set(edital.id),
        period_no: Set(1),
        dt_begin: Set(begin),
        dt_end: Set(date(end)),
        created_at: Set(now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    Ok((edital, period))
}

/// Adds an agency to the roster of a period, creating the agency row when
/// missing. Its short name is `AG{id}`.
pub async fn add_agency(
    db: &DatabaseConnection,
    edital: &EditalModel,
    period: &PeriodModel,
    agency_id: i32,
    condition: AgencyCondition,
) -> Result<participation::Model> {
    if agency::Entity::find_by_id(agency_id).one(db).await?.is_none() {
        agency::ActiveModel {
            id: Set(agency_id),
            name: Set(format!("ASSESSORIA {agency_id}")),
            short_name: Set(format!("AG{agency_id}")),
            created_at: Set(now()),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }

    participation::ActiveModel {
        edital_id: Set(edital.id),
        period_id: Set(period.id),
        agency_id: Set(agency_id),
        condition: Set(condition),
        exit_date: Set(None),
        created_at: Set(now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Records revenue collected by an agency on a date.
pub async fn add_revenue(
    db: &DatabaseConnection,
    agency_id: i32,
    collected_on: &str,
    amount: &str,
) -> Result<agency_revenue::Model> {
    agency_revenue::ActiveModel {
        agency_id: Set(agency_id),
        collected_on: Set(date(collected_on)),
        amount: Set(dec(amount)),
        created_at: Set(now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Records a SISCOR budget row for `year_month` (`YYYYMM`).
pub async fn add_budget(
    db: &DatabaseConnection,
    year_month: i32,
    phase: i32,
    amount: &str,
) -> Result<budget::Model> {
    budget::ActiveModel {
        year_month: Set(year_month),
        phase: Set(phase),
        amount: Set(dec(amount)),
        created_at: Set(now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Creates an active-credit contract.
///
/// # Defaults
/// * `contract_no`: `CT{id}`
/// * `credit_status`: active
/// * `product`: `HABITACIONAL`
/// * `days_overdue`: 90
pub async fn create_contract(
    db: &DatabaseConnection,
    contract_id: i64,
    cpf_cnpj: &str,
    balance: &str,
    agency_id: Option<i32>,
) -> Result<contract::Model> {
    create_custom_contract(
        db,
        contract_id,
        cpf_cnpj,
        balance,
        agency_id,
        contract::CREDIT_STATUS_ACTIVE,
        "HABITACIONAL",
    )
    .await
}

/// Creates a contract with custom status and product.
/// Use this when you need to test the eligibility filters.
pub async fn create_custom_contract(
    db: &DatabaseConnection,
    contract_id: i64,
    cpf_cnpj: &str,
    balance: &str,
    agency_id: Option<i32>,
    credit_status: i32,
    product: &str,
) -> Result<contract::Model> {
    contract::ActiveModel {
        contract_id: Set(contract_id),
        contract_no: Set(format!("CT{contract_id}")),
        debtor_cpf_cnpj: Set(cpf_cnpj.to_string()),
        outstanding_balance: Set(dec(balance)),
        credit_status: Set(credit_status),
        current_agency_id: Set(agency_id),
        product: Set(product.to_string()),
        days_overdue: Set(90),
        created_at: Set(now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Places a live judicial suspension on a contract.
pub async fn add_suspension(
    db: &DatabaseConnection,
    contract_id: i64,
) -> Result<judicial_suspension::Model> {
    judicial_suspension::ActiveModel {
        contract_id: Set(contract_id),
        created_at: Set(now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Records an agreement of a contract with an agency.
pub async fn add_agreement(
    db: &DatabaseConnection,
    contract_id: i64,
    agency_id: i32,
    state: AgreementState,
) -> Result<agreement::Model> {
    agreement::ActiveModel {
        contract_id: Set(contract_id),
        agency_id: Set(agency_id),
        state: Set(state),
        created_at: Set(now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Writes a distribution row. Debtor and balance are copied from the contract
/// when it exists.
pub async fn add_distribution(
    db: &DatabaseConnection,
    edital: &EditalModel,
    period: &PeriodModel,
    dt_ref: &str,
    contract_id: i64,
    agency_id: i32,
    criterion: i32,
) -> Result<distribution::Model> {
    let (cpf_cnpj, balance) = Contract::find_by_id(contract_id)
        .one(db)
        .await?
        .map_or_else(
            || (format!("{contract_id:011}"), Decimal::ZERO),
            |c| (c.debtor_cpf_cnpj, c.outstanding_balance),
        );

    distribution::ActiveModel {
        dt_ref: Set(date(dt_ref)),
        edital_id: Set(edital.id),
        period_id: Set(period.id),
        contract_id: Set(contract_id),
        agency_id: Set(agency_id),
        criterion: Set(criterion),
        cpf_cnpj: Set(cpf_cnpj),
        balance: Set(balance),
        created_at: Set(now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Writes one share snapshot row.
pub async fn add_snapshot(
    db: &DatabaseConnection,
    edital: &EditalModel,
    period: &PeriodModel,
    dt_ref: &str,
    agency_id: i32,
    saldo_devedor: &str,
    percent: &str,
) -> Result<share_snapshot::Model> {
    share_snapshot::ActiveModel {
        dt_ref: Set(date(dt_ref)),
        edital_id: Set(edital.id),
        period_id: Set(period.id),
        agency_id: Set(agency_id),
        saldo_devedor: Set(dec(saldo_devedor)),
        percent: Set(dec(percent)),
        created_at: Set(now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}
