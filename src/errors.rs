//! Error types shared by every engine component.
//!
//! Each variant maps onto one of the operational error kinds. [`Error::exit_code`]
//! turns an error into the process exit status used by the CLI.

use rust_decimal::Decimal;
use thiserror::Error;

/// Unified error type for the distribution engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying store failure (`IO_FAULT`)
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// File system failure while writing exports (`IO_FAULT`)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration or environment
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// No contract survived the eligibility filter (`EMPTY_UNIVERSE`)
    #[error("No eligible contracts for edital {edital_id}, period {period_id}")]
    EmptyUniverse {
        /// Edital of the run
        edital_id: i32,
        /// Period of the run
        period_id: i32,
    },

    /// No agency is left to receive contracts (`ROSTER_INSUFFICIENT`)
    #[error("No receiving agencies for edital {edital_id}, period {period_id}")]
    RosterInsufficient {
        /// Edital of the run
        edital_id: i32,
        /// Period of the run
        period_id: i32,
    },

    /// An exact sum is still off after residue balancing (`SUM_INVARIANT`)
    #[error("Sum invariant violated for {what}: expected {expected}, got {actual}")]
    SumInvariant {
        /// Which quantity was being balanced
        what: String,
        /// Required total
        expected: Decimal,
        /// Total actually obtained
        actual: Decimal,
    },

    /// The calendar has no rows for a requested month (`CALENDAR_MISS`)
    #[error("Calendar has no entries for {year}-{month:02}")]
    CalendarMiss {
        /// Requested year
        year: i32,
        /// Requested month (1-12)
        month: u32,
    },

    /// No budget row for a SISCOR month (`BUDGET_MISS`, logged and substituted by 0)
    #[error("No SISCOR budget for {year}-{month:02}")]
    BudgetMiss {
        /// Requested year
        year: i32,
        /// Requested month (1-12)
        month: u32,
    },

    /// A contract would be distributed twice in one run (`CONTRACT_COLLISION`)
    #[error("Contract {contract_id} already distributed in this run")]
    ContractCollision {
        /// The duplicated contract
        contract_id: i64,
    },

    /// Edital lookup failed
    #[error("Edital {id} not found")]
    EditalNotFound {
        /// Requested edital
        id: i32,
    },

    /// Period lookup failed
    #[error("Period {id} not found in edital {edital_id}")]
    PeriodNotFound {
        /// Requested period
        id: i32,
        /// Edital searched
        edital_id: i32,
    },

    /// The agency cannot take part in the requested operation
    #[error("Agency {agency_id} is not eligible: {reason}")]
    AgencyNotEligible {
        /// Agency in question
        agency_id: i32,
        /// Why it was rejected
        reason: String,
    },

    /// Redistribution needs a prior share snapshot
    #[error("No share snapshot before {before} for edital {edital_id}, period {period_id}")]
    SnapshotMissing {
        /// Edital searched
        edital_id: i32,
        /// Period searched
        period_id: i32,
        /// Snapshot must be strictly older than this date
        before: chrono::NaiveDate,
    },

    /// Criterion code outside the allowed range
    #[error("Invalid criterion code {code}: {reason}")]
    InvalidCriterion {
        /// Offending code
        code: i32,
        /// Allowed range description
        reason: String,
    },
}

impl Error {
    /// Process exit status for this error: 1 empty universe, 2 invariant violated,
    /// 3 I/O or data error.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::EmptyUniverse { .. } => 1,
            Self::SumInvariant { .. } | Self::ContractCollision { .. } => 2,
            _ => 3,
        }
    }
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let empty = Error::EmptyUniverse {
            edital_id: 1,
            period_id: 2,
        };
        assert_eq!(empty.exit_code(), 1);

        let sum = Error::SumInvariant {
            what: "percent".to_string(),
            expected: Decimal::ONE_HUNDRED,
            actual: Decimal::new(9999, 2),
        };
        assert_eq!(sum.exit_code(), 2);
        assert_eq!(Error::ContractCollision { contract_id: 7 }.exit_code(), 2);
        assert_eq!(Error::CalendarMiss { year: 2025, month: 3 }.exit_code(), 3);
        assert_eq!(
            Error::Database(sea_orm::DbErr::Custom("boom".into())).exit_code(),
            3
        );
    }

    #[test]
    fn test_messages() {
        let err = Error::CalendarMiss { year: 2025, month: 3 };
        assert_eq!(err.to_string(), "Calendar has no entries for 2025-03");
    }
}
