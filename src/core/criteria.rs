//! Selection criterion codes and their reference table.

use crate::{
    entities::{Criterion, criterion},
    errors::{Error, Result},
};
use sea_orm::{Set, prelude::*};
use std::collections::HashMap;

/// Phase 1: active agreement at a continuing agency
pub const ACORDO_CONTINUA: i32 = 1;
/// Phase 2: active agreement at a decredentialed agency
pub const ACORDO_DESCREDENCIADA: i32 = 3;
/// Phase 5: residual singletons
pub const DEMAIS: i32 = 4;
/// Phases 3 and 4: drag rule
pub const ARRASTO: i32 = 6;
/// Limit rows of the initial distribution
pub const INITIAL_DISTRIBUTION_LIMIT: i32 = 7;
/// Lowest code available for user-defined redistribution criteria
pub const FIRST_REDISTRIBUTION: i32 = 8;

/// Codes written on Distribution rows by the initial run.
pub const INITIAL_DISTRIBUTION_CODES: [i32; 4] = [ACORDO_CONTINUA, ACORDO_DESCREDENCIADA, DEMAIS, ARRASTO];

const STANDARD_CRITERIA: [(i32, &str); 5] = [
    (ACORDO_CONTINUA, "ACORDO-CONTINUA"),
    (ACORDO_DESCREDENCIADA, "ACORDO-DESCREDENCIADA"),
    (DEMAIS, "DEMAIS"),
    (ARRASTO, "ARRASTO"),
    (INITIAL_DISTRIBUTION_LIMIT, "LIMITE-DISTRIBUICAO-INICIAL"),
];

/// Rejects codes below [`FIRST_REDISTRIBUTION`].
pub fn validate_redistribution_code(code: i32) -> Result<()> {
    if code >= FIRST_REDISTRIBUTION {
        Ok(())
    } else {
        Err(Error::InvalidCriterion {
            code,
            reason: format!("redistribution criteria start at {FIRST_REDISTRIBUTION}"),
        })
    }
}

async fn insert_if_missing<C>(db: &C, code: i32, description: &str) -> Result<()>
where
    C: ConnectionTrait,
{
    if Criterion::find_by_id(code).one(db).await?.is_none() {
        criterion::ActiveModel {
            code: Set(code),
            description: Set(description.to_string()),
        }
        .insert(db)
        .await?;
    }
    Ok(())
}

/// Seeds the standard criterion rows that are not present yet.
pub async fn ensure_standard_criteria<C>(db: &C) -> Result<()>
where
    C: ConnectionTrait,
{
    for (code, description) in STANDARD_CRITERIA {
        insert_if_missing(db, code, description).await?;
    }
    Ok(())
}

/// Registers a redistribution criterion, keeping an existing description.
pub async fn register_redistribution_criterion<C>(db: &C, code: i32) -> Result<()>
where
    C: ConnectionTrait,
{
    validate_redistribution_code(code)?;
    insert_if_missing(db, code, &format!("REDISTRIBUICAO-{code}")).await
}

/// Loads every criterion description keyed by code.
pub async fn descriptions<C>(db: &C) -> Result<HashMap<i32, String>>
where
    C: ConnectionTrait,
{
    Ok(Criterion::find()
        .all(db)
        .await?
        .into_iter()
        .map(|c| (c.code, c.description))
        .collect())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::setup_test_db;

    #[test]
    fn test_redistribution_codes_start_at_eight() {
        assert!(validate_redistribution_code(8).is_ok());
        assert!(validate_redistribution_code(12).is_ok());
        assert!(matches!(
            validate_redistribution_code(7),
            Err(Error::InvalidCriterion { code: 7, .. })
        ));
    }

    #[tokio::test]
    async fn test_register_redistribution_criterion() -> Result<()> {
        let db = setup_test_db().await?;
        register_redistribution_criterion(&db, 9).await?;
        register_redistribution_criterion(&db, 9).await?;

        let names = descriptions(&db).await?;
        assert_eq!(names.len(), 6);
        assert_eq!(names[&9], "REDISTRIBUICAO-9");
        assert_eq!(names[&ARRASTO], "ARRASTO");
        Ok(())
    }
}
