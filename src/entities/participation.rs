//! Agency participation entity - the per-period roster with each agency's condition.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Condition of an agency within one edital period.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum AgencyCondition {
    /// Took part in the previous period and stays
    #[sea_orm(string_value = "PERMANECE")]
    Continuing,
    /// Joins in this period without revenue history
    #[sea_orm(string_value = "NOVA")]
    New,
    /// Left before the period started; receives nothing
    #[sea_orm(string_value = "DESCREDENCIADA")]
    Decredentialed,
    /// Left during the period on `exit_date`
    #[sea_orm(string_value = "DESCREDENCIADA NO PERIODO")]
    DecredentialedMidPeriod,
}

impl AgencyCondition {
    /// Whether agencies in this condition can receive contracts.
    #[must_use]
    pub const fn is_receiving(self) -> bool {
        matches!(self, Self::Continuing | Self::New)
    }
}

/// Agency participation database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "agency_participations")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Edital of the roster
    pub edital_id: i32,
    /// Period of the roster
    pub period_id: i32,
    /// Participating agency
    pub agency_id: i32,
    /// Condition of the agency in this period
    pub condition: AgencyCondition,
    /// Exit date for agencies decredentialed mid-period
    pub exit_date: Option<Date>,
    /// When the row was created
    pub created_at: DateTime,
    /// When the row was last modified
    pub updated_at: Option<DateTime>,
    /// Soft-delete marker
    pub deleted_at: Option<DateTime>,
}

/// Each participation row belongs to one agency
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::agency::Entity",
        from = "Column::AgencyId",
        to = "super::agency::Column::Id"
    )]
    Agency,
}

impl Related<super::agency::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Agency.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
