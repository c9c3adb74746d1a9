//! Entity module - SeaORM definitions for every table the engine reads or writes.
//!
//! Aggregates reference each other by id only; lookups live in `core`.

pub mod agency;
pub mod agency_monthly_goal;
pub mod agency_revenue;
pub mod agreement;
pub mod budget;
pub mod calendar_day;
pub mod contract;
pub mod criterion;
pub mod distributable;
pub mod distribution;
pub mod draggable;
pub mod edital;
pub mod judicial_suspension;
pub mod limit;
pub mod monthly_goal;
pub mod non_distributable;
pub mod participation;
pub mod period;
pub mod period_goal;
pub mod run_state;
pub mod share_snapshot;

// Re-export specific types to avoid conflicts
pub use agency::{Column as AgencyColumn, Entity as Agency, Model as AgencyModel};
pub use agency_monthly_goal::{
    Column as AgencyMonthlyGoalColumn, Entity as AgencyMonthlyGoal,
    Model as AgencyMonthlyGoalModel,
};
pub use agency_revenue::{
    Column as AgencyRevenueColumn, Entity as AgencyRevenue, Model as AgencyRevenueModel,
};
pub use agreement::{
    AgreementState, Column as AgreementColumn, Entity as Agreement, Model as AgreementModel,
};
pub use budget::{Column as BudgetColumn, Entity as Budget, Model as BudgetModel};
pub use calendar_day::{
    Column as CalendarDayColumn, Entity as CalendarDay, Model as CalendarDayModel,
};
pub use contract::{Column as ContractColumn, Entity as Contract, Model as ContractModel};
pub use criterion::{Column as CriterionColumn, Entity as Criterion, Model as CriterionModel};
pub use distributable::{
    Column as DistributableColumn, Entity as Distributable, Model as DistributableModel,
};
pub use distribution::{
    Column as DistributionColumn, Entity as Distribution, Model as DistributionModel,
};
pub use draggable::{Column as DraggableColumn, Entity as Draggable, Model as DraggableModel};
pub use edital::{Column as EditalColumn, Entity as Edital, Model as EditalModel};
pub use judicial_suspension::{
    Column as JudicialSuspensionColumn, Entity as JudicialSuspension,
    Model as JudicialSuspensionModel,
};
pub use limit::{Column as LimitColumn, Entity as Limit, Model as LimitModel};
pub use monthly_goal::{
    Column as MonthlyGoalColumn, Entity as MonthlyGoal, Model as MonthlyGoalModel,
};
pub use non_distributable::{
    Column as NonDistributableColumn, Entity as NonDistributable, Model as NonDistributableModel,
};
pub use participation::{
    AgencyCondition, Column as ParticipationColumn, Entity as Participation,
    Model as ParticipationModel,
};
pub use period::{Column as PeriodColumn, Entity as Period, Model as PeriodModel};
pub use period_goal::{Column as PeriodGoalColumn, Entity as PeriodGoal, Model as PeriodGoalModel};
pub use run_state::{Column as RunStateColumn, Entity as RunState, Model as RunStateModel};
pub use share_snapshot::{
    Column as ShareSnapshotColumn, Entity as ShareSnapshot, Model as ShareSnapshotModel,
};
