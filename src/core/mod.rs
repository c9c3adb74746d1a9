/// SISCOR budget lookups and period goal history
pub mod budget;
/// Business-day calendar
pub mod calendar;
/// Criterion codes and the criterion reference table
pub mod criteria;
/// Distributable, non-distributable and draggable working sets
pub mod eligibility;
/// Export files for downstream ingest
pub mod export;
/// Monthly goal projection
pub mod goals;
/// Decimal helpers and residue balancing
pub mod money;
/// Initial distribution pipeline
pub mod pipeline;
/// Mid-period redistribution after an agency exit
pub mod redistribution;
/// Periods, rosters and prior-period revenue
pub mod roster;
/// Share computation per regime
pub mod shares;
