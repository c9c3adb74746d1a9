//! Command-line triggers for the engine operations.

use crate::{
    config::{database, settings::{DEFAULT_SETTINGS_FILE, Settings}},
    core::{
        calendar, export, goals, pipeline,
        redistribution::{self, RedistributionRequest},
    },
    errors::Result,
};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use std::path::{Path, PathBuf};
use tracing::info;

/// Contract distribution and redistribution engine
#[derive(Parser, Debug)]
#[command(name = "cobranca-engine", version, about, long_about = None)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file
    #[arg(short, long, global = true, env = "COBRANCA_CONFIG", default_value = DEFAULT_SETTINGS_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

/// Edital and period a command works on.
#[derive(Args, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    /// Edital id
    #[arg(long)]
    pub edital: i32,
    /// Period id
    #[arg(long)]
    pub period: i32,
}

/// Engine commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create missing tables and seed the criterion reference rows
    #[command(name = "init-db")]
    InitDb,

    /// Insert calendar days for a date range
    #[command(name = "seed-calendar")]
    SeedCalendar {
        /// First day
        #[arg(long)]
        from: NaiveDate,
        /// Last day
        #[arg(long)]
        to: NaiveDate,
        /// Holidays, comma separated
        #[arg(long, value_delimiter = ',')]
        holidays: Vec<NaiveDate>,
    },

    /// Run (or resume) the initial distribution of a period
    #[command(name = "run-distribution")]
    RunDistribution {
        #[command(flatten)]
        target: Target,
        /// Reference date of the run (today when omitted)
        #[arg(long)]
        dt_ref: Option<NaiveDate>,
    },

    /// Redistribute the contracts of an agency leaving mid-period
    #[command(name = "run-redistribution")]
    RunRedistribution {
        #[command(flatten)]
        target: Target,
        /// Exiting agency
        #[arg(long)]
        agency: i32,
        /// Exit date
        #[arg(long)]
        date: NaiveDate,
        /// Redistribution criterion code (8 or above)
        #[arg(long)]
        criterion: i32,
        /// New stretch factor for the period goal
        #[arg(long)]
        stretch: Option<Decimal>,
    },

    /// Project monthly goals from the latest share snapshot
    #[command(name = "project-goals")]
    ProjectGoals {
        #[command(flatten)]
        target: Target,
        /// Stretch factor overriding the period goal
        #[arg(long)]
        stretch: Option<Decimal>,
    },

    /// Write the initial distribution file
    #[command(name = "export-distribution")]
    ExportDistribution {
        #[command(flatten)]
        target: Target,
        /// Run date (latest when omitted)
        #[arg(long)]
        dt_ref: Option<NaiveDate>,
        /// Output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Write the redistribution file of an exiting agency
    #[command(name = "export-redistribution")]
    ExportRedistribution {
        #[command(flatten)]
        target: Target,
        /// Exiting agency
        #[arg(long)]
        agency: i32,
        /// Output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Write one analytical file per agency
    #[command(name = "export-analytical")]
    ExportAnalytical {
        #[command(flatten)]
        target: Target,
        /// Run date (latest when omitted)
        #[arg(long)]
        dt_ref: Option<NaiveDate>,
        /// Output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

fn output_dir<'a>(given: Option<&'a PathBuf>, settings: &'a Settings) -> &'a Path {
    given.map_or(settings.export.output_dir.as_path(), PathBuf::as_path)
}

/// Runs one command against `db`.
pub async fn execute(command: &Command, settings: &Settings, db: &DatabaseConnection) -> Result<()> {
    match command {
        Command::InitDb => {
            database::create_tables(db).await?;
            info!("database ready");
        }
        Command::SeedCalendar { from, to, holidays } => {
            let inserted = calendar::seed_calendar(db, *from, *to, holidays).await?;
            info!(inserted, "calendar seeded");
        }
        Command::RunDistribution { target, dt_ref } => {
            let dt_ref = dt_ref.unwrap_or_else(|| Local::now().date_naive());
            let report =
                pipeline::run_distribution(db, target.edital, target.period, dt_ref, settings)
                    .await?;
            info!("{}", pipeline::format_distribution_report(&report));
        }
        Command::RunRedistribution {
            target,
            agency,
            date,
            criterion,
            stretch,
        } => {
            let request = RedistributionRequest {
                edital_id: target.edital,
                period_id: target.period,
                agency_id: *agency,
                exit_date: *date,
                criterion: *criterion,
                stretch: *stretch,
            };
            let report = redistribution::run_redistribution(db, &request).await?;
            info!("{}", redistribution::format_redistribution_report(&report));
        }
        Command::ProjectGoals { target, stretch } => {
            let projection =
                goals::project_goals(db, target.edital, target.period, *stretch, &settings.goals)
                    .await?;
            info!("{}", goals::format_goal_projection(&projection));
        }
        Command::ExportDistribution {
            target,
            dt_ref,
            output_dir: dir,
        } => {
            let dir = output_dir(dir.as_ref(), settings);
            export::export_distribution(db, target.edital, target.period, *dt_ref, dir).await?;
        }
        Command::ExportRedistribution {
            target,
            agency,
            output_dir: dir,
        } => {
            let dir = output_dir(dir.as_ref(), settings);
            export::export_redistribution(db, target.edital, target.period, *agency, dir).await?;
        }
        Command::ExportAnalytical {
            target,
            dt_ref,
            output_dir: dir,
        } => {
            let dir = output_dir(dir.as_ref(), settings);
            let files =
                export::export_analytical(db, target.edital, target.period, *dt_ref, dir).await?;
            info!(files = files.len(), "analytical export done");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use crate::entities::CalendarDay;
    use crate::test_utils::*;
    use sea_orm::{EntityTrait, PaginatorTrait};

    #[test]
    fn test_parse_redistribution() {
        let cli = Cli::try_parse_from([
            "cobranca-engine",
            "run-redistribution",
            "--edital",
            "3",
            "--period",
            "7",
            "--agency",
            "4",
            "--date",
            "2025-03-26",
            "--criterion",
            "8",
            "--stretch",
            "1.10",
        ])
        .unwrap();

        let Command::RunRedistribution {
            target,
            agency,
            date: exit,
            criterion,
            stretch,
        } = cli.command
        else {
            panic!("wrong subcommand");
        };
        assert_eq!(target, Target { edital: 3, period: 7 });
        assert_eq!(agency, 4);
        assert_eq!(exit, date("2025-03-26"));
        assert_eq!(criterion, 8);
        assert_eq!(stretch, Some(dec("1.10")));
        assert!(!cli.verbose);
    }

    #[test]
    fn test_global_flags_and_holidays() {
        let cli = Cli::try_parse_from([
            "cobranca-engine",
            "seed-calendar",
            "--from",
            "2025-03-01",
            "--to",
            "2025-03-31",
            "--holidays",
            "2025-03-03,2025-03-04",
            "-v",
            "--config",
            "other.toml",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("other.toml"));
        let Command::SeedCalendar { holidays, .. } = cli.command else {
            panic!("wrong subcommand");
        };
        assert_eq!(holidays, vec![date("2025-03-03"), date("2025-03-04")]);
    }

    #[test]
    fn test_rejects_bad_date() {
        assert!(
            Cli::try_parse_from(["cobranca-engine", "seed-calendar", "--from", "march", "--to", "2025-03-31"])
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_execute_seed_calendar() -> Result<()> {
        let db = setup_test_db().await?;
        let command = Command::SeedCalendar {
            from: date("2025-03-01"),
            to: date("2025-03-31"),
            holidays: vec![date("2025-03-03")],
        };

        execute(&command, &Settings::default(), &db).await?;
        execute(&command, &Settings::default(), &db).await?;

        assert_eq!(CalendarDay::find().count(&db).await?, 31);
        Ok(())
    }
}
