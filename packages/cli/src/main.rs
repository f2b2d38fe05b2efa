#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line front end for geography-scoped lending analysis.
//!
//! ```text
//! lending_atlas resolve --region "Greater Bridgeport"
//! lending_atlas analyze --state CT --year 2021 --year 2022 [--demographics]
//! lending_atlas cache clear [--namespace analysis]
//! lending_atlas ingest counties --state CT
//! lending_atlas ingest metros --file list1_2023.csv
//! ```
//!
//! Results are printed to stdout as pretty JSON; logs go to stderr and are
//! controlled by `RUST_LOG`.

mod app;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use lending_atlas_analytics_models::{AnalysisRequest, GroupBy};
use lending_atlas_config::AtlasConfig;
use lending_atlas_geography::{GeoidResolver, ingest};
use lending_atlas_geography_models::{AreaId, GeographySelection};
use lending_atlas_query_models::{
    ActionTaken, Exclusion, FilterSet, LoanPurpose, LoanType, Occupancy,
};
use serde::Serialize;

use crate::app::CliError;

#[derive(Parser)]
#[command(
    name = "lending_atlas",
    about = "Geography-scoped lending activity analysis"
)]
struct Cli {
    /// Configuration file (defaults to $LENDING_ATLAS_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand geography selections into county codes
    Resolve {
        #[command(flatten)]
        selections: SelectionArgs,
    },
    /// Classify and aggregate lending activity
    Analyze {
        #[command(flatten)]
        selections: SelectionArgs,
        /// Activity year (repeatable)
        #[arg(long = "year", required = true)]
        years: Vec<u16>,
        #[command(flatten)]
        filters: FilterArgs,
        /// Attach an ACS demographic composite
        #[arg(long)]
        demographics: bool,
        /// ACS vintage (defaults to the latest requested year)
        #[arg(long, requires = "demographics")]
        vintage: Option<u16>,
        /// Classification grouping: `area_set_year` or `area_year`
        #[arg(long)]
        group_by: Option<GroupBy>,
    },
    /// Manage the result cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// Load the county hierarchy into the warehouse
    Ingest {
        #[command(subcommand)]
        command: IngestCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Delete cached entries
    Clear {
        /// Only clear this namespace (e.g. `analysis`, `demographics`)
        #[arg(long)]
        namespace: Option<String>,
    },
}

#[derive(Subcommand)]
enum IngestCommands {
    /// Download county names for one or more states from `TIGERweb`
    Counties {
        /// State FIPS code, abbreviation or name (repeatable)
        #[arg(long = "state", required = true)]
        states: Vec<String>,
    },
    /// Load metro membership from a CBSA delineation CSV
    Metros {
        /// Path to the delineation file
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Args)]
struct SelectionArgs {
    /// County FIPS code (repeatable)
    #[arg(long = "county")]
    counties: Vec<String>,
    /// State FIPS code, abbreviation or name (repeatable)
    #[arg(long = "state")]
    states: Vec<String>,
    /// CBSA code (repeatable)
    #[arg(long = "metro")]
    metros: Vec<String>,
    /// Connecticut planning region code or name (repeatable)
    #[arg(long = "region")]
    regions: Vec<String>,
}

impl SelectionArgs {
    fn selections(&self) -> Vec<GeographySelection> {
        let mut selections = vec![];
        selections.extend(self.counties.iter().map(GeographySelection::county));
        selections.extend(self.states.iter().map(GeographySelection::state));
        selections.extend(self.metros.iter().map(GeographySelection::metro));
        selections.extend(self.regions.iter().map(GeographySelection::planning_region));
        selections
    }
}

#[derive(Args)]
struct FilterArgs {
    /// Loan purpose to include (repeatable; default `home_purchase`)
    #[arg(long = "loan-purpose")]
    loan_purposes: Vec<LoanPurpose>,
    /// Action taken to include (repeatable; default `originated`)
    #[arg(long = "action")]
    actions: Vec<ActionTaken>,
    /// Occupancy type to include (repeatable; default `principal_residence`)
    #[arg(long = "occupancy")]
    occupancy: Vec<Occupancy>,
    /// Loan type to include (repeatable; default any)
    #[arg(long = "loan-type")]
    loan_types: Vec<LoanType>,
    /// Lender LEI to include (repeatable; default any)
    #[arg(long = "lender")]
    lenders: Vec<String>,
    /// Application class to exclude (repeatable; replaces the defaults)
    #[arg(long = "exclude", conflicts_with = "no_exclusions")]
    exclusions: Vec<Exclusion>,
    /// Disable every exclusion
    #[arg(long)]
    no_exclusions: bool,
    /// JSON file holding a complete filter set; overrides the flags above
    #[arg(long)]
    filters_file: Option<PathBuf>,
}

impl FilterArgs {
    fn filter_set(&self) -> Result<FilterSet, CliError> {
        fn set<T: Ord + Clone>(values: &[T]) -> Option<BTreeSet<T>> {
            (!values.is_empty()).then(|| values.iter().cloned().collect())
        }

        if let Some(path) = &self.filters_file {
            let text = std::fs::read_to_string(path)?;
            return Ok(serde_json::from_str(&text)?);
        }

        Ok(FilterSet {
            loan_purposes: set(&self.loan_purposes),
            actions_taken: set(&self.actions),
            occupancy_types: set(&self.occupancy),
            loan_types: set(&self.loan_types),
            lender_ids: set(&self.lenders),
            exclusions: if self.no_exclusions {
                Some(BTreeSet::new())
            } else {
                set(&self.exclusions)
            },
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Resolution {
    selections: Vec<ResolvedSelection>,
    areas: BTreeSet<AreaId>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolvedSelection {
    selection: GeographySelection,
    areas: BTreeSet<AreaId>,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn resolve(config: &AtlasConfig, args: &SelectionArgs) -> Result<(), CliError> {
    let conn = app::open_warehouse(config)?;
    let resolver = GeoidResolver::new(std::sync::Arc::new(app::hierarchy(&conn)?));

    let mut resolution = Resolution {
        selections: vec![],
        areas: BTreeSet::new(),
    };
    for selection in args.selections() {
        let areas = resolver.expand(&selection).await?;
        resolution.areas.extend(areas.iter().cloned());
        resolution
            .selections
            .push(ResolvedSelection { selection, areas });
    }

    print_json(&resolution)
}

async fn ingest_counties(config: &AtlasConfig, states: &[String]) -> Result<(), CliError> {
    let conn = app::open_warehouse(config)?;
    let hierarchy = app::hierarchy(&conn)?;
    let client = ingest::build_tigerweb_client()?;

    let mut total = 0;
    for state in states {
        total += ingest::ingest_state_counties(&hierarchy, &client, state).await?;
    }
    log::info!("Ingested {total} counties");
    Ok(())
}

async fn ingest_metros(config: &AtlasConfig, file: &Path) -> Result<(), CliError> {
    let conn = app::open_warehouse(config)?;
    let hierarchy = app::hierarchy(&conn)?;
    let written = ingest::load_delineation_csv(&hierarchy, file).await?;
    log::info!("Loaded {written} metro memberships");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let mut config = AtlasConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Resolve { selections } => resolve(&config, &selections).await?,
        Commands::Analyze {
            selections,
            years,
            filters,
            demographics,
            vintage,
            group_by,
        } => {
            if let Some(group_by) = group_by {
                config.classification.group_by = group_by;
            }
            let pipeline = app::pipeline(&config).await?;

            let request = AnalysisRequest {
                selections: selections.selections(),
                years: years.into_iter().collect(),
                filters: filters.filter_set()?,
                include_demographics: demographics,
                demographics_vintage: vintage.or(config.census.vintage),
            };

            let report = pipeline.analyze(&request).await?;
            if !report.completeness.is_complete() {
                log::warn!(
                    "Report is incomplete: {} upstream issue(s)",
                    report.completeness.issues.len()
                );
            }
            print_json(&report)?;
        }
        Commands::Cache {
            command: CacheCommands::Clear { namespace },
        } => {
            let cache = app::result_cache(&config).await?;
            let removed = cache.clear(namespace.as_deref()).await?;
            log::info!(
                "Removed {removed} cache entries from {}",
                namespace.as_deref().unwrap_or("all namespaces")
            );
        }
        Commands::Ingest { command } => match command {
            IngestCommands::Counties { states } => ingest_counties(&config, &states).await?,
            IngestCommands::Metros { file } => ingest_metros(&config, &file).await?,
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn analyze_flags_build_a_filter_set() {
        let cli = Cli::try_parse_from([
            "lending_atlas",
            "analyze",
            "--region",
            "Greater Bridgeport",
            "--county",
            "9009",
            "--year",
            "2022",
            "--loan-type",
            "fha",
            "--loan-type",
            "va",
            "--no-exclusions",
        ])
        .unwrap();

        let Commands::Analyze {
            selections,
            years,
            filters,
            ..
        } = cli.command
        else {
            panic!("expected analyze");
        };

        assert_eq!(years, vec![2022]);
        let selections = selections.selections();
        assert_eq!(selections.len(), 2);
        assert_eq!(selections[0], GeographySelection::county("9009"));

        let filters = filters.filter_set().unwrap();
        assert_eq!(filters.loan_types, Some([LoanType::Fha, LoanType::Va].into()));
        assert_eq!(filters.exclusions, Some(BTreeSet::new()));
        assert_eq!(filters.loan_purposes, None);
    }

    #[test]
    fn exclusion_flags_conflict() {
        assert!(
            Cli::try_parse_from([
                "lending_atlas",
                "analyze",
                "--county",
                "09001",
                "--year",
                "2022",
                "--exclude",
                "reverse_mortgage",
                "--no-exclusions",
            ])
            .is_err()
        );
    }
}
