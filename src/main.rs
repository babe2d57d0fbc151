use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use citrus_farms_lib::config::{AppConfig, ConfigArgs};
use citrus_farms_lib::filter::{
    filter, parse_project, AlternateBearingFilter, FilterCriteria, ServiceFilter, SupportFilter,
};
use citrus_farms_lib::gateway::FarmGateway;
use citrus_farms_lib::model::{Farm, PredefinedProjectName};
use citrus_farms_lib::state::AppState;
use citrus_farms_lib::{backup, db, http, logging, migrate, open_gateway, report, time};

#[derive(Debug, Parser)]
#[command(name = "citrus-farms", about = "Citrus farm record manager", version)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the farm records over HTTP.
    Serve,
    /// Print the farms matching the given filters.
    List {
        #[command(flatten)]
        filters: FilterArgs,
        /// Emit the matching farms as a JSON array.
        #[arg(long)]
        json: bool,
    },
    /// Write every farm to a JSON backup file.
    Backup {
        /// Destination file; defaults to a dated name in the current directory.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Replace all stored farms with the contents of a backup file.
    Restore {
        file: PathBuf,
        /// Confirm that existing records will be replaced.
        #[arg(long)]
        yes: bool,
    },
    /// Delete one farm and everything it owns.
    Delete {
        id: String,
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
    /// Export the matching farms as an .xlsx workbook.
    Export {
        #[command(flatten)]
        filters: FilterArgs,
        /// Only names and contact numbers.
        #[arg(long)]
        contacts_only: bool,
        /// File name prefix used when `--out` is not given.
        #[arg(long, default_value = "citrus-farms")]
        label: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Database maintenance commands.
    #[command(subcommand)]
    Db(DbCommand),
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Apply pending schema migrations and list the applied versions.
    Migrate,
}

#[derive(Debug, Clone, Default, Args)]
struct FilterArgs {
    /// Case-insensitive text matched against name and contact.
    #[arg(long)]
    search: Option<String>,
    /// sugar, sensor or corporate.
    #[arg(long)]
    service: Option<ServiceFilter>,
    /// Only farms without any support program.
    #[arg(long, conflicts_with_all = ["has_programs", "from_year", "to_year"])]
    no_programs: bool,
    /// Only farms with at least one support program.
    #[arg(long)]
    has_programs: bool,
    /// Earliest program year (inclusive); implies `--has-programs`.
    #[arg(long)]
    from_year: Option<i32>,
    /// Latest program year (inclusive); implies `--has-programs`.
    #[arg(long)]
    to_year: Option<i32>,
    /// Support program project, by label or code.
    #[arg(long, value_parser = parse_project)]
    project: Option<PredefinedProjectName>,
    /// Year checked for alternate bearing.
    #[arg(long)]
    alternate_bearing: Option<i32>,
    /// Match farms where alternate bearing did not occur in that year.
    #[arg(long, requires = "alternate_bearing")]
    without_bearing: bool,
}

impl FilterArgs {
    fn criteria(&self, contact_separator: char) -> FilterCriteria {
        let support = if self.no_programs {
            Some(SupportFilter::NoPrograms)
        } else if self.has_programs || self.from_year.is_some() || self.to_year.is_some() {
            Some(SupportFilter::HasPrograms {
                from_year: self.from_year,
                to_year: self.to_year,
            })
        } else {
            None
        };
        FilterCriteria {
            search: self.search.clone(),
            service: self.service,
            support,
            project: self.project,
            alternate_bearing: self.alternate_bearing.map(|year| AlternateBearingFilter {
                year,
                occurred: !self.without_bearing,
            }),
            contact_separator,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match cli.config.resolve() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::from(2);
        }
    };

    let _guard = match logging::init(&config.log_filter, Some(&config.log_dir())) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: logging disabled: {err}");
            None
        }
    };

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(target: "citrus_farms", event = "cli_failed", error = %format!("{err:#}"));
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn load_filtered(config: &AppConfig, filters: &FilterArgs) -> Result<Vec<Farm>> {
    let gateway = open_gateway(config).await.context("open farm store")?;
    let page = gateway.load_all(None).await.context("load farms")?;
    Ok(filter(&page.farms, &filters.criteria(config.contact_separator)))
}

async fn run(command: Commands, config: &AppConfig) -> Result<()> {
    match command {
        Commands::Serve => {
            let gateway = open_gateway(config).await.context("open farm store")?;
            let state = AppState::new(gateway, config.page_size);
            http::serve(state, config.bind).await?;
        }
        Commands::List { filters, json } => {
            let farms = load_filtered(config, &filters).await?;
            if json {
                println!("{}", backup::to_json(&farms)?);
            } else {
                print_table(&farms);
            }
        }
        Commands::Backup { out } => {
            let gateway = open_gateway(config).await.context("open farm store")?;
            let farms = gateway.load_all(None).await.context("load farms")?.farms;
            let path = out.unwrap_or_else(|| PathBuf::from(backup::file_name(time::today())));
            fs::write(&path, backup::to_json(&farms)?)
                .with_context(|| format!("write backup {}", path.display()))?;
            println!("Backed up {} farms to {}", farms.len(), path.display());
        }
        Commands::Restore { file, yes } => {
            if !yes {
                bail!("restore replaces every stored farm; re-run with --yes to confirm");
            }
            let text = fs::read_to_string(&file)
                .with_context(|| format!("read backup {}", file.display()))?;
            let gateway = open_gateway(config).await.context("open farm store")?;
            let count = backup::restore(gateway.as_ref(), &text, yes).await?;
            println!("Restored {count} farms from {}", file.display());
        }
        Commands::Delete { id, yes } => {
            if !yes {
                bail!("deleting farm `{id}` cannot be undone; re-run with --yes to confirm");
            }
            let gateway = open_gateway(config).await.context("open farm store")?;
            gateway.delete(&id).await?;
            println!("Deleted farm {id}");
        }
        Commands::Export {
            filters,
            contacts_only,
            label,
            out,
        } => {
            let farms = load_filtered(config, &filters).await?;
            let workbook = if contacts_only {
                report::build_contacts(&farms)
            } else {
                report::build_report(&farms)
            };
            let path =
                out.unwrap_or_else(|| PathBuf::from(report::file_name(&label, time::today())));
            report::xlsx::save(&workbook, &path)?;
            println!("Exported {} farms to {}", farms.len(), path.display());
        }
        Commands::Db(DbCommand::Migrate) => {
            let pool = db::open_sqlite_pool(&config.database_url)
                .await
                .context("open database")?;
            let result = migrate::apply_migrations(&pool).await;
            let versions = migrate::applied_versions(&pool).await;
            pool.close().await;
            result?;
            for version in versions? {
                println!("{version}");
            }
        }
    }
    Ok(())
}

fn print_table(farms: &[Farm]) {
    if farms.is_empty() {
        println!("No farms");
        return;
    }
    println!("{:<38} {:<20} {:<16} {:>5} {:>10}", "ID", "Name", "Contact", "Plots", "Area");
    for farm in farms {
        println!(
            "{:<38} {:<20} {:<16} {:>5} {:>10.1}",
            farm.id,
            farm.name,
            farm.contact,
            farm.plots.len(),
            farm.total_area()
        );
    }
}
