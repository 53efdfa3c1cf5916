//! Filing Wizard CLI
//!
//! Inspect the service catalogue and play scripted wizard sessions against
//! the local upload store and JSON submission sink.
//!
//! # Usage
//!
//! ```bash
//! # List services
//! filing-wizard services
//!
//! # Show the steps, fields, rules and document slots of one service
//! filing-wizard describe income_tax_return
//!
//! # Play a script
//! filing-wizard run income_tax_return --script scripts/itr_salaried.yaml --plan standard
//! ```

mod describe;
mod script;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use filing_wizard_core::{
    Collaborators, JsonFileSubmissionSink, LocalUploadStore, ServiceCatalog, SessionContext,
    WizardController, WizardSettings,
};

#[derive(Parser)]
#[command(name = "filing-wizard")]
#[command(version)]
#[command(about = "Drive filing intake wizard sessions from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (YAML). FILING_WIZARD_* variables override it.
    #[arg(long, short, global = true, env = "FILING_WIZARD_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the services in the catalogue
    Services,

    /// Show the steps, fields, rules and document slots of a service
    Describe {
        /// Service key, e.g. income_tax_return
        service: String,
    },

    /// Play a YAML script of wizard actions
    Run {
        /// Service key
        service: String,

        /// Script file
        #[arg(long, short)]
        script: PathBuf,

        /// Pre-selected plan, as if chosen on the landing page
        #[arg(long)]
        plan: Option<String>,

        /// Signed-in user id
        #[arg(long, default_value = "local-user")]
        user: String,
    },
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,filing_wizard_core=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    let settings = WizardSettings::load(cli.config.as_deref()).context("Failed to load settings")?;
    let catalog = load_catalog(&settings)?;

    match cli.command {
        Commands::Services => {
            describe::print_services(&catalog);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Describe { service } => {
            let service = catalog.get(&service)?;
            describe::print_service(&service);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run {
            service,
            script,
            plan,
            user,
        } => cmd_run(&catalog, &settings, &service, &script, plan, user).await,
    }
}

fn load_catalog(settings: &WizardSettings) -> Result<ServiceCatalog> {
    let mut catalog = ServiceCatalog::builtin().context("Built-in service definitions are invalid")?;
    if let Some(dir) = &settings.catalog_dir {
        let loaded = catalog
            .load_from_dir(dir)
            .with_context(|| format!("Failed to load services from {}", dir.display()))?;
        tracing::info!(dir = %dir.display(), loaded, "loaded extra services");
    }
    Ok(catalog)
}

async fn cmd_run(
    catalog: &ServiceCatalog,
    settings: &WizardSettings,
    service: &str,
    script_path: &std::path::Path,
    plan: Option<String>,
    user: String,
) -> Result<ExitCode> {
    let actions = script::load(script_path)?;
    let base_dir = script_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_default();

    let mut session = SessionContext::signed_in(user);
    if let Some(plan) = plan {
        session = session.with_plan(plan);
    }

    let collaborators = Collaborators::new(
        Arc::new(LocalUploadStore::new(&settings.upload_dir)),
        Arc::new(JsonFileSubmissionSink::new(&settings.submissions_dir)),
    )
    .with_ids(settings.id_strategy.build());

    let wizard = WizardController::new(catalog.get(service)?, session, collaborators)?
        .with_upload_policy(settings.upload.clone());

    let report = script::run(&wizard, &actions, &base_dir).await?;

    for outcome in &report.outcomes {
        let marker = if outcome.ok { "ok".green() } else { "failed".red() };
        let phase = format!("[{}]", outcome.phase).as_str().dimmed();
        if outcome.detail.is_empty() {
            println!("{phase} {} {marker}", outcome.action);
        } else {
            println!("{phase} {} {marker}: {}", outcome.action, outcome.detail);
        }
    }

    println!();
    match &report.submission {
        Some(result) => {
            println!("{} {}", "Submitted".green().bold(), result.reference);
            if !result.details.is_null() {
                println!("{}", serde_json::to_string_pretty(&result.details)?);
            }
            Ok(ExitCode::SUCCESS)
        }
        None => {
            println!(
                "{} ended in {} with {} failed action(s)",
                "Not submitted:".yellow().bold(),
                report.phase,
                report.failures()
            );
            Ok(ExitCode::from(2))
        }
    }
}
