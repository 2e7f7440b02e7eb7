use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use arkkit::{
    FilePreferences, HeadlessDocument, I18nOptions, Package, PackageOptions, RuntimeMode,
    StaticI18n, StoreConnector,
};
use arkkit_bootstrap::{init_logging, wait_for_shutdown, AppConfig, CliArgs};
use notes::NotesModule;

/// Ark Host - runs an Ark package with the bundled modules
#[derive(Parser)]
#[command(name = "ark-host")]
#[command(about = "Ark Host - runs an Ark package with the bundled modules")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Runtime mode override: "browser" or "server" (overrides config)
    #[arg(short, long)]
    mode: Option<String>,

    /// Theme to switch to once the package is initialized
    #[arg(short, long)]
    theme: Option<String>,

    /// Fetch the server context through the "Main" provider on startup
    #[arg(long)]
    fetch_context: bool,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the package and run until interrupted
    Run,
    /// Validate configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        mode: cli.mode.clone(),
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    // Layered config:
    // 1) defaults -> 2) YAML (if provided) -> 3) env (ARK__*) -> 4) CLI overrides
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    let logging_config = config.logging.clone().unwrap_or_default();
    init_logging(&logging_config, &config.home_dir());

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config, cli.theme, cli.fetch_context).await,
        Commands::Check => check_config(config),
    }
}

/// Assemble the package from configuration. Nothing is initialized yet.
fn build_package(config: &AppConfig, fetch_context: bool) -> Result<Arc<Package>> {
    let preferences = FilePreferences::in_dir(&config.home_dir());
    tracing::debug!(path = %preferences.path().display(), "theme preferences");

    let package = Package::builder()
        .options(PackageOptions::from_app_config(config))
        .document(Arc::new(HeadlessDocument::default()))
        .preferences(Arc::new(preferences))
        .build();

    package
        .configure_from(config)
        .context("invalid package configuration")?;

    let i18n = I18nOptions::with_overrides(config.i18n.as_ref()).context("invalid i18n options")?;
    package.use_i18n(Arc::new(StaticI18n::new()), Some(i18n));
    package.use_connector(Arc::new(StoreConnector));

    package.register_module(
        "notes",
        Arc::new(NotesModule::new().with_server_context(fetch_context)),
    )?;
    Ok(package)
}

async fn run(config: AppConfig, theme: Option<String>, fetch_context: bool) -> Result<()> {
    tracing::info!("Ark host starting");
    let mode: RuntimeMode = config.server.mode.parse()?;
    let package = build_package(&config, fetch_context)?;

    package.initialize(mode, None).await?;
    tracing::info!(%mode, modules = package.modules().len(), "package ready");

    if let Some(restored) = package.take_restored_theme() {
        let outcome = restored.wait().await;
        tracing::info!(?outcome, "saved theme restored");
    }

    if let Some(id) = theme {
        let outcome = package.set_theme(&id)?.wait().await;
        tracing::info!(theme = %id, ?outcome, "theme switch finished");
    }

    if let Some(notes) = package.module("notes") {
        match notes.render_view("list", serde_json::json!({})) {
            Ok(html) => tracing::info!(%html, "notes view"),
            Err(e) => tracing::warn!(error = %e, "notes view failed to render"),
        }
    }
    tracing::info!(greeting = %package.translate("Translation Test"), "i18n ready");

    wait_for_shutdown().await?;

    package.shutdown();
    if let Some(task) = package.take_context_task() {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "context fetch task ended abnormally");
        }
    }
    tracing::info!("Ark host stopped");
    Ok(())
}

fn check_config(config: AppConfig) -> Result<()> {
    tracing::info!("Checking configuration…");
    let _: RuntimeMode = config.server.mode.parse()?;
    let package = build_package(&config, false)?;
    println!("Configuration is valid");
    println!(
        "themes: {}",
        package
            .themes()
            .iter()
            .map(|t| t.id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("{}", config.to_yaml()?);
    Ok(())
}
