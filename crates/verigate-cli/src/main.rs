mod display;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use verigate_core::{
    Configuration, ExtractionMode, JobId, ProviderId, ProviderStatus, SecretsUpdate, ValidationId,
};
use verigate_sync::{CancelOutcome, ConfigOverrides, Console, ConsoleConfig, PollerState};

#[derive(Parser)]
#[command(name = "verigate", version, about = "Operator console for the provider validation service")]
struct Cli {
    /// Console configuration file (TOML).
    #[arg(long, global = true, env = "VERIGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Backend API base URL, e.g. http://localhost:8001/api
    #[arg(long, global = true, env = "VERIGATE_API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dashboard counters with the local classification
    Stats,
    /// List registry providers
    Providers {
        /// Name or NPI substring
        #[arg(long)]
        search: Option<String>,
        /// validated, flagged or pending, as derived from the score
        #[arg(long)]
        status: Option<ProviderStatus>,
    },
    /// Show a validation report
    Report { validation_id: ValidationId },
    /// Write a validation report to a JSON file
    Export {
        validation_id: ValidationId,
        /// Target directory (defaults to export_dir from the config)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Submit a document for validation
    Upload {
        file: PathBuf,
        /// Follow the job until it finishes
        #[arg(long)]
        watch: bool,
    },
    /// Live view of job progress, stats and logs (Ctrl-C exits)
    Watch,
    /// Cancel a job. Without a JOB_ID the active job is shown and --yes
    /// confirms cancelling it.
    Cancel {
        job_id: Option<JobId>,
        #[arg(long)]
        yes: bool,
    },
    /// Delete one provider
    Delete { provider_id: ProviderId },
    /// Delete every provider and report
    ClearRegistry {
        #[arg(long)]
        yes: bool,
    },
    /// Delete all agent logs
    ClearLogs,
    /// Pipeline configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Explain how confidence scores map to statuses
    Explain,
    /// Recent agent logs
    Logs,
    /// Backend health and secrets
    System {
        #[command(subcommand)]
        action: SystemAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    Set {
        /// Confidence threshold as a fraction in [0, 1]
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long)]
        auto_approve: Option<bool>,
        #[arg(long)]
        fuzzy_matching: Option<bool>,
        #[arg(long)]
        live_enrichment: Option<bool>,
        /// batch or single
        #[arg(long)]
        extraction_mode: Option<ExtractionMode>,
    },
}

#[derive(Subcommand)]
enum SystemAction {
    Status,
    Secrets {
        #[arg(long)]
        gemini_key: String,
        #[arg(long)]
        database_url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConsoleConfig::load(
        cli.config.as_deref(),
        ConfigOverrides {
            api_base_url: cli.api_url,
            export_dir: None,
        },
    )
    .await
    .context("failed to load console configuration")?;
    info!(api = %config.api_base_url, "verigate v{}", env!("CARGO_PKG_VERSION"));
    let console = Console::connect(config).context("failed to create API client")?;

    match cli.command {
        Command::Stats => {
            let overview = console.stats_overview().await.context("failed to load stats")?;
            print!("{}", display::stats_card(&overview));
        }
        Command::Providers { search, status } => {
            let providers = console.providers().await.context("failed to load providers")?;
            let threshold = console.threshold_percent().await;
            print!(
                "{}",
                display::provider_table(&providers, threshold, search.as_deref().unwrap_or(""), status)
            );
        }
        Command::Report { validation_id } => {
            let view = console
                .report_view(validation_id)
                .await
                .with_context(|| format!("failed to load validation report {validation_id}"))?;
            print!("{}", display::report_card(&view));
        }
        Command::Export { validation_id, out } => {
            let path = console
                .export(validation_id, out.as_deref())
                .await
                .with_context(|| format!("failed to export validation report {validation_id}"))?;
            println!("Wrote {}", path.display());
        }
        Command::Upload { file, watch } => {
            let receipt = console
                .upload_path(&file)
                .await
                .with_context(|| format!("failed to upload {}", file.display()))?;
            println!("{}", receipt.message);
            if let Some(id) = receipt.job_id {
                println!("  {:<26} {}", "job", id);
            }
            if watch {
                follow_job(&console).await?;
            }
        }
        Command::Watch => watch(&console).await?,
        Command::Cancel { job_id, yes } => {
            let outcome = match job_id {
                Some(id) => Some(console.mutations().cancel_job(id).await?),
                None => {
                    let state = console.poller().tick().await.context("failed to load the active job")?;
                    if let Some(job) = state.job() {
                        print!("{}", display::job_panel(&state));
                        if !yes {
                            bail!(
                                "not cancelling job {} ({}); pass its id or --yes to confirm",
                                job.job_id,
                                job.filename
                            );
                        }
                    }
                    console.cancel_displayed().await?
                }
            };
            match outcome {
                Some(CancelOutcome::Cancelled) => println!("Cancellation requested."),
                Some(CancelOutcome::AlreadyFinished { reason }) => {
                    println!("Job already finished.");
                    if let Some(reason) = reason {
                        println!("  {:<26} {}", "backend", reason);
                    }
                }
                None => println!("No validation job is running."),
            }
        }
        Command::Delete { provider_id } => {
            console
                .mutations()
                .delete_provider(provider_id)
                .await
                .with_context(|| format!("failed to delete provider {provider_id}"))?;
            println!("Deleted provider {provider_id}.");
        }
        Command::ClearRegistry { yes } => {
            if !yes {
                bail!("clearing the registry deletes every provider and report; pass --yes to confirm");
            }
            console.mutations().clear_registry().await.context("failed to clear registry")?;
            println!("Registry cleared.");
        }
        Command::ClearLogs => {
            console.mutations().clear_logs().await.context("failed to clear logs")?;
            println!("Logs cleared.");
        }
        Command::Config { action } => config_command(&console, action).await?,
        Command::Explain => {
            let threshold = console.threshold_percent().await;
            let counts = match console.providers().await {
                Ok(providers) => Some(verigate_core::classify(&providers, threshold)),
                Err(e) => {
                    warn!(error = %e, "providers unavailable");
                    None
                }
            };
            print!("{}", display::explain_card(threshold, counts));
        }
        Command::Logs => {
            let logs = console.logs().await.context("failed to load logs")?;
            print!("{}", display::logs_card(&logs));
        }
        Command::System { action } => match action {
            SystemAction::Status => {
                let status = console.system_status().await.context("failed to load system status")?;
                print!("{}", display::system_card(&status));
            }
            SystemAction::Secrets {
                gemini_key,
                database_url,
            } => {
                let ack = console
                    .mutations()
                    .update_secrets(&SecretsUpdate {
                        gemini_api_key: gemini_key,
                        database_url,
                    })
                    .await
                    .context("failed to update secrets")?;
                println!("{}", ack.message);
            }
        },
    }

    Ok(())
}

async fn config_command(console: &Console, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = console.configuration().await.context("failed to load configuration")?;
            print!("{}", display::config_card(&config));
        }
        ConfigAction::Set {
            threshold,
            auto_approve,
            fuzzy_matching,
            live_enrichment,
            extraction_mode,
        } => {
            let current = console
                .refresh(verigate_sync::ResourceKey::Config)
                .await
                .context("failed to load configuration")?;
            let mut config: Configuration = current
                .as_config()
                .cloned()
                .context("configuration entry missing")?;
            if let Some(t) = threshold {
                config.confidence_threshold = t;
            }
            if let Some(v) = auto_approve {
                config.auto_approve_high_confidence = v;
            }
            if let Some(v) = fuzzy_matching {
                config.fuzzy_matching = v;
            }
            if let Some(v) = live_enrichment {
                config.live_registry_enrichment = v;
            }
            if let Some(mode) = extraction_mode {
                config.extraction_mode = mode;
            }
            let saved = console
                .mutations()
                .save_config(&config)
                .await
                .context("failed to save configuration")?;
            if saved != config {
                println!("Backend adjusted the submitted values.");
            }
            print!("{}", display::config_card(&saved));
        }
    }
    Ok(())
}

/// Poll the active job until the backend stops reporting it.
async fn follow_job(console: &Console) -> anyhow::Result<()> {
    // The job may not be visible on the first polls right after upload.
    const GRACE_POLLS: u32 = 3;

    let mut interval = tokio::time::interval(console.config().job_poll_interval());
    let mut seen = false;
    let mut idle_polls = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            _ = interval.tick() => {}
        }
        match console.poller().tick().await {
            Ok(PollerState::Polling(job)) => {
                seen = true;
                println!(
                    "  {} {} ({}/{})",
                    display::progress_bar(job.percent()),
                    job.current_step,
                    job.processed_providers,
                    job.total_providers
                );
            }
            Ok(PollerState::Idle) => {
                idle_polls += 1;
                if seen || idle_polls >= GRACE_POLLS {
                    println!("Validation finished.");
                    let overview = console.stats_overview().await?;
                    print!("{}", display::stats_card(&overview));
                    return Ok(());
                }
            }
            Err(e) => warn!(error = %e, "job poll failed; retrying"),
        }
    }
}

/// Redraw all panels on every tick and whenever the job state changes.
async fn watch(console: &Console) -> anyhow::Result<()> {
    let _tasks = console.start_background();
    let mut job_rx = console.poller().subscribe();
    let mut redraw = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            _ = redraw.tick() => {}
            changed = job_rx.changed() => changed.context("job poller stopped")?,
        }
        let job = job_rx.borrow_and_update().clone();

        // Each panel renders on its own; a failing one is replaced by a
        // diagnostic and the others still show.
        let stats = match console.stats_overview().await {
            Ok(overview) => display::stats_card(&overview),
            Err(e) => display::error_panel("Dashboard", &e),
        };
        let logs = match console.logs().await {
            Ok(logs) => display::log_lines(&logs),
            Err(e) => display::error_panel("Agent logs", &e),
        };

        print!("\x1b[2J\x1b[H");
        print!("{}", display::job_panel(&job));
        println!();
        print!("{stats}");
        println!();
        println!("Agent logs");
        print!("{logs}");
        println!("\n(Ctrl-C to exit)");
    }
}
