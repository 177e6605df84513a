//! KolPages kiosk: entry point.

use std::path::Path;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use kolpages_kiosk::config::{resolve_config_path, KioskConfig};
use kolpages_kiosk::kiosk::Kiosk;
use kolpages_kiosk::repl;

#[derive(Parser)]
#[command(
    name = "kolpages",
    about = "Kiosk launcher for curated third-party sites with automatic page clean-up",
    version
)]
struct Cli {
    /// Path to appsettings.json.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the kiosk window and the operator console (default).
    Run {
        /// Site to open right after launch.
        #[arg(short, long)]
        site: Option<String>,
    },

    /// Launch the kiosk on one site and keep it patched until Ctrl+C.
    Open {
        /// Site name as configured.
        site: String,
    },

    /// List configured sites.
    Sites,

    /// Load and validate the configuration file.
    Validate,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   kolpages completions bash > ~/.local/share/bash-completion/completions/kolpages
    ///   kolpages completions zsh > ~/.zfunc/_kolpages
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = resolve_config_path(cli.config.as_deref());

    match cli.command.unwrap_or(Commands::Run { site: None }) {
        Commands::Run { site } => {
            let config = load_config(&config_path)?;
            let kiosk = Kiosk::launch(config).await?;
            if let Some(site) = site {
                if let Err(e) = kiosk.open(&site).await {
                    eprintln!("  {e}");
                }
            }
            let result = repl::run(&kiosk).await;
            kiosk.shutdown().await?;
            result?;
        }

        Commands::Open { site } => {
            let config = load_config(&config_path)?;
            if config.find_site(&site).is_none() {
                anyhow::bail!("Unknown site '{site}'. Run `kolpages sites` to list configured sites.");
            }
            let kiosk = Kiosk::launch(config).await?;
            let outcome = kiosk.open(&site).await?;
            tracing::info!("Showing {} (Ctrl+C to quit)", outcome.final_url);
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl+C")?;
            kiosk.shutdown().await?;
        }

        Commands::Sites => {
            let config = load_config(&config_path)?;
            let marker = &config.patching.continuous_marker;
            for site in config.visible_sites() {
                let removals = site.id_directives.len() + site.selector_directives.len();
                let upkeep = if site.wants_continuous(marker) {
                    ", continuous"
                } else {
                    ""
                };
                println!("{:<20} {} ({removals} removals{upkeep})", site.name, site.url);
            }
        }

        Commands::Validate => {
            let config = load_config(&config_path)?;
            let hidden = config.websites.iter().filter(|s| !s.visible).count();
            println!("Valid config: {}", config_path.display());
            println!("  Sites:          {} ({hidden} hidden)", config.websites.len());
            println!("  Burst attempts: {}", config.patching.burst_attempts);
            println!("  Burst delay:    {}ms", config.patching.burst_delay_ms);
            println!("  Upkeep every:   {}ms", config.patching.upkeep_interval_ms);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "kolpages", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<KioskConfig> {
    KioskConfig::load(path).with_context(|| format!("failed to load {}", path.display()))
}
