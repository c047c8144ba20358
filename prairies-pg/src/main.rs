//! Point d'entrée CLI pour prairies-pg

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// Charger .env au démarrage
fn load_env() {
    // Chercher .env dans le répertoire courant ou parent
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

mod cli;

use cli::{Commands, SourceArgs};

/// Explorer l'altitude et la pente des prairies, de la région à la parcelle
#[derive(Parser)]
#[command(name = "prairies-pg")]
#[command(author, version)]
#[command(about = "Drill-down viewer of grassland parcels: region, department, commune, parcel")]
#[command(long_about = "Explore the surface-weighted mean altitude and slope of agricultural parcels, filtered by land-cover type.\n\nParcels are aggregated in PostgreSQL (default) or in memory with --parcels. Without a subcommand, starts the interactive shell.")]
struct Cli {
    /// Augmenter la verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Sous-commande (défaut: shell)
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    source: SourceArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Charger .env avant tout
    load_env();

    let cli = Cli::parse();

    // Configurer le logging
    init_logging(cli.verbose, cli.quiet);

    match cli.command.unwrap_or(Commands::Shell) {
        Commands::Shell => {
            info!(config = %cli.source.config, "Starting shell");
            cli::cmd_shell(&cli.source).await?;
        }
        Commands::Categories => cli::cmd_categories(&cli.source).await?,
        Commands::Search { text } => cli::cmd_search(&cli.source, &text).await?,
        Commands::Jump { kind, code } => {
            info!(level = %kind, code = %code, "Jump");
            cli::cmd_jump(&cli.source, kind, &code).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
