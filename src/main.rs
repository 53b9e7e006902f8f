use clap::Parser;
use modindex::cli::{Cli, Commands};
use modindex::types::config::Config;
use modindex::ModIndexResult;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ModIndexResult<()> {
    let cli = Cli::parse();

    // Load configuration first (no logging yet)
    let config = if cli.config.exists() {
        Config::load(&cli.config).unwrap_or_else(|_| Config::default_config())
    } else {
        Config::default_config()
    };

    // CLI flags take precedence over config
    let log_level = if cli.quiet {
        "error".to_string()
    } else if cli.verbose {
        "debug".to_string()
    } else {
        config.general.log_level.clone()
    };

    let filter = EnvFilter::from_default_env().add_directive(
        format!("modindex={}", log_level)
            .parse()
            .unwrap_or_else(|_| "modindex=info".parse().expect("fallback directive is valid")),
    );

    let json = config.general.log_format == "json";
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();

    tracing::debug!("Configuration loaded from: {}", cli.config.display());

    match cli.command {
        Commands::Init { path } => {
            modindex::cli::commands::init(path).await?;
        }
        Commands::Mods {
            query,
            tags,
            featured,
            sort,
            page,
            per_page,
        } => {
            modindex::cli::commands::mods(query, tags, featured, sort, page, per_page, &config)
                .await?;
        }
        Commands::Info { id } => {
            modindex::cli::commands::info(&id, &config).await?;
        }
        Commands::Release { id, select } => {
            modindex::cli::commands::release(&id, &select, &config).await?;
        }
        Commands::Tags => {
            modindex::cli::commands::tags(&config).await?;
        }
        Commands::Logo { id, output } => {
            modindex::cli::commands::logo(&id, &output, &config).await?;
        }
        Commands::Updates { installed } => {
            modindex::cli::commands::updates(installed, &config).await?;
        }
        Commands::Version => {
            modindex::cli::commands::version();
        }
    }

    Ok(())
}
