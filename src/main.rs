use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use signstream::cli::{Cli, Commands, ConfigAction};
use signstream::config::Config;
use signstream::model::load_models;
use signstream::pipeline::{ClassList, EngineSettings, InferenceEngine};
use signstream::server::Server;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        None | Some(Commands::Serve) => {
            signstream::logging::init(cli.log_level())?;
            let config = load_config(&cli)?;
            serve(config).await?;
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, &cli)?;
        }
        Some(Commands::Classes) => {
            let config = load_config(&cli)?;
            let classes = ClassList::new(config.model.class_names()?)?;
            for name in classes.iter() {
                println!("{}", name);
            }
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                *shell,
                &mut Cli::command(),
                "signstream",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Load configuration: file (explicit or default path), then environment,
/// then command-line flags.
fn load_config(cli: &Cli) -> Result<Config> {
    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => match Config::default_path() {
            Some(path) => Config::load_or_default(&path)?,
            None => Config::default(),
        },
    };
    Ok(cli.apply_overrides(config.with_env_overrides()?))
}

async fn serve(config: Config) -> Result<()> {
    config.validate().context("invalid configuration")?;
    let classes =
        ClassList::new(config.model.class_names()?).context("failed to load class list")?;
    let models = load_models(&config).context("failed to load models")?;

    let engine = InferenceEngine::new(
        models.extractor,
        models.classifier,
        classes,
        EngineSettings::from_config(&config),
    );
    let server = Server::bind(&config, engine).await?;
    tracing::info!(
        version = %signstream::version_string(),
        address = %server.local_addr()?,
        "signstream ready"
    );

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT, shutting down"),
            res = wait_for_sigterm() => {
                if let Err(e) = res {
                    tracing::error!("error setting up signal handler: {}", e);
                }
                tracing::info!("received SIGTERM, shutting down");
            }
        }
        shutdown.shutdown();
    });

    let stats = server.run().await?;
    tracing::info!(
        frames = stats.frames,
        dropped = stats.frames_dropped,
        windows = stats.windows,
        emitted = stats.emitted,
        suppressed = stats.suppressed,
        "signstream stopped"
    );
    Ok(())
}

fn handle_config_command(action: &ConfigAction, cli: &Cli) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(cli)?;
            print!("{}", config.to_toml_string()?);
        }
        ConfigAction::Path => match cli.config.clone().or_else(Config::default_path) {
            Some(path) => println!("{}", path.display()),
            None => anyhow::bail!("no configuration directory on this system"),
        },
        ConfigAction::Validate => {
            let config = load_config(cli)?;
            config.validate()?;
            let classes = config.model.class_names()?;
            println!("Configuration is valid ({} classes)", classes.len());
        }
    }
    Ok(())
}

/// Wait for SIGTERM signal (used by systemd).
#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to register SIGTERM handler")?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    // Ctrl+C still works
    std::future::pending().await
}
