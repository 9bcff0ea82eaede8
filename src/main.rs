//! report-stream CLI - Watch an AI report stream as it is written

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use report_stream::{
    config::Config,
    metrics::MetricsTracker,
    render::{DeltaTracker, TerminalRenderer, WaitingSpinner},
    stream::{connect, StreamRequest, StreamStatus},
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "report-stream")]
#[command(about = "Consume newline-delimited JSON report streams and print them live")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (overrides RUST_LOG and the config file)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Config file (default: platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a stream and print its text as it arrives
    Stream(StreamArgs),

    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Args)]
struct StreamArgs {
    /// Stream URL, absolute or a path resolved against server.base_url
    url: String,

    /// Send a POST with this JSON body instead of a GET
    #[arg(long)]
    post: Option<String>,

    /// Extra request header as NAME:VALUE (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Whole-stream deadline in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Print text only: no spinner, no markdown re-render
    #[arg(long)]
    raw: bool,

    /// Skip the stats line
    #[arg(long)]
    no_stats: bool,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Initialize configuration file with defaults
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Validate configuration
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load_from(config_path.clone())
        .with_context(|| format!("loading {}", config_path.display()))?;

    // Setup logging
    let filter = match &cli.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Stream(args) => {
            let succeeded = run_stream(config, args).await?;
            if !succeeded {
                std::process::exit(1);
            }
        }
        Commands::Config(cmd) => {
            run_config_command(cmd, config, config_path)?;
        }
    }

    Ok(())
}

fn build_request(args: &StreamArgs) -> Result<StreamRequest> {
    let mut request = match &args.post {
        Some(body) => {
            let json = serde_json::from_str(body).context("--post body is not valid JSON")?;
            StreamRequest::post(args.url.clone(), json)
        }
        None => StreamRequest::get(args.url.clone()),
    };

    for header in &args.headers {
        let Some((name, value)) = header.split_once(':') else {
            bail!("header {:?} must look like NAME:VALUE", header);
        };
        request = request.with_header(name.trim(), value.trim());
    }

    Ok(request)
}

async fn run_stream(mut config: Config, args: StreamArgs) -> Result<bool> {
    if let Some(secs) = args.timeout {
        config.server.request_timeout_secs = Some(secs);
    }

    let request = build_request(&args)?;
    let metrics = MetricsTracker::new();
    let session = connect(&config, metrics.clone())?;
    let renderer = TerminalRenderer::new();

    let mut spinner = WaitingSpinner::new();
    if config.display.spinner && !args.raw {
        spinner.start("Waiting for report...");
    }

    let generation = session.start(request);
    info!("Started stream {}", generation);

    let mut updates = session.subscribe();
    let mut tracker = DeltaTracker::new();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        let snapshot = updates.borrow_and_update().clone();
        let delta = tracker.advance(&snapshot.text);
        if !delta.is_empty() {
            spinner.stop();
            renderer.render_delta(delta);
        }
        if !snapshot.loading {
            break;
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                session.cancel();
            }
        }
    }
    spinner.stop();

    let snapshot = session.snapshot();
    let succeeded = match session.status() {
        StreamStatus::Done => {
            if snapshot.text.is_empty() {
                renderer.render_info("Stream ended without any text.");
            } else if config.display.markdown && !args.raw {
                renderer.render_report(&snapshot.text);
            } else {
                println!();
            }
            true
        }
        StreamStatus::Failed(reason) => {
            if !snapshot.text.is_empty() {
                println!();
            }
            renderer.render_error(&format!("Stream failed: {}", reason));
            false
        }
        StreamStatus::Idle | StreamStatus::Loading => {
            if !snapshot.text.is_empty() {
                println!();
            }
            renderer.render_system("Cancelled.");
            true
        }
    };

    if config.display.show_stats && !args.no_stats {
        renderer.render_stats(&metrics.summary());
    }

    Ok(succeeded)
}

fn run_config_command(cmd: ConfigCommands, config: Config, path: PathBuf) -> Result<()> {
    let renderer = TerminalRenderer::new();

    match cmd {
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                renderer.render_info(&format!(
                    "Config already exists at {} (use --force to overwrite)",
                    path.display()
                ));
                return Ok(());
            }
            Config::default().save_to(path.clone())?;
            renderer.render_success(&format!("Wrote default config to {}", path.display()));
        }
        ConfigCommands::Show => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigCommands::Path => {
            println!("{}", path.display());
        }
        ConfigCommands::Validate => match config.validate() {
            Ok(()) => renderer.render_success("Configuration is valid"),
            Err(e) => {
                renderer.render_error(&e.to_string());
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
