use std::{collections::HashSet, error::Error, path::PathBuf, process};

use clap::{command, Parser, ValueHint};
use log::{debug, error, info, warn, LevelFilter};

use quaver::{
    config::Config, events::Notification, protocol::Domain, sync::Client,
    transport::ReplayTransport,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when built in release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory of recorded event streams
    ///
    /// Each domain is replayed from `<domain>.jsonl` in this directory, with
    /// one JSON event per line.
    #[arg(short, long, value_name = "DIR", value_hint = ValueHint::DirPath)]
    events: PathBuf,

    /// Configuration file
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Filter keywords
    ///
    /// Only rows whose fields contain every keyword are shown. Overrides the
    /// filter of the configuration file.
    #[arg(short, long)]
    filter: Option<String>,

    /// Domains to synchronize
    ///
    /// [default: all domains]
    #[arg(value_name = "DOMAIN")]
    domains: Vec<Domain>,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            // Quiet and verbose are mutually exclusive.
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module("quaver", level);
    }

    logger.init();
}

/// Replays the recorded streams and prints the resulting trees.
///
/// # Errors
///
/// Returns an error when the configuration cannot be read or no domain could
/// be subscribed.
async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(filter) = args.filter {
        config.filter = filter;
    }

    let domains = if args.domains.is_empty() {
        Domain::ALL.to_vec()
    } else {
        args.domains
    };

    let transport = ReplayTransport::new(args.events.clone());
    let (mut client, mut notifications) = Client::new(transport, &config);

    let mut pending = HashSet::new();
    for domain in domains {
        match client.subscribe(domain).await {
            Ok(()) => {
                pending.insert(domain);
            }
            Err(e) => error!("{domain}: {e}"),
        }
    }
    if pending.is_empty() {
        return Err("no domain could be subscribed".into());
    }

    // Replayed streams end by themselves. Keep the subscriptions alive until
    // then, so every tree is complete when printed.
    let mut finished = Vec::new();
    while !pending.is_empty() {
        tokio::select! {
            // Prioritize shutdown signals.
            biased;

            _ = tokio::signal::ctrl_c() => {
                info!("shutting down gracefully");
                break;
            }

            notification = notifications.recv() => {
                let Some(notification) = notification else {
                    break;
                };
                debug!("{notification}");

                if let Notification::StreamEnded { domain, error } = notification {
                    if let Some(e) = error {
                        warn!("{domain}: replay stopped early: {e}");
                    }
                    if pending.remove(&domain) {
                        finished.push(domain);
                    }
                }
            }
        }
    }

    for domain in finished {
        println!("{}", client.tree(domain));
    }

    client.shutdown().await;
    Ok(())
}

/// Main entry point of the application.
#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
