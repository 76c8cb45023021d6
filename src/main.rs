//! API Dispatch
//!
//! Operator CLI for inspecting and exercising the endpoint dispatch engine
//! against an endpoint file.

use anyhow::{Context, Result};
use api_dispatch::{
    config::{DispatchSettings, Environment, LogFormat},
    logging::init_tracing,
    services::dispatch::{Dispatcher, FailureReport},
    store::{ConfigStore, FileConfigStore},
};
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

/// API Dispatch
///
/// Selects backend API endpoints and credential keys with health-aware
/// round-robin and priority failover.
#[derive(Parser, Debug)]
#[command(name = "api-dispatch")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON endpoint file (overrides ENDPOINTS_FILE env var)
    #[arg(short = 'f', long)]
    endpoints: Option<PathBuf>,

    /// Only consider endpoints of this provider
    #[arg(short, long)]
    provider: Option<String>,

    /// Log level: trace, debug, info, warn, error (overrides LOG_LEVEL env var)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (overrides LOG_FORMAT env var)
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Environment: dev, staging, prod (overrides ENVIRONMENT env var)
    #[arg(short, long)]
    env: Option<Environment>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print endpoint health and the rotation cursor as JSON
    Status,

    /// Print the failover queue and chosen key for consecutive requests
    Plan {
        #[arg(short = 'n', long, default_value = "1")]
        requests: usize,
    },

    /// Dispatch requests, failing the listed endpoints, then print status
    Simulate {
        #[arg(short = 'n', long, default_value = "10")]
        requests: usize,

        /// Endpoint ids whose attempts always fail
        #[arg(long = "fail")]
        fail: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = DispatchSettings::load()?;
    if let Some(path) = args.endpoints {
        settings.endpoints_file = Some(path);
    }
    if let Some(log_level) = args.log_level {
        settings.log_level = log_level;
    }
    if let Some(log_format) = args.log_format {
        settings.log_format = log_format;
    }
    if let Some(env) = args.env {
        settings.environment = env;
    }

    init_tracing(&settings.log_level, settings.log_format)?;

    let path = settings
        .endpoints_file
        .clone()
        .context("No endpoint file given; pass --endpoints or set ENDPOINTS_FILE")?;
    let store = Arc::new(FileConfigStore::open(&path).await?);

    tracing::info!(
        app_name = %settings.app_name,
        version = %settings.app_version,
        environment = %settings.environment,
        endpoints = %path.display(),
        "Starting dispatcher"
    );

    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        settings.dispatcher_config(),
    ));
    let listener = dispatcher.spawn_change_listener(store.subscribe());
    let provider = args.provider.as_deref();

    match args.command {
        Command::Status => print_status(&dispatcher, provider).await?,
        Command::Plan { requests } => plan(&dispatcher, provider, requests).await?,
        Command::Simulate { requests, fail } => {
            let failing: HashSet<String> = fail.into_iter().collect();
            simulate(&dispatcher, provider, requests, &failing).await?;
            print_status(&dispatcher, provider).await?;
        }
    }

    listener.abort();
    Ok(())
}

async fn print_status(dispatcher: &Dispatcher, provider: Option<&str>) -> Result<()> {
    let status = dispatcher.status(provider).await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn plan(dispatcher: &Dispatcher, provider: Option<&str>, requests: usize) -> Result<()> {
    for request in 1..=requests {
        match dispatcher.plan(provider).await? {
            Some(plan) => {
                let queue: Vec<&str> = plan.queue.iter().map(|e| e.id.as_str()).collect();
                let key = plan
                    .key
                    .as_ref()
                    .map_or_else(|| "-".to_string(), |k| k.index.to_string());
                println!(
                    "#{request}: endpoint={} key={key} queue=[{}]",
                    plan.endpoint().id,
                    queue.join(", ")
                );
            }
            None => println!("#{request}: no endpoint available"),
        }
    }
    Ok(())
}

/// Walk each request's failover queue the way a transport layer would
async fn simulate(
    dispatcher: &Dispatcher,
    provider: Option<&str>,
    requests: usize,
    failing: &HashSet<String>,
) -> Result<()> {
    for request in 1..=requests {
        let Some(plan) = dispatcher.plan(provider).await? else {
            println!("#{request}: no endpoint available");
            continue;
        };

        let mut served_by = None;
        let mut key = plan.key.clone();
        for (offset, endpoint) in plan.queue[plan.attempt..].iter().enumerate() {
            if offset > 0 {
                // skip fallbacks whose keys are all cooling down
                let Some(usable) = dispatcher.usable_key(endpoint) else {
                    continue;
                };
                key = usable;
            }
            if failing.contains(&endpoint.id) {
                if let Some(key) = &key {
                    dispatcher.report_key_failure(&endpoint.id, &key.key);
                }
                dispatcher.report_failure(
                    &endpoint.id,
                    FailureReport::new("simulated", "endpoint marked as failing"),
                );
                continue;
            }
            if let Some(key) = &key {
                dispatcher.report_key_success(&endpoint.id, &key.key);
            }
            dispatcher.report_success(&endpoint.id);
            served_by = Some(endpoint.id.clone());
            break;
        }

        match served_by {
            Some(id) => println!("#{request}: served by {id}"),
            None => println!("#{request}: all attempts failed"),
        }
    }
    Ok(())
}
