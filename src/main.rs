//! Checkr Runner - Entry Point
//!
//! Sends one request per URL argument through the configured proxy pool.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{error, info, info_span, warn, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use checkr::config::Config;
use checkr::error::{CheckrError, Result};
use checkr::models::{ProxyProtocol, RunSettings, RunStatistics};
use checkr::proxy::ProxyPool;
use checkr::request::{ContentType, Engine, ExecuteOutcome, HyperTransport, Request};
use checkr::template::Variables;

const USAGE: &str = "usage: checkr [--method GET|POST] [--body TEXT] URL...";

/// Command line arguments
#[derive(Debug, Default)]
struct Args {
    method: Option<String>,
    body: Option<String>,
    urls: Vec<String>,
}

impl Args {
    fn parse(mut raw: impl Iterator<Item = String>) -> Result<Self> {
        let mut args = Args::default();
        while let Some(arg) = raw.next() {
            match arg.as_str() {
                "--method" | "-m" => args.method = Some(next_value(&mut raw, &arg)?),
                "--body" | "-b" => args.body = Some(next_value(&mut raw, &arg)?),
                "--help" | "-h" => return Err(CheckrError::InvalidConfig(USAGE.into())),
                _ => args.urls.push(arg),
            }
        }
        if args.urls.is_empty() {
            return Err(CheckrError::InvalidConfig(USAGE.into()));
        }
        Ok(args)
    }
}

fn next_value(raw: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    raw.next()
        .ok_or_else(|| CheckrError::InvalidConfig(format!("{} requires a value", flag)))
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("checkr={}", config.log.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.log.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    }
}

fn session_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(11)
        .map(char::from)
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;
    init_tracing(&config);

    let args = Args::parse(std::env::args().skip(1))?;

    let session = session_id();
    run(config, args)
        .instrument(info_span!("session", id = %session))
        .await
}

async fn run(config: Config, args: Args) -> Result<()> {
    info!("Starting Checkr");

    // Proxy pool and run settings
    let pool = Arc::new(ProxyPool::new(config.proxy.rotation));
    if let Some(path) = &config.proxy.file {
        pool.load_file(path).await?;
    }

    let settings = Arc::new(RunSettings::new());
    if let Some(protocol) = config.proxy.protocol.as_deref().and_then(ProxyProtocol::from_tag) {
        settings.set_proxy_protocol(protocol);
    }

    let stats = Arc::new(RunStatistics::new());
    let variables = Arc::new(Variables::with_stats(stats.clone()));
    let transport = Arc::new(HyperTransport::new(config.request_timeout())?);

    let engine = Arc::new(
        Engine::new(pool.clone(), settings, stats.clone(), transport)
            .with_template(variables)
            .with_retry_policy(config.retry_policy()),
    );
    info!(
        strategy = pool.strategy_name(),
        workers = config.runner.workers,
        "Engine ready"
    );

    let connect_timeout_ms = config.request.connect_timeout_ms;
    let method = args.method.clone();
    let body = args.body.clone();

    stream::iter(args.urls.into_iter().enumerate())
        .map(|(idx, url)| {
            let engine = engine.clone();
            let method = method.clone();
            let body = body.clone();
            let span = info_span!("task", idx, url = %url);

            async move {
                let mut request = Request::new(engine);
                request.build_with_timeout(&url, connect_timeout_ms);
                if let Some(method) = &method {
                    request.method(method);
                }
                if let Some(body) = &body {
                    request.add_body(body, ContentType::Form);
                }

                match request.execute().await {
                    ExecuteOutcome::Completed { attempts, status } => {
                        let bytes = request.source().data().map(str::len).unwrap_or(0);
                        info!(status, bytes, attempts, "Request completed");
                    }
                    ExecuteOutcome::Swallowed { attempts, error } => {
                        warn!(attempts, error = %error, "Request failed");
                    }
                    ExecuteOutcome::Exhausted { attempts } => {
                        warn!(attempts, "Request gave up after retry limit");
                    }
                    ExecuteOutcome::Rejected { reason } => {
                        error!(reason = %reason, "Request rejected");
                    }
                }
            }
            .instrument(span)
        })
        .buffer_unordered(config.runner.workers)
        .collect::<Vec<_>>()
        .await;

    let snapshot = serde_json::to_string(&stats.snapshot())
        .map_err(|e| CheckrError::Internal(format!("Failed to serialize stats: {}", e)))?;
    println!("{}", snapshot);

    info!("Checkr stopped");
    Ok(())
}
