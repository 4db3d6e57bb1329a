use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::config::TurnstileConfig;
use turnstile::ratelimit::{Backend, RateLimiter, RateSpec};
use turnstile::store::RedisBackend;

/// Distributed admission control against a shared Redis server.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about)]
struct Cli {
    /// YAML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Redis URL, overriding the configuration
    #[arg(long)]
    redis_url: Option<String>,

    /// Key namespace prefix, overriding the configuration
    #[arg(long)]
    prefix: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Wait until admitted and print the admission
    Acquire {
        #[command(flatten)]
        target: Target,

        /// Give up after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Make one attempt without waiting; exits with status 1 when denied
    Check {
        #[command(flatten)]
        target: Target,
    },
    /// Print the number of admissions in the current window
    Inspect {
        #[command(flatten)]
        target: Target,
    },
    /// Print the store's clock
    Time,
}

#[derive(Debug, Args)]
struct Target {
    /// Caller identifier the quota is shared under
    key: String,

    /// Named limit from the configuration
    #[arg(long, conflicts_with_all = ["quota", "window_ms"])]
    limit: Option<String>,

    /// Admissions per window
    #[arg(long, requires = "window_ms")]
    quota: Option<u64>,

    /// Window length in milliseconds
    #[arg(long, requires = "quota")]
    window_ms: Option<u64>,
}

impl Target {
    fn rate_spec(&self, config: &TurnstileConfig) -> anyhow::Result<RateSpec> {
        match (&self.limit, self.quota, self.window_ms) {
            (Some(name), _, _) => Ok(config.limit(name)?),
            (None, Some(quota), Some(window_ms)) => {
                Ok(RateSpec::new(quota, Duration::from_millis(window_ms))?)
            }
            _ => anyhow::bail!("either --limit or both --quota and --window-ms are required"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = TurnstileConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.redis_url {
        config.redis.url = url;
    }
    if let Some(prefix) = cli.prefix {
        config.keys.prefix = prefix;
    }
    info!(redis = %config.redis.url, prefix = %config.keys.prefix, "Configuration loaded");

    let backend = Arc::new(RedisBackend::connect(&config.redis.url).await?);
    let limiter = RateLimiter::with_keys(backend.clone(), config.keys.key_builder()?);

    match cli.command {
        Command::Acquire { target, timeout_ms } => {
            let spec = target.rate_spec(&config)?;
            let admission = match timeout_ms {
                Some(ms) => {
                    limiter
                        .acquire_timeout(&target.key, &spec, Duration::from_millis(ms))
                        .await?
                }
                None => limiter.acquire(&target.key, &spec).await?,
            };
            println!("{}", serde_json::to_string(&admission)?);
        }
        Command::Check { target } => {
            let spec = target.rate_spec(&config)?;
            let decision = limiter.try_acquire(&target.key, &spec).await?;
            println!("{}", serde_json::to_string(&decision)?);
            if !decision.admitted {
                std::process::exit(1);
            }
        }
        Command::Inspect { target } => {
            let spec = target.rate_spec(&config)?;
            let count = limiter.window_count(&target.key, &spec).await?;
            println!(
                "{}",
                serde_json::json!({ "key": target.key, "quota": spec.quota(), "in_window": count })
            );
        }
        Command::Time => {
            let now = backend.server_time().await?;
            println!("{}", serde_json::json!({ "micros": now.as_micros() as u64 }));
        }
    }

    Ok(())
}
