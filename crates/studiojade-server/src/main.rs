use std::env;

use anyhow::Context;
use studiojade_server::config::loader::{DEFAULT_CONFIG_FILE, load_config};
use studiojade_server::{AppConfig, ServerBuilder, observability};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From STUDIOJADE_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (studiojade.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (STUDIOJADE_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

fn main() {
    // Optional .env for local development
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    observability::init_tracing();

    let (config_path, source) = resolve_config_path();
    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        path = %config_path,
        source = %source,
        "Configuration loaded"
    );
    observability::apply_logging_level(&cfg.logging.level);

    if let Err(err) = run(cfg) {
        eprintln!("Server error: {err:#}");
        std::process::exit(2);
    }
}

fn run(cfg: AppConfig) -> anyhow::Result<()> {
    let worker_threads = cfg.worker_threads();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async move {
        tracing::info!(
            worker_threads,
            api_url = %cfg.upstream.api_url,
            "Starting StudioJade server"
        );
        let server = match ServerBuilder::new().with_config(cfg).build() {
            Ok(server) => server,
            Err(e) => {
                tracing::error!(
                    category = %e.category(),
                    error = %e,
                    "Server initialization failed"
                );
                return Err(anyhow::Error::new(e).context("server initialization failed"));
            }
        };
        tracing::info!(addr = %server.addr(), "Server initialized");
        server.run().await
    })
}

/// Resolve the configuration file path.
///
/// Priority order:
/// 1. CLI argument: --config <path>
/// 2. Environment variable: STUDIOJADE_CONFIG
/// 3. Default: studiojade.toml
fn resolve_config_path() -> (String, ConfigSource) {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config"
            && let Some(path) = args.next()
        {
            return (path, ConfigSource::CliArgument);
        }
    }

    if let Ok(path) = env::var("STUDIOJADE_CONFIG")
        && !path.is_empty()
    {
        return (path, ConfigSource::EnvironmentVariable);
    }

    (DEFAULT_CONFIG_FILE.to_string(), ConfigSource::Default)
}
