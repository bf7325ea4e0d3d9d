use anyhow::{Context as _, Result};
use camd::config::{Config, Overrides};
use camd::media::SimulatedMediaController;
use camd::security::{HmacSecurityProvider, Role};
use camd::AppContext;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "camd",
    about = "camd — multi-camera recording service API daemon",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to the TOML config file
    #[arg(long, env = "CAMD_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Bind host for the WebSocket server
    #[arg(long, env = "CAMD_HOST")]
    host: Option<String>,

    /// Bind port for the WebSocket server
    #[arg(long, env = "CAMD_PORT")]
    port: Option<u16>,

    /// HMAC secret for bearer-token verification
    #[arg(long, env = "CAMD_JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CAMD_LOG")]
    log: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "CAMD_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon (default when no subcommand given).
    ///
    /// Serves the WebSocket JSON-RPC endpoint against the simulated media
    /// controller. Production deployments compose the library with a real
    /// controller instead.
    Serve,
    /// Mint a bearer token with the configured secret.
    ///
    /// Examples:
    ///   camd token --user alice --role operator
    ///   camd token --user ops --role admin --ttl-hours 8
    Token {
        /// User id to put in the token subject
        #[arg(long)]
        user: String,
        /// Role claim: viewer, operator, or admin
        #[arg(long)]
        role: String,
        /// Token lifetime in hours
        #[arg(long, default_value_t = 24)]
        ttl_hours: u64,
    },
    /// Print the effective configuration and exit.
    Config,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = args.log.clone().unwrap_or_else(|| "info".to_string());
    let _log_guard = setup_logging(&log_level, args.log_file.as_deref());

    let config = Config::new(
        args.config.as_deref(),
        Overrides {
            host: args.host.clone(),
            port: args.port,
            jwt_secret_key: args.jwt_secret.clone(),
        },
    );

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(config),
        Command::Token {
            user,
            role,
            ttl_hours,
        } => {
            let role = Role::parse(&role)
                .with_context(|| format!("unknown role '{role}' — use viewer, operator, or admin"))?;
            if config.security.jwt_secret_key.is_empty() {
                anyhow::bail!("no jwt_secret_key configured — set CAMD_JWT_SECRET or [security] in the config file");
            }
            let provider = HmacSecurityProvider::new(config.security.jwt_secret_key.into_bytes());
            use camd::security::SecurityProvider as _;
            let token = provider.generate_token(&user, role, ttl_hours)?;
            println!("{token}");
            Ok(())
        }
        Command::Config => {
            println!("{config:#?}");
            Ok(())
        }
    }
}

fn run_server(config: Config) -> Result<()> {
    if config.security.jwt_secret_key.is_empty() {
        anyhow::bail!(
            "refusing to start without a jwt_secret_key — set CAMD_JWT_SECRET or [security] in the config file"
        );
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let media = SimulatedMediaController::new();
        // Progressive Readiness: the server binds and serves immediately;
        // the controller flips the gate once discovery completes.
        media.start(std::time::Duration::from_secs(2));
        warn!("running with the simulated media controller — no real cameras are attached");

        let security = Arc::new(HmacSecurityProvider::new(
            config.security.jwt_secret_key.clone().into_bytes(),
        ));
        let ctx = AppContext::new(config, media, security);

        // Graceful shutdown on SIGTERM (Unix) or Ctrl-C.
        let shutdown_ctx = ctx.clone();
        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            info!("shutdown signal received");
            shutdown_ctx.begin_shutdown();
        });

        camd::serve(ctx).await
    })
}

/// Resolves when a shutdown signal is received.
///
/// On Unix we listen for SIGTERM *and* Ctrl-C; elsewhere Ctrl-C only.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("camd.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            tracing_subscriber::fmt()
                .with_env_filter(log_level)
                .compact()
                .init();
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(log_level))
            .with(tracing_subscriber::fmt::layer().compact())
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .init();

        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(log_level)
            .compact()
            .init();
        None
    }
}
