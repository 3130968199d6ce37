//! `dolesa` entrypoint and subcommand dispatch.

mod config;
mod daemon;
#[cfg(test)]
mod test_support;

use std::fmt::Write as _;
use std::io::BufRead;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use api::{ApiServer, RouterOptions};
use clap::{Args, Parser, Subcommand};
use gateway::credentials::MIN_PASSWORD_LEN;
use gateway::{Gateway, digest_password};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Top-level command-line arguments.
#[derive(Parser)]
#[command(name = "dolesa")]
#[command(about = "Authenticated HTTP gateway to a RabbitMQ broker", version)]
struct Cli {
    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Also write logs to daily-rotated files in this directory
    #[arg(long, env = "DOLESA_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP gateway (default when no subcommand is given)
    Serve(ServeArgs),

    /// Load queues, users and broker settings, print a summary and exit
    CheckConfig(ServeArgs),

    /// Print the SHA-256 digest of a password for the users file
    Digest {
        /// Password to digest; read from stdin when omitted
        password: Option<String>,
    },
}

/// Overrides applied on top of the environment.
#[derive(Args, Debug, Clone, Default)]
struct ServeArgs {
    /// Listen port (overrides PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Listen address (overrides DOLESA_BIND)
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Route prefix such as /dolesa (overrides DOLESA_URL_PREFIX)
    #[arg(long)]
    url_prefix: Option<String>,

    /// Queue definitions file (overrides DOLESA_QUEUES_FILE)
    #[arg(long)]
    queues_file: Option<PathBuf>,

    /// Users file (overrides DOLESA_USERS_FILE)
    #[arg(long)]
    users_file: Option<PathBuf>,

    /// Use a process-local broker instead of RabbitMQ
    #[arg(long, default_value_t = false)]
    in_memory_broker: bool,
}

impl ServeArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if let Some(prefix) = &self.url_prefix {
            config.server.url_prefix = Some(prefix.clone());
        }
        if let Some(path) = &self.queues_file {
            config.queues_file = path.clone();
        }
        if let Some(path) = &self.users_file {
            config.users_file = path.clone();
        }
    }

    fn resolve_config(&self) -> anyhow::Result<Config> {
        let mut config = Config::load().context("invalid environment configuration")?;
        self.apply(&mut config);
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // WorkerGuard must outlive main() so buffered file writes are flushed on exit.
    let _file_guard = init_tracing(&cli.log_level, cli.log_dir.as_deref())?;

    let command = cli
        .command
        .unwrap_or_else(|| Commands::Serve(ServeArgs::default()));
    match command {
        Commands::Serve(args) => cmd_serve(args).await,
        Commands::CheckConfig(args) => cmd_check_config(args),
        Commands::Digest { password } => cmd_digest(password),
    }
}

fn init_tracing(log_level: &str, log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let console = fmt::layer().with_target(false).with_filter(console_filter);

    let (file, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("cannot create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "dolesa.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .with_filter(EnvFilter::new(
                    "debug,hyper_util=info,rustls=info,reqwest=info",
                ));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .init();
    Ok(guard)
}

async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = args.resolve_config()?;
    let gateway = config
        .build_gateway(args.in_memory_broker)
        .context("failed to load gateway configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.server.addr(),
        queues = gateway.queues().len(),
        users = gateway.credentials().len(),
        default_queue = %gateway.queues().default_queue().name(),
        "Starting dolesa"
    );

    let options = RouterOptions {
        url_prefix: config.server.url_prefix.clone(),
    };
    ApiServer::new(gateway, &options)
        .bind_and_serve(config.server.addr(), daemon::wait_for_shutdown())
        .await
        .with_context(|| format!("HTTP server on {} failed", config.server.addr()))?;

    info!("dolesa stopped");
    Ok(())
}

fn cmd_check_config(args: ServeArgs) -> anyhow::Result<()> {
    let config = args.resolve_config()?;
    let gateway = config
        .build_gateway(args.in_memory_broker)
        .context("configuration is invalid")?;
    print!("{}", config_summary(&config, &gateway, args.in_memory_broker));
    Ok(())
}

fn cmd_digest(password: Option<String>) -> anyhow::Result<()> {
    let password = match password {
        Some(password) => password,
        None => {
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .context("failed to read password from stdin")?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };
    println!("{}", password_digest(&password)?);
    Ok(())
}

fn password_digest(password: &str) -> anyhow::Result<String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        bail!("password must be at least {MIN_PASSWORD_LEN} characters");
    }
    Ok(digest_password(password))
}

fn config_summary(config: &Config, gateway: &Gateway, in_memory_broker: bool) -> String {
    let mut out = String::new();
    let queues = gateway.queues();
    let _ = writeln!(out, "listen:   {}", config.server.addr());
    if let Some(prefix) = config.server.url_prefix.as_deref().and_then(api::normalize_prefix) {
        let _ = writeln!(out, "prefix:   {prefix}");
    }
    let _ = writeln!(
        out,
        "limits:   max_content_length={} max_receive_count={}",
        config.limits.max_content_length, config.limits.max_receive_count
    );
    if in_memory_broker {
        let _ = writeln!(out, "broker:   in-memory");
    } else {
        let rabbitmq = &config.rabbitmq;
        let _ = writeln!(
            out,
            "broker:   rabbitmq {}:{} exchange={} vhost={}",
            rabbitmq.host.as_deref().unwrap_or_default(),
            rabbitmq.port,
            rabbitmq.exchange.as_deref().unwrap_or_default(),
            rabbitmq.vhost
        );
    }

    let _ = writeln!(out, "queues ({}):", queues.len());
    for queue in queues.iter() {
        let mut flags = Vec::new();
        if queue.name() == queues.default_queue().name() {
            flags.push("default");
        }
        if queue.schema().is_some() {
            flags.push("schema");
        }
        if flags.is_empty() {
            let _ = writeln!(out, "  {}", queue.name());
        } else {
            let _ = writeln!(out, "  {} [{}]", queue.name(), flags.join(", "));
        }
    }

    let credentials = gateway.credentials();
    let _ = writeln!(out, "users ({}):", credentials.len());
    for username in credentials.usernames() {
        let permissions = credentials
            .get(username)
            .map(|user| {
                user.permissions()
                    .iter()
                    .map(|p| p.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        let _ = writeln!(out, "  {username}: {permissions}");
    }
    out
}
