//! Command-line entry point: one worker per target router.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{error, info};
use tokio::task::JoinSet;

use routerprobe::notify::EmailNotifier;
use routerprobe::{Commander, Router, SessionLog, SshConfig, runner};

#[derive(Parser, Debug)]
#[command(name = "routerprobe", version, about = "Failure-diagnosis automation for network routers")]
struct Args {
    /// Name of a single target router.
    #[arg(long, conflicts_with = "routers_file")]
    router_name: Option<String>,

    /// File with one router name per line.
    #[arg(long)]
    routers_file: Option<PathBuf>,

    /// YAML specification of commands, tests and modes.
    #[arg(long)]
    commands_file: PathBuf,

    /// Username for the SSH session.
    #[arg(long, default_value = "admin")]
    username: String,

    /// Password for the SSH session.
    #[arg(long)]
    password: String,

    /// SSH port.
    #[arg(long, default_value_t = 22)]
    port: u16,

    /// Directory for per-router session logs.
    #[arg(long, default_value = ".")]
    log_dir: PathBuf,

    /// Send the session log by email when a run completes.
    #[arg(long, requires_all = ["smtp_server", "smtp_user", "smtp_password", "email_from", "email_to"])]
    notify: bool,

    /// SMTP relay as host:port.
    #[arg(long)]
    smtp_server: Option<String>,

    /// SMTP authentication user.
    #[arg(long)]
    smtp_user: Option<String>,

    /// SMTP authentication password.
    #[arg(long)]
    smtp_password: Option<String>,

    /// Sender address.
    #[arg(long)]
    email_from: Option<String>,

    /// Comma-separated recipient list.
    #[arg(long)]
    email_to: Option<String>,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let routers = match target_routers(&args) {
        Ok(routers) => routers,
        Err(message) => {
            error!("{message}");
            std::process::exit(1);
        }
    };

    let commander = match Commander::load(&args.commands_file) {
        Ok(commander) => Arc::new(commander),
        Err(e) => {
            error!(
                "failed to load commands file {}: {e}",
                args.commands_file.display()
            );
            std::process::exit(1);
        }
    };

    let notifier = if args.notify {
        match EmailNotifier::new(
            args.smtp_server.as_deref().unwrap_or_default(),
            args.smtp_user.as_deref().unwrap_or_default(),
            args.smtp_password.as_deref().unwrap_or_default(),
            args.email_from.as_deref().unwrap_or_default(),
            args.email_to.as_deref().unwrap_or_default(),
        ) {
            Ok(notifier) => Some(Arc::new(notifier)),
            Err(e) => {
                error!("failed to instantiate email notifier: {e}");
                std::process::exit(1);
            }
        }
    } else {
        None
    };

    // One independent worker per router; a failure on one router never
    // affects the others.
    let mut workers = JoinSet::new();
    for router in routers {
        let commander = commander.clone();
        let notifier = notifier.clone();
        let args_username = args.username.clone();
        let args_password = args.password.clone();
        let log_dir = args.log_dir.clone();
        let port = args.port;
        workers.spawn(async move {
            worker(
                router,
                port,
                args_username,
                args_password,
                log_dir,
                commander,
                notifier,
            )
            .await;
        });
    }
    while let Some(result) = workers.join_next().await {
        if let Err(e) = result {
            error!("worker panicked: {e}");
        }
    }
}

fn target_routers(args: &Args) -> Result<Vec<String>, String> {
    match (&args.router_name, &args.routers_file) {
        (Some(name), None) => Ok(vec![name.clone()]),
        (None, Some(path)) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("failed to read routers file {}: {e}", path.display()))?;
            let routers: Vec<String> = text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect();
            if routers.is_empty() {
                return Err(format!("routers file {} is empty", path.display()));
            }
            Ok(routers)
        }
        _ => Err("exactly one of --router-name and --routers-file is required".to_string()),
    }
}

async fn worker(
    name: String,
    port: u16,
    username: String,
    password: String,
    log_dir: PathBuf,
    commander: Arc<Commander>,
    notifier: Option<Arc<EmailNotifier>>,
) {
    info!("router name: {name}");

    let log = match SessionLog::create(&name, &log_dir).await {
        Ok(log) => log,
        Err(e) => {
            error!("router {name}: failed to create session log: {e}");
            return;
        }
    };

    let config = SshConfig::with_password(name.clone(), port, username, password);
    let mut router = match Router::connect(name.clone(), config, Some(log.clone())).await {
        Ok(router) => router,
        Err(e) => {
            error!("router {name}: failed to connect: {e}");
            return;
        }
    };

    match runner::run(&mut router, &commander, notifier.as_deref()).await {
        Ok(triggered) => {
            info!("router {name}: run completed, triggered: {triggered}");
        }
        Err(e) => {
            error!("router {name}: run failed: {e}");
        }
    }

    if let Err(e) = log.close().await {
        error!("router {name}: failed to close session log: {e}");
    }
    if let Err(e) = router.close().await {
        error!("router {name}: failed to disconnect: {e}");
    }
}
