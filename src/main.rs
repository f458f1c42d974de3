use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use torero_dashboard::api::{AppState, create_router};
use torero_dashboard::capture::{InstallOutcome, UninstallOutcome, WrapperInstall};
use torero_dashboard::config::Config;
use torero_dashboard::executor::ToreroExecutor;
use torero_dashboard::inputs::InputResolver;
use torero_dashboard::paths;
use torero_dashboard::repository::{
    ExecutionRepository, QueueRepository, ServiceRepository, establish_connection,
};
use torero_dashboard::services::{CatalogService, CollectorService, QueueService, QueueSettings};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "torero_dashboard")]
#[command(version, about = "Execution queue and history collector for torero")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dashboard HTTP service (default)
    Serve,
    /// Replace the torero binary with the capture wrapper
    InstallWrapper {
        /// The torero binary to wrap
        #[arg(long)]
        target: Option<PathBuf>,
        /// The torero-capture binary to install
        #[arg(long)]
        wrapper: Option<PathBuf>,
    },
    /// Restore the original torero binary
    UninstallWrapper {
        #[arg(long)]
        target: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "torero_dashboard=debug,tower_http=debug,axum=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server().await,
        Commands::InstallWrapper { target, wrapper } => {
            let install = WrapperInstall::new(target.unwrap_or_else(default_target));
            let wrapper = match wrapper {
                Some(wrapper) => wrapper,
                None => sibling_wrapper()?,
            };
            match install.install(&wrapper)? {
                InstallOutcome::Installed => println!(
                    "installed capture wrapper at {}",
                    install.target().display()
                ),
                InstallOutcome::AlreadyInstalled => println!(
                    "capture wrapper already installed at {}",
                    install.target().display()
                ),
            }
            Ok(())
        }
        Commands::UninstallWrapper { target } => {
            let install = WrapperInstall::new(target.unwrap_or_else(default_target));
            match install.uninstall()? {
                UninstallOutcome::Restored => {
                    println!("restored original torero at {}", install.target().display())
                }
                UninstallOutcome::NotInstalled => println!(
                    "no capture wrapper installed at {}",
                    install.target().display()
                ),
            }
            Ok(())
        }
    }
}

async fn run_server() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    tracing::info!("Starting torero_dashboard with config: {:?}", config);

    std::fs::create_dir_all(&config.data_dir)?;
    if let Some(parent) = config.database_path().and_then(Path::parent) {
        std::fs::create_dir_all(parent)?;
    }

    let db_pool = establish_connection(&config.database_url).await?;
    tracing::info!("Database connected: {}", config.database_url);

    // Initialize repositories
    let queue_repo = QueueRepository::new(db_pool.clone());
    let execution_repo = ExecutionRepository::new(db_pool.clone());
    let service_repo = ServiceRepository::new(db_pool);

    // Initialize services
    let resolver = InputResolver::new(config.data_dir.clone());
    let executor = ToreroExecutor::new(
        config.torero_command.clone(),
        resolver.clone(),
        config.cli_timeout(),
    );
    let collector = CollectorService::new(execution_repo.clone(), service_repo.clone());
    let catalog = CatalogService::new(service_repo, executor.clone());

    let wrapper = WrapperInstall::new(wrapper_target(&config.torero_command));
    let queue_history = if wrapper.is_installed() {
        tracing::info!("capture wrapper installed, executions are reported by the wrapper");
        None
    } else {
        Some(collector.clone())
    };

    let queue = QueueService::start(
        queue_repo,
        execution_repo,
        executor,
        queue_history,
        QueueSettings {
            execution_timeout: config.execution_timeout(),
            history_limit: config.history_limit,
        },
    )
    .await?;

    let app = create_router(AppState {
        queue,
        collector,
        catalog,
        resolver,
    });
    let app = app.layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.host, config.port);
    let addr = addr.parse::<SocketAddr>()?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

fn default_target() -> PathBuf {
    PathBuf::from(paths::DEFAULT_TORERO_PATH)
}

/// A bare command name is looked up on PATH, so the default install location is assumed.
fn wrapper_target(torero_command: &Path) -> PathBuf {
    if torero_command.is_absolute() {
        torero_command.to_path_buf()
    } else {
        default_target()
    }
}

fn sibling_wrapper() -> anyhow::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    let dir = exe
        .parent()
        .ok_or_else(|| anyhow::anyhow!("cannot locate the directory of {}", exe.display()))?;
    Ok(dir.join(format!("torero-capture{}", std::env::consts::EXE_SUFFIX)))
}
