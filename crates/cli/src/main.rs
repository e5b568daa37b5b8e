use clap::{Parser, Subcommand};
use igrelay_core::config::{mask_secret, AppConfig, DEFAULT_VERIFY_TOKEN};
use igrelay_instagram::GraphClient;
use igrelay_providers::factory::create_reply_generator;
use igrelay_server::gateway::{AppState, Gateway};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{filter_fn, Targets};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

mod verify;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "igrelay")]
#[command(version = VERSION)]
#[command(about = "Instagram DM webhook relay that answers with Gemini")]
struct Cli {
    /// Config file (json, toml or yaml); environment variables take precedence
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook server (default)
    Serve {
        /// Port to listen on (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,
        /// Address to bind (overrides BIND_ADDRESS)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Show which credentials are configured
    Status,
    /// Check the configured credentials against Gemini and the Graph API
    Verify,
}

fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let mut guard = None;
    let audit_layer: Option<Box<dyn Layer<Registry> + Send + Sync>> = log_dir.map(|dir| {
        let (non_blocking, worker_guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "audit.jsonl"));
        guard = Some(worker_guard);

        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_target(false)
            .with_file(false)
            .with_line_number(false)
            .with_filter(Targets::new().with_target("audit", Level::INFO))
            .boxed()
    });
    let audit_to_file = audit_layer.is_some();

    let stdout_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Audit events go to stdout only when there is no audit file.
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_filter(stdout_filter)
        .with_filter(filter_fn(move |metadata| {
            !audit_to_file || metadata.target() != "audit"
        }));

    tracing_subscriber::registry()
        .with(audit_layer)
        .with(stdout_layer)
        .init();

    guard
}

fn log_readiness(config: &AppConfig) {
    if config.verify_token == DEFAULT_VERIFY_TOKEN {
        warn!("VERIFY_TOKEN not set, using the built-in default");
    }
    for missing in config.readiness() {
        let effect = match missing {
            "PAGE_ACCESS_TOKEN" => "edited messages cannot be resolved and replies are not sent",
            "IG_BUSINESS_ID" => "replies are not sent",
            "GEMINI_API_KEY" => "every reply is the not-configured message",
            _ => "feature disabled",
        };
        warn!("{} is not set; {}", missing, effect);
    }
}

async fn run_serve(config: AppConfig) -> anyhow::Result<()> {
    log_readiness(&config);

    let generator = create_reply_generator(&config)?;
    let graph = Arc::new(GraphClient::from_config(&config)?);
    let state = AppState::new(config.verify_token.clone(), generator, graph.clone(), graph);

    info!("igrelay v{} starting", VERSION);
    Gateway::new(state, config.bind_address.clone(), config.port)
        .start()
        .await
}

fn run_status(config: &AppConfig) {
    println!("igrelay v{} status\n", VERSION);

    let show = |name: &str, value: Option<&str>| match value {
        Some(secret) => println!("{}: {} ✓", name, mask_secret(secret)),
        None => println!("{}: not set", name),
    };

    if config.verify_token == DEFAULT_VERIFY_TOKEN {
        println!("Verify token: built-in default");
    } else {
        println!("Verify token: custom ✓");
    }
    show("Page access token", config.page_access_token());
    match config.ig_business_id() {
        Some(id) => println!("IG business id: {} ✓", id),
        None => println!("IG business id: not set"),
    }
    show("Gemini API key", config.gemini_api_key());
    println!("Gemini model: {}", config.gemini_model);
    println!("Graph API: {}", config.graph_api_base);
    println!("Listen: {}:{}", config.bind_address, config.port);
    match &config.log_dir {
        Some(dir) => println!("Audit log: {}", dir.display()),
        None => println!("Audit log: stdout"),
    }
}

async fn run_verify(config: &AppConfig) -> anyhow::Result<()> {
    let mut failed = false;

    match config.gemini_api_key() {
        Some(key) => {
            match verify::verify_gemini_key(&config.gemini_api_base, &config.gemini_model, key)
                .await
            {
                Ok(msg) => println!("{}", msg),
                Err(e) => {
                    println!("{}", e);
                    failed = true;
                }
            }
        }
        None => println!("Gemini API key: not set, skipped"),
    }

    match config.page_access_token() {
        Some(token) => match verify::verify_page_token(&config.graph_api_base, token).await {
            Ok(msg) => println!("{}", msg),
            Err(e) => {
                println!("{}", e);
                failed = true;
            }
        },
        None => println!("Page access token: not set, skipped"),
    }

    if failed {
        anyhow::bail!("credential verification failed");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.clone())
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    let _guard = init_logging(config.log_dir.as_deref());

    match cli.command {
        Some(Commands::Status) => {
            run_status(&config);
            Ok(())
        }
        Some(Commands::Verify) => run_verify(&config).await,
        Some(Commands::Serve { port, bind }) => {
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(bind) = bind {
                config.bind_address = bind;
            }
            run_serve(config).await
        }
        None => run_serve(config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["igrelay"]).expect("parse");
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn serve_flags_and_global_config_parse() {
        let cli = Cli::try_parse_from([
            "igrelay", "serve", "--port", "9000", "--bind", "127.0.0.1", "--config", "relay.toml",
        ])
        .expect("parse");
        assert_eq!(cli.config, Some(PathBuf::from("relay.toml")));
        match cli.command {
            Some(Commands::Serve { port, bind }) => {
                assert_eq!(port, Some(9000));
                assert_eq!(bind.as_deref(), Some("127.0.0.1"));
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["igrelay", "onboard"]).is_err());
    }
}
