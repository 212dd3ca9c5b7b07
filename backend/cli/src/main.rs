mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use glimpse_browser::DeliveryClient;
use glimpse_core::AnalyzeRequest;
use glimpse_gateway::{AnalysisRelay, GatewayState};
use glimpse_store::{AuditLog, CacheStore};
use glimpse_understanding::OpenAiVision;

use config::Config;

#[derive(Parser)]
#[command(name = "glimpse")]
#[command(about = "Glimpse: image discovery and vision analysis relay")]
#[command(version)]
struct Cli {
    /// Relay analysis endpoint used by `status` and `analyze`
    #[arg(long, global = true)]
    relay: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the analysis relay server
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Check whether a relay is up
    Status,
    /// Send one image reference to the relay and print the analysis
    Analyze {
        image_url: String,
        /// Page position of the image
        #[arg(long)]
        position: Option<u64>,
    },
    /// Print the most recent audit entries
    Audit {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = Config::from_env();
    glimpse_logging::init_logger(&config.log_level, config.log_dir.as_deref());

    let cli = Cli::parse();
    if let Some(relay) = cli.relay {
        config.relay_url = relay;
    }

    match cli.command {
        Commands::Serve { port } => {
            let config = Config {
                port: port.unwrap_or(config.port),
                ..config
            };
            run_server(config).await?;
        }
        Commands::Status => {
            let url = config.status_url()?;
            match reqwest::get(url.clone()).await {
                Ok(resp) if resp.status().is_success() => {
                    println!("Relay at {url} is {}", resp.text().await?);
                }
                Ok(resp) => println!("Relay at {url} answered {}", resp.status()),
                Err(_) => println!("Relay is not running at {url}"),
            }
        }
        Commands::Analyze { image_url, position } => {
            let client = DeliveryClient::new(&config.relay_url);
            let mut request = AnalyzeRequest::new(image_url);
            if let Some(position) = position {
                request = request.with_position(position);
            }
            let body = client
                .send(&request)
                .await
                .with_context(|| format!("analysis via {} failed", client.endpoint()))?;
            match body.as_str() {
                Some(text) => println!("{text}"),
                None => println!("{}", serde_json::to_string_pretty(&body)?),
            }
        }
        Commands::Audit { limit } => {
            let entries = AuditLog::new(&config.audit_path).entries().await?;
            let start = entries.len().saturating_sub(limit);
            println!("{}", serde_json::to_string_pretty(&entries[start..])?);
        }
    }

    Ok(())
}

async fn run_server(config: Config) -> Result<()> {
    let Some(api_key) = config.openai_api_key.as_deref() else {
        bail!("OPENAI_API_KEY must be set to run the relay");
    };

    info!(
        port = config.port,
        bind = %config.bind_address,
        cache = %config.cache_dir.display(),
        audit = %config.audit_path.display(),
        model = %config.vision_model,
        "Starting Glimpse relay"
    );

    let vision = OpenAiVision::new(api_key)
        .with_base_url(&config.openai_base_url)
        .with_model(&config.vision_model)
        .with_prompt(&config.prompt)
        .with_timeout(config.upstream_timeout)?;

    let relay = AnalysisRelay::new(
        Arc::new(vision),
        CacheStore::new(&config.cache_dir),
        AuditLog::new(&config.audit_path),
    )
    .with_audit_cache_hits(config.audit_cache_hits);

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", config.bind_address, config.port))?;
    glimpse_gateway::start_server(addr, GatewayState::new(relay)).await
}
