use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info};

use gmao_orchestrator::{
    config::Config,
    incident::{HttpLlmClient, IncidentAnalyzer, McpClient},
    llm::{create_generator, GenerationCache, LlmService, RedisCache, TextGenerator},
    registry::AgentRegistry,
    server::{IncidentAgentServer, LlmServer, McpServer},
    store::{create_store, AnalysisStore},
};

#[derive(Parser)]
#[command(author, version, about = "GMAO incident orchestration services", long_about = None)]
struct Cli {
    /// Log level (debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Agent registry, message router and GMAO webhook
    Mcp {
        /// Bind address (defaults to MCP_ADDR)
        #[arg(long)]
        addr: Option<String>,
    },

    /// Incident analysis agent
    IncidentAgent {
        /// Bind address (defaults to INCIDENT_AGENT_ADDR)
        #[arg(long)]
        addr: Option<String>,
    },

    /// Cached LLM text generation
    LlmService {
        /// Bind address (defaults to LLM_SERVICE_ADDR)
        #[arg(long)]
        addr: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load()?;

    match cli.command {
        Commands::Mcp { addr } => run_mcp(&config, addr).await,
        Commands::IncidentAgent { addr } => run_incident_agent(&config, addr).await,
        Commands::LlmService { addr } => run_llm_service(&config, addr).await,
    }
}

async fn serve(router: axum::Router, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);
    axum::serve(listener, router).await?;
    Ok(())
}

async fn run_mcp(config: &Config, addr: Option<String>) -> Result<()> {
    let server = McpServer::new(&config.mcp, AgentRegistry::new())?;
    let addr = addr.unwrap_or_else(|| config.mcp.addr.clone());
    info!("Starting MCP on {}", addr);
    serve(server.build_router(), &addr).await
}

async fn run_incident_agent(config: &Config, addr: Option<String>) -> Result<()> {
    let settings = &config.incident;

    info!("Initializing cache database...");
    let store: Option<Arc<dyn AnalysisStore>> = match create_store(&settings.database).await {
        Ok(store) => match store.init().await {
            Ok(()) => Some(store),
            Err(e) => {
                error!("Failed to initialize cache database, running without cache: {}", e);
                None
            }
        },
        Err(e) => {
            error!("Failed to open cache database, running without cache: {}", e);
            None
        }
    };

    let llm = HttpLlmClient::new(
        settings.llm_service_url.clone(),
        Duration::from_secs(settings.llm_timeout_secs),
        settings.max_length,
        settings.temperature,
    )?;
    let analyzer = Arc::new(IncidentAnalyzer::new(Arc::new(llm), store));

    let agent_id = Arc::new(RwLock::new(None));
    let mcp = McpClient::new(settings.mcp_endpoint.clone())?;
    tokio::spawn(mcp.run(
        McpClient::registration(&settings.agent_endpoint),
        agent_id.clone(),
        Duration::from_secs(settings.heartbeat_interval_secs),
    ));

    let server = IncidentAgentServer::new(analyzer, agent_id);
    let addr = addr.unwrap_or_else(|| settings.addr.clone());
    info!("Starting incident analysis agent on {}", addr);
    serve(server.build_router(), &addr).await
}

async fn run_llm_service(config: &Config, addr: Option<String>) -> Result<()> {
    let settings = &config.llm;

    let generator: Option<Arc<dyn TextGenerator>> = match create_generator(&settings.provider) {
        Ok(generator) => Some(generator),
        Err(e) => {
            error!("Failed to load LLM generator: {}", e);
            None
        }
    };

    let cache: Option<Arc<dyn GenerationCache>> = match RedisCache::connect(&settings.redis_url).await {
        Ok(cache) => Some(Arc::new(cache)),
        Err(e) => {
            error!("Could not connect to Redis, caching disabled: {}", e);
            None
        }
    };

    let service = Arc::new(LlmService::new(generator, cache, settings.cache_ttl_secs));
    let addr = addr.unwrap_or_else(|| settings.addr.clone());
    info!("Starting LLM service on {}", addr);
    serve(LlmServer::new(service).build_router(), &addr).await
}
