use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use mdm_pipeline::bootstrap::{build_lookup_cache, build_services};
use mdm_pipeline::config::Settings;
use mdm_pipeline::domain::{BatchRequest, LookupKey};
use mdm_pipeline::observability;
use mdm_pipeline::server::{start_server, AppState};

#[derive(Parser)]
#[command(name = "mdm_pipeline")]
#[command(about = "Master-data cleaning pipeline with coalesced postal lookups")]
#[command(version)]
struct Cli {
    /// TOML settings file; environment variables still override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one batch file through the pipeline and print the response
    Process {
        /// JSON batch request
        #[arg(long)]
        input: PathBuf,
    },
    /// Resolve a single postal code through the lookup cache
    Lookup {
        code: String,
        /// Region hint, BR when absent
        #[arg(long)]
        country: Option<String>,
    },
    /// Check that the LLM server is reachable
    Ping,
    /// Serve the HTTP API
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref())?;
    observability::init_logging(Some(settings.log_level.as_str()));
    if let Err(e) = observability::init(settings.prometheus_addr()?) {
        error!("Metrics disabled: {}", e);
    }

    match cli.command {
        Commands::Process { input } => {
            let text = std::fs::read_to_string(&input)?;
            let request: BatchRequest = serde_json::from_str(&text)?;
            let services = build_services(&settings)?;
            let response = services.coordinator.process(request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Lookup { code, country } => {
            let Some(key) = LookupKey::parse(&code, country.as_deref()) else {
                anyhow::bail!("'{}' does not contain enough digits to look up", code);
            };
            let cache = build_lookup_cache(&settings)?;
            let result = cache.resolve(&key).await;
            if result.is_empty() {
                println!("⚠️  No result for {}", key);
            } else {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
        }
        Commands::Ping => {
            let services = build_services(&settings)?;
            match services.llm.ping().await {
                Ok(tags) => println!("✅ LLM reachable: {}", tags),
                Err(e) => {
                    error!("LLM unreachable: {}", e);
                    anyhow::bail!("LLM unreachable: {}", e);
                }
            }
        }
        Commands::Serve => {
            let services = build_services(&settings)?;
            let addr = settings.bind_addr()?;
            info!("Serving on {}", addr);
            let state = AppState {
                coordinator: services.coordinator,
                llm: services.llm,
            };
            start_server(state, addr)
                .await
                .map_err(|e| anyhow::anyhow!("server failed: {}", e))?;
        }
    }
    Ok(())
}
