use anyhow::Context as _;
use clap::Parser;
use oapi_mcp_server::cli::{Cli, Command, CredentialArgs, RunArgs};
use oapi_mcp_server::{
    AccountScopedHooks, CredentialStore, DefaultHooks, FileCredentialStore, OpenApiMcpServer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let result = match Cli::parse().into_command() {
        Command::Start(args) => start(args).await,
        Command::Init(args) => init(&args),
    };
    if let Err(err) = &result {
        error!(error = %format!("{err:#}"), "oapi-mcp failed");
    }
    result
}

/// Logs go to stderr; stdout carries the protocol.
fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

async fn start(args: RunArgs) -> anyhow::Result<()> {
    init_logging(&args.log_level);

    let store = FileCredentialStore::open_default()?;
    let credentials = args.credentials.resolve(&store)?;
    let config = args.server_config(credentials.as_ref());
    info!(
        api_dir = %config.api_dir.display(),
        services = ?config.filters.services,
        tags = ?config.filters.tags,
        "Configured server"
    );

    let server = match credentials {
        Some(credentials) => {
            OpenApiMcpServer::new(config, AccountScopedHooks::new(credentials.account_sid))?
        }
        None => {
            warn!("No credentials configured; requests are sent without authorization");
            OpenApiMcpServer::new(config, DefaultHooks)?
        }
    };

    server
        .start(rmcp::transport::stdio())
        .await
        .context("MCP server failed")
}

fn init(args: &CredentialArgs) -> anyhow::Result<()> {
    let credentials = args.provided()?.context(
        "no valid credentials given: pass ACCOUNT_SID/API_KEY:API_SECRET or \
         --account-sid, --api-key and --api-secret",
    )?;
    let store = FileCredentialStore::open_default()?;
    store.set_credentials(&credentials)?;
    eprintln!("Credentials saved to {}", store.path().display());
    Ok(())
}
