mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use powerbi_admin_mcp::config::{CliCredentials, Config, FileConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Azure AD tenant ID
    #[arg(long, env = "POWERBI_TENANT_ID", global = true)]
    tenant_id: Option<String>,

    /// Service principal client ID
    #[arg(long, env = "POWERBI_CLIENT_ID", global = true)]
    client_id: Option<String>,

    /// Service principal client secret
    #[arg(long, env = "POWERBI_CLIENT_SECRET", global = true, hide_env_values = true)]
    client_secret: Option<String>,

    /// Config file (default: <config dir>/powerbi-admin-mcp/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for result files: a local path, /lakehouse/... or abfss://...
    #[arg(long, short, global = true)]
    output: Option<String>,

    /// Output format for commands that produce rows
    #[arg(long, value_enum, default_value_t = Format::Json, global = true)]
    format: Format,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Csv,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the MCP server (stdio unless --http)
    Serve {
        /// Serve streamable HTTP instead of stdio
        #[arg(long)]
        http: bool,
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
    /// Check tenant settings required for metadata scanning
    TenantCheck,
    /// Inventory of all workspaces
    Inventory {
        /// OData filter, e.g. "state eq 'Active'"
        #[arg(long)]
        filter: Option<String>,
    },
    /// Metadata scan of workspaces (batched above 100)
    Scan {
        #[arg(required = true)]
        workspace_ids: Vec<String>,
    },
    /// Dataflow connection report for one workspace
    Dataflows { workspace_id: String },
    /// Extract every dataflow definition in a workspace to files
    Definitions { workspace_id: String },
    /// Datasource instances (cloud connections) of one workspace
    Connections { workspace_id: String },
    /// Access audit of a workspace, its datasets and reports
    Access { workspace_id: String },
    /// Activity log summary for one UTC day
    Activity {
        /// YYYY-MM-DD or RFC 3339 (default: 24 hours ago)
        #[arg(long)]
        start: Option<String>,
        /// Same-day end (default: end of the start day)
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        activity: Option<String>,
        #[arg(long)]
        user: Option<String>,
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Latest refresh of every dataset in a workspace
    Refreshes { workspace_id: String },
    /// Full workspace report: users and all artifacts
    Report { workspace_id: String },
    /// One dataset, report, dashboard, dataflow or app with its users
    Artifact {
        /// dataset, report, dashboard, dataflow or app
        artifact_type: String,
        id: String,
    },
    /// Capacities in the tenant
    Capacities {
        /// Include each capacity's workloads
        #[arg(long)]
        workloads: bool,
    },
    /// IDs of workspaces modified since a point in time
    Modified {
        /// YYYY-MM-DD or RFC 3339
        #[arg(long)]
        since: Option<String>,
        #[arg(long)]
        exclude_personal: bool,
        #[arg(long)]
        exclude_inactive: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();
    let cli = Cli::parse();

    let file = FileConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let config = Config::resolve(
        CliCredentials {
            tenant_id: cli.tenant_id,
            client_id: cli.client_id,
            client_secret: cli.client_secret,
        },
        file,
    );

    let output = cli
        .output
        .as_deref()
        .or(config.output_directory.as_deref())
        .map(|dir| config.output_target(Some(dir)));

    let ctx = commands::Context {
        client: config.build_client(),
        output,
        format: cli.format,
        config,
    };

    commands::run(cli.command, &ctx).await
}
