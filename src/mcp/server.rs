use crate::config::Config;
use crate::powerbi::activity::{self, ActivityQuery};
use crate::powerbi::client::PowerBiClient;
use crate::powerbi::definitions;
use crate::powerbi::lro::PollSettings;
use crate::powerbi::scanner::{self, BatchScanOptions, MAX_WORKSPACES_PER_SCAN, ScanOptions};
use crate::powerbi::workspaces::ModifiedWorkspacesQuery;
use crate::powerbi::{apps, tenant, workspaces};
use crate::reporting::artifacts::{self, ArtifactType};
use crate::reporting::{
    access, activity::summarize_activity, cloud_connections, dataflow_connections, inventory,
    refreshes,
};
use chrono::Utc;
use rmcp::{
    ErrorData as McpError,
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content, ErrorCode, Implementation, ServerCapabilities, ServerInfo},
    schemars,
    schemars::JsonSchema,
    serde::Deserialize,
    tool, tool_handler, tool_router,
};
use serde::Serialize;
use std::sync::Arc;

const DEFAULT_TOP: usize = 10;
const DEFAULT_APPS_TOP: u32 = 100;

fn api_error(e: impl std::fmt::Display) -> McpError {
    McpError {
        code: ErrorCode(-32000),
        message: e.to_string().into(),
        data: None,
    }
}

fn invalid_params(message: impl Into<String>) -> McpError {
    McpError {
        code: ErrorCode(-32602),
        message: message.into().into(),
        data: None,
    }
}

fn json_result<T: Serialize + ?Sized>(value: &T) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value).map_err(api_error)?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

fn wants_csv(format: Option<&str>) -> Result<bool, McpError> {
    match format.map(str::to_lowercase).as_deref() {
        None | Some("json") => Ok(false),
        Some("csv") => Ok(true),
        Some(other) => Err(invalid_params(format!(
            "Unsupported format '{}', expected json or csv",
            other
        ))),
    }
}

#[derive(Clone)]
pub struct PowerBiMcpServer {
    client: Arc<PowerBiClient>,
    scan_options: ScanOptions,
    batch_options: BatchScanOptions,
    definition_poll: PollSettings,
    tool_router: ToolRouter<Self>,
}

#[derive(Deserialize, JsonSchema)]
struct ListWorkspacesArgs {
    /// Maximum number of workspaces (1-5000). Omit to page through all of them.
    #[serde(default)]
    top: Option<u32>,
    /// Number of workspaces to skip
    #[serde(default)]
    skip: Option<u32>,
    /// OData filter, e.g. "state eq 'Active'"
    #[serde(default)]
    filter: Option<String>,
    /// Output format: "json" (default) or "csv"
    #[serde(default)]
    format: Option<String>,
}

#[derive(Deserialize, JsonSchema)]
struct WorkspaceArgs {
    /// Workspace (group) ID
    workspace_id: String,
}

#[derive(Deserialize, JsonSchema)]
struct ScanWorkspacesArgs {
    /// Workspace IDs to scan. More than 100 are scanned in batches.
    workspace_ids: Vec<String>,
    /// Include lineage (default true)
    #[serde(default)]
    lineage: Option<bool>,
    /// Include datasource details (default true)
    #[serde(default)]
    datasource_details: Option<bool>,
    /// Include dataset schema (default true)
    #[serde(default)]
    dataset_schema: Option<bool>,
    /// Include dataset expressions / M code (default true)
    #[serde(default)]
    dataset_expressions: Option<bool>,
    /// Include artifact users (default true)
    #[serde(default)]
    get_artifact_users: Option<bool>,
}

#[derive(Deserialize, JsonSchema)]
struct DataflowConnectionsArgs {
    /// Workspace (group) ID
    workspace_id: String,
    /// Output format: "json" (default, full report) or "csv" (connection rows)
    #[serde(default)]
    format: Option<String>,
}

#[derive(Deserialize, JsonSchema)]
struct DataflowDefinitionArgs {
    /// Workspace ID
    workspace_id: String,
    /// Dataflow (Gen2) item ID
    dataflow_id: String,
    /// Decode base64 payloads (default true)
    #[serde(default)]
    decode: Option<bool>,
}

#[derive(Deserialize, JsonSchema)]
struct ActivitySummaryArgs {
    /// Start of the window, YYYY-MM-DD or RFC 3339
    start: String,
    /// End of the window on the same UTC day (default: end of the start day)
    #[serde(default)]
    end: Option<String>,
    /// Only this activity, e.g. "ViewReport"
    #[serde(default)]
    activity: Option<String>,
    /// Only this user (UPN)
    #[serde(default)]
    user_id: Option<String>,
    /// How many top activities and users to return (default 10)
    #[serde(default)]
    top: Option<usize>,
}

#[derive(Deserialize, JsonSchema)]
struct ModifiedWorkspacesArgs {
    /// Only workspaces modified since this time, YYYY-MM-DD or RFC 3339
    #[serde(default)]
    modified_since: Option<String>,
    #[serde(default)]
    exclude_personal_workspaces: Option<bool>,
    #[serde(default)]
    exclude_inactive_workspaces: Option<bool>,
}

#[derive(Deserialize, JsonSchema)]
struct ArtifactArgs {
    /// Artifact type: dataset, report, dashboard, dataflow or app
    artifact_type: String,
    /// Artifact ID
    id: String,
}

#[derive(Deserialize, JsonSchema)]
struct ListAppsArgs {
    /// Maximum number of apps (default 100)
    #[serde(default)]
    top: Option<u32>,
}

#[derive(Deserialize, JsonSchema)]
struct ListCapacitiesArgs {
    /// Include each capacity's workloads (default false)
    #[serde(default)]
    include_workloads: Option<bool>,
}

#[tool_router]
impl PowerBiMcpServer {
    pub fn new(client: PowerBiClient, config: &Config) -> Self {
        Self {
            client: Arc::new(client),
            scan_options: config.scan_options(),
            batch_options: config.batch_scan_options(),
            definition_poll: config.definition_poll,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "List Power BI workspaces in the tenant (admin API)")]
    async fn powerbi_list_workspaces(
        &self,
        args: Parameters<ListWorkspacesArgs>,
    ) -> Result<CallToolResult, McpError> {
        log::info!(
            "Tool invoked: powerbi_list_workspaces(top={:?}, skip={:?}, filter={:?})",
            args.0.top,
            args.0.skip,
            args.0.filter
        );
        let csv = wants_csv(args.0.format.as_deref())?;

        let workspaces = match args.0.top {
            Some(top) => workspaces::list_workspaces(
                &self.client,
                top,
                args.0.skip.unwrap_or(0),
                args.0.filter.as_deref(),
            )
            .await,
            None => workspaces::list_all_workspaces(&self.client, args.0.filter.as_deref()).await,
        }
        .map_err(api_error)?;

        let rows = inventory::workspace_inventory(&workspaces);
        if csv {
            let text = inventory::inventory_to_csv(&rows).map_err(api_error)?;
            return Ok(CallToolResult::success(vec![Content::text(text)]));
        }
        json_result(&rows)
    }

    #[tool(
        description = "Get a workspace with its users, datasets, reports, dashboards and dataflows"
    )]
    async fn powerbi_get_workspace_details(
        &self,
        args: Parameters<WorkspaceArgs>,
    ) -> Result<CallToolResult, McpError> {
        log::info!(
            "Tool invoked: powerbi_get_workspace_details(workspace_id={})",
            args.0.workspace_id
        );
        let details = workspaces::get_all_workspace_details(&self.client, &args.0.workspace_id)
            .await
            .map_err(api_error)?;
        json_result(&details)
    }

    #[tool(
        description = "Run a metadata scan (Scanner API) on workspaces and return the scan result"
    )]
    async fn powerbi_scan_workspaces(
        &self,
        args: Parameters<ScanWorkspacesArgs>,
    ) -> Result<CallToolResult, McpError> {
        let args = args.0;
        log::info!(
            "Tool invoked: powerbi_scan_workspaces(workspaces={})",
            args.workspace_ids.len()
        );
        if args.workspace_ids.is_empty() {
            return Err(invalid_params("workspace_ids must not be empty"));
        }

        let apply = |base: &ScanOptions| ScanOptions {
            lineage: args.lineage.unwrap_or(base.lineage),
            datasource_details: args.datasource_details.unwrap_or(base.datasource_details),
            dataset_schema: args.dataset_schema.unwrap_or(base.dataset_schema),
            dataset_expressions: args.dataset_expressions.unwrap_or(base.dataset_expressions),
            get_artifact_users: args.get_artifact_users.unwrap_or(base.get_artifact_users),
            poll: base.poll,
        };

        let result = if args.workspace_ids.len() > MAX_WORKSPACES_PER_SCAN {
            let options = BatchScanOptions {
                scan: apply(&self.batch_options.scan),
                ..self.batch_options.clone()
            };
            scanner::scan_workspaces_in_batches(&self.client, &args.workspace_ids, &options).await
        } else {
            let options = apply(&self.scan_options);
            scanner::scan_workspaces(&self.client, &args.workspace_ids, &options).await
        }
        .map_err(api_error)?;

        json_result(&result)
    }

    #[tool(
        description = "Scan one workspace and report its dataflows with their connections and a connection-type breakdown"
    )]
    async fn powerbi_get_dataflow_connections(
        &self,
        args: Parameters<DataflowConnectionsArgs>,
    ) -> Result<CallToolResult, McpError> {
        log::info!(
            "Tool invoked: powerbi_get_dataflow_connections(workspace_id={})",
            args.0.workspace_id
        );
        let csv = wants_csv(args.0.format.as_deref())?;

        let scan = scanner::scan_workspaces(
            &self.client,
            std::slice::from_ref(&args.0.workspace_id),
            &self.scan_options,
        )
        .await
        .map_err(api_error)?;

        let report =
            dataflow_connections::workspace_dataflow_report(&args.0.workspace_id, &scan, Utc::now());
        if csv {
            let text =
                dataflow_connections::connections_to_csv(&report.all_connections).map_err(api_error)?;
            return Ok(CallToolResult::success(vec![Content::text(text)]));
        }

        let breakdown = report.connection_breakdown();
        json_result(&serde_json::json!({
            "report": report,
            "connection_breakdown": breakdown,
        }))
    }

    #[tool(description = "Scan one workspace and list its datasource instances (cloud connections)")]
    async fn powerbi_get_cloud_connections(
        &self,
        args: Parameters<WorkspaceArgs>,
    ) -> Result<CallToolResult, McpError> {
        log::info!(
            "Tool invoked: powerbi_get_cloud_connections(workspace_id={})",
            args.0.workspace_id
        );
        let scan = scanner::scan_workspaces(
            &self.client,
            std::slice::from_ref(&args.0.workspace_id),
            &self.scan_options,
        )
        .await
        .map_err(api_error)?;
        json_result(&cloud_connections::cloud_connections(&scan))
    }

    #[tool(
        description = "Get a Dataflow Gen2 definition (Power Query M code, query metadata, platform) from the Fabric API"
    )]
    async fn powerbi_get_dataflow_definition(
        &self,
        args: Parameters<DataflowDefinitionArgs>,
    ) -> Result<CallToolResult, McpError> {
        log::info!(
            "Tool invoked: powerbi_get_dataflow_definition(workspace_id={}, dataflow_id={})",
            args.0.workspace_id,
            args.0.dataflow_id
        );
        let definition = definitions::get_dataflow_definition(
            &self.client,
            &args.0.workspace_id,
            &args.0.dataflow_id,
            self.definition_poll,
        )
        .await
        .map_err(api_error)?;

        if args.0.decode.unwrap_or(true) {
            json_result(&definitions::decode_definition(&definition))
        } else {
            json_result(&definition)
        }
    }

    #[tool(
        description = "Summarize activity log events for one UTC day: totals, top activities and top users"
    )]
    async fn powerbi_get_activity_summary(
        &self,
        args: Parameters<ActivitySummaryArgs>,
    ) -> Result<CallToolResult, McpError> {
        let args = args.0;
        log::info!(
            "Tool invoked: powerbi_get_activity_summary(start={}, end={:?})",
            args.start,
            args.end
        );

        let start = activity::parse_date_time(&args.start).map_err(|e| invalid_params(e.to_string()))?;
        let end = args
            .end
            .as_deref()
            .map(activity::parse_date_time)
            .transpose()
            .map_err(|e| invalid_params(e.to_string()))?;

        let query = ActivityQuery {
            start,
            end,
            activity: args.activity,
            user_id: args.user_id,
        };
        query.window().map_err(|e| invalid_params(e.to_string()))?;
        let events = activity::get_activity_events(&self.client, &query)
            .await
            .map_err(api_error)?;

        json_result(&summarize_activity(&events, args.top.unwrap_or(DEFAULT_TOP)))
    }

    #[tool(
        description = "Check tenant settings that metadata scanning and the admin APIs depend on"
    )]
    async fn powerbi_check_tenant_settings(&self) -> Result<CallToolResult, McpError> {
        log::info!("Tool invoked: powerbi_check_tenant_settings");
        let settings = tenant::check_metadata_scanning_enabled(&self.client)
            .await
            .map_err(api_error)?;
        json_result(&settings)
    }

    #[tool(description = "Latest refresh status of every dataset in a workspace")]
    async fn powerbi_get_refresh_summary(
        &self,
        args: Parameters<WorkspaceArgs>,
    ) -> Result<CallToolResult, McpError> {
        log::info!(
            "Tool invoked: powerbi_get_refresh_summary(workspace_id={})",
            args.0.workspace_id
        );
        let report = refreshes::refresh_report(&self.client, &args.0.workspace_id)
            .await
            .map_err(api_error)?;
        json_result(&report)
    }

    #[tool(description = "Audit who has access to a workspace and its datasets and reports")]
    async fn powerbi_audit_workspace_access(
        &self,
        args: Parameters<WorkspaceArgs>,
    ) -> Result<CallToolResult, McpError> {
        log::info!(
            "Tool invoked: powerbi_audit_workspace_access(workspace_id={})",
            args.0.workspace_id
        );
        let audit = access::audit_workspace_access(&self.client, &args.0.workspace_id)
            .await
            .map_err(api_error)?;
        json_result(&audit)
    }

    #[tool(
        description = "List IDs of workspaces modified since a point in time, for incremental scans"
    )]
    async fn powerbi_get_modified_workspaces(
        &self,
        args: Parameters<ModifiedWorkspacesArgs>,
    ) -> Result<CallToolResult, McpError> {
        let args = args.0;
        log::info!(
            "Tool invoked: powerbi_get_modified_workspaces(modified_since={:?})",
            args.modified_since
        );
        let modified_since = args
            .modified_since
            .as_deref()
            .map(activity::parse_date_time)
            .transpose()
            .map_err(|e| invalid_params(e.to_string()))?;

        let query = ModifiedWorkspacesQuery {
            modified_since,
            exclude_personal_workspaces: args.exclude_personal_workspaces.unwrap_or(false),
            exclude_inactive_workspaces: args.exclude_inactive_workspaces.unwrap_or(false),
        };
        let modified = workspaces::get_modified_workspaces(&self.client, &query)
            .await
            .map_err(api_error)?;
        json_result(&modified)
    }

    #[tool(
        description = "Get a dataset, report, dashboard, dataflow or app with its users (and datasources or tiles)"
    )]
    async fn powerbi_get_artifact(
        &self,
        args: Parameters<ArtifactArgs>,
    ) -> Result<CallToolResult, McpError> {
        log::info!(
            "Tool invoked: powerbi_get_artifact(artifact_type={}, id={})",
            args.0.artifact_type,
            args.0.id
        );
        let artifact_type = args
            .0
            .artifact_type
            .parse::<ArtifactType>()
            .map_err(|e| invalid_params(e.to_string()))?;
        let details = artifacts::artifact_details(&self.client, artifact_type, &args.0.id)
            .await
            .map_err(api_error)?;
        json_result(&details)
    }

    #[tool(description = "List published apps in the tenant")]
    async fn powerbi_list_apps(
        &self,
        args: Parameters<ListAppsArgs>,
    ) -> Result<CallToolResult, McpError> {
        log::info!("Tool invoked: powerbi_list_apps(top={:?})", args.0.top);
        let published = apps::get_apps(&self.client, args.0.top.unwrap_or(DEFAULT_APPS_TOP))
            .await
            .map_err(api_error)?;
        json_result(&published)
    }

    #[tool(description = "List capacities in the tenant, optionally with their workloads")]
    async fn powerbi_list_capacities(
        &self,
        args: Parameters<ListCapacitiesArgs>,
    ) -> Result<CallToolResult, McpError> {
        log::info!("Tool invoked: powerbi_list_capacities");
        let overview =
            artifacts::capacity_overview(&self.client, args.0.include_workloads.unwrap_or(false))
                .await
                .map_err(api_error)?;
        json_result(&overview)
    }
}

#[tool_handler]
impl rmcp::ServerHandler for PowerBiMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "powerbi-admin-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                title: None,
                website_url: None,
            },
            instructions: Some(
                "Use these tools to inventory and audit a Power BI / Fabric tenant through the admin APIs"
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_selection() {
        assert!(!wants_csv(None).unwrap());
        assert!(!wants_csv(Some("JSON")).unwrap());
        assert!(wants_csv(Some("csv")).unwrap());
        assert_eq!(wants_csv(Some("xml")).unwrap_err().code, ErrorCode(-32602));
    }

    #[test]
    fn api_errors_use_server_error_code() {
        let err = api_error("boom");
        assert_eq!(err.code, ErrorCode(-32000));
        assert_eq!(err.message, "boom");
    }
}
