use crate::{Command, Format};
use anyhow::{Context as _, Result, anyhow};
use chrono::{Duration, Utc};
use powerbi_admin_mcp::config::Config;
use powerbi_admin_mcp::mcp::server::PowerBiMcpServer;
use powerbi_admin_mcp::output::{OutputTarget, timestamped_file_name};
use powerbi_admin_mcp::powerbi::activity::{self, ActivityQuery};
use powerbi_admin_mcp::powerbi::scanner::{self, MAX_WORKSPACES_PER_SCAN};
use powerbi_admin_mcp::powerbi::workspaces::ModifiedWorkspacesQuery;
use powerbi_admin_mcp::powerbi::{PowerBiClient, tenant, workspaces};
use powerbi_admin_mcp::reporting::artifacts::{self, ArtifactType};
use powerbi_admin_mcp::reporting::{
    access, activity::summarize_activity, cloud_connections, dataflow_connections, extraction,
    inventory, refreshes,
};
use powerbi_admin_mcp::server::http;
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use serde::Serialize;

pub struct Context {
    pub client: PowerBiClient,
    pub config: Config,
    /// Where to write result files; results go to stdout when unset.
    pub output: Option<OutputTarget>,
    pub format: Format,
}

impl Context {
    /// Save `value` under the output target, or print it when there is none.
    fn emit<T: Serialize + ?Sized>(&self, file_name: &str, value: &T) -> Result<()> {
        match &self.output {
            Some(target) => {
                if let Some(location) = target.save_json_or_skip(file_name, value)? {
                    println!("Saved to {}", location);
                }
            }
            None => println!("{}", serde_json::to_string_pretty(value)?),
        }
        Ok(())
    }

    /// Rows as CSV on stdout when `--format csv`, otherwise as JSON through [`Context::emit`].
    fn emit_rows<T: Serialize>(
        &self,
        file_name: &str,
        rows: &[T],
        to_csv: impl FnOnce(&[T]) -> Result<String, String>,
    ) -> Result<()> {
        match self.format {
            Format::Csv => {
                print!("{}", to_csv(rows).map_err(|e| anyhow!(e))?);
                Ok(())
            }
            Format::Json => self.emit(file_name, rows),
        }
    }
}

pub async fn run(command: Command, ctx: &Context) -> Result<()> {
    let client = &ctx.client;

    match command {
        Command::Serve {
            http: serve_http,
            host,
            port,
        } => {
            let server = PowerBiMcpServer::new(client.clone(), &ctx.config);
            if serve_http {
                log::info!("Starting web server on {}:{}", host, port);
                http::run_server(server, &host, port).await?;
            } else {
                log::info!("Starting stdio server");
                let service = server.serve(stdio()).await?;
                service.waiting().await?;
            }
        }

        Command::TenantCheck => {
            let settings = tenant::check_metadata_scanning_enabled(client)
                .await
                .context("Failed to read tenant settings")?;
            for (name, status) in &settings {
                let state = if status.enabled { "ENABLED" } else { "DISABLED" };
                println!("{}: {}", state, name);
                if !status.enabled_security_groups.is_empty() {
                    println!(
                        "   applied to {} security group(s)",
                        status.enabled_security_groups.len()
                    );
                }
            }
            if ctx.output.is_some() {
                ctx.emit("tenant_settings_check.json", &settings)?;
            }
        }

        Command::Inventory { filter } => {
            let workspaces = workspaces::list_all_workspaces(client, filter.as_deref())
                .await
                .context("Failed to list workspaces")?;
            log::info!("Total workspaces: {}", workspaces.len());
            let rows = inventory::workspace_inventory(&workspaces);
            ctx.emit_rows("workspace_inventory.json", &rows, inventory::inventory_to_csv)?;
        }

        Command::Scan { workspace_ids } => {
            let result = if workspace_ids.len() > MAX_WORKSPACES_PER_SCAN {
                let options = ctx.config.batch_scan_options();
                scanner::scan_workspaces_in_batches(client, &workspace_ids, &options).await
            } else {
                scanner::scan_workspaces(client, &workspace_ids, &ctx.config.scan_options()).await
            }
            .context("Scan failed")?;

            let name = format!("{}_workspaces", workspace_ids.len());
            ctx.emit(
                &timestamped_file_name("scan", &name, "result", Utc::now()),
                &result,
            )?;
        }

        Command::Dataflows { workspace_id } => {
            let scan = scanner::scan_workspaces(
                client,
                std::slice::from_ref(&workspace_id),
                &ctx.config.scan_options(),
            )
            .await
            .context("Scan failed")?;

            let now = Utc::now();
            let report = dataflow_connections::workspace_dataflow_report(&workspace_id, &scan, now);
            for entry in report.connection_breakdown() {
                log::info!("{:4} - {}", entry.count, entry.name);
            }

            match ctx.format {
                Format::Csv => print!(
                    "{}",
                    dataflow_connections::connections_to_csv(&report.all_connections)
                        .map_err(|e| anyhow!(e))?
                ),
                Format::Json => ctx.emit(
                    &timestamped_file_name("workspace", &report.workspace_name, "dataflows", now),
                    &report,
                )?,
            }
        }

        Command::Definitions { workspace_id } => {
            let target = ctx.output.clone().unwrap_or(OutputTarget::CurrentDir);
            if target.is_lakehouse() {
                log::info!("Writing definitions to lakehouse storage");
            }
            let options = extraction::ExtractionOptions {
                scan: ctx.config.scan_options(),
                definition_poll: ctx.config.definition_poll,
            };
            let summary =
                extraction::extract_dataflow_definitions(client, &workspace_id, &target, &options)
                    .await
                    .context("Definition extraction failed")?;

            println!("Workspace: {}", summary.workspace_name);
            println!("Total dataflows: {}", summary.dataflow_count);
            println!("Successful extractions: {}", summary.succeeded());
            println!("Failed extractions: {}", summary.failed());
            if let Some(file) = &summary.summary_file {
                println!("Summary: {}", file);
            }
        }

        Command::Connections { workspace_id } => {
            let scan = scanner::scan_workspaces(
                client,
                std::slice::from_ref(&workspace_id),
                &ctx.config.scan_options(),
            )
            .await
            .context("Scan failed")?;

            let connections = cloud_connections::cloud_connections(&scan);
            let cloud = connections.iter().filter(|c| c.is_cloud()).count();
            log::info!(
                "Found {} datasource instance(s): {} cloud, {} through a gateway",
                connections.len(),
                cloud,
                connections.len() - cloud
            );
            ctx.emit(&format!("workspace_{}_connections.json", workspace_id), &connections)?;
        }

        Command::Access { workspace_id } => {
            let audit = access::audit_workspace_access(client, &workspace_id)
                .await
                .context("Access audit failed")?;
            log::info!(
                "{} distinct principal(s) have access in workspace {}",
                audit.principals().len(),
                workspace_id
            );
            ctx.emit(&format!("workspace_{}_access.json", workspace_id), &audit)?;
        }

        Command::Activity {
            start,
            end,
            activity: activity_name,
            user,
            top,
        } => {
            let start = match start {
                Some(value) => activity::parse_date_time(&value)?,
                None => Utc::now() - Duration::days(1),
            };
            let end = end.as_deref().map(activity::parse_date_time).transpose()?;
            let query = ActivityQuery {
                start,
                end,
                activity: activity_name,
                user_id: user,
            };

            let events = activity::get_activity_events(client, &query)
                .await
                .context("Failed to read activity events")?;
            let summary = summarize_activity(&events, top);

            if let Some(target) = &ctx.output {
                let file_name = timestamped_file_name("activity", "events", "log", Utc::now());
                target.save_json_or_skip(&file_name, &events)?;
            }
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Command::Refreshes { workspace_id } => {
            let report = refreshes::refresh_report(client, &workspace_id)
                .await
                .context("Failed to read refresh history")?;
            ctx.emit("refresh_summary.json", &report)?;
        }

        Command::Report { workspace_id } => {
            let details = workspaces::get_all_workspace_details(client, &workspace_id)
                .await
                .context("Failed to read workspace details")?;
            log::info!(
                "Users: {}, datasets: {}, reports: {}, dashboards: {}, dataflows: {}",
                details.users.len(),
                details.datasets.len(),
                details.reports.len(),
                details.dashboards.len(),
                details.dataflows.len()
            );
            ctx.emit(
                &format!("workspace_{}_full_report.json", workspace_id),
                &details,
            )?;
        }

        Command::Artifact { artifact_type, id } => {
            let artifact_type: ArtifactType = artifact_type.parse()?;
            let details = artifacts::artifact_details(client, artifact_type, &id)
                .await
                .with_context(|| format!("Failed to read {:?} {}", artifact_type, id))?;
            ctx.emit(&format!("{}_details.json", id), &details)?;
        }

        Command::Capacities { workloads } => {
            let overview = artifacts::capacity_overview(client, workloads)
                .await
                .context("Failed to list capacities")?;
            ctx.emit("capacities.json", &overview)?;
        }

        Command::Modified {
            since,
            exclude_personal,
            exclude_inactive,
        } => {
            let query = ModifiedWorkspacesQuery {
                modified_since: since.as_deref().map(activity::parse_date_time).transpose()?,
                exclude_personal_workspaces: exclude_personal,
                exclude_inactive_workspaces: exclude_inactive,
            };
            let modified = workspaces::get_modified_workspaces(client, &query)
                .await
                .context("Failed to list modified workspaces")?;
            log::info!("{} workspace(s) modified", modified.len());
            ctx.emit("modified_workspaces.json", &modified)?;
        }
    }

    Ok(())
}
