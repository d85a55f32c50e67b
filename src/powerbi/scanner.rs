//! Metadata scanning: `workspaces/getInfo`, `scanStatus` and `scanResult`.

use crate::powerbi::client::{PowerBiClient, PowerBiError};
use crate::powerbi::lro::{PollSettings, PollState, poll_until};
use crate::powerbi::models::Datasource;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Hard limit of the getInfo endpoint.
pub const MAX_WORKSPACES_PER_SCAN: usize = 100;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub lineage: bool,
    pub datasource_details: bool,
    pub dataset_schema: bool,
    pub dataset_expressions: bool,
    pub get_artifact_users: bool,
    pub poll: PollSettings,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            lineage: true,
            datasource_details: true,
            dataset_schema: true,
            dataset_expressions: true,
            get_artifact_users: true,
            poll: PollSettings::scan(),
        }
    }
}

impl ScanOptions {
    fn query(&self) -> String {
        format!(
            "lineage={}&datasourceDetails={}&datasetSchema={}&datasetExpressions={}&getArtifactUsers={}",
            self.lineage,
            self.datasource_details,
            self.dataset_schema,
            self.dataset_expressions,
            self.get_artifact_users
        )
    }
}

#[derive(Debug, Clone)]
pub struct BatchScanOptions {
    pub scan: ScanOptions,
    /// Clamped to 1..=100.
    pub batch_size: usize,
    /// Pause between chunks to stay under the tenant's 500 requests/hour.
    pub batch_delay: Duration,
}

impl Default for BatchScanOptions {
    fn default() -> Self {
        Self {
            scan: ScanOptions {
                poll: PollSettings::large_batch_scan(),
                ..ScanOptions::default()
            },
            batch_size: MAX_WORKSPACES_PER_SCAN,
            batch_delay: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Serialize)]
struct ScanRequest<'a> {
    workspaces: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanJob {
    pub id: String,
    #[serde(default)]
    pub created_date_time: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    #[serde(default)]
    pub workspaces: Vec<ScannedWorkspace>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dataflows: Vec<ScannedDataflow>,
    #[serde(default)]
    pub datasource_instances: Vec<Datasource>,
    #[serde(default)]
    pub misconfigured_datasource_instances: Vec<Datasource>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ScanResult {
    pub fn merge(&mut self, other: ScanResult) {
        self.workspaces.extend(other.workspaces);
        self.dataflows.extend(other.dataflows);
        self.datasource_instances.extend(other.datasource_instances);
        self.misconfigured_datasource_instances
            .extend(other.misconfigured_datasource_instances);
    }

    /// The scanned workspace with this id, else the first one.
    pub fn workspace(&self, workspace_id: &str) -> Option<&ScannedWorkspace> {
        self.workspaces
            .iter()
            .find(|ws| ws.id.eq_ignore_ascii_case(workspace_id))
            .or_else(|| self.workspaces.first())
    }

    /// Dataflows nested under the workspace, or listed at the top level.
    pub fn dataflows_of<'a>(&'a self, workspace: Option<&'a ScannedWorkspace>) -> &'a [ScannedDataflow] {
        match workspace {
            Some(ws) if !ws.dataflows.is_empty() => &ws.dataflows,
            _ => &self.dataflows,
        }
    }

    pub fn datasource_instance(&self, datasource_id: &str) -> Option<&Datasource> {
        self.datasource_instances
            .iter()
            .find(|ds| ds.datasource_id.as_deref() == Some(datasource_id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannedWorkspace {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub workspace_type: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub capacity_id: Option<String>,
    #[serde(default)]
    pub dataflows: Vec<ScannedDataflow>,
    #[serde(default)]
    pub datasets: Vec<Value>,
    #[serde(default)]
    pub reports: Vec<Value>,
    #[serde(default)]
    pub dashboards: Vec<Value>,
    #[serde(default)]
    pub users: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannedDataflow {
    pub object_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub configured_by: Option<String>,
    #[serde(default)]
    pub modified_by: Option<String>,
    #[serde(default)]
    pub modified_date_time: Option<String>,
    #[serde(default)]
    pub tables: Vec<DataflowTable>,
    #[serde(default)]
    pub datasources: Vec<Datasource>,
    #[serde(default)]
    pub datasource_usages: Vec<DatasourceUsage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataflowTable {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasourceUsage {
    pub datasource_instance_id: String,
}

/// Start a scan, wait for it to succeed and fetch its result.
pub async fn scan_workspaces(
    client: &PowerBiClient,
    workspace_ids: &[String],
    options: &ScanOptions,
) -> Result<ScanResult, PowerBiError> {
    if workspace_ids.is_empty() {
        return Err(PowerBiError::InvalidArgument(
            "at least one workspace id is required".to_string(),
        ));
    }
    if workspace_ids.len() > MAX_WORKSPACES_PER_SCAN {
        return Err(PowerBiError::InvalidArgument(format!(
            "a scan accepts at most {} workspaces, got {}; use scan_workspaces_in_batches",
            MAX_WORKSPACES_PER_SCAN,
            workspace_ids.len()
        )));
    }

    let job = start_scan(client, workspace_ids, options).await?;
    log::info!(
        "Scan {} started for {} workspace(s)",
        job.id,
        workspace_ids.len()
    );

    wait_for_scan(client, &job.id, options.poll).await?;
    get_scan_result(client, &job.id).await
}

pub async fn start_scan(
    client: &PowerBiClient,
    workspace_ids: &[String],
    options: &ScanOptions,
) -> Result<ScanJob, PowerBiError> {
    let path = format!("workspaces/getInfo?{}", options.query());
    let body = ScanRequest {
        workspaces: workspace_ids,
    };
    client.admin_post(&path, &body).await
}

pub async fn wait_for_scan(
    client: &PowerBiClient,
    scan_id: &str,
    poll: PollSettings,
) -> Result<(), PowerBiError> {
    let url = client.admin_url(&format!("workspaces/scanStatus/{}", scan_id));

    poll_until(poll, "Scan", move |_| {
        let url = url.clone();
        async move {
            let response = client
                .send_raw(Method::GET, &url, None::<&String>)
                .await?;

            match response.status {
                StatusCode::OK => {
                    let status: ScanJob = response.json()?;
                    match status.status.as_deref() {
                        Some("Succeeded") => Ok(PollState::Done(())),
                        Some(failed @ ("Failed" | "Cancelled")) => Err(PowerBiError::ScanFailed {
                            scan_id: scan_id.to_string(),
                            status: failed.to_string(),
                        }),
                        _ => Ok(PollState::Pending),
                    }
                }
                StatusCode::ACCEPTED => Ok(PollState::Pending),
                _ => Err(response.into_api_error()),
            }
        }
    })
    .await
}

pub async fn get_scan_result(
    client: &PowerBiClient,
    scan_id: &str,
) -> Result<ScanResult, PowerBiError> {
    client
        .admin_get(&format!("workspaces/scanResult/{}", scan_id))
        .await
}

/// Scan any number of workspaces in chunks of at most 100, pausing between chunks.
pub async fn scan_workspaces_in_batches(
    client: &PowerBiClient,
    workspace_ids: &[String],
    options: &BatchScanOptions,
) -> Result<ScanResult, PowerBiError> {
    let batch_size = options.batch_size.clamp(1, MAX_WORKSPACES_PER_SCAN);
    let batches = workspace_ids.len().div_ceil(batch_size);
    let mut merged = ScanResult::default();

    for (index, chunk) in workspace_ids.chunks(batch_size).enumerate() {
        if index > 0 && !options.batch_delay.is_zero() {
            log::info!(
                "Waiting {:?} before batch {}/{}",
                options.batch_delay,
                index + 1,
                batches
            );
            tokio::time::sleep(options.batch_delay).await;
        }

        log::info!(
            "Scanning batch {}/{} ({} workspaces)",
            index + 1,
            batches,
            chunk.len()
        );
        let result = scan_workspaces(client, chunk, &options.scan).await?;
        merged.merge(result);
    }

    Ok(merged)
}
