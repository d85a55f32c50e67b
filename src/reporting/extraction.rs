//! Bulk extraction of every dataflow definition in a workspace.

use crate::output::{OutputError, OutputTarget, timestamped_file_name};
use crate::powerbi::client::{PowerBiClient, PowerBiError};
use crate::powerbi::definitions::{DecodedDefinition, get_decoded_dataflow_definition};
use crate::powerbi::lro::PollSettings;
use crate::powerbi::scanner::{ScanOptions, ScannedDataflow, scan_workspaces};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error(transparent)]
    Api(#[from] PowerBiError),
    #[error(transparent)]
    Output(#[from] OutputError),
}

#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    pub scan: ScanOptions,
    pub definition_poll: PollSettings,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            scan: ScanOptions::default(),
            definition_poll: PollSettings::definition(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DefinitionWithContext<'a> {
    workspace_id: &'a str,
    workspace_name: &'a str,
    dataflow_id: &'a str,
    dataflow_name: Option<&'a str>,
    configured_by: Option<&'a str>,
    modified_date: Option<&'a str>,
    extraction_timestamp: DateTime<Utc>,
    definition: &'a DecodedDefinition,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractedDataflow {
    pub dataflow_id: String,
    pub dataflow_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configured_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<DecodedDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractedDataflow {
    fn failed(dataflow: &ScannedDataflow, error: String) -> Self {
        Self {
            dataflow_id: dataflow.object_id.clone(),
            dataflow_name: dataflow.name.clone(),
            configured_by: None,
            modified_date: None,
            definition_file: None,
            definition: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionSummary {
    pub extraction_timestamp: DateTime<Utc>,
    pub workspace_id: String,
    pub workspace_name: String,
    pub dataflow_count: usize,
    pub dataflows: Vec<ExtractedDataflow>,
    #[serde(skip)]
    pub summary_file: Option<String>,
}

impl ExtractionSummary {
    pub fn succeeded(&self) -> usize {
        self.dataflows.iter().filter(|d| d.definition.is_some()).count()
    }

    pub fn failed(&self) -> usize {
        self.dataflows.iter().filter(|d| d.error.is_some()).count()
    }
}

/// Scan a workspace, fetch and decode every dataflow definition, and save one file per
/// dataflow plus a summary file under `target`.
pub async fn extract_dataflow_definitions(
    client: &PowerBiClient,
    workspace_id: &str,
    target: &OutputTarget,
    options: &ExtractionOptions,
) -> Result<ExtractionSummary, ExtractionError> {
    let scan = scan_workspaces(client, &[workspace_id.to_string()], &options.scan).await?;
    let workspace = scan.workspace(workspace_id);
    let workspace_name = workspace
        .and_then(|ws| ws.name.clone())
        .unwrap_or_else(|| "Unknown".to_string());
    let dataflows = scan.dataflows_of(workspace);

    log::info!(
        "Found {} dataflow(s) in workspace: {}",
        dataflows.len(),
        workspace_name
    );

    let mut extracted = Vec::with_capacity(dataflows.len());
    for (index, dataflow) in dataflows.iter().enumerate() {
        log::info!(
            "Dataflow {}/{}: {} ({})",
            index + 1,
            dataflows.len(),
            dataflow.name.as_deref().unwrap_or("Unknown"),
            dataflow.object_id
        );

        let definition = match get_decoded_dataflow_definition(
            client,
            workspace_id,
            &dataflow.object_id,
            options.definition_poll,
        )
        .await
        {
            Ok(definition) => definition,
            Err(e) => {
                log::error!(
                    "Error retrieving definition for {}: {}",
                    dataflow.object_id,
                    e
                );
                extracted.push(ExtractedDataflow::failed(dataflow, e.to_string()));
                continue;
            }
        };

        let now = Utc::now();
        let file_name = timestamped_file_name(
            "dataflow",
            dataflow.name.as_deref().unwrap_or(&dataflow.object_id),
            "definition",
            now,
        );
        let with_context = DefinitionWithContext {
            workspace_id,
            workspace_name: &workspace_name,
            dataflow_id: &dataflow.object_id,
            dataflow_name: dataflow.name.as_deref(),
            configured_by: dataflow.configured_by.as_deref(),
            modified_date: dataflow.modified_date_time.as_deref(),
            extraction_timestamp: now,
            definition: &definition,
        };

        match target.save_json_or_skip(&file_name, &with_context) {
            Ok(definition_file) => extracted.push(ExtractedDataflow {
                dataflow_id: dataflow.object_id.clone(),
                dataflow_name: dataflow.name.clone(),
                configured_by: dataflow.configured_by.clone(),
                modified_date: dataflow.modified_date_time.clone(),
                definition_file,
                definition: Some(definition),
                error: None,
            }),
            Err(e) => {
                log::error!("Failed to save definition of {}: {}", dataflow.object_id, e);
                extracted.push(ExtractedDataflow::failed(dataflow, e.to_string()));
            }
        }
    }

    let now = Utc::now();
    let mut summary = ExtractionSummary {
        extraction_timestamp: now,
        workspace_id: workspace_id.to_string(),
        workspace_name,
        dataflow_count: dataflows.len(),
        dataflows: extracted,
        summary_file: None,
    };

    let summary_name = timestamped_file_name(
        "workspace",
        &summary.workspace_name,
        "definitions_summary",
        now,
    );
    summary.summary_file = target.save_json_or_skip(&summary_name, &summary)?;

    log::info!(
        "Extraction finished: {} succeeded, {} failed",
        summary.succeeded(),
        summary.failed()
    );
    Ok(summary)
}
