use crate::powerbi::client::{PowerBiClient, PowerBiError};
use crate::powerbi::datasets;
use crate::powerbi::models::{Dataset, Refresh};
use serde::Serialize;

/// Refreshes fetched per dataset; only the newest is reported.
const HISTORY_DEPTH: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummary {
    pub dataset_id: String,
    pub dataset_name: Option<String>,
    pub last_refresh: Option<String>,
    pub status: Option<String>,
    pub refresh_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    pub workspace_id: String,
    pub dataset_count: usize,
    pub refreshes: Vec<RefreshSummary>,
    /// Datasets whose history could not be read.
    pub failures: Vec<DatasetFailure>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetFailure {
    pub dataset_id: String,
    pub error: String,
}

/// Summarize the newest entry of a dataset's refresh history (most recent first).
pub fn latest_refresh(dataset: &Dataset, history: &[Refresh]) -> Option<RefreshSummary> {
    let latest = history.first()?;
    let failed = latest.status.as_deref() == Some("Failed");
    Some(RefreshSummary {
        dataset_id: dataset.id.clone(),
        dataset_name: dataset.name.clone(),
        last_refresh: latest.start_time.clone(),
        status: latest.status.clone(),
        refresh_type: latest.refresh_type.clone(),
        error: failed.then(|| {
            latest
                .service_exception_json
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string())
        }),
    })
}

/// Latest refresh of every dataset in a workspace. Per-dataset errors are recorded, not raised.
pub async fn refresh_report(
    client: &PowerBiClient,
    workspace_id: &str,
) -> Result<RefreshReport, PowerBiError> {
    let datasets = datasets::get_datasets_in_workspace(client, workspace_id).await?;
    let mut refreshes = Vec::new();
    let mut failures = Vec::new();

    for dataset in &datasets {
        match datasets::get_refresh_history(client, &dataset.id, HISTORY_DEPTH).await {
            Ok(history) => match latest_refresh(dataset, &history) {
                Some(summary) => refreshes.push(summary),
                None => log::debug!("Dataset {} has no refresh history", dataset.id),
            },
            Err(e) => {
                log::warn!("Error retrieving refresh history for {}: {}", dataset.id, e);
                failures.push(DatasetFailure {
                    dataset_id: dataset.id.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    Ok(RefreshReport {
        workspace_id: workspace_id.to_string(),
        dataset_count: datasets.len(),
        refreshes,
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dataset() -> Dataset {
        serde_json::from_value(json!({"id": "ds-1", "name": "Sales"})).unwrap()
    }

    #[test]
    fn reports_newest_refresh() {
        let history: Vec<Refresh> = serde_json::from_value(json!([
            {"startTime": "2024-05-02T01:00:00Z", "status": "Completed", "refreshType": "Scheduled"},
            {"startTime": "2024-05-01T01:00:00Z", "status": "Failed"}
        ]))
        .unwrap();

        let summary = latest_refresh(&dataset(), &history).unwrap();
        assert_eq!(summary.last_refresh.as_deref(), Some("2024-05-02T01:00:00Z"));
        assert_eq!(summary.status.as_deref(), Some("Completed"));
        assert_eq!(summary.error, None);
    }

    #[test]
    fn failed_refresh_carries_service_exception() {
        let history: Vec<Refresh> = serde_json::from_value(json!([
            {"status": "Failed", "serviceExceptionJson": "{\"errorCode\":\"ModelRefreshFailed\"}"}
        ]))
        .unwrap();
        let summary = latest_refresh(&dataset(), &history).unwrap();
        assert_eq!(
            summary.error.as_deref(),
            Some("{\"errorCode\":\"ModelRefreshFailed\"}")
        );

        let history: Vec<Refresh> = serde_json::from_value(json!([{"status": "Failed"}])).unwrap();
        let summary = latest_refresh(&dataset(), &history).unwrap();
        assert_eq!(summary.error.as_deref(), Some("Unknown error"));
    }

    #[test]
    fn empty_history_has_no_summary() {
        assert_eq!(latest_refresh(&dataset(), &[]), None);
    }
}
