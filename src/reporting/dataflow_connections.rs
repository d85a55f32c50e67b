//! Dataflow connection report for a single scanned workspace.

use crate::powerbi::models::Datasource;
use crate::powerbi::scanner::{ScanResult, ScannedDataflow};
use crate::reporting::{Count, count_top, csv_writer_to_string};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionRow {
    pub dataflow_name: Option<String>,
    pub dataflow_id: String,
    pub workspace_id: String,
    pub workspace_name: String,
    pub datasource_type: Option<String>,
    pub connection_details: Value,
    pub gateway_id: Option<String>,
    pub datasource_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataflowSummary {
    pub name: Option<String>,
    pub id: String,
    pub description: Option<String>,
    pub configured_by: Option<String>,
    pub modified_by: Option<String>,
    pub modified_date: Option<String>,
    pub table_count: usize,
    pub tables: Vec<String>,
    pub connection_count: usize,
    pub connections: Vec<ConnectionRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceDataflowReport {
    pub scan_timestamp: DateTime<Utc>,
    pub workspace_id: String,
    pub workspace_name: String,
    pub workspace_type: String,
    pub capacity_id: Option<String>,
    pub dataflow_count: usize,
    pub total_connections: usize,
    pub dataflows: Vec<DataflowSummary>,
    pub all_connections: Vec<ConnectionRow>,
}

impl WorkspaceDataflowReport {
    /// Connection types by number of connections.
    pub fn connection_breakdown(&self) -> Vec<Count> {
        count_top(
            self.all_connections
                .iter()
                .map(|c| c.datasource_type.as_deref().unwrap_or(UNKNOWN)),
            None,
        )
    }
}

/// Build the dataflow connection report for `workspace_id` from a scan result.
pub fn workspace_dataflow_report(
    workspace_id: &str,
    scan: &ScanResult,
    scanned_at: DateTime<Utc>,
) -> WorkspaceDataflowReport {
    let workspace = scan.workspace(workspace_id);
    let workspace_name = workspace
        .and_then(|ws| ws.name.clone())
        .unwrap_or_else(|| UNKNOWN.to_string());

    let dataflows: Vec<DataflowSummary> = scan
        .dataflows_of(workspace)
        .iter()
        .map(|df| summarize_dataflow(df, scan, workspace_id, &workspace_name))
        .collect();

    let all_connections: Vec<ConnectionRow> = dataflows
        .iter()
        .flat_map(|df| df.connections.iter().cloned())
        .collect();

    WorkspaceDataflowReport {
        scan_timestamp: scanned_at,
        workspace_id: workspace_id.to_string(),
        workspace_type: workspace
            .and_then(|ws| ws.workspace_type.clone())
            .unwrap_or_else(|| UNKNOWN.to_string()),
        capacity_id: workspace.and_then(|ws| ws.capacity_id.clone()),
        workspace_name,
        dataflow_count: dataflows.len(),
        total_connections: all_connections.len(),
        dataflows,
        all_connections,
    }
}

fn summarize_dataflow(
    dataflow: &ScannedDataflow,
    scan: &ScanResult,
    workspace_id: &str,
    workspace_name: &str,
) -> DataflowSummary {
    let connections: Vec<ConnectionRow> = dataflow_datasources(dataflow, scan)
        .into_iter()
        .map(|ds| ConnectionRow {
            dataflow_name: dataflow.name.clone(),
            dataflow_id: dataflow.object_id.clone(),
            workspace_id: workspace_id.to_string(),
            workspace_name: workspace_name.to_string(),
            datasource_type: ds.datasource_type.clone(),
            connection_details: ds.connection_details.clone(),
            gateway_id: ds.gateway_id.clone(),
            datasource_id: ds.datasource_id.clone(),
        })
        .collect();

    let tables: Vec<String> = dataflow
        .tables
        .iter()
        .filter_map(|t| t.name.clone())
        .collect();

    DataflowSummary {
        name: dataflow.name.clone(),
        id: dataflow.object_id.clone(),
        description: dataflow.description.clone(),
        configured_by: dataflow.configured_by.clone(),
        modified_by: dataflow.modified_by.clone(),
        modified_date: dataflow.modified_date_time.clone(),
        table_count: dataflow.tables.len(),
        tables,
        connection_count: connections.len(),
        connections,
    }
}

/// Inline datasources, else those referenced through `datasourceUsages`.
fn dataflow_datasources<'a>(dataflow: &'a ScannedDataflow, scan: &'a ScanResult) -> Vec<&'a Datasource> {
    if !dataflow.datasources.is_empty() {
        return dataflow.datasources.iter().collect();
    }

    dataflow
        .datasource_usages
        .iter()
        .filter_map(|usage| {
            let found = scan.datasource_instance(&usage.datasource_instance_id);
            if found.is_none() {
                log::warn!(
                    "Dataflow {} references unknown datasource instance {}",
                    dataflow.object_id,
                    usage.datasource_instance_id
                );
            }
            found
        })
        .collect()
}

/// Converts connection rows to CSV format.
/// Columns: workspace_name, dataflow_name, dataflow_id, datasource_type, gateway_id, datasource_id, connection_details
pub fn connections_to_csv(rows: &[ConnectionRow]) -> Result<String, String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "workspace_name",
        "dataflow_name",
        "dataflow_id",
        "datasource_type",
        "gateway_id",
        "datasource_id",
        "connection_details",
    ])
    .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    for row in rows {
        let details = if row.connection_details.is_null() {
            String::new()
        } else {
            row.connection_details.to_string()
        };
        wtr.write_record([
            row.workspace_name.as_str(),
            row.dataflow_name.as_deref().unwrap_or(""),
            row.dataflow_id.as_str(),
            row.datasource_type.as_deref().unwrap_or(""),
            row.gateway_id.as_deref().unwrap_or(""),
            row.datasource_id.as_deref().unwrap_or(""),
            details.as_str(),
        ])
        .map_err(|e| format!("Failed to write CSV row: {}", e))?;
    }

    wtr.flush()
        .map_err(|e| format!("Failed to flush CSV writer: {}", e))?;

    csv_writer_to_string(wtr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn scan() -> ScanResult {
        serde_json::from_value(json!({
            "workspaces": [{
                "id": "ws-1",
                "name": "Sales Ops",
                "type": "Workspace",
                "capacityId": "cap-9",
                "dataflows": [
                    {
                        "objectId": "df-1",
                        "name": "Orders",
                        "configuredBy": "ana@contoso.com",
                        "tables": [{"name": "Orders"}, {"name": "Customers"}],
                        "datasources": [
                            {"datasourceType": "Sql", "connectionDetails": {"server": "sql1", "database": "db"}, "datasourceId": "ds-a"},
                            {"datasourceType": "Web", "connectionDetails": {"url": "https://x"}, "gatewayId": "gw-1"}
                        ]
                    },
                    {
                        "objectId": "df-2",
                        "name": "Inventory",
                        "datasourceUsages": [{"datasourceInstanceId": "ds-b"}, {"datasourceInstanceId": "missing"}]
                    }
                ]
            }],
            "datasourceInstances": [
                {"datasourceType": "Sql", "connectionDetails": {"server": "sql2"}, "datasourceId": "ds-b"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn builds_report_with_connections() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let report = workspace_dataflow_report("ws-1", &scan(), at);

        assert_eq!(report.workspace_name, "Sales Ops");
        assert_eq!(report.workspace_type, "Workspace");
        assert_eq!(report.capacity_id.as_deref(), Some("cap-9"));
        assert_eq!(report.dataflow_count, 2);
        assert_eq!(report.total_connections, 3);

        let orders = &report.dataflows[0];
        assert_eq!(orders.tables, vec!["Orders", "Customers"]);
        assert_eq!(orders.table_count, 2);
        assert_eq!(orders.connection_count, 2);
        assert_eq!(orders.connections[1].gateway_id.as_deref(), Some("gw-1"));

        let inventory = &report.dataflows[1];
        assert_eq!(inventory.connection_count, 1);
        assert_eq!(inventory.connections[0].datasource_id.as_deref(), Some("ds-b"));
        assert_eq!(inventory.connections[0].workspace_name, "Sales Ops");
    }

    #[test]
    fn breakdown_orders_by_count() {
        let report = workspace_dataflow_report("ws-1", &scan(), Utc::now());
        let breakdown = report.connection_breakdown();
        assert_eq!(breakdown[0], Count { name: "Sql".into(), count: 2 });
        assert_eq!(breakdown[1], Count { name: "Web".into(), count: 1 });
    }

    #[test]
    fn empty_scan_reports_unknown_workspace() {
        let report = workspace_dataflow_report("ws-x", &ScanResult::default(), Utc::now());
        assert_eq!(report.workspace_name, "Unknown");
        assert_eq!(report.workspace_type, "Unknown");
        assert_eq!(report.dataflow_count, 0);
        assert!(report.all_connections.is_empty());
    }

    #[test]
    fn report_serializes_snake_case_keys() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let value = serde_json::to_value(workspace_dataflow_report("ws-1", &scan(), at)).unwrap();
        assert_eq!(value["scan_timestamp"], json!("2024-03-01T12:00:00Z"));
        assert_eq!(value["all_connections"][0]["connection_details"]["server"], json!("sql1"));
    }

    #[test]
    fn csv_has_header_and_compact_details() {
        let report = workspace_dataflow_report("ws-1", &scan(), Utc::now());
        let csv = connections_to_csv(&report.all_connections).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("workspace_name,dataflow_name,dataflow_id,datasource_type,gateway_id,datasource_id,connection_details")
        );
        assert_eq!(
            lines.next(),
            Some(r#"Sales Ops,Orders,df-1,Sql,,ds-a,"{""database"":""db"",""server"":""sql1""}""#)
        );
    }
}
