use crate::powerbi::models::Workspace;
use crate::reporting::csv_writer_to_string;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRow {
    pub id: String,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub workspace_type: Option<String>,
    pub state: Option<String>,
    pub is_on_dedicated_capacity: bool,
    pub capacity_id: Option<String>,
}

pub fn workspace_inventory(workspaces: &[Workspace]) -> Vec<InventoryRow> {
    workspaces
        .iter()
        .map(|ws| InventoryRow {
            id: ws.id.clone(),
            name: ws.name.clone(),
            workspace_type: ws.workspace_type.clone(),
            state: ws.state.clone(),
            is_on_dedicated_capacity: ws.is_on_dedicated_capacity.unwrap_or(false),
            capacity_id: ws.capacity_id.clone(),
        })
        .collect()
}

/// Converts inventory rows to CSV format.
/// Columns: id, name, type, state, is_on_dedicated_capacity, capacity_id ("Shared" when absent)
pub fn inventory_to_csv(rows: &[InventoryRow]) -> Result<String, String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "id",
        "name",
        "type",
        "state",
        "is_on_dedicated_capacity",
        "capacity_id",
    ])
    .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    for row in rows {
        wtr.write_record([
            row.id.as_str(),
            row.name.as_deref().unwrap_or(""),
            row.workspace_type.as_deref().unwrap_or(""),
            row.state.as_deref().unwrap_or(""),
            if row.is_on_dedicated_capacity { "true" } else { "false" },
            row.capacity_id.as_deref().unwrap_or("Shared"),
        ])
        .map_err(|e| format!("Failed to write CSV row: {}", e))?;
    }

    wtr.flush()
        .map_err(|e| format!("Failed to flush CSV writer: {}", e))?;

    csv_writer_to_string(wtr)
}
