use crate::powerbi::client::{PowerBiClient, PowerBiError};
use crate::powerbi::models::{Capacity, ODataList, Workload};

/// List all capacities in the tenant
pub async fn get_capacities(client: &PowerBiClient) -> Result<Vec<Capacity>, PowerBiError> {
    let response: ODataList<Capacity> = client.admin_get("capacities").await?;
    Ok(response.value)
}

/// Workloads (and their states) configured on a capacity
pub async fn get_capacity_workloads(
    client: &PowerBiClient,
    capacity_id: &str,
) -> Result<Vec<Workload>, PowerBiError> {
    let path = format!("capacities/{}/workloads", capacity_id);
    let response: ODataList<Workload> = client.admin_get(&path).await?;
    Ok(response.value)
}
