use crate::powerbi::client::{PowerBiClient, PowerBiError};
use crate::powerbi::models::{Dashboard, ODataList, PrincipalAccess, Tile};

/// Get all dashboards in a workspace
pub async fn get_dashboards_in_workspace(
    client: &PowerBiClient,
    workspace_id: &str,
) -> Result<Vec<Dashboard>, PowerBiError> {
    let path = format!("groups/{}/dashboards", workspace_id);
    let response: ODataList<Dashboard> = client.admin_get(&path).await?;
    Ok(response.value)
}

pub async fn get_dashboard(
    client: &PowerBiClient,
    dashboard_id: &str,
) -> Result<Dashboard, PowerBiError> {
    client.admin_get(&format!("dashboards/{}", dashboard_id)).await
}

pub async fn get_dashboard_users(
    client: &PowerBiClient,
    dashboard_id: &str,
) -> Result<Vec<PrincipalAccess>, PowerBiError> {
    let path = format!("dashboards/{}/users", dashboard_id);
    let response: ODataList<PrincipalAccess> = client.admin_get(&path).await?;
    Ok(response.value)
}

pub async fn get_tiles(client: &PowerBiClient, dashboard_id: &str) -> Result<Vec<Tile>, PowerBiError> {
    let path = format!("dashboards/{}/tiles", dashboard_id);
    let response: ODataList<Tile> = client.admin_get(&path).await?;
    Ok(response.value)
}
