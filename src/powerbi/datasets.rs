use crate::powerbi::client::{PowerBiClient, PowerBiError};
use crate::powerbi::models::{Dataset, Datasource, ODataList, PrincipalAccess, Refresh};

/// Get all datasets in a workspace
pub async fn get_datasets_in_workspace(
    client: &PowerBiClient,
    workspace_id: &str,
) -> Result<Vec<Dataset>, PowerBiError> {
    let path = format!("groups/{}/datasets", workspace_id);
    let response: ODataList<Dataset> = client.admin_get(&path).await?;
    Ok(response.value)
}

pub async fn get_dataset(client: &PowerBiClient, dataset_id: &str) -> Result<Dataset, PowerBiError> {
    client.admin_get(&format!("datasets/{}", dataset_id)).await
}

pub async fn get_dataset_users(
    client: &PowerBiClient,
    dataset_id: &str,
) -> Result<Vec<PrincipalAccess>, PowerBiError> {
    let path = format!("datasets/{}/users", dataset_id);
    let response: ODataList<PrincipalAccess> = client.admin_get(&path).await?;
    Ok(response.value)
}

/// Basic datasource info. The scanner returns richer `datasourceInstances`.
pub async fn get_datasources(
    client: &PowerBiClient,
    dataset_id: &str,
) -> Result<Vec<Datasource>, PowerBiError> {
    let path = format!("datasets/{}/datasources", dataset_id);
    let response: ODataList<Datasource> = client.admin_get(&path).await?;
    Ok(response.value)
}

/// Most recent refreshes first
pub async fn get_refresh_history(
    client: &PowerBiClient,
    dataset_id: &str,
    top: u32,
) -> Result<Vec<Refresh>, PowerBiError> {
    let path = format!("datasets/{}/refreshes?$top={}", dataset_id, top);
    let response: ODataList<Refresh> = client.admin_get(&path).await?;
    Ok(response.value)
}
