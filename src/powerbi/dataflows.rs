use crate::powerbi::client::{PowerBiClient, PowerBiError};
use crate::powerbi::models::{Dataflow, ODataList, PrincipalAccess};

/// Get all dataflows in a workspace
pub async fn get_dataflows_in_workspace(
    client: &PowerBiClient,
    workspace_id: &str,
) -> Result<Vec<Dataflow>, PowerBiError> {
    let path = format!("groups/{}/dataflows", workspace_id);
    let response: ODataList<Dataflow> = client.admin_get(&path).await?;
    Ok(response.value)
}

pub async fn get_dataflow(
    client: &PowerBiClient,
    dataflow_id: &str,
) -> Result<Dataflow, PowerBiError> {
    client.admin_get(&format!("dataflows/{}", dataflow_id)).await
}

pub async fn get_dataflow_users(
    client: &PowerBiClient,
    dataflow_id: &str,
) -> Result<Vec<PrincipalAccess>, PowerBiError> {
    let path = format!("dataflows/{}/users", dataflow_id);
    let response: ODataList<PrincipalAccess> = client.admin_get(&path).await?;
    Ok(response.value)
}
