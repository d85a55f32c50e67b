use crate::powerbi::client::{PowerBiClient, PowerBiError};
use crate::powerbi::models::{ODataList, PrincipalAccess, Report};

/// Get all reports in a workspace
pub async fn get_reports_in_workspace(
    client: &PowerBiClient,
    workspace_id: &str,
) -> Result<Vec<Report>, PowerBiError> {
    let path = format!("groups/{}/reports", workspace_id);
    let response: ODataList<Report> = client.admin_get(&path).await?;
    Ok(response.value)
}

pub async fn get_report(client: &PowerBiClient, report_id: &str) -> Result<Report, PowerBiError> {
    client.admin_get(&format!("reports/{}", report_id)).await
}

pub async fn get_report_users(
    client: &PowerBiClient,
    report_id: &str,
) -> Result<Vec<PrincipalAccess>, PowerBiError> {
    let path = format!("reports/{}/users", report_id);
    let response: ODataList<PrincipalAccess> = client.admin_get(&path).await?;
    Ok(response.value)
}
