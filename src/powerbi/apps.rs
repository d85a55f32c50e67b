use crate::powerbi::client::{PowerBiClient, PowerBiError};
use crate::powerbi::models::{App, ODataList, PrincipalAccess};

/// List apps in the tenant. The endpoint requires `$top`.
pub async fn get_apps(client: &PowerBiClient, top: u32) -> Result<Vec<App>, PowerBiError> {
    let path = format!("apps?$top={}", top);
    let response: ODataList<App> = client.admin_get(&path).await?;
    Ok(response.value)
}

pub async fn get_app(client: &PowerBiClient, app_id: &str) -> Result<App, PowerBiError> {
    client.admin_get(&format!("apps/{}", app_id)).await
}

pub async fn get_app_users(
    client: &PowerBiClient,
    app_id: &str,
) -> Result<Vec<PrincipalAccess>, PowerBiError> {
    let path = format!("apps/{}/users", app_id);
    let response: ODataList<PrincipalAccess> = client.admin_get(&path).await?;
    Ok(response.value)
}
