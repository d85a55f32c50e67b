use crate::powerbi::client::{PowerBiClient, PowerBiError};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Substrings (lower-case) of setting names that matter for metadata scanning.
const SCANNING_KEYWORDS: [&str; 4] = ["metadata", "scan", "admin", "api"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSettingsResponse {
    #[serde(default)]
    pub tenant_settings: Vec<TenantSetting>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSetting {
    #[serde(default)]
    pub setting_name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub can_specify_security_groups: bool,
    #[serde(default)]
    pub enabled_security_groups: Vec<SecurityGroup>,
    #[serde(default)]
    pub tenant_setting_group: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroup {
    #[serde(default)]
    pub graph_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingStatus {
    pub enabled: bool,
    pub can_specify_security_groups: bool,
    pub enabled_security_groups: Vec<SecurityGroup>,
}

/// Get all tenant settings (Fabric admin API)
pub async fn get_tenant_settings(
    client: &PowerBiClient,
) -> Result<TenantSettingsResponse, PowerBiError> {
    client
        .fabric_request(Method::GET, "admin/tenantsettings", None::<&String>)
        .await
}

/// Settings related to metadata scanning and admin APIs, keyed by setting name
pub async fn check_metadata_scanning_enabled(
    client: &PowerBiClient,
) -> Result<BTreeMap<String, SettingStatus>, PowerBiError> {
    let settings = get_tenant_settings(client).await?;
    Ok(scanning_settings(&settings.tenant_settings))
}

pub fn scanning_settings(settings: &[TenantSetting]) -> BTreeMap<String, SettingStatus> {
    settings
        .iter()
        .filter(|setting| {
            let name = setting.setting_name.to_lowercase();
            SCANNING_KEYWORDS.iter().any(|keyword| name.contains(keyword))
        })
        .map(|setting| {
            (
                setting.setting_name.clone(),
                SettingStatus {
                    enabled: setting.enabled,
                    can_specify_security_groups: setting.can_specify_security_groups,
                    enabled_security_groups: setting.enabled_security_groups.clone(),
                },
            )
        })
        .collect()
}
