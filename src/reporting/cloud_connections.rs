use crate::powerbi::scanner::ScanResult;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudConnection {
    #[serde(rename = "type")]
    pub connection_type: String,
    pub connection_details: Value,
    pub datasource_id: Option<String>,
    pub gateway_id: Option<String>,
}

impl CloudConnection {
    /// No gateway means the service connects directly.
    pub fn is_cloud(&self) -> bool {
        self.gateway_id.as_deref().is_none_or(str::is_empty)
    }
}

/// Flatten the `datasourceInstances` of a scan.
pub fn cloud_connections(scan: &ScanResult) -> Vec<CloudConnection> {
    scan.datasource_instances
        .iter()
        .map(|ds| CloudConnection {
            connection_type: ds
                .datasource_type
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
            connection_details: ds.connection_details.clone(),
            datasource_id: ds.datasource_id.clone(),
            gateway_id: ds.gateway_id.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_datasource_instances() {
        let scan: ScanResult = serde_json::from_value(json!({
            "datasourceInstances": [
                {"datasourceType": "Sql", "connectionDetails": {"server": "s"}, "datasourceId": "d1", "gatewayId": "g1"},
                {"connectionDetails": {"url": "https://api"}, "datasourceId": "d2"}
            ]
        }))
        .unwrap();

        let connections = cloud_connections(&scan);
        assert_eq!(connections.len(), 2);
        assert!(!connections[0].is_cloud());
        assert_eq!(connections[1].connection_type, "Unknown");
        assert!(connections[1].is_cloud());
        assert_eq!(
            serde_json::to_value(&connections[1]).unwrap(),
            json!({"type": "Unknown", "connectionDetails": {"url": "https://api"}, "datasourceId": "d2", "gatewayId": null})
        );
    }
}
