//! Read-only calls against a real tenant.
//!
//! Needs POWERBI_TENANT_ID, POWERBI_CLIENT_ID and POWERBI_CLIENT_SECRET for a service principal
//! allowed to use the admin APIs. Run with `--features e2e-tests`.
#![cfg(feature = "e2e-tests")]

use powerbi_admin_mcp::config::{CliCredentials, Config, FileConfig};
use powerbi_admin_mcp::powerbi::{PowerBiClient, capacities, tenant, workspaces};

fn live_client() -> PowerBiClient {
    dotenv::dotenv().ok();
    let credentials = CliCredentials {
        tenant_id: std::env::var("POWERBI_TENANT_ID").ok(),
        client_id: std::env::var("POWERBI_CLIENT_ID").ok(),
        client_secret: std::env::var("POWERBI_CLIENT_SECRET").ok(),
    };
    Config::resolve(credentials, FileConfig::default()).build_client()
}

#[tokio::test]
async fn lists_first_workspace_page() {
    let client = live_client();
    let page = workspaces::list_workspaces(&client, 10, 0, None).await.unwrap();
    assert!(page.len() <= 10);
}

#[tokio::test]
async fn reads_tenant_settings() {
    let client = live_client();
    let settings = tenant::get_tenant_settings(&client).await.unwrap();
    assert!(!settings.tenant_settings.is_empty());
}

#[tokio::test]
async fn lists_capacities() {
    let client = live_client();
    capacities::get_capacities(&client).await.unwrap();
}
