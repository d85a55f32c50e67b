mod common;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{Engine as _, engine::general_purpose};
use powerbi_admin_mcp::output::OutputTarget;
use powerbi_admin_mcp::powerbi::scanner::ScanOptions;
use powerbi_admin_mcp::reporting::extraction::{
    ExtractionOptions, extract_dataflow_definitions,
};
use serde_json::{Value, json};

fn router() -> Router {
    Router::new()
        .route(
            "/admin/workspaces/getInfo",
            post(|| async { (StatusCode::ACCEPTED, Json(json!({"id": "scan-1"}))) }),
        )
        .route(
            "/admin/workspaces/scanStatus/:id",
            get(|Path(id): Path<String>| async move {
                Json(json!({"id": id, "status": "Succeeded"}))
            }),
        )
        .route(
            "/admin/workspaces/scanResult/:id",
            get(|| async {
                Json(json!({
                    "workspaces": [{
                        "id": "ws-1",
                        "name": "Sales Ops",
                        "dataflows": [
                            {"objectId": "df-1", "name": "Orders", "configuredBy": "ana@contoso.com"},
                            {"objectId": "df-2", "name": "Stock"}
                        ]
                    }]
                }))
            }),
        )
        .route(
            "/fabric/workspaces/ws-1/dataflows/:id/getDefinition",
            post(|Path(id): Path<String>| async move {
                if id != "df-1" {
                    return (StatusCode::NOT_FOUND, "ItemNotFound").into_response();
                }
                let mashup = general_purpose::STANDARD.encode("section Section1;");
                Json(json!({
                    "definition": {"parts": [
                        {"path": "mashup.pq", "payload": mashup, "payloadType": "InlineBase64"}
                    ]}
                }))
                .into_response()
            }),
        )
}

fn files_in(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn extraction_saves_definitions_and_summary() {
    let client = common::client(&common::spawn(router()).await);
    let dir = tempfile::tempdir().unwrap();
    let target = OutputTarget::Local(dir.path().to_path_buf());
    let options = ExtractionOptions {
        scan: ScanOptions {
            poll: common::fast_poll(),
            ..ScanOptions::default()
        },
        definition_poll: common::fast_poll(),
    };

    let summary = extract_dataflow_definitions(&client, "ws-1", &target, &options)
        .await
        .unwrap();

    assert_eq!(summary.workspace_name, "Sales Ops");
    assert_eq!(summary.dataflow_count, 2);
    assert_eq!(summary.succeeded(), 1);
    assert_eq!(summary.failed(), 1);
    assert!(summary.dataflows[1].error.as_deref().unwrap().contains("404"));

    let files = files_in(dir.path());
    assert_eq!(files.len(), 2, "{files:?}");
    assert!(files[0].starts_with("dataflow_Orders_") && files[0].ends_with("_definition.json"));
    assert!(
        files[1].starts_with("workspace_Sales_Ops_")
            && files[1].ends_with("_definitions_summary.json")
    );

    let saved: Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join(&files[0])).unwrap())
            .unwrap();
    assert_eq!(saved["workspace_name"], "Sales Ops");
    assert_eq!(saved["configured_by"], "ana@contoso.com");
    assert_eq!(
        summary.summary_file.as_deref(),
        Some(dir.path().join(&files[1]).to_string_lossy().as_ref())
    );
}

#[tokio::test]
async fn onelake_target_skips_files_but_still_extracts() {
    let client = common::client(&common::spawn(router()).await);
    let target = OutputTarget::parse(Some(
        "abfss://ws@onelake.dfs.fabric.microsoft.com/lh.Lakehouse/Files/",
    ));
    let options = ExtractionOptions {
        scan: ScanOptions {
            poll: common::fast_poll(),
            ..ScanOptions::default()
        },
        definition_poll: common::fast_poll(),
    };

    let summary = extract_dataflow_definitions(&client, "ws-1", &target, &options)
        .await
        .unwrap();

    assert_eq!(summary.succeeded(), 1);
    assert!(summary.summary_file.is_none());
    assert!(summary.dataflows[0].definition_file.is_none());
}
