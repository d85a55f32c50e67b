mod common;

use axum::extract::{Path, Query};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use powerbi_admin_mcp::powerbi::workspaces::{ModifiedWorkspacesQuery, get_modified_workspaces};
use powerbi_admin_mcp::powerbi::{PowerBiError, apps};
use powerbi_admin_mcp::reporting::artifacts::{
    ArtifactDetails, ArtifactType, artifact_details, capacity_overview,
};
use serde_json::json;
use std::collections::HashMap;

fn users(right_field: &'static str) -> Json<serde_json::Value> {
    Json(json!({"value": [{"emailAddress": "ana@contoso.com", right_field: "Owner"}]}))
}

fn router() -> Router {
    Router::new()
        .route(
            "/admin/datasets/:id",
            get(|Path(id): Path<String>| async move { Json(json!({"id": id, "name": "Sales"})) }),
        )
        .route(
            "/admin/datasets/:id/users",
            get(|| async { users("datasetUserAccessRight") }),
        )
        .route(
            "/admin/datasets/:id/datasources",
            get(|| async {
                Json(json!({"value": [{
                    "datasourceType": "Sql",
                    "connectionDetails": {"server": "srv", "database": "db"},
                    "datasourceId": "src-1"
                }]}))
            }),
        )
        .route(
            "/admin/reports/:id",
            get(|Path(id): Path<String>| async move { Json(json!({"id": id, "name": "Sales report"})) }),
        )
        .route(
            "/admin/reports/:id/users",
            get(|| async { users("reportUserAccessRight") }),
        )
        .route(
            "/admin/dashboards/:id",
            get(|Path(id): Path<String>| async move { Json(json!({"id": id, "displayName": "Exec"})) }),
        )
        .route(
            "/admin/dashboards/:id/users",
            get(|| async { users("dashboardUserAccessRight") }),
        )
        .route(
            "/admin/dashboards/:id/tiles",
            get(|| async { Json(json!({"value": [{"id": "t-1", "title": "Revenue", "reportId": "rp-1"}]})) }),
        )
        .route(
            "/admin/dataflows/:id",
            get(|Path(id): Path<String>| async move { Json(json!({"objectId": id, "name": "Orders"})) }),
        )
        .route(
            "/admin/dataflows/:id/users",
            get(|| async { users("dataflowUserAccessRight") }),
        )
        .route(
            "/admin/apps",
            get(|Query(query): Query<HashMap<String, String>>| async move {
                assert_eq!(query.get("$top").map(String::as_str), Some("25"));
                Json(json!({"value": [{"id": "app-1", "name": "Finance app"}]}))
            }),
        )
        .route(
            "/admin/apps/:id",
            get(|Path(id): Path<String>| async move { Json(json!({"id": id, "name": "Finance app"})) }),
        )
        .route("/admin/apps/:id/users", get(|| async { users("appUserAccessRight") }))
        .route(
            "/admin/capacities",
            get(|| async { Json(json!({"value": [{"id": "cap-1", "sku": "F64"}]})) }),
        )
        .route(
            "/admin/capacities/:id/workloads",
            get(|| async {
                Json(json!({"value": [{"name": "Dataflows", "state": "Enabled", "maxMemoryPercentageSetByUser": 20}]}))
            }),
        )
        .route(
            "/admin/workspaces/modified",
            get(|Query(query): Query<HashMap<String, String>>| async move {
                assert_eq!(
                    query.get("modifiedSince").map(String::as_str),
                    Some("2024-05-01T00:00:00.000Z")
                );
                assert_eq!(
                    query.get("excludePersonalWorkspaces").map(String::as_str),
                    Some("true")
                );
                assert!(!query.contains_key("excludeInActiveWorkspaces"));
                Json(json!([{"id": "ws-1"}, {"id": "ws-2"}]))
            }),
        )
}

#[tokio::test]
async fn dataset_details_include_datasources() {
    let client = common::client(&common::spawn(router()).await);

    match artifact_details(&client, ArtifactType::Dataset, "ds-1").await.unwrap() {
        ArtifactDetails::Dataset {
            dataset,
            users,
            datasources,
        } => {
            assert_eq!(dataset.id, "ds-1");
            assert_eq!(users[0].access_right(), Some("Owner"));
            assert_eq!(datasources[0].connection_details["server"], "srv");
        }
        other => panic!("expected dataset details, got {other:?}"),
    }
}

#[tokio::test]
async fn dashboard_details_include_tiles() {
    let client = common::client(&common::spawn(router()).await);

    match artifact_details(&client, ArtifactType::Dashboard, "db-1").await.unwrap() {
        ArtifactDetails::Dashboard {
            dashboard,
            users,
            tiles,
        } => {
            assert_eq!(dashboard.display_name.as_deref(), Some("Exec"));
            assert_eq!(users.len(), 1);
            assert_eq!(tiles[0].report_id.as_deref(), Some("rp-1"));
        }
        other => panic!("expected dashboard details, got {other:?}"),
    }
}

#[tokio::test]
async fn report_dataflow_and_app_details() {
    let client = common::client(&common::spawn(router()).await);

    let report = artifact_details(&client, ArtifactType::Report, "rp-1").await.unwrap();
    assert!(matches!(report, ArtifactDetails::Report { ref report, .. } if report.id == "rp-1"));

    let dataflow = artifact_details(&client, ArtifactType::Dataflow, "df-1").await.unwrap();
    assert!(
        matches!(dataflow, ArtifactDetails::Dataflow { ref dataflow, .. } if dataflow.object_id == "df-1")
    );

    let app = artifact_details(&client, ArtifactType::App, "app-1").await.unwrap();
    match app {
        ArtifactDetails::App { app, users } => {
            assert_eq!(app.name.as_deref(), Some("Finance app"));
            assert_eq!(users[0].principal(), "ana@contoso.com");
        }
        other => panic!("expected app details, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_artifact_is_an_api_error() {
    let client = common::client(&common::spawn(router()).await);

    // the slash splits the id into an extra segment no route matches
    let err = artifact_details(&client, ArtifactType::Dashboard, "db/1")
        .await
        .unwrap_err();
    assert!(matches!(err, PowerBiError::ApiError { status: 404, .. }), "got {err:?}");
}

#[tokio::test]
async fn apps_are_listed_with_top() {
    let client = common::client(&common::spawn(router()).await);

    let published = apps::get_apps(&client, 25).await.unwrap();
    assert_eq!(published[0].id, "app-1");
}

#[tokio::test]
async fn capacities_with_and_without_workloads() {
    let client = common::client(&common::spawn(router()).await);

    let plain = capacity_overview(&client, false).await.unwrap();
    assert!(plain[0].workloads.is_none());

    let detailed = capacity_overview(&client, true).await.unwrap();
    let workloads = detailed[0].workloads.as_ref().unwrap();
    assert_eq!(workloads[0].name, "Dataflows");
    assert_eq!(workloads[0].max_memory_percentage_set_by_user, Some(20));
}

#[tokio::test]
async fn modified_workspaces_query() {
    let client = common::client(&common::spawn(router()).await);
    let query = ModifiedWorkspacesQuery {
        modified_since: Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()),
        exclude_personal_workspaces: true,
        exclude_inactive_workspaces: false,
    };

    let modified = get_modified_workspaces(&client, &query).await.unwrap();
    let ids: Vec<&str> = modified.iter().map(|w| w.id.as_str()).collect();
    assert_eq!(ids, vec!["ws-1", "ws-2"]);
}
