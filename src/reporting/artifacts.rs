//! Single-artifact lookups and capacity overviews built from the per-artifact admin endpoints.

use crate::powerbi::client::{PowerBiClient, PowerBiError};
use crate::powerbi::models::{
    App, Capacity, Dashboard, Dataflow, Dataset, Datasource, PrincipalAccess, Report, Tile,
    Workload,
};
use crate::powerbi::{apps, capacities, dashboards, dataflows, datasets, reports};
use serde::Serialize;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactType {
    Dataset,
    Report,
    Dashboard,
    Dataflow,
    App,
}

impl FromStr for ArtifactType {
    type Err = PowerBiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dataset" | "semanticmodel" | "semantic_model" => Ok(ArtifactType::Dataset),
            "report" => Ok(ArtifactType::Report),
            "dashboard" => Ok(ArtifactType::Dashboard),
            "dataflow" => Ok(ArtifactType::Dataflow),
            "app" => Ok(ArtifactType::App),
            other => Err(PowerBiError::InvalidArgument(format!(
                "unknown artifact type '{}', expected dataset, report, dashboard, dataflow or app",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ArtifactDetails {
    Dataset {
        dataset: Dataset,
        users: Vec<PrincipalAccess>,
        datasources: Vec<Datasource>,
    },
    Report {
        report: Report,
        users: Vec<PrincipalAccess>,
    },
    Dashboard {
        dashboard: Dashboard,
        users: Vec<PrincipalAccess>,
        tiles: Vec<Tile>,
    },
    Dataflow {
        dataflow: Dataflow,
        users: Vec<PrincipalAccess>,
    },
    App {
        app: App,
        users: Vec<PrincipalAccess>,
    },
}

/// Fetch an artifact with its users, plus datasources (datasets) or tiles (dashboards).
pub async fn artifact_details(
    client: &PowerBiClient,
    artifact_type: ArtifactType,
    id: &str,
) -> Result<ArtifactDetails, PowerBiError> {
    log::debug!("Fetching {:?} {}", artifact_type, id);

    let details = match artifact_type {
        ArtifactType::Dataset => {
            let (dataset, users, datasources) = futures::try_join!(
                datasets::get_dataset(client, id),
                datasets::get_dataset_users(client, id),
                datasets::get_datasources(client, id),
            )?;
            ArtifactDetails::Dataset {
                dataset,
                users,
                datasources,
            }
        }
        ArtifactType::Report => {
            let (report, users) = futures::try_join!(
                reports::get_report(client, id),
                reports::get_report_users(client, id),
            )?;
            ArtifactDetails::Report { report, users }
        }
        ArtifactType::Dashboard => {
            let (dashboard, users, tiles) = futures::try_join!(
                dashboards::get_dashboard(client, id),
                dashboards::get_dashboard_users(client, id),
                dashboards::get_tiles(client, id),
            )?;
            ArtifactDetails::Dashboard {
                dashboard,
                users,
                tiles,
            }
        }
        ArtifactType::Dataflow => {
            let (dataflow, users) = futures::try_join!(
                dataflows::get_dataflow(client, id),
                dataflows::get_dataflow_users(client, id),
            )?;
            ArtifactDetails::Dataflow { dataflow, users }
        }
        ArtifactType::App => {
            let (app, users) =
                futures::try_join!(apps::get_app(client, id), apps::get_app_users(client, id))?;
            ArtifactDetails::App { app, users }
        }
    };

    Ok(details)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityOverview {
    #[serde(flatten)]
    pub capacity: Capacity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workloads: Option<Vec<Workload>>,
}

/// Every capacity in the tenant, optionally with its workload states.
pub async fn capacity_overview(
    client: &PowerBiClient,
    include_workloads: bool,
) -> Result<Vec<CapacityOverview>, PowerBiError> {
    let mut overview = Vec::new();
    for capacity in capacities::get_capacities(client).await? {
        let workloads = if include_workloads {
            Some(capacities::get_capacity_workloads(client, &capacity.id).await?)
        } else {
            None
        };
        overview.push(CapacityOverview {
            capacity,
            workloads,
        });
    }
    Ok(overview)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn artifact_type_is_case_insensitive() {
        assert_eq!("Dataset".parse::<ArtifactType>().unwrap(), ArtifactType::Dataset);
        assert_eq!(" APP ".parse::<ArtifactType>().unwrap(), ArtifactType::App);
        assert_eq!(
            "semanticModel".parse::<ArtifactType>().unwrap(),
            ArtifactType::Dataset
        );
        assert!(matches!(
            "lakehouse".parse::<ArtifactType>(),
            Err(PowerBiError::InvalidArgument(_))
        ));
    }

    #[test]
    fn details_are_tagged_by_type() {
        let report: Report = serde_json::from_value(json!({"id": "rp-1", "name": "Sales"})).unwrap();
        let details = ArtifactDetails::Report {
            report,
            users: Vec::new(),
        };

        let value = serde_json::to_value(&details).unwrap();
        assert_eq!(value["type"], "report");
        assert_eq!(value["report"]["name"], "Sales");
        assert_eq!(value["users"], json!([]));
    }

    #[test]
    fn capacity_overview_flattens_capacity() {
        let capacity: Capacity =
            serde_json::from_value(json!({"id": "cap-1", "sku": "F64"})).unwrap();
        let overview = CapacityOverview {
            capacity,
            workloads: None,
        };

        let value = serde_json::to_value(&overview).unwrap();
        assert_eq!(value["id"], "cap-1");
        assert_eq!(value["sku"], "F64");
        assert!(value.get("workloads").is_none());
    }
}
