//! Who can reach a workspace and the datasets and reports in it.

use crate::powerbi::client::{PowerBiClient, PowerBiError};
use crate::powerbi::models::PrincipalAccess;
use crate::powerbi::{datasets, reports, workspaces};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArtifactKind {
    Workspace,
    Dataset,
    Report,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessEntry {
    pub principal: String,
    pub principal_type: Option<String>,
    pub access_right: Option<String>,
}

impl From<&PrincipalAccess> for AccessEntry {
    fn from(user: &PrincipalAccess) -> Self {
        Self {
            principal: user.principal().to_string(),
            principal_type: user.principal_type.clone(),
            access_right: user.access_right().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactAccess {
    pub kind: ArtifactKind,
    pub id: String,
    pub name: Option<String>,
    pub users: Vec<AccessEntry>,
    /// Set when the user list could not be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ArtifactAccess {
    fn from_result(
        kind: ArtifactKind,
        id: &str,
        name: Option<String>,
        users: Result<Vec<PrincipalAccess>, PowerBiError>,
    ) -> Self {
        let (users, error) = match users {
            Ok(users) => (users.iter().map(AccessEntry::from).collect(), None),
            Err(e) => {
                log::warn!("Could not retrieve users of {:?} {}: {}", kind, id, e);
                (Vec::new(), Some(e.to_string()))
            }
        };
        Self {
            kind,
            id: id.to_string(),
            name,
            users,
            error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessAudit {
    pub workspace: ArtifactAccess,
    pub datasets: Vec<ArtifactAccess>,
    pub reports: Vec<ArtifactAccess>,
}

impl AccessAudit {
    /// Every principal that appears anywhere in the audit, deduplicated and sorted.
    pub fn principals(&self) -> Vec<&str> {
        let mut all: Vec<&str> = std::iter::once(&self.workspace)
            .chain(&self.datasets)
            .chain(&self.reports)
            .flat_map(|artifact| artifact.users.iter().map(|u| u.principal.as_str()))
            .collect();
        all.sort_unstable();
        all.dedup();
        all
    }
}

/// Audit workspace, dataset and report access.
///
/// The workspace itself and the artifact lists must be readable; a failure to read a single
/// artifact's users is recorded on that artifact.
pub async fn audit_workspace_access(
    client: &PowerBiClient,
    workspace_id: &str,
) -> Result<AccessAudit, PowerBiError> {
    let workspace = workspaces::get_workspace(client, workspace_id).await?;
    let workspace_users = workspaces::get_workspace_users(client, workspace_id).await;
    let workspace = ArtifactAccess::from_result(
        ArtifactKind::Workspace,
        &workspace.id,
        workspace.name.clone(),
        workspace_users,
    );

    let mut dataset_access = Vec::new();
    for dataset in datasets::get_datasets_in_workspace(client, workspace_id).await? {
        let users = datasets::get_dataset_users(client, &dataset.id).await;
        dataset_access.push(ArtifactAccess::from_result(
            ArtifactKind::Dataset,
            &dataset.id,
            dataset.name,
            users,
        ));
    }

    let mut report_access = Vec::new();
    for report in reports::get_reports_in_workspace(client, workspace_id).await? {
        let users = reports::get_report_users(client, &report.id).await;
        report_access.push(ArtifactAccess::from_result(
            ArtifactKind::Report,
            &report.id,
            report.name,
            users,
        ));
    }

    Ok(AccessAudit {
        workspace,
        datasets: dataset_access,
        reports: report_access,
    })
}
