use crate::powerbi::client::{PowerBiClient, PowerBiError};
use crate::powerbi::models::{
    Dashboard, Dataflow, Dataset, ModifiedWorkspace, ODataList, PrincipalAccess, Report, Workspace,
};
use crate::powerbi::{dashboards, dataflows, datasets, reports};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// `$top` ceiling enforced by the admin groups endpoint.
pub const MAX_WORKSPACES_PER_PAGE: u32 = 5000;

/// List workspaces in the tenant (one page)
pub async fn list_workspaces(
    client: &PowerBiClient,
    top: u32,
    skip: u32,
    filter: Option<&str>,
) -> Result<Vec<Workspace>, PowerBiError> {
    let path = groups_path(top, skip, filter)?;
    let response: ODataList<Workspace> = client.admin_get(&path).await?;
    Ok(response.value)
}

/// List every workspace, paging with `$skip` until a short page comes back
pub async fn list_all_workspaces(
    client: &PowerBiClient,
    filter: Option<&str>,
) -> Result<Vec<Workspace>, PowerBiError> {
    let mut all_workspaces = Vec::new();
    let mut skip = 0;

    loop {
        let page = list_workspaces(client, MAX_WORKSPACES_PER_PAGE, skip, filter).await?;
        let page_len = page.len() as u32;
        all_workspaces.extend(page);

        if page_len < MAX_WORKSPACES_PER_PAGE {
            break;
        }
        skip += page_len;
        log::debug!("Fetched {} workspaces so far", all_workspaces.len());
    }

    Ok(all_workspaces)
}

fn groups_path(top: u32, skip: u32, filter: Option<&str>) -> Result<String, PowerBiError> {
    if top == 0 || top > MAX_WORKSPACES_PER_PAGE {
        return Err(PowerBiError::InvalidArgument(format!(
            "$top must be between 1 and {}, got {}",
            MAX_WORKSPACES_PER_PAGE, top
        )));
    }

    let mut path = format!("groups?$top={}", top);
    if skip > 0 {
        path.push_str(&format!("&$skip={}", skip));
    }
    if let Some(filter) = filter {
        path.push_str(&format!("&$filter={}", urlencoding::encode(filter)));
    }
    Ok(path)
}

pub async fn get_workspace(
    client: &PowerBiClient,
    workspace_id: &str,
) -> Result<Workspace, PowerBiError> {
    client.admin_get(&format!("groups/{}", workspace_id)).await
}

/// Get all users with access to a workspace
pub async fn get_workspace_users(
    client: &PowerBiClient,
    workspace_id: &str,
) -> Result<Vec<PrincipalAccess>, PowerBiError> {
    let path = format!("groups/{}/users", workspace_id);
    let response: ODataList<PrincipalAccess> = client.admin_get(&path).await?;
    Ok(response.value)
}

#[derive(Debug, Default, Clone)]
pub struct ModifiedWorkspacesQuery {
    pub modified_since: Option<DateTime<Utc>>,
    pub exclude_personal_workspaces: bool,
    pub exclude_inactive_workspaces: bool,
}

impl ModifiedWorkspacesQuery {
    fn path(&self) -> String {
        let mut params = Vec::new();
        if let Some(since) = self.modified_since {
            let formatted = since.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
            params.push(format!("modifiedSince={}", urlencoding::encode(&formatted)));
        }
        if self.exclude_personal_workspaces {
            params.push("excludePersonalWorkspaces=true".to_string());
        }
        if self.exclude_inactive_workspaces {
            params.push("excludeInActiveWorkspaces=true".to_string());
        }

        if params.is_empty() {
            "workspaces/modified".to_string()
        } else {
            format!("workspaces/modified?{}", params.join("&"))
        }
    }
}

/// Workspace ids modified since a point in time (input for incremental scans)
pub async fn get_modified_workspaces(
    client: &PowerBiClient,
    query: &ModifiedWorkspacesQuery,
) -> Result<Vec<ModifiedWorkspace>, PowerBiError> {
    client.admin_get(&query.path()).await
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceDetails {
    pub workspace: Workspace,
    pub users: Vec<PrincipalAccess>,
    pub datasets: Vec<Dataset>,
    pub reports: Vec<Report>,
    pub dashboards: Vec<Dashboard>,
    pub dataflows: Vec<Dataflow>,
}

/// Workspace plus every artifact collection, fetched concurrently
pub async fn get_all_workspace_details(
    client: &PowerBiClient,
    workspace_id: &str,
) -> Result<WorkspaceDetails, PowerBiError> {
    let (workspace, users, datasets, reports, dashboards, dataflows) = futures::try_join!(
        get_workspace(client, workspace_id),
        get_workspace_users(client, workspace_id),
        datasets::get_datasets_in_workspace(client, workspace_id),
        reports::get_reports_in_workspace(client, workspace_id),
        dashboards::get_dashboards_in_workspace(client, workspace_id),
        dataflows::get_dataflows_in_workspace(client, workspace_id),
    )?;

    Ok(WorkspaceDetails {
        workspace,
        users,
        datasets,
        reports,
        dashboards,
        dataflows,
    })
}
