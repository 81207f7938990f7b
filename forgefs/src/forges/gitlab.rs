//! GitLab forge API (REST v4).
//!
//! Root groups and users are configured by numeric ID. Subgroup nesting is
//! supported; a user's "group content" is the user's projects.

use serde::Deserialize;

use super::rest::{get_json, http_client, page_query};
use super::{ApiError, ForgeApi, NamespaceKind, Page, RemoteGroup, RemoteRepository};
use crate::config::GitlabSettings;

pub struct GitlabApi {
    http: reqwest::blocking::Client,
    base: String,
}

#[derive(Debug, Deserialize)]
struct GitlabGroup {
    id: u64,
    path: String,
}

#[derive(Debug, Deserialize)]
struct GitlabUser {
    id: u64,
    username: String,
}

#[derive(Debug, Deserialize)]
struct GitlabProject {
    id: u64,
    path: String,
    ssh_url_to_repo: String,
    http_url_to_repo: String,
    #[serde(default)]
    default_branch: Option<String>,
    #[serde(default)]
    archived: bool,
}

impl From<GitlabGroup> for RemoteGroup {
    fn from(group: GitlabGroup) -> Self {
        Self {
            id: group.id,
            name: group.path,
            kind: NamespaceKind::Group,
        }
    }
}

impl From<GitlabUser> for RemoteGroup {
    fn from(user: GitlabUser) -> Self {
        Self {
            id: user.id,
            name: user.username,
            kind: NamespaceKind::User,
        }
    }
}

impl From<GitlabProject> for RemoteRepository {
    fn from(project: GitlabProject) -> Self {
        Self {
            id: project.id,
            path: project.path,
            clone_url_http: project.http_url_to_repo,
            clone_url_ssh: project.ssh_url_to_repo,
            default_branch: project.default_branch,
            archived: project.archived,
        }
    }
}

impl GitlabApi {
    pub fn new(settings: &GitlabSettings) -> Result<Self, ApiError> {
        let auth = (!settings.token.is_empty()).then(|| ("private-token", settings.token.as_str()));
        Ok(Self {
            http: http_client(auth)?,
            base: format!("{}/api/v4", settings.url.trim_end_matches('/')),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn numeric(entry: &str) -> Result<u64, ApiError> {
        entry.parse().map_err(|_| ApiError::InvalidEntry {
            entry: entry.to_string(),
            reason: String::from("gitlab entries are configured by numeric id"),
        })
    }
}

impl ForgeApi for GitlabApi {
    fn current_user(&self) -> Result<RemoteGroup, ApiError> {
        let user: GitlabUser = get_json(&self.http, &self.url("/user"), &[])?;
        Ok(user.into())
    }

    fn root_group(&self, entry: &str) -> Result<RemoteGroup, ApiError> {
        let gid = Self::numeric(entry)?;
        let group: GitlabGroup = get_json(&self.http, &self.url(&format!("/groups/{gid}")), &[])?;
        Ok(group.into())
    }

    fn root_user(&self, entry: &str) -> Result<RemoteGroup, ApiError> {
        let uid = Self::numeric(entry)?;
        let user: GitlabUser = get_json(&self.http, &self.url(&format!("/users/{uid}")), &[])?;
        Ok(user.into())
    }

    fn group_by_id(&self, gid: u64) -> Result<Option<RemoteGroup>, ApiError> {
        match get_json::<GitlabGroup>(&self.http, &self.url(&format!("/groups/{gid}")), &[]) {
            Ok(group) => Ok(Some(group.into())),
            Err(ApiError::Status { status: 404, .. }) => Ok(None),
            Err(error) => Err(error),
        }
    }

    fn child_groups(&self, group: &RemoteGroup, page: u32) -> Result<Page<RemoteGroup>, ApiError> {
        if group.kind == NamespaceKind::User {
            return Ok(Page::empty());
        }
        let mut query = page_query(page).to_vec();
        query.push(("all_available", String::from("true")));
        let groups: Vec<GitlabGroup> = get_json(
            &self.http,
            &self.url(&format!("/groups/{}/subgroups", group.id)),
            &query,
        )?;
        Ok(super::rest::into_page(
            groups.into_iter().map(Into::into).collect(),
            page,
        ))
    }

    fn repositories(
        &self,
        group: &RemoteGroup,
        page: u32,
    ) -> Result<Page<RemoteRepository>, ApiError> {
        let path = match group.kind {
            NamespaceKind::Group => format!("/groups/{}/projects", group.id),
            NamespaceKind::User => format!("/users/{}/projects", group.id),
        };
        let projects: Vec<GitlabProject> =
            get_json(&self.http, &self.url(&path), &page_query(page))?;
        Ok(super::rest::into_page(
            projects.into_iter().map(Into::into).collect(),
            page,
        ))
    }
}
