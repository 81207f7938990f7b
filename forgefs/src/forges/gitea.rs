//! Gitea forge API (v1).
//!
//! Organizations and users are configured by name. Gitea organizations are
//! flat, so child-group listings are always empty. Listing endpoints paginate
//! with `page`/`limit` rather than `page`/`per_page`.

use serde::Deserialize;

use super::rest::{get_json, http_client, into_page, PER_PAGE};
use super::{ApiError, ForgeApi, NamespaceKind, Page, RemoteGroup, RemoteRepository};
use crate::config::GiteaSettings;

pub struct GiteaApi {
    http: reqwest::blocking::Client,
    base: String,
}

#[derive(Debug, Deserialize)]
struct GiteaOrganization {
    id: u64,
    #[serde(alias = "username")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct GiteaUser {
    id: u64,
    #[serde(alias = "username")]
    login: String,
}

#[derive(Debug, Deserialize)]
struct GiteaRepository {
    id: u64,
    name: String,
    clone_url: String,
    ssh_url: String,
    #[serde(default)]
    default_branch: Option<String>,
    #[serde(default)]
    archived: bool,
}

impl From<GiteaOrganization> for RemoteGroup {
    fn from(organization: GiteaOrganization) -> Self {
        Self {
            id: organization.id,
            name: organization.name,
            kind: NamespaceKind::Group,
        }
    }
}

impl From<GiteaUser> for RemoteGroup {
    fn from(user: GiteaUser) -> Self {
        Self {
            id: user.id,
            name: user.login,
            kind: NamespaceKind::User,
        }
    }
}

impl From<GiteaRepository> for RemoteRepository {
    fn from(repository: GiteaRepository) -> Self {
        Self {
            id: repository.id,
            path: repository.name,
            clone_url_http: repository.clone_url,
            clone_url_ssh: repository.ssh_url,
            default_branch: repository.default_branch,
            archived: repository.archived,
        }
    }
}

impl GiteaApi {
    pub fn new(settings: &GiteaSettings) -> Result<Self, ApiError> {
        let token = format!("token {}", settings.token);
        let auth = (!settings.token.is_empty()).then(|| ("authorization", token.as_str()));
        Ok(Self {
            http: http_client(auth)?,
            base: format!("{}/api/v1", settings.url.trim_end_matches('/')),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn page_query(page: u32) -> [(&'static str, String); 2] {
        [("page", page.to_string()), ("limit", PER_PAGE.to_string())]
    }
}

impl ForgeApi for GiteaApi {
    fn current_user(&self) -> Result<RemoteGroup, ApiError> {
        let user: GiteaUser = get_json(&self.http, &self.url("/user"), &[])?;
        Ok(user.into())
    }

    fn root_group(&self, entry: &str) -> Result<RemoteGroup, ApiError> {
        let organization: GiteaOrganization =
            get_json(&self.http, &self.url(&format!("/orgs/{entry}")), &[])?;
        Ok(organization.into())
    }

    fn root_user(&self, entry: &str) -> Result<RemoteGroup, ApiError> {
        let user: GiteaUser = get_json(&self.http, &self.url(&format!("/users/{entry}")), &[])?;
        Ok(user.into())
    }

    fn child_groups(&self, _group: &RemoteGroup, _page: u32) -> Result<Page<RemoteGroup>, ApiError> {
        // Organizations are flat.
        Ok(Page::empty())
    }

    fn repositories(
        &self,
        group: &RemoteGroup,
        page: u32,
    ) -> Result<Page<RemoteRepository>, ApiError> {
        let path = match group.kind {
            NamespaceKind::Group => format!("/orgs/{}/repos", group.name),
            NamespaceKind::User => format!("/users/{}/repos", group.name),
        };
        let repositories: Vec<GiteaRepository> =
            get_json(&self.http, &self.url(&path), &Self::page_query(page))?;
        Ok(into_page(
            repositories.into_iter().map(Into::into).collect(),
            page,
        ))
    }
}
