//! GitHub forge API (REST v3).
//!
//! Organizations and users are configured by login. GitHub has no nested
//! organizations, so child-group listings are always empty.

use serde::Deserialize;

use super::rest::{get_json, http_client, into_page, page_query};
use super::{ApiError, ForgeApi, NamespaceKind, Page, RemoteGroup, RemoteRepository};
use crate::config::GithubSettings;

pub struct GithubApi {
    http: reqwest::blocking::Client,
    base: String,
}

#[derive(Debug, Deserialize)]
struct GithubAccount {
    id: u64,
    login: String,
}

#[derive(Debug, Deserialize)]
struct GithubRepository {
    id: u64,
    name: String,
    clone_url: String,
    ssh_url: String,
    #[serde(default)]
    default_branch: Option<String>,
    #[serde(default)]
    archived: bool,
}

impl GithubAccount {
    fn into_remote(self, kind: NamespaceKind) -> RemoteGroup {
        RemoteGroup {
            id: self.id,
            name: self.login,
            kind,
        }
    }
}

impl From<GithubRepository> for RemoteRepository {
    fn from(repository: GithubRepository) -> Self {
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

impl GithubApi {
    pub fn new(settings: &GithubSettings) -> Result<Self, ApiError> {
        let bearer = format!("Bearer {}", settings.token);
        let auth = (!settings.token.is_empty()).then(|| ("authorization", bearer.as_str()));
        Ok(Self {
            http: http_client(auth)?,
            base: settings.api_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

impl ForgeApi for GithubApi {
    fn current_user(&self) -> Result<RemoteGroup, ApiError> {
        let account: GithubAccount = get_json(&self.http, &self.url("/user"), &[])?;
        Ok(account.into_remote(NamespaceKind::User))
    }

    fn root_group(&self, entry: &str) -> Result<RemoteGroup, ApiError> {
        let account: GithubAccount =
            get_json(&self.http, &self.url(&format!("/orgs/{entry}")), &[])?;
        Ok(account.into_remote(NamespaceKind::Group))
    }

    fn root_user(&self, entry: &str) -> Result<RemoteGroup, ApiError> {
        let account: GithubAccount =
            get_json(&self.http, &self.url(&format!("/users/{entry}")), &[])?;
        Ok(account.into_remote(NamespaceKind::User))
    }

    fn child_groups(&self, _group: &RemoteGroup, _page: u32) -> Result<Page<RemoteGroup>, ApiError> {
        // Organizations cannot nest.
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
        let repositories: Vec<GithubRepository> =
            get_json(&self.http, &self.url(&path), &page_query(page))?;
        Ok(into_page(
            repositories.into_iter().map(Into::into).collect(),
            page,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enterprise_api_url_is_normalized() {
        let api = GithubApi::new(&GithubSettings {
            api_url: String::from("https://github.example.com/api/v3/"),
            ..GithubSettings::default()
        })
        .unwrap();
        assert_eq!(
            api.url("/orgs/infra"),
            "https://github.example.com/api/v3/orgs/infra"
        );
    }

    #[test]
    fn test_child_groups_are_always_empty() {
        let api = GithubApi::new(&GithubSettings::default()).unwrap();
        let org = RemoteGroup {
            id: 1,
            name: String::from("infra"),
            kind: NamespaceKind::Group,
        };
        let page = api.child_groups(&org, 1).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.next, None);
    }

    #[test]
    fn test_repository_decoding() {
        let repository: GithubRepository = serde_json::from_str(
            r#"{
                "id": 7,
                "name": "svc",
                "clone_url": "https://github.com/infra/svc.git",
                "ssh_url": "git@github.com:infra/svc.git",
                "default_branch": "main",
                "archived": true
            }"#,
        )
        .unwrap();
        let remote: RemoteRepository = repository.into();
        assert_eq!(remote.path, "svc");
        assert!(remote.archived);
    }
}
