//! Generic caching forge client.
//!
//! Implements the [`GitForge`] contract on top of any [`ForgeApi`]: a
//! forge-wide registry resolves repeated references to the same remote group
//! to one shared object, and each group memoizes its children behind its own
//! lock so concurrent listings trigger at most one remote walk per
//! invalidation epoch.

use std::sync::Arc;

use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::{ApiError, ForgeApi, ForgeError, RemoteGroup, RemoteRepository};
use crate::config::{ArchivedHandling, PullMethod};
use crate::fstree::{GitForge, GroupMap, GroupSource, RepositoryMap, RepositorySource};

/// Behavior knobs shared by all forges.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Protocol of the clone URLs handed to the materializer.
    pub pull_method: PullMethod,
    /// How archived repositories appear in the tree.
    pub archived_handling: ArchivedHandling,
    /// Configured root groups/organizations (IDs or names, forge-specific).
    pub root_groups: Vec<String>,
    /// Configured root users.
    pub root_users: Vec<String>,
    /// Also resolve and list the authenticated user.
    pub include_current_user: bool,
}

/// Forge-wide group cache: one shared object per remote group ID.
#[derive(Default)]
struct GroupRegistry {
    groups: Mutex<HashMap<u64, Arc<Group>>>,
}

impl GroupRegistry {
    fn register(registry: &Arc<Self>, info: RemoteGroup) -> Arc<Group> {
        let mut groups = registry.groups.lock();
        if let Some(existing) = groups.get(&info.id) {
            debug!(gid = info.id, "group cache hit");
            return Arc::clone(existing);
        }
        debug!(gid = info.id, name = %info.name, "group cache miss, registering");
        let group = Arc::new(Group {
            info,
            registry: Arc::clone(registry),
            content: Mutex::new(None),
        });
        groups.insert(group.info.id, Arc::clone(&group));
        group
    }

    fn get(&self, gid: u64) -> Option<Arc<Group>> {
        self.groups.lock().get(&gid).cloned()
    }

    fn evict(&self, gid: u64) {
        self.groups.lock().remove(&gid);
    }
}

/// Memoized children of one group.
struct GroupContent {
    groups: GroupMap,
    repositories: RepositoryMap,
}

/// A group, organization or user tracked by the registry.
pub struct Group {
    info: RemoteGroup,
    registry: Arc<GroupRegistry>,
    /// Populated at most once per invalidation epoch, under this lock.
    content: Mutex<Option<GroupContent>>,
}

impl Group {
    fn name(&self) -> &str {
        &self.info.name
    }
}

impl GroupSource for Group {
    fn group_id(&self) -> u64 {
        self.info.id
    }

    fn invalidate_content_cache(&self) {
        let mut content = self.content.lock();
        if let Some(cached) = content.take() {
            // Child groups now have no referent in the tree; drop them from
            // the forge-wide cache so a later listing re-resolves them.
            for child in cached.groups.values() {
                self.registry.evict(child.group_id());
            }
            debug!(gid = self.info.id, "invalidated group content cache");
        }
    }
}

/// A repository after policy conversion, ready for the tree.
pub struct Repository {
    id: u64,
    path: String,
    clone_url: String,
    default_branch: String,
}

impl RepositorySource for Repository {
    fn repository_id(&self) -> u64 {
        self.id
    }

    fn clone_url(&self) -> &str {
        &self.clone_url
    }

    fn default_branch(&self) -> &str {
        &self.default_branch
    }
}

/// Caching forge client over a concrete [`ForgeApi`].
pub struct Client<A: ForgeApi> {
    api: A,
    options: ClientOptions,
    registry: Arc<GroupRegistry>,
    /// Authenticated user, resolved once at construction.
    current_user: Option<RemoteGroup>,
    /// Root listing, computed once per process.
    root_content: Mutex<Option<GroupMap>>,
}

impl<A: ForgeApi> Client<A> {
    pub fn new(api: A, options: ClientOptions) -> Self {
        let current_user = if options.include_current_user {
            match api.current_user() {
                Ok(user) => Some(user),
                Err(error) => {
                    warn!(%error, "failed to fetch the current user");
                    None
                }
            }
        } else {
            None
        };

        Self {
            api,
            options,
            registry: Arc::new(GroupRegistry::default()),
            current_user,
            root_content: Mutex::new(None),
        }
    }

    /// Walk all pages of `group`'s children and install the result.
    ///
    /// The content lock is held for the whole walk: concurrent callers either
    /// return the cached maps or wait for the single in-flight fetch. A
    /// failure mid-walk caches nothing.
    fn fetch_children(&self, group: &Arc<Group>) -> Result<(GroupMap, RepositoryMap), ForgeError> {
        let mut content = group.content.lock();
        if let Some(cached) = content.as_ref() {
            return Ok((cached.groups.clone(), cached.repositories.clone()));
        }

        let mut child_groups = GroupMap::new();
        let mut page = 1;
        loop {
            let batch = self.api.child_groups(&group.info, page)?;
            for info in batch.items {
                let child = GroupRegistry::register(&self.registry, info);
                child_groups.insert(child.name().to_string(), child as Arc<dyn GroupSource>);
            }
            match batch.next {
                Some(next) => page = next,
                None => break,
            }
        }

        let mut child_repositories = RepositoryMap::new();
        let mut page = 1;
        loop {
            let batch = self.api.repositories(&group.info, page)?;
            for info in batch.items {
                if let Some(repository) = self.convert_repository(info) {
                    child_repositories.insert(
                        repository.path.clone(),
                        Arc::new(repository) as Arc<dyn RepositorySource>,
                    );
                }
            }
            match batch.next {
                Some(next) => page = next,
                None => break,
            }
        }

        *content = Some(GroupContent {
            groups: child_groups.clone(),
            repositories: child_repositories.clone(),
        });
        Ok((child_groups, child_repositories))
    }

    /// Apply archived handling, pull method and the default-branch fallback.
    fn convert_repository(&self, info: RemoteRepository) -> Option<Repository> {
        if info.archived && self.options.archived_handling == ArchivedHandling::Ignore {
            return None;
        }

        let default_branch = info
            .default_branch
            .filter(|branch| !branch.is_empty())
            .unwrap_or_else(|| String::from("master"));

        let clone_url = match self.options.pull_method {
            PullMethod::Http => info.clone_url_http,
            PullMethod::Ssh => info.clone_url_ssh,
        };

        let path = if info.archived && self.options.archived_handling == ArchivedHandling::Hide {
            hidden_path(&info.path)
        } else {
            info.path
        };

        Some(Repository {
            id: info.id,
            path,
            clone_url,
            default_branch,
        })
    }

    fn resolve_root_entry(
        &self,
        content: &mut GroupMap,
        entry: &str,
        resolved: Result<RemoteGroup, ApiError>,
    ) {
        match resolved {
            Ok(info) => {
                let group = GroupRegistry::register(&self.registry, info);
                content.insert(group.name().to_string(), group as Arc<dyn GroupSource>);
            }
            // A single bad entry does not take the whole mount down.
            Err(error) => warn!(entry, %error, "failed to fetch root entry, skipping"),
        }
    }
}

impl<A: ForgeApi> GitForge for Client<A> {
    fn fetch_root_group_content(&self) -> Result<GroupMap, ForgeError> {
        let mut root = self.root_content.lock();
        if let Some(content) = root.as_ref() {
            return Ok(content.clone());
        }

        let mut content = GroupMap::new();
        for entry in &self.options.root_groups {
            self.resolve_root_entry(&mut content, entry, self.api.root_group(entry));
        }
        for entry in &self.options.root_users {
            self.resolve_root_entry(&mut content, entry, self.api.root_user(entry));
        }
        if let Some(user) = &self.current_user {
            let group = GroupRegistry::register(&self.registry, user.clone());
            content.insert(group.name().to_string(), group as Arc<dyn GroupSource>);
        }

        *root = Some(content.clone());
        Ok(content)
    }

    fn fetch_group_content(&self, gid: u64) -> Result<(GroupMap, RepositoryMap), ForgeError> {
        let group = match self.registry.get(gid) {
            Some(group) => group,
            // Not in the cache: either never seen or evicted by an
            // invalidation. Forges that can re-resolve by ID do so here.
            None => match self.api.group_by_id(gid)? {
                Some(info) => GroupRegistry::register(&self.registry, info),
                None => return Err(ForgeError::UnknownGroup(gid)),
            },
        };
        self.fetch_children(&group)
    }
}

/// Dot-prefix the base name of a repository path.
fn hidden_path(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, base)) => format!("{dir}/.{base}"),
        None => format!(".{path}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forges::rest::PER_PAGE;
    use crate::forges::{NamespaceKind, Page};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn group(id: u64, name: &str) -> RemoteGroup {
        RemoteGroup {
            id,
            name: name.to_string(),
            kind: NamespaceKind::Group,
        }
    }

    fn user(id: u64, name: &str) -> RemoteGroup {
        RemoteGroup {
            id,
            name: name.to_string(),
            kind: NamespaceKind::User,
        }
    }

    fn repository(id: u64, path: &str) -> RemoteRepository {
        RemoteRepository {
            id,
            path: path.to_string(),
            clone_url_http: format!("https://git.example.com/{path}.git"),
            clone_url_ssh: format!("git@git.example.com:{path}.git"),
            default_branch: Some(String::from("main")),
            archived: false,
        }
    }

    #[derive(Default)]
    struct FakeApi {
        groups: HashMap<String, RemoteGroup>,
        users: HashMap<String, RemoteGroup>,
        current: Option<RemoteGroup>,
        children: HashMap<u64, Vec<RemoteGroup>>,
        repositories: HashMap<u64, Vec<RemoteRepository>>,
        resolve_by_id: bool,

        group_list_calls: AtomicUsize,
        repository_list_calls: AtomicUsize,
        root_resolve_calls: AtomicUsize,
        fail_repositories: AtomicBool,
        list_delay: Option<Duration>,
    }

    impl FakeApi {
        fn not_found(entry: &str) -> ApiError {
            ApiError::Status {
                url: format!("https://git.example.com/{entry}"),
                status: 404,
            }
        }
    }

    impl ForgeApi for FakeApi {
        fn current_user(&self) -> Result<RemoteGroup, ApiError> {
            self.current.clone().ok_or_else(|| Self::not_found("user"))
        }

        fn root_group(&self, entry: &str) -> Result<RemoteGroup, ApiError> {
            self.root_resolve_calls.fetch_add(1, Ordering::SeqCst);
            self.groups
                .get(entry)
                .cloned()
                .ok_or_else(|| Self::not_found(entry))
        }

        fn root_user(&self, entry: &str) -> Result<RemoteGroup, ApiError> {
            self.root_resolve_calls.fetch_add(1, Ordering::SeqCst);
            self.users
                .get(entry)
                .cloned()
                .ok_or_else(|| Self::not_found(entry))
        }

        fn group_by_id(&self, gid: u64) -> Result<Option<RemoteGroup>, ApiError> {
            if !self.resolve_by_id {
                return Ok(None);
            }
            Ok(self
                .groups
                .values()
                .chain(self.children.values().flatten())
                .find(|info| info.id == gid)
                .cloned())
        }

        fn child_groups(
            &self,
            group: &RemoteGroup,
            page: u32,
        ) -> Result<Page<RemoteGroup>, ApiError> {
            self.group_list_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.list_delay {
                thread::sleep(delay);
            }
            if group.kind == NamespaceKind::User {
                return Ok(Page::empty());
            }
            let items = self.children.get(&group.id).cloned().unwrap_or_default();
            Ok(paged(items, page))
        }

        fn repositories(
            &self,
            group: &RemoteGroup,
            page: u32,
        ) -> Result<Page<RemoteRepository>, ApiError> {
            self.repository_list_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_repositories.load(Ordering::SeqCst) {
                return Err(Self::not_found("repositories"));
            }
            let items = self.repositories.get(&group.id).cloned().unwrap_or_default();
            Ok(paged(items, page))
        }
    }

    fn paged<T: Clone>(items: Vec<T>, page: u32) -> Page<T> {
        let start = ((page - 1) * PER_PAGE) as usize;
        let end = (start + PER_PAGE as usize).min(items.len());
        let slice = if start >= items.len() {
            Vec::new()
        } else {
            items[start..end].to_vec()
        };
        let next = (end < items.len()).then(|| page + 1);
        Page { items: slice, next }
    }

    fn team_fixture() -> FakeApi {
        let mut api = FakeApi::default();
        api.groups.insert(String::from("42"), group(42, "team"));
        api.users.insert(String::from("9"), user(9, "alice"));
        api.children.insert(42, vec![group(43, "sub")]);
        api.repositories.insert(
            42,
            vec![repository(7, "svc"), {
                let mut archived = repository(8, "old");
                archived.archived = true;
                archived
            }],
        );
        api
    }

    fn options() -> ClientOptions {
        ClientOptions {
            root_groups: vec![String::from("42")],
            root_users: vec![String::from("9")],
            ..ClientOptions::default()
        }
    }

    #[test]
    fn test_root_listing_merges_groups_and_users() {
        let client = Client::new(team_fixture(), options());
        let root = client.fetch_root_group_content().unwrap();
        let mut names: Vec<&String> = root.keys().collect();
        names.sort();
        assert_eq!(names, ["alice", "team"]);
        assert_eq!(root["team"].group_id(), 42);
        assert_eq!(root["alice"].group_id(), 9);
    }

    #[test]
    fn test_root_listing_is_computed_once() {
        let client = Client::new(team_fixture(), options());
        client.fetch_root_group_content().unwrap();
        client.fetch_root_group_content().unwrap();
        assert_eq!(client.api.root_resolve_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failing_root_entry_is_skipped() {
        let mut opts = options();
        opts.root_groups.push(String::from("404"));
        let client = Client::new(team_fixture(), opts);
        let root = client.fetch_root_group_content().unwrap();
        assert_eq!(root.len(), 2);
    }

    #[test]
    fn test_current_user_is_listed_when_configured() {
        let mut api = team_fixture();
        api.current = Some(user(77, "bob"));
        let mut opts = options();
        opts.include_current_user = true;
        let client = Client::new(api, opts);
        let root = client.fetch_root_group_content().unwrap();
        assert!(root.contains_key("bob"));
    }

    #[test]
    fn test_current_user_failure_is_not_fatal() {
        let mut opts = options();
        opts.include_current_user = true;
        // team_fixture has no current user configured, so resolution fails.
        let client = Client::new(team_fixture(), opts);
        let root = client.fetch_root_group_content().unwrap();
        assert_eq!(root.len(), 2);
    }

    #[test]
    fn test_group_content_contains_converted_repositories() {
        let client = Client::new(team_fixture(), options());
        let (groups, repositories) = client.fetch_group_content(42).unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups["sub"].group_id(), 43);

        // Default policy hides the archived repository under a dot name.
        let mut names: Vec<&String> = repositories.keys().collect();
        names.sort();
        assert_eq!(names, [".old", "svc"]);
        assert_eq!(repositories["svc"].repository_id(), 7);
        assert_eq!(repositories["svc"].default_branch(), "main");
        assert_eq!(
            repositories["svc"].clone_url(),
            "https://git.example.com/svc.git"
        );
    }

    #[test]
    fn test_archived_show_keeps_name() {
        let mut opts = options();
        opts.archived_handling = ArchivedHandling::Show;
        let client = Client::new(team_fixture(), opts);
        let (_, repositories) = client.fetch_group_content(42).unwrap();
        assert!(repositories.contains_key("old"));
        assert!(!repositories.contains_key(".old"));
    }

    #[test]
    fn test_archived_ignore_drops_repository() {
        let mut opts = options();
        opts.archived_handling = ArchivedHandling::Ignore;
        let client = Client::new(team_fixture(), opts);
        let (_, repositories) = client.fetch_group_content(42).unwrap();
        assert_eq!(repositories.len(), 1);
        assert!(repositories.contains_key("svc"));
    }

    #[test]
    fn test_ssh_pull_method_selects_ssh_url() {
        let mut opts = options();
        opts.pull_method = PullMethod::Ssh;
        let client = Client::new(team_fixture(), opts);
        let (_, repositories) = client.fetch_group_content(42).unwrap();
        assert_eq!(
            repositories["svc"].clone_url(),
            "git@git.example.com:svc.git"
        );
    }

    #[test]
    fn test_missing_default_branch_falls_back_to_master() {
        let mut api = team_fixture();
        let mut bare = repository(12, "bare");
        bare.default_branch = None;
        let mut empty = repository(13, "empty");
        empty.default_branch = Some(String::new());
        api.repositories.insert(42, vec![bare, empty]);

        let client = Client::new(api, options());
        let (_, repositories) = client.fetch_group_content(42).unwrap();
        assert_eq!(repositories["bare"].default_branch(), "master");
        assert_eq!(repositories["empty"].default_branch(), "master");
    }

    #[test]
    fn test_content_is_fetched_at_most_once() {
        let client = Client::new(team_fixture(), options());
        client.fetch_group_content(42).unwrap();
        client.fetch_group_content(42).unwrap();
        client.fetch_group_content(42).unwrap();
        assert_eq!(client.api.group_list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.api.repository_list_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_fetches_trigger_one_remote_walk() {
        let mut api = team_fixture();
        api.list_delay = Some(Duration::from_millis(50));
        let client = Arc::new(Client::new(api, options()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let client = Arc::clone(&client);
                thread::spawn(move || client.fetch_group_content(42).unwrap())
            })
            .collect();
        for handle in handles {
            let (groups, repositories) = handle.join().unwrap();
            assert_eq!(groups.len(), 1);
            assert_eq!(repositories.len(), 2);
        }

        assert_eq!(client.api.group_list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.api.repository_list_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalidation_forces_refetch() {
        let client = Client::new(team_fixture(), options());
        let root = client.fetch_root_group_content().unwrap();
        client.fetch_group_content(42).unwrap();
        assert_eq!(client.api.repository_list_calls.load(Ordering::SeqCst), 1);

        root["team"].invalidate_content_cache();
        client.fetch_group_content(42).unwrap();
        assert_eq!(client.api.repository_list_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_invalidation_evicts_orphaned_child_groups() {
        let client = Client::new(team_fixture(), options());
        let root = client.fetch_root_group_content().unwrap();
        client.fetch_group_content(42).unwrap();

        // The nested group is resolvable while its parent's content is live.
        client.fetch_group_content(43).unwrap();

        root["team"].invalidate_content_cache();
        let error = client.fetch_group_content(43).err().unwrap();
        assert!(matches!(error, ForgeError::UnknownGroup(43)));
    }

    #[test]
    fn test_evicted_group_is_re_resolved_when_forge_supports_it() {
        let mut api = team_fixture();
        api.resolve_by_id = true;
        let client = Client::new(api, options());
        let root = client.fetch_root_group_content().unwrap();
        client.fetch_group_content(42).unwrap();
        root["team"].invalidate_content_cache();

        // GitLab-style by-ID resolution brings the evicted group back.
        assert!(client.fetch_group_content(43).is_ok());
    }

    #[test]
    fn test_unknown_group_is_an_error() {
        let client = Client::new(team_fixture(), options());
        let error = client.fetch_group_content(999).err().unwrap();
        assert!(matches!(error, ForgeError::UnknownGroup(999)));
    }

    #[test]
    fn test_failed_walk_caches_nothing() {
        let api = team_fixture();
        api.fail_repositories.store(true, Ordering::SeqCst);
        let client = Client::new(api, options());

        assert!(client.fetch_group_content(42).is_err());
        assert_eq!(client.api.group_list_calls.load(Ordering::SeqCst), 1);

        // The failure cached nothing: the next call repeats the full walk.
        client.api.fail_repositories.store(false, Ordering::SeqCst);
        let (_, repositories) = client.fetch_group_content(42).unwrap();
        assert_eq!(repositories.len(), 2);
        assert_eq!(client.api.group_list_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_pagination_walks_every_page() {
        let mut api = team_fixture();
        let many: Vec<RemoteRepository> = (0..(PER_PAGE as u64 * 2 + 50))
            .map(|i| repository(1000 + i, &format!("repo-{i}")))
            .collect();
        api.repositories.insert(42, many);

        let client = Client::new(api, options());
        let (_, repositories) = client.fetch_group_content(42).unwrap();
        assert_eq!(repositories.len(), (PER_PAGE * 2 + 50) as usize);
        assert_eq!(client.api.repository_list_calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_hidden_path_prefixes_base_name() {
        assert_eq!(hidden_path("svc"), ".svc");
        assert_eq!(hidden_path("nested/svc"), "nested/.svc");
    }
}
