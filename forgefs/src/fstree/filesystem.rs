//! FUSE filesystem over the forge hierarchy.
//!
//! Directory reads and name lookups drive on-demand, cached fetches through
//! the [`GitForge`] contract; reading a repository link drives the git
//! materializer through [`GitClient`]. All node state lives in concurrent
//! maps so requests dispatched on different FUSE threads never serialize
//! behind each other outside a group's first expansion.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStringExt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEntry, ReplyOpen,
    ReplyWrite, Request, TimeOrNow,
};
use libc::{c_int, EINVAL, EIO, ENOENT, ENOTDIR, EPERM};
use tracing::{debug, error, info, warn};

use super::inode::{group_inode, refresh_inode, repository_inode, ROOT_INODE};
use super::{FsError, FsParam, GitClient, GitForge, GroupMap, GroupSource, RepositoryMap,
    RepositorySource, REFRESH_ENTRY_NAME};
use crate::git::GitClientError;

/// Time-to-live for attribute and entry caching.
const TTL: Duration = Duration::from_secs(1);

/// One entry of a directory listing.
pub struct DirEntry {
    pub ino: u64,
    pub kind: FileType,
    pub name: String,
}

/// Payload of a non-root node in the tree.
enum Node {
    Group(Arc<dyn GroupSource>),
    Repository(Arc<dyn RepositorySource>),
    Refresh(Arc<dyn GroupSource>),
}

/// Children of a directory-capable node.
struct Children {
    groups: GroupMap,
    repositories: RepositoryMap,
    /// The group owning the `.refresh` entry; the mount root has none.
    refresh_owner: Option<Arc<dyn GroupSource>>,
}

/// The forgefs FUSE filesystem.
///
/// The `fuser::Filesystem` impl below is a thin dispatch layer; the
/// observable behavior lives in the public methods ([`Self::lookup_entry`],
/// [`Self::read_dir`], [`Self::read_link`], [`Self::open_inode`],
/// [`Self::attr_of`]) so it can be exercised without a kernel session.
pub struct ForgeFS {
    forge: Arc<dyn GitForge>,
    git: Arc<dyn GitClient>,
    /// Top-level entries, fetched once at mount start.
    root_content: GroupMap,
    /// Inode -> node payload, populated as names resolve.
    nodes: DashMap<u64, Node>,
    /// Inode -> parent inode, for `..` entries.
    parents: DashMap<u64, u64>,
    uid: u32,
    gid: u32,
}

impl ForgeFS {
    /// Build the tree, fetching the root listing.
    ///
    /// A root listing failure is fatal: without top-level entries there is
    /// nothing to mount.
    pub fn new(param: FsParam) -> Result<Self, FsError> {
        let root_content = param.git_forge.fetch_root_group_content()?;
        info!(entries = root_content.len(), "fetched root listing");

        Ok(Self {
            forge: param.git_forge,
            git: param.git_client,
            root_content,
            nodes: DashMap::new(),
            parents: DashMap::new(),
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
        })
    }

    /// Resolve `name` under `parent`, registering the resolved node.
    ///
    /// Resolution order: child groups, child repositories, then the static
    /// `.refresh` entry. A hidden (dot-prefixed) repository resolves by its
    /// exact hidden name.
    pub fn lookup_entry(&self, parent: u64, name: &OsStr) -> Result<FileAttr, c_int> {
        let Some(name) = name.to_str() else {
            return Err(ENOENT);
        };
        // A failed content fetch surfaces as "not found" for this request.
        let children = self.children(parent).map_err(|errno| match errno {
            EIO => ENOENT,
            other => other,
        })?;

        if let Some(group) = children.groups.get(name) {
            let ino = group_inode(group.group_id());
            self.register(ino, parent, Node::Group(Arc::clone(group)));
            return Ok(self.directory_attr(ino));
        }
        if let Some(repository) = children.repositories.get(name) {
            let ino = repository_inode(repository.repository_id());
            self.register(ino, parent, Node::Repository(Arc::clone(repository)));
            return Ok(self.symlink_attr(ino));
        }
        if name == REFRESH_ENTRY_NAME {
            if let Some(owner) = children.refresh_owner {
                let ino = refresh_inode(owner.group_id());
                self.register(ino, parent, Node::Refresh(owner));
                return Ok(self.file_attr(ino));
            }
        }

        Err(ENOENT)
    }

    /// Full listing of a directory node, including `.` and `..`.
    ///
    /// When the content fetch fails the directory lists as empty rather than
    /// erroring the request; the failure is logged and the next access
    /// retries.
    pub fn read_dir(&self, ino: u64) -> Result<Vec<DirEntry>, c_int> {
        let mut entries = vec![
            DirEntry {
                ino,
                kind: FileType::Directory,
                name: String::from("."),
            },
            DirEntry {
                ino: self.parent_of(ino),
                kind: FileType::Directory,
                name: String::from(".."),
            },
        ];

        match self.children(ino) {
            Ok(children) => {
                for (name, group) in &children.groups {
                    let child_ino = group_inode(group.group_id());
                    self.register(child_ino, ino, Node::Group(Arc::clone(group)));
                    entries.push(DirEntry {
                        ino: child_ino,
                        kind: FileType::Directory,
                        name: name.clone(),
                    });
                }
                for (name, repository) in &children.repositories {
                    let child_ino = repository_inode(repository.repository_id());
                    self.register(child_ino, ino, Node::Repository(Arc::clone(repository)));
                    entries.push(DirEntry {
                        ino: child_ino,
                        kind: FileType::Symlink,
                        name: name.clone(),
                    });
                }
                if let Some(owner) = children.refresh_owner {
                    let child_ino = refresh_inode(owner.group_id());
                    self.register(child_ino, ino, Node::Refresh(owner));
                    entries.push(DirEntry {
                        ino: child_ino,
                        kind: FileType::RegularFile,
                        name: String::from(REFRESH_ENTRY_NAME),
                    });
                }
            }
            // Content fetch failed: expose an empty directory for this round.
            Err(EIO) => {}
            Err(errno) => return Err(errno),
        }

        Ok(entries)
    }

    /// Resolve a repository node to its local clone path, dispatching
    /// materialization work in the background.
    pub fn read_link(&self, ino: u64) -> Result<Vec<u8>, c_int> {
        let source = match self.nodes.get(&ino) {
            Some(node) => match node.value() {
                Node::Repository(source) => Arc::clone(source),
                _ => return Err(EINVAL),
            },
            None => return Err(ENOENT),
        };

        match self.git.fetch_local_repository_path(source.as_ref()) {
            Ok(path) => Ok(path.into_os_string().into_vec()),
            // The path is still usable; the clone/pull is simply not
            // happening this round and will be retried on the next access.
            Err(GitClientError::QueueFull { path }) => {
                warn!(ino, "git job queue is full, returning path without dispatch");
                Ok(path.into_os_string().into_vec())
            }
            Err(error) => {
                error!(ino, %error, "failed to resolve local repository path");
                Err(EIO)
            }
        }
    }

    /// Open a node. Opening a `.refresh` node invalidates the owning group's
    /// content cache; opening anything else is a no-op.
    pub fn open_inode(&self, ino: u64) -> Result<(), c_int> {
        if ino == ROOT_INODE {
            return Ok(());
        }
        match self.nodes.get(&ino) {
            Some(node) => {
                if let Node::Refresh(owner) = node.value() {
                    debug!(gid = owner.group_id(), "refresh node opened, invalidating");
                    owner.invalidate_content_cache();
                }
                Ok(())
            }
            None => Err(ENOENT),
        }
    }

    /// Attributes of a known inode.
    pub fn attr_of(&self, ino: u64) -> Option<FileAttr> {
        if ino == ROOT_INODE {
            return Some(self.directory_attr(ino));
        }
        self.nodes.get(&ino).map(|node| match node.value() {
            Node::Group(_) => self.directory_attr(ino),
            Node::Repository(_) => self.symlink_attr(ino),
            Node::Refresh(_) => self.file_attr(ino),
        })
    }

    /// Whether `ino` is a `.refresh` node.
    fn is_refresh(&self, ino: u64) -> bool {
        self.nodes
            .get(&ino)
            .map(|node| matches!(node.value(), Node::Refresh(_)))
            .unwrap_or(false)
    }

    /// Children of a directory-capable node.
    ///
    /// Errors: `ENOENT` for an unknown inode, `ENOTDIR` for a non-directory,
    /// `EIO` when the forge fetch fails (logged here, mapped by callers).
    fn children(&self, ino: u64) -> Result<Children, c_int> {
        if ino == ROOT_INODE {
            return Ok(Children {
                groups: self.root_content.clone(),
                repositories: RepositoryMap::new(),
                refresh_owner: None,
            });
        }

        let source = match self.nodes.get(&ino) {
            Some(node) => match node.value() {
                Node::Group(source) => Arc::clone(source),
                _ => return Err(ENOTDIR),
            },
            None => return Err(ENOENT),
        };

        match self.forge.fetch_group_content(source.group_id()) {
            Ok((groups, repositories)) => Ok(Children {
                groups,
                repositories,
                refresh_owner: Some(source),
            }),
            Err(error) => {
                error!(gid = source.group_id(), %error, "failed to fetch group content");
                Err(EIO)
            }
        }
    }

    fn register(&self, ino: u64, parent: u64, node: Node) {
        self.nodes.insert(ino, node);
        self.parents.insert(ino, parent);
    }

    fn parent_of(&self, ino: u64) -> u64 {
        self.parents
            .get(&ino)
            .map(|parent| *parent.value())
            .unwrap_or(ROOT_INODE)
    }

    fn attr(&self, ino: u64, kind: FileType, perm: u16, nlink: u32) -> FileAttr {
        let now = SystemTime::now();
        FileAttr {
            ino,
            size: 0,
            blocks: 0,
            atime: now,
            mtime: now,
            ctime: now,
            crtime: now,
            kind,
            perm,
            nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: 512,
            flags: 0,
        }
    }

    fn directory_attr(&self, ino: u64) -> FileAttr {
        self.attr(ino, FileType::Directory, 0o755, 2)
    }

    fn symlink_attr(&self, ino: u64) -> FileAttr {
        self.attr(ino, FileType::Symlink, 0o777, 1)
    }

    fn file_attr(&self, ino: u64) -> FileAttr {
        self.attr(ino, FileType::RegularFile, 0o644, 1)
    }
}

impl Filesystem for ForgeFS {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.lookup_entry(parent, name) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        match self.attr_of(ino) {
            Some(attr) => reply.attr(&TTL, &attr),
            None => reply.error(ENOENT),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        match self.read_link(ino) {
            Ok(target) => reply.data(&target),
            Err(errno) => reply.error(errno),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.open_inode(ino) {
            Ok(()) => reply.opened(0, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        match self.read_dir(ino) {
            Ok(entries) => {
                for (index, entry) in entries.iter().enumerate().skip(offset as usize) {
                    if reply.add(entry.ino, (index + 1) as i64, entry.kind, &entry.name) {
                        break;
                    }
                }
                reply.ok();
            }
            Err(errno) => reply.error(errno),
        }
    }

    // `touch .refresh` goes through setattr; answer with the current
    // attributes so the invalidation path works from a plain shell.
    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        _size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        match self.attr_of(ino) {
            Some(attr) => reply.attr(&TTL, &attr),
            None => reply.error(ENOENT),
        }
    }

    // Writes to a refresh node are accepted and discarded; the filesystem is
    // otherwise read-only.
    #[allow(clippy::too_many_arguments)]
    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        if self.is_refresh(ino) {
            reply.written(data.len() as u32);
        } else {
            reply.error(EPERM);
        }
    }
}
