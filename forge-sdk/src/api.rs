//! Typed handles over the query chain
//!
//! Every type here is a thin wrapper around a [`Selection`] chain plus a
//! shared session reference. Chaining methods (`from`, `with_exec`,
//! `with_new_file`, ...) append a field to the chain and return a *new*
//! handle without touching the original and without any I/O. Terminal
//! methods (`stdout`, `contents`, `entries`, `id`, ...) are `async`: they
//! execute the chain against the engine and decode the result.
//!
//! Optional arguments use `*_opts` companion methods taking a `Default`-able
//! opts struct; unset fields are simply not emitted into the query, which
//! preserves engine-side defaults and caching.
//!
//! # Examples
//!
//! ```no_run
//! use forge_sdk::{Config, Connection};
//!
//! # async fn example() -> Result<(), forge_sdk::Error> {
//! let conn = Connection::connect(Config::default()).await?;
//! let client = conn.client();
//!
//! let out = client
//!     .container()
//!     .from("alpine:3.16.2")
//!     .with_env_variable("FOO", "bar")
//!     .with_exec(vec!["printenv", "FOO"])
//!     .stdout()
//!     .await?;
//! assert_eq!(out, "bar\n");
//! # conn.close().await;
//! # Ok(())
//! # }
//! ```

use std::future::{Future, IntoFuture};
use std::pin::Pin;

use crate::connection::Session;
use crate::error::Result;
use crate::exec;
use crate::selection::{GqlValue, Selection};

/// An OS/architecture platform in `os/arch` form, e.g. `linux/amd64`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform(pub String);

impl From<&str> for Platform {
    fn from(value: &str) -> Self {
        Platform(value.to_string())
    }
}

/// A build argument forwarded to the engine's image build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArg {
    pub name: String,
    pub value: String,
}

impl BuildArg {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        BuildArg {
            name: name.into(),
            value: value.into(),
        }
    }

    fn to_value(&self) -> GqlValue {
        GqlValue::Object(vec![
            ("name".to_string(), GqlValue::String(self.name.clone())),
            ("value".to_string(), GqlValue::String(self.value.clone())),
        ])
    }
}

/// Sharing behavior of a mounted cache volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSharingMode {
    /// Concurrent pipelines share the volume (default).
    Shared,
    /// Each pipeline gets its own scratch copy.
    Private,
    /// Concurrent pipelines serialize on the volume.
    Locked,
}

impl CacheSharingMode {
    fn as_wire(self) -> &'static str {
        match self {
            CacheSharingMode::Shared => "SHARED",
            CacheSharingMode::Private => "PRIVATE",
            CacheSharingMode::Locked => "LOCKED",
        }
    }
}

/// Optional arguments for [`Client::container_opts`].
#[derive(Debug, Clone, Default)]
pub struct ContainerOpts {
    /// Platform to initialize the container for.
    pub platform: Option<Platform>,
}

/// Optional arguments for [`Client::git_opts`].
#[derive(Debug, Clone, Default)]
pub struct GitOpts {
    /// Keep the `.git` directory in checked-out trees.
    pub keep_git_dir: Option<bool>,
}

/// Optional arguments for [`Container::with_mounted_cache_opts`].
#[derive(Debug, Clone, Default)]
pub struct MountCacheOpts {
    /// Sharing behavior across concurrent pipelines.
    pub sharing: Option<CacheSharingMode>,
}

/// Optional arguments for [`Directory::entries_opts`].
#[derive(Debug, Clone, Default)]
pub struct EntriesOpts {
    /// Subpath to list instead of the directory root.
    pub path: Option<String>,
}

/// Optional arguments for [`Container::build_opts`].
#[derive(Debug, Clone, Default)]
pub struct BuildOpts {
    /// Build arguments passed to the image build.
    pub build_args: Option<Vec<BuildArg>>,
}

/// Optional arguments for [`Container::export_opts`].
#[derive(Clone, Default)]
pub struct ExportOpts {
    /// Identifiers of other platform variants bundled into the export.
    pub platform_variants: Option<Vec<Container>>,
}

fn string_list<I, S>(items: I) -> GqlValue
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    GqlValue::List(
        items
            .into_iter()
            .map(|item| GqlValue::String(item.into()))
            .collect(),
    )
}

/// Root handle: the entry point of every chain on a session.
#[derive(Clone)]
pub struct Client {
    session: Session,
    selection: Selection,
}

impl Client {
    pub(crate) fn root(session: Session) -> Self {
        Client {
            session,
            selection: Selection::root(),
        }
    }

    /// Start a scratch container.
    pub fn container(&self) -> Container {
        Container {
            session: self.session.clone(),
            selection: self.selection.select("container"),
        }
    }

    /// Start a scratch container with optional arguments.
    pub fn container_opts(&self, opts: ContainerOpts) -> Container {
        let mut selection = self.selection.select("container");
        if let Some(platform) = opts.platform {
            selection = selection.arg("platform", GqlValue::String(platform.0));
        }
        Container {
            session: self.session.clone(),
            selection,
        }
    }

    /// Start an empty directory.
    pub fn directory(&self) -> Directory {
        Directory {
            session: self.session.clone(),
            selection: self.selection.select("directory"),
        }
    }

    /// Reference a remote git repository by URL.
    pub fn git(&self, url: impl Into<String>) -> GitRepository {
        GitRepository {
            session: self.session.clone(),
            selection: self
                .selection
                .select("git")
                .arg("url", GqlValue::String(url.into())),
        }
    }

    /// Reference a remote git repository, with optional arguments.
    pub fn git_opts(&self, url: impl Into<String>, opts: GitOpts) -> GitRepository {
        let mut selection = self
            .selection
            .select("git")
            .arg("url", GqlValue::String(url.into()));
        if let Some(keep) = opts.keep_git_dir {
            selection = selection.arg("keepGitDir", GqlValue::Boolean(keep));
        }
        GitRepository {
            session: self.session.clone(),
            selection,
        }
    }

    /// Access the host the engine runs on.
    pub fn host(&self) -> Host {
        Host {
            session: self.session.clone(),
            selection: self.selection.select("host"),
        }
    }

    /// Reference a cache volume by key; the same key names the same volume
    /// across sessions.
    pub fn cache_volume(&self, key: impl Into<String>) -> CacheVolume {
        CacheVolume {
            session: self.session.clone(),
            selection: self
                .selection
                .select("cacheVolume")
                .arg("key", GqlValue::String(key.into())),
        }
    }
}

/// An OCI-compatible container, addressed by its pipeline so far.
#[derive(Clone)]
pub struct Container {
    session: Session,
    selection: Selection,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("selection", &self.selection)
            .finish_non_exhaustive()
    }
}

impl Container {
    fn chain(&self, selection: Selection) -> Container {
        Container {
            session: self.session.clone(),
            selection,
        }
    }

    /// Initialize this container from a registry address.
    pub fn from(&self, address: impl Into<String>) -> Container {
        self.chain(
            self.selection
                .select("from")
                .arg("address", GqlValue::String(address.into())),
        )
    }

    /// Initialize this container from a Dockerfile build of `context`.
    pub fn build(&self, context: &Directory) -> Container {
        self.chain(
            self.selection
                .select("build")
                .arg_handle("context", context.selection.clone()),
        )
    }

    /// Initialize this container from a Dockerfile build, with optional
    /// arguments.
    pub fn build_opts(&self, context: &Directory, opts: BuildOpts) -> Container {
        let mut selection = self
            .selection
            .select("build")
            .arg_handle("context", context.selection.clone());
        if let Some(build_args) = opts.build_args {
            selection = selection.arg(
                "buildArgs",
                GqlValue::List(build_args.iter().map(BuildArg::to_value).collect()),
            );
        }
        self.chain(selection)
    }

    /// Run a command in the container.
    pub fn with_exec<I, S>(&self, args: I) -> Container
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.chain(
            self.selection
                .select("withExec")
                .arg("args", string_list(args)),
        )
    }

    /// Run a command in the container.
    ///
    /// Superseded by [`Container::with_exec`]; behaves identically but emits
    /// a deprecation notice.
    #[deprecated(since = "0.0.1", note = "use with_exec instead")]
    pub fn exec<I, S>(&self, args: I) -> Container
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        log::warn!("Container::exec is deprecated, use with_exec instead");
        self.with_exec(args)
    }

    /// Set an environment variable.
    pub fn with_env_variable(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Container {
        self.chain(
            self.selection
                .select("withEnvVariable")
                .arg("name", GqlValue::String(name.into()))
                .arg("value", GqlValue::String(value.into())),
        )
    }

    /// Mount a directory at `path`.
    pub fn with_mounted_directory(&self, path: impl Into<String>, source: &Directory) -> Container {
        self.chain(
            self.selection
                .select("withMountedDirectory")
                .arg("path", GqlValue::String(path.into()))
                .arg_handle("source", source.selection.clone()),
        )
    }

    /// Mount a cache volume at `path`.
    pub fn with_mounted_cache(&self, path: impl Into<String>, cache: &CacheVolume) -> Container {
        self.with_mounted_cache_opts(path, cache, MountCacheOpts::default())
    }

    /// Mount a cache volume at `path`, with optional arguments.
    pub fn with_mounted_cache_opts(
        &self,
        path: impl Into<String>,
        cache: &CacheVolume,
        opts: MountCacheOpts,
    ) -> Container {
        let mut selection = self
            .selection
            .select("withMountedCache")
            .arg("path", GqlValue::String(path.into()))
            .arg_handle("cache", cache.selection.clone());
        if let Some(sharing) = opts.sharing {
            selection = selection.arg("sharing", GqlValue::Enum(sharing.as_wire().to_string()));
        }
        self.chain(selection)
    }

    /// Expose a network port to services bound in this session.
    pub fn with_exposed_port(&self, port: i64) -> Container {
        self.chain(
            self.selection
                .select("withExposedPort")
                .arg("port", GqlValue::Int(port)),
        )
    }

    /// Set the working directory for subsequent commands.
    pub fn with_workdir(&self, path: impl Into<String>) -> Container {
        self.chain(
            self.selection
                .select("withWorkdir")
                .arg("path", GqlValue::String(path.into())),
        )
    }

    /// Set the container entrypoint.
    pub fn with_entrypoint<I, S>(&self, args: I) -> Container
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.chain(
            self.selection
                .select("withEntrypoint")
                .arg("args", string_list(args)),
        )
    }

    /// Apply a reusable pipeline fragment to this container.
    ///
    /// Plain function application: `with_(f)` is `f(self)`. Useful for
    /// composing named fragments into a chain.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use forge_sdk::Container;
    /// fn spam(c: Container) -> Container {
    ///     c.with_env_variable("SPAM", "eggs")
    /// }
    ///
    /// # fn example(base: Container) -> Container {
    /// base.with_(spam).with_exec(vec!["printenv"])
    /// # }
    /// ```
    pub fn with_<F>(self, f: F) -> Container
    where
        F: FnOnce(Container) -> Container,
    {
        f(self)
    }

    /// Standard output of the last executed command.
    pub async fn stdout(&self) -> Result<String> {
        exec::execute(&self.session, &self.selection.select("stdout"), None).await
    }

    /// Standard error of the last executed command.
    pub async fn stderr(&self) -> Result<String> {
        exec::execute(&self.session, &self.selection.select("stderr"), None).await
    }

    /// Opaque engine ID for this container state.
    pub async fn id(&self) -> Result<String> {
        exec::execute(&self.session, &self.selection.select("id"), None).await
    }

    /// Force evaluation of the pipeline now.
    ///
    /// Returns a new handle over the same chain, guaranteed materialized on
    /// the engine side; the original handle stays valid for independent
    /// reuse. `container.sync().await?` followed by a terminal call behaves
    /// exactly like the terminal call on the unresolved chain (one round
    /// trip more, same results); `container.await` is shorthand for it.
    pub async fn sync(&self) -> Result<Container> {
        exec::execute_value(&self.session, &self.selection.select("sync"), None).await?;
        Ok(self.chain(self.selection.clone()))
    }

    /// Write this container as an OCI tarball at `path` on the host.
    pub async fn export(&self, path: impl Into<String>) -> Result<bool> {
        self.export_opts(path, ExportOpts::default()).await
    }

    /// Write this container as an OCI tarball, with optional arguments.
    pub async fn export_opts(&self, path: impl Into<String>, opts: ExportOpts) -> Result<bool> {
        let mut selection = self
            .selection
            .select("export")
            .arg("path", GqlValue::String(path.into()));
        if let Some(variants) = opts.platform_variants {
            selection = selection.arg_handles(
                "platformVariants",
                variants.iter().map(|c| c.selection.clone()).collect(),
            );
        }
        exec::execute(&self.session, &selection, None).await
    }
}

impl IntoFuture for Container {
    type Output = Result<Container>;
    type IntoFuture = Pin<Box<dyn Future<Output = Result<Container>> + Send>>;

    /// Awaiting a container is the same as awaiting [`Container::sync`].
    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.sync().await })
    }
}

/// A directory tree, real or under construction.
#[derive(Clone)]
pub struct Directory {
    session: Session,
    selection: Selection,
}

impl Directory {
    fn chain(&self, selection: Selection) -> Directory {
        Directory {
            session: self.session.clone(),
            selection,
        }
    }

    /// Return this directory plus a new file at `path` with `contents`.
    pub fn with_new_file(
        &self,
        path: impl Into<String>,
        contents: impl Into<String>,
    ) -> Directory {
        self.chain(
            self.selection
                .select("withNewFile")
                .arg("path", GqlValue::String(path.into()))
                .arg("contents", GqlValue::String(contents.into())),
        )
    }

    /// A subdirectory at `path`.
    pub fn directory(&self, path: impl Into<String>) -> Directory {
        self.chain(
            self.selection
                .select("directory")
                .arg("path", GqlValue::String(path.into())),
        )
    }

    /// A file at `path`.
    pub fn file(&self, path: impl Into<String>) -> File {
        File {
            session: self.session.clone(),
            selection: self
                .selection
                .select("file")
                .arg("path", GqlValue::String(path.into())),
        }
    }

    /// Apply a reusable pipeline fragment to this directory.
    pub fn with_<F>(self, f: F) -> Directory
    where
        F: FnOnce(Directory) -> Directory,
    {
        f(self)
    }

    /// Entry names in this directory, in lexicographic order.
    pub async fn entries(&self) -> Result<Vec<String>> {
        exec::execute(&self.session, &self.selection.select("entries"), None).await
    }

    /// Entry names, with optional arguments.
    pub async fn entries_opts(&self, opts: EntriesOpts) -> Result<Vec<String>> {
        let mut selection = self.selection.select("entries");
        if let Some(path) = opts.path {
            selection = selection.arg("path", GqlValue::String(path));
        }
        exec::execute(&self.session, &selection, None).await
    }

    /// Opaque engine ID for this directory state.
    pub async fn id(&self) -> Result<String> {
        exec::execute(&self.session, &self.selection.select("id"), None).await
    }
}

/// A file in a directory tree.
#[derive(Clone)]
pub struct File {
    session: Session,
    selection: Selection,
}

impl File {
    /// The file's contents.
    pub async fn contents(&self) -> Result<String> {
        exec::execute(&self.session, &self.selection.select("contents"), None).await
    }

    /// The file's size in bytes.
    pub async fn size(&self) -> Result<i64> {
        exec::execute(&self.session, &self.selection.select("size"), None).await
    }

    /// Opaque engine ID for this file.
    pub async fn id(&self) -> Result<String> {
        exec::execute(&self.session, &self.selection.select("id"), None).await
    }
}

/// A remote git repository.
#[derive(Clone)]
pub struct GitRepository {
    session: Session,
    selection: Selection,
}

impl GitRepository {
    /// A tag of this repository.
    pub fn tag(&self, name: impl Into<String>) -> GitRef {
        GitRef {
            session: self.session.clone(),
            selection: self
                .selection
                .select("tag")
                .arg("name", GqlValue::String(name.into())),
        }
    }

    /// A branch of this repository.
    pub fn branch(&self, name: impl Into<String>) -> GitRef {
        GitRef {
            session: self.session.clone(),
            selection: self
                .selection
                .select("branch")
                .arg("name", GqlValue::String(name.into())),
        }
    }
}

/// A resolved reference (tag, branch) in a git repository.
#[derive(Clone)]
pub struct GitRef {
    session: Session,
    selection: Selection,
}

impl GitRef {
    /// The directory tree at this ref.
    pub fn tree(&self) -> Directory {
        Directory {
            session: self.session.clone(),
            selection: self.selection.select("tree"),
        }
    }
}

/// The host the engine runs on.
#[derive(Clone)]
pub struct Host {
    session: Session,
    selection: Selection,
}

impl Host {
    /// A directory on the host, made available to the engine.
    pub fn directory(&self, path: impl Into<String>) -> Directory {
        Directory {
            session: self.session.clone(),
            selection: self
                .selection
                .select("directory")
                .arg("path", GqlValue::String(path.into())),
        }
    }
}

/// A named cache volume persisted across sessions.
#[derive(Clone)]
pub struct CacheVolume {
    session: Session,
    selection: Selection,
}

impl CacheVolume {
    /// Opaque engine ID for this volume.
    pub async fn id(&self) -> Result<String> {
        exec::execute(&self.session, &self.selection.select("id"), None).await
    }
}
