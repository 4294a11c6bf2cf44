//! Git mirror of the tiddler store.
//!
//! The [`MirrorEngine`] owns one local clone of a remote repository. Each
//! [`run`](MirrorEngine::run) rebuilds the `tiddlers/` directory from the
//! current store snapshot, one `.tid` file per live tiddler, and commits and
//! pushes only if that directory actually changed.
//!
//! Runs are serialized: the clone sits behind a mutex held for the whole
//! prepare → rebuild → diff → commit → push sequence, so a second trigger
//! waits for the first to finish.
//!
//! Nothing is rolled back on failure. The next run re-derives the directory
//! from the store, so a half-written tree heals itself.

mod repo;

use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use git2::Signature;
use log::{debug, info, warn};

use crate::error::{Result, TiddlyError};
use crate::render::{file_name, render_tid};
use crate::store::TiddlerStore;
use repo::{Deadline, WorkingCopy};

pub use repo::set_transport_timeouts;

/// Directory inside the clone holding the rendered tiddlers.
pub const TIDDLER_DIR: &str = "tiddlers";

/// Author and committer name for mirror commits.
pub const AUTHOR_NAME: &str = "TiddlyWiki Git Backup";

/// Author and committer email for mirror commits.
pub const AUTHOR_EMAIL: &str = "none@example.com";

/// Message of every mirror commit.
pub const COMMIT_MESSAGE: &str = "updates";

/// HTTP basic credentials for the remote.
#[derive(Clone)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password or access token.
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where and how to mirror.
#[derive(Debug, Clone)]
pub struct MirrorSettings {
    /// Remote repository URL (or local path).
    pub remote_url: String,
    /// Credentials for the remote; `None` for anonymous or local remotes.
    pub credentials: Option<Credentials>,
    /// Directory holding the local clone.
    pub work_dir: PathBuf,
    /// Budget for the network operations of one run.
    pub timeout: Duration,
}

/// What one mirror run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorReport {
    /// Files written to the tiddler directory.
    pub written: usize,
    /// Tiddlers skipped because their metadata did not parse or their file
    /// could not be named.
    pub skipped: usize,
    /// The new commit, if the tree changed.
    pub commit: Option<String>,
    /// Whether anything was pushed.
    pub pushed: bool,
}

/// Serialized mirror of a tiddler store into a git working tree.
pub struct MirrorEngine {
    store: Arc<dyn TiddlerStore>,
    settings: MirrorSettings,
    clone: Mutex<Option<WorkingCopy>>,
}

impl MirrorEngine {
    /// Create an engine. Nothing touches the network until the first run.
    pub fn new(store: Arc<dyn TiddlerStore>, settings: MirrorSettings) -> Self {
        Self {
            store,
            settings,
            clone: Mutex::new(None),
        }
    }

    /// Settings this engine was built with.
    pub fn settings(&self) -> &MirrorSettings {
        &self.settings
    }

    /// Perform one full mirror run, blocking until any run already in
    /// progress has finished.
    pub fn run(&self) -> Result<MirrorReport> {
        let mut slot = self.clone.lock().unwrap_or_else(PoisonError::into_inner);
        let deadline = Deadline::after(self.settings.timeout);
        let credentials = self.settings.credentials.as_ref();

        let result = match slot.as_ref() {
            Some(copy) => copy.pull(credentials, deadline),
            None => WorkingCopy::prepare(
                &self.settings.remote_url,
                &self.settings.work_dir,
                credentials,
                deadline,
            )
            .map(|copy| {
                *slot = Some(copy);
            }),
        };
        if let Err(e) = result {
            // Reopen from disk next time rather than trusting this handle.
            *slot = None;
            return Err(e);
        }

        let Some(copy) = slot.as_ref() else {
            return Err(TiddlyError::Git(git2::Error::from_str(
                "mirror clone unavailable",
            )));
        };
        self.publish(copy, deadline)
    }

    fn publish(&self, copy: &WorkingCopy, deadline: Deadline) -> Result<MirrorReport> {
        let (written, skipped) = self.rebuild(copy)?;

        let mut index = copy.stage(TIDDLER_DIR)?;
        let commit = if copy.has_staged_changes(&index)? {
            let author = Signature::now(AUTHOR_NAME, AUTHOR_EMAIL)?;
            Some(copy.commit(&mut index, &author, COMMIT_MESSAGE)?.to_string())
        } else {
            info!("Mirror tree unchanged ({} tiddlers)", written);
            None
        };

        // Also retries a push that failed on an earlier run.
        let pushed = if copy.is_ahead()? {
            copy.push(self.settings.credentials.as_ref(), deadline)?;
            true
        } else {
            false
        };

        Ok(MirrorReport {
            written,
            skipped,
            commit,
            pushed,
        })
    }

    /// Replace the tiddler directory with a fresh rendering of the store.
    fn rebuild(&self, copy: &WorkingCopy) -> Result<(usize, usize)> {
        let dir = copy.workdir()?.join(TIDDLER_DIR);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;

        let mut written = 0;
        let mut skipped = 0;
        for record in self.store.scan()? {
            let meta = match record.metadata() {
                Ok(Some(meta)) => meta,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping '{}' in mirror: {}", record.title, e);
                    skipped += 1;
                    continue;
                }
            };

            let path = dir.join(file_name(&record.title));
            debug!("Rendering '{}' to {:?}", record.title, path);
            match fs::write(&path, render_tid(&meta, &record.text)) {
                Ok(()) => written += 1,
                // The name is the problem, not the disk: lose this one file only.
                Err(source) if rejects_name(&source) => {
                    let err = TiddlyError::FileWrite { path, source };
                    warn!("Skipping '{}' in mirror: {}", record.title, err);
                    skipped += 1;
                }
                Err(source) => return Err(TiddlyError::FileWrite { path, source }),
            }
        }
        Ok((written, skipped))
    }
}

/// Whether a write failed because the filesystem refuses the file name.
fn rejects_name(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::InvalidFilename | io::ErrorKind::InvalidInput
    )
}

impl fmt::Debug for MirrorEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirrorEngine")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
