//! git2 working copy used by the mirror.
//!
//! This is the only module that talks to git. Every network operation runs
//! against a deadline checked from libgit2's callbacks (transfer progress,
//! sideband messages, push negotiation); crossing it aborts the operation
//! and surfaces as [`TiddlyError::Timeout`]. Stalled sockets, where no
//! callback fires, are bounded by [`set_transport_timeouts`].

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    Commit, Cred, ErrorClass, ErrorCode, FetchOptions, Index, IndexAddOption, Oid, PushOptions,
    RemoteCallbacks, Repository, ResetType, Signature,
};
use log::{debug, info, warn};

use super::Credentials;
use crate::error::{Result, TiddlyError};

const REMOTE: &str = "origin";

/// Deadline for the network part of one mirror run.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    pub(crate) fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Turn a libgit2 failure into a timeout if it was our callbacks that
    /// aborted the operation.
    ///
    /// A progress callback returning `false` surfaces as a generic error of
    /// class `Callback`; one returning an error keeps that error's code.
    fn map_err(&self, e: git2::Error) -> TiddlyError {
        let aborted = e.code() == ErrorCode::User || e.class() == ErrorClass::Callback;
        if aborted && self.expired() {
            TiddlyError::Timeout(self.budget)
        } else {
            TiddlyError::Git(e)
        }
    }

    fn check(&self) -> std::result::Result<(), git2::Error> {
        if self.expired() {
            Err(git2::Error::new(
                ErrorCode::User,
                ErrorClass::Callback,
                "mirror deadline passed",
            ))
        } else {
            Ok(())
        }
    }
}

/// Bound libgit2's socket connect and read/write waits by `budget`.
///
/// The setting is process-wide. Call it once at startup, before any mirror
/// engine runs.
pub fn set_transport_timeouts(budget: Duration) -> Result<()> {
    // Zero would mean no timeout at all.
    let millis = i32::try_from(budget.as_millis()).unwrap_or(i32::MAX).max(1);
    // SAFETY: libgit2 options are global and unsynchronized; callers set
    // them before any other thread uses libgit2.
    unsafe {
        git2::opts::set_server_connect_timeout_in_milliseconds(millis)?;
        git2::opts::set_server_timeout_in_milliseconds(millis)?;
    }
    debug!("libgit2 transport timeouts set to {} ms", millis);
    Ok(())
}

fn callbacks<'a>(credentials: Option<&'a Credentials>, deadline: Deadline) -> RemoteCallbacks<'a> {
    let mut cb = RemoteCallbacks::new();
    if let Some(creds) = credentials {
        cb.credentials(move |_url, _username, _allowed| {
            Cred::userpass_plaintext(&creds.username, &creds.password)
        });
    }
    cb.transfer_progress(move |_| !deadline.expired());
    cb.sideband_progress(move |_| !deadline.expired());
    // Push and pack progress callbacks cannot abort; negotiation can.
    cb.push_negotiation(move |_| deadline.check());
    cb
}

/// A local clone of the mirror remote.
pub(crate) struct WorkingCopy {
    repo: Repository,
    /// Full name of the branch HEAD points at, e.g. `refs/heads/main`.
    branch: String,
}

impl WorkingCopy {
    /// Open the clone at `dir` and fast-forward it, or clone `url` there if
    /// no clone exists yet.
    pub(crate) fn prepare(
        url: &str,
        dir: &Path,
        credentials: Option<&Credentials>,
        deadline: Deadline,
    ) -> Result<Self> {
        if dir.join(".git").exists() {
            info!("Opening existing mirror clone at {:?}", dir);
            let copy = Self::from_repo(Repository::open(dir)?)?;
            copy.pull(credentials, deadline)?;
            Ok(copy)
        } else {
            info!("Cloning {} into {:?}", url, dir);
            let mut fetch = FetchOptions::new();
            fetch.remote_callbacks(callbacks(credentials, deadline));
            let repo = RepoBuilder::new()
                .fetch_options(fetch)
                .clone(url, dir)
                .map_err(|e| deadline.map_err(e))?;
            Self::from_repo(repo)
        }
    }

    fn from_repo(repo: Repository) -> Result<Self> {
        let branch = repo
            .find_reference("HEAD")?
            .symbolic_target()
            .map(str::to_string)
            .ok_or_else(|| {
                TiddlyError::Git(git2::Error::from_str("mirror clone has a detached HEAD"))
            })?;
        debug!("Mirror branch is {}", branch);
        Ok(Self { repo, branch })
    }

    /// Root of the working tree.
    pub(crate) fn workdir(&self) -> Result<PathBuf> {
        self.repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| TiddlyError::Git(git2::Error::from_str("mirror clone is bare")))
    }

    fn short_branch(&self) -> &str {
        self.branch
            .strip_prefix("refs/heads/")
            .unwrap_or(&self.branch)
    }

    fn tracking_ref(&self) -> String {
        format!("refs/remotes/{}/{}", REMOTE, self.short_branch())
    }

    /// Fetch and move the local branch to the remote one.
    ///
    /// Fast-forwards when possible. A branch that has diverged (someone else
    /// pushed while a local commit was still unpushed) is hard-reset to the
    /// remote; the caller rebuilds the tree from the store afterwards, so the
    /// dropped local commit loses nothing.
    pub(crate) fn pull(&self, credentials: Option<&Credentials>, deadline: Deadline) -> Result<()> {
        let mut remote = self.repo.find_remote(REMOTE)?;
        let mut fetch = FetchOptions::new();
        fetch.remote_callbacks(callbacks(credentials, deadline));
        remote
            .fetch::<&str>(&[], Some(&mut fetch), None)
            .map_err(|e| deadline.map_err(e))?;

        let tracking = match self.repo.find_reference(&self.tracking_ref()) {
            Ok(r) => r,
            // Remote branch does not exist yet; nothing to merge.
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let incoming = self.repo.reference_to_annotated_commit(&tracking)?;
        let (analysis, _) = self.repo.merge_analysis(&[&incoming])?;

        if analysis.is_up_to_date() {
            debug!("Mirror clone is up to date");
            return Ok(());
        }

        if analysis.is_unborn() {
            info!("Checking out {} at {}", self.branch, incoming.id());
            self.repo
                .reference(&self.branch, incoming.id(), true, "pull: initial checkout")?;
        } else if analysis.is_fast_forward() {
            info!("Fast-forwarding {} to {}", self.branch, incoming.id());
            self.repo
                .find_reference(&self.branch)?
                .set_target(incoming.id(), "pull: fast-forward")?;
        } else {
            warn!(
                "{} has diverged from {}; resetting to {}",
                self.branch,
                self.tracking_ref(),
                incoming.id()
            );
            let target = self.repo.find_object(incoming.id(), None)?;
            self.repo.reset(
                &target,
                ResetType::Hard,
                Some(CheckoutBuilder::default().force()),
            )?;
            return Ok(());
        }

        self.repo.set_head(&self.branch)?;
        self.repo
            .checkout_head(Some(CheckoutBuilder::default().force()))?;
        Ok(())
    }

    /// Stage the current on-disk state of `subtree`, additions and removals.
    pub(crate) fn stage(&self, subtree: &str) -> Result<Index> {
        let pathspec = format!("{subtree}/*");
        let mut index = self.repo.index()?;
        index.add_all([pathspec.as_str()], IndexAddOption::DEFAULT, None)?;
        index.update_all([pathspec.as_str()], None)?;
        index.write()?;
        Ok(index)
    }

    fn head_commit(&self) -> Result<Option<Commit<'_>>> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?)),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the staged index differs from the last commit.
    pub(crate) fn has_staged_changes(&self, index: &Index) -> Result<bool> {
        let head_tree = self.head_commit()?.map(|c| c.tree()).transpose()?;
        let diff = self
            .repo
            .diff_tree_to_index(head_tree.as_ref(), Some(index), None)?;
        Ok(diff.deltas().len() > 0)
    }

    /// Commit the staged index on top of HEAD.
    pub(crate) fn commit(&self, index: &mut Index, author: &Signature<'_>, message: &str) -> Result<Oid> {
        let tree = self.repo.find_tree(index.write_tree()?)?;
        let parent = self.head_commit()?;
        let parents: Vec<&Commit<'_>> = parent.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), author, author, message, &tree, &parents)?;
        info!("Committed {}", oid);
        Ok(oid)
    }

    /// Whether the local branch has commits the remote branch lacks.
    pub(crate) fn is_ahead(&self) -> Result<bool> {
        let Some(local) = self.head_commit()? else {
            return Ok(false);
        };
        match self.repo.refname_to_id(&self.tracking_ref()) {
            Ok(remote) => {
                let (ahead, _behind) = self.repo.graph_ahead_behind(local.id(), remote)?;
                Ok(ahead > 0)
            }
            Err(e) if e.code() == ErrorCode::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    /// Push the local branch to the remote.
    pub(crate) fn push(&self, credentials: Option<&Credentials>, deadline: Deadline) -> Result<()> {
        let mut remote = self.repo.find_remote(REMOTE)?;
        let refspec = format!("{0}:{0}", self.branch);
        let mut rejected: Option<(String, String)> = None;

        {
            let mut cb = callbacks(credentials, deadline);
            cb.push_update_reference(|reference, status| {
                if let Some(message) = status {
                    rejected = Some((reference.to_string(), message.to_string()));
                }
                Ok(())
            });
            let mut options = PushOptions::new();
            options.remote_callbacks(cb);
            remote
                .push(&[refspec.as_str()], Some(&mut options))
                .map_err(|e| deadline.map_err(e))?;
        }

        if let Some((reference, message)) = rejected {
            return Err(TiddlyError::PushRejected { reference, message });
        }

        // Keep the tracking ref in step so `is_ahead` reflects the push.
        if let Some(head) = self.head_commit()? {
            self.repo
                .reference(&self.tracking_ref(), head.id(), true, "push: update tracking ref")?;
        }
        info!("Pushed {} to {}", self.branch, REMOTE);
        Ok(())
    }
}
