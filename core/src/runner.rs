use crate::archive::{create_archive, ARCHIVE_EXTENSION};
use crate::check::find_existing_archive;
use crate::config::{BackupOptions, BackupSpec};
use crate::fingerprint::{fingerprint, Fingerprint};
use crate::listing::list_files;
use crate::store::RemoteStore;
use crate::upload::{UploadTarget, Uploader};
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, error, info};

/// Where a backup job is in its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Enumerating,
    Fingerprinting,
    CheckingRemote,
    Building,
    Uploading,
    Skipped,
    Done,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Enumerating => "enumerating files",
            JobState::Fingerprinting => "fingerprinting",
            JobState::CheckingRemote => "checking remote archives",
            JobState::Building => "building archive",
            JobState::Uploading => "uploading",
            JobState::Skipped => "skipped",
            JobState::Done => "done",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// An archive with the same fingerprint already exists under `existing_key`.
    Skipped { existing_key: String },
    Uploaded(UploadTarget),
    /// Dry run: the archive was built but not sent.
    WouldUpload(UploadTarget),
}

impl JobOutcome {
    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Skipped { .. } => JobState::Skipped,
            JobOutcome::Uploaded(_) | JobOutcome::WouldUpload(_) => JobState::Done,
        }
    }
}

/// A job that ended in [`JobState::Failed`].
#[derive(Debug)]
pub struct JobFailure {
    pub name: String,
    /// The state the job was in when the error happened.
    pub state: JobState,
    pub error: Error,
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Error while backing up [backups.{}] ({}): {}",
            self.name, self.state, self.error
        )
    }
}

impl std::error::Error for JobFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<(String, JobOutcome)>,
    pub failures: Vec<JobFailure>,
}

impl RunSummary {
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Process exit status: the number of failed jobs, saturated to fit.
    pub fn exit_code(&self) -> i32 {
        self.failures.len().min(255) as i32
    }
}

/// Runs backup jobs one after another.
///
/// Each job walks its source directory, fingerprints the files and asks the
/// store whether an archive with that fingerprint exists. Only on a miss is a
/// zip archive built in a scratch directory and uploaded. A failing job is
/// logged and counted; the remaining jobs still run.
pub struct BackupRunner {
    store: Arc<dyn RemoteStore>,
    uploader: Uploader,
    staging_root: Option<PathBuf>,
}

impl BackupRunner {
    pub fn new(store: Arc<dyn RemoteStore>, dry_run: bool) -> Self {
        Self {
            uploader: Uploader::new(store.clone(), dry_run),
            store,
            staging_root: None,
        }
    }

    /// Builds archives under `dir` instead of the system temp directory.
    pub fn with_staging_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(dir.into());
        self
    }

    pub async fn run_all(&self, specs: &[BackupSpec], now: DateTime<Utc>) -> RunSummary {
        let mut summary = RunSummary::default();
        for spec in specs {
            info!("Performing backup for [backups.{}]", spec.name);
            match self.run_job(spec, now).await {
                Ok(outcome) => {
                    info!("Done backing up [backups.{}]", spec.name);
                    summary.outcomes.push((spec.name.clone(), outcome));
                }
                Err(failure) => {
                    error!("{}", failure);
                    summary.failures.push(failure);
                }
            }
        }
        summary
    }

    pub async fn run_job(
        &self,
        spec: &BackupSpec,
        now: DateTime<Utc>,
    ) -> std::result::Result<JobOutcome, JobFailure> {
        let mut state = JobState::Enumerating;
        self.drive(spec, now, &mut state)
            .await
            .map_err(|error| JobFailure {
                name: spec.name.clone(),
                state,
                error,
            })
    }

    async fn drive(&self, spec: &BackupSpec, now: DateTime<Utc>, state: &mut JobState) -> Result<JobOutcome> {
        transition(spec, state, JobState::Enumerating);
        if !spec.src_dir.is_dir() {
            return Err(Error::SourceNotFound {
                path: spec.src_dir.clone(),
            });
        }
        let listing = list_files(&spec.src_dir, &spec.ignore)?;
        debug!("File list:\n  {}", listing.paths().join("\n  "));

        transition(spec, state, JobState::Fingerprinting);
        let tree_hash = fingerprint(&spec.src_dir, &listing)?;
        debug!("Hash: {}", tree_hash);

        transition(spec, state, JobState::CheckingRemote);
        if let Some(existing_key) = find_existing_archive(self.store.as_ref(), &spec.options, &tree_hash).await? {
            info!(
                "Skipping backup: found existing archive with matching hash: {}",
                self.store.describe(spec.options.require_bucket()?, &existing_key)
            );
            transition(spec, state, JobState::Skipped);
            return Ok(JobOutcome::Skipped { existing_key });
        }

        transition(spec, state, JobState::Building);
        let staging = match &self.staging_root {
            Some(root) => TempDir::new_in(root)?,
            None => TempDir::new()?,
        };
        let name = archive_name(&spec.options, now, &tree_hash);
        let local_archive = create_archive(staging.path(), &name, &spec.src_dir, &listing)?;

        transition(spec, state, JobState::Uploading);
        let target = self.uploader.upload(&local_archive, &spec.options).await?;

        transition(spec, state, JobState::Done);
        if self.uploader.is_dry_run() {
            Ok(JobOutcome::WouldUpload(target))
        } else {
            Ok(JobOutcome::Uploaded(target))
        }
    }
}

fn transition(spec: &BackupSpec, state: &mut JobState, next: JobState) {
    debug!("[backups.{}] {} -> {}", spec.name, state, next);
    *state = next;
}

/// `<archive_prefix><timestamp>-<fingerprint>.zip`, with the timestamp in
/// RFC 3339 at whole-second precision.
pub fn archive_name(options: &BackupOptions, now: DateTime<Utc>, fingerprint: &Fingerprint) -> String {
    format!(
        "{}{}-{}{}",
        options.archive_prefix().unwrap_or(""),
        now.to_rfc3339_opts(SecondsFormat::Secs, false),
        fingerprint,
        ARCHIVE_EXTENSION
    )
}
