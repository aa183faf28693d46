use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use stashbox_backends::{LocalStore, S3Store};
use stashbox_core::{
    read_config, BackupRunner, BackupSpec, JobOutcome, JobState, RemoteStore, RunSummary, VarScope,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Args)]
pub struct BackupCommand {
    #[arg(
        short,
        long = "config",
        value_name = "PATH",
        required = true,
        help = "Backup config file (repeatable)"
    )]
    configs: Vec<PathBuf>,

    #[arg(short, long, alias = "dry_run", help = "Build archives but don't upload them")]
    dry_run: bool,

    #[arg(
        long,
        env = "STASHBOX_LOCAL_STORE",
        value_name = "DIR",
        conflicts_with = "endpoint",
        help = "Store archives under a local directory instead of S3"
    )]
    local_store: Option<PathBuf>,

    #[arg(long, env = "STASHBOX_S3_ENDPOINT", help = "S3-compatible endpoint URL")]
    endpoint: Option<String>,
}

impl BackupCommand {
    /// Runs every configured backup and returns the number of failed jobs.
    pub async fn run(&self) -> Result<i32> {
        let specs = self.load_specs(&VarScope::from_process_env())?;
        let store = self.open_store().await;
        info!("Using {:?} store", store.store_type());

        if self.dry_run {
            println!("DRY RUN - no archives will be uploaded");
        }

        let summary = self.run_with_store(store, &specs, Utc::now()).await;
        print_summary(&summary);
        Ok(summary.exit_code())
    }

    /// Reads all config files. Any config error aborts before a job runs.
    fn load_specs(&self, scope: &VarScope) -> Result<Vec<BackupSpec>> {
        let mut specs = Vec::new();
        let mut seen: HashMap<String, PathBuf> = HashMap::new();

        for path in &self.configs {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let loaded = read_config(&text, scope)
                .with_context(|| format!("Invalid config file {}", path.display()))?;
            info!("Loaded {} backups from {}", loaded.len(), path.display());

            for spec in loaded {
                if let Some(first) = seen.insert(spec.name.clone(), path.clone()) {
                    bail!(
                        "[backups.{}] is defined in both {} and {}",
                        spec.name,
                        first.display(),
                        path.display()
                    );
                }
                specs.push(spec);
            }
        }

        Ok(specs)
    }

    async fn open_store(&self) -> Arc<dyn RemoteStore> {
        match (&self.local_store, &self.endpoint) {
            (Some(dir), _) => Arc::new(LocalStore::new(dir)),
            (None, Some(endpoint)) => Arc::new(S3Store::with_endpoint(endpoint.clone()).await),
            (None, None) => Arc::new(S3Store::new().await),
        }
    }

    async fn run_with_store(
        &self,
        store: Arc<dyn RemoteStore>,
        specs: &[BackupSpec],
        now: DateTime<Utc>,
    ) -> RunSummary {
        BackupRunner::new(store, self.dry_run).run_all(specs, now).await
    }
}

fn print_summary(summary: &RunSummary) {
    for (name, outcome) in &summary.outcomes {
        let detail = match outcome {
            JobOutcome::Skipped { existing_key } => format!("already stored as {}", existing_key),
            JobOutcome::Uploaded(target) => format!("uploaded {}/{}", target.bucket, target.key),
            JobOutcome::WouldUpload(target) => format!("would upload {}/{}", target.bucket, target.key),
        };
        println!("[backups.{}] {}: {}", name, outcome.state(), detail);
    }
    for failure in &summary.failures {
        println!("[backups.{}] {}: {} ({})", failure.name, JobState::Failed, failure.error, failure.state);
    }
    if summary.failure_count() > 0 {
        warn!("{} backup(s) failed", summary.failure_count());
    }
}
