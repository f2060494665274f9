//! Job orchestration.
//!
//! The orchestrator owns the table of live scan jobs. `start_scan` returns
//! immediately; the scan body runs on the blocking pool so raw device
//! syscalls never stall the runtime, and a lightweight forwarder task fans
//! coalesced progress events out to subscribers. Only the orchestrator
//! transitions a job's status, and a failing or panicking job never
//! affects its siblings.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::carve::{effective_carving_mode, Carver};
use crate::device::{DeviceMode, RawDevice};
use crate::diagnostics;
use crate::error::{EngineError, Result};
use crate::extract::{Extractor, RecoveryOutcome};
use crate::fs::{self, FatParser, FilesystemKind, MftParser};
use crate::job::{JobHandle, JobId, JobSnapshot, JobStatus, ProgressEvent, ScanContext, Scanner};
use crate::manifest;
use crate::types::{CarvingMode, FileRecord, ScanOptions, ScanResult, ScanStats, Strategy};

type SubscriberFn = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Token returned by [`Orchestrator::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionHandle(usize);

struct Inner {
    jobs: Mutex<HashMap<JobId, Arc<JobHandle>>>,
    subscribers: Mutex<Vec<Option<SubscriberFn>>>,
}

/// Entry point for scans and recovery. Cheap to clone.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Orchestrator {
        Orchestrator {
            inner: Arc::new(Inner {
                jobs: Mutex::new(HashMap::new()),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Allocates a job, spawns the scan task and returns its id
    /// immediately. Must be called within a tokio runtime.
    pub fn start_scan(&self, target: &str, strategy: Strategy, options: ScanOptions) -> JobId {
        let id = uuid::Uuid::new_v4().to_string();
        let handle = JobHandle::new(id.clone(), target.to_string(), strategy.clone());
        self.inner.jobs.lock().insert(id.clone(), Arc::clone(&handle));
        info!(job_id = %id, target, strategy = strategy.name(), "scan started");

        self.spawn_forwarder(&handle);

        let job = Arc::clone(&handle);
        tokio::spawn(async move {
            let worker = tokio::task::spawn_blocking({
                let job = Arc::clone(&job);
                move || run_strategy(&job, strategy, options)
            });

            let duration_seconds = match worker.await {
                Ok(outcome) => {
                    let duration = job.start_instant.elapsed().as_secs_f64();
                    match outcome {
                        Ok(stats) => finish_job(&job, stats, None),
                        Err(e) => {
                            warn!(job_id = %job.id, error = %e, "scan failed");
                            finish_job(&job, ScanStats::default(), Some(e.to_string()));
                        }
                    }
                    duration
                }
                Err(join_error) => {
                    // A panic in one job must not take down its siblings.
                    error!(job_id = %job.id, error = %join_error, "scan task aborted");
                    finish_job(
                        &job,
                        ScanStats::default(),
                        Some(format!("scan task aborted: {join_error}")),
                    );
                    job.start_instant.elapsed().as_secs_f64()
                }
            };
            info!(
                job_id = %job.id,
                status = ?job.status(),
                duration_seconds,
                files = job.files_found(),
                "scan finished"
            );
        });

        id
    }

    /// Forwards each job's coalesced progress events to the subscriber
    /// list until the job reaches a terminal status.
    fn spawn_forwarder(&self, handle: &Arc<JobHandle>) {
        let inner = Arc::clone(&self.inner);
        let mut events = handle.events();
        let mut status = handle.status_updates();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = events.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let event = events.borrow_and_update().clone();
                        deliver(&inner, &event);
                    }
                    _ = status.changed() => {
                        if *status.borrow_and_update() != JobStatus::Running {
                            let event = events.borrow_and_update().clone();
                            deliver(&inner, &event);
                            break;
                        }
                    }
                }
            }
        });
    }

    fn get(&self, job_id: &str) -> Result<Arc<JobHandle>> {
        self.inner
            .jobs
            .lock()
            .get(job_id)
            .cloned()
            .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))
    }

    pub fn status(&self, job_id: &str) -> Result<JobSnapshot> {
        Ok(self.get(job_id)?.snapshot())
    }

    pub fn jobs(&self) -> Vec<JobSnapshot> {
        self.inner.jobs.lock().values().map(|j| j.snapshot()).collect()
    }

    /// Sets the job's cancel flag. Completion is asynchronous: the job
    /// observes the flag at its next yield point and transitions to
    /// `Cancelled` with its partial results intact.
    pub fn cancel(&self, job_id: &str) -> Result<()> {
        let job = self.get(job_id)?;
        job.cancel();
        info!(job_id, "cancellation requested");
        Ok(())
    }

    /// Records produced so far; valid for running and finished jobs alike.
    pub fn results(&self, job_id: &str) -> Result<Vec<FileRecord>> {
        Ok(self.get(job_id)?.records())
    }

    pub fn result(&self, job_id: &str) -> Result<Option<ScanResult>> {
        Ok(self.get(job_id)?.result())
    }

    /// Registers a callback receiving progress events for all jobs.
    pub fn subscribe(
        &self,
        callback: impl Fn(&ProgressEvent) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        let mut subscribers = self.inner.subscribers.lock();
        subscribers.push(Some(Arc::new(callback)));
        SubscriptionHandle(subscribers.len() - 1)
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        let mut subscribers = self.inner.subscribers.lock();
        if let Some(slot) = subscribers.get_mut(handle.0) {
            *slot = None;
        }
    }

    /// Blocks until the job leaves `Running` and returns its final
    /// snapshot.
    pub async fn wait(&self, job_id: &str) -> Result<JobSnapshot> {
        let job = self.get(job_id)?;
        let mut status = job.status_updates();
        loop {
            if *status.borrow_and_update() != JobStatus::Running {
                return Ok(job.snapshot());
            }
            if status.changed().await.is_err() {
                return Ok(job.snapshot());
            }
        }
    }

    /// On-demand recovery of selected records, off the async runtime.
    pub async fn recover_selected(
        &self,
        records: Vec<FileRecord>,
        output_dir: PathBuf,
        create_subdirectories: bool,
        validate_hashes: bool,
    ) -> Result<RecoveryOutcome> {
        let outcome = tokio::task::spawn_blocking(move || {
            let cancel = std::sync::atomic::AtomicBool::new(false);
            Extractor::new(create_subdirectories, validate_hashes).recover(
                &records,
                &output_dir,
                &cancel,
                |_, _, _| {},
            )
        })
        .await
        .map_err(|e| EngineError::UnsupportedDevice(format!("recovery task aborted: {e}")))?;
        Ok(outcome)
    }
}

fn deliver(inner: &Arc<Inner>, event: &ProgressEvent) {
    let subscribers: Vec<SubscriberFn> =
        inner.subscribers.lock().iter().flatten().cloned().collect();
    for subscriber in subscribers {
        subscriber(event);
    }
}

/// Terminal bookkeeping: snapshot the result set and pick the final
/// status. Partial records survive cancellation and errors alike.
fn finish_job(job: &JobHandle, stats: ScanStats, error_message: Option<String>) {
    let records = job.records();
    *job.result.lock() = Some(ScanResult {
        duration_seconds: job.start_instant.elapsed().as_secs_f64(),
        bytes_scanned: stats.bytes_scanned,
        total_files: records.len(),
        partial_files: records.iter().filter(|r| r.is_partial).count(),
        per_extension: stats.per_extension.clone(),
        records,
    });

    let status = if job.is_cancelled() {
        JobStatus::Cancelled
    } else if error_message.is_some() {
        JobStatus::Error
    } else {
        JobStatus::Completed
    };
    *job.error.lock() = error_message;
    job.set_status(status);
}

/// Runs one strategy to completion on the blocking pool.
fn run_strategy(job: &JobHandle, strategy: Strategy, options: ScanOptions) -> Result<ScanStats> {
    let device = RawDevice::open(&job.target)?;
    if device.mode() == DeviceMode::Mounted {
        return Err(EngineError::RawAccessRequired {
            strategy: strategy.name(),
            device: job.target.clone(),
        });
    }
    let output_dir = options.output_dir.clone();
    let carving_mode = options.carving_mode;
    let mut ctx = ScanContext::for_job(device, options, job);

    match strategy {
        Strategy::Metadata => {
            let stats = match fs::detect(&mut ctx.device)? {
                Some(FilesystemKind::Ntfs) => MftParser.run(&mut ctx)?,
                Some(FilesystemKind::Fat32) => FatParser.run(&mut ctx)?,
                None => {
                    // Nothing recognizable: empty result, caller may
                    // escalate to carving.
                    info!(target = %job.target, "no supported filesystem detected");
                    ctx.emit_final(100.0, 0, 0, "metadata_complete");
                    ScanStats::default()
                }
            };
            manifest::write_scan_manifest(
                &output_dir,
                CarvingMode::IndexOnly,
                strategy.name(),
                &job.target,
                &ctx.records(),
                &stats,
                job.start_instant.elapsed().as_secs_f64(),
            )?;
            Ok(stats)
        }
        Strategy::Carving(ref selection) => {
            let mode = effective_carving_mode(selection, carving_mode);
            let stats = Carver::new(selection.clone()).run(&mut ctx)?;
            manifest::write_scan_manifest(
                &output_dir,
                mode,
                strategy.name(),
                &job.target,
                &ctx.records(),
                &stats,
                job.start_instant.elapsed().as_secs_f64(),
            )?;
            Ok(stats)
        }
        Strategy::ClusterSample => {
            let report = diagnostics::cluster_sample(&mut ctx)?;
            manifest::write_cluster_map(&output_dir, &report)?;
            Ok(ScanStats {
                sectors_scanned: report.statistics.sampled_clusters,
                total_sectors: report.statistics.total_clusters,
                bytes_scanned: report.statistics.sampled_clusters
                    * diagnostics::SAMPLE_CLUSTER_BYTES as u64,
                ..Default::default()
            })
        }
        Strategy::SurfaceHealth => {
            let report = diagnostics::health_scan(&mut ctx)?;
            manifest::write_health_report(&output_dir, &report)?;
            Ok(ScanStats {
                sectors_scanned: report.total_sectors_tested,
                total_sectors: report.total_sectors_tested,
                bytes_scanned: report.total_sectors_tested * 512,
                ..Default::default()
            })
        }
    }
}
