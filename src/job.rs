//! Scan job lifecycle: handles, snapshots, cancellation and progress.
//!
//! A [`JobHandle`] is the orchestrator-owned view of one in-flight scan.
//! Scanners never see the handle; they get a [`ScanContext`] carrying the
//! opened device, a borrowed cancel flag, the shared record store and a
//! throttled [`ProgressSink`]. Progress events ride a `watch` channel, so a
//! slow subscriber only ever observes the newest event per job.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;

use crate::device::RawDevice;
use crate::error::Result;
use crate::types::{FileRecord, ScanOptions, ScanResult, ScanStats, Strategy};
use crate::util::estimate_remaining;

pub type JobId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Cancelled,
    Error,
}

/// Progress notification, coalesced per job (newest wins).
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub job_id: String,
    pub progress_percent: f64,
    pub sectors_scanned: u64,
    pub total_sectors: u64,
    pub files_found: usize,
    pub eta: String,
    pub phase: String,
}

impl ProgressEvent {
    fn initial(job_id: &str) -> ProgressEvent {
        ProgressEvent {
            job_id: job_id.to_string(),
            progress_percent: 0.0,
            sectors_scanned: 0,
            total_sectors: 0,
            files_found: 0,
            eta: "calculating".to_string(),
            phase: "starting".to_string(),
        }
    }
}

/// Point-in-time view of a job, safe to hand across threads.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub target: String,
    pub strategy: &'static str,
    pub status: JobStatus,
    pub progress_percent: f64,
    pub files_found: usize,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One live scan job. Owned by the orchestrator; observed by everyone else
/// through atomics and snapshots. Only the orchestrator transitions status.
pub struct JobHandle {
    pub id: JobId,
    pub target: String,
    pub strategy: Strategy,
    pub started_at: DateTime<Utc>,
    pub(crate) start_instant: Instant,
    pub(crate) cancel: Arc<AtomicBool>,
    progress_bits: Arc<AtomicU64>,
    files_found: Arc<AtomicUsize>,
    pub(crate) records: Arc<Mutex<Vec<FileRecord>>>,
    pub(crate) result: Mutex<Option<ScanResult>>,
    pub(crate) error: Mutex<Option<String>>,
    status_tx: watch::Sender<JobStatus>,
    event_tx: watch::Sender<ProgressEvent>,
}

impl JobHandle {
    pub(crate) fn new(id: JobId, target: String, strategy: Strategy) -> Arc<JobHandle> {
        let (status_tx, _) = watch::channel(JobStatus::Running);
        let (event_tx, _) = watch::channel(ProgressEvent::initial(&id));
        Arc::new(JobHandle {
            id,
            target,
            strategy,
            started_at: Utc::now(),
            start_instant: Instant::now(),
            cancel: Arc::new(AtomicBool::new(false)),
            progress_bits: Arc::new(AtomicU64::new(0)),
            files_found: Arc::new(AtomicUsize::new(0)),
            records: Arc::new(Mutex::new(Vec::new())),
            result: Mutex::new(None),
            error: Mutex::new(None),
            status_tx,
            event_tx,
        })
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> JobStatus {
        *self.status_tx.borrow()
    }

    pub(crate) fn set_status(&self, status: JobStatus) {
        self.status_tx.send_replace(status);
    }

    pub fn status_updates(&self) -> watch::Receiver<JobStatus> {
        self.status_tx.subscribe()
    }

    pub fn events(&self) -> watch::Receiver<ProgressEvent> {
        self.event_tx.subscribe()
    }

    pub fn progress_percent(&self) -> f64 {
        f64::from_bits(self.progress_bits.load(Ordering::Relaxed))
    }

    pub fn files_found(&self) -> usize {
        self.files_found.load(Ordering::Relaxed)
    }

    /// The records produced so far. Valid mid-scan; partial results are
    /// first-class.
    pub fn records(&self) -> Vec<FileRecord> {
        self.records.lock().clone()
    }

    pub fn result(&self) -> Option<ScanResult> {
        self.result.lock().clone()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            target: self.target.clone(),
            strategy: self.strategy.name(),
            status: self.status(),
            progress_percent: self.progress_percent(),
            files_found: self.files_found(),
            started_at: self.started_at,
            error: self.error.lock().clone(),
        }
    }

    pub(crate) fn sink(&self) -> ProgressSink {
        ProgressSink {
            job_id: self.id.clone(),
            event_tx: self.event_tx.clone(),
            progress_bits: Arc::clone(&self.progress_bits),
            files_found: Arc::clone(&self.files_found),
            start: self.start_instant,
            last_emit: Mutex::new(None),
        }
    }
}

/// Emits progress events, rate-limited to one per second per job and
/// clamped so observed progress never decreases.
pub struct ProgressSink {
    job_id: String,
    event_tx: watch::Sender<ProgressEvent>,
    progress_bits: Arc<AtomicU64>,
    files_found: Arc<AtomicUsize>,
    start: Instant,
    last_emit: Mutex<Option<Instant>>,
}

impl ProgressSink {
    /// Sink wired to nothing, for driving scanners outside a job.
    pub fn detached() -> ProgressSink {
        let (event_tx, _) = watch::channel(ProgressEvent::initial("detached"));
        ProgressSink {
            job_id: "detached".to_string(),
            event_tx,
            progress_bits: Arc::new(AtomicU64::new(0)),
            files_found: Arc::new(AtomicUsize::new(0)),
            start: Instant::now(),
            last_emit: Mutex::new(None),
        }
    }

    pub fn emit(&self, percent: f64, sectors_scanned: u64, total_sectors: u64, phase: &str) {
        self.emit_inner(percent, sectors_scanned, total_sectors, phase, false);
    }

    /// Bypasses the rate limit; used for terminal events.
    pub fn emit_final(&self, percent: f64, sectors_scanned: u64, total_sectors: u64, phase: &str) {
        self.emit_inner(percent, sectors_scanned, total_sectors, phase, true);
    }

    fn emit_inner(
        &self,
        percent: f64,
        sectors_scanned: u64,
        total_sectors: u64,
        phase: &str,
        force: bool,
    ) {
        // Monotonic progress: keep the high-water mark.
        let clamped = percent.clamp(0.0, 100.0);
        let mut current = f64::from_bits(self.progress_bits.load(Ordering::Relaxed));
        if clamped > current {
            self.progress_bits
                .store(clamped.to_bits(), Ordering::Relaxed);
            current = clamped;
        }

        if !force {
            let mut last = self.last_emit.lock();
            if let Some(at) = *last {
                if at.elapsed() < Duration::from_secs(1) {
                    return;
                }
            }
            *last = Some(Instant::now());
        }

        let elapsed = self.start.elapsed().as_secs_f64();
        self.event_tx.send_replace(ProgressEvent {
            job_id: self.job_id.clone(),
            progress_percent: current,
            sectors_scanned,
            total_sectors,
            files_found: self.files_found.load(Ordering::Relaxed),
            eta: estimate_remaining(elapsed, current),
            phase: phase.to_string(),
        });
    }
}

/// Everything a scanner needs: the opened device, the options, a borrowed
/// cancel flag and the shared record store.
pub struct ScanContext {
    pub device: RawDevice,
    pub target: String,
    pub options: ScanOptions,
    cancel: Arc<AtomicBool>,
    sink: ProgressSink,
    records: Arc<Mutex<Vec<FileRecord>>>,
    files_found: Arc<AtomicUsize>,
}

impl ScanContext {
    pub(crate) fn for_job(
        device: RawDevice,
        options: ScanOptions,
        handle: &JobHandle,
    ) -> ScanContext {
        ScanContext {
            device,
            target: handle.target.clone(),
            options,
            cancel: Arc::clone(&handle.cancel),
            sink: handle.sink(),
            records: Arc::clone(&handle.records),
            files_found: Arc::clone(&handle.files_found),
        }
    }

    /// Context without an owning job, for direct library use and tests.
    /// The returned flag cancels the scan.
    pub fn standalone(device: RawDevice, options: ScanOptions) -> (ScanContext, Arc<AtomicBool>) {
        let cancel = Arc::new(AtomicBool::new(false));
        let target = device.identifier().to_string();
        let ctx = ScanContext {
            device,
            target,
            options,
            cancel: Arc::clone(&cancel),
            sink: ProgressSink::detached(),
            records: Arc::new(Mutex::new(Vec::new())),
            files_found: Arc::new(AtomicUsize::new(0)),
        };
        (ctx, cancel)
    }

    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn push_record(&self, record: FileRecord) {
        self.files_found.fetch_add(1, Ordering::Relaxed);
        self.records.lock().push(record);
    }

    pub fn records(&self) -> Vec<FileRecord> {
        self.records.lock().clone()
    }

    pub fn emit(&self, percent: f64, sectors_scanned: u64, total_sectors: u64, phase: &str) {
        self.sink
            .emit(percent, sectors_scanned, total_sectors, phase);
    }

    pub fn emit_final(&self, percent: f64, sectors_scanned: u64, total_sectors: u64, phase: &str) {
        self.sink
            .emit_final(percent, sectors_scanned, total_sectors, phase);
    }
}

/// Common surface for the metadata parsers and the carver.
pub trait Scanner {
    fn name(&self) -> &'static str;

    /// Runs to completion or until the cancel flag is observed, pushing
    /// records through the context as they are found.
    fn run(&self, ctx: &mut ScanContext) -> Result<ScanStats>;
}
