use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{Receiver, Sender};
use log::debug;
use parking_lot::Mutex;

use crate::scene::mesh::Mesh;

use super::normals::{CancelToken, NormalSolver, SolveOutcome};

/// One normal-recompute request. The worker snapshots the mesh under its
/// lock, solves on the copy, and swaps the result back under the lock —
/// the shared mesh is always either fully old or fully new.
pub struct RecomputeJob {
    pub mesh: Arc<Mutex<Mesh>>,
    pub threshold_angle_degrees: f32,
    pub token: CancelToken,
}

pub struct JobOutcome {
    pub outcome: SolveOutcome,
    pub threshold_angle_degrees: f32,
}

fn worker_loop(job_rx: Receiver<RecomputeJob>, outcome_tx: Sender<JobOutcome>) {
    while let Ok(job) = job_rx.recv() {
        let mut scratch = job.mesh.lock().clone();
        let mut solver = NormalSolver::new(&scratch);
        let outcome =
            solver.compute_cancellable(&mut scratch, job.threshold_angle_degrees, &job.token);
        match outcome {
            SolveOutcome::Done => {
                *job.mesh.lock() = scratch;
            }
            SolveOutcome::Cancelled => {
                debug!(
                    "dropping cancelled recompute at {} degrees",
                    job.threshold_angle_degrees
                );
            }
        }
        if outcome_tx
            .send(JobOutcome {
                outcome,
                threshold_angle_degrees: job.threshold_angle_degrees,
            })
            .is_err()
        {
            break;
        }
    }
}

/// Off-thread normal recompute, so a slider drag never blocks the UI
/// thread. Submitting a new job cancels whatever is still in flight.
pub struct NormalWorker {
    handle: Option<JoinHandle<()>>,
    job_tx: Option<Sender<RecomputeJob>>,
    active_token: Option<CancelToken>,
}

impl NormalWorker {
    pub fn spawn() -> (Self, Receiver<JobOutcome>) {
        let (job_tx, job_rx) = crossbeam::channel::unbounded::<RecomputeJob>();
        let (outcome_tx, outcome_rx) = crossbeam::channel::unbounded::<JobOutcome>();
        let handle = std::thread::spawn(move || worker_loop(job_rx, outcome_tx));
        (
            Self {
                handle: Some(handle),
                job_tx: Some(job_tx),
                active_token: None,
            },
            outcome_rx,
        )
    }

    /// Queue a recompute. The returned token cancels this job; it is also
    /// cancelled automatically by the next `submit`.
    pub fn submit(&mut self, mesh: Arc<Mutex<Mesh>>, threshold_angle_degrees: f32) -> CancelToken {
        if let Some(previous) = self.active_token.take() {
            previous.cancel();
        }
        let token = CancelToken::new();
        self.active_token = Some(token.clone());
        let job = RecomputeJob {
            mesh,
            threshold_angle_degrees,
            token: token.clone(),
        };
        if let Some(tx) = &self.job_tx {
            if tx.send(job).is_err() {
                log::warn!("normal worker thread is gone, dropping job");
            }
        }
        token
    }
}

impl Drop for NormalWorker {
    fn drop(&mut self) {
        if let Some(token) = self.active_token.take() {
            token.cancel();
        }
        // closing the channel ends the worker loop
        self.job_tx = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
