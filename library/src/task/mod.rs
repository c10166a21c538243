//! Render tasks: issue jobs against a pool, accept completions, and track
//! lifecycle state.
//!
//! Results are matched against what the task still expects. A job carries
//! the edit epoch it was issued under; if the graph was edited after issue,
//! or the same time was reissued under a newer epoch, the earlier completion
//! no longer matches and is dropped as wasted work instead of overwriting
//! fresher output. A failed frame is
//! recorded and the task keeps going; only a pool with no live workers ends
//! a task in `Error`.

pub mod precache;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::channel;
use std::sync::{Arc, RwLock};

use log::{debug, info, warn};
use ordered_float::OrderedFloat;
use uuid::Uuid;

use crate::error::LibraryError;
use crate::graph::{NodeDependency, NodeGraph};
use crate::model::{FramePtr, SampleBufferPtr, TimeRange};
use crate::render::pool::RendererPool;
use crate::render::worker::{JobOutcome, JobResult, RenderPayload};
use crate::util::timing::ScopedTimer;

pub use precache::PreCacheTask;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Finished,
    Cancelled,
    Error,
}

impl TaskState {
    /// Terminal states are sticky; a task never leaves one.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Cancelled | TaskState::Error)
    }
}

/// Receives completed payloads as a task accepts them.
pub trait RenderSink {
    fn frame_ready(&mut self, time: f64, digest: u64, frame: FramePtr);
    fn audio_ready(&mut self, range: TimeRange, digest: u64, samples: SampleBufferPtr);
}

/// Renders one dependency output at a list of times.
pub struct RenderTask {
    graph: Arc<RwLock<NodeGraph>>,
    node: Uuid,
    output: String,
    times: Vec<f64>,
    cancel: Arc<AtomicBool>,
    state: TaskState,
    /// Latest issue epoch per still-outstanding time.
    expected: HashMap<OrderedFloat<f64>, u64>,
    wasted: u64,
    failures: Vec<(f64, String)>,
}

impl RenderTask {
    pub fn new(graph: Arc<RwLock<NodeGraph>>, node: Uuid, output: &str, times: Vec<f64>) -> Self {
        Self {
            graph,
            node,
            output: output.to_string(),
            times,
            cancel: Arc::new(AtomicBool::new(false)),
            state: TaskState::Pending,
            expected: HashMap::new(),
            wasted: 0,
            failures: Vec::new(),
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Shared flag for cancelling from another thread. In-flight jobs see it
    /// at their next check point.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    /// Results that arrived too late to matter.
    pub fn wasted(&self) -> u64 {
        self.wasted
    }

    pub fn failures(&self) -> &[(f64, String)] {
        &self.failures
    }

    /// Whether a completion is still the one this task wants. Stale results
    /// bump the wasted counter and are dropped, including anything issued
    /// before the graph's latest edit.
    fn accept(&mut self, result: &JobResult) -> bool {
        let current = self.graph.read().unwrap().current_epoch();
        if result.epoch < current {
            debug!(
                "dropping result for t={} issued at epoch {}, graph now at {}",
                result.dep.time(),
                result.epoch,
                current
            );
            self.wasted += 1;
            return false;
        }
        let key = OrderedFloat(result.dep.time());
        match self.expected.get(&key) {
            Some(&epoch) if epoch == result.epoch => {
                self.expected.remove(&key);
                true
            }
            Some(_) => {
                debug!(
                    "dropping stale result for t={} (epoch {})",
                    result.dep.time(),
                    result.epoch
                );
                self.wasted += 1;
                false
            }
            None => {
                self.wasted += 1;
                false
            }
        }
    }

    /// Dispatch every requested time and block until all completions are in.
    ///
    /// Refuses to start while a mutation span is open on the graph.
    pub fn run(
        &mut self,
        pool: &RendererPool,
        sink: &mut dyn RenderSink,
    ) -> Result<TaskState, LibraryError> {
        if self.state.is_terminal() {
            return Ok(self.state);
        }
        if self.cancel.load(Ordering::Acquire) {
            self.state = TaskState::Cancelled;
            return Ok(self.state);
        }

        let epoch = self
            .graph
            .read()
            .unwrap()
            .evaluation_epoch()
            .map_err(LibraryError::Graph)?;

        self.state = TaskState::Running;
        let _timer = ScopedTimer::info(format!("render task ({} frames)", self.times.len()));

        let (result_tx, result_rx) = channel();
        let mut outstanding = 0usize;
        let times = std::mem::take(&mut self.times);
        for &time in &times {
            if self.cancel.load(Ordering::Acquire) {
                self.state = TaskState::Cancelled;
                break;
            }
            let dep = NodeDependency::frame(self.node, &self.output, time);
            if let Err(err) = pool.dispatch(
                dep,
                epoch,
                Arc::clone(&self.cancel),
                result_tx.clone(),
            ) {
                warn!("dispatch failed: {}", err);
                self.state = TaskState::Error;
                self.times = times;
                return Err(err);
            }
            self.expected.insert(OrderedFloat(time), epoch);
            outstanding += 1;
        }
        self.times = times;
        // Workers hold the remaining senders; recv unblocks as jobs finish.
        drop(result_tx);

        while outstanding > 0 {
            let result = match result_rx.recv() {
                Ok(result) => result,
                Err(_) => {
                    // Every in-flight sender vanished: the pool died.
                    self.state = TaskState::Error;
                    return Err(LibraryError::task("render pool went away mid-task"));
                }
            };
            outstanding -= 1;
            if !self.accept(&result) {
                continue;
            }
            match result.outcome {
                JobOutcome::Rendered(RenderPayload::Frame(frame)) => {
                    sink.frame_ready(result.dep.time(), result.digest, frame);
                }
                JobOutcome::Rendered(RenderPayload::Samples(samples)) => {
                    sink.audio_ready(result.dep.range, result.digest, samples);
                }
                JobOutcome::Failed(err) => {
                    // One bad frame does not end the task.
                    warn!("frame t={} failed: {}", result.dep.time(), err);
                    self.failures.push((result.dep.time(), err));
                }
                JobOutcome::Cancelled => {}
            }
        }

        if self.cancel.load(Ordering::Acquire) {
            self.state = TaskState::Cancelled;
        } else if self.state == TaskState::Running {
            self.state = TaskState::Finished;
        }
        info!(
            "render task done: {:?}, {} failed, {} wasted",
            self.state,
            self.failures.len(),
            self.wasted
        );
        Ok(self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_at(time: f64, epoch: u64) -> JobResult {
        JobResult {
            dep: NodeDependency::frame(Uuid::new_v4(), "texture", time),
            digest: 1,
            epoch,
            outcome: JobOutcome::Cancelled,
        }
    }

    fn empty_task() -> RenderTask {
        let graph = Arc::new(RwLock::new(NodeGraph::new()));
        RenderTask::new(graph, Uuid::new_v4(), "texture", vec![])
    }

    #[test]
    fn test_reissued_time_rejects_earlier_epoch() {
        let mut task = empty_task();
        // Issued once at epoch 1, then reissued at epoch 2 after an edit.
        task.expected.insert(OrderedFloat(0.5), 2);

        assert!(!task.accept(&result_at(0.5, 1)));
        assert_eq!(task.wasted(), 1);
        // The fresh completion still lands.
        assert!(task.accept(&result_at(0.5, 2)));
        assert_eq!(task.wasted(), 1);
    }

    #[test]
    fn test_edit_after_issue_discards_completion() {
        let mut task = empty_task();
        task.expected.insert(OrderedFloat(0.5), 0);

        // An edit lands while the job is in flight.
        task.graph
            .write()
            .unwrap()
            .invalidate(Uuid::new_v4(), TimeRange::all());

        assert!(!task.accept(&result_at(0.5, 0)));
        assert_eq!(task.wasted(), 1);
        // The time was never satisfied; a reissue under the new epoch lands.
        let epoch = task.graph.read().unwrap().current_epoch();
        task.expected.insert(OrderedFloat(0.5), epoch);
        assert!(task.accept(&result_at(0.5, epoch)));
    }

    #[test]
    fn test_unexpected_time_is_wasted() {
        let mut task = empty_task();
        assert!(!task.accept(&result_at(3.0, 0)));
        assert_eq!(task.wasted(), 1);
    }

    #[test]
    fn test_terminal_state_sticks() {
        let mut task = empty_task();
        task.state = TaskState::Cancelled;
        assert!(task.state().is_terminal());

        let graph = Arc::new(RwLock::new(NodeGraph::new()));
        let pool = RendererPool::new(
            graph,
            crate::render::pool::PoolConfig {
                worker_count: 0,
                video_params: crate::model::VideoParams::new(8, 8, 24.0),
                audio_params: crate::model::AudioParams::new(48_000, 2),
            },
        );
        struct NullSink;
        impl RenderSink for NullSink {
            fn frame_ready(&mut self, _: f64, _: u64, _: FramePtr) {}
            fn audio_ready(&mut self, _: TimeRange, _: u64, _: SampleBufferPtr) {}
        }
        let state = task.run(&pool, &mut NullSink).unwrap();
        assert_eq!(state, TaskState::Cancelled);
    }
}
