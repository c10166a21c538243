//! Render worker pool.
//!
//! The pool spawns its worker threads immediately, but each worker stays
//! unavailable until `init_worker` runs on the controlling thread: phase 1
//! creates a sibling context there, phase 2 completes on the worker thread
//! after the handoff. A worker whose handoff never happens simply never
//! becomes available; the pool keeps running with the workers that did.
//!
//! A single coordinator thread owns dispatch: it tracks which workers are
//! idle, queues jobs when none are, and services sibling hand-off requests
//! ahead of queued jobs so a blocked requester unblocks as soon as any
//! worker frees up.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};

use crate::error::LibraryError;
use crate::graph::{NodeDependency, NodeGraph};
use crate::model::{AudioParams, VideoParams};
use crate::render::context::{PendingContext, SharedContext};
use crate::render::decoder_cache::DecoderCache;
use crate::render::shader_cache::ShaderCache;
use crate::render::worker::{
    JobResult, RenderJob, WorkerEvent, WorkerMessage, WorkerShared, worker_main,
};

#[derive(Clone, Copy, Debug)]
pub struct PoolConfig {
    pub worker_count: usize,
    pub video_params: VideoParams,
    pub audio_params: AudioParams,
}

pub(crate) enum PoolEvent {
    Dispatch(RenderJob),
    Worker(WorkerEvent),
    Shutdown,
}

struct WorkerHandle {
    thread: Option<JoinHandle<()>>,
    /// Consumed by `init_worker`; dropping it without sending lets the
    /// worker thread exit at shutdown.
    ctx_tx: Option<Sender<PendingContext>>,
    available: Arc<AtomicBool>,
}

pub struct RendererPool {
    config: PoolConfig,
    shader_cache: Arc<ShaderCache>,
    decoder_cache: Arc<DecoderCache>,
    workers: Vec<WorkerHandle>,
    coordinator: Option<JoinHandle<()>>,
    events_tx: Sender<PoolEvent>,
    init_failed: Arc<AtomicUsize>,
    sibling_requests: Arc<AtomicU64>,
    closed: AtomicBool,
}

impl RendererPool {
    pub fn new(graph: Arc<RwLock<NodeGraph>>, config: PoolConfig) -> Self {
        let shader_cache = Arc::new(ShaderCache::new());
        let decoder_cache = Arc::new(DecoderCache::new());
        let idle_hint = Arc::new(AtomicUsize::new(0));
        let init_failed = Arc::new(AtomicUsize::new(0));
        let sibling_requests = Arc::new(AtomicU64::new(0));
        let (events_tx, events_rx) = channel();

        let mut workers = Vec::with_capacity(config.worker_count);
        let mut msg_txs = Vec::with_capacity(config.worker_count);
        for index in 0..config.worker_count {
            let (ctx_tx, ctx_rx) = channel();
            let (msg_tx, msg_rx) = channel();
            let available = Arc::new(AtomicBool::new(false));
            let shared = WorkerShared {
                graph: Arc::clone(&graph),
                shader_cache: Arc::clone(&shader_cache),
                decoder_cache: Arc::clone(&decoder_cache),
                video_params: config.video_params,
                audio_params: config.audio_params,
                idle_hint: Arc::clone(&idle_hint),
                events: events_tx.clone(),
            };
            let worker_available = Arc::clone(&available);
            let thread = thread::Builder::new()
                .name(format!("render-worker-{}", index))
                .spawn(move || worker_main(index, ctx_rx, msg_rx, worker_available, shared))
                .expect("failed to spawn render worker");
            workers.push(WorkerHandle {
                thread: Some(thread),
                ctx_tx: Some(ctx_tx),
                available,
            });
            msg_txs.push(msg_tx);
        }

        let coord_idle_hint = Arc::clone(&idle_hint);
        let coord_failed = Arc::clone(&init_failed);
        let coord_siblings = Arc::clone(&sibling_requests);
        let coordinator = thread::Builder::new()
            .name("render-coordinator".to_string())
            .spawn(move || {
                coordinator_main(events_rx, msg_txs, coord_idle_hint, coord_failed, coord_siblings)
            })
            .expect("failed to spawn render coordinator");

        info!("renderer pool created with {} workers", config.worker_count);
        Self {
            config,
            shader_cache,
            decoder_cache,
            workers,
            coordinator: Some(coordinator),
            events_tx,
            init_failed,
            sibling_requests,
            closed: AtomicBool::new(false),
        }
    }

    /// Run phase 1 for one worker on the calling thread and hand the pending
    /// context over. Returns false if this worker was already initialized.
    pub fn init_worker(&mut self, index: usize, shared_ctx: &SharedContext) -> bool {
        let Some(handle) = self.workers.get_mut(index) else {
            return false;
        };
        let Some(ctx_tx) = handle.ctx_tx.take() else {
            return false;
        };
        let pending = shared_ctx.create_sibling();
        if ctx_tx.send(pending).is_err() {
            error!("worker {} exited before context handoff", index);
            self.init_failed.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    /// Initialize every worker against one shared context.
    pub fn init_workers(&mut self, shared_ctx: &SharedContext) {
        for index in 0..self.workers.len() {
            self.init_worker(index, shared_ctx);
        }
    }

    /// Workers that completed phase 2 and are accepting jobs.
    pub fn available_workers(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| w.available.load(Ordering::Acquire))
            .count()
    }

    /// False once every worker has permanently failed, or after shutdown.
    pub fn is_operational(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
            && self.config.worker_count > 0
            && self.init_failed.load(Ordering::Relaxed) < self.config.worker_count
    }

    /// Queue one dependency for rendering. The completion lands on
    /// `result_tx`; `epoch` is echoed back so the issuer can reject stale
    /// results.
    pub fn dispatch(
        &self,
        dep: NodeDependency,
        epoch: u64,
        cancel: Arc<AtomicBool>,
        result_tx: Sender<JobResult>,
    ) -> Result<(), LibraryError> {
        if !self.is_operational() {
            return Err(LibraryError::render("no live render workers"));
        }
        let job = RenderJob {
            dep,
            epoch,
            cancel,
            result_tx,
        };
        self.events_tx
            .send(PoolEvent::Dispatch(job))
            .map_err(|_| LibraryError::render("render coordinator is gone"))
    }

    pub fn shader_cache(&self) -> &Arc<ShaderCache> {
        &self.shader_cache
    }

    pub fn decoder_cache(&self) -> &Arc<DecoderCache> {
        &self.decoder_cache
    }

    /// Number of sibling hand-offs requested so far.
    pub fn sibling_requests(&self) -> u64 {
        self.sibling_requests.load(Ordering::Relaxed)
    }

    pub fn shutdown(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.events_tx.send(PoolEvent::Shutdown);
        if let Some(coordinator) = self.coordinator.take() {
            let _ = coordinator.join();
        }
        for handle in &mut self.workers {
            // Unblocks workers still waiting on a handoff.
            handle.ctx_tx = None;
            if let Some(thread) = handle.thread.take() {
                let _ = thread.join();
            }
        }
        debug!("renderer pool shut down");
    }
}

impl Drop for RendererPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

enum Queued {
    Job(RenderJob),
    Sibling {
        dep: NodeDependency,
        cancel: Arc<AtomicBool>,
        reply: Sender<Result<crate::model::ValueTable, String>>,
    },
}

fn coordinator_main(
    events_rx: Receiver<PoolEvent>,
    msg_txs: Vec<Sender<WorkerMessage>>,
    idle_hint: Arc<AtomicUsize>,
    init_failed: Arc<AtomicUsize>,
    sibling_requests: Arc<AtomicU64>,
) {
    let mut idle: VecDeque<usize> = VecDeque::new();
    let mut dead: HashSet<usize> = HashSet::new();
    let mut queue: VecDeque<Queued> = VecDeque::new();

    while let Ok(event) = events_rx.recv() {
        match event {
            PoolEvent::Dispatch(job) => {
                queue.push_back(Queued::Job(job));
            }
            PoolEvent::Worker(WorkerEvent::Ready(index)) => {
                idle.push_back(index);
            }
            PoolEvent::Worker(WorkerEvent::InitFailed(index)) => {
                dead.insert(index);
                init_failed.fetch_add(1, Ordering::Relaxed);
            }
            PoolEvent::Worker(WorkerEvent::Finished(index)) => {
                if !dead.contains(&index) {
                    idle.push_back(index);
                }
            }
            PoolEvent::Worker(WorkerEvent::SiblingRequested { dep, cancel, reply }) => {
                sibling_requests.fetch_add(1, Ordering::Relaxed);
                // Ahead of regular jobs: a requester is blocked on this.
                queue.push_front(Queued::Sibling { dep, cancel, reply });
            }
            PoolEvent::Shutdown => {
                for msg_tx in &msg_txs {
                    let _ = msg_tx.send(WorkerMessage::Close);
                }
                break;
            }
        }

        // Pair queued work with idle workers.
        while !queue.is_empty() {
            let Some(index) = idle.pop_front() else { break };
            let message = match queue.pop_front() {
                Some(Queued::Job(job)) => WorkerMessage::Render(job),
                Some(Queued::Sibling { dep, cancel, reply }) => {
                    WorkerMessage::RenderAsSibling { dep, cancel, reply }
                }
                None => break,
            };
            if let Err(err) = msg_txs[index].send(message) {
                warn!("worker {} unreachable, requeueing job", index);
                dead.insert(index);
                queue.push_front(match err.0 {
                    WorkerMessage::Render(job) => Queued::Job(job),
                    WorkerMessage::RenderAsSibling { dep, cancel, reply } => {
                        Queued::Sibling { dep, cancel, reply }
                    }
                    WorkerMessage::Close => break,
                });
            }
        }
        idle_hint.store(idle.len(), Ordering::Release);
    }
}
