//! GPU-context-bound render worker.
//!
//! A worker thread blocks once at startup on the phase-2 context handoff,
//! then services render jobs until closed. Dependency resolution is
//! recursive: connected inputs resolve upstream first, consulting the shared
//! shader and decoder caches. Cancellation is cooperative, checked before a
//! job starts and before recursing into each node, never at arbitrary
//! instruction boundaries.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::graph::{NodeDependency, NodeGraph};
use crate::media;
use crate::model::{
    AudioParams, Frame, FramePtr, NodeValue, SampleBuffer, SampleBufferPtr, ValueDatabase,
    ValueTable, ValueType, VideoParams,
};
use crate::render::context::PendingContext;
use crate::render::decoder_cache::DecoderCache;
use crate::render::pool::PoolEvent;
use crate::render::shader_cache::{ShaderCache, ShaderProgram};
use crate::util::timing::ScopedTimer;

/// How long a worker waits at a merge point for a sibling result before
/// falling back to resolving the subtree inline.
const SIBLING_MERGE_TIMEOUT: Duration = Duration::from_secs(2);

/// Finished payload of a completed job.
#[derive(Clone, Debug)]
pub enum RenderPayload {
    Frame(FramePtr),
    Samples(SampleBufferPtr),
}

#[derive(Debug)]
pub enum JobOutcome {
    Rendered(RenderPayload),
    Failed(String),
    Cancelled,
}

/// Completion message delivered to the issuing task.
#[derive(Debug)]
pub struct JobResult {
    pub dep: NodeDependency,
    pub digest: u64,
    /// Edit epoch snapshot taken when the job was issued.
    pub epoch: u64,
    pub outcome: JobOutcome,
}

pub struct RenderJob {
    pub dep: NodeDependency,
    pub epoch: u64,
    pub cancel: Arc<AtomicBool>,
    pub result_tx: Sender<JobResult>,
}

pub(crate) enum WorkerMessage {
    Render(RenderJob),
    RenderAsSibling {
        dep: NodeDependency,
        cancel: Arc<AtomicBool>,
        reply: Sender<Result<ValueTable, String>>,
    },
    Close,
}

/// Worker-to-coordinator signal.
pub(crate) enum WorkerEvent {
    Ready(usize),
    InitFailed(usize),
    Finished(usize),
    SiblingRequested {
        dep: NodeDependency,
        cancel: Arc<AtomicBool>,
        reply: Sender<Result<ValueTable, String>>,
    },
}

/// State shared between all workers of a pool.
#[derive(Clone)]
pub(crate) struct WorkerShared {
    pub graph: Arc<RwLock<NodeGraph>>,
    pub shader_cache: Arc<ShaderCache>,
    pub decoder_cache: Arc<DecoderCache>,
    pub video_params: VideoParams,
    pub audio_params: AudioParams,
    /// Advisory count of idle available siblings, maintained by the
    /// coordinator; nonzero is the precondition for offloading.
    pub idle_hint: Arc<AtomicUsize>,
    pub events: Sender<PoolEvent>,
}

enum ResolveStop {
    Cancelled,
    Failed(String),
}

pub(crate) fn worker_main(
    index: usize,
    ctx_rx: Receiver<PendingContext>,
    msg_rx: Receiver<WorkerMessage>,
    available: Arc<AtomicBool>,
    shared: WorkerShared,
) {
    // Phase-2 handshake: the context arrives from the controlling thread
    // exactly once. Until then this worker is unavailable and must never be
    // dispatched to.
    let pending = match ctx_rx.recv() {
        Ok(pending) => pending,
        Err(_) => {
            debug!("worker {} shut down before context handoff", index);
            return;
        }
    };
    let _ctx = match pending.finish(shared.video_params) {
        Ok(ctx) => ctx,
        Err(err) => {
            // Permanent: the pool continues at reduced capacity.
            error!("worker {} context init failed: {}", index, err);
            let _ = shared
                .events
                .send(PoolEvent::Worker(WorkerEvent::InitFailed(index)));
            return;
        }
    };
    available.store(true, Ordering::Release);
    let _ = shared.events.send(PoolEvent::Worker(WorkerEvent::Ready(index)));
    info!("worker {} ready", index);

    while let Ok(message) = msg_rx.recv() {
        match message {
            WorkerMessage::Render(job) => {
                run_job(index, job, &shared);
                let _ = shared
                    .events
                    .send(PoolEvent::Worker(WorkerEvent::Finished(index)));
            }
            WorkerMessage::RenderAsSibling { dep, cancel, reply } => {
                debug!("worker {} rendering sibling dependency {:?}", index, dep);
                let graph = shared.graph.read().unwrap();
                // Siblings resolve inline; offload chains never recurse.
                let result = resolve_node(&graph, &dep, &cancel, false, &shared);
                drop(graph);
                let _ = reply.send(result.map_err(|stop| match stop {
                    ResolveStop::Cancelled => "cancelled".to_string(),
                    ResolveStop::Failed(err) => err,
                }));
                let _ = shared
                    .events
                    .send(PoolEvent::Worker(WorkerEvent::Finished(index)));
            }
            WorkerMessage::Close => break,
        }
    }

    available.store(false, Ordering::Release);
    debug!("worker {} closed", index);
}

fn run_job(index: usize, job: RenderJob, shared: &WorkerShared) {
    if job.cancel.load(Ordering::Acquire) {
        let _ = job.result_tx.send(JobResult {
            dep: job.dep,
            digest: 0,
            epoch: job.epoch,
            outcome: JobOutcome::Cancelled,
        });
        return;
    }

    let _timer = ScopedTimer::debug_lazy(|| {
        format!(
            "worker {} render {} @ {}",
            index,
            job.dep.output,
            job.dep.time()
        )
    });

    let graph = shared.graph.read().unwrap();
    let digest = match graph.hash_dependency(&job.dep) {
        Ok(digest) => digest,
        Err(err) => {
            let _ = job.result_tx.send(JobResult {
                dep: job.dep,
                digest: 0,
                epoch: job.epoch,
                outcome: JobOutcome::Failed(err.to_string()),
            });
            return;
        }
    };

    let outcome = match resolve_node(&graph, &job.dep, &job.cancel, true, shared) {
        Ok(table) => match payload_from_table(&table)
            .or_else(|| empty_payload(&graph, &job.dep, shared))
        {
            Some(payload) => JobOutcome::Rendered(payload),
            None => JobOutcome::Failed(format!(
                "dependency {}.{} produced no renderable output",
                job.dep.node, job.dep.output
            )),
        },
        Err(ResolveStop::Cancelled) => JobOutcome::Cancelled,
        Err(ResolveStop::Failed(err)) => {
            warn!("worker {} job failed: {}", index, err);
            JobOutcome::Failed(err)
        }
    };
    drop(graph);

    let _ = job.result_tx.send(JobResult {
        dep: job.dep,
        digest,
        epoch: job.epoch,
        outcome,
    });
}

/// What an empty timeline renders to: a blank frame or a silent region,
/// depending on the requested output's type.
fn empty_payload(
    graph: &NodeGraph,
    dep: &NodeDependency,
    shared: &WorkerShared,
) -> Option<RenderPayload> {
    let output_type = graph
        .node(dep.node)?
        .ports()
        .output(&dep.output)?
        .value_type;
    match output_type {
        ValueType::Texture => Some(RenderPayload::Frame(Arc::new(Frame::blank(
            shared.video_params.width,
            shared.video_params.height,
        )))),
        ValueType::Samples => Some(RenderPayload::Samples(Arc::new(SampleBuffer::silence(
            shared.audio_params,
            dep.range,
        )))),
        _ => None,
    }
}

fn payload_from_table(table: &ValueTable) -> Option<RenderPayload> {
    if let Some(NodeValue::Texture(frame)) = table.take_type(ValueType::Texture) {
        return Some(RenderPayload::Frame(frame));
    }
    if let Some(NodeValue::Samples(samples)) = table.take_type(ValueType::Samples) {
        return Some(RenderPayload::Samples(samples));
    }
    None
}

enum Slot {
    Done(NodeValue),
    Offloaded {
        reply: Receiver<Result<ValueTable, String>>,
        dep: NodeDependency,
    },
}

/// Recursively resolve one dependency into a value table.
fn resolve_node(
    graph: &NodeGraph,
    dep: &NodeDependency,
    cancel: &Arc<AtomicBool>,
    allow_offload: bool,
    shared: &WorkerShared,
) -> Result<ValueTable, ResolveStop> {
    if cancel.load(Ordering::Acquire) {
        return Err(ResolveStop::Cancelled);
    }

    let node = graph
        .node(dep.node)
        .ok_or_else(|| ResolveStop::Failed(format!("node {} not found", dep.node)))?;

    // Decoder-backed nodes short-circuit into the shared decoder cache.
    if let Some(source) = node.footage_source() {
        let decoder = shared
            .decoder_cache
            .get_or_create(source, || media::open_source(source))
            .map_err(|err| ResolveStop::Failed(err.to_string()))?;
        let value = match dep.output.as_str() {
            crate::nodes::footage::SAMPLES_OUT => NodeValue::Samples(
                decoder
                    .decode_audio(dep.range, &shared.audio_params)
                    .map_err(|err| ResolveStop::Failed(err.to_string()))?,
            ),
            _ => NodeValue::Texture(
                decoder
                    .decode_frame(dep.time(), &shared.video_params)
                    .map_err(|err| ResolveStop::Failed(err.to_string()))?,
            ),
        };
        return Ok(ValueTable::single(value));
    }

    let time = dep.time();
    let mut db = ValueDatabase::new();

    for input in &node.ports().inputs {
        // Inputs the requested output never reads are not resolved at all.
        if !node.output_consumes(&dep.output, &input.name) {
            continue;
        }
        let conns: Vec<crate::graph::OutputRef> = graph
            .connections_to_input(dep.node, &input.name)
            .into_iter()
            .map(|c| c.from.clone())
            .collect();

        if conns.is_empty() {
            if !matches!(input.value, NodeValue::None) {
                db.insert(&input.name, ValueTable::single(input.value.clone()));
            }
            continue;
        }

        let sub_time = node.input_time(&input.name, time);
        let delta = sub_time - time;
        let mut slots = Vec::with_capacity(conns.len());

        for from in conns {
            let upstream = graph
                .node(from.node)
                .ok_or_else(|| ResolveStop::Failed(format!("node {} not found", from.node)))?;

            // Blocks outside the requested time contribute nothing; keep a
            // placeholder so element order survives.
            if let Some(block) = upstream.block_range() {
                if !block.contains(time) {
                    slots.push(Slot::Done(NodeValue::None));
                    continue;
                }
            }

            let sub_dep =
                NodeDependency::new(from.node, &from.output, dep.range.shifted(delta));

            if allow_offload
                && upstream.offload_hint()
                && shared.idle_hint.load(Ordering::Acquire) > 0
            {
                // Hand the subtree to an idle sibling and keep resolving the
                // remaining inputs; the reply joins at the merge point.
                let (reply_tx, reply_rx) = channel();
                let sent = shared.events.send(PoolEvent::Worker(
                    WorkerEvent::SiblingRequested {
                        dep: sub_dep.clone(),
                        cancel: Arc::clone(cancel),
                        reply: reply_tx,
                    },
                ));
                if sent.is_ok() {
                    slots.push(Slot::Offloaded {
                        reply: reply_rx,
                        dep: sub_dep,
                    });
                    continue;
                }
            }

            let table = resolve_node(graph, &sub_dep, cancel, allow_offload, shared)?;
            slots.push(Slot::Done(table.primary()));
        }

        let mut table = ValueTable::new();
        for slot in slots {
            match slot {
                Slot::Done(value) => table.push(value),
                Slot::Offloaded { reply, dep: sub_dep } => {
                    match reply.recv_timeout(SIBLING_MERGE_TIMEOUT) {
                        Ok(Ok(sub_table)) => table.push(sub_table.primary()),
                        Ok(Err(err)) => return Err(ResolveStop::Failed(err)),
                        Err(_) => {
                            // No sibling picked the request up in time;
                            // resolve inline instead of stalling the job.
                            debug!("sibling request timed out, resolving inline");
                            let sub_table =
                                resolve_node(graph, &sub_dep, cancel, false, shared)?;
                            table.push(sub_table.primary());
                        }
                    }
                }
            }
        }
        db.insert(&input.name, table);
    }

    // Shader-capable nodes go through the shared program cache before the
    // value path runs.
    if let Some(code) = node.shader_code(node.type_id()) {
        shared
            .shader_cache
            .get_or_create(node.type_id(), || {
                let mut digest = crate::graph::Digest::new();
                digest.write_str(&code.source);
                Ok(ShaderProgram {
                    node_type: code.id.clone(),
                    source_hash: digest.finish(),
                })
            })
            .map_err(|err| ResolveStop::Failed(err.to_string()))?;
    }

    node.value(&dep.output, &db, time)
        .map_err(|err| ResolveStop::Failed(err.to_string()))
}
