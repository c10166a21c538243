//! Small demo: build a one-clip sequence and precache its first two seconds.

use std::sync::{Arc, RwLock};

use library::LibraryError;
use library::graph::{InputRef, NodeGraph, OutputRef};
use library::model::{AudioParams, TimeRange, VideoParams};
use library::nodes::{self, ClipNode, FootageNode, Sequence, TrackNode, TrackType};
use library::render::{PoolConfig, RendererPool, SharedContext};
use library::task::{PreCacheTask, TaskState};

fn build_graph() -> Result<(NodeGraph, uuid::Uuid), LibraryError> {
    let mut graph = NodeGraph::new();

    let footage = graph.add_node(Box::new(FootageNode::with_source("demo://bars")));
    let clip = graph.add_node(Box::new(ClipNode::with_timing(0.0, 2.0, 0.0)));
    let track = graph.add_node(Box::new(TrackNode::new()));
    let sequence = graph.add_node(Box::new(Sequence::new()));

    graph.connect(
        OutputRef::new(footage, nodes::footage::TEXTURE_OUT),
        InputRef::new(clip, nodes::clip::BUFFER_IN),
    )?;
    graph.connect(
        OutputRef::new(clip, nodes::clip::BUFFER_OUT),
        InputRef::element(track, nodes::track::CLIPS_IN, 0),
    )?;
    graph.connect(
        OutputRef::new(track, nodes::track::BUFFER_OUT),
        InputRef::element(sequence, &TrackType::Video.input_name(), 0),
    )?;

    Ok((graph, sequence))
}

fn main() -> Result<(), LibraryError> {
    env_logger::init();

    let (graph, sequence) = build_graph()?;
    let graph = Arc::new(RwLock::new(graph));

    let video = VideoParams::new(320, 180, 24.0);
    let audio = AudioParams::new(48_000, 2);
    let mut pool = RendererPool::new(
        Arc::clone(&graph),
        PoolConfig {
            worker_count: 2,
            video_params: video,
            audio_params: audio,
        },
    );
    let shared_ctx = SharedContext::new();
    pool.init_workers(&shared_ctx);

    let length = graph.read().unwrap().sequence_length(sequence);
    println!("sequence length: {} s", length);

    let mut task = PreCacheTask::new(
        Arc::clone(&graph),
        sequence,
        nodes::sequence::TEXTURE_OUT,
        TimeRange::new(0.0, length),
        &video,
    );
    let state = task.run(&pool)?;

    println!(
        "precache {:?}: {} frames cached, {} failed, {} wasted",
        state,
        task.cached_frames(),
        task.failures().len(),
        task.wasted()
    );
    if state == TaskState::Finished {
        println!("sibling hand-offs: {}", pool.sibling_requests());
    }
    Ok(())
}
