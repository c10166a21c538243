//! Pre-render a span of frames into a digest-keyed store.
//!
//! The store is keyed by content digest, not by time: two frames whose
//! upstream content hashes identically share one entry, and an edit that
//! changes the digest naturally misses the old entries without any explicit
//! eviction.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};

use log::info;
use uuid::Uuid;

use crate::error::LibraryError;
use crate::graph::NodeGraph;
use crate::model::{FramePtr, SampleBufferPtr, TimeRange, VideoParams};
use crate::render::pool::RendererPool;
use crate::task::{RenderSink, RenderTask, TaskState};

pub struct PreCacheTask {
    inner: RenderTask,
    frames: HashMap<u64, FramePtr>,
}

impl PreCacheTask {
    /// Caches `output` of `node` at every frame boundary inside `range`.
    pub fn new(
        graph: Arc<RwLock<NodeGraph>>,
        node: Uuid,
        output: &str,
        range: TimeRange,
        params: &VideoParams,
    ) -> Self {
        let step = params.frame_duration();
        let mut times = Vec::new();
        let mut time = range.start;
        while time < range.end {
            times.push(time);
            time += step;
        }
        Self {
            inner: RenderTask::new(graph, node, output, times),
            frames: HashMap::new(),
        }
    }

    pub fn state(&self) -> TaskState {
        self.inner.state()
    }

    /// Flag an outside owner can set to stop the task. Checked before every
    /// dispatch and inside in-flight jobs.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.inner.cancel_flag()
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn run(&mut self, pool: &RendererPool) -> Result<TaskState, LibraryError> {
        let mut sink = StoreSink {
            frames: &mut self.frames,
        };
        let state = self.inner.run(pool, &mut sink)?;
        info!(
            "precache {:?}: {} frames cached, {} failed",
            state,
            self.frames.len(),
            self.inner.failures().len()
        );
        Ok(state)
    }

    pub fn frame(&self, digest: u64) -> Option<&FramePtr> {
        self.frames.get(&digest)
    }

    pub fn cached_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn failures(&self) -> &[(f64, String)] {
        self.inner.failures()
    }

    pub fn wasted(&self) -> u64 {
        self.inner.wasted()
    }
}

struct StoreSink<'a> {
    frames: &'a mut HashMap<u64, FramePtr>,
}

impl RenderSink for StoreSink<'_> {
    fn frame_ready(&mut self, _time: f64, digest: u64, frame: FramePtr) {
        self.frames.insert(digest, frame);
    }

    fn audio_ready(&mut self, _range: TimeRange, _digest: u64, _samples: SampleBufferPtr) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_times_cover_range() {
        let graph = Arc::new(RwLock::new(NodeGraph::new()));
        let params = VideoParams::new(8, 8, 4.0);
        let task = PreCacheTask::new(
            graph,
            Uuid::new_v4(),
            "texture",
            TimeRange::new(0.0, 1.0),
            &params,
        );
        // 4 fps over one second.
        assert_eq!(task.inner.times.len(), 4);
        assert_eq!(task.inner.times[0], 0.0);
        assert_eq!(task.inner.times[3], 0.75);
    }
}
