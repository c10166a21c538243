//! Built-in node types.

pub mod clip;
pub mod footage;
pub mod merge;
pub mod sequence;
pub mod track;

pub use clip::ClipNode;
pub use footage::FootageNode;
pub use merge::MergeNode;
pub use sequence::{Marker, Sequence, Track, TrackList, TrackType, WaveformMap, WaveformRegion};
pub use track::TrackNode;

use crate::graph::NodeRegistry;
use crate::model::Frame;

/// Register every built-in node type with its stable type id.
pub fn register_builtins(registry: &mut NodeRegistry) {
    registry.register(merge::MergeNode::ID, || Box::new(MergeNode::new()));
    registry.register(footage::FootageNode::ID, || Box::new(FootageNode::new()));
    registry.register(clip::ClipNode::ID, || Box::new(ClipNode::new()));
    registry.register(track::TrackNode::ID, || Box::new(TrackNode::new()));
    registry.register(sequence::Sequence::ID, || Box::new(Sequence::new()));
}

/// Straight-alpha source-over composite, the host path shared by merge and
/// sequence stacking.
pub(crate) fn blend_over(base: &Frame, over: &Frame) -> Frame {
    if base.width != over.width || base.height != over.height {
        // Mismatched planes keep the base; sizing is the caller's concern.
        return base.clone();
    }
    let mut out = base.clone();
    for (dst, src) in out.data.chunks_exact_mut(4).zip(over.data.chunks_exact(4)) {
        let sa = src[3] as f32 / 255.0;
        for c in 0..3 {
            let blended = src[c] as f32 * sa + dst[c] as f32 * (1.0 - sa);
            dst[c] = blended.round().clamp(0.0, 255.0) as u8;
        }
        let da = dst[3] as f32 / 255.0;
        dst[3] = ((sa + da * (1.0 - sa)) * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opaque_over_replaces_base() {
        let base = Frame::solid(2, 2, [10, 20, 30, 255]);
        let over = Frame::solid(2, 2, [200, 100, 50, 255]);
        let out = blend_over(&base, &over);
        assert_eq!(&out.data[0..4], &[200, 100, 50, 255]);
    }

    #[test]
    fn test_transparent_over_keeps_base() {
        let base = Frame::solid(2, 2, [10, 20, 30, 255]);
        let over = Frame::solid(2, 2, [200, 100, 50, 0]);
        let out = blend_over(&base, &over);
        assert_eq!(&out.data[0..4], &[10, 20, 30, 255]);
    }
}
