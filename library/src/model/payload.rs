//! Rendered payloads: image frames and decoded audio regions.

use std::sync::Arc;

use crate::model::params::AudioParams;
use crate::model::time::TimeRange;

pub type FramePtr = Arc<Frame>;
pub type SampleBufferPtr = Arc<SampleBuffer>;

/// A rendered image plane, RGBA8.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), (width * height * 4) as usize);
        Self {
            width,
            height,
            data,
        }
    }

    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; (width * height * 4) as usize],
        }
    }

    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data,
        }
    }
}

/// A decoded audio region, interleaved f32 samples.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBuffer {
    pub params: AudioParams,
    pub range: TimeRange,
    pub data: Vec<f32>,
}

impl SampleBuffer {
    pub fn silence(params: AudioParams, range: TimeRange) -> Self {
        let data = vec![0.0; params.samples_in(range.length())];
        Self {
            params,
            range,
            data,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.data.len() / self.params.channels.max(1) as usize
    }
}
