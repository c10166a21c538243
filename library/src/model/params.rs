use serde::{Deserialize, Serialize};

/// Video rendering parameters shared by the pool's workers.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct VideoParams {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
}

impl VideoParams {
    pub fn new(width: u32, height: u32, frame_rate: f64) -> Self {
        Self {
            width,
            height,
            frame_rate,
        }
    }

    pub fn frame_duration(&self) -> f64 {
        1.0 / self.frame_rate
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.frame_rate > 0.0
    }
}

impl Default for VideoParams {
    fn default() -> Self {
        Self::new(1920, 1080, 30.0)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct AudioParams {
    pub sample_rate: u32,
    pub channels: u32,
}

impl AudioParams {
    pub fn new(sample_rate: u32, channels: u32) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn samples_in(&self, seconds: f64) -> usize {
        (seconds * self.sample_rate as f64).round() as usize * self.channels as usize
    }
}

impl Default for AudioParams {
    fn default() -> Self {
        Self::new(48000, 2)
    }
}
