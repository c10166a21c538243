pub mod params;
pub mod payload;
pub mod time;
pub mod value;

pub use params::{AudioParams, VideoParams};
pub use payload::{Frame, FramePtr, SampleBuffer, SampleBufferPtr};
pub use time::TimeRange;
pub use value::{NodeValue, ValueDatabase, ValueTable, ValueType};
