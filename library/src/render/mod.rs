//! Rendering backend: worker pool, GPU context lifecycle, and the shared
//! shader/decoder caches.

pub mod context;
pub mod decoder_cache;
pub mod pool;
pub mod shader_cache;
pub mod worker;

pub use context::{PendingContext, RenderContext, SharedContext};
pub use decoder_cache::DecoderCache;
pub use pool::{PoolConfig, RendererPool};
pub use shader_cache::{ShaderCache, ShaderCode, ShaderProgram};
pub use worker::{JobOutcome, JobResult, RenderJob, RenderPayload};
