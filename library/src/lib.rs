//! Node-graph compositing core: a dependency graph of media nodes, content
//! digests for cache keying, and a pool of context-bound render workers.

pub mod error;
pub mod graph;
pub mod media;
pub mod model;
pub mod nodes;
pub mod render;
pub mod task;
pub mod util;

pub use error::LibraryError;
