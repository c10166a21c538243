pub mod dependency;
pub mod digest;
#[allow(clippy::module_inception)]
pub mod graph;
pub mod node;
pub mod registry;

pub use dependency::NodeDependency;
pub use digest::Digest;
pub use graph::{GraphError, GraphEvent, NodeGraph};
pub use node::{Connection, Input, InputFlags, InputRef, Node, Output, OutputRef, Ports};
pub use registry::{NodeRegistry, save_node};
