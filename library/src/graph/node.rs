//! The node capability contract and its connection points.

use std::any::Any;

use uuid::Uuid;

use crate::error::LibraryError;
use crate::graph::digest::Digest;
use crate::model::{NodeValue, ValueDatabase, ValueTable, ValueType};
use crate::render::shader_cache::ShaderCode;

/// Behavior flags for an input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InputFlags {
    /// Accepts multiple incoming connections, addressed by element index.
    pub array: bool,
    /// Changes arriving through this input do not forward invalidation.
    ///
    /// Used when the input is structurally informative but redundant with a
    /// companion derived signal (a Sequence's raw track-array input versus
    /// its TrackList length signal).
    pub ignore_invalidations: bool,
}

impl InputFlags {
    pub const ARRAY: InputFlags = InputFlags {
        array: true,
        ignore_invalidations: false,
    };

    pub fn with_ignored_invalidations(mut self) -> Self {
        self.ignore_invalidations = true;
        self
    }
}

/// A typed input connection point, owned by exactly one node.
///
/// An unconnected input resolves to its static `value`; for keyed parameters
/// the static value is the parameter.
#[derive(Clone, Debug)]
pub struct Input {
    pub name: String,
    pub value_type: ValueType,
    pub value: NodeValue,
    pub flags: InputFlags,
}

impl Input {
    pub fn new(name: &str, value_type: ValueType) -> Self {
        Self {
            name: name.to_string(),
            value_type,
            value: NodeValue::None,
            flags: InputFlags::default(),
        }
    }

    pub fn array(name: &str, value_type: ValueType) -> Self {
        Self {
            name: name.to_string(),
            value_type,
            value: NodeValue::None,
            flags: InputFlags::ARRAY,
        }
    }

    pub fn with_value(mut self, value: NodeValue) -> Self {
        self.value = value;
        self
    }

    pub fn with_flags(mut self, flags: InputFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// A typed output connection point; may drive many inputs.
#[derive(Clone, Debug)]
pub struct Output {
    pub name: String,
    pub value_type: ValueType,
}

impl Output {
    pub fn new(name: &str, value_type: ValueType) -> Self {
        Self {
            name: name.to_string(),
            value_type,
        }
    }
}

/// Identifies an output on a node in a graph.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OutputRef {
    pub node: Uuid,
    pub output: String,
}

impl OutputRef {
    pub fn new(node: Uuid, output: &str) -> Self {
        Self {
            node,
            output: output.to_string(),
        }
    }
}

/// Identifies an input on a node in a graph; `element` addresses one slot of
/// an array input.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InputRef {
    pub node: Uuid,
    pub input: String,
    pub element: Option<usize>,
}

impl InputRef {
    pub fn new(node: Uuid, input: &str) -> Self {
        Self {
            node,
            input: input.to_string(),
            element: None,
        }
    }

    pub fn element(node: Uuid, input: &str, element: usize) -> Self {
        Self {
            node,
            input: input.to_string(),
            element: Some(element),
        }
    }
}

/// An edge in the graph.
#[derive(Clone, Debug, PartialEq)]
pub struct Connection {
    pub from: OutputRef,
    pub to: InputRef,
}

/// Input/output storage shared by node implementations.
#[derive(Clone, Debug, Default)]
pub struct Ports {
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
}

impl Ports {
    pub fn new(inputs: Vec<Input>, outputs: Vec<Output>) -> Self {
        Self { inputs, outputs }
    }

    pub fn input(&self, name: &str) -> Option<&Input> {
        self.inputs.iter().find(|i| i.name == name)
    }

    pub fn input_mut(&mut self, name: &str) -> Option<&mut Input> {
        self.inputs.iter_mut().find(|i| i.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&Output> {
        self.outputs.iter().find(|o| o.name == name)
    }
}

/// Polymorphic unit of computation in the graph.
///
/// `value` and `hash` are read-only with respect to node state and safe to
/// call concurrently for different (node, time) pairs, which is what lets
/// workers traverse the graph in parallel for disjoint dependencies.
pub trait Node: Send + Sync {
    /// Stable type id, the registry/deserialization key.
    fn type_id(&self) -> &'static str;

    fn name(&self) -> String;

    fn ports(&self) -> &Ports;

    fn ports_mut(&mut self) -> &mut Ports;

    /// Pure evaluation: resolved upstream values in, value table out.
    ///
    /// A failure here is a per-job evaluation failure, never a
    /// cache-poisoning success.
    fn value(
        &self,
        output: &str,
        db: &ValueDatabase,
        time: f64,
    ) -> Result<ValueTable, LibraryError>;

    /// Contribute this node's type id and time-relevant parameters to the
    /// running digest. Must never fail: every parameter has to reduce to a
    /// stable representation.
    fn hash(&self, output: &str, digest: &mut Digest, time: f64) {
        let _ = (output, time);
        digest.write_str(self.type_id());
        for input in &self.ports().inputs {
            digest.write_str(&input.name);
            digest.write_value(&input.value);
        }
    }

    /// GPU-program descriptor for nodes that participate in GPU compositing.
    /// `None` means the node only has a host evaluation path.
    fn shader_code(&self, shader_id: &str) -> Option<ShaderCode> {
        let _ = shader_id;
        None
    }

    /// Media source id for decoder-backed nodes.
    fn footage_source(&self) -> Option<&str> {
        None
    }

    /// Whether evaluating this node is heavy enough that a worker should
    /// consider handing the subtree to an idle sibling.
    fn offload_hint(&self) -> bool {
        false
    }

    /// Timeline span this node contributes to, for nodes that occupy a
    /// bounded block (clips). Evaluation and hashing skip the subtree at
    /// times outside the block, which keeps digests for disjoint times
    /// independent.
    fn block_range(&self) -> Option<crate::model::TimeRange> {
        None
    }

    /// Map an evaluation time to the time requested from the given input's
    /// upstream node. Identity for most nodes; clips shift into media time.
    fn input_time(&self, input: &str, time: f64) -> f64 {
        let _ = input;
        time
    }

    /// Whether evaluating `output` reads `input`. Resolution skips inputs an
    /// output never consumes, so rendering a sequence's audio does not decode
    /// its video tracks.
    fn output_consumes(&self, output: &str, input: &str) -> bool {
        let _ = (output, input);
        true
    }

    /// Independent clone with fresh `Input` objects, never sharing input
    /// identity with the source.
    fn boxed_copy(&self) -> Box<dyn Node>;

    /// Notification that `from_node` was connected into `input`.
    fn input_connected(&mut self, input: &str, element: Option<usize>, from_node: Uuid) {
        let _ = (input, element, from_node);
    }

    fn input_disconnected(&mut self, input: &str, element: Option<usize>, from_node: Uuid) {
        let _ = (input, element, from_node);
    }

    /// Extra persisted state beyond input parameters (Sequence markers).
    fn save_extra(&self) -> Option<serde_json::Value> {
        None
    }

    fn load_extra(&mut self, value: &serde_json::Value) -> Result<(), LibraryError> {
        let _ = value;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
