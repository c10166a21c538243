//! Values flowing through the data-flow graph.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::payload::{Frame, SampleBuffer};

/// Data type carried by a pin (Blender-style socket type).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// No value; placeholder for untyped array inputs
    None,
    /// Image/texture data flow
    Texture,
    /// Decoded audio samples
    Samples,
    /// Floating point scalar (f64)
    Scalar,
    /// Integer value (i64)
    Integer,
    /// Boolean value
    Boolean,
    /// RGBA color
    Color,
    /// Text string
    String,
    /// Media source reference (footage)
    Footage,
    /// Accepts any type (generic)
    Any,
}

impl ValueType {
    /// Connection compatibility check used at connect-time.
    pub fn accepts(&self, other: ValueType) -> bool {
        matches!(self, ValueType::Any | ValueType::None)
            || other == ValueType::Any
            || *self == other
    }
}

/// A value produced by or fed into a node.
#[derive(Clone, Debug, Default)]
pub enum NodeValue {
    #[default]
    None,
    Texture(Arc<Frame>),
    Samples(Arc<SampleBuffer>),
    Scalar(f64),
    Integer(i64),
    Boolean(bool),
    Color([f64; 4]),
    String(String),
    Footage(String),
}

impl NodeValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            NodeValue::None => ValueType::None,
            NodeValue::Texture(_) => ValueType::Texture,
            NodeValue::Samples(_) => ValueType::Samples,
            NodeValue::Scalar(_) => ValueType::Scalar,
            NodeValue::Integer(_) => ValueType::Integer,
            NodeValue::Boolean(_) => ValueType::Boolean,
            NodeValue::Color(_) => ValueType::Color,
            NodeValue::String(_) => ValueType::String,
            NodeValue::Footage(_) => ValueType::Footage,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            NodeValue::Scalar(v) => Some(*v),
            NodeValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_texture(&self) -> Option<&Arc<Frame>> {
        match self {
            NodeValue::Texture(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_samples(&self) -> Option<&Arc<SampleBuffer>> {
        match self {
            NodeValue::Samples(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            NodeValue::String(s) => Some(s),
            NodeValue::Footage(s) => Some(s),
            _ => None,
        }
    }
}

/// Ordered list of values produced for one output.
///
/// Most nodes push a single value, but a table keeps compositing outputs
/// (texture plus metadata) ordered and queryable by type.
#[derive(Clone, Debug, Default)]
pub struct ValueTable {
    values: Vec<NodeValue>,
}

impl ValueTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(value: NodeValue) -> Self {
        Self {
            values: vec![value],
        }
    }

    pub fn push(&mut self, value: NodeValue) {
        self.values.push(value);
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NodeValue> {
        self.values.iter()
    }

    /// Most recently pushed value, the node's primary result.
    pub fn primary(&self) -> NodeValue {
        self.values.last().cloned().unwrap_or_default()
    }

    /// Most recently pushed value of the given type.
    pub fn take_type(&self, ty: ValueType) -> Option<NodeValue> {
        self.values
            .iter()
            .rev()
            .find(|v| v.value_type() == ty)
            .cloned()
    }
}

/// Resolved upstream values keyed by input name, handed to `Node::value`.
#[derive(Clone, Debug, Default)]
pub struct ValueDatabase {
    inputs: HashMap<String, ValueTable>,
}

impl ValueDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, input: &str, table: ValueTable) {
        self.inputs.insert(input.to_string(), table);
    }

    pub fn get(&self, input: &str) -> Option<&ValueTable> {
        self.inputs.get(input)
    }

    pub fn value(&self, input: &str) -> NodeValue {
        self.inputs
            .get(input)
            .map(|t| t.primary())
            .unwrap_or_default()
    }
}
