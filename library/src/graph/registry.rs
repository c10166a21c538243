//! Type-id-keyed node registry and the persistence round-trip.
//!
//! A node variant must be constructible from its stable type id, and every
//! parameter that participates in `hash` must survive a save/load round
//! trip. Static input values are those parameters.

use std::collections::HashMap;

use serde_json::{Value, json};

use crate::error::LibraryError;
use crate::graph::node::Node;

pub type NodeConstructor = fn() -> Box<dyn Node>;

pub struct NodeRegistry {
    constructors: HashMap<String, NodeConstructor>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registry preloaded with the built-in node types.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::nodes::register_builtins(&mut registry);
        registry
    }

    pub fn register(&mut self, type_id: &str, constructor: NodeConstructor) {
        self.constructors.insert(type_id.to_string(), constructor);
    }

    pub fn create(&self, type_id: &str) -> Option<Box<dyn Node>> {
        self.constructors.get(type_id).map(|ctor| ctor())
    }

    pub fn type_ids(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(|k| k.as_str())
    }

    /// Reconstruct a node from its serialized form.
    pub fn load_node(&self, value: &Value) -> Result<Box<dyn Node>, LibraryError> {
        let type_id = value
            .get("type_id")
            .and_then(Value::as_str)
            .ok_or_else(|| LibraryError::InvalidArgument("missing type_id".into()))?;
        let mut node = self.create(type_id).ok_or_else(|| {
            LibraryError::InvalidArgument(format!("unknown node type {:?}", type_id))
        })?;

        if let Some(inputs) = value.get("inputs").and_then(Value::as_object) {
            for (name, param) in inputs {
                if let Some(input) = node.ports_mut().input_mut(name) {
                    input.value = param_from_json(param)?;
                }
            }
        }
        if let Some(extra) = value.get("extra") {
            node.load_extra(extra)?;
        }
        Ok(node)
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Serialize a node: stable type id, every hash-participating parameter,
/// plus any node-specific metadata sub-block.
pub fn save_node(node: &dyn Node) -> Value {
    let mut inputs = serde_json::Map::new();
    for input in &node.ports().inputs {
        inputs.insert(input.name.clone(), param_to_json(&input.value));
    }
    let mut out = json!({
        "type_id": node.type_id(),
        "inputs": Value::Object(inputs),
    });
    if let Some(extra) = node.save_extra() {
        out["extra"] = extra;
    }
    out
}

fn param_to_json(value: &crate::model::NodeValue) -> Value {
    use crate::model::NodeValue;
    match value {
        NodeValue::None => Value::Null,
        NodeValue::Scalar(v) => json!({ "scalar": v }),
        NodeValue::Integer(v) => json!({ "integer": v }),
        NodeValue::Boolean(v) => json!({ "boolean": v }),
        NodeValue::Color(c) => json!({ "color": c }),
        NodeValue::String(s) => json!({ "string": s }),
        NodeValue::Footage(s) => json!({ "footage": s }),
        // Payloads are runtime-only and never persisted as parameters.
        NodeValue::Texture(_) | NodeValue::Samples(_) => Value::Null,
    }
}

fn param_from_json(value: &Value) -> Result<crate::model::NodeValue, LibraryError> {
    use crate::model::NodeValue;
    if value.is_null() {
        return Ok(NodeValue::None);
    }
    let obj = value
        .as_object()
        .ok_or_else(|| LibraryError::InvalidArgument("malformed parameter".into()))?;
    let (key, inner) = obj
        .iter()
        .next()
        .ok_or_else(|| LibraryError::InvalidArgument("empty parameter".into()))?;
    let parsed = match key.as_str() {
        "scalar" => inner.as_f64().map(NodeValue::Scalar),
        "integer" => inner.as_i64().map(NodeValue::Integer),
        "boolean" => inner.as_bool().map(NodeValue::Boolean),
        "color" => serde_json::from_value::<[f64; 4]>(inner.clone())
            .ok()
            .map(NodeValue::Color),
        "string" => inner.as_str().map(|s| NodeValue::String(s.to_string())),
        "footage" => inner.as_str().map(|s| NodeValue::Footage(s.to_string())),
        _ => None,
    };
    parsed.ok_or_else(|| LibraryError::InvalidArgument(format!("malformed parameter {:?}", key)))
}
