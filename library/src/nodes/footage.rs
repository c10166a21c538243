//! Media source node, resolved through the decoder cache.

use std::any::Any;

use crate::error::LibraryError;
use crate::graph::digest::Digest;
use crate::graph::node::{Input, Node, Output, Ports};
use crate::model::{NodeValue, ValueDatabase, ValueTable, ValueType};

pub const SOURCE_IN: &str = "source";
pub const TEXTURE_OUT: &str = "texture";
pub const SAMPLES_OUT: &str = "samples";

pub struct FootageNode {
    ports: Ports,
}

impl FootageNode {
    pub const ID: &'static str = "footage";

    pub fn new() -> Self {
        Self {
            ports: Ports::new(
                vec![Input::new(SOURCE_IN, ValueType::Footage)],
                vec![
                    Output::new(TEXTURE_OUT, ValueType::Texture),
                    Output::new(SAMPLES_OUT, ValueType::Samples),
                ],
            ),
        }
    }

    pub fn with_source(source_id: &str) -> Self {
        let mut node = Self::new();
        node.ports.input_mut(SOURCE_IN).unwrap().value = NodeValue::Footage(source_id.to_string());
        node
    }
}

impl Default for FootageNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for FootageNode {
    fn type_id(&self) -> &'static str {
        Self::ID
    }

    fn name(&self) -> String {
        "Footage".to_string()
    }

    fn ports(&self) -> &Ports {
        &self.ports
    }

    fn ports_mut(&mut self) -> &mut Ports {
        &mut self.ports
    }

    fn value(
        &self,
        _output: &str,
        _db: &ValueDatabase,
        _time: f64,
    ) -> Result<ValueTable, LibraryError> {
        // Footage resolves through the decoder cache on a worker; reaching
        // the host path without one is a malformed-graph evaluation failure.
        Err(LibraryError::evaluation(
            "footage node evaluated without a decoder",
        ))
    }

    fn hash(&self, output: &str, digest: &mut Digest, time: f64) {
        digest.write_str(Self::ID);
        for input in &self.ports.inputs {
            digest.write_str(&input.name);
            digest.write_value(&input.value);
        }
        // Decoded content depends on which frame and which stream, unlike
        // parameter-only nodes.
        digest.write_str(output);
        digest.write_f64(time);
    }

    fn footage_source(&self) -> Option<&str> {
        self.ports.input(SOURCE_IN).and_then(|i| i.value.as_str())
    }

    fn offload_hint(&self) -> bool {
        true
    }

    fn boxed_copy(&self) -> Box<dyn Node> {
        Box::new(Self {
            ports: self.ports.clone(),
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
