//! Ordered clip container.

use std::any::Any;

use crate::error::LibraryError;
use crate::graph::node::{Input, Node, Output, Ports};
use crate::model::{NodeValue, ValueDatabase, ValueTable, ValueType};

pub const CLIPS_IN: &str = "clips";
pub const LOCKED_IN: &str = "locked";
pub const BUFFER_OUT: &str = "buffer";

pub struct TrackNode {
    ports: Ports,
}

impl TrackNode {
    pub const ID: &'static str = "track";

    pub fn new() -> Self {
        Self {
            ports: Ports::new(
                vec![
                    Input::array(CLIPS_IN, ValueType::Any),
                    Input::new(LOCKED_IN, ValueType::Boolean)
                        .with_value(NodeValue::Boolean(false)),
                ],
                vec![Output::new(BUFFER_OUT, ValueType::Any)],
            ),
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(
            self.ports.input(LOCKED_IN).map(|i| &i.value),
            Some(NodeValue::Boolean(true))
        )
    }
}

impl Default for TrackNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for TrackNode {
    fn type_id(&self) -> &'static str {
        Self::ID
    }

    fn name(&self) -> String {
        "Track".to_string()
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
        db: &ValueDatabase,
        _time: f64,
    ) -> Result<ValueTable, LibraryError> {
        // Clips outside their span resolve to nothing; the topmost live clip
        // (highest element index) wins.
        let active = db
            .get(CLIPS_IN)
            .and_then(|t| {
                t.iter()
                    .rev()
                    .find(|v| !matches!(v, NodeValue::None))
                    .cloned()
            })
            .unwrap_or(NodeValue::None);
        Ok(ValueTable::single(active))
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
