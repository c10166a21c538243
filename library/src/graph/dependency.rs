//! A unit of requested evaluation.

use uuid::Uuid;

use crate::model::TimeRange;

/// One unit of requested work: render `output` of `node` over `range`.
///
/// Immutable once created; the Task layer creates them and discards them
/// after the result is delivered.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeDependency {
    pub node: Uuid,
    pub output: String,
    pub range: TimeRange,
}

impl NodeDependency {
    pub fn new(node: Uuid, output: &str, range: TimeRange) -> Self {
        Self {
            node,
            output: output.to_string(),
            range,
        }
    }

    /// Video frame dependency at a single instant.
    pub fn frame(node: Uuid, output: &str, time: f64) -> Self {
        Self::new(node, output, TimeRange::at(time))
    }

    pub fn time(&self) -> f64 {
        self.range.start
    }
}
