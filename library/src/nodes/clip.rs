//! Timeline placement of a source buffer.

use std::any::Any;

use crate::error::LibraryError;
use crate::graph::node::{Input, Node, Output, Ports};
use crate::model::{NodeValue, TimeRange, ValueDatabase, ValueTable, ValueType};

pub const BUFFER_IN: &str = "buffer";
pub const IN_POINT: &str = "in";
pub const DURATION: &str = "duration";
pub const MEDIA_IN: &str = "media_in";
pub const BUFFER_OUT: &str = "buffer";

/// Places an upstream buffer on the timeline over `[in, in + duration)`,
/// shifting evaluation into media time.
pub struct ClipNode {
    ports: Ports,
}

impl ClipNode {
    pub const ID: &'static str = "clip";

    pub fn new() -> Self {
        Self {
            ports: Ports::new(
                vec![
                    Input::new(BUFFER_IN, ValueType::Any),
                    Input::new(IN_POINT, ValueType::Scalar).with_value(NodeValue::Scalar(0.0)),
                    Input::new(DURATION, ValueType::Scalar).with_value(NodeValue::Scalar(0.0)),
                    Input::new(MEDIA_IN, ValueType::Scalar).with_value(NodeValue::Scalar(0.0)),
                ],
                vec![Output::new(BUFFER_OUT, ValueType::Any)],
            ),
        }
    }

    pub fn with_timing(in_point: f64, duration: f64, media_in: f64) -> Self {
        let mut node = Self::new();
        node.ports.input_mut(IN_POINT).unwrap().value = NodeValue::Scalar(in_point);
        node.ports.input_mut(DURATION).unwrap().value = NodeValue::Scalar(duration);
        node.ports.input_mut(MEDIA_IN).unwrap().value = NodeValue::Scalar(media_in);
        node
    }

    fn scalar(&self, input: &str) -> f64 {
        self.ports
            .input(input)
            .and_then(|i| i.value.as_scalar())
            .unwrap_or(0.0)
    }

    /// Timeline span occupied by this clip.
    pub fn span(&self) -> TimeRange {
        let in_point = self.scalar(IN_POINT);
        TimeRange::new(in_point, in_point + self.scalar(DURATION))
    }
}

impl Default for ClipNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for ClipNode {
    fn type_id(&self) -> &'static str {
        Self::ID
    }

    fn name(&self) -> String {
        "Clip".to_string()
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
        time: f64,
    ) -> Result<ValueTable, LibraryError> {
        if self.scalar(DURATION) < 0.0 {
            return Err(LibraryError::evaluation("clip has negative duration"));
        }
        if !self.span().contains(time) {
            return Ok(ValueTable::new());
        }
        Ok(db.get(BUFFER_IN).cloned().unwrap_or_default())
    }

    fn block_range(&self) -> Option<TimeRange> {
        Some(self.span())
    }

    fn input_time(&self, input: &str, time: f64) -> f64 {
        if input == BUFFER_IN {
            time - self.scalar(IN_POINT) + self.scalar(MEDIA_IN)
        } else {
            time
        }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_time_mapping() {
        let clip = ClipNode::with_timing(2.0, 3.0, 10.0);
        assert_eq!(clip.input_time(BUFFER_IN, 2.0), 10.0);
        assert_eq!(clip.input_time(BUFFER_IN, 4.5), 12.5);
        assert_eq!(clip.input_time(IN_POINT, 4.5), 4.5);
    }

    #[test]
    fn test_span() {
        let clip = ClipNode::with_timing(1.0, 2.0, 0.0);
        assert_eq!(clip.span(), TimeRange::new(1.0, 3.0));
        assert!(clip.span().contains(1.0));
        assert!(!clip.span().contains(3.0));
    }
}
