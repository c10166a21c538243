//! Content-hash accumulation for cache keys.
//!
//! A `Digest` is an order-sensitive accumulator: a node contributes its type
//! id and its time-relevant parameter values, then the graph walks connected
//! upstream outputs in input order. Two identical walks produce identical
//! digests. The digest is only ever a cache-validity key; no rendered value
//! is derived from it.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;

use crate::model::NodeValue;

#[derive(Default)]
pub struct Digest {
    hasher: DefaultHasher,
}

impl Digest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_str(&mut self, s: &str) {
        self.hasher.write(s.as_bytes());
        // Length marker keeps "ab"+"c" distinct from "a"+"bc".
        self.hasher.write_u64(s.len() as u64);
    }

    pub fn write_u64(&mut self, v: u64) {
        self.hasher.write_u64(v);
    }

    pub fn write_i64(&mut self, v: i64) {
        self.hasher.write_i64(v);
    }

    pub fn write_f64(&mut self, v: f64) {
        self.hasher.write_u64(v.to_bits());
    }

    pub fn write_bool(&mut self, v: bool) {
        self.hasher.write_u8(v as u8);
    }

    /// Contribute a static parameter value.
    ///
    /// Payload values (textures, sample buffers) never appear as static
    /// parameters; reducing one here is a defect in the calling node.
    pub fn write_value(&mut self, value: &NodeValue) {
        match value {
            NodeValue::None => self.hasher.write_u8(0),
            NodeValue::Scalar(v) => {
                self.hasher.write_u8(1);
                self.write_f64(*v);
            }
            NodeValue::Integer(v) => {
                self.hasher.write_u8(2);
                self.write_i64(*v);
            }
            NodeValue::Boolean(v) => {
                self.hasher.write_u8(3);
                self.write_bool(*v);
            }
            NodeValue::Color(c) => {
                self.hasher.write_u8(4);
                for component in c {
                    self.write_f64(*component);
                }
            }
            NodeValue::String(s) => {
                self.hasher.write_u8(5);
                self.write_str(s);
            }
            NodeValue::Footage(s) => {
                self.hasher.write_u8(6);
                self.write_str(s);
            }
            NodeValue::Texture(_) | NodeValue::Samples(_) => {
                debug_assert!(false, "payload values are not stable parameters");
                self.hasher.write_u8(7);
            }
        }
    }

    pub fn finish(self) -> u64 {
        self.hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest_of(values: &[NodeValue]) -> u64 {
        let mut d = Digest::new();
        for v in values {
            d.write_value(v);
        }
        d.finish()
    }

    #[test]
    fn test_digest_is_deterministic() {
        let values = [NodeValue::Scalar(0.5), NodeValue::String("blur".into())];
        assert_eq!(digest_of(&values), digest_of(&values));
    }

    #[test]
    fn test_digest_is_order_sensitive() {
        let a = [NodeValue::Scalar(1.0), NodeValue::Scalar(2.0)];
        let b = [NodeValue::Scalar(2.0), NodeValue::Scalar(1.0)];
        assert_ne!(digest_of(&a), digest_of(&b));
    }

    #[test]
    fn test_string_boundaries_are_unambiguous() {
        let mut a = Digest::new();
        a.write_str("ab");
        a.write_str("c");
        let mut b = Digest::new();
        b.write_str("a");
        b.write_str("bc");
        assert_ne!(a.finish(), b.finish());
    }
}
