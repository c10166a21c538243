//! Alpha-over merge of two textures.

use std::any::Any;
use std::sync::Arc;

use crate::error::LibraryError;
use crate::graph::node::{Input, Node, Output, Ports};
use crate::model::{NodeValue, ValueDatabase, ValueTable, ValueType};
use crate::render::shader_cache::ShaderCode;

pub const BASE_IN: &str = "base";
pub const BLEND_IN: &str = "blend";
pub const TEXTURE_OUT: &str = "texture";

const MERGE_SHADER: &str = r#"
uniform sampler2D base_tex;
uniform sampler2D blend_tex;
void main() {
    vec4 base = texture2D(base_tex, v_uv);
    vec4 blend = texture2D(blend_tex, v_uv);
    gl_FragColor = blend + base * (1.0 - blend.a);
}
"#;

pub struct MergeNode {
    ports: Ports,
}

impl MergeNode {
    pub const ID: &'static str = "merge";

    pub fn new() -> Self {
        Self {
            ports: Ports::new(
                vec![
                    Input::new(BASE_IN, ValueType::Texture),
                    Input::new(BLEND_IN, ValueType::Texture),
                ],
                vec![Output::new(TEXTURE_OUT, ValueType::Texture)],
            ),
        }
    }
}

impl Default for MergeNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for MergeNode {
    fn type_id(&self) -> &'static str {
        Self::ID
    }

    fn name(&self) -> String {
        "Merge".to_string()
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
        let base = db.value(BASE_IN);
        let blend = db.value(BLEND_IN);
        let result = match (base.as_texture(), blend.as_texture()) {
            (Some(b), Some(o)) => NodeValue::Texture(Arc::new(super::blend_over(b, o))),
            (Some(b), None) => NodeValue::Texture(Arc::clone(b)),
            (None, Some(o)) => NodeValue::Texture(Arc::clone(o)),
            (None, None) => NodeValue::None,
        };
        Ok(ValueTable::single(result))
    }

    fn shader_code(&self, _shader_id: &str) -> Option<ShaderCode> {
        Some(ShaderCode::new(Self::ID, MERGE_SHADER))
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
