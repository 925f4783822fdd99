use std::collections::HashMap;
use std::rc::Rc;

use crate::context::{RenderContext, ScopedCurrent};
use crate::error::ProgramBuildError;
use crate::gl::{Gl, ProgramId, ShaderId, ShaderStage};

/// A linked GPU program plus the attribute and uniform locations the driver
/// reported for it right after linking.
///
/// A value of this type always refers to a successfully linked program; any
/// failure during construction yields `None` and releases every object that
/// had been created.
pub struct ShaderProgram<C: RenderContext> {
    context: Rc<C>,
    program: ProgramId,
    attributes: HashMap<String, u32>,
    uniforms: HashMap<String, i32>,
}

impl<C: RenderContext> ShaderProgram<C> {
    /// Compiles and links `vertex_source` + `fragment_source`.
    ///
    /// Compile and link diagnostics are logged; the caller only learns that
    /// construction failed. Must be called with `context` current.
    pub fn new(context: Rc<C>, vertex_source: &str, fragment_source: &str) -> Option<Self> {
        let gl = context.gl();
        let Some(program) = gl.create_program() else {
            tracing::warn!(error = %ProgramBuildError::Allocation, "shader program unavailable");
            return None;
        };

        let mut created = Vec::with_capacity(2);
        let outcome = build(gl, program, vertex_source, fragment_source, &mut created);

        for shader in created {
            gl.delete_shader(shader);
        }

        match outcome {
            Ok((attributes, uniforms)) => {
                tracing::debug!(
                    program = %program,
                    attributes = attributes.len(),
                    uniforms = uniforms.len(),
                    "linked shader program"
                );
                Some(Self {
                    context,
                    program,
                    attributes,
                    uniforms,
                })
            }
            Err(err) => {
                tracing::warn!(error = %err, "discarding shader program");
                gl.delete_program(program);
                None
            }
        }
    }

    pub fn handle(&self) -> ProgramId {
        self.program
    }

    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        self.attributes.get(name).copied()
    }

    pub fn uniform_location(&self, name: &str) -> Option<i32> {
        self.uniforms.get(name).copied()
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, u32)> + '_ {
        self.attributes
            .iter()
            .map(|(name, location)| (name.as_str(), *location))
    }

    pub fn uniforms(&self) -> impl Iterator<Item = (&str, i32)> + '_ {
        self.uniforms
            .iter()
            .map(|(name, location)| (name.as_str(), *location))
    }

    /// Binds the program as current.
    pub fn use_program(&self) {
        self.context.gl().use_program(Some(self.program));
    }
}

impl<C: RenderContext> Drop for ShaderProgram<C> {
    fn drop(&mut self) {
        let scope = ScopedCurrent::enter(&*self.context);
        scope.gl().delete_program(self.program);
    }
}

type LocationMaps = (HashMap<String, u32>, HashMap<String, i32>);

fn build<G: Gl>(
    gl: &G,
    program: ProgramId,
    vertex_source: &str,
    fragment_source: &str,
    created: &mut Vec<ShaderId>,
) -> Result<LocationMaps, ProgramBuildError> {
    let vertex = compile(gl, ShaderStage::Vertex, vertex_source, created)?;
    let fragment = compile(gl, ShaderStage::Fragment, fragment_source, created)?;

    gl.attach_shader(program, vertex);
    gl.attach_shader(program, fragment);
    if !gl.link_program(program) {
        return Err(ProgramBuildError::Link {
            log: gl.program_info_log(program),
        });
    }

    Ok(introspect(gl, program))
}

fn compile<G: Gl>(
    gl: &G,
    stage: ShaderStage,
    source: &str,
    created: &mut Vec<ShaderId>,
) -> Result<ShaderId, ProgramBuildError> {
    let shader = gl.create_shader(stage).ok_or_else(|| ProgramBuildError::Compile {
        stage,
        log: "driver refused to allocate a shader object".to_string(),
    })?;
    created.push(shader);

    if gl.compile_shader(shader, source) {
        Ok(shader)
    } else {
        Err(ProgramBuildError::Compile {
            stage,
            log: gl.shader_info_log(shader),
        })
    }
}

fn introspect<G: Gl>(gl: &G, program: ProgramId) -> LocationMaps {
    let mut attributes = HashMap::new();
    for name in decode_names(gl.active_attribute_names(program), "attribute") {
        if let Some(location) = gl.attribute_location(program, &name) {
            attributes.insert(name, location);
        }
    }

    let mut uniforms = HashMap::new();
    for name in decode_names(gl.active_uniform_names(program), "uniform") {
        if let Some(location) = gl.uniform_location(program, &name) {
            uniforms.insert(name, location);
        }
    }

    (attributes, uniforms)
}

fn decode_names(raw: Vec<Vec<u8>>, kind: &'static str) -> impl Iterator<Item = String> {
    raw.into_iter().filter_map(move |bytes| match String::from_utf8(bytes) {
        Ok(name) => Some(name),
        Err(err) => {
            tracing::warn!(kind, error = %err, "skipping active {kind} with a non UTF-8 name");
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soft::SoftContext;

    const VERTEX: &str = "
        uniform mat4 transform;
        attribute vec3 position;
        attribute vec2 uv;
        varying vec2 vUv;
        void main() {
            vUv = uv;
            gl_Position = transform * vec4(position, 1.0);
        }
    ";

    const FRAGMENT: &str = "
        precision mediump float;
        varying vec2 vUv;
        uniform sampler2D image;
        void main() {
            gl_FragColor = texture2D(image, vUv);
        }
    ";

    #[test]
    fn introspection_matches_fresh_driver_queries() {
        let context = Rc::new(SoftContext::headless(4, 4));
        let program = ShaderProgram::new(context.clone(), VERTEX, FRAGMENT).expect("program");

        let gl = context.gl();
        for name in ["position", "uv"] {
            assert_eq!(
                program.attribute_location(name),
                gl.attribute_location(program.handle(), name)
            );
        }
        for name in ["transform", "image"] {
            assert_eq!(
                program.uniform_location(name),
                gl.uniform_location(program.handle(), name)
            );
            assert!(program.uniform_location(name).is_some());
        }
        assert_eq!(program.attributes().count(), 2);
        assert_eq!(program.uniforms().count(), 2);
    }

    #[test]
    fn unknown_names_are_absent() {
        let context = Rc::new(SoftContext::headless(4, 4));
        let program = ShaderProgram::new(context, VERTEX, FRAGMENT).expect("program");
        assert_eq!(program.attribute_location("normal"), None);
        assert_eq!(program.uniform_location("tint"), None);
    }

    #[test]
    fn shaders_are_released_after_link() {
        let context = Rc::new(SoftContext::headless(4, 4));
        let program = ShaderProgram::new(context.clone(), VERTEX, FRAGMENT).expect("program");
        assert_eq!(context.live_shaders(), 0);
        assert_eq!(context.live_programs(), 1);
        drop(program);
        assert_eq!(context.live_programs(), 0);
    }

    #[test]
    fn broken_vertex_stage_skips_fragment_compile() {
        let context = Rc::new(SoftContext::headless(4, 4));
        let result = ShaderProgram::new(context.clone(), "void main() {", FRAGMENT);
        assert!(result.is_none());
        assert_eq!(context.compiled_shader_count(), 1);
        assert_eq!(context.live_programs(), 0);
        assert_eq!(context.live_shaders(), 0);
    }

    #[test]
    fn use_program_binds_handle() {
        let context = Rc::new(SoftContext::headless(4, 4));
        let program = ShaderProgram::new(context.clone(), VERTEX, FRAGMENT).expect("program");
        program.use_program();
        assert_eq!(context.gl().current_program(), Some(program.handle()));
    }
}
