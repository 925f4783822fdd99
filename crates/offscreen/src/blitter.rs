use std::mem::{offset_of, size_of};
use std::rc::Rc;

use bytemuck::{Pod, Zeroable};

use crate::context::{RenderContext, ScopedCurrent};
use crate::gl::{BufferId, ClearMask, FramebufferId, Gl, TextureId};
use crate::lifecycle::Lifecycle;
use crate::program::ShaderProgram;
use crate::state::StateSnapshot;

const POSITION_ATTRIBUTE: &str = "position";
const TEXTURE_COORDS_ATTRIBUTE: &str = "textureCoordinates";
const MVP_MATRIX_UNIFORM: &str = "modelViewProjectionMatrix";
const TEXTURE_TRANSFORM_UNIFORM: &str = "textureTransformMatrix";
const TEXTURE_UNIFORM: &str = "texture";

const VERTEX_SHADER: &str = r"uniform mat4 modelViewProjectionMatrix;
uniform mat4 textureTransformMatrix;

attribute vec3 position;
attribute vec2 textureCoordinates;

varying vec2 vTextureCoord;

void main() {
    gl_Position = modelViewProjectionMatrix * vec4(position, 1.0);
    vTextureCoord = (textureTransformMatrix * vec4(textureCoordinates, 0.0, 1.0)).xy;
}
";

const FRAGMENT_SHADER: &str = r"precision mediump float;

varying vec2 vTextureCoord;

uniform sampler2D texture;

void main() {
    gl_FragColor = texture2D(texture, vTextureCoord);
}
";

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct QuadVertex {
    position: [f32; 3],
    tex_coord: [f32; 2],
}

/// Triangle strip over clip space: bottom-left, bottom-right, top-left,
/// top-right.
const QUAD: [QuadVertex; 4] = [
    QuadVertex {
        position: [-1.0, -1.0, 0.0],
        tex_coord: [0.0, 0.0],
    },
    QuadVertex {
        position: [1.0, -1.0, 0.0],
        tex_coord: [1.0, 0.0],
    },
    QuadVertex {
        position: [-1.0, 1.0, 0.0],
        tex_coord: [0.0, 1.0],
    },
    QuadVertex {
        position: [1.0, 1.0, 0.0],
        tex_coord: [1.0, 1.0],
    },
];

const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Column-major `v' = 1 - v`.
const FLIP_Y: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, -1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 1.0, 0.0, 1.0,
];

/// How texture rows map onto destination rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlitOrientation {
    #[default]
    Normal,
    /// Flip the vertical texture coordinate, reconciling a top-left image
    /// origin with the framebuffer's bottom-left one.
    InvertY,
}

impl BlitOrientation {
    fn texture_transform(self) -> &'static [f32; 16] {
        match self {
            BlitOrientation::Normal => &IDENTITY,
            BlitOrientation::InvertY => &FLIP_Y,
        }
    }
}

struct BlitResources<C: RenderContext> {
    quad: BufferId,
    program: ShaderProgram<C>,
}

/// Draws a texture into a framebuffer with a full-screen quad, leaving the
/// caller's program, buffer, framebuffer, texture and depth-test state as it
/// found them.
///
/// GPU objects are created on the first blit inside the associated context.
/// If the shader program cannot be built the blitter turns inert and every
/// later blit is a no-op. Samples from texture unit 0, which must be the
/// active unit (the OpenGL default).
pub struct TextureBlitter<C: RenderContext> {
    context: Rc<C>,
    resources: Lifecycle<BlitResources<C>>,
}

impl<C: RenderContext> TextureBlitter<C> {
    pub fn new(context: Rc<C>) -> Self {
        Self {
            context,
            resources: Lifecycle::default(),
        }
    }

    /// Builds the quad buffer and program if that has not happened yet and
    /// reports whether the blitter can draw.
    pub fn ensure_ready(&mut self) -> bool {
        let context = &self.context;
        self.resources
            .ensure_ready(|| construct(context))
            .is_some()
    }

    pub fn is_inert(&self) -> bool {
        self.resources.is_inert()
    }

    /// Copies `source` into `destination` (`None` is the default
    /// framebuffer), clearing the destination first.
    pub fn blit(
        &mut self,
        source: TextureId,
        destination: Option<FramebufferId>,
        orientation: BlitOrientation,
    ) {
        if !self.ensure_ready() {
            return;
        }
        let Some(resources) = self.resources.get() else {
            return;
        };

        let gl = self.context.gl();
        let saved = StateSnapshot::store(gl);
        resources.prepare(gl, source, destination, orientation);

        gl.clear(ClearMask::COLOR | ClearMask::DEPTH);
        gl.draw_triangle_strip(0, QUAD.len() as i32);

        saved.restore(gl);
        tracing::trace!(%source, ?destination, ?orientation, "blitted texture");
    }
}

impl<C: RenderContext> BlitResources<C> {
    fn prepare<G: Gl>(
        &self,
        gl: &G,
        source: TextureId,
        destination: Option<FramebufferId>,
        orientation: BlitOrientation,
    ) {
        let program = &self.program;
        gl.set_depth_test(false);
        program.use_program();

        if let Some(location) = program.uniform_location(TEXTURE_UNIFORM) {
            gl.uniform_1_i32(location, 0);
        }
        if let Some(location) = program.uniform_location(MVP_MATRIX_UNIFORM) {
            gl.uniform_matrix_4_f32(location, &IDENTITY);
        }
        if let Some(location) = program.uniform_location(TEXTURE_TRANSFORM_UNIFORM) {
            gl.uniform_matrix_4_f32(location, orientation.texture_transform());
        }

        // TODO: record the attribute setup once in a vertex array object when
        // the context is GLES 3 / GL 3.0 or newer.
        gl.bind_array_buffer(Some(self.quad));
        let stride = size_of::<QuadVertex>() as i32;
        if let Some(location) = program.attribute_location(POSITION_ATTRIBUTE) {
            gl.enable_vertex_attribute(location);
            gl.vertex_attribute_f32(location, 3, stride, offset_of!(QuadVertex, position) as i32);
        }
        if let Some(location) = program.attribute_location(TEXTURE_COORDS_ATTRIBUTE) {
            gl.enable_vertex_attribute(location);
            gl.vertex_attribute_f32(
                location,
                2,
                stride,
                offset_of!(QuadVertex, tex_coord) as i32,
            );
        }

        gl.bind_framebuffer(destination);
        gl.bind_texture_2d(Some(source));
    }
}

fn construct<C: RenderContext>(context: &Rc<C>) -> Option<BlitResources<C>> {
    let scope = ScopedCurrent::enter(&**context);
    let gl = scope.gl();

    let Some(quad) = gl.create_buffer() else {
        tracing::warn!("texture blitter disabled: could not allocate quad buffer");
        return None;
    };
    let previous = gl.current_array_buffer();
    gl.bind_array_buffer(Some(quad));
    gl.array_buffer_data_static(bytemuck::cast_slice(&QUAD));
    gl.bind_array_buffer(previous);

    match ShaderProgram::new(context.clone(), VERTEX_SHADER, FRAGMENT_SHADER) {
        Some(program) => {
            tracing::debug!(%quad, program = %program.handle(), "texture blitter ready");
            Some(BlitResources { quad, program })
        }
        None => {
            gl.delete_buffer(quad);
            tracing::warn!("texture blitter disabled: blit program failed to build");
            None
        }
    }
}

impl<C: RenderContext> Drop for TextureBlitter<C> {
    fn drop(&mut self) {
        let Some(BlitResources { quad, program }) = self.resources.take() else {
            return;
        };
        let scope = ScopedCurrent::enter(&*self.context);
        scope.gl().delete_buffer(quad);
        drop(program);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(matrix: &[f32; 16], u: f32, v: f32) -> (f32, f32) {
        let x = matrix[0] * u + matrix[4] * v + matrix[12];
        let y = matrix[1] * u + matrix[5] * v + matrix[13];
        (x, y)
    }

    #[test]
    fn quad_vertex_layout_matches_attribute_pointers() {
        assert_eq!(size_of::<QuadVertex>(), 5 * size_of::<f32>());
        assert_eq!(offset_of!(QuadVertex, position), 0);
        assert_eq!(offset_of!(QuadVertex, tex_coord), 3 * size_of::<f32>());
        assert_eq!(bytemuck::cast_slice::<_, u8>(&QUAD).len(), 80);
    }

    #[test]
    fn flip_matrix_mirrors_v_only() {
        assert_eq!(apply(&FLIP_Y, 0.0, 0.0), (0.0, 1.0));
        assert_eq!(apply(&FLIP_Y, 1.0, 1.0), (1.0, 0.0));
        assert_eq!(apply(&FLIP_Y, 0.25, 0.75), (0.25, 0.25));
        assert_eq!(apply(&IDENTITY, 0.25, 0.75), (0.25, 0.75));
    }

    #[test]
    fn shader_sources_declare_blit_contract() {
        for name in [
            POSITION_ATTRIBUTE,
            TEXTURE_COORDS_ATTRIBUTE,
            MVP_MATRIX_UNIFORM,
            TEXTURE_TRANSFORM_UNIFORM,
        ] {
            assert!(VERTEX_SHADER.contains(name), "vertex shader lacks {name}");
        }
        assert!(FRAGMENT_SHADER.contains(&format!("uniform sampler2D {TEXTURE_UNIFORM};")));
        assert!(VERTEX_SHADER.contains("varying vec2 vTextureCoord;"));
        assert!(FRAGMENT_SHADER.contains("varying vec2 vTextureCoord;"));
    }

    #[test]
    fn quad_strip_covers_clip_space_in_order() {
        let corners: Vec<_> = QUAD
            .iter()
            .map(|vertex| (vertex.position[0], vertex.position[1]))
            .collect();
        assert_eq!(corners, [(-1.0, -1.0), (1.0, -1.0), (-1.0, 1.0), (1.0, 1.0)]);
        for vertex in QUAD {
            assert_eq!(vertex.tex_coord[0], (vertex.position[0] + 1.0) / 2.0);
            assert_eq!(vertex.tex_coord[1], (vertex.position[1] + 1.0) / 2.0);
        }
    }
}
