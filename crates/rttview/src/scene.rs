use std::f64::consts::TAU;
use std::mem::{offset_of, size_of};
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use offscreen::{
    BufferId, ClearMask, Gl, RenderContext, SceneRenderer, ScopedCurrent, ShaderProgram,
};

const VERTEX_SHADER: &str = r"
uniform mat4 rotation;
attribute vec2 position;
attribute vec3 color;
varying vec3 vColor;
void main() {
    vColor = color;
    gl_Position = rotation * vec4(position, 0.0, 1.0);
}
";

const FRAGMENT_SHADER: &str = r"
precision mediump float;
varying vec3 vColor;
void main() {
    gl_FragColor = vec4(vColor, 1.0);
}
";

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct Vertex {
    position: [f32; 2],
    color: [f32; 3],
}

const TRIANGLE: [Vertex; 3] = [
    Vertex {
        position: [0.0, 0.8],
        color: [1.0, 0.2, 0.2],
    },
    Vertex {
        position: [-0.7, -0.6],
        color: [0.2, 1.0, 0.2],
    },
    Vertex {
        position: [0.7, -0.6],
        color: [0.2, 0.2, 1.0],
    },
];

/// The host scene: a colour-interpolated triangle turning about the view axis.
pub struct SpinningTriangle<C: RenderContext> {
    context: Rc<C>,
    program: ShaderProgram<C>,
    vertices: BufferId,
    clear_color: [f32; 4],
    period: Duration,
}

impl<C: RenderContext> SpinningTriangle<C> {
    pub fn new(context: Rc<C>, clear_color: [f32; 4], period: Duration) -> Result<Self> {
        let program = ShaderProgram::new(context.clone(), VERTEX_SHADER, FRAGMENT_SHADER)
            .context("failed to build the scene shader program")?;

        let vertices = {
            let scope = ScopedCurrent::enter(&*context);
            let gl = scope.gl();
            let buffer = gl
                .create_buffer()
                .context("failed to allocate the scene vertex buffer")?;
            let previous = gl.current_array_buffer();
            gl.bind_array_buffer(Some(buffer));
            gl.array_buffer_data_static(bytemuck::cast_slice(&TRIANGLE));
            gl.bind_array_buffer(previous);
            buffer
        };

        Ok(Self {
            context,
            program,
            vertices,
            clear_color,
            period,
        })
    }
}

impl<C: RenderContext> SceneRenderer for SpinningTriangle<C> {
    fn draw(&mut self, time: f64) {
        let gl = self.context.gl();
        gl.set_clear_color(self.clear_color);
        gl.clear(ClearMask::COLOR | ClearMask::DEPTH);

        self.program.use_program();
        if let Some(location) = self.program.uniform_location("rotation") {
            let turns = (time / self.period.as_secs_f64()).fract();
            gl.uniform_matrix_4_f32(location, &rotation_z(turns * TAU));
        }

        gl.bind_array_buffer(Some(self.vertices));
        let stride = size_of::<Vertex>() as i32;
        if let Some(position) = self.program.attribute_location("position") {
            gl.enable_vertex_attribute(position);
            gl.vertex_attribute_f32(position, 2, stride, offset_of!(Vertex, position) as i32);
        }
        if let Some(color) = self.program.attribute_location("color") {
            gl.enable_vertex_attribute(color);
            gl.vertex_attribute_f32(color, 3, stride, offset_of!(Vertex, color) as i32);
        }
        gl.draw_triangle_strip(0, TRIANGLE.len() as i32);
    }
}

impl<C: RenderContext> Drop for SpinningTriangle<C> {
    fn drop(&mut self) {
        let scope = ScopedCurrent::enter(&*self.context);
        scope.gl().delete_buffer(self.vertices);
    }
}

/// Column-major rotation about +Z.
fn rotation_z(angle: f64) -> [f32; 16] {
    let (sin, cos) = angle.sin_cos();
    let (sin, cos) = (sin as f32, cos as f32);
    [
        cos, sin, 0.0, 0.0, //
        -sin, cos, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]
}

#[cfg(test)]
mod tests {
    use offscreen::soft::SoftContext;
    use offscreen::{render_frame, DisplaySize, RenderToTextureCoordinator, Viewport};

    use super::*;

    const CLEAR: [f32; 4] = [0.0, 0.0, 1.0, 1.0];
    const BLUE: [u8; 4] = [0, 0, 255, 255];

    fn pixel(pixels: &[u8], width: usize, x: usize, y: usize) -> &[u8] {
        let at = (y * width + x) * 4;
        &pixels[at..at + 4]
    }

    #[test]
    fn vertex_layout_is_tightly_packed() {
        assert_eq!(size_of::<Vertex>(), 5 * size_of::<f32>());
        assert_eq!(offset_of!(Vertex, position), 0);
        assert_eq!(offset_of!(Vertex, color), 2 * size_of::<f32>());
    }

    #[test]
    fn rotation_is_identity_at_whole_turns() {
        let matrix = rotation_z(0.0);
        assert_eq!(matrix[0], 1.0);
        assert_eq!(matrix[5], 1.0);
        assert_eq!(matrix[1], 0.0);

        let quarter = rotation_z(TAU / 4.0);
        assert!((quarter[1] - 1.0).abs() < 1e-6);
        assert!((quarter[4] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn triangle_covers_the_centre_and_leaves_corners_clear() {
        let context = Rc::new(SoftContext::headless(8, 8));
        let mut scene =
            SpinningTriangle::new(context.clone(), CLEAR, Duration::from_secs(4)).unwrap();

        scene.draw(0.0);

        let pixels = context.default_framebuffer_pixels();
        assert_ne!(pixel(&pixels, 8, 4, 4), BLUE);
        assert_eq!(pixel(&pixels, 8, 0, 7), BLUE);
        assert_eq!(pixel(&pixels, 8, 7, 7), BLUE);
        assert_eq!(context.gl().take_error(), None);
    }

    #[test]
    fn scene_renders_through_the_coordinator() {
        let context = Rc::new(SoftContext::headless(8, 8));
        let mut scene =
            SpinningTriangle::new(context.clone(), CLEAR, Duration::from_secs(4)).unwrap();
        let mut coordinator =
            RenderToTextureCoordinator::new(context.clone(), DisplaySize::from_physical(8, 8));

        render_frame(&mut coordinator, &mut scene, 1.0);

        assert!(!coordinator.is_intercepting());
        assert!(!coordinator.is_disabled());
        let texture = coordinator.offscreen_texture().unwrap();
        let offscreen = context.texture_pixels(texture).unwrap();
        let composite = context.gl().read_pixels_rgba(Viewport::covering(8, 8));
        assert_eq!(composite, offscreen);
        assert_ne!(pixel(&composite, 8, 4, 4), BLUE);
        assert_eq!(context.gl().take_error(), None);
    }

    #[test]
    fn drop_releases_the_vertex_buffer() {
        let context = Rc::new(SoftContext::headless(4, 4));
        let scene = SpinningTriangle::new(context.clone(), CLEAR, Duration::from_secs(1)).unwrap();
        assert_eq!(context.live_buffers(), 1);

        drop(scene);

        assert_eq!(context.live_buffers(), 0);
        assert_eq!(context.live_programs(), 0);
    }
}
