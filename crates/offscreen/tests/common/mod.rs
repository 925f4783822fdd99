#![allow(dead_code)]

use std::rc::Rc;

use offscreen::soft::SoftContext;
use offscreen::{
    BufferId, FramebufferId, Gl, RenderContext, Sampling, SceneRenderer, ShaderProgram,
    TextureId, Viewport,
};

pub const RED: [u8; 4] = [255, 0, 0, 255];

pub const SOLID_VERTEX: &str = "
attribute vec2 position;
void main() {
    gl_Position = vec4(position, 0.0, 1.0);
}
";

pub const RED_FRAGMENT: &str = "
precision mediump float;
void main() {
    gl_FragColor = vec4(1.0, 0.0, 0.0, 1.0);
}
";

pub fn texture_from_pixels(gl: &SoftContext, width: i32, height: i32, pixels: &[u8]) -> TextureId {
    let previous = gl.current_texture_2d();
    let texture = gl.create_texture().unwrap();
    gl.bind_texture_2d(Some(texture));
    gl.allocate_texture_2d_rgba(width, height, Some(pixels));
    gl.set_texture_sampling_2d(Sampling::NEAREST_CLAMP);
    gl.bind_texture_2d(previous);
    texture
}

pub fn solid_texture(gl: &SoftContext, width: i32, height: i32, rgba: [u8; 4]) -> TextureId {
    let pixels = rgba.repeat((width * height) as usize);
    texture_from_pixels(gl, width, height, &pixels)
}

/// Every texel distinct; row `y` (bottom first) carries `y` in green.
pub fn gradient_pixels(width: i32, height: i32) -> Vec<u8> {
    let mut pixels = Vec::new();
    for y in 0..height {
        for x in 0..width {
            pixels.extend_from_slice(&[(x * 60) as u8, (y * 60) as u8, 7, 255]);
        }
    }
    pixels
}

/// Framebuffer backed by a fresh colour texture; bindings are left as found.
pub fn texture_framebuffer(gl: &SoftContext, width: i32, height: i32) -> (FramebufferId, TextureId) {
    let previous_framebuffer = gl.current_framebuffer();
    let previous_texture = gl.current_texture_2d();
    let framebuffer = gl.create_framebuffer().unwrap();
    let texture = gl.create_texture().unwrap();
    gl.bind_framebuffer(Some(framebuffer));
    gl.bind_texture_2d(Some(texture));
    gl.allocate_texture_2d_rgba(width, height, None);
    gl.attach_color_texture(Some(texture));
    assert!(gl.framebuffer_complete());
    gl.bind_texture_2d(previous_texture);
    gl.bind_framebuffer(previous_framebuffer);
    (framebuffer, texture)
}

pub fn read_framebuffer(
    gl: &SoftContext,
    framebuffer: Option<FramebufferId>,
    width: i32,
    height: i32,
) -> Vec<u8> {
    let previous = gl.current_framebuffer();
    gl.bind_framebuffer(framebuffer);
    let pixels = gl.read_pixels_rgba(Viewport::covering(width, height));
    gl.bind_framebuffer(previous);
    pixels
}

pub fn rows(pixels: &[u8], width: i32) -> Vec<&[u8]> {
    pixels.chunks(width as usize * 4).collect()
}

pub fn all_pixels(pixels: &[u8], rgba: [u8; 4]) -> bool {
    !pixels.is_empty() && pixels.chunks_exact(4).all(|pixel| pixel == rgba)
}

/// A host-side scene that fills one clip-space rectangle with red.
pub struct RectScene {
    context: Rc<SoftContext>,
    program: ShaderProgram<SoftContext>,
    quad: BufferId,
    pub draws: usize,
}

impl RectScene {
    /// `min` / `max` are clip-space corners.
    pub fn new(context: Rc<SoftContext>, min: [f32; 2], max: [f32; 2]) -> Self {
        let program = ShaderProgram::new(context.clone(), SOLID_VERTEX, RED_FRAGMENT).unwrap();
        let gl = context.gl();
        let quad = gl.create_buffer().unwrap();
        let corners: [f32; 8] = [min[0], min[1], max[0], min[1], min[0], max[1], max[0], max[1]];
        let previous = gl.current_array_buffer();
        gl.bind_array_buffer(Some(quad));
        gl.array_buffer_data_static(bytemuck::cast_slice(&corners));
        gl.bind_array_buffer(previous);
        Self {
            context,
            program,
            quad,
            draws: 0,
        }
    }
}

impl SceneRenderer for RectScene {
    fn draw(&mut self, _time: f64) {
        let gl = self.context.gl();
        self.program.use_program();
        gl.bind_array_buffer(Some(self.quad));
        let position = self.program.attribute_location("position").unwrap();
        gl.enable_vertex_attribute(position);
        gl.vertex_attribute_f32(position, 2, 0, 0);
        gl.draw_triangle_strip(0, 4);
        self.draws += 1;
    }
}
