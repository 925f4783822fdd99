//! [`Gl`] for `glow::Context`.
//!
//! Every `glow` entry point is `unsafe` because it dereferences the driver's
//! function table for whatever context is current. The pipeline only calls
//! these while its associated context is current (hooks run inside the host's
//! frame, construction and teardown run inside a `ScopedCurrent`), which is
//! the invariant each `unsafe` block below relies on.

use glow::HasContext;

use super::{
    BufferId, ClearMask, Filter, FramebufferId, Gl, ProgramId, RenderbufferId, Sampling,
    ShaderId, ShaderStage, TextureId, Viewport, Wrap,
};

fn uniform(location: i32) -> Option<glow::NativeUniformLocation> {
    u32::try_from(location).ok().map(glow::NativeUniformLocation)
}

impl Gl for glow::Context {
    fn create_program(&self) -> Option<ProgramId> {
        match unsafe { HasContext::create_program(self) } {
            Ok(program) => Some(ProgramId(program.0)),
            Err(err) => {
                tracing::warn!(error = %err, "driver refused to allocate a program object");
                None
            }
        }
    }

    fn delete_program(&self, program: ProgramId) {
        unsafe { HasContext::delete_program(self, glow::NativeProgram(program.0)) }
    }

    fn create_shader(&self, stage: ShaderStage) -> Option<ShaderId> {
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        unsafe { HasContext::create_shader(self, kind) }
            .ok()
            .map(|shader| ShaderId(shader.0))
    }

    fn delete_shader(&self, shader: ShaderId) {
        unsafe { HasContext::delete_shader(self, glow::NativeShader(shader.0)) }
    }

    fn compile_shader(&self, shader: ShaderId, source: &str) -> bool {
        let native = glow::NativeShader(shader.0);
        unsafe {
            self.shader_source(native, source);
            HasContext::compile_shader(self, native);
            self.get_shader_compile_status(native)
        }
    }

    fn shader_info_log(&self, shader: ShaderId) -> String {
        unsafe { self.get_shader_info_log(glow::NativeShader(shader.0)) }
    }

    fn attach_shader(&self, program: ProgramId, shader: ShaderId) {
        unsafe {
            HasContext::attach_shader(
                self,
                glow::NativeProgram(program.0),
                glow::NativeShader(shader.0),
            )
        }
    }

    // glow exposes no glValidateProgram; the link status is what gates use.
    fn link_program(&self, program: ProgramId) -> bool {
        let native = glow::NativeProgram(program.0);
        unsafe {
            HasContext::link_program(self, native);
            self.get_program_link_status(native)
        }
    }

    fn program_info_log(&self, program: ProgramId) -> String {
        unsafe { self.get_program_info_log(glow::NativeProgram(program.0)) }
    }

    fn active_attribute_names(&self, program: ProgramId) -> Vec<Vec<u8>> {
        let native = glow::NativeProgram(program.0);
        unsafe {
            let count = self.get_active_attributes(native);
            (0..count)
                .filter_map(|index| self.get_active_attribute(native, index))
                .map(|attribute| attribute.name.into_bytes())
                .collect()
        }
    }

    fn active_uniform_names(&self, program: ProgramId) -> Vec<Vec<u8>> {
        let native = glow::NativeProgram(program.0);
        unsafe {
            let count = self.get_active_uniforms(native);
            (0..count)
                .filter_map(|index| self.get_active_uniform(native, index))
                .map(|uniform| uniform.name.into_bytes())
                .collect()
        }
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        unsafe { self.get_attrib_location(glow::NativeProgram(program.0), name) }
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<i32> {
        unsafe { self.get_uniform_location(glow::NativeProgram(program.0), name) }
            .and_then(|location| i32::try_from(location.0).ok())
    }

    fn use_program(&self, program: Option<ProgramId>) {
        unsafe { HasContext::use_program(self, program.map(|id| glow::NativeProgram(id.0))) }
    }

    fn uniform_1_i32(&self, location: i32, value: i32) {
        unsafe { HasContext::uniform_1_i32(self, uniform(location).as_ref(), value) }
    }

    fn uniform_matrix_4_f32(&self, location: i32, matrix: &[f32; 16]) {
        unsafe { self.uniform_matrix_4_f32_slice(uniform(location).as_ref(), false, matrix) }
    }

    fn create_buffer(&self) -> Option<BufferId> {
        unsafe { HasContext::create_buffer(self) }
            .ok()
            .map(|buffer| BufferId(buffer.0))
    }

    fn delete_buffer(&self, buffer: BufferId) {
        unsafe { HasContext::delete_buffer(self, glow::NativeBuffer(buffer.0)) }
    }

    fn bind_array_buffer(&self, buffer: Option<BufferId>) {
        unsafe {
            self.bind_buffer(
                glow::ARRAY_BUFFER,
                buffer.map(|id| glow::NativeBuffer(id.0)),
            )
        }
    }

    fn array_buffer_data_static(&self, data: &[u8]) {
        unsafe { self.buffer_data_u8_slice(glow::ARRAY_BUFFER, data, glow::STATIC_DRAW) }
    }

    fn enable_vertex_attribute(&self, location: u32) {
        unsafe { self.enable_vertex_attrib_array(location) }
    }

    fn vertex_attribute_f32(&self, location: u32, components: i32, stride: i32, offset: i32) {
        unsafe {
            self.vertex_attrib_pointer_f32(location, components, glow::FLOAT, false, stride, offset)
        }
    }

    fn create_texture(&self) -> Option<TextureId> {
        unsafe { HasContext::create_texture(self) }
            .ok()
            .map(|texture| TextureId(texture.0))
    }

    fn delete_texture(&self, texture: TextureId) {
        unsafe { HasContext::delete_texture(self, glow::NativeTexture(texture.0)) }
    }

    fn active_texture_unit(&self, unit: u32) {
        unsafe { self.active_texture(glow::TEXTURE0 + unit) }
    }

    fn bind_texture_2d(&self, texture: Option<TextureId>) {
        unsafe {
            self.bind_texture(
                glow::TEXTURE_2D,
                texture.map(|id| glow::NativeTexture(id.0)),
            )
        }
    }

    fn allocate_texture_2d_rgba(&self, width: i32, height: i32, pixels: Option<&[u8]>) {
        unsafe {
            self.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA as i32,
                width,
                height,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(pixels),
            )
        }
    }

    fn set_texture_sampling_2d(&self, sampling: Sampling) {
        let filter = match sampling.filter {
            Filter::Nearest => glow::NEAREST,
            Filter::Linear => glow::LINEAR,
        } as i32;
        let wrap = match sampling.wrap {
            Wrap::ClampToEdge => glow::CLAMP_TO_EDGE,
            Wrap::Repeat => glow::REPEAT,
        } as i32;
        unsafe {
            self.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, filter);
            self.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, filter);
            self.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, wrap);
            self.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, wrap);
        }
    }

    fn create_framebuffer(&self) -> Option<FramebufferId> {
        unsafe { HasContext::create_framebuffer(self) }
            .ok()
            .map(|framebuffer| FramebufferId(framebuffer.0))
    }

    fn delete_framebuffer(&self, framebuffer: FramebufferId) {
        unsafe { HasContext::delete_framebuffer(self, glow::NativeFramebuffer(framebuffer.0)) }
    }

    fn bind_framebuffer(&self, framebuffer: Option<FramebufferId>) {
        unsafe {
            HasContext::bind_framebuffer(
                self,
                glow::FRAMEBUFFER,
                framebuffer.map(|id| glow::NativeFramebuffer(id.0)),
            )
        }
    }

    fn attach_color_texture(&self, texture: Option<TextureId>) {
        unsafe {
            self.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                texture.map(|id| glow::NativeTexture(id.0)),
                0,
            )
        }
    }

    fn attach_depth_renderbuffer(&self, renderbuffer: Option<RenderbufferId>) {
        unsafe {
            self.framebuffer_renderbuffer(
                glow::FRAMEBUFFER,
                glow::DEPTH_ATTACHMENT,
                glow::RENDERBUFFER,
                renderbuffer.map(|id| glow::NativeRenderbuffer(id.0)),
            )
        }
    }

    fn depth_renderbuffer(&self) -> Option<RenderbufferId> {
        // Attachment queries are invalid on the window-system framebuffer.
        self.current_framebuffer()?;
        unsafe {
            let kind = self.get_framebuffer_attachment_parameter_i32(
                glow::FRAMEBUFFER,
                glow::DEPTH_ATTACHMENT,
                glow::FRAMEBUFFER_ATTACHMENT_OBJECT_TYPE,
            );
            if u32::try_from(kind).ok() != Some(glow::RENDERBUFFER) {
                return None;
            }
            RenderbufferId::from_query(self.get_framebuffer_attachment_parameter_i32(
                glow::FRAMEBUFFER,
                glow::DEPTH_ATTACHMENT,
                glow::FRAMEBUFFER_ATTACHMENT_OBJECT_NAME,
            ))
        }
    }

    fn framebuffer_complete(&self) -> bool {
        unsafe { self.check_framebuffer_status(glow::FRAMEBUFFER) == glow::FRAMEBUFFER_COMPLETE }
    }

    fn viewport(&self) -> Viewport {
        let mut values = [0; 4];
        unsafe { self.get_parameter_i32_slice(glow::VIEWPORT, &mut values) };
        Viewport::from(values)
    }

    fn set_viewport(&self, viewport: Viewport) {
        unsafe {
            HasContext::viewport(
                self,
                viewport.x,
                viewport.y,
                viewport.width,
                viewport.height,
            )
        }
    }

    fn depth_test_enabled(&self) -> bool {
        unsafe { self.is_enabled(glow::DEPTH_TEST) }
    }

    fn set_depth_test(&self, enabled: bool) {
        unsafe {
            if enabled {
                self.enable(glow::DEPTH_TEST);
            } else {
                self.disable(glow::DEPTH_TEST);
            }
        }
    }

    fn set_clear_color(&self, rgba: [f32; 4]) {
        unsafe { self.clear_color(rgba[0], rgba[1], rgba[2], rgba[3]) }
    }

    fn clear(&self, mask: ClearMask) {
        unsafe { HasContext::clear(self, mask.bits()) }
    }

    fn draw_triangle_strip(&self, first: i32, count: i32) {
        unsafe { self.draw_arrays(glow::TRIANGLE_STRIP, first, count) }
    }

    fn read_pixels_rgba(&self, region: Viewport) -> Vec<u8> {
        let len = region.width.max(0) as usize * region.height.max(0) as usize * 4;
        let mut pixels = vec![0u8; len];
        unsafe {
            self.read_pixels(
                region.x,
                region.y,
                region.width,
                region.height,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelPackData::Slice(Some(&mut pixels)),
            )
        };
        pixels
    }

    fn current_program(&self) -> Option<ProgramId> {
        ProgramId::from_query(unsafe { self.get_parameter_i32(glow::CURRENT_PROGRAM) })
    }

    fn current_array_buffer(&self) -> Option<BufferId> {
        BufferId::from_query(unsafe { self.get_parameter_i32(glow::ARRAY_BUFFER_BINDING) })
    }

    fn current_framebuffer(&self) -> Option<FramebufferId> {
        FramebufferId::from_query(unsafe { self.get_parameter_i32(glow::FRAMEBUFFER_BINDING) })
    }

    fn current_texture_2d(&self) -> Option<TextureId> {
        TextureId::from_query(unsafe { self.get_parameter_i32(glow::TEXTURE_BINDING_2D) })
    }

    fn take_error(&self) -> Option<u32> {
        let code = unsafe { self.get_error() };
        (code != glow::NO_ERROR).then_some(code)
    }
}
