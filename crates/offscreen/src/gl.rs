//! GPU call surface used by the pipeline.
//!
//! Object names are typed `NonZeroU32` newtypes; "nothing bound" and "the
//! default framebuffer" are `None` rather than a zero handle. Every method
//! operates on the context that is current on the calling thread, exactly
//! like the underlying OpenGL entry points.

use std::fmt;
use std::num::NonZeroU32;
use std::ops::BitOr;

#[cfg(not(target_arch = "wasm32"))]
mod glow_backend;

macro_rules! gl_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(NonZeroU32);

        impl $name {
            /// Wraps a raw object name, rejecting the zero sentinel.
            pub fn new(raw: u32) -> Option<Self> {
                NonZeroU32::new(raw).map(Self)
            }

            /// Converts the result of an integer state query into a handle.
            pub fn from_query(raw: i32) -> Option<Self> {
                u32::try_from(raw).ok().and_then(Self::new)
            }

            pub fn get(self) -> NonZeroU32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

gl_handle!(
    /// Linked (or linkable) program object.
    ProgramId
);
gl_handle!(ShaderId);
gl_handle!(BufferId);
gl_handle!(TextureId);
gl_handle!(
    /// Framebuffer object. The default framebuffer is represented by `None`.
    FramebufferId
);
gl_handle!(RenderbufferId);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Rectangle that normalized device coordinates map onto, in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Viewport {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Viewport anchored at the origin covering `width` x `height` pixels.
    pub const fn covering(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn as_array(self) -> [i32; 4] {
        [self.x, self.y, self.width, self.height]
    }
}

impl From<[i32; 4]> for Viewport {
    fn from(value: [i32; 4]) -> Self {
        Self::new(value[0], value[1], value[2], value[3])
    }
}

/// Buffers affected by [`Gl::clear`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClearMask {
    pub color: bool,
    pub depth: bool,
}

impl ClearMask {
    pub const COLOR: Self = Self {
        color: true,
        depth: false,
    };
    pub const DEPTH: Self = Self {
        color: false,
        depth: true,
    };

    pub(crate) fn bits(self) -> u32 {
        let mut bits = 0;
        if self.color {
            bits |= glow::COLOR_BUFFER_BIT;
        }
        if self.depth {
            bits |= glow::DEPTH_BUFFER_BIT;
        }
        bits
    }
}

impl BitOr for ClearMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            color: self.color || rhs.color,
            depth: self.depth || rhs.depth,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wrap {
    ClampToEdge,
    Repeat,
}

/// Filtering and wrapping applied to both axes of the bound 2D texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sampling {
    pub filter: Filter,
    pub wrap: Wrap,
}

impl Sampling {
    pub const LINEAR_CLAMP: Self = Self {
        filter: Filter::Linear,
        wrap: Wrap::ClampToEdge,
    };
    pub const NEAREST_CLAMP: Self = Self {
        filter: Filter::Nearest,
        wrap: Wrap::ClampToEdge,
    };
}

/// The GPU entry points the pipeline relies on.
///
/// Implementations talking to a real driver require the owning context to be
/// current on the calling thread; see [`crate::RenderContext`] for how the
/// components guarantee that around construction and teardown.
pub trait Gl {
    fn create_program(&self) -> Option<ProgramId>;
    fn delete_program(&self, program: ProgramId);
    fn create_shader(&self, stage: ShaderStage) -> Option<ShaderId>;
    fn delete_shader(&self, shader: ShaderId);
    /// Uploads `source`, compiles it and reports the compile status.
    fn compile_shader(&self, shader: ShaderId, source: &str) -> bool;
    fn shader_info_log(&self, shader: ShaderId) -> String;
    fn attach_shader(&self, program: ProgramId, shader: ShaderId);
    /// Links and validates `program`, reporting the link status.
    fn link_program(&self, program: ProgramId) -> bool;
    fn program_info_log(&self, program: ProgramId) -> String;
    /// Raw names of every active vertex attribute, as reported by the driver.
    fn active_attribute_names(&self, program: ProgramId) -> Vec<Vec<u8>>;
    /// Raw names of every active uniform, as reported by the driver.
    fn active_uniform_names(&self, program: ProgramId) -> Vec<Vec<u8>>;
    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<u32>;
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<i32>;
    fn use_program(&self, program: Option<ProgramId>);
    fn uniform_1_i32(&self, location: i32, value: i32);
    /// Uploads a column-major 4x4 matrix.
    fn uniform_matrix_4_f32(&self, location: i32, matrix: &[f32; 16]);

    fn create_buffer(&self) -> Option<BufferId>;
    fn delete_buffer(&self, buffer: BufferId);
    fn bind_array_buffer(&self, buffer: Option<BufferId>);
    /// Replaces the contents of the bound array buffer with static-draw data.
    fn array_buffer_data_static(&self, data: &[u8]);
    fn enable_vertex_attribute(&self, location: u32);
    /// Points `location` at `components` floats inside the bound array buffer.
    fn vertex_attribute_f32(&self, location: u32, components: i32, stride: i32, offset: i32);

    fn create_texture(&self) -> Option<TextureId>;
    fn delete_texture(&self, texture: TextureId);
    /// Selects the texture unit subsequent 2D binds apply to.
    fn active_texture_unit(&self, unit: u32);
    fn bind_texture_2d(&self, texture: Option<TextureId>);
    /// Allocates RGBA8 storage for the bound 2D texture, optionally filled.
    fn allocate_texture_2d_rgba(&self, width: i32, height: i32, pixels: Option<&[u8]>);
    fn set_texture_sampling_2d(&self, sampling: Sampling);

    fn create_framebuffer(&self) -> Option<FramebufferId>;
    fn delete_framebuffer(&self, framebuffer: FramebufferId);
    fn bind_framebuffer(&self, framebuffer: Option<FramebufferId>);
    /// Attaches a 2D texture to colour attachment 0 of the bound framebuffer.
    fn attach_color_texture(&self, texture: Option<TextureId>);
    fn attach_depth_renderbuffer(&self, renderbuffer: Option<RenderbufferId>);
    /// Renderbuffer attached as depth on the bound framebuffer, if any.
    fn depth_renderbuffer(&self) -> Option<RenderbufferId>;
    fn framebuffer_complete(&self) -> bool;

    fn viewport(&self) -> Viewport;
    fn set_viewport(&self, viewport: Viewport);
    fn depth_test_enabled(&self) -> bool;
    fn set_depth_test(&self, enabled: bool);
    fn set_clear_color(&self, rgba: [f32; 4]);
    fn clear(&self, mask: ClearMask);
    fn draw_triangle_strip(&self, first: i32, count: i32);
    /// Reads RGBA8 pixels from the bound framebuffer, bottom row first.
    fn read_pixels_rgba(&self, region: Viewport) -> Vec<u8>;

    fn current_program(&self) -> Option<ProgramId>;
    fn current_array_buffer(&self) -> Option<BufferId>;
    fn current_framebuffer(&self) -> Option<FramebufferId>;
    /// 2D texture bound on the active texture unit.
    fn current_texture_2d(&self) -> Option<TextureId>;

    /// Returns and clears the oldest recorded error code.
    fn take_error(&self) -> Option<u32>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_reject_zero_and_negative_queries() {
        assert!(ProgramId::new(0).is_none());
        assert!(TextureId::from_query(0).is_none());
        assert!(FramebufferId::from_query(-1).is_none());
        assert_eq!(BufferId::from_query(7).map(|id| id.get().get()), Some(7));
    }

    #[test]
    fn clear_mask_combines_buffers() {
        let mask = ClearMask::COLOR | ClearMask::DEPTH;
        assert!(mask.color && mask.depth);
        assert_eq!(mask.bits(), glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);
        assert_eq!(ClearMask::COLOR.bits(), glow::COLOR_BUFFER_BIT);
    }

    #[test]
    fn viewport_round_trips_through_array() {
        let viewport = Viewport::new(4, 8, 640, 480);
        assert_eq!(Viewport::from(viewport.as_array()), viewport);
        assert_eq!(Viewport::covering(3, 2), Viewport::new(0, 0, 3, 2));
    }
}
