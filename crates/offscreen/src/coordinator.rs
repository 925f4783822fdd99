use std::rc::Rc;

use crate::blitter::{BlitOrientation, TextureBlitter};
use crate::context::{RenderContext, ScopedCurrent};
use crate::error::TargetError;
use crate::frame::FrameListener;
use crate::gl::{ClearMask, FramebufferId, Gl, Sampling, TextureId, Viewport};

/// Display extent in logical units plus the factor converting them to
/// physical pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplaySize {
    pub width: f64,
    pub height: f64,
    pub scale: f64,
}

impl DisplaySize {
    pub fn new(width: f64, height: f64, scale: f64) -> Self {
        Self {
            width,
            height,
            scale,
        }
    }

    pub fn from_physical(width: u32, height: u32) -> Self {
        Self::new(f64::from(width), f64::from(height), 1.0)
    }

    /// Size in physical pixels, never smaller than 1x1.
    pub fn physical(&self) -> (i32, i32) {
        let convert = |logical: f64| (logical * self.scale).round().max(1.0) as i32;
        (convert(self.width), convert(self.height))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CoordinatorOptions {
    /// Orientation used when compositing the offscreen texture back.
    pub orientation: BlitOrientation,
}

/// Framebuffer + colour texture the scene is redirected into.
#[derive(Debug)]
struct OffscreenTarget {
    framebuffer: FramebufferId,
    texture: TextureId,
    width: i32,
    height: i32,
}

impl OffscreenTarget {
    /// Creates the target while the host's framebuffer is still bound, so its
    /// depth renderbuffer can be shared. Restores the framebuffer and texture
    /// bindings before returning.
    fn create<G: Gl>(gl: &G, width: i32, height: i32) -> Result<Self, TargetError> {
        let previous_framebuffer = gl.current_framebuffer();
        let previous_texture = gl.current_texture_2d();
        let depth = gl.depth_renderbuffer();
        if depth.is_none() {
            tracing::debug!(
                host = ?previous_framebuffer,
                "host target exposes no depth renderbuffer; offscreen target has no depth"
            );
        }

        let framebuffer = gl
            .create_framebuffer()
            .ok_or(TargetError::Allocation("framebuffer"))?;
        let Some(texture) = gl.create_texture() else {
            gl.delete_framebuffer(framebuffer);
            return Err(TargetError::Allocation("texture"));
        };

        gl.bind_framebuffer(Some(framebuffer));
        gl.bind_texture_2d(Some(texture));
        gl.allocate_texture_2d_rgba(width, height, None);
        gl.set_texture_sampling_2d(Sampling::LINEAR_CLAMP);
        gl.attach_color_texture(Some(texture));
        if depth.is_some() {
            gl.attach_depth_renderbuffer(depth);
        }
        let complete = gl.framebuffer_complete();

        gl.bind_texture_2d(previous_texture);
        gl.bind_framebuffer(previous_framebuffer);

        if !complete {
            gl.delete_texture(texture);
            gl.delete_framebuffer(framebuffer);
            return Err(TargetError::Incomplete { width, height });
        }

        tracing::debug!(%framebuffer, %texture, width, height, ?depth, "created offscreen target");
        Ok(Self {
            framebuffer,
            texture,
            width,
            height,
        })
    }

    fn viewport(&self) -> Viewport {
        Viewport::covering(self.width, self.height)
    }
}

/// What was bound before the current frame was intercepted.
#[derive(Clone, Copy, Debug)]
struct FrameRenderInfo {
    framebuffer: Option<FramebufferId>,
    viewport: Viewport,
}

/// Redirects a host renderer's frame into an offscreen texture and
/// composites it back onto the host's own target.
///
/// Register it as the host's [`FrameListener`]. Per frame:
///
/// * `before_render` creates the offscreen target on first use, records the
///   bound framebuffer and viewport, binds the offscreen framebuffer sized to
///   the display and clears its colour buffer;
/// * the host draws its scene;
/// * `after_render` blits the texture into the recorded framebuffer and
///   restores the recorded framebuffer and viewport.
///
/// If the blitter or the offscreen target cannot be set up, the coordinator
/// disables itself permanently and the host renders straight to its own
/// target. The target is sized once; display resizes are not followed.
pub struct RenderToTextureCoordinator<C: RenderContext> {
    context: Rc<C>,
    width: i32,
    height: i32,
    options: CoordinatorOptions,
    blitter: Option<TextureBlitter<C>>,
    target: Option<OffscreenTarget>,
    frame: Option<FrameRenderInfo>,
}

impl<C: RenderContext> RenderToTextureCoordinator<C> {
    pub fn new(context: Rc<C>, display: DisplaySize) -> Self {
        Self::with_options(context, display, CoordinatorOptions::default())
    }

    pub fn with_options(context: Rc<C>, display: DisplaySize, options: CoordinatorOptions) -> Self {
        let (width, height) = display.physical();
        let blitter = TextureBlitter::new(context.clone());
        Self {
            context,
            width,
            height,
            options,
            blitter: Some(blitter),
            target: None,
            frame: None,
        }
    }

    /// Physical size of the offscreen target.
    pub fn offscreen_size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    pub fn offscreen_texture(&self) -> Option<TextureId> {
        self.target.as_ref().map(|target| target.texture)
    }

    pub fn offscreen_framebuffer(&self) -> Option<FramebufferId> {
        self.target.as_ref().map(|target| target.framebuffer)
    }

    /// True between `before_render` and the matching `after_render`.
    pub fn is_intercepting(&self) -> bool {
        self.frame.is_some()
    }

    pub fn is_disabled(&self) -> bool {
        self.blitter.is_none()
    }

    /// Swaps the offscreen framebuffer in for whatever the host has bound.
    pub fn before_render(&mut self, time: f64) {
        let Some(blitter) = self.blitter.as_mut() else {
            return;
        };

        if self.target.is_none() {
            let created = if blitter.ensure_ready() {
                OffscreenTarget::create(self.context.gl(), self.width, self.height)
            } else {
                Err(TargetError::BlitterUnavailable)
            };
            match created {
                Ok(target) => self.target = Some(target),
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        "render-to-texture disabled; scene renders directly to the host target"
                    );
                    self.blitter = None;
                    return;
                }
            }
        }
        let Some(target) = self.target.as_ref() else {
            return;
        };

        let gl = self.context.gl();
        let current = FrameRenderInfo {
            framebuffer: gl.current_framebuffer(),
            viewport: gl.viewport(),
        };
        match self.frame {
            // A repeated before_render would otherwise record the offscreen
            // framebuffer as the host's.
            Some(pending) => tracing::warn!(
                host = ?pending.framebuffer,
                "before_render called twice without after_render; keeping first host target"
            ),
            None => self.frame = Some(current),
        }

        gl.bind_framebuffer(Some(target.framebuffer));
        gl.set_viewport(target.viewport());
        gl.clear(ClearMask::COLOR);
        tracing::trace!(time, "intercepted frame");
    }

    /// Composites the offscreen texture into the host target and restores
    /// the host's framebuffer and viewport.
    pub fn after_render(&mut self, time: f64) {
        let (Some(frame), Some(target), Some(blitter)) =
            (self.frame, self.target.as_ref(), self.blitter.as_mut())
        else {
            return;
        };
        self.frame = None;

        let gl = self.context.gl();
        gl.set_viewport(target.viewport());
        blitter.blit(target.texture, frame.framebuffer, self.options.orientation);

        gl.bind_framebuffer(frame.framebuffer);
        gl.set_viewport(frame.viewport);
        tracing::trace!(time, host = ?frame.framebuffer, "composited frame");
    }
}

impl<C: RenderContext> FrameListener for RenderToTextureCoordinator<C> {
    fn before_render(&mut self, time: f64) {
        RenderToTextureCoordinator::before_render(self, time);
    }

    fn after_render(&mut self, time: f64) {
        RenderToTextureCoordinator::after_render(self, time);
    }
}

impl<C: RenderContext> Drop for RenderToTextureCoordinator<C> {
    fn drop(&mut self) {
        let Some(target) = self.target.take() else {
            return;
        };
        let scope = ScopedCurrent::enter(&*self.context);
        scope.gl().delete_framebuffer(target.framebuffer);
        scope.gl().delete_texture(target.texture);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_size_applies_scale_and_rounds() {
        assert_eq!(DisplaySize::new(375.0, 667.0, 2.0).physical(), (750, 1334));
        assert_eq!(DisplaySize::new(100.4, 50.6, 1.0).physical(), (100, 51));
        assert_eq!(DisplaySize::from_physical(1920, 1080).physical(), (1920, 1080));
    }

    #[test]
    fn physical_size_never_collapses_to_zero() {
        assert_eq!(DisplaySize::new(0.0, 0.2, 1.0).physical(), (1, 1));
    }
}
