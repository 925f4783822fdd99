use crate::gl::{BufferId, FramebufferId, Gl, ProgramId, TextureId};

/// The bindings a blit touches, captured at one instant.
///
/// Owns nothing; it is a record taken right before a draw mutates state and
/// handed back to [`StateSnapshot::restore`] right after.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use = "a snapshot does nothing unless it is restored"]
pub struct StateSnapshot {
    pub program: Option<ProgramId>,
    pub array_buffer: Option<BufferId>,
    pub framebuffer: Option<FramebufferId>,
    pub texture_2d: Option<TextureId>,
    pub depth_test: bool,
}

impl StateSnapshot {
    pub fn store<G: Gl + ?Sized>(gl: &G) -> Self {
        Self {
            program: gl.current_program(),
            array_buffer: gl.current_array_buffer(),
            framebuffer: gl.current_framebuffer(),
            texture_2d: gl.current_texture_2d(),
            depth_test: gl.depth_test_enabled(),
        }
    }

    /// Writes the captured bindings back.
    ///
    /// Depth testing is re-enabled when it was on at capture time and left
    /// alone otherwise: the blitter always turns it off before drawing, so
    /// "off" needs no restoring.
    pub fn restore<G: Gl + ?Sized>(self, gl: &G) {
        gl.use_program(self.program);
        gl.bind_array_buffer(self.array_buffer);
        gl.bind_framebuffer(self.framebuffer);
        gl.bind_texture_2d(self.texture_2d);
        if self.depth_test {
            gl.set_depth_test(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::Sampling;
    use crate::soft::SoftContext;

    #[test]
    fn restore_puts_bindings_back() {
        let gl = SoftContext::headless(8, 8);
        let buffer = gl.create_buffer().expect("buffer");
        let texture = gl.create_texture().expect("texture");
        let framebuffer = gl.create_framebuffer().expect("framebuffer");
        gl.bind_array_buffer(Some(buffer));
        gl.bind_texture_2d(Some(texture));
        gl.allocate_texture_2d_rgba(8, 8, None);
        gl.set_texture_sampling_2d(Sampling::NEAREST_CLAMP);
        gl.set_depth_test(true);

        let snapshot = StateSnapshot::store(&gl);

        let other_texture = gl.create_texture().expect("texture");
        gl.bind_framebuffer(Some(framebuffer));
        gl.bind_texture_2d(Some(other_texture));
        gl.bind_array_buffer(None);
        gl.set_depth_test(false);

        snapshot.restore(&gl);
        assert_eq!(StateSnapshot::store(&gl), snapshot);
        assert_eq!(gl.take_error(), None);
    }

    #[test]
    fn restore_never_disables_depth_test() {
        let gl = SoftContext::headless(2, 2);
        gl.set_depth_test(false);
        let snapshot = StateSnapshot::store(&gl);
        assert!(!snapshot.depth_test);

        gl.set_depth_test(true);
        snapshot.restore(&gl);
        assert!(gl.depth_test_enabled());
    }
}
