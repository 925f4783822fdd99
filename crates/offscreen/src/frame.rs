/// Receives the host renderer's per-frame lifecycle callbacks.
///
/// For every frame the host calls `before_render`, issues its scene's draw
/// calls, then calls `after_render`; both receive the frame time in seconds.
pub trait FrameListener {
    fn before_render(&mut self, time: f64);
    fn after_render(&mut self, time: f64);
}

/// The host side of the contract: something that draws a scene into whatever
/// render target is currently bound.
pub trait SceneRenderer {
    fn draw(&mut self, time: f64);
}

/// Runs one frame in the required order: listener, scene, listener.
pub fn render_frame<L, S>(listener: &mut L, scene: &mut S, time: f64)
where
    L: FrameListener + ?Sized,
    S: SceneRenderer + ?Sized,
{
    listener.before_render(time);
    scene.draw(time);
    listener.after_render(time);
}

impl<F: FnMut(f64)> SceneRenderer for F {
    fn draw(&mut self, time: f64) {
        self(time)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    struct Recorder<'a>(&'a RefCell<Vec<String>>);

    impl FrameListener for Recorder<'_> {
        fn before_render(&mut self, time: f64) {
            self.0.borrow_mut().push(format!("before {time}"));
        }

        fn after_render(&mut self, time: f64) {
            self.0.borrow_mut().push(format!("after {time}"));
        }
    }

    #[test]
    fn frame_runs_hooks_around_scene() {
        let log = RefCell::new(Vec::new());
        let mut listener = Recorder(&log);
        let mut scene = |time: f64| log.borrow_mut().push(format!("draw {time}"));

        render_frame(&mut listener, &mut scene, 0.5);

        assert_eq!(*log.borrow(), ["before 0.5", "draw 0.5", "after 0.5"]);
    }
}
