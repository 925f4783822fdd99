use std::num::NonZeroU32;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use glutin::config::{Config, ConfigTemplateBuilder, GlConfig};
use glutin::context::{
    ContextApi, ContextAttributesBuilder, NotCurrentGlContext, PossiblyCurrentContext,
    PossiblyCurrentGlContext, Version,
};
use glutin::display::{GetGlDisplay, GlDisplay};
use glutin::surface::{GlSurface, Surface, SwapInterval, WindowSurface};
use glutin_winit::{DisplayBuilder, GlWindow};
use offscreen::{
    render_frame, BlitOrientation, CoordinatorOptions, DisplaySize, Gl, RenderContext,
    RenderToTextureCoordinator, Viewport,
};
use raw_window_handle::HasRawWindowHandle;
use rttconfig::SessionConfig;
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::{Window, WindowBuilder};

use crate::capture;
use crate::scene::SpinningTriangle;

/// The window's GL context together with its surface.
///
/// It is the only context in the process and stays current for the whole
/// run, so leaving a scope has nothing to restore.
pub struct HostContext {
    gl: glow::Context,
    surface: Surface<WindowSurface>,
    context: PossiblyCurrentContext,
}

impl HostContext {
    fn swap_buffers(&self) -> Result<()> {
        self.surface
            .swap_buffers(&self.context)
            .context("failed to swap window buffers")
    }

    fn resize(&self, width: u32, height: u32) {
        let (Some(width), Some(height)) = (NonZeroU32::new(width), NonZeroU32::new(height)) else {
            return;
        };
        self.surface.resize(&self.context, width, height);
    }
}

impl RenderContext for HostContext {
    type Api = glow::Context;
    type Saved = ();

    fn gl(&self) -> &glow::Context {
        &self.gl
    }

    fn enter(&self) {
        if self.context.is_current() {
            return;
        }
        if let Err(err) = self.context.make_current(&self.surface) {
            tracing::warn!(error = %err, "failed to make the window context current");
        }
    }

    fn leave(&self, _saved: ()) {}
}

enum Flow {
    Continue,
    Finished,
}

/// Per-window state. Field order is drop order: GL objects go before the
/// context that owns them, and the window goes last.
struct Viewer {
    coordinator: RenderToTextureCoordinator<HostContext>,
    scene: SpinningTriangle<HostContext>,
    host: Rc<HostContext>,
    window: Window,
    size: (u32, u32),
    started: Instant,
    rendered: u64,
    frame_limit: u64,
    capture: Option<PathBuf>,
}

impl Viewer {
    fn redraw(&mut self) -> Result<Flow> {
        let time = self.started.elapsed().as_secs_f64();
        render_frame(&mut self.coordinator, &mut self.scene, time);
        self.rendered += 1;

        let finished = self.frame_limit != 0 && self.rendered >= self.frame_limit;
        if finished {
            if let Some(path) = &self.capture {
                let (width, height) = self.size;
                capture::save_png(self.host.gl(), width, height, path)?;
            }
        }
        self.host.swap_buffers()?;

        Ok(if finished {
            tracing::info!(frames = self.rendered, "frame limit reached");
            Flow::Finished
        } else {
            Flow::Continue
        })
    }

    fn resized(&mut self, size: PhysicalSize<u32>) {
        if (size.width, size.height) == self.size || size.width == 0 || size.height == 0 {
            return;
        }
        self.host.resize(size.width, size.height);
        self.size = (size.width, size.height);
        let (target_width, target_height) = self.coordinator.offscreen_size();
        tracing::debug!(
            width = size.width,
            height = size.height,
            target_width,
            target_height,
            "window resized; offscreen target keeps its size"
        );
    }
}

pub fn run(config: &SessionConfig) -> Result<()> {
    let display = DisplaySize::new(
        config.display.width,
        config.display.height,
        config.display.scale,
    );
    let (width, height) = display.physical();
    let size = (width.unsigned_abs(), height.unsigned_abs());

    let event_loop = EventLoop::new().context("failed to create event loop")?;
    let window_builder = WindowBuilder::new()
        .with_title("rttview")
        .with_inner_size(PhysicalSize::new(size.0, size.1))
        .with_resizable(false);

    let template = ConfigTemplateBuilder::new()
        .with_alpha_size(8)
        .with_depth_size(24);
    let (window, gl_config) = DisplayBuilder::new()
        .with_window_builder(Some(window_builder.clone()))
        .build(&event_loop, template, pick_config)
        .map_err(|err| anyhow!("failed to create window: {err}"))?;

    let raw_window_handle = window.as_ref().map(|window| window.raw_window_handle());
    let gl_display = gl_config.display();
    let gles2 = ContextAttributesBuilder::new()
        .with_context_api(ContextApi::Gles(Some(Version::new(2, 0))))
        .build(raw_window_handle);
    let fallback = ContextAttributesBuilder::new().build(raw_window_handle);
    let not_current = unsafe {
        gl_display
            .create_context(&gl_config, &gles2)
            .or_else(|err| {
                tracing::debug!(error = %err, "GLES 2.0 unavailable; trying the default API");
                gl_display.create_context(&gl_config, &fallback)
            })
            .context("failed to create an OpenGL context")?
    };

    let window = match window {
        Some(window) => window,
        None => glutin_winit::finalize_window(&event_loop, window_builder, &gl_config)
            .map_err(|err| anyhow!("failed to create window: {err}"))?,
    };
    let surface_attributes = window.build_surface_attributes(Default::default());
    let surface = unsafe {
        gl_display
            .create_window_surface(&gl_config, &surface_attributes)
            .context("failed to create window surface")?
    };
    let context = not_current
        .make_current(&surface)
        .context("failed to make the window context current")?;
    if let Err(err) = surface.set_swap_interval(&context, SwapInterval::Wait(NonZeroU32::MIN)) {
        tracing::debug!(error = %err, "vsync unavailable");
    }

    let gl = unsafe {
        glow::Context::from_loader_function_cstr(|symbol| gl_display.get_proc_address(symbol))
    };
    let host = Rc::new(HostContext {
        gl,
        surface,
        context,
    });
    host.gl().set_viewport(Viewport::covering(width, height));

    let options = CoordinatorOptions {
        orientation: if config.blit.invert_y {
            BlitOrientation::InvertY
        } else {
            BlitOrientation::Normal
        },
    };
    let coordinator = RenderToTextureCoordinator::with_options(host.clone(), display, options);
    let scene = SpinningTriangle::new(host.clone(), config.scene.clear_color, config.scene.spin)?;

    let capture = config.run.capture.clone();
    let frame_limit = match (config.run.frames, &capture) {
        (0, Some(_)) => 1,
        (frames, _) => frames,
    };
    tracing::info!(
        width,
        height,
        orientation = ?options.orientation,
        frame_limit,
        "rendering through offscreen target"
    );

    let mut viewer = Viewer {
        coordinator,
        scene,
        host,
        window,
        size,
        started: Instant::now(),
        rendered: 0,
        frame_limit,
        capture,
    };

    let mut failure = None;
    let failure_slot = &mut failure;
    event_loop
        .run(move |event, elwt| {
            elwt.set_control_flow(ControlFlow::Poll);
            match event {
                Event::WindowEvent { window_id, event } if window_id == viewer.window.id() => {
                    match event {
                        WindowEvent::CloseRequested => elwt.exit(),
                        WindowEvent::Resized(size) => viewer.resized(size),
                        WindowEvent::RedrawRequested => match viewer.redraw() {
                            Ok(Flow::Continue) => {}
                            Ok(Flow::Finished) => elwt.exit(),
                            Err(err) => {
                                *failure_slot = Some(err);
                                elwt.exit();
                            }
                        },
                        _ => {}
                    }
                }
                Event::AboutToWait => viewer.window.request_redraw(),
                _ => {}
            }
        })
        .map_err(|err| anyhow!("event loop error: {err}"))?;

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Prefers the config with the fewest multisample buffers; the offscreen
/// target is single-sampled.
fn pick_config(configs: Box<dyn Iterator<Item = Config> + '_>) -> Config {
    configs
        .reduce(|best, config| {
            if config.num_samples() < best.num_samples() {
                config
            } else {
                best
            }
        })
        .expect("glutin only calls the picker with a non-empty set")
}
