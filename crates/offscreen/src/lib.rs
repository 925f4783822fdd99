//! Offscreen render-to-texture pipeline for OpenGL scene renderers.
//!
//! A host renderer draws its scene between two lifecycle hooks. The
//! [`RenderToTextureCoordinator`] listens to those hooks, swaps its own
//! texture-backed framebuffer in for whatever target the host had bound, and
//! afterwards composites the texture back with a full-screen quad:
//!
//! ```text
//!   host renderer ──▶ before_render() ──▶ offscreen framebuffer
//!         │                                      │
//!         └─▶ draw scene ────────────────────────┤
//!                                                ▼
//!   display ◀── real framebuffer ◀── TextureBlitter ◀── after_render()
//! ```
//!
//! The pieces, leaf first:
//! - `gl` is the narrow set of GPU calls the pipeline issues, written against
//!   typed non-zero handles. `glow::Context` implements it for real drivers.
//! - `context` associates components with one rendering context and provides
//!   the scoped make-current/restore guard used around construction and
//!   teardown.
//! - `program` compiles, links and introspects a shader program.
//! - `state` captures and restores the bindings a blit disturbs.
//! - `blitter` draws a texture into a framebuffer without leaking state.
//! - `coordinator` intercepts the host's render target once per frame.
//! - `frame` is the lifecycle seam the host drives.
//! - `soft` (behind the `soft` feature) is an in-memory reference device
//!   that executes the same calls headlessly; the test suites run the whole
//!   pipeline against it.
//!
//! Everything here is single-threaded by contract: components hold `Rc`
//! handles and must be driven from the thread that owns the context.

mod blitter;
mod context;
mod coordinator;
mod error;
mod frame;
pub mod gl;
mod lifecycle;
mod program;
#[cfg(any(test, feature = "soft"))]
pub mod soft;
mod state;

pub use blitter::{BlitOrientation, TextureBlitter};
pub use context::{RenderContext, ScopedCurrent};
pub use coordinator::{CoordinatorOptions, DisplaySize, RenderToTextureCoordinator};
pub use error::{ProgramBuildError, TargetError};
pub use frame::{render_frame, FrameListener, SceneRenderer};
pub use gl::{
    BufferId, ClearMask, Filter, FramebufferId, Gl, ProgramId, RenderbufferId, Sampling,
    ShaderId, ShaderStage, TextureId, Viewport, Wrap,
};
pub use program::ShaderProgram;
pub use state::StateSnapshot;
