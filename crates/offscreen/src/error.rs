use crate::gl::ShaderStage;

/// Why a [`crate::ShaderProgram`] could not be built.
///
/// Only used for diagnostics: construction still reports a plain `None`.
#[derive(Debug, thiserror::Error)]
pub enum ProgramBuildError {
    #[error("driver refused to allocate a program object")]
    Allocation,
    #[error("failed to compile {stage} shader: {log}")]
    Compile { stage: ShaderStage, log: String },
    #[error("failed to link program: {log}")]
    Link { log: String },
}

/// Failure to set up the offscreen render target.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("texture blitter is unavailable in this context")]
    BlitterUnavailable,
    #[error("failed to allocate offscreen {0}")]
    Allocation(&'static str),
    #[error("offscreen framebuffer is incomplete ({width}x{height})")]
    Incomplete { width: i32, height: i32 },
}
