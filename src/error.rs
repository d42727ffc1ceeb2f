// error.rs — 致命错误类型（着色器构建）

use thiserror::Error;

/// Which program of the projection shader failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Link,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
            ShaderStage::Link => f.write_str("link"),
        }
    }
}

/// Shader build failure reported by the host graphics API.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{stage} shader failed to build: {message}")]
pub struct ShaderError {
    pub stage: ShaderStage,
    pub message: String,
}

impl ShaderError {
    pub fn new(stage: ShaderStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// Errors surfaced by [`crate::Panorama::initialize`].
///
/// Only shader construction is fatal; missing or broken media is logged and
/// leaves the surface blank instead.
#[derive(Debug, Error)]
pub enum PanoramaError {
    #[error(transparent)]
    Shader(#[from] ShaderError),
}
