// lib.rs — 360° 全景投影：等距柱状投影着色器 + 纹理源管理

pub mod camera;
pub mod config;
pub mod error;
pub mod gpu;
pub mod host;
pub mod mesh;
pub mod panorama;
pub mod projection;
pub mod shader;
pub mod texture_source;

#[cfg(test)]
mod testing;

pub use error::{PanoramaError, ShaderError};
pub use panorama::Panorama;
pub use shader::Precision;
pub use texture_source::{MediaConfig, MediaSource, TextureSourceManager, UploadCadence};
