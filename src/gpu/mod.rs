// gpu/mod.rs — 基于 wgpu / winit 的宿主实现

pub mod assets;
pub mod device;
pub mod renderer;
pub mod surface;
pub mod video;

pub use assets::{prepare_panorama, start_load_image, AssetStore, LoadedImage};
pub use device::{TextureId, WgpuDevice, WgpuMaterial};
pub use renderer::Renderer;
pub use surface::PanoramaMesh;
pub use video::{FileVideo, FileVideoFactory, FrameSlot};
