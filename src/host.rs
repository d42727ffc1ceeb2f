// host.rs — 宿主接口：图形设备、材质、资源表、视频元素、被装饰的网格
//
// 核心逻辑不持有任何全局对象，所有宿主能力都通过这些 trait 注入。

use futures::channel::oneshot;

use crate::error::ShaderError;
use crate::shader::{Precision, ShaderDefinition};

/// Opaque handle of an asset in the host's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 16-bit RGB without alpha, used for streamed video frames.
    Rgb565,
    Rgba8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    Repeat,
    ClampToEdge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureOptions {
    pub format: PixelFormat,
    pub mipmaps: bool,
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
}

impl TextureOptions {
    /// Options for a texture continuously overwritten by video frames.
    ///
    /// U repeats so the projection seam samples across the wrap, V clamps so
    /// the poles do not bleed into the opposite edge.
    pub const fn video() -> Self {
        Self {
            format: PixelFormat::Rgb565,
            mipmaps: false,
            min_filter: FilterMode::Linear,
            mag_filter: FilterMode::Linear,
            address_u: AddressMode::Repeat,
            address_v: AddressMode::ClampToEdge,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrossOrigin {
    #[default]
    Anonymous,
    UseCredentials,
}

/// GPU side of the host.
pub trait GraphicsDevice {
    type Texture: Clone + PartialEq + std::fmt::Debug;
    type Shader;
    type Material: Material<Texture = Self::Texture>;
    /// What a video element hands over as the texture's pixel source.
    type FrameSource;

    fn fragment_precision(&self) -> Precision;

    fn create_shader(&mut self, definition: &ShaderDefinition) -> Result<Self::Shader, ShaderError>;

    fn create_material(&mut self, shader: Self::Shader) -> Self::Material;

    fn create_texture(&mut self, options: &TextureOptions) -> Self::Texture;

    /// Attaches the pixel source that later [`GraphicsDevice::upload`] calls copy from.
    fn set_texture_source(&mut self, texture: &Self::Texture, source: Self::FrameSource);

    /// Copies the current pixels of the texture's source into GPU memory.
    /// Completion on the GPU is not awaited.
    fn upload(&mut self, texture: &Self::Texture);

    /// Frees a texture that is no longer bound anywhere. Unknown handles are
    /// ignored.
    fn release_texture(&mut self, texture: &Self::Texture);
}

/// Material handle. Clones refer to the same material.
pub trait Material: Clone {
    type Texture;

    fn set_parameter(&mut self, name: &str, texture: Option<Self::Texture>);

    fn parameter(&self, name: &str) -> Option<Self::Texture>;
}

/// Asset lookups the texture source manager needs.
pub trait AssetRegistry<T> {
    /// Decoded texture of an image asset, `None` if unknown or not loaded.
    fn texture(&self, id: AssetId) -> Option<T>;

    /// URL (or path) the media stack can open for a video asset.
    fn file_url(&self, id: AssetId) -> Option<String>;
}

/// Host media stack.
pub trait MediaFactory {
    type Element: VideoElement;

    fn create_video(&mut self) -> Self::Element;
}

pub trait VideoElement {
    type FrameSource;

    fn set_src(&mut self, url: &str);

    fn set_cross_origin(&mut self, cross_origin: CrossOrigin);

    fn set_loop(&mut self, looping: bool);

    fn play(&mut self);

    /// Fires `ready` once when the element can start playing. Dropping the
    /// sender without sending means playback never became ready.
    fn on_can_play(&mut self, ready: oneshot::Sender<()>);

    fn frame_source(&self) -> Self::FrameSource;
}

/// The externally owned entity the panorama decorates.
pub trait PanoramaSurface<M> {
    /// Number of drawable sub-meshes; `0` when the entity has no model.
    fn mesh_instance_count(&self) -> usize;

    fn set_mesh_material(&mut self, index: usize, material: M);
}
