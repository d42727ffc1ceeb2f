// panorama.rs — 全景组件：初始化（着色器 + 纹理 + 材质）与逐帧更新

use crate::error::PanoramaError;
use crate::host::{AssetRegistry, GraphicsDevice, Material, MediaFactory, PanoramaSurface, VideoElement};
use crate::shader::{ShaderDefinition, TEXTURE_PARAMETER};
use crate::texture_source::{MediaConfig, TextureSourceManager};

/// Decorates a surface with the equirectangular projection material.
///
/// Create it with [`Panorama::initialize`] and call [`Panorama::update`] once
/// per frame before drawing. Re-running `initialize` is how new media gets
/// picked up.
pub struct Panorama<D: GraphicsDevice, E> {
    material: D::Material,
    textures: TextureSourceManager<D::Texture, E>,
}

impl<D, E> Panorama<D, E>
where
    D: GraphicsDevice,
    E: VideoElement<FrameSource = D::FrameSource>,
{
    pub fn initialize<A, M, S>(
        config: &MediaConfig,
        device: &mut D,
        assets: &A,
        media: &mut M,
        surface: &mut S,
    ) -> Result<Self, PanoramaError>
    where
        A: AssetRegistry<D::Texture>,
        M: MediaFactory<Element = E>,
        S: PanoramaSurface<D::Material>,
    {
        // 精度取决于设备（移动端 / 桌面端）
        let definition = ShaderDefinition::new(device.fragment_precision());
        let shader = device.create_shader(&definition)?;
        let mut material = device.create_material(shader);

        let textures = TextureSourceManager::resolve(config, device, assets, media);
        material.set_parameter(TEXTURE_PARAMETER, textures.texture().cloned());

        let count = surface.mesh_instance_count();
        if count == 0 {
            log::warn!("panorama surface has no mesh instances");
        }
        for index in 0..count {
            surface.set_mesh_material(index, material.clone());
        }
        log::debug!(
            "panorama initialized ({:?} precision, {} mesh instances)",
            definition.precision,
            count
        );

        Ok(Self { material, textures })
    }

    /// Per-frame hook. Uploads the video frame on every second call.
    pub fn update(&mut self, device: &mut D) {
        self.textures.on_frame(device);
    }

    /// Tears the panorama down after a replacement has been initialized on
    /// the same surface.
    pub fn release(self, device: &mut D) {
        self.textures.release(device);
    }

    pub fn material(&self) -> &D::Material {
        &self.material
    }

    pub fn texture(&self) -> Option<&D::Texture> {
        self.textures.texture()
    }

    pub fn is_video(&self) -> bool {
        self.textures.source().is_some_and(|s| s.is_video())
    }
}
