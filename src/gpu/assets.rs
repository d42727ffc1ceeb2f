// gpu/assets.rs — 资源表与后台图片加载

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::thread;

use image::io::Reader as ImageReader;
use image::{GenericImage, GenericImageView, Rgba, RgbaImage};

use super::device::TextureId;
use crate::host::{AssetId, AssetRegistry};

/// Decoded textures and media file paths the viewer knows about.
#[derive(Debug, Default)]
pub struct AssetStore {
    next_id: u32,
    textures: HashMap<AssetId, TextureId>,
    files: HashMap<AssetId, PathBuf>,
}

impl AssetStore {
    fn allocate(&mut self) -> AssetId {
        self.next_id += 1;
        AssetId(self.next_id)
    }

    pub fn add_texture(&mut self, texture: TextureId) -> AssetId {
        let id = self.allocate();
        self.textures.insert(id, texture);
        id
    }

    pub fn add_file(&mut self, path: PathBuf) -> AssetId {
        let id = self.allocate();
        self.files.insert(id, path);
        id
    }

    /// Forgets an asset. Returns the texture the caller should release, if
    /// the asset was an image.
    pub fn remove(&mut self, id: AssetId) -> Option<TextureId> {
        self.files.remove(&id);
        self.textures.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.textures.len() + self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AssetRegistry<TextureId> for AssetStore {
    fn texture(&self, id: AssetId) -> Option<TextureId> {
        self.textures.get(&id).copied()
    }

    fn file_url(&self, id: AssetId) -> Option<String> {
        self.files.get(&id).map(|p| p.to_string_lossy().into_owned())
    }
}

/// Fits an equirectangular image to the GPU limit and pads it to 2:1.
pub fn prepare_panorama(img: RgbaImage, max_texture_dimension: u32) -> RgbaImage {
    let (src_w, src_h) = img.dimensions();

    // 如果图片超过 GPU 限制，则缩放到限制内
    let img = if src_w > max_texture_dimension || src_h > max_texture_dimension {
        let scale = (max_texture_dimension as f32 / src_w.max(src_h) as f32).min(1.0);
        let new_w = ((src_w as f32 * scale) as u32).max(1);
        let new_h = ((src_h as f32 * scale) as u32).max(1);
        log::warn!(
            "image {}x{} exceeds GPU limit {}, scaled to {}x{}",
            src_w,
            src_h,
            max_texture_dimension,
            new_w,
            new_h
        );
        image::DynamicImage::ImageRgba8(img)
            .resize(new_w, new_h, image::imageops::FilterType::Lanczos3)
            .to_rgba8()
    } else {
        img
    };

    // 兼容非 2:1 纹理：
    // - 以宽度为基准计算目标高度 target_h = width / 2
    // - 原图高度不足时在顶部补黑，原图贴到底部
    let (src_w, src_h) = img.dimensions();
    let target_h = src_w / 2;

    if target_h > 0 && src_h < target_h {
        let mut canvas = RgbaImage::from_pixel(src_w, target_h, Rgba([0, 0, 0, 255]));
        // y_offset 已保证不会越界
        let _ = canvas.copy_from(&img, 0, target_h - src_h);
        canvas
    } else {
        img
    }
}

pub struct LoadedImage {
    pub path: PathBuf,
    pub image: RgbaImage,
}

/// Decodes `path` on a background thread and sends the result to `tx`.
pub fn start_load_image(path: PathBuf, tx: Sender<LoadedImage>) {
    thread::spawn(move || {
        log::info!("loading image {:?} in background", path);

        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) => {
                log::error!("failed to open {:?}: {}", path, e);
                return;
            }
        };
        let reader = BufReader::new(file);

        let img_result = ImageReader::new(reader)
            .with_guessed_format()
            .map_err(image::ImageError::IoError)
            .and_then(|mut r| {
                r.no_limits();
                r.decode()
            });

        match img_result {
            Ok(img) => {
                let (w, h) = img.dimensions();
                log::info!("image loaded: {}x{}", w, h);

                let image = img.to_rgba8();
                if tx.send(LoadedImage { path, image }).is_err() {
                    log::error!("failed to hand decoded image to the main thread");
                }
            }
            Err(e) => log::error!("failed to decode image: {}", e),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_resolves_textures_and_files() {
        let mut store = AssetStore::default();
        let image = store.add_texture(TextureId(3));
        let video = store.add_file(PathBuf::from("media/pano.gif"));

        assert_ne!(image, video);
        assert_eq!(store.texture(image), Some(TextureId(3)));
        assert_eq!(store.texture(video), None);
        assert_eq!(store.file_url(video).as_deref(), Some("media/pano.gif"));
        assert_eq!(store.file_url(AssetId(99)), None);
    }

    #[test]
    fn removed_assets_stop_resolving() {
        let mut store = AssetStore::default();
        let first = store.add_texture(TextureId(1));
        let video = store.add_file(PathBuf::from("pano.gif"));

        assert_eq!(store.remove(first), Some(TextureId(1)));
        assert_eq!(store.remove(video), None);
        assert_eq!(store.texture(first), None);
        assert_eq!(store.file_url(video), None);
        assert!(store.is_empty());

        // 编号不复用
        let second = store.add_texture(TextureId(2));
        assert_ne!(second, first);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn short_images_are_padded_at_the_top() {
        let img = RgbaImage::from_pixel(8, 2, Rgba([255, 255, 255, 255]));
        let out = prepare_panorama(img, 4096);
        assert_eq!(out.dimensions(), (8, 4));
        assert_eq!(out.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(out.get_pixel(0, 3), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn oversized_images_are_scaled() {
        let img = RgbaImage::new(64, 32);
        assert_eq!(prepare_panorama(img, 16).dimensions(), (16, 8));
    }

    #[test]
    fn two_to_one_images_pass_through() {
        let img = RgbaImage::new(16, 8);
        assert_eq!(prepare_panorama(img, 4096).dimensions(), (16, 8));
    }
}
