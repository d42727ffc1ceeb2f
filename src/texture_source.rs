// texture_source.rs — 图片 / 视频纹理解析与视频帧上传节奏

use futures::channel::oneshot;
use once_cell::unsync::OnceCell;

use crate::host::{
    AssetId, AssetRegistry, CrossOrigin, GraphicsDevice, MediaFactory, TextureOptions,
    VideoElement,
};

/// Which assets the panorama should show. Video wins when both are set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MediaConfig {
    pub image: Option<AssetId>,
    pub video: Option<AssetId>,
}

/// Half-rate upload gate: `true`, `false`, `true`, ... from the first tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadCadence {
    upload: bool,
}

impl Default for UploadCadence {
    fn default() -> Self {
        Self { upload: true }
    }
}

impl UploadCadence {
    /// Returns whether this frame uploads, then flips the phase.
    pub fn tick(&mut self) -> bool {
        let now = self.upload;
        self.upload = !self.upload;
        now
    }
}

/// Texture owned by the core and fed from a video element.
pub struct VideoTexture<T, E> {
    texture: T,
    element: E,
    ready: Option<oneshot::Receiver<()>>,
    bound: OnceCell<()>,
}

impl<T, E: VideoElement> VideoTexture<T, E> {
    pub fn texture(&self) -> &T {
        &self.texture
    }

    pub fn element(&self) -> &E {
        &self.element
    }

    pub fn is_bound(&self) -> bool {
        self.bound.get().is_some()
    }

    /// Attaches the element as the texture's pixel source.
    /// Only the first call reaches the device; returns whether it did.
    pub fn bind<D>(&self, device: &mut D) -> bool
    where
        D: GraphicsDevice<Texture = T, FrameSource = E::FrameSource>,
    {
        if self.bound.set(()).is_err() {
            return false;
        }
        device.set_texture_source(&self.texture, self.element.frame_source());
        log::debug!("video texture bound to its element");
        true
    }

    fn poll_ready<D>(&mut self, device: &mut D)
    where
        D: GraphicsDevice<Texture = T, FrameSource = E::FrameSource>,
    {
        let Some(ready) = self.ready.as_mut() else {
            return;
        };
        match ready.try_recv() {
            Ok(Some(())) => {
                self.ready = None;
                self.bind(device);
            }
            Ok(None) => {}
            Err(oneshot::Canceled) => {
                // 媒体栈放弃了播放：纹理保持无像素，静默降级
                log::warn!("video never became ready; texture stays blank");
                self.ready = None;
            }
        }
    }
}

pub enum MediaSource<T, E> {
    /// Pre-decoded, externally owned texture. Used as-is.
    Image(T),
    Video(VideoTexture<T, E>),
}

impl<T, E> MediaSource<T, E> {
    pub fn texture(&self) -> &T {
        match self {
            MediaSource::Image(texture) => texture,
            MediaSource::Video(video) => &video.texture,
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, MediaSource::Video(_))
    }
}

/// Resolves the configured media into one texture and keeps a video texture
/// fed at half the frame rate.
pub struct TextureSourceManager<T, E> {
    source: Option<MediaSource<T, E>>,
    cadence: UploadCadence,
}

impl<T: Clone, E: VideoElement> TextureSourceManager<T, E> {
    pub fn resolve<D, A, M>(config: &MediaConfig, device: &mut D, assets: &A, media: &mut M) -> Self
    where
        D: GraphicsDevice<Texture = T, FrameSource = E::FrameSource>,
        A: AssetRegistry<T>,
        M: MediaFactory<Element = E>,
    {
        let mut source = None;

        if let Some(id) = config.image {
            source = assets.texture(id).map(MediaSource::Image);
            if source.is_none() {
                log::warn!("image asset {:?} did not resolve to a texture", id);
            }
        }

        // 视频在图片之后解析，结果直接覆盖
        if let Some(id) = config.video {
            source = Self::resolve_video(id, device, assets, media).map(MediaSource::Video);
        }

        if source.is_none() {
            log::info!("no panorama media configured; surface stays blank");
        }

        Self {
            source,
            cadence: UploadCadence::default(),
        }
    }

    fn resolve_video<D, A, M>(
        id: AssetId,
        device: &mut D,
        assets: &A,
        media: &mut M,
    ) -> Option<VideoTexture<T, E>>
    where
        D: GraphicsDevice<Texture = T, FrameSource = E::FrameSource>,
        A: AssetRegistry<T>,
        M: MediaFactory<Element = E>,
    {
        let Some(url) = assets.file_url(id) else {
            log::warn!("video asset {:?} has no file url", id);
            return None;
        };

        let texture = device.create_texture(&TextureOptions::video());

        let (tx, rx) = oneshot::channel();
        let mut element = media.create_video();
        element.on_can_play(tx);
        element.set_src(&url);
        element.set_cross_origin(CrossOrigin::Anonymous);
        element.set_loop(true);
        element.play();
        log::info!("video texture created for {}", url);

        Some(VideoTexture {
            texture,
            element,
            ready: Some(rx),
            bound: OnceCell::new(),
        })
    }

    pub fn texture(&self) -> Option<&T> {
        self.source.as_ref().map(MediaSource::texture)
    }

    pub fn source(&self) -> Option<&MediaSource<T, E>> {
        self.source.as_ref()
    }

    /// Per-frame hook: binds the video once it is ready and uploads its
    /// current frame every second call.
    pub fn on_frame<D>(&mut self, device: &mut D)
    where
        D: GraphicsDevice<Texture = T, FrameSource = E::FrameSource>,
    {
        let upload = self.cadence.tick();

        if let Some(MediaSource::Video(video)) = &mut self.source {
            video.poll_ready(device);
            if upload {
                device.upload(&video.texture);
            }
        }
    }

    /// Stops the video element and frees the texture it fed. Image textures
    /// belong to the asset registry and are left alone.
    pub fn release<D>(self, device: &mut D)
    where
        D: GraphicsDevice<Texture = T, FrameSource = E::FrameSource>,
    {
        if let Some(MediaSource::Video(video)) = self.source {
            device.release_texture(&video.texture);
            log::debug!("video texture released");
        }
    }
}
