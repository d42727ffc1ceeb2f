// gpu/video.rs — 基于文件的"视频元素"：GIF / APNG 动画逐帧解码
//
// 解码在后台线程进行（与图片加载相同的做法），最新一帧放在 FrameSlot 中，
// 由渲染线程在 upload() 时取走。第一帧解码完成即视为 "can play"。

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use futures::channel::oneshot;
use image::codecs::gif::GifDecoder;
use image::codecs::png::PngDecoder;
use image::{AnimationDecoder, ImageError, RgbaImage};

use crate::host::{CrossOrigin, MediaFactory, VideoElement};

/// 小于 10ms 的帧延迟按浏览器惯例当作 100ms
const MIN_FRAME_DELAY: Duration = Duration::from_millis(10);
const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(100);

/// Latest decoded frame, shared between the decode thread and the device.
#[derive(Debug, Clone, Default)]
pub struct FrameSlot(Arc<Mutex<Option<RgbaImage>>>);

impl FrameSlot {
    pub fn publish(&self, frame: RgbaImage) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = Some(frame);
        }
    }

    /// Takes the frame published since the last call, if any.
    pub fn take_fresh(&self) -> Option<RgbaImage> {
        self.0.lock().ok().and_then(|mut slot| slot.take())
    }
}

pub struct DecodedFrame {
    pub image: RgbaImage,
    pub delay: Duration,
}

fn frame_delay(numer: u32, denom: u32) -> Duration {
    if denom == 0 {
        return DEFAULT_FRAME_DELAY;
    }
    let delay = Duration::from_micros(u64::from(numer) * 1000 / u64::from(denom));
    if delay < MIN_FRAME_DELAY {
        DEFAULT_FRAME_DELAY
    } else {
        delay
    }
}

fn fit_to_limit(img: RgbaImage, max_dimension: u32) -> RgbaImage {
    let (w, h) = img.dimensions();
    if w <= max_dimension && h <= max_dimension {
        return img;
    }
    let scale = max_dimension as f32 / w.max(h) as f32;
    let new_w = ((w as f32 * scale) as u32).max(1);
    let new_h = ((h as f32 * scale) as u32).max(1);
    image::imageops::resize(&img, new_w, new_h, image::imageops::FilterType::Triangle)
}

fn collect(frames: image::Frames<'_>) -> Result<Vec<DecodedFrame>, ImageError> {
    frames
        .map(|frame| {
            let frame = frame?;
            let (numer, denom) = frame.delay().numer_denom_ms();
            Ok(DecodedFrame {
                delay: frame_delay(numer, denom),
                image: frame.into_buffer(),
            })
        })
        .collect()
}

fn still(path: &Path) -> Result<Vec<DecodedFrame>, ImageError> {
    let image = image::open(path)?.to_rgba8();
    Ok(vec![DecodedFrame {
        image,
        delay: DEFAULT_FRAME_DELAY,
    }])
}

/// Decodes every frame of an animated GIF / APNG. Anything else the `image`
/// crate can open becomes a single frame.
pub fn decode_frames(path: &Path, max_dimension: u32) -> Result<Vec<DecodedFrame>, ImageError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    let open = || File::open(path).map(BufReader::new).map_err(ImageError::IoError);

    let frames = match ext.as_deref() {
        Some("gif") => collect(GifDecoder::new(open()?)?.into_frames())?,
        Some("png") | Some("apng") => {
            let decoder = PngDecoder::new(open()?)?;
            if decoder.is_apng() {
                collect(decoder.apng().into_frames())?
            } else {
                still(path)?
            }
        }
        _ => still(path)?,
    };

    Ok(frames
        .into_iter()
        .map(|f| DecodedFrame {
            image: fit_to_limit(f.image, max_dimension),
            delay: f.delay,
        })
        .collect())
}

fn playback(
    path: PathBuf,
    looping: bool,
    max_dimension: u32,
    slot: FrameSlot,
    ready: Option<oneshot::Sender<()>>,
    stop: Arc<AtomicBool>,
) {
    let frames = match decode_frames(&path, max_dimension) {
        Ok(frames) if !frames.is_empty() => frames,
        Ok(_) => {
            log::warn!("{} contains no frames", path.display());
            return;
        }
        Err(e) => {
            // ready 在这里被丢弃，纹理永远不会绑定
            log::warn!("failed to decode video {}: {}", path.display(), e);
            return;
        }
    };
    log::info!("video {} decoded: {} frames", path.display(), frames.len());

    let mut ready = ready;
    loop {
        for frame in &frames {
            if stop.load(Ordering::Relaxed) {
                return;
            }
            slot.publish(frame.image.clone());
            if let Some(tx) = ready.take() {
                let _ = tx.send(());
            }
            if frames.len() == 1 {
                return;
            }
            thread::sleep(frame.delay);
        }
        if !looping {
            return;
        }
    }
}

/// Video element backed by a local animation file.
pub struct FileVideo {
    src: Option<PathBuf>,
    looping: bool,
    cross_origin: CrossOrigin,
    max_dimension: u32,
    ready: Option<oneshot::Sender<()>>,
    slot: FrameSlot,
    stop: Arc<AtomicBool>,
    started: bool,
}

impl FileVideo {
    pub fn new(max_dimension: u32) -> Self {
        Self {
            src: None,
            looping: false,
            cross_origin: CrossOrigin::default(),
            max_dimension,
            ready: None,
            slot: FrameSlot::default(),
            stop: Arc::new(AtomicBool::new(false)),
            started: false,
        }
    }
}

impl VideoElement for FileVideo {
    type FrameSource = FrameSlot;

    fn set_src(&mut self, url: &str) {
        self.src = Some(PathBuf::from(url));
    }

    fn set_cross_origin(&mut self, cross_origin: CrossOrigin) {
        // 本地文件没有跨域限制，仅记录
        self.cross_origin = cross_origin;
    }

    fn set_loop(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn play(&mut self) {
        if self.started {
            return;
        }
        let Some(path) = self.src.clone() else {
            log::warn!("play() called on a video element without src");
            self.ready = None;
            return;
        };
        self.started = true;
        log::debug!(
            "starting playback of {} (loop: {}, cross-origin: {:?})",
            path.display(),
            self.looping,
            self.cross_origin
        );

        let looping = self.looping;
        let max_dimension = self.max_dimension;
        let slot = self.slot.clone();
        let ready = self.ready.take();
        let stop = self.stop.clone();
        thread::spawn(move || playback(path, looping, max_dimension, slot, ready, stop));
    }

    fn on_can_play(&mut self, ready: oneshot::Sender<()>) {
        self.ready = Some(ready);
    }

    fn frame_source(&self) -> FrameSlot {
        self.slot.clone()
    }
}

impl Drop for FileVideo {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

pub struct FileVideoFactory {
    max_dimension: u32,
}

impl FileVideoFactory {
    pub fn new(max_dimension: u32) -> Self {
        Self { max_dimension }
    }
}

impl MediaFactory for FileVideoFactory {
    type Element = FileVideo;

    fn create_video(&mut self) -> FileVideo {
        FileVideo::new(self.max_dimension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn slot_hands_out_each_frame_once() {
        let slot = FrameSlot::default();
        assert!(slot.take_fresh().is_none());

        slot.publish(RgbaImage::from_pixel(2, 1, Rgba([1, 2, 3, 255])));
        let shared = slot.clone();
        assert_eq!(shared.take_fresh().map(|f| f.dimensions()), Some((2, 1)));
        assert!(slot.take_fresh().is_none());
    }

    #[test]
    fn tiny_delays_fall_back_to_default() {
        assert_eq!(frame_delay(0, 1), DEFAULT_FRAME_DELAY);
        assert_eq!(frame_delay(5, 1), DEFAULT_FRAME_DELAY);
        assert_eq!(frame_delay(40, 1), Duration::from_millis(40));
        assert_eq!(frame_delay(1, 0), DEFAULT_FRAME_DELAY);
    }

    #[test]
    fn oversized_frames_are_scaled_down() {
        let img = RgbaImage::new(400, 200);
        assert_eq!(fit_to_limit(img, 100).dimensions(), (100, 50));
        let img = RgbaImage::new(64, 32);
        assert_eq!(fit_to_limit(img, 100).dimensions(), (64, 32));
    }

    #[test]
    fn missing_src_never_becomes_ready() {
        let mut video = FileVideo::new(1024);
        let (tx, mut rx) = oneshot::channel();
        video.on_can_play(tx);
        video.play();
        assert_eq!(rx.try_recv(), Err(oneshot::Canceled));
    }

    #[test]
    fn still_image_becomes_ready_with_one_frame() {
        let path = std::env::temp_dir().join(format!("panosphere-still-{}.png", std::process::id()));
        RgbaImage::from_pixel(8, 4, Rgba([10, 20, 30, 255])).save(&path).unwrap();

        let mut factory = FileVideoFactory::new(1024);
        let mut video = factory.create_video();
        let (tx, rx) = oneshot::channel();
        video.on_can_play(tx);
        video.set_src(path.to_str().unwrap());
        video.set_loop(true);
        video.play();

        assert_eq!(futures::executor::block_on(rx), Ok(()));
        let frame = video.frame_source().take_fresh().unwrap();
        assert_eq!(frame.dimensions(), (8, 4));
        let _ = std::fs::remove_file(path);
    }
}
