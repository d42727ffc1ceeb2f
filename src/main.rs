// main.rs — 全景查看器：窗口、交互、菜单与状态栏

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // 在 Release 模式下隐藏控制台窗口

use panosphere::camera::ViewerCamera;
use panosphere::config::{self, ViewerConfig};
use panosphere::gpu::{
    prepare_panorama, start_load_image, AssetStore, FileVideo, FileVideoFactory, LoadedImage,
    PanoramaMesh, Renderer, WgpuDevice,
};
use panosphere::host::{AssetId, GraphicsDevice};
use panosphere::{MediaConfig, Panorama, PanoramaError};

use winit::{
    dpi::{LogicalSize, PhysicalPosition},
    event::*,
    event_loop::{ControlFlow, EventLoop},
    window::{Fullscreen, WindowBuilder},
};

use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::time::Instant;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp", "tif", "tiff"];
const VIDEO_EXTENSIONS: &[&str] = &["gif", "apng", "png"];

/// 拖放时按扩展名区分：gif / apng 当作视频，其余当作图片
fn is_video_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "gif" | "apng"))
        .unwrap_or(false)
}

/// 被装饰的网格、资源表和当前的全景组件
struct Scene {
    mesh: PanoramaMesh,
    assets: AssetStore,
    media_factory: FileVideoFactory,
    media: MediaConfig,
    panorama: Panorama<WgpuDevice, FileVideo>,
}

impl Scene {
    fn new(device: &mut WgpuDevice, config: &ViewerConfig) -> Result<Self, PanoramaError> {
        let mut mesh = PanoramaMesh::new(device, config.mesh, config.radius);
        let assets = AssetStore::default();
        let mut media_factory = FileVideoFactory::new(device.max_texture_dimension());
        let media = MediaConfig::default();
        let panorama = Panorama::initialize(&media, device, &assets, &mut media_factory, &mut mesh)?;
        Ok(Self {
            mesh,
            assets,
            media_factory,
            media,
            panorama,
        })
    }

    /// 重新解析媒体：新的着色器、纹理和材质；旧的视频纹理和被替换的资源随后释放
    fn reload(&mut self, device: &mut WgpuDevice, stale: Vec<AssetId>) -> Result<(), PanoramaError> {
        let panorama = Panorama::initialize(
            &self.media,
            device,
            &self.assets,
            &mut self.media_factory,
            &mut self.mesh,
        )?;
        std::mem::replace(&mut self.panorama, panorama).release(device);

        for id in stale {
            if let Some(texture) = self.assets.remove(id) {
                device.release_texture(&texture);
            }
        }
        log::debug!(
            "{} assets, {} live textures after reload",
            self.assets.len(),
            device.live_textures()
        );
        Ok(())
    }

    /// `keep_video` 为真时沿用已配置的视频（视频优先于图片）
    fn show_image(
        &mut self,
        device: &mut WgpuDevice,
        loaded: LoadedImage,
        keep_video: bool,
    ) -> Result<(), PanoramaError> {
        let image = prepare_panorama(loaded.image, device.max_texture_dimension());
        let texture = device.register_image(&image);
        log::info!("showing image {}", loaded.path.display());

        let mut stale = Vec::new();
        stale.extend(self.media.image.replace(self.assets.add_texture(texture)));
        if !keep_video {
            stale.extend(self.media.video.take());
        }
        self.reload(device, stale)
    }

    fn show_video(&mut self, device: &mut WgpuDevice, path: PathBuf) -> Result<(), PanoramaError> {
        log::info!("showing video {}", path.display());
        let stale = self.media.video.replace(self.assets.add_file(path)).into_iter().collect();
        self.reload(device, stale)
    }
}

/// 启动时同时配置了图片和视频：只有启动图片本身到达时才保留视频
#[derive(Debug, Default)]
struct StartupFallback {
    image: Option<PathBuf>,
}

impl StartupFallback {
    fn new(config: &ViewerConfig) -> Self {
        Self {
            image: config.video.as_ref().and(config.image.clone()),
        }
    }

    fn keeps_video_for(&mut self, loaded: &Path) -> bool {
        if self.image.as_deref() == Some(loaded) {
            self.image = None;
            return true;
        }
        false
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let viewer_config = config::resolve()?;
    log::debug!("{:?}", viewer_config);

    let event_loop = EventLoop::new();
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Panosphere")
            .with_inner_size(LogicalSize::new(1280, 720))
            .build(&event_loop)?,
    );

    let mut renderer = pollster::block_on(Renderer::new(window.clone(), &viewer_config))?;
    let mut scene = Scene::new(&mut renderer.device, &viewer_config)?;
    let mut camera = ViewerCamera::new(viewer_config.fov, viewer_config.sensitivity);

    // 交互状态
    let mut mouse_pressed = false;
    let mut last_mouse_pos: Option<PhysicalPosition<f64>> = None;
    let mut is_fullscreen = false;

    // FPS 计算
    let mut last_frame_time = Instant::now();
    let mut frame_count = 0;
    let mut fps = 0.0;
    let mut show_fps = false;

    // UI 状态
    let mut vsync_enabled = viewer_config.vsync;
    let mut is_loading = false;

    // 异步加载通道
    let (tx, rx): (Sender<LoadedImage>, Receiver<LoadedImage>) = channel();

    let mut startup_fallback = StartupFallback::new(&viewer_config);

    if let Some(path) = viewer_config.image.clone() {
        is_loading = true;
        start_load_image(path, tx.clone());
    }
    if let Some(path) = viewer_config.video.clone() {
        scene.show_video(&mut renderer.device, path)?;
    }

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;

        // 检查是否有新加载的图片
        if let Ok(loaded) = rx.try_recv() {
            is_loading = false;
            let keep_video = startup_fallback.keeps_video_for(&loaded.path);
            if let Err(e) = scene.show_image(&mut renderer.device, loaded, keep_video) {
                log::error!("{}", e);
                *control_flow = ControlFlow::Exit;
                return;
            }
        }

        match event {
            Event::WindowEvent { event, .. } => {
                // 先让 egui 处理事件
                let response = renderer.egui_state.on_event(&renderer.egui_ctx, &event);
                if response.consumed {
                    return;
                }

                match event {
                    WindowEvent::CloseRequested => {
                        *control_flow = ControlFlow::Exit;
                    }

                    WindowEvent::Resized(new_size) => {
                        renderer.resize(new_size);
                    }

                    // 键盘快捷键
                    WindowEvent::KeyboardInput { input, .. } => {
                        if input.state == ElementState::Pressed {
                            match input.virtual_keycode {
                                Some(VirtualKeyCode::O) => {
                                    if let Some(path) = pick_image() {
                                        is_loading = true;
                                        start_load_image(path, tx.clone());
                                    }
                                }
                                Some(VirtualKeyCode::V) => {
                                    if let Some(path) = pick_video() {
                                        if let Err(e) = scene.show_video(&mut renderer.device, path) {
                                            log::error!("{}", e);
                                            *control_flow = ControlFlow::Exit;
                                        }
                                    }
                                }
                                Some(VirtualKeyCode::F11) => {
                                    is_fullscreen = !is_fullscreen;
                                    set_fullscreen(&window, is_fullscreen);
                                }
                                _ => {}
                            }
                        }
                    }

                    // 鼠标交互
                    WindowEvent::MouseInput { state, button, .. } => {
                        if button == MouseButton::Left {
                            mouse_pressed = state == ElementState::Pressed;
                            if !mouse_pressed {
                                last_mouse_pos = None;
                            }
                        }
                    }

                    WindowEvent::CursorMoved { position, .. } => {
                        if mouse_pressed {
                            if let Some(last_pos) = last_mouse_pos {
                                let dx = (position.x - last_pos.x) as f32;
                                let dy = (position.y - last_pos.y) as f32;
                                camera.drag(
                                    dx,
                                    dy,
                                    renderer.size.width as f32,
                                    renderer.size.height as f32,
                                );
                            }
                            last_mouse_pos = Some(position);
                        }
                    }

                    WindowEvent::MouseWheel { delta, .. } => {
                        let scroll = match delta {
                            MouseScrollDelta::LineDelta(_, y) => y,
                            MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 20.0,
                        };
                        camera.zoom(scroll);
                    }

                    WindowEvent::DroppedFile(path) => {
                        if is_video_path(&path) {
                            if let Err(e) = scene.show_video(&mut renderer.device, path) {
                                log::error!("{}", e);
                                *control_flow = ControlFlow::Exit;
                            }
                        } else {
                            is_loading = true;
                            start_load_image(path, tx.clone());
                        }
                    }

                    _ => {}
                }
            }

            Event::RedrawRequested(_) => {
                // FPS 统计
                frame_count += 1;
                let now = Instant::now();
                if now.duration_since(last_frame_time).as_secs_f32() >= 1.0 {
                    fps = frame_count as f32 / now.duration_since(last_frame_time).as_secs_f32();
                    frame_count = 0;
                    last_frame_time = now;
                }

                // 视频帧上传在绘制之前
                scene.panorama.update(&mut renderer.device);

                let view_projection = camera.view_projection(renderer.aspect());
                let vsync_before = vsync_enabled;
                let mut action = UiAction::None;
                let media_label = if scene.panorama.is_video() {
                    "video"
                } else if scene.panorama.texture().is_some() {
                    "image"
                } else {
                    "none"
                };

                let render_result = renderer.render_with_ui(&window, &scene.mesh, view_projection, |ctx| {
                    draw_ui(
                        ctx,
                        &mut camera,
                        &mut action,
                        &mut show_fps,
                        &mut vsync_enabled,
                        fps,
                        is_loading,
                        media_label,
                        viewer_config.fov,
                    );
                });

                if vsync_enabled != vsync_before {
                    renderer.set_vsync(vsync_enabled);
                }

                match action {
                    UiAction::None => {}
                    UiAction::OpenImage(path) => {
                        is_loading = true;
                        start_load_image(path, tx.clone());
                    }
                    UiAction::OpenVideo(path) => {
                        if let Err(e) = scene.show_video(&mut renderer.device, path) {
                            log::error!("{}", e);
                            *control_flow = ControlFlow::Exit;
                        }
                    }
                    UiAction::ToggleFullscreen => {
                        is_fullscreen = !is_fullscreen;
                        set_fullscreen(&window, is_fullscreen);
                    }
                    UiAction::Exit => *control_flow = ControlFlow::Exit,
                }

                match render_result {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost) => renderer.resize(renderer.size),
                    Err(wgpu::SurfaceError::OutOfMemory) => *control_flow = ControlFlow::Exit,
                    Err(e) => log::warn!("render error: {:?}", e),
                }
            }

            Event::MainEventsCleared => {
                window.request_redraw();
            }

            _ => {}
        }
    });
}

fn set_fullscreen(window: &winit::window::Window, enabled: bool) {
    if enabled {
        window.set_fullscreen(Some(Fullscreen::Borderless(None)));
    } else {
        window.set_fullscreen(None);
    }
}

fn pick_image() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .add_filter("Panorama images", IMAGE_EXTENSIONS)
        .pick_file()
}

fn pick_video() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .add_filter("Animated panoramas", VIDEO_EXTENSIONS)
        .pick_file()
}

enum UiAction {
    None,
    OpenImage(PathBuf),
    OpenVideo(PathBuf),
    ToggleFullscreen,
    Exit,
}

#[allow(clippy::too_many_arguments)]
fn draw_ui(
    ctx: &egui::Context,
    camera: &mut ViewerCamera,
    action: &mut UiAction,
    show_fps: &mut bool,
    vsync_enabled: &mut bool,
    fps: f32,
    is_loading: bool,
    media_label: &str,
    default_fov: f32,
) {
    egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
        egui::menu::bar(ui, |ui| {
            ui.menu_button("File", |ui| {
                if ui.button("Open image… (O)").clicked() {
                    ui.close_menu();
                    if let Some(path) = pick_image() {
                        *action = UiAction::OpenImage(path);
                    }
                }
                if ui.button("Open video… (V)").clicked() {
                    ui.close_menu();
                    if let Some(path) = pick_video() {
                        *action = UiAction::OpenVideo(path);
                    }
                }
                if ui.button("Exit").clicked() {
                    *action = UiAction::Exit;
                }
            });

            ui.menu_button("View", |ui| {
                if ui.button("Reset view").clicked() {
                    camera.reset(default_fov);
                    ui.close_menu();
                }
                if ui.button("Toggle fullscreen (F11)").clicked() {
                    *action = UiAction::ToggleFullscreen;
                    ui.close_menu();
                }

                ui.separator();
                ui.menu_button("Input sensitivity", |ui| {
                    ui.add(egui::Slider::new(&mut camera.sensitivity_scale, 0.1..=5.0).text("x"));
                    if ui.button("Reset to 1.0").clicked() {
                        camera.sensitivity_scale = 1.0;
                    }
                });

                ui.separator();
                if ui.checkbox(show_fps, "Show FPS").clicked() {
                    ui.close_menu();
                }
                ui.checkbox(vsync_enabled, "VSync");
            });
        });
    });

    egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
        ui.horizontal(|ui| {
            if is_loading {
                ui.label(egui::RichText::new("Loading image…").color(egui::Color32::YELLOW));
                ui.label("|");
            }

            ui.label(format!("Media: {}", media_label));
            ui.label("|");
            ui.label(format!("FOV: {:.1}°", camera.fov));
            ui.label("|");
            ui.label(format!("Yaw: {:.1}°", camera.yaw));
            ui.label("|");
            ui.label(format!("Pitch: {:.1}°", camera.pitch));

            if *show_fps {
                ui.label("|");
                ui.label(egui::RichText::new(format!("FPS: {:.1}", fps)).color(egui::Color32::GREEN));
            }
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(image: Option<&str>, video: Option<&str>) -> ViewerConfig {
        ViewerConfig {
            image: image.map(PathBuf::from),
            video: video.map(PathBuf::from),
            ..Default::default()
        }
    }

    #[test]
    fn startup_image_keeps_startup_video() {
        let mut fallback = StartupFallback::new(&config(Some("pano.jpg"), Some("pano.gif")));
        assert!(fallback.keeps_video_for(Path::new("pano.jpg")));
        // 只生效一次
        assert!(!fallback.keeps_video_for(Path::new("pano.jpg")));
    }

    #[test]
    fn failed_startup_image_does_not_hide_later_images() {
        // 启动图片解码失败，从未到达；用户随后打开的图片必须替换视频
        let mut fallback = StartupFallback::new(&config(Some("broken.jpg"), Some("pano.gif")));
        assert!(!fallback.keeps_video_for(Path::new("other.jpg")));
        assert!(fallback.keeps_video_for(Path::new("broken.jpg")));
    }

    #[test]
    fn image_only_startup_never_keeps_video() {
        let mut fallback = StartupFallback::new(&config(Some("pano.jpg"), None));
        assert!(!fallback.keeps_video_for(Path::new("pano.jpg")));
    }

    #[test]
    fn animated_extensions_are_videos() {
        assert!(is_video_path(Path::new("a/pano.GIF")));
        assert!(is_video_path(Path::new("pano.apng")));
        assert!(!is_video_path(Path::new("pano.png")));
        assert!(!is_video_path(Path::new("pano")));
    }
}
