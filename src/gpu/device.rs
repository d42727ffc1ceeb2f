// gpu/device.rs — GraphicsDevice 的 wgpu 实现
//
// 纹理以 TextureId 为句柄存放在表中：视频帧尺寸变化时底层 wgpu::Texture
// 会被重建，但句柄不变，材质上的 uTexture 绑定因此保持稳定。

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use image::RgbaImage;

use super::video::FrameSlot;
use crate::error::{ShaderError, ShaderStage};
use crate::host::{AddressMode, FilterMode, GraphicsDevice, Material, PixelFormat, TextureOptions};
use crate::mesh::Vertex;
use crate::shader::{Precision, Semantic, ShaderDefinition, FS_ENTRY, TEXTURE_PARAMETER, VS_ENTRY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// Defaults for decoded panorama images (same wrap policy as video).
const IMAGE_OPTIONS: TextureOptions = TextureOptions {
    format: PixelFormat::Rgba8,
    mipmaps: false,
    min_filter: FilterMode::Linear,
    mag_filter: FilterMode::Linear,
    address_u: AddressMode::Repeat,
    address_v: AddressMode::ClampToEdge,
};

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TransformUniform {
    pub matrix_model: [[f32; 4]; 4],
    pub matrix_view_projection: [[f32; 4]; 4],
}

struct TextureEntry {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
    source: Option<FrameSlot>,
    /// 底层纹理被重建时递增，用于让 bind group 缓存失效
    generation: u64,
}

pub struct WgpuShader {
    pipeline: wgpu::RenderPipeline,
}

struct MaterialState {
    pipeline: Rc<wgpu::RenderPipeline>,
    texture: Option<TextureId>,
}

/// Projection material. Clones share the same state.
#[derive(Clone)]
pub struct WgpuMaterial(Rc<RefCell<MaterialState>>);

impl WgpuMaterial {
    pub fn pipeline(&self) -> Rc<wgpu::RenderPipeline> {
        self.0.borrow().pipeline.clone()
    }

    pub fn texture(&self) -> Option<TextureId> {
        self.0.borrow().texture
    }
}

impl Material for WgpuMaterial {
    type Texture = TextureId;

    fn set_parameter(&mut self, name: &str, texture: Option<TextureId>) {
        if name != TEXTURE_PARAMETER {
            log::warn!("projection material has no parameter {:?}", name);
            return;
        }
        self.0.borrow_mut().texture = texture;
    }

    fn parameter(&self, name: &str) -> Option<TextureId> {
        if name == TEXTURE_PARAMETER {
            self.texture()
        } else {
            None
        }
    }
}

fn wgpu_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        // wgpu 没有可采样的 5-6-5 格式，退回 RGBA8
        PixelFormat::Rgb565 | PixelFormat::Rgba8 => wgpu::TextureFormat::Rgba8UnormSrgb,
    }
}

fn wgpu_filter(filter: FilterMode) -> wgpu::FilterMode {
    match filter {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

fn wgpu_address(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
        AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
    }
}

pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target_format: wgpu::TextureFormat,
    precision: Precision,

    transform_layout: wgpu::BindGroupLayout,
    material_layout: wgpu::BindGroupLayout,

    textures: HashMap<TextureId, TextureEntry>,
    next_texture_id: u32,
    fallback: TextureId,
    bind_groups: HashMap<TextureId, (u64, wgpu::BindGroup)>,
}

impl WgpuDevice {
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        target_format: wgpu::TextureFormat,
        precision: Precision,
    ) -> Self {
        let transform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
            label: Some("transform_bind_group_layout"),
        });

        let material_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    // uTexture
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
            label: Some("material_bind_group_layout"),
        });

        let mut this = Self {
            device,
            queue,
            target_format,
            precision,
            transform_layout,
            material_layout,
            textures: HashMap::new(),
            next_texture_id: 0,
            fallback: TextureId(0),
            bind_groups: HashMap::new(),
        };

        // 没有纹理时采样全黑
        this.fallback = this.create_texture(&IMAGE_OPTIONS);
        this
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn transform_layout(&self) -> &wgpu::BindGroupLayout {
        &self.transform_layout
    }

    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    fn allocate(&self, options: &TextureOptions, width: u32, height: u32) -> TextureEntry {
        let format = wgpu_format(options.format);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            // 视频纹理不生成 mipmap；图片同样只用一级
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            label: Some("panorama_texture"),
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu_address(options.address_u),
            address_mode_v: wgpu_address(options.address_v),
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu_filter(options.mag_filter),
            min_filter: wgpu_filter(options.min_filter),
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        TextureEntry {
            texture,
            view,
            sampler,
            format,
            width,
            height,
            source: None,
            generation: 0,
        }
    }

    fn insert(&mut self, entry: TextureEntry) -> TextureId {
        let id = TextureId(self.next_texture_id);
        self.next_texture_id += 1;
        self.textures.insert(id, entry);
        id
    }

    fn write(&self, entry: &TextureEntry, pixels: &RgbaImage) {
        let (width, height) = pixels.dimensions();
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &entry.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Uploads a decoded panorama image; this is what the asset store hands
    /// out for image assets.
    pub fn register_image(&mut self, img: &RgbaImage) -> TextureId {
        let (width, height) = img.dimensions();
        let entry = self.allocate(&IMAGE_OPTIONS, width, height);
        self.write(&entry, img);
        self.insert(entry)
    }

    /// Makes sure a bind group exists for `texture` (or the black fallback).
    pub fn prepare_material(&mut self, texture: Option<TextureId>) {
        let id = texture
            .filter(|id| self.textures.contains_key(id))
            .unwrap_or(self.fallback);
        let Some(entry) = self.textures.get(&id) else {
            return;
        };
        if matches!(self.bind_groups.get(&id), Some((generation, _)) if *generation == entry.generation) {
            return;
        }

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.material_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&entry.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&entry.sampler),
                },
            ],
            label: Some("material_bind_group"),
        });
        self.bind_groups.insert(id, (entry.generation, bind_group));
    }

    /// Textures currently held by the device, the black fallback included.
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Bind group prepared by [`WgpuDevice::prepare_material`].
    pub fn material_bind_group(&self, texture: Option<TextureId>) -> Option<&wgpu::BindGroup> {
        let id = texture
            .filter(|id| self.textures.contains_key(id))
            .unwrap_or(self.fallback);
        self.bind_groups.get(&id).map(|(_, group)| group)
    }
}

impl GraphicsDevice for WgpuDevice {
    type Texture = TextureId;
    type Shader = WgpuShader;
    type Material = WgpuMaterial;
    type FrameSource = FrameSlot;

    fn fragment_precision(&self) -> Precision {
        self.precision
    }

    fn create_shader(&mut self, definition: &ShaderDefinition) -> Result<WgpuShader, ShaderError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let vertex = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("panorama_vertex"),
            source: wgpu::ShaderSource::Wgsl(definition.vertex.into()),
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(ShaderError::new(ShaderStage::Vertex, err.to_string()));
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let fragment = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("panorama_fragment"),
            source: wgpu::ShaderSource::Wgsl(definition.fragment.as_str().into()),
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(ShaderError::new(ShaderStage::Fragment, err.to_string()));
        }

        let attributes: Vec<wgpu::VertexAttribute> = definition
            .attributes
            .iter()
            .enumerate()
            .map(|(location, attribute)| match attribute.semantic {
                Semantic::Position => wgpu::VertexAttribute {
                    format: wgpu::VertexFormat::Float32x3,
                    offset: 0,
                    shader_location: location as u32,
                },
            })
            .collect();

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("panorama_pipeline_layout"),
            bind_group_layouts: &[&self.transform_layout, &self.material_layout],
            push_constant_ranges: &[],
        });
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("panorama_pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &vertex,
                entry_point: VS_ENTRY,
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &attributes,
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment,
                entry_point: FS_ENTRY,
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.target_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                // 相机在网格内部，不剔除
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(ShaderError::new(ShaderStage::Link, err.to_string()));
        }

        Ok(WgpuShader { pipeline })
    }

    fn create_material(&mut self, shader: WgpuShader) -> WgpuMaterial {
        WgpuMaterial(Rc::new(RefCell::new(MaterialState {
            pipeline: Rc::new(shader.pipeline),
            texture: None,
        })))
    }

    fn create_texture(&mut self, options: &TextureOptions) -> TextureId {
        // 真实尺寸要等第一帧到达，先放一个 1x1 黑色占位
        let entry = self.allocate(options, 1, 1);
        self.write(&entry, &RgbaImage::from_pixel(1, 1, image::Rgba([0, 0, 0, 255])));
        self.insert(entry)
    }

    fn set_texture_source(&mut self, texture: &TextureId, source: FrameSlot) {
        if let Some(entry) = self.textures.get_mut(texture) {
            entry.source = Some(source);
        }
    }

    fn upload(&mut self, texture: &TextureId) {
        let Some(entry) = self.textures.get(texture) else {
            return;
        };
        // 还没有 ready 或者没有新帧：跳过
        let Some(frame) = entry.source.as_ref().and_then(FrameSlot::take_fresh) else {
            return;
        };

        let (width, height) = frame.dimensions();
        if (width, height) != (entry.width, entry.height) {
            log::debug!(
                "video texture {:?} resized {}x{} -> {}x{}",
                texture,
                entry.width,
                entry.height,
                width,
                height
            );
            let options = TextureOptions::video();
            let mut resized = self.allocate(&options, width, height);
            if let Some(old) = self.textures.remove(texture) {
                resized.source = old.source;
                resized.generation = old.generation + 1;
                debug_assert_eq!(resized.format, old.format);
            }
            self.textures.insert(*texture, resized);
        }

        if let Some(entry) = self.textures.get(texture) {
            self.write(entry, &frame);
        }
    }

    fn release_texture(&mut self, texture: &TextureId) {
        // 黑色占位纹理在设备生命周期内一直保留
        if *texture == self.fallback {
            return;
        }
        if let Some(entry) = self.textures.remove(texture) {
            self.bind_groups.remove(texture);
            entry.texture.destroy();
            log::debug!("released texture {:?} ({}x{})", texture, entry.width, entry.height);
        }
    }
}
