// testing.rs — 单元测试用的宿主替身

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use futures::channel::oneshot;

use crate::error::{ShaderError, ShaderStage};
use crate::host::{
    AssetId, AssetRegistry, CrossOrigin, GraphicsDevice, Material, MediaFactory,
    PanoramaSurface, TextureOptions, VideoElement,
};
use crate::shader::{Precision, ShaderDefinition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockTexture(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockFrameSource(pub usize);

#[derive(Debug)]
pub struct MockShader {
    pub precision: Precision,
}

#[derive(Debug, Default)]
pub struct MockMaterialState {
    pub parameters: HashMap<String, Option<MockTexture>>,
    pub writes: usize,
}

#[derive(Debug, Clone)]
pub struct MockMaterial(pub Rc<RefCell<MockMaterialState>>);

impl MockMaterial {
    pub fn same_as(&self, other: &MockMaterial) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn writes(&self) -> usize {
        self.0.borrow().writes
    }
}

impl Material for MockMaterial {
    type Texture = MockTexture;

    fn set_parameter(&mut self, name: &str, texture: Option<MockTexture>) {
        let mut state = self.0.borrow_mut();
        state.parameters.insert(name.to_string(), texture);
        state.writes += 1;
    }

    fn parameter(&self, name: &str) -> Option<MockTexture> {
        self.0.borrow().parameters.get(name).copied().flatten()
    }
}

#[derive(Debug, Default)]
pub struct MockDevice {
    pub precision: Precision,
    pub fail_shader: bool,
    pub shaders: Vec<ShaderDefinition>,
    pub created_textures: Vec<(MockTexture, TextureOptions)>,
    pub sources: Vec<(MockTexture, MockFrameSource)>,
    pub uploads: Vec<MockTexture>,
    pub released: Vec<MockTexture>,
    next_texture: u32,
}

impl MockDevice {
    /// Textures created through the device and not yet released.
    pub fn live_textures(&self) -> usize {
        self.created_textures
            .iter()
            .filter(|(t, _)| !self.released.contains(t))
            .count()
    }
}

impl GraphicsDevice for MockDevice {
    type Texture = MockTexture;
    type Shader = MockShader;
    type Material = MockMaterial;
    type FrameSource = MockFrameSource;

    fn fragment_precision(&self) -> Precision {
        self.precision
    }

    fn create_shader(&mut self, definition: &ShaderDefinition) -> Result<MockShader, ShaderError> {
        self.shaders.push(definition.clone());
        if self.fail_shader {
            return Err(ShaderError::new(ShaderStage::Fragment, "forced failure"));
        }
        Ok(MockShader {
            precision: definition.precision,
        })
    }

    fn create_material(&mut self, _shader: MockShader) -> MockMaterial {
        MockMaterial(Rc::new(RefCell::new(MockMaterialState::default())))
    }

    fn create_texture(&mut self, options: &TextureOptions) -> MockTexture {
        self.next_texture += 1;
        let texture = MockTexture(self.next_texture);
        self.created_textures.push((texture, *options));
        texture
    }

    fn set_texture_source(&mut self, texture: &MockTexture, source: MockFrameSource) {
        self.sources.push((*texture, source));
    }

    fn upload(&mut self, texture: &MockTexture) {
        self.uploads.push(*texture);
    }

    fn release_texture(&mut self, texture: &MockTexture) {
        self.released.push(*texture);
    }
}

#[derive(Debug, Default)]
pub struct MockAssets {
    images: HashMap<AssetId, MockTexture>,
    videos: HashMap<AssetId, String>,
}

impl MockAssets {
    /// Registers a decoded image; its texture ids never collide with the device's.
    pub fn add_image(&mut self, id: AssetId) -> MockTexture {
        let texture = MockTexture(1000 + id.0);
        self.images.insert(id, texture);
        texture
    }

    pub fn add_video(&mut self, id: AssetId, url: &str) {
        self.videos.insert(id, url.to_string());
    }
}

impl AssetRegistry<MockTexture> for MockAssets {
    fn texture(&self, id: AssetId) -> Option<MockTexture> {
        self.images.get(&id).copied()
    }

    fn file_url(&self, id: AssetId) -> Option<String> {
        self.videos.get(&id).cloned()
    }
}

type ReadySlots = Rc<RefCell<Vec<Option<oneshot::Sender<()>>>>>;

#[derive(Debug, Default)]
pub struct MockMedia {
    pub created: usize,
    ready: ReadySlots,
}

impl MockMedia {
    /// Simulates the "can play" event of the `index`-th element.
    pub fn fire_ready(&mut self, index: usize) {
        let sender = self.ready.borrow_mut()[index].take();
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }

    /// Simulates playback failing before the element became ready.
    pub fn fail(&mut self, index: usize) {
        self.ready.borrow_mut()[index].take();
    }
}

impl MediaFactory for MockMedia {
    type Element = MockVideo;

    fn create_video(&mut self) -> MockVideo {
        let id = self.created;
        self.created += 1;
        self.ready.borrow_mut().push(None);
        MockVideo {
            id,
            state: MockVideoState::default(),
            ready: self.ready.clone(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MockVideoState {
    pub src: Option<String>,
    pub cross_origin: Option<CrossOrigin>,
    pub looping: bool,
    pub playing: bool,
}

#[derive(Debug)]
pub struct MockVideo {
    id: usize,
    state: MockVideoState,
    ready: ReadySlots,
}

impl MockVideo {
    pub fn state(&self) -> &MockVideoState {
        &self.state
    }
}

impl VideoElement for MockVideo {
    type FrameSource = MockFrameSource;

    fn set_src(&mut self, url: &str) {
        self.state.src = Some(url.to_string());
    }

    fn set_cross_origin(&mut self, cross_origin: CrossOrigin) {
        self.state.cross_origin = Some(cross_origin);
    }

    fn set_loop(&mut self, looping: bool) {
        self.state.looping = looping;
    }

    fn play(&mut self) {
        self.state.playing = true;
    }

    fn on_can_play(&mut self, ready: oneshot::Sender<()>) {
        self.ready.borrow_mut()[self.id] = Some(ready);
    }

    fn frame_source(&self) -> MockFrameSource {
        MockFrameSource(self.id)
    }
}

#[derive(Debug, Default)]
pub struct MockSurface {
    pub materials: Vec<Option<MockMaterial>>,
}

impl MockSurface {
    pub fn with_meshes(count: usize) -> Self {
        Self {
            materials: vec![None; count],
        }
    }
}

impl PanoramaSurface<MockMaterial> for MockSurface {
    fn mesh_instance_count(&self) -> usize {
        self.materials.len()
    }

    fn set_mesh_material(&mut self, index: usize, material: MockMaterial) {
        self.materials[index] = Some(material);
    }
}
