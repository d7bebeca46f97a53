use crate::animation::Animation;
use crate::camera;
use crate::frame::{FrameHandler, FrameOutcome};
use crate::settings::{CameraSettings, LightSettings, MaterialSettings, MeshSettings, SceneSettings};
use crate::skybox::SkyboxMethod;
use glam::{Mat4, Vec3};
use lumen_render::{
    Backend, BackendError, BufferHandle, DrawUniforms, Geometry, MeshHandle, ProgramHandle,
    TextureHandle, UniformBlock, shaders,
};
use lumen_state::Node;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Lifecycle of the GPU resources behind the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Initializing,
    Running,
    Reinitializing,
    /// A backend error stopped the session. Only a reload recovers.
    Halted,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Reinitializing => "reinitializing",
            Self::Halted => "halted",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Resources {
    camera_buffer: BufferHandle,
    material_buffer: BufferHandle,
    light_buffer: BufferHandle,
    skybox_cube_program: ProgramHandle,
    skybox_plane_program: ProgramHandle,
    monkey_program: ProgramHandle,
    cube: MeshHandle,
    plane: MeshHandle,
    monkey: MeshHandle,
    skybox: TextureHandle,
}

/// Owns every GPU handle of the scene and rebuilds only what a settings
/// change invalidates.
///
/// Nothing outside the manager touches the handles; changes arrive as
/// settings snapshots through the `*_changed` methods.
pub struct ResourceManager<B: Backend> {
    backend: B,
    assets: PathBuf,
    aspect: f32,
    phase: Phase,
    resources: Option<Resources>,
    settings: SceneSettings,
    projection: Mat4,
    camera_block: UniformBlock,
    material_block: UniformBlock,
    light_block: UniformBlock,
    animation: Animation,
    error: Option<BackendError>,
}

impl<B: Backend> ResourceManager<B> {
    /// `assets` is the directory holding one folder per skybox set.
    pub fn new(backend: B, assets: impl Into<PathBuf>, aspect: f32) -> Self {
        let settings = SceneSettings::default();
        Self {
            backend,
            assets: assets.into(),
            aspect,
            phase: Phase::Uninitialized,
            resources: None,
            projection: camera::projection(&settings.camera, aspect),
            camera_block: UniformBlock::new(shaders::camera_layout()),
            material_block: UniformBlock::new(shaders::material_layout()),
            light_block: UniformBlock::new(shaders::light_layout(settings.light_count())),
            settings,
            animation: Animation::default(),
            error: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn settings(&self) -> &SceneSettings {
        &self.settings
    }

    pub fn animation(&self) -> &Animation {
        &self.animation
    }

    /// The error that halted the session, if any.
    pub fn error(&self) -> Option<&BackendError> {
        self.error.as_ref()
    }

    /// Allocate everything from the first ready snapshot. Later calls are
    /// ignored.
    pub fn initialize(&mut self, root: &Node) {
        if self.phase != Phase::Uninitialized {
            debug!(phase = self.phase.name(), "initialize ignored");
            return;
        }
        self.phase = Phase::Initializing;
        self.settings = SceneSettings::from_node(root);
        self.projection = camera::projection(&self.settings.camera, self.aspect);
        match self.allocate() {
            Ok(resources) => {
                self.resources = Some(resources);
                self.phase = Phase::Running;
                info!(
                    light_count = self.settings.light_count(),
                    texture = %self.settings.mesh.skybox_texture,
                    "scene resources ready"
                );
            }
            Err(e) => self.halt(e),
        }
    }

    fn allocate(&mut self) -> Result<Resources, BackendError> {
        let light_count = self.settings.light_count();

        self.pack_camera()?;
        let camera_buffer = self
            .backend
            .create_uniform_buffer(shaders::CAMERA_BINDING, self.camera_block.layout())?;
        self.backend
            .write_uniform_buffer(camera_buffer, self.camera_block.bytes())?;

        self.pack_material()?;
        let material_buffer = self
            .backend
            .create_uniform_buffer(shaders::MATERIAL_BINDING, self.material_block.layout())?;
        self.backend
            .write_uniform_buffer(material_buffer, self.material_block.bytes())?;

        self.light_block = UniformBlock::new(shaders::light_layout(light_count));
        self.pack_lights()?;
        let light_buffer = self
            .backend
            .create_uniform_buffer(shaders::LIGHT_BINDING, self.light_block.layout())?;
        self.backend
            .write_uniform_buffer(light_buffer, self.light_block.bytes())?;

        let skybox_cube_program = self
            .backend
            .create_program(&shaders::skybox_cube_vertex(), &shaders::skybox_fragment())?;
        let skybox_plane_program = self
            .backend
            .create_program(&shaders::skybox_plane_vertex(), &shaders::skybox_fragment())?;
        let monkey_program = self.create_monkey_program()?;

        let cube = self.backend.create_mesh(&Geometry::cube())?;
        let plane = self.backend.create_mesh(&Geometry::plane())?;
        let monkey = self
            .backend
            .create_mesh(&monkey_geometry(&self.settings.mesh))?;

        let skybox = self.backend.create_cubemap_texture()?;
        let faces = self.settings.mesh.skybox_texture.faces(&self.assets);
        self.backend.load_cubemap_texture(skybox, &faces)?;

        Ok(Resources {
            camera_buffer,
            material_buffer,
            light_buffer,
            skybox_cube_program,
            skybox_plane_program,
            monkey_program,
            cube,
            plane,
            monkey,
            skybox,
        })
    }

    /// React to a new `camera` section.
    pub fn camera_changed(&mut self, node: &Node) {
        let next = CameraSettings::from_node(node);
        let previous = std::mem::replace(&mut self.settings.camera, next);
        if !next.projection_differs(&previous) {
            return;
        }
        self.projection = camera::projection(&next, self.aspect);
        self.reinitialize("projection", |manager, resources| {
            manager.write_projection(resources.camera_buffer)
        });
    }

    /// React to a new `material` section.
    pub fn material_changed(&mut self, node: &Node) {
        let next = MaterialSettings::from_node(node);
        let previous = std::mem::replace(&mut self.settings.material, next);
        self.reinitialize("material", |manager, resources| {
            if next.refract_colors != previous.refract_colors {
                manager.rebuild_monkey_program(resources)?;
            }
            manager.pack_material()?;
            manager
                .backend
                .write_uniform_buffer(resources.material_buffer, manager.material_block.bytes())
        });
    }

    /// React to a new `lights` list.
    pub fn lights_changed(&mut self, node: &Node) {
        let previous = self.settings.light_count();
        self.settings.lights = LightSettings::list_from_node(node);
        let count = self.settings.light_count();
        self.reinitialize("lights", |manager, resources| {
            if count != previous {
                info!(from = previous, light_count = count, "light count changed");
                manager.rebuild_light_buffer(resources, count)?;
                manager.rebuild_monkey_program(resources)?;
            } else {
                manager.pack_lights()?;
                manager
                    .backend
                    .write_uniform_buffer(resources.light_buffer, manager.light_block.bytes())?;
            }
            Ok(())
        });
    }

    /// React to a new `mesh` section.
    pub fn mesh_changed(&mut self, node: &Node) {
        let next = MeshSettings::from_node(node);
        let previous = std::mem::replace(&mut self.settings.mesh, next);
        self.reinitialize("mesh", |manager, resources| {
            if next.geometry_differs(&previous) {
                let mesh = manager.backend.create_mesh(&monkey_geometry(&next))?;
                manager.backend.release_mesh(resources.monkey);
                debug!(handle = %mesh, lowpoly = next.lowpoly, flatten = next.flatten, "monkey mesh rebuilt");
                resources.monkey = mesh;
            }
            if next.skybox_texture != previous.skybox_texture {
                let faces = next.skybox_texture.faces(&manager.assets);
                manager.backend.load_cubemap_texture(resources.skybox, &faces)?;
                info!(texture = %next.skybox_texture, "skybox reloading");
            }
            Ok(())
        });
    }

    /// The surface changed size.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.aspect = width as f32 / height as f32;
        self.projection = camera::projection(&self.settings.camera, self.aspect);
        if self.resources.is_some() {
            self.reinitialize("resize", |manager, resources| {
                manager.write_projection(resources.camera_buffer)
            });
        }
    }

    /// Release every handle. The manager goes back to `Uninitialized`.
    pub fn release_all(&mut self) {
        let Some(resources) = self.resources.take() else {
            return;
        };
        self.backend.release_buffer(resources.camera_buffer);
        self.backend.release_buffer(resources.material_buffer);
        self.backend.release_buffer(resources.light_buffer);
        self.backend.release_program(resources.skybox_cube_program);
        self.backend.release_program(resources.skybox_plane_program);
        self.backend.release_program(resources.monkey_program);
        self.backend.release_mesh(resources.cube);
        self.backend.release_mesh(resources.plane);
        self.backend.release_mesh(resources.monkey);
        self.backend.release_texture(resources.skybox);
        if self.phase != Phase::Halted {
            self.phase = Phase::Uninitialized;
        }
        debug!("scene resources released");
    }

    /// Release everything and forget the halt, ready for a fresh mount.
    pub fn reset(&mut self) {
        self.release_all();
        self.phase = Phase::Uninitialized;
        self.error = None;
        self.animation = Animation::default();
        self.settings = SceneSettings::default();
        self.projection = camera::projection(&self.settings.camera, self.aspect);
    }

    /// Run `rebuild` against the live handles. A failure halts the session;
    /// changes before initialization only update the settings.
    fn reinitialize(
        &mut self,
        what: &'static str,
        rebuild: impl FnOnce(&mut Self, &mut Resources) -> Result<(), BackendError>,
    ) {
        if self.phase != Phase::Running {
            trace!(what, phase = self.phase.name(), "change before running");
            return;
        }
        let Some(mut resources) = self.resources else {
            return;
        };
        self.phase = Phase::Reinitializing;
        let result = rebuild(self, &mut resources);
        self.resources = Some(resources);
        match result {
            Ok(()) => {
                self.phase = Phase::Running;
                trace!(what, "resources updated");
            }
            Err(e) => {
                warn!(what, error = %e, "rebuild failed");
                self.halt(e);
            }
        }
    }

    fn create_monkey_program(&mut self) -> Result<ProgramHandle, BackendError> {
        self.backend.create_program(
            &shaders::monkey_vertex(),
            &shaders::monkey_fragment(
                self.settings.light_count(),
                self.settings.material.refract_colors,
            ),
        )
    }

    fn rebuild_monkey_program(&mut self, resources: &mut Resources) -> Result<(), BackendError> {
        let program = self.create_monkey_program()?;
        self.backend.release_program(resources.monkey_program);
        debug!(
            handle = %program,
            light_count = self.settings.light_count(),
            refract_colors = self.settings.material.refract_colors,
            "monkey program rebuilt"
        );
        resources.monkey_program = program;
        Ok(())
    }

    fn rebuild_light_buffer(
        &mut self,
        resources: &mut Resources,
        count: usize,
    ) -> Result<(), BackendError> {
        self.backend.release_buffer(resources.light_buffer);
        self.light_block = UniformBlock::new(shaders::light_layout(count));
        self.pack_lights()?;
        let buffer = self
            .backend
            .create_uniform_buffer(shaders::LIGHT_BINDING, self.light_block.layout())?;
        self.backend
            .write_uniform_buffer(buffer, self.light_block.bytes())?;
        debug!(handle = %buffer, light_count = count, "light buffer rebuilt");
        resources.light_buffer = buffer;
        Ok(())
    }

    /// Rewrite just the projection matrix at the start of the camera block.
    fn write_projection(&mut self, buffer: BufferHandle) -> Result<(), BackendError> {
        self.camera_block.write_mat4("projection", &self.projection)?;
        let end = slot_end(&self.camera_block, "projection")?;
        self.backend
            .write_uniform_buffer(buffer, &self.camera_block.bytes()[..end])
    }

    fn pack_camera(&mut self) -> Result<(), BackendError> {
        let frame = camera::frame(&self.settings.camera, self.projection);
        let block = &mut self.camera_block;
        block.write_mat4("projection", &frame.projection)?;
        block.write_mat4("view", &frame.view)?;
        block.write("position", &frame.position.extend(1.0).to_array())?;
        block.write_mat4("inverse_view_projection", &frame.inverse_view_projection)
    }

    fn pack_material(&mut self) -> Result<(), BackendError> {
        let material = &self.settings.material;
        let block = &mut self.material_block;
        block.write("ambient_color", &material.ambient.to_array())?;
        block.write("diffuse_color", &material.diffuse.to_array())?;
        block.write("specular_color", &material.specular.to_array())?;
        block.write("specular_highlight", &[material.highlight])?;
        block.write("refraction_index", &material.refraction_index.to_array())?;
        block.write("refraction_scalar", &[material.refraction_scalar])?;
        block.write("reflection_scalar", &[material.reflection_scalar])
    }

    /// Every light slot is packed from the whole list, so removing a light
    /// in the middle never leaves a stale slot behind.
    fn pack_lights(&mut self) -> Result<(), BackendError> {
        let count = self.settings.light_count();
        for i in 0..count {
            let (ambient, diffuse, specular, vector) = match self.settings.lights.get(i) {
                Some(light) => (
                    light.ambient,
                    light.diffuse,
                    light.specular,
                    self.animation.light_vector(light),
                ),
                None => (Vec3::ZERO, Vec3::ZERO, Vec3::ZERO, Vec3::Y),
            };
            let block = &mut self.light_block;
            block.write(&format!("ambient_color_{i}"), &ambient.to_array())?;
            block.write(&format!("diffuse_color_{i}"), &diffuse.to_array())?;
            block.write(&format!("specular_color_{i}"), &specular.to_array())?;
            block.write(&format!("direction_position_{i}"), &vector.to_array())?;
        }
        Ok(())
    }

    fn draw(&mut self, resources: &Resources) -> Result<(), BackendError> {
        self.backend.begin_frame()?;

        self.pack_camera()?;
        self.backend
            .write_uniform_buffer(resources.camera_buffer, self.camera_block.bytes())?;
        if self.settings.mesh.animate_lights {
            self.pack_lights()?;
            self.backend
                .write_uniform_buffer(resources.light_buffer, self.light_block.bytes())?;
        }

        let sky = DrawUniforms {
            model: Mat4::IDENTITY,
            texture: Some(resources.skybox),
        };
        match self.settings.mesh.skybox_method {
            SkyboxMethod::FrustumPlane => {
                self.backend
                    .draw_indexed(resources.plane, resources.skybox_plane_program, &sky)?;
            }
            SkyboxMethod::Cube => {
                self.backend
                    .draw_indexed(resources.cube, resources.skybox_cube_program, &sky)?;
            }
        }

        let monkey = DrawUniforms {
            model: self.animation.model(),
            texture: Some(resources.skybox),
        };
        self.backend
            .draw_indexed(resources.monkey, resources.monkey_program, &monkey)?;

        self.backend.end_frame()
    }

    fn halt(&mut self, e: BackendError) {
        error!(error = %e, code = e.code(), phase = self.phase.name(), "backend error, halting");
        self.phase = Phase::Halted;
        self.error = Some(e);
    }
}

impl<B: Backend> FrameHandler for ResourceManager<B> {
    fn update(&mut self, step: Duration) {
        if self.phase == Phase::Running {
            self.animation.advance(step, &self.settings.mesh);
        }
    }

    fn render(&mut self) -> FrameOutcome {
        if self.phase == Phase::Halted {
            return FrameOutcome::Stop;
        }
        let Some(resources) = self.resources.filter(|_| self.phase == Phase::Running) else {
            return FrameOutcome::Continue;
        };
        let result = self.draw(&resources);
        let pending = self.backend.take_error();
        match result.err().or(pending) {
            None => FrameOutcome::Continue,
            Some(e) => {
                self.halt(e);
                FrameOutcome::Stop
            }
        }
    }
}

/// The monkey stand-in: a sphere whose density follows `lowpoly`.
pub fn monkey_geometry(mesh: &MeshSettings) -> Geometry {
    let geometry = Geometry::icosphere(if mesh.lowpoly { 1 } else { 3 });
    if mesh.flatten {
        geometry.flatten_normals()
    } else {
        geometry
    }
}

fn slot_end(block: &UniformBlock, name: &str) -> Result<usize, BackendError> {
    block
        .layout()
        .slot(name)
        .map(|slot| slot.offset + slot.kind.components() * 4)
        .ok_or_else(|| BackendError::MissingResource(format!("uniform slot {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::scene_schema;
    use lumen_render::{Call, RecordingBackend, ResourceKind};

    fn defaults() -> Node {
        lumen_panel::defaults(&scene_schema())
    }

    fn running() -> ResourceManager<RecordingBackend> {
        let mut manager = ResourceManager::new(RecordingBackend::new(), "assets", 1.5);
        manager.initialize(&defaults());
        assert_eq!(manager.phase(), Phase::Running);
        manager.backend_mut().clear_calls();
        manager
    }

    fn creates(manager: &ResourceManager<RecordingBackend>) -> [usize; 4] {
        ResourceKind::ALL.map(|kind| manager.backend().created(kind))
    }

    #[test]
    fn initialize_allocates_everything_once() {
        let mut manager = ResourceManager::new(RecordingBackend::new(), "assets", 1.0);
        manager.initialize(&defaults());
        let backend = manager.backend();
        assert_eq!(backend.live(ResourceKind::Buffer), 3);
        assert_eq!(backend.live(ResourceKind::Program), 3);
        assert_eq!(backend.live(ResourceKind::Mesh), 3);
        assert_eq!(backend.live(ResourceKind::Texture), 1);
        assert_eq!(backend.texture_loads(), 1);

        manager.initialize(&defaults());
        assert_eq!(manager.backend().created(ResourceKind::Buffer), 3);
    }

    #[test]
    fn changes_before_initialize_only_track_settings() {
        let mut manager = ResourceManager::new(RecordingBackend::new(), "assets", 1.0);
        let lights = defaults().field("lights").cloned().unwrap();
        manager.lights_changed(&lights.pushed(vec![Node::empty_map()]));
        assert_eq!(manager.settings().light_count(), 2);
        assert!(manager.backend().calls().is_empty());
    }

    #[test]
    fn light_count_rebuilds_buffer_and_program() {
        let mut manager = running();
        let lights = defaults().field("lights").cloned().unwrap();
        let first = lights.as_list().unwrap()[0].clone();
        manager.lights_changed(&lights.pushed(vec![first]));

        let backend = manager.backend();
        assert_eq!(backend.created(ResourceKind::Buffer), 1);
        assert_eq!(backend.released(ResourceKind::Buffer), 1);
        assert_eq!(backend.created(ResourceKind::Program), 1);
        assert_eq!(backend.released(ResourceKind::Program), 1);
        assert_eq!(backend.created(ResourceKind::Mesh), 0);
        assert_eq!(backend.texture_loads(), 0);
        let buffer = backend.buffer_at(shaders::LIGHT_BINDING).unwrap();
        assert_eq!(
            backend.buffer(buffer).map(|(_, bytes)| bytes.len()),
            Some(shaders::light_layout(2).size())
        );
        // The old buffer goes before the new one is made.
        assert!(matches!(backend.calls()[0], Call::Release(ResourceKind::Buffer, _)));
    }

    #[test]
    fn light_colors_are_slot_writes() {
        let mut manager = running();
        let lights = defaults().field("lights").cloned().unwrap();
        let dimmer = lights.with_path(
            &[0.into(), "diffuse".into()],
            Some(Node::from([0.2, 0.2, 0.2])),
        );
        manager.lights_changed(&dimmer);
        assert_eq!(creates(&manager), [0; 4]);
        assert_eq!(manager.backend().buffer_writes(), 1);
        assert_eq!(manager.light_block.read("diffuse_color_0"), Some(&[0.2f32, 0.2, 0.2][..]));
    }

    #[test]
    fn refract_colors_rebuilds_program_only() {
        let mut manager = running();
        let material = defaults().field("material").cloned().unwrap();
        manager.material_changed(&material.with(&"refractColors".into(), Some(false.into())));
        assert_eq!(creates(&manager), [0, 1, 0, 0]);

        manager.material_changed(&material.with(&"highlight".into(), Some(8.0.into())));
        assert_eq!(creates(&manager), [0, 1, 0, 0]);
        assert_eq!(manager.material_block.read("specular_highlight"), Some(&[8.0f32][..]));
    }

    #[test]
    fn mesh_flags_rebuild_mesh_and_texture_reloads_in_place() {
        let mut manager = running();
        let mesh = defaults().field("mesh").cloned().unwrap();
        manager.mesh_changed(&mesh.with(&"lowpoly".into(), Some(true.into())));
        assert_eq!(creates(&manager), [0, 0, 1, 0]);
        assert_eq!(manager.backend().released(ResourceKind::Mesh), 1);

        manager.backend_mut().clear_calls();
        let mesh = mesh.with(&"lowpoly".into(), Some(true.into()));
        manager.mesh_changed(&mesh.with(&"skyboxTexture".into(), Some("druidcove".into())));
        assert_eq!(creates(&manager), [0; 4]);
        assert_eq!(manager.backend().texture_loads(), 1);
        match &manager.backend().calls()[0] {
            Call::LoadTexture(_, faces) => assert!(faces[0].ends_with("druidcove/druidcove_rt.png")),
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[test]
    fn projection_change_is_a_partial_write() {
        let mut manager = running();
        let camera = defaults().field("camera").cloned().unwrap();
        manager.camera_changed(&camera.with(&"offset".into(), Some(4.0.into())));
        assert_eq!(manager.backend().buffer_writes(), 0);

        manager.camera_changed(&camera.with(&"fov".into(), Some(90.0.into())));
        assert_eq!(creates(&manager), [0; 4]);
        assert_eq!(manager.backend().buffer_writes(), 1);
    }

    #[test]
    fn render_draws_skybox_then_monkey() {
        let mut manager = running();
        assert_eq!(manager.render(), FrameOutcome::Continue);
        let backend = manager.backend();
        assert_eq!((backend.frames(), backend.draws()), (1, 2));
        let draws: Vec<_> = backend
            .calls()
            .iter()
            .filter_map(|call| match call {
                Call::Draw { uniforms, .. } => Some(uniforms.texture.is_some()),
                _ => None,
            })
            .collect();
        assert_eq!(draws, [true, true]);
    }

    #[test]
    fn render_before_initialize_draws_nothing() {
        let mut manager = ResourceManager::new(RecordingBackend::new(), "assets", 1.0);
        manager.update(Duration::from_millis(16));
        assert_eq!(manager.render(), FrameOutcome::Continue);
        assert_eq!(manager.backend().frames(), 0);
    }

    #[test]
    fn backend_error_halts() {
        let mut manager = running();
        manager.backend_mut().inject_error(BackendError::OutOfMemory);
        assert_eq!(manager.render(), FrameOutcome::Stop);
        assert_eq!(manager.phase(), Phase::Halted);
        assert_eq!(manager.error().map(BackendError::code), Some(0x0505));

        let frames = manager.backend().frames();
        assert_eq!(manager.render(), FrameOutcome::Stop);
        assert_eq!(manager.backend().frames(), frames);
    }

    #[test]
    fn failed_draw_halts() {
        let mut manager = running();
        manager.backend_mut().fail_next_draw(BackendError::InvalidEnum);
        assert_eq!(manager.render(), FrameOutcome::Stop);
        assert_eq!(manager.error(), Some(&BackendError::InvalidEnum));
    }

    #[test]
    fn release_all_frees_every_handle() {
        let mut manager = running();
        manager.release_all();
        for kind in ResourceKind::ALL {
            assert_eq!(manager.backend().live(kind), 0, "{kind:?}");
        }
        assert_eq!(manager.phase(), Phase::Uninitialized);
    }
}
