use crate::backend::{
    Backend, BackendError, BufferHandle, DrawUniforms, MeshHandle, ProgramHandle, TextureHandle,
};
use crate::geometry::Geometry;
use crate::layout::UniformLayout;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Buffer,
    Program,
    Mesh,
    Texture,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [Self::Buffer, Self::Program, Self::Mesh, Self::Texture];

    pub fn name(self) -> &'static str {
        match self {
            Self::Buffer => "buffer",
            Self::Program => "program",
            Self::Mesh => "mesh",
            Self::Texture => "texture",
        }
    }
}

/// One backend call, in the order it was made.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create(ResourceKind, u32),
    Release(ResourceKind, u32),
    WriteBuffer(BufferHandle),
    LoadTexture(TextureHandle, [PathBuf; 6]),
    BeginFrame,
    Draw {
        mesh: MeshHandle,
        program: ProgramHandle,
        uniforms: DrawUniforms,
    },
    EndFrame,
}

/// A backend that draws nothing and remembers everything.
///
/// Used for headless runs and to check which resources a change rebuilt.
/// Validation follows what a GPU backend would reject: unknown handles,
/// oversized writes and draws outside a frame.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    calls: Vec<Call>,
    next_id: u32,
    live: BTreeSet<(ResourceKind, u32)>,
    buffers: BTreeMap<BufferHandle, (u32, Vec<u8>)>,
    programs: BTreeMap<ProgramHandle, (String, String)>,
    meshes: BTreeMap<MeshHandle, Geometry>,
    in_frame: bool,
    errors: VecDeque<BackendError>,
    draw_failure: Option<BackendError>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    /// Forget the call log. Live resources are kept.
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn created(&self, kind: ResourceKind) -> usize {
        self.count(|call| matches!(call, Call::Create(k, _) if *k == kind))
    }

    pub fn released(&self, kind: ResourceKind) -> usize {
        self.count(|call| matches!(call, Call::Release(k, _) if *k == kind))
    }

    pub fn live(&self, kind: ResourceKind) -> usize {
        self.live.iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn buffer_writes(&self) -> usize {
        self.count(|call| matches!(call, Call::WriteBuffer(_)))
    }

    pub fn texture_loads(&self) -> usize {
        self.count(|call| matches!(call, Call::LoadTexture(..)))
    }

    pub fn draws(&self) -> usize {
        self.count(|call| matches!(call, Call::Draw { .. }))
    }

    pub fn frames(&self) -> usize {
        self.count(|call| matches!(call, Call::EndFrame))
    }

    /// Contents of a live buffer and the binding it was created for.
    pub fn buffer(&self, buffer: BufferHandle) -> Option<(u32, &[u8])> {
        self.buffers
            .get(&buffer)
            .map(|(binding, bytes)| (*binding, bytes.as_slice()))
    }

    /// The live buffer created for `binding`, if exactly one exists.
    pub fn buffer_at(&self, binding: u32) -> Option<BufferHandle> {
        let mut found = self
            .buffers
            .iter()
            .filter(|(_, (b, _))| *b == binding)
            .map(|(handle, _)| *handle);
        let first = found.next()?;
        found.next().is_none().then_some(first)
    }

    pub fn program_source(&self, program: ProgramHandle) -> Option<(&str, &str)> {
        self.programs
            .get(&program)
            .map(|(vertex, fragment)| (vertex.as_str(), fragment.as_str()))
    }

    pub fn mesh(&self, mesh: MeshHandle) -> Option<&Geometry> {
        self.meshes.get(&mesh)
    }

    /// Queue an error for [`Backend::take_error`].
    pub fn inject_error(&mut self, error: BackendError) {
        self.errors.push_back(error);
    }

    /// Make the next draw call fail with `error`.
    pub fn fail_next_draw(&mut self, error: BackendError) {
        self.draw_failure = Some(error);
    }

    /// Plain-text summary of live resources and activity.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "=== Recording backend (frames={}, draws={}) ===",
            self.frames(),
            self.draws()
        );
        for kind in ResourceKind::ALL {
            let _ = writeln!(
                out,
                "{:<8} live={} created={} released={}",
                kind.name(),
                self.live(kind),
                self.created(kind),
                self.released(kind)
            );
        }
        for (handle, (binding, bytes)) in &self.buffers {
            let _ = writeln!(out, "  {handle} binding={binding} size={}", bytes.len());
        }
        out
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|call| pred(call)).count()
    }

    fn create(&mut self, kind: ResourceKind) -> u32 {
        self.next_id += 1;
        let id = self.next_id;
        self.live.insert((kind, id));
        self.calls.push(Call::Create(kind, id));
        debug!(kind = kind.name(), handle = id, "created");
        id
    }

    fn release(&mut self, kind: ResourceKind, id: u32) -> bool {
        if !self.live.remove(&(kind, id)) {
            trace!(kind = kind.name(), handle = id, "release of dead handle ignored");
            return false;
        }
        self.calls.push(Call::Release(kind, id));
        debug!(kind = kind.name(), handle = id, "released");
        true
    }

    fn require(&self, kind: ResourceKind, id: u32) -> Result<(), BackendError> {
        if self.live.contains(&(kind, id)) {
            Ok(())
        } else {
            Err(BackendError::MissingResource(format!("{}#{id}", kind.name())))
        }
    }
}

impl Backend for RecordingBackend {
    fn create_uniform_buffer(
        &mut self,
        binding: u32,
        layout: &UniformLayout,
    ) -> Result<BufferHandle, BackendError> {
        let handle = BufferHandle(self.create(ResourceKind::Buffer));
        self.buffers
            .insert(handle, (binding, vec![0; layout.size()]));
        Ok(handle)
    }

    fn write_uniform_buffer(
        &mut self,
        buffer: BufferHandle,
        bytes: &[u8],
    ) -> Result<(), BackendError> {
        self.require(ResourceKind::Buffer, buffer.0)?;
        let Some((_, contents)) = self.buffers.get_mut(&buffer) else {
            return Err(BackendError::MissingResource(buffer.to_string()));
        };
        if bytes.len() > contents.len() {
            return Err(BackendError::InvalidValue);
        }
        contents[..bytes.len()].copy_from_slice(bytes);
        self.calls.push(Call::WriteBuffer(buffer));
        Ok(())
    }

    fn release_buffer(&mut self, buffer: BufferHandle) {
        if self.release(ResourceKind::Buffer, buffer.0) {
            self.buffers.remove(&buffer);
        }
    }

    fn create_program(
        &mut self,
        vertex: &str,
        fragment: &str,
    ) -> Result<ProgramHandle, BackendError> {
        if !vertex.contains("fn vs_main") {
            return Err(BackendError::ShaderCompile("missing vs_main".into()));
        }
        if !fragment.contains("fn fs_main") {
            return Err(BackendError::ShaderCompile("missing fs_main".into()));
        }
        let handle = ProgramHandle(self.create(ResourceKind::Program));
        self.programs
            .insert(handle, (vertex.to_owned(), fragment.to_owned()));
        Ok(handle)
    }

    fn release_program(&mut self, program: ProgramHandle) {
        if self.release(ResourceKind::Program, program.0) {
            self.programs.remove(&program);
        }
    }

    fn create_mesh(&mut self, geometry: &Geometry) -> Result<MeshHandle, BackendError> {
        if geometry.indices.is_empty() {
            return Err(BackendError::InvalidValue);
        }
        let handle = MeshHandle(self.create(ResourceKind::Mesh));
        self.meshes.insert(handle, geometry.clone());
        Ok(handle)
    }

    fn release_mesh(&mut self, mesh: MeshHandle) {
        if self.release(ResourceKind::Mesh, mesh.0) {
            self.meshes.remove(&mesh);
        }
    }

    fn create_cubemap_texture(&mut self) -> Result<TextureHandle, BackendError> {
        Ok(TextureHandle(self.create(ResourceKind::Texture)))
    }

    fn load_cubemap_texture(
        &mut self,
        texture: TextureHandle,
        faces: &[PathBuf; 6],
    ) -> Result<(), BackendError> {
        self.require(ResourceKind::Texture, texture.0)?;
        self.calls.push(Call::LoadTexture(texture, faces.clone()));
        debug!(%texture, first = %faces[0].display(), "cubemap load started");
        Ok(())
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        self.release(ResourceKind::Texture, texture.0);
    }

    fn begin_frame(&mut self) -> Result<(), BackendError> {
        if self.in_frame {
            return Err(BackendError::InvalidOperation);
        }
        self.in_frame = true;
        self.calls.push(Call::BeginFrame);
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        mesh: MeshHandle,
        program: ProgramHandle,
        uniforms: &DrawUniforms,
    ) -> Result<(), BackendError> {
        if !self.in_frame {
            return Err(BackendError::InvalidFramebufferOperation);
        }
        if let Some(error) = self.draw_failure.take() {
            return Err(error);
        }
        self.require(ResourceKind::Mesh, mesh.0)?;
        self.require(ResourceKind::Program, program.0)?;
        if let Some(texture) = uniforms.texture {
            self.require(ResourceKind::Texture, texture.0)?;
        }
        trace!(%mesh, %program, "draw");
        self.calls.push(Call::Draw {
            mesh,
            program,
            uniforms: *uniforms,
        });
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), BackendError> {
        if !self.in_frame {
            return Err(BackendError::InvalidOperation);
        }
        self.in_frame = false;
        self.calls.push(Call::EndFrame);
        Ok(())
    }

    fn take_error(&mut self) -> Option<BackendError> {
        self.errors.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shaders;

    fn program(backend: &mut RecordingBackend) -> ProgramHandle {
        backend
            .create_program(&shaders::monkey_vertex(), &shaders::monkey_fragment(1, false))
            .unwrap()
    }

    #[test]
    fn counts_by_kind() {
        let mut backend = RecordingBackend::new();
        let buffer = backend
            .create_uniform_buffer(shaders::CAMERA_BINDING, &shaders::camera_layout())
            .unwrap();
        let program = program(&mut backend);
        backend.release_buffer(buffer);
        backend.release_buffer(buffer);

        assert_eq!(backend.created(ResourceKind::Buffer), 1);
        assert_eq!(backend.released(ResourceKind::Buffer), 1);
        assert_eq!(backend.live(ResourceKind::Buffer), 0);
        assert_eq!(backend.live(ResourceKind::Program), 1);
        assert!(backend.program_source(program).is_some());
    }

    #[test]
    fn buffer_writes_are_bounded() {
        let mut backend = RecordingBackend::new();
        let buffer = backend
            .create_uniform_buffer(shaders::MATERIAL_BINDING, &shaders::material_layout())
            .unwrap();
        backend.write_uniform_buffer(buffer, &[1; 16]).unwrap();
        assert_eq!(backend.buffer(buffer).map(|(_, b)| b[..16].to_vec()), Some(vec![1; 16]));
        assert_eq!(
            backend.write_uniform_buffer(buffer, &[0; 81]),
            Err(BackendError::InvalidValue)
        );
        assert_eq!(backend.buffer_at(shaders::MATERIAL_BINDING), Some(buffer));
        backend.release_buffer(buffer);
        assert!(matches!(
            backend.write_uniform_buffer(buffer, &[0; 4]),
            Err(BackendError::MissingResource(_))
        ));
    }

    #[test]
    fn draws_need_a_frame_and_live_handles() {
        let mut backend = RecordingBackend::new();
        let mesh = backend.create_mesh(&Geometry::cube()).unwrap();
        let program = program(&mut backend);
        let uniforms = DrawUniforms::default();
        assert_eq!(
            backend.draw_indexed(mesh, program, &uniforms),
            Err(BackendError::InvalidFramebufferOperation)
        );
        backend.begin_frame().unwrap();
        backend.draw_indexed(mesh, program, &uniforms).unwrap();
        backend.end_frame().unwrap();
        assert_eq!((backend.frames(), backend.draws()), (1, 1));

        backend.release_mesh(mesh);
        backend.begin_frame().unwrap();
        assert!(matches!(
            backend.draw_indexed(mesh, program, &uniforms),
            Err(BackendError::MissingResource(_))
        ));
    }

    #[test]
    fn injected_failures() {
        let mut backend = RecordingBackend::new();
        let mesh = backend.create_mesh(&Geometry::plane()).unwrap();
        let program = program(&mut backend);
        backend.fail_next_draw(BackendError::OutOfMemory);
        backend.begin_frame().unwrap();
        assert_eq!(
            backend.draw_indexed(mesh, program, &DrawUniforms::default()),
            Err(BackendError::OutOfMemory)
        );
        backend.draw_indexed(mesh, program, &DrawUniforms::default()).unwrap();

        assert_eq!(backend.take_error(), None);
        backend.inject_error(BackendError::InvalidEnum);
        assert_eq!(backend.take_error(), Some(BackendError::InvalidEnum));
        assert_eq!(backend.take_error(), None);
    }

    #[test]
    fn shader_without_entry_point_fails() {
        let mut backend = RecordingBackend::new();
        assert!(matches!(
            backend.create_program("", &shaders::skybox_fragment()),
            Err(BackendError::ShaderCompile(_))
        ));
        assert_eq!(backend.created(ResourceKind::Program), 0);
    }

    #[test]
    fn describe_lists_live_resources() {
        let mut backend = RecordingBackend::new();
        backend.create_cubemap_texture().unwrap();
        backend
            .create_uniform_buffer(shaders::LIGHT_BINDING, &shaders::light_layout(2))
            .unwrap();
        let text = backend.describe();
        assert!(text.contains("frames=0"));
        assert!(text.contains("texture  live=1 created=1 released=0"));
        assert!(text.contains("binding=2 size=128"));
    }
}
