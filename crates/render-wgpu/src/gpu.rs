use crate::cubemap::{CubemapLoader, LoadResult};
use glam::Mat4;
use lumen_render::{
    Backend, BackendError, BufferHandle, DrawUniforms, Geometry, MeshHandle, ProgramHandle,
    TextureHandle, UniformLayout, shaders,
};
use std::collections::{BTreeMap, VecDeque};
use std::num::NonZeroU64;
use std::path::PathBuf;
use tracing::{debug, error, info, trace, warn};
use wgpu::util::DeviceExt;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const CUBEMAP_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
/// Model matrices live in one buffer, one per draw, at this alignment.
const MODEL_STRIDE: u64 = 256;
const MAX_DRAWS: usize = 64;
/// Bound in place of a uniform block nobody has created yet.
const FALLBACK_BUFFER_SIZE: u64 = 1024;
const PLACEHOLDER_TEXEL: [u8; 4] = [96, 96, 96, 255];
const VERTEX_STRIDE: u64 = 6 * 4;

struct GpuBuffer {
    binding: u32,
    buffer: wgpu::Buffer,
}

struct GpuMesh {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
}

struct GpuTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct PendingDraw {
    mesh: MeshHandle,
    program: ProgramHandle,
    model: Mat4,
    texture: Option<TextureHandle>,
}

/// [`Backend`] on a wgpu device.
///
/// The host points the backend at a colour target with
/// [`WgpuBackend::set_target`] before each frame; without a target frames
/// are validated and dropped.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_format: wgpu::TextureFormat,
    depth: wgpu::TextureView,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    fallback_buffer: wgpu::Buffer,
    fallback_texture: GpuTexture,
    model_buffer: wgpu::Buffer,
    next_id: u32,
    buffers: BTreeMap<BufferHandle, GpuBuffer>,
    programs: BTreeMap<ProgramHandle, wgpu::RenderPipeline>,
    meshes: BTreeMap<MeshHandle, GpuMesh>,
    textures: BTreeMap<TextureHandle, GpuTexture>,
    target: Option<wgpu::TextureView>,
    frame: Option<Vec<PendingDraw>>,
    loader: CubemapLoader,
    uncaptured: flume::Receiver<BackendError>,
    errors: VecDeque<BackendError>,
}

impl WgpuBackend {
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let (error_tx, uncaptured) = flume::unbounded();
        device.on_uncaptured_error(Box::new(move |e| {
            error!("uncaptured GPU error: {e}");
            let _ = error_tx.send(classify(&e));
        }));

        let uniform = |binding, dynamic: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: dynamic,
                min_binding_size: None,
            },
            count: None,
        };
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("scene_bind_group_layout"),
            entries: &[
                uniform(shaders::CAMERA_BINDING, false),
                uniform(shaders::MATERIAL_BINDING, false),
                uniform(shaders::LIGHT_BINDING, false),
                wgpu::BindGroupLayoutEntry {
                    binding: shaders::SKYBOX_TEXTURE_BINDING,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::Cube,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: shaders::SKYBOX_SAMPLER_BINDING,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                uniform(shaders::MODEL_BINDING, true),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("scene_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("skybox_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let fallback_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fallback_uniform_buffer"),
            size: FALLBACK_BUFFER_SIZE,
            usage: wgpu::BufferUsages::UNIFORM,
            mapped_at_creation: false,
        });
        let model_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("model_buffer"),
            size: MODEL_STRIDE * MAX_DRAWS as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let placeholder: Vec<Vec<u8>> = vec![PLACEHOLDER_TEXEL.to_vec(); 6];
        let fallback_texture = create_cube(&device, &queue, 1, &placeholder);
        let depth = create_depth(&device, width, height);

        info!(?surface_format, width, height, "wgpu backend ready");
        Self {
            device,
            queue,
            surface_format,
            depth,
            bind_group_layout,
            pipeline_layout,
            sampler,
            fallback_buffer,
            fallback_texture,
            model_buffer,
            next_id: 0,
            buffers: BTreeMap::new(),
            programs: BTreeMap::new(),
            meshes: BTreeMap::new(),
            textures: BTreeMap::new(),
            target: None,
            frame: None,
            loader: CubemapLoader::new(),
            uncaptured,
            errors: VecDeque::new(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_format
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.depth = create_depth(&self.device, width, height);
    }

    /// Colour attachment for the next frame. The host sets it after
    /// acquiring the surface texture and clears it before presenting.
    pub fn set_target(&mut self, target: Option<wgpu::TextureView>) {
        self.target = target;
    }

    fn next_handle(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Run `f` inside a validation error scope.
    fn validated<T>(&self, f: impl FnOnce() -> T) -> Result<T, wgpu::Error> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(e) => Err(e),
            None => Ok(value),
        }
    }

    fn poll_loads(&mut self) {
        while let Some(result) = self.loader.try_recv() {
            match result {
                LoadResult::Loaded {
                    texture,
                    size,
                    faces,
                } => {
                    if !self.textures.contains_key(&texture) {
                        debug!(%texture, "cubemap arrived for a released texture");
                        continue;
                    }
                    let cube = create_cube(&self.device, &self.queue, size, &faces);
                    self.textures.insert(texture, cube);
                    info!(%texture, size, "cubemap uploaded");
                }
                LoadResult::Failed { texture, error } => {
                    warn!(%texture, %error, "cubemap load failed, keeping previous contents");
                }
            }
        }
    }

    fn bind_group(&self, texture: Option<TextureHandle>) -> wgpu::BindGroup {
        let buffer_at = |binding: u32| {
            self.buffers
                .values()
                .find(|b| b.binding == binding)
                .map_or(&self.fallback_buffer, |b| &b.buffer)
                .as_entire_binding()
        };
        let view = texture
            .and_then(|t| self.textures.get(&t))
            .unwrap_or(&self.fallback_texture);
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("scene_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: shaders::CAMERA_BINDING,
                    resource: buffer_at(shaders::CAMERA_BINDING),
                },
                wgpu::BindGroupEntry {
                    binding: shaders::MATERIAL_BINDING,
                    resource: buffer_at(shaders::MATERIAL_BINDING),
                },
                wgpu::BindGroupEntry {
                    binding: shaders::LIGHT_BINDING,
                    resource: buffer_at(shaders::LIGHT_BINDING),
                },
                wgpu::BindGroupEntry {
                    binding: shaders::SKYBOX_TEXTURE_BINDING,
                    resource: wgpu::BindingResource::TextureView(&view.view),
                },
                wgpu::BindGroupEntry {
                    binding: shaders::SKYBOX_SAMPLER_BINDING,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: shaders::MODEL_BINDING,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &self.model_buffer,
                        offset: 0,
                        size: NonZeroU64::new(64),
                    }),
                },
            ],
        })
    }

    fn encode(&self, target: &wgpu::TextureView, draws: &[PendingDraw]) -> Result<(), BackendError> {
        for (i, draw) in draws.iter().enumerate() {
            self.queue.write_buffer(
                &self.model_buffer,
                i as u64 * MODEL_STRIDE,
                bytemuck::cast_slice(&draw.model.to_cols_array()),
            );
        }
        let mut groups = BTreeMap::new();
        for draw in draws {
            groups
                .entry(draw.texture)
                .or_insert_with(|| self.bind_group(draw.texture));
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("scene_encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            for (i, draw) in draws.iter().enumerate() {
                let pipeline = self
                    .programs
                    .get(&draw.program)
                    .ok_or_else(|| BackendError::MissingResource(draw.program.to_string()))?;
                let mesh = self
                    .meshes
                    .get(&draw.mesh)
                    .ok_or_else(|| BackendError::MissingResource(draw.mesh.to_string()))?;
                let Some(group) = groups.get(&draw.texture) else {
                    continue;
                };
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, group, &[(i as u64 * MODEL_STRIDE) as u32]);
                pass.set_vertex_buffer(0, mesh.vertices.slice(..));
                pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}

impl Backend for WgpuBackend {
    fn create_uniform_buffer(
        &mut self,
        binding: u32,
        layout: &UniformLayout,
    ) -> Result<BufferHandle, BackendError> {
        let handle = BufferHandle(self.next_handle());
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("uniform_block"),
            size: layout.size() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        debug!(%handle, binding, size = layout.size(), "uniform buffer created");
        self.buffers.insert(handle, GpuBuffer { binding, buffer });
        Ok(handle)
    }

    fn write_uniform_buffer(
        &mut self,
        buffer: BufferHandle,
        bytes: &[u8],
    ) -> Result<(), BackendError> {
        let gpu = self
            .buffers
            .get(&buffer)
            .ok_or_else(|| BackendError::MissingResource(buffer.to_string()))?;
        if bytes.len() as u64 > gpu.buffer.size() {
            return Err(BackendError::InvalidValue);
        }
        self.queue.write_buffer(&gpu.buffer, 0, bytes);
        Ok(())
    }

    fn release_buffer(&mut self, buffer: BufferHandle) {
        if let Some(gpu) = self.buffers.remove(&buffer) {
            gpu.buffer.destroy();
            debug!(%buffer, "uniform buffer released");
        }
    }

    fn create_program(
        &mut self,
        vertex: &str,
        fragment: &str,
    ) -> Result<ProgramHandle, BackendError> {
        let compile = |label, source: &str| {
            self.validated(|| {
                self.device
                    .create_shader_module(wgpu::ShaderModuleDescriptor {
                        label: Some(label),
                        source: wgpu::ShaderSource::Wgsl(source.into()),
                    })
            })
            .map_err(|e| BackendError::ShaderCompile(e.to_string()))
        };
        let vertex_module = compile("vertex_module", vertex)?;
        let fragment_module = compile("fragment_module", fragment)?;

        let pipeline = self
            .validated(|| {
                self.device
                    .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                        label: Some("scene_pipeline"),
                        layout: Some(&self.pipeline_layout),
                        vertex: wgpu::VertexState {
                            module: &vertex_module,
                            entry_point: Some("vs_main"),
                            compilation_options: Default::default(),
                            buffers: &[wgpu::VertexBufferLayout {
                                array_stride: VERTEX_STRIDE,
                                step_mode: wgpu::VertexStepMode::Vertex,
                                attributes: &wgpu::vertex_attr_array![
                                    0 => Float32x3,
                                    1 => Float32x3,
                                ],
                            }],
                        },
                        fragment: Some(wgpu::FragmentState {
                            module: &fragment_module,
                            entry_point: Some("fs_main"),
                            compilation_options: Default::default(),
                            targets: &[Some(wgpu::ColorTargetState {
                                format: self.surface_format,
                                blend: Some(wgpu::BlendState::REPLACE),
                                write_mask: wgpu::ColorWrites::ALL,
                            })],
                        }),
                        primitive: wgpu::PrimitiveState {
                            topology: wgpu::PrimitiveTopology::TriangleList,
                            cull_mode: None,
                            ..Default::default()
                        },
                        depth_stencil: Some(wgpu::DepthStencilState {
                            format: DEPTH_FORMAT,
                            depth_write_enabled: true,
                            depth_compare: wgpu::CompareFunction::LessEqual,
                            stencil: Default::default(),
                            bias: Default::default(),
                        }),
                        multisample: Default::default(),
                        multiview: None,
                        cache: None,
                    })
            })
            .map_err(|e| BackendError::ShaderCompile(e.to_string()))?;

        let handle = ProgramHandle(self.next_handle());
        debug!(%handle, "program linked");
        self.programs.insert(handle, pipeline);
        Ok(handle)
    }

    fn release_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(&program).is_some() {
            debug!(%program, "program released");
        }
    }

    fn create_mesh(&mut self, geometry: &Geometry) -> Result<MeshHandle, BackendError> {
        if geometry.indices.is_empty() {
            return Err(BackendError::InvalidValue);
        }
        let vertices = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mesh_vertices"),
                contents: bytemuck::cast_slice(&geometry.interleaved()),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let indices = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mesh_indices"),
                contents: bytemuck::cast_slice(&geometry.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        let handle = MeshHandle(self.next_handle());
        debug!(%handle, triangles = geometry.triangle_count(), "mesh uploaded");
        self.meshes.insert(
            handle,
            GpuMesh {
                vertices,
                indices,
                index_count: geometry.indices.len() as u32,
            },
        );
        Ok(handle)
    }

    fn release_mesh(&mut self, mesh: MeshHandle) {
        if let Some(gpu) = self.meshes.remove(&mesh) {
            gpu.vertices.destroy();
            gpu.indices.destroy();
            debug!(%mesh, "mesh released");
        }
    }

    fn create_cubemap_texture(&mut self) -> Result<TextureHandle, BackendError> {
        let placeholder: Vec<Vec<u8>> = vec![PLACEHOLDER_TEXEL.to_vec(); 6];
        let handle = TextureHandle(self.next_handle());
        let cube = create_cube(&self.device, &self.queue, 1, &placeholder);
        self.textures.insert(handle, cube);
        Ok(handle)
    }

    fn load_cubemap_texture(
        &mut self,
        texture: TextureHandle,
        faces: &[PathBuf; 6],
    ) -> Result<(), BackendError> {
        if !self.textures.contains_key(&texture) {
            return Err(BackendError::MissingResource(texture.to_string()));
        }
        debug!(%texture, first = %faces[0].display(), "cubemap load started");
        self.loader.spawn(texture, faces.clone());
        Ok(())
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture).is_some() {
            debug!(%texture, "texture released");
        }
    }

    fn begin_frame(&mut self) -> Result<(), BackendError> {
        if self.frame.is_some() {
            return Err(BackendError::InvalidOperation);
        }
        self.poll_loads();
        self.frame = Some(Vec::new());
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        mesh: MeshHandle,
        program: ProgramHandle,
        uniforms: &DrawUniforms,
    ) -> Result<(), BackendError> {
        if !self.meshes.contains_key(&mesh) {
            return Err(BackendError::MissingResource(mesh.to_string()));
        }
        if !self.programs.contains_key(&program) {
            return Err(BackendError::MissingResource(program.to_string()));
        }
        let draws = self
            .frame
            .as_mut()
            .ok_or(BackendError::InvalidFramebufferOperation)?;
        if draws.len() >= MAX_DRAWS {
            return Err(BackendError::OutOfMemory);
        }
        trace!(%mesh, %program, "draw queued");
        draws.push(PendingDraw {
            mesh,
            program,
            model: uniforms.model,
            texture: uniforms.texture,
        });
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), BackendError> {
        let draws = self.frame.take().ok_or(BackendError::InvalidOperation)?;
        match &self.target {
            Some(target) => self.encode(target, &draws),
            None => {
                trace!(draws = draws.len(), "no target, frame dropped");
                Ok(())
            }
        }
    }

    fn take_error(&mut self) -> Option<BackendError> {
        self.errors.extend(self.uncaptured.try_iter());
        self.errors.pop_front()
    }
}

fn classify(error: &wgpu::Error) -> BackendError {
    match error {
        wgpu::Error::OutOfMemory { .. } => BackendError::OutOfMemory,
        wgpu::Error::Validation { .. } => BackendError::InvalidOperation,
        #[allow(unreachable_patterns)]
        _ => BackendError::Unknown(0),
    }
}

fn create_depth(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth_texture"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&Default::default())
}

fn create_cube(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    size: u32,
    faces: &[Vec<u8>],
) -> GpuTexture {
    let size = size.max(1);
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("skybox_cubemap"),
        size: wgpu::Extent3d {
            width: size,
            height: size,
            depth_or_array_layers: 6,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: CUBEMAP_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    for (layer, pixels) in faces.iter().enumerate().take(6) {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: layer as u32,
                },
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * size),
                rows_per_image: Some(size),
            },
            wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
        );
    }
    let view = texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some("skybox_cubemap_view"),
        dimension: Some(wgpu::TextureViewDimension::Cube),
        ..Default::default()
    });
    GpuTexture {
        _texture: texture,
        view,
    }
}
