mod ui;

use anyhow::{Context as _, Result, anyhow};
use clap::Parser;
use egui::Context as EguiContext;
use glam::Vec2;
use lumen_input::{Action, PointerButton, PointerTracker};
use lumen_persist::{
    DEFAULT_NAMESPACE, FileStorage, MemoryStorage, Preset, SessionPersistence, SessionStorage,
};
use lumen_render_wgpu::WgpuBackend;
use lumen_scene::{Session, SessionConfig};
use lumen_state::SystemClock;
use lumen_tools::StoreInspector;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

/// Pixels of trackpad scroll per wheel line.
const PIXELS_PER_LINE: f32 = 50.0;

#[derive(Parser)]
#[command(name = "lumen-desktop", about = "Reflective monkey in a skybox, with live settings")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Settings namespace
    #[arg(long, default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Keep session storage in this directory instead of in memory
    #[arg(long)]
    session_dir: Option<PathBuf>,

    /// Root directory of the skybox image sets
    #[arg(long, default_value = "./assets/skybox")]
    assets: PathBuf,

    /// Start from this preset, replacing the stored settings
    #[arg(long)]
    preset: Option<String>,

    /// Simulation updates per second
    #[arg(long, default_value_t = 60.0)]
    fps: f64,
}

struct Gpu {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    egui_winit: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
    session: Session<WgpuBackend>,
}

struct App {
    persistence: SessionPersistence,
    config: SessionConfig,
    gpu: Option<Gpu>,
    egui_ctx: EguiContext,
    pointer: PointerTracker,
    show_panel: bool,
    halted_logged: bool,
}

impl App {
    fn new(persistence: SessionPersistence, config: SessionConfig) -> Self {
        Self {
            persistence,
            config,
            gpu: None,
            egui_ctx: EguiContext::default(),
            pointer: PointerTracker::new(),
            show_panel: true,
            halted_logged: false,
        }
    }

    fn init_gpu(&self, event_loop: &ActiveEventLoop) -> Result<Gpu> {
        let attrs = Window::default_attributes()
            .with_title("lumen")
            .with_inner_size(PhysicalSize::new(1280u32, 720));
        let window = Arc::new(event_loop.create_window(attrs)?);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(window.clone())?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| anyhow!("no compatible GPU adapter"))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("lumen_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .context("create device")?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or(surface_caps.formats.first())
            .copied()
            .ok_or_else(|| anyhow!("surface reports no formats"))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let egui_winit = egui_winit::State::new(
            self.egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        let egui_renderer = egui_wgpu::Renderer::new(&device, surface_format, None, 1, false);

        tracing::info!(
            backend = adapter.get_info().backend.to_str(),
            "GPU initialized"
        );

        let backend = WgpuBackend::new(device, queue, surface_format, config.width, config.height);
        let session_config = SessionConfig {
            aspect: config.width as f32 / config.height as f32,
            ..self.config.clone()
        };
        let session = Session::mount(
            self.persistence.clone(),
            Rc::new(SystemClock::new()),
            backend,
            session_config,
        );

        Ok(Gpu {
            window,
            surface,
            config,
            egui_winit,
            egui_renderer,
            session,
        })
    }

    fn apply(&mut self, action: Action) {
        if action == Action::TogglePanel {
            self.show_panel = !self.show_panel;
            return;
        }
        let Some(gpu) = &self.gpu else {
            return;
        };
        match gpu.session.apply(&action) {
            Ok(true) if action.reloads() => {
                self.halted_logged = false;
                tracing::info!(?action, "reload scheduled");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "action failed"),
        }
    }

    fn redraw(&mut self) {
        let Some(gpu) = &mut self.gpu else {
            return;
        };

        let output = match gpu.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let manager = gpu.session.manager().borrow();
                gpu.surface.configure(manager.backend().device(), &gpu.config);
                return;
            }
            Err(e) => {
                tracing::error!("surface error: {e}");
                return;
            }
        };
        let view_desc = wgpu::TextureViewDescriptor::default();

        gpu.session
            .manager()
            .borrow_mut()
            .backend_mut()
            .set_target(Some(output.texture.create_view(&view_desc)));
        let report = gpu.session.frame_at(Instant::now());
        gpu.session.manager().borrow_mut().backend_mut().set_target(None);
        if !report.running && !self.halted_logged {
            tracing::error!("render loop halted, load a preset or reset to restart");
            self.halted_logged = true;
        }

        let summary = StoreInspector::summary(gpu.session.store());
        let status = match gpu.session.manager().borrow().error() {
            Some(e) => format!("halted: {e} ({:#06x})", e.code()),
            None => format!("revision {}", summary.revision),
        };

        let raw_input = gpu.egui_winit.take_egui_input(&gpu.window);
        let mut actions = Vec::new();
        let show_panel = self.show_panel;
        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            if show_panel {
                actions = ui::draw_panel(ctx, gpu.session.panel(), &status);
            }
        });
        gpu.egui_winit
            .handle_platform_output(&gpu.window, full_output.platform_output);

        let paint_jobs = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);
        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [gpu.config.width, gpu.config.height],
            pixels_per_point: full_output.pixels_per_point,
        };

        {
            let manager = gpu.session.manager().borrow();
            let (device, queue) = (manager.backend().device(), manager.backend().queue());
            let view = output.texture.create_view(&view_desc);
            for (id, image_delta) in &full_output.textures_delta.set {
                gpu.egui_renderer
                    .update_texture(device, queue, *id, image_delta);
            }
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("egui_encoder"),
            });
            gpu.egui_renderer.update_buffers(
                device,
                queue,
                &mut encoder,
                &paint_jobs,
                &screen_descriptor,
            );
            {
                let mut pass = encoder
                    .begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("egui_pass"),
                        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                            view: &view,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Load,
                                store: wgpu::StoreOp::Store,
                            },
                        })],
                        depth_stencil_attachment: None,
                        ..Default::default()
                    })
                    .forget_lifetime();
                gpu.egui_renderer
                    .render(&mut pass, &paint_jobs, &screen_descriptor);
            }
            queue.submit(std::iter::once(encoder.finish()));
            for id in &full_output.textures_delta.free {
                gpu.egui_renderer.free_texture(id);
            }
        }

        output.present();
        gpu.window.request_redraw();

        for action in actions {
            self.apply(action);
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.gpu.is_some() {
            return;
        }
        match self.init_gpu(event_loop) {
            Ok(gpu) => self.gpu = Some(gpu),
            Err(e) => {
                tracing::error!("failed to initialize: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(gpu) = &mut self.gpu {
            let response = gpu.egui_winit.on_window_event(&gpu.window, &event);
            if response.consumed {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.config.width = new_size.width.max(1);
                    gpu.config.height = new_size.height.max(1);
                    let mut manager = gpu.session.manager().borrow_mut();
                    gpu.surface.configure(manager.backend().device(), &gpu.config);
                    manager
                        .backend_mut()
                        .resize(gpu.config.width, gpu.config.height);
                    manager.resize(gpu.config.width, gpu.config.height);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::F1),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                self.apply(Action::TogglePanel);
            }
            WindowEvent::MouseInput { button, state, .. } => {
                let button = match button {
                    MouseButton::Left => PointerButton::Primary,
                    MouseButton::Right => PointerButton::Secondary,
                    _ => PointerButton::Other,
                };
                self.pointer
                    .button(button, state == ElementState::Pressed);
            }
            WindowEvent::CursorMoved { position, .. } => {
                let position = Vec2::new(position.x as f32, position.y as f32);
                if let Some(action) = self.pointer.moved(position) {
                    self.apply(action);
                }
            }
            WindowEvent::CursorLeft { .. } => self.pointer.left(),
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / PIXELS_PER_LINE,
                };
                // Scrolling up moves the camera in.
                if let Some(action) = self.pointer.wheel(-lines) {
                    self.apply(action);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(gpu) = &self.gpu {
            gpu.window.request_redraw();
        }
    }
}

fn persistence(session_dir: Option<&PathBuf>) -> Result<SessionPersistence> {
    let storage: Rc<dyn SessionStorage> = match session_dir {
        Some(dir) => Rc::new(
            FileStorage::open(dir)
                .with_context(|| format!("open session storage at {}", dir.display()))?,
        ),
        None => Rc::new(MemoryStorage::new()),
    };
    Ok(SessionPersistence::new(storage))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    tracing::info!("lumen-desktop starting");

    let persistence = persistence(cli.session_dir.as_ref())?;
    if let Some(name) = &cli.preset {
        let preset: Preset = name.parse()?;
        preset.write(&persistence, &cli.namespace)?;
    }

    let config = SessionConfig {
        namespace: cli.namespace,
        assets: cli.assets,
        fps: cli.fps,
        ..SessionConfig::default()
    };

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(persistence, config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
