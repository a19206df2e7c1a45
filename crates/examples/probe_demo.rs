//! Light field probe demo
//!
//! A small courtyard streamed in from a loader thread, one probe, and a
//! procedural sky. Press P to bake the probe, O to show its atlases.
//!
//! Controls:
//!   WASD        : move forward/left/back/right
//!   Space/Shift : move up/down
//!   Arrows      : look around (or drag with the mouse after clicking)
//!   P           : precompute the probe
//!   O           : toggle the atlas overlay
//!   1-4         : radiance / distance high / distance low / normals
//!   Escape      : release cursor / exit
//!
//! Settings are read from the JSON file named by `LIGHTFIELD_SETTINGS`.

use glam::{Mat4, Quat, Vec3};
use lightfield_render::loader::MeshSender;
use lightfield_render::pacing::next_frame_deadline;
use lightfield_render::{
    AtlasChannel, Camera, DirectionalLight, Environment, FrameLoop, LoadedMesh, Material, MeshData,
    ProbeConfig, ProbeSet, Scene, SceneLoader, Settings, WgpuBackend,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{CursorGrabMode, Window, WindowId},
};

const SETTINGS_ENV: &str = "LIGHTFIELD_SETTINGS";

fn main() {
    env_logger::init();
    log::info!("Starting light field probe demo");

    let settings = Settings::from_env(SETTINGS_ENV).unwrap_or_else(|e| {
        log::warn!("Ignoring settings: {}", e);
        Settings::default()
    });

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let mut app = App { settings: Some(settings), state: None };

    event_loop.run_app(&mut app).expect("Event loop error");
}

struct App {
    settings: Option<Settings>,
    state: Option<AppState>,
}

struct AppState {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    backend: WgpuBackend,
    frame_loop: FrameLoop,
    last_frame: Instant,
    next_frame: Instant,

    cam_yaw: f32,
    cam_pitch: f32,
    keys: HashSet<KeyCode>,
    cursor_grabbed: bool,
    mouse_delta: (f32, f32),
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        let settings = self.settings.take().unwrap_or_default();

        let window = Arc::new(
            event_loop
                .create_window(
                    Window::default_attributes()
                        .with_title("Light Field Probes")
                        .with_inner_size(winit::dpi::LogicalSize::new(1280u32, 720u32)),
                )
                .expect("Failed to create window"),
        );

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window.clone())
            .expect("Failed to create surface");

        let (adapter, device, queue) =
            WgpuBackend::request_device(&instance, Some(&surface)).expect("Failed to create device");
        let device = Arc::new(device);
        let queue = Arc::new(queue);

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .expect("Surface reports no formats");

        let size = window.inner_size();
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let mut backend = WgpuBackend::new(
            device,
            queue,
            surface_format,
            surface_config.width,
            surface_config.height,
        )
        .expect("Failed to create backend");

        let config = ProbeConfig::default();
        backend.check_config(&config).expect("Probe config unsupported");

        let loader = SceneLoader::spawn(load_courtyard).expect("Failed to start loader");
        let scene = Scene::new()
            .with_light(DirectionalLight::default())
            .with_probes(ProbeSet::new().with_probe(Vec3::new(-10.0, 4.0, 0.0)))
            .with_loader(loader);

        let cam_yaw = -90f32.to_radians();
        let cam_pitch = -10f32.to_radians();
        let mut camera = Camera::from_yaw_pitch(Vec3::new(-15.0, 3.0, 0.0), cam_yaw, cam_pitch);
        camera.resize(surface_config.width, surface_config.height);

        let (sky_w, sky_h, sky) = gradient_sky(128, 64);
        let environment =
            Environment::from_rgba8(&mut backend, sky_w, sky_h, &sky).expect("Failed to upload sky");

        let frame_loop = FrameLoop::new(&mut backend, config, settings, scene, camera)
            .expect("Failed to create frame loop")
            .with_environment(environment);

        let now = Instant::now();
        self.state = Some(AppState {
            window,
            surface,
            surface_config,
            backend,
            frame_loop,
            last_frame: now,
            next_frame: now,
            cam_yaw,
            cam_pitch,
            keys: HashSet::new(),
            cursor_grabbed: false,
            mouse_delta: (0.0, 0.0),
        });
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(state) = &mut self.state else { return };

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Shutting down");
                event_loop.exit();
            }
            WindowEvent::KeyboardInput {
                event: KeyEvent {
                    state: ElementState::Pressed,
                    physical_key: PhysicalKey::Code(KeyCode::Escape),
                    ..
                },
                ..
            } => {
                if state.cursor_grabbed {
                    state.cursor_grabbed = false;
                    let _ = state.window.set_cursor_grab(CursorGrabMode::None);
                    state.window.set_cursor_visible(true);
                } else {
                    event_loop.exit();
                }
            }
            WindowEvent::KeyboardInput {
                event: KeyEvent { state: ks, physical_key: PhysicalKey::Code(key), repeat, .. },
                ..
            } => match ks {
                ElementState::Pressed => {
                    if !repeat {
                        state.on_key(key);
                    }
                    state.keys.insert(key);
                }
                ElementState::Released => {
                    state.keys.remove(&key);
                }
            },
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => {
                if !state.cursor_grabbed {
                    let grabbed = state
                        .window
                        .set_cursor_grab(CursorGrabMode::Confined)
                        .or_else(|_| state.window.set_cursor_grab(CursorGrabMode::Locked))
                        .is_ok();
                    if grabbed {
                        state.window.set_cursor_visible(false);
                        state.cursor_grabbed = true;
                    }
                }
            }
            WindowEvent::Resized(size) if size.width > 0 && size.height > 0 => {
                state.resize(size.width, size.height);
            }
            WindowEvent::RedrawRequested => {
                let frame_start = Instant::now();
                let dt = (frame_start - state.last_frame).as_secs_f32();
                state.last_frame = frame_start;
                if let Err(e) = state.render(dt) {
                    log::error!("Render error, shutting down: {}", e);
                    event_loop.exit();
                    return;
                }
                let fps = state.frame_loop.settings.target_fps;
                state.next_frame = next_frame_deadline(fps, frame_start, Instant::now());
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _id: DeviceId, event: DeviceEvent) {
        let Some(state) = &mut self.state else { return };
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            if state.cursor_grabbed {
                state.mouse_delta.0 += dx as f32;
                state.mouse_delta.1 += dy as f32;
            }
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(state) = &self.state else { return };
        if Instant::now() >= state.next_frame {
            state.window.request_redraw();
        } else {
            event_loop.set_control_flow(ControlFlow::WaitUntil(state.next_frame));
        }
    }
}

impl AppState {
    fn on_key(&mut self, key: KeyCode) {
        let channel = match key {
            KeyCode::Digit1 => Some(AtlasChannel::Radiance),
            KeyCode::Digit2 => Some(AtlasChannel::DistanceHigh),
            KeyCode::Digit3 => Some(AtlasChannel::DistanceLow),
            KeyCode::Digit4 => Some(AtlasChannel::Normals),
            _ => None,
        };
        if let Some(channel) = channel {
            self.frame_loop.settings.debug_probe_map = channel;
            log::info!("Overlay channel: {}", channel.name());
        }

        match key {
            KeyCode::KeyP => {
                log::info!("Precompute requested");
                self.frame_loop.request_precompute();
            }
            KeyCode::KeyO => {
                let settings = &mut self.frame_loop.settings;
                settings.debug_show_probe = !settings.debug_show_probe;
            }
            _ => {}
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface.configure(self.backend.device(), &self.surface_config);
        self.backend.resize(width, height);
        self.frame_loop.resize(width, height);
    }

    fn update_camera(&mut self, dt: f32) {
        const SPEED: f32 = 5.0;
        const LOOK_SENS: f32 = 0.002;
        const KEY_LOOK: f32 = 1.5;

        let mut yaw_delta = -self.mouse_delta.0 * LOOK_SENS;
        let mut pitch_delta = -self.mouse_delta.1 * LOOK_SENS;
        self.mouse_delta = (0.0, 0.0);
        if self.keys.contains(&KeyCode::ArrowLeft) { yaw_delta += KEY_LOOK * dt; }
        if self.keys.contains(&KeyCode::ArrowRight) { yaw_delta -= KEY_LOOK * dt; }
        if self.keys.contains(&KeyCode::ArrowUp) { pitch_delta += KEY_LOOK * dt; }
        if self.keys.contains(&KeyCode::ArrowDown) { pitch_delta -= KEY_LOOK * dt; }

        self.cam_yaw += yaw_delta;
        self.cam_pitch = (self.cam_pitch + pitch_delta).clamp(-1.5, 1.5);

        let camera = &mut self.frame_loop.camera;
        camera.set_yaw_pitch(self.cam_yaw, self.cam_pitch);

        let forward = camera.forward();
        let right = camera.right();
        let mut velocity = Vec3::ZERO;
        if self.keys.contains(&KeyCode::KeyW) { velocity += forward; }
        if self.keys.contains(&KeyCode::KeyS) { velocity -= forward; }
        if self.keys.contains(&KeyCode::KeyA) { velocity -= right; }
        if self.keys.contains(&KeyCode::KeyD) { velocity += right; }
        if self.keys.contains(&KeyCode::Space) { velocity += Vec3::Y; }
        if self.keys.contains(&KeyCode::ShiftLeft) { velocity -= Vec3::Y; }
        camera.position += velocity * SPEED * dt;
    }

    /// Errors from the renderer are fatal; surface hiccups only skip the frame
    fn render(&mut self, dt: f32) -> lightfield_render::Result<()> {
        self.update_camera(dt);

        match self.frame_loop.append_loaded_meshes(&mut self.backend) {
            Ok(0) => {}
            Ok(n) => log::info!("Loaded {} meshes", n),
            // malformed meshes are skipped, the rest of the scene still loads
            Err(e) => log::warn!("Loader error: {}", e),
        }

        let output = match self.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(self.backend.device(), &self.surface_config);
                return Ok(());
            }
            Err(e) => {
                log::warn!("Surface error: {:?}", e);
                return Ok(());
            }
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.backend.set_surface_target(view);

        let report = self.frame_loop.render_frame(&mut self.backend);
        self.backend.clear_surface_target();
        if report?.precomputed {
            if let Some(duration) = self.frame_loop.scheduler().last_duration() {
                log::info!("Probe baked in {:.1} ms", duration.as_secs_f64() * 1000.0);
            }
        }
        output.present();
        Ok(())
    }
}

/// Courtyard geometry, sent one mesh at a time
fn load_courtyard(sender: MeshSender) {
    let unit = || MeshData::cube([0.0, 0.0, 0.0], 0.5);
    let boxed = |center: Vec3, size: Vec3| Mat4::from_scale_rotation_translation(size, Quat::IDENTITY, center);

    let meshes = vec![
        LoadedMesh::new(
            "Ground",
            MeshData::plane([0.0, 0.0, 0.0], 20.0),
            Material::default().with_base_color([0.7, 0.7, 0.65]),
            Mat4::IDENTITY,
        ),
        LoadedMesh::new(
            "Red Wall",
            unit(),
            Material::default().with_base_color([0.8, 0.15, 0.1]),
            boxed(Vec3::new(0.0, 4.0, -8.0), Vec3::new(30.0, 8.0, 0.5)),
        ),
        LoadedMesh::new(
            "Green Wall",
            unit(),
            Material::default().with_base_color([0.15, 0.7, 0.2]),
            boxed(Vec3::new(0.0, 4.0, 8.0), Vec3::new(30.0, 8.0, 0.5)),
        ),
        LoadedMesh::new(
            "Pillar",
            unit(),
            Material::default(),
            boxed(Vec3::new(-4.0, 3.0, -2.0), Vec3::new(1.5, 6.0, 1.5)),
        ),
        LoadedMesh::new(
            "Crate",
            unit(),
            Material::default().with_base_color([0.6, 0.45, 0.25]).with_roughness(0.9),
            boxed(Vec3::new(-8.0, 1.0, 3.0), Vec3::splat(2.0)),
        ),
        LoadedMesh::new(
            "Lamp",
            MeshData::sphere(0.6, 16, 24),
            Material::default().with_base_color([1.0, 0.8, 0.5]).with_emissive(4.0),
            Mat4::from_translation(Vec3::new(-13.0, 5.0, -4.0)),
        ),
    ];

    for mesh in meshes {
        if let Err(e) = sender.send(mesh) {
            log::warn!("{}", e);
            return;
        }
    }
}

/// Vertical sky gradient with a warm horizon and a darker ground
fn gradient_sky(width: u32, height: u32) -> (u32, u32, Vec<u8>) {
    let zenith = Vec3::new(0.18, 0.35, 0.75);
    let horizon = Vec3::new(0.85, 0.8, 0.7);
    let ground = Vec3::new(0.25, 0.22, 0.2);

    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        let v = (y as f32 + 0.5) / height as f32;
        let color = if v < 0.5 {
            zenith.lerp(horizon, (v / 0.5).powf(3.0))
        } else {
            horizon.lerp(ground, ((v - 0.5) / 0.5).powf(0.3))
        };
        let rgba = [
            (color.x * 255.0) as u8,
            (color.y * 255.0) as u8,
            (color.z * 255.0) as u8,
            255,
        ];
        for _ in 0..width {
            pixels.extend_from_slice(&rgba);
        }
    }
    (width, height, pixels)
}
