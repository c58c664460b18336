use crate::camera3d::OrbitCamera;
use crate::config::{ViewerConfig, ViewerConfigOverrides};
use crate::lightmap;
use crate::reflection_scheduler::ReflectionScheduler;
use crate::renderer::scene_pass::GpuScene;
use crate::renderer::{FrameParams, Renderer};
use crate::scene::Scene;
use anyhow::{Context, Result};
use glam::{Vec2, Vec3};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};

pub async fn run() -> Result<()> {
    run_with_overrides(crate::cli::DEFAULT_CONFIG_PATH, &ViewerConfigOverrides::default()).await
}

pub async fn run_with_overrides(config_path: &str, overrides: &ViewerConfigOverrides) -> Result<()> {
    let mut config = ViewerConfig::load_or_default(config_path);
    config.apply_overrides(overrides);
    let event_loop = EventLoop::new().context("Failed to create winit event loop")?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app).context("Event loop execution failed")?;
    Ok(())
}

pub struct App {
    config: ViewerConfig,
    renderer: Renderer,
    scene: Scene,
    gpu_scene: Option<GpuScene>,
    orbit: OrbitCamera,
    scheduler: ReflectionScheduler,
    should_close: bool,
    dragging: bool,
    cursor: Option<(f64, f64)>,
}

impl App {
    pub fn new(config: ViewerConfig) -> Self {
        let renderer = Renderer::new(&config.window);

        // A missing model leaves an empty scene; the viewer still opens so a
        // broken asset path is diagnosable from the log instead of a crash.
        let mut scene = match Scene::load_gltf(&config.scene.model_path) {
            Ok(scene) => scene,
            Err(err) => {
                eprintln!("[scene] load error: {err:?}");
                Scene::default()
            }
        };
        if let Some(path) = &config.scene.lightmap_path {
            match lightmap::load_and_bind(&mut scene, path, config.scene.lightmap_intensity) {
                Ok(_) => {}
                Err(err) => eprintln!("[lightmap] load error: {err:?}. Continuing without baked light."),
            }
        } else {
            lightmap::recompute_scene_normals(&mut scene);
        }

        let orbit = OrbitCamera::from_placement(
            Vec3::from_array(config.camera.position),
            Vec3::from_array(config.camera.target),
            config.camera.fov_degrees.to_radians(),
            config.camera.near,
            config.camera.far,
        );

        let mut scheduler =
            ReflectionScheduler::new(config.reflection.throttle_period, config.reflection.resolution);
        scheduler.rebuild(&config.reflectors);

        Self {
            config,
            renderer,
            scene,
            gpu_scene: None,
            orbit,
            scheduler,
            should_close: false,
            dragging: false,
            cursor: None,
        }
    }

    fn frame(&mut self) {
        let Some(gpu_scene) = self.gpu_scene.as_ref() else {
            return;
        };
        let camera = self.orbit.to_camera();
        let result = self.renderer.render_frame(FrameParams {
            camera: &camera,
            lighting: &self.config.lighting,
            gpu_scene,
            scheduler: &mut self.scheduler,
        });
        if let Err(err) = result {
            eprintln!("[renderer] frame error: {err:?}");
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(err) = self.renderer.ensure_window(event_loop) {
            eprintln!("[renderer] initialization error: {err:?}");
            self.should_close = true;
            return;
        }
        if self.gpu_scene.is_none() {
            match self.renderer.upload_scene(&self.scene) {
                Ok(gpu_scene) => self.gpu_scene = Some(gpu_scene),
                Err(err) => {
                    eprintln!("[renderer] scene upload error: {err:?}");
                    self.should_close = true;
                    return;
                }
            }
        }
        if let Err(err) = self.renderer.ensure_reflector_resources(&mut self.scheduler) {
            eprintln!("[reflector] resource error: {err:?}");
            self.should_close = true;
        }
    }

    fn window_event(&mut self, _el: &ActiveEventLoop, _id: winit::window::WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.should_close = true,
            WindowEvent::Resized(size) => self.renderer.resize(size),
            WindowEvent::KeyboardInput { event: KeyEvent { logical_key, state, .. }, .. } => {
                if logical_key == Key::Named(NamedKey::Escape) && state == ElementState::Pressed {
                    self.should_close = true;
                }
            }
            WindowEvent::MouseInput { state, button: MouseButton::Left, .. } => {
                self.dragging = state == ElementState::Pressed;
            }
            WindowEvent::CursorMoved { position, .. } => {
                if self.dragging {
                    if let Some((last_x, last_y)) = self.cursor {
                        let delta = Vec2::new(
                            (position.x - last_x) as f32 * 0.005,
                            (position.y - last_y) as f32 * 0.005,
                        );
                        self.orbit.orbit(delta);
                    }
                }
                self.cursor = Some((position.x, position.y));
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 * 0.05,
                };
                self.orbit.zoom(1.0 - scroll * 0.1);
            }
            WindowEvent::RedrawRequested => self.frame(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_close {
            event_loop.exit();
            return;
        }
        self.scheduler.tick();
        if let Some(window) = self.renderer.window() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.scheduler.clear();
    }
}
