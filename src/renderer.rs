pub mod mirror_pass;
pub mod scene_pass;

use crate::camera3d::Camera3D;
use crate::config::{LightingConfig, WindowConfig};
use crate::reflection_scheduler::ReflectionScheduler;
use crate::scene::Scene;
use anyhow::{anyhow, Context, Result};
use glam::{Mat4, Vec4};
use mirror_pass::MirrorPass;
use scene_pass::{GpuScene, ScenePass};
use std::sync::Arc;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::Window;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Remaps GL-convention NDC depth ([-1, 1]) to the wgpu range ([0, 1]).
/// Projections stay in the GL convention up to this point because the oblique
/// clip re-fit operates on it.
pub(crate) const GL_TO_WGPU: Mat4 = Mat4::from_cols(
    Vec4::new(1.0, 0.0, 0.0, 0.0),
    Vec4::new(0.0, 1.0, 0.0, 0.0),
    Vec4::new(0.0, 0.0, 0.5, 0.0),
    Vec4::new(0.0, 0.0, 0.5, 1.0),
);

/// Everything the renderer needs for one frame.
pub struct FrameParams<'a> {
    pub camera: &'a Camera3D,
    pub lighting: &'a LightingConfig,
    pub gpu_scene: &'a GpuScene,
    pub scheduler: &'a mut ReflectionScheduler,
}

pub struct Renderer {
    surface: Option<wgpu::Surface<'static>>,
    device: Option<wgpu::Device>,
    queue: Option<wgpu::Queue>,
    config: Option<wgpu::SurfaceConfiguration>,
    size: PhysicalSize<u32>,
    window: Option<Arc<Window>>,
    title: String,
    vsync: bool,
    depth_view: Option<wgpu::TextureView>,
    scene_pass: ScenePass,
    mirror_pass: MirrorPass,
}

impl Renderer {
    pub fn new(window_config: &WindowConfig) -> Self {
        Self {
            surface: None,
            device: None,
            queue: None,
            config: None,
            size: PhysicalSize::new(window_config.width.max(1), window_config.height.max(1)),
            window: None,
            title: window_config.title.clone(),
            vsync: window_config.vsync,
            depth_view: None,
            scene_pass: ScenePass::new(),
            mirror_pass: MirrorPass::new(),
        }
    }

    pub fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        if self.window.is_some() {
            return Ok(());
        }
        let window = Arc::new(
            event_loop
                .create_window(
                    Window::default_attributes().with_title(self.title.clone()).with_inner_size(self.size),
                )
                .context("Failed to create window")?,
        );
        pollster::block_on(self.init_wgpu(&window))?;
        self.window = Some(window);
        Ok(())
    }

    async fn init_wgpu(&mut self, window: &Arc<Window>) -> Result<()> {
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window.clone()).context("Failed to create surface")?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("No compatible GPU adapter")?;
        let required_limits = wgpu::Limits::downlevel_webgl2_defaults().using_resolution(adapter.limits());
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Vitrine Device"),
                required_features: wgpu::Features::empty(),
                required_limits,
                experimental_features: wgpu::ExperimentalFeatures::default(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::default(),
            })
            .await
            .context("Failed to acquire GPU device")?;

        let caps = surface.get_capabilities(&adapter);
        let format = Self::choose_surface_format(&caps.formats);
        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: if self.vsync { wgpu::PresentMode::Fifo } else { wgpu::PresentMode::AutoNoVsync },
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        self.size = size;
        self.surface = Some(surface);
        self.device = Some(device);
        self.queue = Some(queue);
        self.config = Some(config);
        self.recreate_depth()?;
        Ok(())
    }

    fn choose_surface_format(formats: &[wgpu::TextureFormat]) -> wgpu::TextureFormat {
        formats.iter().copied().find(|f| f.is_srgb()).unwrap_or(formats[0])
    }

    pub fn device(&self) -> Result<&wgpu::Device> {
        self.device.as_ref().ok_or_else(|| anyhow!("Renderer device not initialized"))
    }

    pub fn queue(&self) -> Result<&wgpu::Queue> {
        self.queue.as_ref().ok_or_else(|| anyhow!("Renderer queue not initialized"))
    }

    pub fn surface_format(&self) -> Result<wgpu::TextureFormat> {
        self.config.as_ref().map(|config| config.format).ok_or_else(|| anyhow!("Surface not configured"))
    }

    pub fn window(&self) -> Option<&Window> {
        self.window.as_deref()
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.size.height == 0 {
            1.0
        } else {
            self.size.width as f32 / self.size.height as f32
        }
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.size = new_size;
        if new_size.width > 0 && new_size.height > 0 {
            if let (Some(surface), Some(device), Some(config)) =
                (&self.surface, &self.device, &mut self.config)
            {
                config.width = new_size.width;
                config.height = new_size.height;
                surface.configure(device, config);
            }
            if let Err(err) = self.recreate_depth() {
                eprintln!("[renderer] depth resize failed: {err:?}");
            }
        }
    }

    fn recreate_depth(&mut self) -> Result<()> {
        let device = self.device()?;
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Main Depth Texture"),
            size: wgpu::Extent3d {
                width: self.size.width.max(1),
                height: self.size.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        self.depth_view = Some(texture.create_view(&wgpu::TextureViewDescriptor::default()));
        Ok(())
    }

    /// Uploads the scene once; the graph is static after the lightmap binder
    /// has run, so buffers and bind groups are immutable from here on.
    pub fn upload_scene(&mut self, scene: &Scene) -> Result<GpuScene> {
        let format = self.surface_format()?;
        let device = self.device.as_ref().ok_or_else(|| anyhow!("Renderer device not initialized"))?;
        let queue = self.queue.as_ref().ok_or_else(|| anyhow!("Renderer queue not initialized"))?;
        self.scene_pass.ensure_pipeline(device, queue, format)?;
        self.scene_pass.upload_scene(device, queue, scene)
    }

    /// Creates the GPU bundle (color target, depth, quad buffers, bind
    /// groups) for every runtime that does not have one yet. Runtimes keep
    /// exclusive ownership of these resources until disposed.
    pub fn ensure_reflector_resources(&mut self, scheduler: &mut ReflectionScheduler) -> Result<()> {
        let format = self.surface_format()?;
        let device = self.device.as_ref().ok_or_else(|| anyhow!("Renderer device not initialized"))?;
        let queue = self.queue.as_ref().ok_or_else(|| anyhow!("Renderer queue not initialized"))?;
        self.scene_pass.ensure_pipeline(device, queue, format)?;
        self.mirror_pass.ensure_pipelines(device, format, self.scene_pass.frame_layout()?)?;
        for runtime in scheduler.runtimes_mut() {
            if runtime.gpu.is_none() {
                let gpu = self.mirror_pass.create_gpu(
                    device,
                    runtime,
                    format,
                    self.scene_pass.frame_layout()?,
                )?;
                runtime.gpu = Some(gpu);
            }
        }
        Ok(())
    }

    pub fn render_frame(&mut self, params: FrameParams<'_>) -> Result<()> {
        let FrameParams { camera, lighting, gpu_scene, scheduler } = params;
        let aspect = self.aspect_ratio();
        let surface = self.surface.as_ref().ok_or_else(|| anyhow!("Surface not initialized"))?;
        let device = self.device.as_ref().ok_or_else(|| anyhow!("Renderer device not initialized"))?;
        let queue = self.queue.as_ref().ok_or_else(|| anyhow!("Renderer queue not initialized"))?;
        let depth_view = self.depth_view.as_ref().ok_or_else(|| anyhow!("Depth buffer missing"))?;

        for runtime in scheduler.runtimes_mut() {
            runtime.update(camera, aspect);
        }

        let clear = wgpu::Color {
            r: lighting.background[0] as f64,
            g: lighting.background[1] as f64,
            b: lighting.background[2] as f64,
            a: 1.0,
        };

        let mut encoder =
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Frame Encoder") });

        // Off-screen mirror renders, issued synchronously before the main
        // composite. Only runtimes the scheduler marked dirty re-render;
        // everyone else keeps sampling their previous target.
        for runtime in scheduler.runtimes_mut() {
            if !runtime.dirty {
                continue;
            }
            runtime.dirty = false;
            let Some(virtual_camera) = runtime.virtual_camera().copied() else {
                continue;
            };
            let Some(gpu) = runtime.gpu.as_ref() else {
                continue;
            };
            let view_proj = GL_TO_WGPU * virtual_camera.projection * virtual_camera.view;
            let eye = runtime.plane.reflect_point(camera.position);
            self.scene_pass.write_frame(queue, &gpu.frame_buffer, view_proj, eye, lighting);
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Reflection Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &gpu.target.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations { load: wgpu::LoadOp::Clear(clear), store: wgpu::StoreOp::Store },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &gpu.target.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            // The mirror's own quad is not part of the uploaded scene, so the
            // reflection never recurses into itself.
            self.scene_pass.record(&mut pass, &gpu.frame_bind_group, gpu_scene);
        }

        let main_view_proj = GL_TO_WGPU * camera.view_projection(aspect);
        self.scene_pass.write_main_frame(queue, main_view_proj, camera.position, lighting)?;
        self.mirror_pass.write_uniforms(queue, scheduler.runtimes());

        let frame = surface.get_current_texture().context("Failed to acquire swapchain frame")?;
        let frame_view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Main Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations { load: wgpu::LoadOp::Clear(clear), store: wgpu::StoreOp::Store },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            let main_frame_bg = self.scene_pass.main_frame_bind_group()?;
            self.scene_pass.record(&mut pass, main_frame_bg, gpu_scene);
            self.mirror_pass.record_mirrors(&mut pass, main_frame_bg, scheduler.runtimes());
            self.mirror_pass.record_overlays(&mut pass, main_frame_bg, scheduler.runtimes());
        }

        queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }
}
