use crate::reflector::ReflectorRuntime;
use anyhow::{anyhow, Result};
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

/// Blend weight of the reflection over the surface it sits on.
const MIRROR_OPACITY: f32 = 0.3;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct QuadVertex {
    position: [f32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct MirrorUniform {
    texture_matrix: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
    tint: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct OverlayUniform {
    model: [[f32; 4]; 4],
    color: [f32; 4],
}

/// Off-screen color target a mirror renders into. Dimensions are fixed at
/// creation; a resolution change rebuilds the whole runtime.
pub struct ReflectorTarget {
    texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    depth_texture: wgpu::Texture,
    pub depth_view: wgpu::TextureView,
    pub resolution: u32,
}

impl ReflectorTarget {
    fn new(device: &wgpu::Device, format: wgpu::TextureFormat, resolution: u32) -> Self {
        let size = wgpu::Extent3d { width: resolution, height: resolution, depth_or_array_layers: 1 };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Reflector Target"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Reflector Depth"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: super::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view, depth_texture, depth_view, resolution }
    }

    fn destroy(&self) {
        self.texture.destroy();
        self.depth_texture.destroy();
    }
}

/// GPU bundle owned by one mirror runtime: the render target, the quad that
/// composites it into the main pass, and the per-mirror frame uniform used by
/// its off-screen renders. Released eagerly through `destroy`, not left to
/// garbage collection on drop.
pub struct MirrorGpu {
    pub target: ReflectorTarget,
    pub frame_buffer: wgpu::Buffer,
    pub frame_bind_group: wgpu::BindGroup,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    overlay: Option<OverlayGpu>,
}

struct OverlayGpu {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl MirrorGpu {
    pub fn destroy(self) {
        self.target.destroy();
        self.frame_buffer.destroy();
        self.vertex_buffer.destroy();
        self.index_buffer.destroy();
        self.uniform_buffer.destroy();
        if let Some(overlay) = self.overlay {
            overlay.vertex_buffer.destroy();
            overlay.index_buffer.destroy();
            overlay.uniform_buffer.destroy();
        }
    }
}

pub struct MirrorPass {
    mirror_pipeline: Option<wgpu::RenderPipeline>,
    overlay_pipeline: Option<wgpu::RenderPipeline>,
    mirror_layout: Option<wgpu::BindGroupLayout>,
    overlay_layout: Option<wgpu::BindGroupLayout>,
    sampler: Option<wgpu::Sampler>,
}

impl MirrorPass {
    pub fn new() -> Self {
        Self {
            mirror_pipeline: None,
            overlay_pipeline: None,
            mirror_layout: None,
            overlay_layout: None,
            sampler: None,
        }
    }

    pub fn ensure_pipelines(
        &mut self,
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        frame_layout: &wgpu::BindGroupLayout,
    ) -> Result<()> {
        if self.mirror_pipeline.is_some() {
            return Ok(());
        }

        let mirror_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Mirror Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let overlay_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Overlay Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let mirror_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Mirror Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../assets/shaders/mirror.wgsl").into()),
        });
        let overlay_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Overlay Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../assets/shaders/overlay.wgsl").into()),
        });

        self.mirror_pipeline = Some(create_quad_pipeline(
            device,
            "Mirror Pipeline",
            &mirror_shader,
            &[frame_layout, &mirror_layout],
            format,
        ));
        self.overlay_pipeline = Some(create_quad_pipeline(
            device,
            "Overlay Pipeline",
            &overlay_shader,
            &[frame_layout, &overlay_layout],
            format,
        ));
        self.sampler = Some(device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Mirror Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        }));
        self.mirror_layout = Some(mirror_layout);
        self.overlay_layout = Some(overlay_layout);
        Ok(())
    }

    pub fn create_gpu(
        &self,
        device: &wgpu::Device,
        runtime: &ReflectorRuntime,
        format: wgpu::TextureFormat,
        frame_layout: &wgpu::BindGroupLayout,
    ) -> Result<MirrorGpu> {
        let mirror_layout =
            self.mirror_layout.as_ref().ok_or_else(|| anyhow!("Mirror pass not initialized"))?;
        let overlay_layout =
            self.overlay_layout.as_ref().ok_or_else(|| anyhow!("Mirror pass not initialized"))?;
        let sampler = self.sampler.as_ref().ok_or_else(|| anyhow!("Mirror pass not initialized"))?;

        let target = ReflectorTarget::new(device, format, runtime.resolution);
        let (frame_buffer, frame_bind_group) = super::scene_pass::create_frame_uniform(device, frame_layout);

        let (vertex_buffer, index_buffer, index_count) =
            quad_buffers(device, "Mirror Quad", &runtime.geometry.positions, &runtime.geometry.indices);
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Mirror Uniform"),
            size: std::mem::size_of::<MirrorUniform>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Mirror Bind Group"),
            layout: mirror_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: uniform_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(&target.view) },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::Sampler(sampler) },
            ],
        });

        let overlay = runtime.overlay.as_ref().map(|quad| {
            let (vertex_buffer, index_buffer, index_count) =
                quad_buffers(device, "Overlay Quad", &quad.geometry.positions, &quad.geometry.indices);
            let uniform = OverlayUniform {
                model: quad.model.to_cols_array_2d(),
                color: [
                    quad.material.color[0],
                    quad.material.color[1],
                    quad.material.color[2],
                    quad.material.opacity,
                ],
            };
            let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Overlay Uniform"),
                contents: bytemuck::bytes_of(&uniform),
                usage: wgpu::BufferUsages::UNIFORM,
            });
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Overlay Bind Group"),
                layout: overlay_layout,
                entries: &[wgpu::BindGroupEntry { binding: 0, resource: uniform_buffer.as_entire_binding() }],
            });
            OverlayGpu { vertex_buffer, index_buffer, index_count, uniform_buffer, bind_group }
        });

        Ok(MirrorGpu {
            target,
            frame_buffer,
            frame_bind_group,
            vertex_buffer,
            index_buffer,
            index_count,
            uniform_buffer,
            bind_group,
            overlay,
        })
    }

    /// Refreshes each mirror's projective texture matrix for the current
    /// camera. Runs every frame even when the target content is stale, so the
    /// reflection stays pinned to the quad while the camera moves.
    pub fn write_uniforms(&self, queue: &wgpu::Queue, runtimes: &[ReflectorRuntime]) {
        for runtime in runtimes {
            let (Some(gpu), Some(texture_matrix)) = (runtime.gpu.as_ref(), runtime.texture_matrix()) else {
                continue;
            };
            let uniform = MirrorUniform {
                texture_matrix: texture_matrix.to_cols_array_2d(),
                model: runtime.config.model_matrix().to_cols_array_2d(),
                tint: [
                    runtime.config.color[0],
                    runtime.config.color[1],
                    runtime.config.color[2],
                    MIRROR_OPACITY,
                ],
            };
            queue.write_buffer(&gpu.uniform_buffer, 0, bytemuck::bytes_of(&uniform));
        }
    }

    pub fn record_mirrors(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        frame_bind_group: &wgpu::BindGroup,
        runtimes: &[ReflectorRuntime],
    ) {
        let Some(pipeline) = self.mirror_pipeline.as_ref() else {
            return;
        };
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, frame_bind_group, &[]);
        for runtime in runtimes {
            // A mirror seen from behind draws nothing at all.
            let (Some(gpu), Some(_)) = (runtime.gpu.as_ref(), runtime.virtual_camera()) else {
                continue;
            };
            pass.set_bind_group(1, &gpu.bind_group, &[]);
            pass.set_vertex_buffer(0, gpu.vertex_buffer.slice(..));
            pass.set_index_buffer(gpu.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..gpu.index_count, 0, 0..1);
        }
    }

    pub fn record_overlays(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        frame_bind_group: &wgpu::BindGroup,
        runtimes: &[ReflectorRuntime],
    ) {
        let Some(pipeline) = self.overlay_pipeline.as_ref() else {
            return;
        };
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, frame_bind_group, &[]);
        for runtime in runtimes {
            let Some(overlay) = runtime.gpu.as_ref().and_then(|gpu| gpu.overlay.as_ref()) else {
                continue;
            };
            pass.set_bind_group(1, &overlay.bind_group, &[]);
            pass.set_vertex_buffer(0, overlay.vertex_buffer.slice(..));
            pass.set_index_buffer(overlay.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..overlay.index_count, 0, 0..1);
        }
    }
}

fn quad_buffers(
    device: &wgpu::Device,
    label: &str,
    positions: &[glam::Vec3],
    indices: &[u32],
) -> (wgpu::Buffer, wgpu::Buffer, u32) {
    let vertices: Vec<QuadVertex> =
        positions.iter().map(|p| QuadVertex { position: p.to_array() }).collect();
    let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(&format!("{label} Vertices")),
        contents: bytemuck::cast_slice(&vertices),
        usage: wgpu::BufferUsages::VERTEX,
    });
    let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(&format!("{label} Indices")),
        contents: bytemuck::cast_slice(indices),
        usage: wgpu::BufferUsages::INDEX,
    });
    (vertex_buffer, index_buffer, indices.len() as u32)
}

fn create_quad_pipeline(
    device: &wgpu::Device,
    label: &str,
    shader: &wgpu::ShaderModule,
    bind_group_layouts: &[&wgpu::BindGroupLayout],
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts,
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![0 => Float32x3],
            }],
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: super::DEPTH_FORMAT,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}
