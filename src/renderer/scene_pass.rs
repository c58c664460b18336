use crate::config::LightingConfig;
use crate::geometry::Geometry;
use crate::material::Material;
use crate::scene::Scene;
use crate::texture::{ColorTexture, HdrTexture};
use anyhow::{anyhow, Result};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use std::collections::HashMap;
use wgpu::util::DeviceExt;

pub(crate) const LIGHTMAP_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SceneVertex {
    position: [f32; 3],
    normal: [f32; 3],
    tangent: [f32; 4],
    uv: [f32; 2],
    uv2: [f32; 2],
}

impl SceneVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3,
        2 => Float32x4,
        3 => Float32x2,
        4 => Float32x2,
    ];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<SceneVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub(crate) struct FrameUniform {
    view_proj: [[f32; 4]; 4],
    camera_pos: [f32; 4],
    light_dir: [f32; 4],
    light_color: [f32; 4],
    ambient: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SurfaceUniform {
    model: [[f32; 4]; 4],
    base_color_factor: [f32; 4],
    emissive_factor: [f32; 4],
    /// metallic, roughness, normal scale, lightmap intensity.
    params: [f32; 4],
    /// One flag per optional color map: base color, metallic-roughness,
    /// normal, emissive.
    texture_flags: [f32; 4],
    /// x: lightmap bound, y: unlit.
    misc: [f32; 4],
}

pub struct GpuSurface {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    bind_group: wgpu::BindGroup,
}

/// Immutable GPU copy of the scene graph's surfaces. Uploaded once after the
/// lightmap binder has run; shared by the main pass and every mirror pass.
#[derive(Default)]
pub struct GpuScene {
    surfaces: Vec<GpuSurface>,
}

impl GpuScene {
    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }
}

pub struct ScenePass {
    pipeline: Option<wgpu::RenderPipeline>,
    frame_layout: Option<wgpu::BindGroupLayout>,
    surface_layout: Option<wgpu::BindGroupLayout>,
    sampler: Option<wgpu::Sampler>,
    defaults: Option<DefaultMaps>,
    main_frame_buffer: Option<wgpu::Buffer>,
    main_frame_bind_group: Option<wgpu::BindGroup>,
}

struct DefaultMaps {
    white: wgpu::TextureView,
    flat_normal: wgpu::TextureView,
    black: wgpu::TextureView,
    black_hdr: wgpu::TextureView,
}

impl ScenePass {
    pub fn new() -> Self {
        Self {
            pipeline: None,
            frame_layout: None,
            surface_layout: None,
            sampler: None,
            defaults: None,
            main_frame_buffer: None,
            main_frame_bind_group: None,
        }
    }

    pub fn ensure_pipeline(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        format: wgpu::TextureFormat,
    ) -> Result<()> {
        if self.pipeline.is_some() {
            return Ok(());
        }

        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Frame Bind Group Layout"),
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

        let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let surface_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Surface Bind Group Layout"),
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
                texture_entry(1),
                texture_entry(2),
                texture_entry(3),
                texture_entry(4),
                texture_entry(5),
                wgpu::BindGroupLayoutEntry {
                    binding: 6,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../assets/shaders/scene.wgsl").into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&frame_layout, &surface_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Scene Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[SceneVertex::layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
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
                format: super::DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Scene Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let defaults = DefaultMaps {
            white: create_rgba8_texture(device, queue, "Default White", 1, 1, &[255, 255, 255, 255], false),
            flat_normal: create_rgba8_texture(
                device,
                queue,
                "Default Normal",
                1,
                1,
                &[128, 128, 255, 255],
                false,
            ),
            black: create_rgba8_texture(device, queue, "Default Black", 1, 1, &[0, 0, 0, 255], false),
            black_hdr: create_f16_texture(device, queue, "Default Lightmap", 1, 1, &[0u16; 4]),
        };

        let (main_frame_buffer, main_frame_bind_group) = create_frame_uniform(device, &frame_layout);

        self.pipeline = Some(pipeline);
        self.frame_layout = Some(frame_layout);
        self.surface_layout = Some(surface_layout);
        self.sampler = Some(sampler);
        self.defaults = Some(defaults);
        self.main_frame_buffer = Some(main_frame_buffer);
        self.main_frame_bind_group = Some(main_frame_bind_group);
        Ok(())
    }

    pub fn frame_layout(&self) -> Result<&wgpu::BindGroupLayout> {
        self.frame_layout.as_ref().ok_or_else(|| anyhow!("Scene pass not initialized"))
    }

    pub fn main_frame_bind_group(&self) -> Result<&wgpu::BindGroup> {
        self.main_frame_bind_group.as_ref().ok_or_else(|| anyhow!("Scene pass not initialized"))
    }

    pub fn write_frame(
        &self,
        queue: &wgpu::Queue,
        buffer: &wgpu::Buffer,
        view_proj: Mat4,
        eye: Vec3,
        lighting: &LightingConfig,
    ) {
        let uniform = FrameUniform {
            view_proj: view_proj.to_cols_array_2d(),
            camera_pos: eye.extend(1.0).to_array(),
            light_dir: Vec3::from_array(lighting.direction).normalize_or_zero().extend(0.0).to_array(),
            light_color: Vec3::from_array(lighting.color).extend(1.0).to_array(),
            ambient: Vec3::from_array(lighting.ambient).extend(1.0).to_array(),
        };
        queue.write_buffer(buffer, 0, bytemuck::bytes_of(&uniform));
    }

    pub fn write_main_frame(
        &self,
        queue: &wgpu::Queue,
        view_proj: Mat4,
        eye: Vec3,
        lighting: &LightingConfig,
    ) -> Result<()> {
        let buffer = self.main_frame_buffer.as_ref().ok_or_else(|| anyhow!("Scene pass not initialized"))?;
        self.write_frame(queue, buffer, view_proj, eye, lighting);
        Ok(())
    }

    pub fn upload_scene(&self, device: &wgpu::Device, queue: &wgpu::Queue, scene: &Scene) -> Result<GpuScene> {
        let surface_layout =
            self.surface_layout.as_ref().ok_or_else(|| anyhow!("Scene pass not initialized"))?;
        let sampler = self.sampler.as_ref().ok_or_else(|| anyhow!("Scene pass not initialized"))?;
        let defaults = self.defaults.as_ref().ok_or_else(|| anyhow!("Scene pass not initialized"))?;

        let mut color_cache: HashMap<(*const ColorTexture, bool), wgpu::TextureView> = HashMap::new();
        let mut hdr_cache: HashMap<*const HdrTexture, wgpu::TextureView> = HashMap::new();
        let mut surfaces = Vec::new();

        scene.for_each_surface(|surface| {
            if surface.geometry.indices.is_empty() {
                return;
            }
            let vertices = interleave(&surface.geometry);
            let label = surface.name.as_deref().unwrap_or("surface");
            let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label} Vertices")),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
            let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label} Indices")),
                contents: bytemuck::cast_slice(&surface.geometry.indices),
                usage: wgpu::BufferUsages::INDEX,
            });

            let material = surface.materials.first();
            let uniform = surface_uniform(surface.transform, material);
            let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label} Uniform")),
                contents: bytemuck::bytes_of(&uniform),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });

            let mut resolved = [None, None, None, None];
            let mut lightmap_view = None;
            if let Some(Material::Pbr(pbr)) = material {
                let maps = [
                    &pbr.base_color_texture,
                    &pbr.metallic_roughness_texture,
                    &pbr.normal_texture,
                    &pbr.emissive_texture,
                ];
                for (slot, map) in resolved.iter_mut().zip(maps) {
                    *slot = map.as_ref().map(|tref| {
                        let key = (std::sync::Arc::as_ptr(&tref.texture), tref.srgb);
                        color_cache
                            .entry(key)
                            .or_insert_with(|| {
                                let tex = &tref.texture;
                                create_rgba8_texture(
                                    device,
                                    queue,
                                    &tex.label,
                                    tex.width,
                                    tex.height,
                                    &tex.data,
                                    tref.srgb,
                                )
                            })
                            .clone()
                    });
                }
                lightmap_view = pbr.lightmap.as_ref().map(|binding| {
                    hdr_cache
                        .entry(std::sync::Arc::as_ptr(&binding.texture))
                        .or_insert_with(|| {
                            let tex = &binding.texture;
                            create_f16_texture(
                                device,
                                queue,
                                &tex.label,
                                tex.width,
                                tex.height,
                                &tex.to_rgba_f16_bits(),
                            )
                        })
                        .clone()
                });
            }
            let bind_group = create_surface_bind_group(
                device,
                surface_layout,
                label,
                &uniform_buffer,
                [
                    resolved[0].as_ref().unwrap_or(&defaults.white),
                    resolved[1].as_ref().unwrap_or(&defaults.white),
                    resolved[2].as_ref().unwrap_or(&defaults.flat_normal),
                    resolved[3].as_ref().unwrap_or(&defaults.black),
                    lightmap_view.as_ref().unwrap_or(&defaults.black_hdr),
                ],
                sampler,
            );
            surfaces.push(GpuSurface {
                vertex_buffer,
                index_buffer,
                index_count: surface.geometry.indices.len() as u32,
                bind_group,
            });
        });

        eprintln!("[renderer] uploaded {} surface(s)", surfaces.len());
        Ok(GpuScene { surfaces })
    }

    pub fn record(&self, pass: &mut wgpu::RenderPass<'_>, frame_bind_group: &wgpu::BindGroup, scene: &GpuScene) {
        let Some(pipeline) = self.pipeline.as_ref() else {
            return;
        };
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, frame_bind_group, &[]);
        for surface in &scene.surfaces {
            pass.set_bind_group(1, &surface.bind_group, &[]);
            pass.set_vertex_buffer(0, surface.vertex_buffer.slice(..));
            pass.set_index_buffer(surface.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..surface.index_count, 0, 0..1);
        }
    }
}

/// Allocates a frame uniform buffer with its bind group. Mirror passes get
/// one each so their view-projections never race the main camera's.
pub(crate) fn create_frame_uniform(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
) -> (wgpu::Buffer, wgpu::BindGroup) {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Frame Uniform"),
        size: std::mem::size_of::<FrameUniform>() as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Frame Bind Group"),
        layout,
        entries: &[wgpu::BindGroupEntry { binding: 0, resource: buffer.as_entire_binding() }],
    });
    (buffer, bind_group)
}

fn create_surface_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    label: &str,
    uniform_buffer: &wgpu::Buffer,
    views: [&wgpu::TextureView; 5],
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(&format!("{label} Bind Group")),
        layout,
        entries: &[
            wgpu::BindGroupEntry { binding: 0, resource: uniform_buffer.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(views[0]) },
            wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::TextureView(views[1]) },
            wgpu::BindGroupEntry { binding: 3, resource: wgpu::BindingResource::TextureView(views[2]) },
            wgpu::BindGroupEntry { binding: 4, resource: wgpu::BindingResource::TextureView(views[3]) },
            wgpu::BindGroupEntry { binding: 5, resource: wgpu::BindingResource::TextureView(views[4]) },
            wgpu::BindGroupEntry { binding: 6, resource: wgpu::BindingResource::Sampler(sampler) },
        ],
    })
}

fn surface_uniform(transform: Mat4, material: Option<&Material>) -> SurfaceUniform {
    let mut uniform = SurfaceUniform {
        model: transform.to_cols_array_2d(),
        base_color_factor: [1.0, 1.0, 1.0, 1.0],
        emissive_factor: [0.0, 0.0, 0.0, 0.0],
        params: [0.0, 1.0, 1.0, 0.0],
        texture_flags: [0.0; 4],
        misc: [0.0; 4],
    };
    match material {
        Some(Material::Pbr(pbr)) => {
            uniform.base_color_factor = pbr.base_color_factor;
            uniform.emissive_factor = [
                pbr.emissive_factor[0],
                pbr.emissive_factor[1],
                pbr.emissive_factor[2],
                0.0,
            ];
            uniform.params = [
                pbr.metallic_factor,
                pbr.roughness_factor,
                pbr.normal_texture.as_ref().map_or(1.0, |t| t.scale),
                pbr.lightmap.as_ref().map_or(0.0, |l| l.intensity),
            ];
            uniform.texture_flags = [
                pbr.base_color_texture.is_some() as u32 as f32,
                pbr.metallic_roughness_texture.is_some() as u32 as f32,
                pbr.normal_texture.is_some() as u32 as f32,
                pbr.emissive_texture.is_some() as u32 as f32,
            ];
            uniform.misc[0] = pbr.lightmap.is_some() as u32 as f32;
        }
        Some(Material::Unlit(unlit)) => {
            uniform.base_color_factor = [unlit.color[0], unlit.color[1], unlit.color[2], unlit.opacity];
            uniform.misc[1] = 1.0;
        }
        None => {}
    }
    uniform
}

fn interleave(geometry: &Geometry) -> Vec<SceneVertex> {
    let fallback_uv = [0.0f32, 0.0];
    let mut vertices = Vec::with_capacity(geometry.positions.len());
    for (i, position) in geometry.positions.iter().enumerate() {
        let normal = geometry.normals.get(i).copied().unwrap_or(Vec3::Z);
        let tangent = geometry.tangents.get(i).copied().unwrap_or(Vec4::new(1.0, 0.0, 0.0, 1.0));
        let uv = geometry.uv.as_ref().and_then(|uv| uv.get(i)).map_or(fallback_uv, |v| v.to_array());
        let uv2 = geometry.uv2.as_ref().and_then(|uv| uv.get(i)).map_or(uv, |v| v.to_array());
        vertices.push(SceneVertex {
            position: position.to_array(),
            normal: normal.to_array(),
            tangent: tangent.to_array(),
            uv,
            uv2,
        });
    }
    vertices
}

fn create_rgba8_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    width: u32,
    height: u32,
    data: &[u8],
    srgb: bool,
) -> wgpu::TextureView {
    let format = if srgb { wgpu::TextureFormat::Rgba8UnormSrgb } else { wgpu::TextureFormat::Rgba8Unorm };
    create_texture(device, queue, label, width, height, format, 4, data)
}

fn create_f16_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    width: u32,
    height: u32,
    data: &[u16],
) -> wgpu::TextureView {
    create_texture(device, queue, label, width, height, LIGHTMAP_FORMAT, 8, bytemuck::cast_slice(data))
}

fn create_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    bytes_per_pixel: u32,
    data: &[u8],
) -> wgpu::TextureView {
    let width = width.max(1);
    let height = height.max(1);
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width * bytes_per_pixel),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
    );
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}
