use crate::geometry::Geometry;
use crate::material::{Material, PbrMaterial, TextureRef};
use crate::texture::ColorTexture;
use anyhow::{anyhow, bail, Context, Result};
use glam::{Mat4, Vec2, Vec3};
use gltf::mesh::Mode;
use smallvec::{smallvec, SmallVec};
use std::path::Path;
use std::sync::Arc;

/// Renderable surface: geometry plus its material list. Surfaces own their
/// attribute data; the reflection system never does.
#[derive(Clone, Debug)]
pub struct Surface {
    pub name: Option<String>,
    pub transform: Mat4,
    pub geometry: Geometry,
    pub materials: SmallVec<[Material; 1]>,
}

#[derive(Clone, Debug)]
pub struct LightNode {
    pub name: Option<String>,
    pub direction: Vec3,
    pub color: Vec3,
}

#[derive(Clone, Debug)]
pub struct CameraNode {
    pub name: Option<String>,
    pub position: Vec3,
    pub fov_y_radians: f32,
    pub near: f32,
    pub far: f32,
}

/// Polymorphic scene-graph node. Traversal dispatches on the variant instead
/// of probing nodes for capabilities at runtime.
#[derive(Clone, Debug)]
pub enum SceneNode {
    Group { name: Option<String>, children: Vec<SceneNode> },
    Surface(Surface),
    Light(LightNode),
    Camera(CameraNode),
}

#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub roots: Vec<SceneNode>,
}

impl Scene {
    pub fn push(&mut self, node: SceneNode) {
        self.roots.push(node);
    }

    pub fn for_each_surface(&self, mut visit: impl FnMut(&Surface)) {
        fn walk(node: &SceneNode, visit: &mut impl FnMut(&Surface)) {
            match node {
                SceneNode::Group { children, .. } => {
                    for child in children {
                        walk(child, visit);
                    }
                }
                SceneNode::Surface(surface) => visit(surface),
                SceneNode::Light(_) | SceneNode::Camera(_) => {}
            }
        }
        for root in &self.roots {
            walk(root, &mut visit);
        }
    }

    pub fn for_each_surface_mut(&mut self, mut visit: impl FnMut(&mut Surface)) {
        fn walk(node: &mut SceneNode, visit: &mut impl FnMut(&mut Surface)) {
            match node {
                SceneNode::Group { children, .. } => {
                    for child in children {
                        walk(child, visit);
                    }
                }
                SceneNode::Surface(surface) => visit(surface),
                SceneNode::Light(_) | SceneNode::Camera(_) => {}
            }
        }
        for root in &mut self.roots {
            walk(root, &mut visit);
        }
    }

    pub fn surface_count(&self) -> usize {
        let mut count = 0;
        self.for_each_surface(|_| count += 1);
        count
    }

    pub fn first_light(&self) -> Option<&LightNode> {
        fn find(node: &SceneNode) -> Option<&LightNode> {
            match node {
                SceneNode::Light(light) => Some(light),
                SceneNode::Group { children, .. } => children.iter().find_map(find),
                _ => None,
            }
        }
        self.roots.iter().find_map(find)
    }

    pub fn first_camera(&self) -> Option<&CameraNode> {
        fn find(node: &SceneNode) -> Option<&CameraNode> {
            match node {
                SceneNode::Camera(camera) => Some(camera),
                SceneNode::Group { children, .. } => children.iter().find_map(find),
                _ => None,
            }
        }
        self.roots.iter().find_map(find)
    }

    /// Imports a glTF file into a scene graph. Node hierarchy becomes Group
    /// nodes, mesh primitives become Surfaces carrying their accumulated
    /// world transform, and any glTF camera becomes a Camera node.
    pub fn load_gltf(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (document, buffers, images) = gltf::import(path)
            .with_context(|| format!("Failed to import glTF from {}", path.display()))?;

        let mut textures: Vec<Arc<ColorTexture>> = Vec::with_capacity(document.textures().len());
        for texture in document.textures() {
            let source = texture.source();
            let data = images
                .get(source.index())
                .ok_or_else(|| anyhow!("Image index {} missing in {}", source.index(), path.display()))?;
            let label = format!("{}::tex{}", path.display(), texture.index());
            textures.push(Arc::new(ColorTexture::from_gltf_image(label, data)?));
        }

        let gltf_scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .ok_or_else(|| anyhow!("No scenes in {}", path.display()))?;

        let mut roots = Vec::new();
        for node in gltf_scene.nodes() {
            roots.push(import_node(&node, Mat4::IDENTITY, &buffers, &textures, path)?);
        }
        let scene = Scene { roots };
        if scene.surface_count() == 0 {
            bail!("Scene in {} contains no triangle primitives", path.display());
        }
        Ok(scene)
    }
}

fn import_node(
    node: &gltf::Node,
    parent_transform: Mat4,
    buffers: &[gltf::buffer::Data],
    textures: &[Arc<ColorTexture>],
    path: &Path,
) -> Result<SceneNode> {
    let local = Mat4::from_cols_array_2d(&node.transform().matrix());
    let world = parent_transform * local;
    let mut children = Vec::new();

    if let Some(camera) = node.camera() {
        if let gltf::camera::Projection::Perspective(perspective) = camera.projection() {
            children.push(SceneNode::Camera(CameraNode {
                name: camera.name().map(str::to_string),
                position: world.transform_point3(Vec3::ZERO),
                fov_y_radians: perspective.yfov(),
                near: perspective.znear(),
                far: perspective.zfar().unwrap_or(1000.0),
            }));
        }
    }

    if let Some(mesh) = node.mesh() {
        for (primitive_index, primitive) in mesh.primitives().enumerate() {
            if primitive.mode() != Mode::Triangles {
                continue;
            }
            let Some(surface) =
                import_primitive(&mesh, primitive_index, &primitive, world, buffers, textures, path)?
            else {
                continue;
            };
            children.push(SceneNode::Surface(surface));
        }
    }

    for child in node.children() {
        children.push(import_node(&child, world, buffers, textures, path)?);
    }

    Ok(SceneNode::Group { name: node.name().map(str::to_string), children })
}

fn import_primitive(
    mesh: &gltf::Mesh,
    primitive_index: usize,
    primitive: &gltf::Primitive,
    world: Mat4,
    buffers: &[gltf::buffer::Data],
    textures: &[Arc<ColorTexture>],
    path: &Path,
) -> Result<Option<Surface>> {
    let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));
    let positions: Vec<Vec3> = reader
        .read_positions()
        .ok_or_else(|| anyhow!("POSITION attribute missing in {}", path.display()))?
        .map(Vec3::from_array)
        .collect();
    if positions.is_empty() {
        return Ok(None);
    }

    let uv: Option<Vec<Vec2>> =
        reader.read_tex_coords(0).map(|coords| coords.into_f32().map(Vec2::from_array).collect());
    let uv2: Option<Vec<Vec2>> =
        reader.read_tex_coords(1).map(|coords| coords.into_f32().map(Vec2::from_array).collect());

    let indices: Vec<u32> = reader
        .read_indices()
        .map(|read| read.into_u32().collect())
        .unwrap_or_else(|| (0..positions.len() as u32).collect());

    let mut geometry = Geometry { positions, uv, uv2, indices, ..Default::default() };
    // Source normals are ignored on purpose: the binder re-derives smooth
    // normals from positions, which also covers flat-baked exports.
    geometry.compute_vertex_normals();
    geometry.compute_tangents();

    let material = import_material(&primitive.material(), textures);
    let name = mesh
        .name()
        .map(|mesh_name| format!("{mesh_name}::{primitive_index}"))
        .or_else(|| Some(format!("primitive_{primitive_index}")));
    let materials: SmallVec<[Material; 1]> = smallvec![Material::Pbr(material)];
    Ok(Some(Surface { name, transform: world, geometry, materials }))
}

fn import_material(material: &gltf::Material, textures: &[Arc<ColorTexture>]) -> PbrMaterial {
    let label = material.name().map(str::to_string).unwrap_or_else(|| {
        material.index().map(|index| format!("material_{index}")).unwrap_or_else(|| "default".to_string())
    });
    let pbr = material.pbr_metallic_roughness();

    let texture_ref = |index: usize, tex_coord: u32, srgb: bool, scale: f32| -> Option<TextureRef> {
        textures.get(index).map(|texture| TextureRef { texture: texture.clone(), tex_coord, srgb, scale })
    };

    let mut out = PbrMaterial::with_label(label);
    out.base_color_factor = pbr.base_color_factor();
    out.metallic_factor = pbr.metallic_factor();
    out.roughness_factor = pbr.roughness_factor();
    out.emissive_factor = material.emissive_factor();
    out.base_color_texture = pbr
        .base_color_texture()
        .and_then(|info| texture_ref(info.texture().index(), info.tex_coord(), true, 1.0));
    out.metallic_roughness_texture = pbr
        .metallic_roughness_texture()
        .and_then(|info| texture_ref(info.texture().index(), info.tex_coord(), false, 1.0));
    out.normal_texture = material
        .normal_texture()
        .and_then(|info| texture_ref(info.texture().index(), info.tex_coord(), false, info.scale()));
    out.emissive_texture = material
        .emissive_texture()
        .and_then(|info| texture_ref(info.texture().index(), info.tex_coord(), true, 1.0));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::UnlitMaterial;

    fn quad_surface(name: &str) -> Surface {
        Surface {
            name: Some(name.to_string()),
            transform: Mat4::IDENTITY,
            geometry: Geometry::plane(1.0, 1.0),
            materials: smallvec![Material::Pbr(PbrMaterial::with_label(name))],
        }
    }

    #[test]
    fn traversal_visits_surfaces_only() {
        let mut scene = Scene::default();
        scene.push(SceneNode::Group {
            name: Some("room".to_string()),
            children: vec![
                SceneNode::Surface(quad_surface("wall")),
                SceneNode::Light(LightNode {
                    name: None,
                    direction: Vec3::NEG_Y,
                    color: Vec3::ONE,
                }),
                SceneNode::Group {
                    name: None,
                    children: vec![SceneNode::Surface(quad_surface("floor"))],
                },
            ],
        });
        scene.push(SceneNode::Camera(CameraNode {
            name: None,
            position: Vec3::splat(20.0),
            fov_y_radians: 0.2,
            near: 0.1,
            far: 1000.0,
        }));

        let mut names = Vec::new();
        scene.for_each_surface(|surface| names.push(surface.name.clone().unwrap()));
        assert_eq!(names, vec!["wall".to_string(), "floor".to_string()]);
        assert!(scene.first_light().is_some());
        assert!(scene.first_camera().is_some());
    }

    #[test]
    fn mutable_traversal_reaches_every_material() {
        let mut scene = Scene::default();
        let mut surface = quad_surface("mixed");
        surface.materials.push(Material::Unlit(UnlitMaterial {
            label: "tint".to_string(),
            color: [0.0, 0.0, 0.0],
            opacity: 0.5,
        }));
        scene.push(SceneNode::Surface(surface));

        let mut pbr = 0;
        let mut other = 0;
        scene.for_each_surface_mut(|surface| {
            for material in &mut surface.materials {
                match material.as_pbr_mut() {
                    Some(_) => pbr += 1,
                    None => other += 1,
                }
            }
        });
        assert_eq!((pbr, other), (1, 1));
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let err = Scene::load_gltf("does/not/exist.gltf").unwrap_err();
        assert!(format!("{err:#}").contains("Failed to import glTF"));
    }
}
