use glam::{Mat4, Vec3};
use smallvec::smallvec;
use std::sync::Arc;
use vitrine::geometry::Geometry;
use vitrine::lightmap;
use vitrine::material::{Material, PbrMaterial, TextureRef, LIGHTMAP_TEX_COORD};
use vitrine::scene::{Scene, SceneNode, Surface};
use vitrine::texture::{ColorTexture, HdrTexture};

fn test_lightmap() -> Arc<HdrTexture> {
    Arc::new(HdrTexture {
        label: "bake".to_string(),
        width: 2,
        height: 2,
        pixels: vec![Vec3::splat(0.5); 4],
    })
}

fn textured_surface(name: &str) -> (Surface, Arc<ColorTexture>) {
    let base = Arc::new(ColorTexture {
        label: format!("{name}-base"),
        width: 1,
        height: 1,
        data: vec![200, 180, 160, 255],
    });
    let mut material = PbrMaterial::with_label(name);
    material.base_color_texture =
        Some(TextureRef { texture: base.clone(), tex_coord: 0, srgb: true, scale: 1.0 });
    material.flat_shading = true;
    let surface = Surface {
        name: Some(name.to_string()),
        transform: Mat4::IDENTITY,
        geometry: Geometry::plane(2.0, 2.0),
        materials: smallvec![Material::Pbr(material)],
    };
    (surface, base)
}

fn pbr(surface: &Surface) -> &PbrMaterial {
    match &surface.materials[0] {
        Material::Pbr(material) => material,
        Material::Unlit(_) => panic!("expected pbr material"),
    }
}

#[test]
fn binding_is_idempotent() {
    let (surface, _) = textured_surface("wall");
    let mut scene = Scene::default();
    scene.push(SceneNode::Surface(surface));
    let lightmap = test_lightmap();

    lightmap::bind_lightmap(&mut scene, &lightmap, 1.5);
    let mut first_pass = Vec::new();
    scene.for_each_surface(|surface| {
        first_pass.push((surface.geometry.uv2.clone(), pbr(surface).lightmap.clone().map(|l| l.intensity)));
    });

    lightmap::bind_lightmap(&mut scene, &lightmap, 1.5);
    let mut second_pass = Vec::new();
    scene.for_each_surface(|surface| {
        second_pass.push((surface.geometry.uv2.clone(), pbr(surface).lightmap.clone().map(|l| l.intensity)));
    });

    assert_eq!(first_pass, second_pass);
}

#[test]
fn binding_duplicates_uv_and_pins_channel() {
    let (surface, _) = textured_surface("floor");
    let mut scene = Scene::default();
    scene.push(SceneNode::Surface(surface));
    let lightmap = test_lightmap();

    lightmap::bind_lightmap(&mut scene, &lightmap, 2.0);

    scene.for_each_surface(|surface| {
        assert_eq!(surface.geometry.uv, surface.geometry.uv2);
        let binding = pbr(surface).lightmap.as_ref().expect("lightmap bound");
        assert_eq!(binding.tex_coord, LIGHTMAP_TEX_COORD);
        assert!((binding.intensity - 2.0).abs() < f32::EPSILON);
        assert!(Arc::ptr_eq(&binding.texture, &lightmap));
        // Smooth shading is forced alongside the recomputed normals.
        assert!(!pbr(surface).flat_shading);
    });
}

#[test]
fn binding_leaves_existing_maps_alone() {
    let (surface, base) = textured_surface("cabinet");
    let mut scene = Scene::default();
    scene.push(SceneNode::Surface(surface));

    lightmap::bind_lightmap(&mut scene, &test_lightmap(), 1.0);

    scene.for_each_surface(|surface| {
        let material = pbr(surface);
        let base_ref = material.base_color_texture.as_ref().expect("base color kept");
        assert!(Arc::ptr_eq(&base_ref.texture, &base));
        assert!((material.base_color_factor[0] - 1.0).abs() < f32::EPSILON);
    });
}

#[test]
fn failed_load_binds_nothing() {
    let (surface, _) = textured_surface("shelf");
    let mut scene = Scene::default();
    scene.push(SceneNode::Surface(surface));

    let err = lightmap::load_and_bind(&mut scene, "missing/bake.hdr", 1.0);
    assert!(err.is_err());
    scene.for_each_surface(|surface| {
        assert!(pbr(surface).lightmap.is_none());
        assert!(surface.geometry.uv2.is_none());
    });
}
