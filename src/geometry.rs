use glam::{Vec2, Vec3, Vec4};

/// CPU-side geometry with separate attribute streams.
///
/// `uv2` is the lightmap channel; it is absent until either the importer finds
/// TEXCOORD_1 in the source file or the lightmap binder duplicates `uv` into it.
#[derive(Clone, Debug, Default)]
pub struct Geometry {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec4>,
    pub uv: Option<Vec<Vec2>>,
    pub uv2: Option<Vec<Vec2>>,
    pub indices: Vec<u32>,
}

#[derive(Clone, Copy, Debug)]
pub struct GeometryBounds {
    pub min: Vec3,
    pub max: Vec3,
    pub center: Vec3,
    pub radius: f32,
}

impl Geometry {
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        let mut geometry = Self { positions, indices, ..Default::default() };
        geometry.compute_vertex_normals();
        geometry
    }

    /// Quad of `width` x `height` centered at the origin, facing +Z, with a
    /// single UV channel covering [0,1].
    pub fn plane(width: f32, height: f32) -> Self {
        let hw = width * 0.5;
        let hh = height * 0.5;
        let positions = vec![
            Vec3::new(-hw, -hh, 0.0),
            Vec3::new(hw, -hh, 0.0),
            Vec3::new(hw, hh, 0.0),
            Vec3::new(-hw, hh, 0.0),
        ];
        let uv = vec![
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 0.0),
        ];
        let indices = vec![0, 1, 2, 0, 2, 3];
        let mut geometry = Self { positions, uv: Some(uv), indices, ..Default::default() };
        geometry.compute_vertex_normals();
        geometry
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Replaces whatever normals the source carried with smooth area-weighted
    /// vertex normals derived from positions and indices.
    pub fn compute_vertex_normals(&mut self) {
        let mut normals = vec![Vec3::ZERO; self.positions.len()];
        for tri in self.indices.chunks(3) {
            if tri.len() < 3 {
                continue;
            }
            let i0 = tri[0] as usize;
            let i1 = tri[1] as usize;
            let i2 = tri[2] as usize;
            if i0 >= self.positions.len() || i1 >= self.positions.len() || i2 >= self.positions.len() {
                continue;
            }
            let a = self.positions[i0];
            let b = self.positions[i1];
            let c = self.positions[i2];
            let face = (b - a).cross(c - a);
            if face.length_squared() > 0.0 {
                normals[i0] += face;
                normals[i1] += face;
                normals[i2] += face;
            }
        }
        for normal in &mut normals {
            *normal = if normal.length_squared() > 0.0 { normal.normalize() } else { Vec3::Z };
        }
        self.normals = normals;
    }

    /// Per-vertex tangents for normal mapping, derived from the primary UV
    /// channel. Leaves existing tangents alone when there is no UV data to
    /// derive them from.
    pub fn compute_tangents(&mut self) {
        let Some(uvs) = self.uv.as_ref() else {
            return;
        };
        if uvs.len() != self.positions.len() || self.normals.len() != self.positions.len() {
            return;
        }
        let mut tan_s = vec![Vec3::ZERO; self.positions.len()];
        let mut tan_t = vec![Vec3::ZERO; self.positions.len()];
        for tri in self.indices.chunks(3) {
            if tri.len() < 3 {
                continue;
            }
            let i0 = tri[0] as usize;
            let i1 = tri[1] as usize;
            let i2 = tri[2] as usize;
            if i0 >= self.positions.len() || i1 >= self.positions.len() || i2 >= self.positions.len() {
                continue;
            }
            let dp1 = self.positions[i1] - self.positions[i0];
            let dp2 = self.positions[i2] - self.positions[i0];
            let duv1 = uvs[i1] - uvs[i0];
            let duv2 = uvs[i2] - uvs[i0];
            let denom = duv1.x * duv2.y - duv1.y * duv2.x;
            if denom.abs() < 1e-8 {
                continue;
            }
            let r = 1.0 / denom;
            let sdir = (dp1 * duv2.y - dp2 * duv1.y) * r;
            let tdir = (dp2 * duv1.x - dp1 * duv2.x) * r;
            for &i in &[i0, i1, i2] {
                tan_s[i] += sdir;
                tan_t[i] += tdir;
            }
        }
        let mut tangents = vec![Vec4::new(1.0, 0.0, 0.0, 1.0); self.positions.len()];
        for (i, tangent) in tangents.iter_mut().enumerate() {
            let normal = self.normals[i];
            let s = tan_s[i];
            if s.length_squared() > 0.0 {
                let t = (s - normal * normal.dot(s)).normalize_or_zero();
                let w = if normal.cross(s).dot(tan_t[i]) < 0.0 { -1.0 } else { 1.0 };
                *tangent = Vec4::new(t.x, t.y, t.z, w);
            }
        }
        self.tangents = tangents;
    }

    pub fn bounds(&self) -> GeometryBounds {
        if self.positions.is_empty() {
            return GeometryBounds { min: Vec3::ZERO, max: Vec3::ZERO, center: Vec3::ZERO, radius: 0.0 };
        }
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for pos in &self.positions {
            min = min.min(*pos);
            max = max.max(*pos);
        }
        let center = (min + max) * 0.5;
        let mut radius: f32 = 0.0;
        for pos in &self.positions {
            radius = radius.max((*pos - center).length());
        }
        GeometryBounds { min, max, center, radius }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_faces_positive_z() {
        let plane = Geometry::plane(2.0, 1.0);
        assert_eq!(plane.vertex_count(), 4);
        assert_eq!(plane.indices.len(), 6);
        for normal in &plane.normals {
            assert!((*normal - Vec3::Z).length_squared() < 1e-6);
        }
        let bounds = plane.bounds();
        assert!((bounds.max.x - 1.0).abs() < 1e-6);
        assert!((bounds.max.y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn normals_are_smooth_across_shared_vertices() {
        // Two triangles sharing an edge, folded along it.
        let positions = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 1.0),
        ];
        let geometry = Geometry::new(positions, vec![0, 1, 2, 1, 3, 2]);
        // Shared vertices blend both face normals instead of picking one.
        let shared = geometry.normals[1];
        assert!(shared.length() > 0.99);
        assert!(shared.z > 0.0 && shared.z < 1.0);
    }

    #[test]
    fn degenerate_plane_rejected_upstream_still_computes() {
        let mut geometry = Geometry::default();
        geometry.compute_vertex_normals();
        assert!(geometry.normals.is_empty());
        assert_eq!(geometry.bounds().radius, 0.0);
    }
}
