use anyhow::{bail, Context, Result};
use glam::Vec3;
use image::ImageReader;
use std::path::Path;

/// Decoded 8-bit RGBA color map, ready for GPU upload.
#[derive(Clone, Debug)]
pub struct ColorTexture {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Linear high-dynamic-range image. Lightmaps are stored this way: raw
/// radiance, no gamma encoding, no vertical flip applied at decode.
#[derive(Clone, Debug)]
pub struct HdrTexture {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Vec3>,
}

impl ColorTexture {
    /// Normalizes a glTF image payload to RGBA8 regardless of channel count.
    pub fn from_gltf_image(label: String, image: &gltf::image::Data) -> Result<Self> {
        let data = match image.format {
            gltf::image::Format::R8 => {
                let mut out = Vec::with_capacity(image.pixels.len() * 4);
                for &value in &image.pixels {
                    out.extend_from_slice(&[value, value, value, 255]);
                }
                out
            }
            gltf::image::Format::R8G8 => {
                let mut out = Vec::with_capacity(image.pixels.len() / 2 * 4);
                for chunk in image.pixels.chunks_exact(2) {
                    out.extend_from_slice(&[chunk[0], chunk[1], 0, 255]);
                }
                out
            }
            gltf::image::Format::R8G8B8 => {
                let mut out = Vec::with_capacity(image.pixels.len() / 3 * 4);
                for chunk in image.pixels.chunks_exact(3) {
                    out.extend_from_slice(&[chunk[0], chunk[1], chunk[2], 255]);
                }
                out
            }
            gltf::image::Format::R8G8B8A8 => image.pixels.clone(),
            other => bail!("Unsupported image format {other:?} in '{label}'"),
        };
        Ok(Self { label, width: image.width, height: image.height, data })
    }
}

impl HdrTexture {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = ImageReader::open(path)
            .with_context(|| format!("Failed to open HDR texture {}", path.display()))?
            .with_guessed_format()
            .with_context(|| format!("Failed to probe HDR texture {}", path.display()))?;
        let decoded =
            reader.decode().with_context(|| format!("Failed to decode HDR texture {}", path.display()))?;
        let rgb = decoded.to_rgb32f();
        let width = rgb.width();
        let height = rgb.height();
        if width == 0 || height == 0 {
            bail!("HDR texture {} has zero extent", path.display());
        }
        let mut pixels = Vec::with_capacity((width * height) as usize);
        for pixel in rgb.pixels() {
            let [r, g, b] = pixel.0;
            pixels.push(Vec3::new(r, g, b));
        }
        Ok(Self { label: path.display().to_string(), width, height, pixels })
    }

    /// Packs pixels as RGBA half floats for an `Rgba16Float` upload.
    pub fn to_rgba_f16_bits(&self) -> Vec<u16> {
        let mut out = Vec::with_capacity(self.pixels.len() * 4);
        for pixel in &self.pixels {
            out.push(half::f16::from_f32(pixel.x).to_bits());
            out.push(half::f16::from_f32(pixel.y).to_bits());
            out.push(half::f16::from_f32(pixel.z).to_bits());
            out.push(half::f16::from_f32(1.0).to_bits());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn hdr_load_reports_missing_file() {
        let err = HdrTexture::load("does/not/exist.hdr").unwrap_err();
        assert!(err.to_string().contains("Failed to open"));
    }

    #[test]
    fn lightmap_loads_from_disk_without_flip() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("lightmap.png");
        let mut img = RgbImage::new(2, 2);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 1, Rgb([0, 0, 255]));
        img.save(&path).expect("save png");

        let texture = HdrTexture::load(&path).expect("load lightmap");
        assert_eq!(texture.width, 2);
        assert_eq!(texture.height, 2);
        // Top-left pixel stays first: no vertical flip on decode.
        assert!((texture.pixels[0].x - 1.0).abs() < 1e-3);
        assert!((texture.pixels[3].z - 1.0).abs() < 1e-3);

        let bits = texture.to_rgba_f16_bits();
        assert_eq!(bits.len(), 16);
        assert_eq!(half::f16::from_bits(bits[3]).to_f32(), 1.0);
    }

    #[test]
    fn gltf_rgb_expands_to_rgba() {
        let image = gltf::image::Data {
            pixels: vec![10, 20, 30, 40, 50, 60],
            format: gltf::image::Format::R8G8B8,
            width: 2,
            height: 1,
        };
        let texture = ColorTexture::from_gltf_image("test".to_string(), &image).expect("convert");
        assert_eq!(texture.data, vec![10, 20, 30, 255, 40, 50, 60, 255]);
    }
}
