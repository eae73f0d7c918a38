//! One resolution tier of a DEM pyramid and its mesh conversion.

use bytemuck::{Pod, Zeroable};
use rayon::prelude::*;

use super::payload::Albedo;
use super::projection::DemProjection;
use crate::util::{DVec3, Error, Image, NormalCone, Resolution, Result, Spectral, Vec2, Vec3};

/// Mesh vertex handed to the renderer.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Vertex {
    /// Position relative to the caller's reference point.
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub albedo: Spectral,
}

/// Vertex and triangle index buffers for one streamed level.
#[derive(Clone, Debug, Default)]
pub struct MeshBuffers {
    /// Index of the level these buffers came from.
    pub level: usize,
    pub gsd: f64,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

/// A height raster, its placement and its reflectance.
#[derive(Clone, Debug, PartialEq)]
pub struct DemLevel {
    pub projection: DemProjection,
    pub heights: Image<f32>,
    pub albedo: Albedo,
}

impl DemLevel {
    /// Build a level; the projection's resolution is taken from `heights`.
    ///
    /// Image albedos must match the height raster's resolution, and the raster
    /// must be addressable by `u32` vertex indices.
    pub fn new(mut projection: DemProjection, heights: Image<f32>, albedo: Albedo) -> Result<Self> {
        let resolution = heights.resolution();
        check_vertex_count(resolution)?;
        let albedo_resolution = match &albedo {
            Albedo::Constant(_) => None,
            Albedo::Float(img) => Some(img.resolution()),
            Albedo::Color(img) => Some(img.resolution()),
        };
        if let Some(r) = albedo_resolution.filter(|r| *r != resolution) {
            return Err(Error::dimension_mismatch(resolution, r));
        }
        projection.resolution = resolution;
        Ok(Self {
            projection,
            heights,
            albedo,
        })
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.heights.resolution()
    }

    /// Ground sample distance of this level.
    #[inline]
    pub fn gsd(&self) -> f64 {
        self.projection.gsd()
    }

    /// Finite (min, max) height, `None` if every sample is missing.
    pub fn height_range(&self) -> Option<[f32; 2]> {
        self.heights.finite_min_max()
    }

    /// Vertex positions relative to `reference`, one per height sample in
    /// row-major order.
    fn positions(&self, reference: DVec3) -> Vec<Vec3> {
        let w = self.heights.width();
        let h = self.heights.height();
        (0..h)
            .into_par_iter()
            .flat_map_iter(|y| {
                (0..w).map(move |x| {
                    let z = self.heights.get(x, y);
                    (self.projection.pixel_to_world(x as f64, y as f64, z) - reference).as_vec3()
                })
            })
            .collect()
    }

    /// Two triangles per grid cell, counter-clockwise in raster space.
    /// Cells touching a missing (non-finite) height are dropped.
    pub fn make_index_buffer(&self) -> Vec<u32> {
        let w = self.heights.width();
        let h = self.heights.height();
        if w < 2 || h < 2 {
            return Vec::new();
        }
        let valid = |x: u32, y: u32| self.heights.get(x, y).is_finite();

        let mut indices = Vec::with_capacity((w as usize - 1) * (h as usize - 1) * 6);
        for y in 0..h - 1 {
            for x in 0..w - 1 {
                if !(valid(x, y) && valid(x + 1, y) && valid(x, y + 1) && valid(x + 1, y + 1)) {
                    continue;
                }
                let i0 = y * w + x;
                let i1 = i0 + 1;
                let i2 = i0 + w;
                let i3 = i2 + 1;
                indices.extend_from_slice(&[i0, i1, i2, i1, i3, i2]);
            }
        }
        indices
    }

    /// Area-weighted vertex normals of the triangulated grid.
    fn normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
        let mut normals = vec![Vec3::ZERO; positions.len()];
        for tri in indices.chunks_exact(3) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let n = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
            normals[a] += n;
            normals[b] += n;
            normals[c] += n;
        }
        normals
            .into_iter()
            .map(|n| n.try_normalize().unwrap_or(Vec3::Z))
            .collect()
    }

    /// Per-vertex normals, for lighting bounds.
    pub fn vertex_normals(&self) -> Vec<Vec3> {
        let positions = self.positions(DVec3::ZERO);
        Self::normals(&positions, &self.make_index_buffer())
    }

    /// Mean surface normal and the widest deviation from it.
    pub fn normal_cone(&self) -> NormalCone {
        let positions = self.positions(DVec3::ZERO);
        let indices = self.make_index_buffer();
        let mut used = vec![false; positions.len()];
        indices.iter().for_each(|&i| used[i as usize] = true);

        let normals = Self::normals(&positions, &indices);
        NormalCone::from_normals(normals.iter().zip(&used).filter(|(_, u)| **u).map(|(n, _)| n))
    }

    /// Vertex buffer relative to `reference`. Luminance albedo is tinted by
    /// `profile`.
    pub fn make_vertex_buffer(&self, reference: DVec3, profile: &Spectral) -> Vec<Vertex> {
        let positions = self.positions(reference);
        let normals = Self::normals(&positions, &self.make_index_buffer());

        let w = self.heights.width();
        let h = self.heights.height();
        let u_den = (w.max(2) - 1) as f32;
        let v_den = (h.max(2) - 1) as f32;

        positions
            .par_iter()
            .zip(normals.par_iter())
            .enumerate()
            .map(|(i, (&position, &normal))| {
                let x = i as u32 % w;
                let y = i as u32 / w;
                Vertex {
                    position,
                    normal,
                    uv: Vec2::new(x as f32 / u_den, y as f32 / v_den),
                    albedo: self.albedo.sample(x, y, profile),
                }
            })
            .collect()
    }

    /// Vertex and index buffers in one go.
    pub fn make_buffers(&self, reference: DVec3, profile: &Spectral) -> (Vec<Vertex>, Vec<u32>) {
        (self.make_vertex_buffer(reference, profile), self.make_index_buffer())
    }

    /// Half-resolution copy: 2x2 box filter over finite samples, sample step
    /// doubled.
    pub fn downsample(&self) -> Self {
        let src = self.resolution();
        let dst = Resolution::new((src.width / 2).max(1), (src.height / 2).max(1));

        let heights = box_filter(&self.heights, dst, |vals| {
            let finite: Vec<f32> = vals.iter().copied().filter(|v| v.is_finite()).collect();
            if finite.is_empty() {
                f32::NAN
            } else {
                finite.iter().sum::<f32>() / finite.len() as f32
            }
        });
        let albedo = match &self.albedo {
            Albedo::Constant(c) => Albedo::Constant(*c),
            Albedo::Float(img) => Albedo::Float(box_filter(img, dst, |vals| {
                vals.iter().sum::<f32>() / vals.len() as f32
            })),
            Albedo::Color(img) => Albedo::Color(box_filter(img, dst, |vals| {
                let sum = vals.iter().fold(Spectral::ZERO, |mut acc, s| {
                    for c in 0..acc.0.len() {
                        acc[c] += s[c];
                    }
                    acc
                });
                sum * (1.0 / vals.len() as f32)
            })),
        };

        let mut projection = self.projection.clone();
        let sx = src.width as f64 / dst.width as f64;
        let sy = src.height as f64 / dst.height as f64;
        projection.xoff += 0.5 * (sx - 1.0) * projection.dx;
        projection.yoff += 0.5 * (sy - 1.0) * projection.dy;
        projection.dx *= sx;
        projection.dy *= sy;
        projection.resolution = dst;

        Self {
            projection,
            heights,
            albedo,
        }
    }

    /// This level followed by successively halved copies, stopping before
    /// either side would drop below `min_resolution`.
    pub fn make_pyramid(&self, min_resolution: Resolution) -> Vec<DemLevel> {
        let mut levels = vec![self.clone()];
        loop {
            let last = &levels[levels.len() - 1];
            let r = last.resolution();
            if r.width / 2 < min_resolution.width.max(1) || r.height / 2 < min_resolution.height.max(1) {
                break;
            }
            let next = last.downsample();
            levels.push(next);
        }
        levels
    }
}

/// Mesh buffers index vertices with `u32`.
pub fn check_vertex_count(resolution: Resolution) -> Result<()> {
    Error::check_len(resolution.num_pixels(), u32::MAX as u64)
}

/// Reduce `img` to `dst` by averaging the source block under each target
/// pixel with `reduce`.
fn box_filter<T: Copy>(img: &Image<T>, dst: Resolution, reduce: impl Fn(&[T]) -> T) -> Image<T> {
    let src = img.resolution();
    let bx = (src.width / dst.width).max(1);
    let by = (src.height / dst.height).max(1);
    let mut block = Vec::with_capacity((bx * by) as usize);
    Image::from_fn(dst, |x, y| {
        block.clear();
        for sy in y * by..((y + 1) * by).min(src.height) {
            for sx in x * bx..((x + 1) * bx).min(src.width) {
                block.push(img.get(sx, sy));
            }
        }
        reduce(&block)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_level(w: u32, h: u32, gsd: f64) -> DemLevel {
        let res = Resolution::new(w, h);
        DemLevel::new(
            DemProjection::planar(res, gsd),
            Image::from_fn(res, |x, y| (x + y) as f32),
            Albedo::Constant(Spectral::splat(0.1)),
        )
        .unwrap()
    }

    #[test]
    fn test_new_checks_albedo_resolution() {
        let res = Resolution::new(4, 4);
        let err = DemLevel::new(
            DemProjection::planar(res, 1.0),
            Image::filled(res, 0.0),
            Albedo::Float(Image::filled(Resolution::new(2, 2), 0.5)),
        )
        .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[test]
    fn test_vertex_count_limit() {
        assert!(check_vertex_count(Resolution::new(65535, 65535)).is_ok());
        assert!(matches!(
            check_vertex_count(Resolution::new(u32::MAX, 2)),
            Err(Error::StreamSizeOverflow { .. })
        ));
    }

    #[test]
    fn test_index_buffer() {
        let level = flat_level(3, 3, 1.0);
        let indices = level.make_index_buffer();
        assert_eq!(indices.len(), 2 * 2 * 6);
        assert_eq!(&indices[..6], &[0, 1, 3, 1, 4, 3]);
    }

    #[test]
    fn test_index_buffer_skips_missing() {
        let mut level = flat_level(3, 3, 1.0);
        level.heights.set(0, 0, f32::NAN);
        assert_eq!(level.make_index_buffer().len(), 3 * 6);
    }

    #[test]
    fn test_vertex_buffer_offset() {
        let level = flat_level(4, 4, 2.0);
        let reference = DVec3::new(1.0, 2.0, 3.0);
        let vertices = level.make_vertex_buffer(reference, &Spectral::ONE);
        assert_eq!(vertices.len(), 16);
        assert_eq!(vertices[0].position, Vec3::new(-1.0, -2.0, -3.0));
        // (x=3, y=1) sits at (6, 2, 4) before the offset
        assert_eq!(vertices[7].position, Vec3::new(5.0, 0.0, 1.0));
        assert_eq!(vertices[15].uv, Vec2::new(1.0, 1.0));
        assert_eq!(vertices[5].albedo, Spectral::splat(0.1));
    }

    #[test]
    fn test_flat_normals_point_up() {
        let res = Resolution::new(4, 4);
        let level = DemLevel::new(
            DemProjection::planar(res, 1.0),
            Image::filled(res, 10.0),
            Albedo::default(),
        )
        .unwrap();
        for n in level.vertex_normals() {
            assert!((n - Vec3::Z).length() < 1e-6);
        }
        let cone = level.normal_cone();
        assert!(cone.angle < 1e-3);
    }

    #[test]
    fn test_downsample() {
        let level = flat_level(8, 4, 1.0);
        let half = level.downsample();
        assert_eq!(half.resolution(), Resolution::new(4, 2));
        assert_eq!(half.gsd(), 2.0);
        // mean of (0,0),(1,0),(0,1),(1,1) heights 0,1,1,2
        assert_eq!(half.heights.get(0, 0), 1.0);
        // pixel centers move to the middle of the 2x2 block
        assert_eq!(half.projection.pixel_to_world(0.0, 0.0, 0.0).x, 0.5);
    }

    #[test]
    fn test_make_pyramid() {
        let level = flat_level(32, 16, 0.5);
        let pyramid = level.make_pyramid(Resolution::new(4, 4));
        let gsds: Vec<f64> = pyramid.iter().map(|l| l.gsd()).collect();
        assert_eq!(gsds, vec![0.5, 1.0, 2.0]);
        assert_eq!(pyramid[2].resolution(), Resolution::new(8, 4));
    }
}
