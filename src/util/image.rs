//! Raster and spectral value types carried by DEM levels.

use bytemuck::{Pod, Zeroable};
use std::fmt;
use std::ops::{Index, IndexMut, Mul};

/// Number of spectral channels albedo is stored and rendered with.
pub const SPECTRAL_CHANNELS: usize = 3;

/// Raster size in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total number of pixels.
    #[inline]
    pub const fn num_pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A row-major raster.
///
/// Pixel `(x, y)` lives at `y * width + x`. This is also the one traversal
/// order used for serialization: rows on the outside, columns on the inside.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Image<T> {
    resolution: Resolution,
    data: Vec<T>,
}

impl<T: Copy> Image<T> {
    /// Create an image filled with `value`.
    pub fn filled(resolution: Resolution, value: T) -> Self {
        Self {
            resolution,
            data: vec![value; resolution.num_pixels()],
        }
    }

    /// Wrap an existing row-major buffer. Returns `None` if the length
    /// does not match the resolution.
    pub fn from_vec(resolution: Resolution, data: Vec<T>) -> Option<Self> {
        (data.len() == resolution.num_pixels()).then_some(Self { resolution, data })
    }

    /// Build an image by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(resolution: Resolution, mut f: impl FnMut(u32, u32) -> T) -> Self {
        let mut data = Vec::with_capacity(resolution.num_pixels());
        for y in 0..resolution.height {
            for x in 0..resolution.width {
                data.push(f(x, y));
            }
        }
        Self { resolution, data }
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.resolution.height
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Pixel at `(x, y)`.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> T {
        self.data[self.offset(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: T) {
        let i = self.offset(x, y);
        self.data[i] = value;
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.resolution.width as usize + x as usize
    }

    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Apply `f` to every pixel, keeping the resolution.
    pub fn map<U: Copy>(&self, f: impl FnMut(&T) -> U) -> Image<U> {
        Image {
            resolution: self.resolution,
            data: self.data.iter().map(f).collect(),
        }
    }
}

impl Image<f32> {
    /// Finite (min, max), ignoring NaN and infinities. `None` when no pixel
    /// is finite.
    pub fn finite_min_max(&self) -> Option<[f32; 2]> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some([v, v]),
                Some([lo, hi]) => Some([lo.min(v), hi.max(v)]),
            })
    }
}

/// Spectral reflectance sample with [`SPECTRAL_CHANNELS`] channels.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(transparent)]
pub struct Spectral(pub [f32; SPECTRAL_CHANNELS]);

impl Spectral {
    pub const ZERO: Self = Self([0.0; SPECTRAL_CHANNELS]);
    pub const ONE: Self = Self([1.0; SPECTRAL_CHANNELS]);

    /// Same value in every channel.
    #[inline]
    pub const fn splat(v: f32) -> Self {
        Self([v; SPECTRAL_CHANNELS])
    }

    /// Mean over channels.
    pub fn mean(&self) -> f32 {
        self.0.iter().sum::<f32>() / SPECTRAL_CHANNELS as f32
    }

    /// Channel-wise product.
    pub fn tint(&self, profile: &Spectral) -> Self {
        let mut out = *self;
        for (c, p) in out.0.iter_mut().zip(profile.0.iter()) {
            *c *= p;
        }
        out
    }
}

impl Default for Spectral {
    fn default() -> Self {
        Self::ONE
    }
}

impl Index<usize> for Spectral {
    type Output = f32;

    #[inline]
    fn index(&self, i: usize) -> &f32 {
        &self.0[i]
    }
}

impl IndexMut<usize> for Spectral {
    #[inline]
    fn index_mut(&mut self, i: usize) -> &mut f32 {
        &mut self.0[i]
    }
}

impl Mul<f32> for Spectral {
    type Output = Spectral;

    fn mul(self, rhs: f32) -> Spectral {
        Spectral(self.0.map(|c| c * rhs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_major_layout() {
        let img = Image::from_fn(Resolution::new(3, 2), |x, y| (y * 10 + x) as f32);
        assert_eq!(img.data(), &[0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);
        assert_eq!(img.get(2, 1), 12.0);
    }

    #[test]
    fn test_from_vec_checks_len() {
        assert!(Image::from_vec(Resolution::new(2, 2), vec![0u8; 3]).is_none());
        assert!(Image::from_vec(Resolution::new(2, 2), vec![0u8; 4]).is_some());
    }

    #[test]
    fn test_finite_min_max() {
        let img = Image::from_vec(Resolution::new(4, 1), vec![3.0, f32::NAN, -1.0, 2.0]).unwrap();
        assert_eq!(img.finite_min_max(), Some([-1.0, 3.0]));

        let empty = Image::filled(Resolution::new(2, 1), f32::NAN);
        assert_eq!(empty.finite_min_max(), None);
    }

    #[test]
    fn test_spectral_ops() {
        let s = Spectral::splat(0.5);
        assert_eq!(s.mean(), 0.5);
        let mut profile = Spectral::ONE;
        profile[0] = 2.0;
        assert_eq!(s.tint(&profile)[0], 1.0);
        assert_eq!((s * 2.0)[2], 1.0);
    }
}
