//! Height and albedo payload codec.
//!
//! Heights are stored at the narrowest width whose quantization step stays
//! under a fraction of the level's ground sample distance. Albedo is one of
//! three variants, with image variants quantized to 8 bits per channel.

use std::io::{Read, Seek, Write};

use crate::quipu::{IStream, OStream};
use crate::util::{ClassId, Error, Image, Result, Spectral, SPECTRAL_CHANNELS};

/// Fraction of a level's GSD the vertical quantization step must stay under.
pub const HEIGHT_PRECISION_SCALE: f64 = 0.1;

/// Storage width chosen for a height raster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeightEncoding {
    Uint8,
    Uint16,
    Float32,
}

impl HeightEncoding {
    /// Narrowest encoding with `(max - min) / type_max < gsd_scale`.
    pub fn select(min_max: [f32; 2], gsd_scale: f32) -> Self {
        let range = min_max[1] - min_max[0];
        if !range.is_finite() || range < 0.0 {
            return Self::Float32;
        }
        [Self::Uint8, Self::Uint16]
            .into_iter()
            .find(|enc| range / enc.type_max() < gsd_scale)
            .unwrap_or(Self::Float32)
    }

    pub fn class_id(self) -> ClassId {
        match self {
            Self::Uint8 => ClassId::Uint8,
            Self::Uint16 => ClassId::Uint16,
            Self::Float32 => ClassId::Float32,
        }
    }

    pub fn from_class_id(class_id: ClassId) -> Result<Self> {
        match class_id {
            ClassId::Uint8 => Ok(Self::Uint8),
            ClassId::Uint16 => Ok(Self::Uint16),
            ClassId::Float32 => Ok(Self::Float32),
            other => Err(Error::invalid(format!("height raster stored as {}", other))),
        }
    }

    /// Largest quantized value (1 for the unquantized float encoding).
    pub fn type_max(self) -> f32 {
        match self {
            Self::Uint8 => u8::MAX as f32,
            Self::Uint16 => u16::MAX as f32,
            Self::Float32 => 1.0,
        }
    }

    /// Quantization step for a given range.
    pub fn step(self, min_max: [f32; 2]) -> f32 {
        match self {
            Self::Float32 => 0.0,
            _ => (min_max[1] - min_max[0]) / self.type_max(),
        }
    }
}

/// Map `v` in `[min, max]` onto `0..=type_max`.
#[inline]
fn quantize(v: f32, min_max: [f32; 2], type_max: f32) -> f32 {
    let range = (min_max[1] - min_max[0]) as f64;
    if range <= 0.0 || !v.is_finite() {
        return 0.0;
    }
    let q = ((v as f64 - min_max[0] as f64) / range * type_max as f64).round();
    q.clamp(0.0, type_max as f64) as f32
}

#[inline]
fn dequantize(q: f32, min_max: [f32; 2], type_max: f32) -> f32 {
    let range = (min_max[1] - min_max[0]) as f64;
    (min_max[0] as f64 + q as f64 / type_max as f64 * range) as f32
}

/// Write a height raster quantized against the pyramid-wide `min_max`.
///
/// Any non-finite height forces the float encoding so missing samples
/// survive the round trip.
pub fn write_heights<W: Write + Seek>(
    out: &mut OStream<W>,
    heights: &Image<f32>,
    gsd_scale: f32,
    min_max: [f32; 2],
    compress: bool,
) -> Result<u64> {
    let encoding = if heights.data().iter().all(|h| h.is_finite()) {
        HeightEncoding::select(min_max, gsd_scale)
    } else {
        HeightEncoding::Float32
    };

    let mut written = out.write_typed_value(min_max[0])?;
    written += out.write_typed_value(min_max[1])?;

    let type_max = encoding.type_max();
    written += match encoding {
        HeightEncoding::Uint8 => {
            out.write_image(&heights.map(|&h| quantize(h, min_max, type_max) as u8), compress)?
        }
        HeightEncoding::Uint16 => {
            out.write_image(&heights.map(|&h| quantize(h, min_max, type_max) as u16), compress)?
        }
        HeightEncoding::Float32 => out.write_image(heights, compress)?,
    };
    Ok(written)
}

/// Read a height raster written by [`write_heights`].
pub fn read_heights<R: Read + Seek>(s: &mut IStream<R>) -> Result<Image<f32>> {
    let min = s.read_typed_value::<f32>()?;
    let max = s.read_typed_value::<f32>()?;
    let (stored, class_id) = s.read_image_tagged::<f32>()?;

    let encoding = HeightEncoding::from_class_id(class_id)?;
    if encoding == HeightEncoding::Float32 {
        return Ok(stored);
    }
    let type_max = encoding.type_max();
    Ok(stored.map(|&q| dequantize(q, [min, max], type_max)))
}

/// Discriminant persisted in front of every albedo record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum AlbedoType {
    Constant = 0,
    FloatImage = 1,
    ColorImage = 2,
}

impl AlbedoType {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Self::Constant),
            1 => Ok(Self::FloatImage),
            2 => Ok(Self::ColorImage),
            other => Err(Error::invalid(format!("unknown albedo type {}", other))),
        }
    }
}

/// Surface reflectance of one DEM level.
#[derive(Clone, Debug, PartialEq)]
pub enum Albedo {
    /// One value for the whole level.
    Constant(Spectral),
    /// Luminance-only raster.
    Float(Image<f32>),
    /// Per-channel raster.
    Color(Image<Spectral>),
}

impl Albedo {
    pub fn albedo_type(&self) -> AlbedoType {
        match self {
            Self::Constant(_) => AlbedoType::Constant,
            Self::Float(_) => AlbedoType::FloatImage,
            Self::Color(_) => AlbedoType::ColorImage,
        }
    }

    /// Reflectance at pixel `(x, y)`; luminance rasters are tinted by
    /// `profile`.
    pub fn sample(&self, x: u32, y: u32, profile: &Spectral) -> Spectral {
        match self {
            Self::Constant(c) => *c,
            Self::Float(img) => *profile * img.get(x, y),
            Self::Color(img) => img.get(x, y),
        }
    }
}

impl Default for Albedo {
    fn default() -> Self {
        Self::Constant(Spectral::ONE)
    }
}

/// Write one 8-bit quantized channel with its own (min, max).
fn write_channel<W: Write + Seek>(out: &mut OStream<W>, channel: &Image<f32>, compress: bool) -> Result<u64> {
    let min_max = channel.finite_min_max().unwrap_or([0.0, 0.0]);
    let type_max = u8::MAX as f32;

    let mut written = out.write_typed_value(min_max[0])?;
    written += out.write_typed_value(min_max[1])?;
    written += out.write_image(&channel.map(|&v| quantize(v, min_max, type_max) as u8), compress)?;
    Ok(written)
}

fn read_channel<R: Read + Seek>(s: &mut IStream<R>) -> Result<Image<f32>> {
    let min = s.read_typed_value::<f32>()?;
    let max = s.read_typed_value::<f32>()?;
    let quantized = s.read_image::<f32>()?;
    Ok(quantized.map(|&q| dequantize(q, [min, max], u8::MAX as f32)))
}

fn skip_channel<R: Read + Seek>(s: &mut IStream<R>) -> Result<()> {
    s.skip_typed_value()?;
    s.skip_typed_value()?;
    s.skip_image()
}

fn read_channel_count<R: Read + Seek>(s: &mut IStream<R>) -> Result<usize> {
    let n = s.read_u8()? as usize;
    if n != SPECTRAL_CHANNELS {
        return Err(Error::ChannelCountMismatch {
            expected: SPECTRAL_CHANNELS,
            actual: n,
        });
    }
    Ok(n)
}

/// Write an albedo record: discriminant, then the variant's payload.
pub fn write_albedo<W: Write + Seek>(out: &mut OStream<W>, albedo: &Albedo, compress: bool) -> Result<u64> {
    let mut written = out.write_u8(albedo.albedo_type() as u8)?;
    match albedo {
        Albedo::Constant(value) => {
            written += out.write_vec(&value.0)?;
        }
        Albedo::Float(img) => {
            written += write_channel(out, img, compress)?;
        }
        Albedo::Color(img) => {
            written += out.write_u8(SPECTRAL_CHANNELS as u8)?;
            for c in 0..SPECTRAL_CHANNELS {
                written += write_channel(out, &img.map(|s| s[c]), compress)?;
            }
        }
    }
    Ok(written)
}

/// Read an albedo record. Color rasters are tinted per texel by `profile`
/// when one is given.
pub fn read_albedo<R: Read + Seek>(s: &mut IStream<R>, profile: Option<&Spectral>) -> Result<Albedo> {
    match AlbedoType::from_u8(s.read_u8()?)? {
        AlbedoType::Constant => {
            let class_id = s.read_class_id()?;
            let n = s.read_u8()? as usize;
            if n != SPECTRAL_CHANNELS {
                return Err(Error::ChannelCountMismatch {
                    expected: SPECTRAL_CHANNELS,
                    actual: n,
                });
            }
            let mut value = Spectral::ZERO;
            for c in 0..SPECTRAL_CHANNELS {
                value[c] = s.read_scalar(class_id)?.to();
            }
            Ok(Albedo::Constant(value))
        }
        AlbedoType::FloatImage => Ok(Albedo::Float(read_channel(s)?)),
        AlbedoType::ColorImage => {
            let n = read_channel_count(s)?;
            let channels = (0..n).map(|_| read_channel(s)).collect::<Result<Vec<_>>>()?;

            let resolution = channels[0].resolution();
            if channels.iter().any(|c| c.resolution() != resolution) {
                return Err(Error::invalid("albedo channels differ in resolution"));
            }
            let mut color = Image::from_fn(resolution, |x, y| {
                let mut texel = Spectral::ZERO;
                for (c, channel) in channels.iter().enumerate() {
                    texel[c] = channel.get(x, y);
                }
                texel
            });
            if let Some(profile) = profile {
                color.data_mut().iter_mut().for_each(|t| *t = t.tint(profile));
            }
            Ok(Albedo::Color(color))
        }
    }
}

/// Advance past an albedo record without decoding any raster.
pub fn skip_albedo<R: Read + Seek>(s: &mut IStream<R>) -> Result<()> {
    match AlbedoType::from_u8(s.read_u8()?)? {
        AlbedoType::Constant => s.skip_vec(),
        AlbedoType::FloatImage => skip_channel(s),
        AlbedoType::ColorImage => {
            let n = s.read_u8()?;
            (0..n).try_for_each(|_| skip_channel(s))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::Resolution;
    use std::io::Cursor;

    fn roundtrip<T>(
        write: impl FnOnce(&mut OStream<Cursor<Vec<u8>>>) -> Result<u64>,
        read: impl FnOnce(&mut IStream<Cursor<Vec<u8>>>) -> Result<T>,
    ) -> T {
        let mut out = OStream::new(Cursor::new(Vec::new())).unwrap();
        let n = write(&mut out).unwrap();
        let bytes = out.into_inner().unwrap().into_inner();
        assert_eq!(n, bytes.len() as u64);
        let mut s = IStream::new(Cursor::new(bytes)).unwrap();
        let value = read(&mut s).unwrap();
        assert_eq!(s.pos(), s.len());
        value
    }

    fn ramp(w: u32, h: u32, lo: f32, hi: f32) -> Image<f32> {
        let n = (w * h - 1).max(1) as f32;
        Image::from_fn(Resolution::new(w, h), |x, y| lo + (hi - lo) * (y * w + x) as f32 / n)
    }

    #[test]
    fn test_encoding_selection() {
        // 100 m of relief: u8 step is 0.39, u16 step is 0.0015
        let mm = [0.0, 100.0];
        assert_eq!(HeightEncoding::select(mm, 1.0), HeightEncoding::Uint8);
        assert_eq!(HeightEncoding::select(mm, 0.1), HeightEncoding::Uint16);
        assert_eq!(HeightEncoding::select(mm, 0.001), HeightEncoding::Float32);
        assert_eq!(HeightEncoding::select([5.0, 5.0], 0.1), HeightEncoding::Uint8);
        assert_eq!(HeightEncoding::select([0.0, f32::INFINITY], 10.0), HeightEncoding::Float32);
    }

    #[test]
    fn test_heights_u8_within_one_step() {
        let mm = [-50.0, 150.0];
        let heights = ramp(16, 16, mm[0], mm[1]);
        let back = roundtrip(
            |out| write_heights(out, &heights, 5.0, mm, false),
            |s| read_heights(s),
        );
        let step = HeightEncoding::Uint8.step(mm);
        for (a, b) in heights.data().iter().zip(back.data()) {
            assert!((a - b).abs() <= step, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_heights_u16_compressed() {
        let mm = [0.0, 1000.0];
        let heights = ramp(32, 8, mm[0], mm[1]);
        let back = roundtrip(
            |out| write_heights(out, &heights, 0.1, mm, true),
            |s| read_heights(s),
        );
        let step = HeightEncoding::Uint16.step(mm);
        for (a, b) in heights.data().iter().zip(back.data()) {
            assert!((a - b).abs() <= step);
        }
    }

    #[test]
    fn test_heights_float_exact() {
        let mm = [0.0, 1.0e4];
        let heights = ramp(7, 5, mm[0], mm[1]);
        let back = roundtrip(
            |out| write_heights(out, &heights, 1.0e-6, mm, false),
            |s| read_heights(s),
        );
        assert_eq!(back, heights);
    }

    #[test]
    fn test_heights_nan_forces_float() {
        let mut heights = ramp(4, 4, 0.0, 10.0);
        heights.set(1, 2, f32::NAN);
        let back = roundtrip(
            |out| write_heights(out, &heights, 100.0, [0.0, 10.0], false),
            |s| read_heights(s),
        );
        assert!(back.get(1, 2).is_nan());
        assert_eq!(back.get(3, 3), 10.0);
    }

    #[test]
    fn test_constant_albedo() {
        let albedo = Albedo::Constant(Spectral([0.1, 0.2, 0.3]));
        let back = roundtrip(|out| write_albedo(out, &albedo, false), |s| read_albedo(s, None));
        assert_eq!(back, albedo);
    }

    #[test]
    fn test_float_albedo_quantized() {
        let img = ramp(8, 8, 0.02, 0.4);
        let back = roundtrip(
            |out| write_albedo(out, &Albedo::Float(img.clone()), true),
            |s| read_albedo(s, None),
        );
        let Albedo::Float(back) = back else {
            panic!("expected float albedo");
        };
        let step = (0.4 - 0.02) / 255.0;
        for (a, b) in img.data().iter().zip(back.data()) {
            assert!((a - b).abs() <= step);
        }
    }

    #[test]
    fn test_color_albedo_with_profile() {
        let img = Image::from_fn(Resolution::new(4, 2), |x, y| {
            Spectral([x as f32 * 0.1, y as f32 * 0.5, 0.25])
        });
        let profile = Spectral([2.0, 1.0, 0.5]);
        let back = roundtrip(
            |out| write_albedo(out, &Albedo::Color(img.clone()), false),
            |s| read_albedo(s, Some(&profile)),
        );
        let Albedo::Color(back) = back else {
            panic!("expected color albedo");
        };
        let t = back.get(3, 1);
        assert!((t[0] - 0.6).abs() < 0.3 / 255.0 * 2.0 + 1e-6);
        assert!((t[1] - 0.5).abs() < 1e-6);
        // constant channel: range 0, stored min survives exactly
        assert!((t[2] - 0.125).abs() < 1e-6);
    }

    #[test]
    fn test_color_albedo_channel_mismatch() {
        let mut out = OStream::new(Cursor::new(Vec::new())).unwrap();
        out.write_u8(AlbedoType::ColorImage as u8).unwrap();
        out.write_u8(SPECTRAL_CHANNELS as u8 + 2).unwrap();
        let bytes = out.into_inner().unwrap().into_inner();
        let mut s = IStream::new(Cursor::new(bytes)).unwrap();
        assert!(matches!(
            read_albedo(&mut s, None),
            Err(Error::ChannelCountMismatch { expected: SPECTRAL_CHANNELS, .. })
        ));
    }

    #[test]
    fn test_skip_albedo() {
        let variants = [
            Albedo::Constant(Spectral::splat(0.06)),
            Albedo::Float(ramp(5, 5, 0.0, 1.0)),
            Albedo::Color(Image::filled(Resolution::new(3, 3), Spectral::splat(0.2))),
        ];
        for albedo in &variants {
            roundtrip(
                |out| {
                    let n = write_albedo(out, albedo, true)?;
                    Ok(n + out.write_u8(0xEE)?)
                },
                |s| {
                    skip_albedo(s)?;
                    s.read_u8()
                },
            );
        }
    }
}
