//! DEM pyramid container.
//!
//! ```text
//! magic            "QUIPU"
//! class id         float tag of the mesh data
//! transformation   position + rotation + scale
//! level count      u16
//! compressed       u8
//! has albedo       u8
//! normal cone      vec<f32, 3> axis + typed f32 angle
//! height range     typed f32 min + typed f32 max
//! level table      level count x (f64 gsd, u64 absolute offset)
//! levels           projection + heights [+ albedo], finest first
//! ```

use std::fs;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::level::{DemLevel, MeshBuffers};
use super::payload::{
    read_albedo, read_heights, skip_albedo, write_albedo, write_heights, Albedo, HEIGHT_PRECISION_SCALE,
};
use super::projection::DemProjection;
use crate::core::IoCounter;
use crate::quipu::{level_table_size, IStream, OStream};
use crate::util::{ClassId, DAffine3, DVec3, Error, NormalCone, Result, Spectral, Vec3};

/// Options controlling how a pyramid is read.
#[derive(Clone, Debug)]
pub struct DemReaderOptions {
    /// Decode stored albedo. When false (or when a level has none) every
    /// vertex gets `default_albedo * albedo_profile`.
    pub read_albedos: bool,
    /// GSD used by [`DemPyramid::read_buffers_default`]. Infinite means unset.
    pub default_gsd: f64,
    pub default_albedo: f32,
    /// Spectrum used to tint luminance-only albedo.
    pub albedo_profile: Spectral,
    /// Receives one count per file open.
    pub io_counter: Option<IoCounter>,
}

impl Default for DemReaderOptions {
    fn default() -> Self {
        Self {
            read_albedos: true,
            default_gsd: f64::INFINITY,
            default_albedo: 0.06,
            albedo_profile: Spectral::splat(1.0),
            io_counter: None,
        }
    }
}

impl DemReaderOptions {
    pub fn with_read_albedos(mut self, read_albedos: bool) -> Self {
        self.read_albedos = read_albedos;
        self
    }

    pub fn with_default_gsd(mut self, gsd: f64) -> Self {
        self.default_gsd = gsd;
        self
    }

    pub fn with_default_albedo(mut self, albedo: f32) -> Self {
        self.default_albedo = albedo;
        self
    }

    pub fn with_albedo_profile(mut self, profile: Spectral) -> Self {
        self.albedo_profile = profile;
        self
    }

    pub fn with_io_counter(mut self, counter: IoCounter) -> Self {
        self.io_counter = Some(counter);
        self
    }

    /// Albedo used in place of a missing or skipped record.
    pub fn fallback_albedo(&self) -> Albedo {
        Albedo::Constant(self.albedo_profile * self.default_albedo)
    }
}

/// Options controlling how a pyramid is written.
#[derive(Clone, Copy, Debug)]
pub struct DemWriterOptions {
    /// Zlib-compress every raster payload.
    pub compress: bool,
    pub write_albedos: bool,
}

impl Default for DemWriterOptions {
    fn default() -> Self {
        Self {
            compress: false,
            write_albedos: true,
        }
    }
}

impl DemWriterOptions {
    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_write_albedos(mut self, write_albedos: bool) -> Self {
        self.write_albedos = write_albedos;
        self
    }
}

/// Parsed pyramid header.
#[derive(Clone, Debug, PartialEq)]
pub struct PyramidHeader {
    pub class_id: ClassId,
    pub transformation: DAffine3,
    pub compressed: bool,
    pub has_albedo: bool,
    /// Normal spread of the finest level.
    pub normal_cone: NormalCone,
    /// Finite height range every level is quantized against.
    pub height_range: [f32; 2],
    /// Ground sample distance per level, strictly increasing.
    pub gsds: Vec<f64>,
    /// Absolute file offset of each level's payload.
    pub offsets: Vec<u64>,
}

impl PyramidHeader {
    /// Header for `levels` with a zeroed offset table.
    pub fn from_levels(levels: &[DemLevel], transformation: &DAffine3, options: &DemWriterOptions) -> Self {
        let height_range = levels
            .iter()
            .filter_map(DemLevel::height_range)
            .reduce(|a, b| [a[0].min(b[0]), a[1].max(b[1])])
            .unwrap_or([0.0, 0.0]);
        Self {
            class_id: ClassId::Float32,
            transformation: *transformation,
            compressed: options.compress,
            has_albedo: options.write_albedos,
            normal_cone: levels.first().map(DemLevel::normal_cone).unwrap_or_default(),
            height_range,
            gsds: levels.iter().map(DemLevel::gsd).collect(),
            offsets: vec![0; levels.len()],
        }
    }

    #[inline]
    pub fn num_levels(&self) -> usize {
        self.gsds.len()
    }

    /// Write the header. Returns the position of the level table.
    pub fn write<W: Write + Seek>(&self, out: &mut OStream<W>) -> Result<u64> {
        Error::check_len(self.num_levels(), u16::MAX as u64)?;

        out.write_magic()?;
        out.write_class_id(self.class_id)?;
        out.write_transformation(&self.transformation)?;
        out.write_u16(self.num_levels() as u16)?;
        out.write_bool(self.compressed)?;
        out.write_bool(self.has_albedo)?;
        out.write_vec(&self.normal_cone.axis.to_array())?;
        out.write_typed_value(self.normal_cone.angle)?;
        out.write_typed_value(self.height_range[0])?;
        out.write_typed_value(self.height_range[1])?;

        let table_pos = out.pos();
        write_level_table(out, &self.gsds, &self.offsets)?;
        Ok(table_pos)
    }

    /// Read a header from a stream positioned just past the magic.
    pub fn read<R: Read + Seek>(s: &mut IStream<R>) -> Result<Self> {
        let class_id = s.read_class_id()?;
        if !class_id.is_float() {
            return Err(Error::invalid(format!("pyramid mesh data stored as {}", class_id)));
        }
        let transformation = s.read_transformation()?;
        let num_levels = s.read_u16()? as usize;
        let compressed = s.read_bool()?;
        let has_albedo = s.read_bool()?;
        let axis = Vec3::from_array(s.read_vec::<f32, 3>()?);
        let angle = s.read_typed_value::<f32>()?;
        let height_range = [s.read_typed_value::<f32>()?, s.read_typed_value::<f32>()?];

        s.ensure_available(level_table_size(num_levels))?;
        let mut gsds = Vec::with_capacity(num_levels);
        let mut offsets = Vec::with_capacity(num_levels);
        for _ in 0..num_levels {
            gsds.push(s.read_f64()?);
            offsets.push(s.read_u64()?);
        }

        let header = Self {
            class_id,
            transformation,
            compressed,
            has_albedo,
            normal_cone: NormalCone { axis, angle },
            height_range,
            gsds,
            offsets,
        };
        header.validate(s.pos(), s.len())?;
        Ok(header)
    }

    /// Check the level table against the payload region `[header_size, file_len)`.
    pub fn validate(&self, header_size: u64, file_len: u64) -> Result<()> {
        if self.gsds.is_empty() {
            return Err(Error::invalid("pyramid has no levels"));
        }
        validate_gsds(&self.gsds)?;
        if self.offsets[0] == 0 {
            return Err(Error::invalid("level 0 has no offset"));
        }
        if let Some((i, off)) = self
            .offsets
            .iter()
            .enumerate()
            .find(|(_, &off)| off < header_size || off >= file_len)
        {
            return Err(Error::invalid(format!(
                "level {} offset {} outside payload region {}..{}",
                i, off, header_size, file_len
            )));
        }
        Ok(())
    }
}

fn validate_gsds(gsds: &[f64]) -> Result<()> {
    if let Some(g) = gsds.iter().find(|g| !g.is_finite() || **g <= 0.0) {
        return Err(Error::invalid(format!("invalid level gsd {}", g)));
    }
    if let Some(w) = gsds.windows(2).find(|w| w[0] >= w[1]) {
        return Err(Error::invalid(format!(
            "level gsds not strictly increasing: {} then {}",
            w[0], w[1]
        )));
    }
    Ok(())
}

fn write_level_table<W: Write + Seek>(out: &mut OStream<W>, gsds: &[f64], offsets: &[u64]) -> Result<u64> {
    let mut written = 0;
    for (&gsd, &offset) in gsds.iter().zip(offsets) {
        written += out.write_f64(gsd)?;
        written += out.write_u64(offset)?;
    }
    Ok(written)
}

/// Index of the coarsest level whose gsd does not exceed `required_gsd`,
/// falling back to the finest level.
pub fn select_level(gsds: &[f64], required_gsd: f64) -> usize {
    let mut pick = 0;
    for (i, &gsd) in gsds.iter().enumerate().skip(1) {
        if gsd > required_gsd {
            break;
        }
        pick = i;
    }
    pick
}

/// Absolute offsets of consecutive payloads starting at `start`.
pub fn level_offsets(start: u64, sizes: &[u64]) -> Vec<u64> {
    sizes
        .iter()
        .scan(start, |next, &size| {
            let offset = *next;
            *next += size;
            Some(offset)
        })
        .collect()
}

/// Serialize every level's payload in order, returning each payload's size.
pub fn emit_levels<W: Write + Seek>(
    out: &mut OStream<W>,
    levels: &[DemLevel],
    header: &PyramidHeader,
) -> Result<Vec<u64>> {
    levels
        .iter()
        .map(|level| -> Result<u64> {
            let gsd_scale = (level.gsd() * HEIGHT_PRECISION_SCALE) as f32;
            let mut size = level.projection.write(out)?;
            size += write_heights(out, &level.heights, gsd_scale, header.height_range, header.compressed)?;
            if header.has_albedo {
                size += write_albedo(out, &level.albedo, header.compressed)?;
            }
            Ok(size)
        })
        .collect()
}

/// Overwrite the placeholder table at `table_pos` and return to the end.
pub fn backfill<W: Write + Seek>(out: &mut OStream<W>, table_pos: u64, gsds: &[f64], offsets: &[u64]) -> Result<()> {
    out.seek(table_pos)?;
    write_level_table(out, gsds, offsets)?;
    out.seek_end()?;
    Ok(())
}

/// Write a complete pyramid to `out`, which must be positioned at the start
/// of the file. Returns the finished header.
pub fn write_stream<W: Write + Seek>(
    out: &mut OStream<W>,
    levels: &[DemLevel],
    transformation: &DAffine3,
    options: &DemWriterOptions,
) -> Result<PyramidHeader> {
    validate_levels(levels)?;

    let mut header = PyramidHeader::from_levels(levels, transformation, options);
    let table_pos = header.write(out)?;
    let header_size = out.pos();

    let sizes = emit_levels(out, levels, &header)?;
    header.offsets = level_offsets(header_size, &sizes);
    backfill(out, table_pos, &header.gsds, &header.offsets)?;
    out.flush()?;
    Ok(header)
}

fn validate_levels(levels: &[DemLevel]) -> Result<()> {
    if levels.is_empty() {
        return Err(Error::invalid("pyramid has no levels"));
    }
    if let Some(i) = levels.iter().position(|l| l.resolution().is_empty()) {
        return Err(Error::invalid(format!("level {} has an empty height raster", i)));
    }
    validate_gsds(&levels.iter().map(DemLevel::gsd).collect::<Vec<_>>())
}

/// Decode one level payload at the stream's current position.
pub fn read_level_payload<R: Read + Seek>(
    s: &mut IStream<R>,
    header: &PyramidHeader,
    options: &DemReaderOptions,
) -> Result<DemLevel> {
    let projection = DemProjection::read(s)?;
    let heights = read_heights(s)?;
    if heights.resolution() != projection.resolution {
        return Err(Error::dimension_mismatch(projection.resolution, heights.resolution()));
    }

    let albedo = match (header.has_albedo, options.read_albedos) {
        (true, true) => read_albedo(s, Some(&options.albedo_profile))?,
        (true, false) => {
            skip_albedo(s)?;
            options.fallback_albedo()
        }
        (false, read) => {
            if read {
                warn!("pyramid carries no albedo, using default {}", options.default_albedo);
            }
            options.fallback_albedo()
        }
    };
    DemLevel::new(projection, heights, albedo)
}

/// Handle to a pyramid file. Holds the parsed header; every read opens the
/// file anew and closes it before returning.
///
/// The streaming read caches the last loaded gsd and therefore needs `&mut
/// self`. Use [`SharedDemPyramid`] to stream one pyramid from several threads.
#[derive(Debug)]
pub struct DemPyramid {
    path: PathBuf,
    options: DemReaderOptions,
    header: PyramidHeader,
    header_size: u64,
    current_gsd: f64,
    default_gsd: f64,
}

impl DemPyramid {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, DemReaderOptions::default())
    }

    /// Open and parse the header.
    pub fn open_with(path: impl AsRef<Path>, options: DemReaderOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut s = IStream::open_counted(&path, options.io_counter.as_ref())?;
        let header = PyramidHeader::read(&mut s)?;
        let header_size = s.pos();
        debug!(
            path = %path.display(),
            levels = header.num_levels(),
            header_size,
            compressed = header.compressed,
            has_albedo = header.has_albedo,
            "opened DEM pyramid"
        );

        Ok(Self {
            path,
            default_gsd: options.default_gsd,
            options,
            header,
            header_size,
            current_gsd: f64::INFINITY,
        })
    }

    fn open_stream(&self) -> Result<IStream> {
        IStream::open_counted(&self.path, self.options.io_counter.as_ref())
    }

    /// Decode every level, finest first.
    pub fn read_pyramid(&self) -> Result<Vec<DemLevel>> {
        let mut s = self.open_stream()?;
        self.header
            .offsets
            .iter()
            .map(|&offset| {
                s.seek(offset)?;
                read_level_payload(&mut s, &self.header, &self.options)
            })
            .collect()
    }

    /// Decode a single level by index.
    pub fn read_level(&self, index: usize) -> Result<DemLevel> {
        let offset = *self.header.offsets.get(index).ok_or_else(|| {
            Error::invalid(format!("level {} out of range ({} levels)", index, self.num_levels()))
        })?;
        let mut s = self.open_stream()?;
        s.seek(offset)?;
        read_level_payload(&mut s, &self.header, &self.options)
    }

    /// Index of the level a streaming read at `required_gsd` would load.
    pub fn select_level(&self, required_gsd: f64) -> usize {
        select_level(&self.header.gsds, required_gsd)
    }

    /// Stream the level matching `required_gsd` as mesh buffers with
    /// positions relative to `reference`.
    ///
    /// Returns `Ok(None)` without touching the file when the selected level
    /// is the one loaded last time.
    pub fn read_buffers(&mut self, required_gsd: f64, reference: DVec3) -> Result<Option<MeshBuffers>> {
        let index = self.select_level(required_gsd);
        let gsd = self.header.gsds[index];
        if gsd == self.current_gsd && self.current_gsd.is_finite() {
            debug!(level = index, gsd, "level already loaded");
            return Ok(None);
        }

        debug!(level = index, gsd, required_gsd, "streaming level");
        let level = self.read_level(index)?;
        self.current_gsd = gsd;
        if !self.default_gsd.is_finite() {
            self.default_gsd = gsd;
        }

        let (vertices, indices) = level.make_buffers(reference, &self.options.albedo_profile);
        Ok(Some(MeshBuffers {
            level: index,
            gsd,
            vertices,
            indices,
        }))
    }

    /// Stream at the default gsd.
    pub fn read_buffers_default(&mut self, reference: DVec3) -> Result<Option<MeshBuffers>> {
        self.read_buffers(self.default_gsd, reference)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &PyramidHeader {
        &self.header
    }

    pub fn options(&self) -> &DemReaderOptions {
        &self.options
    }

    /// Byte offset where level 0's payload begins.
    pub fn header_size(&self) -> u64 {
        self.header_size
    }

    pub fn num_levels(&self) -> usize {
        self.header.num_levels()
    }

    pub fn gsds(&self) -> &[f64] {
        &self.header.gsds
    }

    pub fn offsets(&self) -> &[u64] {
        &self.header.offsets
    }

    pub fn transformation(&self) -> DAffine3 {
        self.header.transformation
    }

    /// Gsd of the last streamed level, infinite before the first load.
    pub fn current_gsd(&self) -> f64 {
        self.current_gsd
    }

    pub fn default_gsd(&self) -> f64 {
        self.default_gsd
    }

    pub fn is_compressed(&self) -> bool {
        self.header.compressed
    }

    pub fn has_albedos(&self) -> bool {
        self.header.has_albedo
    }

    /// Mean surface normal of the finest level.
    pub fn normal(&self) -> Vec3 {
        self.header.normal_cone.axis
    }

    pub fn cone_angle(&self) -> f32 {
        self.header.normal_cone.angle
    }

    pub fn height_range(&self) -> [f32; 2] {
        self.header.height_range
    }

    /// Write `levels` (finest first) to `path`.
    ///
    /// The file is assembled next to `path` and renamed into place once
    /// complete, so a failed write leaves any existing file untouched.
    pub fn write(
        path: impl AsRef<Path>,
        levels: &[DemLevel],
        transformation: &DAffine3,
        options: &DemWriterOptions,
    ) -> Result<PyramidHeader> {
        let path = path.as_ref();
        let tmp = temp_path(path);

        let result = write_file(&tmp, levels, transformation, options);
        let header = match result {
            Ok(header) => header,
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                return Err(e);
            }
        };
        fs::rename(&tmp, path)?;

        info!(
            path = %path.display(),
            levels = header.num_levels(),
            compressed = header.compressed,
            "wrote DEM pyramid"
        );
        Ok(header)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

fn write_file(
    path: &Path,
    levels: &[DemLevel],
    transformation: &DAffine3,
    options: &DemWriterOptions,
) -> Result<PyramidHeader> {
    let mut out = OStream::create(path)?;
    let header = write_stream(&mut out, levels, transformation, options)?;
    out.into_inner()?.get_ref().sync_all()?;
    Ok(header)
}

/// A [`DemPyramid`] that can be streamed from several threads.
#[derive(Clone, Debug)]
pub struct SharedDemPyramid {
    inner: Arc<Mutex<DemPyramid>>,
}

impl SharedDemPyramid {
    pub fn new(pyramid: DemPyramid) -> Self {
        Self {
            inner: Arc::new(Mutex::new(pyramid)),
        }
    }

    pub fn open(path: impl AsRef<Path>, options: DemReaderOptions) -> Result<Self> {
        DemPyramid::open_with(path, options).map(Self::new)
    }

    /// See [`DemPyramid::read_buffers`].
    pub fn read_buffers(&self, required_gsd: f64, reference: DVec3) -> Result<Option<MeshBuffers>> {
        self.inner.lock().read_buffers(required_gsd, reference)
    }

    pub fn current_gsd(&self) -> f64 {
        self.inner.lock().current_gsd()
    }

    /// Run `f` with exclusive access to the pyramid.
    pub fn with<T>(&self, f: impl FnOnce(&mut DemPyramid) -> T) -> T {
        f(&mut self.inner.lock())
    }
}

/// Header facts gathered without decoding the transformation or any level.
#[derive(Clone, Debug, PartialEq)]
pub struct PyramidSummary {
    pub file_len: u64,
    pub header_size: u64,
    pub compressed: bool,
    pub has_albedo: bool,
    pub height_range: [f32; 2],
    pub gsds: Vec<f64>,
    pub offsets: Vec<u64>,
}

impl PyramidSummary {
    pub fn num_levels(&self) -> usize {
        self.gsds.len()
    }

    /// Payload size of each level in bytes.
    pub fn level_sizes(&self) -> Vec<u64> {
        self.offsets
            .iter()
            .enumerate()
            .map(|(i, &off)| self.offsets.get(i + 1).copied().unwrap_or(self.file_len).saturating_sub(off))
            .collect()
    }
}

/// Inspect a pyramid's header, skipping the transformation and normal cone.
pub fn probe(path: impl AsRef<Path>) -> Result<PyramidSummary> {
    let mut s = IStream::open(path)?;
    let class_id = s.read_class_id()?;
    if !class_id.is_float() {
        return Err(Error::invalid(format!("pyramid mesh data stored as {}", class_id)));
    }
    s.skip_vec3d()?;
    s.skip_mat3d()?;
    s.skip_vec3d()?;
    let num_levels = s.read_u16()? as usize;
    let compressed = s.read_bool()?;
    let has_albedo = s.read_bool()?;
    s.skip_vec()?;
    s.skip_typed_value()?;
    let height_range = [s.read_typed_value::<f32>()?, s.read_typed_value::<f32>()?];

    s.ensure_available(level_table_size(num_levels))?;
    let mut gsds = Vec::with_capacity(num_levels);
    let mut offsets = Vec::with_capacity(num_levels);
    for _ in 0..num_levels {
        gsds.push(s.read_f64()?);
        offsets.push(s.read_u64()?);
    }

    let summary = PyramidSummary {
        file_len: s.len(),
        header_size: s.pos(),
        compressed,
        has_albedo,
        height_range,
        gsds,
        offsets,
    };
    if let Some(w) = summary.offsets.windows(2).find(|w| w[0] > w[1]) {
        return Err(Error::invalid(format!("level offsets out of order: {} then {}", w[0], w[1])));
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{Image, Resolution};
    use std::io::Cursor;

    fn level(res: u32, gsd: f64, albedo: Albedo) -> DemLevel {
        let r = Resolution::new(res, res);
        DemLevel::new(
            DemProjection::planar(r, gsd),
            Image::from_fn(r, |x, y| (x * 2 + y) as f32 * 0.5),
            albedo,
        )
        .unwrap()
    }

    fn write_to_vec(levels: &[DemLevel], options: &DemWriterOptions) -> (PyramidHeader, Vec<u8>) {
        let mut out = OStream::new(Cursor::new(Vec::new())).unwrap();
        let header = write_stream(&mut out, levels, &DAffine3::IDENTITY, options).unwrap();
        (header, out.into_inner().unwrap().into_inner())
    }

    fn open_vec(bytes: Vec<u8>) -> IStream<Cursor<Vec<u8>>> {
        let mut s = IStream::new(Cursor::new(bytes)).unwrap();
        s.validate_magic().unwrap();
        s
    }

    #[test]
    fn test_select_level() {
        let gsds = [0.5, 1.0, 2.0, 4.0];
        assert_eq!(select_level(&gsds, 1.5), 1);
        assert_eq!(select_level(&gsds, 0.1), 0);
        assert_eq!(select_level(&gsds, 10.0), 3);
        assert_eq!(select_level(&gsds, 2.0), 2);
        assert_eq!(select_level(&gsds, f64::INFINITY), 3);
        assert_eq!(select_level(&[1.0], 0.0), 0);
    }

    #[test]
    fn test_level_offsets() {
        assert_eq!(level_offsets(100, &[10, 20, 5]), vec![100, 110, 130]);
        assert!(level_offsets(100, &[]).is_empty());
    }

    #[test]
    fn test_header_roundtrip() {
        let levels = [
            level(8, 1.0, Albedo::Constant(Spectral::splat(0.2))),
            level(4, 2.0, Albedo::Constant(Spectral::splat(0.2))),
        ];
        let options = DemWriterOptions::default().with_compress(true);
        let (header, bytes) = write_to_vec(&levels, &options);

        let mut s = open_vec(bytes);
        let parsed = PyramidHeader::read(&mut s).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.offsets[0], s.pos());
        assert!(parsed.offsets[1] > parsed.offsets[0]);
        assert!(parsed.compressed);
        assert_eq!(parsed.height_range, [0.0, 10.5]);
    }

    #[test]
    fn test_levels_decode_in_order() {
        let levels = [
            level(8, 1.0, Albedo::Float(Image::filled(Resolution::new(8, 8), 0.5))),
            level(4, 2.0, Albedo::Constant(Spectral::splat(0.3))),
        ];
        let (header, bytes) = write_to_vec(&levels, &DemWriterOptions::default());
        let mut s = open_vec(bytes);
        let options = DemReaderOptions::default();

        for (i, original) in levels.iter().enumerate() {
            s.seek(header.offsets[i]).unwrap();
            let decoded = read_level_payload(&mut s, &header, &options).unwrap();
            assert_eq!(decoded.projection, original.projection);
            assert_eq!(decoded.albedo.albedo_type(), original.albedo.albedo_type());
        }
    }

    #[test]
    fn test_skip_albedos_uses_fallback() {
        let levels = [level(4, 1.0, Albedo::Constant(Spectral::splat(0.9)))];
        let (header, bytes) = write_to_vec(&levels, &DemWriterOptions::default());
        let mut s = open_vec(bytes);
        s.seek(header.offsets[0]).unwrap();

        let options = DemReaderOptions::default()
            .with_read_albedos(false)
            .with_default_albedo(0.5)
            .with_albedo_profile(Spectral([1.0, 2.0, 4.0]));
        let decoded = read_level_payload(&mut s, &header, &options).unwrap();
        assert_eq!(decoded.albedo, Albedo::Constant(Spectral([0.5, 1.0, 2.0])));
        assert_eq!(s.pos(), s.len());
    }

    #[test]
    fn test_no_albedo_written() {
        let levels = [level(4, 1.0, Albedo::Constant(Spectral::splat(0.9)))];
        let options = DemWriterOptions::default().with_write_albedos(false);
        let (header, bytes) = write_to_vec(&levels, &options);
        assert!(!header.has_albedo);

        let mut s = open_vec(bytes);
        s.seek(header.offsets[0]).unwrap();
        let decoded = read_level_payload(&mut s, &header, &DemReaderOptions::default()).unwrap();
        assert_eq!(decoded.albedo, Albedo::Constant(Spectral::splat(0.06)));
    }

    #[test]
    fn test_write_rejects_bad_levels() {
        let mut out = OStream::new(Cursor::new(Vec::new())).unwrap();
        let err = write_stream(&mut out, &[], &DAffine3::IDENTITY, &DemWriterOptions::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidStructure(_)));

        let unordered = [
            level(4, 2.0, Albedo::default()),
            level(4, 1.0, Albedo::default()),
        ];
        let err = write_stream(&mut out, &unordered, &DAffine3::IDENTITY, &DemWriterOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidStructure(_)));
    }

    #[test]
    fn test_header_validation() {
        let mut header = PyramidHeader::from_levels(
            &[level(4, 1.0, Albedo::default())],
            &DAffine3::IDENTITY,
            &DemWriterOptions::default(),
        );
        assert!(header.validate(100, 200).is_err());
        header.offsets = vec![100];
        assert!(header.validate(100, 200).is_ok());
        assert!(header.validate(100, 100).is_err());

        header.gsds = vec![1.0, 1.0];
        header.offsets = vec![100, 150];
        assert!(header.validate(100, 200).is_err());
    }

    #[test]
    fn test_fallback_albedo() {
        let options = DemReaderOptions::default().with_albedo_profile(Spectral([1.0, 0.5, 0.0]));
        assert_eq!(options.fallback_albedo(), Albedo::Constant(Spectral([0.06, 0.03, 0.0])));
    }

    #[test]
    fn test_temp_path() {
        assert_eq!(temp_path(Path::new("/a/b/moon.qld")), PathBuf::from("/a/b/moon.qld.partial"));
    }
}
