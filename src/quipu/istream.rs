//! Quipu input stream.
//!
//! [`IStream::open`] validates the file before anything else is parsed; every
//! other reader assumes it is positioned at the start of the record it reads.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};

use super::format::*;
use crate::core::{decompress_block, IoCounter};
use crate::util::{
    decode_slice, ClassId, DAffine3, DMat3, DVec3, Decomposed, Error, Image, QuipuPod, Resolution,
    Result, Scalar,
};

/// Input stream for reading Quipu data.
pub struct IStream<R: Read + Seek = BufReader<File>> {
    reader: R,
    pos: u64,
    len: u64,
}

impl IStream<BufReader<File>> {
    /// Open and validate a Quipu file, leaving the stream just past the magic.
    ///
    /// Fails with `FileNotFound` if nothing exists at `path`, `NotAFile` if it
    /// is a directory and `BadMagic` if the leading bytes are not the Quipu
    /// identifier.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_counted(path, None)
    }

    /// Like [`IStream::open`], recording the open in `counter`.
    pub fn open_counted(path: impl AsRef<Path>, counter: Option<&IoCounter>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;
        if !metadata.is_file() {
            return Err(Error::NotAFile(path.to_path_buf()));
        }

        let file = File::open(path)?;
        if let Some(counter) = counter {
            counter.record_open();
        }

        let mut stream = Self::new(BufReader::new(file))?;
        stream.validate_magic()?;
        Ok(stream)
    }
}

impl<R: Read + Seek> IStream<R> {
    /// Wrap an arbitrary reader, starting at its current position. Does not
    /// validate anything.
    pub fn new(mut reader: R) -> Result<Self> {
        let pos = reader.stream_position()?;
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(pos))?;
        Ok(Self { reader, pos, len })
    }

    /// Check the magic at offset 0 and leave the stream right after it.
    pub fn validate_magic(&mut self) -> Result<()> {
        if self.len < MAGIC_SIZE as u64 {
            return Err(Error::BadMagic);
        }
        self.seek(0)?;
        let mut magic = [0u8; MAGIC_SIZE];
        self.read_into(&mut magic)?;
        if &magic != QUIPU_MAGIC {
            return Err(Error::BadMagic);
        }
        Ok(())
    }

    /// Get the current read position.
    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Get the total stream length.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Seek to an absolute position.
    pub fn seek(&mut self, pos: u64) -> Result<u64> {
        if pos > self.len {
            return Err(Error::invalid(format!(
                "seek to {} past end of stream ({})",
                pos, self.len
            )));
        }
        self.pos = self.reader.seek(SeekFrom::Start(pos))?;
        Ok(self.pos)
    }

    /// Advance past `n` bytes without reading them.
    pub fn skip(&mut self, n: u64) -> Result<u64> {
        let target = self.pos.checked_add(n).ok_or(Error::StreamSizeOverflow {
            len: n,
            max: u64::MAX - self.pos,
        })?;
        self.seek(target)
    }

    /// Fail unless `n` more bytes remain.
    pub fn ensure_available(&self, n: u64) -> Result<()> {
        if self.pos.saturating_add(n) > self.len {
            return Err(Error::invalid(format!(
                "record of {} bytes at {} runs past end of stream ({})",
                n, self.pos, self.len
            )));
        }
        Ok(())
    }

    /// Fill `buf` from the stream.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        self.ensure_available(buf.len() as u64)?;
        self.reader.read_exact(buf)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    /// Read `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        self.ensure_available(len as u64)?;
        let mut buf = vec![0u8; len];
        self.read_into(&mut buf)?;
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure_available(1)?;
        let v = self.reader.read_u8()?;
        self.pos += 1;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.ensure_available(2)?;
        let v = self.reader.read_u16::<LittleEndian>()?;
        self.pos += 2;
        Ok(v)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.ensure_available(4)?;
        let v = self.reader.read_u32::<LittleEndian>()?;
        self.pos += 4;
        Ok(v)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.ensure_available(8)?;
        let v = self.reader.read_u64::<LittleEndian>()?;
        self.pos += 8;
        Ok(v)
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        self.ensure_available(8)?;
        let v = self.reader.read_f64::<LittleEndian>()?;
        self.pos += 8;
        Ok(v)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Raw fixed-width copy of a scalar, no tag.
    pub fn read_value<T: QuipuPod>(&mut self) -> Result<T> {
        let mut value: T = bytemuck::Zeroable::zeroed();
        self.read_into(bytemuck::bytes_of_mut(&mut value))?;
        Ok(value)
    }

    /// Counterpart of `OStream::write_vector`. The element type is trusted;
    /// only the redundant byte length is cross-checked.
    pub fn read_vector<T: QuipuPod>(&mut self) -> Result<Vec<T>> {
        let count = self.read_u32()? as usize;
        let byte_len = self.read_u32()? as usize;
        if count * std::mem::size_of::<T>() != byte_len {
            return Err(Error::invalid(format!(
                "vector of {} elements declares {} bytes",
                count, byte_len
            )));
        }
        let bytes = self.read_bytes(byte_len)?;
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        Ok(String::from_utf8(bytes)?)
    }

    /// Read a tag, failing with `UnsupportedClassId` if it is unregistered.
    pub fn read_class_id(&mut self) -> Result<ClassId> {
        ClassId::try_from_u16(self.read_u16()?)
    }

    pub fn read_resolution(&mut self) -> Result<Resolution> {
        let width = self.read_u32()?;
        let height = self.read_u32()?;
        Ok(Resolution::new(width, height))
    }

    /// Read one element at the native width of `class_id`.
    pub fn read_scalar(&mut self, class_id: ClassId) -> Result<Scalar> {
        let mut buf = [0u8; 8];
        let buf = &mut buf[..class_id.num_bytes()];
        self.read_into(buf)?;
        Ok(Scalar::decode(class_id, buf))
    }

    /// Read a tag and value, converting into `T` whatever width was stored.
    pub fn read_typed_value<T: QuipuPod>(&mut self) -> Result<T> {
        let class_id = self.read_class_id()?;
        Ok(self.read_scalar(class_id)?.to())
    }

    fn read_elements<T: QuipuPod>(&mut self, class_id: ClassId, count: usize) -> Result<Vec<T>> {
        let bytes = self.read_bytes(count * class_id.num_bytes())?;
        decode_slice(class_id, &bytes)
    }

    /// Counterpart of `OStream::write_vec`; the stored dimension must be `N`.
    pub fn read_vec<T: QuipuPod, const N: usize>(&mut self) -> Result<[T; N]> {
        let class_id = self.read_class_id()?;
        let n = self.read_u8()? as usize;
        if n != N {
            return Err(Error::dimension_mismatch(
                format!("vec{}", N),
                format!("vec{}", n),
            ));
        }
        let values = self.read_elements::<T>(class_id, N)?;
        let mut out = [T::default(); N];
        out.copy_from_slice(&values);
        Ok(out)
    }

    /// Counterpart of `OStream::write_mat`; the stored shape must be
    /// `COLS x ROWS`.
    pub fn read_mat<T: QuipuPod, const COLS: usize, const ROWS: usize>(
        &mut self,
    ) -> Result<[[T; ROWS]; COLS]> {
        let class_id = self.read_class_id()?;
        let c = self.read_u8()? as usize;
        let r = self.read_u8()? as usize;
        if c != COLS || r != ROWS {
            return Err(Error::dimension_mismatch(
                format!("mat{}x{}", COLS, ROWS),
                format!("mat{}x{}", c, r),
            ));
        }
        let values = self.read_elements::<T>(class_id, COLS * ROWS)?;
        let mut out = [[T::default(); ROWS]; COLS];
        for (col, chunk) in out.iter_mut().zip(values.chunks_exact(ROWS)) {
            col.copy_from_slice(chunk);
        }
        Ok(out)
    }

    pub fn read_transformation(&mut self) -> Result<DAffine3> {
        let position = DVec3::from_array(self.read_vec::<f64, 3>()?);
        let rotation = DMat3::from_cols_array_2d(&self.read_mat::<f64, 3, 3>()?);
        let scale = DVec3::from_array(self.read_vec::<f64, 3>()?);
        Ok(Decomposed {
            position,
            rotation,
            scale,
        }
        .to_affine())
    }

    /// Read a length-prefixed block and inflate it to `expected_len` bytes.
    pub fn decompress_data(&mut self, expected_len: usize) -> Result<Vec<u8>> {
        let block_len = self.read_u64()?;
        let block = self.read_bytes(usize::try_from(block_len).map_err(|_| {
            Error::StreamSizeOverflow {
                len: block_len,
                max: usize::MAX as u64,
            }
        })?)?;
        decompress_block(&block, expected_len)
    }

    /// Counterpart of `OStream::write_image`, also returning the stored tag.
    pub fn read_image_tagged<T: QuipuPod>(&mut self) -> Result<(Image<T>, ClassId)> {
        let class_id = self.read_class_id()?;
        let resolution = self.read_resolution()?;
        let flag = self.read_u8()?;

        let byte_len = image_byte_len(resolution, class_id)?;
        let byte_len = usize::try_from(byte_len).map_err(|_| Error::StreamSizeOverflow {
            len: byte_len,
            max: usize::MAX as u64,
        })?;
        let bytes = match flag {
            COMPRESSED_FLAG => self.decompress_data(byte_len)?,
            RAW_FLAG => self.read_bytes(byte_len)?,
            other => {
                return Err(Error::invalid(format!("bad image compression flag {:#x}", other)))
            }
        };

        let pixels = decode_slice::<T>(class_id, &bytes)?;
        let image = Image::from_vec(resolution, pixels)
            .ok_or_else(|| Error::invalid("image pixel count does not match resolution"))?;
        Ok((image, class_id))
    }

    /// Counterpart of `OStream::write_image`, converting pixels into `T`.
    pub fn read_image<T: QuipuPod>(&mut self) -> Result<Image<T>> {
        Ok(self.read_image_tagged()?.0)
    }

    // === Skip helpers ===

    pub fn skip_vector(&mut self) -> Result<()> {
        let _count = self.read_u32()?;
        let byte_len = self.read_u32()?;
        self.skip(byte_len as u64)?;
        Ok(())
    }

    pub fn skip_string(&mut self) -> Result<()> {
        let len = self.read_u32()?;
        self.skip(len as u64)?;
        Ok(())
    }

    pub fn skip_typed_value(&mut self) -> Result<()> {
        let class_id = self.read_class_id()?;
        self.skip(class_id.num_bytes() as u64)?;
        Ok(())
    }

    /// Skip a vec record of any shape, using the stored tag's width.
    pub fn skip_vec(&mut self) -> Result<()> {
        let class_id = self.read_class_id()?;
        let n = self.read_u8()? as u64;
        self.skip(n * class_id.num_bytes() as u64)?;
        Ok(())
    }

    /// Skip a matrix record of any shape, using the stored tag's width.
    pub fn skip_mat(&mut self) -> Result<()> {
        let class_id = self.read_class_id()?;
        let c = self.read_u8()? as u64;
        let r = self.read_u8()? as u64;
        self.skip(c * r * class_id.num_bytes() as u64)?;
        Ok(())
    }

    /// Skip a vec record that must be a float64 3-vector.
    pub fn skip_vec3d(&mut self) -> Result<()> {
        let class_id = self.read_class_id()?;
        let n = self.read_u8()?;
        if class_id != ClassId::Float64 || n != 3 {
            return Err(Error::dimension_mismatch(
                "float64[3]",
                format!("{}[{}]", class_id, n),
            ));
        }
        self.skip(3 * 8)?;
        Ok(())
    }

    /// Skip a matrix record that must be a float64 3x3.
    pub fn skip_mat3d(&mut self) -> Result<()> {
        let class_id = self.read_class_id()?;
        let c = self.read_u8()?;
        let r = self.read_u8()?;
        if class_id != ClassId::Float64 || c != 3 || r != 3 {
            return Err(Error::dimension_mismatch(
                "float64[3x3]",
                format!("{}[{}x{}]", class_id, c, r),
            ));
        }
        self.skip(9 * 8)?;
        Ok(())
    }

    /// Skip a transformation without materializing it.
    pub fn skip_transformation(&mut self) -> Result<()> {
        self.skip_vec()?;
        self.skip_mat()?;
        self.skip_vec()
    }

    /// Skip an image record, compressed or not.
    pub fn skip_image(&mut self) -> Result<()> {
        let class_id = self.read_class_id()?;
        let resolution = self.read_resolution()?;
        match self.read_u8()? {
            COMPRESSED_FLAG => {
                let block_len = self.read_u64()?;
                self.skip(block_len)?;
            }
            RAW_FLAG => {
                self.skip(image_byte_len(resolution, class_id)?)?;
            }
            other => {
                return Err(Error::invalid(format!("bad image compression flag {:#x}", other)))
            }
        }
        Ok(())
    }
}

/// Payload size of a raw image, checked against overflow since both factors
/// come from the file.
fn image_byte_len(resolution: Resolution, class_id: ClassId) -> Result<u64> {
    let pixels = resolution.width as u64 * resolution.height as u64;
    let width = class_id.num_bytes() as u64;
    pixels.checked_mul(width).ok_or(Error::StreamSizeOverflow {
        len: pixels,
        max: u64::MAX / width,
    })
}
