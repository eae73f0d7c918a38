//! Quipu output stream.
//!
//! Every `write_*` returns the number of bytes it emitted so callers can size
//! the records they produce (the pyramid writer uses this to build its level
//! offset table without re-reading the file).

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use super::format::*;
use crate::core::compress_block;
use crate::util::{ClassId, DAffine3, Decomposed, Error, Image, QuipuPod, Resolution, Result};

/// Output stream for writing Quipu data.
pub struct OStream<W: Write + Seek = BufWriter<File>> {
    writer: W,
    pos: u64,
}

impl OStream<BufWriter<File>> {
    /// Create (or truncate) a file for writing.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Self::new(BufWriter::with_capacity(2 * 1024 * 1024, file)) // 2MB buffer
    }
}

impl<W: Write + Seek> OStream<W> {
    /// Wrap an arbitrary writer, starting at its current position.
    pub fn new(mut writer: W) -> Result<Self> {
        let pos = writer.stream_position()?;
        Ok(Self { writer, pos })
    }

    /// Get the current write position.
    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Write bytes and advance position.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<u64> {
        self.writer.write_all(data)?;
        self.pos += data.len() as u64;
        Ok(data.len() as u64)
    }

    /// Write the file identifier.
    pub fn write_magic(&mut self) -> Result<u64> {
        self.write_bytes(QUIPU_MAGIC)
    }

    pub fn write_u8(&mut self, value: u8) -> Result<u64> {
        self.writer.write_u8(value)?;
        self.pos += 1;
        Ok(1)
    }

    pub fn write_u16(&mut self, value: u16) -> Result<u64> {
        self.writer.write_u16::<LittleEndian>(value)?;
        self.pos += 2;
        Ok(2)
    }

    pub fn write_u32(&mut self, value: u32) -> Result<u64> {
        self.writer.write_u32::<LittleEndian>(value)?;
        self.pos += 4;
        Ok(4)
    }

    pub fn write_u64(&mut self, value: u64) -> Result<u64> {
        self.writer.write_u64::<LittleEndian>(value)?;
        self.pos += 8;
        Ok(8)
    }

    pub fn write_f64(&mut self, value: f64) -> Result<u64> {
        self.writer.write_f64::<LittleEndian>(value)?;
        self.pos += 8;
        Ok(8)
    }

    pub fn write_bool(&mut self, value: bool) -> Result<u64> {
        self.write_u8(value as u8)
    }

    /// Raw fixed-width copy of a scalar, no tag.
    pub fn write_value<T: QuipuPod>(&mut self, value: T) -> Result<u64> {
        self.write_bytes(bytemuck::bytes_of(&value))
    }

    /// Element count (u32), byte length (u32), then the raw elements.
    pub fn write_vector<T: QuipuPod>(&mut self, values: &[T]) -> Result<u64> {
        let bytes: &[u8] = bytemuck::cast_slice(values);
        Error::check_len(values.len(), u32::MAX as u64)?;
        Error::check_len(bytes.len(), u32::MAX as u64)?;

        let mut written = self.write_u32(values.len() as u32)?;
        written += self.write_u32(bytes.len() as u32)?;
        written += self.write_bytes(bytes)?;
        Ok(written)
    }

    /// Length (u32) and raw UTF-8 bytes, no terminator.
    pub fn write_string(&mut self, s: &str) -> Result<u64> {
        Error::check_len(s.len(), u32::MAX as u64)?;
        let written = self.write_u32(s.len() as u32)?;
        Ok(written + self.write_bytes(s.as_bytes())?)
    }

    pub fn write_class_id(&mut self, class_id: ClassId) -> Result<u64> {
        self.write_u16(class_id.as_u16())
    }

    pub fn write_resolution(&mut self, resolution: Resolution) -> Result<u64> {
        let written = self.write_u32(resolution.width)?;
        Ok(written + self.write_u32(resolution.height)?)
    }

    /// Tag of `T` followed by the raw value.
    pub fn write_typed_value<T: QuipuPod>(&mut self, value: T) -> Result<u64> {
        let written = self.write_class_id(T::CLASS_ID)?;
        Ok(written + self.write_value(value)?)
    }

    /// Tag, dimension byte, then `N` values.
    pub fn write_vec<T: QuipuPod, const N: usize>(&mut self, v: &[T; N]) -> Result<u64> {
        Error::check_len(N, u8::MAX as u64)?;
        let mut written = self.write_class_id(T::CLASS_ID)?;
        written += self.write_u8(N as u8)?;
        written += self.write_bytes(bytemuck::cast_slice(v.as_slice()))?;
        Ok(written)
    }

    /// Tag, column count, row count, then the values column by column.
    pub fn write_mat<T: QuipuPod, const C: usize, const R: usize>(
        &mut self,
        m: &[[T; R]; C],
    ) -> Result<u64> {
        Error::check_len(C, u8::MAX as u64)?;
        Error::check_len(R, u8::MAX as u64)?;
        let mut written = self.write_class_id(T::CLASS_ID)?;
        written += self.write_u8(C as u8)?;
        written += self.write_u8(R as u8)?;
        for col in m {
            written += self.write_bytes(bytemuck::cast_slice(col.as_slice()))?;
        }
        Ok(written)
    }

    /// Position, 3x3 rotation and scale, each as its own record.
    pub fn write_transformation(&mut self, t: &DAffine3) -> Result<u64> {
        let d = Decomposed::from_affine(t);
        let mut written = self.write_vec(&d.position.to_array())?;
        written += self.write_mat(&d.rotation.to_cols_array_2d())?;
        written += self.write_vec(&d.scale.to_array())?;
        Ok(written)
    }

    /// Compress `data` into one block and write it behind a u64 length.
    pub fn compress_data(&mut self, data: &[u8]) -> Result<u64> {
        let block = compress_block(data)?;
        let written = self.write_u64(block.len() as u64)?;
        Ok(written + self.write_bytes(&block)?)
    }

    /// Tag, resolution, compressed flag, then the pixels.
    ///
    /// Uncompressed pixels are written one by one, rows outer and columns
    /// inner, which is byte-identical to the contiguous buffer the
    /// compressed path hands to the block compressor.
    pub fn write_image<T: QuipuPod>(&mut self, image: &Image<T>, compressed: bool) -> Result<u64> {
        let mut written = self.write_class_id(T::CLASS_ID)?;
        written += self.write_resolution(image.resolution())?;

        if compressed {
            written += self.write_u8(COMPRESSED_FLAG)?;
            written += self.compress_data(bytemuck::cast_slice(image.data()))?;
        } else {
            written += self.write_u8(RAW_FLAG)?;
            for y in 0..image.height() {
                for x in 0..image.width() {
                    written += self.write_value(image.get(x, y))?;
                }
            }
        }
        Ok(written)
    }

    /// Seek to an absolute position.
    pub fn seek(&mut self, pos: u64) -> Result<u64> {
        self.writer.flush()?;
        let new_pos = self.writer.seek(SeekFrom::Start(pos))?;
        self.pos = new_pos;
        Ok(new_pos)
    }

    /// Seek to end and return the position.
    pub fn seek_end(&mut self) -> Result<u64> {
        self.writer.flush()?;
        let new_pos = self.writer.seek(SeekFrom::End(0))?;
        self.pos = new_pos;
        Ok(new_pos)
    }

    /// Flush the buffer to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn stream() -> OStream<Cursor<Vec<u8>>> {
        OStream::new(Cursor::new(Vec::new())).unwrap()
    }

    #[test]
    fn test_record_sizes() {
        let mut s = stream();
        assert_eq!(s.write_magic().unwrap(), 5);
        assert_eq!(s.write_typed_value(1.5f64).unwrap(), 2 + 8);
        assert_eq!(s.write_vec(&[1.0f32, 2.0, 3.0]).unwrap(), 2 + 1 + 12);
        assert_eq!(s.write_mat(&[[0.0f64; 2]; 3]).unwrap(), 2 + 2 + 48);
        assert_eq!(s.write_vector(&[1u16, 2, 3]).unwrap(), 4 + 4 + 6);
        assert_eq!(s.write_string("abc").unwrap(), 4 + 3);
        assert_eq!(s.pos(), 5 + 10 + 15 + 52 + 14 + 7);
    }

    #[test]
    fn test_transformation_size() {
        let mut s = stream();
        let n = s.write_transformation(&DAffine3::IDENTITY).unwrap();
        // vec3 + mat3 + vec3, all f64
        assert_eq!(n, (3 + 24) + (4 + 72) + (3 + 24));
    }

    #[test]
    fn test_raw_image_layout() {
        let img = Image::from_fn(Resolution::new(3, 2), |x, y| (y * 3 + x) as u8);
        let mut s = stream();
        s.write_image(&img, false).unwrap();
        let bytes = s.into_inner().unwrap().into_inner();

        // tag, width, height, flag, then row-major pixels
        assert_eq!(&bytes[0..2], &ClassId::Uint8.as_u16().to_le_bytes());
        assert_eq!(&bytes[2..6], &3u32.to_le_bytes());
        assert_eq!(&bytes[6..10], &2u32.to_le_bytes());
        assert_eq!(bytes[10], RAW_FLAG);
        assert_eq!(&bytes[11..], &[0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_seek_back_overwrites() {
        let mut s = stream();
        s.write_u64(0).unwrap();
        s.write_u64(7).unwrap();
        s.seek(0).unwrap();
        s.write_u64(42).unwrap();
        assert_eq!(s.seek_end().unwrap(), 16);
        let bytes = s.into_inner().unwrap().into_inner();
        assert_eq!(&bytes[0..8], &42u64.to_le_bytes());
        assert_eq!(&bytes[8..16], &7u64.to_le_bytes());
    }
}
