//! Integration tests for the Quipu stream codec against real files.

use std::io::Write;

use quipu::core::{compress_block, decompress_block};
use quipu::quipu::{IStream, OStream, QUIPU_MAGIC};
use quipu::util::{DAffine3, DQuat, DVec3, Error, QuipuPod};

use tempfile::{tempdir, NamedTempFile};

fn write_file(path: &std::path::Path, f: impl FnOnce(&mut OStream)) {
    let mut out = OStream::create(path).expect("Failed to create stream");
    out.write_magic().unwrap();
    f(&mut out);
    out.flush().unwrap();
}

#[test]
fn test_open_missing_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing.qld");
    match IStream::open(&path) {
        Err(Error::FileNotFound(p)) => assert_eq!(p, path),
        other => panic!("expected FileNotFound, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_open_directory() {
    let dir = tempdir().unwrap();
    assert!(matches!(IStream::open(dir.path()), Err(Error::NotAFile(_))));
}

#[test]
fn test_open_bad_magic() {
    let mut temp = NamedTempFile::new().unwrap();
    temp.write_all(b"QUIPX\x01\x00\x00\x00").unwrap();
    temp.flush().unwrap();
    assert!(matches!(IStream::open(temp.path()), Err(Error::BadMagic)));

    let mut short = NamedTempFile::new().unwrap();
    short.write_all(&QUIPU_MAGIC[..3]).unwrap();
    short.flush().unwrap();
    assert!(matches!(IStream::open(short.path()), Err(Error::BadMagic)));
}

#[test]
fn test_typed_values_cross_width() {
    let temp = NamedTempFile::new().unwrap();
    write_file(temp.path(), |out| {
        out.write_typed_value(0.1f64).unwrap();
        out.write_typed_value(1.5e-3f32).unwrap();
        out.write_typed_value(-7i16).unwrap();
        out.write_typed_value(u64::MAX).unwrap();
    });

    let mut s = IStream::open(temp.path()).unwrap();
    assert_eq!(s.read_typed_value::<f32>().unwrap(), 0.1f64 as f32);
    assert_eq!(s.read_typed_value::<f64>().unwrap(), 1.5e-3f32 as f64);
    assert_eq!(s.read_typed_value::<i64>().unwrap(), -7);
    assert_eq!(s.read_typed_value::<u64>().unwrap(), u64::MAX);
    assert_eq!(s.pos(), s.len());
}

fn vec_values<T: QuipuPod, const N: usize>(f: impl Fn(f64) -> T) -> [T; N] {
    std::array::from_fn(|i| f(i as f64 * 1.25 + 0.1))
}

fn mat_values<T: QuipuPod, const C: usize, const R: usize>(f: impl Fn(f64) -> T) -> [[T; R]; C] {
    std::array::from_fn(|c| std::array::from_fn(|r| f((c * R + r) as f64 * -0.3 + 2.0)))
}

fn check_vec<const N: usize>() {
    let v64: [f64; N] = vec_values(|x| x);
    let v32: [f32; N] = vec_values(|x| x as f32);

    let temp = NamedTempFile::new().unwrap();
    write_file(temp.path(), |out| {
        out.write_vec(&v64).unwrap();
        out.write_vec(&v32).unwrap();
    });

    let mut s = IStream::open(temp.path()).unwrap();
    assert_eq!(s.read_vec::<f64, N>().unwrap(), v64);
    assert_eq!(s.read_vec::<f32, N>().unwrap(), v32);

    s.seek(QUIPU_MAGIC.len() as u64).unwrap();
    let narrowed = s.read_vec::<f32, N>().unwrap();
    let widened = s.read_vec::<f64, N>().unwrap();
    for i in 0..N {
        assert!((narrowed[i] as f64 - v64[i]).abs() <= v64[i].abs() * f32::EPSILON as f64);
        assert_eq!(widened[i], v32[i] as f64);
    }
}

fn check_mat<const C: usize, const R: usize>() {
    let m64: [[f64; R]; C] = mat_values(|x| x);
    let m32: [[f32; R]; C] = mat_values(|x| x as f32);

    let temp = NamedTempFile::new().unwrap();
    write_file(temp.path(), |out| {
        out.write_mat(&m64).unwrap();
        out.write_mat(&m32).unwrap();
    });

    let mut s = IStream::open(temp.path()).unwrap();
    assert_eq!(s.read_mat::<f64, C, R>().unwrap(), m64);
    assert_eq!(s.read_mat::<f32, C, R>().unwrap(), m32);

    s.seek(QUIPU_MAGIC.len() as u64).unwrap();
    let narrowed = s.read_mat::<f32, C, R>().unwrap();
    let widened = s.read_mat::<f64, C, R>().unwrap();
    for c in 0..C {
        for r in 0..R {
            assert!((narrowed[c][r] as f64 - m64[c][r]).abs() <= m64[c][r].abs() * f32::EPSILON as f64);
            assert_eq!(widened[c][r], m32[c][r] as f64);
        }
    }
}

#[test]
fn test_vec_shapes() {
    check_vec::<1>();
    check_vec::<2>();
    check_vec::<3>();
    check_vec::<4>();
}

#[test]
fn test_mat_shapes() {
    check_mat::<1, 1>();
    check_mat::<2, 2>();
    check_mat::<3, 3>();
    check_mat::<4, 4>();
    check_mat::<2, 4>();
    check_mat::<4, 3>();
}

#[test]
fn test_vec_dimension_mismatch() {
    let temp = NamedTempFile::new().unwrap();
    write_file(temp.path(), |out| {
        out.write_vec(&[1.0f64, 2.0, 3.0]).unwrap();
        out.write_mat(&[[1.0f32; 3]; 3]).unwrap();
    });

    let mut s = IStream::open(temp.path()).unwrap();
    assert!(matches!(s.read_vec::<f64, 4>(), Err(Error::DimensionMismatch { .. })));

    let mut s = IStream::open(temp.path()).unwrap();
    s.skip_vec().unwrap();
    assert!(matches!(s.read_mat::<f32, 4, 4>(), Err(Error::DimensionMismatch { .. })));
}

#[test]
fn test_transformation_file_roundtrip() {
    let t = DAffine3::from_scale_rotation_translation(
        DVec3::new(1.0, 1.0, 2.0),
        DQuat::from_rotation_x(0.3) * DQuat::from_rotation_z(-1.1),
        DVec3::new(1737.4e3, -12.0, 5.5),
    );
    let temp = NamedTempFile::new().unwrap();
    write_file(temp.path(), |out| {
        out.write_transformation(&t).unwrap();
        out.write_string("after").unwrap();
    });

    let mut s = IStream::open(temp.path()).unwrap();
    assert!(s.read_transformation().unwrap().abs_diff_eq(t, 1e-9));
    assert_eq!(s.read_string().unwrap(), "after");

    s.seek(QUIPU_MAGIC.len() as u64).unwrap();
    s.skip_transformation().unwrap();
    assert_eq!(s.read_string().unwrap(), "after");
}

#[test]
fn test_compression_sizes() {
    for len in [0usize, 1, 17, 4096, 65_537, 3_000_000] {
        let data: Vec<u8> = (0..len).map(|i| ((i * 31) ^ (i >> 7)) as u8).collect();
        let block = compress_block(&data).unwrap();
        assert_eq!(decompress_block(&block, len).unwrap(), data, "length {}", len);
    }
}

#[test]
fn test_compressed_block_in_file() {
    let data: Vec<u8> = (0..2_500_000u32).flat_map(|i| (i % 1000).to_le_bytes()).collect();
    let temp = NamedTempFile::new().unwrap();
    write_file(temp.path(), |out| {
        out.compress_data(&data).unwrap();
        out.write_u32(0xC0FFEE).unwrap();
    });

    let mut s = IStream::open(temp.path()).unwrap();
    assert_eq!(s.decompress_data(data.len()).unwrap(), data);
    assert_eq!(s.read_u32().unwrap(), 0xC0FFEE);
}
