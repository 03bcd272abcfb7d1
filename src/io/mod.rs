//! Reading and saving of medical image files.
//!
//! The format is picked from the file name: `.nii`, `.gipl`, `.nrrd` and
//! `.png`, each optionally followed by `.gz`. Volumes come back as
//! [`ArrayD<f32>`] in the axis order of the file (`x, y, z` for the volume
//! formats, `rows, columns[, channels]` for PNG) together with the format
//! header, which can be handed back to [`save_file`] unchanged.

pub mod gipl;
pub mod nii;
pub mod nrrd;
pub mod png;

use crate::enums::{Endian, Format, ScalarType};
use crate::error::{Error, Result};

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use log::{debug, info, warn};
use ndarray::{ArrayD, ArrayViewD, IxDyn, ShapeBuilder};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub use gipl::GiplHeader;
pub use nrrd::NrrdHeader;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Format specific metadata, carried from [`read_file`] to [`save_file`].
#[derive(Debug, Clone)]
pub enum Header {
    Nifti(Box<::nifti::NiftiHeader>),
    Gipl(GiplHeader),
    Nrrd(NrrdHeader),
}

impl Header {
    pub fn format(&self) -> Format {
        match self {
            Header::Nifti(_) => Format::Nifti,
            Header::Gipl(_) => Format::Gipl,
            Header::Nrrd(_) => Format::Nrrd,
        }
    }

    /// Voxel size along each array axis, if the header records one.
    pub fn spacing(&self) -> Option<Vec<f32>> {
        match self {
            Header::Nifti(header) => {
                let ndim = usize::from(header.dim[0]).clamp(1, 7);
                Some(header.pixdim[1..=ndim].iter().map(|v| v.abs()).collect())
            }
            Header::Gipl(header) => Some(header.spacing()),
            Header::Nrrd(header) => header.spacing(),
        }
    }
}

/// Read a medical image file and its header.
///
/// # Errors
///
/// Returns [`Error::UnsupportedFormat`] for unknown extensions and a format
/// specific error when the file cannot be parsed.
pub fn read_file(path: impl AsRef<Path>) -> Result<(ArrayD<f32>, Option<Header>)> {
    let path = path.as_ref();
    info!("Reading: {}", path.display());
    read_any(path)
}

/// Save `data` to `path`, reusing `header` when it matches the target format.
///
/// A trailing `.gz` writes the plain file first and then gzip-compresses it
/// in place of the requested name.
pub fn save_file(
    path: impl AsRef<Path>,
    data: ArrayViewD<'_, f32>,
    header: Option<&Header>,
) -> Result<()> {
    let path = path.as_ref();
    info!("Saving: {}", path.display());
    save_any(path, data, header)
}

pub(crate) fn read_any(path: &Path) -> Result<(ArrayD<f32>, Option<Header>)> {
    debug!("reading {}", path.display());
    let format = Format::from_path(path).ok_or_else(|| Error::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;

    match format {
        Format::Nifti => {
            let (data, header) = nii::read(path)?;
            Ok((data, Some(Header::Nifti(Box::new(header)))))
        }
        Format::Gipl => {
            let (data, header) = gipl::read(path)?;
            Ok((data, Some(Header::Gipl(header))))
        }
        Format::Nrrd => {
            let (data, header) = nrrd::read(path)?;
            Ok((data, Some(Header::Nrrd(header))))
        }
        Format::Png => Ok((png::read(path)?, None)),
    }
}

pub(crate) fn save_any(
    path: &Path,
    data: ArrayViewD<'_, f32>,
    header: Option<&Header>,
) -> Result<()> {
    debug!("saving {}", path.display());
    let format = Format::from_path(path).ok_or_else(|| Error::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;

    let header = match header {
        Some(header) if header.format() != format => {
            warn!(
                "ignoring {:?} header while saving {} as {:?}",
                header.format(),
                path.display(),
                format
            );
            None
        }
        header => header,
    };

    let (target, compress) = match strip_gz(path) {
        Some(target) => (target, true),
        None => (path.to_path_buf(), false),
    };

    match (format, header) {
        (Format::Png, _) => png::write(&target, data)?,
        (Format::Nifti, Some(Header::Nifti(header))) => {
            nii::write(&target, data, Some(header.as_ref()))?
        }
        (Format::Nifti, _) => nii::write(&target, data, None)?,
        (Format::Gipl, Some(Header::Gipl(header))) => gipl::write(&target, data, Some(header))?,
        (Format::Gipl, _) => gipl::write(&target, data, None)?,
        (Format::Nrrd, Some(Header::Nrrd(header))) => nrrd::write(&target, data, Some(header))?,
        (Format::Nrrd, _) => nrrd::write(&target, data, None)?,
    }

    if compress {
        gzip_file(&target, path)?;
    }
    Ok(())
}

fn strip_gz(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    if name.len() > 3 && name.to_ascii_lowercase().ends_with(".gz") {
        Some(path.with_file_name(&name[..name.len() - 3]))
    } else {
        None
    }
}

/// Compress `source` into `destination` and remove `source`.
fn gzip_file(source: &Path, destination: &Path) -> Result<()> {
    let mut input = BufReader::new(File::open(source)?);
    let output = BufWriter::new(File::create(destination)?);
    let mut encoder = GzEncoder::new(output, Compression::default());
    std::io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.flush()?;
    fs::remove_file(source)?;
    Ok(())
}

/// Read a whole file, transparently inflating gzip content.
pub(crate) fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    let raw = fs::read(path)?;
    if raw.starts_with(&GZIP_MAGIC) {
        gunzip(&raw)
    } else {
        Ok(raw)
    }
}

pub(crate) fn gunzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut inflated = Vec::new();
    MultiGzDecoder::new(bytes).read_to_end(&mut inflated)?;
    Ok(inflated)
}

/// Sample count and byte length of a payload shaped `shape`, or a header
/// error when either does not fit in `usize`.
pub(crate) fn payload_size(
    path: &Path,
    shape: &[usize],
    scalar: ScalarType,
) -> Result<(usize, usize)> {
    shape
        .iter()
        .try_fold(1usize, |count, &len| count.checked_mul(len))
        .and_then(|count| Some((count, count.checked_mul(scalar.size())?)))
        .ok_or_else(|| Error::header(path, format!("sizes {shape:?} overflow")))
}

fn to_array<const N: usize>(chunk: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(chunk);
    out
}

/// Decode a packed sample buffer into `f32` values.
pub(crate) fn decode_samples(bytes: &[u8], scalar: ScalarType, endian: Endian) -> Vec<f32> {
    macro_rules! decode {
        ($t:ty) => {
            bytes
                .chunks_exact(std::mem::size_of::<$t>())
                .map(|chunk| {
                    let raw = to_array(chunk);
                    let value = match endian {
                        Endian::Little => <$t>::from_le_bytes(raw),
                        Endian::Big => <$t>::from_be_bytes(raw),
                    };
                    value as f32
                })
                .collect()
        };
    }

    match scalar {
        ScalarType::I8 => decode!(i8),
        ScalarType::U8 => decode!(u8),
        ScalarType::I16 => decode!(i16),
        ScalarType::U16 => decode!(u16),
        ScalarType::I32 => decode!(i32),
        ScalarType::U32 => decode!(u32),
        ScalarType::I64 => decode!(i64),
        ScalarType::U64 => decode!(u64),
        ScalarType::F32 => decode!(f32),
        ScalarType::F64 => decode!(f64),
    }
}

pub(crate) fn encode_f32<'a>(values: impl Iterator<Item = &'a f32>, endian: Endian) -> Vec<u8> {
    values
        .flat_map(|value| match endian {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        })
        .collect()
}

/// Build an array from samples stored with the first axis varying fastest.
pub(crate) fn from_fortran_order(shape: &[usize], values: Vec<f32>) -> Result<ArrayD<f32>> {
    let array = ArrayD::from_shape_vec(IxDyn(shape).f(), values)?;
    Ok(array.as_standard_layout().into_owned())
}

/// Samples of `data` with the first axis varying fastest.
pub(crate) fn fortran_order_iter<'a>(
    data: &'a ArrayViewD<'_, f32>,
) -> impl Iterator<Item = &'a f32> {
    data.t().into_iter()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, Axis};

    #[test]
    fn decodes_big_endian_samples() {
        let bytes = [0x01, 0x00, 0xff, 0xff];
        assert_eq!(decode_samples(&bytes, ScalarType::I16, Endian::Big), vec![256.0, -1.0]);
        assert_eq!(decode_samples(&bytes, ScalarType::U16, Endian::Little), vec![1.0, 65535.0]);
    }

    #[test]
    fn fortran_order_roundtrip_keeps_indexing() {
        let data =
            Array3::from_shape_fn((2, 3, 4), |(x, y, z)| (x + 10 * y + 100 * z) as f32).into_dyn();
        let view = data.view();
        let flat: Vec<f32> = fortran_order_iter(&view).copied().collect();
        assert_eq!(&flat[..3], &[0.0, 1.0, 10.0]);

        let rebuilt = from_fortran_order(data.shape(), flat).unwrap();
        assert_eq!(rebuilt, data);
        assert_eq!(rebuilt.index_axis(Axis(2), 1)[[1, 2]], 121.0);
    }

    #[test]
    fn payload_size_rejects_overflowing_shapes() {
        let path = Path::new("scan.nrrd");
        assert_eq!(payload_size(path, &[4, 3, 2], ScalarType::F64).unwrap(), (24, 192));
        assert!(matches!(
            payload_size(path, &[1 << 32, 1 << 32], ScalarType::U8),
            Err(Error::Header { .. })
        ));
        assert!(matches!(
            payload_size(path, &[usize::MAX / 4], ScalarType::F64),
            Err(Error::Header { .. })
        ));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = read_file("scan.mha").unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { .. }));
    }

    #[test]
    fn gz_suffix_writes_compressed_file_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volume.nrrd.gz");
        let data =
            Array3::from_shape_fn((3, 2, 2), |(x, y, z)| (x * 4 + y * 2 + z) as f32).into_dyn();

        save_file(&path, data.view(), None).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("volume.nrrd").exists());
        assert!(fs::read(&path).unwrap().starts_with(&GZIP_MAGIC));

        let (loaded, header) = read_file(&path).unwrap();
        assert_eq!(loaded, data);
        assert!(matches!(header, Some(Header::Nrrd(_))));
    }
}
