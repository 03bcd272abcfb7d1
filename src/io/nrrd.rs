//! NRRD volumes with attached data.
//!
//! Supports `raw`, `gzip` and `ascii` encodings of every scalar type except
//! `block`. Fields and `key:=value` pairs are kept verbatim so that a header
//! read here can be written back with new data.

use super::{
    decode_samples, encode_f32, fortran_order_iter, from_fortran_order, gunzip, payload_size,
    read_bytes,
};
use crate::enums::{Endian, ScalarType};
use crate::error::{Error, Result};

use flate2::Compression;
use flate2::write::GzEncoder;
use ndarray::{ArrayD, ArrayViewD};
use std::fs;
use std::io::Write;
use std::path::Path;

const MAGIC: &str = "NRRD000";

/// Fields rewritten from the array on save.
const MANAGED_FIELDS: [&str; 11] = [
    "type",
    "dimension",
    "sizes",
    "endian",
    "encoding",
    "data file",
    "datafile",
    "line skip",
    "lineskip",
    "byte skip",
    "byteskip",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NrrdHeader {
    /// `field: value` lines in file order.
    pub fields: Vec<(String, String)>,
    /// `key:=value` lines in file order.
    pub key_values: Vec<(String, String)>,
}

impl NrrdHeader {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn key_value(&self, key: &str) -> Option<&str> {
        self.key_values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn sizes(&self) -> Option<Vec<usize>> {
        self.field("sizes")?
            .split_whitespace()
            .map(|s| s.parse().ok())
            .collect()
    }

    /// Voxel size per axis from `spacings`, or from the lengths of the
    /// `space directions` vectors. Axes without spacing read as 1.
    pub fn spacing(&self) -> Option<Vec<f32>> {
        if let Some(spacings) = self.field("spacings") {
            return Some(
                spacings
                    .split_whitespace()
                    .map(|s| s.parse::<f32>().ok().filter(|v| v.is_finite()).unwrap_or(1.0))
                    .collect(),
            );
        }

        let directions = self.field("space directions")?;
        let mut spacing = Vec::new();
        let mut rest = directions.trim();
        while !rest.is_empty() {
            if let Some(tail) = rest.strip_prefix("none") {
                spacing.push(1.0);
                rest = tail.trim_start();
                continue;
            }
            let open = rest.find('(')?;
            let close = rest.find(')')?;
            let norm = rest[open + 1..close]
                .split(',')
                .map(|c| c.trim().parse::<f32>().ok())
                .collect::<Option<Vec<_>>>()?
                .iter()
                .map(|c| c * c)
                .sum::<f32>()
                .sqrt();
            spacing.push(norm);
            rest = rest[close + 1..].trim_start();
        }
        Some(spacing)
    }
}

fn scalar_type(name: &str) -> Option<ScalarType> {
    let ty = match name.trim() {
        "signed char" | "int8" | "int8_t" => ScalarType::I8,
        "uchar" | "unsigned char" | "uint8" | "uint8_t" => ScalarType::U8,
        "short" | "short int" | "signed short" | "signed short int" | "int16" | "int16_t" => {
            ScalarType::I16
        }
        "ushort" | "unsigned short" | "unsigned short int" | "uint16" | "uint16_t" => {
            ScalarType::U16
        }
        "int" | "signed int" | "int32" | "int32_t" => ScalarType::I32,
        "uint" | "unsigned int" | "uint32" | "uint32_t" => ScalarType::U32,
        "longlong"
        | "long long"
        | "long long int"
        | "signed long long"
        | "signed long long int"
        | "int64"
        | "int64_t" => ScalarType::I64,
        "ulonglong" | "unsigned long long" | "unsigned long long int" | "uint64" | "uint64_t" => {
            ScalarType::U64
        }
        "float" => ScalarType::F32,
        "double" => ScalarType::F64,
        _ => return None,
    };
    Some(ty)
}

/// Split the text header from the payload. The header ends at the first
/// empty line.
fn parse_header(bytes: &[u8], path: &Path) -> Result<(NrrdHeader, usize)> {
    let mut header = NrrdHeader::default();
    let mut pos = 0;
    let mut first = true;

    loop {
        let Some(len) = bytes[pos..].iter().position(|&b| b == b'\n') else {
            return Err(Error::header(path, "header is not terminated by an empty line"));
        };
        let line = String::from_utf8_lossy(&bytes[pos..pos + len]);
        let line = line.trim_end_matches('\r');
        pos += len + 1;

        if first {
            if !line.starts_with(MAGIC) {
                return Err(Error::header(path, "missing NRRD magic"));
            }
            first = false;
            continue;
        }
        if line.is_empty() {
            break;
        }
        if line.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = line.split_once(":=") {
            header.key_values.push((key.to_string(), value.to_string()));
        } else if let Some((field, value)) = line.split_once(": ") {
            header.fields.push((field.trim().to_string(), value.trim().to_string()));
        } else {
            return Err(Error::header(path, format!("malformed header line {line:?}")));
        }
    }

    Ok((header, pos))
}

pub fn read(path: &Path) -> Result<(ArrayD<f32>, NrrdHeader)> {
    let bytes = read_bytes(path)?;
    let (header, data_start) = parse_header(&bytes, path)?;

    if header.field("data file").or(header.field("datafile")).is_some() {
        return Err(Error::header(path, "detached data files are not supported"));
    }
    let scalar = header
        .field("type")
        .and_then(scalar_type)
        .ok_or_else(|| Error::header(path, "missing or unsupported type"))?;
    let sizes = header
        .sizes()
        .ok_or_else(|| Error::header(path, "missing or malformed sizes"))?;
    if let Some(dimension) = header.field("dimension") {
        if dimension.trim().parse::<usize>().ok() != Some(sizes.len()) {
            return Err(Error::header(path, "dimension does not match sizes"));
        }
    }
    let endian = match header.field("endian") {
        Some("big") => Endian::Big,
        Some("little") | None => Endian::Little,
        Some(other) => return Err(Error::header(path, format!("unknown endian {other:?}"))),
    };
    let byte_skip = header
        .field("byte skip")
        .or(header.field("byteskip"))
        .map_or(Ok(0), |s| s.trim().parse::<i64>())
        .map_err(|_| Error::header(path, "malformed byte skip"))?;

    let (count, needed) = payload_size(path, &sizes, scalar)?;
    let payload = &bytes[data_start..];
    let encoding = header.field("encoding").unwrap_or("raw");

    let values = match encoding {
        "raw" => decode_binary(payload, needed, scalar, endian, byte_skip, path)?,
        "gzip" | "gz" => {
            let inflated = gunzip(payload)?;
            decode_binary(&inflated, needed, scalar, endian, byte_skip, path)?
        }
        "ascii" | "text" | "txt" => {
            let values = String::from_utf8_lossy(payload)
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|s| !s.is_empty())
                .take(count)
                .map(|s| s.parse::<f32>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::header(path, format!("malformed ascii sample: {e}")))?;
            if values.len() < count {
                return Err(Error::header(path, "not enough ascii samples"));
            }
            values
        }
        other => return Err(Error::header(path, format!("unsupported encoding {other:?}"))),
    };

    let data = from_fortran_order(&sizes, values)?;
    Ok((data, header))
}

fn decode_binary(
    payload: &[u8],
    needed: usize,
    scalar: ScalarType,
    endian: Endian,
    byte_skip: i64,
    path: &Path,
) -> Result<Vec<f32>> {
    let start = match byte_skip {
        -1 => payload.len().checked_sub(needed),
        skip if skip >= 0 => Some(skip as usize),
        _ => None,
    }
    .ok_or_else(|| Error::header(path, "byte skip does not fit the payload"))?;

    let samples = start
        .checked_add(needed)
        .and_then(|end| payload.get(start..end))
        .ok_or_else(|| Error::header(path, format!("expected {needed} bytes of samples")))?;
    Ok(decode_samples(samples, scalar, endian))
}

pub fn write(path: &Path, data: ArrayViewD<'_, f32>, header: Option<&NrrdHeader>) -> Result<()> {
    let mut text = String::from("NRRD0004\n");
    text.push_str("# Complete NRRD file format specification at:\n");
    text.push_str("# http://teem.sourceforge.net/nrrd/format.html\n");
    text.push_str("type: float\n");
    text.push_str(&format!("dimension: {}\n", data.ndim()));

    if let Some(header) = header {
        for (field, value) in &header.fields {
            if !MANAGED_FIELDS.iter().any(|m| field.eq_ignore_ascii_case(m)) {
                text.push_str(&format!("{field}: {value}\n"));
            }
        }
    }

    let sizes: Vec<String> = data.shape().iter().map(|s| s.to_string()).collect();
    text.push_str(&format!("sizes: {}\n", sizes.join(" ")));
    text.push_str("endian: little\n");
    text.push_str("encoding: gzip\n");

    if let Some(header) = header {
        for (key, value) in &header.key_values {
            text.push_str(&format!("{key}:={value}\n"));
        }
    }
    text.push('\n');

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&encode_f32(fortran_order_iter(&data), Endian::Little))?;
    let payload = encoder.finish()?;

    let mut bytes = text.into_bytes();
    bytes.extend(payload);
    fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    #[test]
    fn reads_raw_big_endian_shorts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.nrrd");
        let mut bytes = concat!(
            "NRRD0004\n# comment\ntype: short\ndimension: 2\n",
            "sizes: 3 2\nendian: big\nencoding: raw\n\n",
        )
        .as_bytes()
        .to_vec();
        for value in [1i16, 2, 3, -4, -5, -6] {
            bytes.extend_from_slice(&value.to_be_bytes());
        }
        fs::write(&path, bytes).unwrap();

        let (loaded, header) = read(&path).unwrap();
        let expected =
            Array2::from_shape_vec((3, 2), vec![1.0, -4.0, 2.0, -5.0, 3.0, -6.0]).unwrap();
        assert_eq!(loaded, expected.into_dyn());
        assert_eq!(header.field("type"), Some("short"));
    }

    #[test]
    fn reads_ascii_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ascii.nrrd");
        let text = "NRRD0001\ntype: uchar\ndimension: 1\nsizes: 4\nencoding: ascii\n\n1 2\n3 4\n";
        fs::write(&path, text).unwrap();

        let (loaded, _) = read(&path).unwrap();
        assert_eq!(loaded.as_slice().unwrap(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn write_preserves_geometry_and_key_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.nrrd");
        let data = Array3::from_shape_fn((4, 3, 2), |(x, y, z)| (x * 100 + y * 10 + z) as f32);
        let header = NrrdHeader {
            fields: vec![
                ("type".to_string(), "short".to_string()),
                ("space".to_string(), "left-posterior-superior".to_string()),
                ("space directions".to_string(), "(0.5,0,0) (0,0.5,0) (0,0,3)".to_string()),
                ("encoding".to_string(), "raw".to_string()),
            ],
            key_values: vec![("modality".to_string(), "MR".to_string())],
        };

        write(&path, data.view().into_dyn(), Some(&header)).unwrap();
        let (loaded, loaded_header) = read(&path).unwrap();

        assert_eq!(loaded, data.into_dyn());
        assert_eq!(loaded_header.field("type"), Some("float"));
        assert_eq!(loaded_header.field("encoding"), Some("gzip"));
        assert_eq!(loaded_header.field("space"), Some("left-posterior-superior"));
        assert_eq!(loaded_header.key_value("modality"), Some("MR"));
        assert_eq!(loaded_header.spacing(), Some(vec![0.5, 0.5, 3.0]));
    }

    #[test]
    fn spacings_field_takes_precedence() {
        let header = NrrdHeader {
            fields: vec![("spacings".to_string(), "1.5 nan 2".to_string())],
            key_values: Vec::new(),
        };
        assert_eq!(header.spacing(), Some(vec![1.5, 1.0, 2.0]));
    }

    #[test]
    fn rejects_sizes_that_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.nrrd");
        let text = concat!(
            "NRRD0004\ntype: double\ndimension: 2\n",
            "sizes: 4294967296 4294967296\nencoding: raw\n\n",
        );
        fs::write(&path, text).unwrap();
        assert!(matches!(read(&path), Err(Error::Header { .. })));
    }

    #[test]
    fn rejects_byte_skip_past_the_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skip.nrrd");
        let mut bytes =
            b"NRRD0004\ntype: uchar\ndimension: 1\nsizes: 2\nbyte skip: 64\n\n".to_vec();
        bytes.extend_from_slice(&[1, 2]);
        fs::write(&path, bytes).unwrap();
        assert!(matches!(read(&path), Err(Error::Header { .. })));
    }

    #[test]
    fn rejects_detached_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detached.nrrd");
        let text = "NRRD0004\ntype: float\ndimension: 1\nsizes: 2\ndata file: other.raw\n\n";
        fs::write(&path, text).unwrap();
        assert!(matches!(read(&path), Err(Error::Header { .. })));
    }
}
