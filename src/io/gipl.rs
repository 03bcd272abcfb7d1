//! GIPL (Guy's Image Processing Lab) volumes.
//!
//! A GIPL file is a 256 byte big-endian header followed by the samples with
//! `x` varying fastest. Gzip-compressed files are inflated on read.

use super::{
    decode_samples, encode_f32, fortran_order_iter, from_fortran_order, payload_size, read_bytes,
};
use crate::enums::{Endian, ScalarType};
use crate::error::{Error, Result};

use ndarray::{ArrayD, ArrayViewD};
use std::fs;
use std::path::Path;

pub const HEADER_SIZE: usize = 256;
const MAGIC_NUMBER: u32 = 0xefff_e9b0;
const MAGIC_NUMBER_OLD: u32 = 0x2ae3_89b8;
const PATIENT_SIZE: usize = 80;

const TYPE_CHAR: u16 = 7;
const TYPE_U_CHAR: u16 = 8;
const TYPE_SHORT: u16 = 15;
const TYPE_U_SHORT: u16 = 16;
const TYPE_U_INT: u16 = 31;
const TYPE_INT: u16 = 32;
const TYPE_FLOAT: u16 = 64;
const TYPE_DOUBLE: u16 = 65;

#[derive(Debug, Clone, PartialEq)]
pub struct GiplHeader {
    pub dims: [u16; 4],
    pub image_type: u16,
    pub pixdim: [f32; 4],
    pub patient: String,
    pub matrix: [f32; 20],
    pub orientation: u8,
    pub par2: u8,
    pub voxmin: f64,
    pub voxmax: f64,
    pub origin: [f64; 4],
    pub pixval_offset: f32,
    pub pixval_cal: f32,
    pub interslicegap: f32,
    pub user_def2: f32,
}

impl Default for GiplHeader {
    fn default() -> Self {
        Self {
            dims: [1; 4],
            image_type: TYPE_FLOAT,
            pixdim: [1.0; 4],
            patient: String::new(),
            matrix: [0.0; 20],
            orientation: 0,
            par2: 0,
            voxmin: 0.0,
            voxmax: 0.0,
            origin: [0.0; 4],
            pixval_offset: 0.0,
            pixval_cal: 0.0,
            interslicegap: 0.0,
            user_def2: 0.0,
        }
    }
}

impl GiplHeader {
    /// Number of meaningful axes: trailing axes of length 1 are dropped, but
    /// an image always keeps at least two.
    pub fn ndim(&self) -> usize {
        self.dims
            .iter()
            .rposition(|&d| d > 1)
            .map_or(2, |last| (last + 1).max(2))
    }

    pub fn shape(&self) -> Vec<usize> {
        self.dims[..self.ndim()].iter().map(|&d| usize::from(d)).collect()
    }

    pub fn spacing(&self) -> Vec<f32> {
        self.pixdim[..self.ndim()].to_vec()
    }

    fn scalar_type(&self) -> Option<ScalarType> {
        match self.image_type {
            TYPE_CHAR => Some(ScalarType::I8),
            TYPE_U_CHAR => Some(ScalarType::U8),
            TYPE_SHORT => Some(ScalarType::I16),
            TYPE_U_SHORT => Some(ScalarType::U16),
            TYPE_U_INT => Some(ScalarType::U32),
            TYPE_INT => Some(ScalarType::I32),
            TYPE_FLOAT => Some(ScalarType::F32),
            TYPE_DOUBLE => Some(ScalarType::F64),
            _ => None,
        }
    }

    pub fn from_bytes(bytes: &[u8], path: &Path) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::header(path, "file is shorter than a GIPL header"));
        }
        let mut cursor = Cursor { bytes, pos: 0 };

        let mut header = GiplHeader::default();
        for dim in header.dims.iter_mut() {
            *dim = u16::from_be_bytes(cursor.take());
        }
        header.image_type = u16::from_be_bytes(cursor.take());
        for value in header.pixdim.iter_mut() {
            *value = f32::from_be_bytes(cursor.take());
        }
        let patient: [u8; PATIENT_SIZE] = cursor.take();
        let end = patient.iter().position(|&b| b == 0).unwrap_or(PATIENT_SIZE);
        header.patient = String::from_utf8_lossy(&patient[..end]).into_owned();
        for value in header.matrix.iter_mut() {
            *value = f32::from_be_bytes(cursor.take());
        }
        header.orientation = u8::from_be_bytes(cursor.take());
        header.par2 = u8::from_be_bytes(cursor.take());
        header.voxmin = f64::from_be_bytes(cursor.take());
        header.voxmax = f64::from_be_bytes(cursor.take());
        for value in header.origin.iter_mut() {
            *value = f64::from_be_bytes(cursor.take());
        }
        header.pixval_offset = f32::from_be_bytes(cursor.take());
        header.pixval_cal = f32::from_be_bytes(cursor.take());
        header.interslicegap = f32::from_be_bytes(cursor.take());
        header.user_def2 = f32::from_be_bytes(cursor.take());

        let magic = u32::from_be_bytes(cursor.take());
        if magic != MAGIC_NUMBER && magic != MAGIC_NUMBER_OLD {
            return Err(Error::header(path, format!("bad GIPL magic number {magic:#010x}")));
        }
        Ok(header)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE);
        for dim in self.dims {
            out.extend_from_slice(&dim.to_be_bytes());
        }
        out.extend_from_slice(&self.image_type.to_be_bytes());
        for value in self.pixdim {
            out.extend_from_slice(&value.to_be_bytes());
        }
        let mut patient = [0u8; PATIENT_SIZE];
        let text = self.patient.as_bytes();
        let len = text.len().min(PATIENT_SIZE - 1);
        patient[..len].copy_from_slice(&text[..len]);
        out.extend_from_slice(&patient);
        for value in self.matrix {
            out.extend_from_slice(&value.to_be_bytes());
        }
        out.push(self.orientation);
        out.push(self.par2);
        out.extend_from_slice(&self.voxmin.to_be_bytes());
        out.extend_from_slice(&self.voxmax.to_be_bytes());
        for value in self.origin {
            out.extend_from_slice(&value.to_be_bytes());
        }
        out.extend_from_slice(&self.pixval_offset.to_be_bytes());
        out.extend_from_slice(&self.pixval_cal.to_be_bytes());
        out.extend_from_slice(&self.interslicegap.to_be_bytes());
        out.extend_from_slice(&self.user_def2.to_be_bytes());
        out.extend_from_slice(&MAGIC_NUMBER.to_be_bytes());
        out
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let out = super::to_array(&self.bytes[self.pos..self.pos + N]);
        self.pos += N;
        out
    }
}

pub fn read(path: &Path) -> Result<(ArrayD<f32>, GiplHeader)> {
    let bytes = read_bytes(path)?;
    let header = GiplHeader::from_bytes(&bytes, path)?;
    let scalar = header.scalar_type().ok_or_else(|| {
        Error::header(path, format!("unsupported GIPL image type {}", header.image_type))
    })?;

    let shape = header.shape();
    let (_, needed) = payload_size(path, &shape, scalar)?;
    let payload = &bytes[HEADER_SIZE..];
    if payload.len() < needed {
        return Err(Error::header(
            path,
            format!("expected {needed} bytes of samples, found {}", payload.len()),
        ));
    }

    let values = decode_samples(&payload[..needed], scalar, Endian::Big);
    let data = from_fortran_order(&shape, values)?;
    Ok((data, header))
}

pub fn write(path: &Path, data: ArrayViewD<'_, f32>, header: Option<&GiplHeader>) -> Result<()> {
    let too_long = data.shape().iter().any(|&d| d > usize::from(u16::MAX));
    if data.ndim() == 0 || data.ndim() > 4 || too_long {
        return Err(Error::InvalidShape {
            expected: "1 to 4 axes of at most 65535 samples".to_string(),
            actual: format!("{:?}", data.shape()),
        });
    }

    let mut header = header.cloned().unwrap_or_default();
    header.dims = [1; 4];
    for (dim, &len) in header.dims.iter_mut().zip(data.shape()) {
        *dim = len as u16;
    }
    header.image_type = TYPE_FLOAT;
    let (min, max) = data
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    (header.voxmin, header.voxmax) = if data.is_empty() {
        (0.0, 0.0)
    } else {
        (f64::from(min), f64::from(max))
    };

    let mut bytes = header.to_bytes();
    bytes.extend(encode_f32(fortran_order_iter(&data), Endian::Big));
    fs::write(path, bytes)?;
    Ok(())
}
