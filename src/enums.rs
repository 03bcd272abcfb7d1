use std::path::Path;

/// File formats understood by [`crate::io::read_file`] and [`crate::io::save_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Nifti,
    Gipl,
    Nrrd,
    Png,
}

impl Format {
    /// Detect the format from the file name, ignoring a trailing `.gz`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        let name = name.strip_suffix(".gz").unwrap_or(&name);
        let extension = Path::new(name).extension()?.to_str()?;
        match extension {
            "nii" => Some(Format::Nifti),
            "gipl" => Some(Format::Gipl),
            "nrrd" => Some(Format::Nrrd),
            "png" => Some(Format::Png),
            _ => None,
        }
    }
}

/// Volume axes. Arrays are indexed `(x, y, z)`, so a sagittal slice fixes
/// axis 0, coronal axis 1 and axial axis 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

impl Orientation {
    pub fn axis(&self) -> usize {
        match self {
            Orientation::Sagittal => 0,
            Orientation::Coronal => 1,
            Orientation::Axial => 2,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// Resample to isotropic in-plane spacing with bilinear interpolation.
    Linear,
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Element types found in GIPL and NRRD payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl ScalarType {
    pub fn size(&self) -> usize {
        match self {
            ScalarType::I8 | ScalarType::U8 => 1,
            ScalarType::I16 | ScalarType::U16 => 2,
            ScalarType::I32 | ScalarType::U32 | ScalarType::F32 => 4,
            ScalarType::I64 | ScalarType::U64 | ScalarType::F64 => 8,
        }
    }
}
