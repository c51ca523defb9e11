//! NetCDF artifacts handed back by the worker.
//!
//! The container kind is identified from its leading bytes; everything else
//! (dimensions, variables, global attributes, values) is read through
//! libnetcdf, so classic, 64-bit offset, CDF-5 and NetCDF-4 files are all
//! opened the same way.

mod error;

use std::{fs::File, io::Read, path::Path};

pub use error::{NetCdfError, NetCdfResult};

/// HDF5 superblock signature used by NetCDF-4 files.
pub const HDF5_SIGNATURE: &[u8; 8] = b"\x89HDF\r\n\x1a\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// CDF-1
    Classic,
    /// CDF-2
    Offset64,
    /// CDF-5
    Offset64Data,
    /// HDF5 based NetCDF-4
    Netcdf4,
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Format::Classic => "NetCDF classic",
            Format::Offset64 => "NetCDF 64-bit offset",
            Format::Offset64Data => "NetCDF 64-bit data",
            Format::Netcdf4 => "NetCDF-4/HDF5",
        };
        f.write_str(s)
    }
}

/// Identify the container from its leading bytes.
pub fn sniff(data: &[u8]) -> NetCdfResult<Format> {
    if data.starts_with(HDF5_SIGNATURE) {
        return Ok(Format::Netcdf4);
    }
    if data.len() < 4 || &data[0..3] != b"CDF" {
        return Err(NetCdfError::InvalidFormat(
            "Invalid NetCDF magic bytes".to_string(),
        ));
    }
    match data[3] {
        1 => Ok(Format::Classic),
        2 => Ok(Format::Offset64),
        5 => Ok(Format::Offset64Data),
        v => Err(NetCdfError::InvalidFormat(format!(
            "Unknown NetCDF version byte {}",
            v
        ))),
    }
}

pub fn sniff_file(path: &Path) -> NetCdfResult<Format> {
    let mut probe = Vec::with_capacity(HDF5_SIGNATURE.len());
    File::open(path)?
        .take(HDF5_SIGNATURE.len() as u64)
        .read_to_end(&mut probe)?;
    sniff(&probe)
}

/// Attribute value flattened to the few shapes the host displays.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Texts(Vec<String>),
    Integers(Vec<i64>),
    Reals(Vec<f64>),
}

impl AttrValue {
    /// First numeric element widened to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Integers(v) => v.first().map(|x| *x as f64),
            AttrValue::Reals(v) => v.first().copied(),
            AttrValue::Text(_) | AttrValue::Texts(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

fn widen<T: Into<i64>>(v: Vec<T>) -> AttrValue {
    AttrValue::Integers(v.into_iter().map(Into::into).collect())
}

impl From<netcdf::AttributeValue> for AttrValue {
    fn from(value: netcdf::AttributeValue) -> Self {
        use netcdf::AttributeValue as V;
        match value {
            V::Str(s) => AttrValue::Text(s),
            V::Strs(s) => AttrValue::Texts(s),
            V::Uchar(x) => widen(vec![x]),
            V::Uchars(x) => widen(x),
            V::Schar(x) => widen(vec![x]),
            V::Schars(x) => widen(x),
            V::Ushort(x) => widen(vec![x]),
            V::Ushorts(x) => widen(x),
            V::Short(x) => widen(vec![x]),
            V::Shorts(x) => widen(x),
            V::Uint(x) => widen(vec![x]),
            V::Uints(x) => widen(x),
            V::Int(x) => widen(vec![x]),
            V::Ints(x) => widen(x),
            V::Longlong(x) => widen(vec![x]),
            V::Longlongs(x) => widen(x),
            V::Ulonglong(x) => AttrValue::Integers(vec![x as i64]),
            V::Ulonglongs(x) => AttrValue::Integers(x.into_iter().map(|v| v as i64).collect()),
            V::Float(x) => AttrValue::Reals(vec![x.into()]),
            V::Floats(x) => AttrValue::Reals(x.into_iter().map(f64::from).collect()),
            V::Double(x) => AttrValue::Reals(vec![x]),
            V::Doubles(x) => AttrValue::Reals(x),
            #[allow(unreachable_patterns)]
            other => AttrValue::Text(format!("{:?}", other)),
        }
    }
}

impl std::fmt::Display for AttrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn join<T: std::fmt::Debug>(v: &[T]) -> String {
            v.iter()
                .map(|x| format!("{:?}", x))
                .collect::<Vec<_>>()
                .join(", ")
        }
        match self {
            AttrValue::Text(s) => write!(f, "{}", s),
            AttrValue::Texts(v) => write!(f, "{}", v.join(", ")),
            AttrValue::Integers(v) => write!(f, "{}", join(v)),
            AttrValue::Reals(v) => write!(f, "{}", join(v)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: AttrValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableInfo {
    pub name: String,
    pub dims: Vec<String>,
    pub shape: Vec<usize>,
}

/// Metadata of an opened artifact; no variable data is read.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub format: Format,
    pub variables: Vec<VariableInfo>,
    pub attributes: Vec<Attribute>,
}

impl Summary {
    pub fn variable(&self, name: &str) -> Option<&VariableInfo> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| &a.value)
    }
}

/// Open `path` with libnetcdf and collect variables and global attributes.
pub fn describe(path: &Path) -> NetCdfResult<Summary> {
    let format = sniff_file(path)?;
    let file = netcdf::open(path)?;

    let variables = file
        .variables()
        .map(|var| {
            let dims = var.dimensions();
            VariableInfo {
                name: var.name().to_string(),
                dims: dims.iter().map(|d| d.name().to_string()).collect(),
                shape: dims.iter().map(|d| d.len()).collect(),
            }
        })
        .collect();

    let attributes = file
        .attributes()
        .map(|attr| -> NetCdfResult<Attribute> {
            Ok(Attribute {
                name: attr.name().to_string(),
                value: attr.value()?.into(),
            })
        })
        .collect::<NetCdfResult<Vec<_>>>()?;

    Ok(Summary {
        format,
        variables,
        attributes,
    })
}

/// Every value of one variable, converted to f64.
pub fn read_values(path: &Path, name: &str) -> NetCdfResult<Vec<f64>> {
    let file = netcdf::open(path)?;
    let var = file
        .variable(name)
        .ok_or_else(|| NetCdfError::MissingData(format!("variable {}", name)))?;
    let values: Vec<f64> = var.get_values(..)?;
    Ok(values)
}
