//! Tensor element data types.
//!
//! A [`DataType`] names the element type of a tensor leaf.
//! Elements are stored little-endian in chunks and native-endian in memory.
//! The [`Element`] trait maps Rust types to their [`DataType`].

mod element;

pub use element::Element;

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A tensor element data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// `bool` stored as a single byte.
    Bool,
    /// `int8`
    Int8,
    /// `int16`
    Int16,
    /// `int32`
    Int32,
    /// `int64`
    Int64,
    /// `uint8`
    UInt8,
    /// `uint16`
    UInt16,
    /// `uint32`
    UInt32,
    /// `uint64`
    UInt64,
    /// `float16`
    Float16,
    /// `float32`
    Float32,
    /// `float64`
    Float64,
}

/// An unknown data type name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown data type {0}")]
pub struct UnknownDataTypeError(String);

impl DataType {
    /// Every supported data type.
    pub const ALL: [Self; 12] = [
        Self::Bool,
        Self::Int8,
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::UInt8,
        Self::UInt16,
        Self::UInt32,
        Self::UInt64,
        Self::Float16,
        Self::Float32,
        Self::Float64,
    ];

    /// The canonical name of the data type.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float16 => "float16",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }

    /// The size of an element in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        match self {
            Self::Bool | Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 | Self::Float16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }

    /// Returns true if the data type is a floating point type.
    #[must_use]
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float16 | Self::Float32 | Self::Float64)
    }

    /// Returns true if the data type is an integer type (signed or unsigned).
    #[must_use]
    pub const fn is_integer(&self) -> bool {
        !self.is_float() && !matches!(self, Self::Bool)
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = UnknownDataTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "float" | "double" => Ok(Self::Float64),
            "int" => Ok(Self::Int64),
            "uint" => Ok(Self::UInt64),
            "half" => Ok(Self::Float16),
            _ => Self::ALL
                .into_iter()
                .find(|data_type| data_type.name() == s)
                .ok_or_else(|| UnknownDataTypeError(s.to_string())),
        }
    }
}

impl Serialize for DataType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Dispatch on a [`DataType`], binding `$T` to the in-memory element type.
///
/// `bool` binds to `u8`.
macro_rules! dispatch_data_type {
    ($data_type:expr, $T:ident => $body:expr) => {
        match $data_type {
            $crate::data_type::DataType::Bool | $crate::data_type::DataType::UInt8 => {
                type $T = u8;
                $body
            }
            $crate::data_type::DataType::Int8 => {
                type $T = i8;
                $body
            }
            $crate::data_type::DataType::Int16 => {
                type $T = i16;
                $body
            }
            $crate::data_type::DataType::Int32 => {
                type $T = i32;
                $body
            }
            $crate::data_type::DataType::Int64 => {
                type $T = i64;
                $body
            }
            $crate::data_type::DataType::UInt16 => {
                type $T = u16;
                $body
            }
            $crate::data_type::DataType::UInt32 => {
                type $T = u32;
                $body
            }
            $crate::data_type::DataType::UInt64 => {
                type $T = u64;
                $body
            }
            $crate::data_type::DataType::Float16 => {
                type $T = half::f16;
                $body
            }
            $crate::data_type::DataType::Float32 => {
                type $T = f32;
                $body
            }
            $crate::data_type::DataType::Float64 => {
                type $T = f64;
                $body
            }
        }
    };
}

pub(crate) use dispatch_data_type;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_names() {
        for data_type in DataType::ALL {
            assert_eq!(data_type.name().parse::<DataType>(), Ok(data_type));
        }
        assert_eq!("float".parse::<DataType>(), Ok(DataType::Float64));
        assert_eq!("double".parse::<DataType>(), Ok(DataType::Float64));
        assert_eq!("int".parse::<DataType>(), Ok(DataType::Int64));
        assert!("complex64".parse::<DataType>().is_err());
    }

    #[test]
    fn data_type_serde() {
        assert_eq!(
            serde_json::to_string(&DataType::UInt16).unwrap(),
            r#""uint16""#
        );
        let data_type: DataType = serde_json::from_str(r#""float""#).unwrap();
        assert_eq!(data_type, DataType::Float64);
    }

    #[test]
    fn data_type_sizes() {
        assert_eq!(DataType::Bool.size(), 1);
        assert_eq!(DataType::Float16.size(), 2);
        assert_eq!(DataType::UInt64.size(), 8);
        assert!(DataType::Float32.is_float());
        assert!(DataType::Int8.is_integer());
        assert!(!DataType::Bool.is_integer());
    }
}
