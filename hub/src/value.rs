//! Dynamic sample values.
//!
//! A [`Value`] is the language-level representation of data read from or written to a dataset:
//! an array, a text string, a list of values (e.g. one per sample), or a [`Record`] of named fields.

use crate::{data_type::Element, tensor_data::TensorData};

/// A value read from or written to a dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A dense array.
    Array(TensorData),
    /// A text string.
    Text(String),
    /// A list of values.
    List(Vec<Value>),
    /// A record of named fields.
    Dict(Record),
}

/// An ordered collection of named values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record(Vec<(String, Value)>);

impl Record {
    /// Create an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, replacing an existing field of the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        if let Some(existing) = self.0.iter_mut().find(|(field, _)| *field == name) {
            existing.1 = value;
        } else {
            self.0.push((name, value));
        }
    }

    /// Chained [`insert`](Record::insert).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Get a field by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0
            .iter()
            .find_map(|(field, value)| (field == name).then_some(value))
    }

    /// The number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the fields in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// The field names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

impl Value {
    /// Returns the array if this is [`Value::Array`].
    #[must_use]
    pub fn as_array(&self) -> Option<&TensorData> {
        if let Self::Array(array) = self { Some(array) } else { None }
    }

    /// Returns the text if this is [`Value::Text`].
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let Self::Text(text) = self { Some(text) } else { None }
    }

    /// Returns the items if this is [`Value::List`].
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        if let Self::List(items) = self { Some(items) } else { None }
    }

    /// Returns the record if this is [`Value::Dict`].
    #[must_use]
    pub fn as_dict(&self) -> Option<&Record> {
        if let Self::Dict(record) = self { Some(record) } else { None }
    }

    /// Returns the element of a single-element array as `f64`.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        self.as_array()
            .filter(|array| array.is_scalar())
            .and_then(|array| array.to_f64_vec().first().copied())
    }

    /// Returns the element of a single-element array as `i64`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        self.as_array()
            .filter(|array| array.is_scalar())
            .and_then(|array| array.to_vec::<i64>().ok())
            .and_then(|elements| elements.first().copied())
    }

    /// Returns the elements of an array as `f64`.
    #[must_use]
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        self.as_array().map(TensorData::to_f64_vec)
    }

    /// Returns the shape of an array.
    #[must_use]
    pub fn shape(&self) -> Option<&[u64]> {
        self.as_array().map(TensorData::shape)
    }

    /// A short description of the kind of value.
    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Self::Array(_) => "array",
            Self::Text(_) => "text",
            Self::List(_) => "list",
            Self::Dict(_) => "dict",
        }
    }
}

macro_rules! impl_value_from_element {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(element: $t) -> Self {
                    Self::Array(TensorData::from_scalar(element))
                }
            }

            impl From<Vec<$t>> for Value {
                fn from(elements: Vec<$t>) -> Self {
                    Self::Array(TensorData::from_vec(elements))
                }
            }

            impl From<&[$t]> for Value {
                fn from(elements: &[$t]) -> Self {
                    Self::Array(TensorData::from_vec(elements.to_vec()))
                }
            }
        )*
    };
}

impl_value_from_element!(i8, i16, i32, i64, u8, u16, u32, u64, half::f16, f32, f64);

impl From<bool> for Value {
    fn from(element: bool) -> Self {
        Self::Array(TensorData::from_bool(element))
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<&str>> for Value {
    fn from(texts: Vec<&str>) -> Self {
        Self::List(texts.into_iter().map(Value::from).collect())
    }
}

impl From<Vec<String>> for Value {
    fn from(texts: Vec<String>) -> Self {
        Self::List(texts.into_iter().map(Value::Text).collect())
    }
}

impl From<TensorData> for Value {
    fn from(array: TensorData) -> Self {
        Self::Array(array)
    }
}

impl From<Vec<TensorData>> for Value {
    fn from(arrays: Vec<TensorData>) -> Self {
        Self::List(arrays.into_iter().map(Value::Array).collect())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Self::Dict(record)
    }
}

#[cfg(feature = "ndarray")]
impl<T: Element, D: ndarray::Dimension> From<ndarray::Array<T, D>> for Value {
    fn from(array: ndarray::Array<T, D>) -> Self {
        Self::Array(TensorData::from(array))
    }
}

/// Convert a scalar element into a [`Value`] of the element's data type.
pub fn scalar<T: Element>(element: T) -> Value {
    Value::Array(TensorData::from_scalar(element))
}
