use itertools::Itertools;

use crate::{codec::Compressor, data_type::DataType};

use super::SchemaError;

/// The kind of a tensor leaf.
///
/// Every kind is a flavour of tensor with its own defaults and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TensorKind {
    /// A generic tensor.
    Tensor,
    /// A scalar, declared in a schema by its data type alone.
    Primitive,
    /// An image, rank 2 or 3.
    Image,
    /// A text string stored as code units.
    Text,
    /// Bounding boxes, the last axis has size 4.
    BBox,
    /// A sequence, usually with a dynamic leading axis.
    Sequence,
    /// A class label.
    ClassLabel(ClassLabel),
}

impl TensorKind {
    /// The name of the kind.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tensor => "tensor",
            Self::Primitive => "primitive",
            Self::Image => "image",
            Self::Text => "text",
            Self::BBox => "bbox",
            Self::Sequence => "sequence",
            Self::ClassLabel(_) => "class_label",
        }
    }

    pub(crate) fn display_name(&self) -> &'static str {
        match self {
            Self::Tensor | Self::Primitive => "Tensor",
            Self::Image => "Image",
            Self::Text => "Text",
            Self::BBox => "BBox",
            Self::Sequence => "Sequence",
            Self::ClassLabel(_) => "ClassLabel",
        }
    }
}

/// The classes of a class label leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassLabel {
    /// Named classes, the code of a class is its position.
    Names(Vec<String>),
    /// A number of anonymous classes.
    NumClasses(u64),
}

impl ClassLabel {
    /// The number of classes.
    #[must_use]
    pub fn num_classes(&self) -> u64 {
        match self {
            Self::Names(names) => names.len() as u64,
            Self::NumClasses(num_classes) => *num_classes,
        }
    }

    /// The class names, if the classes are named.
    #[must_use]
    pub fn names(&self) -> Option<&[String]> {
        match self {
            Self::Names(names) => Some(names),
            Self::NumClasses(_) => None,
        }
    }

    /// The code of the class `name`.
    #[must_use]
    pub fn str2int(&self, name: &str) -> Option<u64> {
        self.names()?
            .iter()
            .position(|class| class == name)
            .map(|position| position as u64)
    }

    /// The name of the class with `code`.
    #[must_use]
    pub fn int2str(&self, code: u64) -> Option<&str> {
        self.names()?
            .get(crate::tensor_data::usize_from(code))
            .map(String::as_str)
    }
}

/// The specification of a tensor leaf.
///
/// A tensor is declared by its per-sample shape, where [`None`] marks a dynamic axis bounded by the corresponding `max_shape` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorSpec {
    kind: TensorKind,
    shape: Vec<Option<u64>>,
    max_shape: Vec<u64>,
    data_type: DataType,
    chunks: Option<Vec<u64>>,
    compressor: Option<Compressor>,
}

impl TensorSpec {
    fn with_kind(
        kind: TensorKind,
        shape: &[Option<u64>],
        max_shape: &[u64],
        data_type: DataType,
    ) -> Self {
        let max_shape = if max_shape.is_empty() && shape.iter().all(Option::is_some) {
            shape.iter().copied().map(Option::unwrap_or_default).collect()
        } else {
            max_shape.to_vec()
        };
        Self {
            kind,
            shape: shape.to_vec(),
            max_shape,
            data_type,
            chunks: None,
            compressor: None,
        }
    }

    /// Create a `float64` tensor with a static shape.
    #[must_use]
    pub fn new(shape: &[u64]) -> Self {
        let shape = shape.iter().copied().map(Some).collect_vec();
        Self::with_kind(TensorKind::Tensor, &shape, &[], DataType::Float64)
    }

    /// Create a `float64` tensor with dynamic axes.
    #[must_use]
    pub fn new_dynamic(shape: &[Option<u64>], max_shape: &[u64]) -> Self {
        Self::with_kind(TensorKind::Tensor, shape, max_shape, DataType::Float64)
    }

    /// Create a scalar leaf of `data_type`.
    #[must_use]
    pub fn primitive(data_type: DataType) -> Self {
        Self::with_kind(TensorKind::Primitive, &[], &[], data_type)
    }

    /// Create a `uint8` image leaf with rank 2 or 3.
    #[must_use]
    pub fn image(shape: &[Option<u64>], max_shape: &[u64]) -> Self {
        Self::with_kind(TensorKind::Image, shape, max_shape, DataType::UInt8)
    }

    /// Create a text leaf with `uint8` code units (UTF-8).
    ///
    /// Wider integer data types store Unicode code points.
    #[must_use]
    pub fn text(shape: &[Option<u64>], max_shape: &[u64]) -> Self {
        Self::with_kind(TensorKind::Text, shape, max_shape, DataType::UInt8)
    }

    /// Create a `float64` bounding box leaf. The last axis must have size 4.
    #[must_use]
    pub fn bbox(shape: &[Option<u64>], max_shape: &[u64]) -> Self {
        Self::with_kind(TensorKind::BBox, shape, max_shape, DataType::Float64)
    }

    /// Create a `float64` sequence leaf.
    #[must_use]
    pub fn sequence(shape: &[Option<u64>], max_shape: &[u64]) -> Self {
        Self::with_kind(TensorKind::Sequence, shape, max_shape, DataType::Float64)
    }

    /// Create a scalar `int64` class label leaf with named classes.
    #[must_use]
    pub fn class_label_names<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        let names = names.into_iter().map(Into::into).collect();
        Self::with_kind(
            TensorKind::ClassLabel(ClassLabel::Names(names)),
            &[],
            &[],
            DataType::Int64,
        )
    }

    /// Create a scalar `int64` class label leaf with `num_classes` anonymous classes.
    #[must_use]
    pub fn class_label_num_classes(num_classes: u64) -> Self {
        Self::with_kind(
            TensorKind::ClassLabel(ClassLabel::NumClasses(num_classes)),
            &[],
            &[],
            DataType::Int64,
        )
    }

    /// Set the shape and maximum shape.
    #[must_use]
    pub fn with_shape(self, shape: &[Option<u64>], max_shape: &[u64]) -> Self {
        Self {
            chunks: self.chunks,
            compressor: self.compressor,
            ..Self::with_kind(self.kind, shape, max_shape, self.data_type)
        }
    }

    /// Set the data type.
    #[must_use]
    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    /// Set the chunk shape.
    ///
    /// The first entry is the number of samples per chunk, the remaining entries are a prefix of the inner chunk shape.
    /// Unspecified inner axes are not split.
    #[must_use]
    pub fn with_chunks(mut self, chunks: Vec<u64>) -> Self {
        self.chunks = Some(chunks);
        self
    }

    /// Set the chunk compressor.
    #[must_use]
    pub fn with_compressor(mut self, compressor: Compressor) -> Self {
        self.compressor = Some(compressor);
        self
    }

    /// The kind of the leaf.
    #[must_use]
    pub fn kind(&self) -> &TensorKind {
        &self.kind
    }

    /// The class label, if the leaf is a class label.
    #[must_use]
    pub fn class_label(&self) -> Option<&ClassLabel> {
        if let TensorKind::ClassLabel(class_label) = &self.kind {
            Some(class_label)
        } else {
            None
        }
    }

    /// The declared per-sample shape. [`None`] marks a dynamic axis.
    #[must_use]
    pub fn shape(&self) -> &[Option<u64>] {
        &self.shape
    }

    /// The per-sample maximum shape.
    #[must_use]
    pub fn max_shape(&self) -> &[u64] {
        &self.max_shape
    }

    /// The data type.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// The declared chunk shape, or the resolved chunk shape of a persisted leaf.
    #[must_use]
    pub fn chunks(&self) -> Option<&[u64]> {
        self.chunks.as_deref()
    }

    /// The declared compressor, or the resolved compressor of a persisted leaf.
    #[must_use]
    pub fn compressor(&self) -> Option<Compressor> {
        self.compressor
    }

    /// The number of per-sample axes.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Returns true if any axis is dynamic.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.shape.iter().any(Option::is_none)
    }

    /// The indices of the dynamic axes.
    #[must_use]
    pub fn dynamic_axes(&self) -> Vec<usize> {
        self.shape
            .iter()
            .positions(Option::is_none)
            .collect()
    }

    /// Validate the specification.
    ///
    /// # Errors
    /// Returns a [`SchemaError`] describing the first violated constraint.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.shape.len() != self.max_shape.len() {
            return Err(SchemaError::InvalidShape(format!(
                "shape {} and max_shape {} have different lengths",
                format_shape(&self.shape),
                format_max_shape(&self.max_shape)
            )));
        }
        if self.max_shape.contains(&0) || self.shape.contains(&Some(0)) {
            return Err(SchemaError::InvalidShape(format!(
                "shape {} and max_shape {} must have positive axis sizes",
                format_shape(&self.shape),
                format_max_shape(&self.max_shape)
            )));
        }
        if sample_bytes(&self.max_shape, self.data_type.size() as u64).is_none() {
            return Err(SchemaError::InvalidShape(format!(
                "a sample of max_shape {} does not fit in memory",
                format_max_shape(&self.max_shape)
            )));
        }
        for (size, max_size) in self.shape.iter().zip(&self.max_shape) {
            if let Some(size) = size
                && size != max_size
            {
                return Err(SchemaError::InvalidShape(format!(
                    "shape {} does not match max_shape {} on a static axis",
                    format_shape(&self.shape),
                    format_max_shape(&self.max_shape)
                )));
            }
        }
        if let Some(chunks) = &self.chunks {
            if chunks.is_empty() || chunks.len() > self.rank() + 1 {
                return Err(SchemaError::InvalidChunks(format!(
                    "chunks {chunks:?} must have between 1 and {} entries",
                    self.rank() + 1
                )));
            }
            if chunks.contains(&0) {
                return Err(SchemaError::InvalidChunks(format!(
                    "chunks {chunks:?} must be positive"
                )));
            }
        }
        match &self.kind {
            TensorKind::Primitive if !self.shape.is_empty() => Err(SchemaError::InvalidShape(
                "a primitive must be a scalar".to_string(),
            )),
            TensorKind::Image if !matches!(self.rank(), 2 | 3) => Err(SchemaError::InvalidShape(
                format!("an image must have rank 2 or 3, got {}", format_shape(&self.shape)),
            )),
            TensorKind::Text if self.rank() != 1 || !self.data_type.is_integer() => {
                Err(SchemaError::InvalidShape(format!(
                    "text must be one dimensional with an integer data type, got {} {}",
                    format_shape(&self.shape),
                    self.data_type
                )))
            }
            TensorKind::BBox if self.shape.last() != Some(&Some(4)) => {
                Err(SchemaError::InvalidShape(format!(
                    "the last axis of a bbox must have size 4, got {}",
                    format_shape(&self.shape)
                )))
            }
            TensorKind::ClassLabel(class_label) => {
                if !self.data_type.is_integer() {
                    return Err(SchemaError::InvalidClassLabel(format!(
                        "a class label must have an integer data type, got {}",
                        self.data_type
                    )));
                }
                match class_label {
                    ClassLabel::Names(names) if names.is_empty() => Err(
                        SchemaError::InvalidClassLabel("names must not be empty".to_string()),
                    ),
                    ClassLabel::Names(names) if !names.iter().all_unique() => Err(
                        SchemaError::InvalidClassLabel(format!("names {names:?} are not unique")),
                    ),
                    ClassLabel::NumClasses(0) => Err(SchemaError::InvalidClassLabel(
                        "num_classes must be positive".to_string(),
                    )),
                    _ => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }

    /// Returns a copy with a concrete compressor and chunk shape.
    ///
    /// Unset chunk entries are derived so that a chunk holds approximately `chunk_target_bytes` uncompressed bytes.
    #[must_use]
    pub(crate) fn resolved(&self, default_compressor: Compressor, chunk_target_bytes: u64) -> Self {
        let mut spec = self.clone();
        spec.compressor = Some(self.compressor.unwrap_or(default_compressor));
        spec.chunks = Some(self.full_chunks(chunk_target_bytes));
        spec
    }

    /// The full chunk shape, including the sample axis.
    pub(crate) fn full_chunks(&self, chunk_target_bytes: u64) -> Vec<u64> {
        let inner_max = self.max_shape.iter().map(|&size| size.max(1)).collect_vec();
        match &self.chunks {
            Some(chunks) if chunks.len() == self.rank() + 1 => std::iter::once(chunks[0])
                .chain(chunks[1..].iter().zip(&inner_max).map(|(c, m)| *c.min(m)))
                .collect(),
            Some(chunks) => std::iter::once(chunks[0])
                .chain(
                    inner_max
                        .iter()
                        .enumerate()
                        .map(|(axis, m)| chunks.get(axis + 1).map_or(*m, |c| *c.min(m))),
                )
                .collect(),
            None => auto_chunks(&inner_max, self.data_type.size() as u64, chunk_target_bytes),
        }
    }
}

/// Derive a chunk shape for samples with `inner_max` shape.
///
/// Whole samples are packed into a chunk up to `target_bytes`.
/// If a single sample is larger, leading inner axes are split until a chunk fits.
fn auto_chunks(inner_max: &[u64], element_size: u64, target_bytes: u64) -> Vec<u64> {
    let whole_bytes = sample_bytes(inner_max, element_size).unwrap_or(u64::MAX);
    if whole_bytes <= target_bytes {
        return std::iter::once((target_bytes / whole_bytes.max(1)).max(1))
            .chain(inner_max.iter().copied())
            .collect();
    }
    let mut chunks = vec![1];
    let mut split = false;
    for (axis, &size) in inner_max.iter().enumerate() {
        if split {
            chunks.push(size);
            continue;
        }
        let trailing_bytes =
            sample_bytes(&inner_max[axis + 1..], element_size).unwrap_or(u64::MAX);
        if trailing_bytes <= target_bytes {
            chunks.push((target_bytes / trailing_bytes.max(1)).clamp(1, size));
            split = true;
        } else {
            chunks.push(1);
        }
    }
    chunks
}

/// The number of bytes of a sample with `shape`, or [`None`] on overflow.
fn sample_bytes(shape: &[u64], element_size: u64) -> Option<u64> {
    shape
        .iter()
        .try_fold(element_size, |bytes, &size| bytes.checked_mul(size))
}

pub(crate) fn format_tuple<T: std::fmt::Display>(items: impl IntoIterator<Item = T>) -> String {
    let items = items.into_iter().map(|item| item.to_string()).collect_vec();
    if items.len() == 1 {
        format!("({},)", items[0])
    } else {
        format!("({})", items.join(", "))
    }
}

pub(crate) fn format_shape(shape: &[Option<u64>]) -> String {
    format_tuple(
        shape
            .iter()
            .map(|size| size.map_or_else(|| "None".to_string(), |size| size.to_string())),
    )
}

pub(crate) fn format_max_shape(max_shape: &[u64]) -> String {
    format_tuple(max_shape)
}

impl std::fmt::Display for TensorSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.kind == TensorKind::Primitive {
            return write!(f, "'{}'", self.data_type);
        }
        write!(
            f,
            "{}(shape={}, dtype='{}'",
            self.kind.display_name(),
            format_shape(&self.shape),
            self.data_type
        )?;
        if self.is_dynamic() {
            write!(f, ", max_shape={}", format_max_shape(&self.max_shape))?;
        }
        match &self.kind {
            TensorKind::ClassLabel(ClassLabel::Names(names)) => write!(
                f,
                ", names=[{}]",
                names.iter().map(|name| format!("'{name}'")).join(", ")
            )?,
            TensorKind::ClassLabel(ClassLabel::NumClasses(num_classes)) => {
                write!(f, ", num_classes={num_classes}")?;
            }
            _ => {}
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tensor_spec_static_max_shape() {
        let spec = TensorSpec::new(&[2, 3]);
        assert_eq!(spec.max_shape(), &[2, 3]);
        assert!(!spec.is_dynamic());
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn tensor_spec_validate() {
        assert!(
            TensorSpec::new_dynamic(&[Some(120), Some(120), Some(3)], &[120, 120, 4])
                .validate()
                .is_err()
        );
        assert!(TensorSpec::new_dynamic(&[None, Some(3)], &[10]).validate().is_err());
        assert!(TensorSpec::new_dynamic(&[None, Some(3)], &[10, 3]).validate().is_ok());
        assert!(TensorSpec::image(&[Some(4)], &[]).validate().is_err());
        assert!(TensorSpec::bbox(&[Some(3)], &[]).validate().is_err());
        assert!(TensorSpec::bbox(&[None, Some(4)], &[10, 4]).validate().is_ok());
        assert!(
            TensorSpec::text(&[None], &[10])
                .with_data_type(DataType::Float32)
                .validate()
                .is_err()
        );
        assert!(TensorSpec::class_label_num_classes(0).validate().is_err());
        assert!(TensorSpec::class_label_names(["a", "a"]).validate().is_err());
        assert!(TensorSpec::new(&[2]).with_chunks(vec![1, 1, 1]).validate().is_err());
        assert!(TensorSpec::new(&[2]).with_chunks(vec![0]).validate().is_err());
    }

    #[test]
    fn tensor_spec_zero_sized_axes() {
        assert!(matches!(
            TensorSpec::new_dynamic(&[None], &[0]).validate(),
            Err(SchemaError::InvalidShape(_))
        ));
        assert!(matches!(
            TensorSpec::new(&[0, 3]).validate(),
            Err(SchemaError::InvalidShape(_))
        ));
        assert!(matches!(
            TensorSpec::text(&[None], &[0]).validate(),
            Err(SchemaError::InvalidShape(_))
        ));
        assert!(
            crate::schema::Schema::builder()
                .field("t", TensorSpec::new_dynamic(&[None], &[0]))
                .build()
                .is_err()
        );
    }

    #[test]
    fn tensor_spec_huge_max_shape() {
        let spec = TensorSpec::new_dynamic(&[None, None], &[u64::MAX, u64::MAX]);
        assert!(matches!(spec.validate(), Err(SchemaError::InvalidShape(_))));
        assert_eq!(auto_chunks(&[u64::MAX, u64::MAX], 8, 1024), vec![1, 1, 128]);
        assert_eq!(auto_chunks(&[4, 4], 1, 64), vec![4, 4, 4]);
    }

    #[test]
    fn tensor_spec_auto_chunks() {
        // 4 bytes per sample
        assert_eq!(TensorSpec::new(&[]).with_data_type(DataType::Int32).full_chunks(64), vec![16]);
        // 800 bytes per sample
        assert_eq!(TensorSpec::new(&[10, 10]).full_chunks(1600), vec![2, 10, 10]);
        // a sample exceeds the target, the leading inner axis is split
        assert_eq!(TensorSpec::new(&[10, 10]).full_chunks(160), vec![1, 2, 10]);
        assert_eq!(TensorSpec::new(&[10, 10]).full_chunks(8), vec![1, 1, 1]);
        // explicit prefix, inner axes clamped to the max shape
        assert_eq!(
            TensorSpec::new(&[10, 10]).with_chunks(vec![5, 20]).full_chunks(8),
            vec![5, 10, 10]
        );
    }

    #[test]
    fn tensor_spec_class_label() {
        let spec = TensorSpec::class_label_names(["red", "green", "blue"]);
        let class_label = spec.class_label().unwrap();
        assert_eq!(class_label.num_classes(), 3);
        assert_eq!(class_label.str2int("blue"), Some(2));
        assert_eq!(class_label.int2str(1), Some("green"));
        assert_eq!(class_label.str2int("black"), None);
        assert_eq!(ClassLabel::NumClasses(4).str2int("a"), None);
    }

    #[test]
    fn tensor_spec_display() {
        assert_eq!(TensorSpec::new(&[2]).to_string(), "Tensor(shape=(2,), dtype='float64')");
        assert_eq!(TensorSpec::primitive(DataType::Float64).to_string(), "'float64'");
        assert_eq!(
            TensorSpec::text(&[None], &[12]).to_string(),
            "Text(shape=(None,), dtype='uint8', max_shape=(12,))"
        );
        assert_eq!(
            TensorSpec::class_label_num_classes(3).to_string(),
            "ClassLabel(shape=(), dtype='int64', num_classes=3)"
        );
    }
}
