//! Dataset schemas.
//!
//! A [`Schema`] is an ordered tree of named fields.
//! Interior nodes are nested schemas and leaves are [`TensorSpec`]s.
//! A leaf is addressed by its field path, e.g. `label/a` (a leading `/` is optional).
//!
//! Schemas are serialised to JSON as follows:
//!  - a scalar leaf with default options is its data type name, e.g. `"float64"`,
//!  - any other leaf is an object with a `kind` member naming the [`TensorKind`],
//!  - a nested schema is an object of its fields.

mod tensor_spec;

pub use tensor_spec::{ClassLabel, TensorKind, TensorSpec};
pub(crate) use tensor_spec::{format_max_shape, format_shape};

use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as JsonValue, json};
use thiserror::Error;

use crate::{
    codec::{CodecError, Compressor},
    data_type::{DataType, UnknownDataTypeError},
};

/// A schema error.
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    /// An invalid field name.
    #[error("invalid field name {0:?}, names must be non-empty, must not contain '/' and must not start with '__'")]
    InvalidFieldName(String),
    /// A duplicate field name.
    #[error("duplicate field {0}")]
    DuplicateField(String),
    /// An empty nested schema.
    #[error("the nested schema {0} has no fields")]
    EmptyDict(String),
    /// An invalid shape or max shape.
    #[error("invalid shape: {0}")]
    InvalidShape(String),
    /// Invalid chunks.
    #[error("invalid chunks: {0}")]
    InvalidChunks(String),
    /// An invalid class label.
    #[error("invalid class label: {0}")]
    InvalidClassLabel(String),
    /// An invalid JSON representation.
    #[error("invalid schema JSON: {0}")]
    InvalidJson(String),
    /// An unknown data type.
    #[error(transparent)]
    UnknownDataType(#[from] UnknownDataTypeError),
    /// An unknown compressor.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// A node of a [`Schema`].
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    /// A tensor leaf.
    Leaf(TensorSpec),
    /// A nested schema.
    Dict(Schema),
}

impl From<TensorSpec> for SchemaNode {
    fn from(spec: TensorSpec) -> Self {
        Self::Leaf(spec)
    }
}

impl From<DataType> for SchemaNode {
    fn from(data_type: DataType) -> Self {
        Self::Leaf(TensorSpec::primitive(data_type))
    }
}

impl From<Schema> for SchemaNode {
    fn from(schema: Schema) -> Self {
        Self::Dict(schema)
    }
}

impl From<SchemaBuilder> for SchemaNode {
    fn from(builder: SchemaBuilder) -> Self {
        Self::Dict(Schema {
            fields: builder.fields,
        })
    }
}

/// A borrowed schema node.
#[derive(Debug, Clone, Copy)]
pub enum SchemaNodeRef<'a> {
    /// A tensor leaf.
    Leaf(&'a TensorSpec),
    /// A (possibly root) schema.
    Dict(&'a Schema),
}

/// An ordered tree of named fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    fields: Vec<(String, SchemaNode)>,
}

/// A [`Schema`] builder.
///
/// Nested builders can be passed as fields and are validated by the outermost [`build`](SchemaBuilder::build).
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    fields: Vec<(String, SchemaNode)>,
}

impl SchemaBuilder {
    /// Create a new schema builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, node: impl Into<SchemaNode>) -> Self {
        self.fields.push((name.into(), node.into()));
        self
    }

    /// Build and validate the schema.
    ///
    /// # Errors
    /// Returns a [`SchemaError`] if a field name is invalid or duplicated or a leaf is invalid.
    pub fn build(self) -> Result<Schema, SchemaError> {
        let schema = Schema {
            fields: self.fields,
        };
        schema.validate("")?;
        Ok(schema)
    }
}

/// Normalise a field path to its non-empty `/` separated segments.
pub(crate) fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// Join two field paths.
pub(crate) fn join_path(parent: &str, child: &str) -> String {
    path_segments(parent).chain(path_segments(child)).join("/")
}

fn validate_field_name(name: &str) -> Result<(), SchemaError> {
    if name.is_empty() || name.contains('/') || name.starts_with("__") {
        Err(SchemaError::InvalidFieldName(name.to_string()))
    } else {
        Ok(())
    }
}

impl Schema {
    /// Create a [`SchemaBuilder`].
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Create a schema from fields.
    ///
    /// # Errors
    /// Returns a [`SchemaError`] if a field name is invalid or duplicated or a leaf is invalid.
    pub fn from_fields<K: Into<String>, N: Into<SchemaNode>>(
        fields: impl IntoIterator<Item = (K, N)>,
    ) -> Result<Self, SchemaError> {
        fields
            .into_iter()
            .fold(SchemaBuilder::new(), |builder, (name, node)| {
                builder.field(name, node)
            })
            .build()
    }

    /// Parse a schema from its JSON representation.
    ///
    /// # Errors
    /// Returns a [`SchemaError`] if the JSON is not a valid schema.
    pub fn parse(json: &str) -> Result<Self, SchemaError> {
        let value: JsonValue =
            serde_json::from_str(json).map_err(|err| SchemaError::InvalidJson(err.to_string()))?;
        Self::try_from(value)
    }

    fn validate(&self, path: &str) -> Result<(), SchemaError> {
        if !path.is_empty() && self.fields.is_empty() {
            return Err(SchemaError::EmptyDict(path.to_string()));
        }
        if let Some((name, _)) = self.fields.iter().duplicates_by(|(name, _)| name).next() {
            return Err(SchemaError::DuplicateField(join_path(path, name)));
        }
        for (name, node) in &self.fields {
            validate_field_name(name)?;
            match node {
                SchemaNode::Leaf(spec) => spec.validate()?,
                SchemaNode::Dict(schema) => schema.validate(&join_path(path, name))?,
            }
        }
        Ok(())
    }

    /// The fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &SchemaNode)> {
        self.fields.iter().map(|(name, node)| (name.as_str(), node))
    }

    /// Returns true if the schema has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Get a direct field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&SchemaNode> {
        self.fields
            .iter()
            .find_map(|(field, node)| (field == name).then_some(node))
    }

    /// Look up the node at `path`. The empty path is the schema itself.
    #[must_use]
    pub fn node(&self, path: &str) -> Option<SchemaNodeRef<'_>> {
        let mut node = SchemaNodeRef::Dict(self);
        for segment in path_segments(path) {
            node = match node {
                SchemaNodeRef::Dict(schema) => match schema.field(segment)? {
                    SchemaNode::Leaf(spec) => SchemaNodeRef::Leaf(spec),
                    SchemaNode::Dict(schema) => SchemaNodeRef::Dict(schema),
                },
                SchemaNodeRef::Leaf(_) => return None,
            };
        }
        Some(node)
    }

    /// The leaves in depth-first declaration order with their normalised paths.
    #[must_use]
    pub fn leaves(&self) -> Vec<(String, &TensorSpec)> {
        let mut leaves = Vec::new();
        self.collect_leaves("", &mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, path: &str, leaves: &mut Vec<(String, &'a TensorSpec)>) {
        for (name, node) in &self.fields {
            let path = join_path(path, name);
            match node {
                SchemaNode::Leaf(spec) => leaves.push((path, spec)),
                SchemaNode::Dict(schema) => schema.collect_leaves(&path, leaves),
            }
        }
    }

    /// Returns a copy where every leaf has a concrete compressor and chunk shape.
    #[must_use]
    pub(crate) fn resolved(&self, default_compressor: Compressor, chunk_target_bytes: u64) -> Self {
        Self {
            fields: self
                .fields
                .iter()
                .map(|(name, node)| {
                    let node = match node {
                        SchemaNode::Leaf(spec) => SchemaNode::Leaf(
                            spec.resolved(default_compressor, chunk_target_bytes),
                        ),
                        SchemaNode::Dict(schema) => SchemaNode::Dict(
                            schema.resolved(default_compressor, chunk_target_bytes),
                        ),
                    };
                    (name.clone(), node)
                })
                .collect(),
        }
    }

    /// Compare this (persisted) schema with `other`.
    ///
    /// Chunk shapes and compressors are storage options and are not compared.
    /// The schemas are compatible if the returned list is empty.
    #[must_use]
    pub fn diff(&self, other: &Self) -> Vec<SchemaDiff> {
        let mut diffs = Vec::new();
        self.diff_into(other, "", &mut diffs);
        diffs
    }

    fn diff_into(&self, other: &Self, path: &str, diffs: &mut Vec<SchemaDiff>) {
        for (name, node) in &self.fields {
            let field_path = join_path(path, name);
            match (node, other.field(name)) {
                (_, None) => diffs.push(SchemaDiff::Removed(field_path)),
                (SchemaNode::Dict(schema), Some(SchemaNode::Dict(other_schema))) => {
                    schema.diff_into(other_schema, &field_path, diffs);
                }
                (SchemaNode::Leaf(spec), Some(SchemaNode::Leaf(other_spec))) => {
                    diff_leaf(&field_path, spec, other_spec, diffs);
                }
                (_, Some(_)) => diffs.push(SchemaDiff::Structure(field_path)),
            }
        }
        for (name, _) in &other.fields {
            if self.field(name).is_none() {
                diffs.push(SchemaDiff::Added(join_path(path, name)));
            }
        }
    }
}

fn diff_leaf(path: &str, spec: &TensorSpec, other: &TensorSpec, diffs: &mut Vec<SchemaDiff>) {
    let same_kind = spec.kind().name() == other.kind().name()
        || matches!(
            (spec.kind(), other.kind()),
            (TensorKind::Tensor, TensorKind::Primitive)
                | (TensorKind::Primitive, TensorKind::Tensor)
        );
    if !same_kind {
        diffs.push(SchemaDiff::Kind {
            path: path.to_string(),
            expected: spec.kind().name(),
            found: other.kind().name(),
        });
    }
    if spec.data_type() != other.data_type() {
        diffs.push(SchemaDiff::DataType {
            path: path.to_string(),
            expected: spec.data_type(),
            found: other.data_type(),
        });
    }
    if spec.shape() != other.shape() {
        diffs.push(SchemaDiff::Shape {
            path: path.to_string(),
            expected: format_shape(spec.shape()),
            found: format_shape(other.shape()),
        });
    } else if spec.max_shape() != other.max_shape() {
        diffs.push(SchemaDiff::MaxShape {
            path: path.to_string(),
            expected: format_max_shape(spec.max_shape()),
            found: format_max_shape(other.max_shape()),
        });
    }
    if same_kind && spec.class_label() != other.class_label() {
        diffs.push(SchemaDiff::ClassLabel(path.to_string()));
    }
}

/// A difference between a persisted schema and a requested schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaDiff {
    /// A field is only in the requested schema.
    #[error("field {0} was added")]
    Added(String),
    /// A field is only in the persisted schema.
    #[error("field {0} was removed")]
    Removed(String),
    /// A field is a leaf in one schema and a nested schema in the other.
    #[error("field {0} changed between a leaf and a nested schema")]
    Structure(String),
    /// The leaf kind differs.
    #[error("field {path} kind changed from {expected} to {found}")]
    Kind {
        /// The field path.
        path: String,
        /// The persisted kind.
        expected: &'static str,
        /// The requested kind.
        found: &'static str,
    },
    /// The data type differs.
    #[error("field {path} data type changed from {expected} to {found}")]
    DataType {
        /// The field path.
        path: String,
        /// The persisted data type.
        expected: DataType,
        /// The requested data type.
        found: DataType,
    },
    /// The shape differs.
    #[error("field {path} shape changed from {expected} to {found}")]
    Shape {
        /// The field path.
        path: String,
        /// The persisted shape.
        expected: String,
        /// The requested shape.
        found: String,
    },
    /// The max shape differs.
    #[error("field {path} max_shape changed from {expected} to {found}")]
    MaxShape {
        /// The field path.
        path: String,
        /// The persisted max shape.
        expected: String,
        /// The requested max shape.
        found: String,
    },
    /// The class label classes differ.
    #[error("field {0} class label classes changed")]
    ClassLabel(String),
}

impl std::fmt::Display for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SchemaDict({")?;
        for (i, (name, node)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match node {
                SchemaNode::Leaf(spec) => write!(f, "'{name}': {spec}")?,
                SchemaNode::Dict(schema) => write!(f, "'{name}': {schema}")?,
            }
        }
        f.write_str("})")
    }
}

fn leaf_to_json(spec: &TensorSpec) -> JsonValue {
    if *spec.kind() == TensorKind::Primitive
        && spec.chunks().is_none()
        && spec.compressor().is_none()
    {
        return JsonValue::String(spec.data_type().name().to_string());
    }
    let mut object = Map::new();
    object.insert("kind".to_string(), json!(spec.kind().name()));
    object.insert("shape".to_string(), json!(spec.shape()));
    object.insert("max_shape".to_string(), json!(spec.max_shape()));
    object.insert("dtype".to_string(), json!(spec.data_type()));
    if let Some(chunks) = spec.chunks() {
        object.insert("chunks".to_string(), json!(chunks));
    }
    if let Some(compressor) = spec.compressor() {
        object.insert("compressor".to_string(), json!(compressor));
    }
    match spec.class_label() {
        Some(ClassLabel::Names(names)) => {
            object.insert("names".to_string(), json!(names));
        }
        Some(ClassLabel::NumClasses(num_classes)) => {
            object.insert("num_classes".to_string(), json!(num_classes));
        }
        None => {}
    }
    JsonValue::Object(object)
}

const LEAF_KINDS: [&str; 7] = [
    "tensor",
    "primitive",
    "image",
    "text",
    "bbox",
    "sequence",
    "class_label",
];

fn json_member<T: serde::de::DeserializeOwned>(
    object: &Map<String, JsonValue>,
    key: &str,
) -> Result<Option<T>, SchemaError> {
    object
        .get(key)
        .map(|value| {
            serde_json::from_value(value.clone())
                .map_err(|err| SchemaError::InvalidJson(format!("{key}: {err}")))
        })
        .transpose()
}

fn leaf_from_json(object: &Map<String, JsonValue>, kind: &str) -> Result<TensorSpec, SchemaError> {
    let shape: Vec<Option<u64>> = json_member(object, "shape")?.unwrap_or_default();
    let max_shape: Vec<u64> = json_member(object, "max_shape")?.unwrap_or_default();
    let names: Option<Vec<String>> = json_member(object, "names")?;
    let num_classes: Option<u64> = json_member(object, "num_classes")?;
    let mut spec = match kind {
        "tensor" => TensorSpec::new_dynamic(&shape, &max_shape),
        "primitive" => TensorSpec::primitive(DataType::Float64),
        "image" => TensorSpec::image(&shape, &max_shape),
        "text" => TensorSpec::text(&shape, &max_shape),
        "bbox" => TensorSpec::bbox(&shape, &max_shape),
        "sequence" => TensorSpec::sequence(&shape, &max_shape),
        _ => {
            let spec = match (names, num_classes) {
                (Some(names), None) => TensorSpec::class_label_names(names),
                (None, Some(num_classes)) => TensorSpec::class_label_num_classes(num_classes),
                _ => {
                    return Err(SchemaError::InvalidClassLabel(
                        "exactly one of names and num_classes must be given".to_string(),
                    ));
                }
            };
            spec.with_shape(&shape, &max_shape)
        }
    };
    if let Some(data_type) = object.get("dtype") {
        let data_type = data_type
            .as_str()
            .ok_or_else(|| SchemaError::InvalidJson("dtype must be a string".to_string()))?;
        spec = spec.with_data_type(data_type.parse()?);
    }
    if let Some(chunks) = json_member(object, "chunks")? {
        spec = spec.with_chunks(chunks);
    }
    if let Some(compressor) = object.get("compressor") {
        let compressor = compressor
            .as_str()
            .ok_or_else(|| SchemaError::InvalidJson("compressor must be a string".to_string()))?;
        spec = spec.with_compressor(compressor.parse()?);
    }
    Ok(spec)
}

fn node_from_json(value: JsonValue) -> Result<SchemaNode, SchemaError> {
    match value {
        JsonValue::String(data_type) => Ok(SchemaNode::from(data_type.parse::<DataType>()?)),
        JsonValue::Object(object) => match object.get("kind").and_then(JsonValue::as_str) {
            Some(kind) if LEAF_KINDS.contains(&kind) => {
                Ok(SchemaNode::Leaf(leaf_from_json(&object, kind)?))
            }
            _ => Ok(SchemaNode::Dict(fields_from_json(object)?)),
        },
        other => Err(SchemaError::InvalidJson(format!(
            "expected a data type name or an object, got {other}"
        ))),
    }
}

fn fields_from_json(object: Map<String, JsonValue>) -> Result<Schema, SchemaError> {
    let fields = object
        .into_iter()
        .map(|(name, value)| Ok((name, node_from_json(value)?)))
        .collect::<Result<Vec<_>, SchemaError>>()?;
    Ok(Schema { fields })
}

impl From<&Schema> for JsonValue {
    fn from(schema: &Schema) -> Self {
        let mut object = Map::new();
        for (name, node) in &schema.fields {
            let value = match node {
                SchemaNode::Leaf(spec) => leaf_to_json(spec),
                SchemaNode::Dict(schema) => Self::from(schema),
            };
            object.insert(name.clone(), value);
        }
        Self::Object(object)
    }
}

impl TryFrom<JsonValue> for Schema {
    type Error = SchemaError;

    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        let JsonValue::Object(object) = value else {
            return Err(SchemaError::InvalidJson(format!(
                "expected an object, got {value}"
            )));
        };
        let schema = fields_from_json(object)?;
        schema.validate("")?;
        Ok(schema)
    }
}

impl Serialize for Schema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        JsonValue::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        Self::try_from(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> Schema {
        Schema::builder()
            .field("image", TensorSpec::image(&[None, None, Some(3)], &[64, 64, 3]))
            .field(
                "label",
                Schema::builder()
                    .field("a", DataType::Int32)
                    .field("b", TensorSpec::new(&[2, 2]).with_data_type(DataType::UInt8)),
            )
            .field("text", TensorSpec::text(&[None], &[12]))
            .build()
            .unwrap()
    }

    #[test]
    fn schema_lookup() {
        let schema = sample_schema();
        assert!(matches!(schema.node(""), Some(SchemaNodeRef::Dict(_))));
        assert!(matches!(schema.node("/label"), Some(SchemaNodeRef::Dict(_))));
        assert!(matches!(schema.node("label/a"), Some(SchemaNodeRef::Leaf(_))));
        assert!(matches!(schema.node("/label/b/"), Some(SchemaNodeRef::Leaf(_))));
        assert!(schema.node("label/c").is_none());
        assert!(schema.node("label/a/x").is_none());
        let paths = schema.leaves().into_iter().map(|(path, _)| path).collect_vec();
        assert_eq!(paths, vec!["image", "label/a", "label/b", "text"]);
    }

    #[test]
    fn schema_validation() {
        assert!(matches!(
            Schema::builder().field("a/b", DataType::Int8).build(),
            Err(SchemaError::InvalidFieldName(_))
        ));
        assert!(matches!(
            Schema::builder().field("__c", DataType::Int8).build(),
            Err(SchemaError::InvalidFieldName(_))
        ));
        assert!(matches!(
            Schema::builder()
                .field("a", DataType::Int8)
                .field("a", DataType::Int16)
                .build(),
            Err(SchemaError::DuplicateField(name)) if name == "a"
        ));
        assert!(matches!(
            Schema::builder().field("a", Schema::builder()).build(),
            Err(SchemaError::EmptyDict(_))
        ));
        assert!(matches!(
            Schema::builder()
                .field("a", TensorSpec::new_dynamic(&[Some(120), Some(3)], &[120, 4]))
                .build(),
            Err(SchemaError::InvalidShape(_))
        ));
    }

    #[test]
    fn schema_json() {
        let schema = sample_schema();
        let json = serde_json::to_string(&schema).unwrap();
        let parsed: Schema = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, schema);

        let parsed = Schema::parse(
            r#"{"x": "float", "kind": "int", "y": {"kind": "class_label", "names": ["a", "b"]}}"#,
        )
        .unwrap();
        assert!(matches!(
            parsed.node("x"),
            Some(SchemaNodeRef::Leaf(spec)) if spec.data_type() == DataType::Float64
        ));
        assert!(matches!(
            parsed.node("kind"),
            Some(SchemaNodeRef::Leaf(spec)) if spec.data_type() == DataType::Int64
        ));
        assert!(matches!(
            parsed.node("y"),
            Some(SchemaNodeRef::Leaf(spec)) if spec.class_label().is_some()
        ));
        assert!(Schema::parse(r#"{"y": {"kind": "class_label"}}"#).is_err());
        assert!(Schema::parse(r#"{"y": "complex"}"#).is_err());
        assert!(Schema::parse(r#"[1]"#).is_err());
    }

    #[test]
    fn schema_diff() {
        let schema = sample_schema();
        assert!(schema.diff(&schema).is_empty());
        let resolved = schema.resolved(Compressor::None, 1024);
        assert!(resolved.diff(&schema).is_empty());

        let other = Schema::builder().field("hello", DataType::UInt8).build().unwrap();
        let diffs = schema.diff(&other);
        assert!(diffs.contains(&SchemaDiff::Removed("image".to_string())));
        assert!(diffs.contains(&SchemaDiff::Added("hello".to_string())));

        let other = Schema::builder()
            .field("image", TensorSpec::image(&[None, None, Some(3)], &[64, 64, 3]))
            .field("label", DataType::Int32)
            .field("text", TensorSpec::text(&[None], &[13]))
            .build()
            .unwrap();
        let diffs = schema.diff(&other);
        assert_eq!(
            diffs,
            vec![
                SchemaDiff::Structure("label".to_string()),
                SchemaDiff::MaxShape {
                    path: "text".to_string(),
                    expected: "(12,)".to_string(),
                    found: "(13,)".to_string()
                }
            ]
        );
    }

    #[test]
    fn schema_display() {
        let schema = Schema::builder()
            .field("first", TensorSpec::new(&[2]))
            .field("second", DataType::Float64)
            .field("text", TensorSpec::text(&[None], &[12]))
            .build()
            .unwrap();
        assert_eq!(
            schema.to_string(),
            "SchemaDict({'first': Tensor(shape=(2,), dtype='float64'), 'second': 'float64', 'text': Text(shape=(None,), dtype='uint8', max_shape=(12,))})"
        );
    }
}
