//! The persisted dataset metadata record.

use serde::{Deserialize, Serialize};

use crate::{DatasetError, schema::Schema};

/// The metadata format version written by this crate.
pub(crate) const META_VERSION: u32 = 1;

/// The key of the metadata record below the dataset prefix.
pub(crate) const META_KEY: &str = "meta.json";

/// The dataset metadata stored at `<dataset>/meta.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct DatasetMeta {
    pub(crate) version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,
    pub(crate) shape: Vec<u64>,
    pub(crate) schema: Schema,
    #[serde(default)]
    pub(crate) meta_info: serde_json::Map<String, serde_json::Value>,
}

impl DatasetMeta {
    pub(crate) fn new(schema: Schema, shape: Vec<u64>) -> Self {
        Self {
            version: META_VERSION,
            name: None,
            shape,
            schema,
            meta_info: serde_json::Map::new(),
        }
    }

    pub(crate) fn to_json(&self) -> Result<Vec<u8>, DatasetError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub(crate) fn from_json(bytes: &[u8]) -> Result<Self, DatasetError> {
        let meta: Self = serde_json::from_slice(bytes)?;
        if meta.version > META_VERSION {
            return Err(DatasetError::Metadata(format!(
                "the metadata version {} is newer than the supported version {META_VERSION}",
                meta.version
            )));
        }
        if meta.version < META_VERSION {
            log::warn!(
                "reading dataset metadata version {}, the current version is {META_VERSION}",
                meta.version
            );
        }
        if meta.shape.len() != 1 {
            return Err(DatasetError::Metadata(format!(
                "unsupported dataset shape {:?}",
                meta.shape
            )));
        }
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data_type::DataType, schema::TensorSpec};

    #[test]
    fn dataset_meta_json() {
        let schema = Schema::builder()
            .field("image", TensorSpec::image(&[None, None, Some(3)], &[32, 32, 3]))
            .field("label", DataType::Int32)
            .build()
            .unwrap();
        let mut meta = DatasetMeta::new(schema, vec![10]);
        meta.name = Some("mnist".to_string());
        meta.meta_info.insert("author".to_string(), serde_json::json!("me"));
        let json = meta.to_json().unwrap();
        assert_eq!(DatasetMeta::from_json(&json).unwrap(), meta);
    }

    #[test]
    fn dataset_meta_version() {
        let json = r#"{"version": 2, "shape": [1], "schema": {"a": "float32"}}"#;
        assert!(matches!(
            DatasetMeta::from_json(json.as_bytes()),
            Err(DatasetError::Metadata(_))
        ));
        let json = r#"{"version": 0, "shape": [1], "schema": {"a": "float32"}}"#;
        assert!(DatasetMeta::from_json(json.as_bytes()).is_ok());
        assert!(DatasetMeta::from_json(b"{").is_err());
    }
}
