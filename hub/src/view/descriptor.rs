//! Serialization of datasets and views as reopenable descriptors.
//!
//! A descriptor holds the location, token and mode of the dataset and the selection of the view.
//! Serializing flushes the dataset metadata, deserializing reopens the dataset at its location.
//! A dataset serialized in [`Mode::Write`] is reopened in [`Mode::Append`] so that its content is kept.

use hub_storage::store_url::Token;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de, ser};

use super::{DatasetView, SampleSet, TensorView, ViewState};
use crate::{
    Dataset,
    dataset::{DatasetBuilder, Mode},
    slice::Selector,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum DescriptorKind {
    Dataset,
    DatasetView,
    TensorView,
}

#[derive(Debug, Serialize, Deserialize)]
struct Descriptor {
    kind: DescriptorKind,
    url: String,
    #[serde(default, skip_serializing_if = "Token::is_empty")]
    token: Token,
    mode: Mode,
    #[serde(default)]
    path: String,
    #[serde(default = "default_base")]
    base: SampleSet,
    #[serde(default)]
    layers: Vec<Vec<Selector>>,
    lazy: bool,
}

fn default_base() -> SampleSet {
    SampleSet::All
}

impl Descriptor {
    fn from_state<E: ser::Error>(state: &ViewState, kind: DescriptorKind) -> Result<Self, E> {
        let dataset = &state.dataset;
        let url = dataset.location().ok_or_else(|| {
            E::custom("a dataset opened with a storage cannot be serialized, open it from a location")
        })?;
        dataset.flush().map_err(E::custom)?;
        Ok(Self {
            kind,
            url: url.to_string(),
            token: dataset.token().clone(),
            mode: dataset.mode(),
            path: state.path.clone(),
            base: state.base.clone(),
            layers: state.layers.clone(),
            lazy: state.lazy,
        })
    }

    fn into_state<E: de::Error>(self, kind: DescriptorKind) -> Result<ViewState, E> {
        if self.kind != kind {
            return Err(E::custom(format!(
                "expected a {kind:?} descriptor, got a {:?} descriptor",
                self.kind
            )));
        }
        let mode = match self.mode {
            Mode::Write => Mode::Append,
            mode => mode,
        };
        let dataset = DatasetBuilder::new()
            .mode(mode)
            .token(self.token)
            .lazy(self.lazy)
            .open(&self.url)
            .map_err(E::custom)?;
        Ok(ViewState {
            dataset,
            path: self.path,
            base: self.base,
            layers: self.layers,
            lazy: self.lazy,
        })
    }
}

impl Serialize for Dataset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Descriptor::from_state(&self.view().state, DescriptorKind::Dataset)?.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Dataset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Descriptor::deserialize(deserializer)?
            .into_state(DescriptorKind::Dataset)?
            .dataset)
    }
}

impl Serialize for DatasetView {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Descriptor::from_state(&self.state, DescriptorKind::DatasetView)?.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DatasetView {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_state(
            Descriptor::deserialize(deserializer)?.into_state(DescriptorKind::DatasetView)?,
        ))
    }
}

impl Serialize for TensorView {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Descriptor::from_state(&self.state, DescriptorKind::TensorView)?.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TensorView {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_state(
            Descriptor::deserialize(deserializer)?.into_state(DescriptorKind::TensorView)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data_type::DataType, idx, schema::Schema, value::Value};

    #[test]
    fn descriptor_roundtrip() {
        let dataset = Dataset::builder()
            .schema(Schema::builder().field("x", DataType::Int32).build().unwrap())
            .shape([4])
            .mode(Mode::Write)
            .lazy(true)
            .open("memory://descriptor_roundtrip/ds")
            .unwrap();
        dataset.set(&idx!["x"], Value::from(vec![1i32, 2, 3, 4])).unwrap();
        let view = dataset.get(&idx!["x", 1..3]).unwrap().into_tensor().unwrap();
        let json = serde_json::to_string(&view).unwrap();
        assert!(json.contains(r#""mode":"w""#));
        let reopened: TensorView = serde_json::from_str(&json).unwrap();
        assert_eq!(reopened.dataset().mode(), Mode::Append);
        assert_eq!(reopened.compute().unwrap(), Value::from(vec![2i32, 3]));
        assert!(serde_json::from_str::<DatasetView>(&json).is_err());

        let json = serde_json::to_string(&dataset).unwrap();
        let reopened: Dataset = serde_json::from_str(&json).unwrap();
        assert_eq!(reopened.len(), 4);
        assert!(reopened.is_lazy());
    }

    #[test]
    fn descriptor_requires_location() {
        let dataset = Dataset::builder()
            .schema(Schema::builder().field("x", DataType::Int32).build().unwrap())
            .shape([1])
            .open_with_storage(std::sync::Arc::new(hub_storage::store::MemoryStore::new()), "")
            .unwrap();
        assert!(serde_json::to_string(&dataset).is_err());
    }
}
