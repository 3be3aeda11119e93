//! Copying and transforming dataset views into new datasets.

use hub_storage::{StorageError, store_url::Token};

use crate::{
    Dataset, DatasetError,
    dataset::{DatasetBuilder, DatasetMeta, META_KEY, Mode},
    location::resolve_location,
    schema::{Schema, join_path},
    slice::IndexItem,
    value::{Record, Value},
    view::{DatasetView, Indexes},
};

/// How an existing destination is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Overwrite {
    /// Refuse any non-empty destination.
    Never,
    /// Replace a destination holding a dataset with the same schema.
    Compatible,
}

/// Check that `destination` can receive a dataset with `schema`.
fn check_destination(
    destination: &str,
    token: &Token,
    schema: &Schema,
    overwrite: Overwrite,
) -> Result<(), DatasetError> {
    let resolved = resolve_location(destination, token)?;
    if resolved.storage.list_prefix(&resolved.prefix)?.is_empty() {
        return Ok(());
    }
    if overwrite == Overwrite::Compatible {
        let meta_key = resolved.prefix.key(META_KEY).map_err(StorageError::from)?;
        if let Some(bytes) = resolved.storage.get(&meta_key)? {
            let meta = DatasetMeta::from_json(&bytes)?;
            if meta.schema.diff(schema).is_empty() {
                log::debug!("replacing the dataset at {destination}");
                return Ok(());
            }
        }
    }
    Err(DatasetError::DirectoryNotEmpty(destination.to_string()))
}

impl DatasetView {
    fn copy_to(
        &self,
        destination: &str,
        token: Token,
        overwrite: Overwrite,
    ) -> Result<Dataset, DatasetError> {
        let source = self.dataset();
        let schema = self.schema()?;
        let samples = match self.indexes()? {
            Indexes::Single(sample) => vec![sample],
            Indexes::List(samples) => samples,
        };
        check_destination(destination, &token, &schema, overwrite)?;

        let mut builder = DatasetBuilder::new()
            .schema(schema.clone())
            .shape([samples.len() as u64])
            .mode(Mode::Write)
            .token(token)
            .meta_information(source.meta_information())
            .lazy(self.is_lazy());
        if let Some(name) = source.name() {
            builder = builder.name(name);
        }
        let copy = builder.open(destination)?;
        log::debug!(
            "copying {} samples from {} to {destination}",
            samples.len(),
            source.location_display()
        );
        {
            let source_state = source.read_state()?;
            let copy_state = copy.writable_state()?;
            for (path, _) in schema.leaves() {
                let tensor = source_state.tensor(&join_path(self.path(), &path))?;
                tensor.copy_samples(&samples, copy_state.tensor(&path)?, 0)?;
            }
        }
        copy.flush()?;
        Ok(copy)
    }

    /// Copy the visible samples to a new dataset at `destination`.
    ///
    /// The samples are written in ascending order from sample 0, with the schema, name and meta information of the source.
    ///
    /// # Errors
    /// Returns [`DatasetError::DirectoryNotEmpty`] if anything is stored at `destination`.
    pub fn copy(&self, destination: &str) -> Result<Dataset, DatasetError> {
        self.copy_with_token(destination, Token::new())
    }

    /// [`copy`](DatasetView::copy) with a token for the destination store.
    ///
    /// # Errors
    /// See [`copy`](DatasetView::copy).
    pub fn copy_with_token(
        &self,
        destination: &str,
        token: Token,
    ) -> Result<Dataset, DatasetError> {
        self.copy_to(destination, token, Overwrite::Never)
    }

    /// Store the visible samples at `destination`, replacing a dataset with the same schema.
    ///
    /// # Errors
    /// Returns [`DatasetError::DirectoryNotEmpty`] if `destination` holds anything other than a dataset with the same schema.
    pub fn store(&self, destination: &str) -> Result<Dataset, DatasetError> {
        self.store_with_token(destination, Token::new())
    }

    /// [`store`](DatasetView::store) with a token for the destination store.
    ///
    /// # Errors
    /// See [`store`](DatasetView::store).
    pub fn store_with_token(
        &self,
        destination: &str,
        token: Token,
    ) -> Result<Dataset, DatasetError> {
        self.copy_to(destination, token, Overwrite::Compatible)
    }

    /// Map each visible sample to a sample of a dataset with `schema`.
    ///
    /// `function` receives the record of a source sample and returns the record of the output sample.
    /// Fields missing from the returned record read as zero. Nothing is read until the transform is stored.
    ///
    /// ```
    /// # use hub::{Dataset, DataType, Mode, Record, Schema, TensorSpec, Value, idx};
    /// let dataset = Dataset::builder()
    ///     .schema(Schema::builder().field("x", DataType::Int32).build()?)
    ///     .shape([3])
    ///     .mode(Mode::Write)
    ///     .open("memory://doc/transform")?;
    /// dataset.set(&idx!["x"], vec![1i32, 2, 3])?;
    ///
    /// let schema = Schema::builder().field("half", TensorSpec::new(&[1])).build()?;
    /// let halves = dataset
    ///     .view()
    ///     .transform(schema, |record: Record| {
    ///         let x = record.get("x").and_then(Value::to_f64_vec).unwrap_or_default();
    ///         Ok(Record::new().with("half", x[0] / 2.0))
    ///     })
    ///     .store("memory://doc/transform_halves")?;
    /// assert_eq!(halves.get(&idx!["half", 2, 0])?.compute()?, Value::from(1.5f64));
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn transform<F>(&self, schema: Schema, function: F) -> Transform<F>
    where
        F: FnMut(Record) -> Result<Record, DatasetError>,
    {
        Transform {
            source: self.clone(),
            schema,
            function,
        }
    }

    /// The smallest number of samples per chunk over the leaves of the view.
    fn batch_len(&self) -> Result<u64, DatasetError> {
        let state = self.dataset().read_state()?;
        let mut batch = u64::MAX;
        for (path, _) in self.schema()?.leaves() {
            batch = batch.min(state.tensor(&join_path(self.path(), &path))?.sample_chunk());
        }
        Ok(batch.max(1))
    }
}

/// A per-sample transform of a [`DatasetView`] into a dataset with a new schema.
///
/// Created by [`DatasetView::transform`].
pub struct Transform<F> {
    source: DatasetView,
    schema: Schema,
    function: F,
}

impl<F> Transform<F>
where
    F: FnMut(Record) -> Result<Record, DatasetError>,
{
    /// The schema of the output dataset.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Apply the transform and store the output at `destination`, replacing a dataset with the same schema.
    ///
    /// Samples are read in batches of a source chunk and written in ascending order from sample 0.
    ///
    /// # Errors
    /// - [`DatasetError::DirectoryNotEmpty`] if `destination` holds anything other than a dataset with the output schema.
    /// - Any error returned by the transform function.
    /// - [`DatasetError::Key`] or [`DatasetError::ValueShape`] if a returned record does not fit the output schema.
    pub fn store(self, destination: &str) -> Result<Dataset, DatasetError> {
        self.store_with_token(destination, Token::new())
    }

    /// [`store`](Transform::store) with a token for the destination store.
    ///
    /// # Errors
    /// See [`store`](Transform::store).
    pub fn store_with_token(
        mut self,
        destination: &str,
        token: Token,
    ) -> Result<Dataset, DatasetError> {
        let source = self.source.dataset();
        let single = matches!(self.source.indexes()?, Indexes::Single(_));
        let count = self.source.len()?;
        check_destination(destination, &token, &self.schema, Overwrite::Compatible)?;

        let mut builder = DatasetBuilder::new()
            .schema(self.schema.clone())
            .shape([count])
            .mode(Mode::Write)
            .token(token)
            .meta_information(source.meta_information())
            .lazy(self.source.is_lazy());
        if let Some(name) = source.name() {
            builder = builder.name(name);
        }
        let output = builder.open(destination)?;
        log::debug!(
            "transforming {count} samples from {} to {destination}",
            source.location_display()
        );

        let batch = self.source.batch_len()?;
        let mut start = 0;
        while start < count {
            let stop = start.saturating_add(batch).min(count);
            let value = if single {
                self.source.compute()?
            } else {
                self.source.view(&[IndexItem::from(start..stop)])?.compute()?
            };
            for (sample, record) in (start..).zip(into_records(value)?) {
                let record = (self.function)(record)?;
                output.set(&[IndexItem::from(sample)], Value::Dict(record))?;
            }
            start = stop;
        }
        output.flush()?;
        Ok(output)
    }
}

impl<F> std::fmt::Debug for Transform<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transform")
            .field("source", &self.source)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

fn into_records(value: Value) -> Result<Vec<Record>, DatasetError> {
    let not_a_record = |value: &Value| {
        DatasetError::Value(format!("expected the record of a sample, got a {}", value.kind_name()))
    };
    match value {
        Value::Dict(record) => Ok(vec![record]),
        Value::List(values) => values
            .into_iter()
            .map(|value| match value {
                Value::Dict(record) => Ok(record),
                other => Err(not_a_record(&other)),
            })
            .collect(),
        other => Err(not_a_record(&other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data_type::DataType, filter::field, idx, schema::TensorSpec, value::Value};

    fn source(name: &str) -> Dataset {
        let schema = Schema::builder()
            .field("x", DataType::Int32)
            .field(
                "nested",
                Schema::builder().field(
                    "image",
                    TensorSpec::new_dynamic(&[None], &[4]).with_data_type(DataType::UInt8),
                ),
            )
            .build()
            .unwrap();
        let dataset = Dataset::builder()
            .schema(schema)
            .shape([4])
            .mode(Mode::Write)
            .name("source")
            .open(&format!("memory://copy_tests/{name}"))
            .unwrap();
        dataset.set(&idx!["x"], vec![10i32, 11, 12, 13]).unwrap();
        for sample in 0..4u64 {
            dataset
                .set(&idx!["nested/image", sample], vec![sample as u8; sample as usize + 1])
                .unwrap();
        }
        dataset
    }

    #[test]
    fn copy_filtered_view() {
        let dataset = source("filtered");
        let view = dataset.filter(&field("x").ge(12i32)).unwrap();
        let copy = view.copy("memory://copy_tests/filtered_copy").unwrap();
        assert_eq!(copy.len(), 2);
        assert_eq!(copy.name().as_deref(), Some("source"));
        assert_eq!(copy.get(&idx!["x"]).unwrap().compute().unwrap(), Value::from(vec![12i32, 13]));
        assert_eq!(
            copy.get(&idx!["nested/image", 1]).unwrap().compute().unwrap(),
            Value::from(vec![3u8; 4])
        );
        assert!(matches!(
            view.copy("memory://copy_tests/filtered_copy"),
            Err(DatasetError::DirectoryNotEmpty(_))
        ));
    }

    #[test]
    fn store_replaces_compatible() {
        let dataset = source("store");
        dataset.store("memory://copy_tests/store_copy").unwrap();
        let sub = dataset.view().view(&idx![1..3]).unwrap().into_dataset().unwrap();
        let stored = sub.store("memory://copy_tests/store_copy").unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(
            stored.get(&idx!["x"]).unwrap().compute().unwrap(),
            Value::from(vec![11i32, 12])
        );

        let nested = dataset.view().view(&idx!["nested"]).unwrap().into_dataset().unwrap();
        assert!(matches!(
            nested.store("memory://copy_tests/store_copy"),
            Err(DatasetError::DirectoryNotEmpty(_))
        ));
        let copy = nested.store("memory://copy_tests/store_nested").unwrap();
        assert_eq!(copy.schema().leaves().len(), 1);
        assert!(copy.tensor("image").is_ok());
    }
}
