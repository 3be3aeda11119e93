#![allow(missing_docs)]

use std::{error::Error, sync::Arc};

use hub::{
    DataType, Dataset, DatasetError, Mode, Schema, TensorSpec, Value, ViewShape, idx,
    schema::SchemaDiff,
    storage::{
        ListableStorageTraits,
        storage_adapter::performance_metrics::PerformanceMetricsStorageAdapter,
        store::MemoryStore,
    },
};

fn ones(shape: &[u64]) -> Value {
    let len = shape.iter().product::<u64>() as usize;
    Value::Array(hub::TensorData::from_elements(shape.to_vec(), &vec![1.0f64; len]).unwrap())
}

#[test]
fn append_shape_and_reopen() -> Result<(), Box<dyn Error>> {
    let schema = Schema::builder()
        .field("a", TensorSpec::new(&[250, 300]))
        .field("b", DataType::Float32)
        .build()?;
    let dataset = Dataset::builder()
        .schema(schema.clone())
        .shape([100])
        .mode(Mode::Write)
        .open("memory://dataset_tests/append")?;
    dataset.tensor("a")?.view(&idx![0])?.set(ones(&[250, 300]))?;
    dataset.append_shape(20)?;
    assert_eq!(dataset.len(), 120);
    assert_eq!(
        dataset.tensor("a")?.shape()?,
        ViewShape::Fixed(vec![120, 250, 300])
    );
    assert_eq!(dataset.get(&idx!["a", 0, 249, 299])?.compute()?, Value::from(1.0f64));
    assert_eq!(dataset.get(&idx!["a", 110, 0, 0])?.compute()?, Value::from(0.0f64));
    dataset.close()?;

    let reopened = Dataset::open("memory://dataset_tests/append")?;
    assert_eq!(reopened.shape(), vec![120]);
    assert!(reopened.schema().diff(&schema).is_empty());
    assert_eq!(reopened.get(&idx!["a", 0, 10, 10])?.compute()?, Value::from(1.0f64));
    Ok(())
}

#[test]
fn append_allocates_no_chunks() -> Result<(), Box<dyn Error>> {
    let store = Arc::new(PerformanceMetricsStorageAdapter::new(Arc::new(MemoryStore::new())));
    let dataset = Dataset::builder()
        .schema(Schema::builder().field("x", DataType::Int64).build()?)
        .shape([2])
        .open_with_storage(store.clone(), "ds")?;
    dataset.set(&idx!["x"], vec![4i64, 5])?;
    dataset.flush()?;
    let keys = store.list()?.len();
    store.reset();
    dataset.append_shape(1000)?;
    dataset.flush()?;
    // only the metadata is rewritten
    assert_eq!(store.metrics().writes, 1);
    assert_eq!(store.list()?.len(), keys);
    assert_eq!(dataset.get(&idx!["x", 0..2])?.compute()?, Value::from(vec![4i64, 5]));
    assert_eq!(dataset.get(&idx!["x", 1001])?.compute()?, Value::from(0i64));
    Ok(())
}

#[test]
fn resize_shape_drops_samples() -> Result<(), Box<dyn Error>> {
    let dataset = Dataset::builder()
        .schema(
            Schema::builder()
                .field(
                    "x",
                    TensorSpec::new(&[2]).with_data_type(DataType::Int32).with_chunks(vec![3]),
                )
                .build()?,
        )
        .shape([8])
        .mode(Mode::Write)
        .open("memory://dataset_tests/resize")?;
    dataset.set(&idx!["x"], 7i32)?;
    dataset.resize_shape(4)?;
    assert_eq!(dataset.len(), 4);
    assert!(matches!(dataset.get(&idx!["x", 5])?.compute(), Err(DatasetError::Index(_))));
    dataset.resize_shape(8)?;
    assert_eq!(dataset.get(&idx!["x", 3])?.compute()?, Value::from(vec![7i32, 7]));
    assert_eq!(dataset.get(&idx!["x", 4])?.compute()?, Value::from(vec![0i32, 0]));
    assert_eq!(dataset.get(&idx!["x", 7])?.compute()?, Value::from(vec![0i32, 0]));
    Ok(())
}

#[test]
fn schema_mismatch_on_open() -> Result<(), Box<dyn Error>> {
    let base = || {
        Schema::builder()
            .field("image", TensorSpec::new(&[4, 4]).with_data_type(DataType::UInt8))
            .field("label", DataType::Int32)
    };
    Dataset::builder()
        .schema(base().build()?)
        .shape([2])
        .mode(Mode::Write)
        .open("memory://dataset_tests/mismatch")?
        .close()?;

    let open = |schema: Schema| {
        Dataset::builder()
            .schema(schema)
            .open("memory://dataset_tests/mismatch")
    };
    let mismatch = |schema: Schema| match open(schema) {
        Err(DatasetError::SchemaMismatch(diffs)) => diffs,
        other => panic!("expected a schema mismatch, got {other:?}"),
    };

    assert_eq!(
        mismatch(base().field("extra", DataType::Float32).build()?),
        vec![SchemaDiff::Added("extra".to_string())]
    );
    assert_eq!(
        mismatch(Schema::builder().field("label", DataType::Int32).build()?),
        vec![SchemaDiff::Removed("image".to_string())]
    );
    assert!(matches!(
        mismatch(
            Schema::builder()
                .field("image", TensorSpec::new(&[4, 4]).with_data_type(DataType::UInt8))
                .field("label", DataType::Int64)
                .build()?
        )
        .as_slice(),
        [SchemaDiff::DataType { .. }]
    ));
    assert!(matches!(
        mismatch(
            Schema::builder()
                .field("image", TensorSpec::new(&[4, 5]).with_data_type(DataType::UInt8))
                .field("label", DataType::Int32)
                .build()?
        )
        .as_slice(),
        [SchemaDiff::Shape { .. }]
    ));
    assert_eq!(open(base().build()?)?.len(), 2);
    Ok(())
}

#[test]
fn read_mode_rejects_mutations() -> Result<(), Box<dyn Error>> {
    Dataset::builder()
        .schema(Schema::builder().field("x", DataType::Int32).build()?)
        .shape([3])
        .mode(Mode::Write)
        .open("memory://dataset_tests/read_mode")?
        .set(&idx!["x", 1], 9i32)?;

    let dataset = Dataset::builder()
        .mode(Mode::Read)
        .open("memory://dataset_tests/read_mode")?;
    assert_eq!(dataset.get(&idx!["x", 1])?.compute()?, Value::from(9i32));
    assert!(matches!(dataset.set(&idx!["x", 0], 1i32), Err(DatasetError::ReadMode)));
    assert!(matches!(dataset.tensor("x")?.set(1i32), Err(DatasetError::ReadMode)));
    assert!(matches!(dataset.append_shape(1), Err(DatasetError::ReadMode)));
    assert!(matches!(dataset.resize_shape(1), Err(DatasetError::ReadMode)));
    assert!(matches!(dataset.rename("other"), Err(DatasetError::ReadMode)));
    assert!(matches!(dataset.delete(), Err(DatasetError::ReadMode)));
    dataset.flush()?;
    assert_eq!(dataset.len(), 3);
    Ok(())
}

#[test]
fn create_mode_errors() -> Result<(), Box<dyn Error>> {
    assert!(matches!(
        Dataset::open("memory://dataset_tests/missing"),
        Err(DatasetError::CreateMode(_))
    ));
    assert!(matches!(
        Dataset::builder()
            .mode(Mode::Read)
            .open("memory://dataset_tests/missing"),
        Err(DatasetError::CreateMode(_))
    ));
    let schema = Schema::builder().field("x", DataType::Int32).build()?;
    assert!(matches!(
        Dataset::builder()
            .schema(schema.clone())
            .shape(5u64)
            .open("memory://dataset_tests/missing"),
        Err(DatasetError::Type(_))
    ));
    assert!(matches!(
        Dataset::builder().schema(schema).shape([5, 5]).open("memory://dataset_tests/missing"),
        Err(DatasetError::Value(_))
    ));
    Ok(())
}

#[test]
fn metadata_round_trip() -> Result<(), Box<dyn Error>> {
    let mut meta_info = serde_json::Map::new();
    meta_info.insert("description".to_string(), "test data".into());
    let dataset = Dataset::builder()
        .schema(Schema::builder().field("x", DataType::Int32).build()?)
        .shape([3])
        .mode(Mode::Write)
        .name("first")
        .meta_information(meta_info.clone())
        .open("memory://dataset_tests/metadata")?;
    dataset.rename("second")?;
    let reopened = Dataset::open("memory://dataset_tests/metadata")?;
    assert_eq!(reopened.name().as_deref(), Some("second"));
    assert_eq!(reopened.meta_information(), meta_info);

    meta_info.insert("version".to_string(), 2.into());
    reopened.set_meta_information(meta_info.clone())?;
    reopened.save()?;
    assert_eq!(Dataset::open("memory://dataset_tests/metadata")?.meta_information(), meta_info);
    Ok(())
}

#[test]
fn write_mode_replaces_dataset() -> Result<(), Box<dyn Error>> {
    let store = Arc::new(MemoryStore::new());
    let dataset = Dataset::builder()
        .schema(Schema::builder().field("x", DataType::Int32).build()?)
        .shape([3])
        .open_with_storage(store.clone(), "")?;
    dataset.set(&idx!["x"], vec![1i32, 2, 3])?;
    drop(dataset);
    let dataset = Dataset::builder()
        .schema(Schema::builder().field("y", DataType::Int32).build()?)
        .shape([1])
        .mode(Mode::Write)
        .open_with_storage(store.clone(), "")?;
    assert!(matches!(dataset.tensor("x"), Err(DatasetError::Key(_))));
    assert!(
        store
            .list()?
            .iter()
            .all(|key| !key.as_str().starts_with("tensors/x/"))
    );
    Ok(())
}

#[cfg(feature = "filesystem")]
#[test]
fn filesystem_persistence() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let location = dir.path().join("ds");
    let location = location.to_str().ok_or("non utf-8 path")?;
    let dataset = Dataset::builder()
        .schema(
            Schema::builder()
                .field("image", TensorSpec::image(&[None, None, Some(3)], &[8, 8, 3]))
                .field("label", DataType::Int16)
                .build()?,
        )
        .shape([4])
        .open(location)?;
    dataset.set(
        &idx!["image", 2],
        Value::Array(hub::TensorData::zeros(DataType::UInt8, vec![2, 5, 3])),
    )?;
    dataset.set(&idx!["image", 2, 1, 4], vec![1u8, 2, 3])?;
    dataset.set(&idx!["label", 3], 12i16)?;
    dataset.close()?;
    assert!(dir.path().join("ds").join("meta.json").exists());

    let reopened = Dataset::builder()
        .mode(Mode::Read)
        .open(&format!("file://{location}"))?;
    assert_eq!(reopened.get(&idx!["label", 3])?.compute()?, Value::from(12i16));
    let image = reopened.tensor("image")?.view(&idx![2])?;
    assert_eq!(image.shape()?, ViewShape::Fixed(vec![2, 5, 3]));
    assert_eq!(
        image.view(&idx![1, 4])?.compute()?,
        Value::from(vec![1u8, 2, 3])
    );
    Ok(())
}

#[test]
fn display_names_schema_url_shape_and_mode() -> Result<(), Box<dyn Error>> {
    let dataset = Dataset::builder()
        .schema(
            Schema::builder()
                .field("label", TensorSpec::class_label_names(["a", "b"]))
                .build()?,
        )
        .shape([2])
        .mode(Mode::Write)
        .open("memory://dataset_tests/display")?;
    let display = dataset.to_string();
    assert!(display.starts_with("Dataset(schema=SchemaDict({'label': "));
    assert!(display.ends_with("url='memory://dataset_tests/display', shape=(2,), mode='w')"));
    assert_eq!(format!("{dataset:?}"), display);
    Ok(())
}
