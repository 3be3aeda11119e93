#![allow(missing_docs)]

use std::error::Error;

use hub::{
    ComputeOptions, DataType, Dataset, DatasetError, DatasetView, ELLIPSIS, IndexItem, Indexes,
    Item, Mode, Record, Schema, TensorData, TensorSpec, TensorView, Value, ViewShape, idx,
};

fn arange(shape: &[u64]) -> Value {
    let len = shape.iter().product::<u64>() as i32;
    Value::Array(TensorData::from_elements(shape.to_vec(), &(0..len).collect::<Vec<_>>()).unwrap())
}

fn grid_dataset(name: &str, lazy: bool) -> Result<Dataset, Box<dyn Error>> {
    let schema = Schema::builder()
        .field("grid", TensorSpec::new(&[3, 4]).with_data_type(DataType::Int32))
        .field(
            "meta",
            Schema::builder()
                .field("id", DataType::Int64)
                .field("tag", TensorSpec::text(&[None], &[8])),
        )
        .build()?;
    let dataset = Dataset::builder()
        .schema(schema)
        .shape([5])
        .mode(Mode::Write)
        .lazy(lazy)
        .open(&format!("memory://view_tests/{name}"))?;
    dataset.set(&idx!["grid"], arange(&[5, 3, 4]))?;
    dataset.set(&idx!["meta/id"], vec![10i64, 11, 12, 13, 14])?;
    dataset.set(&idx!["meta", "tag"], vec!["a", "bb", "ccc", "dddd", "e"])?;
    Ok(dataset)
}

#[test]
fn lazy_and_eager_indexing() -> Result<(), Box<dyn Error>> {
    let dataset = grid_dataset("lazy_eager", true)?;
    let item = dataset.get(&idx!["grid", 1, 2])?;
    let Item::Tensor(view) = item else {
        panic!("expected a tensor view");
    };
    assert_eq!(view.compute()?, Value::from(vec![20i32, 21, 22, 23]));

    let mut eager = dataset.clone();
    eager.disable_lazy();
    assert!(!eager.is_lazy());
    assert_eq!(
        eager.get(&idx!["grid", 1, 2])?.into_value(),
        Some(Value::from(vec![20i32, 21, 22, 23]))
    );
    assert!(matches!(eager.get(&idx!["meta"])?, Item::Value(Value::List(_))));
    assert!(dataset.is_lazy());
    Ok(())
}

#[test]
fn composition_matches_single_index() -> Result<(), Box<dyn Error>> {
    let dataset = grid_dataset("composition", true)?;
    let grid = dataset.tensor("grid")?;
    let composed = grid.view(&idx![1..4])?.view(&idx![1])?.view(&idx![.., 1..3])?;
    let direct = grid.view(&idx![2, .., 1..3])?;
    assert_eq!(composed.compute()?, direct.compute()?);
    assert_eq!(composed.shape()?, ViewShape::Fixed(vec![3, 2]));

    let nested = dataset.get(&idx![1..3])?.into_dataset().unwrap();
    let nested = nested.view(&idx!["grid", 1])?.into_tensor().unwrap();
    assert_eq!(nested.compute()?, dataset.get(&idx!["grid", 2])?.compute()?);

    let ellipsis = grid.view(&idx![ELLIPSIS, 3])?;
    assert_eq!(ellipsis.shape()?, ViewShape::Fixed(vec![5, 3]));
    assert_eq!(
        grid.view(&idx![0, ELLIPSIS])?.compute()?,
        grid.view(&idx![0])?.compute()?
    );
    Ok(())
}

#[test]
fn index_errors_surface_at_compute() -> Result<(), Box<dyn Error>> {
    let dataset = grid_dataset("index_errors", true)?;
    let view = dataset.get(&idx!["grid", 7])?;
    assert!(matches!(view.compute(), Err(DatasetError::Index(_))));
    let view = dataset.tensor("grid")?.view(&idx![0, 0, 0, 0])?;
    assert!(matches!(view.compute(), Err(DatasetError::Index(_))));
    assert!(matches!(
        dataset.get(&idx!["grid", IndexItem::slice(None, None, Some(2))])?.compute(),
        Err(DatasetError::Value(_))
    ));
    assert!(matches!(dataset.get(&idx!["grid", 1.5]), Err(DatasetError::Type(_))));
    assert!(matches!(dataset.get(&idx!["missing"]), Err(DatasetError::Key(_))));
    assert!(matches!(dataset.get(&idx!["meta/missing"]), Err(DatasetError::Key(_))));

    let mut eager = dataset.clone();
    eager.disable_lazy();
    assert!(matches!(eager.get(&idx!["grid", 7]), Err(DatasetError::Index(_))));
    Ok(())
}

#[test]
fn dictionary_views_materialize_records() -> Result<(), Box<dyn Error>> {
    let dataset = grid_dataset("records", true)?;
    let sample = dataset.get(&idx![3])?.compute()?;
    let Value::Dict(record) = sample else {
        panic!("expected a record");
    };
    assert_eq!(record.keys().collect::<Vec<_>>(), vec!["grid", "meta"]);
    assert_eq!(
        record.get("meta"),
        Some(&Value::Dict(
            Record::new().with("id", 13i64).with("tag", "dddd")
        ))
    );

    let meta = dataset.get(&idx!["meta", 1..3])?.compute()?;
    assert_eq!(
        meta,
        Value::List(vec![
            Value::Dict(Record::new().with("id", 11i64).with("tag", "bb")),
            Value::Dict(Record::new().with("id", 12i64).with("tag", "ccc")),
        ])
    );
    Ok(())
}

#[test]
fn dictionary_assignment() -> Result<(), Box<dyn Error>> {
    let dataset = grid_dataset("assignment", true)?;
    dataset.set(
        &idx!["meta", 0],
        Record::new().with("id", 99i64).with("tag", "zz"),
    )?;
    assert_eq!(dataset.get(&idx!["meta/id", 0])?.compute()?, Value::from(99i64));
    assert_eq!(dataset.get(&idx!["meta/tag", 0])?.compute()?, Value::from("zz"));
    assert!(matches!(
        dataset.set(&idx!["meta", 0], 1i64),
        Err(DatasetError::ValueShape(_))
    ));
    assert!(matches!(
        dataset.set(&idx!["meta", 0], Record::new().with("unknown", 1i64)),
        Err(DatasetError::Key(_))
    ));
    assert!(matches!(
        dataset.set(&idx!["grid", 0], arange(&[4, 3])),
        Err(DatasetError::ValueShape(_))
    ));
    Ok(())
}

#[test]
fn iteration_is_finite_and_restartable() -> Result<(), Box<dyn Error>> {
    let dataset = grid_dataset("iteration", true)?;
    let ids = dataset.tensor("meta/id")?.view(&idx![1..4])?;
    let first = ids.iter()?.map(|view| view.compute()).collect::<Result<Vec<_>, _>>()?;
    let second = ids.iter()?.map(|view| view.compute()).collect::<Result<Vec<_>, _>>()?;
    assert_eq!(first, vec![Value::from(11i64), Value::from(12i64), Value::from(13i64)]);
    assert_eq!(first, second);

    let rows = dataset.tensor("grid")?.view(&idx![4])?;
    assert_eq!(rows.len()?, 3);
    assert_eq!(rows.iter()?.count(), 3);
    assert!(matches!(
        dataset.tensor("grid")?.view(&idx![4, 0, 0])?.len(),
        Err(DatasetError::Type(_))
    ));

    let view = dataset.view();
    let samples = view.iter()?.collect::<Vec<DatasetView>>();
    assert_eq!(samples.len(), 5);
    assert_eq!(samples[2].indexes()?, Indexes::Single(2));
    Ok(())
}

#[test]
fn class_label_names() -> Result<(), Box<dyn Error>> {
    let dataset = Dataset::builder()
        .schema(
            Schema::builder()
                .field("cl", TensorSpec::class_label_names(["cat", "dog", "horse"]))
                .build()?,
        )
        .shape([5])
        .mode(Mode::Write)
        .open("memory://view_tests/class_labels")?;
    dataset.set(&idx!["cl"], vec![1i64, 2, 0, 0, 0])?;
    let labels = dataset
        .tensor("cl")?
        .compute_opt(&ComputeOptions { label_name: true })?;
    assert_eq!(labels, Value::from(vec!["dog", "horse", "cat", "cat", "cat"]));
    assert_eq!(
        dataset.tensor("cl")?.compute()?,
        Value::from(vec![1i64, 2, 0, 0, 0])
    );
    assert!(matches!(
        dataset.set(&idx!["cl", 0], 3i64),
        Err(DatasetError::ClassLabelValue(_))
    ));
    assert!(matches!(
        dataset.set(&idx!["cl", 0], "bird"),
        Err(DatasetError::ClassLabelValue(_))
    ));
    Ok(())
}

#[test]
fn text_round_trip() -> Result<(), Box<dyn Error>> {
    let dataset = grid_dataset("text", true)?;
    let tags = dataset.tensor("meta/tag")?;
    assert_eq!(tags.view(&idx![2])?.compute()?, Value::from("ccc"));
    tags.view(&idx![2])?.set("x")?;
    assert_eq!(tags.view(&idx![2])?.compute()?, Value::from("x"));
    assert!(matches!(
        tags.view(&idx![2])?.set("too long for eight"),
        Err(DatasetError::ValueShape(_))
    ));
    assert_eq!(
        tags.compute()?,
        Value::from(vec!["a", "bb", "x", "dddd", "e"])
    );
    Ok(())
}

#[test]
fn views_round_trip_through_serde() -> Result<(), Box<dyn Error>> {
    let dataset = grid_dataset("serde", true)?;
    let view: TensorView = dataset.tensor("grid")?.view(&idx![1..3, 2])?;
    let json = serde_json::to_string(&view)?;
    let reopened: TensorView = serde_json::from_str(&json)?;
    assert_eq!(reopened.compute()?, view.compute()?);
    assert_eq!(reopened.dataset().mode(), Mode::Append);

    let filtered = dataset.filter(&hub::field("meta/id").ge(13i64))?;
    let json = serde_json::to_string(&filtered)?;
    let reopened: DatasetView = serde_json::from_str(&json)?;
    assert_eq!(reopened.indexes()?, Indexes::List(vec![3, 4]));
    assert_eq!(reopened.compute()?, filtered.compute()?);
    Ok(())
}

#[cfg(feature = "ndarray")]
#[test]
fn tensor_view_ndarray() -> Result<(), Box<dyn Error>> {
    let dataset = grid_dataset("ndarray", true)?;
    let array = dataset.tensor("grid")?.view(&idx![1..3, .., 0])?.ndarray::<i64>()?;
    assert_eq!(array.shape(), &[2, 3]);
    assert_eq!(array[[1, 2]], 32);
    assert!(matches!(
        dataset.tensor("meta/tag")?.view(&idx![0..2])?.ndarray::<u8>(),
        Err(DatasetError::Type(_))
    ));
    Ok(())
}
