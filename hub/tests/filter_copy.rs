#![allow(missing_docs)]

use std::error::Error;

use hub::{
    DataType, Dataset, DatasetError, DatasetView, FnPredicate, Indexes, Mode, Record, Schema,
    TensorSpec, Value, field, idx,
};

fn animals(name: &str) -> Result<Dataset, Box<dyn Error>> {
    let schema = Schema::builder()
        .field("label", TensorSpec::class_label_names(["cat", "dog", "horse"]))
        .field(
            "info",
            Schema::builder()
                .field("weight", DataType::Float32)
                .field("name", TensorSpec::text(&[None], &[16])),
        )
        .build()?;
    let dataset = Dataset::builder()
        .schema(schema)
        .shape([6])
        .mode(Mode::Write)
        .open(&format!("memory://filter_copy_tests/{name}"))?;
    dataset.set(&idx!["label"], vec![1i64, 2, 0, 1, 1, 0])?;
    dataset.set(&idx!["info/weight"], vec![12.5f32, 500.0, 4.0, 30.0, 8.0, 3.5])?;
    dataset.set(
        &idx!["info/name"],
        vec!["rex", "spirit", "tom", "lassie", "bo", "felix"],
    )?;
    Ok(dataset)
}

#[test]
fn filter_by_class_name_and_value() -> Result<(), Box<dyn Error>> {
    let dataset = animals("class_name")?;
    let dogs = dataset.filter(&field("label").eq("dog"))?;
    assert_eq!(dogs.indexes()?, Indexes::List(vec![0, 3, 4]));
    assert_eq!(
        dogs.tensor("info/name")?.compute()?,
        Value::from(vec!["rex", "lassie", "bo"])
    );

    let heavy_dogs = dogs.filter(&field("info/weight").gt(10.0))?;
    assert_eq!(heavy_dogs.indexes()?, Indexes::List(vec![0, 3]));

    let named = dataset.filter(&field("info/name").starts_with("f").or(field("label").eq(2i64)))?;
    assert_eq!(named.indexes()?, Indexes::List(vec![1, 5]));

    let none = dataset.filter(&field("info/weight").lt(0.0))?;
    assert!(none.is_empty()?);
    assert_eq!(none.compute()?, Value::List(Vec::new()));
    Ok(())
}

#[test]
fn filter_with_closure() -> Result<(), Box<dyn Error>> {
    let dataset = animals("closure")?;
    let predicate = FnPredicate::with_fields(["info/name"], |sample: &DatasetView| {
        let name = sample.tensor("info/name")?.compute()?;
        Ok(name.as_text().is_some_and(|name| name.len() > 3))
    });
    let long_names = dataset.filter(&predicate)?;
    assert_eq!(long_names.indexes()?, Indexes::List(vec![1, 3, 5]));

    let sub = dataset.get(&idx![2..5])?.into_dataset().ok_or("expected a dataset view")?;
    let filtered = sub.filter(&predicate)?;
    assert_eq!(filtered.indexes()?, Indexes::List(vec![3]));

    let unknown = FnPredicate::with_fields(["info/unknown"], |_: &DatasetView| Ok(true));
    assert!(matches!(dataset.filter(&unknown), Err(DatasetError::Key(_))));

    // a bare closure is only checked when it reads a sample
    let reads_unknown = |sample: &DatasetView| -> Result<bool, DatasetError> {
        sample.tensor("info/unknown")?;
        Ok(true)
    };
    assert!(matches!(dataset.filter(&reads_unknown), Err(DatasetError::Key(_))));
    let empty = dataset.filter(&field("info/weight").lt(0.0))?;
    assert!(empty.filter(&reads_unknown)?.is_empty()?);
    assert!(matches!(empty.filter(&unknown), Err(DatasetError::Key(_))));
    Ok(())
}

#[test]
fn copy_and_store_views() -> Result<(), Box<dyn Error>> {
    let dataset = animals("copy")?;
    let cats = dataset.filter(&field("label").eq("cat"))?;
    let copy = cats.copy("memory://filter_copy_tests/cats")?;
    assert_eq!(copy.len(), 2);
    assert_eq!(copy.schema(), dataset.schema());
    assert_eq!(copy.get(&idx!["info/name"])?.compute()?, Value::from(vec!["tom", "felix"]));
    assert!(matches!(
        cats.copy("memory://filter_copy_tests/cats"),
        Err(DatasetError::DirectoryNotEmpty(_))
    ));

    let horses = dataset.filter(&field("label").eq("horse"))?;
    let stored = horses.store("memory://filter_copy_tests/cats")?;
    assert_eq!(stored.len(), 1);
    assert_eq!(
        Dataset::open("memory://filter_copy_tests/cats")?.get(&idx!["info/weight", 0])?.compute()?,
        Value::from(500.0f32)
    );
    Ok(())
}

#[test]
fn transform_casts_into_a_new_schema() -> Result<(), Box<dyn Error>> {
    let source = Dataset::builder()
        .schema(Schema::builder().field("id", DataType::Int64).build()?)
        .shape([100])
        .mode(Mode::Write)
        .open("memory://filter_copy_tests/casting_source")?;
    let schema = Schema::builder().field("a", TensorSpec::new(&[1])).build()?;
    let output = source
        .transform(schema.clone(), |_: Record| Ok(Record::new().with("a", 2.4f64)))
        .store("memory://filter_copy_tests/casting")?;
    assert_eq!(output.len(), 100);
    assert!(output.schema().diff(&schema).is_empty());
    assert_eq!(output.get(&idx!["a", 30])?.compute()?, Value::from(vec![2.4f64]));
    assert_eq!(
        Dataset::open("memory://filter_copy_tests/casting")?.get(&idx!["a", 99, 0])?.compute()?,
        Value::from(2.4f64)
    );
    Ok(())
}

#[test]
fn transform_filtered_view() -> Result<(), Box<dyn Error>> {
    let dataset = animals("transform")?;
    let schema = Schema::builder()
        .field("name", TensorSpec::text(&[None], &[32]))
        .field("heavy", DataType::Bool)
        .build()?;
    let mut seen = 0;
    let dogs = dataset.filter(&field("label").eq("dog"))?;
    let output = dogs
        .transform(schema, |record: Record| {
            seen += 1;
            let Some(Value::Dict(info)) = record.get("info") else {
                return Err(DatasetError::Key("info".to_string()));
            };
            let name = info.get("name").and_then(Value::as_text).unwrap_or_default();
            let weight = info.get("weight").and_then(Value::to_f64_vec).unwrap_or_default();
            Ok(Record::new()
                .with("name", format!("{name} the dog"))
                .with("heavy", weight.first().is_some_and(|&weight| weight > 10.0)))
        })
        .store("memory://filter_copy_tests/dogs")?;
    assert_eq!(seen, 3);
    assert_eq!(
        output.get(&idx!["name"])?.compute()?,
        Value::from(vec!["rex the dog", "lassie the dog", "bo the dog"])
    );
    assert_eq!(
        output.get(&idx!["heavy"])?.compute()?.to_f64_vec(),
        Some(vec![1.0, 1.0, 0.0])
    );

    let unknown = dogs
        .transform(Schema::builder().field("x", DataType::Int8).build()?, |_: Record| {
            Ok(Record::new().with("y", 1i64))
        })
        .store("memory://filter_copy_tests/unknown_field");
    assert!(matches!(unknown, Err(DatasetError::Key(_))));

    let failing = dataset
        .transform(Schema::builder().field("x", DataType::Int8).build()?, |_: Record| {
            Err(DatasetError::Value("rejected".to_string()))
        })
        .store("memory://filter_copy_tests/failing");
    assert!(matches!(failing, Err(DatasetError::Value(_))));
    Ok(())
}

#[cfg(feature = "filesystem")]
#[test]
fn copy_to_filesystem() -> Result<(), Box<dyn Error>> {
    let dataset = animals("filesystem")?;
    let dir = tempfile::tempdir()?;
    let location = dir.path().join("copy");
    let location = location.to_str().ok_or("non utf-8 path")?;

    let copy = dataset
        .view()
        .view(&idx![1..4])?
        .into_dataset()
        .ok_or("expected a dataset view")?
        .copy(location)?;
    copy.close()?;
    let reopened = Dataset::builder().mode(Mode::Read).open(location)?;
    assert_eq!(reopened.shape(), vec![3]);
    assert_eq!(reopened.get(&idx!["label"])?.compute()?, Value::from(vec![2i64, 0, 1]));
    assert_eq!(
        reopened.get(&idx!["info/name"])?.compute()?,
        Value::from(vec!["spirit", "tom", "lassie"])
    );

    std::fs::write(dir.path().join("other.txt"), b"not a dataset")?;
    assert!(matches!(
        dataset.copy(dir.path().to_str().ok_or("non utf-8 path")?),
        Err(DatasetError::DirectoryNotEmpty(_))
    ));
    Ok(())
}
