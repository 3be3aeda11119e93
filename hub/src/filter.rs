//! Predicate filtering of dataset views.
//!
//! [`DatasetView::filter`] evaluates a [`Predicate`] on a view of each visible sample, in ascending order,
//! and returns a view restricted to the samples for which it holds.
//! The fields a predicate declares are checked against the schema before any sample is evaluated.
//!
//! ```
//! # use hub::{Dataset, DataType, Mode, Schema, field, idx};
//! let dataset = Dataset::builder()
//!     .schema(Schema::builder().field("label", DataType::Int32).build()?)
//!     .shape([4])
//!     .mode(Mode::Write)
//!     .open("memory://doc/filter")?;
//! dataset.set(&idx!["label"], vec![3i32, 1, 4, 1])?;
//! let view = dataset.filter(&field("label").eq(1i32))?;
//! assert_eq!(view.indexes()?, hub::Indexes::List(vec![1, 3]));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::cmp::Ordering;

use crate::{
    DatasetError,
    schema::{SchemaNodeRef, join_path},
    slice::IndexItem,
    tensor::ComputeOptions,
    value::Value,
    view::{DatasetView, Indexes, Item},
};

/// A predicate over a view of a single sample.
pub trait Predicate {
    /// The field paths the predicate reads, relative to the filtered view.
    fn fields(&self) -> Vec<String> {
        Vec::new()
    }

    /// Evaluate the predicate on `sample`.
    ///
    /// # Errors
    /// Returns any error of reading the sample.
    fn evaluate(&self, sample: &DatasetView) -> Result<bool, DatasetError>;
}

/// A bare closure declares no fields.
///
/// A field it reads is only resolved when a sample is evaluated, so an unknown field raises
/// [`DatasetError::Key`] at the first sample and never on an empty view.
/// Use [`FnPredicate::with_fields`] to have the fields checked before any evaluation.
impl<F> Predicate for F
where
    F: Fn(&DatasetView) -> Result<bool, DatasetError>,
{
    fn evaluate(&self, sample: &DatasetView) -> Result<bool, DatasetError> {
        self(sample)
    }
}

/// A closure predicate with declared fields.
pub struct FnPredicate<F> {
    fields: Vec<String>,
    predicate: F,
}

impl<F> FnPredicate<F>
where
    F: Fn(&DatasetView) -> Result<bool, DatasetError>,
{
    /// Create a predicate reading `fields`.
    pub fn with_fields<S: Into<String>>(fields: impl IntoIterator<Item = S>, predicate: F) -> Self {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            predicate,
        }
    }
}

impl<F> Predicate for FnPredicate<F>
where
    F: Fn(&DatasetView) -> Result<bool, DatasetError>,
{
    fn fields(&self) -> Vec<String> {
        self.fields.clone()
    }

    fn evaluate(&self, sample: &DatasetView) -> Result<bool, DatasetError> {
        (self.predicate)(sample)
    }
}

impl<F> std::fmt::Debug for FnPredicate<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnPredicate")
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

/// A comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

/// A predicate expression over the fields of a sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Compare a field with a value.
    ///
    /// Comparing a class label field with text compares the class name.
    Compare {
        /// The field path.
        path: String,
        /// The operator.
        op: CompareOp,
        /// The value compared with.
        value: Value,
    },
    /// A text field starts with a prefix.
    StartsWith {
        /// The field path.
        path: String,
        /// The prefix.
        prefix: String,
    },
    /// Both expressions hold.
    And(Box<Expr>, Box<Expr>),
    /// Either expression holds.
    Or(Box<Expr>, Box<Expr>),
    /// The expression does not hold.
    Not(Box<Expr>),
}

/// A field of a sample, the operand of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldExpr {
    path: String,
}

/// Refer to the field at `path`.
pub fn field(path: impl Into<String>) -> FieldExpr {
    FieldExpr { path: path.into() }
}

impl FieldExpr {
    fn compare(self, op: CompareOp, value: impl Into<Value>) -> Expr {
        Expr::Compare {
            path: self.path,
            op,
            value: value.into(),
        }
    }

    /// The field equals `value`.
    #[must_use]
    pub fn eq(self, value: impl Into<Value>) -> Expr {
        self.compare(CompareOp::Eq, value)
    }

    /// The field differs from `value`.
    #[must_use]
    pub fn ne(self, value: impl Into<Value>) -> Expr {
        self.compare(CompareOp::Ne, value)
    }

    /// The field is less than `value`.
    #[must_use]
    pub fn lt(self, value: impl Into<Value>) -> Expr {
        self.compare(CompareOp::Lt, value)
    }

    /// The field is at most `value`.
    #[must_use]
    pub fn le(self, value: impl Into<Value>) -> Expr {
        self.compare(CompareOp::Le, value)
    }

    /// The field is greater than `value`.
    #[must_use]
    pub fn gt(self, value: impl Into<Value>) -> Expr {
        self.compare(CompareOp::Gt, value)
    }

    /// The field is at least `value`.
    #[must_use]
    pub fn ge(self, value: impl Into<Value>) -> Expr {
        self.compare(CompareOp::Ge, value)
    }

    /// The text field starts with `prefix`.
    #[must_use]
    pub fn starts_with(self, prefix: impl Into<String>) -> Expr {
        Expr::StartsWith {
            path: self.path,
            prefix: prefix.into(),
        }
    }
}

impl Expr {
    /// Both `self` and `other` hold.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    /// Either `self` or `other` holds.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }
}

impl std::ops::Not for Expr {
    type Output = Self;

    fn not(self) -> Self {
        Self::Not(Box::new(self))
    }
}

fn read_field(sample: &DatasetView, path: &str, label_name: bool) -> Result<Value, DatasetError> {
    match sample.view(&[IndexItem::Field(path.to_string())])? {
        Item::Tensor(view) => view.compute_opt(&ComputeOptions { label_name }),
        Item::Dataset(_) | Item::Value(_) => Err(DatasetError::Type(format!(
            "'{path}' is a dictionary and cannot be compared"
        ))),
    }
}

/// Whether `value` is a text or a single element array.
fn is_single(value: &Value) -> bool {
    match value {
        Value::Text(_) => true,
        Value::Array(array) => array.is_scalar(),
        _ => false,
    }
}

fn compare(field: &Value, value: &Value, path: &str) -> Result<Ordering, DatasetError> {
    if let (Value::Text(field), Value::Text(value)) = (field, value) {
        return Ok(field.cmp(value));
    }
    if let (Some(field), Some(value)) = (field.as_f64(), value.as_f64()) {
        return field
            .partial_cmp(&value)
            .ok_or_else(|| DatasetError::Value(format!("'{path}' compares a NaN")));
    }
    match (field.to_f64_vec(), value.to_f64_vec()) {
        (Some(field), Some(value)) if field == value => Ok(Ordering::Equal),
        (Some(_), Some(_)) => Ok(Ordering::Less),
        _ => Err(DatasetError::Type(format!(
            "cannot compare the {} of '{path}' with a {}",
            field.kind_name(),
            value.kind_name()
        ))),
    }
}

impl Predicate for Expr {
    fn fields(&self) -> Vec<String> {
        match self {
            Self::Compare { path, .. } | Self::StartsWith { path, .. } => vec![path.clone()],
            Self::And(lhs, rhs) | Self::Or(lhs, rhs) => {
                let mut fields = lhs.fields();
                fields.extend(rhs.fields());
                fields
            }
            Self::Not(expr) => expr.fields(),
        }
    }

    fn evaluate(&self, sample: &DatasetView) -> Result<bool, DatasetError> {
        match self {
            Self::Compare { path, op, value } => {
                let field = read_field(sample, path, matches!(value, Value::Text(_)))?;
                let ordered = !matches!(op, CompareOp::Eq | CompareOp::Ne);
                if ordered && !is_single(&field) {
                    return Err(DatasetError::Type(format!(
                        "'{path}' is not a single element and can only be compared for equality"
                    )));
                }
                if ordered && !is_single(value) {
                    return Err(DatasetError::Type(format!(
                        "'{path}' can only be ordered against a single element, got a {}",
                        value.kind_name()
                    )));
                }
                Ok(op.holds(compare(&field, value, path)?))
            }
            Self::StartsWith { path, prefix } => match read_field(sample, path, true)? {
                Value::Text(text) => Ok(text.starts_with(prefix.as_str())),
                value => Err(DatasetError::Type(format!(
                    "'{path}' is a {}, not text",
                    value.kind_name()
                ))),
            },
            Self::And(lhs, rhs) => Ok(lhs.evaluate(sample)? && rhs.evaluate(sample)?),
            Self::Or(lhs, rhs) => Ok(lhs.evaluate(sample)? || rhs.evaluate(sample)?),
            Self::Not(expr) => Ok(!expr.evaluate(sample)?),
        }
    }
}

/// Keep the samples of `view` for which `predicate` holds.
///
/// # Errors
/// Returns [`DatasetError::Key`] if a declared field is not in the schema of the view, or any error of evaluating the predicate.
pub(crate) fn filter(
    view: &DatasetView,
    predicate: &dyn Predicate,
) -> Result<DatasetView, DatasetError> {
    {
        let state = view.dataset().read_state()?;
        for path in predicate.fields() {
            let path = join_path(view.path(), &path);
            if !matches!(state.meta.schema.node(&path), Some(SchemaNodeRef::Leaf(_))) {
                return Err(DatasetError::Key(format!(
                    "the filter reads '{path}', which is not a tensor of the dataset"
                )));
            }
        }
    }
    match view.indexes()? {
        Indexes::Single(sample) => Ok(if predicate.evaluate(view)? {
            view.clone()
        } else {
            log::debug!("sample {sample} does not match the filter");
            view.with_samples(Vec::new())
        }),
        Indexes::List(samples) => {
            let mut kept = Vec::new();
            for (sample, position) in samples.iter().zip(0u64..) {
                let sample_view = DatasetView::from_state(view.state.indexed(position));
                if predicate.evaluate(&sample_view)? {
                    kept.push(*sample);
                }
            }
            log::debug!("the filter kept {} of {} samples", kept.len(), samples.len());
            Ok(view.with_samples(kept))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Dataset, data_type::DataType, dataset::Mode, idx, schema::{Schema, TensorSpec}};

    fn dataset(name: &str) -> Dataset {
        let schema = Schema::builder()
            .field("label", TensorSpec::class_label_names(["cat", "dog"]))
            .field("score", DataType::Float32)
            .field("name", TensorSpec::text(&[None], &[16]))
            .build()
            .unwrap();
        let dataset = Dataset::builder()
            .schema(schema)
            .shape([5])
            .mode(Mode::Write)
            .open(&format!("memory://filter_tests/{name}"))
            .unwrap();
        dataset.set(&idx!["label"], vec![0i64, 1, 1, 0, 1]).unwrap();
        dataset.set(&idx!["score"], vec![0.5f32, 0.9, 0.1, 0.7, 0.3]).unwrap();
        dataset
            .set(&idx!["name"], vec!["anna", "bob", "alice", "carl", "adam"])
            .unwrap();
        dataset
    }

    #[test]
    fn filter_expressions() {
        let dataset = dataset("expressions");
        let view = dataset.filter(&field("label").eq("dog")).unwrap();
        assert_eq!(view.indexes().unwrap(), Indexes::List(vec![1, 2, 4]));
        let view = dataset
            .filter(&field("score").gt(0.2f32).and(field("name").starts_with("a")))
            .unwrap();
        assert_eq!(view.indexes().unwrap(), Indexes::List(vec![0, 4]));
        let view = dataset.filter(&!field("label").eq(1i64)).unwrap();
        assert_eq!(view.indexes().unwrap(), Indexes::List(vec![0, 3]));
    }

    #[test]
    fn filter_orders_single_elements() {
        let dataset = dataset("ordered");
        assert!(matches!(
            dataset.filter(&field("score").lt(vec![1.0f64, 2.0])),
            Err(DatasetError::Type(_))
        ));
        assert!(matches!(
            dataset.filter(&field("score").ge(vec![0.0f32])),
            Ok(view) if view.indexes().unwrap() == Indexes::List(vec![0, 1, 2, 3, 4])
        ));
        let view = dataset.filter(&field("score").eq(vec![1.0f64, 2.0])).unwrap();
        assert_eq!(view.indexes().unwrap(), Indexes::List(vec![]));
    }

    #[test]
    fn filter_chained() {
        let dataset = dataset("chained");
        let both = dataset
            .filter(&field("label").eq("dog").and(field("score").ge(0.3f32)))
            .unwrap();
        let chained = dataset
            .filter(&field("label").eq("dog"))
            .unwrap()
            .filter(&field("score").ge(0.3f32))
            .unwrap();
        assert_eq!(both.indexes().unwrap(), chained.indexes().unwrap());
        assert_eq!(chained.indexes().unwrap(), Indexes::List(vec![1, 4]));
        let again = chained.filter(&field("score").ge(0.3f32)).unwrap();
        assert_eq!(again.indexes().unwrap(), chained.indexes().unwrap());
    }

    #[test]
    fn filter_validates_fields() {
        let dataset = dataset("validates");
        let calls = std::cell::Cell::new(0);
        let predicate = FnPredicate::with_fields(["missing"], |_: &DatasetView| {
            calls.set(calls.get() + 1);
            Ok(true)
        });
        assert!(matches!(dataset.filter(&predicate), Err(DatasetError::Key(_))));
        assert_eq!(calls.get(), 0);
        assert!(matches!(
            dataset.filter(&field("missing").eq(1i32)),
            Err(DatasetError::Key(_))
        ));
    }

    #[test]
    fn filter_closure_and_single_sample() {
        let dataset = dataset("closure");
        let predicate = |sample: &DatasetView| -> Result<bool, DatasetError> {
            let score = sample.view(&idx!["score"])?.compute()?;
            Ok(score.as_f64().unwrap_or_default() < 0.6)
        };
        let view = dataset.filter(&predicate).unwrap();
        assert_eq!(view.indexes().unwrap(), Indexes::List(vec![0, 2, 4]));
        assert_eq!(view.len().unwrap(), 3);

        let sample = dataset.view().view(&idx![1]).unwrap().into_dataset().unwrap();
        assert_eq!(sample.filter(&predicate).unwrap().indexes().unwrap(), Indexes::List(vec![]));
        assert_eq!(
            sample.filter(&field("label").eq("dog")).unwrap().indexes().unwrap(),
            Indexes::Single(1)
        );
    }
}
