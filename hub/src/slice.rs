//! Index items and slice algebra.
//!
//! An index expression is a list of [`IndexItem`]s.
//! [`split`] separates it into positional [`Selector`]s and a field path, [`extract_info`] resolves a selector against an axis length
//! and [`compose`] applies successive layers of selectors to the axes of a tensor the way repeated indexing of an n-dimensional array does.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::join_path;

/// An item of an index expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexItem {
    /// An integer index, negative values count from the end.
    Int(i64),
    /// A slice with optional bounds and step.
    Slice {
        /// The start.
        start: Option<i64>,
        /// The exclusive stop.
        stop: Option<i64>,
        /// The step, only `1` is supported.
        step: Option<i64>,
    },
    /// Select every remaining axis.
    Ellipsis,
    /// A field path, e.g. `label/a`.
    Field(String),
    /// A float, which is never a valid index.
    Float(f64),
}

/// The [`IndexItem::Ellipsis`].
pub const ELLIPSIS: IndexItem = IndexItem::Ellipsis;

/// The full slice `:`.
pub const FULL: IndexItem = IndexItem::Slice {
    start: None,
    stop: None,
    step: None,
};

impl IndexItem {
    /// Create a slice item.
    #[must_use]
    pub fn slice(start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Self {
        Self::Slice { start, stop, step }
    }
}

/// Create a [`Vec<IndexItem>`] from integers, ranges, [`ELLIPSIS`] and field names.
///
/// ```
/// # use hub::{idx, IndexItem};
/// assert_eq!(
///     idx!["label", 1..5, -1],
///     vec![
///         IndexItem::Field("label".to_string()),
///         IndexItem::slice(Some(1), Some(5), None),
///         IndexItem::Int(-1),
///     ]
/// );
/// ```
#[macro_export]
macro_rules! idx {
    () => {
        ::std::vec::Vec::<$crate::IndexItem>::new()
    };
    ($($item:expr),+ $(,)?) => {
        ::std::vec![$($crate::IndexItem::from($item)),+]
    };
}

macro_rules! impl_index_item_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for IndexItem {
                #[allow(clippy::cast_possible_wrap)]
                fn from(index: $t) -> Self {
                    Self::Int(index as i64)
                }
            }

            impl From<std::ops::Range<$t>> for IndexItem {
                #[allow(clippy::cast_possible_wrap)]
                fn from(range: std::ops::Range<$t>) -> Self {
                    Self::slice(Some(range.start as i64), Some(range.end as i64), None)
                }
            }

            impl From<std::ops::RangeInclusive<$t>> for IndexItem {
                #[allow(clippy::cast_possible_wrap)]
                fn from(range: std::ops::RangeInclusive<$t>) -> Self {
                    Self::slice(Some(*range.start() as i64), Some(*range.end() as i64 + 1), None)
                }
            }

            impl From<std::ops::RangeFrom<$t>> for IndexItem {
                #[allow(clippy::cast_possible_wrap)]
                fn from(range: std::ops::RangeFrom<$t>) -> Self {
                    Self::slice(Some(range.start as i64), None, None)
                }
            }

            impl From<std::ops::RangeTo<$t>> for IndexItem {
                #[allow(clippy::cast_possible_wrap)]
                fn from(range: std::ops::RangeTo<$t>) -> Self {
                    Self::slice(None, Some(range.end as i64), None)
                }
            }
        )*
    };
}

impl_index_item_from_int!(i32, i64, u32, u64, usize);

impl From<std::ops::RangeFull> for IndexItem {
    fn from(_: std::ops::RangeFull) -> Self {
        FULL
    }
}

impl From<&str> for IndexItem {
    fn from(path: &str) -> Self {
        Self::Field(path.to_string())
    }
}

impl From<String> for IndexItem {
    fn from(path: String) -> Self {
        Self::Field(path)
    }
}

impl From<f64> for IndexItem {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// A positional index item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selector {
    /// An integer index.
    Index(i64),
    /// A slice.
    Slice {
        /// The start.
        start: Option<i64>,
        /// The exclusive stop.
        stop: Option<i64>,
        /// The step.
        step: Option<i64>,
    },
    /// Select every remaining axis.
    Ellipsis,
}

impl Selector {
    /// Returns true if the selector is the full slice `:`.
    #[must_use]
    pub fn is_full(&self) -> bool {
        matches!(
            self,
            Self::Slice {
                start: None,
                stop: None,
                step: None | Some(1)
            }
        )
    }
}

/// An index error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexError {
    /// An index is out of bounds.
    #[error("index {index} is out of bounds for an axis of size {size}")]
    OutOfBounds {
        /// The index.
        index: i64,
        /// The size of the axis.
        size: u64,
    },
    /// A slice bound is out of bounds.
    #[error("slice {start}:{stop} is out of bounds for an axis of size {size}")]
    SliceOutOfBounds {
        /// The resolved start.
        start: i64,
        /// The resolved stop.
        stop: i64,
        /// The size of the axis.
        size: u64,
    },
    /// A slice start is greater than its stop.
    #[error("slice start {start} is greater than its stop {stop}")]
    SliceStartAfterStop {
        /// The resolved start.
        start: u64,
        /// The resolved stop.
        stop: u64,
    },
    /// A step other than 1 was given.
    #[error("unsupported slice step {0}, only a step of 1 is supported")]
    UnsupportedStep(i64),
    /// An item has an invalid type.
    #[error("invalid index item {0}, expected an integer, a slice, an ellipsis or a field name")]
    InvalidType(String),
    /// More than one ellipsis.
    #[error("an index can only have a single ellipsis")]
    MultipleEllipsis,
    /// More positional items than free axes.
    #[error("too many indices: {given} given for {axes} free axes")]
    TooManyIndices {
        /// The number of positional items.
        given: usize,
        /// The number of free axes.
        axes: usize,
    },
}

/// The category of an [`IndexError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexErrorKind {
    /// An item has an invalid type.
    Type,
    /// An item has an invalid value.
    Value,
    /// An item is out of range.
    Index,
}

impl IndexError {
    /// The category of the error.
    #[must_use]
    pub fn kind(&self) -> IndexErrorKind {
        match self {
            Self::InvalidType(_) => IndexErrorKind::Type,
            Self::UnsupportedStep(_) => IndexErrorKind::Value,
            _ => IndexErrorKind::Index,
        }
    }
}

/// A selector resolved against an axis of known length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceInfo {
    /// The resolved start.
    pub start: u64,
    /// The resolved exclusive stop.
    pub stop: u64,
    /// True if the selector was an integer, which removes the axis.
    pub is_index: bool,
}

impl SliceInfo {
    /// The number of selected elements.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.stop - self.start
    }

    /// Returns true if nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stop == self.start
    }
}

fn wrap(index: i64, size: u64) -> i64 {
    let size = i64::try_from(size).unwrap_or(i64::MAX);
    if index < 0 { index + size } else { index }
}

/// Resolve `selector` against an axis of `size` elements.
///
/// Negative bounds count from the end.
/// Unlike Python slicing, out of range bounds are an error rather than being clamped.
///
/// # Errors
/// Returns an [`IndexError`] if the selector is out of bounds, has a step other than 1 or is an ellipsis.
pub fn extract_info(selector: &Selector, size: u64) -> Result<SliceInfo, IndexError> {
    match *selector {
        Selector::Index(index) => {
            let wrapped = wrap(index, size);
            match u64::try_from(wrapped) {
                Ok(resolved) if resolved < size => Ok(SliceInfo {
                    start: resolved,
                    stop: resolved + 1,
                    is_index: true,
                }),
                _ => Err(IndexError::OutOfBounds { index, size }),
            }
        }
        Selector::Slice { start, stop, step } => {
            if let Some(step) = step
                && step != 1
            {
                return Err(IndexError::UnsupportedStep(step));
            }
            let start = start.map_or(0, |start| wrap(start, size));
            let stop = stop.map_or_else(
                || i64::try_from(size).unwrap_or(i64::MAX),
                |stop| wrap(stop, size),
            );
            let (Ok(start_u), Ok(stop_u)) = (u64::try_from(start), u64::try_from(stop)) else {
                return Err(IndexError::SliceOutOfBounds { start, stop, size });
            };
            if start_u > size || stop_u > size {
                Err(IndexError::SliceOutOfBounds { start, stop, size })
            } else if start_u > stop_u {
                Err(IndexError::SliceStartAfterStop {
                    start: start_u,
                    stop: stop_u,
                })
            } else {
                Ok(SliceInfo {
                    start: start_u,
                    stop: stop_u,
                    is_index: false,
                })
            }
        }
        Selector::Ellipsis => Err(IndexError::InvalidType("...".to_string())),
    }
}

/// Split an index expression into positional selectors and a field path.
///
/// Field items may appear anywhere and are joined in order, so `["label", 1, "c"]` has the path `label/c`.
///
/// # Errors
/// Returns [`IndexError::InvalidType`] for a float item and [`IndexError::MultipleEllipsis`] for a second ellipsis.
pub fn split(items: &[IndexItem]) -> Result<(Vec<Selector>, String), IndexError> {
    let mut selectors = Vec::new();
    let mut path = String::new();
    for item in items {
        match item {
            IndexItem::Int(index) => selectors.push(Selector::Index(*index)),
            IndexItem::Slice { start, stop, step } => selectors.push(Selector::Slice {
                start: *start,
                stop: *stop,
                step: *step,
            }),
            IndexItem::Ellipsis => {
                if selectors.contains(&Selector::Ellipsis) {
                    return Err(IndexError::MultipleEllipsis);
                }
                selectors.push(Selector::Ellipsis);
            }
            IndexItem::Field(field) => path = join_path(&path, field),
            IndexItem::Float(value) => return Err(IndexError::InvalidType(value.to_string())),
        }
    }
    Ok((selectors, path))
}

/// The bound of an axis used when composing selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisBound {
    /// The length of the axis, or its maximum length if it is dynamic.
    pub size: u64,
    /// Whether the actual length of the axis varies per sample.
    pub dynamic: bool,
}

impl AxisBound {
    /// A static axis.
    #[must_use]
    pub fn fixed(size: u64) -> Self {
        Self {
            size,
            dynamic: false,
        }
    }

    /// A dynamic axis bounded by `max_size`.
    #[must_use]
    pub fn dynamic(max_size: u64) -> Self {
        Self {
            size: max_size,
            dynamic: true,
        }
    }
}

/// The state of an axis after composing selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisState {
    /// The axis is fixed at an absolute index and removed from the result.
    Index(u64),
    /// The axis spans an absolute range.
    ///
    /// An implicit span has never been explicitly sliced, on a dynamic axis it covers the actual extent of each sample.
    Span {
        /// The absolute start.
        start: u64,
        /// The absolute exclusive stop.
        stop: u64,
        /// Whether the span is implicit.
        implicit: bool,
    },
}

impl AxisState {
    /// Returns true if the axis is not fixed.
    #[must_use]
    pub fn is_free(&self) -> bool {
        matches!(self, Self::Span { .. })
    }

    /// The positional selector equivalent to this state.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn to_selector(&self) -> Selector {
        match *self {
            Self::Index(index) => Selector::Index(index as i64),
            Self::Span { implicit: true, .. } => Selector::Slice {
                start: None,
                stop: None,
                step: None,
            },
            Self::Span { start, stop, .. } => Selector::Slice {
                start: Some(start as i64),
                stop: Some(stop as i64),
                step: None,
            },
        }
    }
}

/// Expand an ellipsis in `selectors` into full slices for `free_axes` axes.
///
/// # Errors
/// Returns [`IndexError::MultipleEllipsis`] if more than one ellipsis is present.
pub fn expand_ellipsis(
    selectors: &[Selector],
    free_axes: usize,
) -> Result<Vec<Selector>, IndexError> {
    let ellipses = selectors
        .iter()
        .filter(|selector| **selector == Selector::Ellipsis)
        .count();
    match ellipses {
        0 => Ok(selectors.to_vec()),
        1 => {
            let claimed = free_axes.saturating_sub(selectors.len() - 1);
            Ok(selectors
                .iter()
                .flat_map(|selector| {
                    if *selector == Selector::Ellipsis {
                        vec![Selector::Slice { start: None, stop: None, step: None }; claimed]
                    } else {
                        vec![*selector]
                    }
                })
                .collect())
        }
        _ => Err(IndexError::MultipleEllipsis),
    }
}

/// Compose `layers` of selectors over axes with `bounds`.
///
/// Each layer applies its selectors, in order, to the axes that are still free after the previous layers.
/// An integer fixes an axis, an explicit slice narrows it relative to its current span and the full slice leaves it unchanged.
///
/// # Errors
/// Returns an [`IndexError`] if a layer has more selectors than free axes, or a selector is out of bounds.
pub fn compose(
    layers: &[Vec<Selector>],
    bounds: &[AxisBound],
) -> Result<Vec<AxisState>, IndexError> {
    let mut axes: Vec<AxisState> = bounds
        .iter()
        .map(|bound| AxisState::Span {
            start: 0,
            stop: bound.size,
            implicit: true,
        })
        .collect();
    for layer in layers {
        let free = axes
            .iter()
            .enumerate()
            .filter_map(|(axis, state)| state.is_free().then_some(axis))
            .collect::<Vec<_>>();
        let layer = expand_ellipsis(layer, free.len())?;
        if layer.len() > free.len() {
            return Err(IndexError::TooManyIndices {
                given: layer.len(),
                axes: free.len(),
            });
        }
        for (selector, &axis) in layer.iter().zip(&free) {
            let AxisState::Span {
                start,
                stop,
                implicit,
            } = axes[axis]
            else {
                continue;
            };
            axes[axis] = match selector {
                _ if selector.is_full() => AxisState::Span {
                    start,
                    stop,
                    implicit,
                },
                _ => {
                    let info = extract_info(selector, stop - start)?;
                    if info.is_index {
                        AxisState::Index(start + info.start)
                    } else {
                        AxisState::Span {
                            start: start + info.start,
                            stop: start + info.stop,
                            implicit: false,
                        }
                    }
                }
            };
        }
    }
    Ok(axes)
}
