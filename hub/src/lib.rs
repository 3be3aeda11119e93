//! `hub` is a schema-typed, chunked tensor dataset engine over pluggable key-value stores.
//!
//! A [`Dataset`] declares a nested [`Schema`] of typed tensor leaves and a number of samples.
//! Each leaf is persisted as a chunked, optionally compressed array whose leading axis is the sample axis.
//! Leaves may have dynamic axes bounded by a maximum shape, in which case the actual shape of each sample is recorded alongside its chunks.
//!
//! Datasets are indexed with expressions mixing field paths, integers, ranges and ellipses (see [`idx!`]).
//! Indexing returns lazy views ([`DatasetView`], [`TensorView`]) or, in eager mode, the materialized [`Value`].
//! Views compose, can be [filtered](filter) by predicates and [copied](DatasetView::copy) into new datasets.
//!
//! ## Getting Started
//! ```
//! # use hub::{Dataset, DataType, Mode, Schema, TensorSpec, Value, idx};
//! let schema = Schema::builder()
//!     .field("image", TensorSpec::new(&[28, 28]).with_data_type(DataType::UInt8))
//!     .field("label", TensorSpec::class_label_names(["cat", "dog"]))
//!     .build()?;
//! let dataset = Dataset::builder()
//!     .schema(schema)
//!     .shape([10])
//!     .mode(Mode::Write)
//!     .open("memory://doc/lib")?;
//!
//! dataset.set(&idx!["image", 0, 3..5, 3..5], 255u8)?;
//! dataset.set(&idx!["label", 0], "dog")?;
//!
//! let image = dataset.get(&idx!["image", 0, 2..6, 4])?.compute()?;
//! assert_eq!(image.to_f64_vec(), Some(vec![0.0, 255.0, 255.0, 0.0]));
//! assert_eq!(dataset.get(&idx!["label", 0])?.compute()?, Value::from(1i64));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Stores
//! Locations are resolved by the [`hub_storage::store_url`] registry:
//! - `memory://<name>/<path>` addresses a process-wide named memory store,
//! - `file://<path>` or a bare path addresses the local filesystem (`filesystem` feature),
//! - other schemes can be registered with [`register_root_store`](hub_storage::store_url::register_root_store).
//!
//! Datasets can also be opened within any [`ReadableWritableListableStorage`](hub_storage::ReadableWritableListableStorage)
//! with [`DatasetBuilder::open_with_storage`].
//!
//! ## Crate Features
//! #### Default
//!  - `filesystem`: re-export `hub_filesystem` as `hub::filesystem` and resolve `file://` locations.
//!  - `ndarray`: [`ndarray`] conversions for [`TensorData`], [`Value`] and [`TensorView`].
//!  - `gzip`, `zstd`, `lz4`: enable the chunk [`Compressor`]s of the same name.
//!
//! ## Logging
//! `hub` logs information and warnings using the [`log`] crate.
//! A logging implementation must be enabled to capture logs.
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod codec;
pub mod config;
pub mod data_type;
pub mod dataset;
pub mod filter;
pub mod region;
pub mod schema;
pub mod slice;
pub mod tensor_data;
pub mod value;
pub mod view;

mod chunk_engine;
mod copy;
mod error;
mod location;
mod tensor;

pub use codec::Compressor;
pub use config::Config;
pub use copy::Transform;
pub use data_type::DataType;
pub use dataset::{Dataset, DatasetBuilder, DatasetShape, Mode};
pub use error::DatasetError;
pub use filter::{FnPredicate, Predicate, field};
pub use schema::{ClassLabel, Schema, SchemaBuilder, SchemaNode, TensorKind, TensorSpec};
pub use slice::{ELLIPSIS, FULL, IndexItem, Selector};
pub use tensor::ComputeOptions;
pub use tensor_data::TensorData;
pub use value::{Record, Value, scalar};
pub use view::{DatasetView, Indexes, Item, TensorView, ViewShape};

#[cfg(feature = "filesystem")]
pub use hub_filesystem as filesystem;
pub use hub_storage as storage;
