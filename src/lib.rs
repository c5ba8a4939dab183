pub mod arena;
mod cleaner;
pub mod clock;
mod config;
pub mod entry;
mod error;
mod iter;
pub mod key;
mod listener;
mod shard;
mod stats;
mod store;

#[cfg(feature = "python")]
mod python;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, QueueError, Result};
pub use iter::EntryInfoIterator;
pub use key::{AHashKeyHasher, Fnv64a, KeyHasher};
pub use listener::{OnRemove, OnRemoveWithMetadata, OnRemoveWithReason, RemoveReason};
pub use shard::{EntryInfo, EntryStatus};
pub use stats::{Metadata, Stats};
pub use store::Cache;

#[cfg(feature = "python")]
use pyo3::prelude::*;

#[cfg(feature = "python")]
#[pymodule]
fn arenacache(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<python::PyCache>()?;
    m.add_class::<python::CacheStats>()?;
    Ok(())
}
