/// Python bindings.
///
/// `Cache` wraps the Rust cache one to one. Keys are `str`, values `bytes`;
/// a missing key raises `KeyError`. Cache operations run with the GIL
/// released.
use std::time::Duration;

use pyo3::exceptions::{PyKeyError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyBytes;

use crate::config::Config;
use crate::error::Error;
use crate::store::Cache as RustCache;

fn to_py_err(err: Error) -> PyErr {
    match err {
        Error::EntryNotFound => PyKeyError::new_err(err.to_string()),
        Error::EntryTooLarge | Error::KeyTooLong { .. } => PyValueError::new_err(err.to_string()),
        Error::ShardsNotPowerOfTwo(_) | Error::CleanWindowWithoutLifeWindow => {
            PyValueError::new_err(err.to_string())
        }
        Error::Queue(_) | Error::Spawn(_) => PyRuntimeError::new_err(err.to_string()),
    }
}

#[pyclass(frozen)]
pub struct CacheStats {
    #[pyo3(get)]
    pub hits: u64,
    #[pyo3(get)]
    pub misses: u64,
    #[pyo3(get)]
    pub del_hits: u64,
    #[pyo3(get)]
    pub del_misses: u64,
    #[pyo3(get)]
    pub collisions: u64,
    #[pyo3(get)]
    pub len: usize,
    #[pyo3(get)]
    pub capacity: usize,
}

#[pymethods]
impl CacheStats {
    fn __repr__(&self) -> String {
        format!(
            "CacheStats(hits={}, misses={}, del_hits={}, del_misses={}, collisions={}, len={}, capacity={})",
            self.hits,
            self.misses,
            self.del_hits,
            self.del_misses,
            self.collisions,
            self.len,
            self.capacity
        )
    }
}

#[pyclass(frozen, name = "Cache")]
pub struct PyCache {
    inner: RustCache,
}

#[pymethods]
impl PyCache {
    #[new]
    #[pyo3(signature = (
        life_window,
        shards=1024,
        clean_window=1.0,
        max_entries_in_window=600_000,
        max_entry_size=500,
        hard_max_cache_size=0,
        verbose=false,
        stats_enabled=false,
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        life_window: f64,
        shards: usize,
        clean_window: f64,
        max_entries_in_window: usize,
        max_entry_size: usize,
        hard_max_cache_size: usize,
        verbose: bool,
        stats_enabled: bool,
    ) -> PyResult<Self> {
        let seconds = |v: f64, name: &str| {
            Duration::try_from_secs_f64(v)
                .map_err(|e| PyValueError::new_err(format!("invalid {name}: {e}")))
        };
        let mut config = Config::new(seconds(life_window, "life_window")?);
        config.shards = shards;
        config.clean_window = seconds(clean_window, "clean_window")?;
        config.max_entries_in_window = max_entries_in_window;
        config.max_entry_size = max_entry_size;
        config.hard_max_cache_size = hard_max_cache_size;
        config.verbose = verbose;
        config.stats_enabled = stats_enabled;
        let inner = RustCache::new(config).map_err(to_py_err)?;
        Ok(PyCache { inner })
    }

    fn get<'py>(&self, py: Python<'py>, key: &str) -> PyResult<Bound<'py, PyBytes>> {
        let value = py.detach(|| self.inner.get(key)).map_err(to_py_err)?;
        Ok(PyBytes::new(py, &value))
    }

    fn set(&self, py: Python<'_>, key: &str, value: &[u8]) -> PyResult<()> {
        py.detach(|| self.inner.set(key, value)).map_err(to_py_err)
    }

    fn append(&self, py: Python<'_>, key: &str, value: &[u8]) -> PyResult<()> {
        py.detach(|| self.inner.append(key, value)).map_err(to_py_err)
    }

    fn delete(&self, py: Python<'_>, key: &str) -> PyResult<()> {
        py.detach(|| self.inner.delete(key)).map_err(to_py_err)
    }

    fn __contains__(&self, key: &str) -> bool {
        self.inner.get(key).is_ok()
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    fn stats(&self) -> CacheStats {
        let stats = self.inner.stats();
        CacheStats {
            hits: stats.hits,
            misses: stats.misses,
            del_hits: stats.del_hits,
            del_misses: stats.del_misses,
            collisions: stats.collisions,
            len: self.inner.len(),
            capacity: self.inner.capacity(),
        }
    }

    fn reset(&self, py: Python<'_>) {
        py.detach(|| self.inner.reset())
    }

    fn reset_stats(&self) {
        self.inner.reset_stats()
    }

    fn close(&self) {
        self.inner.close()
    }

    fn __repr__(&self) -> String {
        format!(
            "Cache(shards={}, len={}, capacity={})",
            self.inner.config().shards,
            self.inner.len(),
            self.inner.capacity()
        )
    }
}
