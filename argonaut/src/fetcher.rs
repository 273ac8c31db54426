use std::sync::Arc;

use futures::FutureExt;
use tracing::debug;

use crate::{
    cache::Cache,
    dataset::Dataset,
    errors::{Error, Result},
    query::Query,
    region::Region,
    source::DataSource,
};

/// The `Fetcher` manages retrieval of Argo measurement data.
///
/// To retrieve data, a Fetcher must be provided with a concrete `DataSource` implementation.
/// Materialized datasets are stored in RAM in an LRU cache up to a specified size limit, for fast
/// re-retrieval of recently used selections.
///
pub struct Fetcher {
    source: Box<dyn DataSource>,
    cache: Cache<String, Dataset>,
}

impl Fetcher {
    /// Create a new `Fetcher`
    ///
    /// # Arguments
    ///
    /// * `source` - A boxed implementation of `DataSource`, which handles reading raw
    ///   measurements from the underlying backend.
    /// * `cache_bytes` - The size limit, in bytes, for the LRU cache used by the fetcher to hold
    ///   recently materialized datasets in RAM.
    ///
    pub fn new(source: Box<dyn DataSource>, cache_bytes: u64) -> Self {
        let cache = Cache::new(cache_bytes);
        Self { source, cache }
    }

    /// Select all measurements inside a spatial and temporal bounding box.
    ///
    pub fn region(self: &Arc<Fetcher>, region: Region) -> Selection {
        Selection {
            fetcher: Arc::clone(self),
            query: Query::region(region),
        }
    }

    /// Select all measurements reported by one float.
    ///
    pub fn float(self: &Arc<Fetcher>, wmo: u32) -> Selection {
        Selection {
            fetcher: Arc::clone(self),
            query: Query::float(wmo),
        }
    }

    /// Select the measurements of a single float cycle.
    ///
    pub fn profile(self: &Arc<Fetcher>, wmo: u32, cyc: u32) -> Result<Selection> {
        Ok(Selection {
            fetcher: Arc::clone(self),
            query: Query::profile(wmo, cyc)?,
        })
    }

    /// Fetch from the source and assemble a points layout dataset.
    ///
    /// Region selections are re-cropped here so that membership in the box holds regardless of
    /// how much filtering the backend did.
    ///
    async fn materialize(self: &Arc<Fetcher>, query: &Query) -> Result<Dataset> {
        debug!(%query, "fetching from data source");
        let batch = self
            .source
            .fetch(query)
            .await?
            .ok_or_else(|| Error::NotFound(query.to_string()))?;
        batch.validate()?;

        let batch = match query {
            Query::Region(region) => batch.filter(|i| {
                region.contains(
                    batch.longitude[i],
                    batch.latitude[i],
                    batch.pres[i],
                    batch.time[i],
                )
            }),
            _ => batch,
        };

        debug!(%query, points = batch.len(), "materializing dataset");
        batch.into_dataset()?.cast_types()
    }
}

/// A pending selection, created by one of the fetcher's scope methods.
///
pub struct Selection {
    fetcher: Arc<Fetcher>,
    query: Query,
}

impl Selection {
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Materialize this selection as a points layout dataset, from cache when possible.
    ///
    pub async fn to_dataset(&self) -> Result<Arc<Dataset>> {
        let key = self.query.cache_key();
        let fetcher = Arc::clone(&self.fetcher);
        let query = self.query.clone();
        let load = move |_key: String| async move { fetcher.materialize(&query).await }.boxed();

        self.fetcher.cache.get(&key, load).await
    }
}
