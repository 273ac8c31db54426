use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    errors::Result,
    fetcher::Fetcher,
    query::Query,
    source::{DataSource, PointBatch, Sample},
};

/// 2011-01-01T00:00:00Z
const LAUNCH: i64 = 1_293_840_000;

/// Build a deterministic batch of measurements for one float.
///
/// Cycles are ten days apart, drifting slowly east; each cycle has `levels` measurements at ten
/// decibar spacing.
///
pub(crate) fn sample_float(
    wmo: i64,
    lon: f64,
    lat: f64,
    cycles: i64,
    levels: usize,
) -> PointBatch {
    let mut batch = PointBatch::new();
    for cyc in 1..=cycles {
        for level in 0..levels {
            let pres = 10.0 * (level as f64 + 1.0);
            batch.push(Sample::new(
                wmo,
                cyc,
                lon + 0.1 * (cyc - 1) as f64,
                lat,
                LAUNCH + cyc * 10 * 86_400,
                pres,
                21.0 - 0.05 * pres + 0.01 * cyc as f64,
                35.0 + 0.001 * pres,
            ));
        }
    }

    batch
}

/// A test implementation of DataSource that holds per-float tables in RAM
///
pub(crate) struct MemorySource {
    floats: BTreeMap<u32, PointBatch>,
    fetches: Arc<Mutex<usize>>,
}

impl MemorySource {
    pub(crate) fn new() -> Self {
        let mut floats = BTreeMap::new();
        floats.insert(6902746, sample_float(6902746, -58.0, 25.0, 3, 4));
        floats.insert(6902747, sample_float(6902747, -40.0, 10.0, 2, 3));

        Self {
            floats,
            fetches: Arc::new(Mutex::new(0)),
        }
    }
}

#[async_trait]
impl DataSource for MemorySource {
    async fn fetch(&self, query: &Query) -> Result<Option<PointBatch>> {
        *self.fetches.lock() += 1;
        let batch = match query {
            Query::Float(wmo) => self.floats.get(wmo).cloned(),
            Query::Profile(wmo, cyc) => self.floats.get(wmo).and_then(|batch| {
                let batch = batch.filter(|i| batch.cycle_number[i] == *cyc as i64);
                if batch.is_empty() {
                    None
                } else {
                    Some(batch)
                }
            }),
            Query::Region(region) => {
                let mut out = PointBatch::new();
                for batch in self.floats.values() {
                    out.extend(&batch.filter(|i| {
                        region.contains(
                            batch.longitude[i],
                            batch.latitude[i],
                            batch.pres[i],
                            batch.time[i],
                        )
                    }));
                }
                Some(out)
            }
        };

        Ok(batch)
    }
}

pub(crate) fn fetcher() -> Arc<Fetcher> {
    Arc::new(Fetcher::new(Box::new(MemorySource::new()), 1 << 20))
}

/// A source plus a shared counter of how many times it has been asked to fetch.
///
pub(crate) fn counting_source() -> (Box<dyn DataSource>, Arc<Mutex<usize>>) {
    let source = MemorySource::new();
    let fetches = Arc::clone(&source.fetches);

    (Box::new(source), fetches)
}
