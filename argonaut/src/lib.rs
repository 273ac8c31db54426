mod accessor;
mod cache;
mod dataset;
mod errors;
mod fetcher;
mod query;
mod region;
mod source;
pub mod time;

#[cfg(test)]
mod testing;

pub use accessor::decode_uid;
pub use accessor::encode_uid;
pub use accessor::Layout;
pub use accessor::MAX_CYCLE;
pub use accessor::SPARSINESS;

pub use dataset::Coordinate;
pub use dataset::Dataset;
pub use dataset::Dim;
pub use dataset::Dtype;
pub use dataset::Values;
pub use dataset::Variable;
pub use dataset::{CYCLE_NUMBER, PLATFORM_NUMBER};
pub use dataset::{DATA_MODE, DIRECTION, PRES, PSAL, TEMP};
pub use dataset::{DIM_INDEX, DIM_LEVELS, DIM_PROF};
pub use dataset::{FILL_INT, FILL_STR, QC_SUFFIX};
pub use dataset::{LATITUDE, LONGITUDE, TIME};

pub use errors::Error;
pub use errors::Result;

pub use fetcher::Fetcher;
pub use fetcher::Selection;

pub use query::Query;

pub use region::Region;

pub use source::DataSource;
pub use source::PointBatch;
pub use source::Sample;
