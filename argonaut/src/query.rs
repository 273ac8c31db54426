use std::fmt;

use crate::{
    accessor::MAX_CYCLE,
    errors::{Error, Result},
    region::Region,
};

/// A selection scope for the fetcher.
///
/// All three scopes converge on the same materialization path: the data source returns the
/// matching flat point table and the fetcher assembles it into a points-layout dataset.
///
#[derive(Clone, Debug, PartialEq)]
pub enum Query {
    /// All measurements inside a spatial and temporal bounding box.
    Region(Region),

    /// All measurements reported by one float, identified by its WMO number.
    Float(u32),

    /// The measurements of a single float cycle.
    Profile(u32, u32),
}

impl Query {
    pub fn region(region: Region) -> Self {
        Self::Region(region)
    }

    pub fn float(wmo: u32) -> Self {
        Self::Float(wmo)
    }

    pub fn profile(wmo: u32, cyc: u32) -> Result<Self> {
        if cyc as i64 >= MAX_CYCLE {
            return Err(Error::BadQuery(format!(
                "cycle number {cyc} out of range (must be below {MAX_CYCLE})"
            )));
        }

        Ok(Self::Profile(wmo, cyc))
    }

    /// Stable string form used to key the dataset cache.
    pub fn cache_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Query::Region(region) => write!(f, "region {region}"),
            Query::Float(wmo) => write!(f, "float {wmo}"),
            Query::Profile(wmo, cyc) => write!(f, "profile {wmo} cycle {cyc}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_cycle_out_of_range() {
        assert!(Query::profile(6902746, 9999).is_ok());
        assert!(Query::profile(6902746, 10000).is_err());
    }

    #[test]
    fn test_cache_keys_distinct() -> Result<()> {
        let region = Region::from_bounds(
            [-75.0, -45.0, 20.0, 30.0, 0.0, 100.0],
            "2011-01-01",
            "2011-06-01",
        )?;

        let keys = [
            Query::region(region).cache_key(),
            Query::float(6902746).cache_key(),
            Query::profile(6902746, 34)?.cache_key(),
            Query::profile(6902746, 35)?.cache_key(),
            Query::float(6902747).cache_key(),
        ];
        for (i, key) in keys.iter().enumerate() {
            for other in &keys[i + 1..] {
                assert_ne!(key, other);
            }
        }

        Ok(())
    }

    #[test]
    fn test_cache_key_stable() -> Result<()> {
        let region = Region::from_bounds(
            [-75.0, -45.0, 20.0, 30.0, 0.0, 100.0],
            "2011-01-01",
            "2011-06-01",
        )?;
        assert_eq!(
            Query::region(region).cache_key(),
            Query::region(region).cache_key()
        );

        Ok(())
    }
}
