use std::fmt;

use crate::{
    errors::Result,
    time::{self, NAT},
};

/// A spatial and temporal bounding box for selecting measurements.
///
/// Bounds are longitude (degrees east), latitude (degrees north), pressure (decibars, a proxy for
/// depth), and time (epoch seconds). Bounds given in the wrong order are rearranged, eg east is to
/// the east of west.
///
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Region {
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
    pub pres_min: f64,
    pub pres_max: f64,
    pub date_min: i64,
    pub date_max: i64,
    _private: (),
}

impl Region {
    pub fn new(
        lon_min: f64,
        lon_max: f64,
        lat_min: f64,
        lat_max: f64,
        pres_min: f64,
        pres_max: f64,
        date_min: i64,
        date_max: i64,
    ) -> Self {
        let (lon_min, lon_max) = rearrange(lon_min, lon_max);
        let (lat_min, lat_max) = rearrange(lat_min, lat_max);
        let (pres_min, pres_max) = rearrange(pres_min, pres_max);
        let (date_min, date_max) = rearrange(date_min, date_max);
        Self {
            lon_min,
            lon_max,
            lat_min,
            lat_max,
            pres_min,
            pres_max,
            date_min,
            date_max,
            _private: (),
        }
    }

    /// Construct from a box of `[lon_min, lon_max, lat_min, lat_max, pres_min, pres_max]` plus
    /// date strings, matching the order used by the fetcher's region call.
    ///
    pub fn from_bounds(bounds: [f64; 6], date_min: &str, date_max: &str) -> Result<Self> {
        let [lon_min, lon_max, lat_min, lat_max, pres_min, pres_max] = bounds;
        Ok(Self::new(
            lon_min,
            lon_max,
            lat_min,
            lat_max,
            pres_min,
            pres_max,
            time::parse_date(date_min)?,
            time::parse_date(date_max)?,
        ))
    }

    /// Whether a single measurement falls inside this box. Samples with a missing time never
    /// match.
    ///
    pub fn contains(&self, lon: f64, lat: f64, pres: f64, stamp: i64) -> bool {
        stamp != NAT
            && self.lon_min <= lon
            && lon <= self.lon_max
            && self.lat_min <= lat
            && lat <= self.lat_max
            && self.pres_min <= pres
            && pres <= self.pres_max
            && self.date_min <= stamp
            && stamp <= self.date_max
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}, {}, {}, {}, {}]",
            self.lon_min,
            self.lon_max,
            self.lat_min,
            self.lat_max,
            self.pres_min,
            self.pres_max,
            time::format_date(self.date_min),
            time::format_date(self.date_max),
        )
    }
}

/// Make sure bounds are ordered correctly.
///
fn rearrange<N: PartialOrd>(lower: N, upper: N) -> (N, N) {
    if lower > upper {
        (upper, lower)
    } else {
        (lower, upper)
    }
}
