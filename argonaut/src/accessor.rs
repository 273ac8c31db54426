//! Reshaping and normalization of Argo datasets.
//!
//! A dataset arrives from the fetcher as a flat collection of points and can be reshaped into a
//! collection of vertical profiles and back. Each profile is identified by a uid combining the
//! float's WMO number and the cycle number.
//!
use std::cmp;
use std::collections::BTreeMap;

use num_traits::cast;

use crate::{
    dataset::{
        Coordinate, Dataset, Values, Variable, CYCLE_NUMBER, DIM_INDEX, DIM_LEVELS, DIM_PROF,
        PLATFORM_NUMBER, PRES, QC_SUFFIX,
    },
    errors::{Error, Result},
};

/// Upper bound (exclusive) for cycle numbers, used as the base of the profile uid encoding.
pub const MAX_CYCLE: i64 = 10_000;

/// Attribute recording the percentage of profile slots actually occupied by measurements after
/// reshaping points into profiles.
pub const SPARSINESS: &str = "sparsiness";

/// Encode a float's WMO number and a cycle number as a single profile uid.
///
pub fn encode_uid(wmo: i64, cyc: i64) -> i64 {
    wmo * MAX_CYCLE + cyc
}

/// Decode a profile uid back into WMO and cycle numbers.
///
pub fn decode_uid(uid: i64) -> (i64, i64) {
    (uid / MAX_CYCLE, uid % MAX_CYCLE)
}

/// The two recognized dataset layouts.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// A flat collection of point measurements over `index`.
    Points,

    /// A collection of vertical profiles over `n_prof` x `n_levels`.
    Profiles,
}

impl Dataset {
    /// Determine the layout from the dataset's dimensions.
    ///
    pub fn layout(&self) -> Result<Layout> {
        if self.get_dim(DIM_INDEX).is_some() {
            Ok(Layout::Points)
        } else if self.get_dim(DIM_PROF).is_some() {
            Ok(Layout::Profiles)
        } else {
            Err(Error::InvalidStructure(String::from(
                "expected an index or n_prof dimension",
            )))
        }
    }

    /// Make sure variables are of the appropriate types.
    ///
    /// Quality control flags arrive as single character strings. Blanks and "nan" markers, which
    /// do occur in real world data, are treated as 0, and the flags become integers. Platform
    /// numbers delivered as floats become integers.
    ///
    pub fn cast_types(&self) -> Result<Dataset> {
        if self.layout()? != Layout::Points {
            return Err(Error::InvalidStructure(String::from(
                "method only available to a collection of points",
            )));
        }

        let mut dataset = self.clone();
        for var in dataset.variables.iter_mut() {
            if var.name.ends_with(QC_SUFFIX) {
                if let Values::Str(flags) = &var.values {
                    let mut cast_flags = Vec::with_capacity(flags.len());
                    for flag in flags.iter() {
                        let flag = flag.trim();
                        let flag = if flag.is_empty() || flag == "nan" {
                            "0"
                        } else {
                            flag
                        };
                        let flag = flag.parse::<i32>().map_err(|_| Error::BadCast {
                            variable: var.name.clone(),
                            value: flag.to_string(),
                        })?;
                        cast_flags.push(flag);
                    }
                    var.values = Values::of_i32(cast_flags);
                }
            } else if var.name == PLATFORM_NUMBER {
                if let Values::F64(numbers) = &var.values {
                    let mut cast_numbers = Vec::with_capacity(numbers.len());
                    for &number in numbers.iter() {
                        let number = cast(number).ok_or_else(|| Error::BadCast {
                            variable: var.name.clone(),
                            value: number.to_string(),
                        })?;
                        cast_numbers.push(number);
                    }
                    var.values = Values::of_i64(cast_numbers);
                }
            }
        }

        Ok(dataset)
    }

    /// Transform a collection of points into a collection of profiles.
    ///
    /// Points are grouped by profile uid. The number of levels is the largest number of points in
    /// any single profile; shorter profiles are padded with each dtype's fill value. Platform and
    /// cycle numbers collapse to one value per profile, and position and time become per-profile
    /// coordinates. A `sparsiness` attribute records how much of the profile grid is occupied.
    ///
    pub fn point_to_profile(&self) -> Result<Dataset> {
        if self.layout()? != Layout::Points {
            return Err(Error::InvalidStructure(String::from(
                "method only available to a collection of points",
            )));
        }

        let n_points = self
            .get_dim(DIM_INDEX)
            .ok_or_else(|| Error::BadName(DIM_INDEX.to_string()))?
            .size;
        let wmo = self.integer_variable(PLATFORM_NUMBER)?;
        let cyc = self.integer_variable(CYCLE_NUMBER)?;

        // Group points by profile uid. Profiles come out in uid order.
        let uids: Vec<i64> = (0..n_points)
            .map(|i| encode_uid(wmo[[i]], cyc[[i]]))
            .collect();
        let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
        for &uid in &uids {
            *counts.entry(uid).or_insert(0) += 1;
        }
        let n_prof = counts.len();
        let n_levels = counts.values().copied().max().unwrap_or(0);
        assert!(n_prof * n_levels >= n_points);
        let prof_of: BTreeMap<i64, usize> = counts
            .keys()
            .enumerate()
            .map(|(index, &uid)| (uid, index))
            .collect();

        // Empty per-level arrays for every variable, and per-profile arrays for every coordinate
        let mut leveled: Vec<(&Variable, Values)> = self
            .variables
            .iter()
            .filter(|var| var.name != PLATFORM_NUMBER && var.name != CYCLE_NUMBER)
            .map(|var| (var, Values::full(var.values.dtype(), &[n_prof, n_levels])))
            .collect();
        let mut prof_coords: Vec<(&Coordinate, Values)> = self
            .coordinates
            .iter()
            .filter(|coord| coord.name != DIM_INDEX)
            .map(|coord| (coord, Values::full(coord.values.dtype(), &[n_prof])))
            .collect();

        // Walk the points, filling each profile from its first level up
        let mut next_level = vec![0_usize; n_prof];
        for point in 0..n_points {
            let prof = prof_of[&uids[point]];
            let level = next_level[prof];
            next_level[prof] += 1;

            for (var, filled) in leveled.iter_mut() {
                filled.set_from(&[prof, level], &var.values, &[point]);
            }
            if level == 0 {
                for (coord, filled) in prof_coords.iter_mut() {
                    filled.set_from(&[prof], &coord.values, &[point]);
                }
            }
        }

        let mut wmo_prof = Vec::with_capacity(n_prof);
        let mut cyc_prof = Vec::with_capacity(n_prof);
        for &uid in counts.keys() {
            let (wmo, cyc) = decode_uid(uid);
            wmo_prof.push(wmo);
            cyc_prof.push(cyc);
        }

        let mut dataset = Dataset::new();
        dataset.add_dim(DIM_PROF, n_prof)?;
        dataset.add_dim(DIM_LEVELS, n_levels)?;
        dataset.add_coordinate(
            DIM_PROF,
            &[DIM_PROF],
            Values::of_i64((0..n_prof as i64).collect()),
        )?;
        dataset.add_coordinate(
            DIM_LEVELS,
            &[DIM_LEVELS],
            Values::of_i64((0..n_levels as i64).collect()),
        )?;
        for (coord, filled) in prof_coords {
            dataset.add_coordinate(&coord.name, &[DIM_PROF], filled)?;
        }

        let mut variables: Vec<(&str, Vec<&str>, Values)> = vec![
            (PLATFORM_NUMBER, vec![DIM_PROF], Values::of_i64(wmo_prof)),
            (CYCLE_NUMBER, vec![DIM_PROF], Values::of_i64(cyc_prof)),
        ];
        for (var, filled) in leveled {
            variables.push((&var.name, vec![DIM_PROF, DIM_LEVELS], filled));
        }
        variables.sort_by(|a, b| a.0.cmp(b.0));
        for (name, dims, values) in variables {
            dataset.add_variable(name, &dims, values)?;
        }

        dataset.attrs = self.attrs.clone();
        let slots = cmp::max(n_prof * n_levels, 1);
        dataset.attrs.insert(
            SPARSINESS.to_string(),
            format!("{:.2}", (n_points * 100) as f64 / slots as f64),
        );

        Ok(dataset)
    }

    /// Convert a collection of profiles back to a collection of points.
    ///
    /// Padding levels, marked by a fill value pressure, are dropped. Per-profile variables are
    /// broadcast back over each profile's points.
    ///
    pub fn profile_to_point(&self) -> Result<Dataset> {
        if self.layout()? != Layout::Profiles {
            return Err(Error::InvalidStructure(String::from(
                "method only available to a collection of profiles",
            )));
        }

        let n_prof = self
            .get_dim(DIM_PROF)
            .ok_or_else(|| Error::BadName(DIM_PROF.to_string()))?
            .size;
        let n_levels = self
            .get_dim(DIM_LEVELS)
            .ok_or_else(|| Error::BadName(DIM_LEVELS.to_string()))?
            .size;
        let pres = self
            .get_variable(PRES)
            .ok_or_else(|| Error::BadName(PRES.to_string()))?
            .values
            .as_f64();

        // Pressure marks which slots in the profile grid hold real measurements
        let mut slots = Vec::new();
        for prof in 0..n_prof {
            for level in 0..n_levels {
                if !pres[[prof, level]].is_nan() {
                    slots.push((prof, level));
                }
            }
        }
        let n_points = slots.len();

        let mut dataset = Dataset::new();
        dataset.add_dim(DIM_INDEX, n_points)?;
        dataset.add_coordinate(
            DIM_INDEX,
            &[DIM_INDEX],
            Values::of_i64((0..n_points as i64).collect()),
        )?;
        for coord in &self.coordinates {
            if coord.name == DIM_PROF || coord.name == DIM_LEVELS {
                continue;
            }
            let mut filled = Values::full(coord.values.dtype(), &[n_points]);
            for (point, &(prof, _)) in slots.iter().enumerate() {
                filled.set_from(&[point], &coord.values, &[prof]);
            }
            dataset.add_coordinate(&coord.name, &[DIM_INDEX], filled)?;
        }

        for var in &self.variables {
            let mut filled = Values::full(var.values.dtype(), &[n_points]);
            for (point, &(prof, level)) in slots.iter().enumerate() {
                if var.dims.len() == 2 {
                    filled.set_from(&[point], &var.values, &[prof, level]);
                } else {
                    filled.set_from(&[point], &var.values, &[prof]);
                }
            }
            dataset.add_variable(&var.name, &[DIM_INDEX], filled)?;
        }

        dataset.attrs = self.attrs.clone();
        dataset.attrs.remove(SPARSINESS);

        Ok(dataset)
    }

    /// Get an integer variable's data, requiring that types have been normalized first.
    ///
    fn integer_variable(&self, name: &str) -> Result<&ndarray::ArrayD<i64>> {
        let var = self
            .get_variable(name)
            .ok_or_else(|| Error::BadName(name.to_string()))?;
        match &var.values {
            Values::I64(data) => Ok(data),
            _ => Err(Error::InvalidStructure(format!(
                "{name} must be an integer variable; cast types first"
            ))),
        }
    }
}
