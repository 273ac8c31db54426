use std::collections::BTreeMap;

use ndarray::{Array1, ArrayD, IxDyn};
use paste::paste;

use crate::{
    cache::Cacheable,
    errors::{Error, Result},
    time::NAT,
};

/// Dimension of the points layout: one flat index over individual measurements.
pub const DIM_INDEX: &str = "index";

/// Dimensions of the profiles layout: profiles by vertical level.
pub const DIM_PROF: &str = "n_prof";
pub const DIM_LEVELS: &str = "n_levels";

pub const PLATFORM_NUMBER: &str = "platform_number";
pub const CYCLE_NUMBER: &str = "cycle_number";
pub const LONGITUDE: &str = "longitude";
pub const LATITUDE: &str = "latitude";
pub const TIME: &str = "time";
pub const PRES: &str = "pres";
pub const TEMP: &str = "temp";
pub const PSAL: &str = "psal";
pub const DATA_MODE: &str = "data_mode";
pub const DIRECTION: &str = "direction";

/// Suffix marking quality control flag variables.
pub const QC_SUFFIX: &str = "_qc";

/// Fill value for integer variables with missing measurements.
pub const FILL_INT: i64 = 99999;

/// Fill value for string variables with missing measurements.
pub const FILL_STR: &str = " ";

/// The kind of data stored in a variable or coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dtype {
    F32,
    F64,
    I32,
    I64,
    Str,
    Time,
}

/// A labeled array of measurement values.
///
/// Arrays are dynamically dimensioned: 1-D over `index` in the points layout, 1-D over `n_prof`
/// or 2-D over `n_prof` x `n_levels` in the profiles layout. Time values are epoch seconds with
/// `NAT` marking a missing time.
///
#[derive(Clone, Debug, PartialEq)]
pub enum Values {
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
    I32(ArrayD<i32>),
    I64(ArrayD<i64>),
    Str(ArrayD<String>),
    Time(ArrayD<i64>),
}

macro_rules! values_kind {
    ($type:ty, $variant:ident) => {
        paste! {
            pub fn [<of_ $type>](data: Vec<$type>) -> Self {
                Values::$variant(Array1::from(data).into_dyn())
            }

            pub fn [<as_ $type>](&self) -> &ArrayD<$type> {
                match self {
                    Values::$variant(data) => data,
                    _ => {
                        panic!(concat!("Not ", stringify!($variant), " data"));
                    }
                }
            }
        }
    };
}

impl Values {
    values_kind!(f32, F32);
    values_kind!(f64, F64);
    values_kind!(i32, I32);
    values_kind!(i64, I64);

    pub fn of_str(data: Vec<String>) -> Self {
        Values::Str(Array1::from(data).into_dyn())
    }

    pub fn as_str(&self) -> &ArrayD<String> {
        match self {
            Values::Str(data) => data,
            _ => {
                panic!("Not Str data");
            }
        }
    }

    pub fn of_time(data: Vec<i64>) -> Self {
        Values::Time(Array1::from(data).into_dyn())
    }

    pub fn as_time(&self) -> &ArrayD<i64> {
        match self {
            Values::Time(data) => data,
            _ => {
                panic!("Not Time data");
            }
        }
    }

    pub fn dtype(&self) -> Dtype {
        match self {
            Values::F32(_) => Dtype::F32,
            Values::F64(_) => Dtype::F64,
            Values::I32(_) => Dtype::I32,
            Values::I64(_) => Dtype::I64,
            Values::Str(_) => Dtype::Str,
            Values::Time(_) => Dtype::Time,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Values::F32(data) => data.shape(),
            Values::F64(data) => data.shape(),
            Values::I32(data) => data.shape(),
            Values::I64(data) => data.shape(),
            Values::Str(data) => data.shape(),
            Values::Time(data) => data.shape(),
        }
    }

    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// An array of the given shape filled with the dtype's fill value: NaN for floats, 99999 for
    /// integers, a blank for strings, NaT for times.
    ///
    pub fn full(dtype: Dtype, shape: &[usize]) -> Self {
        let shape = IxDyn(shape);
        match dtype {
            Dtype::F32 => Values::F32(ArrayD::from_elem(shape, f32::NAN)),
            Dtype::F64 => Values::F64(ArrayD::from_elem(shape, f64::NAN)),
            Dtype::I32 => Values::I32(ArrayD::from_elem(shape, FILL_INT as i32)),
            Dtype::I64 => Values::I64(ArrayD::from_elem(shape, FILL_INT)),
            Dtype::Str => Values::Str(ArrayD::from_elem(shape, String::from(FILL_STR))),
            Dtype::Time => Values::Time(ArrayD::from_elem(shape, NAT)),
        }
    }

    /// Copy a single element from `src` at `from` into `self` at `at`. Both arrays must hold the
    /// same dtype.
    ///
    pub(crate) fn set_from(&mut self, at: &[usize], src: &Values, from: &[usize]) {
        match (self, src) {
            (Values::F32(dst), Values::F32(src)) => dst[at] = src[from],
            (Values::F64(dst), Values::F64(src)) => dst[at] = src[from],
            (Values::I32(dst), Values::I32(src)) => dst[at] = src[from],
            (Values::I64(dst), Values::I64(src)) => dst[at] = src[from],
            (Values::Str(dst), Values::Str(src)) => dst[at] = src[from].clone(),
            (Values::Time(dst), Values::Time(src)) => dst[at] = src[from],
            _ => {
                panic!("dtype mismatch");
            }
        }
    }
}

impl Cacheable for Values {
    fn size(&self) -> u64 {
        match self {
            Values::F32(data) => 4 * data.len() as u64,
            Values::F64(data) => 8 * data.len() as u64,
            Values::I32(data) => 4 * data.len() as u64,
            Values::I64(data) => 8 * data.len() as u64,
            Values::Str(data) => data.iter().map(|s| 1 + s.len() as u64).sum(),
            Values::Time(data) => 8 * data.len() as u64,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Dim {
    pub name: String,
    pub size: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Coordinate {
    pub name: String,
    pub dims: Vec<String>,
    pub values: Values,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    /// Name of the variable, e.g. "temp"
    pub name: String,

    /// Names of the dimensions this variable is laid out over
    pub dims: Vec<String>,

    /// The measurement data
    pub values: Values,
}

/// A labeled multi-dimensional dataset: named dimensions, coordinate variables, data variables,
/// and string attributes.
///
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    pub dims: Vec<Dim>,
    pub coordinates: Vec<Coordinate>,
    pub variables: Vec<Variable>,
    pub attrs: BTreeMap<String, String>,
}

impl Dataset {
    pub fn new() -> Self {
        Self {
            dims: vec![],
            coordinates: vec![],
            variables: vec![],
            attrs: BTreeMap::new(),
        }
    }

    pub fn add_dim<S: Into<String>>(&mut self, name: S, size: usize) -> Result<()> {
        let name = name.into();
        if self.get_dim(&name).is_some() {
            return Err(Error::InvalidStructure(format!("duplicate dimension {name:?}")));
        }
        self.dims.push(Dim { name, size });

        Ok(())
    }

    pub fn add_coordinate<S: Into<String>>(
        &mut self,
        name: S,
        dims: &[&str],
        values: Values,
    ) -> Result<()> {
        let name = name.into();
        if self.get_coordinate(&name).is_some() {
            return Err(Error::InvalidStructure(format!("duplicate coordinate {name:?}")));
        }
        let dims = self.check_shape(dims, &values)?;
        self.coordinates.push(Coordinate { name, dims, values });

        Ok(())
    }

    pub fn add_variable<S: Into<String>>(
        &mut self,
        name: S,
        dims: &[&str],
        values: Values,
    ) -> Result<()> {
        let name = name.into();
        if self.get_variable(&name).is_some() {
            return Err(Error::InvalidStructure(format!("duplicate variable {name:?}")));
        }
        let dims = self.check_shape(dims, &values)?;
        self.variables.push(Variable { name, dims, values });

        Ok(())
    }

    pub fn get_dim(&self, name: &str) -> Option<&Dim> {
        self.dims.iter().find(|dim| dim.name == name)
    }

    pub fn get_coordinate(&self, name: &str) -> Option<&Coordinate> {
        self.coordinates.iter().find(|coord| coord.name == name)
    }

    pub fn get_variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|var| var.name == name)
    }

    /// Verify that every named dimension exists and that the array's shape matches the dimension
    /// sizes, returning the owned dimension names.
    ///
    fn check_shape(&self, dims: &[&str], values: &Values) -> Result<Vec<String>> {
        if dims.len() != values.shape().len() {
            return Err(Error::InvalidStructure(format!(
                "array has {} axes but {} dimensions were named",
                values.shape().len(),
                dims.len()
            )));
        }
        for (dim, &size) in dims.iter().zip(values.shape()) {
            let expected = self
                .get_dim(dim)
                .ok_or_else(|| Error::BadName(dim.to_string()))?
                .size;
            if size != expected {
                return Err(Error::InvalidStructure(format!(
                    "axis over {dim:?} has length {size}, expected {expected}"
                )));
            }
        }

        Ok(dims.iter().map(|dim| dim.to_string()).collect())
    }
}

impl Default for Dataset {
    fn default() -> Self {
        Self::new()
    }
}

impl Cacheable for Dataset {
    fn size(&self) -> u64 {
        let coordinates_size = self
            .coordinates
            .iter()
            .map(|coord| coord.name.len() as u64 + coord.values.size())
            .sum::<u64>();
        let variables_size = self
            .variables
            .iter()
            .map(|var| var.name.len() as u64 + var.values.size())
            .sum::<u64>();
        let attrs_size = self
            .attrs
            .iter()
            .map(|(key, value)| (key.len() + value.len()) as u64)
            .sum::<u64>();

        coordinates_size + variables_size + attrs_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_one() -> Result<Dataset> {
        let mut dataset = Dataset::new();
        dataset.add_dim(DIM_INDEX, 4)?;
        dataset.add_coordinate(DIM_INDEX, &[DIM_INDEX], Values::of_i64(vec![0, 1, 2, 3]))?;
        dataset.add_coordinate(
            LATITUDE,
            &[DIM_INDEX],
            Values::of_f64(vec![24.0, 24.0, 25.0, 25.0]),
        )?;
        dataset.add_variable(
            TEMP,
            &[DIM_INDEX],
            Values::of_f64(vec![21.5, 18.2, 21.3, 17.9]),
        )?;

        Ok(dataset)
    }

    #[test]
    fn test_new() -> Result<()> {
        let dataset = make_one()?;

        assert_eq!(dataset.dims.len(), 1);
        assert_eq!(dataset.get_dim(DIM_INDEX).unwrap().size, 4);

        let latitude = dataset.get_coordinate(LATITUDE).unwrap();
        assert_eq!(latitude.dims, &[DIM_INDEX]);
        assert_eq!(latitude.values.as_f64()[[1]], 24.0);

        let temp = dataset.get_variable(TEMP).unwrap();
        assert_eq!(temp.values.dtype(), Dtype::F64);
        assert_eq!(temp.values.shape(), &[4]);

        assert!(dataset.get_coordinate("doesn't exist").is_none());
        assert!(dataset.get_variable("also doesn't exist").is_none());

        Ok(())
    }

    #[test]
    fn test_unknown_dim() -> Result<()> {
        let mut dataset = make_one()?;
        let result = dataset.add_variable(PSAL, &["levels"], Values::of_f64(vec![35.1; 4]));
        assert!(matches!(result, Err(Error::BadName(_))));

        Ok(())
    }

    #[test]
    fn test_shape_mismatch() -> Result<()> {
        let mut dataset = make_one()?;
        let result = dataset.add_variable(PSAL, &[DIM_INDEX], Values::of_f64(vec![35.1; 3]));
        assert!(matches!(result, Err(Error::InvalidStructure(_))));

        Ok(())
    }

    #[test]
    fn test_duplicate_variable() -> Result<()> {
        let mut dataset = make_one()?;
        let result = dataset.add_variable(TEMP, &[DIM_INDEX], Values::of_f64(vec![0.0; 4]));
        assert!(matches!(result, Err(Error::InvalidStructure(_))));

        Ok(())
    }

    #[test]
    fn test_full_fill_values() {
        let values = Values::full(Dtype::F64, &[2, 3]);
        assert_eq!(values.shape(), &[2, 3]);
        assert!(values.as_f64()[[0, 0]].is_nan());

        assert_eq!(Values::full(Dtype::I32, &[2]).as_i32()[[0]], 99999);
        assert_eq!(Values::full(Dtype::I64, &[2]).as_i64()[[0]], 99999);
        assert_eq!(Values::full(Dtype::Str, &[2]).as_str()[[0]], " ");
        assert_eq!(Values::full(Dtype::Time, &[2]).as_time()[[0]], NAT);
    }

    #[test]
    fn test_set_from() {
        let src = Values::of_f64(vec![1.0, 2.0, 3.0]);
        let mut dst = Values::full(Dtype::F64, &[2, 2]);
        dst.set_from(&[1, 0], &src, &[2]);
        assert_eq!(dst.as_f64()[[1, 0]], 3.0);
        assert!(dst.as_f64()[[0, 0]].is_nan());
    }

    #[test]
    #[should_panic]
    fn test_set_from_dtype_mismatch() {
        let src = Values::of_f64(vec![1.0]);
        let mut dst = Values::full(Dtype::I64, &[1]);
        dst.set_from(&[0], &src, &[0]);
    }

    #[test]
    #[should_panic]
    fn test_wrong_accessor() {
        let values = Values::of_i64(vec![1, 2, 3]);
        values.as_f64();
    }

    #[test]
    fn test_size() -> Result<()> {
        let values = Values::of_f64(vec![0.0; 10]);
        assert_eq!(values.size(), 80);

        let values = Values::of_str(vec![String::from("1"); 10]);
        assert_eq!(values.size(), 20);

        let dataset = make_one()?;
        assert!(dataset.size() > 0);

        Ok(())
    }
}
