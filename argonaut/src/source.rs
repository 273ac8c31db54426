use async_trait::async_trait;

use crate::{
    dataset::{
        Dataset, Values, CYCLE_NUMBER, DATA_MODE, DIM_INDEX, DIRECTION, LATITUDE, LONGITUDE,
        PLATFORM_NUMBER, PRES, PSAL, TEMP, TIME,
    },
    errors::Result,
    query::Query,
};

/// A trait for retrieving raw Argo measurements from an arbitrary backend.
///
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch the flat table of measurements matching `query`.
    ///
    /// Should return `Option::None` when the queried scope (a float or a cycle) doesn't exist at
    /// the source. A region with no matching measurements is an empty batch, not `None`.
    ///
    async fn fetch(&self, query: &Query) -> Result<Option<PointBatch>>;
}

/// A flat, columnar table of point measurements, as delivered by a data source.
///
/// Each column has one entry per measurement. Quality control flags arrive as the single
/// character strings used on the wire and are normalized to integers during materialization.
///
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointBatch {
    pub platform_number: Vec<i64>,
    pub cycle_number: Vec<i64>,
    pub longitude: Vec<f64>,
    pub latitude: Vec<f64>,
    pub time: Vec<i64>,
    pub pres: Vec<f64>,
    pub temp: Vec<f64>,
    pub psal: Vec<f64>,
    pub pres_qc: Vec<String>,
    pub temp_qc: Vec<String>,
    pub psal_qc: Vec<String>,
    pub data_mode: Vec<String>,
    pub direction: Vec<String>,
}

/// A single measurement row.
///
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub platform_number: i64,
    pub cycle_number: i64,
    pub longitude: f64,
    pub latitude: f64,
    pub time: i64,
    pub pres: f64,
    pub temp: f64,
    pub psal: f64,
    pub pres_qc: String,
    pub temp_qc: String,
    pub psal_qc: String,
    pub data_mode: String,
    pub direction: String,
}

impl Sample {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        platform_number: i64,
        cycle_number: i64,
        longitude: f64,
        latitude: f64,
        time: i64,
        pres: f64,
        temp: f64,
        psal: f64,
    ) -> Self {
        Self {
            platform_number,
            cycle_number,
            longitude,
            latitude,
            time,
            pres,
            temp,
            psal,
            pres_qc: String::from("1"),
            temp_qc: String::from("1"),
            psal_qc: String::from("1"),
            data_mode: String::from("R"),
            direction: String::from("A"),
        }
    }
}

impl PointBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.platform_number.len()
    }

    pub fn is_empty(&self) -> bool {
        self.platform_number.is_empty()
    }

    pub fn push(&mut self, sample: Sample) {
        self.platform_number.push(sample.platform_number);
        self.cycle_number.push(sample.cycle_number);
        self.longitude.push(sample.longitude);
        self.latitude.push(sample.latitude);
        self.time.push(sample.time);
        self.pres.push(sample.pres);
        self.temp.push(sample.temp);
        self.psal.push(sample.psal);
        self.pres_qc.push(sample.pres_qc);
        self.temp_qc.push(sample.temp_qc);
        self.psal_qc.push(sample.psal_qc);
        self.data_mode.push(sample.data_mode);
        self.direction.push(sample.direction);
    }

    pub fn sample(&self, index: usize) -> Sample {
        Sample {
            platform_number: self.platform_number[index],
            cycle_number: self.cycle_number[index],
            longitude: self.longitude[index],
            latitude: self.latitude[index],
            time: self.time[index],
            pres: self.pres[index],
            temp: self.temp[index],
            psal: self.psal[index],
            pres_qc: self.pres_qc[index].clone(),
            temp_qc: self.temp_qc[index].clone(),
            psal_qc: self.psal_qc[index].clone(),
            data_mode: self.data_mode[index].clone(),
            direction: self.direction[index].clone(),
        }
    }

    pub fn extend(&mut self, other: &PointBatch) {
        for index in 0..other.len() {
            self.push(other.sample(index));
        }
    }

    /// Keep only the rows whose index passes `keep`.
    ///
    pub fn filter<F>(&self, keep: F) -> PointBatch
    where
        F: Fn(usize) -> bool,
    {
        let mut out = PointBatch::new();
        for index in 0..self.len() {
            if keep(index) {
                out.push(self.sample(index));
            }
        }

        out
    }

    /// Verify all columns have the same length.
    ///
    pub fn validate(&self) -> Result<()> {
        let n = self.len();
        let lengths = [
            self.cycle_number.len(),
            self.longitude.len(),
            self.latitude.len(),
            self.time.len(),
            self.pres.len(),
            self.temp.len(),
            self.psal.len(),
            self.pres_qc.len(),
            self.temp_qc.len(),
            self.psal_qc.len(),
            self.data_mode.len(),
            self.direction.len(),
        ];
        if lengths.iter().any(|&length| length != n) {
            return Err(crate::errors::Error::Source(format!(
                "ragged point batch: expected {n} rows in every column"
            )));
        }

        Ok(())
    }

    /// Assemble the batch into a points layout dataset.
    ///
    /// Position and time become coordinates over `index`; everything else becomes a data
    /// variable, in name order. Quality control flags are still strings at this point; the
    /// fetcher runs `cast_types` after assembly.
    ///
    pub fn into_dataset(self) -> Result<Dataset> {
        self.validate()?;
        let n = self.len();

        let mut dataset = Dataset::new();
        dataset.add_dim(DIM_INDEX, n)?;
        dataset.add_coordinate(DIM_INDEX, &[DIM_INDEX], Values::of_i64((0..n as i64).collect()))?;
        dataset.add_coordinate(LATITUDE, &[DIM_INDEX], Values::of_f64(self.latitude))?;
        dataset.add_coordinate(LONGITUDE, &[DIM_INDEX], Values::of_f64(self.longitude))?;
        dataset.add_coordinate(TIME, &[DIM_INDEX], Values::of_time(self.time))?;

        // Variables in name order
        dataset.add_variable(CYCLE_NUMBER, &[DIM_INDEX], Values::of_i64(self.cycle_number))?;
        dataset.add_variable(DATA_MODE, &[DIM_INDEX], Values::of_str(self.data_mode))?;
        dataset.add_variable(DIRECTION, &[DIM_INDEX], Values::of_str(self.direction))?;
        dataset.add_variable(
            PLATFORM_NUMBER,
            &[DIM_INDEX],
            Values::of_i64(self.platform_number),
        )?;
        dataset.add_variable(PRES, &[DIM_INDEX], Values::of_f64(self.pres))?;
        dataset.add_variable("pres_qc", &[DIM_INDEX], Values::of_str(self.pres_qc))?;
        dataset.add_variable(PSAL, &[DIM_INDEX], Values::of_f64(self.psal))?;
        dataset.add_variable("psal_qc", &[DIM_INDEX], Values::of_str(self.psal_qc))?;
        dataset.add_variable(TEMP, &[DIM_INDEX], Values::of_f64(self.temp))?;
        dataset.add_variable("temp_qc", &[DIM_INDEX], Values::of_str(self.temp_qc))?;

        Ok(dataset)
    }
}
