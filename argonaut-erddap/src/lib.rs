//! A concrete implementation of the `argonaut::DataSource` interface for ERDDAP.
//!
//! Argo data centers publish float measurements through ERDDAP's tabledap protocol. This source
//! builds a tabledap request for each query, asks for the `.json` table representation, and
//! decodes the response into a point batch.
//!
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use argonaut::{
    time, DataSource, Error, PointBatch, Query, Result, Sample, CYCLE_NUMBER, DATA_MODE,
    DIRECTION, LATITUDE, LONGITUDE, PLATFORM_NUMBER, PRES, PSAL, TEMP, TIME,
};

/// Variables requested from the server, in the order the decoder consumes them.
const VARIABLES: [&str; 13] = [
    PLATFORM_NUMBER,
    CYCLE_NUMBER,
    LONGITUDE,
    LATITUDE,
    TIME,
    PRES,
    TEMP,
    PSAL,
    "pres_qc",
    "temp_qc",
    "psal_qc",
    DATA_MODE,
    DIRECTION,
];

/// A `DataSource` backed by an ERDDAP server.
///
pub struct ErddapSource {
    client: reqwest::Client,
    base_url: String,
    dataset_id: String,
}

impl ErddapSource {
    /// Create a source for one tabledap dataset on one server.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The server root, e.g. "https://erddap.ifremer.fr/erddap".
    /// * `dataset_id` - The tabledap dataset holding the Argo point index.
    ///
    pub fn new<S: Into<String>>(base_url: S, dataset_id: S) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
            dataset_id: dataset_id.into(),
        }
    }

    /// Build the tabledap request URL for a query: the variable list followed by one constraint
    /// per bound.
    ///
    fn tabledap_url(&self, query: &Query) -> String {
        let mut parts = vec![VARIABLES.join("%2C")];
        match query {
            Query::Region(region) => {
                parts.push(constraint(LONGITUDE, ">=", &region.lon_min.to_string()));
                parts.push(constraint(LONGITUDE, "<=", &region.lon_max.to_string()));
                parts.push(constraint(LATITUDE, ">=", &region.lat_min.to_string()));
                parts.push(constraint(LATITUDE, "<=", &region.lat_max.to_string()));
                parts.push(constraint(PRES, ">=", &region.pres_min.to_string()));
                parts.push(constraint(PRES, "<=", &region.pres_max.to_string()));
                parts.push(constraint(TIME, ">=", &time::format_date(region.date_min)));
                parts.push(constraint(TIME, "<=", &time::format_date(region.date_max)));
            }
            Query::Float(wmo) => {
                parts.push(constraint(PLATFORM_NUMBER, "=", &wmo.to_string()));
            }
            Query::Profile(wmo, cyc) => {
                parts.push(constraint(PLATFORM_NUMBER, "=", &wmo.to_string()));
                parts.push(constraint(CYCLE_NUMBER, "=", &cyc.to_string()));
            }
        }

        format!(
            "{}/tabledap/{}.json?{}",
            self.base_url,
            self.dataset_id,
            parts.join("&")
        )
    }
}

#[async_trait]
impl DataSource for ErddapSource {
    /// Fetch the flat table of measurements matching `query`.
    ///
    /// ERDDAP answers 404 both for unknown scopes and for constraints matching no rows, so a 404
    /// on a region query is an empty batch rather than a missing scope.
    ///
    async fn fetch(&self, query: &Query) -> Result<Option<PointBatch>> {
        let url = self.tabledap_url(query);
        debug!(%url, "requesting tabledap table");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| Error::Source(err.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(match query {
                Query::Region(_) => Some(PointBatch::new()),
                _ => None,
            });
        }

        let response = response
            .error_for_status()
            .map_err(|err| Error::Source(err.to_string()))?;
        let envelope: TableResponse = response
            .json()
            .await
            .map_err(|err| Error::Source(err.to_string()))?;

        let batch = decode_table(envelope.table)?;
        debug!(points = batch.len(), "decoded tabledap response");

        Ok(Some(batch))
    }
}

/// The tabledap `.json` response envelope.
///
#[derive(Debug, Deserialize)]
struct TableResponse {
    table: Table,
}

#[derive(Debug, Deserialize)]
struct Table {
    #[serde(rename = "columnNames")]
    column_names: Vec<String>,
    rows: Vec<Vec<Value>>,
}

fn decode_table(table: Table) -> Result<PointBatch> {
    let mut columns = Vec::with_capacity(VARIABLES.len());
    for name in VARIABLES {
        let column = table
            .column_names
            .iter()
            .position(|column| column == name)
            .ok_or_else(|| Error::Source(format!("response is missing column {name:?}")))?;
        columns.push(column);
    }

    let mut batch = PointBatch::new();
    for row in &table.rows {
        let mut sample = Sample::new(
            integer(row, columns[0])?,
            integer(row, columns[1])?,
            float(row, columns[2])?,
            float(row, columns[3])?,
            stamp(row, columns[4])?,
            float(row, columns[5])?,
            float(row, columns[6])?,
            float(row, columns[7])?,
        );
        sample.pres_qc = string(row, columns[8])?;
        sample.temp_qc = string(row, columns[9])?;
        sample.psal_qc = string(row, columns[10])?;
        sample.data_mode = string(row, columns[11])?;
        sample.direction = string(row, columns[12])?;
        batch.push(sample);
    }

    Ok(batch)
}

fn cell(row: &[Value], index: usize) -> Result<&Value> {
    row.get(index)
        .ok_or_else(|| Error::Source(String::from("short row in tabledap response")))
}

fn float(row: &[Value], index: usize) -> Result<f64> {
    match cell(row, index)? {
        Value::Number(number) => number
            .as_f64()
            .ok_or_else(|| Error::Source(format!("not a float: {number}"))),
        Value::Null => Ok(f64::NAN),
        other => Err(Error::Source(format!("not a float: {other}"))),
    }
}

/// Integer identifiers sometimes arrive as strings, depending on the server's schema.
fn integer(row: &[Value], index: usize) -> Result<i64> {
    match cell(row, index)? {
        Value::Number(number) => number
            .as_i64()
            .ok_or_else(|| Error::Source(format!("not an integer: {number}"))),
        Value::String(text) => text
            .trim()
            .parse()
            .map_err(|_| Error::Source(format!("not an integer: {text:?}"))),
        other => Err(Error::Source(format!("not an integer: {other}"))),
    }
}

fn stamp(row: &[Value], index: usize) -> Result<i64> {
    match cell(row, index)? {
        Value::String(text) => time::parse_date(text),
        Value::Number(number) => number
            .as_i64()
            .ok_or_else(|| Error::Source(format!("not a timestamp: {number}"))),
        Value::Null => Ok(time::NAT),
        other => Err(Error::Source(format!("not a timestamp: {other}"))),
    }
}

fn string(row: &[Value], index: usize) -> Result<String> {
    match cell(row, index)? {
        Value::String(text) => Ok(text.clone()),
        Value::Null => Ok(String::from(" ")),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(Error::Source(format!("not a string: {other}"))),
    }
}

/// Percent-encode the comparison operator the way tabledap URLs expect.
fn constraint(name: &str, op: &str, value: &str) -> String {
    let op = match op {
        ">=" => "%3E=",
        "<=" => "%3C=",
        other => other,
    };

    format!("{name}{op}{value}")
}
