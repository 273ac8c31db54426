//! A concrete implementation of the `argonaut::DataSource` interface over a local Argo snapshot.
//!
//! A snapshot is a directory tree laid out the way the GDAC mirrors publish it: one directory per
//! data center (DAC), one directory per float under that, holding the float's multi-profile file
//! `<wmo>_prof.json`. Index files refer to data centers by a two-letter institute code, so the
//! code to directory mapping lives here too.
//!
//! The multi-profile file is a JSON object with one array per column, all the same length. Times
//! are epoch seconds. Quality control flags and mode markers may be omitted, in which case every
//! measurement gets the real-time ascending defaults.
//!
use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use argonaut::{DataSource, Error, PointBatch, Query, Result};

/// Institute codes and the DAC directories they map to.
const DACS: [(&str, &str); 11] = [
    ("AO", "aoml"),
    ("BO", "bodc"),
    ("CS", "csiro"),
    ("HZ", "csio"),
    ("IF", "coriolis"),
    ("IN", "incois"),
    ("JA", "jma"),
    ("KM", "kma"),
    ("KO", "kordi"),
    ("ME", "meds"),
    ("NM", "nmdis"),
];

/// Resolve an institute code (e.g. "IF") to its DAC directory name (e.g. "coriolis").
///
pub fn dac_directory(code: &str) -> Result<&'static str> {
    DACS.iter()
        .find(|(dac_code, _)| *dac_code == code)
        .map(|(_, directory)| *directory)
        .ok_or_else(|| Error::BadQuery(format!("unknown institute code {code:?}")))
}

/// A `DataSource` backed by a local snapshot of the Argo file tree.
///
/// Knows how to navigate the folder structure of a snapshot given its root path.
///
pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Path of a float's multi-profile file under a named DAC directory.
    ///
    pub fn float_path(&self, dac: &str, wmo: u32) -> PathBuf {
        self.root
            .join(dac)
            .join(wmo.to_string())
            .join(format!("{wmo}_prof.json"))
    }

    /// Read a float's file given the institute code used in Argo index files.
    ///
    pub fn read_float_from_code(&self, code: &str, wmo: u32) -> Result<PointBatch> {
        self.read_float(dac_directory(code)?, wmo)
    }

    /// Read a float's multi-profile file from a named DAC directory.
    ///
    /// A missing file raises `Error::MissingFile` with the path that was looked up, for easy
    /// catching.
    ///
    pub fn read_float(&self, dac: &str, wmo: u32) -> Result<PointBatch> {
        let path = self.float_path(dac, wmo);
        if !path.is_file() {
            return Err(Error::MissingFile(path.display().to_string()));
        }
        let text = fs::read_to_string(&path)?;
        let file: ProfileFile = serde_json::from_str(&text)
            .map_err(|err| Error::Source(format!("{}: {err}", path.display())))?;

        file.into_batch()
    }

    /// Find a float by scanning the known DAC directories.
    ///
    fn find_float(&self, wmo: u32) -> Result<Option<PointBatch>> {
        for (_, dac) in DACS {
            match self.read_float(dac, wmo) {
                Ok(batch) => return Ok(Some(batch)),
                Err(Error::MissingFile(_)) => continue,
                Err(err) => return Err(err),
            }
        }

        Ok(None)
    }

    /// Read every float file present in the snapshot.
    ///
    fn all_floats(&self) -> Result<PointBatch> {
        let mut out = PointBatch::new();
        for (_, dac) in DACS {
            let dac_dir = self.root.join(dac);
            if !dac_dir.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&dac_dir)? {
                let entry = entry?;
                if !entry.path().is_dir() {
                    continue;
                }
                let name = entry.file_name();
                let wmo = match name.to_str().and_then(|name| name.parse::<u32>().ok()) {
                    Some(wmo) => wmo,
                    None => continue,
                };
                match self.read_float(dac, wmo) {
                    Ok(batch) => out.extend(&batch),
                    Err(Error::MissingFile(_)) => continue,
                    Err(err) => return Err(err),
                }
            }
        }

        Ok(out)
    }
}

#[async_trait]
impl DataSource for LocalSource {
    async fn fetch(&self, query: &Query) -> Result<Option<PointBatch>> {
        debug!(%query, root = %self.root.display(), "reading local snapshot");
        let batch = match query {
            Query::Float(wmo) => self.find_float(*wmo)?,
            Query::Profile(wmo, cyc) => self.find_float(*wmo)?.and_then(|batch| {
                let batch = batch.filter(|i| batch.cycle_number[i] == *cyc as i64);
                if batch.is_empty() {
                    None
                } else {
                    Some(batch)
                }
            }),
            Query::Region(region) => {
                let all = self.all_floats()?;
                Some(all.filter(|i| {
                    region.contains(all.longitude[i], all.latitude[i], all.pres[i], all.time[i])
                }))
            }
        };

        Ok(batch)
    }
}

/// On-disk form of a float's multi-profile file.
///
#[derive(Debug, Deserialize, Serialize)]
struct ProfileFile {
    platform_number: Vec<i64>,
    cycle_number: Vec<i64>,
    longitude: Vec<f64>,
    latitude: Vec<f64>,
    time: Vec<i64>,
    pres: Vec<f64>,
    temp: Vec<f64>,
    psal: Vec<f64>,
    #[serde(default)]
    pres_qc: Vec<String>,
    #[serde(default)]
    temp_qc: Vec<String>,
    #[serde(default)]
    psal_qc: Vec<String>,
    #[serde(default)]
    data_mode: Vec<String>,
    #[serde(default)]
    direction: Vec<String>,
}

impl ProfileFile {
    fn into_batch(self) -> Result<PointBatch> {
        let n = self.platform_number.len();
        let fill = |column: Vec<String>, default: &str| {
            if column.is_empty() {
                vec![String::from(default); n]
            } else {
                column
            }
        };
        let batch = PointBatch {
            platform_number: self.platform_number,
            cycle_number: self.cycle_number,
            longitude: self.longitude,
            latitude: self.latitude,
            time: self.time,
            pres: self.pres,
            temp: self.temp,
            psal: self.psal,
            pres_qc: fill(self.pres_qc, "1"),
            temp_qc: fill(self.temp_qc, "1"),
            psal_qc: fill(self.psal_qc, "1"),
            data_mode: fill(self.data_mode, "R"),
            direction: fill(self.direction, "A"),
        };
        batch.validate()?;

        Ok(batch)
    }
}
