//! # Metrics Module
//!
//! Per-epoch evaluation of a run and the append-only table it is logged to.
//!
//! Each row of a [`RunLog`] is written and flushed as soon as the epoch
//! finishes, so a run that aborts part-way keeps every completed epoch.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Serialize, Deserialize};

use crate::acquisition::{
    Acquisition, AcquisitionParams, InformationGain, MaxBelief, MaxValueEntropySearch,
};
use crate::error::Result;
use crate::field::FieldOracle;
use crate::gp::OnlineGp;
use crate::planner::Selection;
use crate::types::{euclidean, points_to_array, Extent, Point, Pose};

/// Column names of the run table, in order
pub const COLUMNS: [&str; 14] = [
    "time",
    "info_gain",
    "aqu_fxn",
    "mse",
    "max_loc_error",
    "max_val_error",
    "current_max_val",
    "current_max_x",
    "current_max_y",
    "pose_x",
    "pose_y",
    "pose_heading",
    "distance",
    "max_value_info",
];

/// One row of the run table
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub time: usize,
    pub info_gain: f64,
    pub aqu_fxn: f64,
    pub mse: f64,
    pub max_loc_error: f64,
    pub max_val_error: f64,
    pub current_max_val: f64,
    pub current_max_loc: Option<Point>,
    pub pose: Pose,
    pub distance: f64,
    /// Filled in by post-processing unless a max belief was sampled
    pub max_value_info: Option<f64>,
}

impl EpochRecord {
    fn to_row(&self) -> String {
        let (mx, my) = match self.current_max_loc {
            Some(p) => (p[0], p[1]),
            None => (f64::NAN, f64::NAN),
        };
        let fields = [
            self.info_gain,
            self.aqu_fxn,
            self.mse,
            self.max_loc_error,
            self.max_val_error,
            self.current_max_val,
            mx,
            my,
            self.pose.x,
            self.pose.y,
            self.pose.heading,
            self.distance,
            self.max_value_info.unwrap_or(f64::NAN),
        ];
        let mut row = self.time.to_string();
        for value in fields {
            row.push(' ');
            row.push_str(&format_value(value));
        }
        row
    }
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        value.to_string()
    }
}

/// Append-only per-epoch table, optionally mirrored to a file
pub struct RunLog {
    writer: Option<BufWriter<File>>,
    records: Vec<EpochRecord>,
}

impl RunLog {
    /// Create (or truncate) a space-delimited table at `path`
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "# {}", COLUMNS.join(" "))?;
        writer.flush()?;
        Ok(RunLog { writer: Some(writer), records: Vec::new() })
    }

    /// Log that only keeps records in memory
    pub fn in_memory() -> Self {
        RunLog { writer: None, records: Vec::new() }
    }

    pub fn append(&mut self, record: EpochRecord) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{}", record.to_row())?;
            writer.flush()?;
        }
        self.records.push(record);
        Ok(())
    }

    pub fn records(&self) -> &[EpochRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// State of the run at evaluation time, before the epoch's samples are
/// folded into the model.
pub struct EpochInputs<'a> {
    pub time: usize,
    pub model: &'a OnlineGp,
    pub selection: &'a Selection,
    pub oracle: &'a dyn FieldOracle,
    pub extent: &'a Extent,
    pub grid_resolution: usize,
    pub predicted_max: (Point, f64),
    pub current_max_val: f64,
    pub current_max_loc: Option<Point>,
    pub pose: Pose,
    pub distance: f64,
}

/// Compute the metrics row for one epoch
pub fn evaluate_epoch(inputs: &EpochInputs<'_>) -> Result<EpochRecord> {
    let path = points_to_array(&inputs.selection.sampling_path);
    let info_gain = if path.nrows() == 0 {
        0.0
    } else {
        InformationGain.score(inputs.time, path.view(), inputs.model, &AcquisitionParams::None)?
    };

    let mse = grid_mse(inputs.model, inputs.oracle, inputs.extent, inputs.grid_resolution)?;

    let (max_loc_error, max_val_error) = match inputs.oracle.true_max() {
        Some((loc, value)) => (
            euclidean(&loc, &inputs.predicted_max.0),
            (value - inputs.predicted_max.1).abs(),
        ),
        None => (f64::NAN, f64::NAN),
    };

    let max_value_info = if inputs.selection.max_value.is_empty() || path.nrows() == 0 {
        None
    } else {
        let belief = MaxBelief {
            max_values: inputs.selection.max_value.clone(),
            max_locations: inputs.selection.max_locations.clone(),
            target: None,
        };
        let params = AcquisitionParams::MaxBelief(belief);
        Some(MaxValueEntropySearch.score(inputs.time, path.view(), inputs.model, &params)?)
    };

    Ok(EpochRecord {
        time: inputs.time,
        info_gain,
        aqu_fxn: inputs.selection.value,
        mse,
        max_loc_error,
        max_val_error,
        current_max_val: inputs.current_max_val,
        current_max_loc: inputs.current_max_loc,
        pose: inputs.pose,
        distance: inputs.distance,
        max_value_info,
    })
}

/// Mean squared error of the posterior mean against the noise-free field on
/// a regular grid; NaN when the oracle has no ground truth.
pub fn grid_mse(model: &OnlineGp, oracle: &dyn FieldOracle, extent: &Extent, resolution: usize) -> Result<f64> {
    let grid = extent.grid(resolution, resolution);
    let truth: Option<Vec<f64>> = grid.iter().map(|p| oracle.true_value(p)).collect();
    let truth = match truth {
        Some(truth) if !truth.is_empty() => truth,
        _ => return Ok(f64::NAN),
    };
    let (mean, _) = model.predict(points_to_array(&grid).view(), false)?;
    let sse: f64 = mean.iter().zip(truth.iter()).map(|(m, t)| (m - t).powi(2)).sum();
    Ok(sse / truth.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(time: usize) -> EpochRecord {
        EpochRecord {
            time,
            info_gain: 1.5,
            aqu_fxn: 2.0,
            mse: 0.25,
            max_loc_error: 1.0,
            max_val_error: 0.5,
            current_max_val: 3.0,
            current_max_loc: Some([1.0, 2.0]),
            pose: Pose::new(1.0, 2.0, 0.0),
            distance: 4.0,
            max_value_info: None,
        }
    }

    #[test]
    fn test_rows_are_flushed_per_epoch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metrics.txt");
        let mut log = RunLog::create(&path).unwrap();
        log.append(record(0)).unwrap();
        log.append(record(1)).unwrap();

        // readable before the log is dropped
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("# time"));
        let fields: Vec<&str> = lines[2].split(' ').collect();
        assert_eq!(fields.len(), COLUMNS.len());
        assert_eq!(fields[0], "1");
        assert_eq!(fields[13], "nan");
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_in_memory_log() {
        let mut log = RunLog::in_memory();
        assert!(log.is_empty());
        log.append(record(0)).unwrap();
        assert_eq!(log.records()[0].time, 0);
    }

    #[test]
    fn test_missing_max_location_written_as_nan() {
        let mut r = record(0);
        r.current_max_loc = None;
        let row = r.to_row();
        assert_eq!(row.split(' ').filter(|f| *f == "nan").count(), 3);
    }
}
