use csv::Reader;
use nalgebra::Vector3;
use std::fs::File;
use std::path::Path;

use crate::errors::{CliError, Result};
use crate::types::ImuSample;

const COLUMNS: [&str; 7] = ["timestamp", "gyro_x", "gyro_y", "gyro_z", "accel_x", "accel_y", "accel_z"];

/// Parser for IMU data from CSV files
pub struct ImuParser;

impl ImuParser {
    /// Parse IMU samples from a CSV file
    ///
    /// Expected format, with a header row:
    /// timestamp_seconds,gyro_x,gyro_y,gyro_z,accel_x,accel_y,accel_z
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Vec<ImuSample>> {
        let file = File::open(path.as_ref())
            .map_err(|_| CliError::ImuFileNotFound(path.as_ref().display().to_string()))?;

        let mut samples = Self::parse_reader(file)?;
        samples.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        log::info!("Loaded {} IMU samples from file", samples.len());
        Ok(samples)
    }

    pub fn parse_reader<R: std::io::Read>(reader: R) -> Result<Vec<ImuSample>> {
        let mut reader = Reader::from_reader(reader);
        let mut samples = Vec::new();

        for (line_number, result) in reader.records().enumerate() {
            // +1 for header, +1 for 1-based indexing
            let line = line_number + 2;
            let record = result.map_err(|e| CliError::ImuFormat {
                line,
                message: format!("CSV error: {}", e),
            })?;

            if record.len() < COLUMNS.len() {
                return Err(CliError::ImuFormat {
                    line,
                    message: format!(
                        "Expected at least {} columns, found {}",
                        COLUMNS.len(),
                        record.len()
                    ),
                });
            }

            let mut values = [0.0f64; 7];
            for (i, name) in COLUMNS.iter().enumerate() {
                values[i] = record[i].trim().parse().map_err(|e| CliError::ImuFormat {
                    line,
                    message: format!("Invalid {}: {}", name, e),
                })?;
            }

            samples.push(ImuSample::new(
                values[0],
                Vector3::new(values[1], values[2], values[3]),
                Vector3::new(values[4], values[5], values[6]),
            ));
        }

        if samples.is_empty() {
            return Err(CliError::ImuFormat {
                line: 0,
                message: "No IMU samples found in file".to_string(),
            });
        }
        Ok(samples)
    }
}
