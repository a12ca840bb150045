use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use super::SensorReading;
use crate::error::ReadingError;

/// One append-only row of the sensor analysis table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRow {
    pub sensor_id: String,
    #[serde(rename = "type")]
    pub sensor_type: String,
    pub value: f64,
    pub timestamp: String,
    pub analysis_result: String,
}

impl AnalysisRow {
    /// Combine a reading with the model's verdict. Fails when `value` is not numeric.
    pub fn build(
        reading: &SensorReading,
        analysis_result: impl Into<String>,
        stamp_missing_timestamp: bool,
    ) -> Result<Self, ReadingError> {
        let value = reading.numeric_value()?;

        let timestamp = if stamp_missing_timestamp && reading.timestamp.is_empty() {
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        } else {
            reading.timestamp.clone()
        };

        Ok(Self {
            sensor_id: reading.sensor_id.clone(),
            sensor_type: reading.sensor_type.clone(),
            value,
            timestamp,
            analysis_result: analysis_result.into(),
        })
    }
}
