//! Instruction sent to the generative model for a single reading.

/// Suggested verdict when the reading exceeds the threshold.
pub const ALERT_TEMPLATE: &str =
    "Alert: High temperature ({value}°C), failure risk on sensor {sensor_id}.";

/// Suggested verdict when the reading is within range.
pub const SAFE_TEMPLATE: &str =
    "Temperature within safe range ({value}°C) for sensor {sensor_id}.";

/// Build the prompt. `raw_data` is embedded verbatim, exactly as it was decoded
/// from the envelope, not re-serialized from the parsed reading.
pub fn build_prompt(raw_data: &str, threshold_celsius: f64) -> String {
    format!(
        "Analyze the following mining sensor data in JSON format. \
If the temperature (field \"value\") exceeds {threshold}°C, generate a failure-risk alert. \
Otherwise, state that it is within the safe range. Data: {raw_data}\n\
\n\
Output format:\n\
- If there is an anomaly: \"{ALERT_TEMPLATE}\"\n\
- If there is no anomaly: \"{SAFE_TEMPLATE}\"\n",
        threshold = threshold_celsius,
    )
}
