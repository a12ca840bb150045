pub mod reading;
pub mod row;

pub use reading::{coerce_value, SensorReading};
pub use row::AnalysisRow;
