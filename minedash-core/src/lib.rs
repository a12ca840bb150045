pub mod auth;
pub mod config;
pub mod envelope;
pub mod error;
pub mod generative;
pub mod models;
pub mod prompt;
pub mod warehouse;

pub use auth::AccessTokenProvider;
pub use config::MinedashConfig;
pub use envelope::{decode_envelope, DecodedPayload, EnvelopeForm};
pub use error::{AuthError, EnvelopeError, GenerationError, ReadingError, WarehouseError};
pub use generative::{
    create_backend, GenerativeBackend, VertexConfig, VertexGenerateClient, VertexPredictClient,
    NO_RESPONSE,
};
pub use models::{AnalysisRow, SensorReading};
pub use warehouse::{BigQueryClient, RowInsertError, TableRef, Warehouse};
