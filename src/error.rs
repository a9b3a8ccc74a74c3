//! Error types for the rendering core.

use thiserror::Error;

use crate::crs::Crs;

/// Result type alias using RenderError.
pub type RenderResult<T> = Result<T, RenderError>;

/// Primary error type for render operations.
///
/// Every way a render request can fail is enumerated here so callers can
/// match on the variant. Collaborator failures that have no tag of their own
/// travel through the transparent `Other` variant.
#[derive(Debug, Error)]
pub enum RenderError {
    // === Request Errors ===
    #[error("Invalid request: {message}")]
    InvalidRequest {
        message: String,
        /// Structured details for the response body, if any.
        payload: Option<serde_json::Value>,
    },

    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(Crs),

    // === Availability Errors ===
    #[error("No catalog available")]
    NoCatalogAvailable,

    #[error("No data available for the requested area")]
    NoDataAvailable,

    // === Wiring Errors ===
    #[error("Configuration error: {0}")]
    Configuration(String),

    // === Transient Errors ===
    /// Memory exhaustion while computing a reprojection transform. The
    /// transform planner retries this internally; it escalates to the caller
    /// only once retries are exhausted.
    #[error("Out of memory computing reprojection transform")]
    ResourceExhausted,

    // === Collaborator Errors ===
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RenderError {
    /// An `InvalidRequest` without structured payload.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        RenderError::InvalidRequest {
            message: message.into(),
            payload: None,
        }
    }

    /// An `InvalidRequest` carrying a JSON object describing the offending
    /// input.
    pub fn invalid_request_with(
        message: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        RenderError::InvalidRequest {
            message: message.into(),
            payload: Some(payload),
        }
    }

    /// Serialize this error to the mapping shape response bodies use: the
    /// structured payload fields (for `InvalidRequest`) plus a `message` key.
    pub fn details(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        if let RenderError::InvalidRequest { message, payload } = self {
            if let Some(serde_json::Value::Object(fields)) = payload {
                map.extend(fields.clone());
            }
            map.insert(
                "message".to_string(),
                serde_json::Value::String(message.clone()),
            );
        } else {
            map.insert(
                "message".to_string(),
                serde_json::Value::String(self.to_string()),
            );
        }
        map
    }

    /// True for the transient condition the transform planner retries.
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, RenderError::ResourceExhausted)
    }
}
