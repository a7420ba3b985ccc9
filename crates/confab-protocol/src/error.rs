//! Protocol error types

use thiserror::Error;

/// Errors raised while classifying an inbound frame
///
/// A protocol error never closes the connection; the router logs it and
/// keeps reading.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame body is not parseable JSON
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(String),

    /// Frame parsed, but the top level is not an object
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// A field the frame type requires is absent
    #[error("frame is missing required field `{0}`")]
    MissingField(&'static str),

    /// A required field is present with the wrong JSON type
    #[error("frame field `{0}` must be a string")]
    InvalidField(&'static str),
}
