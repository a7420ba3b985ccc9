//! Authentication service probe
//!
//! A single-method gRPC client: `ValidateUser(email) -> {is_valid}`. The
//! caller decides retry policy; this client does none and caches nothing.

use std::time::Duration;

use thiserror::Error;
use tonic::transport::Endpoint;

/// Generated gRPC bindings for the auth service
pub mod proto {
    tonic::include_proto!("confab.auth");
}

use proto::auth_service_client::AuthServiceClient;
use proto::ValidateUserRequest;

/// Classified outcomes of the validation probe
#[derive(Error, Debug)]
pub enum AuthError {
    /// Transport-level failure reaching the auth service (maps to 503)
    #[error("authentication service unavailable: {0}")]
    Unavailable(String),

    /// The service answered and the user does not exist (maps to 404)
    #[error("user not found")]
    UserNotFound,
}

/// Probe client for the Authentication service
#[derive(Debug, Clone)]
pub struct AuthClient {
    endpoint: String,
    timeout: Duration,
}

impl AuthClient {
    /// Create a client for the given `http://host:port` endpoint
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
        }
    }

    /// Ask the auth service whether `email` names a valid, verified user
    pub async fn validate_user(&self, email: &str) -> Result<(), AuthError> {
        let endpoint = Endpoint::from_shared(self.endpoint.clone())
            .map_err(|e| AuthError::Unavailable(e.to_string()))?
            .connect_timeout(self.timeout)
            .timeout(self.timeout);

        let channel = endpoint
            .connect()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        let mut client = AuthServiceClient::new(channel);
        let response = client
            .validate_user(ValidateUserRequest {
                email: email.to_string(),
            })
            .await
            .map_err(|status| AuthError::Unavailable(status.to_string()))?;

        if response.into_inner().is_valid {
            Ok(())
        } else {
            Err(AuthError::UserNotFound)
        }
    }
}
