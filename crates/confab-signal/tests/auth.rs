//! Auth client classification against an in-process gRPC server

use std::time::Duration;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

use confab_signal::auth::proto::auth_service_server::{AuthService, AuthServiceServer};
use confab_signal::auth::proto::{ValidateUserRequest, ValidateUserResponse};
use confab_signal::auth::{AuthClient, AuthError};

/// Knows exactly one user
struct MockAuth;

#[tonic::async_trait]
impl AuthService for MockAuth {
    async fn validate_user(
        &self,
        request: Request<ValidateUserRequest>,
    ) -> Result<Response<ValidateUserResponse>, Status> {
        let is_valid = request.into_inner().email == "known@example.com";
        Ok(Response::new(ValidateUserResponse { is_valid }))
    }
}

async fn start_mock_auth() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        Server::builder()
            .add_service(AuthServiceServer::new(MockAuth))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_known_user_validates() {
    let endpoint = start_mock_auth().await;
    let client = AuthClient::new(endpoint, Duration::from_secs(2));
    client.validate_user("known@example.com").await.unwrap();
}

#[tokio::test]
async fn test_negative_reply_is_user_not_found() {
    let endpoint = start_mock_auth().await;
    let client = AuthClient::new(endpoint, Duration::from_secs(2));
    assert!(matches!(
        client.validate_user("ghost@example.com").await,
        Err(AuthError::UserNotFound)
    ));
}

#[tokio::test]
async fn test_transport_failure_is_unavailable() {
    // Nothing listens on this port
    let client = AuthClient::new("http://127.0.0.1:1", Duration::from_millis(300));
    assert!(matches!(
        client.validate_user("anyone@example.com").await,
        Err(AuthError::Unavailable(_))
    ));
}
