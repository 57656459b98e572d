//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use device_catalog::auth::{AccessPolicy, TokenManager};
use device_catalog::proto::auth_service_client::AuthServiceClient;
use device_catalog::proto::device_service_client::DeviceServiceClient;
use device_catalog::proto::LoginRequest;
use device_catalog::server::{seed_users, CatalogServer, SeedUser};
use device_catalog::store::{
    DiskImageStore, InMemoryDeviceStore, InMemoryRatingStore, InMemoryUserStore,
};
use tonic::metadata::MetadataValue;
use tonic::transport::Channel;
use tonic::Request;

pub const SECRET: &[u8] = b"integration-secret";

/// Lowest bcrypt work factor, keeping seeding fast.
pub const TEST_COST: u32 = 4;

/// Initialize test tracing (call once at the beginning of tests).
///
/// Only logs from this crate are shown, filtering out HTTP/2 and tower noise.
/// Subsequent calls are safe and will be ignored.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new("device_catalog=debug");

    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(filter)
        .try_init();
}

/// A server on an ephemeral port with `admin1` and `user1` seeded.
pub struct TestServer {
    pub url: String,
    pub images: tempfile::TempDir,
    pub tokens: Arc<TokenManager>,
    _handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub fn image_folder(&self) -> &Path {
        self.images.path()
    }
}

pub async fn start_test_server() -> TestServer {
    init_tracing();

    let images = tempfile::tempdir().unwrap();
    let users = Arc::new(InMemoryUserStore::new());
    let seeds = [
        SeedUser {
            username: "admin1".to_string(),
            password: "secret".to_string(),
            role: "admin".to_string(),
        },
        SeedUser {
            username: "user1".to_string(),
            password: "secret".to_string(),
            role: "user".to_string(),
        },
    ];
    seed_users(users.as_ref(), &seeds, TEST_COST)
        .await
        .unwrap();

    let tokens = Arc::new(TokenManager::new(SECRET, Duration::from_secs(60)));
    let server = CatalogServer::new(
        Arc::new(InMemoryDeviceStore::new()),
        Arc::new(DiskImageStore::new(images.path()).unwrap()),
        Arc::new(InMemoryRatingStore::new()),
        users,
        TEST_COST,
        tokens.clone(),
        AccessPolicy::catalog(),
    )
    .unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let local_addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        server
            .serve(listener, std::future::pending())
            .await
            .unwrap();
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    TestServer {
        url: format!("http://{local_addr}"),
        images,
        tokens,
        _handle: handle,
    }
}

pub async fn login(url: &str, username: &str, password: &str) -> String {
    let mut client = AuthServiceClient::connect(url.to_string())
        .await
        .expect("Failed to connect to server");

    client
        .login(LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        })
        .await
        .expect("Login should succeed")
        .into_inner()
        .access_token
}

pub async fn channel(url: &str) -> Channel {
    Channel::from_shared(url.to_string())
        .unwrap()
        .connect()
        .await
        .expect("Failed to connect to server")
}

pub type DeviceClient = DeviceServiceClient<
    tonic::service::interceptor::InterceptedService<
        Channel,
        Box<dyn FnMut(Request<()>) -> Result<Request<()>, tonic::Status> + Send>,
    >,
>;

/// Device client attaching `token`, or no credentials when `None`.
pub async fn device_client(url: &str, token: Option<String>) -> DeviceClient {
    let bearer: Option<MetadataValue<_>> =
        token.map(|token| format!("Bearer {token}").parse().unwrap());

    DeviceServiceClient::with_interceptor(
        channel(url).await,
        Box::new(move |mut request: Request<()>| {
            if let Some(bearer) = &bearer {
                request
                    .metadata_mut()
                    .insert("authorization", bearer.clone());
            }
            Ok(request)
        }),
    )
}

/// Logs in as `username` and returns a device client carrying the token.
pub async fn client_as(url: &str, username: &str) -> DeviceClient {
    let token = login(url, username, "secret").await;
    device_client(url, Some(token)).await
}
