//! Device service, call context and server assembly.

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic_health::server::HealthReporter;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::{AccessPolicy, AuthInterceptor, AuthLayer, AuthServiceImpl, TokenManager};
use crate::proto::auth_service_server::AuthServiceServer;
use crate::proto::device_service_server::DeviceServiceServer;
use crate::store::{DeviceStore, ImageStore, RatingStore, User, UserStore};
use crate::{Error, Result};

/// Server configuration.
pub mod config;

/// Per-call cancellation and deadline.
pub mod context;

/// gRPC device service implementation.
pub mod service;

/// Upload state machine.
pub mod upload;

pub use config::{ServerConfig, SeedUser};
pub use context::CallContext;
pub use service::DeviceServiceImpl;
pub use upload::MAX_IMAGE_SIZE;

/// Saves every seed account into `users`, hashing with `cost`.
pub async fn seed_users(users: &dyn UserStore, seeds: &[SeedUser], cost: u32) -> Result<()> {
    for seed in seeds {
        let user = User::with_cost(&seed.username, &seed.password, &seed.role, cost)?;
        users.save(&user).await?;
        info!(username = %seed.username, role = %seed.role, "seeded user");
    }
    Ok(())
}

/// The complete gRPC server: device and auth services behind the access gate.
pub struct CatalogServer {
    devices: DeviceServiceImpl,
    auth: AuthServiceImpl,
    interceptor: AuthInterceptor,
}

impl CatalogServer {
    /// Wires the stores and token manager into the services, gated by `policy`.
    ///
    /// `password_cost` is the bcrypt cost the users were seeded with.
    pub fn new(
        devices: Arc<dyn DeviceStore>,
        images: Arc<dyn ImageStore>,
        ratings: Arc<dyn RatingStore>,
        users: Arc<dyn UserStore>,
        password_cost: u32,
        tokens: Arc<TokenManager>,
        policy: AccessPolicy,
    ) -> Result<Self> {
        Ok(Self {
            devices: DeviceServiceImpl::new(devices, images, ratings),
            auth: AuthServiceImpl::new(users, tokens.clone(), password_cost)?,
            interceptor: AuthInterceptor::new(tokens, policy),
        })
    }

    /// Accepts connections on `listener` until `shutdown` resolves.
    ///
    /// Health status is reported as serving until shutdown begins.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let addr = listener.local_addr()?;
        let (mut reporter, health_service) = tonic_health::server::health_reporter();
        report_serving(&mut reporter, true).await;

        let shutdown = async move {
            shutdown.await;
            report_serving(&mut reporter, false).await;
            info!("shutting down, draining in-flight calls");
        };

        info!(%addr, "catalog server listening");

        Server::builder()
            .layer(TraceLayer::new_for_grpc())
            .layer(AuthLayer::new(self.interceptor))
            .add_service(health_service)
            .add_service(DeviceServiceServer::new(self.devices))
            .add_service(AuthServiceServer::new(self.auth))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
            .await
            .map_err(|e| Error::Internal(format!("server failed: {e}")))?;

        info!("catalog server stopped");
        Ok(())
    }
}

async fn report_serving(reporter: &mut HealthReporter, serving: bool) {
    if serving {
        reporter
            .set_serving::<DeviceServiceServer<DeviceServiceImpl>>()
            .await;
        reporter
            .set_serving::<AuthServiceServer<AuthServiceImpl>>()
            .await;
    } else {
        reporter
            .set_not_serving::<DeviceServiceServer<DeviceServiceImpl>>()
            .await;
        reporter
            .set_not_serving::<AuthServiceServer<AuthServiceImpl>>()
            .await;
    }
}
