use std::collections::{HashMap, HashSet};
use std::future::{self, Future};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use http::header::CONTENT_TYPE;
use http::HeaderValue;
use tonic::metadata::MetadataMap;
use tonic::Status;
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::token::{Claims, TokenManager};
use crate::{Error, Result};

/// Fully-qualified gRPC method paths served by this crate.
pub mod methods {
    /// `AuthService/Login`.
    pub const LOGIN: &str = "/catalog.v1.AuthService/Login";
    /// `DeviceService/CreateDevice`.
    pub const CREATE_DEVICE: &str = "/catalog.v1.DeviceService/CreateDevice";
    /// `DeviceService/SearchDevice`.
    pub const SEARCH_DEVICE: &str = "/catalog.v1.DeviceService/SearchDevice";
    /// `DeviceService/UploadImage`.
    pub const UPLOAD_IMAGE: &str = "/catalog.v1.DeviceService/UploadImage";
    /// `DeviceService/RateDevice`.
    pub const RATE_DEVICE: &str = "/catalog.v1.DeviceService/RateDevice";
}

/// Role allowed to create devices and upload images.
pub const ROLE_ADMIN: &str = "admin";
/// Role allowed to rate devices.
pub const ROLE_USER: &str = "user";

/// Method path to accepted roles. Methods not listed are open to everyone.
#[derive(Clone, Debug, Default)]
pub struct AccessPolicy {
    rules: HashMap<String, HashSet<String>>,
}

impl AccessPolicy {
    /// Creates a policy with no restricted methods.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts `method` to callers holding one of `roles`.
    pub fn allow(mut self, method: &str, roles: &[&str]) -> Self {
        self.rules
            .entry(method.to_string())
            .or_default()
            .extend(roles.iter().map(|role| role.to_string()));
        self
    }

    /// Roles accepted for `method`, or `None` when it is open.
    pub fn roles_for(&self, method: &str) -> Option<&HashSet<String>> {
        self.rules.get(method)
    }

    /// The catalog's policy: admins write, admins and users rate, anyone searches.
    pub fn catalog() -> Self {
        Self::new()
            .allow(methods::CREATE_DEVICE, &[ROLE_ADMIN])
            .allow(methods::UPLOAD_IMAGE, &[ROLE_ADMIN])
            .allow(methods::RATE_DEVICE, &[ROLE_ADMIN, ROLE_USER])
    }
}

/// Authenticates and authorizes calls against an [`AccessPolicy`].
#[derive(Clone)]
pub struct AuthInterceptor {
    tokens: Arc<TokenManager>,
    policy: Arc<AccessPolicy>,
}

impl AuthInterceptor {
    /// Creates an interceptor verifying tokens with `tokens`.
    pub fn new(tokens: Arc<TokenManager>, policy: AccessPolicy) -> Self {
        Self {
            tokens,
            policy: Arc::new(policy),
        }
    }

    /// Decides whether a call to `method` carrying `metadata` may proceed.
    ///
    /// Returns the caller's claims for restricted methods and `None` for open ones.
    pub fn authorize(&self, method: &str, metadata: &MetadataMap) -> Result<Option<Claims>> {
        let Some(accepted) = self.policy.roles_for(method) else {
            return Ok(None);
        };

        let token = bearer_token(metadata).ok_or_else(|| {
            Error::Unauthenticated("authorization token is not provided".to_string())
        })?;
        let claims = self.tokens.verify(token)?;

        if !accepted.contains(&claims.role) {
            return Err(Error::PermissionDenied(format!(
                "role '{}' may not call {method}",
                claims.role
            )));
        }

        Ok(Some(claims))
    }
}

fn bearer_token(metadata: &MetadataMap) -> Option<&str> {
    let value = metadata.get("authorization")?.to_str().ok()?.trim();
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .unwrap_or(value)
        .trim();

    (!token.is_empty()).then_some(token)
}

/// Tower layer running [`AuthInterceptor`] ahead of every gRPC method.
#[derive(Clone)]
pub struct AuthLayer {
    interceptor: AuthInterceptor,
}

impl AuthLayer {
    /// Wraps `interceptor` as a layer.
    pub fn new(interceptor: AuthInterceptor) -> Self {
        Self { interceptor }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthGuard<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthGuard {
            inner,
            interceptor: self.interceptor.clone(),
        }
    }
}

/// Service produced by [`AuthLayer`].
#[derive(Clone)]
pub struct AuthGuard<S> {
    inner: S,
    interceptor: AuthInterceptor,
}

type BoxFuture<T, E> = Pin<Box<dyn Future<Output = std::result::Result<T, E>> + Send>>;

impl<S, ReqBody, ResBody> Service<http::Request<ReqBody>> for AuthGuard<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: http::Request<ReqBody>) -> Self::Future {
        let method = request.uri().path().to_string();
        let metadata = MetadataMap::from_headers(request.headers().clone());

        match self.interceptor.authorize(&method, &metadata) {
            Ok(claims) => {
                debug!(
                    %method,
                    user = claims.as_ref().map(|c| c.sub.as_str()),
                    "call authorized"
                );
                let ready = self.inner.clone();
                let mut inner = std::mem::replace(&mut self.inner, ready);
                Box::pin(inner.call(request))
            }
            Err(err) => {
                warn!(%method, error = %err, "call rejected");
                let response = status_response(&Status::from(err));
                Box::pin(future::ready(Ok(response)))
            }
        }
    }
}

fn status_response<B: Default>(status: &Status) -> http::Response<B> {
    let mut response = http::Response::new(B::default());
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/grpc"));

    if status.add_header(headers).is_err() {
        headers.insert("grpc-status", HeaderValue::from(status.code() as i32));
    }

    response
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::time::Duration;

    use tonic::Code;

    use super::*;
    use crate::store::User;

    fn interceptor() -> (AuthInterceptor, Arc<TokenManager>) {
        let tokens = Arc::new(TokenManager::new(b"secret", Duration::from_secs(60)));
        let interceptor = AuthInterceptor::new(Arc::clone(&tokens), AccessPolicy::catalog());
        (interceptor, tokens)
    }

    fn metadata_for(tokens: &TokenManager, role: &str) -> MetadataMap {
        let user = User {
            username: "bob".to_string(),
            hashed_password: String::new(),
            role: role.to_string(),
        };
        let token = tokens.issue(&user).unwrap();

        let mut metadata = MetadataMap::new();
        metadata.insert("authorization", format!("Bearer {token}").parse().unwrap());
        metadata
    }

    #[test]
    fn open_methods_need_no_token() {
        let (interceptor, _) = interceptor();

        for method in [methods::LOGIN, methods::SEARCH_DEVICE] {
            let result = interceptor.authorize(method, &MetadataMap::new());
            assert!(matches!(result, Ok(None)));
        }
    }

    #[test]
    fn restricted_method_without_token_is_unauthenticated() {
        let (interceptor, _) = interceptor();

        let err = interceptor
            .authorize(methods::CREATE_DEVICE, &MetadataMap::new())
            .unwrap_err();

        assert_eq!(Status::from(err).code(), Code::Unauthenticated);
    }

    #[test]
    fn restricted_method_with_bad_token_is_unauthenticated() {
        let (interceptor, _) = interceptor();
        let mut metadata = MetadataMap::new();
        metadata.insert("authorization", "Bearer garbage".parse().unwrap());

        let err = interceptor
            .authorize(methods::RATE_DEVICE, &metadata)
            .unwrap_err();

        assert_eq!(Status::from(err).code(), Code::Unauthenticated);
    }

    #[test]
    fn wrong_role_is_permission_denied() {
        let (interceptor, tokens) = interceptor();
        let metadata = metadata_for(&tokens, ROLE_USER);

        let err = interceptor
            .authorize(methods::UPLOAD_IMAGE, &metadata)
            .unwrap_err();

        assert_eq!(Status::from(err).code(), Code::PermissionDenied);
    }

    #[test]
    fn accepted_role_proceeds_with_claims() {
        let (interceptor, tokens) = interceptor();

        let user = interceptor
            .authorize(methods::RATE_DEVICE, &metadata_for(&tokens, ROLE_USER))
            .unwrap()
            .unwrap();
        let admin = interceptor
            .authorize(methods::CREATE_DEVICE, &metadata_for(&tokens, ROLE_ADMIN))
            .unwrap()
            .unwrap();

        assert_eq!(user.role, ROLE_USER);
        assert_eq!(admin.role, ROLE_ADMIN);
    }

    #[test]
    fn bare_token_is_accepted() {
        let (interceptor, tokens) = interceptor();
        let user = User {
            username: "bob".to_string(),
            hashed_password: String::new(),
            role: ROLE_ADMIN.to_string(),
        };
        let mut metadata = MetadataMap::new();
        metadata.insert("authorization", tokens.issue(&user).unwrap().parse().unwrap());

        assert!(interceptor
            .authorize(methods::CREATE_DEVICE, &metadata)
            .is_ok());
    }

    #[derive(Clone)]
    struct Echo;

    impl Service<http::Request<()>> for Echo {
        type Response = http::Response<String>;
        type Error = Infallible;
        type Future = future::Ready<std::result::Result<Self::Response, Infallible>>;

        fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<std::result::Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _: http::Request<()>) -> Self::Future {
            future::ready(Ok(http::Response::new("handled".to_string())))
        }
    }

    #[tokio::test]
    async fn guard_short_circuits_rejected_calls() {
        let (interceptor, _) = interceptor();
        let mut guard = AuthLayer::new(interceptor).layer(Echo);

        let request = http::Request::builder()
            .uri(methods::CREATE_DEVICE)
            .body(())
            .unwrap();
        let response = guard.call(request).await.unwrap();

        assert!(response.body().is_empty());
        assert_eq!(
            response.headers().get("grpc-status").unwrap(),
            &HeaderValue::from(Code::Unauthenticated as i32)
        );
    }

    #[tokio::test]
    async fn guard_passes_authorized_calls_through() {
        let (interceptor, _) = interceptor();
        let mut guard = AuthLayer::new(interceptor).layer(Echo);

        let request = http::Request::builder()
            .uri(methods::SEARCH_DEVICE)
            .body(())
            .unwrap();
        let response = guard.call(request).await.unwrap();

        assert_eq!(response.body(), "handled");
    }
}
