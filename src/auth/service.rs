use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tonic::{Request, Response, Status};
use tracing::info;

use super::token::{generate_secret, TokenManager};
use crate::proto::auth_service_server::AuthService;
use crate::proto::{LoginRequest, LoginResponse};
use crate::store::UserStore;
use crate::{Error, Result};

/// gRPC service issuing access tokens for stored users.
#[derive(Clone)]
pub struct AuthServiceImpl {
    users: Arc<dyn UserStore>,
    tokens: Arc<TokenManager>,
    dummy_hash: Arc<str>,
}

impl AuthServiceImpl {
    /// Creates the service over `users`, signing with `tokens`.
    ///
    /// `password_cost` should match the bcrypt cost of stored users; unknown
    /// usernames are checked against a hash of that cost.
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<TokenManager>,
        password_cost: u32,
    ) -> Result<Self> {
        let dummy_hash = bcrypt::hash(generate_secret(), password_cost)
            .map_err(|e| Error::Internal(format!("cannot hash password: {e}")))?;

        Ok(Self {
            users,
            tokens,
            dummy_hash: dummy_hash.into(),
        })
    }

    /// Checks the credentials and returns a fresh access token.
    ///
    /// Unknown users and wrong passwords fail identically, each after one
    /// bcrypt verification on the blocking pool.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<String> {
        let user = self.users.find(username).await;
        let hash = user
            .as_ref()
            .map_or_else(|| self.dummy_hash.to_string(), |u| u.hashed_password.clone());
        let password = password.to_string();

        let matches =
            tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
                .await
                .map_err(|e| Error::Internal(format!("password check failed: {e}")))?;

        match user {
            Some(user) if matches => self.tokens.issue(&user),
            _ => Err(Error::NotFound("incorrect username/password".to_string())),
        }
    }
}

#[tonic::async_trait]
impl AuthService for AuthServiceImpl {
    async fn login(
        &self,
        request: Request<LoginRequest>,
    ) -> std::result::Result<Response<LoginResponse>, Status> {
        let start = Instant::now();
        counter!("auth.login.requests").increment(1);

        let req = request.into_inner();
        let result = self.authenticate(&req.username, &req.password).await;

        histogram!("auth.login.duration").record(start.elapsed().as_secs_f64());

        match &result {
            Ok(_) => {
                counter!("auth.login.success").increment(1);
                info!(username = %req.username, "user logged in");
            }
            Err(_) => {
                counter!("auth.login.failure").increment(1);
                info!(username = %req.username, "login rejected");
            }
        }

        Ok(Response::new(LoginResponse {
            access_token: result?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::user::TEST_COST;
    use crate::store::{InMemoryUserStore, User};

    async fn service_with_cost(cost: u32) -> AuthServiceImpl {
        let users = InMemoryUserStore::new();
        users
            .save(&User::with_cost("admin1", "secret", "admin", cost).unwrap())
            .await
            .unwrap();

        let tokens = Arc::new(TokenManager::new(b"secret", Duration::from_secs(60)));
        AuthServiceImpl::new(Arc::new(users), tokens, cost).unwrap()
    }

    async fn service() -> AuthServiceImpl {
        service_with_cost(TEST_COST).await
    }

    #[tokio::test]
    async fn correct_credentials_yield_token_with_role() {
        let service = service().await;

        let token = service.authenticate("admin1", "secret").await.unwrap();
        let claims = service.tokens.verify(&token).unwrap();

        assert_eq!(claims.sub, "admin1");
        assert_eq!(claims.role, "admin");
    }

    #[tokio::test]
    async fn unknown_user_and_wrong_password_look_the_same() {
        let service = service().await;

        let unknown = Status::from(service.authenticate("ghost", "secret").await.unwrap_err());
        let wrong = Status::from(service.authenticate("admin1", "nope").await.unwrap_err());

        assert_eq!(unknown.code(), wrong.code());
        assert_eq!(unknown.message(), wrong.message());
    }

    #[tokio::test]
    async fn unknown_user_pays_for_a_hash_check() {
        let service = service_with_cost(10).await;

        let start = Instant::now();
        let _ = service.authenticate("admin1", "wrong").await;
        let wrong_password = start.elapsed();

        let start = Instant::now();
        let _ = service.authenticate("ghost", "wrong").await;
        let unknown_user = start.elapsed();

        assert!(
            unknown_user * 4 >= wrong_password,
            "unknown user took {unknown_user:?}, wrong password took {wrong_password:?}"
        );
    }

    #[tokio::test]
    async fn password_check_leaves_runtime_free() {
        let service = service_with_cost(10).await;

        let sleeper = tokio::spawn(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Instant::now()
        });

        let _ = service.authenticate("admin1", "wrong").await;
        let login_done = Instant::now();
        let slept = sleeper.await.unwrap();

        assert!(slept < login_done);
    }
}
