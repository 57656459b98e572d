use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::store::User;
use crate::{Error, Result};

/// Claims carried by an access token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Username the token was issued to.
    pub sub: String,
    /// Role of the user at issuance.
    pub role: String,
    /// Issued-at (unix seconds).
    pub iat: u64,
    /// Expiry (unix seconds).
    pub exp: u64,
}

/// Issues and verifies HS256-signed access tokens.
#[derive(Clone)]
pub struct TokenManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    token_duration: Duration,
}

impl TokenManager {
    /// Creates a manager signing with `secret`; tokens live for `token_duration`.
    pub fn new(secret: &[u8], token_duration: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            token_duration,
        }
    }

    /// How long issued tokens remain valid.
    pub fn token_duration(&self) -> Duration {
        self.token_duration
    }

    /// Issues a token for `user`, valid from now.
    pub fn issue(&self, user: &User) -> Result<String> {
        self.issue_at(user, unix_now())
    }

    fn issue_at(&self, user: &User, issued_at: u64) -> Result<String> {
        let claims = Claims {
            sub: user.username.clone(),
            role: user.role.clone(),
            iat: issued_at,
            exp: issued_at.saturating_add(self.token_duration.as_secs()),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| Error::Internal(format!("cannot sign access token: {e}")))
    }

    /// Checks signature and expiry and returns the embedded claims.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => Error::TokenExpired,
                _ => Error::InvalidToken(e.to_string()),
            })
    }
}

/// Generates a random hex-encoded signing secret.
pub fn generate_secret() -> String {
    let mut secret = [0u8; 32];
    OsRng.fill_bytes(&mut secret);
    hex::encode(secret)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| unreachable!("System time is after UNIX_EPOCH"))
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: &str) -> User {
        User {
            username: "alice".to_string(),
            hashed_password: String::new(),
            role: role.to_string(),
        }
    }

    #[test]
    fn issued_token_verifies_with_claims() {
        let manager = TokenManager::new(b"secret", Duration::from_secs(900));

        let token = manager.issue(&user("admin")).unwrap();
        let claims = manager.verify(&token).unwrap();

        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let manager = TokenManager::new(b"secret", Duration::from_secs(60));

        let token = manager.issue_at(&user("user"), unix_now() - 120).unwrap();

        assert!(matches!(manager.verify(&token), Err(Error::TokenExpired)));
    }

    #[test]
    fn token_signed_with_other_secret_is_invalid() {
        let issuer = TokenManager::new(b"secret", Duration::from_secs(60));
        let verifier = TokenManager::new(b"another secret", Duration::from_secs(60));

        let token = issuer.issue(&user("user")).unwrap();

        assert!(matches!(
            verifier.verify(&token),
            Err(Error::InvalidToken(_))
        ));
    }

    #[test]
    fn garbage_token_is_invalid() {
        let manager = TokenManager::new(b"secret", Duration::from_secs(60));
        assert!(matches!(
            manager.verify("not.a.jwt"),
            Err(Error::InvalidToken(_))
        ));
    }

    #[test]
    fn generated_secrets_are_random_hex() {
        let a = generate_secret();
        let b = generate_secret();

        assert_eq!(a.len(), 64);
        assert!(hex::decode(&a).is_ok());
        assert_ne!(a, b);
    }
}
