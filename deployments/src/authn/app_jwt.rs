//! GitHub App assertion signing

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

/// Clock drift allowance applied to `iat`
const ISSUED_AT_SKEW_SECS: i64 = 60;

/// GitHub rejects assertions valid for longer than ten minutes
const ASSERTION_LIFETIME_SECS: i64 = 9 * 60;

/// App assertion claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppClaims {
    /// Issued at timestamp
    pub iat: i64,

    /// Expiration timestamp
    pub exp: i64,

    /// Issuer (App ID)
    pub iss: String,
}

/// Signs short-lived App-level JWTs with the App's private key
pub struct AppJwtSigner {
    app_id: u64,
    key: EncodingKey,
}

impl std::fmt::Debug for AppJwtSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppJwtSigner")
            .field("app_id", &self.app_id)
            .finish_non_exhaustive()
    }
}

impl AppJwtSigner {
    /// Create a signer from a PEM encoded RSA private key
    pub fn new(app_id: u64, private_key: &SecretString) -> Result<Self, DeployError> {
        let key = EncodingKey::from_rsa_pem(private_key.expose_secret().as_bytes())
            .map_err(|e| DeployError::Config(format!("Invalid App private key: {}", e)))?;

        Ok(Self { app_id, key })
    }

    /// Claims for an assertion issued at `now`
    pub fn claims_at(&self, now: DateTime<Utc>) -> AppClaims {
        AppClaims {
            iat: (now - Duration::seconds(ISSUED_AT_SKEW_SECS)).timestamp(),
            exp: (now + Duration::seconds(ASSERTION_LIFETIME_SECS)).timestamp(),
            iss: self.app_id.to_string(),
        }
    }

    /// Sign a fresh assertion
    pub fn sign(&self) -> Result<String, DeployError> {
        let claims = self.claims_at(Utc::now());
        encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|e| DeployError::Authentication(format!("Failed to sign App JWT: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    const PRIVATE_KEY: &str = include_str!("../../tests/fixtures/app_private_key.pem");
    const PUBLIC_KEY: &str = include_str!("../../tests/fixtures/app_public_key.pem");

    #[test]
    fn test_signed_assertion_verifies_with_public_key() {
        let signer = AppJwtSigner::new(42, &SecretString::from(PRIVATE_KEY.to_string())).unwrap();
        let token = signer.sign().unwrap();

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_required_spec_claims(&["exp", "iat", "iss"]);
        validation.set_issuer(&["42"]);
        let decoded = decode::<AppClaims>(
            &token,
            &DecodingKey::from_rsa_pem(PUBLIC_KEY.as_bytes()).unwrap(),
            &validation,
        )
        .unwrap();

        assert_eq!(decoded.claims.iss, "42");
        assert!(decoded.claims.exp - decoded.claims.iat <= 600);
    }

    #[test]
    fn test_claims_window() {
        let signer = AppJwtSigner::new(7, &SecretString::from(PRIVATE_KEY.to_string())).unwrap();
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let claims = signer.claims_at(now);

        assert_eq!(claims.iat, 1_700_000_000 - 60);
        assert_eq!(claims.exp, 1_700_000_000 + 540);
    }

    #[test]
    fn test_rejects_invalid_key() {
        let err = AppJwtSigner::new(1, &SecretString::from("not a key".to_string())).unwrap_err();
        assert!(matches!(err, DeployError::Config(_)));
    }
}
