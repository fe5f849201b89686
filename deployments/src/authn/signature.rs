//! Webhook signature verification

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::errors::DeployError;

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

/// Digest used by a signature header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// `X-Hub-Signature: sha1=...`
    Sha1,
    /// `X-Hub-Signature-256: sha256=...`
    Sha256,
}

impl SignatureAlgorithm {
    fn prefix(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Sha1 => "sha1",
            SignatureAlgorithm::Sha256 => "sha256",
        }
    }
}

/// Verifies that webhook payloads were signed with the shared secret
pub struct SignatureVerifier {
    secret: SecretString,
}

impl SignatureVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Check `header` against the HMAC of the exact `payload` bytes
    pub fn verify(&self, payload: &[u8], header: &str) -> Result<(), DeployError> {
        let (algorithm, provided) = parse_header(header)?;
        let expected = self.mac(algorithm, payload)?;

        if provided.len() != expected.len() || !bool::from(provided.ct_eq(expected.as_slice())) {
            return Err(DeployError::Authentication(
                "Webhook signature does not match payload".to_string(),
            ));
        }

        Ok(())
    }

    /// Produce a signature header value for `payload`
    pub fn sign(&self, algorithm: SignatureAlgorithm, payload: &[u8]) -> Result<String, DeployError> {
        let mac = self.mac(algorithm, payload)?;
        Ok(format!("{}={}", algorithm.prefix(), hex::encode(mac)))
    }

    fn mac(&self, algorithm: SignatureAlgorithm, payload: &[u8]) -> Result<Vec<u8>, DeployError> {
        let key = self.secret.expose_secret().as_bytes();
        let invalid_key = |e: hmac::digest::InvalidLength| {
            DeployError::Authentication(format!("Invalid webhook secret: {e}"))
        };

        let bytes = match algorithm {
            SignatureAlgorithm::Sha1 => {
                let mut mac = HmacSha1::new_from_slice(key).map_err(invalid_key)?;
                mac.update(payload);
                mac.finalize().into_bytes().to_vec()
            }
            SignatureAlgorithm::Sha256 => {
                let mut mac = HmacSha256::new_from_slice(key).map_err(invalid_key)?;
                mac.update(payload);
                mac.finalize().into_bytes().to_vec()
            }
        };

        Ok(bytes)
    }
}

fn parse_header(header: &str) -> Result<(SignatureAlgorithm, Vec<u8>), DeployError> {
    let malformed = || DeployError::Authentication("Malformed webhook signature header".to_string());

    let (prefix, digest) = header.trim().split_once('=').ok_or_else(malformed)?;
    let algorithm = match prefix {
        "sha1" => SignatureAlgorithm::Sha1,
        "sha256" => SignatureAlgorithm::Sha256,
        _ => return Err(malformed()),
    };

    let bytes = hex::decode(digest).map_err(|_| malformed())?;
    if bytes.is_empty() {
        return Err(malformed());
    }

    Ok((algorithm, bytes))
}
