use jsonwebtoken::{self, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Claims carried by a session token. Role is intentionally absent: the
/// server resolves it from the store on every request, so a role change
/// never requires re-issuing tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Opaque user identifier.
    pub sub: String,
    pub jti: String,
    /// Domain this token was issued for.
    pub aud: String,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("invalid token: {0}")]
    Decode(String),
    #[error("encoding failed: {0}")]
    Encode(String),
}

pub fn decode_and_verify(token: &str, secret: &[u8], domain: &str) -> Result<JwtClaims, JwtError> {
    let key = DecodingKey::from_secret(secret);
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[domain]);
    jsonwebtoken::decode::<JwtClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| JwtError::Decode(e.to_string()))
}

pub fn encode(claims: &JwtClaims, secret: &[u8]) -> Result<String, JwtError> {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| JwtError::Encode(e.to_string()))
}
