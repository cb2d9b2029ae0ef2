//! Token Codec
//!
//! HS256 JWT encoding of [`Claims`]. Pure CPU work: no I/O, no shared
//! mutable state beyond the keys built once from the signing secret.

use crate::error::TokenError;
use crate::models::{Claims, TokenType};

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

/// Signs and verifies tokens with a symmetric secret
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Sign a token issued now
    pub fn encode(
        &self,
        subject: Uuid,
        expires: DateTime<Utc>,
        token_type: TokenType,
    ) -> Result<String, TokenError> {
        self.encode_at(subject, Utc::now(), expires, token_type, Uuid::new_v4())
    }

    /// Sign a token with an explicit issued-at time and token ID.
    ///
    /// Identical arguments produce identical tokens.
    pub fn encode_at(
        &self,
        subject: Uuid,
        issued_at: DateTime<Utc>,
        expires: DateTime<Utc>,
        token_type: TokenType,
        jti: Uuid,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            sub: subject,
            iat: issued_at.timestamp(),
            exp: expires.timestamp(),
            jti,
            token_type,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify signature and expiry and return the claims.
    ///
    /// The type tag is not checked here; see [`TokenCodec::decode_as`].
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("JWT validation failed: {:?}", e);
                TokenError::from(e)
            })
    }

    /// Decode and require a specific type tag
    pub fn decode_as(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        let claims = self.decode(token)?;
        if claims.token_type != expected {
            tracing::debug!(
                expected = %expected,
                actual = %claims.token_type,
                "Token type mismatch"
            );
            return Err(TokenError::WrongType);
        }
        Ok(claims)
    }
}
