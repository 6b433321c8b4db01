//! Account authentication: password hashing, the password policy applied at
//! registration, JWT access/refresh tokens and the `AuthUser` extractor.

use crate::AppState;
use crate::error::AppError;
use crate::helpers;
use crate::validation::ValidationError;

use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use cellar_db::User;
use headers::Authorization;
use headers::authorization::Bearer;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AuthError {
    #[error("Authentication credentials were not provided.")]
    MissingCredentials,

    #[error("No active account found with the given credentials.")]
    InvalidCredentials,

    #[error("Token is invalid or expired.")]
    InvalidToken,

    #[error("Token has wrong type.")]
    WrongTokenType,

    #[error("User not found.")]
    UnknownUser,

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("token signing failed: {0}")]
    Signing(String),
}

// ============================================================================
// Passwords
// ============================================================================

/// Hash a password into an Argon2id PHC string.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let mut salt_bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut salt_bytes);
    let salt =
        SaltString::encode_b64(&salt_bytes).map_err(|e| AuthError::Hashing(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

/// Check a password against a stored PHC string. Malformed hashes never verify.
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Stands in for the stored hash of an unknown user, so a failed lookup costs
/// as much as a wrong password.
static DUMMY_HASH: LazyLock<String> =
    LazyLock::new(|| hash_password("cellar-dummy-password").unwrap_or_default());

/// `hash_password` on the blocking pool.
pub async fn hash_password_async(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AuthError::Hashing(e.to_string()))?
}

/// Check a login attempt on the blocking pool. Without a stored hash the
/// password is checked against a dummy hash and never matches.
pub async fn check_password(password: String, stored_hash: Option<String>) -> bool {
    let known = stored_hash.is_some();
    let verified = tokio::task::spawn_blocking(move || {
        let hash = stored_hash.as_deref().unwrap_or(DUMMY_HASH.as_str());
        verify_password(&password, hash)
    })
    .await;

    match verified {
        Ok(matches) => known && matches,
        Err(e) => {
            tracing::error!(error = %e, "password verification task failed");
            false
        }
    }
}

/// Frequently used passwords rejected at registration
const COMMON_PASSWORDS: &[&str] = &[
    "123456", "password", "12345678", "qwerty", "123456789", "12345", "1234", "111111",
    "1234567", "dragon", "123123", "baseball", "abc123", "football", "monkey", "letmein",
    "696969", "shadow", "master", "666666", "qwertyuiop", "123321", "mustang", "1234567890",
    "michael", "654321", "superman", "1qaz2wsx", "7777777", "121212", "000000", "qazwsx",
    "123qwe", "killer", "trustno1", "jordan", "jennifer", "zxcvbnm", "asdfgh", "hunter",
    "buster", "soccer", "harley", "batman", "andrew", "tigger", "sunshine", "iloveyou",
    "2000", "charlie", "robert", "thomas", "hockey", "ranger", "daniel", "starwars",
    "klaster", "112233", "george", "computer", "michelle", "jessica", "pepper", "1111",
    "zxcvbn", "555555", "11111111", "131313", "freedom", "777777", "pass", "maggie",
    "159753", "aaaaaa", "ginger", "princess", "joshua", "cheese", "amanda", "summer",
    "love", "ashley", "nicole", "chelsea", "biteme", "matthew", "access", "yankees",
    "987654321", "dallas", "austin", "thunder", "taylor", "matrix", "password1",
    "password123", "welcome", "admin", "admin123", "qwerty123", "passw0rd", "changeme",
];

/// Password strength rules applied at registration.
///
/// Mirrors the usual framework defaults: a minimum length, a common-password
/// list, a numeric-only check and similarity to the account's own attributes.
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    /// Similarity ratio (0..=1) at or above which a password is rejected
    pub max_similarity: f64,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_similarity: 0.7,
        }
    }
}

impl PasswordPolicy {
    /// Check `password` against every rule. `attributes` pairs a human label
    /// ("username") with the user's value for it.
    pub fn validate(
        &self,
        password: &str,
        attributes: &[(&'static str, &str)],
    ) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        let lowered = password.to_lowercase();
        for (label, value) in attributes {
            if self.too_similar(&lowered, value) {
                errors.push(ValidationError::PasswordTooSimilar(label));
                break;
            }
        }

        if password.chars().count() < self.min_length {
            errors.push(ValidationError::PasswordTooShort {
                min: self.min_length,
            });
        }

        if COMMON_PASSWORDS.contains(&lowered.trim()) {
            errors.push(ValidationError::PasswordTooCommon);
        }

        if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
            errors.push(ValidationError::PasswordEntirelyNumeric);
        }

        errors
    }

    fn too_similar(&self, password: &str, value: &str) -> bool {
        let value = value.trim().to_lowercase();
        if value.is_empty() {
            return false;
        }
        let parts = value
            .split(|c: char| !c.is_alphanumeric())
            .filter(|p| !p.is_empty());
        std::iter::once(value.as_str())
            .chain(parts)
            .any(|part| similarity(password, part) >= self.max_similarity)
    }
}

/// Ratcliff/Obershelp similarity: twice the matched characters over the total length.
fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (mut best_len, mut best_a, mut best_b) = (0, 0, 0);
    // Longest common substring, O(len_a * len_b) which is fine for passwords
    let mut prev = vec![0usize; b.len() + 1];
    for i in 0..a.len() {
        let mut row = vec![0usize; b.len() + 1];
        for j in 0..b.len() {
            if a[i] == b[j] {
                row[j + 1] = prev[j] + 1;
                if row[j + 1] > best_len {
                    best_len = row[j + 1];
                    best_a = i + 1 - best_len;
                    best_b = j + 1 - best_len;
                }
            }
        }
        prev = row;
    }
    if best_len == 0 {
        return 0;
    }
    best_len
        + matching_chars(&a[..best_a], &b[..best_b])
        + matching_chars(&a[best_a + best_len..], &b[best_b + best_len..])
}

// ============================================================================
// Tokens
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT claims carried by both token types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, AuthError> {
        self.sub.parse().map_err(|_| AuthError::InvalidToken)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Issues and verifies HS256 tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_lifetime: Duration,
    refresh_lifetime: Duration,
}

impl TokenService {
    pub fn new(secret: &str, access_lifetime: Duration, refresh_lifetime: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_lifetime,
            refresh_lifetime,
        }
    }

    pub fn issue_pair(&self, user_id: i64) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access: self.issue(user_id, TokenType::Access, helpers::now())?,
            refresh: self.issue(user_id, TokenType::Refresh, helpers::now())?,
        })
    }

    pub fn issue_access(&self, user_id: i64) -> Result<String, AuthError> {
        self.issue(user_id, TokenType::Access, helpers::now())
    }

    /// Encode a token of `token_type` issued at `issued_at` (unix seconds).
    pub fn issue(
        &self,
        user_id: i64,
        token_type: TokenType,
        issued_at: i64,
    ) -> Result<String, AuthError> {
        let lifetime = match token_type {
            TokenType::Access => self.access_lifetime,
            TokenType::Refresh => self.refresh_lifetime,
        };
        let claims = Claims {
            sub: user_id.to_string(),
            token_type,
            iat: issued_at,
            exp: issued_at + lifetime.as_secs() as i64,
            jti: helpers::generate_token_id(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Decode and check signature, expiry and token type.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, AuthError> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|_| AuthError::InvalidToken)?
            .claims;

        if claims.token_type != expected {
            return Err(AuthError::WrongTokenType);
        }
        Ok(claims)
    }
}

// ============================================================================
// Extractor
// ============================================================================

/// The authenticated caller, resolved from `Authorization: Bearer <access token>`.
pub struct AuthUser(pub User);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(auth) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AuthError::MissingCredentials)?;

        let claims = state.tokens.verify(auth.token(), TokenType::Access)?;
        let user = state
            .db
            .get_user(claims.user_id()?)
            .await?
            .filter(|u| u.is_active)
            .ok_or(AuthError::UnknownUser)?;

        Ok(AuthUser(user))
    }
}
