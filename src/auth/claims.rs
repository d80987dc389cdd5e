use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Purpose of a signed token.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Verification,
}

/// Bearer token payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,       // user ID
    pub email: String,
    pub iat: usize,      // issued at (unix timestamp)
    pub exp: usize,      // expires at (unix timestamp)
    pub iss: String,
    pub aud: String,
    pub kind: TokenKind,
}

/// Unverified registration carried by the temporary token; never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRegistration {
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Plaintext of the sealed claim: the registration plus a keyed digest of the code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedPending {
    #[serde(flatten)]
    pub registration: PendingRegistration,
    pub code_tag: String,
}

/// Verification token payload. `sealed` is an encrypted [`SealedPending`],
/// so decoding the token reveals neither the code nor the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingClaims {
    pub sealed: String,
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
    pub kind: TokenKind,
}
