use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::{
    claims::{Claims, PendingClaims, PendingRegistration, SealedPending, TokenKind},
    seal,
};
use crate::{config::JwtConfig, state::AppState};

/// Lifetime of the registration token and its emailed code.
pub const VERIFICATION_TTL_MINUTES: u64 = 10;

/// Holds JWT signing and verification keys with config data.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub verification_ttl: Duration,
    secret: Vec<u8>,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from_config(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        let JwtConfig {
            secret,
            issuer,
            audience,
            ttl_minutes,
        } = cfg.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            access_ttl: Duration::from_secs((ttl_minutes.max(1) as u64) * 60),
            verification_ttl: Duration::from_secs(VERIFICATION_TTL_MINUTES * 60),
            secret: secret.into_bytes(),
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        // Expiry is exact: a token is dead the second after `exp`.
        validation.leeway = 0;
        validation
    }

    fn window(now: OffsetDateTime, ttl: Duration) -> (usize, usize) {
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        (now.unix_timestamp() as usize, exp.unix_timestamp() as usize)
    }

    pub fn sign_access(&self, user_id: Uuid, email: &str) -> anyhow::Result<String> {
        let (iat, exp) = Self::window(OffsetDateTime::now_utc(), self.access_ttl);
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            iat,
            exp,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind: TokenKind::Access,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "access token signed");
        Ok(token)
    }

    pub fn verify_access(&self, token: &str) -> anyhow::Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation())?;
        if data.claims.kind != TokenKind::Access {
            anyhow::bail!("not an access token");
        }
        debug!(user_id = %data.claims.sub, "access token verified");
        Ok(data.claims)
    }

    /// Seals the registration and a digest of `code` into a short-lived token.
    pub fn sign_pending(&self, pending: PendingRegistration, code: &str) -> anyhow::Result<String> {
        self.sign_pending_at(pending, code, OffsetDateTime::now_utc())
    }

    pub(crate) fn sign_pending_at(
        &self,
        pending: PendingRegistration,
        code: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<String> {
        let email = pending.email.clone();
        let plaintext = serde_json::to_vec(&SealedPending {
            registration: pending,
            code_tag: seal::code_tag(&self.secret, code)?,
        })?;
        let (iat, exp) = Self::window(now, self.verification_ttl);
        let claims = PendingClaims {
            sealed: seal::seal(&self.secret, &plaintext)?,
            iat,
            exp,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind: TokenKind::Verification,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(%email, "verification token signed");
        Ok(token)
    }

    /// Checks signature, expiry and kind, then that `code` is the one sealed in.
    pub fn verify_pending(&self, token: &str, code: &str) -> anyhow::Result<PendingRegistration> {
        let data = decode::<PendingClaims>(token, &self.decoding, &self.validation())?;
        if data.claims.kind != TokenKind::Verification {
            anyhow::bail!("not a verification token");
        }
        let plaintext = seal::open(&self.secret, &data.claims.sealed)?;
        let sealed: SealedPending = serde_json::from_slice(&plaintext)?;
        if !seal::code_matches(&self.secret, code, &sealed.code_tag)? {
            anyhow::bail!("verification code mismatch");
        }
        Ok(sealed.registration)
    }
}
