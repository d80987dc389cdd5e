use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// Brevo API key. When absent, outgoing mail is only logged.
    pub api_key: Option<String>,
    pub api_url: String,
    /// `Name <address>` or a bare address.
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub public_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub email: EmailConfig,
    pub storage: StorageConfig,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;

        let expires_in = env_or("JWT_EXPIRES_IN", "24h");
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            issuer: env_or("JWT_ISSUER", "elife"),
            audience: env_or("JWT_AUDIENCE", "elife-users"),
            ttl_minutes: parse_duration_minutes(&expires_in)
                .with_context(|| format!("invalid JWT_EXPIRES_IN: {expires_in}"))?,
        };

        let email = EmailConfig {
            api_key: std::env::var("BREVO_API_KEY").ok().filter(|k| !k.is_empty()),
            api_url: env_or("BREVO_API_URL", "https://api.brevo.com/v3/smtp/email"),
            from: env_or("EMAIL_FROM", "E-Life <no-reply@elife.app>"),
        };

        let endpoint = env_or("S3_ENDPOINT", "http://localhost:9000");
        let bucket = env_or("S3_BUCKET", "profile-images");
        let public_url = std::env::var("S3_PUBLIC_URL")
            .unwrap_or_else(|_| format!("{}/{}", endpoint.trim_end_matches('/'), bucket));
        let storage = StorageConfig {
            endpoint,
            bucket,
            region: env_or("S3_REGION", "us-east-1"),
            access_key: env_or("S3_ACCESS_KEY", "minioadmin"),
            secret_key: env_or("S3_SECRET_KEY", "minioadmin"),
            public_url,
        };

        Ok(Self {
            database_url,
            jwt,
            email,
            storage,
        })
    }
}

/// Parses `30s`, `15m`, `24h`, `7d` or a bare number of minutes.
/// Sub-minute values round up so a token never gets a zero lifetime.
pub fn parse_duration_minutes(raw: &str) -> anyhow::Result<i64> {
    let raw = raw.trim();
    let (digits, unit) = match raw.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&raw[..idx], Some(c)),
        _ => (raw, None),
    };
    let value: i64 = digits
        .trim()
        .parse()
        .with_context(|| format!("not a number: {digits:?}"))?;
    anyhow::ensure!(value > 0, "duration must be positive");

    let minutes = match unit {
        None | Some('m') => value,
        Some('s') => (value + 59) / 60,
        Some('h') => value * 60,
        Some('d') => value * 60 * 24,
        Some(other) => anyhow::bail!("unknown duration unit {other:?}"),
    };
    Ok(minutes)
}
