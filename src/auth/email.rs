use anyhow::Context;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use super::jwt::VERIFICATION_TTL_MINUTES;
use crate::config::EmailConfig;

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_verification_code(
        &self,
        to: &str,
        code: &str,
        first_name: Option<&str>,
    ) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sender {
    pub name: String,
    pub email: String,
}

/// Splits `Name <address>` into its parts; a bare address gets a default name.
pub fn parse_sender(raw: &str) -> Sender {
    lazy_static! {
        static ref FROM_RE: Regex = Regex::new(r"^\s*(.+?)\s*<\s*([^<>\s]+)\s*>\s*$").unwrap();
    }
    match FROM_RE.captures(raw) {
        Some(caps) => Sender {
            name: caps[1].trim_matches('"').to_string(),
            email: caps[2].to_string(),
        },
        None => Sender {
            name: "E-Life".to_string(),
            email: raw.trim().to_string(),
        },
    }
}

pub fn verification_subject() -> &'static str {
    "Your verification code"
}

pub fn verification_html(code: &str, first_name: Option<&str>) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
  <body style="font-family: Arial, sans-serif; color: #333; max-width: 600px; margin: 0 auto;">
    <h2>Verification code</h2>
    <p>Hello {name},</p>
    <p>Here is your code to finish creating your account:</p>
    <p style="font-size: 32px; font-weight: bold; letter-spacing: 8px;">{code}</p>
    <p>This code is valid for {ttl} minutes.</p>
    <p style="font-size: 12px; color: #666;">If you did not request this code, ignore this email.</p>
  </body>
</html>"#,
        name = first_name.unwrap_or("there"),
        code = code,
        ttl = VERIFICATION_TTL_MINUTES,
    )
}

fn strip_tags(html: &str) -> String {
    lazy_static! {
        static ref TAG_RE: Regex = Regex::new(r"<[^>]*>").unwrap();
        static ref WS_RE: Regex = Regex::new(r"\s+").unwrap();
    }
    let text = TAG_RE.replace_all(html, " ");
    WS_RE.replace_all(&text, " ").trim().to_string()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BrevoRecipient<'a> {
    email: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BrevoEmail<'a> {
    sender: &'a Sender,
    to: Vec<BrevoRecipient<'a>>,
    subject: &'a str,
    html_content: &'a str,
    text_content: String,
}

/// Transactional mail through the Brevo HTTP API.
pub struct BrevoMailer {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    sender: Sender,
}

impl BrevoMailer {
    pub fn new(api_key: String, cfg: &EmailConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            api_url: cfg.api_url.clone(),
            api_key,
            sender: parse_sender(&cfg.from),
        })
    }

    async fn send_email(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()> {
        let body = BrevoEmail {
            sender: &self.sender,
            to: vec![BrevoRecipient { email: to }],
            subject,
            html_content: html,
            text_content: strip_tags(html),
        };

        let res = self
            .http
            .post(&self.api_url)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("brevo request")?;

        let status = res.status();
        if !status.is_success() {
            let detail = res
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
                .unwrap_or_else(|| status.to_string());
            anyhow::bail!("email provider rejected message: {detail}");
        }

        info!(%to, %subject, "email accepted by provider");
        Ok(())
    }
}

#[async_trait]
impl EmailSender for BrevoMailer {
    async fn send_verification_code(
        &self,
        to: &str,
        code: &str,
        first_name: Option<&str>,
    ) -> anyhow::Result<()> {
        let html = verification_html(code, first_name);
        self.send_email(to, verification_subject(), &html).await
    }
}

/// Development mailer: writes the code to the log instead of sending it.
pub struct LogMailer;

#[async_trait]
impl EmailSender for LogMailer {
    async fn send_verification_code(
        &self,
        to: &str,
        code: &str,
        _first_name: Option<&str>,
    ) -> anyhow::Result<()> {
        warn!(%to, %code, "no mail provider configured; verification code logged only");
        Ok(())
    }
}
