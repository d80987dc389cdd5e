use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use anyhow::anyhow;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 12;
const SEAL_LABEL: &[u8] = b"elife/pending-registration/seal";
const CODE_LABEL: &[u8] = b"elife/pending-registration/code";

fn mac(key: &[u8]) -> anyhow::Result<HmacSha256> {
    <HmacSha256 as Mac>::new_from_slice(key).map_err(|e| anyhow!("hmac key: {e}"))
}

/// Per-purpose subkey of the signing secret.
fn derive(secret: &[u8], label: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut m = mac(secret)?;
    m.update(label);
    Ok(m.finalize().into_bytes().to_vec())
}

/// AES-256-GCM encrypts `plaintext`; output is base64 of `nonce || ciphertext`.
pub fn seal(secret: &[u8], plaintext: &[u8]) -> anyhow::Result<String> {
    let key = derive(secret, SEAL_LABEL)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| anyhow!("seal failed: {e}"))?;

    let mut combined = nonce.to_vec();
    combined.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(&combined))
}

pub fn open(secret: &[u8], sealed: &str) -> anyhow::Result<Vec<u8>> {
    let combined = BASE64
        .decode(sealed)
        .map_err(|e| anyhow!("sealed payload encoding: {e}"))?;
    if combined.len() <= NONCE_LEN {
        return Err(anyhow!("sealed payload too short"));
    }
    let (nonce, ciphertext) = combined.split_at(NONCE_LEN);

    let key = derive(secret, SEAL_LABEL)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| anyhow!("open failed: {e}"))
}

/// Keyed digest of a verification code.
pub fn code_tag(secret: &[u8], code: &str) -> anyhow::Result<String> {
    let mut m = mac(&derive(secret, CODE_LABEL)?)?;
    m.update(code.as_bytes());
    Ok(BASE64.encode(m.finalize().into_bytes()))
}

/// Constant-time check of `code` against a tag from [`code_tag`].
pub fn code_matches(secret: &[u8], code: &str, tag: &str) -> anyhow::Result<bool> {
    let Ok(expected) = BASE64.decode(tag) else {
        return Ok(false);
    };
    let mut m = mac(&derive(secret, CODE_LABEL)?)?;
    m.update(code.as_bytes());
    Ok(m.verify_slice(&expected).is_ok())
}
