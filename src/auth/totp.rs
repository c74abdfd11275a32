//! RFC 6238 time-based one-time passwords: HMAC-SHA1, 30 second step, 6 digits.

use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;
use url::Url;

type HmacSha1 = Hmac<Sha1>;

pub const DIGITS: u32 = 6;
pub const STEP_SECONDS: i64 = 30;
/// Steps accepted on either side of the current one
pub const SKEW_STEPS: i64 = 1;

const SECRET_BYTES: usize = 20;

/// Fresh 160-bit secret, base32 without padding.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE32_NOPAD.encode(&bytes)
}

/// Accepts the secret the way authenticator apps display it: any case, spaces, padding.
fn decode_secret(secret: &str) -> Option<Vec<u8>> {
    let normalized: String = secret
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    BASE32_NOPAD.decode(normalized.as_bytes()).ok()
}

/// RFC 4226 HOTP value for `counter`.
pub fn hotp(key: &[u8], counter: u64) -> Option<u32> {
    let mut mac = HmacSha1::new_from_slice(key).ok()?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);

    Some(binary % 10u32.pow(DIGITS))
}

/// Code for the step containing `unix_time`, zero padded.
pub fn code_at(secret: &str, unix_time: i64) -> Option<String> {
    let key = decode_secret(secret)?;
    let counter = u64::try_from(unix_time.div_euclid(STEP_SECONDS)).ok()?;
    hotp(&key, counter).map(|v| format!("{:0width$}", v, width = DIGITS as usize))
}

/// True when `code` matches the current step or one of its neighbours.
pub fn verify(secret: &str, code: &str, unix_time: i64) -> bool {
    let code = code.trim();
    if code.len() != DIGITS as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let Some(key) = decode_secret(secret) else {
        tracing::warn!("Stored TOTP secret is not valid base32");
        return false;
    };

    let current = unix_time.div_euclid(STEP_SECONDS);
    (-SKEW_STEPS..=SKEW_STEPS)
        .filter_map(|skew| u64::try_from(current + skew).ok())
        .filter_map(|counter| hotp(&key, counter))
        .any(|v| format!("{:0width$}", v, width = DIGITS as usize) == code)
}

/// `otpauth://` URI an authenticator app can enroll from.
pub fn provisioning_uri(secret: &str, account: &str, issuer: &str) -> String {
    let label = format!("{}:{}", issuer, account);
    let mut uri = match Url::parse("otpauth://totp/") {
        Ok(u) => u,
        Err(_) => return format!("otpauth://totp/{}?secret={}", label, secret),
    };

    uri.set_path(&format!("/{}", label));
    uri.query_pairs_mut()
        .append_pair("secret", secret)
        .append_pair("issuer", issuer)
        .append_pair("algorithm", "SHA1")
        .append_pair("digits", &DIGITS.to_string())
        .append_pair("period", &STEP_SECONDS.to_string());

    uri.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    // base32 of the ASCII key "12345678901234567890"
    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    #[test]
    fn matches_rfc6238_sha1_vectors() {
        assert_eq!(code_at(RFC_SECRET, 59).as_deref(), Some("287082"));
        assert_eq!(code_at(RFC_SECRET, 1_111_111_109).as_deref(), Some("081804"));
        assert_eq!(code_at(RFC_SECRET, 1_234_567_890).as_deref(), Some("005924"));
        assert_eq!(code_at(RFC_SECRET, 2_000_000_000).as_deref(), Some("279037"));
    }

    #[test]
    fn accepts_one_step_of_skew() {
        let t = 1_234_567_890;
        let code = code_at(RFC_SECRET, t).unwrap();

        assert!(verify(RFC_SECRET, &code, t));
        assert!(verify(RFC_SECRET, &code, t + STEP_SECONDS));
        assert!(verify(RFC_SECRET, &code, t - STEP_SECONDS));
        assert!(!verify(RFC_SECRET, &code, t + 3 * STEP_SECONDS));
    }

    #[test]
    fn rejects_malformed_codes() {
        let t = 59;
        assert!(!verify(RFC_SECRET, "", t));
        assert!(!verify(RFC_SECRET, "28708", t));
        assert!(!verify(RFC_SECRET, "2870822", t));
        assert!(!verify(RFC_SECRET, "28708a", t));
        assert!(!verify("not base32!", "287082", t));
    }

    #[test]
    fn secret_is_lenient_about_formatting() {
        assert!(verify("gezd gnbv gy3t qojq gezd gnbv gy3t qojq", "287082", 59));
    }

    #[test]
    fn generated_secret_decodes_to_twenty_bytes() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 32);
        assert_eq!(decode_secret(&secret).map(|k| k.len()), Some(SECRET_BYTES));
        assert_ne!(secret, generate_secret());
    }

    #[test]
    fn provisioning_uri_carries_secret_and_issuer() {
        let uri = provisioning_uri("ABCDEF", "jdoe", "Acme");
        assert!(uri.starts_with("otpauth://totp/Acme:jdoe?secret=ABCDEF"));
        assert!(uri.contains("issuer=Acme"));
        assert!(uri.contains("digits=6"));
        assert!(uri.contains("period=30"));
    }
}
