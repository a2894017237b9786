//! Open/click tracking: signed tokens and HTML rewriting

mod recorder;

pub use recorder::TrackingRecorder;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use mailcast_common::types::EmailId;
use regex::Regex;
use sha2::Sha256;
use std::sync::OnceLock;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Bytes of the HMAC kept in a token
const SIGNATURE_LEN: usize = 16;

/// Tracking errors
#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("Malformed tracking token")]
    Malformed,

    #[error("Tracking token signature mismatch")]
    InvalidSignature,

    #[error("Email not found: {0}")]
    EmailNotFound(EmailId),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Issues and verifies tracking tokens.
///
/// A token is `base64url(email id) "." base64url(truncated HMAC-SHA256)`,
/// so it decodes back to the email it was issued for without a lookup table.
#[derive(Clone)]
pub struct TrackingSigner {
    secret: Vec<u8>,
}

impl TrackingSigner {
    /// Create a signer from the configured secret
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self, payload: &[u8]) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length");
        mac.update(payload);
        mac
    }

    /// Token for an email
    pub fn token(&self, email_id: EmailId) -> String {
        let payload = email_id.as_bytes();
        let signature = self.mac(payload).finalize().into_bytes();

        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(payload),
            URL_SAFE_NO_PAD.encode(&signature[..SIGNATURE_LEN])
        )
    }

    /// Recover the email id from a token, rejecting tampered tokens
    pub fn decode(&self, token: &str) -> Result<EmailId, TrackingError> {
        let (payload, signature) = token.split_once('.').ok_or(TrackingError::Malformed)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TrackingError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TrackingError::Malformed)?;

        if signature.len() != SIGNATURE_LEN {
            return Err(TrackingError::Malformed);
        }

        self.mac(&payload)
            .verify_truncated_left(&signature)
            .map_err(|_| TrackingError::InvalidSignature)?;

        Uuid::from_slice(&payload).map_err(|_| TrackingError::Malformed)
    }
}

/// URL of the open-tracking pixel
pub fn open_url(api_base_url: &str, token: &str) -> String {
    format!("{}/track/open/{}", api_base_url.trim_end_matches('/'), token)
}

/// URL of the click redirect for `original`
pub fn click_url(api_base_url: &str, token: &str, original: &str) -> Option<String> {
    let base = format!("{}/track/click/{}", api_base_url.trim_end_matches('/'), token);
    Url::parse_with_params(&base, &[("url", original)])
        .ok()
        .map(String::from)
}

/// Validate a click target; only absolute http(s) URLs are followed
pub fn redirect_target(url: &str) -> Option<Url> {
    Url::parse(url.trim())
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
}

fn link_regex() -> &'static Regex {
    static LINK: OnceLock<Regex> = OnceLock::new();
    LINK.get_or_init(|| {
        Regex::new(r#"(?i)(<a\b[^>]*?\bhref\s*=\s*)(?:"([^"]*)"|'([^']*)')"#)
            .expect("valid link pattern")
    })
}

fn is_trackable(href: &str) -> bool {
    let href = href.trim();
    let lower = href.to_ascii_lowercase();
    !(href.is_empty()
        || href.starts_with('#')
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:"))
}

/// Route every trackable `<a href>` through the click redirect
pub fn rewrite_links(html: &str, api_base_url: &str, token: &str) -> String {
    link_regex()
        .replace_all(html, |caps: &regex::Captures<'_>| {
            let prefix = &caps[1];
            let (href, quote) = match (caps.get(2), caps.get(3)) {
                (Some(m), _) => (m.as_str(), '"'),
                (None, Some(m)) => (m.as_str(), '\''),
                (None, None) => return caps[0].to_string(),
            };

            // Attribute text: `&amp;` in the markup is `&` in the link
            let href = html_escape::decode_html_entities(href);
            if !is_trackable(&href) {
                return caps[0].to_string();
            }

            match click_url(api_base_url, token, &href) {
                Some(url) => format!("{prefix}{quote}{url}{quote}"),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Append the 1x1 open pixel, before `</body>` when there is one
pub fn append_pixel(html: &str, api_base_url: &str, token: &str) -> String {
    let pixel = format!(
        r#"<img src="{}" width="1" height="1" alt="" style="display:none;border:0" />"#,
        open_url(api_base_url, token)
    );

    match html.to_ascii_lowercase().rfind("</body>") {
        Some(pos) => format!("{}{}{}", &html[..pos], pixel, &html[pos..]),
        None => format!("{html}{pixel}"),
    }
}

/// Rewrite links and add the open pixel
pub fn inject_tracking(html: &str, api_base_url: &str, token: &str) -> String {
    append_pixel(&rewrite_links(html, api_base_url, token), api_base_url, token)
}
