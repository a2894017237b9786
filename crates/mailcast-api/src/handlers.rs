//! API request handlers

pub mod brands;
pub mod campaigns;
pub mod contacts;
pub mod emails;
pub mod groups;
pub mod health;
pub mod metrics;
pub mod senders;
pub mod templates;
pub mod tracking;
pub mod webhooks;

use serde::Deserialize;
use utoipa::IntoParams;

/// Limit/offset query parameters
#[derive(Debug, Clone, Copy, Deserialize, IntoParams)]
pub struct Pagination {
    /// Page size, 1 to 200
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// Rows to skip
    #[serde(default)]
    pub offset: i64,
}

impl Pagination {
    pub fn limit(&self) -> i64 {
        self.limit.clamp(1, 200)
    }

    pub fn offset(&self) -> i64 {
        self.offset.max(0)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
        }
    }
}

fn default_limit() -> i64 {
    50
}

/// Minimal `local@domain` shape check
pub(crate) fn is_email_like(email: &str) -> bool {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_shape() {
        assert!(is_email_like("bob@example.com"));
        assert!(!is_email_like("bob@localhost"));
        assert!(!is_email_like("@example.com"));
        assert!(!is_email_like("bob example@example.com"));
    }

    #[test]
    fn test_pagination_clamps() {
        let page = Pagination {
            limit: 10_000,
            offset: -3,
        };
        assert_eq!(page.limit(), 200);
        assert_eq!(page.offset(), 0);
    }
}
