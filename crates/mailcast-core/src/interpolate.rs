//! Variable interpolation for `{{key}}` placeholders

use mailcast_storage::models::{Brand, Recipient};
use std::collections::HashMap;

/// A substitution scope
pub type Variables = HashMap<String, String>;

/// Replace every `{{key}}` whose key is defined in `variables`.
///
/// Keys match exactly (no trimming, no nesting). Unknown placeholders are
/// left verbatim. The input is scanned once, so substituted values are never
/// re-examined.
pub fn interpolate(content: &str, variables: &Variables) -> String {
    if variables.is_empty() || !content.contains("{{") {
        return content.to_string();
    }

    let mut out = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };

        match variables.get(&after[..end]) {
            Some(value) => {
                out.push_str(value);
                rest = &after[end + 2..];
            }
            None => {
                out.push('{');
                rest = &rest[start + 1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Apply scopes in order, one single pass per scope
pub fn interpolate_scopes(content: &str, scopes: &[&Variables]) -> String {
    scopes
        .iter()
        .fold(content.to_string(), |acc, scope| interpolate(&acc, scope))
}

/// Brand-level variables, including the legacy `company*` aliases.
///
/// No brand yields an empty scope.
pub fn brand_variables(brand: Option<&Brand>) -> Variables {
    let Some(brand) = brand else {
        return Variables::new();
    };

    let logo = brand.logo_url.clone().unwrap_or_default();
    let website = brand.website.clone().unwrap_or_default();

    [
        ("brand_name", brand.name.clone()),
        ("brand_logo", logo.clone()),
        ("brand_website", website.clone()),
        ("company", brand.name.clone()),
        ("company_name", brand.name.clone()),
        ("company_logo", logo),
        ("company_website", website),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Link a recipient follows to unsubscribe, if they have a token
pub fn unsubscribe_url(client_base_url: &str, token: &str) -> Option<String> {
    if token.is_empty() {
        return None;
    }
    Some(format!(
        "{}/unsubscribe?token={}",
        client_base_url.trim_end_matches('/'),
        token
    ))
}

/// Recipient-level variables
pub fn recipient_variables(recipient: &Recipient, client_base_url: &str) -> Variables {
    let mut vars = Variables::new();
    vars.insert(
        "name".to_string(),
        recipient.name.clone().unwrap_or_default(),
    );
    vars.insert("email".to_string(), recipient.email.clone());
    vars.insert(
        "unsubscribe_url".to_string(),
        unsubscribe_url(client_base_url, &recipient.unsubscribe_token).unwrap_or_default(),
    );
    vars
}

/// Subject and bodies of one message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageContent {
    pub subject: String,
    pub html: Option<String>,
    pub text: Option<String>,
}

impl MessageContent {
    /// Apply one scope to subject, HTML and text
    pub fn interpolate(&self, variables: &Variables) -> Self {
        Self {
            subject: interpolate(&self.subject, variables),
            html: self.html.as_deref().map(|h| interpolate(h, variables)),
            text: self.text.as_deref().map(|t| interpolate(t, variables)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn vars(pairs: &[(&str, &str)]) -> Variables {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn acme() -> Brand {
        Brand {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            name: "Acme".to_string(),
            logo_url: Some("https://acme.test/logo.png".to_string()),
            website: None,
            is_default: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn bob() -> Recipient {
        Recipient {
            email: "bob@example.com".to_string(),
            name: Some("Bob".to_string()),
            unsubscribe_token: "tok123".to_string(),
        }
    }

    #[test]
    fn test_replaces_known_keys() {
        let v = vars(&[("name", "Bob"), ("email", "bob@example.com")]);
        assert_eq!(
            interpolate("Hi {{name}} <{{email}}>, {{name}}!", &v),
            "Hi Bob <bob@example.com>, Bob!"
        );
    }

    #[test]
    fn test_unknown_and_unbalanced_placeholders_left_verbatim() {
        let v = vars(&[("name", "Bob")]);
        assert_eq!(interpolate("{{other}} {{name}}", &v), "{{other}} Bob");
        assert_eq!(interpolate("{{ name }}", &v), "{{ name }}");
        assert_eq!(interpolate("{{{name}}", &v), "{Bob");
        assert_eq!(interpolate("tail {{name", &v), "tail {{name");
    }

    #[test]
    fn test_single_pass_does_not_rescan_values() {
        let v = vars(&[("a", "{{b}}"), ("b", "x")]);
        assert_eq!(interpolate("{{a}}", &v), "{{b}}");
    }

    #[test]
    fn test_interpolation_is_idempotent() {
        let v = vars(&[("name", "Bob"), ("company", "Acme")]);
        let once = interpolate("Hello {{name}} from {{company}}", &v);
        assert_eq!(interpolate(&once, &v), once);
    }

    #[test]
    fn test_empty_scope_is_noop() {
        let content = "Hello {{name}}";
        assert_eq!(interpolate(content, &Variables::new()), content);
        assert!(brand_variables(None).is_empty());
    }

    #[test]
    fn test_brand_then_recipient_scenario() {
        let brand = brand_variables(Some(&acme()));
        let recipient = recipient_variables(&bob(), "https://app.test");

        let body = interpolate_scopes(
            "Hello {{name}}, welcome to {{company}}",
            &[&brand, &recipient],
        );
        assert_eq!(body, "Hello Bob, welcome to Acme");
    }

    #[test]
    fn test_brand_pass_does_not_feed_recipient_pass_into_itself() {
        let mut brand = acme();
        brand.name = "{{name}}".to_string();
        let brand_vars = brand_variables(Some(&brand));

        // The brand stage inserts "{{name}}"; only the later recipient
        // stage may resolve it.
        let after_brand = interpolate("{{company}}", &brand_vars);
        assert_eq!(after_brand, "{{name}}");
    }

    #[test]
    fn test_missing_brand_fields_become_empty() {
        let v = brand_variables(Some(&acme()));
        assert_eq!(
            interpolate("[{{brand_website}}] {{company_logo}}", &v),
            "[] https://acme.test/logo.png"
        );
    }

    #[test]
    fn test_recipient_variables() {
        let mut recipient = bob();
        recipient.name = None;
        let v = recipient_variables(&recipient, "https://app.test/");

        assert_eq!(v["name"], "");
        assert_eq!(v["unsubscribe_url"], "https://app.test/unsubscribe?token=tok123");
    }

    #[test]
    fn test_message_content_interpolates_all_parts() {
        let content = MessageContent {
            subject: "For {{name}}".to_string(),
            html: Some("<p>{{name}}</p>".to_string()),
            text: None,
        };
        let rendered = content.interpolate(&vars(&[("name", "Ann")]));
        assert_eq!(rendered.subject, "For Ann");
        assert_eq!(rendered.html.as_deref(), Some("<p>Ann</p>"));
        assert_eq!(rendered.text, None);
    }
}
