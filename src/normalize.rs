//! Content normalization for change detection.
//!
//! Pages routinely embed per-request tokens (CSRF fields, CSP nonces,
//! session blobs) that would make every check look like a content change.
//! Normalization strips those before hashing so a hash only moves when
//! meaningful content does.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

/// Patterns for dynamic content that should be ignored when computing
/// content hashes. These change on every page load but don't represent
/// meaningful content changes.
static DYNAMIC_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // CSRF tokens (Laravel, Rails, Django, etc.)
        r#"csrf[_-]?token["']?\s*[:=]\s*["'][^"']{20,}["']"#,
        r#"name=["']_token["']\s+(?:value|content)=["'][^"']+["']"#,
        r#"(?:content|value)=["'][^"']+["']\s+name=["']_token["']"#,
        r#"name=["']csrf[_-]?token["']\s+(?:content|value)=["'][^"']+["']"#,
        r#"(?:content|value)=["'][^"']+["']\s+name=["']csrf[_-]?token["']"#,
        // Nonces (CSP, WordPress, etc.)
        r#"nonce=["'][^"']+["']"#,
        // Inline data-page JSON with csrf_token field (Inertia.js / Laravel)
        r#""csrf_token"\s*:\s*"[^"]+""#,
        // HTML-encoded variants (e.g. in data-page attributes)
        r#"(?:&quot;|&#34;)csrf_token(?:&quot;|&#34;)\s*:\s*(?:&quot;|&#34;)[^&]+(?:&quot;|&#34;)"#,
        r#"(?:&quot;|&#34;)_token(?:&quot;|&#34;)\s*:\s*(?:&quot;|&#34;)[^&]+(?:&quot;|&#34;)"#,
        // Cloudflare Rocket Loader tokens (random hex prefix on script type)
        r#"type="[a-f0-9]{20,}-text/javascript""#,
        r#"data-cf-settings="[a-f0-9]{20,}-\|"#,
        // Cloudflare beacon tokens
        r#""r":\d+"#,
        // Joomla CSRF tokens
        r#""csrf\.token"\s*:\s*"[a-f0-9]+""#,
        r#"var\s+mtoken\s*=\s*"[a-f0-9]+""#,
        // Dynamic module/component IDs (hex suffixed, e.g. mod_listings6997d393167fa)
        r#"(mod_\w+)[a-f0-9]{10,}"#,
        // Hidden form tokens
        r#"name=["']_token["']\s+value=["'][^"']+["']"#,
        r#"value=["'][^"']+["']\s+name=["']_token["']"#,
        // Encrypted/base64 form values (honeypot fields, encrypted timestamps)
        r#"value=["']eyJ[A-Za-z0-9+/=]{50,}["']"#,
        // Livewire snapshot data
        r#"wire:snapshot=["'][^"']+["']"#,
        r#"wire:effects=["'][^"']+["']"#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid builtin pattern"))
    .collect()
});

/// An ordered list of redaction rules applied to content before hashing.
///
/// The rule list is data, not code: callers can swap in their own list
/// (tests do) without touching any checker logic.
#[derive(Debug, Clone)]
pub struct NormalizeRules {
    rules: Vec<Regex>,
}

impl NormalizeRules {
    pub fn new(rules: Vec<Regex>) -> Self {
        Self { rules }
    }

    /// The builtin web rule set (CSRF tokens, nonces, session blobs).
    pub fn web_defaults() -> Self {
        Self::new(DYNAMIC_PATTERNS.clone())
    }

    /// Apply every rule in order, replacing matches with the empty string.
    pub fn apply(&self, content: &str) -> String {
        let mut result = content.to_string();
        for rule in &self.rules {
            result = rule.replace_all(&result, "").into_owned();
        }
        result
    }

    /// Normalize then hash.
    pub fn hash(&self, content: &str) -> String {
        hash_content(&self.apply(content))
    }
}

impl Default for NormalizeRules {
    fn default() -> Self {
        Self::web_defaults()
    }
}

/// SHA-256 hex digest of a string.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_is_deterministic() {
        let rules = NormalizeRules::default();
        let content = "<html><body>hello</body></html>";
        assert_eq!(rules.hash(content), rules.hash(content));
        assert_eq!(hash_content("abc"), hash_content("abc"));
        assert_ne!(hash_content("abc"), hash_content("abd"));
    }

    #[test]
    fn strips_csrf_token_meta() {
        let rules = NormalizeRules::default();
        let a = r#"<meta name="csrf-token" content="aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"><p>body</p>"#;
        let b = r#"<meta name="csrf-token" content="bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"><p>body</p>"#;
        assert_eq!(rules.hash(a), rules.hash(b));
    }

    #[test]
    fn strips_nonce_attributes() {
        let rules = NormalizeRules::default();
        let a = r#"<script nonce="r4nd0m1">var x = 1;</script>"#;
        let b = r#"<script nonce="0th3rrr">var x = 1;</script>"#;
        assert_eq!(rules.hash(a), rules.hash(b));
    }

    #[test]
    fn meaningful_change_still_detected() {
        let rules = NormalizeRules::default();
        let a = r#"<meta name="csrf-token" content="aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"><p>old</p>"#;
        let b = r#"<meta name="csrf-token" content="aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"><p>new</p>"#;
        assert_ne!(rules.hash(a), rules.hash(b));
    }

    #[test]
    fn rules_are_replaceable() {
        let rules = NormalizeRules::new(vec![Regex::new(r"\d+").unwrap()]);
        assert_eq!(rules.apply("build 123 ok"), "build  ok");
        // The builtin list leaves digits alone
        assert_eq!(NormalizeRules::default().apply("build 123 ok"), "build 123 ok");
    }

    #[test]
    fn rules_apply_in_order() {
        let rules = NormalizeRules::new(vec![
            Regex::new("ab").unwrap(),
            Regex::new("cd").unwrap(),
        ]);
        // first rule removes "ab", joining "c" and "d" into a fresh "cd"
        assert_eq!(rules.apply("cabd"), "");
    }
}
