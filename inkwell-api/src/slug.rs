//! URL slugs for categories, pages and posts.

use once_cell::sync::Lazy;
use regex::Regex;

static NON_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("Invalid slug regex"));

/// Lowercase, with every run of non-alphanumerics collapsed to one `-`.
pub fn slugify(text: &str) -> String {
    NON_WORD
        .replace_all(&text.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

/// The caller's slug if it has one, otherwise one derived from `name`.
/// Either way the result is normalized; `None` when both are blank.
pub fn slug_if_missing(name: Option<&str>, slug: Option<&str>) -> Option<String> {
    let explicit = slug.map(slugify).filter(|s| !s.is_empty());
    explicit
        .or_else(|| name.map(slugify))
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Rust & Tokio  "), "rust-tokio");
        assert_eq!(slugify("Crème brûlée"), "crème-brûlée");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn test_slug_if_missing() {
        assert_eq!(slug_if_missing(Some("My Post"), None), Some("my-post".to_string()));
        assert_eq!(slug_if_missing(Some("My Post"), Some("custom")), Some("custom".to_string()));
        assert_eq!(slug_if_missing(Some("My Post"), Some("  ")), Some("my-post".to_string()));
        assert_eq!(slug_if_missing(None, None), None);
    }
}
