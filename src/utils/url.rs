//! URL utilities for consistent URL handling
//!
//! Provider base URLs are stored the way the settings layer normalized them
//! and joined with endpoint paths here, so endpoints never end up with
//! doubled slashes.

/// Normalize a user-entered provider API URL.
///
/// - A trailing `#` means "use exactly what I typed": the `#` is removed and
///   nothing else is touched.
/// - A trailing `/` means "do not force a version suffix": the URL is kept
///   as-is.
/// - Otherwise everything after the first `/v1` is dropped.
///
/// # Examples
///
/// ```
/// use parley::utils::url::normalize_api_url;
///
/// assert_eq!(normalize_api_url("https://api.example.com/v1/chat"), "https://api.example.com/v1");
/// assert_eq!(normalize_api_url("https://proxy.example.com/openai/"), "https://proxy.example.com/openai/");
/// assert_eq!(normalize_api_url("https://api.example.com/v1/chat#"), "https://api.example.com/v1/chat");
/// ```
pub fn normalize_api_url(api_url: &str) -> String {
    let api_url = api_url.trim();
    if api_url.is_empty() {
        return String::new();
    }

    if let Some(literal) = api_url.strip_suffix('#') {
        return literal.to_string();
    }

    if api_url.ends_with('/') {
        return api_url.to_string();
    }

    match api_url.find("/v1") {
        Some(index) => api_url[..index + 3].to_string(),
        None => api_url.to_string(),
    }
}

/// Normalize a base URL by removing trailing slashes
///
/// # Examples
///
/// ```
/// use parley::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://api.example.com/v1"), "https://api.example.com/v1");
/// assert_eq!(normalize_base_url("https://api.example.com/v1///"), "https://api.example.com/v1");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Construct a complete API endpoint URL from a base URL and endpoint path
///
/// # Examples
///
/// ```
/// use parley::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.example.com/v1/", "/chat/completions"),
///     "https://api.example.com/v1/chat/completions"
/// );
/// assert_eq!(
///     construct_api_url("http://localhost:11434", "api/tags"),
///     "http://localhost:11434/api/tags"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_api_url_truncates_after_v1() {
        assert_eq!(
            normalize_api_url("https://api.openai.com/v1/chat/completions"),
            "https://api.openai.com/v1"
        );
        assert_eq!(
            normalize_api_url("https://api.openai.com/v1"),
            "https://api.openai.com/v1"
        );
        assert_eq!(
            normalize_api_url("https://api.groq.com/openai/v1/models"),
            "https://api.groq.com/openai/v1"
        );
    }

    #[test]
    fn test_normalize_api_url_hash_is_literal() {
        assert_eq!(
            normalize_api_url("https://gateway.example.com/v1/custom/path#"),
            "https://gateway.example.com/v1/custom/path"
        );
        assert_eq!(
            normalize_api_url("https://gateway.example.com/api#"),
            "https://gateway.example.com/api"
        );
    }

    #[test]
    fn test_normalize_api_url_trailing_slash_kept() {
        assert_eq!(
            normalize_api_url("https://gateway.example.com/v1/extra/"),
            "https://gateway.example.com/v1/extra/"
        );
        assert_eq!(
            normalize_api_url("http://localhost:11434/"),
            "http://localhost:11434/"
        );
    }

    #[test]
    fn test_normalize_api_url_without_version() {
        assert_eq!(
            normalize_api_url("http://localhost:11434"),
            "http://localhost:11434"
        );
        assert_eq!(normalize_api_url("   "), "");
        assert_eq!(normalize_api_url(""), "");
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("https://api.example.com/v1/"),
            "https://api.example.com/v1"
        );
        assert_eq!(
            normalize_base_url("https://api.example.com/"),
            "https://api.example.com"
        );
        assert_eq!(normalize_base_url("///"), "");
    }

    #[test]
    fn test_construct_api_url() {
        assert_eq!(
            construct_api_url("https://api.example.com/v1", "chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            construct_api_url("https://api.example.com/v1///", "///models"),
            "https://api.example.com/v1/models"
        );

        // A kept trailing slash from normalization must not double up.
        assert_eq!(
            construct_api_url("https://gateway.example.com/openai/", "chat/completions"),
            "https://gateway.example.com/openai/chat/completions"
        );
    }
}
