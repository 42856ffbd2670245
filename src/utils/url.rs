//! Base URL handling for the chat-completion endpoint.

/// Strip trailing slashes so endpoints can be appended without doubling them.
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path with exactly one slash.
///
/// ```
/// use gramfix::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.example.com/v1/", "/chat/completions"),
///     "https://api.example.com/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalize_base_url(base_url), endpoint)
}

/// Check that a user-supplied base URL is an absolute http(s) URL and
/// return its normalized form.
pub fn validate_base_url(base_url: &str) -> Result<String, String> {
    let normalized = normalize_base_url(base_url);
    let rest = normalized
        .strip_prefix("https://")
        .or_else(|| normalized.strip_prefix("http://"))
        .ok_or_else(|| format!("base URL must start with http:// or https://: {base_url}"))?;
    if rest.is_empty() || rest.starts_with('/') {
        return Err(format!("base URL is missing a host: {base_url}"));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_any_number_of_trailing_slashes() {
        assert_eq!(
            normalize_base_url("https://api.example.com/v1///"),
            "https://api.example.com/v1"
        );
        assert_eq!(normalize_base_url(" https://api.example.com "), "https://api.example.com");
        assert_eq!(normalize_base_url("///"), "");
    }

    #[test]
    fn construct_joins_with_single_slash() {
        assert_eq!(
            construct_api_url("https://api.openai.com/v1", "chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            construct_api_url("http://localhost:11434/v1/", "///chat/completions"),
            "http://localhost:11434/v1/chat/completions"
        );
    }

    #[test]
    fn validate_accepts_http_and_https() {
        assert_eq!(
            validate_base_url("http://localhost:8080/v1/").as_deref(),
            Ok("http://localhost:8080/v1")
        );
        assert!(validate_base_url("https://api.openai.com/v1").is_ok());
    }

    #[test]
    fn validate_rejects_missing_scheme_or_host() {
        assert!(validate_base_url("api.openai.com/v1").is_err());
        assert!(validate_base_url("ftp://example.com").is_err());
        assert!(validate_base_url("https://").is_err());
        assert!(validate_base_url("https:///v1").is_err());
    }
}
