use persona_core::CoreError;
use url::Url;

const MIN_USERNAME_CHARS: usize = 3;
const MAX_USERNAME_CHARS: usize = 20;

fn invalid(input: &str, why: &str) -> CoreError {
    CoreError::InvalidInput {
        message: format!("'{}' is not a Reddit profile: {}", input, why),
    }
}

fn validate_username(input: &str, name: &str) -> Result<String, CoreError> {
    let len = name.chars().count();
    if !(MIN_USERNAME_CHARS..=MAX_USERNAME_CHARS).contains(&len) {
        return Err(invalid(
            input,
            &format!(
                "usernames are {} to {} characters long",
                MIN_USERNAME_CHARS, MAX_USERNAME_CHARS
            ),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(invalid(input, "usernames only contain letters, digits, '_' and '-'"));
    }
    Ok(name.to_string())
}

fn username_from_url(input: &str, url: &Url) -> Result<String, CoreError> {
    let host = url.host_str().unwrap_or_default();
    if host != "reddit.com" && !host.ends_with(".reddit.com") {
        return Err(invalid(input, "not a reddit.com address"));
    }

    let mut segments = url
        .path_segments()
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty());
    match (segments.next(), segments.next()) {
        (Some("u" | "user"), Some(name)) => validate_username(input, name),
        _ => Err(invalid(input, "expected a /user/<name> or /u/<name> path")),
    }
}

/// Extracts a username from a profile URL, a `u/name` reference, or a bare
/// username.
pub fn parse_profile_input(input: &str) -> Result<String, CoreError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid(input, "input is empty"));
    }

    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        let url = Url::parse(trimmed).map_err(|e| invalid(input, &e.to_string()))?;
        return username_from_url(input, &url);
    }
    if trimmed.contains("reddit.com") {
        let url = Url::parse(&format!("https://{}", trimmed))
            .map_err(|e| invalid(input, &e.to_string()))?;
        return username_from_url(input, &url);
    }

    let relative = trimmed.trim_start_matches('/');
    let name = relative
        .strip_prefix("u/")
        .or_else(|| relative.strip_prefix("user/"))
        .unwrap_or(relative);
    validate_username(input, name.trim_end_matches('/'))
}
