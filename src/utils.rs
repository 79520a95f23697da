use std::time::Duration;
use url::Url;

pub fn sanitize_filename(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '#' | '&' | '=' => '_',
            c if c.is_control() || c.is_whitespace() => '_',
            c => c,
        })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

/// Builds a screenshot file name from the link it was taken of.
pub fn screenshot_file_name(target_url: &str) -> String {
    const MAX_STEM: usize = 64;

    let stem = Url::parse(target_url)
        .map(|u| format!("{}{}", u.host_str().unwrap_or_default(), u.path()))
        .unwrap_or_else(|_| target_url.to_string());
    let mut stem = sanitize_filename(&stem);
    if let Some((cut, _)) = stem.char_indices().nth(MAX_STEM) {
        stem.truncate(cut);
    }

    let id = uuid::Uuid::new_v4().simple().to_string();
    if stem.is_empty() {
        format!("{id}.png")
    } else {
        format!("{stem}-{id}.png")
    }
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    let millis = duration.subsec_millis();

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else if seconds > 0 {
        format!("{}.{}s", seconds, millis / 100)
    } else {
        format!("{millis}ms")
    }
}

/// Parses `url`, accepting only http and https.
pub fn validate_url(url: &str) -> Result<Url, String> {
    let parsed = Url::parse(url).map_err(|e| e.to_string())?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(format!("unsupported scheme {scheme}")),
    }
}

/// The form link targets are compared in: parsed, fragment removed.
pub fn normalize_url(url: &str) -> Result<String, String> {
    let mut parsed = validate_url(url)?;
    parsed.set_fragment(None);
    Ok(parsed.to_string())
}
