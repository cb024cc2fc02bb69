use regex::Regex;
use std::sync::LazyLock;

const MAX_LEN: usize = 2048;

static RE_AUTH_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(Authorization:\s*)(.+)").unwrap());
static RE_COOKIE_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)((?:Set-)?Cookie:\s*)(.+)").unwrap());
static RE_SESSION_KV: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"((?:sessionid|session_id|sid)=)[^\s;&]+").unwrap());
static RE_SIGNATURE_KV: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)((?:x-amz-signature|x-amz-credential|x-amz-security-token|signature|token)=)[^\s&]+")
        .unwrap()
});
static RE_URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(https?://[^\s]+)").unwrap());

/// Scrub text that may end up in logs or user-facing errors.
/// Signed upload URLs carry their credentials in the query string, so queries are dropped.
pub fn redact(text: &str) -> String {
    let mut out = RE_AUTH_HEADER
        .replace_all(text, "${1}<redacted>")
        .to_string();
    out = RE_COOKIE_HEADER
        .replace_all(&out, "${1}<redacted>")
        .to_string();
    out = RE_SESSION_KV
        .replace_all(&out, "${1}<redacted>")
        .to_string();
    out = RE_SIGNATURE_KV
        .replace_all(&out, "${1}<redacted>")
        .to_string();
    out = strip_url_queries(&out);

    if out.len() > MAX_LEN {
        let mut cut = MAX_LEN;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
        out.push_str("...<truncated>");
    }
    out
}

fn strip_url_queries(text: &str) -> String {
    RE_URL
        .replace_all(text, |caps: &regex::Captures| {
            let url = &caps[0];
            match url.find(['?', '#']) {
                Some(idx) => url[..idx].to_string(),
                None => url.to_string(),
            }
        })
        .to_string()
}

/// First `max` characters of a response body, for error messages.
pub fn snippet(body: &str, max: usize) -> String {
    body.chars().take(max).collect()
}
