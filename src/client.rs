use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Response, StatusCode};

use crate::error::{PipelineError, Result};
use crate::redact::{redact, snippet};

const BODY_SNIPPET_LEN: usize = 200;

/// Thin wrapper over one `reqwest::Client` bound to the generation API host.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = base_url.trim_end_matches('/').to_string();
        if base.is_empty() {
            return Err(PipelineError::Config("API base URL must not be empty".into()));
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Absolute URL for an API path such as `/video-gen`.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub(crate) fn common_headers(&self) -> HeaderMap {
        let pairs: [(&str, &str); 4] = [
            ("Accept", "application/json, text/plain, */*"),
            ("sec-ch-ua-platform", r#""Windows""#),
            (
                "sec-ch-ua",
                r#""Google Chrome";v="143", "Chromium";v="143", "Not A(Brand";v="24""#,
            ),
            ("sec-ch-ua-mobile", "?0"),
        ];

        let mut headers = HeaderMap::new();
        for (k, v) in pairs {
            if let (Ok(name), Ok(val)) = (
                HeaderName::from_bytes(k.as_bytes()),
                HeaderValue::from_str(v),
            ) {
                headers.insert(name, val);
            }
        }
        headers
    }

    /// GET an API path and return the body as text.
    pub async fn get_text(&self, path: &str, query: &[(&str, &str)]) -> std::result::Result<String, String> {
        let resp = self
            .http
            .get(self.url(path))
            .headers(self.common_headers())
            .query(query)
            .send()
            .await
            .map_err(|e| redact(&format!("HTTP request failed: {}", e)))?;
        read_success_text(resp).await
    }

    /// GET an API path and parse the body as JSON.
    pub async fn get_json(&self, path: &str) -> std::result::Result<serde_json::Value, String> {
        let resp = self
            .http
            .get(self.url(path))
            .headers(self.common_headers())
            .send()
            .await
            .map_err(|e| redact(&format!("HTTP request failed: {}", e)))?;
        let text = read_success_text(resp).await?;
        parse_json(&text)
    }

    /// POST a JSON body to an API path and parse the JSON reply.
    pub async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> std::result::Result<serde_json::Value, String> {
        let resp = self
            .http
            .post(self.url(path))
            .headers(self.common_headers())
            .json(body)
            .send()
            .await
            .map_err(|e| redact(&format!("HTTP request failed: {}", e)))?;
        let text = read_success_text(resp).await?;
        parse_json(&text)
    }
}

/// Body text of a 2xx response, or an `HTTP <status>: <body>` message otherwise.
pub(crate) async fn read_success_text(resp: Response) -> std::result::Result<String, String> {
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| format!("Failed to read response body: {}", e))?;

    if !status.is_success() {
        return Err(status_message(status, &text));
    }
    Ok(text)
}

pub(crate) fn status_message(status: StatusCode, body: &str) -> String {
    let body = snippet(body.trim(), BODY_SNIPPET_LEN);
    if body.is_empty() {
        format!("HTTP {}", status)
    } else {
        redact(&format!("HTTP {}: {}", status, body))
    }
}

fn parse_json(text: &str) -> std::result::Result<serde_json::Value, String> {
    serde_json::from_str(text).map_err(|e| {
        format!(
            "Failed to parse JSON response: {} (body: {})",
            e,
            snippet(text, BODY_SNIPPET_LEN)
        )
    })
}
