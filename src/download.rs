use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, Url};
use serde::Serialize;
use std::sync::LazyLock;

use crate::client::{status_message, ApiClient};
use crate::error::{PipelineError, Result};
use crate::fingerprint::compute_fingerprint;
use crate::ids;
use crate::redact::redact;

const PROXY_PATH: &str = "/download-proxy";
const DEFAULT_EXTENSION: &str = "png";

static RE_MEDIA_EXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(jpe?g|png|webp|mp4|webm)").unwrap());

// ---------------------------------------------------------------------------
// Extension inference
// ---------------------------------------------------------------------------

/// Declared content type wins; otherwise the first media extension in the URL; otherwise `png`.
pub fn infer_extension(url: &str, content_type: Option<&str>) -> String {
    if let Some(ct) = content_type {
        let ct = ct.to_ascii_lowercase();
        let by_type = [
            ("jpeg", "jpg"),
            ("jpg", "jpg"),
            ("png", "png"),
            ("webp", "webp"),
            ("mp4", "mp4"),
            ("webm", "webm"),
        ];
        if let Some((_, ext)) = by_type.iter().find(|(needle, _)| ct.contains(needle)) {
            return ext.to_string();
        }
    }

    RE_MEDIA_EXT
        .captures(url)
        .map(|caps| {
            let ext = caps[1].to_ascii_lowercase();
            if ext == "jpeg" {
                "jpg".to_string()
            } else {
                ext
            }
        })
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FetchedAsset {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, client: &ApiClient, url: &str) -> std::result::Result<FetchedAsset, String>;
}

async fn read_asset(resp: Response) -> std::result::Result<FetchedAsset, String> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(status_message(status, &body));
    }
    let content_type = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| format!("Failed to read response body: {}", e))?;
    Ok(FetchedAsset {
        bytes: bytes.to_vec(),
        content_type,
    })
}

/// Fetch through the API host's download proxy, which sidesteps cross-origin limits.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProxyStrategy;

#[async_trait]
impl FetchStrategy for ProxyStrategy {
    fn name(&self) -> &'static str {
        "proxy"
    }

    async fn fetch(&self, client: &ApiClient, url: &str) -> std::result::Result<FetchedAsset, String> {
        let resp = client
            .http()
            .get(client.url(PROXY_PATH))
            .query(&[("url", url)])
            .send()
            .await
            .map_err(|e| redact(&format!("Proxy request failed: {}", e)))?;
        read_asset(resp).await
    }
}

/// Fetch the asset directly, with a cache-busting `t` parameter.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectStrategy;

impl DirectStrategy {
    pub fn cache_busted(url: &str, millis: i64) -> std::result::Result<Url, String> {
        let mut parsed = Url::parse(url).map_err(|e| format!("Invalid URL {}: {}", url, e))?;
        parsed
            .query_pairs_mut()
            .append_pair("t", &millis.to_string());
        Ok(parsed)
    }
}

#[async_trait]
impl FetchStrategy for DirectStrategy {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn fetch(&self, client: &ApiClient, url: &str) -> std::result::Result<FetchedAsset, String> {
        let target = Self::cache_busted(url, chrono::Utc::now().timestamp_millis())?;
        let resp = client
            .http()
            .get(target)
            .send()
            .await
            .map_err(|e| redact(&format!("Direct request failed: {}", e)))?;
        read_asset(resp).await
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Outcome of one strategy in the chain. `error` is `None` for the strategy that won.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyAttempt {
    pub strategy: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadReport {
    pub path: PathBuf,
    pub file_name: String,
    pub strategy: String,
    pub bytes: usize,
    pub content_type: Option<String>,
    pub fingerprint: String,
    pub attempts: Vec<StrategyAttempt>,
}

pub struct DownloadFetcher {
    strategies: Vec<Box<dyn FetchStrategy>>,
    prefix: String,
    id_length: usize,
}

impl DownloadFetcher {
    /// Proxy first, then direct.
    pub fn new(prefix: &str, id_length: usize) -> Self {
        Self::with_strategies(
            prefix,
            id_length,
            vec![Box::new(ProxyStrategy), Box::new(DirectStrategy)],
        )
    }

    pub fn with_strategies(prefix: &str, id_length: usize, strategies: Vec<Box<dyn FetchStrategy>>) -> Self {
        Self {
            strategies,
            prefix: prefix.to_string(),
            id_length,
        }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Runs the chain in order and stops at the first success.
    pub async fn fetch(
        &self,
        client: &ApiClient,
        url: &str,
    ) -> Result<(FetchedAsset, Vec<StrategyAttempt>)> {
        let mut attempts = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            log::debug!("Trying {} download for {}", strategy.name(), redact(url));
            match strategy.fetch(client, url).await {
                Ok(asset) => {
                    attempts.push(StrategyAttempt {
                        strategy: strategy.name().to_string(),
                        error: None,
                    });
                    return Ok((asset, attempts));
                }
                Err(e) => {
                    log::warn!("{} download failed: {}", strategy.name(), e);
                    attempts.push(StrategyAttempt {
                        strategy: strategy.name().to_string(),
                        error: Some(e),
                    });
                }
            }
        }

        Err(PipelineError::DownloadFailure { attempts })
    }

    pub fn file_name_for(&self, url: &str, content_type: Option<&str>) -> String {
        format!(
            "{}_{}.{}",
            self.prefix,
            ids::generate(self.id_length),
            infer_extension(url, content_type)
        )
    }

    pub async fn download(&self, client: &ApiClient, url: &str, dir: &Path) -> Result<DownloadReport> {
        let (asset, attempts) = self.fetch(client, url).await?;
        let strategy = attempts
            .last()
            .map(|a| a.strategy.clone())
            .unwrap_or_default();

        let file_name = self.file_name_for(url, asset.content_type.as_deref());
        let path = save_atomic(dir, &file_name, &asset.bytes).await?;

        log::info!(
            "Saved {} bytes to {} via {}",
            asset.bytes.len(),
            path.display(),
            strategy
        );

        Ok(DownloadReport {
            path,
            file_name,
            strategy,
            bytes: asset.bytes.len(),
            fingerprint: compute_fingerprint(&asset.bytes),
            content_type: asset.content_type,
            attempts,
        })
    }
}

async fn save_atomic(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(file_name);
    let tmp = dir.join(format!("{}.part", file_name));
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, &path).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Fails(&'static str);

    #[async_trait]
    impl FetchStrategy for Fails {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn fetch(&self, _client: &ApiClient, _url: &str) -> std::result::Result<FetchedAsset, String> {
            Err(format!("{} unavailable", self.0))
        }
    }

    struct Serves(&'static str, &'static str);

    #[async_trait]
    impl FetchStrategy for Serves {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn fetch(&self, _client: &ApiClient, _url: &str) -> std::result::Result<FetchedAsset, String> {
            Ok(FetchedAsset {
                bytes: b"media".to_vec(),
                content_type: Some(self.1.to_string()),
            })
        }
    }

    fn client() -> ApiClient {
        ApiClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn extension_from_content_type() {
        assert_eq!(infer_extension("https://x/y", Some("image/png")), "png");
        assert_eq!(infer_extension("https://x/y.png", Some("image/jpeg")), "jpg");
        assert_eq!(infer_extension("https://x/y", Some("video/MP4")), "mp4");
    }

    #[test]
    fn extension_from_url_when_type_absent() {
        assert_eq!(infer_extension("https://x/y.mp4?x=1", None), "mp4");
        assert_eq!(infer_extension("https://x/y.JPEG", None), "jpg");
    }

    #[test]
    fn extension_from_url_when_type_unhelpful() {
        assert_eq!(
            infer_extension("https://x/y.webm", Some("application/octet-stream")),
            "webm"
        );
    }

    #[test]
    fn extension_defaults_to_png() {
        assert_eq!(infer_extension("https://x/y", None), "png");
    }

    #[test]
    fn cache_busted_appends_t() {
        let url = DirectStrategy::cache_busted("https://x/y.mp4", 123).unwrap();
        assert_eq!(url.as_str(), "https://x/y.mp4?t=123");
        let url = DirectStrategy::cache_busted("https://x/y.mp4?sig=a", 5).unwrap();
        assert_eq!(url.as_str(), "https://x/y.mp4?sig=a&t=5");
    }

    #[test]
    fn cache_busted_rejects_garbage() {
        assert!(DirectStrategy::cache_busted("not a url", 1).is_err());
    }

    #[test]
    fn default_chain_is_proxy_then_direct() {
        assert_eq!(DownloadFetcher::new("fx", 8).strategy_names(), vec!["proxy", "direct"]);
    }

    #[test]
    fn file_name_uses_prefix_id_and_extension() {
        let fetcher = DownloadFetcher::new("halloween_effect", 8);
        let name = fetcher.file_name_for("https://x/y.mp4", None);
        assert!(name.starts_with("halloween_effect_"));
        assert!(name.ends_with(".mp4"));
        assert_eq!(name.len(), "halloween_effect_".len() + 8 + ".mp4".len());
    }

    #[tokio::test]
    async fn falls_back_to_second_strategy() {
        let fetcher = DownloadFetcher::with_strategies(
            "fx",
            8,
            vec![Box::new(Fails("proxy")), Box::new(Serves("direct", "video/mp4"))],
        );
        let dir = tempfile::tempdir().unwrap();

        let report = fetcher.download(&client(), "https://x/y", dir.path()).await.unwrap();

        assert_eq!(report.strategy, "direct");
        assert_eq!(report.attempts.len(), 2);
        assert_eq!(report.attempts[0].error.as_deref(), Some("proxy unavailable"));
        assert!(report.attempts[1].error.is_none());
        assert!(report.file_name.ends_with(".mp4"));
        assert_eq!(std::fs::read(&report.path).unwrap(), b"media");
        assert_eq!(report.fingerprint, compute_fingerprint(b"media"));
    }

    #[tokio::test]
    async fn first_success_skips_rest() {
        let fetcher = DownloadFetcher::with_strategies(
            "fx",
            8,
            vec![Box::new(Serves("proxy", "image/webp")), Box::new(Fails("direct"))],
        );
        let dir = tempfile::tempdir().unwrap();
        let report = fetcher.download(&client(), "https://x/y", dir.path()).await.unwrap();
        assert_eq!(report.attempts.len(), 1);
        assert!(report.file_name.ends_with(".webp"));
    }

    #[tokio::test]
    async fn all_strategies_failing_asks_for_manual_save() {
        let fetcher = DownloadFetcher::with_strategies(
            "fx",
            8,
            vec![Box::new(Fails("proxy")), Box::new(Fails("direct"))],
        );
        let dir = tempfile::tempdir().unwrap();

        let err = fetcher
            .download(&client(), "https://x/y", dir.path())
            .await
            .unwrap_err();

        match &err {
            PipelineError::DownloadFailure { attempts } => {
                assert_eq!(attempts.len(), 2);
                assert!(attempts.iter().all(|a| a.error.is_some()));
            }
            other => panic!("expected DownloadFailure, got {:?}", other),
        }
        assert!(err.to_string().contains("Save As"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
