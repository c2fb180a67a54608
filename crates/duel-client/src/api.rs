use duel_core::config::HttpConfig;
use duel_core::error::AppError;
use duel_core::models::{Dataset, DatasetRecord, ImagePayload};
use duel_core::traits::CardSource;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

/// Content type assumed when neither the response nor the URL says otherwise.
const DEFAULT_IMAGE_TYPE: &str = "image/jpeg";

/// Resolves the content type of a downloaded image.
///
/// The response header wins when present. Otherwise the type is inferred from
/// the URL's extension, falling back to JPEG.
///
/// # Examples
///
/// ```
/// use duel_client::api::resolve_content_type;
///
/// assert_eq!(resolve_content_type(Some("image/webp"), "https://img.example.com/1.jpg"), "image/webp");
/// assert_eq!(resolve_content_type(None, "https://img.example.com/1.PNG"), "image/png");
/// assert_eq!(resolve_content_type(None, "https://img.example.com/1.gif"), "image/jpeg");
/// ```
pub fn resolve_content_type(header: Option<&str>, url: &str) -> String {
    if let Some(value) = header.map(str::trim).filter(|v| !v.is_empty()) {
        return value.to_string();
    }

    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    if path.ends_with(".jpg") || path.ends_with(".jpeg") {
        "image/jpeg".to_string()
    } else if path.ends_with(".png") {
        "image/png".to_string()
    } else {
        DEFAULT_IMAGE_TYPE.to_string()
    }
}

/// HTTP client for the upstream card dataset and its image CDN.
///
/// Every request carries the configured timeout (30 seconds by default).
/// Dataset requests are retried on transient failures; image requests are
/// attempted once, since the refresh pipeline treats them as best-effort.
///
/// # Examples
///
/// ```no_run
/// use duel_client::CardApiClient;
/// use duel_core::CardSource;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = CardApiClient::new()?;
/// let records = client
///     .fetch_dataset("https://db.ygoprodeck.com/api/v7/cardinfo.php")
///     .await?;
/// println!("Found {} cards", records.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CardApiClient {
    client: Client,
    config: HttpConfig,
}

impl CardApiClient {
    /// Creates a client with the default [`HttpConfig`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::ClientError` if the HTTP client cannot be built.
    pub fn new() -> Result<Self, AppError> {
        Self::with_config(HttpConfig::default())
    }

    pub fn with_config(config: HttpConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent("IndexDuel/0.1 (card-sync)")
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn parse_url(url: &str) -> Result<Url, AppError> {
        Url::parse(url).map_err(|e| AppError::InvalidUrl(format!("{}: {}", url, e)))
    }

    fn classify(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.config.timeout.as_secs())
        } else if e.is_connect() {
            AppError::NetworkError(format!("Connection failed: {}", e))
        } else {
            AppError::ClientError(e.to_string())
        }
    }

    /// Makes an HTTP GET request with automatic retry on transient failures.
    ///
    /// Retries on network errors, timeouts, server errors (5xx) and rate
    /// limiting (429). Any other non-success status is returned immediately.
    async fn request_with_retry(&self, url: &Url) -> Result<reqwest::Response, AppError> {
        let max_attempts = self.config.max_retries.max(1);
        let mut last_error = AppError::Generic("No attempts made".to_string());

        for attempt in 1..=max_attempts {
            let retry_delay = self.config.retry_base_delay * attempt;

            match self.client.get(url.clone()).send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if status.is_success() {
                        return Ok(resp);
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        last_error = AppError::RateLimitExceeded;
                        if attempt < max_attempts {
                            let delay = self.config.retry_base_delay * 2_u32.pow(attempt);
                            warn!("Rate limited by {}, retrying in {:?}", url, delay);
                            sleep(delay).await;
                            continue;
                        }
                        return Err(last_error);
                    }

                    if status.is_server_error() {
                        last_error = AppError::ClientError(format!(
                            "Server error: HTTP {} from {}",
                            status.as_u16(),
                            url
                        ));
                        if attempt < max_attempts {
                            warn!(
                                "HTTP {} from {} (attempt {}/{}), retrying",
                                status.as_u16(),
                                url,
                                attempt,
                                max_attempts
                            );
                            sleep(retry_delay).await;
                            continue;
                        }
                        return Err(last_error);
                    }

                    return Err(AppError::ClientError(format!(
                        "HTTP {} from {}",
                        status.as_u16(),
                        url
                    )));
                }
                Err(e) => {
                    let transient = e.is_timeout() || e.is_connect();
                    last_error = self.classify(e);

                    if attempt < max_attempts && transient {
                        warn!(
                            "Request to {} failed (attempt {}/{}): {}",
                            url, attempt, max_attempts, last_error
                        );
                        sleep(retry_delay).await;
                        continue;
                    }
                    return Err(last_error);
                }
            }
        }

        Err(last_error)
    }
}

impl CardSource for CardApiClient {
    async fn fetch_dataset(&self, url: &str) -> Result<Vec<DatasetRecord>, AppError> {
        let url = Self::parse_url(url)?;
        let resp = self.request_with_retry(&url).await?;

        let dataset: Dataset = resp
            .json()
            .await
            .map_err(|e| AppError::ClientError(format!("Failed to parse dataset: {}", e)))?;

        debug!("Fetched {} cards from {}", dataset.data.len(), url);
        Ok(dataset.into_records())
    }

    async fn fetch_image(&self, url: &str) -> Result<ImagePayload, AppError> {
        let parsed = Self::parse_url(url)?;
        let resp = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::ClientError(format!(
                "image download returned HTTP {} from {}",
                status.as_u16(),
                url
            )));
        }

        let header = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let data = resp
            .bytes()
            .await
            .map_err(|e| self.classify(e))?
            .to_vec();

        Ok(ImagePayload {
            content_type: resolve_content_type(header.as_deref(), url),
            size: data.len(),
            data,
        })
    }
}
