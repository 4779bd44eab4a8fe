use backon::{ExponentialBuilder, Retryable};
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::fetch_error::FetchError;
use crate::pns::Bulletin;

pub const DEFAULT_BASE_URL: &str = "https://forecast.weather.gov/product.php";

/// Retrieves PNS bulletins for one issuing office at a time
#[derive(Clone)]
pub struct BulletinFetcher {
    client: reqwest::Client,
    base_url: String,
    max_retries: usize,
    min_delay: Duration,
}

impl BulletinFetcher {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("snow-report-service/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });

        Self {
            client,
            base_url,
            max_retries: 3,
            min_delay: Duration::from_secs(1),
        }
    }

    /// Override the retry schedule for transient failures
    pub fn with_retry(mut self, max_retries: usize, min_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.min_delay = min_delay;
        self
    }

    /// Product page URL for one office and bulletin version (1 = latest)
    pub fn page_url(&self, office_code: &str, version: u32) -> String {
        format!(
            "{}?site=NWS&issuedby={}&product=PNS&format=CI&version={}&glossary=0",
            self.base_url, office_code, version
        )
    }

    /// Fetch one bulletin version, retrying transient failures with exponential backoff
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn fetch_bulletin(
        &self,
        office_code: &str,
        version: u32,
    ) -> Result<Bulletin, FetchError> {
        let url = self.page_url(office_code, version);
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_times(self.max_retries);

        let raw_text = (|| self.fetch_text(&url))
            .retry(backoff)
            .when(FetchError::is_retryable)
            .notify(|err, delay| {
                warn!("Retrying {} in {:?} after error: {}", url, delay, err);
            })
            .await?;

        if raw_text.trim().is_empty() {
            debug!("Bulletin body is empty");
        }

        Ok(Bulletin {
            office_code: office_code.to_string(),
            raw_text,
            retrieved_at: Utc::now(),
        })
    }

    /// Fetch versions `1..=pages` for an office. A missing older version ends the walk.
    #[instrument(skip(self))]
    pub async fn fetch_office(
        &self,
        office_code: &str,
        pages: u32,
    ) -> Result<Vec<Bulletin>, FetchError> {
        let mut bulletins = Vec::new();

        for version in 1..=pages.max(1) {
            match self.fetch_bulletin(office_code, version).await {
                Ok(bulletin) => bulletins.push(bulletin),
                Err(FetchError::NotFound(url)) if version > 1 => {
                    debug!("No bulletin version {} at {}", version, url);
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        info!("Fetched {} bulletins for {}", bulletins.len(), office_code);
        Ok(bulletins)
    }

    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        debug!("Sending HTTP request for bulletin");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        debug!("Received HTTP response with status: {}", status);

        if status.is_success() {
            let text = response.text().await?;
            debug!("Retrieved bulletin content, size: {} bytes", text.len());
            Ok(text)
        } else if status.as_u16() == 404 {
            Err(FetchError::NotFound(url.to_string()))
        } else if status.is_server_error() {
            Err(FetchError::ServerError(format!("{status} from {url}")))
        } else {
            Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            })
        }
    }
}

impl Default for BulletinFetcher {
    fn default() -> Self {
        Self::new()
    }
}
