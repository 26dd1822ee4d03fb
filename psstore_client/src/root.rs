use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Image `type` the store uses for the small product thumbnail.
pub const THUMB_IMAGE_TYPE_SMALL: i64 = 2;

const DEFAULT_UA: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0 Safari/537.36";

#[derive(Clone, Debug)]
pub struct PsConfig {
    /// Pause between the listing count request and the full listing request.
    pub listing_spacing: Duration,
    /// Hard timeout applied to every HTTP request.
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for PsConfig {
    fn default() -> Self {
        Self {
            listing_spacing: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_UA.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum PsError {
    #[error("http {status} from {url}")]
    Http { status: u16, url: String },
    #[error("network: {0}")]
    Net(#[from] reqwest::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl PsError {
    /// Network failures, throttling and 5xx responses are worth another attempt.
    /// Client errors and malformed payloads are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            PsError::Net(_) => true,
            PsError::Http { status, .. } => *status >= 500 || *status == 429,
            PsError::Json(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Listing payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingPage {
    #[serde(default)]
    pub total_results: u64,
    /// Decoded one at a time through [`ListingPage::entries`], so a malformed
    /// entry only costs that entry.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub links: Vec<Value>,
}

#[derive(Debug, Error)]
#[error("listing entry {id}: {reason}")]
pub struct InvalidListingEntry {
    /// The entry's `id` when it has a string one, `"?"` otherwise.
    pub id: String,
    pub reason: String,
}

impl ListingPage {
    pub fn entries(&self) -> impl Iterator<Item = Result<ListingEntry, InvalidListingEntry>> + '_ {
        self.links.iter().map(|raw| {
            ListingEntry::deserialize(raw).map_err(|e| InvalidListingEntry {
                id: raw
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or("?")
                    .to_string(),
                reason: e.to_string(),
            })
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingEntry {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub images: Vec<PsImage>,
    /// Set on bundle components and add-ons. Presence alone matters, so an
    /// explicit `null` still counts as present.
    #[serde(default, deserialize_with = "present")]
    pub parent_name: Option<Value>,
    #[serde(default)]
    pub release_date: Option<String>,
}

impl ListingEntry {
    pub fn is_bundle_component(&self) -> bool {
        self.parent_name.is_some()
    }

    pub fn thumbnail(&self) -> Option<&str> {
        pick_thumbnail(&self.images)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PsImage {
    #[serde(rename = "type")]
    pub kind: i64,
    pub url: String,
}

/// First small thumbnail in the list, if any.
pub fn pick_thumbnail(images: &[PsImage]) -> Option<&str> {
    images
        .iter()
        .find(|img| img.kind == THUMB_IMAGE_TYPE_SMALL)
        .map(|img| img.url.as_str())
}

// ---------------------------------------------------------------------------
// Product detail payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ItemDetail {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub age_limit: Option<i64>,
    /// Missing on pre-order listings that outlived their release date.
    #[serde(default)]
    pub default_sku: Option<DefaultSku>,
    #[serde(default)]
    pub star_rating: Option<StarRating>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content_descriptors: Vec<ContentDescriptorIn>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub images: Vec<PsImage>,
}

impl ItemDetail {
    pub fn thumbnail(&self) -> Option<&str> {
        pick_thumbnail(&self.images)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DefaultSku {
    /// Undiscounted price in minor units.
    pub price: i64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub rewards: Vec<Reward>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Reward {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub discount: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub price: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub bonus_discount: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub bonus_price: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StarRating {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub score: Option<f64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub total: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentDescriptorIn {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

fn present<'de, D>(d: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(d).map(Some)
}

fn null_as_empty<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(d)?.unwrap_or_default())
}

// The store has served ratings both as numbers and as strings ("4.80").
fn lenient_f64<'de, D>(d: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite()))
}

fn lenient_i64<'de, D>(d: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => {
            let t = s.trim();
            t.parse::<i64>()
                .ok()
                .or_else(|| t.parse::<f64>().ok().map(|f| f.round() as i64))
        }
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PsStoreClient {
    http: Client,
    cfg: Arc<PsConfig>,
}

impl PsStoreClient {
    pub fn new(cfg: PsConfig) -> Result<Self, PsError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static("cache-control"),
            HeaderValue::from_static("no-cache"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&cfg.user_agent)
                .unwrap_or_else(|_| HeaderValue::from_static("Mozilla/5.0")),
        );

        let http = Client::builder()
            .default_headers(headers)
            .timeout(cfg.request_timeout)
            .pool_idle_timeout(Duration::from_secs(300))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            http,
            cfg: Arc::new(cfg),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, PsError> {
        let t0 = Instant::now();
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        let elapsed_ms = t0.elapsed().as_millis() as u64;
        debug!(url = %url, status = status.as_u16(), body_len = body.len(), elapsed_ms, "psstore response");

        if !status.is_success() {
            let sample = body.get(..200).unwrap_or(&body);
            warn!(url = %url, status = status.as_u16(), sample_body = %sample, "psstore request failed");
            return Err(PsError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Ask the store for zero entries; the reply still carries `total_results`.
    pub async fn listing_total_results(&self, library_url: &str) -> Result<u64, PsError> {
        let page: ListingPage = self.get_json(&format!("{library_url}0")).await?;
        Ok(page.total_results)
    }

    /// Fetch the whole listing: a count request, the configured pause, then a
    /// request sized to that count.
    pub async fn fetch_listing(&self, library_url: &str) -> Result<ListingPage, PsError> {
        let total = self.listing_total_results(library_url).await?;
        info!(library_url = %library_url, total, "psstore listing count");
        if !self.cfg.listing_spacing.is_zero() {
            tokio::time::sleep(self.cfg.listing_spacing).await;
        }
        let mut page: ListingPage = self.get_json(&format!("{library_url}{total}")).await?;
        if page.total_results == 0 {
            page.total_results = total;
        }
        info!(library_url = %library_url, entries = page.links.len(), "psstore listing fetched");
        Ok(page)
    }

    /// One product detail request. Spacing between consecutive calls is the
    /// caller's job.
    pub async fn fetch_item_detail(&self, detail_url: &str) -> Result<ItemDetail, PsError> {
        self.get_json(detail_url).await
    }
}
