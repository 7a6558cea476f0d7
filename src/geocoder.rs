use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT_LANGUAGE;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use tokio::time::{sleep, timeout};
use tracing::{debug, trace, warn};

use crate::cache::{CachedResolution, GeocodeCache};
use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::places::{CoordinateField, Coordinates, Place};

/// One candidate returned by the lookup service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeocodeMatch {
    #[serde(default)]
    pub lat: Option<CoordinateField>,
    #[serde(default)]
    pub lon: Option<CoordinateField>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl GeocodeMatch {
    fn coordinates(&self) -> Option<Coordinates> {
        match (&self.lat, &self.lon) {
            (Some(lat), Some(lon)) => Coordinates::from_fields(lat, lon),
            _ => None,
        }
    }
}

/// A single request against an external geocoding service.
///
/// `Ok(vec![])` means the service answered and found nothing; `Err` means the
/// attempt failed and may be retried.
#[async_trait]
pub trait GeocodeLookup: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> AppResult<Vec<GeocodeMatch>>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.geocoder_max_attempts.max(1),
            attempt_timeout: Duration::from_millis(config.geocoder_timeout_ms),
            backoff_base: Duration::from_millis(config.geocoder_backoff_base_ms),
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Resolves place names to coordinates with caching, per-attempt timeouts and
/// linear backoff between attempts.
#[derive(Clone)]
pub struct Geocoder {
    lookup: Arc<dyn GeocodeLookup>,
    cache: GeocodeCache,
    policy: RetryPolicy,
    result_limit: usize,
}

impl Geocoder {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let lookup = HttpGeocodeClient::new(config)?;
        Ok(Self::with_lookup(
            Arc::new(lookup),
            RetryPolicy::from_config(config),
        )
        .with_result_limit(config.geocoder_result_limit))
    }

    pub fn with_lookup(lookup: Arc<dyn GeocodeLookup>, policy: RetryPolicy) -> Self {
        Self {
            lookup,
            cache: GeocodeCache::new(),
            policy,
            result_limit: 1,
        }
    }

    pub fn with_cache(mut self, cache: GeocodeCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_result_limit(mut self, limit: usize) -> Self {
        self.result_limit = limit.max(1);
        self
    }

    pub fn cache(&self) -> &GeocodeCache {
        &self.cache
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Resolve one name. `Ok(None)` means unresolved: no match, unusable
    /// coordinates, or every attempt failed. Only empty input is an error.
    pub async fn resolve(&self, name: &str) -> AppResult<Option<Place>> {
        if name.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "place name must not be empty".into(),
            ));
        }

        if let Some(hit) = self.cache.get(name) {
            debug!(query = name, "geocode cache hit");
            return Ok(Some(Place::resolved(
                name,
                hit.coordinates,
                hit.display_name,
            )));
        }

        let Some(matches) = self.search_with_retry(name).await else {
            return Ok(None);
        };

        let Some(first) = matches.into_iter().next() else {
            debug!(query = name, "geocoder returned no matches");
            return Ok(None);
        };

        let Some(coordinates) = first.coordinates() else {
            warn!(query = name, "geocoder match carried unusable coordinates");
            return Ok(None);
        };

        self.cache.put(
            name,
            CachedResolution {
                coordinates,
                display_name: first.display_name.clone(),
            },
        );
        trace!(query = name, ?coordinates, "geocoded place");
        Ok(Some(Place::resolved(name, coordinates, first.display_name)))
    }

    async fn search_with_retry(&self, name: &str) -> Option<Vec<GeocodeMatch>> {
        let max_attempts = self.policy.max_attempts;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = match timeout(
                self.policy.attempt_timeout,
                self.lookup.search(name, self.result_limit),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(AppError::Timeout(self.policy.attempt_timeout)),
            };

            match outcome {
                Ok(matches) => return Some(matches),
                Err(err) if attempt < max_attempts => {
                    let delay = self.policy.backoff_delay(attempt);
                    warn!(
                        ?err,
                        query = name,
                        attempt,
                        "geocode lookup failed; retrying after {:?}",
                        delay
                    );
                    sleep(delay).await;
                }
                Err(err) => {
                    warn!(?err, query = name, attempt, "geocode lookup failed; giving up");
                    return None;
                }
            }
        }
    }
}

/// Nominatim-style search endpoint over HTTP.
pub struct HttpGeocodeClient {
    http: Client,
    endpoint: Url,
    accept_language: Option<String>,
}

impl HttpGeocodeClient {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let endpoint = Url::parse(&config.geocoder_endpoint).map_err(|err| {
            AppError::Config(format!("invalid geocoder endpoint: {err}"))
        })?;
        let http = Client::builder()
            .user_agent(config.geocoder_user_agent.clone())
            .build()?;
        Ok(Self {
            http,
            endpoint,
            accept_language: config.geocoder_accept_language.clone(),
        })
    }
}

#[async_trait]
impl GeocodeLookup for HttpGeocodeClient {
    async fn search(&self, query: &str, limit: usize) -> AppResult<Vec<GeocodeMatch>> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("format", "json")
            .append_pair("limit", &limit.to_string());

        let mut request = self.http.get(url);
        if let Some(language) = &self.accept_language {
            request = request.header(ACCEPT_LANGUAGE, language);
        }

        let response = request.send().await?.error_for_status()?;
        let body: Value = serde_json::from_slice(&response.bytes().await?)?;
        Ok(parse_matches(body))
    }
}

/// Keeps the service's ordering; an element that does not deserialize stays in
/// place as a match without coordinates.
fn parse_matches(body: Value) -> Vec<GeocodeMatch> {
    let Value::Array(items) = body else {
        return Vec::new();
    };
    items
        .into_iter()
        .map(|item| serde_json::from_value::<GeocodeMatch>(item).unwrap_or_default())
        .collect()
}
