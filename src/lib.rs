mod batch;
mod cache;
mod config;
mod errors;
mod extraction;
mod geocoder;
mod normalizer;
mod places;
mod prompt;

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use batch::BatchResolver;
pub use cache::{CachedResolution, GeocodeCache};
pub use config::{AppConfig, PublicAppConfig, DEFAULT_GEOCODER_ENDPOINT};
pub use errors::{AppError, AppResult};
pub use extraction::{
    extract, scan_place_names, ExtractionResult, ExtractionSource, ParsedPayload,
    EMPTY_REPLY_TEXT, MAX_SCANNED_PLACES, PLACEHOLDER_TEXT,
};
pub use geocoder::{GeocodeLookup, GeocodeMatch, Geocoder, HttpGeocodeClient, RetryPolicy};
pub use normalizer::{ReplyStats, ResponseNormalizer};
pub use places::{CoordinateField, Coordinates, PartialPlace, Place, StructuredReply};
pub use prompt::{canned_reply, travel_prompt};

/// Raw model text in, map-ready reply out.
#[derive(Clone)]
pub struct ReplyPipeline {
    normalizer: ResponseNormalizer,
    config: AppConfig,
}

impl ReplyPipeline {
    /// Builds the pipeline against the configured HTTP geocoder.
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let geocoder = Geocoder::new(config)?;
        Ok(Self::assemble(config, geocoder))
    }

    /// Builds the pipeline around a caller-supplied lookup backend.
    pub fn with_lookup(config: &AppConfig, lookup: Arc<dyn GeocodeLookup>) -> Self {
        let geocoder = Geocoder::with_lookup(lookup, RetryPolicy::from_config(config))
            .with_result_limit(config.geocoder_result_limit);
        Self::assemble(config, geocoder)
    }

    pub fn from_env() -> AppResult<Self> {
        init_tracing();
        let config = AppConfig::from_env();
        debug!(profile = ?config.public_profile(), "reply pipeline configured");
        Self::new(&config)
    }

    fn assemble(config: &AppConfig, geocoder: Geocoder) -> Self {
        let resolver = BatchResolver::new(geocoder, config.geocoder_max_concurrency);
        Self {
            normalizer: ResponseNormalizer::new(resolver),
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn geocoder(&self) -> &Geocoder {
        self.normalizer.resolver().geocoder()
    }

    pub fn cache(&self) -> &GeocodeCache {
        self.geocoder().cache()
    }

    /// Never fails: per-place problems surface as unresolved places and an
    /// empty answer becomes a fixed apology.
    pub async fn produce_reply(&self, raw_text: &str) -> StructuredReply {
        let extraction = extract(raw_text);
        debug!(
            source = ?extraction.source,
            candidates = extraction.places.len(),
            "extracted reply"
        );
        self.normalizer.normalize(extraction).await
    }

    pub async fn produce_reply_with_stats(&self, raw_text: &str) -> (StructuredReply, ReplyStats) {
        self.normalizer.normalize_with_stats(extract(raw_text)).await
    }

    /// Runs a keyword-matched canned answer through the full pipeline.
    pub async fn produce_offline_reply(&self, user_message: &str) -> StructuredReply {
        self.produce_reply(&canned_reply(user_message)).await
    }
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,destino=debug"));
        // Another subscriber may already be installed by the host application.
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    });
}
