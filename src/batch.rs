use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::geocoder::Geocoder;
use crate::places::Place;

/// Fans names out to the geocoder concurrently and joins them back in input
/// order. At most `max_concurrency` lookups are in flight at once.
#[derive(Clone)]
pub struct BatchResolver {
    geocoder: Geocoder,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
}

impl BatchResolver {
    pub fn new(geocoder: Geocoder, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            geocoder,
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
        }
    }

    pub fn geocoder(&self) -> &Geocoder {
        &self.geocoder
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// `output[i]` is the resolution of `names[i]`, or `None` when it could not
    /// be resolved for any reason. Returns once every lookup has settled.
    pub async fn resolve_all(&self, names: &[String]) -> Vec<Option<Place>> {
        let handles = names
            .iter()
            .cloned()
            .map(|name| {
                let geocoder = self.geocoder.clone();
                let permits = Arc::clone(&self.permits);
                tokio::spawn(async move {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return None;
                    };
                    match geocoder.resolve(&name).await {
                        Ok(place) => place,
                        Err(err) => {
                            warn!(?err, query = %name, "place resolution failed");
                            None
                        }
                    }
                })
            })
            .collect::<Vec<_>>();

        join_all(handles)
            .await
            .into_iter()
            .zip(names)
            .map(|(joined, name)| {
                joined.unwrap_or_else(|err| {
                    warn!(?err, query = %name, "place resolution task aborted");
                    None
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::time::sleep;

    use super::*;
    use crate::errors::{AppError, AppResult};
    use crate::geocoder::{GeocodeLookup, GeocodeMatch, RetryPolicy};
    use crate::places::CoordinateField;

    #[derive(Clone, Copy)]
    enum Behaviour {
        Found { delay_ms: u64, lat: f64 },
        Missing,
        Broken,
        Panics,
    }

    struct DelayedLookup {
        script: HashMap<&'static str, Behaviour>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        order: Mutex<Vec<String>>,
    }

    impl DelayedLookup {
        fn new(script: Vec<(&'static str, Behaviour)>) -> Arc<Self> {
            Arc::new(Self {
                script: script.into_iter().collect(),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                order: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl GeocodeLookup for DelayedLookup {
        async fn search(&self, query: &str, _limit: usize) -> AppResult<Vec<GeocodeMatch>> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            let behaviour = self
                .script
                .get(query)
                .copied()
                .unwrap_or(Behaviour::Found {
                    delay_ms: 100,
                    lat: 0.0,
                });
            let result = match behaviour {
                Behaviour::Found { delay_ms, lat } => {
                    sleep(Duration::from_millis(delay_ms)).await;
                    Ok(vec![GeocodeMatch {
                        lat: Some(CoordinateField::Number(lat)),
                        lon: Some(CoordinateField::Number(10.0)),
                        display_name: None,
                    }])
                }
                Behaviour::Missing => Ok(vec![]),
                Behaviour::Broken => Err(AppError::Config("connection reset".into())),
                Behaviour::Panics => panic!("lookup blew up for {query}"),
            };
            self.order.lock().push(query.to_string());
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn resolver(lookup: Arc<DelayedLookup>, max_concurrency: usize) -> BatchResolver {
        let policy = RetryPolicy {
            max_attempts: 2,
            attempt_timeout: Duration::from_secs(8),
            backoff_base: Duration::from_millis(500),
        };
        BatchResolver::new(Geocoder::with_lookup(lookup, policy), max_concurrency)
    }

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn preserves_input_order_regardless_of_completion() {
        let lookup = DelayedLookup::new(vec![
            ("A", Behaviour::Found { delay_ms: 300, lat: 1.0 }),
            ("B", Behaviour::Found { delay_ms: 10, lat: 2.0 }),
            ("C", Behaviour::Missing),
        ]);
        let batch = resolver(lookup.clone(), 8);

        let results = batch.resolve_all(&names(&["A", "B", "C"])).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().and_then(|p| p.latitude()), Some(1.0));
        assert_eq!(results[0].as_ref().map(|p| p.name.as_str()), Some("A"));
        assert_eq!(results[1].as_ref().and_then(|p| p.latitude()), Some(2.0));
        assert!(results[2].is_none());

        let order = lookup.order.lock().clone();
        assert_eq!(order.last().map(String::as_str), Some("A"));
    }

    #[tokio::test(start_paused = true)]
    async fn one_failure_does_not_disturb_siblings() {
        let lookup = DelayedLookup::new(vec![
            ("Broken", Behaviour::Broken),
            ("Panics", Behaviour::Panics),
            ("Roma, Italia", Behaviour::Found { delay_ms: 50, lat: 41.9 }),
        ]);
        let batch = resolver(lookup, 8);

        let results = batch
            .resolve_all(&names(&["Broken", "", "Panics", "Roma, Italia"]))
            .await;

        assert_eq!(results.len(), 4);
        assert!(results[0].is_none());
        assert!(results[1].is_none());
        assert!(results[2].is_none());
        assert_eq!(results[3].as_ref().and_then(|p| p.latitude()), Some(41.9));
    }

    #[tokio::test(start_paused = true)]
    async fn caps_lookups_in_flight() {
        let lookup = DelayedLookup::new(vec![]);
        let batch = resolver(lookup.clone(), 3);
        let many = (0..12).map(|i| format!("Place {i}")).collect::<Vec<_>>();

        let results = batch.resolve_all(&many).await;

        assert!(results.iter().all(Option::is_some));
        let peak = lookup.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak in-flight was {peak}");
        assert!(peak >= 2, "lookups were serialized");
    }

    #[tokio::test]
    async fn empty_batch_returns_empty() {
        let batch = resolver(DelayedLookup::new(vec![]), 8);
        assert!(batch.resolve_all(&[]).await.is_empty());
    }
}
