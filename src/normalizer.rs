use std::collections::HashSet;

use serde::Serialize;
use tracing::info;

use crate::batch::BatchResolver;
use crate::extraction::{ExtractionResult, EMPTY_REPLY_TEXT};
use crate::places::{PartialPlace, Place, StructuredReply};

const SUGGESTED_PLACES_LABEL: &str = "Suggested places:";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplyStats {
    pub total: usize,
    pub provided: usize,
    pub geocoded: usize,
    pub unresolved: usize,
    pub text_augmented: bool,
}

/// Reconciles extracted candidates and geocoder output into one reply.
#[derive(Clone)]
pub struct ResponseNormalizer {
    resolver: BatchResolver,
}

impl ResponseNormalizer {
    pub fn new(resolver: BatchResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &BatchResolver {
        &self.resolver
    }

    pub async fn normalize(&self, extraction: ExtractionResult) -> StructuredReply {
        let (reply, stats) = self.normalize_with_stats(extraction).await;
        info!(
            total = stats.total,
            provided = stats.provided,
            geocoded = stats.geocoded,
            unresolved = stats.unresolved,
            text_augmented = stats.text_augmented,
            "normalized reply"
        );
        reply
    }

    pub async fn normalize_with_stats(
        &self,
        extraction: ExtractionResult,
    ) -> (StructuredReply, ReplyStats) {
        let ExtractionResult {
            display_text,
            places,
            ..
        } = extraction;
        let candidates = dedupe_by_name(places, |partial| partial.name.as_str());
        let provided = candidates
            .iter()
            .filter(|partial| partial.coordinates().is_some())
            .count();
        let carried = candidates
            .iter()
            .map(PartialPlace::carries_coordinates)
            .collect::<Vec<_>>();

        let places = if candidates.iter().all(PartialPlace::carries_coordinates) {
            candidates
                .into_iter()
                .map(PartialPlace::into_place)
                .collect::<Vec<_>>()
        } else {
            self.resolve_missing(candidates).await
        };

        let resolved = places.iter().filter(|place| place.is_resolved()).count();

        let text = if display_text.trim().is_empty() {
            EMPTY_REPLY_TEXT.to_string()
        } else {
            display_text
        };
        let geocoded = places
            .iter()
            .zip(&carried)
            .filter(|(place, carried)| !**carried && place.is_resolved())
            .map(|(place, _)| place)
            .collect::<Vec<_>>();
        let (text, text_augmented) = reconcile_text(text, &geocoded, &places);
        let stats = ReplyStats {
            total: places.len(),
            provided,
            geocoded: resolved - provided,
            unresolved: places.len() - resolved,
            text_augmented,
        };

        (StructuredReply { text, places }, stats)
    }

    async fn resolve_missing(&self, candidates: Vec<PartialPlace>) -> Vec<Place> {
        let pending = candidates
            .iter()
            .filter(|partial| !partial.carries_coordinates())
            .map(|partial| partial.name.clone())
            .collect::<Vec<_>>();
        let mut resolved = self.resolver.resolve_all(&pending).await.into_iter();

        candidates
            .into_iter()
            .map(|partial| {
                if partial.carries_coordinates() {
                    return partial.into_place();
                }
                let description = partial.description.clone();
                match resolved.next().flatten() {
                    Some(place) => Place {
                        name: partial.name,
                        coordinates: place.coordinates,
                        display_name: place.display_name,
                        description,
                    },
                    None => partial.into_place(),
                }
            })
            .collect()
    }
}

/// Case-insensitive dedupe keeping the first occurrence and its position.
fn dedupe_by_name<T>(items: Vec<T>, name: impl Fn(&T) -> &str) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(name(item).to_lowercase()))
        .collect()
}

/// Appends every place name when a geocoded place is missing from the
/// narrative. Places that arrived with coordinates leave the caption as written.
fn reconcile_text(text: String, geocoded: &[&Place], places: &[Place]) -> (String, bool) {
    let haystack = text.to_lowercase();
    let mentioned = |label: &str| haystack.contains(&label.to_lowercase());
    let all_mentioned = geocoded.iter().all(|place| {
        mentioned(&place.name)
            || place
                .display_name
                .as_deref()
                .map(mentioned)
                .unwrap_or(false)
    });
    if all_mentioned {
        return (text, false);
    }

    let names = places
        .iter()
        .map(|place| place.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    (
        format!("{}\n\n{} {}", text.trim_end(), SUGGESTED_PLACES_LABEL, names),
        true,
    )
}
