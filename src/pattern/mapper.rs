//! Pattern-to-reference resolution.

use super::fetch::{ReferenceFetcher, ReferenceImage};
use super::Pattern;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

/// Number of leading sources used when a pattern resolves to nothing.
pub const FALLBACK_REFERENCE_COUNT: usize = 2;

/// Source URLs a pattern points at, converting its 1-based indices.
///
/// Out-of-range indices are skipped. Returns an empty list when nothing resolves.
pub fn resolve_sources<'a>(pattern: &Pattern, sources: &'a [String]) -> Vec<&'a str> {
    pattern
        .source_indices
        .iter()
        .filter_map(|&index| index.checked_sub(1))
        .filter_map(|position| sources.get(position))
        .map(String::as_str)
        .collect()
}

fn fallback_sources(sources: &[String]) -> Vec<&str> {
    sources
        .iter()
        .take(FALLBACK_REFERENCE_COUNT)
        .map(String::as_str)
        .collect()
}

/// Fetches the source images that exemplify each pattern.
#[derive(Clone)]
pub struct PatternReferenceMapper {
    fetcher: Arc<dyn ReferenceFetcher>,
}

impl PatternReferenceMapper {
    pub fn new(fetcher: Arc<dyn ReferenceFetcher>) -> Self {
        Self { fetcher }
    }

    /// Fetch every URL concurrently, dropping the ones that fail.
    ///
    /// Each image is paired with the 0-based position of its URL in `urls`.
    pub async fn fetch_indexed(&self, urls: &[&str]) -> Vec<(usize, ReferenceImage)> {
        let results = join_all(urls.iter().map(|url| self.fetcher.fetch(url))).await;
        results
            .into_iter()
            .enumerate()
            .filter_map(|(position, result)| match result {
                Ok(image) => Some((position, image)),
                Err(err) => {
                    warn!(url = %urls[position], error = %err, "Dropping reference image");
                    None
                }
            })
            .collect()
    }

    pub async fn fetch_all(&self, urls: &[&str]) -> Vec<ReferenceImage> {
        self.fetch_indexed(urls)
            .await
            .into_iter()
            .map(|(_, image)| image)
            .collect()
    }

    /// References for one pattern.
    ///
    /// Falls back to the first two sources when the pattern's indices resolve to no
    /// URL or none of its images could be fetched.
    pub async fn references_for(
        &self,
        pattern: &Pattern,
        sources: &[String],
    ) -> Vec<ReferenceImage> {
        let resolved = resolve_sources(pattern, sources);
        let fallback = fallback_sources(sources);

        if !resolved.is_empty() {
            let images = self.fetch_all(&resolved).await;
            if !images.is_empty() || resolved == fallback {
                return images;
            }
        }

        debug!(
            pattern = %pattern.name,
            fallback = fallback.len(),
            "Pattern resolved no references, using leading sources"
        );
        self.fetch_all(&fallback).await
    }

    /// References for several patterns, fetched concurrently per pattern.
    pub async fn references_for_all(
        &self,
        patterns: &[Pattern],
        sources: &[String],
    ) -> Vec<Vec<ReferenceImage>> {
        join_all(patterns.iter().map(|p| self.references_for(p, sources))).await
    }
}
