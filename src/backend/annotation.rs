use futures::future::BoxFuture;
use std::sync::Arc;

use super::error::Result;
use super::model::UnitId;

pub const DEFAULT_TAFSIR_EDITION: &str = "ar.muyassar";
pub const FALLBACK_TEXT: &str = "Tafsir is not available right now. Please try again later.";

pub trait AnnotationSource: Send + Sync {
    fn fetch_annotation(&self, unit: UnitId) -> BoxFuture<'_, Result<String>>;
}

/// Fetches the tafsir for one unit when asked. Nothing is cached or
/// prefetched, and failures turn into [`FALLBACK_TEXT`].
#[derive(Clone)]
pub struct AnnotationFetcher {
    source: Arc<dyn AnnotationSource>,
}

impl AnnotationFetcher {
    pub fn new(source: Arc<dyn AnnotationSource>) -> Self {
        Self { source }
    }

    pub async fn fetch(&self, unit: UnitId) -> String {
        match self.source.fetch_annotation(unit).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                log::warn!("empty tafsir for unit {}", unit);
                FALLBACK_TEXT.to_string()
            }
            Err(e) => {
                log::warn!("tafsir for unit {} failed: {}", unit, e);
                FALLBACK_TEXT.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::FakeContent;

    #[tokio::test]
    async fn test_returns_text() {
        let content = Arc::new(FakeContent::sequential(1, 1));
        content.set_annotation(UnitId(1), "الحمد لله");
        let fetcher = AnnotationFetcher::new(content);

        assert_eq!(fetcher.fetch(UnitId(1)).await, "الحمد لله");
    }

    #[tokio::test]
    async fn test_failure_falls_back() {
        let content = Arc::new(FakeContent::sequential(1, 1));
        let fetcher = AnnotationFetcher::new(content);

        assert_eq!(fetcher.fetch(UnitId(1)).await, FALLBACK_TEXT);
    }
}
