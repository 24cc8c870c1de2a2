use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::error::{Error, Result};
use super::model::{Page, SectionSummary, TOTAL_SECTIONS};

pub const DEFAULT_CACHED_PAGES: usize = 8;

/// Remote source of page content and section metadata.
pub trait ContentSource: Send + Sync {
    fn fetch_page(&self, number: u32) -> BoxFuture<'_, Result<Page>>;

    /// First page on which `section` appears.
    fn fetch_section_start(&self, section: u32) -> BoxFuture<'_, Result<u32>>;

    fn fetch_sections(&self) -> BoxFuture<'_, Result<Vec<SectionSummary>>>;
}

/// Loads pages by number and keeps a few of the most recent ones around.
///
/// The cache never changes what `load` returns, it only saves the round
/// trip. Nothing retries: a failed fetch goes straight back to the caller.
#[derive(Clone)]
pub struct PageStore {
    source: Arc<dyn ContentSource>,
    last_page: u32,
    inner: Arc<RwLock<PageStoreInner>>,
}

struct PageStoreInner {
    pages: HashMap<u32, Page>,
    access_order: Vec<u32>,
    capacity: usize,
}

impl PageStore {
    pub fn new(source: Arc<dyn ContentSource>, last_page: u32, capacity: usize) -> Self {
        Self {
            source,
            last_page,
            inner: Arc::new(RwLock::new(PageStoreInner {
                pages: HashMap::new(),
                access_order: Vec::new(),
                capacity,
            })),
        }
    }

    pub fn bounds(&self) -> (u32, u32) {
        (1, self.last_page)
    }

    pub fn last_page(&self) -> u32 {
        self.last_page
    }

    pub fn has_next(&self, page: u32) -> bool {
        page < self.last_page
    }

    pub fn has_previous(&self, page: u32) -> bool {
        page > 1
    }

    fn check_range(&self, page: u32) -> Result<()> {
        if page < 1 || page > self.last_page {
            return Err(Error::OutOfRange {
                what: "page",
                value: page,
                max: self.last_page,
            });
        }
        Ok(())
    }

    pub async fn load(&self, page: u32) -> Result<Page> {
        self.check_range(page)?;

        if let Some(cached) = self.inner.write().await.get(page) {
            log::debug!("page {} served from cache", page);
            return Ok(cached);
        }

        let loaded = self.source.fetch_page(page).await?;
        if loaded.number != page {
            return Err(Error::Fetch(format!(
                "asked for page {} but got page {}",
                page, loaded.number
            )));
        }
        self.inner.write().await.insert(loaded.clone());
        log::info!("loaded page {} ({} units)", page, loaded.units.len());
        Ok(loaded)
    }

    pub async fn load_start_page_for_section(&self, section: u32) -> Result<Page> {
        if section < 1 || section > TOTAL_SECTIONS {
            return Err(Error::OutOfRange {
                what: "section",
                value: section,
                max: TOTAL_SECTIONS,
            });
        }
        let start = self.source.fetch_section_start(section).await?;
        self.load(start).await
    }

    pub async fn sections(&self) -> Result<Vec<SectionSummary>> {
        self.source.fetch_sections().await
    }

    /// Warms the cache for `page` in the background. Out-of-range pages and
    /// failures are dropped.
    pub fn prefetch(&self, page: u32) {
        if self.check_range(page).is_err() {
            return;
        }
        let store = self.clone();
        tokio::spawn(async move {
            if let Err(e) = store.load(page).await {
                log::warn!("prefetch of page {} failed: {}", page, e);
            }
        });
    }

    pub async fn is_cached(&self, page: u32) -> bool {
        self.inner.read().await.pages.contains_key(&page)
    }
}

impl PageStoreInner {
    fn get(&mut self, page: u32) -> Option<Page> {
        let found = self.pages.get(&page).cloned()?;
        self.access_order.retain(|p| *p != page);
        self.access_order.push(page);
        Some(found)
    }

    fn insert(&mut self, page: Page) {
        if self.capacity == 0 {
            return;
        }
        if self.pages.len() >= self.capacity && !self.pages.contains_key(&page.number) {
            if let Some(oldest) = self.access_order.first().copied() {
                self.pages.remove(&oldest);
                self.access_order.remove(0);
            }
        }

        self.access_order.retain(|p| *p != page.number);
        self.access_order.push(page.number);
        self.pages.insert(page.number, page);
    }
}
