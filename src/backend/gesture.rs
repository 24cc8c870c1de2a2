use serde::{Deserialize, Serialize};

use super::error::Result;
use super::model::Page;
use super::page_store::PageStore;
use super::playback::PlaybackController;

pub const DEFAULT_SWIPE_THRESHOLD: f32 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingDirection {
    /// Mushaf order: the next page lies to the left, reached by dragging
    /// rightward.
    #[default]
    Rtl,
    Ltr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavDirection {
    Advance,
    Retreat,
}

/// A drag from `start` to `end` in logical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Swipe {
    pub start: (f32, f32),
    pub end: (f32, f32),
}

impl Swipe {
    pub fn new(start: (f32, f32), end: (f32, f32)) -> Self {
        Self { start, end }
    }

    pub fn dx(&self) -> f32 {
        self.end.0 - self.start.0
    }

    pub fn dy(&self) -> f32 {
        self.end.1 - self.start.1
    }
}

/// Turns swipes into page changes. Independent of playback except that
/// landing on another page always stops it.
pub struct GestureNavigator {
    direction: ReadingDirection,
    threshold: f32,
    current: u32,
}

impl GestureNavigator {
    pub fn new(direction: ReadingDirection, threshold: f32, current: u32) -> Self {
        Self {
            direction,
            threshold,
            current,
        }
    }

    pub fn current_page(&self) -> u32 {
        self.current
    }

    /// Keeps the navigator in step with pages reached some other way, e.g.
    /// playback continuing onto the next page.
    pub fn sync_page(&mut self, page: u32) {
        self.current = page;
    }

    /// `None` for taps and mostly-vertical drags.
    pub fn classify(&self, swipe: &Swipe) -> Option<NavDirection> {
        let dx = swipe.dx();
        if dx.abs() < self.threshold || dx.abs() <= swipe.dy().abs() {
            return None;
        }
        let rightward = dx > 0.0;
        let advance = match self.direction {
            ReadingDirection::Rtl => rightward,
            ReadingDirection::Ltr => !rightward,
        };
        Some(if advance {
            NavDirection::Advance
        } else {
            NavDirection::Retreat
        })
    }

    /// Page one step in `direction` leads to. `None` at the ends.
    pub fn target(&self, direction: NavDirection, pages: &PageStore) -> Option<u32> {
        match direction {
            NavDirection::Advance if pages.has_next(self.current) => Some(self.current + 1),
            NavDirection::Retreat if pages.has_previous(self.current) => Some(self.current - 1),
            _ => None,
        }
    }

    pub async fn handle_swipe(
        &mut self,
        swipe: &Swipe,
        pages: &PageStore,
        controller: &mut PlaybackController,
    ) -> Result<Option<Page>> {
        match self.classify(swipe) {
            Some(direction) => self.step(direction, pages, controller).await,
            None => Ok(None),
        }
    }

    /// Moves one page. `Ok(None)` at the ends of the document, where no
    /// load is attempted.
    pub async fn step(
        &mut self,
        direction: NavDirection,
        pages: &PageStore,
        controller: &mut PlaybackController,
    ) -> Result<Option<Page>> {
        match self.target(direction, pages) {
            Some(target) => self.jump_to(target, pages, controller).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn jump_to(
        &mut self,
        target: u32,
        pages: &PageStore,
        controller: &mut PlaybackController,
    ) -> Result<Page> {
        let page = pages.load(target).await?;
        self.arrive(page.clone(), controller);
        Ok(page)
    }

    /// Lands on a page that was loaded elsewhere (section list, bookmark).
    pub fn arrive(&mut self, page: Page, controller: &mut PlaybackController) {
        log::debug!("navigated from page {} to page {}", self.current, page.number);
        self.current = page.number;
        controller.stop();
        controller.show_page(page);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::error::Error;
    use crate::backend::model::UnitId;
    use crate::backend::playback::PlaybackStatus;
    use crate::backend::testing::{FakeContent, Harness};

    fn swipe_dx(dx: f32) -> Swipe {
        Swipe::new((200.0, 100.0), (200.0 + dx, 104.0))
    }

    #[test]
    fn test_short_swipe_is_a_tap() {
        let nav = GestureNavigator::new(ReadingDirection::Rtl, 50.0, 3);
        assert_eq!(nav.classify(&swipe_dx(10.0)), None);
        assert_eq!(nav.classify(&swipe_dx(-49.0)), None);
    }

    #[test]
    fn test_vertical_drag_is_ignored() {
        let nav = GestureNavigator::new(ReadingDirection::Rtl, 50.0, 3);
        let swipe = Swipe::new((0.0, 0.0), (60.0, 200.0));
        assert_eq!(nav.classify(&swipe), None);
    }

    #[test]
    fn test_direction_flag_flips_mapping() {
        let rtl = GestureNavigator::new(ReadingDirection::Rtl, 50.0, 3);
        let ltr = GestureNavigator::new(ReadingDirection::Ltr, 50.0, 3);

        assert_eq!(rtl.classify(&swipe_dx(80.0)), Some(NavDirection::Advance));
        assert_eq!(rtl.classify(&swipe_dx(-80.0)), Some(NavDirection::Retreat));
        assert_eq!(ltr.classify(&swipe_dx(80.0)), Some(NavDirection::Retreat));
        assert_eq!(ltr.classify(&swipe_dx(-80.0)), Some(NavDirection::Advance));
    }

    #[tokio::test]
    async fn test_target_is_clamped_to_document() {
        let h = Harness::new(FakeContent::sequential(10, 2), false);
        let first = GestureNavigator::new(ReadingDirection::Rtl, 50.0, 1);
        let last = GestureNavigator::new(ReadingDirection::Rtl, 50.0, 10);

        assert_eq!(first.target(NavDirection::Retreat, &h.pages), None);
        assert_eq!(first.target(NavDirection::Advance, &h.pages), Some(2));
        assert_eq!(last.target(NavDirection::Advance, &h.pages), None);
        assert_eq!(last.target(NavDirection::Retreat, &h.pages), Some(9));
    }

    #[tokio::test]
    async fn test_tap_makes_no_navigation_call() {
        let mut h = Harness::new(FakeContent::sequential(10, 2), false);
        let mut nav = GestureNavigator::new(ReadingDirection::Rtl, 50.0, 3);

        let result = nav
            .handle_swipe(&swipe_dx(10.0), &h.pages, &mut h.controller)
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(h.content.page_requests(), 0);
        assert_eq!(nav.current_page(), 3);
    }

    #[tokio::test]
    async fn test_swipe_loads_page_and_stops_playback() {
        let mut h = Harness::new(FakeContent::sequential(10, 2), false);
        h.show(3).await;
        h.controller.play(UnitId(5)).unwrap();
        h.run().await;
        assert_eq!(h.controller.status(), PlaybackStatus::Playing);

        let mut nav = GestureNavigator::new(ReadingDirection::Rtl, 50.0, 3);
        let page = nav
            .handle_swipe(&swipe_dx(120.0), &h.pages, &mut h.controller)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(page.number, 4);
        assert_eq!(nav.current_page(), 4);
        let snapshot = h.controller.snapshot();
        assert_eq!(snapshot.status, PlaybackStatus::Idle);
        assert_eq!(snapshot.page, Some(4));
    }

    #[tokio::test]
    async fn test_edges_are_clamped_without_loading() {
        let mut h = Harness::new(FakeContent::sequential(10, 2), false);

        let mut first = GestureNavigator::new(ReadingDirection::Rtl, 50.0, 1);
        let mut last = GestureNavigator::new(ReadingDirection::Rtl, 50.0, 10);
        assert!(first
            .step(NavDirection::Retreat, &h.pages, &mut h.controller)
            .await
            .unwrap()
            .is_none());
        assert!(last
            .step(NavDirection::Advance, &h.pages, &mut h.controller)
            .await
            .unwrap()
            .is_none());
        assert_eq!(h.content.page_requests(), 0);
    }

    #[tokio::test]
    async fn test_failed_load_keeps_current_page() {
        let mut h = Harness::new(FakeContent::sequential(10, 2), false);
        h.content.fail_page(6);
        let mut nav = GestureNavigator::new(ReadingDirection::Ltr, 50.0, 5);

        let result = nav
            .handle_swipe(&swipe_dx(-100.0), &h.pages, &mut h.controller)
            .await;

        assert!(matches!(result, Err(Error::Fetch(_))));
        assert_eq!(nav.current_page(), 5);
    }
}
