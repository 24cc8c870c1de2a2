//! Playback state machine.
//!
//! The controller owns the session. Every request that can be superseded
//! (play, narrator switch, stop, automatic continuation) takes a fresh
//! token; background fetches and output completions report back with the
//! token they were started under and anything older than the current token
//! is dropped without touching state.
//!
//! Driving it looks like:
//!
//! ```ignore
//! let (mut controller, mut events) = PlaybackController::new(pages, assets, output, narrator);
//! controller.show_page(page);
//! controller.play(unit)?;
//! while let Some(event) = events.recv().await {
//!     if let Err(e) = controller.handle(event) {
//!         // surface to the player UI
//!     }
//! }
//! ```

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::audio::{AudioAsset, AudioAssets, AudioOutput, Completion};
use super::error::{Error, Result};
use super::model::{Narrator, Page, TOTAL_UNITS, UnitId};
use super::page_store::PageStore;
use super::preload::PreloadBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    /// Ran past the last unit of the document.
    Ended,
}

/// Read-only view of the session published to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    pub status: PlaybackStatus,
    pub current: Option<UnitId>,
    pub page: Option<u32>,
    pub narrator: Narrator,
}

#[derive(Debug)]
pub enum ControllerEvent {
    AssetReady { token: u64, asset: AudioAsset },
    AssetFailed { token: u64, error: Error },
    PageReady { token: u64, page: Page },
    PageFailed { token: u64, error: Error },
    UnitComplete { token: u64 },
    OutputFailed { token: u64, error: Error },
}

impl ControllerEvent {
    pub fn token(&self) -> u64 {
        match self {
            ControllerEvent::AssetReady { token, .. }
            | ControllerEvent::AssetFailed { token, .. }
            | ControllerEvent::PageReady { token, .. }
            | ControllerEvent::PageFailed { token, .. }
            | ControllerEvent::UnitComplete { token }
            | ControllerEvent::OutputFailed { token, .. } => *token,
        }
    }
}

/// Receiving end of the controller's background work.
pub struct ControllerEvents {
    rx: mpsc::UnboundedReceiver<ControllerEvent>,
}

impl ControllerEvents {
    pub async fn recv(&mut self) -> Option<ControllerEvent> {
        self.rx.recv().await
    }
}

/// What follows `current` once it finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    Unit(UnitId),
    Page(u32),
    End,
}

pub fn next_step(page: &Page, current: UnitId, last_page: u32) -> Continuation {
    if let Some(next) = page.next_after(current) {
        return Continuation::Unit(next.id);
    }
    if page.number < last_page {
        Continuation::Page(page.number + 1)
    } else {
        Continuation::End
    }
}

struct PlaybackSession {
    current: Option<UnitId>,
    narrator: Narrator,
    status: PlaybackStatus,
    page: Option<u32>,
    /// Narrator of the asset loaded in the output, if any.
    loaded_narrator: Option<Narrator>,
}

pub struct PlaybackController {
    pages: PageStore,
    assets: AudioAssets,
    preload: PreloadBuffer,
    output: Box<dyn AudioOutput>,
    session: PlaybackSession,
    shown: Option<Page>,
    /// Asset that arrived while paused mid-continuation.
    parked: Option<AudioAsset>,
    token: u64,
    in_flight: Option<JoinHandle<()>>,
    events: mpsc::UnboundedSender<ControllerEvent>,
    snapshot: watch::Sender<PlaybackSnapshot>,
}

impl PlaybackController {
    pub fn new(
        pages: PageStore,
        assets: AudioAssets,
        output: Box<dyn AudioOutput>,
        narrator: Narrator,
    ) -> (Self, ControllerEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = PlaybackSession {
            current: None,
            narrator,
            status: PlaybackStatus::Idle,
            page: None,
            loaded_narrator: None,
        };
        let (snapshot, _) = watch::channel(PlaybackSnapshot {
            status: session.status,
            current: None,
            page: None,
            narrator,
        });

        let controller = Self {
            pages,
            preload: PreloadBuffer::new(assets.clone()),
            assets,
            output,
            session,
            shown: None,
            parked: None,
            token: 0,
            in_flight: None,
            events: tx,
            snapshot,
        };
        (controller, ControllerEvents { rx })
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            status: self.session.status,
            current: self.session.current,
            page: self.session.page,
            narrator: self.session.narrator,
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        self.session.status
    }

    pub fn narrator(&self) -> Narrator {
        self.session.narrator
    }

    /// The page playback is bound to. Follows automatic continuation onto
    /// the next page.
    pub fn page(&self) -> Option<&Page> {
        self.shown.as_ref()
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.snapshot());
    }

    fn begin_request(&mut self) -> u64 {
        self.token += 1;
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
        self.parked = None;
        self.token
    }

    /// Binds the controller to the page the user is looking at. Showing a
    /// different page than the one playing stops playback.
    pub fn show_page(&mut self, page: Page) {
        let moved = self.session.page.is_some_and(|p| p != page.number);
        if moved && self.session.status != PlaybackStatus::Idle {
            log::info!("left page {:?} for page {}, stopping", self.session.page, page.number);
            self.stop();
        }
        self.session.page = Some(page.number);
        self.shown = Some(page);
        self.publish();
    }

    pub fn play(&mut self, unit: UnitId) -> Result<()> {
        let page_number = match self.shown.as_ref() {
            Some(page) if page.contains(unit) => page.number,
            _ => {
                return Err(Error::OutOfRange {
                    what: "unit",
                    value: unit.0,
                    max: TOTAL_UNITS,
                });
            }
        };

        let token = self.begin_request();
        self.output.stop();
        self.session.current = Some(unit);
        self.session.status = PlaybackStatus::Loading;
        self.session.page = Some(page_number);
        self.session.loaded_narrator = None;
        log::info!(
            "play unit {} on page {} ({})",
            unit,
            page_number,
            self.session.narrator.slug()
        );
        self.fetch_asset(token, unit);
        self.publish();
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.session.status != PlaybackStatus::Playing {
            return;
        }
        self.output.pause();
        self.session.status = PlaybackStatus::Paused;
        self.publish();
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.session.status != PlaybackStatus::Paused {
            return Ok(());
        }

        if let Some(asset) = self.parked.take() {
            if asset.narrator == self.session.narrator {
                self.start_asset(asset);
                return Ok(());
            }
        }

        if self.session.loaded_narrator == Some(self.session.narrator) {
            self.output.resume();
            self.session.status = PlaybackStatus::Playing;
            self.publish();
            return Ok(());
        }

        match self.session.current {
            Some(unit) => self.play(unit),
            None => Ok(()),
        }
    }

    /// The single play/pause button.
    pub fn toggle(&mut self) -> Result<()> {
        match self.session.status {
            PlaybackStatus::Playing => {
                self.pause();
                Ok(())
            }
            PlaybackStatus::Paused => self.resume(),
            PlaybackStatus::Loading => Ok(()),
            PlaybackStatus::Idle | PlaybackStatus::Ended => {
                match self.shown.as_ref().and_then(|p| p.first()).map(|u| u.id) {
                    Some(first) => self.play(first),
                    None => Ok(()),
                }
            }
        }
    }

    /// Changes narrator. A unit that is playing or loading restarts from
    /// its beginning under the new narrator; the current unit is kept.
    pub fn switch_narrator(&mut self, narrator: Narrator) -> Result<()> {
        if narrator == self.session.narrator {
            return Ok(());
        }
        log::info!(
            "narrator {} -> {}",
            self.session.narrator.slug(),
            narrator.slug()
        );
        self.session.narrator = narrator;

        match (self.session.status, self.session.current) {
            (PlaybackStatus::Playing | PlaybackStatus::Loading, Some(unit)) => self.play(unit),
            _ => {
                self.publish();
                Ok(())
            }
        }
    }

    pub fn stop(&mut self) {
        self.begin_request();
        self.output.stop();
        self.preload.cancel();
        self.session.status = PlaybackStatus::Idle;
        self.session.current = None;
        self.session.loaded_narrator = None;
        self.publish();
    }

    fn ensure_current(&self, token: u64) -> Result<()> {
        if token == self.token {
            Ok(())
        } else {
            Err(Error::Cancelled)
        }
    }

    /// Applies one background result. Stale events are dropped and return
    /// `Ok`. Errors leave the controller idle.
    pub fn handle(&mut self, event: ControllerEvent) -> Result<()> {
        // a superseded request is cancelled, never an error for the caller
        if let Err(e) = self.ensure_current(event.token()) {
            log::debug!("dropping event: {} (token {} < {})", e, event.token(), self.token);
            return Ok(());
        }

        match event {
            ControllerEvent::AssetReady { asset, .. } => {
                self.in_flight = None;
                self.on_asset_ready(asset);
                Ok(())
            }
            ControllerEvent::AssetFailed { error, .. } => {
                self.in_flight = None;
                let unit = self.session.current;
                self.reset_after_error();
                let message = match unit {
                    Some(unit) => format!("could not load audio for unit {}: {}", unit, error),
                    None => error.to_string(),
                };
                Err(Error::Playback(message))
            }
            ControllerEvent::OutputFailed { error, .. } => {
                self.reset_after_error();
                Err(error)
            }
            ControllerEvent::UnitComplete { .. } => {
                self.on_unit_complete();
                Ok(())
            }
            ControllerEvent::PageReady { page, .. } => {
                self.in_flight = None;
                self.on_page_ready(page);
                Ok(())
            }
            ControllerEvent::PageFailed { error, .. } => {
                self.in_flight = None;
                self.reset_after_error();
                Err(error)
            }
        }
    }

    fn on_asset_ready(&mut self, asset: AudioAsset) {
        match self.session.status {
            PlaybackStatus::Loading | PlaybackStatus::Playing => self.start_asset(asset),
            PlaybackStatus::Paused => self.parked = Some(asset),
            PlaybackStatus::Idle | PlaybackStatus::Ended => {}
        }
    }

    fn start_asset(&mut self, asset: AudioAsset) {
        self.output
            .start(&asset, Completion::new(self.token, self.events.clone()));
        self.session.status = PlaybackStatus::Playing;
        self.session.loaded_narrator = Some(asset.narrator);
        self.warm_next(asset.unit);
        self.publish();
    }

    fn warm_next(&mut self, unit: UnitId) {
        let Some(page) = self.shown.as_ref() else {
            return;
        };
        let next = match next_step(page, unit, self.pages.last_page()) {
            Continuation::Unit(next) => Some(next),
            Continuation::Page(number) => {
                self.pages.prefetch(number);
                // ids run on across pages, so the next page opens with the successor
                unit.successor()
            }
            Continuation::End => None,
        };
        if let Some(next) = next {
            self.preload.warm(next, self.session.narrator);
        }
    }

    fn on_unit_complete(&mut self) {
        if self.session.status != PlaybackStatus::Playing {
            return;
        }
        let (Some(page), Some(current)) = (self.shown.as_ref(), self.session.current) else {
            return;
        };

        match next_step(page, current, self.pages.last_page()) {
            Continuation::Unit(next) => {
                let token = self.begin_request();
                self.session.current = Some(next);
                self.session.loaded_narrator = None;
                self.fetch_asset(token, next);
                self.publish();
            }
            Continuation::Page(number) => {
                log::info!("page {} finished, continuing on page {}", page.number, number);
                let token = self.begin_request();
                self.fetch_page(token, number);
            }
            Continuation::End => {
                log::info!("reached the end of the document");
                self.begin_request();
                self.output.stop();
                self.session.status = PlaybackStatus::Ended;
                self.session.current = None;
                self.session.loaded_narrator = None;
                self.publish();
            }
        }
    }

    fn on_page_ready(&mut self, page: Page) {
        if !matches!(
            self.session.status,
            PlaybackStatus::Playing | PlaybackStatus::Paused
        ) {
            return;
        }
        let Some(first) = page.first().map(|u| u.id) else {
            log::warn!("page {} has no units, ending playback", page.number);
            self.session.status = PlaybackStatus::Ended;
            self.session.current = None;
            self.publish();
            return;
        };

        self.session.page = Some(page.number);
        self.session.current = Some(first);
        self.session.loaded_narrator = None;
        self.shown = Some(page);
        self.fetch_asset(self.token, first);
        self.publish();
    }

    fn reset_after_error(&mut self) {
        self.output.stop();
        self.preload.cancel();
        self.parked = None;
        self.session.status = PlaybackStatus::Idle;
        self.session.current = None;
        self.session.loaded_narrator = None;
        self.publish();
    }

    fn fetch_asset(&mut self, token: u64, unit: UnitId) {
        let assets = self.assets.clone();
        let narrator = self.session.narrator;
        let tx = self.events.clone();
        self.in_flight = Some(tokio::spawn(async move {
            let event = match assets.fetch(narrator, unit).await {
                Ok(asset) => ControllerEvent::AssetReady { token, asset },
                Err(error) => ControllerEvent::AssetFailed { token, error },
            };
            let _ = tx.send(event);
        }));
    }

    fn fetch_page(&mut self, token: u64, number: u32) {
        let pages = self.pages.clone();
        let tx = self.events.clone();
        self.in_flight = Some(tokio::spawn(async move {
            let event = match pages.load(number).await {
                Ok(page) => ControllerEvent::PageReady { token, page },
                Err(error) => ControllerEvent::PageFailed { token, error },
            };
            let _ = tx.send(event);
        }));
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
        self.output.stop();
    }
}
