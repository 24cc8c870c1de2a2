//! In-process stand-ins for the remote sources and the audio device.

use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::annotation::AnnotationSource;
use super::audio::{AudioAsset, AudioAssets, AudioOutput, AudioSource, AudioUrlTemplate, Completion};
use super::cache::AssetCache;
use super::error::{Error, Result};
use super::model::{ContentUnit, Narrator, Page, Section, SectionSummary, UnitId};
use super::page_store::{ContentSource, PageStore};
use super::playback::{ControllerEvents, PlaybackController, PlaybackSnapshot};

pub struct FakeContent {
    pages: Vec<Vec<u32>>,
    state: Mutex<FakeContentState>,
}

#[derive(Default)]
struct FakeContentState {
    failing_pages: HashSet<u32>,
    section_starts: HashMap<u32, u32>,
    annotations: HashMap<UnitId, String>,
    page_requests: usize,
}

impl FakeContent {
    /// `pages` pages of `per_page` consecutive units each.
    pub fn sequential(pages: u32, per_page: u32) -> Self {
        Self::from_pages(
            (0..pages)
                .map(|p| (p * per_page + 1..=p * per_page + per_page).collect())
                .collect(),
        )
    }

    pub fn from_pages(pages: Vec<Vec<u32>>) -> Self {
        Self {
            pages,
            state: Mutex::new(FakeContentState::default()),
        }
    }

    pub fn last_page(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Page `number` as the source serves it. Each page is its own section.
    pub fn page(&self, number: u32) -> Page {
        let ids = &self.pages[(number - 1) as usize];
        Page {
            number,
            units: ids
                .iter()
                .enumerate()
                .map(|(i, id)| ContentUnit {
                    id: UnitId(*id),
                    ordinal: i as u32 + 1,
                    section: Section {
                        id: number,
                        name: format!("سورة {}", number),
                        english_name: format!("Section {}", number),
                        revelation_type: "Meccan".to_string(),
                    },
                    page: number,
                    juz: 1,
                    text: format!("unit {}", id),
                })
                .collect(),
        }
    }

    pub fn fail_page(&self, number: u32) {
        self.state.lock().unwrap().failing_pages.insert(number);
    }

    pub fn set_section_start(&self, section: u32, page: u32) {
        self.state.lock().unwrap().section_starts.insert(section, page);
    }

    pub fn set_annotation(&self, unit: UnitId, text: &str) {
        self.state
            .lock()
            .unwrap()
            .annotations
            .insert(unit, text.to_string());
    }

    pub fn page_requests(&self) -> usize {
        self.state.lock().unwrap().page_requests
    }
}

impl ContentSource for FakeContent {
    fn fetch_page(&self, number: u32) -> BoxFuture<'_, Result<Page>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            {
                let mut state = self.state.lock().unwrap();
                state.page_requests += 1;
                if state.failing_pages.contains(&number) {
                    return Err(Error::Fetch(format!("page {} unavailable", number)));
                }
            }
            if number == 0 || number > self.last_page() {
                return Err(Error::Fetch(format!("no page {}", number)));
            }
            Ok(self.page(number))
        })
    }

    fn fetch_section_start(&self, section: u32) -> BoxFuture<'_, Result<u32>> {
        Box::pin(async move {
            let start = self.state.lock().unwrap().section_starts.get(&section).copied();
            Ok(start.unwrap_or(section))
        })
    }

    fn fetch_sections(&self) -> BoxFuture<'_, Result<Vec<SectionSummary>>> {
        Box::pin(async move {
            Ok((1..=self.last_page())
                .map(|n| SectionSummary {
                    id: n,
                    name: format!("سورة {}", n),
                    english_name: format!("Section {}", n),
                    translation: String::new(),
                    unit_count: self.pages[(n - 1) as usize].len() as u32,
                    revelation_type: "Meccan".to_string(),
                })
                .collect())
        })
    }
}

impl AnnotationSource for FakeContent {
    fn fetch_annotation(&self, unit: UnitId) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            self.state
                .lock()
                .unwrap()
                .annotations
                .get(&unit)
                .cloned()
                .ok_or_else(|| Error::Fetch(format!("no tafsir for {}", unit)))
        })
    }
}

#[derive(Default)]
pub struct FakeAudio {
    state: Mutex<FakeAudioState>,
}

#[derive(Default)]
struct FakeAudioState {
    failing: HashSet<UnitId>,
    requests: Vec<String>,
}

impl FakeAudio {
    pub fn fail_unit(&self, unit: UnitId) {
        self.state.lock().unwrap().failing.insert(unit);
    }

    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }
}

impl AudioSource for FakeAudio {
    fn fetch_asset<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            let mut state = self.state.lock().unwrap();
            state.requests.push(url.to_string());
            let failing = state
                .failing
                .iter()
                .any(|u| url.ends_with(&format!("/{}.mp3", u)));
            if failing {
                return Err(Error::Fetch(format!("404 for {}", url)));
            }
            Ok(url.as_bytes().to_vec())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputCall {
    Start(String),
    Pause,
    Resume,
    Stop,
}

/// Shared view into a [`RecordingOutput`] after it moved into a controller.
#[derive(Clone, Default)]
pub struct OutputProbe {
    inner: Arc<Mutex<ProbeState>>,
}

#[derive(Default)]
struct ProbeState {
    calls: Vec<OutputCall>,
    current: Option<Completion>,
}

impl OutputProbe {
    pub fn calls(&self) -> Vec<OutputCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn started(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                OutputCall::Start(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    /// Reports the most recently started asset as finished.
    pub fn finish_current(&self) -> bool {
        match self.inner.lock().unwrap().current.as_ref() {
            Some(done) => {
                done.finish();
                true
            }
            None => false,
        }
    }
}

pub struct RecordingOutput {
    probe: OutputProbe,
    auto_finish: bool,
}

impl RecordingOutput {
    pub fn new(auto_finish: bool) -> (Self, OutputProbe) {
        let probe = OutputProbe::default();
        (
            Self {
                probe: probe.clone(),
                auto_finish,
            },
            probe,
        )
    }

    fn record(&self, call: OutputCall) {
        self.probe.inner.lock().unwrap().calls.push(call);
    }
}

impl AudioOutput for RecordingOutput {
    fn start(&mut self, asset: &AudioAsset, done: Completion) {
        self.record(OutputCall::Start(asset.url.clone()));
        if self.auto_finish {
            done.finish();
        }
        self.probe.inner.lock().unwrap().current = Some(done);
    }

    fn pause(&mut self) {
        self.record(OutputCall::Pause);
    }

    fn resume(&mut self) {
        self.record(OutputCall::Resume);
    }

    fn stop(&mut self) {
        self.record(OutputCall::Stop);
    }
}

/// Everything the controller tests need, wired together.
pub struct Harness {
    pub controller: PlaybackController,
    pub events: ControllerEvents,
    pub pages: PageStore,
    pub content: Arc<FakeContent>,
    pub audio: Arc<FakeAudio>,
    pub probe: OutputProbe,
}

#[derive(Default)]
pub struct Trace {
    pub snapshots: Vec<PlaybackSnapshot>,
    pub errors: Vec<Error>,
}

impl Trace {
    /// Distinct current units in the order they were observed.
    pub fn units(&self) -> Vec<UnitId> {
        let mut units: Vec<UnitId> = Vec::new();
        for unit in self.snapshots.iter().filter_map(|s| s.current) {
            if units.last() != Some(&unit) {
                units.push(unit);
            }
        }
        units
    }
}

impl Harness {
    pub fn new(content: FakeContent, auto_finish: bool) -> Self {
        let content = Arc::new(content);
        let audio = Arc::new(FakeAudio::default());
        let pages = PageStore::new(content.clone(), content.last_page(), 4);
        let assets = AudioAssets::new(audio.clone(), AssetCache::in_memory(), AudioUrlTemplate::default());
        let (output, probe) = RecordingOutput::new(auto_finish);
        let (controller, events) =
            PlaybackController::new(pages.clone(), assets, Box::new(output), Narrator::Alafasy);

        Self {
            controller,
            events,
            pages,
            content,
            audio,
            probe,
        }
    }

    pub async fn show(&mut self, page: u32) {
        let page = self.pages.load(page).await.unwrap();
        self.controller.show_page(page);
    }

    /// Feeds controller events until none arrives for a while.
    pub async fn run(&mut self) -> Trace {
        let mut trace = Trace::default();
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(100), self.events.recv()).await
        {
            if let Err(e) = self.controller.handle(event) {
                trace.errors.push(e);
            }
            trace.snapshots.push(self.controller.snapshot());
        }
        trace
    }
}
