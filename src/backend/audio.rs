//! Narration assets: URL construction, fetching through the cache, and the
//! output seam the controller plays them on.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::cache::AssetCache;
use super::error::{Error, Result};
use super::model::{Narrator, UnitId};
use super::playback::ControllerEvent;

pub const DEFAULT_AUDIO_BASE: &str = "https://cdn.islamic.network/quran/audio";
pub const DEFAULT_BITRATE: u32 = 128;

/// Byte source for narration files.
pub trait AudioSource: Send + Sync {
    fn fetch_asset<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>>>;
}

/// `{base}/{bitrate}/{narrator}/{unit}.mp3`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioUrlTemplate {
    base: String,
    bitrate: u32,
}

impl AudioUrlTemplate {
    pub fn new(base: impl Into<String>, bitrate: u32) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            bitrate,
        }
    }

    pub fn bitrate(&self) -> u32 {
        self.bitrate
    }

    pub fn url(&self, narrator: Narrator, unit: UnitId) -> String {
        format!("{}/{}/{}/{}.mp3", self.base, self.bitrate, narrator.slug(), unit)
    }
}

impl Default for AudioUrlTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIO_BASE, DEFAULT_BITRATE)
    }
}

#[derive(Debug, Clone)]
pub struct AudioAsset {
    pub unit: UnitId,
    pub narrator: Narrator,
    pub url: String,
    pub data: Arc<[u8]>,
}

/// Resolves (narrator, unit) to asset bytes, cache first.
///
/// Concurrent fetches of the same URL share one download: later callers
/// wait for the first and then read its result from the cache.
#[derive(Clone)]
pub struct AudioAssets {
    source: Arc<dyn AudioSource>,
    cache: AssetCache,
    urls: AudioUrlTemplate,
    in_flight: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl AudioAssets {
    pub fn new(source: Arc<dyn AudioSource>, cache: AssetCache, urls: AudioUrlTemplate) -> Self {
        Self {
            source,
            cache,
            urls,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn url(&self, narrator: Narrator, unit: UnitId) -> String {
        self.urls.url(narrator, unit)
    }

    pub async fn is_cached(&self, narrator: Narrator, unit: UnitId) -> bool {
        self.cache.contains(&self.url(narrator, unit)).await
    }

    pub async fn fetch(&self, narrator: Narrator, unit: UnitId) -> Result<AudioAsset> {
        let url = self.url(narrator, unit);

        let data = match self.cache.get(&url).await {
            Some(data) => data,
            None => {
                let gate = self.in_flight.lock().await.entry(url.clone()).or_default().clone();
                let result = {
                    let _turn = gate.lock().await;
                    self.download(&url).await
                };
                let mut in_flight = self.in_flight.lock().await;
                // the map's copy and ours: nobody else is waiting
                if Arc::strong_count(&gate) <= 2 {
                    in_flight.remove(&url);
                }
                result?
            }
        };

        Ok(AudioAsset {
            unit,
            narrator,
            url,
            data,
        })
    }

    /// Must run with the URL's gate held. Rechecks the cache, since the
    /// previous holder may have just filled it.
    async fn download(&self, url: &str) -> Result<Arc<[u8]>> {
        if let Some(data) = self.cache.get(url).await {
            return Ok(data);
        }
        let bytes = self.source.fetch_asset(url).await?;
        if bytes.is_empty() {
            return Err(Error::Fetch(format!("empty audio from {}", url)));
        }
        let data: Arc<[u8]> = Arc::from(bytes);
        self.cache.insert(url.to_string(), data.clone()).await;
        Ok(data)
    }
}

/// Handed to an [`AudioOutput`] with each asset; reports back to the
/// controller under the token of the request that started it.
#[derive(Debug, Clone)]
pub struct Completion {
    token: u64,
    tx: mpsc::UnboundedSender<ControllerEvent>,
}

impl Completion {
    pub(crate) fn new(token: u64, tx: mpsc::UnboundedSender<ControllerEvent>) -> Self {
        Self { token, tx }
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    /// The asset played to its end.
    pub fn finish(&self) {
        let _ = self.tx.send(ControllerEvent::UnitComplete { token: self.token });
    }

    /// The asset could not be decoded or played.
    pub fn fail(&self, message: impl Into<String>) {
        let _ = self.tx.send(ControllerEvent::OutputFailed {
            token: self.token,
            error: Error::Playback(message.into()),
        });
    }
}

/// Where decoded audio goes. Implementations must not block; completion is
/// reported through the [`Completion`] given to `start`.
pub trait AudioOutput: Send {
    /// Replaces whatever is playing with `asset`, from its beginning.
    fn start(&mut self, asset: &AudioAsset, done: Completion);
    fn pause(&mut self);
    /// Continues from the position `pause` left off at.
    fn resume(&mut self);
    fn stop(&mut self);
}

/// Output that produces no sound and "plays" each asset for as long as it
/// would last at the configured constant bitrate. Keeps the shell usable on
/// machines without an audio device and gives pause/resume real positions.
pub struct ClockOutput {
    bytes_per_sec: u64,
    running: Option<Running>,
}

struct Running {
    remaining: Duration,
    started: Option<Instant>,
    task: Option<JoinHandle<()>>,
    done: Completion,
}

impl ClockOutput {
    pub fn new(bitrate_kbps: u32) -> Self {
        Self {
            bytes_per_sec: u64::from(bitrate_kbps.max(1)) * 1000 / 8,
            running: None,
        }
    }

    pub fn duration_of(&self, bytes: usize) -> Duration {
        Duration::from_millis(bytes as u64 * 1000 / self.bytes_per_sec)
    }

    fn spawn_timer(remaining: Duration, done: Completion) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            done.finish();
        })
    }
}

impl AudioOutput for ClockOutput {
    fn start(&mut self, asset: &AudioAsset, done: Completion) {
        self.stop();
        if asset.data.is_empty() {
            done.fail(format!("cannot decode empty asset {}", asset.url));
            return;
        }

        let remaining = self.duration_of(asset.data.len());
        log::debug!("playing {} for {:?} (request {})", asset.url, remaining, done.token());
        self.running = Some(Running {
            remaining,
            started: Some(Instant::now()),
            task: Some(Self::spawn_timer(remaining, done.clone())),
            done,
        });
    }

    fn pause(&mut self) {
        let Some(running) = self.running.as_mut() else {
            return;
        };
        if let Some(task) = running.task.take() {
            task.abort();
        }
        if let Some(started) = running.started.take() {
            running.remaining = running.remaining.saturating_sub(started.elapsed());
        }
    }

    fn resume(&mut self) {
        let Some(running) = self.running.as_mut() else {
            return;
        };
        if running.task.is_some() {
            return;
        }
        running.started = Some(Instant::now());
        running.task = Some(Self::spawn_timer(running.remaining, running.done.clone()));
    }

    fn stop(&mut self) {
        if let Some(mut running) = self.running.take() {
            if let Some(task) = running.task.take() {
                task.abort();
            }
        }
    }
}

impl Drop for ClockOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::FakeAudio;

    #[test]
    fn test_url_template_is_deterministic() {
        let urls = AudioUrlTemplate::default();
        assert_eq!(
            urls.url(Narrator::Alafasy, UnitId(262)),
            "https://cdn.islamic.network/quran/audio/128/ar.alafasy/262.mp3"
        );
        assert_eq!(
            AudioUrlTemplate::new("http://localhost:8080/", 64).url(Narrator::Husary, UnitId(1)),
            "http://localhost:8080/64/ar.husary/1.mp3"
        );
    }

    #[tokio::test]
    async fn test_fetch_goes_through_cache() {
        let audio = Arc::new(FakeAudio::default());
        let assets = AudioAssets::new(audio.clone(), AssetCache::in_memory(), AudioUrlTemplate::default());

        let first = assets.fetch(Narrator::Sudais, UnitId(5)).await.unwrap();
        let second = assets.fetch(Narrator::Sudais, UnitId(5)).await.unwrap();

        assert_eq!(first.data, second.data);
        assert_eq!(audio.requests().len(), 1);
        assert!(assets.is_cached(Narrator::Sudais, UnitId(5)).await);
        assert!(!assets.is_cached(Narrator::Husary, UnitId(5)).await);
    }

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_download() {
        let audio = Arc::new(FakeAudio::default());
        let assets = AudioAssets::new(audio.clone(), AssetCache::in_memory(), AudioUrlTemplate::default());

        let (warm, play) = tokio::join!(
            assets.fetch(Narrator::Alafasy, UnitId(6)),
            assets.fetch(Narrator::Alafasy, UnitId(6)),
        );

        assert_eq!(warm.unwrap().data, play.unwrap().data);
        assert_eq!(audio.requests().len(), 1);
        assert!(assets.in_flight.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_fetch_error() {
        let audio = Arc::new(FakeAudio::default());
        audio.fail_unit(UnitId(9));
        let assets = AudioAssets::new(audio, AssetCache::in_memory(), AudioUrlTemplate::default());

        assert!(matches!(
            assets.fetch(Narrator::Alafasy, UnitId(9)).await,
            Err(Error::Fetch(_))
        ));
    }

    #[tokio::test]
    async fn test_clock_output_resumes_with_remaining_time() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut output = ClockOutput::new(8);
        let asset = AudioAsset {
            unit: UnitId(1),
            narrator: Narrator::Alafasy,
            url: "a".to_string(),
            // 8 kbps = 1000 bytes/s, so 60ms of audio
            data: Arc::from(vec![0u8; 60]),
        };

        output.start(&asset, Completion::new(3, tx));
        output.pause();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(rx.try_recv().is_err());

        output.resume();
        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, ControllerEvent::UnitComplete { token: 3 }));
    }

    #[tokio::test]
    async fn test_clock_output_rejects_empty_asset() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut output = ClockOutput::new(128);
        let asset = AudioAsset {
            unit: UnitId(1),
            narrator: Narrator::Alafasy,
            url: "a".to_string(),
            data: Arc::from(Vec::new()),
        };

        output.start(&asset, Completion::new(1, tx));
        assert!(matches!(
            rx.try_recv(),
            Ok(ControllerEvent::OutputFailed { token: 1, .. })
        ));
    }
}
