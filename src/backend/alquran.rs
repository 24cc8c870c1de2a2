//! HTTP client for the alquran.cloud text API and the islamic.network
//! audio CDN.

use futures::future::BoxFuture;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::annotation::AnnotationSource;
use super::audio::AudioSource;
use super::error::{Error, Result};
use super::model::{ContentUnit, Page, Section, SectionSummary, UnitId};
use super::page_store::ContentSource;

pub const DEFAULT_API_BASE: &str = "https://api.alquran.cloud/v1";
const TEXT_EDITION: &str = "quran-uthmani";
const USER_AGENT: &str = concat!("taha-tui/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct PageData {
    number: u32,
    ayahs: Vec<AyahData>,
}

#[derive(Debug, Deserialize)]
struct AyahData {
    number: u32,
    text: String,
    #[serde(rename = "numberInSurah")]
    number_in_surah: u32,
    juz: u32,
    page: u32,
    surah: Option<SurahRef>,
}

#[derive(Debug, Deserialize)]
struct SurahRef {
    number: u32,
    name: String,
    #[serde(rename = "englishName")]
    english_name: String,
    #[serde(rename = "revelationType")]
    revelation_type: String,
}

#[derive(Debug, Deserialize)]
struct SurahDetailData {
    ayahs: Vec<AyahData>,
}

#[derive(Debug, Deserialize)]
struct SurahListEntry {
    number: u32,
    name: String,
    #[serde(rename = "englishName")]
    english_name: String,
    #[serde(rename = "englishNameTranslation")]
    english_name_translation: String,
    #[serde(rename = "numberOfAyahs")]
    number_of_ayahs: u32,
    #[serde(rename = "revelationType")]
    revelation_type: String,
}

#[derive(Debug, Deserialize)]
struct AnnotationData {
    text: String,
}

fn parse_page(data: PageData) -> Result<Page> {
    let units = data
        .ayahs
        .into_iter()
        .map(|a| {
            let surah = a
                .surah
                .ok_or_else(|| Error::Fetch(format!("ayah {} has no surah", a.number)))?;
            Ok(ContentUnit {
                id: UnitId(a.number),
                ordinal: a.number_in_surah,
                section: Section {
                    id: surah.number,
                    name: surah.name,
                    english_name: surah.english_name,
                    revelation_type: surah.revelation_type,
                },
                page: a.page,
                juz: a.juz,
                text: a.text,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if units.windows(2).any(|w| w[0].id >= w[1].id) {
        return Err(Error::Fetch(format!(
            "page {} units are not in reading order",
            data.number
        )));
    }

    Ok(Page {
        number: data.number,
        units,
    })
}

fn parse_sections(entries: Vec<SurahListEntry>) -> Vec<SectionSummary> {
    entries
        .into_iter()
        .map(|s| SectionSummary {
            id: s.number,
            name: s.name,
            english_name: s.english_name,
            translation: s.english_name_translation,
            unit_count: s.number_of_ayahs,
            revelation_type: s.revelation_type,
        })
        .collect()
}

pub fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(Error::from)
}

/// Talks to the remote content, annotation and audio sources. Cheap to
/// clone; the underlying connection pool is shared.
#[derive(Clone)]
pub struct AlQuranClient {
    client: reqwest::Client,
    api_base: String,
    tafsir_edition: String,
}

impl AlQuranClient {
    pub fn new(api_base: impl Into<String>, tafsir_edition: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            tafsir_edition: tafsir_edition.into(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        log::debug!("GET {}", url);
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let envelope: Envelope<T> = serde_json::from_str(&body)
            .map_err(|e| Error::Fetch(format!("malformed payload from {}: {}", url, e)))?;
        Ok(envelope.data)
    }

    pub async fn get_page(&self, number: u32) -> Result<Page> {
        let url = format!("{}/page/{}/{}", self.api_base, number, TEXT_EDITION);
        parse_page(self.get_json(&url).await?)
    }

    pub async fn get_section_start_page(&self, section: u32) -> Result<u32> {
        let url = format!("{}/surah/{}/{}", self.api_base, section, TEXT_EDITION);
        let detail: SurahDetailData = self.get_json(&url).await?;
        detail
            .ayahs
            .first()
            .map(|a| a.page)
            .ok_or_else(|| Error::Fetch(format!("surah {} has no ayahs", section)))
    }

    pub async fn get_sections(&self) -> Result<Vec<SectionSummary>> {
        let url = format!("{}/surah", self.api_base);
        Ok(parse_sections(self.get_json(&url).await?))
    }

    pub async fn get_annotation(&self, unit: UnitId) -> Result<String> {
        let url = format!("{}/ayah/{}/{}", self.api_base, unit, self.tafsir_edition);
        let data: AnnotationData = self.get_json(&url).await?;
        Ok(data.text)
    }

    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        log::debug!("GET {}", url);
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

impl ContentSource for AlQuranClient {
    fn fetch_page(&self, number: u32) -> BoxFuture<'_, Result<Page>> {
        Box::pin(self.get_page(number))
    }

    fn fetch_section_start(&self, section: u32) -> BoxFuture<'_, Result<u32>> {
        Box::pin(self.get_section_start_page(section))
    }

    fn fetch_sections(&self) -> BoxFuture<'_, Result<Vec<SectionSummary>>> {
        Box::pin(self.get_sections())
    }
}

impl AnnotationSource for AlQuranClient {
    fn fetch_annotation(&self, unit: UnitId) -> BoxFuture<'_, Result<String>> {
        Box::pin(self.get_annotation(unit))
    }
}

impl AudioSource for AlQuranClient {
    fn fetch_asset<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(self.get_bytes(url))
    }
}
