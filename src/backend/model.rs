use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::Error;

/// Madani mushaf page count.
pub const TOTAL_PAGES: u32 = 604;
pub const TOTAL_UNITS: u32 = 6236;
pub const TOTAL_SECTIONS: u32 = 114;

/// Global ayah number, unique across the whole document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub u32);

impl UnitId {
    /// The unit that follows this one in reading order, if any.
    pub fn successor(self) -> Option<UnitId> {
        (self.0 < TOTAL_UNITS).then(|| UnitId(self.0 + 1))
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub id: u32,
    pub name: String,
    pub english_name: String,
    pub revelation_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentUnit {
    pub id: UnitId,
    /// Position inside the section. Display only.
    pub ordinal: u32,
    pub section: Section,
    pub page: u32,
    pub juz: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub units: Vec<ContentUnit>,
}

impl Page {
    pub fn first(&self) -> Option<&ContentUnit> {
        self.units.first()
    }

    pub fn position(&self, id: UnitId) -> Option<usize> {
        self.units.iter().position(|u| u.id == id)
    }

    pub fn unit(&self, id: UnitId) -> Option<&ContentUnit> {
        self.units.iter().find(|u| u.id == id)
    }

    pub fn contains(&self, id: UnitId) -> bool {
        self.position(id).is_some()
    }

    pub fn next_after(&self, id: UnitId) -> Option<&ContentUnit> {
        self.position(id).and_then(|i| self.units.get(i + 1))
    }

    /// Whether the unit at `index` opens its section, meaning a section
    /// header is drawn above it.
    pub fn starts_section(&self, index: usize) -> bool {
        self.units.get(index).is_some_and(|u| u.ordinal == 1)
    }
}

/// Entry of the section list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionSummary {
    pub id: u32,
    pub name: String,
    pub english_name: String,
    pub translation: String,
    pub unit_count: u32,
    pub revelation_type: String,
}

/// Sections whose English name contains `query` (case-insensitive) or whose
/// Arabic name contains it verbatim.
pub fn filter_sections<'a>(sections: &'a [SectionSummary], query: &str) -> Vec<&'a SectionSummary> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return sections.iter().collect();
    }
    sections
        .iter()
        .filter(|s| s.name.contains(query.trim()) || s.english_name.to_lowercase().contains(&needle))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Narrator {
    #[default]
    Alafasy,
    Sudais,
    Husary,
}

impl Narrator {
    pub const ALL: [Narrator; 3] = [Narrator::Alafasy, Narrator::Sudais, Narrator::Husary];

    /// Identifier used by the audio CDN.
    pub fn slug(self) -> &'static str {
        match self {
            Narrator::Alafasy => "ar.alafasy",
            Narrator::Sudais => "ar.abdurrahmaansudais",
            Narrator::Husary => "ar.husary",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Narrator::Alafasy => "Mishary Alafasy",
            Narrator::Sudais => "Abdul Rahman Al-Sudais",
            Narrator::Husary => "Mahmoud Al-Husary",
        }
    }

    pub fn next(self) -> Narrator {
        match self {
            Narrator::Alafasy => Narrator::Sudais,
            Narrator::Sudais => Narrator::Husary,
            Narrator::Husary => Narrator::Alafasy,
        }
    }
}

impl FromStr for Narrator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        Narrator::ALL
            .into_iter()
            .find(|n| n.slug() == key || n.slug().trim_start_matches("ar.") == key)
            .or(match key.as_str() {
                "sudais" => Some(Narrator::Sudais),
                _ => None,
            })
            .ok_or_else(|| Error::UnknownNarrator(s.to_string()))
    }
}

impl TryFrom<String> for Narrator {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Narrator> for String {
    fn from(n: Narrator) -> Self {
        n.slug().to_string()
    }
}

impl fmt::Display for Narrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(id: u32, ordinal: u32) -> ContentUnit {
        ContentUnit {
            id: UnitId(id),
            ordinal,
            section: Section {
                id: 2,
                name: "سُورَةُ البَقَرَةِ".to_string(),
                english_name: "Al-Baqara".to_string(),
                revelation_type: "Medinan".to_string(),
            },
            page: 2,
            juz: 1,
            text: String::new(),
        }
    }

    #[test]
    fn test_narrator_parsing() {
        assert_eq!("ar.husary".parse::<Narrator>().unwrap(), Narrator::Husary);
        assert_eq!("alafasy".parse::<Narrator>().unwrap(), Narrator::Alafasy);
        assert_eq!("Sudais".parse::<Narrator>().unwrap(), Narrator::Sudais);
        assert!(matches!(
            "ar.minshawi".parse::<Narrator>(),
            Err(Error::UnknownNarrator(_))
        ));
    }

    #[test]
    fn test_narrator_serde_rejects_unknown() {
        let json = serde_json::to_string(&Narrator::Sudais).unwrap();
        assert_eq!(json, "\"ar.abdurrahmaansudais\"");
        assert!(serde_json::from_str::<Narrator>("\"ar.nobody\"").is_err());
    }

    #[test]
    fn test_page_navigation_helpers() {
        let page = Page {
            number: 2,
            units: vec![unit(8, 1), unit(9, 2), unit(10, 3)],
        };
        assert!(page.starts_section(0));
        assert!(!page.starts_section(1));
        assert_eq!(page.next_after(UnitId(9)).map(|u| u.id), Some(UnitId(10)));
        assert_eq!(page.next_after(UnitId(10)), None);
        assert!(!page.contains(UnitId(11)));
    }

    #[test]
    fn test_successor_stops_at_document_end() {
        assert_eq!(UnitId(1).successor(), Some(UnitId(2)));
        assert_eq!(UnitId(TOTAL_UNITS).successor(), None);
    }

    #[test]
    fn test_filter_sections() {
        let sections = vec![
            SectionSummary {
                id: 1,
                name: "سُورَةُ ٱلْفَاتِحَةِ".to_string(),
                english_name: "Al-Faatiha".to_string(),
                translation: "The Opening".to_string(),
                unit_count: 7,
                revelation_type: "Meccan".to_string(),
            },
            SectionSummary {
                id: 112,
                name: "سُورَةُ الإِخۡلَاصِ".to_string(),
                english_name: "Al-Ikhlaas".to_string(),
                translation: "Sincerity".to_string(),
                unit_count: 4,
                revelation_type: "Meccan".to_string(),
            },
        ];
        assert_eq!(filter_sections(&sections, "ikh").len(), 1);
        assert_eq!(filter_sections(&sections, "  ").len(), 2);
        assert!(filter_sections(&sections, "baqara").is_empty());
    }
}
