use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable city identifier from the geonames database.
///
/// The server sends it either as a number or as a string; it is always kept
/// as a string here since it is only ever used as a key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct GeonameId(String);

impl GeonameId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GeonameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for GeonameId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<u64> for GeonameId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for GeonameId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(u64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => GeonameId(s),
            RawId::Number(n) => GeonameId::from(n),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityInfo {
    #[serde(rename = "geonameid")]
    pub id: GeonameId,
    pub name: String,
    pub country: String,
    #[serde(
        default,
        rename = "subcountry",
        alias = "subregion",
        skip_serializing_if = "Option::is_none"
    )]
    pub subregion: Option<String>,
}

/// Cursor links returned with every page of cities.
///
/// `next`/`prev` come back as empty strings when there is no adjacent page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Links {
    #[serde(default)]
    pub first: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub next: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub prev: Option<String>,
    #[serde(default)]
    pub last: String,
}

/// One page of `GET /cities`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitiesPage {
    pub data: Vec<CityInfo>,
    pub total: u64,
    #[serde(default)]
    pub links: Links,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub filter: Option<String>,
}

/// Body of `GET /preferences/cities`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferredIds {
    #[serde(default)]
    pub data: Vec<GeonameId>,
}

/// Body of `PATCH /preferences/cities`: `true` adds, `false` removes.
pub type PreferredCitiesPatch = BTreeMap<GeonameId, bool>;

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()))
}
