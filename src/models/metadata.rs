use super::locale::{Locale, LocalizedString};
use crate::hash;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use std::collections::BTreeSet;
use std::sync::LazyLock;

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("valid regex"));

/// Lower-cases a category tag and collapses every run of non-alphanumeric characters into `_`
pub fn sanitize(tag: &str) -> String {
    NON_ALPHANUMERIC
        .replace_all(&tag.trim().to_lowercase(), "_")
        .into_owned()
}

fn deserialize_genres<'de, D>(deserializer: D) -> std::result::Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;

    Ok(raw.iter().map(|g| sanitize(g)).collect())
}

/// Descriptive attributes of a manga
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Metadata {
    /// Canonical url of the manga title page, the key material of its hash
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub alt_titles: Vec<String>,
    /// Synopsis per language
    #[serde(default)]
    pub desc: LocalizedString,
    /// Url of the cover image, empty if unknown
    #[serde(default)]
    pub cover: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_genres")]
    genres: BTreeSet<String>,
    /// Source specific state
    #[serde(default)]
    pub other: Map<String, Value>,
}

impl Metadata {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Full hash identifying this manga
    pub fn hash(&self) -> String {
        hash::digest(&self.url)
    }

    pub fn short_hash(&self) -> String {
        hash::short_hash(&self.hash()).to_owned()
    }

    pub fn genres(&self) -> &BTreeSet<String> {
        &self.genres
    }

    pub fn add_genre(&mut self, genre: &str) {
        let genre = sanitize(genre);

        if !genre.is_empty() {
            self.genres.insert(genre);
        }
    }

    pub fn set_genres<I, S>(&mut self, genres: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.genres.clear();

        for genre in genres {
            self.add_genre(genre.as_ref());
        }
    }

    /// Stores a synopsis, trimmed and with windows line endings normalized
    pub fn set_desc(&mut self, lang: Locale, text: &str) {
        self.desc.insert(lang, text.trim().replace("\r\n", "\n"));
    }

    /// Synopsis in `lang`, falling back to english
    pub fn desc_for(&self, lang: Locale) -> Option<&str> {
        self.desc
            .get(&lang)
            .or_else(|| self.desc.get(&Locale::En))
            .map(String::as_str)
    }
}
