use super::locale::Locale;

use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One translation of a numbered chapter.
///
/// Chapters are identified inside a manga by the pair `(id, lang)`. The id is not
/// required to be numeric, "10a" and "10.5" are both valid ids.
///
/// Can be constructed with the builder syntax from the [bon] crate:
///
/// ```ignore
/// let chapter = Chapter::builder()
///     .id("1")
///     .url("https://example.com/manga/1/chapter/1")
///     .lang(Locale::Es)
///     .build();
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Builder)]
pub struct Chapter {
    #[builder(into)]
    pub id: String,
    #[builder(into)]
    pub url: String,
    #[serde(default)]
    #[builder(into, default)]
    pub title: String,
    /// Empty for chapters that don't belong to a volume
    #[serde(default)]
    #[builder(into, default)]
    pub volume: String,
    #[serde(default)]
    #[builder(default)]
    pub lang: Locale,
    /// Image urls in reading order, empty until a source populates them
    #[serde(default)]
    #[builder(default)]
    pub pages: Vec<String>,
    /// Source specific state
    #[serde(default)]
    #[builder(default)]
    pub other: Map<String, Value>,
}

impl Chapter {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self::builder().id(id).url(url).build()
    }

    /// Whether this and `other` are the same translation of the same chapter
    pub fn same_identity(&self, other: &Chapter) -> bool {
        self.id == other.id && self.lang == other.lang
    }

    pub fn has_pages(&self) -> bool {
        !self.pages.is_empty()
    }
}
