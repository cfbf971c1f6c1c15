use super::chapter::Chapter;
use super::locale::Locale;
use super::metadata::Metadata;
use crate::error::{Error, Result};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Chapter id -> language -> chapter
pub type ChapterMap = BTreeMap<String, BTreeMap<Locale, Chapter>>;

/// Summary of the chapters held by a [Manga]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Info {
    /// Number of `(id, lang)` pairs
    pub chapters: usize,
    pub volumes: BTreeSet<String>,
    pub langs: BTreeSet<Locale>,
}

/// A manga: its metadata and every known translation of every chapter
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Manga {
    pub meta: Metadata,
    #[serde(default)]
    chapters: ChapterMap,
}

impl Manga {
    pub fn new(meta: Metadata) -> Self {
        Self {
            meta,
            chapters: ChapterMap::new(),
        }
    }

    /// Adds a chapter unless a chapter with the same `(id, lang)` is already present,
    /// in which case the existing one is kept untouched
    pub fn add(&mut self, chapter: Chapter) {
        if self.exists(&chapter) {
            tracing::trace!(id = %chapter.id, lang = %chapter.lang, "chapter already present");
            return;
        }

        self.chapters
            .entry(chapter.id.clone())
            .or_default()
            .insert(chapter.lang, chapter);
    }

    pub fn remove(&mut self, id: &str, lang: Locale) -> Result<Chapter> {
        let langs = self
            .chapters
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("chapter {id}")))?;

        let chapter = langs
            .remove(&lang)
            .ok_or_else(|| Error::NotFound(format!("chapter {id} ({lang})")))?;

        if langs.is_empty() {
            self.chapters.remove(id);
        }

        Ok(chapter)
    }

    pub fn exists(&self, chapter: &Chapter) -> bool {
        self.get(&chapter.id, chapter.lang).is_some()
    }

    pub fn get(&self, id: &str, lang: Locale) -> Option<&Chapter> {
        self.chapters.get(id).and_then(|langs| langs.get(&lang))
    }

    pub fn get_mut(&mut self, id: &str, lang: Locale) -> Option<&mut Chapter> {
        self.chapters
            .get_mut(id)
            .and_then(|langs| langs.get_mut(&lang))
    }

    /// Translations of the chapter with the given `id`
    pub fn langs(&self, id: &str) -> Option<&BTreeMap<Locale, Chapter>> {
        self.chapters.get(id)
    }

    pub fn chapters(&self) -> impl Iterator<Item = &Chapter> {
        self.chapters.values().flat_map(|langs| langs.values())
    }

    /// Every chapter in `lang`, in natural id order
    pub fn chapters_in(&self, lang: Locale) -> Vec<&Chapter> {
        self.sorted_ids()
            .into_iter()
            .filter_map(|id| self.get(id, lang))
            .collect()
    }

    /// All known chapter ids in natural order, so "10" comes after "9"
    pub fn sorted_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.chapters.keys().map(String::as_str).collect();
        ids.sort_by(|a, b| natord::compare(a, b));

        ids
    }

    /// Resolves a selection like `"1,3,5,8-10"` into chapter ids.
    ///
    /// Range endpoints are looked up in [`sorted_ids`](Manga::sorted_ids); a range with an
    /// unknown endpoint selects nothing and an inverted range is read backwards. Single ids are
    /// kept even if unknown, the caller filters them. Duplicates are dropped.
    fn select_ids(&self, cids: &str) -> Result<Vec<String>> {
        let sorted = self.sorted_ids();
        let position = |id: &str| sorted.iter().position(|known| *known == id);

        let mut seen = HashSet::new();
        let mut selected = Vec::new();

        for token in cids.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let ids: Vec<&str> = match token.split_once('-') {
                Some((start, end)) => {
                    let (start, end) = (start.trim(), end.trim());

                    if start.is_empty() || end.is_empty() || end.contains('-') {
                        return Err(Error::InvalidArgument(format!(
                            "malformed chapter range '{token}'"
                        )));
                    }

                    match (position(start), position(end)) {
                        (Some(first), Some(last)) => {
                            let (low, high) = (first.min(last), first.max(last));
                            sorted[low..=high].to_vec()
                        }
                        _ => {
                            tracing::debug!("range '{token}' has an unknown endpoint, skipping");
                            Vec::new()
                        }
                    }
                }
                None => vec![token],
            };

            for id in ids {
                if seen.insert(id.to_owned()) {
                    selected.push(id.to_owned());
                }
            }
        }

        Ok(selected)
    }

    /// Selects chapters in `lang` by a comma separated list of ids and inclusive ranges.
    ///
    /// ```ignore
    /// // chapters 1, 3, 5 and 8 to 10
    /// let chapters = manga.select("1,3,5,8-10", Locale::En)?;
    /// ```
    ///
    /// Ids without a translation in `lang` and unknown ids are skipped, so the result may be
    /// shorter than the selection.
    pub fn select(&self, cids: &str, lang: Locale) -> Result<Vec<&Chapter>> {
        Ok(self
            .select_ids(cids)?
            .iter()
            .filter_map(|id| self.get(id, lang))
            .collect())
    }

    /// Same as [`select`](Manga::select) but allows populating the selected chapters
    pub fn select_mut(&mut self, cids: &str, lang: Locale) -> Result<Vec<&mut Chapter>> {
        let ids = self.select_ids(cids)?;

        let mut by_id: HashMap<&str, &mut Chapter> = self
            .chapters
            .iter_mut()
            .filter_map(|(id, langs)| langs.get_mut(&lang).map(|c| (id.as_str(), c)))
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id.as_str())).collect())
    }

    /// Markdown table of the chapters in `lang`. With `link` the titles link to the chapter urls
    pub fn summary(&self, lang: Locale, link: bool) -> String {
        fn or_empty(s: &str) -> &str {
            if s.is_empty() {
                "(empty)"
            } else {
                s
            }
        }

        let mut table = vec![
            "| volume | chapter | title".to_owned(),
            "|--------|---------|-------".to_owned(),
        ];

        for chapter in self.chapters_in(lang) {
            let title = if link {
                format!("[{}]({})", or_empty(&chapter.title), chapter.url)
            } else {
                or_empty(&chapter.title).to_owned()
            };

            table.push(format!(
                "| {:<6} | {:<7} | {}",
                or_empty(&chapter.volume),
                or_empty(&chapter.id),
                title
            ));
        }

        table.join("\n")
    }

    pub fn info(&self) -> Info {
        let mut info = Info::default();

        for chapter in self.chapters() {
            info.chapters += 1;
            info.volumes.insert(chapter.volume.clone());
            info.langs.insert(chapter.lang);
        }

        info
    }

    /// Number of pages over all chapters whose pages are known
    pub fn total_pages(&self) -> usize {
        self.chapters().map(|c| c.pages.len()).sum()
    }

    /// Whether a source has added at least one chapter
    pub fn parsed(&self) -> bool {
        !self.chapters.is_empty()
    }

    pub fn dump(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn load(data: Value) -> Result<Self> {
        let manga: Manga = serde_json::from_value(data)?;

        Ok(manga.normalized())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        let manga: Manga = serde_json::from_str(data)?;

        Ok(manga.normalized())
    }

    /// Drops empty language maps left in hand-edited snapshots
    fn normalized(mut self) -> Self {
        self.chapters.retain(|_, langs| !langs.is_empty());
        self
    }
}
