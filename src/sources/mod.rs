//! Sources know how to scrape a manga from one website.
//!
//! Every source implements [Parser] and is looked up by url through a [Registry].

pub mod mangadex;

use crate::error::{Error, Result};
use crate::models::{Chapter, Manga, Metadata};
use crate::MangoClient;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;

#[async_trait]
pub trait Parser: Send + Sync {
    /// Short name shown to users
    fn name(&self) -> &str;

    /// Pattern matching the urls this source handles
    fn domain(&self) -> &Regex;

    async fn metadata(&self, url: &str) -> Result<Metadata>;

    /// Adds every chapter of `manga` to it. Chapters already present are kept as they are
    async fn add_chapters(&self, manga: &mut Manga) -> Result<()>;

    /// Sets the page urls of `chapter`, in reading order
    async fn add_pages(&self, chapter: &mut Chapter) -> Result<()>;

    /// A new manga with metadata but no chapters yet
    async fn create(&self, url: &str) -> Result<Manga> {
        Ok(Manga::new(self.metadata(url).await?))
    }
}

/// Scrapes the manga at `url` including its chapter list, but not the pages
pub async fn scrape(parser: &dyn Parser, url: &str) -> Result<Manga> {
    let mut manga = parser.create(url).await?;
    parser.add_chapters(&mut manga).await?;

    Ok(manga)
}

/// Scrapes `manga` again. Page lists already known for a chapter are carried over
#[tracing::instrument(skip_all, fields(url = %manga.meta.url))]
pub async fn refresh(parser: &dyn Parser, manga: &Manga) -> Result<Manga> {
    let mut fresh = scrape(parser, &manga.meta.url).await?;

    for old in manga.chapters().filter(|c| c.has_pages()) {
        if let Some(chapter) = fresh.get_mut(&old.id, old.lang) {
            if !chapter.has_pages() {
                chapter.pages = old.pages.clone();
            }
        }
    }

    let before = manga.info().chapters;
    let after = fresh.info().chapters;
    tracing::info!("{before} chapters before refresh, {after} after");

    Ok(fresh)
}

/// Fills in the pages of every chapter that has none yet. Returns how many were populated
pub async fn populate_pages(parser: &dyn Parser, chapters: Vec<&mut Chapter>) -> Result<usize> {
    let mut populated = 0;

    for chapter in chapters.into_iter().filter(|c| !c.has_pages()) {
        parser.add_pages(chapter).await?;
        populated += 1;
    }

    Ok(populated)
}

/// Sources by the urls they handle
#[derive(Default)]
pub struct Registry {
    parsers: Vec<Box<dyn Parser>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in source
    pub fn with_defaults(client: MangoClient) -> Self {
        let mut registry = Self::new();
        registry.register(mangadex::MangaDex::new(client));

        registry
    }

    pub fn register(&mut self, parser: impl Parser + 'static) {
        tracing::debug!("registered source {}", parser.name());
        self.parsers.push(Box::new(parser));
    }

    /// First source whose pattern matches `url`
    pub fn by_url(&self, url: &str) -> Result<&dyn Parser> {
        self.parsers
            .iter()
            .find(|parser| parser.domain().is_match(url))
            .map(Box::as_ref)
            .ok_or_else(|| {
                let host = Url::parse(url)
                    .ok()
                    .and_then(|parsed| parsed.host_str().map(str::to_owned))
                    .unwrap_or_else(|| url.to_owned());

                Error::UnknownDomain(host)
            })
    }

    /// Patterns of the registered sources
    pub fn domains(&self) -> Vec<&str> {
        self.parsers
            .iter()
            .map(|parser| parser.domain().as_str())
            .collect()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.parsers.iter().map(|parser| parser.name()))
            .finish()
    }
}
