//! Source for <https://mangadex.org>, backed by its public json api

pub mod types;

use super::Parser;
use crate::error::{Error, Result};
use crate::models::{Chapter, Locale, Manga, Metadata};
use crate::requests::query_utils::EmptyQuery;
use crate::MangoClient;
use types::{
    ChapterDownloadMeta, ChapterEntity, EntityType, FeedPage, FeedQuery, IncludesQuery,
    LocalizedString, MangaEntity, Order, OrderOption,
};

use async_trait::async_trait;
use futures::{Stream, StreamExt as _};
use regex::Regex;
use serde_json::Value;

use std::collections::HashMap;
use std::sync::LazyLock;

static DOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"mangadex\.org/title/([0-9a-fA-F-]{36})").expect("valid regex")
});

static CHAPTER_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"mangadex\.org/chapter/([0-9a-fA-F-]{36})").expect("valid regex")
});

/// Key under which the MangaDex uuid is kept in [Chapter::other] and [Metadata::other]
pub const ID_KEY: &str = "mangadex_id";

/// Id given to chapters without a number, usually oneshots
pub const ONESHOT_ID: &str = "0";

fn pick(text: &LocalizedString) -> Option<&str> {
    text.get("en")
        .or_else(|| text.values().next())
        .map(String::as_str)
}

/// MangaDex uuid of the manga at `url`
pub fn manga_id(url: &str) -> Result<String> {
    DOMAIN
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|id| id.as_str().to_ascii_lowercase())
        .ok_or_else(|| Error::InvalidArgument(format!("'{url}' is not a MangaDex title url")))
}

/// Builds [Metadata] from a manga fetched with the `cover_art` and `author` relationships expanded
pub fn metadata_from(url: &str, manga: MangaEntity) -> Metadata {
    let mut meta = Metadata::new(url);
    let attributes = manga.attributes;

    meta.title = pick(&attributes.title).unwrap_or_default().to_owned();
    meta.alt_titles = attributes
        .alt_titles
        .iter()
        .flat_map(|titles| titles.values().cloned())
        .collect();

    for (code, text) in &attributes.description {
        match code.parse::<Locale>() {
            Ok(lang) => meta.set_desc(lang, text),
            Err(_) => tracing::trace!("skipping description in unknown language {code}"),
        }
    }

    meta.set_genres(attributes.tags.iter().filter_map(|tag| pick(&tag.attributes.name)));

    for relationship in &manga.relationships {
        match relationship.entity_type {
            EntityType::Author | EntityType::Artist => {
                if let Some(name) = relationship.attribute("name") {
                    if !meta.authors.iter().any(|known| known == name) {
                        meta.authors.push(name.to_owned());
                    }
                }
            }
            EntityType::CoverArt => {
                if let Some(file) = relationship.attribute("fileName") {
                    meta.cover = format!("{}/{}/{file}", MangaDex::COVERS_URL, manga.id);
                }
            }
            _ => {}
        }
    }

    meta.other.insert(ID_KEY.to_owned(), Value::String(manga.id));

    if let Some(status) = attributes.status {
        meta.other.insert("status".to_owned(), Value::String(status));
    }
    if let Some(year) = attributes.year {
        meta.other.insert("year".to_owned(), Value::from(year));
    }

    meta
}

/// Converts a feed entry. Entries hosted elsewhere or in an unknown language give `None`
pub fn chapter_from(entity: ChapterEntity) -> Option<Chapter> {
    let attributes = entity.attributes;

    if attributes.external_url.is_some() {
        tracing::trace!("chapter {} is hosted externally", entity.id);
        return None;
    }

    let lang = attributes.translated_language.parse::<Locale>().ok()?;

    let mut chapter = Chapter::builder()
        .id(attributes.chapter.unwrap_or_else(|| ONESHOT_ID.to_owned()))
        .url(format!("https://mangadex.org/chapter/{}", entity.id))
        .title(attributes.title.unwrap_or_default())
        .volume(attributes.volume.unwrap_or_default())
        .lang(lang)
        .build();

    chapter
        .other
        .insert(ID_KEY.to_owned(), Value::String(entity.id));

    Some(chapter)
}

/// MangaDex uuid of a chapter, from [ID_KEY] or from its url
fn chapter_id(chapter: &Chapter) -> Result<String> {
    if let Some(id) = chapter.other.get(ID_KEY).and_then(Value::as_str) {
        return Ok(id.to_owned());
    }

    CHAPTER_URL
        .captures(&chapter.url)
        .and_then(|caps| caps.get(1))
        .map(|id| id.as_str().to_owned())
        .ok_or_else(|| Error::NotFound(format!("MangaDex id of chapter {}", chapter.id)))
}

#[derive(Debug, Clone)]
pub struct MangaDex {
    client: MangoClient,
}

impl MangaDex {
    pub const BASE_URL: &'static str = "https://api.mangadex.org";
    pub const COVERS_URL: &'static str = "https://uploads.mangadex.org/covers";

    pub fn new(client: MangoClient) -> Self {
        Self { client }
    }

    /// Every chapter of manga `id` in every language, oldest first
    fn feed<'a>(&'a self, id: &'a str) -> impl Stream<Item = Result<ChapterEntity>> + Send + 'a {
        async_stream::try_stream! {
            let url = format!("{}/manga/{id}/feed", Self::BASE_URL);
            let mut offset = 0;

            loop {
                let query = FeedQuery::builder()
                    .offset(offset)
                    .order(HashMap::from([
                        (OrderOption::Volume, Order::Asc),
                        (OrderOption::Chapter, Order::Asc),
                    ]))
                    .build();

                let page: FeedPage = self.client.get_json(&url, &query).await?;
                let received = page.data.len() as u32;
                tracing::debug!("feed of {id}: {} to {} of {}", page.offset, page.offset + received, page.total);

                for chapter in page.data {
                    yield chapter;
                }

                offset += received;
                if received == 0 || offset >= page.total {
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl Parser for MangaDex {
    fn name(&self) -> &str {
        "mangadex"
    }

    fn domain(&self) -> &Regex {
        &DOMAIN
    }

    #[tracing::instrument(skip(self))]
    async fn metadata(&self, url: &str) -> Result<Metadata> {
        let id = manga_id(url)?;

        let query = IncludesQuery {
            includes: vec![EntityType::CoverArt, EntityType::Author, EntityType::Artist],
        };
        let manga: MangaEntity = self
            .client
            .get_data(&format!("{}/manga/{id}", Self::BASE_URL), &query)
            .await?;

        Ok(metadata_from(url, manga))
    }

    #[tracing::instrument(skip_all, fields(url = %manga.meta.url))]
    async fn add_chapters(&self, manga: &mut Manga) -> Result<()> {
        let id = manga_id(&manga.meta.url)?;

        let feed = self.feed(&id);
        futures::pin_mut!(feed);

        let mut added = 0;
        while let Some(entity) = feed.next().await {
            if let Some(chapter) = chapter_from(entity?) {
                manga.add(chapter);
                added += 1;
            }
        }

        tracing::info!("parsed {added} chapters");

        Ok(())
    }

    #[tracing::instrument(skip_all, fields(id = %chapter.id, lang = %chapter.lang))]
    async fn add_pages(&self, chapter: &mut Chapter) -> Result<()> {
        let id = chapter_id(chapter)?;

        let meta: ChapterDownloadMeta = self
            .client
            .get_json(&format!("{}/at-home/server/{id}", Self::BASE_URL), &EmptyQuery {})
            .await?;

        chapter.pages = meta.page_urls();
        tracing::debug!("chapter has {} pages", chapter.pages.len());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    const URL: &str = "https://mangadex.org/title/a96676e5-8ae2-425e-b549-7f15dd34a6d8/komi-san";

    #[test]
    fn test_manga_id() {
        assert_eq!(manga_id(URL).unwrap(), "a96676e5-8ae2-425e-b549-7f15dd34a6d8");
        assert!(matches!(
            manga_id("https://mangadex.org/chapter/abc"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_metadata_from() {
        let manga: MangaEntity = serde_json::from_value(json!({
            "id": "a96676e5-8ae2-425e-b549-7f15dd34a6d8",
            "type": "manga",
            "attributes": {
                "title": {"en": "Komi Can't Communicate"},
                "altTitles": [{"ja": "古見さんは、コミュ症です。"}, {"en": "Komi-san"}],
                "description": {"en": "Komi is shy.\r\n", "xx-unknown": "?"},
                "status": "completed",
                "year": 2016,
                "tags": [
                    {"id": "1", "type": "tag", "attributes": {"name": {"en": "Slice of Life"}}},
                    {"id": "2", "type": "tag", "attributes": {"name": {"en": "Romance"}}}
                ],
                "isLocked": false
            },
            "relationships": [
                {"id": "x", "type": "author", "attributes": {"name": "Oda Tomohito"}},
                {"id": "y", "type": "artist", "attributes": {"name": "Oda Tomohito"}},
                {"id": "z", "type": "cover_art", "attributes": {"fileName": "cover.jpg"}},
                {"id": "w", "type": "custom_list"}
            ]
        }))
        .unwrap();

        let meta = metadata_from(URL, manga);

        assert_eq!(meta.title, "Komi Can't Communicate");
        assert_eq!(meta.alt_titles.len(), 2);
        assert_eq!(meta.authors, vec!["Oda Tomohito"]);
        assert_eq!(meta.desc_for(Locale::En), Some("Komi is shy."));
        assert!(meta.genres().contains("slice_of_life"));
        assert_eq!(
            meta.cover,
            "https://uploads.mangadex.org/covers/a96676e5-8ae2-425e-b549-7f15dd34a6d8/cover.jpg"
        );
        assert_eq!(
            meta.other[ID_KEY],
            json!("a96676e5-8ae2-425e-b549-7f15dd34a6d8")
        );
    }

    #[test]
    fn test_chapter_from() {
        let entity = |chapter: Value, lang: &str, external: Value| -> ChapterEntity {
            serde_json::from_value(json!({
                "id": "0c7b0b4e-6a34-4e1a-9c50-5d1f3f1d2a10",
                "type": "chapter",
                "attributes": {
                    "title": null,
                    "volume": "1",
                    "chapter": chapter,
                    "pages": 20,
                    "translatedLanguage": lang,
                    "externalUrl": external
                },
                "relationships": []
            }))
            .unwrap()
        };

        let chapter = chapter_from(entity(json!("10.5"), "pt-br", Value::Null)).unwrap();
        assert_eq!(chapter.id, "10.5");
        assert_eq!(chapter.lang, Locale::PtBr);
        assert_eq!(chapter.volume, "1");
        assert_eq!(
            chapter_id(&chapter).unwrap(),
            "0c7b0b4e-6a34-4e1a-9c50-5d1f3f1d2a10"
        );

        let oneshot = chapter_from(entity(Value::Null, "en", Value::Null)).unwrap();
        assert_eq!(oneshot.id, ONESHOT_ID);

        assert!(chapter_from(entity(json!("1"), "en", json!("https://example.com"))).is_none());
        assert!(chapter_from(entity(json!("1"), "xx-unknown", Value::Null)).is_none());
    }

    #[test]
    fn test_chapter_id_from_url() {
        let chapter = Chapter::new(
            "1",
            "https://mangadex.org/chapter/0c7b0b4e-6a34-4e1a-9c50-5d1f3f1d2a10",
        );
        assert_eq!(
            chapter_id(&chapter).unwrap(),
            "0c7b0b4e-6a34-4e1a-9c50-5d1f3f1d2a10"
        );

        assert!(chapter_id(&Chapter::new("1", "https://example.com/1")).is_err());
    }

    #[test]
    fn test_page_urls() {
        let meta: ChapterDownloadMeta = serde_json::from_value(json!({
            "result": "ok",
            "baseUrl": "https://uploads.mangadex.org",
            "chapter": {"hash": "abc", "data": ["1.png", "2.png"], "dataSaver": []}
        }))
        .unwrap();

        assert_eq!(
            meta.page_urls(),
            vec![
                "https://uploads.mangadex.org/data/abc/1.png",
                "https://uploads.mangadex.org/data/abc/2.png",
            ]
        );
    }
}
