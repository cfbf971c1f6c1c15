//! Response and query shapes of the MangaDex api.
//!
//! The meaning of most of the fields can be found at <https://api.mangadex.org/docs/>.
//! Only what the source needs is deserialized, everything else is ignored.

use crate::requests::query_utils::Query;

use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use std::collections::HashMap;

/// Language code to text. Codes are kept as strings since MangaDex uses some that
/// [Locale](crate::models::Locale) doesn't know
pub type LocalizedString = HashMap<String, String>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Manga,
    CoverArt,
    Chapter,
    Author,
    Artist,
    ScanlationGroup,
    Tag,
    User,
    Creator,
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Relationship {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub related: Option<String>,
    /// Only present for the relationship types requested with `includes`
    pub attributes: Option<Value>,
}

impl Relationship {
    /// String attribute of an expanded relationship
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.as_ref()?.get(key)?.as_str()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, std::hash::Hash)]
#[serde(rename_all = "camelCase")]
pub enum OrderOption {
    CreatedAt,
    UpdatedAt,
    PublishAt,
    ReadableAt,
    Volume,
    Chapter,
}

pub type SortingOptions = HashMap<OrderOption, Order>;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TagAttributes {
    pub name: LocalizedString,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Tag {
    pub id: String,
    pub attributes: TagAttributes,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct MangaAttributes {
    pub title: LocalizedString,
    pub alt_titles: Vec<LocalizedString>,
    pub description: LocalizedString,
    pub original_language: Option<String>,
    pub status: Option<String>,
    pub year: Option<i64>,
    pub last_chapter: Option<String>,
    pub tags: Vec<Tag>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MangaEntity {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub attributes: MangaAttributes,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ChapterAttributes {
    pub title: Option<String>,
    pub volume: Option<String>,
    pub chapter: Option<String>,
    #[serde(default)]
    pub pages: usize,
    pub translated_language: String,
    pub external_url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChapterEntity {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub attributes: ChapterAttributes,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

/// One page of `/manga/{id}/feed`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FeedPage {
    pub data: Vec<ChapterEntity>,
    pub limit: u32,
    pub offset: u32,
    pub total: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ChapterMeta {
    pub hash: String,
    pub data: Vec<String>,
    pub data_saver: Vec<String>,
}

/// Response of `/at-home/server/{chapter}`
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ChapterDownloadMeta {
    pub base_url: String,
    pub chapter: ChapterMeta,
}

impl ChapterDownloadMeta {
    /// Full quality page urls in reading order
    pub fn page_urls(&self) -> Vec<String> {
        self.chapter
            .data
            .iter()
            .map(|file| format!("{}/data/{}/{file}", self.base_url, self.chapter.hash))
            .collect()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct IncludesQuery {
    pub includes: Vec<EntityType>,
}
impl Query for IncludesQuery {}

/// Can be constructed with the builder syntax from the [bon] crate
#[derive(Serialize, Deserialize, Debug, Clone, Builder)]
#[serde(rename_all = "camelCase")]
pub struct FeedQuery {
    #[builder(default = 100)]
    pub limit: u32,
    #[builder(default)]
    pub offset: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_language: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<SortingOptions>,
}
impl Query for FeedQuery {}
