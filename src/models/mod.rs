//! In-memory representation of manga, their chapters and metadata

pub mod chapter;
pub mod locale;
pub mod manga;
pub mod metadata;

pub use chapter::Chapter;
pub use locale::{Locale, LocalizedString};
pub use manga::{ChapterMap, Info, Manga};
pub use metadata::{sanitize, Metadata};
