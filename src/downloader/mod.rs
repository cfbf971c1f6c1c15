//! Downloads chapter pages to disk and bundles them into PDFs
//!
//! Pages of a chapter are stored as `<base>/<id>_<lang>/<n>.<ext>` where `n` starts at 1.
//! A page is first written as `<n>.<ext>.part` and renamed once complete, so only finished
//! pages are ever picked up when a download is resumed.

mod pdf;
pub mod progress;

pub use pdf::{PAGE_HEIGHT, PAGE_WIDTH};
pub use progress::Progress;

use crate::error::{Error, Result};
use crate::fs_utils::sanitize_filename;
use crate::models::{Chapter, Locale, Manga};
use crate::requests::limiter::RateLimiter;
use crate::requests::{fetch_with_retry, Fetch, RetryPolicy};

use bon::Builder;
use futures::StreamExt as _;
use tracing::Instrument as _;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const PART_SUFFIX: &str = ".part";

/// Can be constructed with [`new`](Downloader::new) or with the builder syntax from [bon]:
///
/// ```ignore
/// let downloader = Downloader::builder()
///     .base("downloads/1f2e3d4c")
///     .fetcher(Arc::new(client.clone()))
///     .limiter(Arc::clone(client.limiter()))
///     .max_concurrent(4)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct Downloader {
    #[builder(into)]
    base: PathBuf,
    fetcher: Arc<dyn Fetch>,
    limiter: Arc<RateLimiter>,
    #[builder(default)]
    retry: RetryPolicy,
    /// Pages of one chapter fetched at the same time
    #[builder(default = RateLimiter::DEFAULT_MAX_IN_FLIGHT)]
    max_concurrent: usize,
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("base", &self.base)
            .field("retry", &self.retry)
            .field("max_concurrent", &self.max_concurrent)
            .finish_non_exhaustive()
    }
}

/// Page number encoded in a finished page file name, `None` for anything else
fn page_number(path: &Path) -> Option<usize> {
    let name = path.file_name()?.to_str()?;

    if name.ends_with(PART_SUFFIX) {
        return None;
    }

    let (stem, _ext) = name.split_once('.')?;
    stem.parse().ok()
}

/// Finished page files in `dir` by page number. A missing directory has no pages
pub fn finished_pages(dir: &Path) -> Result<BTreeMap<usize, PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(e.into()),
    };

    let mut pages = BTreeMap::new();

    for entry in entries {
        let path = entry?.path();

        if let Some(number) = page_number(&path) {
            if path.is_file() {
                pages.insert(number, path);
            }
        }
    }

    Ok(pages)
}

async fn write_page(dir: &Path, stem: &str, ext: &str, bytes: &[u8]) -> Result<PathBuf> {
    let path = dir.join(format!("{stem}.{ext}"));
    let part = dir.join(format!("{stem}.{ext}{PART_SUFFIX}"));

    tokio::fs::write(&part, bytes).await?;
    tokio::fs::rename(&part, &path).await?;

    Ok(path)
}

/// Fetches page `index` of a chapter into `dir`. `stale` is a previous copy of the page
/// that is removed if the new one got a different extension
async fn fetch_page(
    fetcher: Arc<dyn Fetch>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    dir: PathBuf,
    index: usize,
    url: String,
    stale: Option<PathBuf>,
) -> Result<PathBuf> {
    let page = fetch_with_retry(fetcher.as_ref(), &limiter, retry, &url).await?;

    let path = write_page(&dir, &(index + 1).to_string(), page.extension(), &page.bytes).await?;

    if let Some(stale) = stale.filter(|stale| *stale != path) {
        tokio::fs::remove_file(&stale).await?;
    }

    tracing::debug!("saved page {} to {}", index + 1, path.display());

    Ok(path)
}

impl Downloader {
    pub fn new(base: impl Into<PathBuf>, fetcher: Arc<dyn Fetch>, limiter: Arc<RateLimiter>) -> Self {
        Self::builder()
            .base(base)
            .fetcher(fetcher)
            .limiter(limiter)
            .build()
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Directory holding the pages of chapter `id` in `lang`
    pub fn chapter_dir(&self, id: &str, lang: Locale) -> PathBuf {
        self.base.join(sanitize_filename(&format!("{id}_{lang}")))
    }

    pub fn chapter_path(&self, chapter: &Chapter) -> PathBuf {
        self.chapter_dir(&chapter.id, chapter.lang)
    }

    /// Finished files of the pages `chapter` lists. Leftovers numbered past its page list
    /// are ignored
    fn chapter_pages(&self, chapter: &Chapter) -> Result<BTreeMap<usize, PathBuf>> {
        let mut pages = finished_pages(&self.chapter_path(chapter))?;
        pages.retain(|number, _| (1..=chapter.pages.len()).contains(number));

        Ok(pages)
    }

    /// Finished pages of `chapter` on disk, in page order
    pub fn page_paths(&self, chapter: &Chapter) -> Result<Vec<PathBuf>> {
        Ok(self.chapter_pages(chapter)?.into_values().collect())
    }

    /// Whether every page of `chapter` is on disk
    pub fn downloaded(&self, chapter: &Chapter) -> bool {
        chapter.has_pages()
            && self
                .chapter_pages(chapter)
                .is_ok_and(|pages| pages.len() == chapter.pages.len())
    }

    /// Downloads every page of `chapter` and returns their paths in page order.
    ///
    /// Pages already on disk are skipped unless `force` is set. `progress` is notified once
    /// per page. The first failing page aborts the download: no further pages are started,
    /// pages already in flight still finish in the background, and the error is returned.
    #[tracing::instrument(skip_all, fields(id = %chapter.id, lang = %chapter.lang))]
    pub async fn download(
        &self,
        chapter: &Chapter,
        force: bool,
        progress: Option<&dyn Progress>,
    ) -> Result<Vec<PathBuf>> {
        if !chapter.has_pages() {
            return Err(Error::NoPages(chapter.id.clone()));
        }

        let dir = self.chapter_path(chapter);
        tokio::fs::create_dir_all(&dir).await?;

        let mut existing = finished_pages(&dir)?;
        let mut paths: Vec<Option<PathBuf>> = vec![None; chapter.pages.len()];
        let mut jobs = Vec::new();

        for (index, url) in chapter.pages.iter().enumerate() {
            let previous = existing.remove(&(index + 1));

            match previous {
                Some(path) if !force => {
                    tracing::trace!("page {} is already on disk", index + 1);
                    paths[index] = Some(path);

                    if let Some(progress) = progress {
                        progress.page_done(index);
                    }
                }
                stale => jobs.push((index, url.clone(), stale)),
            }
        }

        tracing::info!(
            "fetching {} of {} pages into {}",
            jobs.len(),
            chapter.pages.len(),
            dir.display()
        );

        let mut fetched = futures::stream::iter(jobs)
            .map(|(index, url, stale)| {
                let task = fetch_page(
                    Arc::clone(&self.fetcher),
                    Arc::clone(&self.limiter),
                    self.retry,
                    dir.clone(),
                    index,
                    url,
                    stale,
                );

                let handle = tokio::spawn(task.instrument(tracing::debug_span!("page", index)));
                async move { (index, handle.await) }
            })
            .buffer_unordered(self.max_concurrent.max(1));

        while let Some((index, joined)) = fetched.next().await {
            let path = match joined? {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!("page {} failed, aborting chapter: {e}", index + 1);
                    return Err(e);
                }
            };

            paths[index] = Some(path);

            if let Some(progress) = progress {
                progress.page_done(index);
            }
        }

        Ok(paths.into_iter().flatten().collect())
    }

    /// Fetches the cover of `manga` into `<base>/cover.<ext>`
    #[tracing::instrument(skip_all, fields(url = %manga.meta.url))]
    pub async fn download_cover(&self, manga: &Manga) -> Result<PathBuf> {
        if manga.meta.cover.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "{} has no cover",
                manga.meta.title
            )));
        }

        let page = fetch_with_retry(
            self.fetcher.as_ref(),
            &self.limiter,
            self.retry,
            &manga.meta.cover,
        )
        .await?;

        tokio::fs::create_dir_all(&self.base).await?;
        let path = write_page(&self.base, "cover", page.extension(), &page.bytes).await?;

        tracing::info!("saved cover to {}", path.display());

        Ok(path)
    }

    /// Bundles `chapters` into one PDF at `dest`, in the given order. Every chapter must be
    /// fully downloaded. Returns the number of pages written
    pub fn pdfify<'a, I>(&self, chapters: I, dest: &Path) -> Result<usize>
    where
        I: IntoIterator<Item = &'a Chapter>,
    {
        let mut images = Vec::new();

        for chapter in chapters {
            if !self.downloaded(chapter) {
                return Err(Error::NoPages(chapter.id.clone()));
            }

            images.extend(self.page_paths(chapter)?);
        }

        pdf::write_pdf(&images, dest)
    }
}
