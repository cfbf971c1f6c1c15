#![allow(dead_code)]

use mango_dl::models::Chapter;
use mango_dl::requests::{Fetch, Page};
use mango_dl::{Error, Result};

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, RgbImage};
use parking_lot::Mutex;

use std::collections::HashSet;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A valid png of `width` x `height` pixels
pub fn png_bytes(width: u32, height: u32) -> Bytes {
    let image =
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([200, 10, 10])));

    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();

    Bytes::from(buf)
}

pub fn page_url(chapter: &str, n: usize) -> String {
    format!("https://cdn.example.com/{chapter}/{n}.png")
}

/// Size of the image served for `url`: page number wide and chapter number high.
/// Anything not shaped like a [page_url] gets 1 x 1
pub fn image_size(url: &str) -> (u32, u32) {
    let parse = || {
        let (chapter, page) = url
            .strip_prefix("https://cdn.example.com/")?
            .strip_suffix(".png")?
            .split_once('/')?;

        Some((page.parse().ok()?, chapter.parse().ok()?))
    };

    parse().unwrap_or((1, 1))
}

/// Chapter `id` with `pages` page urls
pub fn chapter(id: &str, pages: usize) -> Chapter {
    let mut chapter = Chapter::new(id, format!("https://example.com/manga/1/{id}"));
    chapter.pages = (1..=pages).map(|n| page_url(id, n)).collect();
    chapter
}

/// In-memory [Fetch] serving a png sized by [image_size] for every url. Records every call
/// and the highest number of fetches that were running at once
#[derive(Default)]
pub struct FakeFetch {
    delay: Duration,
    running: AtomicUsize,
    max_running: AtomicUsize,
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn fail_on(&self, url: &str) {
        self.failing.lock().insert(url.to_owned());
    }

    pub fn heal(&self) {
        self.failing.lock().clear();
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetch for FakeFetch {
    async fn fetch(&self, url: &str) -> Result<Page> {
        self.calls.lock().push(url.to_owned());

        if self.failing.lock().contains(url) {
            return Err(Error::TransportFailure {
                url: url.to_owned(),
                reason: "connection reset".to_owned(),
            });
        }

        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.running.fetch_sub(1, Ordering::SeqCst);

        let (width, height) = image_size(url);

        Ok(Page {
            bytes: png_bytes(width, height),
            content_type: Some("image/png".to_owned()),
        })
    }
}
