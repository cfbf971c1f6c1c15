/// Observer notified while a chapter downloads
pub trait Progress: Send + Sync {
    /// Called exactly once for every page of the chapter, whether it was fetched or
    /// already on disk. `index` is the position of the page in the chapter
    fn page_done(&self, index: usize);
}

impl<F> Progress for F
where
    F: Fn(usize) + Send + Sync,
{
    fn page_done(&self, index: usize) {
        self(index)
    }
}
