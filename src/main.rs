use mango_dl::cache::Cache;
use mango_dl::config::Config;
use mango_dl::downloader::{Downloader, Progress};
use mango_dl::hash;
use mango_dl::models::{Locale, Manga};
use mango_dl::sources::{self, Registry};
use mango_dl::MangoClient;

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};
use kdam::{tqdm, BarExt as _};
use parking_lot::Mutex;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "mango-dl", version, about = "Download manga from the command line")]
struct Cli {
    /// Config file, defaults to config.json in the cache directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Language of the chapters, overrides the config
    #[arg(long, short, global = true)]
    lang: Option<Locale>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scrape a manga and add it to the cache
    Add { url: String },
    /// List cached manga
    List,
    /// Show a cached manga, or one of its chapters
    Info {
        hash: String,
        #[arg(long)]
        chapter: Option<String>,
    },
    /// Scrape a cached manga again
    Refresh { hash: String },
    /// Download chapters of a cached manga
    Download {
        hash: String,
        /// Chapters to download, like "1,3,5-8". All chapters when omitted
        #[arg(short, long)]
        chapters: Option<String>,
        /// Download pages again even if they are on disk
        #[arg(short, long)]
        force: bool,
        /// Directory to download to, overrides the config
        #[arg(short, long)]
        path: Option<PathBuf>,
        /// Also download the cover
        #[arg(long)]
        cover: bool,
    },
    /// Remove a manga from the cache
    Remove { hash: String },
    /// Bundle downloaded chapters into a pdf
    Pdfify {
        hash: String,
        #[arg(short, long)]
        chapters: String,
        #[arg(short, long)]
        output: PathBuf,
        /// Directory the chapters were downloaded to, overrides the config
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
}

/// Progress bar for one chapter
struct BarProgress(Mutex<kdam::Bar>);

impl BarProgress {
    fn new(total: usize, desc: String) -> Self {
        Self(Mutex::new(tqdm!(total = total, desc = desc, unit = "page")))
    }
}

impl Progress for BarProgress {
    fn page_done(&self, _index: usize) {
        if let Err(e) = self.0.lock().update(1) {
            tracing::trace!("failed to draw progress: {e}");
        }
    }
}

fn init_logging(config: &Config) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&config.cache_path)
        .with_context(|| format!("creating {}", config.cache_path.display()))?;

    let filter = EnvFilter::builder()
        .with_default_directive(config.log_level.parse().context("invalid log_level")?)
        .from_env_lossy();

    let file = tracing_appender::rolling::never(&config.cache_path, "mango-dl.log");
    let (writer, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .init();

    Ok(guard)
}

/// Downloads go to `<base>/<short hash>/`
fn downloader_for(
    base: &Path,
    manga: &Manga,
    client: &MangoClient,
    config: &Config,
) -> Downloader {
    Downloader::builder()
        .base(base.join(manga.meta.short_hash()))
        .fetcher(Arc::new(client.clone()))
        .limiter(Arc::clone(client.limiter()))
        .retry(config.retry_policy())
        .max_concurrent(config.max_concurrent)
        .build()
}

fn print_info(manga: &Manga, lang: Locale) {
    let meta = &manga.meta;
    let info = manga.info();

    println!("{} ({})", meta.title, meta.short_hash());
    println!("url: {}", meta.url);

    if !meta.alt_titles.is_empty() {
        println!("also known as: {}", meta.alt_titles.join(", "));
    }
    if !meta.authors.is_empty() {
        println!("by: {}", meta.authors.join(", "));
    }
    if !meta.genres().is_empty() {
        let genres: Vec<&str> = meta.genres().iter().map(String::as_str).collect();
        println!("genres: {}", genres.join(", "));
    }

    let langs: Vec<String> = info.langs.iter().map(Locale::to_string).collect();
    println!(
        "{} chapters, {} volumes, languages: {}",
        info.chapters,
        info.volumes.len(),
        langs.join(", ")
    );

    if let Some(desc) = meta.desc_for(lang) {
        println!("\n{desc}");
    }

    println!("\n{}", manga.summary(lang, false));
}

async fn download(
    cache: &Cache,
    registry: &Registry,
    client: &MangoClient,
    config: &Config,
    args: DownloadArgs,
) -> Result<()> {
    let mut manga = cache.load(&args.hash)?;
    let parser = registry.by_url(&manga.meta.url)?;

    let spec = match args.chapters {
        Some(spec) => spec,
        None => manga.sorted_ids().join(","),
    };

    let selected = manga.select_mut(&spec, config.lang)?;
    if selected.is_empty() {
        bail!("no chapters in '{}' match '{spec}'", config.lang);
    }

    let populated = sources::populate_pages(parser, selected).await?;
    if populated > 0 {
        tracing::info!("fetched page lists of {populated} chapters");
        cache.dump(&manga)?;
    }

    let base = args.path.unwrap_or_else(|| config.download_path.clone());
    let downloader = downloader_for(&base, &manga, client, config);

    if args.cover {
        match downloader.download_cover(&manga).await {
            Ok(path) => println!("cover saved to {}", path.display()),
            Err(e) => tracing::warn!("failed to download cover: {e}"),
        }
    }

    for chapter in manga.select(&spec, config.lang)? {
        if !args.force && downloader.downloaded(chapter) {
            tracing::info!("chapter {} is already downloaded", chapter.id);
            continue;
        }

        let progress = BarProgress::new(chapter.pages.len(), format!("chapter {}", chapter.id));
        downloader
            .download(chapter, args.force, Some(&progress))
            .await
            .with_context(|| format!("downloading chapter {}", chapter.id))?;
        eprintln!();
    }

    println!("downloaded to {}", downloader.base().display());

    Ok(())
}

struct DownloadArgs {
    hash: String,
    chapters: Option<String>,
    force: bool,
    path: Option<PathBuf>,
    cover: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;
    if let Some(lang) = cli.lang {
        config.lang = lang;
    }

    let _guard = init_logging(&config)?;
    tracing::debug!("using config {config:?}");

    let limiter = Arc::new(config.rate_limiter());
    let client = MangoClient::from_config(&config, limiter)?;
    let registry = Registry::with_defaults(client.clone());
    let cache = Cache::open(&config.cache_path)?;

    match cli.command {
        Command::Add { url } => {
            if let Some(full) = cache.lookup_url(&url) {
                println!("{url} is already cached as {}", hash::short_hash(&full));
                return Ok(());
            }

            let parser = registry.by_url(&url)?;
            let manga = sources::scrape(parser, &url).await?;
            cache.dump(&manga)?;

            println!(
                "added {} ({}) with {} chapters",
                manga.meta.title,
                manga.meta.short_hash(),
                manga.info().chapters
            );
        }
        Command::List => {
            for entry in cache.list() {
                println!("{}  {}  {}", entry.short_hash(), entry.title, entry.url);
            }
        }
        Command::Info { hash, chapter } => {
            let manga = cache.load(&hash)?;

            match chapter {
                Some(id) => {
                    let Some(chapter) = manga.get(&id, config.lang) else {
                        bail!("chapter {id} has no '{}' translation", config.lang);
                    };
                    println!("{}", serde_json::to_string_pretty(chapter)?);
                }
                None => print_info(&manga, config.lang),
            }
        }
        Command::Refresh { hash } => {
            let manga = cache.load(&hash)?;
            let parser = registry.by_url(&manga.meta.url)?;

            let fresh = sources::refresh(parser, &manga).await?;
            cache.dump(&fresh)?;

            println!(
                "refreshed {}: {} chapters",
                fresh.meta.title,
                fresh.info().chapters
            );
        }
        Command::Download {
            hash,
            chapters,
            force,
            path,
            cover,
        } => {
            let args = DownloadArgs {
                hash,
                chapters,
                force,
                path,
                cover,
            };
            download(&cache, &registry, &client, &config, args).await?;
        }
        Command::Remove { hash } => {
            let full = cache.fullhash(&hash)?;
            cache.delete(&full)?;

            println!("removed {}", hash::short_hash(&full));
        }
        Command::Pdfify {
            hash,
            chapters,
            output,
            path,
        } => {
            let manga = cache.load(&hash)?;
            let selected = manga.select(&chapters, config.lang)?;

            if selected.is_empty() {
                bail!("no chapters in '{}' match '{chapters}'", config.lang);
            }

            let base = path.unwrap_or_else(|| config.download_path.clone());
            let downloader = downloader_for(&base, &manga, &client, &config);

            let pages = downloader.pdfify(selected, &output)?;
            println!("wrote {pages} pages to {}", output.display());
        }
    }

    Ok(())
}
