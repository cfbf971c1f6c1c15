//! Bundles downloaded page images into a single PDF

use crate::error::Result;
use crate::requests::media;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::ImageReader;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use std::io::Write as _;
use std::path::{Path, PathBuf};

/// A4 in points
pub const PAGE_WIDTH: f32 = 595.28;
pub const PAGE_HEIGHT: f32 = 841.89;

/// Size of an image of `width` x `height` pixels scaled to fit the page, keeping its aspect ratio
fn fit(width: u32, height: u32) -> (f32, f32) {
    let scale = (PAGE_WIDTH / width as f32).min(PAGE_HEIGHT / height as f32);

    (width as f32 * scale, height as f32 * scale)
}

fn image_stream(path: &Path) -> Result<(Stream, u32, u32)> {
    let mut reader = ImageReader::open(path)?;

    let known = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(media::is_decodable);
    if !known {
        reader = reader.with_guessed_format()?;
    }

    let image = reader.decode()?.to_rgb8();
    let (width, height) = image.dimensions();

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(image.as_raw())?;
    let data = encoder.finish()?;

    let stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        },
        data,
    );

    Ok((stream, width, height))
}

/// Writes one page per image to `dest`, each image anchored to the top left corner.
/// Returns the number of pages
pub(crate) fn write_pdf(images: &[PathBuf], dest: &Path) -> Result<usize> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(images.len());

    for path in images {
        tracing::trace!("adding {} to pdf", path.display());

        let (stream, width, height) = image_stream(path)?;
        let image_id = doc.add_object(stream);
        let (draw_width, draw_height) = fit(width, height);

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        draw_width.into(),
                        0.0f32.into(),
                        0.0f32.into(),
                        draw_height.into(),
                        0.0f32.into(),
                        (PAGE_HEIGHT - draw_height).into(),
                    ],
                ),
                Operation::new("Do", vec!["Im0".into()]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.0f32.into(), 0.0f32.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Im0" => image_id,
                },
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count as i64,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    doc.save_to(&mut tmp)?;
    tmp.persist(dest)?;

    tracing::info!("wrote {count} pages to {}", dest.display());

    Ok(count)
}
