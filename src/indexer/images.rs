//! Image extraction from PDF pages.
//!
//! Only JPEG-encoded (`DCTDecode`) image XObjects are extracted: their
//! stream bytes are complete JPEG files and can be written out verbatim.

use std::fs;
use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId};
use sha2::{Digest, Sha256};
use tracing::debug;

/// An image written to the image store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedImage {
    /// File name inside the image store, used as the `image_id` metadata.
    pub image_id: String,
    pub page: u32,
}

/// Image ids are bare file names inside the image store.
#[must_use]
pub fn is_safe_image_id(image_id: &str) -> bool {
    !image_id.is_empty() && !image_id.contains(['/', '\\']) && !image_id.contains("..")
}

/// File-name prefix for the images of one source document: its stem with
/// anything outside `[A-Za-z0-9_-]` replaced by `_`, plus 8 hex digits of a
/// SHA-256 of the full source path so same-named files never collide.
#[must_use]
pub fn image_prefix(source: &Path) -> String {
    let stem: String = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let stem = if stem.is_empty() { "document".to_string() } else { stem };

    let digest = Sha256::digest(source.to_string_lossy().as_bytes());
    format!("{stem}_{}", hex::encode(&digest[..4]))
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn resolve_dict<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Dictionary> {
    let object = dict.get(key).ok()?;
    resolve(doc, object)?.as_dict().ok()
}

fn is_jpeg(filter: Option<&Object>) -> bool {
    match filter {
        Some(Object::Name(name)) => name == b"DCTDecode",
        // Only a lone DCTDecode leaves raw JPEG bytes in the stream
        Some(Object::Array(filters)) => {
            matches!(filters.as_slice(), [Object::Name(name)] if name == b"DCTDecode")
        }
        _ => false,
    }
}

/// JPEG payloads of the image XObjects referenced from a page's resources.
pub fn page_jpegs(doc: &Document, page_id: ObjectId) -> Vec<Vec<u8>> {
    let Some(page) = doc.get_object(page_id).ok().and_then(|o| o.as_dict().ok()) else {
        return Vec::new();
    };
    let Some(xobjects) =
        resolve_dict(doc, page, b"Resources").and_then(|res| resolve_dict(doc, res, b"XObject"))
    else {
        return Vec::new();
    };

    let mut images = Vec::new();
    for (name, object) in xobjects.iter() {
        let Some(stream) = resolve(doc, object).and_then(|o| o.as_stream().ok()) else {
            continue;
        };
        let is_image = matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(subtype)) if subtype == b"Image");
        if !is_image {
            continue;
        }
        if is_jpeg(stream.dict.get(b"Filter").ok()) {
            images.push(stream.content.clone());
        } else {
            debug!(
                "Skipping non-JPEG image XObject {}",
                String::from_utf8_lossy(name)
            );
        }
    }
    images
}

/// Write every JPEG on every page of `doc` into `image_store`, naming files
/// `<prefix>_p<page>_<n>.jpg` where `prefix` comes from [`image_prefix`].
pub fn extract_images(
    doc: &Document,
    prefix: &str,
    image_store: &Path,
) -> std::io::Result<Vec<ExtractedImage>> {
    let mut extracted = Vec::new();

    for (page, page_id) in doc.get_pages() {
        for (n, bytes) in page_jpegs(doc, page_id).into_iter().enumerate() {
            let image_id = format!("{prefix}_p{page}_{n}.jpg");
            fs::write(image_store.join(&image_id), bytes)?;
            extracted.push(ExtractedImage { image_id, page });
        }
    }

    Ok(extracted)
}

/// Build a one-page PDF with the given image XObjects (test fixture).
#[cfg(test)]
pub(crate) fn pdf_with_images(images: Vec<lopdf::Stream>) -> Document {
    use lopdf::dictionary;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut xobjects = Dictionary::new();
    for (i, image) in images.into_iter().enumerate() {
        let id = doc.add_object(image);
        xobjects.set(format!("Im{i}"), id);
    }
    let resources_id = doc.add_object(dictionary! { "XObject" => xobjects });
    let content_id = doc.add_object(lopdf::Stream::new(dictionary! {}, b"q Q".to_vec()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 100.into(), 100.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

#[cfg(test)]
pub(crate) fn image_stream(filter: &str, bytes: &[u8]) -> lopdf::Stream {
    use lopdf::dictionary;

    lopdf::Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 1,
            "Height" => 1,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => filter,
        },
        bytes.to_vec(),
    )
}
