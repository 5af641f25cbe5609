//! QR stamping: composite the QR image onto the final page of a PDF.
//!
//! The overlay is added as an image XObject plus two content streams that
//! bracket the page's original content:
//!
//! ```text
//! [ "q" ] [ original content … ] [ "Q q 120 0 0 120 435 40 cm /SealQr Do Q" ]
//! ```
//!
//! Every other page object is written back untouched, so page count and order
//! are preserved and only the last page's content differs.

use crate::config::StampLayout;
use crate::error::StampError;
use crate::pipeline::storage::temp_beside;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Resource name of the QR XObject (a numeric suffix is added on clashes).
const XOBJECT_NAME: &str = "SealQr";

/// Maximum `/Parent` hops when looking for inherited page resources.
const MAX_INHERITANCE_DEPTH: usize = 32;

/// Something that can stamp a QR image onto a PDF.
///
/// [`QrStamper`] is the production implementation; the registration
/// pipeline treats any `Err` as a degradation, never as a fatal error.
pub trait PdfStamper: Send + Sync {
    fn stamp(&self, source: &Path, qr_png: &Path, dest: &Path) -> Result<(), StampError>;
}

/// Stamps with `lopdf` at a fixed [`StampLayout`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QrStamper {
    pub layout: StampLayout,
}

impl QrStamper {
    pub fn new(layout: StampLayout) -> Self {
        Self { layout }
    }
}

impl PdfStamper for QrStamper {
    fn stamp(&self, source: &Path, qr_png: &Path, dest: &Path) -> Result<(), StampError> {
        stamp_last_page(source, qr_png, dest, &self.layout)
    }
}

/// Stamp `qr_png` onto the last page of `source`, writing the result to `dest`.
///
/// `dest` is written atomically and must not already exist.
pub fn stamp_last_page(
    source: &Path,
    qr_png: &Path,
    dest: &Path,
    layout: &StampLayout,
) -> Result<(), StampError> {
    let mut doc = Document::load(source).map_err(|e| StampError::Load {
        detail: e.to_string(),
    })?;

    let pages = doc.get_pages();
    let page_count = pages.len();
    let last_page = *pages.values().next_back().ok_or(StampError::NoPages)?;

    let image = qr_image_stream(qr_png)?;
    overlay_image(&mut doc, last_page, image, layout)?;

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(|e| StampError::Write {
        detail: e.to_string(),
    })?;
    persist(dest, &bytes)?;

    info!(
        "Stamped QR onto last page ({} pages) → {}",
        page_count,
        dest.display()
    );
    Ok(())
}

/// Decode the PNG and wrap it as a Flate-compressed grayscale image XObject.
fn qr_image_stream(qr_png: &Path) -> Result<Stream, StampError> {
    let qr = image::open(qr_png)
        .map_err(|e| StampError::QrImage {
            detail: format!("{}: {}", qr_png.display(), e),
        })?
        .to_luma8();
    let (width, height) = qr.dimensions();

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(qr.as_raw())
        .map_err(|e| StampError::QrImage {
            detail: e.to_string(),
        })?;
    let data = encoder.finish().map_err(|e| StampError::QrImage {
        detail: e.to_string(),
    })?;

    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", i64::from(width));
    dict.set("Height", i64::from(height));
    dict.set("ColorSpace", Object::Name(b"DeviceGray".to_vec()));
    dict.set("BitsPerComponent", 8i64);
    dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
    debug!("QR image XObject: {}x{} px, {} bytes", width, height, data.len());
    Ok(Stream::new(dict, data).with_compression(false))
}

/// Attach the image to `page_id` and draw it at `layout`.
fn overlay_image(
    doc: &mut Document,
    page_id: ObjectId,
    image: Stream,
    layout: &StampLayout,
) -> Result<(), StampError> {
    let mut resources = inherited_resources(doc, page_id)?;
    let mut xobjects = match resources.get(b"XObject") {
        Ok(Object::Dictionary(d)) => d.clone(),
        Ok(Object::Reference(id)) => doc
            .get_dictionary(*id)
            .map_err(|e| compose_error("XObject resources", e))?
            .clone(),
        _ => Dictionary::new(),
    };

    let name = free_name(&xobjects);
    let image_id = doc.add_object(image);
    xobjects.set(name.as_bytes().to_vec(), Object::Reference(image_id));
    resources.set("XObject", Object::Dictionary(xobjects));

    let existing = match doc
        .get_dictionary(page_id)
        .map_err(|e| compose_error("page dictionary", e))?
        .get(b"Contents")
    {
        Ok(Object::Reference(id)) => match doc
            .get_object(*id)
            .map_err(|e| compose_error("page contents", e))?
        {
            Object::Stream(_) => vec![Object::Reference(*id)],
            Object::Array(items) => items.clone(),
            _ => {
                return Err(StampError::Compose {
                    detail: "/Contents reference is neither a stream nor an array".into(),
                })
            }
        },
        Ok(Object::Array(items)) => items.clone(),
        Ok(_) => {
            return Err(StampError::Compose {
                detail: "/Contents is neither a stream reference nor an array".into(),
            })
        }
        Err(_) => Vec::new(),
    };

    let draw = format!(
        "Q\nq\n{size:.2} 0 0 {size:.2} {x:.2} {y:.2} cm\n/{name} Do\nQ\n",
        size = layout.size,
        x = layout.x,
        y = layout.y,
    );
    let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let draw_id = doc.add_object(Stream::new(Dictionary::new(), draw.into_bytes()));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(open_id));
    contents.extend(existing);
    contents.push(Object::Reference(draw_id));

    let page = doc
        .get_dictionary_mut(page_id)
        .map_err(|e| compose_error("page dictionary", e))?;
    page.set("Resources", Object::Dictionary(resources));
    page.set("Contents", Object::Array(contents));
    Ok(())
}

/// The page's effective `/Resources`, following `/Parent` inheritance.
fn inherited_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary, StampError> {
    let mut node = page_id;
    for _ in 0..MAX_INHERITANCE_DEPTH {
        let dict = doc
            .get_dictionary(node)
            .map_err(|e| compose_error("page tree node", e))?;
        match dict.get(b"Resources") {
            Ok(Object::Dictionary(d)) => return Ok(d.clone()),
            Ok(Object::Reference(id)) => {
                return doc
                    .get_dictionary(*id)
                    .map(Dictionary::clone)
                    .map_err(|e| compose_error("page resources", e))
            }
            Ok(_) => {
                return Err(StampError::Compose {
                    detail: "/Resources is not a dictionary".into(),
                })
            }
            Err(_) => match dict.get(b"Parent").and_then(Object::as_reference) {
                Ok(parent) => node = parent,
                Err(_) => return Ok(Dictionary::new()),
            },
        }
    }
    Err(StampError::Compose {
        detail: "page tree is too deep or cyclic".into(),
    })
}

/// First of `SealQr`, `SealQr1`, `SealQr2`, … not already in `xobjects`.
fn free_name(xobjects: &Dictionary) -> String {
    let mut name = XOBJECT_NAME.to_string();
    let mut n = 1;
    while xobjects.has(name.as_bytes()) {
        name = format!("{XOBJECT_NAME}{n}");
        n += 1;
    }
    name
}

fn compose_error(what: &str, e: lopdf::Error) -> StampError {
    StampError::Compose {
        detail: format!("{what}: {e}"),
    }
}

fn persist(dest: &Path, bytes: &[u8]) -> Result<(), StampError> {
    let write_err = |detail: String| StampError::Write { detail };
    let mut tmp = temp_beside(dest).map_err(|e| write_err(e.to_string()))?;
    tmp.write_all(bytes)
        .map_err(|e| write_err(format!("{}: {}", dest.display(), e)))?;
    tmp.persist_noclobber(dest)
        .map_err(|e| write_err(format!("{}: {}", dest.display(), e.error)))?;
    Ok(())
}
