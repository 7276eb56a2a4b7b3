use std::path::PathBuf;

use autodamage_core::format_utc;
use image::{GenericImageView, ImageFormat};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{Report, ReportImage};

// A4 portrait, in points.
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 56;
const IMAGE_GAP: i64 = 12;

pub const DOCUMENT_TITLE: &str = "AutoDamage AI - Damage Assessment Report";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("pdf assembly failed: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("pdf write failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
enum EmbedError {
    #[error("decode: {0}")]
    Decode(#[from] image::ImageError),
    #[error("scratch file: {0}")]
    Io(#[from] std::io::Error),
}

/// An attached image that could not be put into the document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedFailure {
    pub index: usize,
    pub name: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default)]
pub struct DocumentSettings {
    /// Where images are materialized while being embedded. System temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct RenderedDocument {
    pub bytes: Vec<u8>,
    pub page_count: usize,
    pub embedded_images: usize,
    pub failures: Vec<EmbedFailure>,
}

impl RenderedDocument {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

struct EmbeddedImage {
    id: ObjectId,
    width: u32,
    height: u32,
}

/// Render `report` as a PDF. Page one carries the assessment; page two, when
/// any image embeds, carries up to the first three attached images.
///
/// Images are embedded one at a time; an image that fails is recorded in
/// `failures` and the rest of the document is still produced.
pub fn render_document(report: &Report, settings: &DocumentSettings) -> Result<RenderedDocument, DocumentError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular = doc.add_object(font("Helvetica"));
    let bold = doc.add_object(font("Helvetica-Bold"));
    let fonts = dictionary! { "F1" => regular, "F2" => bold };

    let mut kids: Vec<Object> = Vec::new();
    let summary = summary_page(report)?;
    kids.push(add_page(&mut doc, pages_id, summary, dictionary! { "Font" => fonts.clone() }).into());

    let mut embedded = Vec::new();
    let mut failures = Vec::new();
    for (index, image) in report.document_images().iter().enumerate() {
        match embed_image(&mut doc, image, settings) {
            Ok(e) => embedded.push(e),
            Err(err) => {
                warn!(report = %report.id, image = %image.name, "image not embedded: {}", err);
                failures.push(EmbedFailure { index, name: image.name.clone(), reason: err.to_string() });
            }
        }
    }

    if !embedded.is_empty() {
        let mut xobjects = Dictionary::new();
        for (i, e) in embedded.iter().enumerate() {
            xobjects.set(format!("Im{}", i + 1), e.id);
        }
        let content = image_page(&embedded)?;
        let resources = dictionary! { "Font" => fonts, "XObject" => xobjects };
        kids.push(add_page(&mut doc, pages_id, content, resources).into());
    }

    let page_count = kids.len();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(DOCUMENT_TITLE),
        "Producer" => Object::string_literal("autodamage"),
    });
    doc.trailer.set("Info", info_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    debug!(report = %report.id, pages = page_count, images = embedded.len(), "document rendered");

    Ok(RenderedDocument { bytes, page_count, embedded_images: embedded.len(), failures })
}

fn font(base: &str) -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base,
        "Encoding" => "WinAnsiEncoding",
    }
}

fn add_page(doc: &mut Document, parent: ObjectId, content: Vec<u8>, resources: Dictionary) -> ObjectId {
    let content_id = doc.add_object(Stream::new(dictionary! {}, content));
    doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => parent,
        "Contents" => content_id,
        "Resources" => resources,
        "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    })
}

fn summary_page(report: &Report) -> Result<Vec<u8>, DocumentError> {
    let mut ops = Vec::new();
    let mut y = PAGE_HEIGHT - MARGIN - 18;
    ops.extend(text_line("F2", 18, MARGIN, y, DOCUMENT_TITLE));
    y -= 30;
    if let Some(reference) = &report.reference_id {
        ops.extend(text_line("F1", 11, MARGIN, y, &format!("Claim Reference: {}", reference)));
        y -= 16;
    }
    ops.extend(text_line("F1", 11, MARGIN, y, &format!("Generated: {}", format_utc(report.created_at_unix))));
    y -= 32;
    for (label, value) in report.fields() {
        ops.extend(text_line("F2", 12, MARGIN, y, &format!("{}:", label)));
        ops.extend(text_line("F1", 12, MARGIN + 170, y, &value));
        y -= 20;
    }
    Ok(Content { operations: ops }.encode()?)
}

fn image_page(images: &[EmbeddedImage]) -> Result<Vec<u8>, DocumentError> {
    let header_y = PAGE_HEIGHT - MARGIN - 16;
    let mut ops = text_line("F2", 16, MARGIN, header_y, "Attached Images");

    let box_w = PAGE_WIDTH - 2 * MARGIN;
    let slots = crate::MAX_DOCUMENT_IMAGES as i64;
    let slot_h = (header_y - 24 - MARGIN) / slots;
    let box_h = slot_h - IMAGE_GAP;
    let mut top = header_y - 24;
    for (i, image) in images.iter().enumerate() {
        let (w, h) = fit(image.width, image.height, box_w, box_h);
        ops.push(Operation::new("q", vec![]));
        ops.push(Operation::new("cm", vec![w.into(), 0.into(), 0.into(), h.into(), MARGIN.into(), (top - h).into()]));
        ops.push(Operation::new("Do", vec![format!("Im{}", i + 1).as_str().into()]));
        ops.push(Operation::new("Q", vec![]));
        top -= slot_h;
    }
    Ok(Content { operations: ops }.encode()?)
}

/// Largest size with the image's aspect ratio inside `max_w` x `max_h`.
fn fit(width: u32, height: u32, max_w: i64, max_h: i64) -> (i64, i64) {
    let (w, h) = (width.max(1) as f64, height.max(1) as f64);
    let scale = (max_w as f64 / w).min(max_h as f64 / h);
    (((w * scale).round() as i64).max(1), ((h * scale).round() as i64).max(1))
}

/// Decode, re-encode as JPEG through a scratch file, and add as an image
/// XObject. The scratch file is removed when this returns, whatever the outcome.
fn embed_image(doc: &mut Document, image: &ReportImage, settings: &DocumentSettings) -> Result<EmbeddedImage, EmbedError> {
    let decoded = image::load_from_memory(&image.bytes)?;
    let (width, height) = decoded.dimensions();

    let mut builder = tempfile::Builder::new();
    builder.prefix("autodamage-embed-").suffix(".jpg");
    let scratch = match &settings.scratch_dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    decoded.to_rgb8().save_with_format(scratch.path(), ImageFormat::Jpeg)?;
    let jpeg = std::fs::read(scratch.path())?;
    drop(scratch);

    let id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg,
    ));
    Ok(EmbeddedImage { id, width, height })
}

fn text_line(font: &str, size: i64, x: i64, y: i64, text: &str) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![font.into(), size.into()]),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new("Tj", vec![Object::String(win_ansi(text), StringFormat::Literal)]),
        Operation::new("ET", vec![]),
    ]
}

/// WinAnsi bytes for the standard fonts. Unmappable characters become `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '€' => 0x80,
            ' '..='~' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}
