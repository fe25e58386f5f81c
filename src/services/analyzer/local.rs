use super::{AnalysisError, Analyzer};
use crate::models::{RawLabel, TagSource};
use async_trait::async_trait;
use bytes::Bytes;
use image::{ColorType, DynamicImage};
use std::io::Cursor;
use tracing::debug;

// Fixed heuristic confidences. They are not estimates, just a ranking between signals.
const TYPE_CONFIDENCE: f32 = 0.8;
const SHAPE_CONFIDENCE: f32 = 0.7;
const COLOR_CONFIDENCE: f32 = 0.7;
const CAMERA_CONFIDENCE: f32 = 0.7;
const PAGES_CONFIDENCE: f32 = 0.75;
const TEXT_CONFIDENCE: f32 = 0.7;
const FALLBACK_CONFIDENCE: f32 = 0.5;

/// Pages read for keyword extraction
const TEXT_SAMPLE_PAGES: u32 = 3;
/// Upper bound on extracted characters
const TEXT_SAMPLE_CHARS: usize = 10_000;
const TEXT_HEAVY_WORDS: usize = 1000;

const PDF_KEYWORDS: &[(&str, &[&str])] = &[
    ("invoice", &["invoice", "payment", "amount due"]),
    ("financial", &["financial", "accounting", "balance sheet"]),
    ("contract", &["contract", "agreement"]),
    ("legal", &["legal", "court", "jurisdiction"]),
    ("proposal", &["proposal", "quotation"]),
    ("budget", &["budget", "cost"]),
    ("report", &["report", "analysis"]),
    ("presentation", &["presentation", "slide"]),
];

/// Local variant of the analyzer. Uses only the bytes at hand: file type, image geometry and
/// colour, EXIF presence, PDF page count and a bounded text sample.
#[derive(Debug, Default, Clone)]
pub struct LocalAnalyzer;

impl LocalAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous heuristics. CPU-bound, call from a blocking context.
    pub fn analyze_bytes(bytes: &[u8], file_type: &str) -> Vec<RawLabel> {
        if file_type.starts_with("image/") {
            Self::analyze_image(bytes, file_type)
        } else if file_type == "application/pdf" {
            Self::analyze_pdf(bytes)
        } else {
            let family = file_type.split('/').next().unwrap_or("other");
            vec![RawLabel::new(family, FALLBACK_CONFIDENCE)]
        }
    }

    fn analyze_image(bytes: &[u8], file_type: &str) -> Vec<RawLabel> {
        let mut labels = vec![RawLabel::new("image", TYPE_CONFIDENCE)];
        if let Some(format) = file_type.strip_prefix("image/") {
            labels.push(RawLabel::new(format, TYPE_CONFIDENCE));
        }

        let decoded = image::io::Reader::new(Cursor::new(bytes))
            .with_guessed_format()
            .ok()
            .and_then(|reader| reader.decode().ok());

        match decoded {
            Some(img) => {
                labels.extend(geometry_labels(img.width(), img.height()));
                labels.extend(color_mode_labels(img.color()));
                labels.extend(dominant_color_label(&img));
            }
            None => debug!(file_type, "local analyzer: image could not be decoded"),
        }

        let exif_reader = exif::Reader::new();
        if let Ok(exif) = exif_reader.read_from_container(&mut Cursor::new(bytes)) {
            labels.push(RawLabel::new("has-exif", SHAPE_CONFIDENCE));
            if let Some(model) = exif.get_field(exif::Tag::Model, exif::In::PRIMARY) {
                let model = model.display_value().to_string();
                let model = model.trim_matches('"').trim();
                if !model.is_empty() {
                    labels.push(RawLabel::new(model, CAMERA_CONFIDENCE));
                }
            }
        }

        labels
    }

    fn analyze_pdf(bytes: &[u8]) -> Vec<RawLabel> {
        let mut labels = vec![
            RawLabel::new("pdf", TYPE_CONFIDENCE),
            RawLabel::new("document", TYPE_CONFIDENCE),
        ];

        match lopdf::Document::load_mem(bytes) {
            Ok(doc) => {
                if doc.is_encrypted() {
                    labels.push(RawLabel::new("encrypted", TYPE_CONFIDENCE));
                }

                let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
                labels.push(RawLabel::new(page_bucket(pages.len()), PAGES_CONFIDENCE));

                let sample: Vec<u32> = pages
                    .into_iter()
                    .take(TEXT_SAMPLE_PAGES as usize)
                    .collect();
                if let Ok(text) = doc.extract_text(&sample) {
                    let text: String = text.chars().take(TEXT_SAMPLE_CHARS).collect();
                    labels.extend(text_labels(&text));
                }
            }
            Err(e) => {
                let message = e.to_string().to_lowercase();
                if message.contains("password") || message.contains("encrypt") {
                    labels.push(RawLabel::new("encrypted", TYPE_CONFIDENCE));
                } else {
                    debug!(error = %e, "local analyzer: pdf could not be parsed");
                }
            }
        }

        labels
    }
}

#[async_trait]
impl Analyzer for LocalAnalyzer {
    fn source(&self) -> TagSource {
        TagSource::LocalHeuristic
    }

    async fn analyze(&self, data: Bytes, file_type: &str) -> Result<Vec<RawLabel>, AnalysisError> {
        let file_type = file_type.to_string();
        tokio::task::spawn_blocking(move || Self::analyze_bytes(&data, &file_type))
            .await
            .map_err(|e| AnalysisError::Unavailable(format!("local analysis task failed: {}", e)))
    }
}

pub(crate) fn geometry_labels(width: u32, height: u32) -> Vec<RawLabel> {
    let mut labels = Vec::new();

    let ratio = if height > 0 {
        width as f64 / height as f64
    } else {
        1.0
    };
    if (0.9..=1.1).contains(&ratio) {
        labels.push(RawLabel::new("square", SHAPE_CONFIDENCE));
    } else if ratio > 1.5 {
        labels.push(RawLabel::new("landscape", SHAPE_CONFIDENCE));
    } else if ratio < 0.7 {
        labels.push(RawLabel::new("portrait", SHAPE_CONFIDENCE));
    }

    let pixels = width as u64 * height as u64;
    let resolution = if pixels >= 3840 * 2160 {
        "4k"
    } else if pixels >= 1920 * 1080 {
        "high resolution"
    } else if pixels >= 800 * 600 {
        "standard resolution"
    } else {
        "low resolution"
    };
    labels.push(RawLabel::new(resolution, SHAPE_CONFIDENCE));

    labels
}

fn color_mode_labels(color: ColorType) -> Vec<RawLabel> {
    let names: &[&str] = match color {
        ColorType::L8 | ColorType::L16 | ColorType::La8 | ColorType::La16 => &["grayscale"],
        ColorType::Rgba8 | ColorType::Rgba16 | ColorType::Rgba32F => &["color", "transparent"],
        _ => &["color"],
    };
    names
        .iter()
        .map(|n| RawLabel::new(*n, SHAPE_CONFIDENCE))
        .collect()
}

fn dominant_color_label(img: &DynamicImage) -> Option<RawLabel> {
    if matches!(img.color(), ColorType::L8 | ColorType::L16) {
        return None;
    }
    let average = img.thumbnail_exact(1, 1).to_rgb8();
    let [r, g, b] = average.get_pixel(0, 0).0;
    classify_color(r, g, b).map(|name| RawLabel::new(name, COLOR_CONFIDENCE))
}

pub(crate) fn classify_color(r: u8, g: u8, b: u8) -> Option<&'static str> {
    if r > 200 && g < 100 && b < 100 {
        Some("red")
    } else if r < 100 && g > 200 && b < 100 {
        Some("green")
    } else if r < 100 && g < 100 && b > 200 {
        Some("blue")
    } else if r > 200 && g > 200 && b > 200 {
        Some("bright")
    } else if r < 50 && g < 50 && b < 50 {
        Some("dark")
    } else {
        None
    }
}

pub(crate) fn page_bucket(pages: usize) -> &'static str {
    match pages {
        0..=3 => "single-page",
        4..=5 => "short-document",
        6..=20 => "medium-document",
        _ => "long-document",
    }
}

pub(crate) fn text_labels(text: &str) -> Vec<RawLabel> {
    let text = text.to_lowercase();
    let mut labels = Vec::new();

    if text.split_whitespace().count() > TEXT_HEAVY_WORDS {
        labels.push(RawLabel::new("text-heavy", TEXT_CONFIDENCE));
    }

    for (category, keywords) in PDF_KEYWORDS {
        if keywords.iter().any(|k| text.contains(k)) {
            labels.push(RawLabel::new(*category, TEXT_CONFIDENCE));
        }
    }

    labels
}
