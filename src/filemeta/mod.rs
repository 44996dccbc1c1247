//! Metadata embedded in the image files themselves.
//!
//! The reconciler only sees the [`MetadataStore`] trait. [`EmbeddedStore`]
//! implements it for JPEG and TIFF files by editing the IPTC and XMP blocks
//! and leaving everything else in the file as it was.

pub mod iptc;
pub mod jpeg;
pub mod tiff;
pub mod xmp;

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

pub use crate::error::MetadataError;

use iptc::{IptcBlock, PHOTOSHOP_SIGNATURE};
use jpeg::{Jpeg, APP1, APP13};
use tiff::Tiff;
use xmp::{XmpFields, XMP_SIGNATURE};

/// Extensions never handed to a store, compared case-insensitively.
pub const DEFAULT_SKIP_EXTENSIONS: &[&str] = &["cr2", "nef", "arw", "mov", "mp4", "avi", "tga", "bmp"];

const JPEG_EXTENSIONS: &[&str] = &["jpg", "jpeg", "jpe"];
const TIFF_EXTENSIONS: &[&str] = &["tif", "tiff"];

const MIN_RATING: i64 = -1;
const MAX_RATING: i64 = 5;

/// Keywords, rating and caption as found in (or destined for) a file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileMetadata {
    pub keywords: Option<Vec<String>>,
    pub rating: Option<i64>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Keywords,
    Rating,
    Caption,
    /// Loading or saving the file as a whole.
    File,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Keywords => "keywords",
            Field::Rating => "rating",
            Field::Caption => "caption",
            Field::File => "file",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFailure {
    pub field: Field,
    pub message: String,
}

/// Outcome of a write. Fields are attempted independently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub failures: Vec<FieldFailure>,
}

impl WriteReport {
    pub fn fail(&mut self, field: Field, message: impl Into<String>) {
        self.failures.push(FieldFailure {
            field,
            message: message.into(),
        });
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed(&self, field: Field) -> bool {
        self.failures.iter().any(|f| f.field == field)
    }
}

pub trait MetadataStore {
    fn read(&self, path: &Path) -> Result<FileMetadata, MetadataError>;

    /// Make the file carry exactly `metadata`; `None` fields are removed.
    fn write(&self, path: &Path, metadata: &FileMetadata) -> WriteReport;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipList {
    extensions: HashSet<String>,
}

impl SkipList {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self { extensions }
    }

    pub fn is_skipped(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.contains(&e.to_lowercase()))
            .unwrap_or(false)
    }
}

impl Default for SkipList {
    fn default() -> Self {
        Self::new(DEFAULT_SKIP_EXTENSIONS)
    }
}

/// An image file opened for metadata editing.
enum Container {
    /// IPTC in an APP13 Photoshop resource block, XMP in APP1.
    Jpeg(Jpeg),
    /// IPTC and XMP in IFD0 tags.
    Tiff(Tiff),
}

impl Container {
    fn load(path: &Path) -> Result<Self, MetadataError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        if JPEG_EXTENSIONS.contains(&extension.as_str()) {
            Ok(Container::Jpeg(Jpeg::parse(&fs::read(path)?)?))
        } else if TIFF_EXTENSIONS.contains(&extension.as_str()) {
            Ok(Container::Tiff(Tiff::parse(&fs::read(path)?)?))
        } else {
            Err(MetadataError::UnsupportedFormat(path.display().to_string()))
        }
    }

    fn iptc(&self) -> Result<IptcBlock, MetadataError> {
        match self {
            Container::Jpeg(jpeg) => match jpeg.app_segment(APP13, PHOTOSHOP_SIGNATURE) {
                Some(body) => IptcBlock::parse(body),
                None => Ok(IptcBlock::default()),
            },
            Container::Tiff(tiff) => match tiff.field(tiff::IPTC_TAG)? {
                Some(stream) => IptcBlock::from_datasets(stream),
                None => Ok(IptcBlock::default()),
            },
        }
    }

    /// The XMP packet text, without the padding some writers leave behind.
    fn xmp_packet(&self) -> Result<Option<String>, MetadataError> {
        let raw = match self {
            Container::Jpeg(jpeg) => jpeg.app_segment(APP1, XMP_SIGNATURE),
            Container::Tiff(tiff) => tiff.field(tiff::XMP_TAG)?,
        };
        Ok(raw.map(|body| {
            String::from_utf8_lossy(body)
                .trim_end_matches(['\0', ' ', '\n', '\r'])
                .to_string()
        }))
    }

    fn set_iptc(&mut self, iptc: &IptcBlock) {
        match self {
            Container::Jpeg(jpeg) => jpeg.set_app_segment(APP13, PHOTOSHOP_SIGNATURE, iptc.to_app13_body()),
            Container::Tiff(tiff) => tiff.set_iptc(iptc.to_datasets()),
        }
    }

    fn set_xmp(&mut self, packet: String) {
        match self {
            Container::Jpeg(jpeg) => jpeg.set_app_segment(APP1, XMP_SIGNATURE, Some(packet.into_bytes())),
            Container::Tiff(tiff) => tiff.set_xmp(Some(packet.into_bytes())),
        }
    }

    fn to_bytes(&self) -> Result<Vec<u8>, MetadataError> {
        match self {
            Container::Jpeg(jpeg) => jpeg.to_bytes(),
            Container::Tiff(tiff) => tiff.to_bytes(),
        }
    }
}

/// Replace `path` with `bytes` through a sibling temporary file, so the
/// original stays intact until the new content is complete on disk.
fn save_atomically(path: &Path, bytes: &[u8]) -> Result<(), MetadataError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().set_permissions(fs::metadata(path)?.permissions())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| MetadataError::Io(e.error))?;
    Ok(())
}

/// Reads and writes IPTC/XMP metadata embedded in JPEG and TIFF files.
///
/// Keywords come from IPTC, falling back to XMP `dc:subject`, and are written
/// to both. The rating lives in XMP and the caption in IPTC. Values are
/// written whole; no length limits are applied.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedStore;

impl MetadataStore for EmbeddedStore {
    fn read(&self, path: &Path) -> Result<FileMetadata, MetadataError> {
        let container = Container::load(path)?;
        let iptc = container.iptc()?;
        let xmp = match container.xmp_packet()? {
            Some(packet) => xmp::parse(&packet)?,
            None => XmpFields::default(),
        };

        let keywords = iptc
            .keywords()
            .or(xmp.subject)
            .filter(|keywords| !keywords.is_empty());

        Ok(FileMetadata {
            keywords,
            rating: xmp.rating,
            caption: iptc.caption(),
        })
    }

    fn write(&self, path: &Path, metadata: &FileMetadata) -> WriteReport {
        let mut report = WriteReport::default();

        let loaded = Container::load(path).and_then(|container| {
            let iptc = container.iptc()?;
            let packet = container.xmp_packet()?;
            let current = packet.as_deref().map(xmp::parse).transpose()?.unwrap_or_default();
            Ok((container, iptc, packet, current))
        });
        let (mut container, mut iptc, packet, current) = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                report.fail(Field::File, e.to_string());
                return report;
            }
        };

        let subject = metadata.keywords.clone().unwrap_or_default();
        iptc.set_keywords(&subject);

        let rating = match metadata.rating {
            Some(rating) if !(MIN_RATING..=MAX_RATING).contains(&rating) => {
                report.fail(
                    Field::Rating,
                    format!("rating {} outside {}..={}", rating, MIN_RATING, MAX_RATING),
                );
                current.rating
            }
            rating => rating,
        };

        iptc.set_caption(metadata.caption.as_deref());

        if packet.is_some() || !subject.is_empty() || rating.is_some() {
            match xmp::rewrite(packet.as_deref(), &subject, rating) {
                Ok(packet) => container.set_xmp(packet),
                Err(e) => {
                    report.fail(Field::Keywords, e.to_string());
                    report.fail(Field::Rating, e.to_string());
                }
            }
        }
        container.set_iptc(&iptc);

        match container.to_bytes().and_then(|bytes| save_atomically(path, &bytes)) {
            Ok(()) => {}
            Err(e) => report.fail(Field::File, e.to_string()),
        }

        debug!(path = %path.display(), failures = report.failures.len(), "Wrote embedded metadata");
        report
    }
}
