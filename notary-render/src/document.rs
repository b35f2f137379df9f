//! Document sources: the read-only base content under the annotations.
//!
//! Pages are addressed 1-based. Sizes are in document units (points for
//! letter-size pages; pixels for pre-rasterized images).
//!
//! [`open_document`] never fails: when the requested document is missing
//! or unreadable a single-page [`PlaceholderDocument`] is substituted.

use std::path::{Path, PathBuf};

use notary_core::Color;
use thiserror::Error;
use tiny_skia::Pixmap;

use crate::renderer::Surface;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("page {page} out of range (document has {count} pages)")]
    PageOutOfRange { page: u32, count: u32 },
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("no pages found in {0}")]
    Empty(PathBuf),
}

/// Provider of base page content.
pub trait DocumentSource: Send {
    /// Total pages; at least 1.
    fn page_count(&self) -> u32;

    /// Size of `page` in document units, `None` if out of range.
    fn page_size(&self, page: u32) -> Option<(f32, f32)>;

    /// Paint the base content of `page`.
    fn paint(&self, page: u32, surface: &mut Surface<'_>) -> Result<(), DocumentError>;

    /// Human-readable name for logs and status lines.
    fn name(&self) -> &str;
}

fn check_page(page: u32, count: u32) -> Result<(), DocumentError> {
    if page == 0 || page > count {
        return Err(DocumentError::PageOutOfRange { page, count });
    }
    Ok(())
}

// ---------------------------------------------------------------
// Blank pages
// ---------------------------------------------------------------

/// Uniform white pages.
#[derive(Debug, Clone)]
pub struct BlankDocument {
    pages: u32,
    width: f32,
    height: f32,
}

impl BlankDocument {
    pub fn new(pages: u32, width: f32, height: f32) -> Self {
        Self {
            pages: pages.max(1),
            width,
            height,
        }
    }
}

impl DocumentSource for BlankDocument {
    fn page_count(&self) -> u32 {
        self.pages
    }

    fn page_size(&self, page: u32) -> Option<(f32, f32)> {
        check_page(page, self.pages).ok()?;
        Some((self.width, self.height))
    }

    fn paint(&self, page: u32, surface: &mut Surface<'_>) -> Result<(), DocumentError> {
        check_page(page, self.pages)?;
        surface.fill(Color::WHITE);
        Ok(())
    }

    fn name(&self) -> &str {
        "blank"
    }
}

// ---------------------------------------------------------------
// Placeholder
// ---------------------------------------------------------------

/// US letter in points.
pub const LETTER: (f32, f32) = (612.0, 792.0);

const RULE_COLOR: Color = Color::rgb(0xc8, 0xc8, 0xc8);

/// Single letter-size page shown when the real document is unavailable.
///
/// A heading, a short notice and a column of ruled lines for handwriting.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderDocument;

impl DocumentSource for PlaceholderDocument {
    fn page_count(&self) -> u32 {
        1
    }

    fn page_size(&self, page: u32) -> Option<(f32, f32)> {
        (page == 1).then_some(LETTER)
    }

    fn paint(&self, page: u32, surface: &mut Surface<'_>) -> Result<(), DocumentError> {
        check_page(page, 1)?;
        surface.fill(Color::WHITE);
        surface.fill_text(50.0, 60.0, "Document preview unavailable", 18.0, Color::BLACK);
        surface.fill_text(
            50.0,
            88.0,
            "Annotations made on this page are shared with the other participant.",
            11.0,
            Color::rgb(0x55, 0x55, 0x55),
        );
        let mut y = 140.0;
        while y < LETTER.1 - 60.0 {
            surface.fill_rect(50.0, y, LETTER.0 - 100.0, 1.0, RULE_COLOR);
            y += 28.0;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "placeholder"
    }
}

// ---------------------------------------------------------------
// Pre-rasterized pages
// ---------------------------------------------------------------

/// One PNG per page. Page size is the image size.
pub struct ImageDocument {
    name: String,
    pages: Vec<Pixmap>,
}

impl ImageDocument {
    /// Load the given PNG files as pages, in order.
    pub fn from_files<P: AsRef<Path>>(
        name: impl Into<String>,
        files: impl IntoIterator<Item = P>,
    ) -> Result<Self, DocumentError> {
        let name = name.into();
        let mut pages = Vec::new();
        for file in files {
            let path = file.as_ref();
            let bytes = std::fs::read(path).map_err(|source| DocumentError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let pixmap = Pixmap::decode_png(&bytes).map_err(|e| DocumentError::Decode {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            pages.push(pixmap);
        }
        if pages.is_empty() {
            return Err(DocumentError::Empty(PathBuf::from(&name)));
        }
        Ok(Self { name, pages })
    }

    /// Every `*.png` in `dir`, sorted by file name.
    pub fn open_dir(dir: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|source| DocumentError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| is_png(p))
            .collect();
        files.sort();
        if files.is_empty() {
            return Err(DocumentError::Empty(dir.to_path_buf()));
        }
        Self::from_files(dir.display().to_string(), files)
    }
}

fn is_png(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("png"))
}

impl DocumentSource for ImageDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_size(&self, page: u32) -> Option<(f32, f32)> {
        let index = usize::try_from(page).ok()?.checked_sub(1)?;
        let pixmap = self.pages.get(index)?;
        Some((pixmap.width() as f32, pixmap.height() as f32))
    }

    fn paint(&self, page: u32, surface: &mut Surface<'_>) -> Result<(), DocumentError> {
        check_page(page, self.page_count())?;
        let pixmap = &self.pages[(page - 1) as usize];
        surface.fill(Color::WHITE);
        surface.draw_image(pixmap);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Open a document, falling back to the placeholder.
///
/// `path` may be a directory of PNG pages or a single PNG file.
pub fn open_document(path: Option<&Path>) -> Box<dyn DocumentSource> {
    let Some(path) = path else {
        log::info!("No document configured, using placeholder page");
        return Box::new(PlaceholderDocument);
    };

    let result = if path.is_dir() {
        ImageDocument::open_dir(path)
    } else {
        ImageDocument::from_files(path.display().to_string(), [path])
    };

    match result {
        Ok(doc) => {
            log::info!("Loaded document {} ({} pages)", doc.name(), doc.page_count());
            Box::new(doc)
        }
        Err(e) => {
            log::warn!("Error loading document, using placeholder: {e}");
            Box::new(PlaceholderDocument)
        }
    }
}
