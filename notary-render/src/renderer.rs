//! Deterministic page renderer.
//!
//! Replays a page's live operations over the document's base content:
//!
//! ```text
//! base page ──▸ strokes (sequence order) ──▸ text (sequence order) ──▸ Frame
//! ```
//!
//! Output depends only on (document content, operation sequence, scale).

use std::path::Path;

use notary_core::{Color, Operation, Point};
use thiserror::Error;
use tiny_skia::{
    FilterQuality, LineCap, LineJoin, Paint, PathBuilder, Pixmap, PixmapPaint, Rect, Stroke,
    Transform,
};

use crate::document::{DocumentError, DocumentSource};
use crate::text::TextEngine;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("page {page} out of range (document has {count} pages)")]
    PageOutOfRange { page: u32, count: u32 },
    #[error("invalid render scale {0}")]
    InvalidScale(f32),
    #[error("cannot allocate a {width}x{height} surface")]
    InvalidSize { width: u32, height: u32 },
    #[error("document error: {0}")]
    Document(#[from] DocumentError),
    #[error("PNG encoding failed: {0}")]
    Encode(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Renderer settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderConfig {
    /// Device pixels per document unit.
    pub scale: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { scale: 1.0 }
    }
}

// ---------------------------------------------------------------
// Surface
// ---------------------------------------------------------------

/// Largest glyph size the surface rasterizes, in device pixels.
pub const MAX_TEXT_PX: f32 = 2048.0;

/// Drawing target handed to document sources and annotation replay.
///
/// All coordinates are in document units; the surface applies the
/// render scale.
pub struct Surface<'a> {
    pixmap: &'a mut Pixmap,
    scale: f32,
    text: &'a mut Option<TextEngine>,
}

impl<'a> Surface<'a> {
    fn new(pixmap: &'a mut Pixmap, scale: f32, text: &'a mut Option<TextEngine>) -> Self {
        Self { pixmap, scale, text }
    }

    fn transform(&self) -> Transform {
        Transform::from_scale(self.scale, self.scale)
    }

    fn paint(color: Color) -> Paint<'static> {
        let mut paint = Paint::default();
        paint.set_color_rgba8(color.r, color.g, color.b, 255);
        paint.anti_alias = true;
        paint
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Device size in pixels.
    pub fn pixel_size(&self) -> (u32, u32) {
        (self.pixmap.width(), self.pixmap.height())
    }

    /// Fill the whole surface.
    pub fn fill(&mut self, color: Color) {
        self.pixmap
            .fill(tiny_skia::Color::from_rgba8(color.r, color.g, color.b, 255));
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Color) {
        let Some(rect) = Rect::from_xywh(x, y, width, height) else {
            return;
        };
        let transform = self.transform();
        self.pixmap.fill_rect(rect, &Self::paint(color), transform, None);
    }

    /// Draw a pre-rasterized image with its top-left at the document origin.
    pub fn draw_image(&mut self, image: &Pixmap) {
        let quality = if self.scale == 1.0 {
            FilterQuality::Nearest
        } else {
            FilterQuality::Bilinear
        };
        let paint = PixmapPaint {
            quality,
            ..PixmapPaint::default()
        };
        let transform = self.transform();
        self.pixmap
            .draw_pixmap(0, 0, image.as_ref(), &paint, transform, None);
    }

    /// Stroke a polyline with round caps and joins.
    ///
    /// Fewer than two points is a bare move and draws nothing.
    pub fn stroke_polyline(&mut self, points: &[Point], color: Color, width: f32) {
        let [first, rest @ ..] = points else {
            return;
        };
        if rest.is_empty() {
            return;
        }
        let mut pb = PathBuilder::new();
        pb.move_to(first.x, first.y);
        for p in rest {
            pb.line_to(p.x, p.y);
        }
        let Some(path) = pb.finish() else {
            return;
        };
        let stroke = Stroke {
            width,
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Stroke::default()
        };
        let transform = self.transform();
        self.pixmap
            .stroke_path(&path, &Self::paint(color), &stroke, transform, None);
    }

    /// Filled text; `(x, y)` is the start of the baseline.
    ///
    /// Text whose device size is not in `(0, MAX_TEXT_PX]` is skipped.
    pub fn fill_text(&mut self, x: f32, y: f32, value: &str, font_size: f32, color: Color) {
        if value.is_empty() {
            return;
        }
        let size = font_size * self.scale;
        if !(size > 0.0 && size <= MAX_TEXT_PX) {
            log::warn!("Skipping text at {size}px, outside the glyph raster limit");
            return;
        }
        let engine = self.text.get_or_insert_with(TextEngine::new);
        engine.draw(self.pixmap, x * self.scale, y * self.scale, value, size, color);
    }
}

// ---------------------------------------------------------------
// Frame
// ---------------------------------------------------------------

/// A rendered page.
#[derive(Clone)]
pub struct Frame {
    page: u32,
    pixmap: Pixmap,
}

impl Frame {
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Straight-alpha RGBA at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let c = self.pixmap.pixel(x, y)?.demultiply();
        Some([c.red(), c.green(), c.blue(), c.alpha()])
    }

    /// Premultiplied RGBA bytes, row-major.
    pub fn data(&self) -> &[u8] {
        self.pixmap.data()
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, RenderError> {
        self.pixmap
            .encode_png()
            .map_err(|e| RenderError::Encode(e.to_string()))
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<(), RenderError> {
        std::fs::write(path, self.encode_png()?)?;
        Ok(())
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.width() == other.width()
            && self.height() == other.height()
            && self.data() == other.data()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("page", &self.page)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

// ---------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------

/// Replays annotation operations onto document pages.
///
/// The glyph engine is created on the first text draw and reused.
pub struct PageRenderer {
    config: RenderConfig,
    text: Option<TextEngine>,
    frames_rendered: u64,
}

impl PageRenderer {
    pub fn new(config: RenderConfig) -> Result<Self, RenderError> {
        if !config.scale.is_finite() || config.scale <= 0.0 {
            return Err(RenderError::InvalidScale(config.scale));
        }
        Ok(Self {
            config,
            text: None,
            frames_rendered: 0,
        })
    }

    pub fn config(&self) -> RenderConfig {
        self.config
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Render `page` of `document` with the given live operations.
    ///
    /// Strokes are drawn first, then text, each in sequence order.
    /// `Clear` never appears in live state; if passed it is ignored.
    pub fn render(
        &mut self,
        document: &dyn DocumentSource,
        page: u32,
        ops: &[Operation],
    ) -> Result<Frame, RenderError> {
        let count = document.page_count();
        let (doc_w, doc_h) = document
            .page_size(page)
            .filter(|_| page >= 1 && page <= count)
            .ok_or(RenderError::PageOutOfRange { page, count })?;

        let scale = self.config.scale;
        let width = (doc_w * scale).ceil().max(1.0) as u32;
        let height = (doc_h * scale).ceil().max(1.0) as u32;
        let mut pixmap =
            Pixmap::new(width, height).ok_or(RenderError::InvalidSize { width, height })?;

        {
            let mut surface = Surface::new(&mut pixmap, scale, &mut self.text);
            document.paint(page, &mut surface)?;

            for op in ops {
                if let Operation::Draw(draw) = op {
                    surface.stroke_polyline(&draw.path, draw.color, draw.stroke_width);
                }
            }
            for op in ops {
                if let Operation::Text(text) = op {
                    surface.fill_text(text.x, text.y, &text.value, text.font_size, text.color);
                }
            }
        }

        self.frames_rendered += 1;
        log::trace!("Rendered page {page} ({width}x{height}, {} ops)", ops.len());
        Ok(Frame { page, pixmap })
    }
}
