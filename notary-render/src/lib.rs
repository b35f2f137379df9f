//! # notary-render
//!
//! CPU rasterizer for annotated document pages, built on `tiny-skia`.
//!
//! ## Architecture
//!
//! ```text
//!  DocumentSource (base page)
//!       │
//!       ▼
//!  PageRenderer.render(doc, page, ops)
//!       │   strokes: polyline, round caps/joins
//!       │   text:    cosmic-text glyphs at the baseline anchor
//!       ▼
//!  Frame (RGBA pixmap, PNG export)
//! ```
//!
//! ## Crate modules
//!
//! - [`document`]: document sources and placeholder fallback
//! - [`renderer`]: surface, frame and page renderer
//! - [`text`]: glyph shaping and rasterization

pub mod document;
pub mod renderer;
pub mod text;

pub use document::{
    open_document, BlankDocument, DocumentError, DocumentSource, ImageDocument,
    PlaceholderDocument, LETTER,
};
pub use renderer::{Frame, PageRenderer, RenderConfig, RenderError, Surface, MAX_TEXT_PX};
pub use text::TextEngine;
