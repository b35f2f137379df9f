//! Annotation operations: the atomic unit of collaboration.
//!
//! Every mutation of the shared annotation surface is one [`Operation`].
//! Operations are immutable values; they serialize to the tagged JSON
//! objects exchanged over the peer data channel:
//!
//! ```text
//! { "type": "draw",  "page": 1, "path": [[x,y], ...], "color": "#rrggbb", "strokeWidth": 2 }
//! { "type": "text",  "page": 1, "x": 5, "y": 5, "value": "OK", "fontSize": 12, "color": "#000000" }
//! { "type": "clear", "page": 1 }
//! ```
//!
//! Coordinates are in document space, independent of render scale.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest accepted text size, in document units.
pub const MAX_FONT_SIZE: f32 = 512.0;

/// Validation failures for a single operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OperationError {
    #[error("page index must be 1-based, got {0}")]
    InvalidPage(u32),
    #[error("draw path is empty")]
    EmptyPath,
    #[error("stroke width must be at least 1, got {0}")]
    InvalidStrokeWidth(f32),
    #[error("font size must be in (0, 512], got {0}")]
    InvalidFontSize(f32),
    #[error("non-finite coordinate in {0}")]
    NonFinite(&'static str),
    #[error("invalid color '{0}', expected #RRGGBB")]
    InvalidColor(String),
}

// ---------------------------------------------------------------
// Geometry & color
// ---------------------------------------------------------------

/// A point in document coordinates. Serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<[f32; 2]> for Point {
    fn from([x, y]: [f32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f32; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

/// Opaque RGB color. Parsed from `#RRGGBB` (any case), written lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const RED: Color = Color::rgb(255, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Lowercase `#rrggbb` form.
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Color {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || OperationError::InvalidColor(s.to_string());
        let hex = s.strip_prefix('#').ok_or_else(invalid)?;
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        Ok(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl TryFrom<String> for Color {
    type Error = OperationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(c: Color) -> Self {
        c.to_hex()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// ---------------------------------------------------------------
// Operation variants
// ---------------------------------------------------------------

/// A freehand stroke rendered as a polyline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawOp {
    pub page: u32,
    pub path: Vec<Point>,
    pub color: Color,
    pub stroke_width: f32,
}

/// Filled text anchored at its baseline origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextOp {
    pub page: u32,
    pub x: f32,
    pub y: f32,
    pub value: String,
    pub font_size: f32,
    pub color: Color,
}

/// Drops every live operation on `page`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearOp {
    pub page: u32,
}

/// Discriminant of an [`Operation`], handy for logs and stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Draw,
    Text,
    Clear,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationKind::Draw => "draw",
            OperationKind::Text => "text",
            OperationKind::Clear => "clear",
        })
    }
}

/// One atomic annotation mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Operation {
    Draw(DrawOp),
    Text(TextOp),
    Clear(ClearOp),
}

impl Operation {
    pub fn draw(page: u32, path: impl IntoIterator<Item = Point>, color: Color, stroke_width: f32) -> Self {
        Operation::Draw(DrawOp {
            page,
            path: path.into_iter().collect(),
            color,
            stroke_width,
        })
    }

    pub fn text(page: u32, x: f32, y: f32, value: impl Into<String>, font_size: f32, color: Color) -> Self {
        Operation::Text(TextOp {
            page,
            x,
            y,
            value: value.into(),
            font_size,
            color,
        })
    }

    pub fn clear(page: u32) -> Self {
        Operation::Clear(ClearOp { page })
    }

    /// 1-based page this operation targets.
    pub fn page(&self) -> u32 {
        match self {
            Operation::Draw(op) => op.page,
            Operation::Text(op) => op.page,
            Operation::Clear(op) => op.page,
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Draw(_) => OperationKind::Draw,
            Operation::Text(_) => OperationKind::Text,
            Operation::Clear(_) => OperationKind::Clear,
        }
    }

    /// Check the structural invariants of the operation.
    ///
    /// Colors are already validated at construction/deserialization.
    pub fn validate(&self) -> Result<(), OperationError> {
        let page = self.page();
        if page == 0 {
            return Err(OperationError::InvalidPage(page));
        }
        match self {
            Operation::Draw(op) => {
                if op.path.is_empty() {
                    return Err(OperationError::EmptyPath);
                }
                if !op.path.iter().all(Point::is_finite) {
                    return Err(OperationError::NonFinite("draw path"));
                }
                if !op.stroke_width.is_finite() || op.stroke_width < 1.0 {
                    return Err(OperationError::InvalidStrokeWidth(op.stroke_width));
                }
            }
            Operation::Text(op) => {
                if !op.x.is_finite() || !op.y.is_finite() {
                    return Err(OperationError::NonFinite("text anchor"));
                }
                if !(op.font_size > 0.0 && op.font_size <= MAX_FONT_SIZE) {
                    return Err(OperationError::InvalidFontSize(op.font_size));
                }
            }
            Operation::Clear(_) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn red_stroke() -> Operation {
        Operation::draw(
            1,
            [Point::new(10.0, 10.0), Point::new(20.0, 20.0)],
            Color::RED,
            3.0,
        )
    }

    #[test]
    fn test_draw_wire_shape() {
        let json = serde_json::to_value(red_stroke()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "draw",
                "page": 1,
                "path": [[10.0, 10.0], [20.0, 20.0]],
                "color": "#ff0000",
                "strokeWidth": 3.0
            })
        );
    }

    #[test]
    fn test_text_wire_shape() {
        let op = Operation::text(2, 5.0, 6.0, "OK", 12.0, Color::BLACK);
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["fontSize"], 12.0);
        assert_eq!(json["value"], "OK");
        assert_eq!(json["color"], "#000000");
        assert_eq!(json["page"], 2);
    }

    #[test]
    fn test_clear_wire_shape() {
        let json = serde_json::to_string(&Operation::clear(4)).unwrap();
        assert_eq!(json, r##"{"type":"clear","page":4}"##);
    }

    #[test]
    fn test_each_kind_roundtrips() {
        let ops = [
            red_stroke(),
            Operation::text(1, 5.0, 5.0, "Signed here", 14.5, Color::rgb(0x12, 0x34, 0xab)),
            Operation::clear(3),
        ];
        for op in ops {
            let json = serde_json::to_string(&op).unwrap();
            let back: Operation = serde_json::from_str(&json).unwrap();
            assert_eq!(back, op);
        }
    }

    #[test]
    fn test_color_parse_case_insensitive() {
        let c: Color = "#FFaa00".parse().unwrap();
        assert_eq!(c, Color::rgb(255, 170, 0));
        assert_eq!(c.to_hex(), "#ffaa00");
    }

    #[test]
    fn test_color_rejects_garbage() {
        for bad in ["ff0000", "#ff00", "#gg0000", "#ff00000", "red", "#ff00é"] {
            assert!(bad.parse::<Color>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(serde_json::from_str::<Operation>(r#"{"type":"unknown"}"#).is_err());
        assert!(serde_json::from_str::<Operation>(r#"{"page":1}"#).is_err());
    }

    #[test]
    fn test_validate() {
        assert!(red_stroke().validate().is_ok());
        assert_eq!(Operation::clear(0).validate(), Err(OperationError::InvalidPage(0)));
        assert_eq!(
            Operation::draw(1, [], Color::RED, 2.0).validate(),
            Err(OperationError::EmptyPath)
        );
        assert_eq!(
            Operation::draw(1, [Point::new(0.0, 0.0)], Color::RED, 0.5).validate(),
            Err(OperationError::InvalidStrokeWidth(0.5))
        );
        assert!(Operation::draw(1, [Point::new(f32::NAN, 0.0)], Color::RED, 2.0)
            .validate()
            .is_err());
        assert!(Operation::text(1, 0.0, 0.0, "x", 0.0, Color::BLACK).validate().is_err());
    }

    #[test]
    fn test_font_size_upper_bound() {
        let text = |size| Operation::text(1, 5.0, 5.0, "W", size, Color::BLACK);
        assert!(text(MAX_FONT_SIZE).validate().is_ok());
        assert_eq!(
            text(200_000.0).validate(),
            Err(OperationError::InvalidFontSize(200_000.0))
        );
        assert!(text(f32::INFINITY).validate().is_err());
        assert!(text(f32::NAN).validate().is_err());
    }

    #[test]
    fn test_kind_and_page() {
        assert_eq!(red_stroke().kind(), OperationKind::Draw);
        assert_eq!(Operation::clear(7).page(), 7);
        assert_eq!(OperationKind::Text.to_string(), "text");
    }
}
