//! Scene model and colour types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing colours or loading scenes
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("invalid color: {0}")]
    InvalidColor(String),

    #[error("failed to parse scene: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Straight (non-premultiplied) RGBA colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    pub const WHITE: Rgba = Rgba([255, 255, 255, 255]);
    pub const BLACK: Rgba = Rgba([0, 0, 0, 255]);
    pub const TRANSPARENT: Rgba = Rgba([0, 0, 0, 0]);

    /// Parse `#rgb`, `#rrggbb`, `#rrggbbaa` or one of a few keywords
    pub fn parse(input: &str) -> Result<Self, DocumentError> {
        let s = input.trim();
        match s.to_ascii_lowercase().as_str() {
            "white" => return Ok(Self::WHITE),
            "black" => return Ok(Self::BLACK),
            "transparent" => return Ok(Self::TRANSPARENT),
            _ => {}
        }

        let hex = s
            .strip_prefix('#')
            .ok_or_else(|| DocumentError::InvalidColor(input.to_string()))?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DocumentError::InvalidColor(input.to_string()));
        }

        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16)
                .map_err(|_| DocumentError::InvalidColor(input.to_string()))
        };

        match hex.len() {
            3 => {
                let mut out = [0u8, 0, 0, 255];
                for (i, slot) in out.iter_mut().take(3).enumerate() {
                    let v = channel(i..i + 1)?;
                    *slot = v * 17;
                }
                Ok(Rgba(out))
            }
            6 => Ok(Rgba([channel(0..2)?, channel(2..4)?, channel(4..6)?, 255])),
            8 => Ok(Rgba([
                channel(0..2)?,
                channel(2..4)?,
                channel(4..6)?,
                channel(6..8)?,
            ])),
            _ => Err(DocumentError::InvalidColor(input.to_string())),
        }
    }

    pub fn alpha(&self) -> u8 {
        self.0[3]
    }
}

impl FromStr for Rgba {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rgba::parse(s)
    }
}

impl TryFrom<String> for Rgba {
    type Error = DocumentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Rgba::parse(&value)
    }
}

impl From<Rgba> for String {
    fn from(c: Rgba) -> Self {
        c.to_string()
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.0;
        if a == 255 {
            write!(f, "#{:02x}{:02x}{:02x}", r, g, b)
        } else {
            write!(f, "#{:02x}{:02x}{:02x}{:02x}", r, g, b, a)
        }
    }
}

/// Border drawn inside a node's box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Border {
    pub color: Rgba,
    pub width: u32,
}

/// What a node represents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// A plain box (member card, panel, title block)
    Block,
    /// A connector line; its box is the stroke
    Line,
    /// A run of text; painted as a solid glyph band
    Text { content: String },
}

/// One positioned element of a scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_fill")]
    pub fill: Rgba,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border: Option<Border>,
    #[serde(flatten)]
    pub kind: NodeKind,
}

fn default_fill() -> Rgba {
    Rgba::TRANSPARENT
}

impl Node {
    /// Rightmost column covered by this node
    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    /// Bottom row covered by this node
    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }
}

/// A retained display list describing the document content
///
/// Nodes are painted in order; later nodes cover earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Explicit minimum content width (e.g. a laid-out container)
    #[serde(default)]
    pub min_width: u32,
    /// Explicit minimum content height
    #[serde(default)]
    pub min_height: u32,
}

impl Scene {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            nodes,
            min_width: 0,
            min_height: 0,
        }
    }

    /// Full content extent, including content outside any viewport
    ///
    /// Content left of or above the origin does not extend the extent.
    pub fn extent(&self) -> (u32, u32) {
        let (mut width, mut height) = (self.min_width as i64, self.min_height as i64);
        for node in &self.nodes {
            width = width.max(node.right());
            height = height.max(node.bottom());
        }
        (clamp_u32(width), clamp_u32(height))
    }

    /// Deep copy of this scene shifted by `(dx, dy)`
    pub fn translated(&self, dx: i64, dy: i64) -> Scene {
        let nodes = self
            .nodes
            .iter()
            .map(|node| Node {
                x: clamp_i32(node.x as i64 + dx),
                y: clamp_i32(node.y as i64 + dy),
                ..node.clone()
            })
            .collect();
        Scene {
            nodes,
            min_width: 0,
            min_height: 0,
        }
    }
}

fn clamp_u32(v: i64) -> u32 {
    v.clamp(0, u32::MAX as i64) as u32
}

fn clamp_i32(v: i64) -> i32 {
    v.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}
