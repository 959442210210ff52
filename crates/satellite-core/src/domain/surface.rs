//! Grid coordinates, control keys and surface registration properties.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::pincode::PincodeMap;

/// A position on a surface's key grid.
///
/// `x` is the column and `y` is the row, both zero-based.  On the wire a
/// position is written `"row/col"`, i.e. `"{y}/{x}"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPos {
    pub x: u32,
    pub y: u32,
}

impl GridPos {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Converts a raw key index into a grid position for a surface that is
    /// `columns` keys wide.
    ///
    /// Returns `None` when `columns` is zero.
    pub fn from_index(index: u32, columns: u32) -> Option<Self> {
        if columns == 0 {
            return None;
        }
        Some(Self {
            x: index % columns,
            y: index / columns,
        })
    }

    /// Inverse of [`from_index`](Self::from_index).
    pub fn to_index(self, columns: u32) -> u32 {
        self.y * columns + self.x
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.y, self.x)
    }
}

/// The `KEY` field of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlKey {
    /// A bare numeric index (older servers).
    Index(u32),
    /// `"row/col"`.
    RowColumn(GridPos),
    /// Anything else: an opaque control identifier (e.g. an encoder name).
    ControlId(String),
}

impl ControlKey {
    /// Interprets the raw `KEY` text.
    pub fn parse(raw: &str) -> Self {
        if let Some((row, col)) = raw.split_once('/') {
            if let (Ok(y), Ok(x)) = (row.trim().parse(), col.trim().parse()) {
                return ControlKey::RowColumn(GridPos { x, y });
            }
        }
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = raw.parse() {
                return ControlKey::Index(index);
            }
        }
        ControlKey::ControlId(raw.to_string())
    }

    /// Resolves to a grid position, using `columns` for bare indices.
    ///
    /// Opaque control ids have no grid position.
    pub fn to_grid_pos(&self, columns: u32) -> Option<GridPos> {
        match self {
            ControlKey::Index(index) => GridPos::from_index(*index, columns),
            ControlKey::RowColumn(pos) => Some(*pos),
            ControlKey::ControlId(_) => None,
        }
    }
}

impl fmt::Display for ControlKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlKey::Index(index) => write!(f, "{index}"),
            ControlKey::RowColumn(pos) => write!(f, "{pos}"),
            ControlKey::ControlId(id) => f.write_str(id),
        }
    }
}

/// What a surface advertises about itself in `ADD-DEVICE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterProps {
    /// Keys per row.
    pub columns: u32,
    /// Total number of keys.
    pub keys_total: u32,
    /// Square bitmap edge length in pixels, or `None` if the surface cannot
    /// show images.
    pub bitmap_size: Option<u32>,
    pub colours: bool,
    pub text: bool,
    pub text_style: bool,
    pub brightness: bool,
    /// Lock-screen layout, if the surface can show a pincode overlay.
    pub pincode_map: Option<PincodeMap>,
}

impl RegisterProps {
    /// A plain button grid with no image, colour or text support.
    pub fn grid(columns: u32, rows: u32) -> Self {
        Self {
            columns,
            keys_total: columns * rows,
            bitmap_size: None,
            colours: false,
            text: false,
            text_style: false,
            brightness: false,
            pincode_map: None,
        }
    }

    pub fn rows(&self) -> u32 {
        if self.columns == 0 {
            0
        } else {
            self.keys_total.div_ceil(self.columns)
        }
    }

    pub fn supports_pincode(&self) -> bool {
        self.pincode_map.is_some()
    }
}
