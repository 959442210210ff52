//! Pincode lock-screen layouts.
//!
//! When the server locks a surface, the surface shows a numeric keypad and
//! each press is sent as a digit instead of a normal key event.  Large
//! surfaces fit all ten digits at once ([`PincodeMap::SinglePage`]).  Small
//! ones spread the digits over several pages and dedicate one key to flipping
//! between them ([`PincodeMap::MultiplePage`]).

use serde::{Deserialize, Serialize};

use super::surface::GridPos;

/// Which grid positions make up the lock screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PincodeMap {
    /// All ten digits on one page plus a status readout.
    SinglePage {
        status: GridPos,
        /// `digits[n]` is where digit `n` is drawn.
        digits: [GridPos; 10],
    },
    /// Digits spread over pages, navigated by a next-page key.
    MultiplePage {
        status: Option<GridPos>,
        next_page: GridPos,
        /// `pages[p][n]` is where digit `n` is drawn on page `p`, if at all.
        pages: Vec<[Option<GridPos>; 10]>,
    },
}

/// What a press on the lock screen means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PincodeAction {
    NextPage,
    Digit(u8),
}

impl PincodeMap {
    /// Number of pages; always at least one.
    pub fn page_count(&self) -> usize {
        match self {
            PincodeMap::SinglePage { .. } => 1,
            PincodeMap::MultiplePage { pages, .. } => pages.len().max(1),
        }
    }

    pub fn status_position(&self) -> Option<GridPos> {
        match self {
            PincodeMap::SinglePage { status, .. } => Some(*status),
            PincodeMap::MultiplePage { status, .. } => *status,
        }
    }

    pub fn next_page_position(&self) -> Option<GridPos> {
        match self {
            PincodeMap::SinglePage { .. } => None,
            PincodeMap::MultiplePage { next_page, .. } => Some(*next_page),
        }
    }

    /// Returns `(digit, position)` for every digit shown on `page`.
    ///
    /// Out-of-range pages wrap around.
    pub fn digit_positions(&self, page: usize) -> Vec<(u8, GridPos)> {
        match self {
            PincodeMap::SinglePage { digits, .. } => digits
                .iter()
                .enumerate()
                .map(|(digit, pos)| (digit as u8, *pos))
                .collect(),
            PincodeMap::MultiplePage { pages, .. } => {
                if pages.is_empty() {
                    return Vec::new();
                }
                pages[page % pages.len()]
                    .iter()
                    .enumerate()
                    .filter_map(|(digit, pos)| pos.map(|p| (digit as u8, p)))
                    .collect()
            }
        }
    }

    /// Every position drawn on `page`: its digits, the status readout and the
    /// next-page key.
    pub fn page_positions(&self, page: usize) -> Vec<GridPos> {
        let mut positions: Vec<GridPos> = self
            .digit_positions(page)
            .into_iter()
            .map(|(_, pos)| pos)
            .collect();
        positions.extend(self.next_page_position());
        positions.extend(self.status_position());
        positions
    }

    /// Resolves a press at `pos` while `page` is showing.
    ///
    /// The next-page key wins over a digit at the same position.  A press on
    /// any other position resolves to `None`.
    pub fn resolve(&self, page: usize, pos: GridPos) -> Option<PincodeAction> {
        if self.next_page_position() == Some(pos) {
            return Some(PincodeAction::NextPage);
        }
        self.digit_positions(page)
            .into_iter()
            .find(|(_, p)| *p == pos)
            .map(|(digit, _)| PincodeAction::Digit(digit))
    }

    /// Keypad layout for a grid of at least 4×4 keys: digits in a phone-style
    /// block (`1 2 3 / 4 5 6 / 7 8 9`, `0` under `8`) anchored at the left, with
    /// the status readout to the right of the block.
    ///
    /// Returns `None` when the grid is too small for a single page.
    pub fn single_page_for_grid(columns: u32, rows: u32) -> Option<Self> {
        if columns < 4 || rows < 4 {
            return None;
        }
        let at = |x, y| GridPos::new(x, y);
        Some(PincodeMap::SinglePage {
            status: at(3, 0),
            digits: [
                at(1, 3),
                at(0, 0),
                at(1, 0),
                at(2, 0),
                at(0, 1),
                at(1, 1),
                at(2, 1),
                at(0, 2),
                at(1, 2),
                at(2, 2),
            ],
        })
    }
}
