//! Domain entities for the surface satellite.
//!
//! This module contains pure surface logic with no infrastructure dependencies.
//!
//! # What lives here? (for beginners)
//!
//! A control surface is described to the server as a grid: a number of keys
//! laid out in rows of a fixed width.  Everything the server says about a key
//! ("draw this image at row 2, column 3") and everything the surface reports
//! ("the key at row 0, column 1 was pressed") is expressed in grid
//! coordinates.
//!
//! - [`surface`] holds the coordinate types and the registration properties a
//!   surface advertises when it is added.
//! - [`pincode`] holds the lock-screen layout: which grid positions act as
//!   digits `0`–`9`, where the "characters entered" readout goes, and (for
//!   small surfaces) which key flips to the next page of digits.
//!
//! Nothing here touches sockets, timers, or hardware, so every type can be
//! tested in isolation.

pub mod pincode;
pub mod surface;
