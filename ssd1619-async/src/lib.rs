//! This crate provides an `async`/`await` driver for black/white/red e-paper panels built on the
//! Solomon Systech SSD1619 controller.
//!
//! It is built on top of `embedded-hal-async`, making it compatible with a wide range of embedded
//! platforms.
//!
//! ## Overview
//!
//! - [`Ssd1619Hw`]: abstracts over the SPI bus, GPIO pins (chip select, data/command, reset and
//!   busy) and delay timer that drive the panel. You need to implement this trait for your chosen
//!   peripherals. [`ReadbackHw`] optionally adds register reads over the shared data line.
//! - [`Ssd1619`]: the controller itself. It sequences the panel through reset, configuration,
//!   frame upload, refresh and deep sleep, waiting on the busy line (with a bound) in between.
//! - [`RowSource`]: supplies pixel rows while a frame is uploaded. The driver keeps only two rows
//!   in memory, and renders the next row while the previous one is still on the bus.
//!
//! Additionally, the crate provides:
//!
//! - `buffer` module: a compact two-plane frame buffer that implements
//!   `embedded-graphics::DrawTarget` and [`RowSource`], for callers that prefer to draw into
//!   memory.
//! - `encoder` module: the command framing, for sending raw commands.
//!
//! ```rust,ignore
//! let mut epd = Ssd1619::new(board, GEOMETRY_1IN54_BWR);
//! let mut buffer = buffer::new_1in54_bwr_buffer();
//! // ... draw on the buffer ...
//! epd.setup().await?;
//! epd.draw(&mut buffer).await?;
//! epd.enter_sleep().await?;
//! ```
#![cfg_attr(not(test), no_std)]

pub mod buffer;
pub mod encoder;
pub mod geometry;
pub mod hw;
pub mod pipeline;
pub mod ssd1619;

mod log;
#[cfg(test)]
mod testing;

pub use geometry::{Geometry, GeometryError, GEOMETRY_1IN54_BWR};
pub use hw::{ReadbackHw, Ssd1619Hw, WaitOutcome};
pub use pipeline::{Plane, RowSource};
pub use ssd1619::{Command, ControllerState, Session, Ssd1619, UpdateSequence};
