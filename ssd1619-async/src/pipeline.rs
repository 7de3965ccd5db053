//! Streams a two-plane frame to the controller one row at a time.
//!
//! Rows are produced on demand by a [RowSource] rather than read from a full frame buffer,
//! so the only memory the upload needs is two rows. While one row is on the wire, the next
//! one is rendered into the other slot; the slots then swap. With a DMA-backed [SpiBus] this
//! hides the render time behind the transfer time.

use embassy_futures::join::join;
use embedded_hal_async::spi::SpiBus;

use crate::{
    encoder::CommandEncoder as _,
    geometry::MAX_ROW_BYTES,
    hw::Ssd1619Hw,
    log::debug,
    ssd1619::Command,
};

/// One of the two bitmaps the controller stores and combines during a refresh.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plane {
    /// Black/white pixels. A set bit is white.
    Monochrome,
    /// Red pixels. A set bit is red.
    Red,
}

impl Plane {
    /// The planes in the order they are uploaded.
    pub const ALL: [Plane; 2] = [Plane::Monochrome, Plane::Red];

    /// The command that starts writing this plane into controller RAM.
    pub fn write_command(&self) -> Command {
        match self {
            Plane::Monochrome => Command::WriteRamBw,
            Plane::Red => Command::WriteRamRed,
        }
    }
}

/// Produces packed pixel rows on demand during a frame upload.
///
/// This is the seam to the application's drawing code: a draw list renderer, a frame buffer
/// (see [crate::buffer::TriColorBuffer]), or anything else that can produce a row at a time.
pub trait RowSource {
    /// Fills `row` with row `y` of `plane`, 8 pixels per byte, MSB first.
    ///
    /// `row` is zeroed before each call and is exactly `width / 8` bytes long. Rows are
    /// requested in order, once each, for every plane of a frame.
    fn render_row(&mut self, row: &mut [u8], y: u16, plane: Plane);

    /// Called once after both planes of a frame have been written, so that one-shot content
    /// can be dropped before the next frame.
    fn flush_pending(&mut self) {}
}

impl<T: RowSource + ?Sized> RowSource for &mut T {
    fn render_row(&mut self, row: &mut [u8], y: u16, plane: Plane) {
        (**self).render_row(row, y, plane)
    }

    fn flush_pending(&mut self) {
        (**self).flush_pending()
    }
}

/// The two row buffers used by an upload.
struct RowSlots {
    rows: [[u8; MAX_ROW_BYTES]; 2],
    len: usize,
}

impl RowSlots {
    fn new(len: usize) -> Self {
        debug_assert!(len <= MAX_ROW_BYTES, "row does not fit a slot");
        Self {
            rows: [[0; MAX_ROW_BYTES]; 2],
            len,
        }
    }

    /// Borrows both slots at once: one to put on the wire, one to render into.
    fn pair(&mut self) -> (&mut [u8], &mut [u8]) {
        let [first, second] = &mut self.rows;
        (&mut first[..self.len], &mut second[..self.len])
    }
}

/// Renders and writes `rows` rows of `plane` to `spi`.
///
/// The panel must already be selected in data mode. A slot is only rendered into after its
/// previous write has completed, and only one write is in flight at a time.
pub(crate) async fn stream_rows<S, R>(
    spi: &mut S,
    source: &mut R,
    plane: Plane,
    rows: u16,
    row_bytes: usize,
) -> Result<(), S::Error>
where
    S: SpiBus,
    R: RowSource + ?Sized,
{
    if rows == 0 {
        return Ok(());
    }

    let mut slots = RowSlots::new(row_bytes);
    let (mut on_wire, mut rendering) = slots.pair();
    source.render_row(on_wire, 0, plane);

    for y in 1..rows {
        rendering.fill(0);
        let (sent, ()) = join(spi.write(on_wire), async {
            source.render_row(rendering, y, plane);
        })
        .await;
        sent?;
        core::mem::swap(&mut on_wire, &mut rendering);
    }

    spi.write(on_wire).await
}

/// Uploads both planes, then lets the source drop one-shot content.
///
/// Each plane is one streamed write command. The RAM window and address counter must already
/// be set; the controller's auto-increment carries on from one plane to the next. A failed row
/// write still ends the stream, so the panel is never left selected.
pub(crate) async fn transfer_planes<HW, R>(
    hw: &mut HW,
    source: &mut R,
    rows: u16,
    row_bytes: usize,
) -> Result<(), HW::Error>
where
    HW: Ssd1619Hw,
    R: RowSource + ?Sized,
{
    for plane in Plane::ALL {
        debug!("Writing {:?} plane", plane);
        hw.begin_stream(plane.write_command().register()).await?;
        let streamed = stream_rows(hw.spi(), source, plane, rows, row_bytes).await;
        let ended = hw.end_stream().await;
        streamed?;
        ended?;
    }
    source.flush_pending();
    Ok(())
}
