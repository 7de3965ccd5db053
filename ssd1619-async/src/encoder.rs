use embedded_hal::digital::{ErrorType as PinErrorType, InputPin as _, OutputPin as _};
use embedded_hal_async::{delay::DelayNs as _, spi::SpiBus as _};

use crate::{
    hw::{ReadbackHw, Ssd1619Hw},
    log::trace,
};

/// Command/data framing for the SSD1619 serial interface.
///
/// Every command is framed as: select, D/C low, opcode, D/C high, arguments, deselect. The bus
/// is flushed before D/C or chip select change, so that no bit is shifted out under the wrong
/// line state. The panel is deselected even when a bus or pin error cuts the frame short.
///
/// This is implemented for every [Ssd1619Hw]. You probably want the higher-level methods on
/// [crate::Ssd1619], but it's available for experimenting with raw commands.
#[allow(async_fn_in_trait)]
pub trait CommandEncoder: Ssd1619Hw {
    /// Sends an opcode with no arguments.
    async fn command(&mut self, opcode: u8) -> Result<(), Self::Error> {
        self.command_with(opcode, &[]).await
    }

    /// Sends an opcode with one argument byte.
    async fn command1(&mut self, opcode: u8, arg: u8) -> Result<(), Self::Error> {
        self.command_with(opcode, &[arg]).await
    }

    /// Sends an opcode with two argument bytes.
    async fn command2(&mut self, opcode: u8, arg1: u8, arg2: u8) -> Result<(), Self::Error> {
        self.command_with(opcode, &[arg1, arg2]).await
    }

    /// Sends an opcode followed by `args`, in the order given.
    ///
    /// Multi-byte values must already be split in the order the controller expects (low byte
    /// first for the 16 bit window and counter registers).
    async fn command_with(&mut self, opcode: u8, args: &[u8]) -> Result<(), Self::Error>;

    /// Sends an opcode and leaves the panel selected in data mode, so that an arbitrary number
    /// of data bytes can be written directly to [Ssd1619Hw::spi].
    ///
    /// Must be paired with [CommandEncoder::end_stream].
    async fn begin_stream(&mut self, opcode: u8) -> Result<(), Self::Error>;

    /// Waits for streamed data to leave the bus, then deselects the panel.
    async fn end_stream(&mut self) -> Result<(), Self::Error>;
}

impl<HW: Ssd1619Hw> CommandEncoder for HW {
    async fn command_with(&mut self, opcode: u8, args: &[u8]) -> Result<(), HW::Error> {
        trace!("Sending EPD command: {:?}", opcode);
        self.cs().set_low()?;
        let sent = send_frame(self, opcode, args).await;
        deselect(self, sent)
    }

    async fn begin_stream(&mut self, opcode: u8) -> Result<(), HW::Error> {
        trace!("Streaming EPD command: {:?}", opcode);
        self.cs().set_low()?;
        match start_data(self, opcode).await {
            Ok(()) => Ok(()),
            Err(e) => deselect(self, Err(e)),
        }
    }

    async fn end_stream(&mut self) -> Result<(), HW::Error> {
        let flushed = flush(self).await;
        deselect(self, flushed)
    }
}

async fn send_opcode<HW: Ssd1619Hw>(hw: &mut HW, opcode: u8) -> Result<(), HW::Error> {
    hw.dc().set_low()?;
    hw.spi().write(&[opcode]).await?;
    hw.spi().flush().await?;
    Ok(())
}

async fn send_frame<HW: Ssd1619Hw>(
    hw: &mut HW,
    opcode: u8,
    args: &[u8],
) -> Result<(), HW::Error> {
    send_opcode(hw, opcode).await?;
    if !args.is_empty() {
        hw.dc().set_high()?;
        hw.spi().write(args).await?;
        hw.spi().flush().await?;
    }
    Ok(())
}

async fn start_data<HW: Ssd1619Hw>(hw: &mut HW, opcode: u8) -> Result<(), HW::Error> {
    send_opcode(hw, opcode).await?;
    hw.dc().set_high()?;
    Ok(())
}

async fn flush<HW: Ssd1619Hw>(hw: &mut HW) -> Result<(), HW::Error> {
    hw.spi().flush().await?;
    Ok(())
}

/// Ends a frame by deselecting the panel. An error from the frame itself wins over one from
/// the chip select line.
fn deselect<HW: Ssd1619Hw, T>(
    hw: &mut HW,
    framed: Result<T, HW::Error>,
) -> Result<T, HW::Error> {
    let released = hw.cs().set_high();
    let value = framed?;
    released?;
    Ok(value)
}

/// Reads single register bytes back from the panel over the shared data line.
#[allow(async_fn_in_trait)]
pub trait RegisterRead: ReadbackHw {
    /// Sends `opcode`, then clocks one byte back in, MSB first.
    ///
    /// The clock is held for at least 1µs in each phase, which keeps the read well under the
    /// controller's maximum read clock.
    async fn read_register(&mut self, opcode: u8) -> Result<u8, Self::Error>;
}

impl<HW> RegisterRead for HW
where
    HW: ReadbackHw,
    HW::Error: From<<HW::Sda as PinErrorType>::Error> + From<<HW::Clk as PinErrorType>::Error>,
{
    async fn read_register(&mut self, opcode: u8) -> Result<u8, HW::Error> {
        trace!("Reading EPD register: {:?}", opcode);
        self.cs().set_low()?;
        let read = read_frame(self, opcode).await;
        deselect(self, read)
    }
}

async fn read_frame<HW>(hw: &mut HW, opcode: u8) -> Result<u8, HW::Error>
where
    HW: ReadbackHw,
    HW::Error: From<<HW::Sda as PinErrorType>::Error> + From<<HW::Clk as PinErrorType>::Error>,
{
    send_opcode(hw, opcode).await?;
    hw.sda_input()?;
    hw.dc().set_high()?;

    let mut value = 0u8;
    for _ in 0..8 {
        hw.clk().set_high()?;
        hw.delay().delay_us(1).await;
        value <<= 1;
        if hw.sda().is_high()? {
            value |= 1;
        }
        hw.clk().set_low()?;
        hw.delay().delay_us(1).await;
    }

    hw.sda_output()?;
    Ok(value)
}
