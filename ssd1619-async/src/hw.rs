use core::{error::Error as CoreError, time::Duration};

use embedded_hal::digital::{ErrorType as PinErrorType, InputPin, OutputPin, PinState};
use embedded_hal_async::{
    delay::DelayNs,
    spi::{ErrorType as SpiErrorType, SpiBus},
};

use crate::{
    log::{trace, warn_log},
    ssd1619::DEFAULT_BUSY_WHEN,
};

/// Interval between two samples of the busy line.
///
/// Busy timeouts throughout the driver are expressed in multiples of this interval.
pub const BUSY_POLL_INTERVAL_MS: u32 = 1;

/// Provides access to the hardware needed to drive an SSD1619 panel.
///
/// Chip select is driven by the driver itself rather than by an `SpiDevice`, because the frame
/// buffer upload keeps the panel selected across many bus writes. `Spi` is therefore the raw
/// bus, and it must not be shared with other devices while a command is in progress.
///
/// In this example, the board owns an embassy SPI bus and plain GPIO pins:
///
/// ```rust,ignore
/// use embassy_rp::gpio::{Input, Output};
/// use embassy_rp::peripherals::SPI0;
/// use embassy_rp::spi::{self, Spi};
/// use embassy_time::Delay;
/// use ssd1619_async::Ssd1619Hw;
///
/// struct Board<'a> {
///     spi: Spi<'a, SPI0, spi::Async>,
///     cs: Output<'a>,
///     dc: Output<'a>,
///     reset: Output<'a>,
///     busy: Input<'a>,
///     delay: Delay,
/// }
///
/// impl<'a> Ssd1619Hw for Board<'a> {
///     type Spi = Spi<'a, SPI0, spi::Async>;
///     type Cs = Output<'a>;
///     type Dc = Output<'a>;
///     type Reset = Output<'a>;
///     type Busy = Input<'a>;
///     type Delay = Delay;
///     // Implements `From<spi::Error>` and `From<Infallible>`, see `samples/rp`.
///     type Error = BoardError;
///
///     fn spi(&mut self) -> &mut Self::Spi { &mut self.spi }
///     fn cs(&mut self) -> &mut Self::Cs { &mut self.cs }
///     fn dc(&mut self) -> &mut Self::Dc { &mut self.dc }
///     fn reset(&mut self) -> &mut Self::Reset { &mut self.reset }
///     fn busy(&mut self) -> &mut Self::Busy { &mut self.busy }
///     fn delay(&mut self) -> &mut Self::Delay { &mut self.delay }
/// }
/// ```
pub trait Ssd1619Hw {
    type Spi: SpiBus;
    type Cs: OutputPin;
    type Dc: OutputPin;
    type Reset: OutputPin;
    type Busy: InputPin;
    type Delay: DelayNs;
    type Error: CoreError
        + From<<Self::Spi as SpiErrorType>::Error>
        + From<<Self::Cs as PinErrorType>::Error>
        + From<<Self::Dc as PinErrorType>::Error>
        + From<<Self::Reset as PinErrorType>::Error>
        + From<<Self::Busy as PinErrorType>::Error>;

    fn spi(&mut self) -> &mut Self::Spi;
    fn cs(&mut self) -> &mut Self::Cs;
    fn dc(&mut self) -> &mut Self::Dc;
    fn reset(&mut self) -> &mut Self::Reset;
    fn busy(&mut self) -> &mut Self::Busy;
    fn delay(&mut self) -> &mut Self::Delay;

    /// Indicates which state of the busy pin indicates that it's busy.
    ///
    /// This is user-configurable, rather than enforced by the driver, to allow for inverted
    /// wiring.
    fn busy_when(&self) -> PinState {
        DEFAULT_BUSY_WHEN
    }

    /// Asks an external watchdog to allow at least `budget` before the next feed.
    fn feed_watchdog(&mut self, _budget: Duration) {}

    /// Samples board telemetry (battery voltage, temperature) while the panel refreshes.
    ///
    /// Called by [crate::Ssd1619::draw] between starting the refresh and waiting for it, when
    /// the supply is under the most load.
    fn sample_telemetry(&mut self) {}
}

/// Optional bit-banged access to the shared data line, for reading registers over 3-wire SPI.
///
/// The SSD1619 has no separate output line: reads happen on the same pin that carries
/// MOSI. Boards that can hand that pin back and forth between the SPI peripheral and a GPIO
/// implement this trait to enable [crate::Ssd1619::read_status].
pub trait ReadbackHw: Ssd1619Hw {
    type Sda: InputPin;
    type Clk: OutputPin;

    fn sda(&mut self) -> &mut Self::Sda;
    fn clk(&mut self) -> &mut Self::Clk;

    /// Detaches the data line from the SPI peripheral and makes it an input.
    fn sda_input(&mut self) -> Result<(), Self::Error>;

    /// Returns the data line (and clock) to the SPI peripheral.
    fn sda_output(&mut self) -> Result<(), Self::Error>;
}

/// How a bounded busy wait ended.
///
/// Both variants mean "carry on": the panel either signalled idle, or the bound ran out and
/// the driver proceeds anyway.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The busy line reported idle within the bound.
    Ready,
    /// The busy line was still active when the bound ran out.
    TimedOut,
}

/// Provides bounded "wait" support for hardware with a busy state.
pub(crate) trait BusyWait: Ssd1619Hw {
    /// Polls the busy line every [BUSY_POLL_INTERVAL_MS] until it reports idle, for at most
    /// `timeout_ms`.
    ///
    /// Returns immediately, without delaying, if the panel is already idle. A timeout is
    /// logged but is not an error.
    async fn wait_busy_falling(&mut self, timeout_ms: u32) -> Result<WaitOutcome, Self::Error>;
}

impl<HW: Ssd1619Hw> BusyWait for HW {
    async fn wait_busy_falling(&mut self, timeout_ms: u32) -> Result<WaitOutcome, HW::Error> {
        let busy_when = self.busy_when();
        let mut waited_ms = 0;
        loop {
            let busy = match busy_when {
                PinState::High => self.busy().is_high()?,
                PinState::Low => self.busy().is_low()?,
            };
            if !busy {
                return Ok(WaitOutcome::Ready);
            }
            if waited_ms >= timeout_ms {
                warn_log!("EPD still busy after {} ms, continuing", timeout_ms);
                return Ok(WaitOutcome::TimedOut);
            }
            if waited_ms == 0 {
                trace!("Waiting for busy EPD");
            }
            self.delay().delay_ms(BUSY_POLL_INTERVAL_MS).await;
            waited_ms += BUSY_POLL_INTERVAL_MS;
        }
    }
}

#[cfg(test)]
mod tests {
    use embedded_hal_mock::eh1::digital::{State, Transaction as PinTransaction};

    use super::*;
    use crate::testing::{Event, FakeHw};

    #[tokio::test]
    async fn test_wait_times_out_after_bound() {
        let mut hw = FakeHw::with_busy(&vec![PinTransaction::get(State::High); 5]);

        assert_eq!(hw.wait_busy_falling(4).await.unwrap(), WaitOutcome::TimedOut);
        assert_eq!(hw.wire.events(), vec![Event::delay_ms(1); 4]);
        hw.done();
    }

    #[tokio::test]
    async fn test_wait_stops_polling_once_idle() {
        let mut hw = FakeHw::with_busy(&[
            PinTransaction::get(State::High),
            PinTransaction::get(State::High),
            PinTransaction::get(State::Low),
        ]);

        assert_eq!(hw.wait_busy_falling(100).await.unwrap(), WaitOutcome::Ready);
        assert_eq!(hw.wire.events(), vec![Event::delay_ms(1); 2]);
        hw.done();
    }

    #[tokio::test]
    async fn test_zero_bound_samples_once() {
        let mut hw = FakeHw::with_busy(&[PinTransaction::get(State::High)]);

        assert_eq!(hw.wait_busy_falling(0).await.unwrap(), WaitOutcome::TimedOut);
        assert!(hw.wire.events().is_empty());
        hw.done();
    }
}
