use defmt::info;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::peripherals;
use embassy_rp::spi::{self, Spi};
use embassy_time::{Delay, Instant};
use rp_samples::Error;
use ssd1619_async::Ssd1619Hw;

use super::DisplayP;

type PanelSpi<'a> = Spi<'a, peripherals::SPI0, spi::Async>;

/// Defines the hardware to use for connecting to the display.
///
/// The panel has the SPI bus to itself, so chip select is a plain output driven by the driver.
pub struct DisplayHw<'a> {
    spi: PanelSpi<'a>,
    cs: Output<'a>,
    dc: Output<'a>,
    reset: Output<'a>,
    busy: Input<'a>,
    delay: Delay,
}

impl<'a> DisplayHw<'a> {
    pub fn new(spi: PanelSpi<'a>, p: DisplayP) -> Self {
        Self {
            spi,
            // CS is active low.
            cs: Output::new(p.cs, Level::High),
            dc: Output::new(p.dc, Level::Low),
            reset: Output::new(p.reset, Level::High),
            busy: Input::new(p.busy, Pull::Down),
            delay: Delay,
        }
    }
}

impl<'a> Ssd1619Hw for DisplayHw<'a> {
    type Spi = PanelSpi<'a>;

    type Cs = Output<'a>;

    type Dc = Output<'a>;

    type Reset = Output<'a>;

    type Busy = Input<'a>;

    type Delay = Delay;

    type Error = Error;

    fn spi(&mut self) -> &mut Self::Spi {
        &mut self.spi
    }

    fn cs(&mut self) -> &mut Self::Cs {
        &mut self.cs
    }

    fn dc(&mut self) -> &mut Self::Dc {
        &mut self.dc
    }

    fn reset(&mut self) -> &mut Self::Reset {
        &mut self.reset
    }

    fn busy(&mut self) -> &mut Self::Busy {
        &mut self.busy
    }

    fn delay(&mut self) -> &mut Self::Delay {
        &mut self.delay
    }

    fn sample_telemetry(&mut self) {
        // No battery monitor on this board; just mark when the refresh started.
        info!("Refresh running at {} ms uptime", Instant::now().as_millis());
    }
}
