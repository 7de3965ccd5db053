//! This example draws a test pattern on a 1.54" black/white/red SSD1619 panel using a Raspberry
//! Pi Pico board.

#![no_std]
#![no_main]

use defmt::{expect, info};
use embassy_executor::Spawner;
use embassy_rp::spi::{self, Spi};
use embassy_time::{Instant, Timer};
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Circle, PrimitiveStyle, Rectangle};
use ssd1619_async::{
    buffer::{self, TriColor},
    ssd1619, Ssd1619, GEOMETRY_1IN54_BWR,
};
use {defmt_rtt as _, panic_probe as _};

mod hw;

use hw::DisplayHw;

// Define the resources needed to communicate with the display.
assign_resources::assign_resources! {
    spi_hw: SpiP {
        spi: SPI0,
        clk: PIN_2,
        tx: PIN_3,
        dma_tx: DMA_CH1,
    },
    epd_hw: DisplayP {
        cs: PIN_5,
        dc: PIN_6,
        reset: PIN_7,
        busy: PIN_8,
    },
}

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let p = embassy_rp::init(Default::default());

    let resources = split_resources!(p);
    let mut config = spi::Config::default();
    config.frequency = ssd1619::RECOMMENDED_SPI_HZ;
    // embassy-rp uses its own phase and polarity enums, so we have to map these.
    config.phase = match ssd1619::RECOMMENDED_SPI_PHASE {
        embedded_hal_async::spi::Phase::CaptureOnFirstTransition => {
            spi::Phase::CaptureOnFirstTransition
        }
        embedded_hal_async::spi::Phase::CaptureOnSecondTransition => {
            spi::Phase::CaptureOnSecondTransition
        }
    };
    config.polarity = match ssd1619::RECOMMENDED_SPI_POLARITY {
        embedded_hal_async::spi::Polarity::IdleHigh => spi::Polarity::IdleHigh,
        embedded_hal_async::spi::Polarity::IdleLow => spi::Polarity::IdleLow,
    };

    let spi = Spi::new_txonly(
        resources.spi_hw.spi,
        resources.spi_hw.clk,
        resources.spi_hw.tx,
        resources.spi_hw.dma_tx,
        config,
    );
    let mut epd = Ssd1619::new(DisplayHw::new(spi, resources.epd_hw), GEOMETRY_1IN54_BWR);

    let mut buffer = buffer::new_1in54_bwr_buffer();
    Rectangle::new(Point::new(8, 8), Size::new(64, 64))
        .into_styled(PrimitiveStyle::with_fill(TriColor::Black))
        .draw(&mut buffer)
        .unwrap();
    Rectangle::new(Point::new(80, 8), Size::new(64, 64))
        .into_styled(PrimitiveStyle::with_fill(TriColor::Red))
        .draw(&mut buffer)
        .unwrap();
    Circle::new(Point::new(36, 80), 64)
        .into_styled(PrimitiveStyle::with_stroke(TriColor::Red, 4))
        .draw(&mut buffer)
        .unwrap();

    info!("Setting up EPD");
    expect!(epd.setup().await, "Failed to set up EPD");

    info!("Drawing test pattern");
    let before_draw = Instant::now();
    let outcome = expect!(epd.draw(&mut buffer).await, "Failed to draw");
    info!(
        "Draw finished ({}) after {} ms",
        outcome,
        before_draw.elapsed().as_millis()
    );

    info!("Sleeping EPD");
    expect!(epd.enter_sleep().await, "Failed to sleep EPD");

    loop {
        Timer::after_secs(60).await;
    }
}
