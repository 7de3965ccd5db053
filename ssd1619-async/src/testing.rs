//! A fake board that records everything the driver does to its lines, in order.

use core::{convert::Infallible, time::Duration};
use std::{cell::RefCell, rc::Rc};

use embassy_futures::yield_now;
use embedded_hal::digital::{ErrorType as PinErrorType, OutputPin, PinState};
use embedded_hal::spi::{Error as SpiError, ErrorKind};
use embedded_hal_async::{
    delay::DelayNs,
    spi::{ErrorType as SpiErrorType, SpiBus},
};
use embedded_hal_mock::eh1::digital::{Mock as PinMock, Transaction as PinTransaction};
use thiserror::Error as ThisError;

use crate::{
    hw::{ReadbackHw, Ssd1619Hw},
    pipeline::{Plane, RowSource},
};

/// Output lines driven by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    Cs,
    Dc,
    Reset,
    Clk,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Pin(Line, bool),
    /// A bus write started.
    Write(Vec<u8>),
    /// The most recent bus write completed.
    WriteDone,
    /// A delay, in nanoseconds.
    Delay(u32),
    SdaInput,
    SdaOutput,
    Render(u16, Plane),
    FlushPending,
    Watchdog(Duration),
    Telemetry,
}

impl Event {
    pub fn delay_ms(ms: u32) -> Self {
        Event::Delay(ms * 1_000_000)
    }
}

/// One select/deselect cycle, decoded from the recorded events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: u8,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(command: u8, data: &[u8]) -> Self {
        Self {
            command,
            data: data.to_vec(),
        }
    }
}

/// Shared event log.
#[derive(Debug, Clone, Default)]
pub struct Wire(Rc<RefCell<Vec<Event>>>);

impl Wire {
    fn push(&self, event: Event) {
        self.0.borrow_mut().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    /// Decodes the bus traffic into commands and their data, using chip select and D/C.
    pub fn frames(&self) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut current: Option<(Option<u8>, Vec<u8>)> = None;
        let mut data_mode = false;
        for event in self.events() {
            match event {
                Event::Pin(Line::Cs, false) => current = Some((None, Vec::new())),
                Event::Pin(Line::Cs, true) => {
                    if let Some((Some(command), data)) = current.take() {
                        frames.push(Frame { command, data });
                    }
                }
                Event::Pin(Line::Dc, level) => data_mode = level,
                Event::Write(bytes) => {
                    if let Some((command, data)) = current.as_mut() {
                        if data_mode {
                            data.extend_from_slice(&bytes);
                        } else if let Some(last) = bytes.last() {
                            *command = Some(*last);
                        }
                    }
                }
                _ => {}
            }
        }
        frames
    }
}

/// The error raised by an armed [FakeBus] write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
#[error("bus write failed")]
pub struct BusFault;

impl SpiError for BusFault {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// A bus whose writes take one executor poll to complete, like a DMA transfer.
pub struct FakeBus {
    wire: Wire,
    /// Counts down the writes until one fails.
    fail_in: Option<usize>,
}

impl SpiErrorType for FakeBus {
    type Error = BusFault;
}

impl SpiBus for FakeBus {
    async fn read(&mut self, words: &mut [u8]) -> Result<(), BusFault> {
        words.fill(0);
        Ok(())
    }

    async fn write(&mut self, words: &[u8]) -> Result<(), BusFault> {
        if let Some(left) = self.fail_in.as_mut() {
            *left -= 1;
            if *left == 0 {
                self.fail_in = None;
                return Err(BusFault);
            }
        }
        self.wire.push(Event::Write(words.to_vec()));
        yield_now().await;
        self.wire.push(Event::WriteDone);
        Ok(())
    }

    async fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), BusFault> {
        self.write(write).await?;
        read.fill(0);
        Ok(())
    }

    async fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), BusFault> {
        self.write(words).await
    }

    async fn flush(&mut self) -> Result<(), BusFault> {
        Ok(())
    }
}

pub struct WirePin {
    line: Line,
    wire: Wire,
}

impl PinErrorType for WirePin {
    type Error = Infallible;
}

impl OutputPin for WirePin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.wire.push(Event::Pin(self.line, false));
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.wire.push(Event::Pin(self.line, true));
        Ok(())
    }
}

pub struct FakeDelay {
    wire: Wire,
}

impl DelayNs for FakeDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.wire.push(Event::Delay(ns));
    }
}

type MockPinError = embedded_hal_mock::eh1::MockError;

#[derive(Debug, ThisError)]
pub enum FakeError {
    #[error("pin mock error: {0:?}")]
    Pin(MockPinError),
    #[error(transparent)]
    Bus(#[from] BusFault),
}

impl From<MockPinError> for FakeError {
    fn from(e: MockPinError) -> Self {
        FakeError::Pin(e)
    }
}

impl From<Infallible> for FakeError {
    fn from(e: Infallible) -> Self {
        match e {}
    }
}

/// A board with recording output lines and scripted busy and data inputs.
pub struct FakeHw {
    pub wire: Wire,
    spi: FakeBus,
    cs: WirePin,
    dc: WirePin,
    reset: WirePin,
    clk: WirePin,
    busy: PinMock,
    sda: PinMock,
    delay: FakeDelay,
    busy_when: PinState,
}

impl FakeHw {
    /// A board whose busy line must never be sampled.
    pub fn new() -> Self {
        Self::with_pins(&[], &[])
    }

    /// A board whose busy line returns the scripted states.
    pub fn with_busy(busy: &[PinTransaction]) -> Self {
        Self::with_pins(busy, &[])
    }

    /// A board whose data line returns the scripted states when read back.
    pub fn with_sda(sda: &[PinTransaction]) -> Self {
        Self::with_pins(&[], sda)
    }

    fn with_pins(busy: &[PinTransaction], sda: &[PinTransaction]) -> Self {
        let wire = Wire::default();
        let pin = |line| WirePin {
            line,
            wire: wire.clone(),
        };
        Self {
            spi: FakeBus {
                wire: wire.clone(),
                fail_in: None,
            },
            cs: pin(Line::Cs),
            dc: pin(Line::Dc),
            reset: pin(Line::Reset),
            clk: pin(Line::Clk),
            busy: PinMock::new(busy),
            sda: PinMock::new(sda),
            delay: FakeDelay { wire: wire.clone() },
            busy_when: PinState::High,
            wire,
        }
    }

    /// Treats a low busy line as busy.
    pub fn busy_when_low(mut self) -> Self {
        self.busy_when = PinState::Low;
        self
    }

    /// Makes the `n`th bus write from now on fail, counting from 1.
    pub fn fail_nth_write(&mut self, n: usize) {
        self.spi.fail_in = Some(n);
    }

    /// Checks that every scripted input was consumed.
    pub fn done(&mut self) {
        self.busy.done();
        self.sda.done();
    }
}

impl Ssd1619Hw for FakeHw {
    type Spi = FakeBus;
    type Cs = WirePin;
    type Dc = WirePin;
    type Reset = WirePin;
    type Busy = PinMock;
    type Delay = FakeDelay;
    type Error = FakeError;

    fn spi(&mut self) -> &mut FakeBus {
        &mut self.spi
    }

    fn cs(&mut self) -> &mut WirePin {
        &mut self.cs
    }

    fn dc(&mut self) -> &mut WirePin {
        &mut self.dc
    }

    fn reset(&mut self) -> &mut WirePin {
        &mut self.reset
    }

    fn busy(&mut self) -> &mut PinMock {
        &mut self.busy
    }

    fn delay(&mut self) -> &mut FakeDelay {
        &mut self.delay
    }

    fn busy_when(&self) -> PinState {
        self.busy_when
    }

    fn feed_watchdog(&mut self, budget: Duration) {
        self.wire.push(Event::Watchdog(budget));
    }

    fn sample_telemetry(&mut self) {
        self.wire.push(Event::Telemetry);
    }
}

impl ReadbackHw for FakeHw {
    type Sda = PinMock;
    type Clk = WirePin;

    fn sda(&mut self) -> &mut PinMock {
        &mut self.sda
    }

    fn clk(&mut self) -> &mut WirePin {
        &mut self.clk
    }

    fn sda_input(&mut self) -> Result<(), FakeError> {
        self.wire.push(Event::SdaInput);
        Ok(())
    }

    fn sda_output(&mut self) -> Result<(), FakeError> {
        self.wire.push(Event::SdaOutput);
        Ok(())
    }
}

/// The byte [RecordingSource] fills row `y` of `plane` with.
pub fn row_marker(y: u16, plane: Plane) -> u8 {
    let red = match plane {
        Plane::Monochrome => 0,
        Plane::Red => 0x80,
    };
    (y as u8 & 0x7F) | red
}

/// A row source that records each request and fills rows with [row_marker].
pub struct RecordingSource {
    wire: Wire,
}

impl RecordingSource {
    pub fn new(wire: &Wire) -> Self {
        Self { wire: wire.clone() }
    }
}

impl RowSource for RecordingSource {
    fn render_row(&mut self, row: &mut [u8], y: u16, plane: Plane) {
        assert!(row.iter().all(|b| *b == 0), "row {} was not cleared", y);
        self.wire.push(Event::Render(y, plane));
        row.fill(row_marker(y, plane));
    }

    fn flush_pending(&mut self) {
        self.wire.push(Event::FlushPending);
    }
}
