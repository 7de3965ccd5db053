use core::time::Duration;

use bitflags::bitflags;
use embedded_hal::{
    digital::{ErrorType as PinErrorType, OutputPin as _, PinState},
    spi::{Phase, Polarity},
};
use embedded_hal_async::delay::DelayNs as _;

use crate::{
    encoder::{CommandEncoder as _, RegisterRead as _},
    geometry::{
        position_x_arg, position_y_args, window_x_args, window_y_args, Geometry, MAX_COLUMN,
    },
    hw::{BusyWait as _, ReadbackHw, Ssd1619Hw, WaitOutcome},
    log::{debug, warn_log},
    pipeline::{transfer_planes, RowSource},
};

pub const RECOMMENDED_SPI_HZ: u32 = 4_000_000; // 4 MHz
/// Use this phase in conjunction with [RECOMMENDED_SPI_POLARITY] so that the EPD can capture data
/// on the rising edge.
pub const RECOMMENDED_SPI_PHASE: Phase = Phase::CaptureOnFirstTransition;
/// Use this polarity in conjunction with [RECOMMENDED_SPI_PHASE] so that the EPD can capture data
/// on the rising edge.
pub const RECOMMENDED_SPI_POLARITY: Polarity = Polarity::IdleLow;
/// The default pin state that indicates the display is busy.
pub const DEFAULT_BUSY_WHEN: PinState = PinState::High;

/// How long the reset line is held low.
pub const RESET_PULSE_MS: u32 = 10;
/// How long the controller is given to come out of a hardware reset.
pub const RESET_RECOVERY_MS: u32 = 50;
/// Settling time after each software reset during configuration.
pub const SOFT_RESET_SETTLE_MS: u32 = 10;
/// Busy bound after a reset.
pub const RESET_BUSY_TIMEOUT_MS: u32 = 15;
/// Busy bound after configuration, which loads the LUT from OTP.
pub const CONFIGURE_BUSY_TIMEOUT_MS: u32 = 10_000;
/// Busy bound for a full refresh. A bi-color refresh takes around 15 seconds at room
/// temperature, and much longer in the cold.
pub const REFRESH_BUSY_TIMEOUT_MS: u32 = 120_000;
/// Watchdog budget requested while a LUT is selected.
pub const LUT_WATCHDOG_BUDGET: Duration = Duration::from_secs(120);

/// Low-level commands for the SSD1619. You probably want to use the other methods exposed on
/// [Ssd1619] for most operations, but can send commands directly with [Ssd1619::send] for
/// low-level control or experimentation.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Sets the number of gate lines (height - 1, low byte first) and the scan direction.
    DriverOutputControl = 0x01,
    /// Configures the booster soft start phases.
    SoftStartControl = 0x0C,
    /// Enters deep sleep. Requires a hardware reset and reinitialisation to wake up.
    DeepSleepMode = 0x10,
    /// Changes the auto-increment behaviour of the address counter.
    DataEntryModeSetting = 0x11,
    /// Resets all commands and parameters to default values (except deep sleep mode).
    SwReset = 0x12,
    /// Secondary reset, used after a hardware reset and during configuration.
    SwResetSecondary = 0x13,
    /// Configures the supply voltage detection.
    SetupVoltageDetect = 0x15,
    /// Selects the temperature sensor. `0x80` selects the internal sensor.
    TemperatureSensorControl = 0x18,
    /// Activates the display update sequence. This must be set beforehand using
    /// [Command::DisplayUpdateControl2]. This operation must not be interrupted.
    MasterActivation = 0x20,
    /// Selects how the two RAM planes are read during an update.
    DisplayUpdateControl1 = 0x21,
    /// Configures the display update sequence for use with [Command::MasterActivation]. See
    /// [UpdateSequence].
    DisplayUpdateControl2 = 0x22,
    /// Writes the black/white plane.
    WriteRamBw = 0x24,
    /// Writes the red plane.
    WriteRamRed = 0x26,
    /// Triggers a VCOM glitch-free update.
    VcomGlitchControl = 0x2B,
    /// Reads the status register (busy, chip ID and voltage detection bits).
    ReadStatus = 0x2F,
    /// Loads the waveform LUT from OTP.
    LoadOtpLut = 0x31,
    /// Writes the LUT register directly.
    WriteLut = 0x32,
    /// Selects the border waveform.
    BorderWaveformControl = 0x3C,
    /// Sets the start and end positions of the X axis for the auto-incrementing address counter.
    /// Start and end are inclusive, and sent as byte numbers (pixel column / 8).
    SetRamXStartEnd = 0x44,
    /// Sets the start and end positions of the Y axis for the auto-incrementing address counter.
    /// Start and end are inclusive.
    SetRamYStartEnd = 0x45,
    /// Fills the red plane with a pattern.
    AutoWritePatternRed = 0x46,
    /// Fills the black/white plane with a pattern.
    AutoWritePatternBw = 0x47,
    /// Sets the current x byte of the address counter.
    SetRamX = 0x4E,
    /// Sets the current y coordinate of the address counter.
    SetRamY = 0x4F,
    /// Undocumented analog block setting required after reset.
    AnalogBlockControl = 0x74,
    /// Undocumented digital block setting required after reset.
    DigitalBlockControl = 0x7E,
}

impl Command {
    /// Returns the register address for this command.
    pub fn register(&self) -> u8 {
        *self as u8
    }
}

bitflags! {
    /// Steps of the update sequence run by [Command::MasterActivation].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UpdateSequence: u8 {
        const CLOCK_ON = 0x80;
        const ANALOG_ON = 0x40;
        const LATCH_TEMPERATURE = 0x20;
        const LOAD_LUT = 0x10;
        const MODE_2 = 0x08;
        const DISPLAY = 0x04;
        const ANALOG_OFF = 0x02;
        const CLOCK_OFF = 0x01;

        /// Reads the temperature and loads the matching LUT, without touching the panel.
        const LOAD_SETTINGS = Self::CLOCK_ON.bits()
            | Self::LATCH_TEMPERATURE.bits()
            | Self::LOAD_LUT.bits()
            | Self::CLOCK_OFF.bits();
        /// A complete refresh, powering the analog block up and down around it.
        const FULL_REFRESH = Self::CLOCK_ON.bits()
            | Self::ANALOG_ON.bits()
            | Self::LATCH_TEMPERATURE.bits()
            | Self::LOAD_LUT.bits()
            | Self::DISPLAY.bits()
            | Self::ANALOG_OFF.bits()
            | Self::CLOCK_OFF.bits();
    }
}

const ANALOG_BLOCK_INIT_DATA: [u8; 1] = [0x54];
const DIGITAL_BLOCK_INIT_DATA: [u8; 1] = [0x3B];
const VCOM_GLITCH_INIT_DATA: [u8; 2] = [0x04, 0x63];
/// Normal RAM reads for both planes, all sources.
const DISPLAY_UPDATE_1_INIT_DATA: [u8; 2] = [0x08, 0x00];
/// Border follows the white level of the LUT.
const BORDER_WAVEFORM_INIT_DATA: [u8; 1] = [0x01];
const INTERNAL_TEMPERATURE_SENSOR: [u8; 1] = [0x80];
/// Deep sleep mode 2: RAM is not retained.
const DEEP_SLEEP_MODE_2: [u8; 1] = [0x03];

/// The phase of the controller state machine.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Uninitialized,
    Resetting,
    Configuring,
    Ready,
    Transferring,
    Refreshing,
    Sleeping,
}

/// What the driver knows about the controller.
///
/// The session is observational: operations issued out of order still run, they just log a
/// warning.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    state: ControllerState,
    initialized: bool,
}

impl Session {
    const fn new() -> Self {
        Self {
            state: ControllerState::Uninitialized,
            initialized: false,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Whether the controller has been configured since the last reset or sleep.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Controls a bi-color (black/white/red) panel driven by an SSD1619.
///
/// Pixel data is never held by the driver: frames are pulled row by row from a [RowSource]
/// while they are uploaded, see [crate::pipeline].
///
/// A typical cycle is [Ssd1619::setup], [Ssd1619::draw], then [Ssd1619::enter_sleep]. A sleeping
/// panel is woken up with another [Ssd1619::setup].
pub struct Ssd1619<HW> {
    hw: HW,
    geometry: Geometry,
    session: Session,
}

impl<HW: Ssd1619Hw> Ssd1619<HW> {
    pub fn new(hw: HW, geometry: Geometry) -> Self {
        Ssd1619 {
            hw,
            geometry,
            session: Session::new(),
        }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn session(&self) -> Session {
        self.session
    }

    pub fn is_initialized(&self) -> bool {
        self.session.initialized
    }

    /// Send the following command and data to the display.
    pub async fn send(&mut self, command: Command, data: &[u8]) -> Result<(), HW::Error> {
        self.hw.command_with(command.register(), data).await
    }

    fn enter(&mut self, state: ControllerState) {
        if self.session.state != state {
            debug!("EPD {:?} -> {:?}", self.session.state, state);
            self.session.state = state;
        }
    }

    fn warn_if_uninitialized(&self, operation: &str) {
        if !self.session.initialized {
            warn_log!("EPD {} before setup, proceeding anyway", operation);
        }
    }

    /// Pulses the hardware reset line, then issues the secondary soft reset.
    ///
    /// This loses the controller configuration, so [Ssd1619::configure] must follow before the
    /// next transfer.
    pub async fn reset(&mut self) -> Result<WaitOutcome, HW::Error> {
        debug!("Resetting EPD");
        self.enter(ControllerState::Resetting);
        self.session.initialized = false;

        // Assume reset is already high.
        self.hw.reset().set_low()?;
        self.hw.delay().delay_ms(RESET_PULSE_MS).await;
        self.hw.reset().set_high()?;
        self.hw.delay().delay_ms(RESET_RECOVERY_MS).await;

        self.send(Command::SwResetSecondary, &[]).await?;
        self.hw.wait_busy_falling(RESET_BUSY_TIMEOUT_MS).await
    }

    /// Configures the analog and digital blocks and the panel size, then loads the LUT.
    ///
    /// The session is marked initialized once this completes, even if the controller was still
    /// busy when the bound ran out.
    pub async fn configure(&mut self) -> Result<WaitOutcome, HW::Error> {
        debug!("Configuring EPD");
        self.enter(ControllerState::Configuring);

        self.send(Command::SwReset, &[]).await?;
        self.hw.delay().delay_ms(SOFT_RESET_SETTLE_MS).await;
        self.send(Command::SwResetSecondary, &[]).await?;
        self.hw.delay().delay_ms(SOFT_RESET_SETTLE_MS).await;

        self.send(Command::AnalogBlockControl, &ANALOG_BLOCK_INIT_DATA)
            .await?;
        self.send(Command::DigitalBlockControl, &DIGITAL_BLOCK_INIT_DATA)
            .await?;
        self.send(Command::VcomGlitchControl, &VCOM_GLITCH_INIT_DATA)
            .await?;

        let [last_low, last_high] = position_y_args(self.geometry.height() - 1);
        self.send(Command::DriverOutputControl, &[last_low, last_high, 0x00])
            .await?;
        self.send(Command::DisplayUpdateControl1, &DISPLAY_UPDATE_1_INIT_DATA)
            .await?;
        self.send(Command::BorderWaveformControl, &BORDER_WAVEFORM_INIT_DATA)
            .await?;
        self.send(
            Command::TemperatureSensorControl,
            &INTERNAL_TEMPERATURE_SENSOR,
        )
        .await?;
        self.send(
            Command::DisplayUpdateControl2,
            &[UpdateSequence::LOAD_SETTINGS.bits()],
        )
        .await?;
        self.send(Command::MasterActivation, &[]).await?;

        let outcome = self.hw.wait_busy_falling(CONFIGURE_BUSY_TIMEOUT_MS).await?;
        self.session.initialized = true;
        self.enter(ControllerState::Ready);
        Ok(outcome)
    }

    /// Resets and configures the display. This is also how a sleeping display is woken.
    pub async fn setup(&mut self) -> Result<(), HW::Error> {
        debug!("Initialising EPD");
        self.reset().await?;
        self.configure().await?;
        Ok(())
    }

    /// Resets the controller, then puts it into deep sleep.
    ///
    /// RAM content is lost; [Ssd1619::setup] is required before the next draw.
    pub async fn enter_sleep(&mut self) -> Result<(), HW::Error> {
        debug!("Sleeping EPD");
        self.reset().await?;
        self.send(Command::DeepSleepMode, &DEEP_SLEEP_MODE_2).await?;
        self.session.initialized = false;
        self.enter(ControllerState::Sleeping);
        Ok(())
    }

    /// Sets the RAM columns `start..end` that subsequent writes fill.
    ///
    /// Both bounds should be multiples of 8 below 2048. Other values are logged and clamped to
    /// the nearest byte address, which leads to misaligned content.
    pub async fn set_window_x(&mut self, start: u16, end: u16) -> Result<(), HW::Error> {
        if start % 8 != 0 || end % 8 != 0 || end <= start || end > MAX_COLUMN {
            warn_log!("EPD window columns {}..{} out of range, clamping", start, end);
        }
        self.send(Command::SetRamXStartEnd, &window_x_args(start, end))
            .await
    }

    /// Sets the RAM rows `start..end` that subsequent writes fill.
    pub async fn set_window_y(&mut self, start: u16, end: u16) -> Result<(), HW::Error> {
        if end <= start {
            warn_log!("EPD window rows {}..{} are empty, clamping", start, end);
        }
        self.send(Command::SetRamYStartEnd, &window_y_args(start, end))
            .await
    }

    /// Sets the address counter to write the next data to.
    ///
    /// `x` should be a multiple of 8 below 2048. Other values are logged and clamped, which
    /// leads to misaligned content.
    pub async fn set_position(&mut self, x: u16, y: u16) -> Result<(), HW::Error> {
        if x % 8 != 0 || x >= MAX_COLUMN {
            warn_log!("EPD column {} out of range, clamping", x);
        }
        self.send(Command::SetRamX, &[position_x_arg(x)]).await?;
        self.send(Command::SetRamY, &position_y_args(y)).await
    }

    /// Uploads both planes of a full frame from `source`, without refreshing the display.
    pub async fn transfer_frame<R>(&mut self, source: &mut R) -> Result<(), HW::Error>
    where
        R: RowSource + ?Sized,
    {
        self.warn_if_uninitialized("transfer");
        let previous = self.session.state;
        self.enter(ControllerState::Transferring);
        let transferred = self.upload_frame(source).await;
        self.enter(previous);
        transferred
    }

    async fn upload_frame<R>(&mut self, source: &mut R) -> Result<(), HW::Error>
    where
        R: RowSource + ?Sized,
    {
        let x_start = self.geometry.x_offset();
        let x_end = x_start + self.geometry.width();
        debug!("Transferring frame, columns {}..{}", x_start, x_end);
        self.set_window_x(x_start, x_end).await?;
        self.set_position(x_start, 0).await?;

        transfer_planes(
            &mut self.hw,
            source,
            self.geometry.height(),
            self.geometry.row_bytes(),
        )
        .await
    }

    /// Runs a full refresh of the panel from its RAM.
    ///
    /// If `blocking` is false, this returns `None` as soon as the refresh has started, and
    /// [Ssd1619::wait_until_ready] must be awaited before the next command. Otherwise it
    /// returns how the wait for the refresh ended.
    pub async fn refresh(&mut self, blocking: bool) -> Result<Option<WaitOutcome>, HW::Error> {
        debug!("Refreshing EPD");
        self.warn_if_uninitialized("refresh");
        self.enter(ControllerState::Refreshing);

        self.send(
            Command::DisplayUpdateControl2,
            &[UpdateSequence::FULL_REFRESH.bits()],
        )
        .await?;
        self.send(Command::MasterActivation, &[]).await?;

        if !blocking {
            return Ok(None);
        }
        self.wait_until_ready().await.map(Some)
    }

    /// Waits for a refresh to complete, or for the refresh bound to run out.
    ///
    /// Returns immediately if the panel is already idle. Either outcome means the driver is
    /// ready for the next command.
    pub async fn wait_until_ready(&mut self) -> Result<WaitOutcome, HW::Error> {
        let outcome = self.hw.wait_busy_falling(REFRESH_BUSY_TIMEOUT_MS).await?;
        if self.session.state == ControllerState::Refreshing {
            let next = if self.session.initialized {
                ControllerState::Ready
            } else {
                ControllerState::Uninitialized
            };
            self.enter(next);
        }
        Ok(outcome)
    }

    /// Uploads a frame and starts the refresh, without waiting for it to finish.
    pub async fn draw_no_wait<R>(&mut self, source: &mut R) -> Result<(), HW::Error>
    where
        R: RowSource + ?Sized,
    {
        self.transfer_frame(source).await?;
        self.refresh(false).await?;
        Ok(())
    }

    /// Uploads a frame and refreshes the panel.
    ///
    /// Board telemetry is sampled while the refresh runs.
    pub async fn draw<R>(&mut self, source: &mut R) -> Result<WaitOutcome, HW::Error>
    where
        R: RowSource + ?Sized,
    {
        self.draw_no_wait(source).await?;
        self.hw.sample_telemetry();
        self.wait_until_ready().await
    }

    /// Selects the waveform LUT for the next refresh.
    ///
    /// The panel always uses the LUT it loads from OTP during [Ssd1619::configure], so this only
    /// asks the board to hold off its watchdog for [LUT_WATCHDOG_BUDGET].
    pub fn select_lut(&mut self, _lut: u8) {
        self.hw.feed_watchdog(LUT_WATCHDOG_BUDGET);
    }
}

impl<HW> Ssd1619<HW>
where
    HW: ReadbackHw,
    HW::Error: From<<HW::Sda as PinErrorType>::Error> + From<<HW::Clk as PinErrorType>::Error>,
{
    /// Reads the controller's status register.
    pub async fn read_status(&mut self) -> Result<u8, HW::Error> {
        self.hw.read_register(Command::ReadStatus.register()).await
    }
}
