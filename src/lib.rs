//! Platform-agnostic driver for the TAOS TSL2561 light-to-digital converter.
//!
//! The chip has one broadband photodiode (visible plus infrared, channel 0) and
//! one infrared photodiode (channel 1). The driver powers the device up for each
//! measurement, waits out the configured integration window, reads both
//! channels and powers it back down. [`lux::compute_lux`] turns the raw pair
//! into an illuminance estimate that approximates the human eye response.
//!
//! Both a blocking ([`blocking::Tsl2561`], re-exported as [`Tsl2561`]) and an
//! async ([`asynchronous::Tsl2561`]) driver are provided, built on the
//! `embedded-hal` and `embedded-hal-async` traits respectively.
//!
//! ```no_run
//! use embedded_hal_mock::eh1::{delay::NoopDelay, i2c::Mock};
//! use tsl2561_rs::{Config, Gain, Integration, Tsl2561};
//!
//! # let i2c = Mock::new(&[]);
//! let mut tsl2561 = Tsl2561::new(i2c, NoopDelay::new(), Config::default());
//!
//! // Optional, the default is 402ms with no gain
//! tsl2561.set_timing(Integration::T101ms, Gain::X1).unwrap();
//!
//! let luminosity = tsl2561.get_luminosity().unwrap();
//! let lux = tsl2561.calculate_lux(luminosity.broadband, luminosity.infrared);
//! ```
#![no_std]

#[macro_use]
mod fmt;

pub mod lux;

use duplicate::duplicate_item;

#[allow(dead_code)]
mod chip {
    use bitfield::bitfield;

    /* Useful general chip constants */
    pub const PARTNO_TSL2560CS: u8 = 0b0000;
    pub const PARTNO_TSL2561CS: u8 = 0b0001;
    pub const PARTNO_TSL2560T: u8 = 0b0100;
    pub const PARTNO_TSL2561T: u8 = 0b0101;

    /* Available registers on the chip */
    pub mod reg {
        pub const CONTROL: u8 = 0x00;
        pub const TIMING: u8 = 0x01;
        pub const THRESHLOWLOW: u8 = 0x02;
        pub const THRESHLOWHIGH: u8 = 0x03;
        pub const THRESHHIGHLOW: u8 = 0x04;
        pub const THRESHHIGHHIGH: u8 = 0x05;
        pub const INTERRUPT: u8 = 0x06;
        pub const ID: u8 = 0x0A;
        pub const DATA0LOW: u8 = 0x0C;
        pub const DATA0HIGH: u8 = 0x0D;
        pub const DATA1LOW: u8 = 0x0E;
        pub const DATA1HIGH: u8 = 0x0F;
    }

    /* Control (0x0): Reserved:7:2 | POWER:1:0 */
    pub mod control {
        pub const POWER_ON: u8 = 0x03;
        pub const POWER_OFF: u8 = 0x00;
    }

    bitfield! {
        /* Command: CMD:7 | CLEAR:6 | WORD:5 | BLOCK:4 | ADDRESS:3:0 */
        #[derive(Clone, Copy)]
        pub struct Command(u8);
        impl Debug;
        pub cmd, set_cmd: 7;
        pub clear, set_clear: 6;
        pub word, set_word: 5;
        pub block, set_block: 4;
        pub u8, address, set_address: 3, 0;
    }

    impl Command {
        pub fn byte(reg: u8) -> Self {
            let mut command = Command(0);
            command.set_cmd(true);
            command.set_address(reg);
            command
        }

        pub fn word_protocol(reg: u8) -> Self {
            let mut command = Self::byte(reg);
            command.set_word(true);
            command
        }

        pub fn clear_interrupt() -> Self {
            let mut command = Command(0);
            command.set_cmd(true);
            command.set_clear(true);
            command
        }

        pub fn bits(self) -> u8 {
            self.0
        }
    }

    bitfield! {
        /* Timing (0x1): Reserved:7:5 | GAIN:4 | MANUAL:3 | Reserved:2 | INTEG:1:0 */
        #[derive(Clone, Copy)]
        pub struct Timing(u8);
        impl Debug;
        pub gain, set_gain: 4;
        pub manual, set_manual: 3;
        pub u8, integ, set_integ: 1, 0;
    }

    impl Timing {
        pub fn new(integ: u8, high_gain: bool) -> Self {
            let mut timing = Timing(0);
            timing.set_integ(integ);
            timing.set_gain(high_gain);
            timing
        }

        pub fn bits(self) -> u8 {
            self.0
        }
    }

    bitfield! {
        /* Interrupt (0x6): Reserved:7:6 | INTR:5:4 | PERSIST:3:0 */
        #[derive(Clone, Copy)]
        pub struct InterruptControl(u8);
        impl Debug;
        pub u8, intr, set_intr: 5, 4;
        pub u8, persist, set_persist: 3, 0;
    }

    impl InterruptControl {
        pub fn new(intr: u8, persist: u8) -> Self {
            let mut control = InterruptControl(0);
            control.set_intr(intr);
            control.set_persist(persist);
            control
        }

        pub fn bits(self) -> u8 {
            self.0
        }
    }

    bitfield! {
        /* ID (0xA): PARTNO:7:4 | REVNO:3:0 */
        #[derive(Clone, Copy)]
        pub struct Id(u8);
        impl Debug;
        pub u8, partno, _: 7, 4;
        pub u8, revno, _: 3, 0;
    }

    impl Id {
        pub fn from_bits(bits: u8) -> Self {
            Id(bits)
        }
    }
}

/// Integration time, the ADC accumulation window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Integration {
    T13ms = 0b00,
    T101ms = 0b01,
    #[default]
    T402ms = 0b10,
}

impl Integration {
    /// How long to wait after power-on before the channels hold a full reading.
    pub fn settle_ms(self) -> u32 {
        match self {
            Integration::T13ms => 14,
            Integration::T101ms => 102,
            Integration::T402ms => 400,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Gain {
    #[default]
    X1,
    X16,
}

/// Package variant, selects the lux coefficient table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Package {
    /// T, FN and CL packages
    #[default]
    T,
    /// Chipscale package
    Cs,
}

/// 7-bit bus address, set by the ADDR SEL pin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Address {
    Low = 0x29,
    #[default]
    Float = 0x39,
    High = 0x49,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Part {
    Tsl2560Cs,
    Tsl2561Cs,
    Tsl2560T,
    Tsl2561T,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InterruptMode {
    Disabled = 0b00,
    Level = 0b01,
    SmbAlert = 0b10,
    Test = 0b11,
}

/// Interrupt persistence filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Persist {
    /// Interrupt after every ADC cycle
    EveryCycle,
    /// Interrupt after this many consecutive cycles outside the threshold.
    ///
    /// 0 behaves like [`EveryCycle`](Persist::EveryCycle), values above 15 count as 15.
    Outside(u8),
}

impl Persist {
    fn bits(self) -> u8 {
        match self {
            Persist::EveryCycle => 0,
            Persist::Outside(cycles) => cycles.min(15),
        }
    }
}

/// Deployment parameters for one sensor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub address: Address,
    pub package: Package,
    /// Timing applied by `init()`
    pub integration: Integration,
    pub gain: Gain,
}

/// One raw reading of both channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Luminosity {
    /// Channel 0, visible plus infrared
    pub broadband: u16,
    /// Channel 1, infrared only
    pub infrared: u16,
}

#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    I2cError(E),
    InvalidId(u8),
}

impl<E> From<E> for Error<E> {
    fn from(error: E) -> Self {
        Error::I2cError(error)
    }
}

fn decode_id(id: u8) -> Option<(Part, u8)> {
    let fields = chip::Id::from_bits(id);
    let part = match fields.partno() {
        chip::PARTNO_TSL2560CS => Part::Tsl2560Cs,
        chip::PARTNO_TSL2561CS => Part::Tsl2561Cs,
        chip::PARTNO_TSL2560T => Part::Tsl2560T,
        chip::PARTNO_TSL2561T => Part::Tsl2561T,
        _ => return None,
    };

    Some((part, fields.revno()))
}

// Lets one driver body serve both flavours: blocking calls end in `.identity()`
// where the async ones end in `.await`.
trait Identity: Sized {
    fn identity(self) -> Self {
        self
    }
}

impl<T> Identity for T {}

#[duplicate_item(
    module          async    await          I2cBus                          DelayBus;
    [blocking]      []       [identity()]   [embedded_hal::i2c::I2c]        [embedded_hal::delay::DelayNs];
    [asynchronous]  [async]  [await]        [embedded_hal_async::i2c::I2c]  [embedded_hal_async::delay::DelayNs];
)]
pub mod module {
    #[allow(unused_imports)]
    use crate::Identity;
    use crate::{
        chip, decode_id, lux, Address, Config, Error, Gain, Integration, InterruptMode,
        Luminosity, Package, Part, Persist,
    };

    /// A TSL2561 on a bus, together with the delay used to wait out integration.
    ///
    /// The device is kept powered down whenever it is not measuring. Every
    /// operation that talks to the chip brings it up lazily on first use.
    pub struct Tsl2561<I, D> {
        i2c: I,
        delay: D,
        config: Config,
        // What the TIMING register holds; the chip powers up at 402ms / 1x
        integration: Integration,
        gain: Gain,
        initialized: bool,
        powered_on: bool,
    }

    impl<I, D> Tsl2561<I, D>
    where
        I: I2cBus,
        D: DelayBus,
    {
        /// Does not touch the bus.
        pub fn new(i2c: I, delay: D, config: Config) -> Self {
            Tsl2561 {
                i2c,
                delay,
                config,
                integration: Integration::T402ms,
                gain: Gain::X1,
                initialized: false,
                powered_on: false,
            }
        }

        pub fn release(self) -> (I, D) {
            (self.i2c, self.delay)
        }

        pub fn address(&self) -> Address {
            self.config.address
        }

        pub fn package(&self) -> Package {
            self.config.package
        }

        /// Integration time last written to the chip.
        pub fn integration(&self) -> Integration {
            self.integration
        }

        /// Gain last written to the chip.
        pub fn gain(&self) -> Gain {
            self.gain
        }

        pub fn is_initialized(&self) -> bool {
            self.initialized
        }

        /// Whether the last power transition the driver made was to on.
        ///
        /// Stays `true` if a measurement failed between power-on and power-off.
        pub fn is_powered_on(&self) -> bool {
            self.powered_on
        }

        pub async fn write_command(&mut self, cmd: u8) -> Result<(), Error<I::Error>> {
            let address = self.config.address as u8;
            self.i2c.write(address, &[cmd]).await?;
            Ok(())
        }

        pub async fn write_register(&mut self, reg: u8, val: u8) -> Result<(), Error<I::Error>> {
            let address = self.config.address as u8;
            let buf = [chip::Command::byte(reg).bits(), val];
            self.i2c.write(address, &buf).await?;
            Ok(())
        }

        pub async fn write_register16(&mut self, reg: u8, val: u16) -> Result<(), Error<I::Error>> {
            let address = self.config.address as u8;
            let val = val.to_le_bytes();
            let buf = [chip::Command::word_protocol(reg).bits(), val[0], val[1]];
            self.i2c.write(address, &buf).await?;
            Ok(())
        }

        pub async fn read_register(&mut self, reg: u8) -> Result<u8, Error<I::Error>> {
            let address = self.config.address as u8;
            let mut buf = [0u8; 1];
            self.i2c
                .write_read(address, &[chip::Command::byte(reg).bits()], &mut buf)
                .await?;
            Ok(buf[0])
        }

        /// Word read with a repeated start, low byte first.
        pub async fn read_register16(&mut self, reg: u8) -> Result<u16, Error<I::Error>> {
            let address = self.config.address as u8;
            let mut buf = [0u8; 2];
            self.i2c
                .write_read(address, &[chip::Command::word_protocol(reg).bits()], &mut buf)
                .await?;
            Ok(u16::from_le_bytes(buf))
        }

        /// Marks the device as brought up and writes the configured timing.
        ///
        /// The chip powers up in power-down mode and is left that way. If the
        /// timing write fails the handle stays uninitialized, so the next
        /// operation runs the bring-up again.
        pub async fn init(&mut self) -> Result<(), Error<I::Error>> {
            debug!("tsl2561: init at {=u8:#x}", self.config.address as u8);
            self.initialized = true;

            let (integration, gain) = (self.config.integration, self.config.gain);
            let result = self.apply_timing(integration, gain).await;
            if result.is_err() {
                warn!("tsl2561: init failed");
                self.initialized = false;
            }
            result
        }

        async fn ensure_init(&mut self) -> Result<(), Error<I::Error>> {
            if !self.initialized {
                self.init().await?;
            }
            Ok(())
        }

        async fn power_on(&mut self) -> Result<(), Error<I::Error>> {
            self.write_register(chip::reg::CONTROL, chip::control::POWER_ON)
                .await?;
            self.powered_on = true;
            trace!("tsl2561: power on");
            Ok(())
        }

        async fn power_off(&mut self) -> Result<(), Error<I::Error>> {
            self.write_register(chip::reg::CONTROL, chip::control::POWER_OFF)
                .await?;
            self.powered_on = false;
            trace!("tsl2561: power off");
            Ok(())
        }

        pub async fn enable(&mut self) -> Result<(), Error<I::Error>> {
            self.ensure_init().await?;
            self.power_on().await
        }

        pub async fn disable(&mut self) -> Result<(), Error<I::Error>> {
            self.ensure_init().await?;
            self.power_off().await
        }

        // Shared by init() and set_timing() so neither has to call the other
        async fn apply_timing(
            &mut self,
            integration: Integration,
            gain: Gain,
        ) -> Result<(), Error<I::Error>> {
            self.power_on().await?;

            let timing = chip::Timing::new(integration as u8, gain == Gain::X16);
            self.write_register(chip::reg::TIMING, timing.bits()).await?;

            self.integration = integration;
            self.gain = gain;
            debug!("tsl2561: timing {} gain {}", integration, gain);

            self.power_off().await
        }

        /// Sets the integration time and gain.
        ///
        /// On failure the cached timing keeps its previous value; the chip may be
        /// left powered on if the timing write itself failed.
        pub async fn set_timing(
            &mut self,
            integration: Integration,
            gain: Gain,
        ) -> Result<(), Error<I::Error>> {
            self.ensure_init().await?;
            self.apply_timing(integration, gain).await
        }

        /// Powers up, waits out one integration window and reads both channels.
        ///
        /// Any failure returns right away. A failed read does not power the chip
        /// back down, check [`is_powered_on`](Self::is_powered_on) and call
        /// [`disable`](Self::disable) if that matters.
        pub async fn get_luminosity(&mut self) -> Result<Luminosity, Error<I::Error>> {
            self.enable().await?;

            let wait = self.integration.settle_ms();
            self.delay.delay_ms(wait).await;

            let broadband = self.read_register16(chip::reg::DATA0LOW).await?;
            let infrared = self.read_register16(chip::reg::DATA1LOW).await?;

            self.disable().await?;

            trace!("tsl2561: ch0 {=u16} ch1 {=u16}", broadband, infrared);
            Ok(Luminosity {
                broadband,
                infrared,
            })
        }

        /// Lux for a reading taken with the current timing and gain.
        pub fn calculate_lux(&self, broadband: u16, infrared: u16) -> u32 {
            lux::compute_lux(
                broadband,
                infrared,
                self.integration,
                self.gain,
                self.config.package,
            )
        }

        pub async fn get_lux(&mut self) -> Result<u32, Error<I::Error>> {
            let luminosity = self.get_luminosity().await?;
            let lux = self.calculate_lux(luminosity.broadband, luminosity.infrared);
            debug!("tsl2561: {=u32} lux", lux);
            Ok(lux)
        }

        pub async fn get_id(&mut self) -> Result<u8, Error<I::Error>> {
            self.ensure_init().await?;
            self.read_register(chip::reg::ID).await
        }

        /// Reads the ID register and decodes part and revision number.
        pub async fn check_id(&mut self) -> Result<(Part, u8), Error<I::Error>> {
            let id = self.get_id().await?;
            match decode_id(id) {
                Some(part) => Ok(part),
                None => {
                    warn!("tsl2561: unknown id {=u8:#x}", id);
                    Err(Error::InvalidId(id))
                }
            }
        }

        /// Sets the channel 0 window outside of which an interrupt is raised.
        pub async fn set_threshold(&mut self, lower: u16, upper: u16) -> Result<(), Error<I::Error>> {
            self.ensure_init().await?;
            self.power_on().await?;
            self.write_register16(chip::reg::THRESHLOWLOW, lower).await?;
            self.write_register16(chip::reg::THRESHHIGHLOW, upper).await?;
            self.power_off().await
        }

        pub async fn set_interrupt(
            &mut self,
            mode: InterruptMode,
            persist: Persist,
        ) -> Result<(), Error<I::Error>> {
            self.ensure_init().await?;

            let control = chip::InterruptControl::new(mode as u8, persist.bits());
            self.power_on().await?;
            self.write_register(chip::reg::INTERRUPT, control.bits()).await?;
            self.power_off().await
        }

        pub async fn clear_interrupt(&mut self) -> Result<(), Error<I::Error>> {
            self.ensure_init().await?;
            self.write_command(chip::Command::clear_interrupt().bits())
                .await
        }
    }
}

pub use blocking::Tsl2561;
