use core::fmt;

use tracing::{debug, trace, warn};

use crate::{
    codec::{self, PhaseCounts},
    config::EngineConfig,
    error::{Error, OutOfRange, Result},
    page::{Page, PagePolicy, PageState},
    register::{self, Address, PAGE_COMMAND, RegisterEntry, RegisterMap, Unit, ValueClass, Width},
    scaling::{self, ScaleCode},
    status::{self, DecodedStatus},
    transport::{Transport, bytes_from_word, word_from_bytes},
};

/// What to do with a command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Direction {
    Read,
    /// Encode and write an engineering value (or a raw value for raw registers).
    Write(f64),
    /// Send a command that carries no data, such as `CLEAR_FAULTS`.
    Send,
}

/// A converted register value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub value: f64,
    pub unit: Option<Unit>,
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            Some(unit) => write!(f, "{:.4} {}", self.value, unit),
            None => write!(f, "{:.4}", self.value),
        }
    }
}

/// The result of executing one command.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Value(Measurement),
    Status(DecodedStatus),
    /// Register content with reserved bits masked off.
    Raw(u16),
    Phases(PhaseCounts),
    /// The raw value that was written. The device may still have discarded it.
    Written(u16),
    Sent,
}

impl Outcome {
    pub fn value(&self) -> Option<f64> {
        match self {
            Outcome::Value(measurement) => Some(measurement.value),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<&DecodedStatus> {
        match self {
            Outcome::Status(status) => Some(status),
            _ => None,
        }
    }

    pub fn phases(&self) -> Option<PhaseCounts> {
        match self {
            Outcome::Phases(counts) => Some(*counts),
            _ => None,
        }
    }

    pub fn raw(&self) -> Option<u16> {
        match self {
            Outcome::Raw(raw) | Outcome::Written(raw) => Some(*raw),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Value(measurement) => write!(f, "{measurement}"),
            Outcome::Status(status) => write!(f, "{status}"),
            Outcome::Raw(raw) => write!(f, "0x{raw:04X}"),
            Outcome::Phases(counts) => write!(f, "{counts}"),
            Outcome::Written(raw) => write!(f, "wrote 0x{raw:04X}"),
            Outcome::Sent => write!(f, "sent"),
        }
    }
}

/// Result of a write followed by an explicit read-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteCheck {
    pub command: &'static str,
    pub written: u16,
    pub read_back: u16,
}

impl WriteCheck {
    /// Whether the device kept the written value.
    pub fn persisted(&self) -> bool {
        self.written == self.read_back
    }
}

/// One sample of every reading of a rail.
///
/// Phase counts and phase currents live in the shared extended register space, so they are
/// the same in the snapshots of both rails.
#[derive(Debug, Clone, PartialEq)]
pub struct RailTelemetry {
    pub page: Page,
    pub vout: f64,
    pub iout: f64,
    pub temperature: f64,
    pub die_temperature: f64,
    /// Percent.
    pub duty: f64,
    pub iin: f64,
    pub pin: f64,
    pub pout: f64,
    pub iout_peak: f64,
    pub temperature_peak: f64,
    /// `STATUS_WORD`.
    pub status: DecodedStatus,
    pub status_byte: DecodedStatus,
    pub status_vout: DecodedStatus,
    pub status_iout: DecodedStatus,
    pub status_input: DecodedStatus,
    pub status_temperature: DecodedStatus,
    pub status_mfr_specific: u8,
    pub phases: PhaseCounts,
    pub phase_currents: [u16; register::PHASE_COUNT],
}

/// Executes PMBus commands against one device through a [`Transport`].
///
/// The engine owns the transport and the page tracking state, so everything that needs the
/// page register set happens inside one `&mut self` call. Wrap it in a
/// [`SharedEngine`](crate::shared::SharedEngine) to use it from several threads.
///
/// Every read goes to the device; nothing is cached except the active page.
pub struct PmbusEngine<T: Transport> {
    transport: T,
    pages: PagePolicy,
    config: EngineConfig,
}

impl<T: Transport> PmbusEngine<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, EngineConfig::default())
    }

    pub fn with_config(transport: T, config: EngineConfig) -> Self {
        Self {
            transport,
            pages: PagePolicy::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn register_map(&self) -> &'static RegisterMap {
        self.config.register_map
    }

    pub fn page_state(&self) -> PageState {
        self.pages.state()
    }

    /// Number of `PAGE` writes this session has issued.
    pub fn page_selects(&self) -> u32 {
        self.pages.select_count()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Direct access to the transport. The next paged access re-selects its page, since the
    /// caller may have changed it.
    pub fn transport_mut(&mut self) -> &mut T {
        self.forget_page();
        &mut self.transport
    }

    /// Stop trusting the tracked page; the next paged access selects it again.
    pub fn forget_page(&mut self) {
        self.pages.invalidate();
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Resolve `command` and run it on `page`.
    ///
    /// `page` is ignored for registers that are not page-scoped.
    pub fn execute(
        &mut self,
        command: &str,
        page: Page,
        direction: Direction,
    ) -> Result<Outcome, T::Error> {
        let entry = self.config.register_map.resolve(command)?;
        debug!(
            command,
            resolved = entry.name,
            class = entry.class.name(),
            %page,
            ?direction,
            "execute"
        );
        self.execute_entry(entry, page, direction)
    }

    pub fn execute_entry(
        &mut self,
        entry: &RegisterEntry,
        page: Page,
        direction: Direction,
    ) -> Result<Outcome, T::Error> {
        match direction {
            Direction::Read => self.read_entry(entry, page),
            Direction::Write(value) => self.write_entry(entry, page, value),
            Direction::Send => self.send_entry(entry, page),
        }
    }

    fn read_entry(&mut self, entry: &RegisterEntry, page: Page) -> Result<Outcome, T::Error> {
        if !entry.access.readable() || entry.width == Width::Zero {
            return Err(unsupported(entry, "read"));
        }
        let raw = self.read_word(entry, page)?;
        let measurement = |value| {
            Outcome::Value(Measurement {
                value,
                unit: entry.unit,
            })
        };
        let outcome = match entry.class {
            ValueClass::RawBits => Outcome::Raw(raw),
            ValueClass::Linear11 => measurement(codec::decode_linear11(raw)),
            ValueClass::Linear16 => {
                let exponent = self.vout_exponent(page)?;
                measurement(codec::decode_linear16(raw, exponent))
            }
            ValueClass::VoltageLinearTemperature => {
                measurement(codec::decode_die_temperature(raw))
            }
            ValueClass::ScaledUnsignedCurrent => {
                let scale = self.scale_code(page)?;
                measurement(scaling::decode_scaled_current(raw as u8, scale))
            }
            ValueClass::FixedStep(step) => measurement(scaling::decode_fixed_step(raw, step)),
            ValueClass::VidStep => measurement(scaling::decode_vid_step(raw, page)),
            ValueClass::PhaseCounts => Outcome::Phases(PhaseCounts::from_raw(raw)),
            ValueClass::StatusBits(table) => Outcome::Status(status::decode(raw, table)),
        };
        Ok(outcome)
    }

    fn write_entry(
        &mut self,
        entry: &RegisterEntry,
        page: Page,
        value: f64,
    ) -> Result<Outcome, T::Error> {
        if !entry.access.writable() || entry.width == Width::Zero {
            return Err(unsupported(entry, "write"));
        }
        let raw = match entry.class {
            ValueClass::RawBits | ValueClass::PhaseCounts => {
                raw_from_value(value, entry.max_raw())?
            }
            ValueClass::FixedStep(step) => {
                scaling::encode_fixed_step(value, step, entry.max_raw())?
            }
            ValueClass::Linear11 => codec::encode_linear11(value)?,
            ValueClass::Linear16 => {
                let exponent = self.vout_exponent(page)?;
                codec::encode_vout_command(value, exponent)?
            }
            ValueClass::ScaledUnsignedCurrent => {
                let scale = self.scale_code(page)?;
                scaling::encode_scaled_current(value, scale)? as u16
            }
            ValueClass::VoltageLinearTemperature
            | ValueClass::VidStep
            | ValueClass::StatusBits(_) => {
                return Err(unsupported(entry, "write"));
            }
        };
        if entry.address == Address::Command(PAGE_COMMAND) {
            let target = Page::try_from(raw).map_err(Error::InvalidPage)?;
            self.select_page(target)?;
            return Ok(Outcome::Written(raw));
        }
        self.write_word(entry, page, raw)?;
        Ok(Outcome::Written(raw))
    }

    fn send_entry(&mut self, entry: &RegisterEntry, page: Page) -> Result<Outcome, T::Error> {
        if entry.width != Width::Zero {
            return Err(unsupported(entry, "send"));
        }
        if entry.paged {
            self.pages.ensure(page, &mut self.transport)?;
        }
        trace!(command = entry.name, "send byte");
        self.transport
            .write_raw(entry.address, &[], Width::Zero)
            .map_err(|err| self.transport_failed(err))?;
        Ok(Outcome::Sent)
    }

    /// Select `page` on the device if it is not already active.
    pub fn select_page(&mut self, page: Page) -> Result<(), T::Error> {
        self.pages.ensure(page, &mut self.transport)
    }

    /// Read a register and drop its reserved bits.
    fn read_word(&mut self, entry: &RegisterEntry, page: Page) -> Result<u16, T::Error> {
        if entry.paged {
            self.pages.ensure(page, &mut self.transport)?;
        }
        let bytes = self
            .transport
            .read_raw(entry.paged, entry.address, entry.width)
            .map_err(|err| self.transport_failed(err))?;
        trace!(
            command = entry.name,
            address = entry.address.value(),
            bytes = ?bytes.as_slice(),
            "read"
        );
        if bytes.len() != entry.width.bytes() {
            return Err(Error::InvalidResponse {
                expected: entry.width.bytes(),
                received: bytes.len(),
            });
        }
        Ok(word_from_bytes(&bytes) & entry.mask)
    }

    fn write_word(&mut self, entry: &RegisterEntry, page: Page, raw: u16) -> Result<(), T::Error> {
        if entry.paged {
            self.pages.ensure(page, &mut self.transport)?;
        }
        let payload = bytes_from_word(raw, entry.width);
        trace!(
            command = entry.name,
            address = entry.address.value(),
            bytes = ?payload.as_slice(),
            "write"
        );
        self.transport
            .write_raw(entry.address, &payload, entry.width)
            .map_err(|err| self.transport_failed(err))
    }

    /// The page register can no longer be trusted after a failed transfer.
    fn transport_failed(&mut self, err: T::Error) -> Error<T::Error> {
        self.pages.invalidate();
        Error::Transport(err)
    }

    /// Linear16 exponent of `page`, read fresh from `VOUT_MODE`.
    fn vout_exponent(&mut self, page: Page) -> Result<i8, T::Error> {
        let mode = self.read_word(&register::VOUT_MODE, page)? as u8;
        let fields = codec::VoutMode::from_raw(mode);
        if !fields.is_linear() {
            warn!(
                %page,
                mode,
                format = fields.mode(),
                "VOUT_MODE is not linear, decoding as Linear16"
            );
        }
        match codec::vout_exponent(mode) {
            Some(exponent) => Ok(exponent),
            None => {
                let fallback = self.config.vout_exponent_fallback;
                warn!(%page, mode, fallback, "VOUT_MODE exponent is zero, using fallback");
                Ok(fallback)
            }
        }
    }

    /// Current scale code of `page`, read fresh from `MFR_VR_CONFIG`.
    fn scale_code(&mut self, page: Page) -> Result<ScaleCode, T::Error> {
        let config = self.read_word(&register::MFR_VR_CONFIG, page)?;
        Ok(ScaleCode::from_config(config))
    }

    fn read_value(&mut self, entry: &RegisterEntry, page: Page) -> Result<f64, T::Error> {
        self.read_entry(entry, page)?
            .value()
            .ok_or_else(|| unsupported(entry, "numeric read"))
    }

    /// Return the measured output voltage in volts.
    pub fn read_vout(&mut self, page: Page) -> Result<f64, T::Error> {
        self.read_value(&register::READ_VOUT, page)
    }

    /// Return the measured output current in amps.
    pub fn read_iout(&mut self, page: Page) -> Result<f64, T::Error> {
        self.read_value(&register::READ_IOUT, page)
    }

    /// Return the external temperature sensor reading in °C.
    pub fn read_temperature(&mut self, page: Page) -> Result<f64, T::Error> {
        self.read_value(&register::READ_TEMP, page)
    }

    /// Return the controller die temperature in °C.
    pub fn read_die_temperature(&mut self, page: Page) -> Result<f64, T::Error> {
        self.read_value(&register::READ_DIE_TEMP, page)
    }

    pub fn read_status_word(&mut self, page: Page) -> Result<DecodedStatus, T::Error> {
        self.read_status(&register::STATUS_WORD, page)
    }

    fn read_status(&mut self, entry: &RegisterEntry, page: Page) -> Result<DecodedStatus, T::Error> {
        match self.read_entry(entry, page)? {
            Outcome::Status(status) => Ok(status),
            _ => Err(unsupported(entry, "status read")),
        }
    }

    /// Return the PWM duty cycle in percent.
    pub fn read_duty(&mut self, page: Page) -> Result<f64, T::Error> {
        self.read_value(&register::READ_DUTY, page)
    }

    /// Return the VID step in volts.
    pub fn read_vid_step(&mut self, page: Page) -> Result<f64, T::Error> {
        self.read_value(&register::MFR_VID_RES_R1, page)
    }

    /// Return the load line in milliohms.
    pub fn get_load_line(&mut self, page: Page) -> Result<f64, T::Error> {
        self.read_value(&register::VOUT_DROOP, page)
    }

    pub fn set_load_line(&mut self, page: Page, milliohms: f64) -> Result<u16, T::Error> {
        let outcome = self.write_entry(&register::VOUT_DROOP, page, milliohms)?;
        Ok(outcome.raw().unwrap_or_default())
    }

    /// Return the output voltage offset in millivolts. The offset is shared by both rails.
    pub fn get_vout_offset(&mut self) -> Result<f64, T::Error> {
        self.read_value(&register::VOUT_OFFSET, Page::Rail0)
    }

    pub fn set_vout_offset(&mut self, millivolts: f64) -> Result<u16, T::Error> {
        let outcome = self.write_entry(&register::VOUT_OFFSET, Page::Rail0, millivolts)?;
        Ok(outcome.raw().unwrap_or_default())
    }

    pub fn get_loop1_phases(&mut self) -> Result<PhaseCounts, T::Error> {
        let raw = self.read_word(&register::LOOP1_PHASES, Page::Rail0)?;
        Ok(PhaseCounts::from_raw(raw))
    }

    pub fn set_loop1_phases(&mut self, counts: PhaseCounts) -> Result<(), T::Error> {
        self.write_word(&register::LOOP1_PHASES, Page::Rail0, counts.to_raw())
    }

    /// Return the output voltage setpoint in volts.
    pub fn get_vout(&mut self, page: Page) -> Result<f64, T::Error> {
        self.read_value(&register::VOUT_COMMAND, page)
    }

    /// Set the output voltage setpoint, returning the raw value written.
    pub fn set_vout(&mut self, page: Page, volts: f64) -> Result<u16, T::Error> {
        let outcome = self.write_entry(&register::VOUT_COMMAND, page, volts)?;
        Ok(outcome.raw().unwrap_or_default())
    }

    /// Return the output over-current warning limit in amps.
    pub fn read_iout_oc_warn_limit(&mut self, page: Page) -> Result<f64, T::Error> {
        self.read_value(&register::IOUT_OC_WARN_LIMIT, page)
    }

    /// Set the output over-current warning limit. Use [`Self::write_verified`] to find out
    /// whether the device kept it.
    pub fn set_iout_oc_warn_limit(&mut self, page: Page, amps: f64) -> Result<u16, T::Error> {
        let outcome = self.write_entry(&register::IOUT_OC_WARN_LIMIT, page, amps)?;
        Ok(outcome.raw().unwrap_or_default())
    }

    /// Clear latched faults and warnings on `page`.
    pub fn clear_faults(&mut self, page: Page) -> Result<(), T::Error> {
        self.send_entry(&register::CLEAR_FAULTS, page).map(|_| ())
    }

    /// Read the low byte of every phase current sub-register, phase 1 first.
    pub fn read_phase_currents(&mut self) -> Result<[u16; register::PHASE_COUNT], T::Error> {
        let map = self.config.register_map;
        let mut currents = [0; register::PHASE_COUNT];
        for (current, entry) in currents.iter_mut().zip(map.phase_currents()) {
            // Extended registers are shared by both rails.
            *current = self.read_word(entry, Page::Rail0)?;
        }
        Ok(currents)
    }

    /// Sample every reading of one rail.
    ///
    /// The page is selected at most once; the extended registers are read last.
    pub fn telemetry(&mut self, page: Page) -> Result<RailTelemetry, T::Error> {
        Ok(RailTelemetry {
            page,
            vout: self.read_vout(page)?,
            iout: self.read_iout(page)?,
            temperature: self.read_temperature(page)?,
            die_temperature: self.read_die_temperature(page)?,
            duty: self.read_duty(page)?,
            iin: self.read_value(&register::READ_IIN, page)?,
            pin: self.read_value(&register::READ_PIN, page)?,
            pout: self.read_value(&register::READ_POUT, page)?,
            iout_peak: self.read_value(&register::MFR_IOUT_PEAK, page)?,
            temperature_peak: self.read_value(&register::MFR_TEMP_PEAK, page)?,
            status: self.read_status_word(page)?,
            status_byte: self.read_status(&register::STATUS_BYTE, page)?,
            status_vout: self.read_status(&register::STATUS_VOUT, page)?,
            status_iout: self.read_status(&register::STATUS_IOUT, page)?,
            status_input: self.read_status(&register::STATUS_INPUT, page)?,
            status_temperature: self.read_status(&register::STATUS_TEMPERATURE, page)?,
            status_mfr_specific: self.read_word(&register::STATUS_MFR_SPECIFIC, page)? as u8,
            phases: self.get_loop1_phases()?,
            phase_currents: self.read_phase_currents()?,
        })
    }

    /// Write `value` to `command` and read the register back.
    ///
    /// Some registers acknowledge a write and then keep their old content. A mismatch is
    /// reported through [`WriteCheck::persisted`], not as an error.
    pub fn write_verified(
        &mut self,
        command: &str,
        page: Page,
        value: f64,
    ) -> Result<WriteCheck, T::Error> {
        let entry = self.config.register_map.resolve(command)?;
        if !entry.access.readable() {
            return Err(unsupported(entry, "read back"));
        }
        let written = match self.write_entry(entry, page, value)? {
            Outcome::Written(raw) => raw,
            _ => return Err(unsupported(entry, "verified write")),
        };
        let read_back = self.read_word(entry, page)?;
        let check = WriteCheck {
            command: entry.name,
            written,
            read_back,
        };
        if !check.persisted() {
            warn!(
                command = entry.name,
                %page,
                written = check.written,
                read_back = check.read_back,
                "write not persisted"
            );
        }
        Ok(check)
    }
}

fn unsupported<E: embedded_io::Error>(entry: &RegisterEntry, operation: &'static str) -> Error<E> {
    Error::UnsupportedAccess {
        command: entry.name,
        operation,
    }
}

/// Raw registers take whole numbers only.
fn raw_from_value(value: f64, max: u16) -> core::result::Result<u16, OutOfRange> {
    if value.fract() != 0.0 || !(0.0..=max as f64).contains(&value) {
        return Err(OutOfRange::new(value, 0.0, max as f64));
    }
    Ok(value as u16)
}
