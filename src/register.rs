//! This module defines the PMBus command set understood by the engine.
//!
//! The table is immutable and versioned. A correction to an address, width or value class
//! is a new [`RegisterMap`] with a higher revision, handed to the engine through
//! [`EngineConfig`](crate::config::EngineConfig).

use strum_macros::{Display, EnumIter, IntoStaticStr};

use crate::{error::UnknownCommand, scaling, status, status::StatusTable};

/// Command code of the page register.
pub const PAGE_COMMAND: u8 = 0x00;
/// Command code used to reach the manufacturer's extended register space.
pub const MFR_REG_ACCESS_COMMAND: u8 = 0xD8;
/// First of the sixteen per-phase current sub-registers.
pub const PHASE_CURRENT_BASE: u16 = 0x0C00;
pub const PHASE_COUNT: usize = 16;

/// Where a register lives on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Address {
    /// A standard command code, sent directly.
    Command(u8),
    /// A manufacturer sub-register, reached by writing its 16-bit address through
    /// `MFR_REG_ACCESS` first.
    Extended(u16),
}

impl Address {
    /// The 16-bit address value, ignoring how it is reached.
    pub const fn value(self) -> u16 {
        match self {
            Address::Command(code) => code as u16,
            Address::Extended(address) => address,
        }
    }

    /// Bytes a transport sends ahead of the data phase.
    ///
    /// Direct commands are a single command code; extended registers are addressed as
    /// `MFR_REG_ACCESS` followed by the little-endian sub-register address.
    pub fn command_phase(self) -> heapless::Vec<u8, 3> {
        let mut bytes = heapless::Vec::new();
        match self {
            Address::Command(code) => {
                let _ = bytes.push(code);
            }
            Address::Extended(address) => {
                let [lo, hi] = address.to_le_bytes();
                let _ = bytes.extend_from_slice(&[MFR_REG_ACCESS_COMMAND, lo, hi]);
            }
        }
        bytes
    }
}

impl From<Address> for u16 {
    fn from(value: Address) -> Self {
        value.value()
    }
}

/// Number of data bytes in a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Width {
    /// Send-byte: the command code alone, no data.
    Zero = 0,
    Byte = 1,
    Word = 2,
}

impl Width {
    pub const fn bytes(self) -> usize {
        self as usize
    }

    /// Largest raw value representable in this width.
    pub const fn max_value(self) -> u16 {
        match self {
            Width::Zero => 0,
            Width::Byte => 0xFF,
            Width::Word => 0xFFFF,
        }
    }
}

/// Which directions a register supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum Access {
    R,
    W,
    RW,
}

impl Access {
    pub const fn readable(self) -> bool {
        matches!(self, Access::R | Access::RW)
    }

    pub const fn writable(self) -> bool {
        matches!(self, Access::W | Access::RW)
    }
}

/// Engineering unit of a decoded register value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum Unit {
    #[strum(to_string = "V")]
    Volts,
    #[strum(to_string = "A")]
    Amps,
    #[strum(to_string = "°C")]
    Celsius,
    #[strum(to_string = "W")]
    Watts,
    #[strum(to_string = "mV")]
    Millivolts,
    #[strum(to_string = "mΩ")]
    Milliohms,
    #[strum(to_string = "%")]
    Percent,
}

/// How the raw bytes of a register are interpreted.
#[derive(Debug, Clone, Copy)]
pub enum ValueClass {
    /// Plain unsigned integer, no conversion.
    RawBits,
    /// Exponent and mantissa packed in the same word.
    Linear11,
    /// Unsigned mantissa, exponent taken from `VOUT_MODE` on the same page.
    Linear16,
    /// Die temperature derived from a sensed voltage.
    VoltageLinearTemperature,
    /// Unsigned count, unit size taken from the scale code in `MFR_VR_CONFIG`.
    ScaledUnsignedCurrent,
    /// Unsigned count of a fixed step, in the entry's unit.
    FixedStep(f64),
    /// VID step code in `MFR_VID_RES_R1`, decoded to volts.
    VidStep,
    /// Two phase counts packed into one word.
    PhaseCounts,
    /// Bitmask decoded against a status table.
    StatusBits(&'static StatusTable),
}

impl ValueClass {
    pub fn name(&self) -> &'static str {
        match self {
            ValueClass::RawBits => "raw",
            ValueClass::Linear11 => "linear11",
            ValueClass::Linear16 => "linear16",
            ValueClass::VoltageLinearTemperature => "die-temperature",
            ValueClass::ScaledUnsignedCurrent => "scaled-current",
            ValueClass::FixedStep(_) => "fixed-step",
            ValueClass::VidStep => "vid-step",
            ValueClass::PhaseCounts => "phase-counts",
            ValueClass::StatusBits(_) => "status",
        }
    }
}

impl PartialEq for ValueClass {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ValueClass::StatusBits(a), ValueClass::StatusBits(b)) => a.name == b.name,
            (ValueClass::FixedStep(a), ValueClass::FixedStep(b)) => a == b,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

/// One row of the register table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisterEntry {
    pub name: &'static str,
    pub address: Address,
    pub width: Width,
    pub class: ValueClass,
    pub access: Access,
    /// Whether the register exists once per rail and needs the page register set.
    pub paged: bool,
    /// Bits that carry data; the rest are reserved and dropped on read.
    pub mask: u16,
    pub unit: Option<Unit>,
}

impl RegisterEntry {
    const fn new(name: &'static str, address: Address, width: Width, class: ValueClass) -> Self {
        Self {
            name,
            address,
            width,
            class,
            access: Access::R,
            paged: true,
            mask: width.max_value(),
            unit: None,
        }
    }

    const fn byte(name: &'static str, code: u8, class: ValueClass) -> Self {
        Self::new(name, Address::Command(code), Width::Byte, class)
    }

    const fn word(name: &'static str, code: u8, class: ValueClass) -> Self {
        Self::new(name, Address::Command(code), Width::Word, class)
    }

    /// Extended sub-registers are shared by both rails.
    const fn extended(name: &'static str, address: u16) -> Self {
        Self::new(name, Address::Extended(address), Width::Word, ValueClass::RawBits).unpaged()
    }

    const fn send(name: &'static str, code: u8) -> Self {
        Self::new(name, Address::Command(code), Width::Zero, ValueClass::RawBits).access(Access::W)
    }

    const fn access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    const fn class(mut self, class: ValueClass) -> Self {
        self.class = class;
        self
    }

    const fn unpaged(mut self) -> Self {
        self.paged = false;
        self
    }

    const fn masked(mut self, mask: u16) -> Self {
        self.mask = mask;
        self
    }

    const fn unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Largest raw value a write may carry.
    pub const fn max_raw(&self) -> u16 {
        self.mask & self.width.max_value()
    }
}

pub const PAGE: RegisterEntry = RegisterEntry::byte("PAGE", PAGE_COMMAND, ValueClass::RawBits)
    .access(Access::RW)
    .unpaged();
pub const OPERATION: RegisterEntry =
    RegisterEntry::byte("OPERATION", 0x01, ValueClass::RawBits).access(Access::RW);
pub const CLEAR_FAULTS: RegisterEntry = RegisterEntry::send("CLEAR_FAULTS", 0x03);
pub const VOUT_MODE: RegisterEntry = RegisterEntry::byte("VOUT_MODE", 0x20, ValueClass::RawBits);
pub const VOUT_COMMAND: RegisterEntry =
    RegisterEntry::word("VOUT_COMMAND", 0x21, ValueClass::Linear16)
        .access(Access::RW)
        .unit(Unit::Volts);
/// Load line.
pub const VOUT_DROOP: RegisterEntry = RegisterEntry::word(
    "VOUT_DROOP",
    0x28,
    ValueClass::FixedStep(scaling::LOAD_LINE_STEP_MILLIOHMS),
)
.access(Access::RW)
.unit(Unit::Milliohms);
pub const MFR_VID_RES_R1: RegisterEntry =
    RegisterEntry::word("MFR_VID_RES_R1", 0x29, ValueClass::VidStep).unit(Unit::Volts);
pub const FREQUENCY_SWITCH: RegisterEntry =
    RegisterEntry::word("FREQUENCY_SWITCH", 0x33, ValueClass::RawBits).access(Access::RW);
pub const IOUT_OC_FAULT_LIMIT: RegisterEntry =
    RegisterEntry::word("IOUT_OC_FAULT_LIMIT", 0x46, ValueClass::ScaledUnsignedCurrent)
        .access(Access::RW)
        .masked(0x00FF)
        .unit(Unit::Amps);
pub const IOUT_OC_WARN_LIMIT: RegisterEntry =
    RegisterEntry::word("IOUT_OC_WARN_LIMIT", 0x4A, ValueClass::ScaledUnsignedCurrent)
        .access(Access::RW)
        .masked(0x00FF)
        .unit(Unit::Amps);
pub const MFR_VR_CONFIG: RegisterEntry =
    RegisterEntry::word("MFR_VR_CONFIG", 0x67, ValueClass::RawBits);
pub const STATUS_BYTE: RegisterEntry = RegisterEntry::byte(
    "STATUS_BYTE",
    0x78,
    ValueClass::StatusBits(&status::STATUS_BYTE),
);
pub const STATUS_WORD: RegisterEntry = RegisterEntry::word(
    "STATUS_WORD",
    0x79,
    ValueClass::StatusBits(&status::STATUS_WORD),
);
pub const STATUS_VOUT: RegisterEntry = RegisterEntry::byte(
    "STATUS_VOUT",
    0x7A,
    ValueClass::StatusBits(&status::STATUS_VOUT),
);
pub const STATUS_IOUT: RegisterEntry = RegisterEntry::byte(
    "STATUS_IOUT",
    0x7B,
    ValueClass::StatusBits(&status::STATUS_IOUT),
);
pub const STATUS_INPUT: RegisterEntry = RegisterEntry::byte(
    "STATUS_INPUT",
    0x7C,
    ValueClass::StatusBits(&status::STATUS_INPUT),
);
pub const STATUS_TEMPERATURE: RegisterEntry = RegisterEntry::byte(
    "STATUS_TEMPERATURE",
    0x7D,
    ValueClass::StatusBits(&status::STATUS_TEMPERATURE),
);
pub const STATUS_MFR_SPECIFIC: RegisterEntry =
    RegisterEntry::byte("STATUS_MFR_SPECIFIC", 0x80, ValueClass::RawBits);
pub const READ_IIN: RegisterEntry =
    RegisterEntry::word("READ_IIN", 0x89, ValueClass::Linear11).unit(Unit::Amps);
pub const READ_VOUT: RegisterEntry =
    RegisterEntry::word("READ_VOUT", 0x8B, ValueClass::Linear16).unit(Unit::Volts);
pub const READ_IOUT: RegisterEntry =
    RegisterEntry::word("READ_IOUT", 0x8C, ValueClass::Linear11).unit(Unit::Amps);
pub const READ_TEMP: RegisterEntry =
    RegisterEntry::word("READ_TEMP", 0x8D, ValueClass::Linear11).unit(Unit::Celsius);
pub const READ_DIE_TEMP: RegisterEntry =
    RegisterEntry::word("READ_DIE_TEMP", 0x8E, ValueClass::VoltageLinearTemperature)
        .unit(Unit::Celsius);
pub const READ_DUTY: RegisterEntry = RegisterEntry::word(
    "READ_DUTY",
    0x94,
    ValueClass::FixedStep(scaling::DUTY_STEP_PERCENT),
)
.unit(Unit::Percent);
pub const READ_POUT: RegisterEntry =
    RegisterEntry::word("READ_POUT", 0x96, ValueClass::Linear11).unit(Unit::Watts);
pub const READ_PIN: RegisterEntry =
    RegisterEntry::word("READ_PIN", 0x97, ValueClass::Linear11).unit(Unit::Watts);
pub const MFR_TEMP_PEAK: RegisterEntry =
    RegisterEntry::word("MFR_TEMP_PEAK", 0xD1, ValueClass::Linear11).unit(Unit::Celsius);
pub const MFR_IOUT_PEAK: RegisterEntry =
    RegisterEntry::word("MFR_IOUT_PEAK", 0xD7, ValueClass::Linear11).unit(Unit::Amps);
pub const MFR_REG_ACCESS: RegisterEntry =
    RegisterEntry::word("MFR_REG_ACCESS", MFR_REG_ACCESS_COMMAND, ValueClass::RawBits)
        .access(Access::W)
        .unpaged();
pub const VOUT_OFFSET: RegisterEntry = RegisterEntry::extended("VOUT_OFFSET", 0x0023)
    .class(ValueClass::FixedStep(scaling::VOUT_OFFSET_STEP_MILLIVOLTS))
    .access(Access::RW)
    .unit(Unit::Millivolts);
pub const LOOP1_PHASES: RegisterEntry = RegisterEntry::extended("LOOP1_PHASES", 0x0E00)
    .class(ValueClass::PhaseCounts)
    .access(Access::RW);

/// Phase current sub-registers report whole amps in the low byte.
const fn phase_current(name: &'static str, index: u16) -> RegisterEntry {
    RegisterEntry::extended(name, PHASE_CURRENT_BASE + index).masked(0x00FF)
}

static STANDARD_ENTRIES: [RegisterEntry; 47] = [
    PAGE,
    OPERATION,
    CLEAR_FAULTS,
    VOUT_MODE,
    VOUT_COMMAND,
    VOUT_DROOP,
    MFR_VID_RES_R1,
    FREQUENCY_SWITCH,
    IOUT_OC_FAULT_LIMIT,
    IOUT_OC_WARN_LIMIT,
    MFR_VR_CONFIG,
    STATUS_BYTE,
    STATUS_WORD,
    STATUS_VOUT,
    STATUS_IOUT,
    STATUS_INPUT,
    STATUS_TEMPERATURE,
    STATUS_MFR_SPECIFIC,
    READ_IIN,
    READ_VOUT,
    READ_IOUT,
    READ_TEMP,
    READ_DIE_TEMP,
    READ_POUT,
    READ_PIN,
    MFR_TEMP_PEAK,
    MFR_IOUT_PEAK,
    MFR_REG_ACCESS,
    VOUT_OFFSET,
    LOOP1_PHASES,
    phase_current("PHASE1_CURRENT", 0),
    phase_current("PHASE2_CURRENT", 1),
    phase_current("PHASE3_CURRENT", 2),
    phase_current("PHASE4_CURRENT", 3),
    phase_current("PHASE5_CURRENT", 4),
    phase_current("PHASE6_CURRENT", 5),
    phase_current("PHASE7_CURRENT", 6),
    phase_current("PHASE8_CURRENT", 7),
    phase_current("PHASE9_CURRENT", 8),
    phase_current("PHASE10_CURRENT", 9),
    phase_current("PHASE11_CURRENT", 10),
    phase_current("PHASE12_CURRENT", 11),
    phase_current("PHASE13_CURRENT", 12),
    phase_current("PHASE14_CURRENT", 13),
    phase_current("PHASE15_CURRENT", 14),
    phase_current("PHASE16_CURRENT", 15),
    READ_DUTY,
];

static STANDARD_ALIASES: [(&str, &str); 26] = [
    ("READ_TEMPERATURE_1", "READ_TEMP"),
    ("DIE_TEMP", "READ_DIE_TEMP"),
    ("STATUS", "STATUS_WORD"),
    ("WORD", "STATUS_WORD"),
    ("READ_STATUS", "STATUS_WORD"),
    ("REG_ACCESS", "MFR_REG_ACCESS"),
    ("Loop1_active", "LOOP1_PHASES"),
    ("Phase_active", "LOOP1_PHASES"),
    ("PHASE1_Current", "PHASE1_CURRENT"),
    ("PHASE2_Current", "PHASE2_CURRENT"),
    ("PHASE3_Current", "PHASE3_CURRENT"),
    ("PHASE4_Current", "PHASE4_CURRENT"),
    ("PHASE5_Current", "PHASE5_CURRENT"),
    ("PHASE6_Current", "PHASE6_CURRENT"),
    ("PHASE7_Current", "PHASE7_CURRENT"),
    ("PHASE8_Current", "PHASE8_CURRENT"),
    ("PHASE9_Current", "PHASE9_CURRENT"),
    ("PHASE10_Current", "PHASE10_CURRENT"),
    ("PHASE11_Current", "PHASE11_CURRENT"),
    ("PHASE12_Current", "PHASE12_CURRENT"),
    ("PHASE13_Current", "PHASE13_CURRENT"),
    ("PHASE14_Current", "PHASE14_CURRENT"),
    ("PHASE15_Current", "PHASE15_CURRENT"),
    ("PHASE16_Current", "PHASE16_CURRENT"),
    ("IOUT_OC_WARN", "IOUT_OC_WARN_LIMIT"),
    ("IOUT_OC_FAULT", "IOUT_OC_FAULT_LIMIT"),
];

/// The register table shipped with this crate.
pub static STANDARD: RegisterMap = RegisterMap::new(2, &STANDARD_ENTRIES, &STANDARD_ALIASES);

/// Immutable name to register lookup.
///
/// Names are matched case-sensitively. Aliases resolve to the same entry as their
/// canonical name.
#[derive(Debug)]
pub struct RegisterMap {
    revision: u16,
    entries: &'static [RegisterEntry],
    aliases: &'static [(&'static str, &'static str)],
}

impl RegisterMap {
    pub const fn new(
        revision: u16,
        entries: &'static [RegisterEntry],
        aliases: &'static [(&'static str, &'static str)],
    ) -> Self {
        Self {
            revision,
            entries,
            aliases,
        }
    }

    pub const fn revision(&self) -> u16 {
        self.revision
    }

    /// Look up a command by canonical name or alias.
    pub fn resolve(&self, name: &str) -> Result<&'static RegisterEntry, UnknownCommand> {
        let canonical = self
            .aliases
            .iter()
            .find(|(alias, _)| *alias == name)
            .map_or(name, |(_, canonical)| *canonical);
        self.entries
            .iter()
            .find(|entry| entry.name == canonical)
            .ok_or_else(|| UnknownCommand(name.into()))
    }

    pub fn entries(&self) -> impl Iterator<Item = &'static RegisterEntry> {
        self.entries.iter()
    }

    pub fn aliases(&self) -> impl Iterator<Item = (&'static str, &'static str)> {
        self.aliases.iter().copied()
    }

    /// The per-phase current sub-registers, in phase order.
    pub fn phase_currents(&self) -> impl Iterator<Item = &'static RegisterEntry> {
        let phases = PHASE_CURRENT_BASE..PHASE_CURRENT_BASE + PHASE_COUNT as u16;
        self.entries.iter().filter(move |entry| {
            matches!(entry.address, Address::Extended(address) if phases.contains(&address))
        })
    }
}
