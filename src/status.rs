//! Decoding of PMBus status registers into named flags.
//!
//! Every status register is described by a [`StatusTable`]. All tables share the same
//! [`decode`] function and the same rendering on [`DecodedStatus`].

use core::fmt;

use strum_macros::{Display, IntoStaticStr};

/// How a status bit should be treated by whoever reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum Severity {
    /// A latched fault, cleared with `CLEAR_FAULTS`.
    Fault,
    /// A latched warning, cleared with `CLEAR_FAULTS`.
    Warning,
    /// A snapshot of current device state. Never latched, never needs clearing.
    Live,
    /// Not assigned; never reported as active.
    Reserved,
}

impl Severity {
    /// True for bits that should show up in a fault summary.
    pub const fn is_reportable(self) -> bool {
        matches!(self, Severity::Fault | Severity::Warning)
    }
}

/// Description of one bit in a status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitSpec {
    pub bit: u8,
    pub name: &'static str,
    pub severity: Severity,
    pub description: &'static str,
}

const fn fault(bit: u8, name: &'static str, description: &'static str) -> BitSpec {
    BitSpec {
        bit,
        name,
        severity: Severity::Fault,
        description,
    }
}

const fn warning(bit: u8, name: &'static str, description: &'static str) -> BitSpec {
    BitSpec {
        bit,
        name,
        severity: Severity::Warning,
        description,
    }
}

const fn live(bit: u8, name: &'static str, description: &'static str) -> BitSpec {
    BitSpec {
        bit,
        name,
        severity: Severity::Live,
        description,
    }
}

const fn reserved(bit: u8) -> BitSpec {
    BitSpec {
        bit,
        name: RESERVED_NAMES[bit as usize],
        severity: Severity::Reserved,
        description: "Reserved",
    }
}

const RESERVED_NAMES: [&str; 16] = [
    "RESERVED_0",
    "RESERVED_1",
    "RESERVED_2",
    "RESERVED_3",
    "RESERVED_4",
    "RESERVED_5",
    "RESERVED_6",
    "RESERVED_7",
    "RESERVED_8",
    "RESERVED_9",
    "RESERVED_10",
    "RESERVED_11",
    "RESERVED_12",
    "RESERVED_13",
    "RESERVED_14",
    "RESERVED_15",
];

/// An ordered list of bit descriptions for one status register.
///
/// Bits of the register that the table does not mention decode as reserved.
#[derive(Debug, PartialEq, Eq)]
pub struct StatusTable {
    pub name: &'static str,
    /// Register width in bits, 8 or 16.
    pub bits: u8,
    pub specs: &'static [BitSpec],
}

impl StatusTable {
    pub const fn mask(&self) -> u16 {
        if self.bits >= 16 {
            u16::MAX
        } else {
            (1u16 << self.bits) - 1
        }
    }
}

pub static STATUS_WORD: StatusTable = StatusTable {
    name: "STATUS_WORD",
    bits: 16,
    specs: &[
        warning(15, "VOUT", "Output voltage fault or warning"),
        warning(14, "IOUT", "Output current fault or warning"),
        warning(13, "INPUT", "Input voltage or current fault or warning"),
        fault(12, "MFR_SPECIFIC", "Manufacturer specific fault"),
        fault(11, "POWER_GOOD_N", "Power good is negated"),
        reserved(10),
        reserved(9),
        fault(8, "WATCH_DOG_OVF", "Watchdog overflow"),
        live(7, "NVM_BUSY", "Device busy writing non-volatile memory"),
        live(6, "OFF", "Output is not enabled"),
        fault(5, "VOUT_OV_FAULT", "Output overvoltage fault"),
        fault(4, "IOUT_OC_FAULT", "Output overcurrent fault"),
        fault(3, "VIN_UV_FAULT", "Input undervoltage fault"),
        warning(2, "TEMPERATURE", "Temperature fault or warning"),
        fault(1, "CML", "Communication, memory or logic fault"),
        fault(0, "OTHER_FAULT", "A fault not listed above"),
    ],
};

/// Low byte of the status word.
pub static STATUS_BYTE: StatusTable = StatusTable {
    name: "STATUS_BYTE",
    bits: 8,
    specs: &[
        live(7, "NVM_BUSY", "Device busy writing non-volatile memory"),
        live(6, "OFF", "Output is not enabled"),
        fault(5, "VOUT_OV_FAULT", "Output overvoltage fault"),
        fault(4, "IOUT_OC_FAULT", "Output overcurrent fault"),
        fault(3, "VIN_UV_FAULT", "Input undervoltage fault"),
        warning(2, "TEMPERATURE", "Temperature fault or warning"),
        fault(1, "CML", "Communication, memory or logic fault"),
        fault(0, "OTHER_FAULT", "A fault not listed above"),
    ],
};

pub static STATUS_VOUT: StatusTable = StatusTable {
    name: "STATUS_VOUT",
    bits: 8,
    specs: &[
        fault(1, "LINE_FLOAT", "Output sense line floating"),
        fault(0, "VOUT_SHORT", "Output shorted"),
    ],
};

pub static STATUS_IOUT: StatusTable = StatusTable {
    name: "STATUS_IOUT",
    bits: 8,
    specs: &[
        fault(7, "IOUT_OC_FAULT", "Output overcurrent fault"),
        fault(6, "OCP_UV_FAULT", "Overcurrent fault with undervoltage shutdown"),
        warning(5, "IOUT_OC_WARN", "Output overcurrent warning"),
    ],
};

pub static STATUS_INPUT: StatusTable = StatusTable {
    name: "STATUS_INPUT",
    bits: 8,
    specs: &[
        fault(7, "VIN_OV_FAULT", "Input overvoltage fault"),
        warning(6, "VIN_OV_WARN", "Input overvoltage warning"),
        warning(5, "VIN_UV_WARN", "Input undervoltage warning"),
        fault(4, "VIN_UV_FAULT", "Input undervoltage fault"),
        live(3, "UNIT_OFF_VIN_LOW", "Unit off for insufficient input voltage"),
        fault(2, "IIN_OC_FAULT", "Input overcurrent fault"),
        warning(1, "IIN_OC_WARN", "Input overcurrent warning"),
        warning(0, "PIN_OP_WARN", "Input overpower warning"),
    ],
};

pub static STATUS_TEMPERATURE: StatusTable = StatusTable {
    name: "STATUS_TEMPERATURE",
    bits: 8,
    specs: &[
        fault(7, "OT_FAULT", "Overtemperature fault"),
        warning(6, "OT_WARN", "Overtemperature warning"),
        warning(5, "UT_WARN", "Undertemperature warning"),
        fault(4, "UT_FAULT", "Undertemperature fault"),
    ],
};

/// One bit of a decoded status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedBit {
    pub bit: u8,
    pub name: &'static str,
    pub active: bool,
    pub severity: Severity,
    pub description: &'static str,
}

/// The result of decoding a raw status value against a table.
///
/// Holds every bit of the register: the table's bits in table order, followed by any bits
/// the table does not describe, reported as reserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedStatus {
    table: &'static str,
    raw: u16,
    bits: heapless::Vec<DecodedBit, 16>,
}

/// Decode `raw` against `table`. Bits above the table's width are ignored.
pub fn decode(raw: u16, table: &'static StatusTable) -> DecodedStatus {
    let raw = raw & table.mask();
    let mut bits = heapless::Vec::new();
    let described = table.specs.iter().copied();
    let undescribed = (0..table.bits.min(16))
        .rev()
        .filter(|bit| !table.specs.iter().any(|spec| spec.bit == *bit))
        .map(reserved);
    for spec in described.chain(undescribed) {
        let decoded = DecodedBit {
            bit: spec.bit,
            name: spec.name,
            active: raw & (1 << spec.bit) != 0,
            severity: spec.severity,
            description: spec.description,
        };
        // A table never names more bits than the register has.
        if bits.push(decoded).is_err() {
            break;
        }
    }
    DecodedStatus {
        table: table.name,
        raw,
        bits,
    }
}

impl DecodedStatus {
    pub fn table(&self) -> &'static str {
        self.table
    }

    /// The raw value after masking to the register width.
    pub fn raw(&self) -> u16 {
        self.raw
    }

    /// Every bit, reserved ones included.
    pub fn bits(&self) -> &[DecodedBit] {
        &self.bits
    }

    pub fn bit(&self, name: &str) -> Option<&DecodedBit> {
        self.bits.iter().find(|bit| bit.name == name)
    }

    /// Names of the active fault and warning bits, in table order.
    pub fn summarize_active(&self) -> heapless::Vec<&'static str, 16> {
        self.bits
            .iter()
            .filter(|bit| bit.active && bit.severity.is_reportable())
            .map(|bit| bit.name)
            .collect()
    }

    /// Every non-reserved bit, active or not, in table order.
    pub fn render_detailed(&self) -> impl Iterator<Item = &DecodedBit> {
        self.bits
            .iter()
            .filter(|bit| bit.severity != Severity::Reserved)
    }

    /// True when a latched fault or warning is set. Live bits alone never need a clear.
    pub fn needs_clear(&self) -> bool {
        self.bits
            .iter()
            .any(|bit| bit.active && bit.severity.is_reportable())
    }
}

impl fmt::Display for DecodedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = if self.bits.len() > 8 { 4 } else { 2 };
        write!(f, "{}: 0x{:0width$X}", self.table, self.raw, width = width)?;
        let active = self.summarize_active();
        if active.is_empty() {
            write!(f, " (no faults)")
        } else {
            write!(f, " [{}]", active.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_TABLES: [&StatusTable; 6] = [
        &STATUS_WORD,
        &STATUS_BYTE,
        &STATUS_VOUT,
        &STATUS_IOUT,
        &STATUS_INPUT,
        &STATUS_TEMPERATURE,
    ];

    #[test]
    fn test_tables_are_well_formed() {
        for table in ALL_TABLES {
            for (i, spec) in table.specs.iter().enumerate() {
                assert!(spec.bit < table.bits, "{} bit {}", table.name, spec.bit);
                assert!(
                    !table.specs[i + 1..].iter().any(|s| s.bit == spec.bit),
                    "{} duplicates bit {}",
                    table.name,
                    spec.bit
                );
            }
        }
    }

    #[test]
    fn test_decode_covers_every_bit() {
        for table in ALL_TABLES {
            let decoded = decode(0, table);
            assert_eq!(decoded.bits().len(), table.bits as usize, "{}", table.name);
        }
    }

    #[test]
    fn test_cml_only() {
        let decoded = decode(0x0002, &STATUS_WORD);
        assert_eq!(decoded.summarize_active().as_slice(), &["CML"]);
        assert!(decoded.needs_clear());
    }

    #[test]
    fn test_zero_has_no_active_bits() {
        for table in ALL_TABLES {
            let decoded = decode(0, table);
            assert!(decoded.summarize_active().is_empty());
            assert!(!decoded.needs_clear());
        }
    }

    #[test]
    fn test_status_word_scenario() {
        let decoded = decode(0x0002, &STATUS_WORD);
        assert_eq!(decoded.summarize_active().as_slice(), &["CML"]);

        let power_good = decoded
            .render_detailed()
            .find(|bit| bit.name == "POWER_GOOD_N")
            .unwrap();
        assert!(!power_good.active);
        assert_eq!(power_good.severity, Severity::Fault);
        assert_eq!(power_good.bit, 11);
    }

    #[test]
    fn test_reserved_never_summarized() {
        // Bits 9 and 10 of the status word and the upper bits of STATUS_VOUT are unassigned.
        let decoded = decode(0x0600, &STATUS_WORD);
        assert!(decoded.summarize_active().is_empty());
        assert!(decoded.bit("RESERVED_10").unwrap().active);
        assert!(decoded.render_detailed().all(|bit| bit.severity != Severity::Reserved));

        let decoded = decode(0xFC, &STATUS_VOUT);
        assert!(decoded.summarize_active().is_empty());
        assert_eq!(decoded.bit("RESERVED_7").unwrap().severity, Severity::Reserved);

        let decoded = decode(0xFF, &STATUS_VOUT);
        assert_eq!(
            decoded.summarize_active().as_slice(),
            &["LINE_FLOAT", "VOUT_SHORT"]
        );
    }

    #[test]
    fn test_live_bits_do_not_need_clear() {
        let decoded = decode(0x00C0, &STATUS_WORD);
        assert!(decoded.summarize_active().is_empty());
        assert!(!decoded.needs_clear());
        assert!(decoded.bit("NVM_BUSY").unwrap().active);
        assert!(decoded.bit("OFF").unwrap().active);
    }

    #[test]
    fn test_summary_in_table_order() {
        let decoded = decode(0x8823, &STATUS_WORD);
        assert_eq!(
            decoded.summarize_active().as_slice(),
            &["VOUT", "POWER_GOOD_N", "VOUT_OV_FAULT", "CML", "OTHER_FAULT"]
        );
    }

    #[test]
    fn test_raw_masked_to_width() {
        let decoded = decode(0xFF20, &STATUS_IOUT);
        assert_eq!(decoded.raw(), 0x20);
        assert_eq!(decoded.summarize_active().as_slice(), &["IOUT_OC_WARN"]);
    }

    #[test]
    fn test_detailed_lists_non_reserved_in_order() {
        let decoded = decode(0x20, &STATUS_IOUT);
        let rendered: Vec<(&str, bool)> = decoded
            .render_detailed()
            .map(|bit| (bit.name, bit.active))
            .collect();
        assert_eq!(
            rendered,
            [
                ("IOUT_OC_FAULT", false),
                ("OCP_UV_FAULT", false),
                ("IOUT_OC_WARN", true)
            ]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            decode(0x0002, &STATUS_WORD).to_string(),
            "STATUS_WORD: 0x0002 [CML]"
        );
        assert_eq!(
            decode(0, &STATUS_TEMPERATURE).to_string(),
            "STATUS_TEMPERATURE: 0x00 (no faults)"
        );
    }
}
