//! Conversions between raw register values and engineering units.
//!
//! Everything here is pure. Register reads that a conversion depends on (the exponent in
//! `VOUT_MODE`, the scale code in `MFR_VR_CONFIG`) are performed by the engine, which then
//! passes the extracted field in.

use core::fmt;

use modular_bitfield::prelude::*;

use crate::error::OutOfRange;

/// Millivolts per count of the die temperature sensor.
pub const DIE_TEMP_MV_PER_COUNT: f64 = 1.5625;
/// Sensor output in millivolts at 0 °C.
pub const DIE_TEMP_OFFSET_MV: f64 = 747.0;
/// Sensor slope in millivolts per °C.
pub const DIE_TEMP_SLOPE_MV_PER_C: f64 = -1.9;

const LINEAR11_EXPONENT_MIN: i8 = -16;
const LINEAR11_EXPONENT_MAX: i8 = 15;
const LINEAR11_MANTISSA_MIN: i32 = -1024;
const LINEAR11_MANTISSA_MAX: i32 = 1023;

/// Sign-extend the low `bits` bits of `value`.
pub const fn sign_extend(value: u16, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value as i32) << shift) >> shift
}

fn pow2(exponent: i8) -> f64 {
    2f64.powi(exponent as i32)
}

/// A Linear11 word split into its two signed fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentMantissa {
    /// 5-bit two's complement exponent, bits [15:11].
    pub exponent: i8,
    /// 11-bit two's complement mantissa, bits [10:0].
    pub mantissa: i16,
}

impl ExponentMantissa {
    pub const fn from_raw(raw: u16) -> Self {
        Self {
            exponent: sign_extend(raw >> 11, 5) as i8,
            mantissa: sign_extend(raw & 0x07FF, 11) as i16,
        }
    }

    /// Pack the fields back into a Linear11 word.
    pub fn to_raw(self) -> Result<u16, OutOfRange> {
        if !(LINEAR11_EXPONENT_MIN..=LINEAR11_EXPONENT_MAX).contains(&self.exponent)
            || !(LINEAR11_MANTISSA_MIN..=LINEAR11_MANTISSA_MAX).contains(&(self.mantissa as i32))
        {
            return Err(linear11_range(self.value()));
        }
        let exponent = (self.exponent as u16 & 0x1F) << 11;
        let mantissa = self.mantissa as u16 & 0x07FF;
        Ok(exponent | mantissa)
    }

    pub fn value(self) -> f64 {
        self.mantissa as f64 * pow2(self.exponent)
    }
}

fn linear11_range(value: f64) -> OutOfRange {
    let scale = pow2(LINEAR11_EXPONENT_MAX);
    OutOfRange::new(
        value,
        LINEAR11_MANTISSA_MIN as f64 * scale,
        LINEAR11_MANTISSA_MAX as f64 * scale,
    )
}

/// Decode a Linear11 word. The exponent is embedded in the word itself.
pub fn decode_linear11(raw: u16) -> f64 {
    ExponentMantissa::from_raw(raw).value()
}

/// Encode `value` as Linear11 using the smallest exponent that keeps the mantissa in range,
/// which gives the finest resolution.
pub fn encode_linear11(value: f64) -> Result<u16, OutOfRange> {
    if !value.is_finite() {
        return Err(linear11_range(value));
    }
    if value == 0.0 {
        return Ok(0);
    }
    for exponent in LINEAR11_EXPONENT_MIN..=LINEAR11_EXPONENT_MAX {
        let mantissa = (value / pow2(exponent)).round();
        if (LINEAR11_MANTISSA_MIN as f64..=LINEAR11_MANTISSA_MAX as f64).contains(&mantissa) {
            return ExponentMantissa {
                exponent,
                mantissa: mantissa as i16,
            }
            .to_raw();
        }
    }
    Err(linear11_range(value))
}

/// Layout of the `VOUT_MODE` register.
#[bitfield]
#[derive(Debug, Clone, Copy)]
pub struct VoutMode {
    /// Two's complement exponent for Linear16 values.
    pub exponent: B5,
    /// Data format: 0 for linear, VID and direct otherwise.
    pub mode: B3,
}

impl VoutMode {
    pub fn from_raw(raw: u8) -> Self {
        Self::from_bytes([raw])
    }

    pub fn signed_exponent(&self) -> i8 {
        sign_extend(self.exponent() as u16, 5) as i8
    }

    /// Whether output voltages are in Linear16 format.
    pub fn is_linear(&self) -> bool {
        self.mode() == 0
    }
}

/// Extract the Linear16 exponent from a raw `VOUT_MODE` value.
///
/// Returns `None` when the exponent field is zero, which on this device family means the
/// mode has not been configured.
pub fn vout_exponent(mode: u8) -> Option<i8> {
    match VoutMode::from_raw(mode).signed_exponent() {
        0 => None,
        exponent => Some(exponent),
    }
}

/// Decode an unsigned Linear16 mantissa with the exponent from `VOUT_MODE`.
pub fn decode_linear16(raw: u16, exponent: i8) -> f64 {
    raw as f64 * pow2(exponent)
}

/// Encode a voltage for `VOUT_COMMAND`, rounding half away from zero.
pub fn encode_vout_command(voltage: f64, exponent: i8) -> Result<u16, OutOfRange> {
    let range = || OutOfRange::new(voltage, 0.0, u16::MAX as f64 * pow2(exponent));
    if !(voltage >= 0.0) {
        return Err(range());
    }
    let mantissa = (voltage / pow2(exponent)).round();
    if mantissa > u16::MAX as f64 {
        return Err(range());
    }
    Ok(mantissa as u16)
}

/// Active phase counts of the two loops, packed as `loop1 << 8 | loop2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhaseCounts {
    pub loop1: u8,
    pub loop2: u8,
}

impl PhaseCounts {
    pub const fn from_raw(raw: u16) -> Self {
        let [loop2, loop1] = raw.to_le_bytes();
        Self { loop1, loop2 }
    }

    pub const fn to_raw(self) -> u16 {
        u16::from_le_bytes([self.loop2, self.loop1])
    }
}

impl fmt::Display for PhaseCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loop 1: {} phases, loop 2: {} phases", self.loop1, self.loop2)
    }
}

/// Convert the die temperature sensor reading to °C.
pub fn decode_die_temperature(raw: u16) -> f64 {
    let millivolts = raw as f64 * DIE_TEMP_MV_PER_COUNT;
    (millivolts - DIE_TEMP_OFFSET_MV) / DIE_TEMP_SLOPE_MV_PER_C
}
