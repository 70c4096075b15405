//! Unsigned count registers whose step size is fixed or looked up from a code.
//!
//! `IOUT_OC_WARN_LIMIT` and `IOUT_OC_FAULT_LIMIT` hold an unsigned count in bits [7:0]. The size of
//! one count depends on the 3-bit scale code in `MFR_VR_CONFIG`, mapped through
//! [`IOUT_SCALE_LOOKUP`]. The code is an index, not a multiplier: codes 0 and 6 both mean a unit
//! scale of 1.0.
//!
//! The VID step reported by `MFR_VID_RES_R1` works the same way through [`VID_STEP_LOOKUP_MV`].

use modular_bitfield::prelude::*;

use crate::{error::OutOfRange, page::Page};

/// Amps per count at unit scale.
pub const BASE_LSB_AMPS: f64 = 8.0;

/// Unit scale for each scale code.
pub const IOUT_SCALE_LOOKUP: [f64; 8] = [
    1.0,
    1.0 / 32.0,
    1.0 / 16.0,
    1.0 / 8.0,
    1.0 / 4.0,
    1.0 / 2.0,
    1.0,
    2.0,
];

/// Layout of the `MFR_VR_CONFIG` register. Only the scale code is used here.
#[bitfield]
#[derive(Debug, Clone, Copy)]
pub struct MfrVrConfig {
    pub iout_scale: B3,
    #[skip]
    __: B13,
}

impl MfrVrConfig {
    pub fn from_raw(raw: u16) -> Self {
        Self::from_bytes(raw.to_le_bytes())
    }
}

/// A 3-bit current scale code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleCode(u8);

impl ScaleCode {
    /// Build a code from its 3-bit value; higher bits are ignored.
    pub const fn new(code: u8) -> Self {
        Self(code & 0x07)
    }

    /// Extract the code from a raw `MFR_VR_CONFIG` value.
    pub fn from_config(raw: u16) -> Self {
        Self::new(MfrVrConfig::from_raw(raw).iout_scale())
    }

    pub const fn code(self) -> u8 {
        self.0
    }

    pub const fn unit_scale(self) -> f64 {
        IOUT_SCALE_LOOKUP[self.0 as usize]
    }

    /// Amps represented by one count of a limit register.
    pub const fn lsb_amps(self) -> f64 {
        BASE_LSB_AMPS * self.unit_scale()
    }
}

pub fn decode_scaled_current(raw: u8, scale: ScaleCode) -> f64 {
    raw as f64 * scale.lsb_amps()
}

/// Encode a current limit, rounding half away from zero.
pub fn encode_scaled_current(amps: f64, scale: ScaleCode) -> Result<u8, OutOfRange> {
    let range = || OutOfRange::new(amps, 0.0, u8::MAX as f64 * scale.lsb_amps());
    // The format is unsigned: small negative currents must not round to zero.
    if !(amps >= 0.0) {
        return Err(range());
    }
    let counts = (amps / scale.lsb_amps()).round();
    if counts > u8::MAX as f64 {
        return Err(range());
    }
    Ok(counts as u8)
}

/// Percent per count of `READ_DUTY`.
pub const DUTY_STEP_PERCENT: f64 = 0.25;
/// Milliohms per count of the `VOUT_DROOP` load line.
pub const LOAD_LINE_STEP_MILLIOHMS: f64 = 0.0195;
/// Millivolts per count of `VOUT_OFFSET`.
pub const VOUT_OFFSET_STEP_MILLIVOLTS: f64 = 6.25;

pub fn decode_fixed_step(raw: u16, step: f64) -> f64 {
    raw as f64 * step
}

/// Encode a value as a whole number of `step`s, rounding half away from zero.
pub fn encode_fixed_step(value: f64, step: f64, max: u16) -> Result<u16, OutOfRange> {
    let range = || OutOfRange::new(value, 0.0, max as f64 * step);
    if !(value >= 0.0) {
        return Err(range());
    }
    let counts = (value / step).round();
    if counts > max as f64 {
        return Err(range());
    }
    Ok(counts as u16)
}

/// VID step in millivolts for each code.
pub const VID_STEP_LOOKUP_MV: [f64; 8] = [
    6.25,
    5.0,
    2.5,
    2.0,
    1.0,
    1.0 / 256.0,
    1.0 / 512.0,
    1000.0 / 1024.0,
];

/// Step rail 0 uses while `MFR_VID_RES_R1` is still unprogrammed (reads as 0xFFFF).
pub const VID_STEP_UNPROGRAMMED_MV: f64 = 0.25;

/// Layout of the `MFR_VID_RES_R1` register. Only the VID step code is used here.
#[bitfield]
#[derive(Debug, Clone, Copy)]
pub struct MfrVidRes {
    #[skip]
    __: B10,
    pub vid_step: B3,
    #[skip]
    __reserved: B3,
}

impl MfrVidRes {
    pub fn from_raw(raw: u16) -> Self {
        Self::from_bytes(raw.to_le_bytes())
    }
}

/// VID step of `page` in volts, from a raw `MFR_VID_RES_R1` value.
pub fn decode_vid_step(raw: u16, page: Page) -> f64 {
    let millivolts = if raw == 0xFFFF && page == Page::Rail0 {
        VID_STEP_UNPROGRAMMED_MV
    } else {
        VID_STEP_LOOKUP_MV[MfrVidRes::from_raw(raw).vid_step() as usize]
    };
    millivolts / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_scale_codes_are_not_literal() {
        for raw in 0..=u8::MAX {
            let expected = raw as f64 * 8.0;
            assert_eq!(decode_scaled_current(raw, ScaleCode::new(6)), expected);
            assert_eq!(decode_scaled_current(raw, ScaleCode::new(0)), expected);
        }
    }

    #[test]
    fn test_lsb_per_code() {
        let lsbs: Vec<f64> = (0..8).map(|c| ScaleCode::new(c).lsb_amps()).collect();
        assert_eq!(lsbs, [8.0, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0]);
    }

    #[test]
    fn test_scale_code_from_config() {
        assert_eq!(ScaleCode::from_config(0x0006), ScaleCode::new(6));
        // Only bits [2:0] carry the code.
        assert_eq!(ScaleCode::from_config(0xFFF9).code(), 1);
        assert_eq!(ScaleCode::new(0x0F).code(), 7);
    }

    #[test]
    fn test_encode_scaled_current() {
        let scale = ScaleCode::new(6);
        assert_eq!(encode_scaled_current(80.0, scale), Ok(10));
        // 12 A is 1.5 counts and rounds up.
        assert_eq!(encode_scaled_current(12.0, scale), Ok(2));
        assert_eq!(encode_scaled_current(2040.0, scale), Ok(255));

        let scale = ScaleCode::new(1);
        let raw = encode_scaled_current(30.0, scale).unwrap();
        assert_eq!(raw, 120);
        assert_eq!(decode_scaled_current(raw, scale), 30.0);
    }

    #[test]
    fn test_encode_scaled_current_out_of_range() {
        let scale = ScaleCode::new(6);
        let err = encode_scaled_current(2048.0, scale).unwrap_err();
        assert_eq!(err.max, 2040.0);
        assert!(encode_scaled_current(-8.0, scale).is_err());
        assert!(encode_scaled_current(f64::NAN, scale).is_err());
        // The same current fits at a coarser scale.
        assert_eq!(encode_scaled_current(2048.0, ScaleCode::new(7)), Ok(128));
    }

    #[test]
    fn test_negative_current_is_rejected_before_rounding() {
        let scale = ScaleCode::new(6);
        // -3 A is less than half a count and would otherwise round to 0.
        let err = encode_scaled_current(-3.0, scale).unwrap_err();
        assert_eq!(err.value, -3.0);
        assert!(encode_scaled_current(-0.001, scale).is_err());
        assert!(encode_scaled_current(f64::NEG_INFINITY, scale).is_err());
        assert_eq!(encode_scaled_current(0.0, scale), Ok(0));
    }

    #[test]
    fn test_fixed_steps() {
        assert_eq!(decode_fixed_step(200, DUTY_STEP_PERCENT), 50.0);
        assert_eq!(decode_fixed_step(16, VOUT_OFFSET_STEP_MILLIVOLTS), 100.0);
        assert!((decode_fixed_step(10, LOAD_LINE_STEP_MILLIOHMS) - 0.195).abs() < 1e-12);

        assert_eq!(encode_fixed_step(100.0, VOUT_OFFSET_STEP_MILLIVOLTS, 0xFFFF), Ok(16));
        // 0.2 mOhm is 10.26 counts.
        assert_eq!(encode_fixed_step(0.2, LOAD_LINE_STEP_MILLIOHMS, 0xFFFF), Ok(10));
        // 9.375 mV is 1.5 counts and rounds up.
        assert_eq!(encode_fixed_step(9.375, VOUT_OFFSET_STEP_MILLIVOLTS, 0xFFFF), Ok(2));
    }

    #[test]
    fn test_fixed_step_out_of_range() {
        let err = encode_fixed_step(70.0, DUTY_STEP_PERCENT, 0xFF).unwrap_err();
        assert_eq!(err.max, 63.75);
        assert!(encode_fixed_step(-1.0, VOUT_OFFSET_STEP_MILLIVOLTS, 0xFFFF).is_err());
        assert!(encode_fixed_step(-0.5, VOUT_OFFSET_STEP_MILLIVOLTS, 0xFFFF).is_err());
        assert!(encode_fixed_step(f64::NAN, DUTY_STEP_PERCENT, 0xFFFF).is_err());
    }

    #[test]
    fn test_vid_step_codes() {
        // Code in bits [12:10], surrounding bits ignored.
        assert_eq!(MfrVidRes::from_raw(0x0C00).vid_step(), 3);
        assert_eq!(MfrVidRes::from_raw(0xE3FF).vid_step(), 0);
        assert_eq!(decode_vid_step(0x0000, Page::Rail1), 0.00625);
        assert_eq!(decode_vid_step(0x1000, Page::Rail1), 0.001);
        assert_eq!(decode_vid_step(0x1C00, Page::Rail0), 1.0 / 1024.0);
    }

    #[test]
    fn test_unprogrammed_vid_step() {
        assert_eq!(decode_vid_step(0xFFFF, Page::Rail0), 0.00025);
        // Only rail 0 has the unprogrammed default; rail 1 reads code 7.
        assert_eq!(decode_vid_step(0xFFFF, Page::Rail1), 1.0 / 1024.0);
    }
}
