//! Engine configuration.

use crate::register::{RegisterMap, STANDARD};

/// Settings fixed for the lifetime of a [`PmbusEngine`](crate::engine::PmbusEngine).
///
/// ```
/// use pmbus_telemetry::config::EngineConfig;
///
/// let config = EngineConfig::new().with_vout_exponent_fallback(-9);
/// assert_eq!(config.vout_exponent_fallback, -9);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Exponent used for Linear16 values when the exponent field of `VOUT_MODE` reads as zero.
    ///
    /// @TODO confirm against the controller datasheet; -10 matches what shipped devices report
    /// once configured.
    pub vout_exponent_fallback: i8,
    pub register_map: &'static RegisterMap,
}

impl EngineConfig {
    pub const DEFAULT_VOUT_EXPONENT: i8 = -10;

    pub const fn new() -> Self {
        Self {
            vout_exponent_fallback: Self::DEFAULT_VOUT_EXPONENT,
            register_map: &STANDARD,
        }
    }

    pub const fn with_vout_exponent_fallback(mut self, exponent: i8) -> Self {
        self.vout_exponent_fallback = exponent;
        self
    }

    /// Use a different register table, e.g. a newer revision with corrected entries.
    pub const fn with_register_map(mut self, register_map: &'static RegisterMap) -> Self {
        self.register_map = register_map;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
