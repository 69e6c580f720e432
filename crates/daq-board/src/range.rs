//! Input ranges and raw-count to voltage conversion.

use serde::{Deserialize, Serialize};

/// Raw ADC sample as delivered by the DMA engine (two's complement).
pub type RawSample = i16;

/// Programmable input range of an analog channel.
///
/// Ranges are symmetric around zero for the bipolar settings and start at
/// zero for the unipolar ones. Every range maps `i16::MIN..=i16::MAX` onto
/// `min..max`; unipolar ranges get there by reading the sample as offset
/// binary (see [`InputRange::counts`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InputRange {
    /// ±10 V
    #[default]
    #[serde(rename = "bipolar_10v")]
    Bipolar10V,
    /// ±5 V
    #[serde(rename = "bipolar_5v")]
    Bipolar5V,
    /// ±2.5 V
    #[serde(rename = "bipolar_2v5")]
    Bipolar2V5,
    /// ±1.25 V
    #[serde(rename = "bipolar_1v25")]
    Bipolar1V25,
    /// 0 to 10 V
    #[serde(rename = "unipolar_10v")]
    Unipolar10V,
    /// 0 to 5 V
    #[serde(rename = "unipolar_5v")]
    Unipolar5V,
}

impl InputRange {
    /// All ranges supported by the board family, in register order.
    pub const ALL: [InputRange; 6] = [
        Self::Bipolar10V,
        Self::Bipolar5V,
        Self::Bipolar2V5,
        Self::Bipolar1V25,
        Self::Unipolar10V,
        Self::Unipolar5V,
    ];

    /// Minimum voltage of the range.
    pub fn min(self) -> f64 {
        match self {
            Self::Bipolar10V => -10.0,
            Self::Bipolar5V => -5.0,
            Self::Bipolar2V5 => -2.5,
            Self::Bipolar1V25 => -1.25,
            Self::Unipolar10V | Self::Unipolar5V => 0.0,
        }
    }

    /// Maximum voltage of the range.
    pub fn max(self) -> f64 {
        match self {
            Self::Bipolar10V | Self::Unipolar10V => 10.0,
            Self::Bipolar5V | Self::Unipolar5V => 5.0,
            Self::Bipolar2V5 => 2.5,
            Self::Bipolar1V25 => 1.25,
        }
    }

    /// Get the span (max - min) of this range.
    pub fn span(self) -> f64 {
        self.max() - self.min()
    }

    /// Check if this is a bipolar range (includes negative values).
    pub fn is_bipolar(self) -> bool {
        self.min() < 0.0
    }

    /// Register index used when programming the channel gain.
    pub fn index(self) -> u32 {
        Self::ALL
            .iter()
            .position(|&r| r == self)
            .map(|i| i as u32)
            .unwrap_or(0)
    }

    /// Volts per count for a converter with `resolution_bits` of resolution.
    pub fn lsb(self, resolution_bits: u32) -> f64 {
        self.span() / (1u64 << resolution_bits) as f64
    }

    /// Converter counts above the range minimum for one raw sample.
    ///
    /// Bipolar ranges use the signed sample as is. Unipolar ranges read it as
    /// offset binary, so `i16::MIN` is count 0 and `i16::MAX` full scale.
    pub fn counts(self, raw: RawSample) -> i32 {
        if self.is_bipolar() {
            i32::from(raw)
        } else {
            i32::from(raw) - i32::from(i16::MIN)
        }
    }

    /// Convert one raw sample to volts: `counts(raw) * lsb`.
    pub fn to_volts(self, raw: RawSample, resolution_bits: u32) -> f64 {
        f64::from(self.counts(raw)) * self.lsb(resolution_bits)
    }

    /// Human-readable description of the range.
    pub fn description(self) -> String {
        format!("{:.3} to {:.3} V", self.min(), self.max())
    }
}

/// Analog input wiring mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Each input measured against ground
    #[default]
    SingleEnded,
    /// Inputs measured in pairs
    Differential,
}

impl InputMode {
    /// Number of logical channels available for `physical` hardware inputs.
    pub fn active_channels(self, physical: usize) -> usize {
        match self {
            Self::SingleEnded => physical,
            Self::Differential => physical / 2,
        }
    }

    /// Physical input pair backing logical channel `logical`.
    ///
    /// Single-ended channels have no negative leg. Differential channel `k`
    /// uses input `k` against input `k + physical / 2`. Returns `None` when
    /// the logical index does not exist in this mode.
    pub fn physical_pair(self, logical: usize, physical: usize) -> Option<(usize, Option<usize>)> {
        if logical >= self.active_channels(physical) {
            return None;
        }
        match self {
            Self::SingleEnded => Some((logical, None)),
            Self::Differential => Some((logical, Some(logical + physical / 2))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_span() {
        assert_eq!(InputRange::Bipolar10V.span(), 20.0);
        assert_eq!(InputRange::Unipolar5V.span(), 5.0);
        assert!(InputRange::Bipolar1V25.is_bipolar());
        assert!(!InputRange::Unipolar10V.is_bipolar());
    }

    #[test]
    fn test_lsb_16bit() {
        let lsb = InputRange::Bipolar10V.lsb(16);
        assert!((lsb - 20.0 / 65536.0).abs() < 1e-15);
    }

    #[test]
    fn test_bipolar_conversion_is_linear() {
        let range = InputRange::Bipolar5V;
        let lsb = range.lsb(16);
        for raw in [-32768i16, -1, 0, 1, 1234, 32767] {
            assert_eq!(range.to_volts(raw, 16), raw as f64 * lsb);
        }
        assert!((range.to_volts(i16::MIN, 16) + 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_unipolar_conversion_offsets_half_scale() {
        let range = InputRange::Unipolar10V;
        let lsb = range.lsb(16);
        assert_eq!(range.counts(i16::MIN), 0);
        assert_eq!(range.counts(1234), 1234 + 32768);
        for raw in [-32768i16, -1, 0, 1234, 32767] {
            assert_eq!(range.to_volts(raw, 16), f64::from(range.counts(raw)) * lsb);
        }
        assert_eq!(range.to_volts(i16::MIN, 16), 0.0);
        assert!((range.to_volts(0, 16) - 5.0).abs() < 1e-12);
        assert!((range.to_volts(1234, 16) - 5.18829345703125).abs() < 1e-12);
        assert!((range.to_volts(i16::MAX, 16) - (10.0 - lsb)).abs() < 1e-12);
    }

    #[test]
    fn test_range_index_matches_register_order() {
        for (i, range) in InputRange::ALL.iter().enumerate() {
            assert_eq!(range.index(), i as u32);
        }
    }

    #[test]
    fn test_differential_pairs() {
        assert_eq!(InputMode::Differential.active_channels(8), 4);
        assert_eq!(
            InputMode::Differential.physical_pair(1, 8),
            Some((1, Some(5)))
        );
        assert_eq!(InputMode::Differential.physical_pair(4, 8), None);
        assert_eq!(InputMode::SingleEnded.physical_pair(7, 8), Some((7, None)));
    }
}
