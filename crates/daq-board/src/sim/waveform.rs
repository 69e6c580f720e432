//! Deterministic test signals for simulated boards.

use std::f64::consts::TAU;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::range::{InputRange, RawSample};

/// Signal a simulated board writes into its ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SimWaveform {
    /// Sine wave with uniform noise, phase-shifted per channel
    Sine {
        /// Peak amplitude in volts
        amplitude: f64,
        /// Frequency in Hz
        frequency: f64,
        /// Peak noise in volts
        noise: f64,
    },
    /// Every sample of buffer `n` holds raw count `n` (wrapping)
    Sequence,
    /// Every sample holds the same raw count
    Constant {
        /// Raw count
        raw: RawSample,
    },
}

impl Default for SimWaveform {
    fn default() -> Self {
        Self::Sine {
            amplitude: 1.0,
            frequency: 50.0,
            noise: 0.01,
        }
    }
}

pub(crate) struct WaveformGenerator {
    waveform: SimWaveform,
    rng: ChaCha8Rng,
    rate: f64,
    range: InputRange,
    resolution_bits: u32,
}

impl WaveformGenerator {
    pub(crate) fn new(
        waveform: SimWaveform,
        seed: u64,
        rate: f64,
        range: InputRange,
        resolution_bits: u32,
    ) -> Self {
        Self {
            waveform,
            rng: ChaCha8Rng::seed_from_u64(seed),
            rate,
            range,
            resolution_bits,
        }
    }

    /// Fill one channel's slot for buffer number `sequence`.
    pub(crate) fn fill(&mut self, channel: usize, sequence: u64, dst: &mut [RawSample]) {
        match self.waveform {
            SimWaveform::Sequence => dst.fill(sequence as u16 as RawSample),
            SimWaveform::Constant { raw } => dst.fill(raw),
            SimWaveform::Sine {
                amplitude,
                frequency,
                noise,
            } => {
                let first = sequence * dst.len() as u64;
                let phase = channel as f64 * TAU / 8.0;
                for (i, sample) in dst.iter_mut().enumerate() {
                    let t = (first + i as u64) as f64 / self.rate;
                    let jitter = if noise > 0.0 {
                        self.rng.gen_range(-noise..=noise)
                    } else {
                        0.0
                    };
                    let volts = amplitude * (TAU * frequency * t + phase).sin() + jitter;
                    *sample = self.to_raw(volts);
                }
            }
        }
    }

    fn to_raw(&self, volts: f64) -> RawSample {
        let lsb = self.range.lsb(self.resolution_bits);
        let counts = if self.range.is_bipolar() {
            (volts / lsb).round()
        } else {
            (volts / lsb).round() + f64::from(i16::MIN)
        };
        counts.clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as RawSample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_waveform() {
        let mut generator =
            WaveformGenerator::new(SimWaveform::Sequence, 1, 1000.0, InputRange::Bipolar10V, 16);
        let mut buf = [0i16; 8];
        generator.fill(0, 7, &mut buf);
        assert_eq!(buf, [7; 8]);
    }

    #[test]
    fn test_sine_within_range() {
        let waveform = SimWaveform::Sine {
            amplitude: 20.0,
            frequency: 10.0,
            noise: 0.5,
        };
        let mut generator = WaveformGenerator::new(waveform, 42, 1000.0, InputRange::Bipolar5V, 16);
        let mut buf = [0i16; 256];
        generator.fill(0, 0, &mut buf);
        // Overdriven input clips at full scale
        assert!(buf.contains(&i16::MAX));
        assert!(buf.contains(&i16::MIN));
    }

    #[test]
    fn test_same_seed_same_noise() {
        let mut a = WaveformGenerator::new(SimWaveform::default(), 9, 1000.0, InputRange::Bipolar10V, 16);
        let mut b = WaveformGenerator::new(SimWaveform::default(), 9, 1000.0, InputRange::Bipolar10V, 16);
        let (mut x, mut y) = ([0i16; 64], [0i16; 64]);
        a.fill(1, 3, &mut x);
        b.fill(1, 3, &mut y);
        assert_eq!(x, y);
    }

    #[test]
    fn test_waveform_from_toml() {
        let waveform: SimWaveform = toml::from_str("kind = \"constant\"\nraw = -12").unwrap();
        assert_eq!(waveform, SimWaveform::Constant { raw: -12 });
    }
}
