//! Per-board readouts delivered to the round callback.

use daq_board::{InputRange, RawSample, ResolvedConfig};

use crate::error::MultiboardError;

/// What the round callback receives.
#[derive(Debug)]
pub enum RoundEvent<'a> {
    /// Every board completed one buffer. One batch per board, in group order.
    Round(&'a [ReadoutBatch]),
    /// The round barrier hit a terminal error and has stopped.
    Failed(MultiboardError),
}

impl RoundEvent<'_> {
    /// Negative code for failures, `0` for a completed round.
    pub fn code(&self) -> i32 {
        match self {
            Self::Round(_) => 0,
            Self::Failed(err) => err.code(),
        }
    }
}

/// One board's converted samples for the current round.
///
/// Batches are overwritten in place every round; copy out anything needed
/// after the callback returns.
#[derive(Debug, Clone)]
pub struct ReadoutBatch {
    board: u32,
    channels: usize,
    samples: usize,
    range: InputRange,
    resolution_bits: u32,
    round: u64,
    raw: Vec<RawSample>,
    volts: Vec<f64>,
}

impl ReadoutBatch {
    pub(crate) fn new(board: u32, resolved: &ResolvedConfig) -> Self {
        let channels = resolved.geometry.channels;
        let samples = resolved.geometry.samples_per_buffer;
        Self {
            board,
            channels,
            samples,
            range: resolved.range(),
            resolution_bits: resolved.resolution_bits,
            round: 0,
            raw: vec![0; channels * samples],
            volts: vec![0.0; channels * samples],
        }
    }

    /// Board this batch was read from.
    pub fn board_id(&self) -> u32 {
        self.board
    }

    /// Active channels.
    pub fn channel_count(&self) -> usize {
        self.channels
    }

    /// Samples per channel.
    pub fn samples_per_channel(&self) -> usize {
        self.samples
    }

    /// Input range used for conversion.
    pub fn range(&self) -> InputRange {
        self.range
    }

    /// Round number (1-based) the batch was last filled in.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Converted samples of one channel.
    pub fn channel(&self, channel: usize) -> Option<&[f64]> {
        (channel < self.channels).then(|| &self.volts[self.span(channel)])
    }

    /// Raw samples of one channel, as copied from the ring.
    pub fn raw_channel(&self, channel: usize) -> Option<&[RawSample]> {
        (channel < self.channels).then(|| &self.raw[self.span(channel)])
    }

    /// Iterate over per-channel voltage slices.
    pub fn channels(&self) -> impl Iterator<Item = &[f64]> {
        self.volts.chunks_exact(self.samples.max(1))
    }

    /// All converted samples, channel-major.
    pub fn volts(&self) -> &[f64] {
        &self.volts
    }

    fn span(&self, channel: usize) -> std::ops::Range<usize> {
        channel * self.samples..(channel + 1) * self.samples
    }

    pub(crate) fn raw_channel_mut(&mut self, channel: usize) -> &mut [RawSample] {
        let span = self.span(channel);
        &mut self.raw[span]
    }

    /// Convert the raw samples copied this round.
    pub(crate) fn convert(&mut self, round: u64) {
        let (range, bits) = (self.range, self.resolution_bits);
        for (volts, &raw) in self.volts.iter_mut().zip(&self.raw) {
            *volts = range.to_volts(raw, bits);
        }
        self.round = round;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daq_board::{AcquisitionConfig, BoardCapabilities, InputMode};

    fn batch(range: InputRange) -> ReadoutBatch {
        let resolved = AcquisitionConfig {
            samples_per_buffer: 4,
            mode: InputMode::Differential,
            range,
            ..AcquisitionConfig::default()
        }
        .resolve(&BoardCapabilities::default())
        .unwrap();
        ReadoutBatch::new(3, &resolved)
    }

    #[test]
    fn test_batch_shape() {
        let batch = batch(InputRange::Bipolar10V);
        assert_eq!(batch.board_id(), 3);
        assert_eq!(batch.channel_count(), 4);
        assert_eq!(batch.samples_per_channel(), 4);
        assert_eq!(batch.channels().count(), 4);
        assert!(batch.channel(4).is_none());
    }

    #[test]
    fn test_convert_uses_range_lsb() {
        let mut batch = batch(InputRange::Bipolar2V5);
        batch.raw_channel_mut(1).copy_from_slice(&[-4, 0, 1, 100]);
        batch.convert(7);

        let lsb = InputRange::Bipolar2V5.lsb(16);
        assert_eq!(batch.round(), 7);
        assert_eq!(batch.channel(1).unwrap(), &[-4.0 * lsb, 0.0, lsb, 100.0 * lsb]);
        assert_eq!(batch.raw_channel(1).unwrap(), &[-4, 0, 1, 100]);
        assert!(batch.channel(0).unwrap().iter().all(|&v| v == 0.0));
    }
}
