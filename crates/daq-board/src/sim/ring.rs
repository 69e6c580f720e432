//! In-process DMA ring of a simulated board.

use crate::config::BufferGeometry;
use crate::error::{BoardError, Result};
use crate::range::RawSample;

/// Per-channel ring of fixed-length sample slots.
///
/// Slot memory for channel `c`, slot `s` lives at
/// `data[c][s * samples_per_buffer..(s + 1) * samples_per_buffer]`.
#[derive(Debug)]
pub(crate) struct DmaRing {
    geometry: BufferGeometry,
    data: Vec<Vec<RawSample>>,
    full: Vec<Vec<bool>>,
    channel_error: Vec<bool>,
    irq_bits: Vec<bool>,
    dma_started: Vec<bool>,
    write_index: usize,
}

impl DmaRing {
    pub(crate) fn new(geometry: BufferGeometry) -> Result<Self> {
        let per_channel = geometry.samples_per_buffer * geometry.depth;
        let mut data = Vec::new();
        data.try_reserve_exact(geometry.channels)
            .map_err(|_| BoardError::AllocationFailed {
                bytes: geometry.ring_bytes(),
            })?;

        for _ in 0..geometry.channels {
            let mut channel: Vec<RawSample> = Vec::new();
            channel
                .try_reserve_exact(per_channel)
                .map_err(|_| BoardError::AllocationFailed {
                    bytes: geometry.ring_bytes(),
                })?;
            channel.resize(per_channel, 0);
            data.push(channel);
        }

        Ok(Self {
            geometry,
            data,
            full: vec![vec![false; geometry.depth]; geometry.channels],
            channel_error: vec![false; geometry.channels],
            irq_bits: vec![false; geometry.channels],
            dma_started: vec![false; geometry.channels],
            write_index: 0,
        })
    }

    fn check(&self, channel: usize, index: usize) -> Result<()> {
        if channel >= self.geometry.channels {
            return Err(BoardError::InvalidChannel {
                channel,
                max: self.geometry.channels,
            });
        }
        if index >= self.geometry.depth {
            return Err(BoardError::InvalidBufferIndex {
                index,
                depth: self.geometry.depth,
            });
        }
        Ok(())
    }

    fn check_channel(&self, channel: usize) -> Result<()> {
        self.check(channel, 0)
    }

    fn span(&self, index: usize) -> std::ops::Range<usize> {
        let n = self.geometry.samples_per_buffer;
        index * n..(index + 1) * n
    }

    pub(crate) fn start_dma(&mut self, channel: usize) -> Result<()> {
        self.check_channel(channel)?;
        self.dma_started[channel] = true;
        Ok(())
    }

    pub(crate) fn all_dma_started(&self) -> bool {
        self.dma_started.iter().all(|&s| s)
    }

    /// Produce one buffer into the current write slot.
    ///
    /// `mark_full` false leaves the slot flagged empty even though data was
    /// written. A slot that is still full from an earlier lap is an overflow:
    /// every channel's error flag is raised and the slot is left untouched.
    pub(crate) fn produce<F>(&mut self, mark_full: bool, mut fill: F) -> Result<usize>
    where
        F: FnMut(usize, &mut [RawSample]),
    {
        let index = self.write_index;
        if self.full.iter().any(|slots| slots[index]) {
            self.channel_error.iter_mut().for_each(|e| *e = true);
            return Err(BoardError::HardwareError {
                board: 0,
                message: format!("DMA ring overflow at slot {}", index),
            });
        }

        let span = self.span(index);
        for channel in 0..self.geometry.channels {
            fill(channel, &mut self.data[channel][span.clone()]);
            self.full[channel][index] = mark_full;
            self.irq_bits[channel] = true;
        }

        self.write_index = (index + 1) % self.geometry.depth;
        Ok(index)
    }

    pub(crate) fn is_full(&self, channel: usize, index: usize) -> Result<bool> {
        self.check(channel, index)?;
        Ok(self.full[channel][index])
    }

    pub(crate) fn copy_out(&self, channel: usize, index: usize, dst: &mut [RawSample]) -> Result<()> {
        self.check(channel, index)?;
        if dst.len() != self.geometry.samples_per_buffer {
            return Err(BoardError::SizeMismatch {
                expected: self.geometry.samples_per_buffer,
                actual: dst.len(),
            });
        }
        dst.copy_from_slice(&self.data[channel][self.span(index)]);
        Ok(())
    }

    pub(crate) fn reset_slot(&mut self, channel: usize, index: usize) -> Result<()> {
        self.check(channel, index)?;
        self.full[channel][index] = false;
        Ok(())
    }

    pub(crate) fn clear_irq(&mut self, channel: usize) -> Result<()> {
        self.check_channel(channel)?;
        self.irq_bits[channel] = false;
        Ok(())
    }

    pub(crate) fn irq_pending(&self, channel: usize) -> bool {
        self.irq_bits.get(channel).copied().unwrap_or(false)
    }

    pub(crate) fn set_channel_error(&mut self, channel: usize) -> Result<()> {
        self.check_channel(channel)?;
        self.channel_error[channel] = true;
        Ok(())
    }

    pub(crate) fn channel_error(&self, channel: usize) -> Result<bool> {
        self.check_channel(channel)?;
        Ok(self.channel_error[channel])
    }

    /// Return every slot to the DMA engine and rewind to slot 0.
    pub(crate) fn rewind(&mut self) {
        for slots in &mut self.full {
            slots.iter_mut().for_each(|f| *f = false);
        }
        self.channel_error.iter_mut().for_each(|e| *e = false);
        self.irq_bits.iter_mut().for_each(|b| *b = false);
        self.dma_started.iter_mut().for_each(|s| *s = false);
        self.write_index = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(depth: usize) -> DmaRing {
        DmaRing::new(BufferGeometry {
            channels: 2,
            samples_per_buffer: 4,
            depth,
        })
        .unwrap()
    }

    #[test]
    fn test_produce_and_copy() {
        let mut ring = ring(2);
        let index = ring.produce(true, |ch, buf| buf.fill(ch as i16 + 10)).unwrap();
        assert_eq!(index, 0);
        assert!(ring.is_full(1, 0).unwrap());
        assert!(ring.irq_pending(1));

        let mut out = [0i16; 4];
        ring.copy_out(1, 0, &mut out).unwrap();
        assert_eq!(out, [11; 4]);

        ring.reset_slot(1, 0).unwrap();
        assert!(!ring.is_full(1, 0).unwrap());
    }

    #[test]
    fn test_overflow_sets_channel_errors() {
        let mut ring = ring(1);
        ring.produce(true, |_, buf| buf.fill(1)).unwrap();
        assert!(ring.produce(true, |_, buf| buf.fill(2)).is_err());
        assert!(ring.channel_error(0).unwrap());
        assert!(ring.channel_error(1).unwrap());
    }

    #[test]
    fn test_bounds_checked() {
        let ring = ring(2);
        let mut out = [0i16; 4];
        assert!(matches!(
            ring.copy_out(0, 2, &mut out),
            Err(BoardError::InvalidBufferIndex { index: 2, depth: 2 })
        ));
        assert!(matches!(
            ring.copy_out(2, 0, &mut out),
            Err(BoardError::InvalidChannel { channel: 2, max: 2 })
        ));
        let mut short = [0i16; 3];
        assert!(matches!(
            ring.copy_out(0, 0, &mut short),
            Err(BoardError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_rewind() {
        let mut ring = ring(2);
        ring.start_dma(0).unwrap();
        ring.start_dma(1).unwrap();
        assert!(ring.all_dma_started());
        ring.produce(true, |_, buf| buf.fill(3)).unwrap();
        ring.rewind();
        assert!(!ring.all_dma_started());
        assert!(!ring.is_full(0, 0).unwrap());
        assert_eq!(ring.produce(true, |_, _| {}).unwrap(), 0);
    }
}
