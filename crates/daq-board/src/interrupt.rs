//! Interrupt records retrieved from a board's interrupt controller.

/// What raised an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterruptSource {
    /// No interrupt (empty record)
    #[default]
    None,
    /// A DMA ring slot completed on every active channel
    BufferComplete,
    /// Start or stop trigger fired
    Trigger,
    /// Sampling engine finished its start sequence
    EngineStarted,
}

/// One entry popped from the board's pending-interrupt queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterruptRecord {
    /// Record carries an interrupt
    pub valid: bool,
    /// Controller flagged an error while latching the interrupt
    pub error: bool,
    /// Interrupt source
    pub source: InterruptSource,
    /// Interrupts still pending after this one
    pub pending: u32,
}

impl InterruptRecord {
    /// Record returned when nothing is pending.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A valid record from `source`.
    pub fn new(source: InterruptSource) -> Self {
        Self {
            valid: true,
            error: false,
            source,
            pending: 0,
        }
    }

    /// A record with the controller error flag set.
    pub fn failed() -> Self {
        Self {
            valid: true,
            error: true,
            source: InterruptSource::None,
            pending: 0,
        }
    }

    /// Check if this record reports a completed ring slot.
    pub fn is_buffer_complete(&self) -> bool {
        self.valid && !self.error && self.source == InterruptSource::BufferComplete
    }

    /// Check if more interrupts are queued behind this one.
    pub fn has_more(&self) -> bool {
        self.pending > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_record() {
        let record = InterruptRecord::empty();
        assert!(!record.valid);
        assert!(!record.is_buffer_complete());
        assert!(!record.has_more());
    }

    #[test]
    fn test_failed_record_is_not_completion() {
        let record = InterruptRecord::failed();
        assert!(record.valid && record.error);
        assert!(!record.is_buffer_complete());
    }
}
