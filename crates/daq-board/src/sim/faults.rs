//! Fault injection for simulated boards.

/// A fault a [`SimController`](super::SimController) can arm on a board.
///
/// Every fault except [`HangUp`](SimFault::HangUp) is one-shot: it fires on
/// the next matching operation and then disarms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimFault {
    /// Raise the DMA error flag of `channel` with the next completed buffer
    DmaError {
        /// Active channel index
        channel: usize,
    },
    /// Next interrupt record carries the controller error flag
    InterruptGetError,
    /// Next board-level acknowledge fails
    AcknowledgeFailure,
    /// Next `initialize_and_start` times out
    StartFailure,
    /// Next completion raises its interrupt without marking the slot full
    IncompleteBuffer,
    /// Close the interrupt channel (reported as `POLLHUP`)
    HangUp,
}

#[derive(Debug, Default)]
pub(crate) struct FaultPlan {
    dma_error: Option<usize>,
    interrupt_get: bool,
    acknowledge: bool,
    start: bool,
    incomplete: bool,
}

impl FaultPlan {
    /// Arm `fault`. Returns false for faults applied immediately.
    pub(crate) fn arm(&mut self, fault: SimFault) -> bool {
        match fault {
            SimFault::DmaError { channel } => self.dma_error = Some(channel),
            SimFault::InterruptGetError => self.interrupt_get = true,
            SimFault::AcknowledgeFailure => self.acknowledge = true,
            SimFault::StartFailure => self.start = true,
            SimFault::IncompleteBuffer => self.incomplete = true,
            SimFault::HangUp => return false,
        }
        true
    }

    pub(crate) fn take_dma_error(&mut self) -> Option<usize> {
        self.dma_error.take()
    }

    pub(crate) fn take_interrupt_get(&mut self) -> bool {
        std::mem::take(&mut self.interrupt_get)
    }

    pub(crate) fn take_acknowledge(&mut self) -> bool {
        std::mem::take(&mut self.acknowledge)
    }

    pub(crate) fn take_start(&mut self) -> bool {
        std::mem::take(&mut self.start)
    }

    pub(crate) fn take_incomplete(&mut self) -> bool {
        std::mem::take(&mut self.incomplete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_faults_are_one_shot() {
        let mut plan = FaultPlan::default();
        assert!(plan.arm(SimFault::AcknowledgeFailure));
        assert!(plan.take_acknowledge());
        assert!(!plan.take_acknowledge());

        assert!(plan.arm(SimFault::DmaError { channel: 3 }));
        assert_eq!(plan.take_dma_error(), Some(3));
        assert_eq!(plan.take_dma_error(), None);
    }

    #[test]
    fn test_hang_up_is_immediate() {
        let mut plan = FaultPlan::default();
        assert!(!plan.arm(SimFault::HangUp));
    }
}
