//! One dispatched chain: the unit of work a worker picks up.

use std::sync::Arc;

use smallvec::SmallVec;
use strobe_core::{ArmingCollection, FrameId, Phase, UnitId};

use crate::unit::{UnitPhase, UnitSlot};

/// A unit in a dispatched chain together with the triggers that armed it.
pub(crate) struct ChainLink {
    pub unit: Arc<UnitSlot>,
    pub arming: ArmingCollection,
}

/// A chain dispatched for one frame.
///
/// `seq` is the chain's dispatch position within the frame; the commit
/// batch is assembled in `seq` order regardless of completion order.
pub(crate) struct ChainTask {
    pub seq: usize,
    pub frame: FrameId,
    pub links: SmallVec<[ChainLink; 4]>,
    pub compute_failures: u32,
}

impl ChainTask {
    pub fn new(
        seq: usize,
        frame: FrameId,
        links: SmallVec<[ChainLink; 4]>,
    ) -> Self {
        Self {
            seq,
            frame,
            links,
            compute_failures: 0,
        }
    }

    pub fn head(&self) -> Option<UnitId> {
        self.links.first().map(|l| l.unit.id())
    }

    /// Run `compute()` for every link in order. A failing unit does not
    /// stop the rest of the chain.
    pub fn run_compute(&mut self) {
        for link in &self.links {
            link.unit.set_phase(UnitPhase::Computing);
            if !link.unit.run_phase(Phase::Compute, &link.arming) {
                self.compute_failures += 1;
            }
            link.unit.set_phase(UnitPhase::AwaitingCommit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;
    use strobe_core::{ArmingCondition, Processor, ProcessorError, UnitFlags};

    struct FailsCompute;

    impl Processor for FailsCompute {
        fn name(&self) -> &str {
            "fails"
        }
        fn initialize(&mut self) -> Option<ArmingCondition> {
            None
        }
        fn compute(&mut self, _: &ArmingCollection) -> Result<(), ProcessorError> {
            Err(ProcessorError::failed("nope"))
        }
        fn commit(&mut self, _: &ArmingCollection) -> Result<(), ProcessorError> {
            Ok(())
        }
    }

    #[test]
    fn failing_link_does_not_stop_chain() {
        let a = Arc::new(UnitSlot::new(
            UnitId::new(0, 0),
            UnitFlags::default(),
            Box::new(FailsCompute),
        ));
        let b = Arc::new(UnitSlot::new(
            UnitId::new(1, 0),
            UnitFlags::default(),
            Box::new(FailsCompute),
        ));
        let mut task = ChainTask::new(
            0,
            FrameId(1),
            smallvec![
                ChainLink {
                    unit: Arc::clone(&a),
                    arming: ArmingCollection::new(),
                },
                ChainLink {
                    unit: Arc::clone(&b),
                    arming: ArmingCollection::new(),
                },
            ],
        );
        assert_eq!(task.head(), Some(a.id()));
        task.run_compute();
        assert_eq!(task.compute_failures, 2);
        assert_eq!(a.phase(), UnitPhase::AwaitingCommit);
        assert_eq!(b.phase(), UnitPhase::AwaitingCommit);
    }
}
