//! Benchmark profiles and workloads for the Strobe frame scheduler.
//!
//! - [`SpinWork`]: a processor that burns a fixed amount of arithmetic in
//!   `compute` and publishes the result in `commit`
//! - [`Profile`]: how many units, how they are chained, and how much work each
//!   one does
//! - [`populate`]: register a profile's units on a scheduler

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::hint::black_box;

use strobe_core::{
    ArmingCollection, ArmingCondition, Processor, ProcessorError, UnitFlags, UnitId,
};
use strobe_engine::{EngineConfig, SchedulerError, SchedulerHandle};

/// A unit that spins for `iters` rounds of integer mixing per compute.
pub struct SpinWork {
    name: String,
    iters: u32,
    state: u64,
    next: u64,
    armed: bool,
}

impl SpinWork {
    /// A unit armed on every new frame.
    pub fn new(name: impl Into<String>, iters: u32, seed: u64) -> Self {
        Self {
            name: name.into(),
            iters,
            state: seed,
            next: seed,
            armed: true,
        }
    }

    /// A unit with no condition of its own, for non-head chain members.
    pub fn unarmed(name: impl Into<String>, iters: u32, seed: u64) -> Self {
        Self {
            armed: false,
            ..Self::new(name, iters, seed)
        }
    }

    /// The value published by the last commit.
    pub fn state(&self) -> u64 {
        self.state
    }
}

impl Processor for SpinWork {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self) -> Option<ArmingCondition> {
        self.armed.then_some(ArmingCondition::NewFrame)
    }

    fn compute(&mut self, _arming: &ArmingCollection) -> Result<(), ProcessorError> {
        let mut x = self.state;
        for _ in 0..self.iters {
            x = x
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
        }
        self.next = black_box(x);
        Ok(())
    }

    fn commit(&mut self, _arming: &ArmingCollection) -> Result<(), ProcessorError> {
        self.state = self.next;
        Ok(())
    }
}

/// Shape of a benchmark workload.
#[derive(Clone, Copy, Debug)]
pub struct Profile {
    /// Worker threads.
    pub workers: usize,
    /// Registered units.
    pub units: usize,
    /// Units per chain. `1` means every unit is independent.
    pub chain_len: usize,
    /// Mixing rounds per compute.
    pub iters: u32,
}

impl Profile {
    /// 64 independent light units on 4 workers.
    pub fn reference() -> Self {
        Self {
            workers: 4,
            units: 64,
            chain_len: 1,
            iters: 2_000,
        }
    }

    /// The reference units grouped into chains of 4.
    pub fn chained() -> Self {
        Self {
            chain_len: 4,
            ..Self::reference()
        }
    }

    /// 1024 trivial units, mostly measuring scheduler overhead.
    pub fn overhead() -> Self {
        Self {
            workers: 4,
            units: 1024,
            chain_len: 1,
            iters: 0,
        }
    }

    /// The engine configuration for this profile.
    pub fn config(&self) -> EngineConfig {
        EngineConfig::with_workers(self.workers)
    }
}

/// Register `profile.units` units, linking every `chain_len` of them into a
/// chain whose head is armed on new frames.
pub fn populate(
    scheduler: &SchedulerHandle,
    profile: &Profile,
) -> Result<Vec<UnitId>, SchedulerError> {
    let chain_len = profile.chain_len.max(1);
    let mut units = Vec::with_capacity(profile.units);
    for i in 0..profile.units {
        let name = format!("spin-{i}");
        let processor = if i % chain_len == 0 {
            SpinWork::new(name, profile.iters, i as u64)
        } else {
            SpinWork::unarmed(name, profile.iters, i as u64)
        };
        let id = scheduler.register(Box::new(processor), UnitFlags::default())?;
        if i % chain_len != 0 {
            if let Some(&prev) = units.last() {
                scheduler.set_next_in_chain(prev, Some(id))?;
            }
        }
        units.push(id);
    }
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strobe_engine::LockstepEngine;

    #[test]
    fn profiles_validate() {
        for profile in [Profile::reference(), Profile::chained(), Profile::overhead()] {
            profile.config().validate().unwrap();
        }
    }

    #[test]
    fn chained_profile_dispatches_one_chain_per_group() {
        let profile = Profile {
            workers: 2,
            units: 8,
            chain_len: 4,
            iters: 10,
        };
        let mut engine = LockstepEngine::new(profile.config()).unwrap();
        let units = populate(&engine.handle(), &profile).unwrap();
        assert_eq!(units.len(), 8);
        assert_eq!(engine.scheduler().chain_of(units[5]).len(), 4);
        let metrics = engine.step_frame();
        assert_eq!(metrics.chains, 2);
        assert_eq!(metrics.units_committed, 8);
    }

    #[test]
    fn spin_work_commits_computed_value() {
        let mut unit = SpinWork::new("s", 3, 7);
        let arming = ArmingCollection::new();
        unit.compute(&arming).unwrap();
        assert_eq!(unit.state(), 7);
        unit.commit(&arming).unwrap();
        assert_ne!(unit.state(), 7);
    }
}
