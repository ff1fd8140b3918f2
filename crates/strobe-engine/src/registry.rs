//! Generational arena of registered units and their chain links.
//!
//! Every record carries the id of its chain root. Linking two units whose
//! roots are equal would close a cycle, so cycle rejection is O(1); a link
//! relabels the successor's sub-chain with the new root. Chain traversal
//! still guards against corrupted links at runtime.

use std::sync::Arc;

use smallvec::{smallvec, SmallVec};
use strobe_core::{ConditionId, OwnerId, UnitId};

use crate::error::SchedulerError;
use crate::unit::UnitSlot;

pub(crate) type Chain = SmallVec<[Arc<UnitSlot>; 4]>;

pub(crate) struct UnitRecord {
    pub slot: Arc<UnitSlot>,
    pub next: Option<UnitId>,
    pub prev: Option<UnitId>,
    pub root: UnitId,
    pub owner: Option<OwnerId>,
    /// Every condition currently armed for this unit.
    pub conditions: SmallVec<[ConditionId; 2]>,
    /// The condition installed by `set_arming_condition`, if any.
    pub current: Option<ConditionId>,
}

struct Entry {
    generation: u32,
    record: Option<UnitRecord>,
}

#[derive(Default)]
pub(crate) struct UnitRegistry {
    entries: Vec<Entry>,
    free: Vec<u32>,
    live: usize,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    /// Allocate an id and store the slot built for it.
    pub fn insert(&mut self, make_slot: impl FnOnce(UnitId) -> UnitSlot) -> UnitId {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.entries.push(Entry {
                    generation: 0,
                    record: None,
                });
                (self.entries.len() - 1) as u32
            }
        };
        let entry = &mut self.entries[index as usize];
        let id = UnitId::new(index, entry.generation);
        entry.record = Some(UnitRecord {
            slot: Arc::new(make_slot(id)),
            next: None,
            prev: None,
            root: id,
            owner: None,
            conditions: SmallVec::new(),
            current: None,
        });
        self.live += 1;
        id
    }

    pub fn get(&self, id: UnitId) -> Option<&UnitRecord> {
        self.entries
            .get(id.index() as usize)
            .filter(|e| e.generation == id.generation())
            .and_then(|e| e.record.as_ref())
    }

    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut UnitRecord> {
        self.entries
            .get_mut(id.index() as usize)
            .filter(|e| e.generation == id.generation())
            .and_then(|e| e.record.as_mut())
    }

    pub fn contains(&self, id: UnitId) -> bool {
        self.get(id).is_some()
    }

    pub fn root_of(&self, id: UnitId) -> Option<UnitId> {
        self.get(id).map(|r| r.root)
    }

    /// Remove a unit, splicing it out of its chain.
    pub fn remove(&mut self, id: UnitId) -> Option<UnitRecord> {
        let record = {
            let entry = self.entries.get_mut(id.index() as usize)?;
            if entry.generation != id.generation() {
                return None;
            }
            let record = entry.record.take()?;
            entry.generation = entry.generation.wrapping_add(1);
            record
        };
        self.free.push(id.index());
        self.live -= 1;

        match (record.prev, record.next) {
            (Some(prev), next) => {
                if let Some(p) = self.get_mut(prev) {
                    p.next = next;
                }
                if let Some(n) = next.and_then(|n| self.get_mut(n)) {
                    n.prev = Some(prev);
                }
            }
            (None, Some(next)) => {
                if let Some(n) = self.get_mut(next) {
                    n.prev = None;
                }
                self.relabel(next, next);
            }
            (None, None) => {}
        }
        Some(record)
    }

    /// Set (or clear) `head`'s chain successor.
    ///
    /// Returns the previous successor if it was unlinked; it becomes the
    /// root of its own chain.
    pub fn set_next(
        &mut self,
        head: UnitId,
        next: Option<UnitId>,
    ) -> Result<Option<UnitId>, SchedulerError> {
        let record = self.get(head).ok_or(SchedulerError::UnknownUnit(head))?;
        if record.next == next {
            return Ok(None);
        }
        let head_root = record.root;
        let old_next = record.next;

        if let Some(next) = next {
            let candidate = self.get(next).ok_or(SchedulerError::UnknownUnit(next))?;
            if candidate.root == head_root {
                return Err(SchedulerError::ChainCycle { head, next });
            }
            if let Some(predecessor) = candidate.prev {
                return Err(SchedulerError::AlreadyChained {
                    unit: next,
                    predecessor,
                });
            }
        }

        if let Some(old) = old_next {
            if let Some(o) = self.get_mut(old) {
                o.prev = None;
            }
            self.relabel(old, old);
        }
        if let Some(r) = self.get_mut(head) {
            r.next = next;
        }
        if let Some(next) = next {
            if let Some(n) = self.get_mut(next) {
                n.prev = Some(head);
            }
            self.relabel(next, head_root);
        }
        Ok(old_next)
    }

    /// Rewrite the root label from `start` to the end of its chain.
    fn relabel(&mut self, start: UnitId, root: UnitId) {
        let mut current = Some(start);
        let mut steps = 0;
        while let Some(id) = current {
            if steps > self.live {
                tracing::warn!(unit = %start, "chain relabel did not terminate; links corrupted");
                break;
            }
            steps += 1;
            match self.get_mut(id) {
                Some(r) => {
                    r.root = root;
                    current = r.next.filter(|n| *n != id);
                }
                None => break,
            }
        }
    }

    /// The units of the chain starting at `head`, in link order.
    ///
    /// Stops with a warning at a unit that is its own successor, at any
    /// revisited unit, or at a dangling link.
    pub fn resolve_chain(&self, head: UnitId) -> Chain {
        let Some(first) = self.get(head) else {
            return SmallVec::new();
        };
        let mut chain: Chain = smallvec![Arc::clone(&first.slot)];
        let mut current = first;
        while let Some(next) = current.next {
            if next == current.slot.id() {
                tracing::warn!(
                    unit = %next,
                    name = %current.slot.name(),
                    "unit is its own chain successor; chain truncated"
                );
                break;
            }
            if chain.iter().any(|s| s.id() == next) {
                tracing::warn!(head = %head, unit = %next, "chain cycle detected; chain truncated");
                break;
            }
            let Some(record) = self.get(next) else {
                tracing::warn!(head = %head, unit = %next, "chain links to a removed unit");
                break;
            };
            chain.push(Arc::clone(&record.slot));
            current = record;
        }
        chain
    }

    pub fn attach(&mut self, unit: UnitId, owner: OwnerId) -> Result<(), SchedulerError> {
        let record = self.get_mut(unit).ok_or(SchedulerError::UnknownUnit(unit))?;
        match record.owner {
            Some(existing) if existing != owner => {
                Err(SchedulerError::AlreadyAttached {
                    unit,
                    owner: existing,
                })
            }
            _ => {
                record.owner = Some(owner);
                Ok(())
            }
        }
    }

    pub fn detach(&mut self, unit: UnitId) -> Option<OwnerId> {
        self.get_mut(unit).and_then(|r| r.owner.take())
    }

    pub fn units_of(&self, owner: OwnerId) -> Vec<UnitId> {
        self.iter()
            .filter(|r| r.owner == Some(owner))
            .map(|r| r.slot.id())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UnitRecord> + '_ {
        self.entries.iter().filter_map(|e| e.record.as_ref())
    }

    /// Overwrite a successor link without validation.
    #[cfg(test)]
    pub fn force_next(&mut self, head: UnitId, next: Option<UnitId>) {
        if let Some(r) = self.get_mut(head) {
            r.next = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strobe_core::{ArmingCollection, ArmingCondition, Processor, ProcessorError, UnitFlags};

    struct Noop;

    impl Processor for Noop {
        fn name(&self) -> &str {
            "noop"
        }
        fn initialize(&mut self) -> Option<ArmingCondition> {
            None
        }
        fn compute(&mut self, _: &ArmingCollection) -> Result<(), ProcessorError> {
            Ok(())
        }
        fn commit(&mut self, _: &ArmingCollection) -> Result<(), ProcessorError> {
            Ok(())
        }
    }

    fn add(reg: &mut UnitRegistry) -> UnitId {
        reg.insert(|id| UnitSlot::new(id, UnitFlags::default(), Box::new(Noop)))
    }

    fn ids(chain: &Chain) -> Vec<UnitId> {
        chain.iter().map(|s| s.id()).collect()
    }

    #[test]
    fn stale_id_after_remove() {
        let mut reg = UnitRegistry::new();
        let a = add(&mut reg);
        assert!(reg.remove(a).is_some());
        let b = add(&mut reg);
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert!(reg.get(a).is_none());
        assert!(reg.get(b).is_some());
        assert!(reg.remove(a).is_none());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn link_and_resolve() {
        let mut reg = UnitRegistry::new();
        let a = add(&mut reg);
        let b = add(&mut reg);
        let c = add(&mut reg);
        reg.set_next(a, Some(b)).unwrap();
        reg.set_next(b, Some(c)).unwrap();
        assert_eq!(ids(&reg.resolve_chain(a)), vec![a, b, c]);
        assert_eq!(reg.root_of(c), Some(a));
        assert_eq!(reg.root_of(b), Some(a));
    }

    #[test]
    fn self_link_rejected() {
        let mut reg = UnitRegistry::new();
        let a = add(&mut reg);
        assert_eq!(
            reg.set_next(a, Some(a)),
            Err(SchedulerError::ChainCycle { head: a, next: a })
        );
    }

    #[test]
    fn cycle_rejected() {
        let mut reg = UnitRegistry::new();
        let a = add(&mut reg);
        let b = add(&mut reg);
        let c = add(&mut reg);
        reg.set_next(a, Some(b)).unwrap();
        reg.set_next(b, Some(c)).unwrap();
        assert_eq!(
            reg.set_next(c, Some(a)),
            Err(SchedulerError::ChainCycle { head: c, next: a })
        );
    }

    #[test]
    fn second_predecessor_rejected() {
        let mut reg = UnitRegistry::new();
        let a = add(&mut reg);
        let b = add(&mut reg);
        let c = add(&mut reg);
        reg.set_next(a, Some(c)).unwrap();
        assert_eq!(
            reg.set_next(b, Some(c)),
            Err(SchedulerError::AlreadyChained {
                unit: c,
                predecessor: a
            })
        );
    }

    #[test]
    fn relink_detaches_old_successor() {
        let mut reg = UnitRegistry::new();
        let a = add(&mut reg);
        let b = add(&mut reg);
        let c = add(&mut reg);
        reg.set_next(a, Some(b)).unwrap();
        assert_eq!(reg.set_next(a, Some(c)).unwrap(), Some(b));
        assert_eq!(reg.root_of(b), Some(b));
        assert_eq!(reg.root_of(c), Some(a));
        assert_eq!(reg.set_next(a, None).unwrap(), Some(c));
        assert_eq!(ids(&reg.resolve_chain(a)), vec![a]);
    }

    #[test]
    fn remove_splices_chain() {
        let mut reg = UnitRegistry::new();
        let a = add(&mut reg);
        let b = add(&mut reg);
        let c = add(&mut reg);
        reg.set_next(a, Some(b)).unwrap();
        reg.set_next(b, Some(c)).unwrap();
        reg.remove(b);
        assert_eq!(ids(&reg.resolve_chain(a)), vec![a, c]);
        reg.remove(a);
        assert_eq!(reg.root_of(c), Some(c));
        assert_eq!(ids(&reg.resolve_chain(c)), vec![c]);
    }

    #[test]
    fn corrupted_self_link_is_truncated() {
        let mut reg = UnitRegistry::new();
        let a = add(&mut reg);
        let b = add(&mut reg);
        reg.set_next(a, Some(b)).unwrap();
        reg.force_next(b, Some(b));
        assert_eq!(ids(&reg.resolve_chain(a)), vec![a, b]);
    }

    #[test]
    fn corrupted_cycle_is_truncated() {
        let mut reg = UnitRegistry::new();
        let a = add(&mut reg);
        let b = add(&mut reg);
        reg.set_next(a, Some(b)).unwrap();
        reg.force_next(b, Some(a));
        assert_eq!(ids(&reg.resolve_chain(a)), vec![a, b]);
    }

    #[test]
    fn owners() {
        let mut reg = UnitRegistry::new();
        let a = add(&mut reg);
        let b = add(&mut reg);
        let c = add(&mut reg);
        reg.attach(a, OwnerId(1)).unwrap();
        reg.attach(b, OwnerId(1)).unwrap();
        reg.attach(c, OwnerId(2)).unwrap();
        assert_eq!(
            reg.attach(a, OwnerId(2)),
            Err(SchedulerError::AlreadyAttached {
                unit: a,
                owner: OwnerId(1)
            })
        );
        assert_eq!(reg.units_of(OwnerId(1)), vec![a, b]);
        assert_eq!(reg.detach(c), Some(OwnerId(2)));
        assert!(reg.units_of(OwnerId(2)).is_empty());
    }
}
