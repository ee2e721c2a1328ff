//! The alias graph and distributed reference-count GC of spec.md §3, §4.1.2,
//! §4.1.3. A pure data structure: it never performs I/O and never decides what
//! the scheduler should tell an object store. Retirement is surfaced as
//! [`RetireEffect`]s for the caller (`Scheduler`) to act on after releasing its
//! lock, per the §5 concurrency model.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{Result, RuntimeError};
use crate::ids::{ObjRefId, ObjStoreId};

/// One node of the alias graph. Out-degree <= 1 (spec.md §4.1.2): `target == id`
/// means this node is its own canonical; anything else is an alias.
#[derive(Debug, Clone)]
struct ObjRefNode {
    target: ObjRefId,
    /// Empty on non-canonical nodes (I2).
    locations: HashSet<ObjStoreId>,
    /// `None` until the producing worker reports it; immutable once set (I5).
    /// Empty on non-canonical nodes (I2).
    contained: Option<Vec<ObjRefId>>,
    refcount: u64,
    ready: bool,
    retired: bool,
}

impl ObjRefNode {
    fn fresh(id: ObjRefId, refcount: u64) -> Self {
        Self {
            target: id,
            locations: HashSet::new(),
            contained: None,
            refcount,
            ready: false,
            retired: false,
        }
    }
}

/// A canonical ref whose refcount reached zero while ready: every store in
/// `locations` must be sent `DeallocateObject(canonical)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetireEffect {
    pub canonical: ObjRefId,
    pub locations: Vec<ObjStoreId>,
}

/// Outcome of marking a ref ready: whether this was a fresh transition (so the
/// scheduler should run a matching pass) and any retirements it triggered
/// (spec.md §4.1.3: "a count of zero on a not-yet-ready ref is held ... until
/// readiness").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyOutcome {
    pub canonical: ObjRefId,
    pub newly_ready: bool,
    pub retired: Vec<RetireEffect>,
}

#[derive(Default)]
pub struct ObjRefTable {
    nodes: HashMap<ObjRefId, ObjRefNode>,
}

impl ObjRefTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh canonical ref (P6: distinct, previously-unused).
    pub fn alloc(&mut self, id: ObjRefId, initial_refcount: u64) -> ObjRefId {
        self.nodes.insert(id, ObjRefNode::fresh(id, initial_refcount));
        id
    }

    fn node(&self, id: ObjRefId) -> Result<&ObjRefNode> {
        self.nodes.get(&id).ok_or(RuntimeError::UnknownObjRef(id))
    }

    /// Resolves `r` to its canonical ref, applying path compression along the
    /// way (P1). Errors if the canonical has already been retired (P4).
    pub fn canonical_of(&mut self, r: ObjRefId) -> Result<ObjRefId> {
        let mut cur = r;
        let mut path = Vec::new();
        loop {
            let node = self.node(cur)?;
            if node.target == cur {
                break;
            }
            path.push(cur);
            cur = node.target;
        }
        for id in path {
            self.nodes.get_mut(&id).unwrap().target = cur;
        }
        if self.nodes[&cur].retired {
            return Err(RuntimeError::RetiredObjRef(cur));
        }
        Ok(cur)
    }

    /// Like `canonical_of` but tolerant of a retired terminus; used only for
    /// internal GC cascades, where the chain may legitimately have just been
    /// retired by an earlier step of the same cascade.
    fn resolve_raw(&mut self, r: ObjRefId) -> Option<ObjRefId> {
        let mut cur = r;
        let mut path = Vec::new();
        loop {
            let node = self.nodes.get(&cur)?;
            if node.target == cur {
                break;
            }
            path.push(cur);
            cur = node.target;
        }
        for id in path {
            self.nodes.get_mut(&id).unwrap().target = cur;
        }
        Some(cur)
    }

    pub fn is_ready(&mut self, r: ObjRefId) -> Result<bool> {
        let c = self.canonical_of(r)?;
        Ok(self.nodes[&c].ready)
    }

    pub fn locations(&mut self, r: ObjRefId) -> Result<Vec<ObjStoreId>> {
        let c = self.canonical_of(r)?;
        Ok(self.nodes[&c].locations.iter().copied().collect())
    }

    pub fn is_retired(&self, r: ObjRefId) -> bool {
        self.nodes.get(&r).map(|n| n.retired).unwrap_or(false)
    }

    /// spec.md §4.1.2: records `alias -> target`, resolving `target` to its
    /// current canonical and rejecting cycles. Reference counts, locations and
    /// contained refs accumulated on `alias` (it may have been canonical until
    /// now) are folded into the canonical (§9 Open Question: union semantics).
    /// Re-aliasing to the same effective canonical is a no-op (§8).
    pub fn alias(&mut self, alias: ObjRefId, target: ObjRefId) -> Result<ObjRefId> {
        self.node(alias)?;
        self.node(target)?;
        let resolved = self.canonical_of(target)?;
        if resolved == alias {
            return Err(RuntimeError::AliasCycle {
                alias,
                target,
                through: resolved,
            });
        }
        if self.nodes[&alias].retired {
            return Err(RuntimeError::RetiredObjRef(alias));
        }

        let (refcount, locations, contained, ready) = {
            let node = self.nodes.get_mut(&alias).unwrap();
            (
                std::mem::take(&mut node.refcount),
                std::mem::take(&mut node.locations),
                node.contained.take(),
                node.ready,
            )
        };
        self.nodes.get_mut(&alias).unwrap().target = resolved;

        let canonical = self.nodes.get_mut(&resolved).unwrap();
        canonical.refcount += refcount;
        canonical.locations.extend(locations);
        if canonical.contained.is_none() {
            canonical.contained = contained;
        }
        canonical.ready |= ready;
        Ok(resolved)
    }

    /// spec.md's `ObjReady`: marks the canonical of `r` ready and adds `store`
    /// to its locations.
    pub fn mark_ready(&mut self, r: ObjRefId, store: ObjStoreId) -> Result<ReadyOutcome> {
        let c = self.canonical_of(r)?;
        let node = self.nodes.get_mut(&c).unwrap();
        let newly_ready = !node.ready;
        node.ready = true;
        node.locations.insert(store);

        let mut retired = Vec::new();
        if newly_ready && node.refcount == 0 {
            retired.extend(self.retire(c));
        }
        Ok(ReadyOutcome {
            canonical: c,
            newly_ready,
            retired,
        })
    }

    pub fn increment(&mut self, refs: &[ObjRefId]) -> Result<()> {
        for &r in refs {
            let c = self.canonical_of(r)?;
            self.nodes.get_mut(&c).unwrap().refcount += 1;
        }
        Ok(())
    }

    /// Decrements the refcount of each ref's canonical by one per occurrence
    /// (duplicates act per occurrence, spec.md §4.1). Returns every canonical
    /// this call (directly, or via cascade through `contained`) retired.
    pub fn decrement(&mut self, refs: &[ObjRefId]) -> Result<Vec<RetireEffect>> {
        let mut effects = Vec::new();
        for &r in refs {
            let c = self.canonical_of(r)?;
            let node = self.nodes.get_mut(&c).unwrap();
            assert!(
                node.refcount > 0,
                "refcount underflow on {c}: P3 accounting invariant violated"
            );
            node.refcount -= 1;
            if node.refcount == 0 && node.ready {
                effects.extend(self.retire(c));
            }
        }
        Ok(effects)
    }

    /// spec.md's `AddContainedObjRefs`: records nesting (I5: set at most once)
    /// and increments each contained ref's refcount by one on the container's
    /// behalf.
    pub fn add_contained(&mut self, container: ObjRefId, contained: Vec<ObjRefId>) -> Result<()> {
        let c = self.canonical_of(container)?;
        {
            let node = self.nodes.get_mut(&c).unwrap();
            assert!(
                node.contained.is_none(),
                "contained set twice on {c}: I5 violated"
            );
            node.contained = Some(contained.clone());
        }
        self.increment(&contained)
    }

    /// Retires `start` (caller has already established refcount == 0 && ready)
    /// and cascades into its contained refs, each decremented by one and
    /// possibly retiring in turn.
    fn retire(&mut self, start: ObjRefId) -> Vec<RetireEffect> {
        let mut effects = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);

        while let Some(c) = queue.pop_front() {
            let already_retired = match self.nodes.get(&c) {
                Some(n) => n.retired,
                None => continue,
            };
            if already_retired {
                continue;
            }
            let (locations, contained) = {
                let node = self.nodes.get_mut(&c).unwrap();
                node.retired = true;
                (
                    node.locations.drain().collect::<Vec<_>>(),
                    node.contained.take().unwrap_or_default(),
                )
            };
            effects.push(RetireEffect {
                canonical: c,
                locations,
            });

            for cont in contained {
                let Some(cc) = self.resolve_raw(cont) else {
                    continue;
                };
                if let Some(node) = self.nodes.get_mut(&cc) {
                    if node.retired {
                        continue;
                    }
                    assert!(
                        node.refcount > 0,
                        "refcount underflow on {cc} during containment cascade: P3 violated"
                    );
                    node.refcount -= 1;
                    if node.refcount == 0 && node.ready {
                        queue.push_back(cc);
                    }
                }
            }
        }
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(ids: &[(u64, u64)]) -> ObjRefTable {
        let mut t = ObjRefTable::new();
        for &(id, refcount) in ids {
            t.alloc(ObjRefId(id), refcount);
        }
        t
    }

    #[test]
    fn canonical_of_is_idempotent() {
        let mut t = table_with(&[(1, 1)]);
        let c1 = t.canonical_of(ObjRefId(1)).unwrap();
        let c2 = t.canonical_of(c1).unwrap();
        assert_eq!(c1, c2);
    }

    #[test]
    fn alias_resolves_transitively_and_compresses() {
        let mut t = table_with(&[(1, 1), (2, 1), (3, 1)]);
        t.alias(ObjRefId(2), ObjRefId(3)).unwrap();
        t.alias(ObjRefId(1), ObjRefId(2)).unwrap();
        assert_eq!(t.canonical_of(ObjRefId(1)).unwrap(), ObjRefId(3));
        assert_eq!(t.canonical_of(ObjRefId(2)).unwrap(), ObjRefId(3));
    }

    #[test]
    fn alias_merges_refcount_and_is_idempotent() {
        let mut t = table_with(&[(1, 2), (2, 1)]);
        t.alias(ObjRefId(1), ObjRefId(2)).unwrap();
        // alias's 2 holds moved onto the canonical's 1 -> 3 total.
        t.increment(&[ObjRefId(2)]).unwrap();
        let effects = t.decrement(&[ObjRefId(1), ObjRefId(1), ObjRefId(2), ObjRefId(2)]).unwrap();
        assert!(effects.is_empty()); // not ready yet
        // repeat AliasObjRefs(1, 2) — must be a no-op, not an error.
        t.alias(ObjRefId(1), ObjRefId(2)).unwrap();
    }

    #[test]
    fn self_alias_cycle_is_rejected() {
        let mut t = table_with(&[(1, 1)]);
        let err = t.alias(ObjRefId(1), ObjRefId(1)).unwrap_err();
        assert!(matches!(err, RuntimeError::AliasCycle { .. }));
    }

    #[test]
    fn indirect_cycle_is_rejected() {
        let mut t = table_with(&[(1, 1), (2, 1)]);
        t.alias(ObjRefId(2), ObjRefId(1)).unwrap(); // 2 -> 1
        let err = t.alias(ObjRefId(1), ObjRefId(2)).unwrap_err(); // 1 -> canonical(2) == 1
        assert!(matches!(err, RuntimeError::AliasCycle { .. }));
    }

    #[test]
    fn zero_refcount_defers_until_ready() {
        let mut t = table_with(&[(1, 1)]);
        let effects = t.decrement(&[ObjRefId(1)]).unwrap();
        assert!(effects.is_empty(), "not ready yet, deallocation deferred");
        assert!(!t.is_retired(ObjRefId(1)));

        let outcome = t.mark_ready(ObjRefId(1), ObjStoreId(1)).unwrap();
        assert_eq!(outcome.retired.len(), 1);
        assert!(t.is_retired(ObjRefId(1)));
    }

    #[test]
    fn gc_cascade_through_containment() {
        let mut t = table_with(&[(10, 1), (11, 0), (12, 0)]);
        for id in [10, 11, 12] {
            t.mark_ready(ObjRefId(id), ObjStoreId(1)).unwrap();
        }
        t.add_contained(ObjRefId(10), vec![ObjRefId(11), ObjRefId(12)])
            .unwrap();
        assert!(!t.is_retired(ObjRefId(11)));

        let effects = t.decrement(&[ObjRefId(10)]).unwrap();
        let retired: Vec<_> = effects.iter().map(|e| e.canonical).collect();
        assert!(retired.contains(&ObjRefId(10)));
        assert!(retired.contains(&ObjRefId(11)));
        assert!(retired.contains(&ObjRefId(12)));
    }

    #[test]
    fn retired_ref_rejects_further_operations() {
        let mut t = table_with(&[(1, 1)]);
        t.mark_ready(ObjRefId(1), ObjStoreId(1)).unwrap();
        t.decrement(&[ObjRefId(1)]).unwrap();
        assert!(t.is_retired(ObjRefId(1)));
        let err = t.increment(&[ObjRefId(1)]).unwrap_err();
        assert!(matches!(err, RuntimeError::RetiredObjRef(_)));
    }
}
