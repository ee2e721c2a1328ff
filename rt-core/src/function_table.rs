//! spec.md §3 "Function table": `function_name -> {eligible worker set, arity}`.

use std::collections::{BTreeSet, HashMap};

use crate::error::{Result, RuntimeError};
use crate::ids::WorkerId;

#[derive(Debug, Clone)]
pub struct FunctionEntry {
    pub arity: u32,
    pub eligible_workers: BTreeSet<WorkerId>,
}

#[derive(Default)]
pub struct FunctionTable {
    functions: HashMap<String, FunctionEntry>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&FunctionEntry> {
        self.functions.get(name)
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// spec.md's `RegisterFunction`: adds `worker` to `name`'s eligible set. The
    /// first registration fixes the arity; later registrations must agree.
    pub fn register(&mut self, worker: WorkerId, name: &str, arity: u32) -> Result<()> {
        match self.functions.get_mut(name) {
            Some(entry) => {
                if entry.arity != arity {
                    return Err(RuntimeError::ArityMismatch {
                        name: name.to_string(),
                        existing: entry.arity,
                        attempted: arity,
                        worker,
                    });
                }
                entry.eligible_workers.insert(worker);
            }
            None => {
                let mut eligible_workers = BTreeSet::new();
                eligible_workers.insert(worker);
                self.functions
                    .insert(name.to_string(), FunctionEntry { arity, eligible_workers });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_registration_fixes_arity() {
        let mut t = FunctionTable::new();
        t.register(WorkerId(1), "id", 1).unwrap();
        assert_eq!(t.get("id").unwrap().arity, 1);
        assert!(t.get("id").unwrap().eligible_workers.contains(&WorkerId(1)));
    }

    #[test]
    fn conflicting_arity_is_rejected() {
        let mut t = FunctionTable::new();
        t.register(WorkerId(1), "id", 1).unwrap();
        let err = t.register(WorkerId(2), "id", 2).unwrap_err();
        assert!(matches!(err, RuntimeError::ArityMismatch { .. }));
        // the offending worker must not be added to the eligible set
        assert!(!t.get("id").unwrap().eligible_workers.contains(&WorkerId(2)));
    }

    #[test]
    fn unknown_function_reports_not_known() {
        let t = FunctionTable::new();
        assert!(!t.is_known("bogus"));
    }
}
