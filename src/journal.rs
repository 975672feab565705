//! LIFO journal of compensating actions for one orchestrated operation.
//!
//! Each protocol step that mutates state pushes a closure that undoes it.
//! On success the journal is discarded; on failure it unwinds in reverse
//! order. Unwind failures are collected and logged, never raised, so the
//! original error keeps its identity.

type UndoFn = Box<dyn FnOnce() -> anyhow::Result<()>>;

struct JournalEntry {
    label: String,
    undo: UndoFn,
}

/// The rollback stack owned by the orchestrator for one invocation.
#[derive(Default)]
pub struct RollbackJournal {
    entries: Vec<JournalEntry>,
}

impl RollbackJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a compensating action. `label` names the step for logs.
    pub fn push(
        &mut self,
        label: impl Into<String>,
        undo: impl FnOnce() -> anyhow::Result<()> + 'static,
    ) {
        self.entries.push(JournalEntry {
            label: label.into(),
            undo: Box::new(undo),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Success path: drop all compensations without running them.
    pub fn discard(mut self) {
        self.entries.clear();
    }

    /// Failure path: run compensations newest-first. Returns descriptions of
    /// the ones that failed.
    pub fn unwind(mut self) -> Vec<String> {
        let mut failures = Vec::new();
        while let Some(entry) = self.entries.pop() {
            log::debug!("rolling back: {}", entry.label);
            if let Err(e) = (entry.undo)() {
                let description = format!("{}: {e}", entry.label);
                log::error!("rollback step failed: {description}");
                failures.push(description);
            }
        }
        failures
    }
}

impl std::fmt::Debug for RollbackJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollbackJournal")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn unwind_runs_in_reverse_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut journal = RollbackJournal::new();
        for step in 1..=3 {
            let order = order.clone();
            journal.push(format!("step {step}"), move || {
                order.borrow_mut().push(step);
                Ok(())
            });
        }
        assert_eq!(journal.len(), 3);

        let failures = journal.unwind();
        assert!(failures.is_empty());
        assert_eq!(*order.borrow(), vec![3, 2, 1]);
    }

    #[test]
    fn discard_runs_nothing() {
        let ran = Rc::new(RefCell::new(false));
        let mut journal = RollbackJournal::new();
        let flag = ran.clone();
        journal.push("never", move || {
            *flag.borrow_mut() = true;
            Ok(())
        });

        journal.discard();
        assert!(!*ran.borrow());
    }

    #[test]
    fn unwind_collects_failures_and_keeps_going() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut journal = RollbackJournal::new();

        let o = order.clone();
        journal.push("first", move || {
            o.borrow_mut().push("first");
            Ok(())
        });
        journal.push("broken", || anyhow::bail!("undo exploded"));
        let o = order.clone();
        journal.push("last", move || {
            o.borrow_mut().push("last");
            Ok(())
        });

        let failures = journal.unwind();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("broken"));
        assert!(failures[0].contains("undo exploded"));
        // The failure did not stop earlier compensations from running
        assert_eq!(*order.borrow(), vec!["last", "first"]);
    }

    #[test]
    fn new_journal_is_empty() {
        assert!(RollbackJournal::new().is_empty());
    }
}
