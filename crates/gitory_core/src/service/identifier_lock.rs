//! In-process, identifier-scoped mutual exclusion.

use crate::model::repository::RepositoryIdentifier;
use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard};

/// Set of identifiers with a lifecycle operation in flight.
///
/// Callers on the same identifier wait for each other; distinct identifiers
/// never contend beyond the short bookkeeping critical section.
#[derive(Debug, Default)]
pub struct IdentifierLocks {
    busy: Mutex<HashSet<RepositoryIdentifier>>,
    released: Condvar,
}

/// Exclusive claim on one identifier, released on drop.
#[derive(Debug)]
pub struct IdentifierGuard<'a> {
    locks: &'a IdentifierLocks,
    identifier: RepositoryIdentifier,
}

impl IdentifierLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until `identifier` is free, then claims it.
    pub fn lock(&self, identifier: &RepositoryIdentifier) -> IdentifierGuard<'_> {
        let mut busy = self.busy_set();
        while busy.contains(identifier) {
            busy = self
                .released
                .wait(busy)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        busy.insert(identifier.clone());

        IdentifierGuard {
            locks: self,
            identifier: identifier.clone(),
        }
    }

    fn busy_set(&self) -> MutexGuard<'_, HashSet<RepositoryIdentifier>> {
        self.busy
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for IdentifierGuard<'_> {
    fn drop(&mut self) {
        self.locks.busy_set().remove(&self.identifier);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::IdentifierLocks;
    use crate::model::repository::RepositoryIdentifier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn guard_release_frees_identifier() {
        let locks = IdentifierLocks::new();
        let id = RepositoryIdentifier::parse("proj-a").unwrap();

        let guard = locks.lock(&id);
        assert!(locks.busy_set().contains(&id));
        drop(guard);
        assert!(locks.busy_set().is_empty());
        let _again = locks.lock(&id);
    }

    #[test]
    fn same_identifier_is_serialized() {
        let locks = Arc::new(IdentifierLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));
        let id = RepositoryIdentifier::parse("proj-a").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                let id = id.clone();
                thread::spawn(move || {
                    let _guard = locks.lock(&id);
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn distinct_identifiers_do_not_block() {
        let locks = IdentifierLocks::new();
        let a = RepositoryIdentifier::parse("proj-a").unwrap();
        let b = RepositoryIdentifier::parse("proj-b").unwrap();

        let _a = locks.lock(&a);
        let _b = locks.lock(&b);
        assert_eq!(locks.busy_set().len(), 2);
    }
}
