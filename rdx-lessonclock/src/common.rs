//! Contains common, primitive types shared across the crate.
//!
//! Node identifiers for the host document live here, together with the
//! shared `Action` closure type used by behaviors and schedules.

use slotmap::new_key_type;
use std::sync::{Arc, Mutex, MutexGuard};

new_key_type! {
    /// Uniquely and safely identifies an element within a `Document`.
    ///
    /// Keys are never reused, so a handle to a removed element simply stops
    /// resolving instead of pointing at an unrelated node.
    pub struct NodeId;
}

/// A zero-argument, side-effecting closure that can be shared with a
/// scheduler task and invoked any number of times.
pub type Action = Arc<dyn Fn() + Send + Sync>;

/// Locks a mutex, recovering the inner value if a previous holder panicked.
///
/// Timer state is presentation-only, so a poisoned lock is never worth
/// taking the host down for. Hosts sharing the page document should lock it
/// through this too.
pub fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Recovering from a poisoned lock.");
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_poisoned_lock_still_yields_its_value() {
        let shared = Arc::new(Mutex::new(vec![1]));
        let holder = shared.clone();
        let _ = std::thread::spawn(move || {
            let mut guard = holder.lock().unwrap();
            guard.push(2);
            panic!("holder panicked");
        })
        .join();
        assert!(shared.is_poisoned());

        let mut guard = lock_or_recover(&shared);
        guard.push(3);
        assert_eq!(*guard, [1, 2, 3]);
    }
}
