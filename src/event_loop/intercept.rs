//! Interception of faults raised inside deferred work.
//!
//! A fault escaping a job has no caller to return to. The loop hands it to
//! the innermost installed interceptor instead. Interceptors form a stack:
//! installing one shadows the previous one, and uninstalling restores it,
//! whichever order the handles are released in.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Fault;

/// Callback receiving an intercepted fault.
pub type Interceptor = Arc<dyn Fn(Fault) + Send + Sync>;

/// Identifier of an installed interceptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InterceptId(u64);

impl fmt::Display for InterceptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Intercept({})", self.0)
    }
}

#[derive(Default)]
pub(crate) struct InterceptStack {
    entries: Mutex<Vec<(InterceptId, Interceptor)>>,
    next_id: AtomicU64,
}

impl InterceptStack {
    pub fn push(&self, interceptor: Interceptor) -> InterceptId {
        let id = InterceptId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push((id, interceptor));
        tracing::trace!(intercept = %id, "intercept.install");
        id
    }

    /// Removes the entry wherever it sits, leaving the rest in order.
    pub fn remove(&self, id: InterceptId) -> bool {
        let mut entries = self.entries.lock();
        match entries.iter().position(|(entry, _)| *entry == id) {
            Some(pos) => {
                entries.remove(pos);
                tracing::trace!(intercept = %id, "intercept.uninstall");
                true
            }
            None => false,
        }
    }

    /// The innermost interceptor, cloned out so it can run without the lock.
    pub fn innermost(&self) -> Option<Interceptor> {
        self.entries.lock().last().map(|(_, i)| Arc::clone(i))
    }

    pub fn depth(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Handle to an installed interceptor.
///
/// Uninstalling is idempotent, and dropping the handle uninstalls it. The
/// interceptor may uninstall its own handle while it is running.
pub struct InterceptHandle {
    id: InterceptId,
    stack: Arc<InterceptStack>,
    installed: AtomicBool,
}

impl InterceptHandle {
    pub(crate) fn new(id: InterceptId, stack: Arc<InterceptStack>) -> Self {
        Self {
            id,
            stack,
            installed: AtomicBool::new(true),
        }
    }

    /// The interceptor's ID.
    #[must_use]
    pub fn id(&self) -> InterceptId {
        self.id
    }

    /// Returns `true` until the handle has been uninstalled.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    /// Removes the interceptor, restoring whichever one it shadowed.
    ///
    /// Returns `false` if it was already uninstalled.
    pub fn uninstall(&self) -> bool {
        if self.installed.swap(false, Ordering::AcqRel) {
            self.stack.remove(self.id)
        } else {
            false
        }
    }
}

impl Drop for InterceptHandle {
    fn drop(&mut self) {
        self.uninstall();
    }
}

impl fmt::Debug for InterceptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptHandle")
            .field("id", &self.id)
            .field("installed", &self.is_installed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting(counter: &Arc<AtomicUsize>) -> Interceptor {
        let counter = Arc::clone(counter);
        Arc::new(move |_: Fault| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_innermost_wins() {
        let stack = Arc::new(InterceptStack::default());
        let outer = Arc::new(AtomicUsize::new(0));
        let inner = Arc::new(AtomicUsize::new(0));

        let _outer = InterceptHandle::new(stack.push(counting(&outer)), Arc::clone(&stack));
        let _inner = InterceptHandle::new(stack.push(counting(&inner)), Arc::clone(&stack));

        (stack.innermost().unwrap())(Fault::new("x"));
        assert_eq!(inner.load(Ordering::SeqCst), 1);
        assert_eq!(outer.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_uninstall_restores_previous() {
        let stack = Arc::new(InterceptStack::default());
        let outer = Arc::new(AtomicUsize::new(0));
        let inner = Arc::new(AtomicUsize::new(0));

        let _outer = InterceptHandle::new(stack.push(counting(&outer)), Arc::clone(&stack));
        let inner_handle = InterceptHandle::new(stack.push(counting(&inner)), Arc::clone(&stack));

        assert!(inner_handle.uninstall());
        (stack.innermost().unwrap())(Fault::new("x"));
        assert_eq!(outer.load(Ordering::SeqCst), 1);
        assert_eq!(inner.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_out_of_order_uninstall_keeps_inner() {
        let stack = Arc::new(InterceptStack::default());
        let outer = Arc::new(AtomicUsize::new(0));
        let inner = Arc::new(AtomicUsize::new(0));

        let outer_handle = InterceptHandle::new(stack.push(counting(&outer)), Arc::clone(&stack));
        let _inner = InterceptHandle::new(stack.push(counting(&inner)), Arc::clone(&stack));

        outer_handle.uninstall();
        assert_eq!(stack.depth(), 1);
        (stack.innermost().unwrap())(Fault::new("x"));
        assert_eq!(inner.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_uninstall_is_idempotent() {
        let stack = Arc::new(InterceptStack::default());
        let handle = InterceptHandle::new(stack.push(Arc::new(|_: Fault| {})), Arc::clone(&stack));

        assert!(handle.uninstall());
        assert!(!handle.uninstall());
        assert!(!handle.is_installed());
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn test_drop_uninstalls() {
        let stack = Arc::new(InterceptStack::default());
        {
            let _handle = InterceptHandle::new(stack.push(Arc::new(|_: Fault| {})), Arc::clone(&stack));
            assert_eq!(stack.depth(), 1);
        }
        assert_eq!(stack.depth(), 0);
    }
}
