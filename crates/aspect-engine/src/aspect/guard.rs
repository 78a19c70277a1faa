//! Mutual exclusion for registration and redirection

use parking_lot::Mutex;

/// Lock owning the state it protects
///
/// Every registration, redirection and removal runs inside
/// [`Guard::perform_locked`], so they are totally ordered. Call-time
/// dispatch never takes this lock.
pub struct Guard<T> {
    state: Mutex<T>,
}

impl<T> Guard<T> {
    /// Wrap `state`
    pub fn new(state: T) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Run `f` with exclusive access to the state
    pub fn perform_locked<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut state = self.state.lock();
        f(&mut state)
    }
}

impl<T: Default> Default for Guard<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
