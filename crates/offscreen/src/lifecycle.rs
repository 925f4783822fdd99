/// Two-state lazy initialisation: `Uninitialized` becomes either `Ready` or
/// `Inert`, and never changes again.
///
/// Single-threaded by contract; the initialiser must not re-enter the value.
#[derive(Debug)]
pub(crate) enum Lifecycle<T> {
    Uninitialized,
    Ready(T),
    Inert,
}

impl<T> Default for Lifecycle<T> {
    fn default() -> Self {
        Self::Uninitialized
    }
}

impl<T> Lifecycle<T> {
    /// Runs `init` on first call; later calls return the cached outcome.
    pub fn ensure_ready(&mut self, init: impl FnOnce() -> Option<T>) -> Option<&mut T> {
        if matches!(self, Self::Uninitialized) {
            *self = match init() {
                Some(value) => Self::Ready(value),
                None => Self::Inert,
            };
        }
        self.get_mut()
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_inert(&self) -> bool {
        matches!(self, Self::Inert)
    }

    /// Moves the ready value out, leaving the slot uninitialised.
    pub fn take(&mut self) -> Option<T> {
        match std::mem::take(self) {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }
}
