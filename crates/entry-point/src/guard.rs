use crate::error::EntryPointError;
use parking_lot::Mutex;
use std::sync::Arc;

/// Non-reentrancy lock of the entry point.
///
/// Held for the whole duration of a batch or a simulation; entering again while it is held fails
/// with [`EntryPointError::ReentrancyDetected`].
#[derive(Clone, Debug, Default)]
pub struct ReentrancyGuard {
    entered: Arc<Mutex<bool>>,
}

/// Releases the [`ReentrancyGuard`] when dropped
#[derive(Debug)]
pub struct Entered {
    entered: Arc<Mutex<bool>>,
}

impl ReentrancyGuard {
    pub fn enter(&self) -> Result<Entered, EntryPointError> {
        let mut entered = self.entered.lock();
        if *entered {
            return Err(EntryPointError::ReentrancyDetected);
        }
        *entered = true;
        Ok(Entered { entered: self.entered.clone() })
    }

    pub fn is_entered(&self) -> bool {
        *self.entered.lock()
    }
}

impl Drop for Entered {
    fn drop(&mut self) {
        *self.entered.lock() = false;
    }
}
