//! Flush triggers for host application lifecycle events.
//!
//! A host (game loop, desktop shell, service supervisor) calls these from its
//! own focus-change and shutdown callbacks. They block until every write has
//! landed, so they must run on a plain thread and not inside an async task.

use tracing::{error, info};

use crate::codec::{Codec, JsonCodec};
use crate::error::Result;
use crate::manager::DataManager;

/// Lifecycle callbacks bound to one [`DataManager`].
pub struct LifecycleHooks<C: Codec = JsonCodec> {
    manager: DataManager<C>,
}

impl<C: Codec> Clone for LifecycleHooks<C> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
        }
    }
}

impl<C: Codec> LifecycleHooks<C> {
    pub(crate) fn new(manager: DataManager<C>) -> Self {
        Self { manager }
    }

    /// Called when the application gains or loses focus.
    ///
    /// Losing focus flushes all dirty records and waits for them; the process
    /// may be suspended or killed without further notice. Gaining focus does
    /// nothing. Returns the number of records written.
    pub fn focus_changed(&self, focused: bool) -> Result<usize> {
        if focused {
            return Ok(0);
        }
        self.flush("focus lost")
    }

    /// Called once when the application is about to exit.
    pub fn quitting(&self) -> Result<usize> {
        self.flush("quitting")
    }

    fn flush(&self, reason: &str) -> Result<usize> {
        info!("Flushing save data ({})", reason);
        match self.manager.flush_all_blocking() {
            Ok(written) => {
                info!("Flushed {} record(s) ({})", written, reason);
                Ok(written)
            }
            Err(e) => {
                error!("Flush on {} failed: {}", reason, e);
                Err(e)
            }
        }
    }
}
