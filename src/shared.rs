//! A thread-safe handle around one engine.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::warn;

use crate::{
    engine::{Direction, Outcome, PmbusEngine, RailTelemetry},
    error::Result,
    page::Page,
    transport::Transport,
};

/// Serializes access to one device session.
///
/// The lock is held for the whole command, so a page select and the data access that needs it
/// can never be split by another caller.
pub struct SharedEngine<T: Transport> {
    engine: Mutex<PmbusEngine<T>>,
}

impl<T: Transport> SharedEngine<T> {
    pub fn new(engine: PmbusEngine<T>) -> Self {
        Self {
            engine: Mutex::new(engine),
        }
    }

    /// Lock the session for a sequence of commands.
    ///
    /// A caller that panicked while holding the lock may have left the device on an
    /// unexpected page, so the page state is reset before the session is handed out again.
    pub fn lock(&self) -> MutexGuard<'_, PmbusEngine<T>> {
        self.engine.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
            warn!("engine lock poisoned, forgetting page state");
            let mut engine = poisoned.into_inner();
            engine.forget_page();
            self.engine.clear_poison();
            engine
        })
    }

    pub fn execute(
        &self,
        command: &str,
        page: Page,
        direction: Direction,
    ) -> Result<Outcome, T::Error> {
        self.lock().execute(command, page, direction)
    }

    pub fn telemetry(&self, page: Page) -> Result<RailTelemetry, T::Error> {
        self.lock().telemetry(page)
    }

    pub fn into_inner(self) -> PmbusEngine<T> {
        self.engine
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
