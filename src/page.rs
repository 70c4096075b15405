//! Page (rail) selection.
//!
//! Two rails share one bus address; the `PAGE` register decides which rail a paged command
//! talks to. [`PagePolicy`] is the only thing in the crate that knows which page is active.

use strum_macros::{Display, EnumIter};
use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    register::{PAGE, Width},
    transport::Transport,
};

/// One of the two rails of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[repr(u8)]
pub enum Page {
    #[strum(to_string = "rail 0")]
    Rail0 = 0,
    #[strum(to_string = "rail 1")]
    Rail1 = 1,
}

impl Page {
    /// The value written to the `PAGE` register.
    pub const fn register_value(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u16> for Page {
    type Error = u16;
    fn try_from(value: u16) -> core::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Page::Rail0),
            1 => Ok(Page::Rail1),
            other => Err(other),
        }
    }
}

impl From<Page> for u8 {
    fn from(value: Page) -> Self {
        value.register_value()
    }
}

/// What the session knows about the device's `PAGE` register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageState {
    /// Nothing selected yet, or the last selection may not have taken effect.
    #[default]
    Unknown,
    Selected(Page),
}

/// Tracks the active page and selects a new one only when it changes.
#[derive(Debug, Default)]
pub struct PagePolicy {
    state: PageState,
    selects: u32,
}

impl PagePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    /// Number of `PAGE` writes issued so far.
    pub fn select_count(&self) -> u32 {
        self.selects
    }

    /// Make `page` the active page, writing `PAGE` unless it already is.
    ///
    /// If the write fails the state becomes [`PageState::Unknown`] and the error is returned.
    pub fn ensure<T: Transport>(&mut self, page: Page, transport: &mut T) -> Result<(), T::Error> {
        if self.state == PageState::Selected(page) {
            return Ok(());
        }
        self.state = PageState::Unknown;
        match transport.write_raw(PAGE.address, &[page.register_value()], Width::Byte) {
            Ok(()) => {
                self.state = PageState::Selected(page);
                self.selects += 1;
                debug!(%page, "page selected");
                Ok(())
            }
            Err(err) => {
                warn!(%page, kind = ?embedded_io::Error::kind(&err), "page select failed");
                Err(Error::Transport(err))
            }
        }
    }

    /// Forget the active page so the next paged access selects again.
    pub fn invalidate(&mut self) {
        if self.state != PageState::Unknown {
            debug!("page state invalidated");
        }
        self.state = PageState::Unknown;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_transport::{MockError, MockTransport};
    use strum::IntoEnumIterator;

    #[test]
    fn test_alternating_pages_select_three_times() {
        let mut transport = MockTransport::new();
        let mut policy = PagePolicy::new();
        for page in [Page::Rail0, Page::Rail1, Page::Rail0] {
            policy.ensure(page, &mut transport).unwrap();
        }
        assert_eq!(policy.select_count(), 3);
        assert_eq!(transport.page_selects(), [0, 1, 0]);
    }

    #[test]
    fn test_repeated_page_selects_once() {
        let mut transport = MockTransport::new();
        let mut policy = PagePolicy::new();
        for _ in 0..4 {
            policy.ensure(Page::Rail1, &mut transport).unwrap();
        }
        assert_eq!(policy.select_count(), 1);
        assert_eq!(policy.state(), PageState::Selected(Page::Rail1));
    }

    #[test]
    fn test_failed_select_resets_state() {
        let mut transport = MockTransport::new();
        let mut policy = PagePolicy::new();
        policy.ensure(Page::Rail0, &mut transport).unwrap();

        transport.set_write_error(true);
        let result = policy.ensure(Page::Rail1, &mut transport);
        assert!(matches!(result, Err(Error::Transport(MockError::Nack))));
        assert_eq!(policy.state(), PageState::Unknown);

        // Rail 0 must be selected again; the old selection is no longer trusted.
        transport.set_write_error(false);
        policy.ensure(Page::Rail0, &mut transport).unwrap();
        assert_eq!(transport.page_selects(), [0, 0]);
    }

    #[test]
    fn test_invalidate() {
        let mut transport = MockTransport::new();
        let mut policy = PagePolicy::new();
        policy.ensure(Page::Rail0, &mut transport).unwrap();
        policy.invalidate();
        policy.ensure(Page::Rail0, &mut transport).unwrap();
        assert_eq!(policy.select_count(), 2);
    }

    #[test]
    fn test_page_values() {
        let values: Vec<u8> = Page::iter().map(u8::from).collect();
        assert_eq!(values, [0, 1]);
        assert_eq!(Page::try_from(1), Ok(Page::Rail1));
        assert_eq!(Page::try_from(2), Err(2));
        assert_eq!(Page::Rail0.to_string(), "rail 0");
    }
}
