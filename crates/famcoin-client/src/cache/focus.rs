//! Screen focus refetch.

use tracing::debug;

/// Something that can be refreshed when its screen regains focus.
pub trait Refetch {
    /// Start a background refetch if stale. Returns whether one started.
    fn refetch_if_stale(&self) -> bool;
}

/// Focus tracker for one screen.
///
/// The first focus is the initial mount and does nothing, since mounting
/// already fetched. Every later focus refetches the screen's stale queries;
/// queries still inside their freshness window are left alone.
#[derive(Debug, Default)]
pub struct ScreenFocus {
    focused_once: bool,
}

impl ScreenFocus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of refetches started.
    pub fn on_focus(&mut self, queries: &[&dyn Refetch]) -> usize {
        if !self.focused_once {
            self.focused_once = true;
            return 0;
        }
        let started = queries.iter().filter(|q| q.refetch_if_stale()).count();
        debug!(queries = queries.len(), started, "screen refocused");
        started
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Fake {
        stale: bool,
        calls: Cell<u32>,
    }

    impl Refetch for Fake {
        fn refetch_if_stale(&self) -> bool {
            self.calls.set(self.calls.get() + 1);
            self.stale
        }
    }

    #[test]
    fn test_first_focus_is_ignored() {
        let q = Fake { stale: true, calls: Cell::new(0) };
        let mut focus = ScreenFocus::new();

        assert_eq!(focus.on_focus(&[&q]), 0);
        assert_eq!(q.calls.get(), 0);
        assert_eq!(focus.on_focus(&[&q]), 1);
    }

    #[test]
    fn test_only_stale_queries_count() {
        let fresh = Fake { stale: false, calls: Cell::new(0) };
        let stale = Fake { stale: true, calls: Cell::new(0) };
        let mut focus = ScreenFocus::new();
        focus.on_focus(&[]);

        assert_eq!(focus.on_focus(&[&fresh, &stale]), 1);
        assert_eq!(fresh.calls.get(), 1);
    }
}
