//! Per-render scope bookkeeping.
//!
//! Variables themselves live in the handlebars render context: the root
//! frame is the render's data context and each `repeat` iteration pushes a
//! block frame. This module only tracks what the render context cannot tell
//! a helper: whether it runs at the root frame, and the state of the
//! enclosing `switch` blocks.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// State shared by the `case` and `default` children of one `switch` block.
#[derive(Debug)]
struct SwitchContext {
    value: String,
    found: bool,
}

/// Scope state for a single render.
#[derive(Debug, Default)]
pub struct RenderScope {
    depth: AtomicUsize,
    switches: Mutex<Vec<SwitchContext>>,
}

impl RenderScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether helpers currently run at the root frame.
    pub fn is_root(&self) -> bool {
        self.depth.load(Ordering::Relaxed) == 0
    }

    /// Enter a block frame; the frame is left when the guard drops.
    pub fn enter_block(&self) -> BlockGuard<'_> {
        self.depth.fetch_add(1, Ordering::Relaxed);
        BlockGuard { scope: self }
    }

    /// Open a `switch` block over `value`; closed when the guard drops.
    pub fn enter_switch(&self, value: String) -> SwitchGuard<'_> {
        self.with_switches(|switches| switches.push(SwitchContext { value, found: false }));
        SwitchGuard { scope: self }
    }

    /// Claim the innermost switch for a `case`. True only for the first case
    /// whose value equals the switch value.
    pub fn try_case(&self, value: &str) -> bool {
        self.with_switches(|switches| match switches.last_mut() {
            Some(switch) if !switch.found && switch.value == value => {
                switch.found = true;
                true
            }
            _ => false,
        })
    }

    /// Whether a `default` applies: inside a switch where no case matched.
    pub fn default_applies(&self) -> bool {
        self.with_switches(|switches| switches.last().is_some_and(|s| !s.found))
    }

    fn with_switches<T>(&self, f: impl FnOnce(&mut Vec<SwitchContext>) -> T) -> T {
        let mut switches = self
            .switches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut switches)
    }
}

pub struct BlockGuard<'a> {
    scope: &'a RenderScope,
}

impl Drop for BlockGuard<'_> {
    fn drop(&mut self) {
        self.scope.depth.fetch_sub(1, Ordering::Relaxed);
    }
}

pub struct SwitchGuard<'a> {
    scope: &'a RenderScope,
}

impl Drop for SwitchGuard<'_> {
    fn drop(&mut self) {
        self.scope.with_switches(|switches| switches.pop());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_depth() {
        let scope = RenderScope::new();
        assert!(scope.is_root());
        {
            let _outer = scope.enter_block();
            let _inner = scope.enter_block();
            assert!(!scope.is_root());
        }
        assert!(scope.is_root());
    }

    #[test]
    fn test_first_case_wins() {
        let scope = RenderScope::new();
        let _switch = scope.enter_switch("b".to_string());
        assert!(!scope.try_case("a"));
        assert!(scope.try_case("b"));
        assert!(!scope.try_case("b"));
        assert!(!scope.default_applies());
    }

    #[test]
    fn test_nested_switches_are_independent() {
        let scope = RenderScope::new();
        let outer = scope.enter_switch("x".to_string());
        {
            let _inner = scope.enter_switch("y".to_string());
            assert!(scope.try_case("y"));
        }
        assert!(scope.default_applies());
        assert!(scope.try_case("x"));
        drop(outer);
        assert!(!scope.default_applies());
        assert!(!scope.try_case("x"));
    }
}
