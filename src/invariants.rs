//! Runtime invariant checks with contract coverage
//!
//! Production code states its invariants with [`assert_invariant!`]. Each check is
//! counted in a thread-local ledger so tests can prove, through [`contract_test`], that a
//! scenario actually exercised the invariants it claims to cover.
//!
//! ```rust,ignore
//! assert_invariant!(live_streams == 0, invariants::SINGLE_LIVE_STREAM, "session::select");
//!
//! #[test]
//! fn contract_session() {
//!     // ... drive a few selects ...
//!     contract_test("session", &[invariants::SINGLE_LIVE_STREAM]);
//! }
//! ```

use std::cell::RefCell;
use std::collections::HashMap;

/// No new stream is requested while another one is still held
pub const SINGLE_LIVE_STREAM: &str = "At most one camera stream is live";
/// The detection loop is only started after the stream reported ready
pub const LOOP_STARTS_ON_READY: &str = "Detection starts only on a ready frame source";
/// Auto-mode owns a timer exactly when it is enabled
pub const AUTO_TIMER_MATCHES_FLAG: &str = "Auto-mode timer exists iff auto-mode is enabled";

thread_local! {
    static LEDGER: RefCell<HashMap<&'static str, usize>> = RefCell::new(HashMap::new());
}

/// Check an invariant, record it, and panic with context if it does not hold.
#[macro_export]
macro_rules! assert_invariant {
    ($condition:expr, $invariant:expr) => {
        $crate::invariants::__check($condition, $invariant, None)
    };
    ($condition:expr, $invariant:expr, $context:expr) => {
        $crate::invariants::__check($condition, $invariant, Some($context))
    };
}

#[doc(hidden)]
pub fn __check(condition: bool, invariant: &'static str, context: Option<&str>) {
    LEDGER.with(|ledger| {
        *ledger.borrow_mut().entry(invariant).or_insert(0) += 1;
    });

    if !condition {
        panic!(
            "INVARIANT VIOLATION [{}]: {}",
            context.unwrap_or("unknown"),
            invariant
        );
    }
}

/// How many times an invariant was checked on this thread
pub fn times_checked(invariant: &str) -> usize {
    LEDGER.with(|ledger| ledger.borrow().get(invariant).copied().unwrap_or(0))
}

/// Panic unless every listed invariant was checked at least once on this thread.
pub fn contract_test(name: &str, required: &[&str]) {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|invariant| times_checked(invariant) == 0)
        .collect();

    if !missing.is_empty() {
        panic!(
            "CONTRACT FAILURE [{}]: invariants never checked:\n  - {}",
            name,
            missing.join("\n  - ")
        );
    }
}

pub fn clear_ledger() {
    LEDGER.with(|ledger| ledger.borrow_mut().clear());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checks_are_counted() {
        clear_ledger();
        assert_invariant!(true, SINGLE_LIVE_STREAM);
        assert_invariant!(true, SINGLE_LIVE_STREAM, "tests");
        assert_eq!(times_checked(SINGLE_LIVE_STREAM), 2);
        contract_test("counted", &[SINGLE_LIVE_STREAM]);
    }

    #[test]
    #[should_panic(expected = "INVARIANT VIOLATION [tests]")]
    fn test_violation_panics() {
        assert_invariant!(false, AUTO_TIMER_MATCHES_FLAG, "tests");
    }

    #[test]
    #[should_panic(expected = "CONTRACT FAILURE")]
    fn test_unchecked_contract_fails() {
        clear_ledger();
        contract_test("empty", &[LOOP_STARTS_ON_READY]);
    }
}
