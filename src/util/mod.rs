//! Utility modules: clock, debounce, timeout.

pub mod clock;
pub mod debounce;
pub mod timeout;
