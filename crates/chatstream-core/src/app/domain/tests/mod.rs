//! Domain tests module.
//!
//! - Scenario tests: end-to-end event sequences through the dispatcher
//! - Property tests: proptest-based randomized testing for invariants
