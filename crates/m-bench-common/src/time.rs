//! ---
//! mb_section: "01-core-functionality"
//! mb_subsection: "module"
//! mb_type: "source"
//! mb_scope: "code"
//! mb_description: "Shared primitives and utilities for the bench runtime."
//! mb_version: "v0.0.0-prealpha"
//! mb_owner: "tbd"
//! ---
use std::time::Instant;

/// Capture an instant suitable for scheduler comparisons.
pub fn monotonic_now() -> Instant {
    Instant::now()
}
