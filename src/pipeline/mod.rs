//! Pipeline stages for slide-deck-to-flashcard conversion.
//!
//! Each submodule implements exactly one transformation step. Keeping stages
//! separate makes each independently testable and lets us swap an
//! implementation (e.g. a different chunk planner) without touching the
//! others.
//!
//! ## Data Flow
//!
//! ```text
//! slides ──▶ chunk ──▶ extract ──▶ transform ──▶ merge
//! (PDFs)    (spans)   (retry+AI)  (deck rows)   (master)
//! ```
//!
//! 1. [`chunk`]     — plan bounded page spans and materialize chunk PDFs;
//!    lopdf work runs in `spawn_blocking` because it is synchronous and
//!    CPU-bound
//! 2. [`extract`]   — drive the backend with fixed-delay retry; the only
//!    stage with network I/O
//! 3. [`transform`] — project extracted cards into tagged, escaped deck rows
//! 4. [`merge`]     — assemble the master deck in document order

pub mod chunk;
pub mod extract;
pub mod merge;
pub mod transform;
