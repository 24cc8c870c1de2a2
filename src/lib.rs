//! Paginated Qur'an reader with per-ayah narration.
//!
//! The [`backend`] module holds the playback engine: page loading, the
//! playback state machine, audio prefetch, gestures and bookmarks. The
//! terminal shell in `main.rs` is one consumer of it.

pub mod backend;
pub mod config;
pub mod logging;
