//! # Intents
//!
//! Everything the user can ask for becomes an `Intent`.
//! Picked "Search Movies"? That's `Intent::Navigate { target: To(Keyboard), .. }`.
//! Pressed Enter on the keyboard? That's `Intent::SubmitSearch { .. }`.
//!
//! ```text
//! input loop ──Intent──▶ channel ──tick()──▶ AppCoordinator::handle_intent()
//!                                              ├── Navigate      → NavigationState (no I/O)
//!                                              └── everything else → TaskDispatcher
//! ```
//!
//! Intents are plain values. They are consumed exactly once.

use std::fmt;

use crate::core::navigation::{Payload, Screen};
use crate::remote::MediaKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavTarget {
    To(Screen),
    Back,
    Home,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// Pure navigation, applied on the calling thread.
    Navigate { target: NavTarget, payload: Payload },
    SubmitSearch { query: String, kind: MediaKind },
    LoadBrowse(MediaKind),
    FetchDetail { id: u64, kind: MediaKind },
    /// Absolute poster URL.
    FetchImage(String),
    SubmitRequest { id: u64, kind: MediaKind },
}

impl Intent {
    pub fn navigate(screen: Screen) -> Self {
        Intent::Navigate {
            target: NavTarget::To(screen),
            payload: Payload::Empty,
        }
    }

    pub fn back() -> Self {
        Intent::Navigate {
            target: NavTarget::Back,
            payload: Payload::Empty,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Navigate { target, .. } => write!(f, "navigate {target:?}"),
            Intent::SubmitSearch { query, kind } => write!(f, "search {kind} {query:?}"),
            Intent::LoadBrowse(kind) => write!(f, "browse {kind}"),
            Intent::FetchDetail { id, kind } => write!(f, "detail {kind}/{id}"),
            Intent::FetchImage(url) => write!(f, "image {url}"),
            Intent::SubmitRequest { id, kind } => write!(f, "request {kind}/{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_compact() {
        let intent = Intent::FetchDetail {
            id: 603,
            kind: MediaKind::Movie,
        };
        assert_eq!(intent.to_string(), "detail movie/603");
    }
}
