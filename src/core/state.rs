//! # Shared UI State
//!
//! Everything the render loop reads and the workers write, behind a single
//! mutex:
//!
//! ```text
//! SharedState (Mutex)
//! └── UiState
//!     ├── nav: NavigationState           // active screen, payload, stack
//!     ├── message: Option<StatusMessage> // transient, severity-classified
//!     ├── applied: HashMap<OpKind, u64>  // newest generation applied per kind
//!     └── pending_back: Option<Instant>  // scheduled back-navigation
//! ```
//!
//! The render loop never holds the lock while drawing: it takes a
//! [`Snapshot`] once per frame and draws from that.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::core::dispatcher::OpKind;
use crate::core::error::Severity;
use crate::core::navigation::{NavigationState, Payload, Screen};

pub const DEFAULT_MESSAGE_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub text: String,
    pub severity: Severity,
    pub expires_at: Instant,
}

#[derive(Debug, Default)]
pub struct UiState {
    pub nav: NavigationState,
    pub message: Option<StatusMessage>,
    pub pending_back: Option<Instant>,
    applied: HashMap<OpKind, u64>,
}

impl UiState {
    /// Records `generation` as applied for `kind` unless something newer
    /// already was. Returns whether the caller may apply its result.
    pub fn accept_generation(&mut self, kind: OpKind, generation: u64) -> bool {
        let newest = self.applied.entry(kind).or_insert(0);
        if generation < *newest {
            return false;
        }
        *newest = generation;
        true
    }

    pub fn set_message(&mut self, text: impl Into<String>, severity: Severity, now: Instant) {
        self.message = Some(StatusMessage {
            text: text.into(),
            severity,
            expires_at: now + DEFAULT_MESSAGE_TTL,
        });
    }

    pub fn clear_message(&mut self) {
        self.message = None;
    }
}

/// Which operation kinds currently have a worker in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Loading {
    pub search: bool,
    pub browse: bool,
    pub detail: bool,
    pub image: bool,
    pub submit: bool,
}

impl Loading {
    pub fn any(&self) -> bool {
        self.search || self.browse || self.detail || self.image || self.submit
    }
}

/// A consistent, read-only view for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub screen: Screen,
    pub payload: Payload,
    pub depth: usize,
    pub message: Option<StatusMessage>,
    pub loading: Loading,
}

#[derive(Default)]
pub struct SharedState {
    inner: Mutex<UiState>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, UiState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Runs `f` with exclusive access. Keep `f` short and free of I/O.
    pub fn update<R>(&self, f: impl FnOnce(&mut UiState) -> R) -> R {
        let mut state = self.lock();
        f(&mut state)
    }

    pub fn snapshot(&self, loading: Loading) -> Snapshot {
        let state = self.lock();
        Snapshot {
            screen: state.nav.active(),
            payload: state.nav.payload().clone(),
            depth: state.nav.depth(),
            message: state.message.clone(),
            loading,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_generation_is_monotonic() {
        let mut state = UiState::default();
        assert!(state.accept_generation(OpKind::Search, 2));
        assert!(!state.accept_generation(OpKind::Search, 1));
        assert!(state.accept_generation(OpKind::Search, 3));
        // Kinds are independent.
        assert!(state.accept_generation(OpKind::Browse, 1));
    }

    #[test]
    fn test_snapshot_reflects_navigation() {
        let shared = SharedState::new();
        shared.update(|ui| ui.nav.push(Screen::Keyboard, Payload::Empty));
        let snap = shared.snapshot(Loading::default());
        assert_eq!(snap.screen, Screen::Keyboard);
        assert_eq!(snap.depth, 1);
        assert!(snap.message.is_none());
        assert!(!snap.loading.any());
    }

    #[test]
    fn test_message_expiry_is_set_from_now() {
        let mut state = UiState::default();
        let now = Instant::now();
        state.set_message("hello", Severity::Info, now);
        let msg = state.message.clone().unwrap();
        assert_eq!(msg.expires_at, now + DEFAULT_MESSAGE_TTL);
        state.clear_message();
        assert!(state.message.is_none());
    }
}
