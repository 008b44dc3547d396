//! # Navigation
//!
//! The screen state machine. One active screen with its payload, plus a
//! stack of the screens (and payloads) the user came through.
//!
//! ```text
//! MainMenu ──push──▶ Keyboard ──push──▶ SearchResults ──push──▶ MediaDetail
//!     ◀──pop────────────◀──pop──────────────◀──pop─────────────────┘
//! ```
//!
//! Invariant: the stack never holds the active screen. Pushing the active
//! screen only swaps its payload; pushing a screen that is already on the
//! stack unwinds back to it. Popping an empty stack does nothing.
//!
//! This type is not synchronized; [`crate::core::state::SharedState`] owns
//! the one mutex around it.

use std::sync::Arc;

use crate::remote::{Listing, MediaDetail, MediaItem};

/// Oldest entries are dropped beyond this depth.
pub const MAX_STACK_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Screen {
    MainMenu,
    Keyboard,
    SearchResults,
    Browse,
    MediaDetail,
}

impl Screen {
    pub fn title(self) -> &'static str {
        match self {
            Screen::MainMenu => "Main Menu",
            Screen::Keyboard => "Search",
            Screen::SearchResults => "Search Results",
            Screen::Browse => "Popular",
            Screen::MediaDetail => "Details",
        }
    }
}

/// Data attached to a screen. Clones are cheap.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    #[default]
    Empty,
    /// Placeholder while a background result is on its way.
    Loading,
    Listing(Arc<Listing>),
    /// A summary row picked from a listing, shown before the full detail arrives.
    Item(Arc<MediaItem>),
    Detail(Arc<MediaDetail>),
}

impl Payload {
    pub fn listing(&self) -> Option<&Listing> {
        match self {
            Payload::Listing(listing) => Some(listing),
            _ => None,
        }
    }

    /// The title this payload is about, from either a summary or a detail.
    pub fn media(&self) -> Option<&MediaItem> {
        match self {
            Payload::Item(item) => Some(item),
            Payload::Detail(detail) => Some(&detail.item),
            _ => None,
        }
    }

    pub fn detail(&self) -> Option<&MediaDetail> {
        match self {
            Payload::Detail(detail) => Some(detail),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Payload::Loading)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    screen: Screen,
    payload: Payload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NavigationState {
    active: Entry,
    stack: Vec<Entry>,
}

impl Default for NavigationState {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigationState {
    pub fn new() -> Self {
        Self {
            active: Entry {
                screen: Screen::MainMenu,
                payload: Payload::Empty,
            },
            stack: Vec::new(),
        }
    }

    pub fn active(&self) -> Screen {
        self.active.screen
    }

    pub fn payload(&self) -> &Payload {
        &self.active.payload
    }

    /// Number of screens behind the active one.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Screens behind the active one, bottom first.
    #[cfg(test)]
    pub fn history(&self) -> Vec<Screen> {
        self.stack.iter().map(|e| e.screen).collect()
    }

    /// Makes `screen` active with `payload`.
    pub fn push(&mut self, screen: Screen, payload: Payload) {
        if screen == self.active.screen {
            self.active.payload = payload;
            return;
        }

        if let Some(pos) = self.stack.iter().position(|e| e.screen == screen) {
            self.stack.truncate(pos);
        } else {
            let previous = std::mem::replace(&mut self.active, Entry { screen, payload });
            self.stack.push(previous);
            if self.stack.len() > MAX_STACK_DEPTH {
                self.stack.remove(0);
            }
            return;
        }

        self.active = Entry { screen, payload };
    }

    /// Returns to the previous screen. Returns false (and changes nothing)
    /// when already at the root.
    pub fn pop(&mut self) -> bool {
        match self.stack.pop() {
            Some(previous) => {
                self.active = previous;
                true
            }
            None => false,
        }
    }

    /// Swaps the active screen's payload without changing depth.
    pub fn replace_payload(&mut self, payload: Payload) {
        self.active.payload = payload;
    }

    /// Unwinds to the bottom of the stack.
    pub fn home(&mut self) {
        if !self.stack.is_empty() {
            let root = self.stack.swap_remove(0);
            self.stack.clear();
            self.active = root;
        }
    }

    #[cfg(test)]
    fn invariant_holds(&self) -> bool {
        !self.stack.iter().any(|e| e.screen == self.active.screen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(n: u64) -> Payload {
        Payload::Listing(Arc::new(Listing {
            items: Vec::new(),
            page: n as u32,
            total_pages: 1,
        }))
    }

    #[test]
    fn test_starts_at_main_menu() {
        let nav = NavigationState::new();
        assert_eq!(nav.active(), Screen::MainMenu);
        assert_eq!(nav.depth(), 0);
        assert_eq!(nav.payload(), &Payload::Empty);
    }

    #[test]
    fn test_pop_on_empty_stack_is_noop() {
        let mut nav = NavigationState::new();
        assert!(!nav.pop());
        assert_eq!(nav.active(), Screen::MainMenu);
        assert_eq!(nav.depth(), 0);
    }

    #[test]
    fn test_push_pop_is_lifo() {
        let mut nav = NavigationState::new();
        nav.push(Screen::Keyboard, Payload::Empty);
        nav.push(Screen::SearchResults, listing(1));
        nav.push(Screen::MediaDetail, Payload::Loading);
        assert_eq!(nav.depth(), 3);

        assert!(nav.pop());
        assert_eq!(nav.active(), Screen::SearchResults);
        assert_eq!(nav.payload(), &listing(1));
        assert!(nav.pop());
        assert_eq!(nav.active(), Screen::Keyboard);
        assert!(nav.pop());
        assert_eq!(nav.active(), Screen::MainMenu);
        assert!(!nav.pop());
    }

    #[test]
    fn test_push_then_pop_restores_previous_state_for_any_sequence() {
        let screens = [
            Screen::Keyboard,
            Screen::SearchResults,
            Screen::Browse,
            Screen::MediaDetail,
        ];
        let mut nav = NavigationState::new();
        let mut seed: u32 = 7;
        for _ in 0..500 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let target = screens[(seed >> 16) as usize % screens.len()];
            let pops = (seed >> 8) % 2 == 0;
            if pops {
                nav.pop();
            } else if target != nav.active() && !nav.history().contains(&target) {
                let before = nav.clone();
                nav.push(target, listing(seed as u64));
                let mut undone = nav.clone();
                undone.pop();
                assert_eq!(undone, before);
            }
            assert!(nav.invariant_holds());
        }
    }

    #[test]
    fn test_push_active_screen_replaces_payload() {
        let mut nav = NavigationState::new();
        nav.push(Screen::Browse, Payload::Loading);
        nav.push(Screen::Browse, listing(2));
        assert_eq!(nav.depth(), 1);
        assert_eq!(nav.payload(), &listing(2));
        assert!(nav.invariant_holds());
    }

    #[test]
    fn test_push_screen_on_stack_unwinds_to_it() {
        let mut nav = NavigationState::new();
        nav.push(Screen::Keyboard, Payload::Empty);
        nav.push(Screen::SearchResults, listing(1));
        nav.push(Screen::MediaDetail, Payload::Loading);
        nav.push(Screen::Keyboard, Payload::Empty);
        assert_eq!(nav.active(), Screen::Keyboard);
        assert_eq!(nav.history(), vec![Screen::MainMenu]);
        assert!(nav.invariant_holds());
    }

    #[test]
    fn test_replace_payload_keeps_depth() {
        let mut nav = NavigationState::new();
        nav.push(Screen::SearchResults, Payload::Loading);
        nav.replace_payload(listing(3));
        assert_eq!(nav.depth(), 1);
        assert_eq!(nav.active(), Screen::SearchResults);
        assert_eq!(nav.payload(), &listing(3));
    }

    #[test]
    fn test_home_unwinds_to_root() {
        let mut nav = NavigationState::new();
        nav.push(Screen::Keyboard, Payload::Empty);
        nav.push(Screen::SearchResults, listing(1));
        nav.home();
        assert_eq!(nav.active(), Screen::MainMenu);
        assert_eq!(nav.depth(), 0);
        nav.home();
        assert_eq!(nav.active(), Screen::MainMenu);
    }

    #[test]
    fn test_payload_accessors() {
        let item = Arc::new(MediaItem {
            id: 9,
            kind: crate::remote::MediaKind::Tv,
            title: "Show".to_string(),
            year: None,
            overview: None,
            poster_path: None,
            rating: None,
        });
        let payload = Payload::Item(item.clone());
        assert_eq!(payload.media().map(|m| m.id), Some(9));
        assert!(payload.listing().is_none());
        assert!(payload.detail().is_none());
        assert!(Payload::Loading.is_loading());
    }
}
