//! # TUI Adapter
//!
//! The ratatui-specific layer. Handles terminal I/O, renders the snapshot,
//! and translates keyboard events into core::Intent values.
//!
//! This is the only module that knows about ratatui and crossterm.
//!
//! ## Frame Loop
//!
//! ```text
//! tick(now) → snapshot() → queue poster → draw → poll input, queue intents
//! ```
//!
//! The loop runs at the configured FPS and never waits on the network. Intents
//! go through the coordinator's channel and are handled, in arrival order, by
//! the `tick` at the start of the next frame. Remote results show up in a
//! later snapshot.

mod event;
mod ui;

use log::{debug, info, warn};
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};

use crate::core::config::ResolvedConfig;
use crate::core::coordinator::AppCoordinator;
use crate::core::intent::{Intent, NavTarget};
use crate::core::navigation::{Payload, Screen};
use crate::core::state::Snapshot;
use crate::remote::validate::{MAX_QUERY_CHARS, poster_url};
use crate::remote::{Listing, MediaItem, MediaKind, PosterSize};
use crate::tui::event::{TuiEvent, poll_event_immediate, poll_event_timeout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuEntry {
    SearchMovies,
    SearchTv,
    PopularMovies,
    PopularTv,
    Exit,
}

impl MenuEntry {
    pub const ALL: [MenuEntry; 5] = [
        MenuEntry::SearchMovies,
        MenuEntry::SearchTv,
        MenuEntry::PopularMovies,
        MenuEntry::PopularTv,
        MenuEntry::Exit,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MenuEntry::SearchMovies => "Search Movies",
            MenuEntry::SearchTv => "Search TV Shows",
            MenuEntry::PopularMovies => "Popular Movies",
            MenuEntry::PopularTv => "Popular TV",
            MenuEntry::Exit => "Exit",
        }
    }
}

/// What the loop should do with one decoded event.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Intent(Intent),
    Quit,
}

/// Warns when the frame rate sags. Measures over fixed windows of frames.
#[derive(Debug)]
pub struct FpsMonitor {
    target: u32,
    frames: u32,
    window_start: Instant,
}

impl FpsMonitor {
    pub const SAMPLE_FRAMES: u32 = 100;

    pub fn new(target: u32, now: Instant) -> Self {
        Self {
            target,
            frames: 0,
            window_start: now,
        }
    }

    /// Counts a frame. At the end of each window returns the measured rate
    /// if it fell below 75% of target.
    pub fn frame(&mut self, now: Instant) -> Option<f64> {
        self.frames += 1;
        if self.frames < Self::SAMPLE_FRAMES {
            return None;
        }
        let elapsed = now.duration_since(self.window_start).as_secs_f64();
        let measured = if elapsed > 0.0 {
            f64::from(self.frames) / elapsed
        } else {
            f64::INFINITY
        };
        self.frames = 0;
        self.window_start = now;
        (measured < f64::from(self.target) * 0.75).then_some(measured)
    }
}

/// TUI-specific presentation state (not part of core business logic)
pub struct TuiState {
    pub menu_index: usize,
    pub list_index: usize,
    pub query: String,
    pub search_kind: MediaKind,
    pub poster_size: PosterSize,
    pub fps: FpsMonitor,
    /// Listing the cursor belongs to; a different listing resets the cursor.
    seen_listing: Option<Arc<Listing>>,
    /// Poster URL already requested for the current selection.
    requested_poster: Option<String>,
}

impl TuiState {
    pub fn new(poster_size: PosterSize, target_fps: u32, now: Instant) -> Self {
        Self {
            menu_index: 0,
            list_index: 0,
            query: String::new(),
            search_kind: MediaKind::Movie,
            poster_size,
            fps: FpsMonitor::new(target_fps, now),
            seen_listing: None,
            requested_poster: None,
        }
    }

    /// Keeps the list cursor valid for the listing now on screen.
    pub fn sync(&mut self, snap: &Snapshot) {
        if let Payload::Listing(listing) = &snap.payload {
            let same = self
                .seen_listing
                .as_ref()
                .is_some_and(|seen| Arc::ptr_eq(seen, listing));
            if !same {
                self.seen_listing = Some(listing.clone());
                self.list_index = 0;
            }
            self.list_index = self.list_index.min(listing.len().saturating_sub(1));
        }
    }

    /// The title the cursor is on, from a listing or a detail screen.
    pub fn selected_item<'a>(&self, snap: &'a Snapshot) -> Option<&'a MediaItem> {
        match snap.screen {
            Screen::SearchResults | Screen::Browse => {
                snap.payload.listing()?.items.get(self.list_index)
            }
            Screen::MediaDetail => snap.payload.media(),
            _ => None,
        }
    }

    pub fn selected_poster_url(&self, snap: &Snapshot) -> Option<String> {
        let path = self.selected_item(snap)?.poster_path.as_deref()?;
        poster_url(path, self.poster_size)
    }

    /// An image fetch for the selected poster, at most once per selection.
    pub fn poster_intent(&mut self, snap: &Snapshot) -> Option<Intent> {
        let url = self.selected_poster_url(snap);
        if url == self.requested_poster {
            return None;
        }
        self.requested_poster = url.clone();
        url.map(Intent::FetchImage)
    }

    pub fn handle_event(&mut self, event: TuiEvent, snap: &Snapshot) -> Vec<Command> {
        if event == TuiEvent::ForceQuit {
            return vec![Command::Quit];
        }
        match snap.screen {
            Screen::MainMenu => self.on_main_menu(event),
            Screen::Keyboard => self.on_keyboard(event),
            Screen::SearchResults | Screen::Browse => self.on_listing(event, snap),
            Screen::MediaDetail => self.on_detail(event, snap),
        }
    }

    fn on_main_menu(&mut self, event: TuiEvent) -> Vec<Command> {
        let count = MenuEntry::ALL.len();
        match event {
            TuiEvent::Up => self.menu_index = (self.menu_index + count - 1) % count,
            TuiEvent::Down => self.menu_index = (self.menu_index + 1) % count,
            TuiEvent::InputChar('q') => return vec![Command::Quit],
            TuiEvent::Select => {
                let entry = MenuEntry::ALL[self.menu_index % count];
                debug!("Main menu: {}", entry.label());
                return match entry {
                    MenuEntry::SearchMovies => self.open_keyboard(MediaKind::Movie),
                    MenuEntry::SearchTv => self.open_keyboard(MediaKind::Tv),
                    MenuEntry::PopularMovies => {
                        vec![Command::Intent(Intent::LoadBrowse(MediaKind::Movie))]
                    }
                    MenuEntry::PopularTv => vec![Command::Intent(Intent::LoadBrowse(MediaKind::Tv))],
                    MenuEntry::Exit => vec![Command::Quit],
                };
            }
            _ => {}
        }
        Vec::new()
    }

    fn open_keyboard(&mut self, kind: MediaKind) -> Vec<Command> {
        self.search_kind = kind;
        self.query.clear();
        vec![Command::Intent(Intent::navigate(Screen::Keyboard))]
    }

    fn on_keyboard(&mut self, event: TuiEvent) -> Vec<Command> {
        match event {
            TuiEvent::InputChar(c) => self.push_query(&c.to_string()),
            TuiEvent::Paste(text) => self.push_query(&text),
            TuiEvent::Backspace => {
                self.query.pop();
            }
            TuiEvent::Select => {
                return vec![Command::Intent(Intent::SubmitSearch {
                    query: self.query.clone(),
                    kind: self.search_kind,
                })];
            }
            TuiEvent::Back => return vec![Command::Intent(Intent::back())],
            _ => {}
        }
        Vec::new()
    }

    fn push_query(&mut self, text: &str) {
        for c in text.chars().filter(|c| !c.is_control()) {
            if self.query.chars().count() >= MAX_QUERY_CHARS {
                break;
            }
            self.query.push(c);
        }
    }

    fn on_listing(&mut self, event: TuiEvent, snap: &Snapshot) -> Vec<Command> {
        let len = snap.payload.listing().map_or(0, |l| l.len());
        match event {
            TuiEvent::Up => self.list_index = self.list_index.saturating_sub(1),
            TuiEvent::Down if self.list_index + 1 < len => self.list_index += 1,
            TuiEvent::Select => {
                if let Some(item) = self.selected_item(snap) {
                    return vec![
                        Command::Intent(Intent::Navigate {
                            target: NavTarget::To(Screen::MediaDetail),
                            payload: Payload::Item(Arc::new(item.clone())),
                        }),
                        Command::Intent(Intent::FetchDetail {
                            id: item.id,
                            kind: item.kind,
                        }),
                    ];
                }
            }
            TuiEvent::Back | TuiEvent::Backspace => return vec![Command::Intent(Intent::back())],
            _ => {}
        }
        Vec::new()
    }

    fn on_detail(&mut self, event: TuiEvent, snap: &Snapshot) -> Vec<Command> {
        match event {
            TuiEvent::Select | TuiEvent::InputChar('r') => {
                if let Some(item) = snap.payload.media() {
                    return vec![Command::Intent(Intent::SubmitRequest {
                        id: item.id,
                        kind: item.kind,
                    })];
                }
            }
            TuiEvent::Back | TuiEvent::Backspace => return vec![Command::Intent(Intent::back())],
            _ => {}
        }
        Vec::new()
    }
}

fn queue(intents: &mpsc::Sender<Intent>, intent: Intent) {
    if let Err(e) = intents.send(intent) {
        warn!("Dropping intent {}: coordinator gone", e.0);
    }
}

#[derive(Debug, Default, PartialEq)]
struct Forwarded {
    queued: bool,
    quit: bool,
}

/// Queues every intent in `commands` for the coordinator's next tick.
fn forward(commands: Vec<Command>, intents: &mpsc::Sender<Intent>) -> Forwarded {
    let mut forwarded = Forwarded::default();
    for command in commands {
        match command {
            Command::Quit => forwarded.quit = true,
            Command::Intent(intent) => {
                queue(intents, intent);
                forwarded.queued = true;
            }
        }
    }
    forwarded
}

pub fn run(coordinator: &AppCoordinator, config: &ResolvedConfig) -> std::io::Result<()> {
    let mut terminal = ratatui::init();
    let result = event_loop(&mut terminal, coordinator, config);
    ratatui::restore();
    result
}

fn event_loop(
    terminal: &mut ratatui::DefaultTerminal,
    coordinator: &AppCoordinator,
    config: &ResolvedConfig,
) -> std::io::Result<()> {
    let frame_interval = config.frame_interval();
    let mut tui = TuiState::new(config.poster_size, config.fps, Instant::now());
    let started = Instant::now();
    let intents = coordinator.intents();
    info!("Frame loop started at {} fps", config.fps);

    loop {
        let frame_start = Instant::now();
        coordinator.tick(frame_start);

        let snap = coordinator.snapshot();
        tui.sync(&snap);
        if let Some(intent) = tui.poster_intent(&snap) {
            queue(&intents, intent);
        }
        let poster = tui
            .selected_poster_url(&snap)
            .and_then(|url| coordinator.image(&url));
        let spinner_frame = (started.elapsed().as_millis() / 80) as usize;
        terminal.draw(|f| ui::draw_ui(f, &snap, &tui, poster.as_ref(), spinner_frame))?;

        if let Some(measured) = tui.fps.frame(Instant::now()) {
            warn!(
                "Frame rate {:.1} fps is below 75% of target {} fps",
                measured, config.fps
            );
        }

        // Spend the rest of the frame waiting for input, then drain the rest.
        // Input stops at the first queued intent; later keys belong to the
        // screen that intent leads to, after the next tick.
        let wait = frame_interval.saturating_sub(frame_start.elapsed());
        let first_event = poll_event_timeout(wait.max(Duration::from_millis(1)));
        let mut should_quit = false;
        for event in first_event
            .into_iter()
            .chain(std::iter::from_fn(poll_event_immediate))
        {
            if event == TuiEvent::Resize {
                continue;
            }
            let snap = coordinator.snapshot();
            tui.sync(&snap);
            let forwarded = forward(tui.handle_event(event, &snap), &intents);
            should_quit = forwarded.quit;
            if forwarded.queued || forwarded.quit {
                break;
            }
        }

        if should_quit {
            info!("Quit requested");
            break;
        }
    }

    coordinator.shutdown();
    Ok(())
}
