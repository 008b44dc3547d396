//! # App Coordinator
//!
//! Intent in, snapshot out. The render loop talks to nothing else.
//!
//! ```text
//!  render loop                         tokio workers
//!  ───────────                         ─────────────
//!  intents().send(i)
//!  tick(now) ─▶ handle_intent(i) ─dispatch─▶ RetryExecutor ─▶ WireClient
//!  snapshot()  ◀── SharedState ◀── apply_result (generation-checked)
//!                                            │
//!  image(url)  ◀── ImageCache  ◀─────────────┘ (posters only)
//! ```
//!
//! Navigation intents are applied on the calling thread. Everything else is
//! validated locally, then handed to the [`TaskDispatcher`]. Results only
//! reach shared state through [`ResultSink::apply_result`] on [`Shared`].
//! Detail results and submit confirmations only act on a detail screen the
//! user is still looking at.

use log::{debug, info, warn};
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

use crate::core::dispatcher::{
    Completion, Generations, OpKind, Operation, ResultSink, TaskDispatcher,
};
use crate::core::error::{RemoteResult, Severity};
use crate::core::image_cache::{self, ImageCache, normalize_key};
use crate::core::intent::{Intent, NavTarget};
use crate::core::navigation::{Payload, Screen};
use crate::core::rate_gate::{self, RateGate};
use crate::core::retry::{RetryExecutor, RetryPolicy};
use crate::core::state::{Loading, SharedState, Snapshot, UiState};
use crate::remote::validate::{
    sanitize_query, validate_confirmation, validate_detail, validate_image, validate_listing,
    validate_media_id, validate_page, validate_status,
};
use crate::remote::{
    ImageBlob, Listing, MediaDetail, MediaKind, RequestConfirmation, ValidationError, WireClient,
};

pub const DEFAULT_IMAGE_RATE_LIMIT: usize = 120;
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
pub const DEFAULT_MAX_BROWSE_ITEMS: usize = 10;
pub const BACK_AFTER_SUBMIT: Duration = Duration::from_millis(1500);

/// Tunables for one coordinator. Built from `ResolvedConfig` in the binary.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub retry: RetryPolicy,
    pub rate_limit_requests: usize,
    pub rate_limit_window: Duration,
    pub image_rate_limit_requests: usize,
    pub max_image_bytes: usize,
    pub cache_max_entries: usize,
    pub cache_max_bytes: usize,
    pub max_browse_items: usize,
    pub back_after_submit: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            rate_limit_requests: rate_gate::DEFAULT_QUOTA,
            rate_limit_window: rate_gate::DEFAULT_WINDOW,
            image_rate_limit_requests: DEFAULT_IMAGE_RATE_LIMIT,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            cache_max_entries: image_cache::DEFAULT_MAX_ENTRIES,
            cache_max_bytes: image_cache::DEFAULT_MAX_BYTES,
            max_browse_items: DEFAULT_MAX_BROWSE_ITEMS,
            back_after_submit: BACK_AFTER_SUBMIT,
        }
    }
}

/// A validated result on its way to shared state.
#[derive(Debug)]
pub enum Outcome {
    Search(Listing),
    Browse(Listing),
    Detail(MediaDetail),
    Image { url: String, blob: ImageBlob },
    Submitted(RequestConfirmation),
}

/// State reachable from worker completions.
pub struct Shared {
    state: SharedState,
    cache: ImageCache,
    generations: Arc<Generations>,
    back_after_submit: Duration,
}

impl Shared {
    fn apply_image(&self, op: &Operation, result: RemoteResult<Outcome>) {
        if !self.generations.is_current(op) {
            debug!("Discarding superseded image {}", op.key);
            return;
        }
        match result {
            Ok(Outcome::Image { url, blob }) => {
                let size = blob.byte_size();
                if self.cache.put(&url, blob) {
                    debug!("Cached image {} ({} bytes)", url, size);
                }
            }
            Ok(other) => warn!("Unexpected outcome for image fetch: {:?}", other),
            Err(kind) => warn!("Image fetch {} failed: {}", op.key, kind),
        }
    }
}

/// Shows a listing on `screen`, or says there was nothing to show.
fn show_listing(ui: &mut UiState, screen: Screen, listing: Listing, now: Instant) {
    if listing.is_empty() {
        ui.set_message("No results found", Severity::Info, now);
        return;
    }
    place(ui, screen, Payload::Listing(Arc::new(listing)));
    ui.clear_message();
}

/// Replaces the payload when `screen` is already showing (typically a
/// loading placeholder), otherwise pushes it.
fn place(ui: &mut UiState, screen: Screen, payload: Payload) {
    if ui.nav.active() == screen {
        ui.nav.replace_payload(payload);
    } else {
        ui.nav.push(screen, payload);
    }
}

impl ResultSink<Outcome> for Shared {
    fn apply_result(&self, completion: Completion<Outcome>) {
        let Completion { op, result } = completion;
        if op.kind == OpKind::ImageFetch {
            self.apply_image(&op, result);
            return;
        }

        let now = Instant::now();
        self.state.update(|ui| {
            if !self.generations.is_current(&op) || !ui.accept_generation(op.kind, op.generation) {
                debug!(
                    "Discarding stale {} result for {:?} (generation {})",
                    op.kind.as_str(),
                    op.key,
                    op.generation
                );
                return;
            }

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(kind) => {
                    warn!("{} {:?} failed: {}", op.kind.as_str(), op.key, kind);
                    ui.set_message(kind.user_message(), kind.severity(), now);
                    return;
                }
            };

            match outcome {
                Outcome::Search(listing) => show_listing(ui, Screen::SearchResults, listing, now),
                Outcome::Browse(listing) => show_listing(ui, Screen::Browse, listing, now),
                // Details only fill a detail screen the user is still on.
                Outcome::Detail(detail) if ui.nav.active() == Screen::MediaDetail => {
                    ui.nav.replace_payload(Payload::Detail(Arc::new(detail)));
                }
                Outcome::Detail(detail) => {
                    debug!(
                        "Dropping detail for {:?}: user left for {}",
                        detail.item.title,
                        ui.nav.active().title()
                    );
                }
                Outcome::Submitted(confirmation) => {
                    info!("Request {} accepted by server", confirmation.request_id);
                    ui.set_message("Request submitted successfully!", Severity::Success, now);
                    if ui.nav.active() == Screen::MediaDetail {
                        ui.pending_back = Some(now + self.back_after_submit);
                    }
                }
                Outcome::Image { url, .. } => {
                    warn!("Image outcome for {} arrived on a {} operation", url, op.kind.as_str());
                }
            }
        });
    }
}

pub struct AppCoordinator {
    shared: Arc<Shared>,
    dispatcher: TaskDispatcher<Outcome>,
    client: Arc<dyn WireClient>,
    api: Arc<RetryExecutor>,
    images: Arc<RetryExecutor>,
    max_image_bytes: usize,
    max_browse_items: usize,
    intents_tx: mpsc::Sender<Intent>,
    intents_rx: mpsc::Receiver<Intent>,
}

impl AppCoordinator {
    /// `runtime` is where workers run; the caller keeps driving the render
    /// loop on its own thread.
    pub fn new(runtime: Handle, client: Arc<dyn WireClient>, settings: CoordinatorSettings) -> Self {
        let generations = Arc::new(Generations::default());
        let shared = Arc::new(Shared {
            state: SharedState::new(),
            cache: ImageCache::new(settings.cache_max_entries, settings.cache_max_bytes),
            generations: generations.clone(),
            back_after_submit: settings.back_after_submit,
        });
        let dispatcher = TaskDispatcher::new(runtime, generations, shared.clone());

        let api_gate = Arc::new(RateGate::new(
            settings.rate_limit_requests,
            settings.rate_limit_window,
        ));
        let image_gate = Arc::new(RateGate::new(
            settings.image_rate_limit_requests,
            settings.rate_limit_window,
        ));
        let (intents_tx, intents_rx) = mpsc::channel();

        Self {
            shared,
            dispatcher,
            client,
            api: Arc::new(RetryExecutor::new(api_gate, settings.retry)),
            images: Arc::new(RetryExecutor::new(image_gate, settings.retry)),
            max_image_bytes: settings.max_image_bytes,
            max_browse_items: settings.max_browse_items,
            intents_tx,
            intents_rx,
        }
    }

    /// Sender for intents produced away from the render thread. They are
    /// handled, in arrival order, on the next [`tick`](Self::tick).
    pub fn intents(&self) -> mpsc::Sender<Intent> {
        self.intents_tx.clone()
    }

    /// Applies navigation directly; dispatches everything else. Returns the
    /// started operation, or `None` when nothing was dispatched.
    pub fn handle_intent(&self, intent: Intent) -> Option<Operation> {
        debug!("Intent: {}", intent);
        match intent {
            Intent::Navigate { target, payload } => {
                self.navigate(target, payload);
                None
            }
            Intent::SubmitSearch { query, kind } => self.search(&query, kind, 1),
            Intent::LoadBrowse(kind) => self.browse(kind, 1),
            Intent::FetchDetail { id, kind } => self.detail(id, kind),
            Intent::FetchImage(url) => self.fetch_image(&url),
            Intent::SubmitRequest { id, kind } => self.submit_request(id, kind),
        }
    }

    /// Per-frame housekeeping: drains queued intents, runs a due scheduled
    /// back-navigation, and expires the status message. Returns how many
    /// intents were handled.
    pub fn tick(&self, now: Instant) -> usize {
        let mut handled = 0;
        while let Ok(intent) = self.intents_rx.try_recv() {
            self.handle_intent(intent);
            handled += 1;
        }

        self.shared.state.update(|ui| {
            if let Some(due) = ui.pending_back
                && now >= due
            {
                ui.pending_back = None;
                ui.nav.pop();
            }
            if let Some(message) = &ui.message
                && now >= message.expires_at
            {
                ui.clear_message();
            }
        });
        handled
    }

    pub fn snapshot(&self) -> Snapshot {
        self.shared.state.snapshot(self.loading())
    }

    pub fn loading(&self) -> Loading {
        Loading {
            search: self.dispatcher.is_busy(OpKind::Search),
            browse: self.dispatcher.is_busy(OpKind::Browse),
            detail: self.dispatcher.is_busy(OpKind::DetailFetch),
            image: self.dispatcher.is_busy(OpKind::ImageFetch),
            submit: self.dispatcher.is_busy(OpKind::Submit),
        }
    }

    /// Cached poster for `url`, if one has arrived.
    pub fn image(&self, url: &str) -> Option<ImageBlob> {
        self.shared.cache.get(url)
    }

    pub fn cache(&self) -> &ImageCache {
        &self.shared.cache
    }

    /// Waits for every in-flight worker to finish and apply its result.
    pub async fn settle(&self) {
        self.dispatcher.settle().await;
    }

    /// Drops cached images. Workers still in flight finish on their own.
    pub fn shutdown(&self) {
        info!(
            "Coordinator shutting down ({} cached images, {} bytes dropped)",
            self.shared.cache.len(),
            self.shared.cache.total_bytes()
        );
        self.shared.cache.clear();
    }

    /// Startup reachability check, through the same gate and retry policy as
    /// every other API call. Returns the server version when reported.
    pub async fn check_server(&self) -> RemoteResult<Option<String>> {
        let client = self.client.clone();
        self.api
            .execute("status", || client.check_status(), validate_status)
            .await
    }

    fn navigate(&self, target: NavTarget, payload: Payload) {
        self.shared.state.update(|ui| {
            // Manual navigation wins over a scheduled one.
            ui.pending_back = None;
            match target {
                NavTarget::To(screen) => ui.nav.push(screen, payload),
                NavTarget::Back => {
                    if !ui.nav.pop() {
                        debug!("Back ignored at {}", ui.nav.active().title());
                    }
                }
                NavTarget::Home => ui.nav.home(),
            }
        });
    }

    fn notify(&self, text: impl Into<String>, severity: Severity) {
        let now = Instant::now();
        self.shared
            .state
            .update(|ui| ui.set_message(text, severity, now));
    }

    fn reject(&self, what: &str, error: ValidationError) -> Option<Operation> {
        warn!("Rejected {} before dispatch: {}", what, error);
        let text = match &error {
            ValidationError::Input(reason) => format!("Invalid {what}: {reason}"),
            other => format!("Invalid {what}: {other}"),
        };
        self.notify(text, Severity::Warning);
        None
    }

    fn search(&self, query: &str, kind: MediaKind, page: u32) -> Option<Operation> {
        let query = match sanitize_query(query) {
            Ok(query) => query,
            Err(e) => return self.reject("search", e),
        };
        let page = match validate_page(page) {
            Ok(page) => page,
            Err(e) => return self.reject("page", e),
        };
        self.notify(format!("Searching for '{query}'..."), Severity::Info);

        let key = format!("{kind}:{query}");
        let client = self.client.clone();
        let api = self.api.clone();
        Some(self.dispatcher.dispatch(OpKind::Search, key, async move {
            api.execute(
                "search",
                || client.search(&query, kind, page),
                |raw| validate_listing(raw, kind, None),
            )
            .await
            .map(Outcome::Search)
        }))
    }

    fn browse(&self, kind: MediaKind, page: u32) -> Option<Operation> {
        let page = match validate_page(page) {
            Ok(page) => page,
            Err(e) => return self.reject("page", e),
        };
        self.notify(format!("Loading popular {}...", kind.label()), Severity::Info);

        let limit = self.max_browse_items;
        let client = self.client.clone();
        let api = self.api.clone();
        Some(self.dispatcher.dispatch(OpKind::Browse, kind.as_str(), async move {
            api.execute(
                "browse",
                || client.browse(kind, page),
                |raw| validate_listing(raw, kind, Some(limit)),
            )
            .await
            .map(Outcome::Browse)
        }))
    }

    fn detail(&self, id: u64, kind: MediaKind) -> Option<Operation> {
        let id = match validate_media_id(id) {
            Ok(id) => id,
            Err(e) => return self.reject("media id", e),
        };

        let client = self.client.clone();
        let api = self.api.clone();
        Some(self.dispatcher.dispatch(
            OpKind::DetailFetch,
            format!("{kind}/{id}"),
            async move {
                api.execute(
                    "detail",
                    || client.detail(id, kind),
                    |raw| validate_detail(raw, kind),
                )
                .await
                .map(Outcome::Detail)
            },
        ))
    }

    fn fetch_image(&self, url: &str) -> Option<Operation> {
        let key = normalize_key(url);
        if self.shared.cache.contains(&key) {
            debug!("Image already cached: {}", key);
            return None;
        }

        let limit = self.max_image_bytes;
        let client = self.client.clone();
        let images = self.images.clone();
        let url = key.clone();
        Some(self.dispatcher.dispatch(OpKind::ImageFetch, key, async move {
            let blob = images
                .execute("image", || client.fetch_image(&url, limit), validate_image)
                .await?;
            Ok(Outcome::Image { url, blob })
        }))
    }

    fn submit_request(&self, id: u64, kind: MediaKind) -> Option<Operation> {
        let id = match validate_media_id(id) {
            Ok(id) => id,
            Err(e) => return self.reject("media id", e),
        };
        self.notify("Submitting request...", Severity::Info);

        let client = self.client.clone();
        let api = self.api.clone();
        Some(self.dispatcher.dispatch(
            OpKind::Submit,
            format!("{kind}/{id}"),
            async move {
                api.execute(
                    "request",
                    || client.submit_request(id, kind),
                    validate_confirmation,
                )
                .await
                .map(Outcome::Submitted)
            },
        ))
    }
}
