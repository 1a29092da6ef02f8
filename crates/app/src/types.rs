//! Core types and application state.
//!
//! All state lives in [`AppState`], mutated only on the UI thread.
//! Workers spawned from here communicate back through channels drained
//! by the `poll_*` methods each frame.

use backend::BackendClient;
use shared::api::{AppConfig, ChatMessage, ModelCatalog, Role, Usage};
use shared::settings::AppSettings;
use std::sync::mpsc::{channel, Receiver, TryRecvError};

use crate::i18n::{tr, Lang};
use crate::sessions::{Agent, ChatHistory, HistoryStore, Session};
use crate::state::{
    resolve_image_request, run_chat_request, run_config_fetch, run_image_request,
    run_models_fetch, run_usage_fetch, ChatOutcome, FetchedImage, ImageOutcome,
};

/// Which main view fills the central panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Chat,
    ImageGen,
}

/// Single-slot in-flight guard for one dispatch flow.
///
/// `Idle → InFlight` on acquire, back to `Idle` when the outcome is
/// applied. There is no third state: a second dispatch while in flight
/// is refused, never queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Latch {
    #[default]
    Idle,
    InFlight,
}

impl Latch {
    /// Returns false, without changing state, when already in flight.
    pub fn try_acquire(&mut self) -> bool {
        if *self == Latch::InFlight {
            return false;
        }
        *self = Latch::InFlight;
        true
    }

    pub fn release(&mut self) {
        *self = Latch::Idle;
    }

    pub fn is_in_flight(&self) -> bool {
        *self == Latch::InFlight
    }
}

/// A generated image in the gallery. The texture is decoded on the UI
/// thread; entries without one fall back to a hyperlink.
pub struct GalleryImage {
    pub url: String,
    pub texture: Option<egui::TextureHandle>,
}

pub struct AppState {
    pub settings: AppSettings,
    pub session: Session,
    pub history: ChatHistory,
    store: Box<dyn HistoryStore>,

    pub view: View,
    pub input_text: String,
    pub image_prompt: String,
    pub show_settings: bool,
    /// Modal notice: quota exhaustion, image failures.
    pub alert: Option<String>,

    pub app_config: Option<AppConfig>,
    pub usage: Option<Usage>,
    pub model_catalog: Option<ModelCatalog>,
    usage_refresh_pending: bool,

    pub chat_latch: Latch,
    pub image_latch: Latch,

    rx_chat: Option<Receiver<ChatOutcome>>,
    rx_image: Option<Receiver<ImageOutcome>>,
    rx_config: Option<Receiver<AppConfig>>,
    rx_usage: Option<Receiver<Usage>>,
    rx_models: Option<Receiver<ModelCatalog>>,

    pub gallery: Vec<GalleryImage>,
    pending_images: Vec<FetchedImage>,
}

impl AppState {
    pub fn new(settings: AppSettings, store: Box<dyn HistoryStore>) -> Self {
        let history = store.load();
        Self {
            settings,
            session: Session::default(),
            history,
            store,
            view: View::default(),
            input_text: String::new(),
            image_prompt: String::new(),
            show_settings: false,
            alert: None,
            app_config: None,
            usage: None,
            model_catalog: None,
            usage_refresh_pending: true,
            chat_latch: Latch::default(),
            image_latch: Latch::default(),
            rx_chat: None,
            rx_image: None,
            rx_config: None,
            rx_usage: None,
            rx_models: None,
            gallery: Vec::new(),
            pending_images: Vec::new(),
        }
    }

    pub fn lang(&self) -> Lang {
        Lang::from_code(&self.settings.language)
    }

    fn client(&self) -> BackendClient {
        BackendClient::new(&self.settings.server_url)
    }

    /// Localized application name for the sidebar and window title.
    pub fn app_name(&self) -> &str {
        match (&self.app_config, self.lang()) {
            (Some(config), Lang::Zh) => &config.app_name,
            (Some(config), Lang::En) => &config.app_name_en,
            (None, lang) => tr(lang, "title"),
        }
    }

    // ── Session & history operations ─────────────────────────────────

    pub fn new_chat(&mut self) {
        self.session.reset();
        self.view = View::Chat;
    }

    pub fn open_counselor(&mut self) {
        self.session.select_agent(Agent::Counselor);
        self.view = View::Chat;
    }

    /// Load a saved conversation; unknown ids are a silent no-op.
    pub fn load_chat(&mut self, id: &str) {
        let Some(messages) = self.history.load(id) else {
            return;
        };
        self.session.messages = messages;
        self.session.agent = Agent::Default;
        self.session.current_chat_id = Some(id.to_string());
        self.view = View::Chat;
    }

    pub fn delete_chat(&mut self, id: &str) {
        self.history.delete(id);
        if self.session.current_chat_id.as_deref() == Some(id) {
            self.session.reset();
        }
        self.store.persist(&self.history);
    }

    fn persist_session(&mut self) {
        if let Some(id) = self.history.save(&self.session) {
            self.session.current_chat_id = Some(id);
        }
        self.store.persist(&self.history);
    }

    // ── Chat dispatch ────────────────────────────────────────────────

    /// Guards and optimistic state mutation for a send. Returns the job
    /// for the worker, or `None` when the send is a no-op (empty input
    /// or a dispatch already in flight).
    fn prepare_send(&mut self) -> Option<(Agent, Vec<ChatMessage>)> {
        let text = self.input_text.trim().to_string();
        if text.is_empty() || !self.chat_latch.try_acquire() {
            return None;
        }
        self.session.append(Role::User, text);
        self.input_text.clear();
        Some((self.session.agent, self.session.messages.clone()))
    }

    pub fn send_message(&mut self) {
        let Some((agent, messages)) = self.prepare_send() else {
            return;
        };
        tracing::info!(?agent, count = messages.len(), "dispatching chat request");

        let (tx, rx) = channel();
        self.rx_chat = Some(rx);
        let client = self.client();
        let overrides = self.settings.chat.clone();
        std::thread::spawn(move || run_chat_request(client, agent, messages, overrides, tx));
    }

    fn apply_chat_outcome(&mut self, outcome: ChatOutcome) {
        match outcome {
            ChatOutcome::Reply(content) => {
                self.session.append(Role::Assistant, content);
                self.usage_refresh_pending = true;
                self.persist_session();
            }
            ChatOutcome::QuotaExceeded(detail) => {
                // Deliberately leaves no trace in the transcript.
                let text = if detail.trim().is_empty() {
                    tr(self.lang(), "quotaExceeded").to_string()
                } else {
                    detail
                };
                self.alert = Some(text);
                self.show_settings = true;
            }
            ChatOutcome::Error(content) => {
                self.session.append(Role::Assistant, content);
            }
        }
        // Released on every path; errors must never wedge the flow.
        self.chat_latch.release();
    }

    pub fn poll_chat_outcome(&mut self) {
        let Some(rx) = &self.rx_chat else { return };
        match rx.try_recv() {
            Ok(outcome) => {
                self.rx_chat = None;
                self.apply_chat_outcome(outcome);
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                tracing::warn!("chat worker died without reporting");
                self.rx_chat = None;
                self.session
                    .append(Role::Assistant, "Error: the request was interrupted");
                self.chat_latch.release();
            }
        }
    }

    // ── Image generation ─────────────────────────────────────────────

    pub fn generate_image(&mut self) {
        let prompt = self.image_prompt.trim().to_string();
        if prompt.is_empty() || !self.image_latch.try_acquire() {
            return;
        }
        let req = resolve_image_request(&prompt, &self.settings);
        tracing::info!(model = %req.model, "dispatching image request");

        let (tx, rx) = channel();
        self.rx_image = Some(rx);
        let client = self.client();
        std::thread::spawn(move || run_image_request(client, req, tx));
    }

    pub fn poll_image_outcome(&mut self) {
        let Some(rx) = &self.rx_image else { return };
        match rx.try_recv() {
            Ok(outcome) => {
                self.rx_image = None;
                match outcome {
                    ImageOutcome::Images(images) => {
                        self.gallery.clear();
                        self.pending_images = images;
                    }
                    ImageOutcome::Error(text) => self.alert = Some(text),
                }
                self.image_latch.release();
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                self.rx_image = None;
                self.image_latch.release();
            }
        }
    }

    /// Decode downloaded bytes into textures. Needs the egui context, so
    /// it runs from the frame loop rather than the worker.
    pub fn finish_gallery_images(&mut self, ctx: &egui::Context) {
        for fetched in self.pending_images.drain(..) {
            let texture = fetched.bytes.as_deref().and_then(|bytes| {
                let img = image::load_from_memory(bytes).ok()?;
                let rgba = img.to_rgba8();
                let size = [rgba.width() as usize, rgba.height() as usize];
                let pixels = rgba.into_raw();
                let color = egui::ColorImage::from_rgba_unmultiplied(size, &pixels);
                Some(ctx.load_texture(&fetched.url, color, egui::TextureOptions::LINEAR))
            });
            self.gallery.push(GalleryImage {
                url: fetched.url,
                texture,
            });
        }
    }

    // ── Config, quota, model catalog ─────────────────────────────────

    pub fn request_config(&mut self) {
        if self.rx_config.is_some() {
            return;
        }
        let (tx, rx) = channel();
        self.rx_config = Some(rx);
        let client = self.client();
        std::thread::spawn(move || run_config_fetch(client, tx));
    }

    pub fn request_models(&mut self) {
        if self.rx_models.is_some() {
            return;
        }
        let (tx, rx) = channel();
        self.rx_models = Some(rx);
        let client = self.client();
        std::thread::spawn(move || run_models_fetch(client, tx));
    }

    pub fn mark_usage_dirty(&mut self) {
        self.usage_refresh_pending = true;
    }

    /// Kick a pending usage refresh. With a custom key configured the
    /// quota does not apply, so the display hides instead of fetching.
    pub fn service_usage_refresh(&mut self) {
        if !self.usage_refresh_pending || self.rx_usage.is_some() {
            return;
        }
        self.usage_refresh_pending = false;

        if !self.settings.chat.api_key.trim().is_empty() {
            self.usage = None;
            return;
        }

        let (tx, rx) = channel();
        self.rx_usage = Some(rx);
        let client = self.client();
        std::thread::spawn(move || run_usage_fetch(client, tx));
    }

    pub fn poll_background_fetches(&mut self) {
        if let Some(rx) = &self.rx_config {
            match rx.try_recv() {
                Ok(config) => {
                    self.app_config = Some(config);
                    self.rx_config = None;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => self.rx_config = None,
            }
        }
        if let Some(rx) = &self.rx_usage {
            match rx.try_recv() {
                Ok(usage) => {
                    self.usage = Some(usage);
                    self.rx_usage = None;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    // Fetch failed: hide the display rather than block.
                    self.usage = None;
                    self.rx_usage = None;
                }
            }
        }
        if let Some(rx) = &self.rx_models {
            match rx.try_recv() {
                Ok(catalog) => {
                    self.model_catalog = Some(catalog);
                    self.rx_models = None;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => self.rx_models = None,
            }
        }
    }

    /// Whether anything is outstanding that the frame loop should keep
    /// polling for.
    pub fn wants_repaint(&self) -> bool {
        self.rx_chat.is_some()
            || self.rx_image.is_some()
            || self.rx_config.is_some()
            || self.rx_usage.is_some()
            || self.rx_models.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::HISTORY_LIMIT;

    /// In-memory stand-in for the file store.
    struct NullStore;

    impl HistoryStore for NullStore {
        fn load(&self) -> ChatHistory {
            ChatHistory::default()
        }

        fn persist(&self, _history: &ChatHistory) {}
    }

    fn app() -> AppState {
        AppState::new(AppSettings::default(), Box::new(NullStore))
    }

    #[test]
    fn latch_refuses_reentry() {
        let mut latch = Latch::default();
        assert!(latch.try_acquire());
        assert!(latch.is_in_flight());
        assert!(!latch.try_acquire());
        latch.release();
        assert!(latch.try_acquire());
    }

    #[test]
    fn empty_input_is_ignored() {
        let mut state = app();
        state.input_text = "   ".to_string();
        assert!(state.prepare_send().is_none());
        assert!(state.session.is_empty());
        assert!(!state.chat_latch.is_in_flight());
    }

    #[test]
    fn dispatch_while_in_flight_is_a_no_op() {
        let mut state = app();
        state.input_text = "Hello".to_string();
        assert!(state.prepare_send().is_some());
        assert_eq!(state.session.messages.len(), 1);

        // Second send before the outcome lands: nothing changes.
        state.input_text = "again".to_string();
        assert!(state.prepare_send().is_none());
        assert_eq!(state.session.messages.len(), 1);
        assert_eq!(state.input_text, "again");
    }

    #[test]
    fn successful_exchange_appends_and_creates_a_conversation() {
        let mut state = app();
        state.input_text = "Hello".to_string();
        let (agent, messages) = state.prepare_send().unwrap();
        assert_eq!(agent, Agent::Default);
        assert_eq!(messages.len(), 1);
        assert!(state.input_text.is_empty());

        state.apply_chat_outcome(ChatOutcome::Reply("Hi there!".to_string()));

        assert_eq!(state.session.messages.len(), 2);
        assert_eq!(state.session.messages[1].role, Role::Assistant);
        assert!(!state.chat_latch.is_in_flight());

        // Exactly one conversation, titled from the first user message.
        assert_eq!(state.history.len(), 1);
        let id = state.session.current_chat_id.clone().unwrap();
        assert_eq!(state.history.get(&id).unwrap().title, "Hello");
    }

    #[test]
    fn second_exchange_updates_the_same_conversation() {
        let mut state = app();
        state.input_text = "Hello".to_string();
        state.prepare_send().unwrap();
        state.apply_chat_outcome(ChatOutcome::Reply("Hi".to_string()));
        let id = state.session.current_chat_id.clone().unwrap();

        state.input_text = "More".to_string();
        state.prepare_send().unwrap();
        state.apply_chat_outcome(ChatOutcome::Reply("Sure".to_string()));

        assert_eq!(state.history.len(), 1);
        assert_eq!(state.session.current_chat_id.as_deref(), Some(id.as_str()));
        assert_eq!(state.history.get(&id).unwrap().messages.len(), 4);
    }

    #[test]
    fn quota_exceeded_surfaces_without_touching_the_transcript() {
        let mut state = app();
        state.input_text = "Hello".to_string();
        state.prepare_send().unwrap();

        state.apply_chat_outcome(ChatOutcome::QuotaExceeded("limit reached".to_string()));

        // Only the optimistic user message; no assistant entry.
        assert_eq!(state.session.messages.len(), 1);
        assert_eq!(state.alert.as_deref(), Some("limit reached"));
        assert!(state.show_settings);
        assert!(!state.chat_latch.is_in_flight());
        assert!(state.history.is_empty());
    }

    #[test]
    fn blank_quota_detail_falls_back_to_the_localized_string() {
        let mut state = app();
        state.input_text = "Hello".to_string();
        state.prepare_send().unwrap();
        state.apply_chat_outcome(ChatOutcome::QuotaExceeded(String::new()));
        assert_eq!(
            state.alert.as_deref(),
            Some("免费配额已用完，请在设置中输入自己的 API Key")
        );
    }

    #[test]
    fn errors_append_inline_and_release_the_latch() {
        let mut state = app();
        state.input_text = "Hello".to_string();
        state.prepare_send().unwrap();

        state.apply_chat_outcome(ChatOutcome::Error("Error: boom".to_string()));

        assert_eq!(state.session.messages.len(), 2);
        assert_eq!(state.session.messages[1].content, "Error: boom");
        assert!(!state.chat_latch.is_in_flight());
        // Failed exchanges are not persisted as conversations.
        assert!(state.history.is_empty());
    }

    #[test]
    fn deleting_the_active_conversation_resets_the_session() {
        let mut state = app();
        state.input_text = "Hello".to_string();
        state.prepare_send().unwrap();
        state.apply_chat_outcome(ChatOutcome::Reply("Hi".to_string()));
        let id = state.session.current_chat_id.clone().unwrap();

        state.delete_chat(&id);

        assert!(state.session.is_empty());
        assert!(state.session.current_chat_id.is_none());
        assert!(state.history.is_empty());
    }

    #[test]
    fn deleting_another_conversation_keeps_the_session() {
        let mut state = app();
        state.input_text = "First".to_string();
        state.prepare_send().unwrap();
        state.apply_chat_outcome(ChatOutcome::Reply("Hi".to_string()));
        let first = state.session.current_chat_id.clone().unwrap();

        state.new_chat();
        state.input_text = "Second".to_string();
        state.prepare_send().unwrap();
        state.apply_chat_outcome(ChatOutcome::Reply("Hi".to_string()));

        state.delete_chat(&first);

        assert_eq!(state.session.messages.len(), 2);
        assert!(state.session.current_chat_id.is_some());
        assert_eq!(state.history.len(), 1);
    }

    #[test]
    fn history_never_exceeds_the_cap() {
        let mut state = app();
        for i in 0..HISTORY_LIMIT + 5 {
            state.new_chat();
            state.input_text = format!("chat {i}");
            state.prepare_send().unwrap();
            state.apply_chat_outcome(ChatOutcome::Reply("ok".to_string()));
        }
        assert_eq!(state.history.len(), HISTORY_LIMIT);
    }

    #[test]
    fn loading_a_saved_chat_restores_messages() {
        let mut state = app();
        state.input_text = "Hello".to_string();
        state.prepare_send().unwrap();
        state.apply_chat_outcome(ChatOutcome::Reply("Hi".to_string()));
        let id = state.session.current_chat_id.clone().unwrap();

        state.new_chat();
        assert!(state.session.is_empty());

        state.load_chat(&id);
        assert_eq!(state.session.messages.len(), 2);
        assert_eq!(state.session.current_chat_id.as_deref(), Some(id.as_str()));

        // Unknown id: silent no-op.
        state.load_chat("missing");
        assert_eq!(state.session.current_chat_id.as_deref(), Some(id.as_str()));
    }

    #[test]
    fn counselor_selection_routes_and_resets() {
        let mut state = app();
        state.input_text = "Hello".to_string();
        state.prepare_send().unwrap();
        state.apply_chat_outcome(ChatOutcome::Reply("Hi".to_string()));

        state.open_counselor();
        assert!(state.session.is_empty());

        state.input_text = "I feel stressed".to_string();
        let (agent, _) = state.prepare_send().unwrap();
        assert_eq!(agent, Agent::Counselor);
    }
}
