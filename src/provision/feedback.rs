//! Progress and affordance reporting for long-running provisioning
//!
//! Each capability is a separate trait whose methods default to doing
//! nothing, so a caller only implements what it can actually show.

use std::sync::Mutex;
use tokio::sync::watch;

/// The page hosting the operation; disabled while it runs
pub trait PageControl: Send + Sync {
    fn set_enabled(&self, _enabled: bool) {}
}

/// Determinate progress indicator
pub trait ProgressControl: Send + Sync {
    fn set_visible(&self, _visible: bool) {}
    fn set_value(&self, _value: u32) {}
    fn value(&self) -> u32 {
        0
    }
    fn maximum(&self) -> u32 {
        0
    }
    fn set_text(&self, _text: &str) {}
    fn set_text_visible(&self, _visible: bool) {}
}

/// Informational text next to the progress indicator
pub trait LabelControl: Send + Sync {
    fn set_text(&self, _text: &str) {}
    fn set_visible(&self, _visible: bool) {}
}

/// Navigation buttons hidden while an operation runs
pub trait ButtonControl: Send + Sync {
    fn set_visible(&self, _visible: bool) {}
}

/// Implements every capability as a no-op
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl PageControl for Silent {}
impl ProgressControl for Silent {}
impl LabelControl for Silent {}
impl ButtonControl for Silent {}

static SILENT: Silent = Silent;

/// The set of capabilities handed to one provisioning operation
#[derive(Clone, Copy)]
pub struct Feedback<'a> {
    pub page: &'a dyn PageControl,
    pub progress: &'a dyn ProgressControl,
    pub label: &'a dyn LabelControl,
    pub buttons: &'a dyn ButtonControl,
}

impl<'a> Feedback<'a> {
    /// Feedback that reports nothing
    pub fn new() -> Self {
        Self {
            page: &SILENT,
            progress: &SILENT,
            label: &SILENT,
            buttons: &SILENT,
        }
    }

    pub fn with_page(mut self, page: &'a dyn PageControl) -> Self {
        self.page = page;
        self
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressControl) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_label(mut self, label: &'a dyn LabelControl) -> Self {
        self.label = label;
        self
    }

    pub fn with_buttons(mut self, buttons: &'a dyn ButtonControl) -> Self {
        self.buttons = buttons;
        self
    }

    /// Use one object for every capability
    pub fn all<T>(surface: &'a T) -> Self
    where
        T: PageControl + ProgressControl + LabelControl + ButtonControl,
    {
        Self {
            page: surface,
            progress: surface,
            label: surface,
            buttons: surface,
        }
    }
}

impl Default for Feedback<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of everything an [`ObservableFeedback`] was told
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackState {
    pub page_enabled: bool,
    pub buttons_visible: bool,
    pub label_visible: bool,
    pub label_text: String,
    pub progress_visible: bool,
    pub progress_value: u32,
    pub progress_maximum: u32,
    pub progress_text: String,
    pub progress_text_visible: bool,
}

impl FeedbackState {
    fn idle(maximum: u32) -> Self {
        Self {
            page_enabled: true,
            buttons_visible: true,
            label_visible: false,
            label_text: String::new(),
            progress_visible: false,
            progress_value: 0,
            progress_maximum: maximum,
            progress_text: String::new(),
            progress_text_visible: false,
        }
    }
}

/// Feedback surface that publishes its state through a `watch` channel.
///
/// Used by front ends that render from a subscription instead of
/// implementing the capability traits themselves.
pub struct ObservableFeedback {
    state: watch::Sender<FeedbackState>,
    label_history: Mutex<Vec<String>>,
}

impl ObservableFeedback {
    pub const DEFAULT_MAXIMUM: u32 = 100;

    pub fn new() -> Self {
        Self::with_maximum(Self::DEFAULT_MAXIMUM)
    }

    pub fn with_maximum(maximum: u32) -> Self {
        let (state, _) = watch::channel(FeedbackState::idle(maximum));
        Self {
            state,
            label_history: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedbackState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> FeedbackState {
        self.state.borrow().clone()
    }

    /// Every label text set so far, oldest first
    pub fn label_history(&self) -> Vec<String> {
        self.label_history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }
}

impl Default for ObservableFeedback {
    fn default() -> Self {
        Self::new()
    }
}

impl PageControl for ObservableFeedback {
    fn set_enabled(&self, enabled: bool) {
        self.state.send_modify(|s| s.page_enabled = enabled);
    }
}

impl ProgressControl for ObservableFeedback {
    fn set_visible(&self, visible: bool) {
        self.state.send_modify(|s| s.progress_visible = visible);
    }

    fn set_value(&self, value: u32) {
        self.state.send_modify(|s| s.progress_value = value.min(s.progress_maximum));
    }

    fn value(&self) -> u32 {
        self.state.borrow().progress_value
    }

    fn maximum(&self) -> u32 {
        self.state.borrow().progress_maximum
    }

    fn set_text(&self, text: &str) {
        self.state.send_modify(|s| s.progress_text = text.to_string());
    }

    fn set_text_visible(&self, visible: bool) {
        self.state.send_modify(|s| s.progress_text_visible = visible);
    }
}

impl LabelControl for ObservableFeedback {
    fn set_text(&self, text: &str) {
        if let Ok(mut history) = self.label_history.lock() {
            history.push(text.to_string());
        }
        self.state.send_modify(|s| s.label_text = text.to_string());
    }

    fn set_visible(&self, visible: bool) {
        self.state.send_modify(|s| s.label_visible = visible);
    }
}

impl ButtonControl for ObservableFeedback {
    fn set_visible(&self, visible: bool) {
        self.state.send_modify(|s| s.buttons_visible = visible);
    }
}
