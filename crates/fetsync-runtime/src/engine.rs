#![forbid(unsafe_code)]

//! Display engine: wires collaborators, context and scheduler together.
//!
//! The engine owns no policy of its own. It turns inputs (navigation events,
//! display-mode changes, explanation completions, channel revisions) into
//! invalidations, folds every invalidation that arrives before the next
//! render tick into a single resolution, and publishes the result on a
//! [`DisplayStream`].
//!
//! # Coalescing
//!
//! An invalidation arms one `request_tick` callback. Further invalidations
//! before that tick fires only bump a counter. When the tick fires the
//! resolver runs once against a fresh [`CombinedFrame`], so a burst of
//! updates produces at most one published frame per tick.
//!
//! # Example
//!
//! ```ignore
//! let scheduler = Rc::new(VirtualScheduler::new_virtual(0, 16));
//! let engine = DisplayEngine::new(EngineConfig::default(), scheduler.clone(), collaborators);
//! engine.start(0);
//! engine.handle_navigation(NavigationEvent::start(1, scheduler.now_ms()));
//! scheduler.advance(200);
//! println!("{}", engine.display_text());
//! ```

use std::cell::{Cell, RefCell};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::{Rc, Weak};

use tracing::{debug, info_span, warn};
use web_time::Instant;

use crate::channel::{QuestionIndex, ResolveOutcome};
use crate::collaborators::{
    BannerSource, DisplayMode, DisplayModeState, ExplanationProducer, ExplanationReceiver, ExplanationRequest,
    ExplanationSink, NavigationEvent, NavigationPhase, QuestionSource,
};
use crate::config::EngineConfig;
use crate::context::SyncContext;
use crate::coordinator::{NavigationReset, ResetCoordinator};
use crate::error::{SyncError, panic_message};
use crate::reactive::{Observable, Subscription};
use crate::resolver::{
    CombinedFrame, DisplayResolver, DisplayState, ExplanationView, Placeholders, Resolution,
};
use crate::scheduler::TickScheduler;
use crate::stats::{StatsSnapshot, SyncStats};

/// External systems the engine reads from.
#[derive(Clone)]
pub struct Collaborators {
    pub questions: Rc<dyn QuestionSource>,
    pub banners: Rc<dyn BannerSource>,
    pub producer: Rc<dyn ExplanationProducer>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Lossy, restartable stream of display strings.
///
/// New subscribers receive the latest value immediately, then every change.
/// Intermediate values inside one tick are never observed.
#[derive(Debug, Clone)]
pub struct DisplayStream {
    value: Observable<String>,
}

impl DisplayStream {
    /// Latest published text.
    #[must_use]
    pub fn latest(&self) -> String {
        self.value.get()
    }

    /// Subscribe; `callback` fires once right away with the latest value.
    pub fn subscribe(&self, callback: impl Fn(&str) + 'static) -> Subscription {
        self.value.subscribe_current(move |text: &String| callback(text))
    }

    /// Number of distinct values published so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.value.version()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Inputs {
    index: QuestionIndex,
    mode: DisplayModeState,
    should_show: bool,
    navigating: bool,
}

struct EngineInner {
    ctx: Rc<SyncContext>,
    scheduler: Rc<dyn TickScheduler>,
    coordinator: ResetCoordinator,
    collaborators: Collaborators,
    config: EngineConfig,
    inputs: Cell<Inputs>,
    resolver: RefCell<DisplayResolver>,
    display: Observable<String>,
    content_available: Observable<bool>,
    state: Cell<DisplayState>,
    /// Sequence number of the armed tick, if any.
    armed_tick: Cell<Option<u64>>,
    tick_seq: Cell<u64>,
    weak_self: Weak<EngineInner>,
    _channel_watch: Subscription,
}

/// The explanation-display synchronization engine.
///
/// Cheap to clone; clones share the same engine.
#[derive(Clone)]
pub struct DisplayEngine {
    inner: Rc<EngineInner>,
}

impl DisplayEngine {
    /// Create an engine with its own [`SyncContext`].
    pub fn new(
        config: EngineConfig,
        scheduler: Rc<dyn TickScheduler>,
        collaborators: Collaborators,
    ) -> Self {
        Self::with_context(Rc::new(SyncContext::new()), config, scheduler, collaborators)
    }

    /// Create an engine over an existing context.
    pub fn with_context(
        ctx: Rc<SyncContext>,
        config: EngineConfig,
        scheduler: Rc<dyn TickScheduler>,
        collaborators: Collaborators,
    ) -> Self {
        let coordinator =
            ResetCoordinator::from_config(Rc::clone(&ctx), Rc::clone(&scheduler), &config);
        let placeholders = Placeholders::from_config(&config);
        let initial = placeholders.loading.clone();

        let inner = Rc::new_cyclic(|weak: &Weak<EngineInner>| {
            let watcher = weak.clone();
            let channel_watch = ctx.channel().subscribe(move |_revision| {
                if let Some(inner) = watcher.upgrade() {
                    inner.invalidate("channel");
                }
            });
            EngineInner {
                ctx,
                scheduler,
                coordinator,
                collaborators,
                config,
                inputs: Cell::new(Inputs::default()),
                resolver: RefCell::new(DisplayResolver::new(placeholders)),
                display: Observable::new(initial),
                content_available: Observable::new(false),
                state: Cell::new(DisplayState::QuestionOnly),
                armed_tick: Cell::new(None),
                tick_seq: Cell::new(0),
                weak_self: weak.clone(),
                _channel_watch: channel_watch,
            }
        });
        Self { inner }
    }

    /// Load the first question of a session and resolve immediately.
    pub fn start(&self, index: QuestionIndex) {
        let inner = &self.inner;
        inner.coordinator.begin_session(index);
        inner.inputs.set(Inputs {
            index,
            ..Inputs::default()
        });
        inner.armed_tick.set(None);
        inner.resolve_now();
    }

    /// Feed a navigation event from the navigation service.
    ///
    /// `Start` runs the reset sequence and clears per-question display
    /// inputs. `Complete` clears the navigating flag if it targets the
    /// question being navigated to; a stale completion is ignored.
    pub fn handle_navigation(&self, event: NavigationEvent) -> Option<NavigationReset> {
        let inner = &self.inner;
        match event.phase {
            NavigationPhase::Start => Some(inner.begin_navigation(event.target_index)),
            NavigationPhase::Complete => {
                let mut inputs = inner.inputs.get();
                if inputs.index != event.target_index {
                    debug!(
                        requested = event.target_index,
                        active = inputs.index,
                        "ignoring completion for superseded navigation"
                    );
                    return None;
                }
                if inputs.navigating {
                    inputs.navigating = false;
                    inner.inputs.set(inputs);
                    inner.invalidate("navigation_complete");
                }
                None
            }
        }
    }

    /// Navigate to `index` and complete the navigation in one step.
    pub fn navigate(&self, index: QuestionIndex) -> NavigationReset {
        let reset = self.inner.begin_navigation(index);
        let now = self.inner.scheduler.now_ms();
        self.handle_navigation(NavigationEvent::complete(index, now));
        reset
    }

    /// Push the display-mode store's current value.
    pub fn set_display_mode(&self, mode: DisplayModeState) {
        self.inner.update_inputs(|inputs| inputs.mode = mode);
    }

    /// Switch between question and explanation mode, keeping `answered`.
    pub fn set_mode(&self, mode: DisplayMode) {
        self.inner.update_inputs(|inputs| inputs.mode.mode = mode);
    }

    /// Whether the host asks for the explanation to be shown.
    pub fn set_should_show(&self, should_show: bool) {
        self.inner
            .update_inputs(|inputs| inputs.should_show = should_show);
    }

    /// Mark the active question as answered.
    pub fn mark_answered(&self) {
        self.inner
            .update_inputs(|inputs| inputs.mode.answered = true);
    }

    /// Ask the producer for the active question's explanation under the
    /// current generation.
    pub fn request_explanation(&self) -> ExplanationRequest {
        self.inner.request_explanation()
    }

    /// Re-read collaborators on the next tick (e.g. question data loaded).
    pub fn refresh(&self) {
        self.inner.invalidate("refresh");
    }

    /// Resolve synchronously, cancelling any pending tick.
    pub fn flush(&self) -> Resolution {
        self.inner.armed_tick.set(None);
        self.inner.resolve_now()
    }

    /// Text currently published on the display stream. Never empty.
    #[must_use]
    pub fn display_text(&self) -> String {
        self.inner.display.get()
    }

    #[must_use]
    pub fn display_state(&self) -> DisplayState {
        self.inner.state.get()
    }

    #[must_use]
    pub fn display_stream(&self) -> DisplayStream {
        DisplayStream {
            value: self.inner.display.clone(),
        }
    }

    /// Whether the active question has text and options to show.
    #[must_use]
    pub fn is_content_available(&self) -> bool {
        self.inner.content_available.get()
    }

    /// Watch the content-available signal; fires once right away.
    pub fn watch_content_available(&self, callback: impl Fn(bool) + 'static) -> Subscription {
        self.inner
            .content_available
            .subscribe_current(move |available: &bool| callback(*available))
    }

    #[must_use]
    pub fn current_index(&self) -> QuestionIndex {
        self.inner.inputs.get().index
    }

    #[must_use]
    pub fn is_navigating(&self) -> bool {
        self.inner.inputs.get().navigating
    }

    /// Whether a resolution is scheduled for the next tick.
    #[must_use]
    pub fn has_pending_tick(&self) -> bool {
        self.inner.armed_tick.get().is_some()
    }

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.ctx.stats().snapshot()
    }

    #[must_use]
    pub fn context(&self) -> &Rc<SyncContext> {
        &self.inner.ctx
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for DisplayEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inputs = self.inner.inputs.get();
        f.debug_struct("DisplayEngine")
            .field("index", &inputs.index)
            .field("navigating", &inputs.navigating)
            .field("state", &self.inner.state.get())
            .field("armed_tick", &self.inner.armed_tick.get())
            .finish_non_exhaustive()
    }
}

impl EngineInner {
    fn stats(&self) -> &SyncStats {
        self.ctx.stats()
    }

    fn update_inputs(&self, f: impl FnOnce(&mut Inputs)) {
        let mut inputs = self.inputs.get();
        f(&mut inputs);
        self.inputs.set(inputs);
        self.invalidate("inputs");
    }

    fn begin_navigation(&self, target: QuestionIndex) -> NavigationReset {
        self.inputs.set(Inputs {
            index: target,
            navigating: true,
            ..Inputs::default()
        });
        let reset = self.coordinator.navigate(target);
        self.schedule_quiet_end(reset.quiet_until_ms);
        self.invalidate("navigation_start");
        reset
    }

    /// Arm a resolution for the next tick, or fold into the armed one.
    ///
    /// A tick disarmed by `flush` or `start` still fires but finds a newer
    /// (or no) sequence number and does nothing.
    fn invalidate(&self, reason: &'static str) {
        if self.armed_tick.get().is_some() {
            self.stats().coalesced_invalidations();
            tracing::trace!(reason, "invalidation coalesced");
            return;
        }
        let seq = self.tick_seq.get().wrapping_add(1);
        self.tick_seq.set(seq);
        self.armed_tick.set(Some(seq));
        tracing::trace!(reason, seq, "resolution armed for next tick");

        let weak = self.weak_self.clone();
        self.scheduler.request_tick(Box::new(move || {
            if let Some(inner) = weak.upgrade()
                && inner.armed_tick.get() == Some(seq)
            {
                inner.armed_tick.set(None);
                inner.resolve_now();
            }
        }));
    }

    fn schedule_quiet_end(&self, quiet_until_ms: u64) {
        let delay = quiet_until_ms.saturating_sub(self.scheduler.now_ms());
        let weak = self.weak_self.clone();
        let cycle = self.ctx.quiet().cycle();
        self.scheduler.schedule_after(
            delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade()
                    && inner.ctx.quiet().cycle() == cycle
                {
                    inner.invalidate("quiet_end");
                }
            }),
        );
    }

    fn request_explanation(&self) -> ExplanationRequest {
        let request = ExplanationRequest {
            index: self.inputs.get().index,
            generation: self.ctx.ledger().current(),
        };
        let receiver: Weak<dyn ExplanationReceiver> = self.weak_self.clone();
        let sink = ExplanationSink::new(request, receiver);
        debug!(
            index = request.index,
            generation = request.generation.get(),
            "explanation requested"
        );

        let producer = Rc::clone(&self.collaborators.producer);
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| producer.request(request, sink))) {
            self.stats().caught_panics();
            warn!(
                index = request.index,
                panic = %panic_message(payload.as_ref()),
                "explanation producer panicked"
            );
        }
        request
    }

    /// Call into a collaborator, treating a panic as an empty answer.
    fn guarded<T: Default>(&self, what: &'static str, f: impl FnOnce() -> T) -> T {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => value,
            Err(payload) => {
                self.stats().caught_panics();
                warn!(
                    collaborator = what,
                    panic = %panic_message(payload.as_ref()),
                    "collaborator panicked"
                );
                T::default()
            }
        }
    }

    fn build_frame(&self) -> (CombinedFrame, usize) {
        let inputs = self.inputs.get();
        let index = inputs.index;
        let questions = &self.collaborators.questions;

        let question_text = self.guarded("question_text", || questions.question_text(index));
        let multiple_answer = self.guarded("is_multiple_answer", || {
            questions.is_multiple_answer(index)
        });
        let option_count = self.guarded("option_count", || questions.option_count(index));
        let banner_text = if multiple_answer {
            let banners = &self.collaborators.banners;
            self.guarded("correct_answer_banner", || {
                banners.correct_answer_banner(index)
            })
        } else {
            String::new()
        };

        let channel = self.ctx.channel();
        let explanation = channel
            .record(index)
            .map(|record| ExplanationView {
                index: Some(record.index),
                text: record.text,
                gate_open: record.gate_open,
                generation: record.generation,
            })
            .unwrap_or_default();

        let frame = CombinedFrame {
            index,
            question_text,
            banner_text,
            multiple_answer,
            explanation,
            should_show: inputs.should_show,
            mode: inputs.mode,
            navigating: inputs.navigating,
            locked: channel.is_locked(),
            current_generation: self.ctx.ledger().current(),
            quiet_until_ms: self.ctx.quiet().until(),
            now_ms: self.scheduler.now_ms(),
        };
        (frame, option_count)
    }

    fn resolve_now(&self) -> Resolution {
        let started = Instant::now();
        let index = self.inputs.get().index;
        let span = info_span!(
            "fetsync.resolve",
            index,
            state = tracing::field::Empty,
            duration_us = tracing::field::Empty
        );
        let _guard = span.enter();

        let (frame, option_count) = self.build_frame();
        let resolution = self.resolver.borrow_mut().resolve(&frame);
        self.stats().resolutions();
        if let Some(SyncError::ResolverPanicked { .. }) = resolution.absorbed {
            self.stats().caught_panics();
        }

        self.state.set(resolution.state);
        let available = !frame.question_text.trim().is_empty() && option_count > 0;
        self.content_available.set(available);
        if self.display.set(resolution.text.clone()) {
            self.stats().frames_emitted();
            debug!(
                index,
                state = ?resolution.state,
                generation = frame.current_generation.get(),
                "display frame emitted"
            );
        }

        span.record("state", tracing::field::debug(resolution.state));
        span.record("duration_us", started.elapsed().as_micros() as u64);
        resolution
    }
}

impl ExplanationReceiver for EngineInner {
    fn receive(
        &self,
        request: ExplanationRequest,
        text: Option<String>,
    ) -> Result<ResolveOutcome, SyncError> {
        let index = request.index;
        let text = match text {
            Some(text) => text,
            None => {
                self.stats().missing_explanations();
                let err = SyncError::MissingExplanation { index };
                let resolver = self.resolver.borrow();
                let Some(literal) = resolver.placeholders().literal(err.fallback()) else {
                    return Err(err);
                };
                debug!(index, error = %err, "using fallback literal");
                literal.to_owned()
            }
        };

        let result = self
            .ctx
            .channel()
            .resolve(index, &text, request.generation);
        let stats = self.stats();
        match &result {
            Ok(ResolveOutcome::Opened) => stats.gates_opened(),
            Ok(ResolveOutcome::Deferred) => {
                stats.deferred_resolves();
                let held = SyncError::ChannelLocked { index };
                debug!(error = %held, "explanation held");
            }
            Ok(ResolveOutcome::NoContent) => stats.empty_resolves(),
            Ok(ResolveOutcome::Unchanged) => {}
            Err(SyncError::StaleGeneration { .. }) => stats.stale_discards(),
            Err(SyncError::IndexMismatch { .. }) => stats.mismatch_discards(),
            Err(_) => {}
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
