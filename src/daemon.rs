//! Orchestrator: owns the interpreter, the snapshot store and the switcher
//! session, and routes every input (keys, timer expiry, control socket,
//! compositor events) through one event loop.

use crate::config::Config;
use crate::event_interpreter::{
    InterpreterConfig, Outcome, ShortcutEvent, ShortcutEventInterpreter, TimerRequest,
};
use crate::ipc::{ApplicationSummary, IpcCommand, IpcResponse, ResultSummary};
use crate::keys::RawKeyEvent;
use crate::model::Pid;
use crate::modifiers::Modifier;
use crate::preferences::Preferences;
use crate::ranking;
use crate::snapshot_store::{Snapshot, WindowSnapshotStore};
use crate::socket_server::IpcRequest;
use crate::ui_commands::UiCommand;
use crate::window_enumerator::{
    DEFAULT_ACTIVATION_RETRY_DELAY, WindowActivator, WindowEnumerator, activate_with_fallback,
};
use crate::window_switcher::{ActivationTarget, SessionOptions, WindowSwitcher, quick_switch_target};
use anyhow::{Context, Result};
use futures_lite::stream::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use swayipc_async::{Connection, Event, EventType, WindowChange};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Compositor notifications the daemon reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositorEvent {
    /// A window of this process received focus
    Activated(Pid),
    TitleChanged(Pid),
    /// Windows appeared, disappeared or moved between workspaces
    WindowsChanged,
}

/// Messages the daemon sends itself from timers and background tasks
#[derive(Debug)]
enum Internal {
    TimerFired(u64),
    SnapshotLoaded(Snapshot),
}

pub struct DaemonInputs {
    pub keys: mpsc::UnboundedReceiver<RawKeyEvent>,
    pub ipc: mpsc::UnboundedReceiver<IpcRequest>,
    pub compositor: mpsc::UnboundedReceiver<CompositorEvent>,
}

#[derive(Debug, Clone)]
pub struct DaemonSettings {
    pub interpreter: InterpreterConfig,
    pub session: SessionOptions,
    pub preferences: Preferences,
    pub preferences_path: Option<PathBuf>,
    /// Modifier given on the command line; wins over the preferences file
    pub modifier_override: Option<Modifier>,
    pub retry_delay: Duration,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        DaemonSettings {
            interpreter: InterpreterConfig::default(),
            session: SessionOptions::default(),
            preferences: Preferences::default(),
            preferences_path: None,
            modifier_override: None,
            retry_delay: DEFAULT_ACTIVATION_RETRY_DELAY,
        }
    }
}

impl DaemonSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        let path = config.preferences_path()?;
        let preferences = match Preferences::load(&path) {
            Ok(preferences) => preferences,
            Err(e) => {
                warn!("{:#}; using default preferences", e);
                Preferences::default()
            }
        };

        Ok(DaemonSettings {
            interpreter: config.interpreter_config(&preferences),
            session: config.session_options(&preferences),
            modifier_override: config.modifier,
            preferences_path: Some(path),
            preferences,
            retry_delay: DEFAULT_ACTIVATION_RETRY_DELAY,
        })
    }
}

struct PendingTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct Daemon<B: WindowEnumerator + WindowActivator + 'static> {
    store: Arc<WindowSnapshotStore<B>>,
    interpreter: ShortcutEventInterpreter,
    settings: DaemonSettings,
    session: Option<WindowSwitcher>,
    ui_tx: Option<mpsc::UnboundedSender<UiCommand>>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: Option<mpsc::UnboundedReceiver<Internal>>,
    timer: Option<PendingTimer>,
    /// Most recent blocking task (activation, reload of the snapshot)
    in_flight: Option<JoinHandle<()>>,
}

impl<B: WindowEnumerator + WindowActivator + 'static> Daemon<B> {
    pub fn new(
        store: Arc<WindowSnapshotStore<B>>,
        settings: DaemonSettings,
        ui_tx: Option<mpsc::UnboundedSender<UiCommand>>,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        Daemon {
            store,
            interpreter: ShortcutEventInterpreter::new(settings.interpreter),
            settings,
            session: None,
            ui_tx,
            internal_tx,
            internal_rx: Some(internal_rx),
            timer: None,
            in_flight: None,
        }
    }

    /// Main event loop
    pub async fn run(mut self, mut inputs: DaemonInputs) -> Result<()> {
        info!("Starting daemon event loop");
        let mut internal_rx = self
            .internal_rx
            .take()
            .context("Daemon event loop already started")?;

        // Warm the cache so the first switch has data
        self.store.prefetch_async();

        loop {
            // Polled in order: a queued key event is always handled before a
            // queued timer expiry, so a release that reached the queue wins.
            tokio::select! {
                biased;

                Some(event) = inputs.keys.recv() => {
                    self.handle_key_event(event, Instant::now());
                }
                Some(message) = internal_rx.recv() => {
                    self.handle_internal(message);
                }
                Some(request) = inputs.ipc.recv() => {
                    let shutdown = request.command == IpcCommand::Shutdown;
                    let response = self.handle_ipc(request.command);
                    if request.reply.send(response).is_err() {
                        debug!("IPC client went away before the reply");
                    }
                    if shutdown {
                        info!("Shutdown requested");
                        break;
                    }
                }
                Some(event) = inputs.compositor.recv() => {
                    self.handle_compositor_event(event);
                }
                else => {
                    info!("All channels closed, shutting down");
                    break;
                }
            }
        }

        self.cancel_timer();
        self.close_session();
        if let Some(task) = self.in_flight.take()
            && let Err(e) = task.await
        {
            warn!("Background task failed during shutdown: {}", e);
        }
        Ok(())
    }

    fn handle_key_event(&mut self, event: RawKeyEvent, now: Instant) {
        let outcome = self.interpreter.handle(event, now);
        if outcome.consumed() {
            // Input is only observed; other clients still receive the key.
            trace!("Shortcut key {:?}", event);
        }
        self.apply(outcome);
    }

    fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::TimerFired(generation) => {
                if self
                    .timer
                    .as_ref()
                    .is_some_and(|timer| timer.generation == generation)
                {
                    self.timer = None;
                }
                let outcome = self.interpreter.timer_fired(generation, Instant::now());
                self.apply(outcome);
            }
            Internal::SnapshotLoaded(snapshot) => {
                if let Some(session) = self.session.as_mut() {
                    debug!("Fresh snapshot with {} applications", snapshot.len());
                    session.replace_applications(snapshot);
                    self.render();
                }
            }
        }
    }

    fn handle_compositor_event(&mut self, event: CompositorEvent) {
        debug!("Compositor event: {:?}", event);
        match event {
            CompositorEvent::Activated(pid) => {
                self.store.handle_app_activated(pid);
            }
            CompositorEvent::TitleChanged(pid) => {
                let store = Arc::clone(&self.store);
                self.in_flight = Some(tokio::task::spawn_blocking(move || {
                    store.refresh_application(pid);
                }));
            }
            CompositorEvent::WindowsChanged => self.store.invalidate(),
        }
    }

    fn handle_ipc(&mut self, command: IpcCommand) -> IpcResponse {
        debug!("IPC command: {:?}", command);
        match command {
            IpcCommand::Show => {
                if self.session.is_none() {
                    self.show_switcher();
                }
                IpcResponse::Ok
            }
            IpcCommand::Next | IpcCommand::Prev => {
                if self.session.is_none() {
                    self.show_switcher();
                }
                let forward = command == IpcCommand::Next;
                self.move_selection(|session| {
                    session.cycle(forward);
                });
                IpcResponse::Ok
            }
            IpcCommand::Select => {
                if self.session.is_none() {
                    return IpcResponse::Error("Switcher is not visible".to_string());
                }
                let outcome = self.interpreter.dismiss();
                self.apply_timer(outcome.timer);
                self.confirm();
                IpcResponse::Ok
            }
            IpcCommand::Cancel => {
                let outcome = self.interpreter.dismiss();
                self.apply(outcome);
                self.close_session();
                IpcResponse::Ok
            }
            IpcCommand::Status => IpcResponse::Status {
                state: format!("{:?}", self.interpreter.state()),
                switching: self.session.is_some(),
                searching: self.session.as_ref().is_some_and(WindowSwitcher::is_searching),
                application_count: self
                    .session
                    .as_ref()
                    .map(|session| session.applications().len())
                    .unwrap_or_else(|| self.store.cached_snapshot().len()),
                current_index: self.session.as_ref().map(WindowSwitcher::current_index),
                cache_fresh: self.store.is_fresh(),
            },
            IpcCommand::List => {
                let snapshot = self.cached_for_query();
                IpcResponse::Applications(snapshot.iter().map(ApplicationSummary::from).collect())
            }
            IpcCommand::Search(query) => {
                let snapshot = self.cached_for_query();
                let results = ranking::search(&snapshot, &query);
                IpcResponse::Results(results.iter().map(ResultSummary::from).collect())
            }
            IpcCommand::Query(text) => match self.session.as_mut() {
                Some(session) => {
                    session.set_query(&text);
                    self.render();
                    IpcResponse::Ok
                }
                None => IpcResponse::Error("Switcher is not visible".to_string()),
            },
            IpcCommand::Reload => match self.reload_preferences() {
                Ok(()) => IpcResponse::Ok,
                Err(e) => IpcResponse::Error(format!("{:#}", e)),
            },
            IpcCommand::Shutdown => IpcResponse::Ok,
        }
    }

    /// Cached data for one-shot queries; kicks off a refresh when stale.
    fn cached_for_query(&self) -> Snapshot {
        if !self.store.is_fresh() {
            self.store.prefetch_async();
        }
        self.store.cached_snapshot()
    }

    fn apply(&mut self, outcome: Outcome) {
        self.apply_timer(outcome.timer);
        for event in outcome.events {
            self.dispatch(event);
        }
    }

    fn apply_timer(&mut self, request: Option<TimerRequest>) {
        match request {
            Some(TimerRequest::Arm { generation, after }) => {
                self.cancel_timer();
                let tx = self.internal_tx.clone();
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    if tx.send(Internal::TimerFired(generation)).is_err() {
                        debug!("Daemon gone before activation timer {} fired", generation);
                    }
                });
                self.timer = Some(PendingTimer { generation, handle });
            }
            Some(TimerRequest::Cancel { generation }) => {
                if self
                    .timer
                    .as_ref()
                    .is_some_and(|timer| timer.generation == generation)
                {
                    self.cancel_timer();
                }
            }
            None => {}
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            trace!("Cancelling activation timer {}", timer.generation);
            timer.handle.abort();
        }
    }

    fn dispatch(&mut self, event: ShortcutEvent) {
        debug!("Shortcut event: {:?}", event);
        match event {
            ShortcutEvent::ActivationStarted => {
                if !self.store.is_fresh() && self.store.prefetch_async() {
                    debug!("Prefetching windows");
                }
            }
            ShortcutEvent::ShowSwitcher => self.show_switcher(),
            ShortcutEvent::CycleNext => self.move_selection(|s| {
                s.cycle(true);
            }),
            ShortcutEvent::CyclePrevious => self.move_selection(|s| {
                s.cycle(false);
            }),
            ShortcutEvent::CycleWindowNext => self.move_selection(|s| {
                s.cycle_window(true);
            }),
            ShortcutEvent::CycleWindowPrevious => self.move_selection(|s| {
                s.cycle_window(false);
            }),
            ShortcutEvent::NavigateRowUp => self.move_selection(|s| {
                s.move_row(true);
            }),
            ShortcutEvent::NavigateRowDown => self.move_selection(|s| {
                s.move_row(false);
            }),
            ShortcutEvent::ActivateSearch => {
                if let Some(session) = self.session.as_mut() {
                    session.begin_search();
                    self.render();
                }
            }
            ShortcutEvent::NavigateUp => self.move_selection(|s| {
                s.navigate_results(false);
            }),
            ShortcutEvent::NavigateDown => self.move_selection(|s| {
                s.navigate_results(true);
            }),
            ShortcutEvent::Confirm => self.confirm(),
            ShortcutEvent::Dismiss => self.close_session(),
            ShortcutEvent::QuickSwitch => self.quick_switch(),
        }
    }

    fn show_switcher(&mut self) {
        if !self.store.is_fresh() {
            self.load_snapshot();
        }
        let session = WindowSwitcher::new(self.store.cached_snapshot(), self.settings.session);
        info!(
            "Showing switcher with {} applications",
            session.applications().len()
        );
        self.session = Some(session);
        self.render();
    }

    /// Refresh in the background and hand the result to the open session.
    fn load_snapshot(&mut self) {
        let store = Arc::clone(&self.store);
        let tx = self.internal_tx.clone();
        self.in_flight = Some(tokio::task::spawn_blocking(move || {
            let snapshot = store.snapshot_blocking(false);
            if tx.send(Internal::SnapshotLoaded(snapshot)).is_err() {
                debug!("Daemon gone before snapshot was loaded");
            }
        }));
    }

    fn move_selection(&mut self, op: impl FnOnce(&mut WindowSwitcher)) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        op(session);
        self.render_selection();
    }

    fn render(&self) {
        let Some(session) = &self.session else {
            return;
        };
        if session.is_searching() {
            self.render_selection();
            return;
        }
        self.send_ui(UiCommand::Show {
            applications: session.snapshot(),
            selected: session.current_index(),
            window_index: session.window_index(),
            show_window_titles: self.settings.preferences.show_window_titles,
        });
    }

    fn render_selection(&self) {
        let Some(session) = &self.session else {
            return;
        };
        let command = if session.is_searching() {
            UiCommand::ShowResults {
                query: session.query().unwrap_or_default().to_string(),
                results: session.results().to_vec(),
                selected: session.selected_result(),
            }
        } else {
            UiCommand::UpdateSelection {
                selected: session.current_index(),
                window_index: session.window_index(),
            }
        };
        self.send_ui(command);
    }

    fn send_ui(&self, command: UiCommand) {
        if let Some(tx) = &self.ui_tx
            && let Err(e) = tx.send(command)
        {
            error!("Failed to send UI command: {}", e);
        }
    }

    fn close_session(&mut self) {
        if self.session.take().is_some() {
            debug!("Closing switcher");
            self.send_ui(UiCommand::Hide);
        }
    }

    fn confirm(&mut self) {
        let target = self.session.as_ref().and_then(WindowSwitcher::target);
        self.close_session();
        match target {
            Some(target) => self.switch_to(target),
            None => debug!("Nothing selected"),
        }
    }

    fn switch_to(&mut self, target: ActivationTarget) {
        let store = Arc::clone(&self.store);
        let retry_delay = self.settings.retry_delay;
        self.in_flight = Some(tokio::task::spawn_blocking(move || {
            activate_target(&store, &target, retry_delay);
        }));
    }

    /// Switch to the previously used application without showing anything.
    fn quick_switch(&mut self) {
        self.close_session();
        let store = Arc::clone(&self.store);
        let retry_delay = self.settings.retry_delay;
        self.in_flight = Some(tokio::task::spawn_blocking(move || {
            let mut snapshot = store.cached_snapshot();
            if snapshot.len() < 2 {
                snapshot = store.snapshot_blocking(false);
            }
            match quick_switch_target(&snapshot) {
                Some(target) => activate_target(&store, &target, retry_delay),
                None => debug!("No previous application to switch to"),
            }
        }));
    }

    fn reload_preferences(&mut self) -> Result<()> {
        let path = self
            .settings
            .preferences_path
            .as_deref()
            .context("No preferences file configured")?;
        let preferences = Preferences::load(path)?;

        let modifier = self
            .settings
            .modifier_override
            .unwrap_or(preferences.activation_modifier);
        self.interpreter.set_activation_modifier(modifier);
        self.settings.session.show_minimized = preferences.show_minimized;
        info!(
            "Preferences reloaded: modifier={:?}, show_minimized={}, show_window_titles={}",
            self.interpreter.activation_modifier(),
            preferences.show_minimized,
            preferences.show_window_titles
        );
        self.settings.preferences = preferences;
        Ok(())
    }
}

/// Activate `target` and record it as most recently used.
fn activate_target<B: WindowEnumerator + WindowActivator>(
    store: &WindowSnapshotStore<B>,
    target: &ActivationTarget,
    retry_delay: Duration,
) {
    info!("Switching to {} (pid {})", target.name, target.pid);
    match activate_with_fallback(store.backend(), target.pid, target.window, retry_delay) {
        Some(strategy) => {
            debug!("Activated {} via {:?}", target.name, strategy);
            store.move_to_front(target.pid, true);
        }
        None => warn!("Could not switch to {} (pid {})", target.name, target.pid),
    }
}

fn window_event(change: &WindowChange, pid: Option<Pid>) -> Option<CompositorEvent> {
    match change {
        WindowChange::Focus => pid.map(CompositorEvent::Activated),
        WindowChange::Title => pid.map(CompositorEvent::TitleChanged),
        WindowChange::New | WindowChange::Close | WindowChange::Move => {
            Some(CompositorEvent::WindowsChanged)
        }
        _ => None,
    }
}

/// Monitor Sway events for window and workspace changes
pub async fn monitor_sway_events(tx: mpsc::UnboundedSender<CompositorEvent>) -> Result<()> {
    let subs = [EventType::Window, EventType::Workspace];
    let mut events = Connection::new().await?.subscribe(&subs).await?;

    info!("Subscribed to Sway window and workspace events");

    while let Some(event) = events.next().await {
        let message = match event? {
            Event::Window(e) => {
                trace!("Sway window event: {:?} for container {:?}", e.change, e.container.id);
                window_event(&e.change, e.container.pid)
            }
            Event::Workspace(e) => {
                trace!("Sway workspace event: {:?}", e.change);
                Some(CompositorEvent::WindowsChanged)
            }
            _ => None,
        };

        if let Some(message) = message
            && tx.send(message).is_err()
        {
            debug!("Compositor event receiver dropped");
            return Ok(());
        }
    }

    Ok(())
}
