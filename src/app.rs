mod handlers;

use crate::commands::{CommandLine, CommandRegistry, KeyChord, RegistryError};
use crate::config::Settings;
use crate::input::{self, EditAction, MouseAction, QuitAnswer};
use crate::model::{
    ActionTarget, FileEntry, ListScope, ResourceAction, ResourceKind, TableData, TextSource,
};
use crate::navigation::{NavigationStack, ViewKind};
use crate::stream::{SessionId, StreamEvent, StreamTarget};
use crate::viewport::Query;
use crate::views::{BackOutcome, RequestId, View, Views, list_resource, list_view};
use chrono::Local;
use crossterm::event::{KeyEvent, MouseEvent};
use handlers::Handler;
use tracing::{debug, info};

/// Screen rows above the body block's first inner row: header line plus the
/// block's top border.
const BODY_TOP: u16 = 2;
/// Header line, footer line and the two block borders.
const CHROME_ROWS: u16 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Command,
    Search,
    Filter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Info(String),
    Error(String),
}

/// Everything `update` reacts to.
#[derive(Debug)]
pub enum Msg {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Tick,
    Resize {
        cols: u16,
        rows: u16,
    },
    RowsLoaded {
        kind: ResourceKind,
        scope: ListScope,
        result: Result<TableData, String>,
    },
    TextLoaded {
        request: RequestId,
        result: Result<String, String>,
    },
    FilesLoaded {
        request: RequestId,
        path: String,
        result: Result<Vec<FileEntry>, String>,
    },
    StreamStarted {
        request: RequestId,
        session: SessionId,
    },
    Stream(StreamEvent),
    ActionFinished {
        action: ResourceAction,
        label: String,
        result: Result<String, String>,
    },
    ConfigReloaded(Result<Settings, String>),
}

/// Side effects requested by `update`, executed by the task runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    None,
    Batch(Vec<Task>),
    Quit,
    LoadRows {
        kind: ResourceKind,
        scope: ListScope,
    },
    LoadText {
        request: RequestId,
        view: ViewKind,
        source: TextSource,
    },
    ListFiles {
        request: RequestId,
        target: ActionTarget,
        path: String,
    },
    StartStream {
        request: RequestId,
        target: StreamTarget,
    },
    CancelStream,
    RunOneShot {
        action: ResourceAction,
        target: ActionTarget,
        label: String,
    },
}

impl Task {
    pub fn batch(tasks: impl IntoIterator<Item = Task>) -> Self {
        let mut tasks = tasks
            .into_iter()
            .filter(|task| *task != Task::None)
            .collect::<Vec<_>>();
        match tasks.len() {
            0 => Task::None,
            1 => tasks.pop().unwrap_or(Task::None),
            _ => Task::Batch(tasks),
        }
    }
}

pub struct App {
    running: bool,
    nav: NavigationStack,
    views: Views,
    registry: CommandRegistry<Handler>,
    mode: InputMode,
    input: String,
    ignore_case: bool,
    regex: bool,
    settings: Settings,
    status: Option<Status>,
    quit_armed: bool,
    next_request: RequestId,
    runtime_label: String,
}

impl App {
    pub fn new(settings: Settings) -> Result<Self, RegistryError> {
        let registry = CommandRegistry::build(handlers::command_specs())?;
        Ok(Self {
            running: true,
            nav: NavigationStack::default(),
            views: Views::default(),
            registry,
            mode: InputMode::Normal,
            input: String::new(),
            ignore_case: settings.search_ignore_case,
            regex: settings.search_regex,
            runtime_label: settings.runtime.clone(),
            settings,
            status: None,
            quit_armed: false,
            next_request: 0,
        })
    }

    /// First load of the root view.
    pub fn init(&mut self) -> Task {
        self.set_info("Press ? for help, : for commands");
        self.load_rows(ResourceKind::Containers)
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn pattern_flags(&self) -> (bool, bool) {
        (self.ignore_case, self.regex)
    }

    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    pub fn quit_armed(&self) -> bool {
        self.quit_armed
    }

    pub fn nav(&self) -> &NavigationStack {
        &self.nav
    }

    pub fn views(&self) -> &Views {
        &self.views
    }

    pub fn active_view(&self) -> &dyn View {
        self.views.get(self.nav.active())
    }

    pub fn runtime_label(&self) -> &str {
        &self.runtime_label
    }

    pub fn config_source(&self) -> Option<&str> {
        self.settings.source.as_deref()
    }

    pub fn set_info(&mut self, status: impl Into<String>) {
        self.status = Some(Status::Info(normalize_status_text(status.into())));
    }

    pub fn set_error(&mut self, error: impl AsRef<str>) {
        let line = summarize_error_line(error.as_ref());
        self.status = Some(Status::Error(normalize_status_text(line)));
    }

    pub fn update(&mut self, msg: Msg) -> Task {
        match msg {
            Msg::Key(key) => self.handle_key(key),
            Msg::Mouse(event) => self.handle_mouse(event),
            Msg::Tick => self.handle_tick(),
            Msg::Resize { rows, .. } => {
                let body = rows.saturating_sub(CHROME_ROWS).max(1);
                self.views.resize_all(usize::from(body));
                Task::None
            }
            Msg::RowsLoaded {
                kind,
                scope,
                result,
            } => self.apply_rows(kind, scope, result),
            Msg::TextLoaded { request, result } => self.apply_text(request, result),
            Msg::FilesLoaded {
                request,
                path,
                result,
            } => self.apply_files(request, &path, result),
            Msg::StreamStarted { request, session } => {
                if !self.views.log.attach(request, session) {
                    debug!(request, session, "dropping stale stream start");
                }
                Task::None
            }
            Msg::Stream(event) => self.apply_stream(event),
            Msg::ActionFinished {
                action,
                label,
                result,
            } => self.apply_action_result(action, &label, result),
            Msg::ConfigReloaded(Ok(settings)) => {
                let source = settings
                    .source
                    .clone()
                    .unwrap_or_else(|| "defaults".to_string());
                self.apply_settings(settings);
                self.set_info(format!("Config reloaded from {source}"));
                Task::None
            }
            Msg::ConfigReloaded(Err(error)) => {
                self.set_error(format!("Config reload failed: {error}"));
                Task::None
            }
        }
    }

    pub fn apply_settings(&mut self, settings: Settings) {
        self.ignore_case = settings.search_ignore_case;
        self.regex = settings.search_regex;
        self.settings = settings;
    }

    /// Runs a `:` command line. Dispatch failures only set the status line.
    pub fn execute_from_text(&mut self, text: &str) -> Task {
        match CommandLine::parse(text) {
            CommandLine::Empty => Task::None,
            CommandLine::Quit => {
                self.arm_quit();
                Task::None
            }
            CommandLine::ForceQuit => self.quit_now(),
            CommandLine::Help => handlers::help(self),
            CommandLine::Named { name } => {
                let name = self.settings.aliases.get(&name).cloned().unwrap_or(name);
                let active = self.nav.active();
                match self
                    .registry
                    .resolve_name(active, &name)
                    .map(|command| command.handler)
                {
                    Ok(handler) => handler(self),
                    Err(error) => {
                        self.set_error(error.to_string());
                        Task::None
                    }
                }
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Task {
        if self.quit_armed {
            return match input::map_quit_gate_key(key) {
                Some(QuitAnswer::Confirm) => self.quit_now(),
                Some(QuitAnswer::Decline) => {
                    self.quit_armed = false;
                    self.set_info("Quit cancelled");
                    Task::None
                }
                None => Task::None,
            };
        }

        if self.mode != InputMode::Normal {
            return match input::map_input_key(self.mode, key) {
                Some(action) => self.edit_input(action),
                None => Task::None,
            };
        }

        let chord = KeyChord::from_event(&key);
        let active = self.nav.active();
        match self
            .registry
            .resolve_key(active, chord)
            .map(|command| command.handler)
        {
            Some(handler) => handler(self),
            None => Task::None,
        }
    }

    fn edit_input(&mut self, action: EditAction) -> Task {
        match action {
            EditAction::Insert(c) => self.input.push(c),
            EditAction::Backspace => {
                self.input.pop();
            }
            EditAction::DeleteWord => input::delete_word(&mut self.input),
            EditAction::Cancel => {
                self.mode = InputMode::Normal;
                self.input.clear();
            }
            EditAction::ToggleRegex => self.regex = !self.regex,
            EditAction::ToggleCase => self.ignore_case = !self.ignore_case,
            EditAction::Submit => return self.submit_input(),
        }
        Task::None
    }

    fn submit_input(&mut self) -> Task {
        let text = std::mem::take(&mut self.input);
        let mode = std::mem::replace(&mut self.mode, InputMode::Normal);
        match mode {
            InputMode::Normal => Task::None,
            InputMode::Command => self.execute_from_text(&text),
            InputMode::Search => {
                self.run_search(text);
                Task::None
            }
            InputMode::Filter => {
                self.run_filter(text);
                Task::None
            }
        }
    }

    pub(crate) fn enter_mode(&mut self, mode: InputMode) {
        self.mode = mode;
        self.input.clear();
        if matches!(mode, InputMode::Search | InputMode::Filter) {
            self.ignore_case = self.settings.search_ignore_case;
            self.regex = self.settings.search_regex;
        }
    }

    fn run_search(&mut self, pattern: String) {
        let active = self.nav.active();
        let query = Query::new(pattern.clone(), self.ignore_case, self.regex);
        match self.views.get_mut(active).search(query) {
            None => self.set_error(format!("search is not available in {active}")),
            Some(_) if pattern.is_empty() => self.set_info("Search cleared"),
            Some(0) => self.set_error(format!("no matches for '{pattern}'")),
            Some(count) => self.set_info(format!("{count} matches for '{pattern}'")),
        }
    }

    fn run_filter(&mut self, pattern: String) {
        let active = self.nav.active();
        let query = Query::new(pattern.clone(), self.ignore_case, self.regex);
        match self.views.get_mut(active).filter(query) {
            None => self.set_error(format!("filter is not available in {active}")),
            Some(_) if pattern.is_empty() => self.set_info("Filter cleared"),
            Some(count) => self.set_info(format!("Filter '{pattern}': {count} rows")),
        }
    }

    fn handle_mouse(&mut self, event: MouseEvent) -> Task {
        if self.quit_armed {
            return Task::None;
        }
        let active = self.nav.active();
        let view = self.views.get_mut(active);
        match input::map_mouse(event) {
            Some(MouseAction::Click { row, .. }) => {
                let first_row = usize::from(BODY_TOP) + view.header_rows();
                if let Some(offset) = usize::from(row).checked_sub(first_row) {
                    view.select_offset(offset);
                }
            }
            Some(MouseAction::ScrollUp) => view.handle_up(1),
            Some(MouseAction::ScrollDown) => view.handle_down(1),
            None => {}
        }
        Task::None
    }

    fn handle_tick(&mut self) -> Task {
        let active = self.nav.active();
        if let Some(kind) = list_resource(active) {
            return self.load_rows(kind);
        }
        if active == ViewKind::Top {
            return self.reload_text(ViewKind::Top);
        }
        Task::None
    }

    pub(crate) fn next_request(&mut self) -> RequestId {
        self.next_request += 1;
        self.next_request
    }

    /// No task while a load for `kind` is already in flight.
    pub(crate) fn load_rows(&mut self, kind: ResourceKind) -> Task {
        let view = self.views.table_mut(kind);
        if !view.begin_load() {
            return Task::None;
        }
        Task::LoadRows {
            kind,
            scope: view.scope().clone(),
        }
    }

    fn reload_text(&mut self, kind: ViewKind) -> Task {
        let request = self.next_request();
        let view = match kind {
            ViewKind::Inspect => &mut self.views.inspect,
            ViewKind::FileContent => &mut self.views.file_content,
            ViewKind::Top => &mut self.views.top,
            _ => return Task::None,
        };
        match view.reload(request) {
            Some(source) => Task::LoadText {
                request,
                view: kind,
                source,
            },
            None => Task::None,
        }
    }

    pub(crate) fn reload_files(&mut self) -> Task {
        let Some(target) = self.views.file_browser.target().cloned() else {
            return Task::None;
        };
        let request = self.next_request();
        self.views.file_browser.load(request);
        Task::ListFiles {
            request,
            target,
            path: self.views.file_browser.path().to_string(),
        }
    }

    pub(crate) fn start_stream(&mut self, target: StreamTarget) -> Task {
        let request = self.next_request();
        self.views.log.begin(target.clone(), request);
        Task::StartStream { request, target }
    }

    /// Reloads whatever the active view shows.
    pub(crate) fn reload_active(&mut self) -> Task {
        let active = self.nav.active();
        if let Some(kind) = list_resource(active) {
            return self.load_rows(kind);
        }
        match active {
            ViewKind::Inspect | ViewKind::FileContent | ViewKind::Top => self.reload_text(active),
            ViewKind::FileBrowser => self.reload_files(),
            ViewKind::Log => match self.views.log.target().cloned() {
                Some(target) => self.start_stream(target),
                None => Task::None,
            },
            _ => Task::None,
        }
    }

    /// Drill-down: pushes the current view onto the history.
    pub(crate) fn switch_to(&mut self, view: ViewKind) -> Task {
        let from = self.nav.active();
        if !self.nav.switch(view) {
            return Task::None;
        }
        self.after_transition(from)
    }

    /// Lateral move that does not deepen history.
    pub(crate) fn replace_with(&mut self, view: ViewKind) -> Task {
        let from = self.nav.active();
        if from == view {
            return Task::None;
        }
        self.nav.replace(view);
        self.after_transition(from)
    }

    /// Nested back first (scope or path history), then the navigation stack.
    pub(crate) fn go_back(&mut self) -> Task {
        let active = self.nav.active();
        if self.views.get_mut(active).back() == BackOutcome::Reload {
            return self.reload_active();
        }
        if self.nav.back().is_none() {
            return Task::None;
        }
        self.after_transition(active)
    }

    fn after_transition(&mut self, from: ViewKind) -> Task {
        let to = self.nav.active();
        debug!(%from, %to, "view transition");
        let mut tasks = Vec::new();
        if from == ViewKind::Log && to != ViewKind::Log {
            self.views.log.detach();
            tasks.push(Task::CancelStream);
        }
        if from == ViewKind::Confirm && self.views.confirm.take().is_some() {
            self.set_info("Cancelled");
        }
        if to == ViewKind::Log
            && self.views.log.pending().is_none()
            && !self.views.log.is_done()
            && let Some(target) = self.views.log.target().cloned()
        {
            tasks.push(self.start_stream(target));
        }
        if let Some(kind) = list_resource(to) {
            tasks.push(self.load_rows(kind));
        }
        Task::batch(tasks)
    }

    pub(crate) fn arm_quit(&mut self) {
        self.quit_armed = true;
        self.set_info("Really quit? (y/q to quit, n/Esc to stay)");
    }

    pub(crate) fn quit_now(&mut self) -> Task {
        info!("quit requested");
        self.running = false;
        Task::Quit
    }

    pub(crate) fn help_lines(&self, view: ViewKind) -> Vec<String> {
        let mut lines = vec![
            format!("Commands available in {view}"),
            String::new(),
        ];
        for command in self.registry.commands_for(view) {
            let keys = command
                .keys
                .iter()
                .map(KeyChord::label)
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!(
                "{keys:<16} :{:<18} {}",
                command.name, command.description
            ));
        }
        lines.push(String::new());
        lines.push(":q quit  :q! force quit  :h help".to_string());
        if !self.settings.aliases.is_empty() {
            lines.push(String::new());
            lines.push("Aliases".to_string());
            let mut aliases = self.settings.aliases.iter().collect::<Vec<_>>();
            aliases.sort();
            for (alias, target) in aliases {
                lines.push(format!("  :{alias} → :{target}"));
            }
        }
        lines
    }

    fn apply_rows(
        &mut self,
        kind: ResourceKind,
        scope: ListScope,
        result: Result<TableData, String>,
    ) -> Task {
        let view = self.views.table_mut(kind);
        if *view.scope() != scope {
            debug!(%kind, "dropping rows for a previous scope");
            return Task::None;
        }
        match result {
            Ok(data) => view.apply(data, Local::now()),
            Err(error) => {
                let line = summarize_error_line(&error);
                view.fail(line.clone(), Local::now());
                if self.nav.active() == list_view(kind) {
                    self.set_error(format!("{kind} refresh failed: {line}"));
                }
            }
        }
        Task::None
    }

    fn apply_text(&mut self, request: RequestId, result: Result<String, String>) -> Task {
        let failure = result.as_ref().err().cloned();
        let applied = self
            .views
            .loaded_text_mut()
            .into_iter()
            .any(|view| view.apply(request, result.clone()));
        if !applied {
            debug!(request, "dropping stale text result");
            return Task::None;
        }
        if let Some(error) = failure {
            self.set_error(error);
        }
        Task::None
    }

    fn apply_files(
        &mut self,
        request: RequestId,
        path: &str,
        result: Result<Vec<FileEntry>, String>,
    ) -> Task {
        let failure = result.as_ref().err().cloned();
        if !self.views.file_browser.apply(request, path, result) {
            debug!(request, path, "dropping stale file listing");
            return Task::None;
        }
        if let Some(error) = failure {
            self.set_error(format!("ls {path}: {}", summarize_error_line(&error)));
        }
        Task::None
    }

    fn apply_stream(&mut self, event: StreamEvent) -> Task {
        match event {
            StreamEvent::Lines {
                session,
                lines,
                done,
            } => {
                if self.views.log.session() != Some(session) {
                    debug!(session, "dropping output from a replaced stream");
                    return Task::None;
                }
                self.views.log.append(lines, done);
                if done && self.nav.active() == ViewKind::Log {
                    self.set_info("Log stream ended");
                }
            }
            StreamEvent::Failed { session, error } => {
                if self.views.log.session() != Some(session) {
                    return Task::None;
                }
                self.views.log.fail(error.clone());
                self.set_error(error);
            }
        }
        Task::None
    }

    fn apply_action_result(
        &mut self,
        action: ResourceAction,
        label: &str,
        result: Result<String, String>,
    ) -> Task {
        match result {
            Ok(_) => self.set_info(format!("{} {label}: done", action.label())),
            Err(error) => self.set_error(format!(
                "{} {label} failed: {}",
                action.label(),
                summarize_error_line(&error)
            )),
        }
        self.load_rows(action.refreshes())
    }

    #[cfg(test)]
    fn active(&self) -> ViewKind {
        self.nav.active()
    }
}

fn summarize_error_line(error: &str) -> String {
    error
        .lines()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim().to_string())
        .unwrap_or_else(|| "unknown error".to_string())
}

fn normalize_status_text(status: String) -> String {
    const MAX_STATUS_LEN: usize = 180;
    if status.chars().count() <= MAX_STATUS_LEN {
        return status;
    }

    let mut shortened = status
        .chars()
        .take(MAX_STATUS_LEN.saturating_sub(1))
        .collect::<String>();
    shortened.push('…');
    shortened
}
