use crate::model::{
    ActionTarget, FileEntry, ListScope, ResourceAction, ResourceKind, RowData, TableData,
    TextSource, join_path,
};
use crate::navigation::ViewKind;
use crate::stream::{SessionId, StreamTarget};
use crate::viewport::{Matcher, Query, Searchable, Viewport};
use chrono::{DateTime, Local};

pub type RequestId = u64;

/// Cursor, scroll, search and filter operations, independent of the row type.
pub trait Pane {
    fn len(&self) -> usize;
    fn cursor(&self) -> usize;
    fn window(&self) -> (usize, usize);
    fn height(&self) -> usize;
    fn set_height(&mut self, height: usize);
    fn move_cursor(&mut self, delta: isize);
    fn move_to(&mut self, index: usize);
    fn move_to_last(&mut self);
    fn search(&mut self, query: Query) -> usize;
    fn next_match(&mut self) -> Option<usize>;
    fn prev_match(&mut self) -> Option<usize>;
    /// An empty pattern removes the filter. Returns the visible row count.
    fn filter_text(&mut self, query: Query) -> usize;
    fn toggle_filter(&mut self) -> Option<bool>;
}

impl<T: Searchable + 'static> Pane for Viewport<T> {
    fn len(&self) -> usize {
        Viewport::len(self)
    }

    fn cursor(&self) -> usize {
        Viewport::cursor(self)
    }

    fn window(&self) -> (usize, usize) {
        Viewport::window(self)
    }

    fn height(&self) -> usize {
        Viewport::height(self)
    }

    fn set_height(&mut self, height: usize) {
        Viewport::set_height(self, height);
    }

    fn move_cursor(&mut self, delta: isize) {
        Viewport::move_cursor(self, delta);
    }

    fn move_to(&mut self, index: usize) {
        Viewport::move_to(self, index);
    }

    fn move_to_last(&mut self) {
        Viewport::move_to_last(self);
    }

    fn search(&mut self, query: Query) -> usize {
        Viewport::search(self, query).len()
    }

    fn next_match(&mut self) -> Option<usize> {
        Viewport::next_match(self)
    }

    fn prev_match(&mut self) -> Option<usize> {
        Viewport::prev_match(self)
    }

    fn filter_text(&mut self, query: Query) -> usize {
        if query.pattern.is_empty() {
            self.clear_filter();
            return Viewport::len(self);
        }
        let label = query.pattern.clone();
        let matcher = Matcher::new(&query);
        self.filter(label, move |row: &T| matcher.is_match(&row.search_text()))
            .len()
    }

    fn toggle_filter(&mut self) -> Option<bool> {
        Viewport::toggle_filter(self)
    }
}

/// What the renderer draws for the active view.
pub enum ViewBody<'a> {
    Table {
        headers: &'a [String],
        rows: &'a Viewport<RowData>,
        error: Option<&'a str>,
    },
    Lines {
        lines: &'a Viewport<String>,
        error: Option<&'a str>,
    },
    Files {
        entries: &'a Viewport<FileEntry>,
        error: Option<&'a str>,
    },
    Confirm {
        prompt: String,
    },
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BackOutcome {
    /// Nothing nested left; pop the navigation stack.
    Leave,
    /// Handled inside the view, and its content must be reloaded.
    Reload,
}

/// Capabilities the reactive core drives polymorphically. Cursor and search
/// operations default to the view's pane.
pub trait View {
    fn title(&self) -> String;
    fn body(&self) -> ViewBody<'_>;
    fn pane(&self) -> Option<&dyn Pane>;
    fn pane_mut(&mut self) -> Option<&mut dyn Pane>;

    /// Rows drawn above the first data row inside the body block.
    fn header_rows(&self) -> usize {
        0
    }

    fn back(&mut self) -> BackOutcome {
        BackOutcome::Leave
    }

    fn handle_up(&mut self, n: usize) {
        if let Some(pane) = self.pane_mut() {
            pane.move_cursor(-(n as isize));
        }
    }

    fn handle_down(&mut self, n: usize) {
        if let Some(pane) = self.pane_mut() {
            pane.move_cursor(n as isize);
        }
    }

    fn page_up(&mut self) {
        let height = self.pane().map_or(1, |pane| pane.height());
        self.handle_up(height);
    }

    fn page_down(&mut self) {
        let height = self.pane().map_or(1, |pane| pane.height());
        self.handle_down(height);
    }

    fn top(&mut self) {
        if let Some(pane) = self.pane_mut() {
            pane.move_to(0);
        }
    }

    fn bottom(&mut self) {
        if let Some(pane) = self.pane_mut() {
            pane.move_to_last();
        }
    }

    /// Mouse selection: `offset` counts rows from the top of the window.
    fn select_offset(&mut self, offset: usize) -> bool {
        let Some(pane) = self.pane_mut() else {
            return false;
        };
        let (start, end) = pane.window();
        let index = start + offset;
        if index >= end {
            return false;
        }
        pane.move_to(index);
        true
    }

    fn resize(&mut self, height: usize) {
        if let Some(pane) = self.pane_mut() {
            pane.set_height(height);
        }
    }

    fn search(&mut self, query: Query) -> Option<usize> {
        self.pane_mut().map(|pane| pane.search(query))
    }

    fn next_match(&mut self) -> Option<usize> {
        self.pane_mut().and_then(|pane| pane.next_match())
    }

    fn prev_match(&mut self) -> Option<usize> {
        self.pane_mut().and_then(|pane| pane.prev_match())
    }

    fn filter(&mut self, query: Query) -> Option<usize> {
        self.pane_mut().map(|pane| pane.filter_text(query))
    }

    fn toggle_filter(&mut self) -> Option<bool> {
        self.pane_mut().and_then(|pane| pane.toggle_filter())
    }
}

pub struct TableView {
    resource: ResourceKind,
    headers: Vec<String>,
    viewport: Viewport<RowData>,
    scope: ListScope,
    scope_history: Vec<ListScope>,
    error: Option<String>,
    last_refreshed: Option<DateTime<Local>>,
    loading: bool,
}

impl TableView {
    pub fn new(resource: ResourceKind) -> Self {
        Self {
            resource,
            headers: Vec::new(),
            viewport: Viewport::default(),
            scope: ListScope::default(),
            scope_history: Vec::new(),
            error: None,
            last_refreshed: None,
            loading: false,
        }
    }

    pub fn scope(&self) -> &ListScope {
        &self.scope
    }

    pub fn viewport(&self) -> &Viewport<RowData> {
        &self.viewport
    }

    pub fn selected(&self) -> Option<&RowData> {
        self.viewport.selected()
    }

    pub fn last_refreshed(&self) -> Option<DateTime<Local>> {
        self.last_refreshed
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Returns false when a load is already in flight.
    pub fn begin_load(&mut self) -> bool {
        if self.loading {
            return false;
        }
        self.loading = true;
        true
    }

    pub fn apply(&mut self, data: TableData, at: DateTime<Local>) {
        let height = self.viewport.height();
        self.headers = data.headers;
        self.viewport.set_rows(data.rows, height);
        self.error = None;
        self.last_refreshed = Some(at);
        self.loading = false;
    }

    /// Keeps the previous rows on screen.
    pub fn fail(&mut self, error: String, at: DateTime<Local>) {
        self.error = Some(error);
        self.last_refreshed = Some(at);
        self.loading = false;
    }

    /// Narrows the listing and remembers the previous scope for Back.
    pub fn drill(&mut self, scope: ListScope) -> bool {
        if scope == self.scope {
            return false;
        }
        let previous = std::mem::replace(&mut self.scope, scope);
        self.scope_history.push(previous);
        self.reset_rows();
        true
    }

    fn reset_rows(&mut self) {
        self.viewport.clear_search();
        self.viewport.clear_filter();
        self.viewport.clear();
        self.error = None;
        self.loading = false;
    }
}

impl View for TableView {
    fn title(&self) -> String {
        let count = self.viewport.len();
        if self.scope.is_root() {
            format!("{} [{count}]", self.resource.title())
        } else {
            format!("{} ({}) [{count}]", self.resource.title(), self.scope.label())
        }
    }

    fn body(&self) -> ViewBody<'_> {
        ViewBody::Table {
            headers: &self.headers,
            rows: &self.viewport,
            error: self.error.as_deref(),
        }
    }

    fn pane(&self) -> Option<&dyn Pane> {
        Some(&self.viewport)
    }

    fn pane_mut(&mut self) -> Option<&mut dyn Pane> {
        Some(&mut self.viewport)
    }

    fn header_rows(&self) -> usize {
        1
    }

    fn back(&mut self) -> BackOutcome {
        match self.scope_history.pop() {
            Some(previous) => {
                self.scope = previous;
                self.reset_rows();
                BackOutcome::Reload
            }
            None => BackOutcome::Leave,
        }
    }
}

pub struct LogView {
    viewport: Viewport<String>,
    target: Option<StreamTarget>,
    request: Option<RequestId>,
    session: Option<SessionId>,
    follow: bool,
    done: bool,
    error: Option<String>,
}

impl Default for LogView {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            target: None,
            request: None,
            session: None,
            follow: true,
            done: false,
            error: None,
        }
    }
}

impl LogView {
    pub fn begin(&mut self, target: StreamTarget, request: RequestId) {
        self.viewport.clear_search();
        self.viewport.clear_filter();
        self.viewport.clear();
        self.target = Some(target);
        self.request = Some(request);
        self.session = None;
        self.follow = true;
        self.done = false;
        self.error = None;
    }

    /// Binds the session started for `request`; stale starts are ignored.
    pub fn attach(&mut self, request: RequestId, session: SessionId) -> bool {
        if self.request != Some(request) {
            return false;
        }
        self.session = Some(session);
        true
    }

    pub fn detach(&mut self) {
        self.request = None;
        self.session = None;
    }

    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    /// Request of the stream start not yet torn down by `detach`.
    pub fn pending(&self) -> Option<RequestId> {
        self.request
    }

    pub fn target(&self) -> Option<&StreamTarget> {
        self.target.as_ref()
    }

    pub fn viewport(&self) -> &Viewport<String> {
        &self.viewport
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn append(&mut self, lines: Vec<String>, done: bool) {
        self.viewport.push_rows(lines);
        if self.follow {
            self.viewport.move_to_last();
        }
        if done {
            self.done = true;
            self.session = None;
        }
    }

    pub fn fail(&mut self, error: String) {
        self.error = Some(error);
        self.done = true;
        self.session = None;
    }

    pub fn toggle_follow(&mut self) -> bool {
        self.follow = !self.follow;
        if self.follow {
            self.viewport.move_to_last();
        }
        self.follow
    }

    pub fn clear_lines(&mut self) {
        self.viewport.clear();
    }
}

impl View for LogView {
    fn title(&self) -> String {
        let target = self
            .target
            .as_ref()
            .map(StreamTarget::label)
            .unwrap_or_else(|| "-".to_string());
        let state = match (self.done, self.follow) {
            (true, _) => "ended",
            (false, true) => "following",
            (false, false) => "paused",
        };
        format!("Logs {target} ({state})")
    }

    fn body(&self) -> ViewBody<'_> {
        ViewBody::Lines {
            lines: &self.viewport,
            error: self.error.as_deref(),
        }
    }

    fn pane(&self) -> Option<&dyn Pane> {
        Some(&self.viewport)
    }

    fn pane_mut(&mut self) -> Option<&mut dyn Pane> {
        Some(&mut self.viewport)
    }

    fn handle_up(&mut self, n: usize) {
        self.follow = false;
        self.viewport.move_cursor(-(n as isize));
    }

    fn top(&mut self) {
        self.follow = false;
        self.viewport.move_to(0);
    }

    fn bottom(&mut self) {
        self.follow = true;
        self.viewport.move_to_last();
    }

    fn select_offset(&mut self, offset: usize) -> bool {
        let (start, end) = self.viewport.window();
        if start + offset >= end {
            return false;
        }
        self.follow = false;
        self.viewport.move_to(start + offset);
        true
    }
}

/// Read-only text: inspect output, file content, process table and help.
pub struct TextView {
    title: String,
    viewport: Viewport<String>,
    source: Option<TextSource>,
    request: Option<RequestId>,
    error: Option<String>,
}

impl TextView {
    pub fn new(kind: ViewKind) -> Self {
        Self {
            title: kind.label().to_string(),
            viewport: Viewport::default(),
            source: None,
            request: None,
            error: None,
        }
    }

    pub fn viewport(&self) -> &Viewport<String> {
        &self.viewport
    }

    pub fn begin(&mut self, title: String, source: TextSource, request: RequestId) {
        self.title = title;
        self.viewport.clear_search();
        self.viewport.clear_filter();
        self.viewport.clear();
        self.source = Some(source);
        self.request = Some(request);
        self.error = None;
    }

    /// Re-requests the current source, keeping rows and cursor until the
    /// result lands. `None` when nothing was loaded or a load is in flight.
    pub fn reload(&mut self, request: RequestId) -> Option<TextSource> {
        if self.request.is_some() {
            return None;
        }
        let source = self.source.clone()?;
        self.request = Some(request);
        Some(source)
    }

    pub fn set_static(&mut self, title: String, lines: Vec<String>) {
        let height = self.viewport.height();
        self.title = title;
        self.source = None;
        self.request = None;
        self.error = None;
        self.viewport.set_rows(lines, height);
        self.viewport.move_to(0);
    }

    pub fn apply(&mut self, request: RequestId, result: Result<String, String>) -> bool {
        if self.request != Some(request) {
            return false;
        }
        self.request = None;
        match result {
            Ok(text) => {
                let height = self.viewport.height();
                let lines = text.lines().map(str::to_string).collect();
                self.viewport.set_rows(lines, height);
                self.error = None;
            }
            Err(error) => self.error = Some(error),
        }
        true
    }
}

impl View for TextView {
    fn title(&self) -> String {
        if self.request.is_some() {
            format!("{} (loading)", self.title)
        } else {
            self.title.clone()
        }
    }

    fn body(&self) -> ViewBody<'_> {
        ViewBody::Lines {
            lines: &self.viewport,
            error: self.error.as_deref(),
        }
    }

    fn pane(&self) -> Option<&dyn Pane> {
        Some(&self.viewport)
    }

    fn pane_mut(&mut self) -> Option<&mut dyn Pane> {
        Some(&mut self.viewport)
    }
}

pub struct FileBrowserView {
    target: Option<ActionTarget>,
    path: String,
    path_history: Vec<String>,
    viewport: Viewport<FileEntry>,
    request: Option<RequestId>,
    error: Option<String>,
}

impl Default for FileBrowserView {
    fn default() -> Self {
        Self {
            target: None,
            path: "/".to_string(),
            path_history: Vec::new(),
            viewport: Viewport::default(),
            request: None,
            error: None,
        }
    }
}

impl FileBrowserView {
    pub fn target(&self) -> Option<&ActionTarget> {
        self.target.as_ref()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn selected(&self) -> Option<&FileEntry> {
        self.viewport.selected()
    }

    pub fn open(&mut self, target: ActionTarget, request: RequestId) {
        self.target = Some(target);
        self.path = "/".to_string();
        self.path_history.clear();
        self.load(request);
    }

    pub fn enter(&mut self, dir: &str, request: RequestId) {
        let next = join_path(&self.path, dir);
        let previous = std::mem::replace(&mut self.path, next);
        self.path_history.push(previous);
        self.load(request);
    }

    pub fn parent(&mut self, request: RequestId) -> bool {
        let Some(parent) = parent_path(&self.path) else {
            return false;
        };
        let previous = std::mem::replace(&mut self.path, parent);
        self.path_history.push(previous);
        self.load(request);
        true
    }

    /// Reloads the current path, e.g. after Back popped the path history.
    pub fn load(&mut self, request: RequestId) {
        self.viewport.clear_search();
        self.viewport.clear_filter();
        self.viewport.clear();
        self.request = Some(request);
        self.error = None;
    }

    pub fn apply(&mut self, request: RequestId, path: &str, result: Result<Vec<FileEntry>, String>) -> bool {
        if self.request != Some(request) || self.path != path {
            return false;
        }
        self.request = None;
        match result {
            Ok(entries) => {
                let height = self.viewport.height();
                self.viewport.set_rows(entries, height);
                self.error = None;
            }
            Err(error) => self.error = Some(error),
        }
        true
    }
}

fn parent_path(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rfind('/') {
        Some(0) | None => Some("/".to_string()),
        Some(index) => Some(trimmed[..index].to_string()),
    }
}

impl View for FileBrowserView {
    fn title(&self) -> String {
        let target = self
            .target
            .as_ref()
            .map(ActionTarget::label)
            .unwrap_or_else(|| "-".to_string());
        let loading = if self.request.is_some() { " (loading)" } else { "" };
        format!("Files {target}:{}{loading}", self.path)
    }

    fn body(&self) -> ViewBody<'_> {
        ViewBody::Files {
            entries: &self.viewport,
            error: self.error.as_deref(),
        }
    }

    fn pane(&self) -> Option<&dyn Pane> {
        Some(&self.viewport)
    }

    fn pane_mut(&mut self) -> Option<&mut dyn Pane> {
        Some(&mut self.viewport)
    }

    fn back(&mut self) -> BackOutcome {
        match self.path_history.pop() {
            Some(previous) => {
                self.path = previous;
                BackOutcome::Reload
            }
            None => BackOutcome::Leave,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PendingAction {
    pub action: ResourceAction,
    pub target: ActionTarget,
}

#[derive(Debug, Default)]
pub struct ConfirmView {
    pending: Option<PendingAction>,
}

impl ConfirmView {
    pub fn arm(&mut self, pending: PendingAction) {
        self.pending = Some(pending);
    }

    pub fn take(&mut self) -> Option<PendingAction> {
        self.pending.take()
    }

    pub fn pending(&self) -> Option<&PendingAction> {
        self.pending.as_ref()
    }
}

impl View for ConfirmView {
    fn title(&self) -> String {
        "Confirm".to_string()
    }

    fn body(&self) -> ViewBody<'_> {
        let prompt = match &self.pending {
            Some(pending) => format!(
                "{} {}? [y/Enter] confirm  [n/Esc] cancel",
                pending.action.label(),
                pending.target.label()
            ),
            None => "Nothing to confirm".to_string(),
        };
        ViewBody::Confirm { prompt }
    }

    fn pane(&self) -> Option<&dyn Pane> {
        None
    }

    fn pane_mut(&mut self) -> Option<&mut dyn Pane> {
        None
    }
}

/// Every view's sub-model, created once for the process lifetime.
pub struct Views {
    pub containers: TableView,
    pub projects: TableView,
    pub images: TableView,
    pub networks: TableView,
    pub volumes: TableView,
    pub log: LogView,
    pub inspect: TextView,
    pub file_browser: FileBrowserView,
    pub file_content: TextView,
    pub top: TextView,
    pub confirm: ConfirmView,
    pub help: TextView,
}

impl Default for Views {
    fn default() -> Self {
        Self {
            containers: TableView::new(ResourceKind::Containers),
            projects: TableView::new(ResourceKind::Projects),
            images: TableView::new(ResourceKind::Images),
            networks: TableView::new(ResourceKind::Networks),
            volumes: TableView::new(ResourceKind::Volumes),
            log: LogView::default(),
            inspect: TextView::new(ViewKind::Inspect),
            file_browser: FileBrowserView::default(),
            file_content: TextView::new(ViewKind::FileContent),
            top: TextView::new(ViewKind::Top),
            confirm: ConfirmView::default(),
            help: TextView::new(ViewKind::Help),
        }
    }
}

impl Views {
    pub fn get(&self, kind: ViewKind) -> &dyn View {
        match kind {
            ViewKind::Containers => &self.containers,
            ViewKind::Projects => &self.projects,
            ViewKind::Images => &self.images,
            ViewKind::Networks => &self.networks,
            ViewKind::Volumes => &self.volumes,
            ViewKind::Log => &self.log,
            ViewKind::Inspect => &self.inspect,
            ViewKind::FileBrowser => &self.file_browser,
            ViewKind::FileContent => &self.file_content,
            ViewKind::Top => &self.top,
            ViewKind::Confirm => &self.confirm,
            ViewKind::Help => &self.help,
        }
    }

    pub fn get_mut(&mut self, kind: ViewKind) -> &mut dyn View {
        match kind {
            ViewKind::Containers => &mut self.containers,
            ViewKind::Projects => &mut self.projects,
            ViewKind::Images => &mut self.images,
            ViewKind::Networks => &mut self.networks,
            ViewKind::Volumes => &mut self.volumes,
            ViewKind::Log => &mut self.log,
            ViewKind::Inspect => &mut self.inspect,
            ViewKind::FileBrowser => &mut self.file_browser,
            ViewKind::FileContent => &mut self.file_content,
            ViewKind::Top => &mut self.top,
            ViewKind::Confirm => &mut self.confirm,
            ViewKind::Help => &mut self.help,
        }
    }

    pub fn table(&self, kind: ResourceKind) -> &TableView {
        match kind {
            ResourceKind::Containers => &self.containers,
            ResourceKind::Projects => &self.projects,
            ResourceKind::Images => &self.images,
            ResourceKind::Networks => &self.networks,
            ResourceKind::Volumes => &self.volumes,
        }
    }

    pub fn table_mut(&mut self, kind: ResourceKind) -> &mut TableView {
        match kind {
            ResourceKind::Containers => &mut self.containers,
            ResourceKind::Projects => &mut self.projects,
            ResourceKind::Images => &mut self.images,
            ResourceKind::Networks => &mut self.networks,
            ResourceKind::Volumes => &mut self.volumes,
        }
    }

    /// Text views that load asynchronously.
    pub fn loaded_text_mut(&mut self) -> [&mut TextView; 3] {
        [&mut self.inspect, &mut self.file_content, &mut self.top]
    }

    /// `body_height` is the inner height of the body block.
    pub fn resize_all(&mut self, body_height: usize) {
        for kind in ViewKind::ALL {
            let view = self.get_mut(kind);
            let rows = body_height.saturating_sub(view.header_rows()).max(1);
            view.resize(rows);
        }
    }
}

pub fn list_view(kind: ResourceKind) -> ViewKind {
    match kind {
        ResourceKind::Containers => ViewKind::Containers,
        ResourceKind::Projects => ViewKind::Projects,
        ResourceKind::Images => ViewKind::Images,
        ResourceKind::Networks => ViewKind::Networks,
        ResourceKind::Volumes => ViewKind::Volumes,
    }
}

pub fn list_resource(view: ViewKind) -> Option<ResourceKind> {
    match view {
        ViewKind::Containers => Some(ResourceKind::Containers),
        ViewKind::Projects => Some(ResourceKind::Projects),
        ViewKind::Images => Some(ResourceKind::Images),
        ViewKind::Networks => Some(ResourceKind::Networks),
        ViewKind::Volumes => Some(ResourceKind::Volumes),
        _ => None,
    }
}
