use super::{App, InputMode, Task};
use crate::commands::{CommandSpec, KeyChord, Scope};
use crate::model::{ActionTarget, ListScope, ResourceAction, ResourceKind, RowData, TextSource, join_path};
use crate::navigation::ViewKind;
use crate::stream::StreamTarget;
use crate::views::{PendingAction, RequestId, View, list_resource};
use crossterm::event::KeyCode;

pub type Handler = fn(&mut App) -> Task;

const GLOBAL: Scope = Scope::Global;
const CONTAINERS: Scope = Scope::View(ViewKind::Containers);
const PROJECTS: Scope = Scope::View(ViewKind::Projects);
const IMAGES: Scope = Scope::View(ViewKind::Images);
const NETWORKS: Scope = Scope::View(ViewKind::Networks);
const VOLUMES: Scope = Scope::View(ViewKind::Volumes);
const LOG: Scope = Scope::View(ViewKind::Log);
const FILES: Scope = Scope::View(ViewKind::FileBrowser);
const CONFIRM: Scope = Scope::View(ViewKind::Confirm);
const TOP: Scope = Scope::View(ViewKind::Top);

const fn command(
    identity: &'static str,
    scope: Scope,
    keys: &'static [KeyChord],
    description: &'static str,
    handler: Handler,
) -> CommandSpec<Handler> {
    CommandSpec {
        identity,
        scope,
        keys,
        description,
        handler,
    }
}

const COMMANDS: &[CommandSpec<Handler>] = &[
    command("Quit", GLOBAL, &[KeyChord::char('q')], "Quit (asks first)", quit),
    command("ForceQuit", GLOBAL, &[KeyChord::ctrl('c')], "Quit immediately", force_quit),
    command("Help", GLOBAL, &[KeyChord::char('?')], "Commands for this view", help),
    command("Back", GLOBAL, &[KeyChord::plain(KeyCode::Esc)], "Go back", back),
    command("CommandMode", GLOBAL, &[KeyChord::char(':')], "Type a command", command_mode),
    command("Search", GLOBAL, &[KeyChord::char('/')], "Search rows", search_mode),
    command("FilterRows", GLOBAL, &[KeyChord::char('|')], "Filter rows", filter_mode),
    command("ToggleFilter", GLOBAL, &[KeyChord::ctrl('f')], "Turn the filter on or off", toggle_filter),
    command("NextMatch", GLOBAL, &[KeyChord::char('n')], "Next search match", next_match),
    command("PrevMatch", GLOBAL, &[KeyChord::char('N')], "Previous search match", prev_match),
    command(
        "CursorUp",
        GLOBAL,
        &[KeyChord::char('k'), KeyChord::plain(KeyCode::Up)],
        "Move up",
        cursor_up,
    ),
    command(
        "CursorDown",
        GLOBAL,
        &[KeyChord::char('j'), KeyChord::plain(KeyCode::Down)],
        "Move down",
        cursor_down,
    ),
    command(
        "PageUp",
        GLOBAL,
        &[KeyChord::plain(KeyCode::PageUp), KeyChord::ctrl('u')],
        "Page up",
        page_up,
    ),
    command(
        "PageDown",
        GLOBAL,
        &[KeyChord::plain(KeyCode::PageDown), KeyChord::ctrl('d')],
        "Page down",
        page_down,
    ),
    command(
        "Top",
        GLOBAL,
        &[KeyChord::char('g'), KeyChord::plain(KeyCode::Home)],
        "First row",
        cursor_top,
    ),
    command(
        "Bottom",
        GLOBAL,
        &[KeyChord::char('G'), KeyChord::plain(KeyCode::End)],
        "Last row",
        cursor_bottom,
    ),
    command("Refresh", GLOBAL, &[KeyChord::ctrl('r')], "Reload this view", refresh),
    command("PS", GLOBAL, &[KeyChord::char('1')], "Containers", show_containers),
    command("ComposeLS", GLOBAL, &[KeyChord::char('2')], "Compose projects", show_projects),
    command("Images", GLOBAL, &[KeyChord::char('3')], "Images", show_images),
    command("Networks", GLOBAL, &[KeyChord::char('4')], "Networks", show_networks),
    command("Volumes", GLOBAL, &[KeyChord::char('5')], "Volumes", show_volumes),
    // containers
    command("Logs", CONTAINERS, &[KeyChord::char('l')], "Follow container logs", logs),
    command(
        "Inspect",
        CONTAINERS,
        &[KeyChord::plain(KeyCode::Enter), KeyChord::char('i')],
        "Inspect container",
        inspect,
    ),
    command("Top", CONTAINERS, &[KeyChord::char('t')], "Processes in container", process_top),
    command("Files", CONTAINERS, &[KeyChord::char('f')], "Browse container files", files),
    command("EnterHost", CONTAINERS, &[KeyChord::char('H')], "List containers inside this one", enter_host),
    command("Start", CONTAINERS, &[KeyChord::char('S')], "Start container", start),
    command("Stop", CONTAINERS, &[KeyChord::char('s')], "Stop container", stop),
    command("Restart", CONTAINERS, &[KeyChord::char('R')], "Restart container", restart),
    command("Kill", CONTAINERS, &[KeyChord::char('K')], "Kill container", kill),
    command("Pause", CONTAINERS, &[KeyChord::char('p')], "Pause container", pause),
    command("Unpause", CONTAINERS, &[KeyChord::char('P')], "Unpause container", unpause),
    command("Remove", CONTAINERS, &[KeyChord::char('d')], "Remove container", remove),
    // projects
    command(
        "OpenProject",
        PROJECTS,
        &[KeyChord::plain(KeyCode::Enter)],
        "Containers of this project",
        open_project,
    ),
    command("ProjectLogs", PROJECTS, &[KeyChord::char('l')], "Follow project logs", project_logs),
    command("Inspect", PROJECTS, &[KeyChord::char('i')], "Project services", inspect),
    command("ProjectStop", PROJECTS, &[KeyChord::char('s')], "Stop project", project_stop),
    command("ProjectRestart", PROJECTS, &[KeyChord::char('R')], "Restart project", project_restart),
    command("ProjectDown", PROJECTS, &[KeyChord::char('D')], "Take project down", project_down),
    // images, networks, volumes
    command(
        "Inspect",
        IMAGES,
        &[KeyChord::plain(KeyCode::Enter), KeyChord::char('i')],
        "Inspect image",
        inspect,
    ),
    command("Remove", IMAGES, &[KeyChord::char('d')], "Remove image", remove),
    command(
        "Inspect",
        NETWORKS,
        &[KeyChord::plain(KeyCode::Enter), KeyChord::char('i')],
        "Inspect network",
        inspect,
    ),
    command("Remove", NETWORKS, &[KeyChord::char('d')], "Remove network", remove),
    command(
        "Inspect",
        VOLUMES,
        &[KeyChord::plain(KeyCode::Enter), KeyChord::char('i')],
        "Inspect volume",
        inspect,
    ),
    command("Remove", VOLUMES, &[KeyChord::char('d')], "Remove volume", remove),
    // log
    command("ToggleFollow", LOG, &[KeyChord::char('F')], "Follow or pause the tail", toggle_follow),
    command("ClearLog", LOG, &[KeyChord::char('c')], "Clear received lines", clear_log),
    // file browser
    command(
        "OpenEntry",
        FILES,
        &[KeyChord::plain(KeyCode::Enter)],
        "Open directory or file",
        open_entry,
    ),
    command(
        "ParentDir",
        FILES,
        &[KeyChord::plain(KeyCode::Backspace)],
        "Parent directory",
        parent_dir,
    ),
    // confirmation
    command(
        "Confirm",
        CONFIRM,
        &[KeyChord::char('y'), KeyChord::plain(KeyCode::Enter)],
        "Run the pending action",
        confirm,
    ),
    command(
        "Cancel",
        CONFIRM,
        &[KeyChord::char('n'), KeyChord::plain(KeyCode::Esc)],
        "Cancel",
        cancel,
    ),
    // top
    command("Refresh", TOP, &[KeyChord::char('r')], "Reload the process table", refresh),
];

pub fn command_specs() -> Vec<CommandSpec<Handler>> {
    COMMANDS.to_vec()
}

fn quit(app: &mut App) -> Task {
    app.arm_quit();
    Task::None
}

fn force_quit(app: &mut App) -> Task {
    app.quit_now()
}

pub(super) fn help(app: &mut App) -> Task {
    let view = match app.nav.active() {
        ViewKind::Help => app.nav.previous().unwrap_or(ViewKind::Containers),
        active => active,
    };
    let lines = app.help_lines(view);
    app.views.help.set_static(format!("Help: {view}"), lines);
    app.switch_to(ViewKind::Help)
}

fn back(app: &mut App) -> Task {
    app.go_back()
}

fn command_mode(app: &mut App) -> Task {
    app.enter_mode(InputMode::Command);
    Task::None
}

fn search_mode(app: &mut App) -> Task {
    app.enter_mode(InputMode::Search);
    Task::None
}

fn filter_mode(app: &mut App) -> Task {
    app.enter_mode(InputMode::Filter);
    Task::None
}

fn toggle_filter(app: &mut App) -> Task {
    match active_view(app).toggle_filter() {
        Some(true) => app.set_info("Filter on"),
        Some(false) => app.set_info("Filter off"),
        None => app.set_error("no filter to toggle"),
    }
    Task::None
}

fn next_match(app: &mut App) -> Task {
    if active_view(app).next_match().is_none() {
        app.set_error("no search matches");
    }
    Task::None
}

fn prev_match(app: &mut App) -> Task {
    if active_view(app).prev_match().is_none() {
        app.set_error("no search matches");
    }
    Task::None
}

fn cursor_up(app: &mut App) -> Task {
    active_view(app).handle_up(1);
    Task::None
}

fn cursor_down(app: &mut App) -> Task {
    active_view(app).handle_down(1);
    Task::None
}

fn page_up(app: &mut App) -> Task {
    active_view(app).page_up();
    Task::None
}

fn page_down(app: &mut App) -> Task {
    active_view(app).page_down();
    Task::None
}

fn cursor_top(app: &mut App) -> Task {
    active_view(app).top();
    Task::None
}

fn cursor_bottom(app: &mut App) -> Task {
    active_view(app).bottom();
    Task::None
}

fn refresh(app: &mut App) -> Task {
    app.reload_active()
}

fn show_containers(app: &mut App) -> Task {
    app.replace_with(ViewKind::Containers)
}

fn show_projects(app: &mut App) -> Task {
    app.replace_with(ViewKind::Projects)
}

fn show_images(app: &mut App) -> Task {
    app.replace_with(ViewKind::Images)
}

fn show_networks(app: &mut App) -> Task {
    app.replace_with(ViewKind::Networks)
}

fn show_volumes(app: &mut App) -> Task {
    app.replace_with(ViewKind::Volumes)
}

fn logs(app: &mut App) -> Task {
    let Some((_, row)) = selected_row(app) else {
        return Task::None;
    };
    let target = StreamTarget {
        id: row.id,
        name: row.name,
        host: row.host,
        project: None,
    };
    let start = app.start_stream(target);
    Task::batch([start, app.switch_to(ViewKind::Log)])
}

fn project_logs(app: &mut App) -> Task {
    let Some((_, row)) = selected_row(app) else {
        return Task::None;
    };
    let target = StreamTarget {
        id: row.id,
        project: Some(row.name.clone()),
        name: row.name,
        host: None,
    };
    let start = app.start_stream(target);
    Task::batch([start, app.switch_to(ViewKind::Log)])
}

fn inspect(app: &mut App) -> Task {
    let Some((kind, row)) = selected_row(app) else {
        return Task::None;
    };
    let target = row.target();
    let title = format!("Inspect {} {}", kind.cli_noun(), target.label());
    let source = TextSource::Inspect { kind, target };
    load_text(app, ViewKind::Inspect, title, source)
}

fn process_top(app: &mut App) -> Task {
    let Some((_, row)) = selected_row(app) else {
        return Task::None;
    };
    let target = row.target();
    let title = format!("Top {}", target.label());
    load_text(app, ViewKind::Top, title, TextSource::Top { target })
}

fn files(app: &mut App) -> Task {
    let Some((_, row)) = selected_row(app) else {
        return Task::None;
    };
    let target = row.target();
    let request = app.next_request();
    app.views.file_browser.open(target.clone(), request);
    let list = Task::ListFiles {
        request,
        target,
        path: app.views.file_browser.path().to_string(),
    };
    Task::batch([list, app.switch_to(ViewKind::FileBrowser)])
}

fn enter_host(app: &mut App) -> Task {
    if let Some(host) = app.views.containers.scope().host.clone() {
        app.set_error(format!("already listing containers inside {host}"));
        return Task::None;
    }
    let Some((_, row)) = selected_row(app) else {
        return Task::None;
    };
    app.views.containers.drill(ListScope {
        project: None,
        host: Some(row.name.clone()),
    });
    app.set_info(format!("Containers inside {}", row.name));
    app.load_rows(ResourceKind::Containers)
}

fn start(app: &mut App) -> Task {
    container_action(app, ResourceAction::Start)
}

fn stop(app: &mut App) -> Task {
    container_action(app, ResourceAction::Stop)
}

fn restart(app: &mut App) -> Task {
    container_action(app, ResourceAction::Restart)
}

fn kill(app: &mut App) -> Task {
    container_action(app, ResourceAction::Kill)
}

fn pause(app: &mut App) -> Task {
    container_action(app, ResourceAction::Pause)
}

fn unpause(app: &mut App) -> Task {
    container_action(app, ResourceAction::Unpause)
}

fn remove(app: &mut App) -> Task {
    let action = match app.nav.active() {
        ViewKind::Images => ResourceAction::RemoveImage,
        ViewKind::Networks => ResourceAction::RemoveNetwork,
        ViewKind::Volumes => ResourceAction::RemoveVolume,
        _ => ResourceAction::Remove,
    };
    container_action(app, action)
}

fn project_stop(app: &mut App) -> Task {
    container_action(app, ResourceAction::ProjectStop)
}

fn project_restart(app: &mut App) -> Task {
    container_action(app, ResourceAction::ProjectRestart)
}

fn project_down(app: &mut App) -> Task {
    container_action(app, ResourceAction::ProjectDown)
}

fn open_project(app: &mut App) -> Task {
    let Some((_, row)) = selected_row(app) else {
        return Task::None;
    };
    app.views.containers.drill(ListScope {
        project: Some(row.name),
        host: None,
    });
    app.switch_to(ViewKind::Containers)
}

fn toggle_follow(app: &mut App) -> Task {
    if app.views.log.toggle_follow() {
        app.set_info("Following log tail");
    } else {
        app.set_info("Log paused");
    }
    Task::None
}

fn clear_log(app: &mut App) -> Task {
    app.views.log.clear_lines();
    Task::None
}

fn open_entry(app: &mut App) -> Task {
    let Some(entry) = app.views.file_browser.selected().cloned() else {
        return Task::None;
    };
    let Some(target) = app.views.file_browser.target().cloned() else {
        return Task::None;
    };
    if entry.is_dir {
        let request = app.next_request();
        app.views.file_browser.enter(&entry.name, request);
        return list_files(app, request, target);
    }

    let path = join_path(app.views.file_browser.path(), &entry.name);
    let title = format!("File {}:{path}", target.label());
    load_text(app, ViewKind::FileContent, title, TextSource::File { target, path })
}

fn parent_dir(app: &mut App) -> Task {
    let Some(target) = app.views.file_browser.target().cloned() else {
        return Task::None;
    };
    let request = app.next_request();
    if !app.views.file_browser.parent(request) {
        return Task::None;
    }
    list_files(app, request, target)
}

fn confirm(app: &mut App) -> Task {
    let Some(pending) = app.views.confirm.take() else {
        return app.go_back();
    };
    let run = run_one_shot(app, pending.action, pending.target);
    Task::batch([run, app.go_back()])
}

fn cancel(app: &mut App) -> Task {
    app.go_back()
}

fn active_view(app: &mut App) -> &mut dyn View {
    let active = app.nav.active();
    app.views.get_mut(active)
}

/// Selected row of the active list view, or an error status when there is
/// none.
fn selected_row(app: &mut App) -> Option<(ResourceKind, RowData)> {
    let kind = list_resource(app.nav.active())?;
    match app.views.table(kind).selected().cloned() {
        Some(row) => Some((kind, row)),
        None => {
            app.set_error(format!("no {} selected", kind.cli_noun()));
            None
        }
    }
}

fn container_action(app: &mut App, action: ResourceAction) -> Task {
    let Some((_, row)) = selected_row(app) else {
        return Task::None;
    };
    let target = row.target();
    if !action.is_aggressive() {
        return run_one_shot(app, action, target);
    }
    app.views.confirm.arm(PendingAction { action, target });
    app.switch_to(ViewKind::Confirm)
}

fn run_one_shot(app: &mut App, action: ResourceAction, target: ActionTarget) -> Task {
    let label = target.label();
    app.set_info(format!("{} {label}...", action.label()));
    Task::RunOneShot {
        action,
        target,
        label,
    }
}

fn load_text(app: &mut App, view: ViewKind, title: String, source: TextSource) -> Task {
    let request = app.next_request();
    let text = match view {
        ViewKind::Top => &mut app.views.top,
        ViewKind::FileContent => &mut app.views.file_content,
        _ => &mut app.views.inspect,
    };
    text.begin(title, source.clone(), request);
    let load = Task::LoadText {
        request,
        view,
        source,
    };
    Task::batch([load, app.switch_to(view)])
}

fn list_files(app: &mut App, request: RequestId, target: ActionTarget) -> Task {
    Task::ListFiles {
        request,
        target,
        path: app.views.file_browser.path().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{COMMANDS, command_specs};
    use crate::commands::{CommandRegistry, KeyChord, Scope};
    use crate::navigation::ViewKind;

    #[test]
    fn command_table_registers_cleanly() {
        let registry = CommandRegistry::build(command_specs()).unwrap();
        assert_eq!(registry.names().count(), COMMANDS.len());
    }

    #[test]
    fn canonical_names_match_typed_commands() {
        let registry = CommandRegistry::build(command_specs()).unwrap();
        for (view, name) in [
            (ViewKind::Containers, "ps"),
            (ViewKind::Containers, "compose-ls"),
            (ViewKind::Containers, "enter-host"),
            (ViewKind::Log, "toggle-follow"),
            (ViewKind::Log, "clear-log"),
            (ViewKind::Projects, "project-down"),
            (ViewKind::FileBrowser, "parent-dir"),
            (ViewKind::Images, "filter-rows"),
        ] {
            assert!(registry.resolve_name(view, name).is_ok(), "{name} in {view}");
        }
    }

    #[test]
    fn confirmation_keys_shadow_globals() {
        let registry = CommandRegistry::build(command_specs()).unwrap();
        let n = registry.resolve_key(ViewKind::Confirm, KeyChord::char('n')).unwrap();
        assert_eq!(n.name, "cancel");
        assert_eq!(n.scope, Scope::View(ViewKind::Confirm));
        let n = registry.resolve_key(ViewKind::Log, KeyChord::char('n')).unwrap();
        assert_eq!(n.name, "next-match");
    }

    #[test]
    fn container_top_shadows_cursor_top_by_name_only() {
        let registry = CommandRegistry::build(command_specs()).unwrap();
        let top = registry.resolve_name(ViewKind::Containers, "top").unwrap();
        assert_eq!(top.scope, Scope::View(ViewKind::Containers));
        let g = registry.resolve_key(ViewKind::Containers, KeyChord::char('g')).unwrap();
        assert_eq!(g.scope, Scope::Global);
        let top = registry.resolve_name(ViewKind::Images, "top").unwrap();
        assert_eq!(top.scope, Scope::Global);
    }
}
