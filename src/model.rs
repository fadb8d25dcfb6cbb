use crate::viewport::Searchable;
use std::borrow::Cow;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    Containers,
    Projects,
    Images,
    Networks,
    Volumes,
}

impl ResourceKind {
    pub const ALL: [Self; 5] = [
        Self::Containers,
        Self::Projects,
        Self::Images,
        Self::Networks,
        Self::Volumes,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Self::Containers => "Containers",
            Self::Projects => "Projects",
            Self::Images => "Images",
            Self::Networks => "Networks",
            Self::Volumes => "Volumes",
        }
    }

    /// Object noun accepted by `<cli> <noun> inspect`.
    pub fn cli_noun(self) -> &'static str {
        match self {
            Self::Containers => "container",
            Self::Projects => "compose",
            Self::Images => "image",
            Self::Networks => "network",
            Self::Volumes => "volume",
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

/// Filters applied when listing containers.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ListScope {
    pub project: Option<String>,
    pub host: Option<String>,
}

impl ListScope {
    pub fn is_root(&self) -> bool {
        self.project.is_none() && self.host.is_none()
    }

    pub fn label(&self) -> String {
        match (&self.host, &self.project) {
            (Some(host), Some(project)) => format!("{host} › {project}"),
            (Some(host), None) => format!("host {host}"),
            (None, Some(project)) => format!("project {project}"),
            (None, None) => "all".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct RowData {
    pub id: String,
    pub name: String,
    pub cells: Vec<String>,
    pub project: Option<String>,
    pub host: Option<String>,
}

impl RowData {
    pub fn target(&self) -> ActionTarget {
        ActionTarget {
            id: self.id.clone(),
            name: self.name.clone(),
            host: self.host.clone(),
        }
    }
}

impl Searchable for RowData {
    fn search_text(&self) -> Cow<'_, str> {
        Cow::Owned(self.cells.join(" "))
    }
}

/// One listing as returned by the container CLI.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct TableData {
    pub headers: Vec<String>,
    pub rows: Vec<RowData>,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ActionTarget {
    pub id: String,
    pub name: String,
    pub host: Option<String>,
}

impl ActionTarget {
    pub fn label(&self) -> String {
        match &self.host {
            Some(host) => format!("{}@{host}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Where a text view's content comes from, kept so the view can reload it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TextSource {
    Inspect { kind: ResourceKind, target: ActionTarget },
    Top { target: ActionTarget },
    File { target: ActionTarget, path: String },
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ResourceAction {
    Start,
    Stop,
    Restart,
    Kill,
    Pause,
    Unpause,
    Remove,
    ProjectStop,
    ProjectRestart,
    ProjectDown,
    RemoveImage,
    RemoveNetwork,
    RemoveVolume,
}

impl ResourceAction {
    pub fn label(self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::Stop => "Stop",
            Self::Restart => "Restart",
            Self::Kill => "Kill",
            Self::Pause => "Pause",
            Self::Unpause => "Unpause",
            Self::Remove => "Remove",
            Self::ProjectStop => "Stop project",
            Self::ProjectRestart => "Restart project",
            Self::ProjectDown => "Down project",
            Self::RemoveImage => "Remove image",
            Self::RemoveNetwork => "Remove network",
            Self::RemoveVolume => "Remove volume",
        }
    }

    /// Aggressive actions go through the confirmation view first.
    pub fn is_aggressive(self) -> bool {
        !matches!(self, Self::Start | Self::Unpause)
    }

    /// The list that reflects the action's outcome.
    pub fn refreshes(self) -> ResourceKind {
        match self {
            Self::ProjectStop | Self::ProjectRestart | Self::ProjectDown => ResourceKind::Projects,
            Self::RemoveImage => ResourceKind::Images,
            Self::RemoveNetwork => ResourceKind::Networks,
            Self::RemoveVolume => ResourceKind::Volumes,
            _ => ResourceKind::Containers,
        }
    }

    /// CLI arguments, without the program name. `program` is reused inside a
    /// host container.
    pub fn cli_args(self, program: &str, target: &ActionTarget) -> Vec<String> {
        let id = target.id.clone();
        let args = match self {
            Self::Start => vec!["start".to_string(), id],
            Self::Stop => vec!["stop".to_string(), id],
            Self::Restart => vec!["restart".to_string(), id],
            Self::Kill => vec!["kill".to_string(), id],
            Self::Pause => vec!["pause".to_string(), id],
            Self::Unpause => vec!["unpause".to_string(), id],
            Self::Remove => vec!["rm".to_string(), id],
            Self::ProjectStop => compose_args(&target.name, "stop"),
            Self::ProjectRestart => compose_args(&target.name, "restart"),
            Self::ProjectDown => compose_args(&target.name, "down"),
            Self::RemoveImage => vec!["image".to_string(), "rm".to_string(), id],
            Self::RemoveNetwork => vec!["network".to_string(), "rm".to_string(), id],
            Self::RemoveVolume => vec!["volume".to_string(), "rm".to_string(), id],
        };

        through_host(program, target.host.as_deref(), args)
    }
}

/// Prefixes `args` so they run against the engine inside `host`.
pub fn through_host(program: &str, host: Option<&str>, args: Vec<String>) -> Vec<String> {
    match host {
        Some(host) => {
            let mut nested = vec!["exec".to_string(), host.to_string(), program.to_string()];
            nested.extend(args);
            nested
        }
        None => args,
    }
}

fn compose_args(project: &str, verb: &str) -> Vec<String> {
    vec![
        "compose".to_string(),
        "-p".to_string(),
        project.to_string(),
        verb.to_string(),
    ]
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FileEntry {
    pub name: String,
    pub is_dir: bool,
}

impl FileEntry {
    /// Parses one line of `ls -1Ap` output.
    pub fn from_ls_line(line: &str) -> Option<Self> {
        let line = line.trim_end();
        if line.is_empty() {
            return None;
        }
        match line.strip_suffix('/') {
            Some(name) => Some(Self {
                name: name.to_string(),
                is_dir: true,
            }),
            None => Some(Self {
                name: line.to_string(),
                is_dir: false,
            }),
        }
    }
}

impl Searchable for FileEntry {
    fn search_text(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.name.as_str())
    }
}

pub fn join_path(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::{ActionTarget, FileEntry, ListScope, ResourceAction, ResourceKind, join_path};

    fn target(host: Option<&str>) -> ActionTarget {
        ActionTarget {
            id: "abc123".to_string(),
            name: "web-1".to_string(),
            host: host.map(str::to_string),
        }
    }

    #[test]
    fn only_start_and_unpause_skip_confirmation() {
        assert!(!ResourceAction::Start.is_aggressive());
        assert!(!ResourceAction::Unpause.is_aggressive());
        for action in [
            ResourceAction::Stop,
            ResourceAction::Kill,
            ResourceAction::Remove,
            ResourceAction::ProjectDown,
            ResourceAction::Pause,
            ResourceAction::RemoveVolume,
        ] {
            assert!(action.is_aggressive(), "{action:?} should need confirmation");
        }
    }

    #[test]
    fn nested_targets_run_through_host() {
        assert_eq!(
            ResourceAction::Stop.cli_args("docker", &target(Some("dind"))),
            vec!["exec", "dind", "docker", "stop", "abc123"]
        );
        assert_eq!(
            ResourceAction::Pause.cli_args("podman", &target(Some("pind"))),
            vec!["exec", "pind", "podman", "pause", "abc123"]
        );
        assert_eq!(
            ResourceAction::Kill.cli_args("docker", &target(None)),
            vec!["kill", "abc123"]
        );
    }

    #[test]
    fn project_actions_use_compose_project_name() {
        assert_eq!(
            ResourceAction::ProjectDown.cli_args("docker", &target(None)),
            vec!["compose", "-p", "web-1", "down"]
        );
        assert_eq!(ResourceAction::ProjectDown.refreshes(), ResourceKind::Projects);
    }

    #[test]
    fn ls_lines_mark_directories() {
        assert_eq!(
            FileEntry::from_ls_line("etc/"),
            Some(FileEntry {
                name: "etc".to_string(),
                is_dir: true
            })
        );
        assert_eq!(FileEntry::from_ls_line("  "), None);
        assert_eq!(join_path("/", "etc"), "/etc");
        assert_eq!(join_path("/etc", "hosts"), "/etc/hosts");
    }

    #[test]
    fn scope_label_describes_drilldown() {
        assert_eq!(ListScope::default().label(), "all");
        let scope = ListScope {
            project: Some("shop".to_string()),
            host: None,
        };
        assert_eq!(scope.label(), "project shop");
        assert!(!scope.is_root());
    }
}
