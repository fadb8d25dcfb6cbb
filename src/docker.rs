use crate::model::{
    ActionTarget, FileEntry, ListScope, ResourceAction, ResourceKind, RowData, TableData,
    TextSource, through_host,
};
use crate::stream::{StreamCommand, StreamTarget};
use anyhow::{Context, Result, anyhow};
use serde_json::{Map, Value};
use std::process::Stdio;
use tokio::process::Command as TokioCommand;
use tracing::debug;

const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";
const JSON_LINES: &str = "{{json .}}";

struct Column {
    header: &'static str,
    field: &'static str,
}

const CONTAINER_COLUMNS: &[Column] = &[
    Column { header: "NAME", field: "Names" },
    Column { header: "IMAGE", field: "Image" },
    Column { header: "STATE", field: "State" },
    Column { header: "STATUS", field: "Status" },
    Column { header: "PORTS", field: "Ports" },
];
const PROJECT_COLUMNS: &[Column] = &[
    Column { header: "NAME", field: "Name" },
    Column { header: "STATUS", field: "Status" },
    Column { header: "CONFIG FILES", field: "ConfigFiles" },
];
const IMAGE_COLUMNS: &[Column] = &[
    Column { header: "REPOSITORY", field: "Repository" },
    Column { header: "TAG", field: "Tag" },
    Column { header: "ID", field: "ID" },
    Column { header: "SIZE", field: "Size" },
    Column { header: "CREATED", field: "CreatedSince" },
];
const NETWORK_COLUMNS: &[Column] = &[
    Column { header: "NAME", field: "Name" },
    Column { header: "ID", field: "ID" },
    Column { header: "DRIVER", field: "Driver" },
    Column { header: "SCOPE", field: "Scope" },
];
const VOLUME_COLUMNS: &[Column] = &[
    Column { header: "NAME", field: "Name" },
    Column { header: "DRIVER", field: "Driver" },
    Column { header: "SCOPE", field: "Scope" },
];

fn columns(kind: ResourceKind) -> &'static [Column] {
    match kind {
        ResourceKind::Containers => CONTAINER_COLUMNS,
        ResourceKind::Projects => PROJECT_COLUMNS,
        ResourceKind::Images => IMAGE_COLUMNS,
        ResourceKind::Networks => NETWORK_COLUMNS,
        ResourceKind::Volumes => VOLUME_COLUMNS,
    }
}

/// Gateway to a docker-compatible CLI (`docker`, `podman`, ...).
#[derive(Debug, Clone)]
pub struct ContainerCli {
    program: String,
}

impl ContainerCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub async fn list(&self, kind: ResourceKind, scope: &ListScope) -> Result<TableData> {
        let raw = self.run(&list_args(&self.program, kind, scope)).await?;
        parse_listing(kind, &raw, scope.host.as_deref())
            .with_context(|| format!("failed to parse {} listing", kind.title().to_lowercase()))
    }

    pub async fn load_text(&self, source: &TextSource) -> Result<String> {
        let raw = self.run(&text_args(&self.program, source)).await?;
        Ok(match source {
            TextSource::Inspect { .. } => pretty_json(&raw),
            TextSource::Top { .. } | TextSource::File { .. } => raw,
        })
    }

    pub async fn list_files(&self, target: &ActionTarget, path: &str) -> Result<Vec<FileEntry>> {
        let args = through_host(
            &self.program,
            target.host.as_deref(),
            vec![
                "exec".to_string(),
                target.id.clone(),
                "ls".to_string(),
                "-1Ap".to_string(),
                path.to_string(),
            ],
        );
        let raw = self.run(&args).await?;
        Ok(raw.lines().filter_map(FileEntry::from_ls_line).collect())
    }

    pub async fn run_action(&self, action: ResourceAction, target: &ActionTarget) -> Result<String> {
        let output = self.run(&action.cli_args(&self.program, target)).await?;
        Ok(output.trim().to_string())
    }

    pub fn follow_logs_command(&self, target: &StreamTarget, tail: usize) -> StreamCommand {
        let tail = tail.to_string();
        let args = match &target.project {
            Some(project) => vec![
                "compose".to_string(),
                "-p".to_string(),
                project.clone(),
                "logs".to_string(),
                "-f".to_string(),
                "--tail".to_string(),
                tail,
            ],
            None => through_host(
                &self.program,
                target.host.as_deref(),
                vec![
                    "logs".to_string(),
                    "-f".to_string(),
                    "--tail".to_string(),
                    tail,
                    target.id.clone(),
                ],
            ),
        };
        StreamCommand::new(self.program.clone(), args)
    }

    async fn run(&self, args: &[String]) -> Result<String> {
        debug!(program = %self.program, ?args, "running container cli");
        let output = TokioCommand::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to execute {}", self.program))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let verb = args.first().map(String::as_str).unwrap_or_default();
        let detail = stderr
            .lines()
            .chain(stdout.lines())
            .find(|line| !line.trim().is_empty())
            .map(str::trim)
            .unwrap_or("no output");
        Err(anyhow!(
            "{} {verb} exited with {}: {detail}",
            self.program,
            output.status
        ))
    }
}

pub fn list_args(program: &str, kind: ResourceKind, scope: &ListScope) -> Vec<String> {
    let mut args = match kind {
        ResourceKind::Containers => vec!["ps".to_string(), "-a".to_string()],
        ResourceKind::Projects => {
            return vec![
                "compose".to_string(),
                "ls".to_string(),
                "-a".to_string(),
                "--format".to_string(),
                "json".to_string(),
            ];
        }
        ResourceKind::Images => vec!["images".to_string()],
        ResourceKind::Networks => vec!["network".to_string(), "ls".to_string()],
        ResourceKind::Volumes => vec!["volume".to_string(), "ls".to_string()],
    };
    if kind == ResourceKind::Containers
        && let Some(project) = &scope.project
    {
        args.push("--filter".to_string());
        args.push(format!("label={COMPOSE_PROJECT_LABEL}={project}"));
    }
    args.push("--format".to_string());
    args.push(JSON_LINES.to_string());

    match kind {
        ResourceKind::Containers => through_host(program, scope.host.as_deref(), args),
        _ => args,
    }
}

pub fn text_args(program: &str, source: &TextSource) -> Vec<String> {
    match source {
        TextSource::Inspect {
            kind: ResourceKind::Projects,
            target,
        } => vec![
            "compose".to_string(),
            "-p".to_string(),
            target.name.clone(),
            "ps".to_string(),
            "-a".to_string(),
            "--format".to_string(),
            "json".to_string(),
        ],
        TextSource::Inspect { kind, target } => through_host(
            program,
            target.host.as_deref(),
            vec![kind.cli_noun().to_string(), "inspect".to_string(), target.id.clone()],
        ),
        TextSource::Top { target } => through_host(
            program,
            target.host.as_deref(),
            vec!["top".to_string(), target.id.clone()],
        ),
        TextSource::File { target, path } => through_host(
            program,
            target.host.as_deref(),
            vec![
                "exec".to_string(),
                target.id.clone(),
                "cat".to_string(),
                path.clone(),
            ],
        ),
    }
}

/// Accepts JSON lines or a single JSON array.
pub fn parse_listing(kind: ResourceKind, raw: &str, host: Option<&str>) -> Result<TableData> {
    let records = parse_records(raw)?;
    let headers = columns(kind)
        .iter()
        .map(|column| column.header.to_string())
        .collect();
    let rows = records
        .iter()
        .map(|record| row_from_record(kind, record, host))
        .collect();
    Ok(TableData { headers, rows })
}

fn parse_records(raw: &str) -> Result<Vec<Map<String, Value>>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        let values: Vec<Value> = serde_json::from_str(trimmed).context("invalid JSON array")?;
        return Ok(values.into_iter().filter_map(into_object).collect());
    }
    trimmed
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(index, line)| {
            serde_json::from_str::<Value>(line)
                .with_context(|| format!("invalid JSON on line {}", index + 1))
                .map(into_object)
        })
        .filter_map(Result::transpose)
        .collect()
}

fn into_object(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn row_from_record(kind: ResourceKind, record: &Map<String, Value>, host: Option<&str>) -> RowData {
    let cells = columns(kind)
        .iter()
        .map(|column| field(record, column.field))
        .collect::<Vec<_>>();
    let name = match kind {
        ResourceKind::Images => {
            let repository = field(record, "Repository");
            let tag = field(record, "Tag");
            if tag.is_empty() || tag == "<none>" {
                repository
            } else {
                format!("{repository}:{tag}")
            }
        }
        ResourceKind::Containers => field(record, "Names"),
        _ => field(record, "Name"),
    };
    let id = match field(record, "ID") {
        id if id.is_empty() => name.clone(),
        id => id,
    };
    let project = match kind {
        ResourceKind::Containers => label_value(&field(record, "Labels"), COMPOSE_PROJECT_LABEL),
        ResourceKind::Projects => Some(name.clone()),
        _ => None,
    };
    let host = match kind {
        ResourceKind::Containers => host.map(str::to_string),
        _ => None,
    };

    RowData {
        id,
        name,
        cells,
        project,
        host,
    }
}

fn field(record: &Map<String, Value>, key: &str) -> String {
    match record.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(","),
        Some(other) => other.to_string(),
    }
}

/// Reads one key out of docker's `k=v,k=v` label rendering.
fn label_value(labels: &str, key: &str) -> Option<String> {
    labels
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| name.trim() == key)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn pretty_json(raw: &str) -> String {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::{ContainerCli, label_value, list_args, parse_listing, pretty_json, text_args};
    use crate::model::{ActionTarget, ListScope, ResourceKind, TextSource};
    use crate::stream::StreamTarget;
    use tokio::time::{Duration, sleep, timeout};

    fn target(host: Option<&str>) -> ActionTarget {
        ActionTarget {
            id: "c0ffee".to_string(),
            name: "web-1".to_string(),
            host: host.map(str::to_string),
        }
    }

    #[test]
    fn container_lines_pick_display_columns_and_project() {
        let raw = concat!(
            r#"{"ID":"a1","Names":"shop-web-1","Image":"nginx","State":"running","Status":"Up 2 hours","Ports":"80/tcp","Labels":"com.docker.compose.project=shop,other=x"}"#,
            "\n",
            r#"{"ID":"b2","Names":"solo","Image":"redis","State":"exited","Status":"Exited (0)","Ports":"","Labels":""}"#,
            "\n"
        );
        let table = parse_listing(ResourceKind::Containers, raw, Some("dind")).unwrap();
        assert_eq!(table.headers, vec!["NAME", "IMAGE", "STATE", "STATUS", "PORTS"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].cells, vec!["shop-web-1", "nginx", "running", "Up 2 hours", "80/tcp"]);
        assert_eq!(table.rows[0].project.as_deref(), Some("shop"));
        assert_eq!(table.rows[0].host.as_deref(), Some("dind"));
        assert_eq!(table.rows[1].project, None);
    }

    #[test]
    fn compose_ls_array_uses_name_as_id() {
        let raw = r#"[{"Name":"shop","Status":"running(3)","ConfigFiles":"/srv/shop/compose.yaml"}]"#;
        let table = parse_listing(ResourceKind::Projects, raw, None).unwrap();
        assert_eq!(table.rows[0].id, "shop");
        assert_eq!(table.rows[0].project.as_deref(), Some("shop"));
    }

    #[test]
    fn image_name_joins_repository_and_tag() {
        let raw = r#"{"ID":"sha1","Repository":"nginx","Tag":"1.27","Size":"190MB","CreatedSince":"2 weeks ago"}
{"ID":"sha2","Repository":"<none>","Tag":"<none>","Size":"1MB","CreatedSince":"1 day ago"}"#;
        let table = parse_listing(ResourceKind::Images, raw, None).unwrap();
        assert_eq!(table.rows[0].name, "nginx:1.27");
        assert_eq!(table.rows[1].name, "<none>");
    }

    #[test]
    fn empty_output_is_an_empty_table_and_garbage_is_an_error() {
        assert!(parse_listing(ResourceKind::Volumes, "\n", None).unwrap().rows.is_empty());
        assert!(parse_listing(ResourceKind::Volumes, "not json", None).is_err());
    }

    #[test]
    fn scoped_container_listing_filters_and_nests() {
        let scope = ListScope {
            project: Some("shop".to_string()),
            host: Some("dind".to_string()),
        };
        assert_eq!(
            list_args("docker", ResourceKind::Containers, &scope),
            vec![
                "exec",
                "dind",
                "docker",
                "ps",
                "-a",
                "--filter",
                "label=com.docker.compose.project=shop",
                "--format",
                "{{json .}}"
            ]
        );
        assert_eq!(
            list_args("docker", ResourceKind::Projects, &scope),
            vec!["compose", "ls", "-a", "--format", "json"]
        );
    }

    #[test]
    fn text_sources_map_to_cli_calls() {
        assert_eq!(
            text_args("docker", &TextSource::Inspect {
                kind: ResourceKind::Images,
                target: target(None)
            }),
            vec!["image", "inspect", "c0ffee"]
        );
        assert_eq!(
            text_args("podman", &TextSource::File {
                target: target(Some("dind")),
                path: "/etc/hosts".to_string()
            }),
            vec!["exec", "dind", "podman", "exec", "c0ffee", "cat", "/etc/hosts"]
        );
    }

    #[test]
    fn follow_command_covers_plain_nested_and_project_targets() {
        let cli = ContainerCli::new("podman");
        let plain = StreamTarget {
            id: "c0ffee".to_string(),
            name: "web".to_string(),
            ..StreamTarget::default()
        };
        let command = cli.follow_logs_command(&plain, 50);
        assert_eq!(command.program, "podman");
        assert_eq!(command.args, vec!["logs", "-f", "--tail", "50", "c0ffee"]);

        let nested = StreamTarget {
            host: Some("dind".to_string()),
            ..plain.clone()
        };
        assert_eq!(
            cli.follow_logs_command(&nested, 5).args,
            vec!["exec", "dind", "podman", "logs", "-f", "--tail", "5", "c0ffee"]
        );

        let project = StreamTarget {
            project: Some("shop".to_string()),
            ..plain
        };
        assert_eq!(
            cli.follow_logs_command(&project, 5).args,
            vec!["compose", "-p", "shop", "logs", "-f", "--tail", "5"]
        );
    }

    #[test]
    fn labels_and_pretty_json_helpers() {
        assert_eq!(label_value("a=1, com.docker.compose.project = shop", "com.docker.compose.project"), Some("shop".to_string()));
        assert_eq!(label_value("", "a"), None);
        assert_eq!(pretty_json("[1]"), "[\n  1\n]");
        assert_eq!(pretty_json("plain"), "plain");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_command_reports_first_stderr_line() {
        let cli = ContainerCli::new("sh");
        let error = cli
            .run(&["-c".to_string(), "echo 'no such container' 1>&2; exit 1".to_string()])
            .await
            .unwrap_err();
        let message = error.to_string();
        assert!(message.contains("exited with"), "{message}");
        assert!(message.contains("no such container"), "{message}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn abandoned_command_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("finished");
        let cli = ContainerCli::new("sh");
        let script = format!("sleep 1; touch '{}'", marker.display());
        let args = ["-c".to_string(), script];

        let result = timeout(Duration::from_millis(50), cli.run(&args)).await;
        assert!(result.is_err());

        sleep(Duration::from_millis(1_800)).await;
        assert!(!marker.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_binary_is_a_context_error() {
        let cli = ContainerCli::new("/nonexistent/berth-docker");
        let error = cli.list(ResourceKind::Containers, &ListScope::default()).await.unwrap_err();
        assert!(error.to_string().contains("failed to execute"));
    }
}
