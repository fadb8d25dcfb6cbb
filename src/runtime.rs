use crate::app::{Msg, Task};
use crate::config::Settings;
use crate::docker::ContainerCli;
use crate::stream::{StreamEngine, spawn_follower};
use anyhow::{Result, anyhow};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Duration, timeout};
use tracing::{debug, info};

const LOAD_TIMEOUT: Duration = Duration::from_secs(10);
const ACTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Executes the tasks returned by `App::update`. Every result comes back
/// through `tx` as a `Msg`; nothing here touches the model.
pub struct TaskRunner {
    cli: Arc<ContainerCli>,
    engine: StreamEngine,
    follower: Option<JoinHandle<()>>,
    tx: UnboundedSender<Msg>,
    poll_every: Duration,
    log_tail: usize,
}

impl TaskRunner {
    pub fn new(cli: ContainerCli, settings: &Settings, tx: UnboundedSender<Msg>) -> Self {
        Self {
            cli: Arc::new(cli),
            engine: StreamEngine::new(),
            follower: None,
            tx,
            poll_every: Duration::from_millis(settings.stream_poll_ms),
            log_tail: settings.log_tail,
        }
    }

    /// Takes effect for the next stream; the runtime program is fixed at start.
    pub fn apply_settings(&mut self, settings: &Settings) {
        self.poll_every = Duration::from_millis(settings.stream_poll_ms);
        self.log_tail = settings.log_tail;
    }

    /// Returns false once the app asked to quit.
    pub fn dispatch(&mut self, task: Task) -> bool {
        match task {
            Task::None => {}
            Task::Batch(tasks) => {
                let mut running = true;
                for task in tasks {
                    running &= self.dispatch(task);
                }
                return running;
            }
            Task::Quit => {
                self.stop_stream();
                return false;
            }
            Task::LoadRows { kind, scope } => {
                let cli = Arc::clone(&self.cli);
                self.spawn(async move {
                    let result = limited(LOAD_TIMEOUT, cli.list(kind, &scope)).await;
                    Msg::RowsLoaded {
                        kind,
                        scope,
                        result: result.map_err(|error| compact_error(&error)),
                    }
                });
            }
            Task::LoadText {
                request, source, ..
            } => {
                let cli = Arc::clone(&self.cli);
                self.spawn(async move {
                    let result = limited(LOAD_TIMEOUT, cli.load_text(&source)).await;
                    Msg::TextLoaded {
                        request,
                        result: result.map_err(|error| compact_error(&error)),
                    }
                });
            }
            Task::ListFiles {
                request,
                target,
                path,
            } => {
                let cli = Arc::clone(&self.cli);
                self.spawn(async move {
                    let result = limited(LOAD_TIMEOUT, cli.list_files(&target, &path)).await;
                    Msg::FilesLoaded {
                        request,
                        path,
                        result: result.map_err(|error| compact_error(&error)),
                    }
                });
            }
            Task::StartStream { request, target } => {
                let command = self.cli.follow_logs_command(&target, self.log_tail);
                let session = self.engine.start(command, target);
                let _ = self.tx.send(Msg::StreamStarted {
                    request,
                    session: session.id(),
                });
                if let Some(previous) = self.follower.take() {
                    previous.abort();
                }
                self.follower = Some(spawn_follower(
                    session,
                    self.poll_every,
                    self.tx.clone(),
                    Msg::Stream,
                ));
            }
            Task::CancelStream => self.stop_stream(),
            Task::RunOneShot {
                action,
                target,
                label,
            } => {
                info!(action = action.label(), resource = %label, "running action");
                let cli = Arc::clone(&self.cli);
                self.spawn(async move {
                    let result = limited(ACTION_TIMEOUT, cli.run_action(action, &target)).await;
                    Msg::ActionFinished {
                        action,
                        label,
                        result: result.map_err(|error| compact_error(&error)),
                    }
                });
            }
        }
        true
    }

    fn stop_stream(&mut self) {
        if let Some(session) = self.engine.cancel() {
            debug!(session, "log stream cancelled");
        }
        if let Some(follower) = self.follower.take() {
            follower.abort();
        }
    }

    fn spawn<F>(&self, work: F)
    where
        F: Future<Output = Msg> + Send + 'static,
    {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(work.await);
        });
    }
}

async fn limited<T>(limit: Duration, work: impl Future<Output = Result<T>>) -> Result<T> {
    match timeout(limit, work).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!("timed out after {limit:?}")),
    }
}

pub fn compact_error(error: &anyhow::Error) -> String {
    let mut out = Vec::new();
    for (index, cause) in error.chain().enumerate() {
        if index == 0 {
            out.push(cause.to_string());
        } else if index <= 2 {
            out.push(format!("caused by: {cause}"));
        } else {
            break;
        }
    }

    out.join("\n")
}

#[cfg(all(test, unix))]
mod tests {
    use super::{TaskRunner, compact_error, limited};
    use crate::app::{Msg, Task};
    use crate::config::Settings;
    use crate::docker::ContainerCli;
    use crate::model::{ListScope, ResourceKind};
    use crate::stream::{StreamEvent, StreamTarget};
    use anyhow::{Context, anyhow};
    use tokio::sync::mpsc;
    use tokio::time::{Duration, sleep, timeout};

    fn runner(program: &str) -> (TaskRunner, mpsc::UnboundedReceiver<Msg>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let runner = TaskRunner::new(ContainerCli::new(program), &Settings::default(), tx);
        (runner, rx)
    }

    #[tokio::test]
    async fn missing_program_reports_load_failure() {
        let (mut runner, mut rx) = runner("/nonexistent/berth-docker");
        assert!(runner.dispatch(Task::LoadRows {
            kind: ResourceKind::Images,
            scope: ListScope::default(),
        }));

        let msg = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        match msg {
            Msg::RowsLoaded {
                kind,
                result: Err(error),
                ..
            } => {
                assert_eq!(kind, ResourceKind::Images);
                assert!(error.contains("failed to execute"));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_spawn_failure_surfaces_as_failed_event() {
        let (mut runner, mut rx) = runner("/nonexistent/berth-docker");
        runner.dispatch(Task::StartStream {
            request: 4,
            target: StreamTarget {
                id: "c1".to_string(),
                name: "web".to_string(),
                ..StreamTarget::default()
            },
        });

        let session = match rx.recv().await {
            Some(Msg::StreamStarted { request: 4, session }) => session,
            other => panic!("unexpected message {other:?}"),
        };
        let msg = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(
            msg,
            Msg::Stream(StreamEvent::Failed { session: failed, .. }) if failed == session
        ));
    }

    #[tokio::test]
    async fn quit_stops_dispatching_and_cancels_stream() {
        let (mut runner, _rx) = runner("sleep");
        runner.dispatch(Task::StartStream {
            request: 1,
            target: StreamTarget::default(),
        });
        sleep(Duration::from_millis(20)).await;
        assert!(!runner.dispatch(Task::Batch(vec![Task::CancelStream, Task::Quit])));
        assert!(runner.engine.active().is_none());
        assert!(runner.follower.is_none());
    }

    #[tokio::test]
    async fn slow_work_times_out() {
        let result = limited(Duration::from_millis(10), async {
            sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(result.unwrap_err().to_string(), "timed out after 10ms");
    }

    #[test]
    fn compact_error_keeps_two_causes() {
        let error = Err::<(), _>(anyhow!("root"))
            .context("middle")
            .context("outer")
            .context("top")
            .unwrap_err();
        assert_eq!(compact_error(&error), "top\ncaused by: outer\ncaused by: middle");
    }
}
