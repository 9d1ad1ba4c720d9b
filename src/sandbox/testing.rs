//! Scripted in-memory runtime for tests
//!
//! Records every verb and simulates a per-container filesystem for the
//! shell commands the execution engine issues.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::sandbox::provision::ProvisioningTemplate;
use crate::sandbox::runtime::{ContainerRuntime, ContainerSummary, ExecOutput};

/// A recorded runtime call
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Ping,
    ImageExists(String),
    Pull(String),
    Create { name: String, image: String },
    Start(String),
    Exec { id: String, cmd: Vec<String> },
    Stop(String),
    Remove(String),
    List(String),
}

type Program = Box<dyn Fn(&str) -> ExecOutput + Send + Sync>;

#[derive(Default)]
struct FakeContainer {
    name: String,
    files: HashMap<String, String>,
    removed: bool,
}

#[derive(Default)]
struct FakeState {
    next_id: u64,
    containers: HashMap<String, FakeContainer>,
    /// Containers that exist in the daemon but were never created through us
    foreign: Vec<ContainerSummary>,
}

/// In-memory [`ContainerRuntime`]
pub(crate) struct FakeRuntime {
    calls: Mutex<Vec<Call>>,
    state: Mutex<FakeState>,
    program: Program,
    failing_init: HashSet<String>,
    fail_pull: bool,
    fail_stop: bool,
    fail_write: bool,
    exec_delay: Option<Duration>,
    pull_delay: Option<Duration>,
    cleanup_delay: Option<Duration>,
    local_images: HashSet<String>,
}

impl FakeRuntime {
    pub(crate) fn new() -> Self {
        FakeRuntime {
            calls: Mutex::new(Vec::new()),
            state: Mutex::new(FakeState::default()),
            program: Box::new(|_| ExecOutput {
                exit_code: Some(0),
                output: Vec::new(),
            }),
            failing_init: HashSet::new(),
            fail_pull: false,
            fail_stop: false,
            fail_write: false,
            exec_delay: None,
            pull_delay: None,
            cleanup_delay: None,
            local_images: HashSet::new(),
        }
    }

    /// What the interpreter does with the staged source
    pub(crate) fn with_program<F>(mut self, program: F) -> Self
    where
        F: Fn(&str) -> ExecOutput + Send + Sync + 'static,
    {
        self.program = Box::new(program);
        self
    }

    /// Init command that exits with status 1
    pub(crate) fn with_failing_init(mut self, cmd: &str) -> Self {
        self.failing_init.insert(cmd.to_string());
        self
    }

    pub(crate) fn with_failing_pull(mut self) -> Self {
        self.fail_pull = true;
        self
    }

    pub(crate) fn with_failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub(crate) fn with_failing_write(mut self) -> Self {
        self.fail_write = true;
        self
    }

    /// Delay applied to interpreter runs
    pub(crate) fn with_exec_delay(mut self, delay: Duration) -> Self {
        self.exec_delay = Some(delay);
        self
    }

    pub(crate) fn with_pull_delay(mut self, delay: Duration) -> Self {
        self.pull_delay = Some(delay);
        self
    }

    /// Delay applied to `rm -f` of staged files
    pub(crate) fn with_cleanup_delay(mut self, delay: Duration) -> Self {
        self.cleanup_delay = Some(delay);
        self
    }

    pub(crate) fn with_local_image(mut self, image: &str) -> Self {
        self.local_images.insert(image.to_string());
        self
    }

    /// A container left behind by an earlier process
    pub(crate) fn with_foreign_container(self, id: &str, name: &str) -> Self {
        self.state.lock().unwrap().foreign.push(ContainerSummary {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    /// Ids of containers created and not yet removed
    pub(crate) fn live_containers(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut ids: Vec<String> = state
            .containers
            .iter()
            .filter(|(_, c)| !c.removed)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Content of a file inside a container
    pub(crate) fn file(&self, id: &str, path: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.containers.get(id)?.files.get(path).cloned()
    }

    /// Every file path ever written in a container
    pub(crate) fn files(&self, id: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .containers
            .get(id)
            .map(|c| c.files.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn run_shell(&self, id: &str, script: &str) -> ExecOutput {
        let mut state = self.state.lock().unwrap();
        let Some(container) = state.containers.get_mut(id) else {
            return failed(125, "no such container");
        };

        if let Some(path) = script.strip_prefix("touch ") {
            container.files.entry(path.to_string()).or_default();
            return ok(b"");
        }

        if let Some(rest) = script.strip_prefix("printf '%s' ") {
            if self.fail_write {
                return failed(1, "sh: cannot create file: Read-only file system");
            }
            let Some((quoted, path)) = rest.rsplit_once(" > ") else {
                return failed(2, "sh: syntax error");
            };
            container
                .files
                .insert(path.to_string(), shell_unquote(quoted));
            return ok(b"");
        }

        if let Some(path) = script.strip_prefix("rm -f ") {
            container.files.remove(path);
            return ok(b"");
        }

        if self.failing_init.contains(script) {
            return failed(1, "E: init failed");
        }
        ok(b"")
    }
}

fn ok(output: &[u8]) -> ExecOutput {
    ExecOutput {
        exit_code: Some(0),
        output: output.to_vec(),
    }
}

fn failed(code: i64, message: &str) -> ExecOutput {
    ExecOutput {
        exit_code: Some(code),
        output: message.as_bytes().to_vec(),
    }
}

/// Undo POSIX single-quote escaping
pub(crate) fn shell_unquote(quoted: &str) -> String {
    let mut out = String::new();
    let mut in_quote = false;
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        match (in_quote, c) {
            (true, '\'') => in_quote = false,
            (true, c) => out.push(c),
            (false, '\'') => in_quote = true,
            (false, '\\') => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            (false, c) => out.push(c),
        }
    }
    out
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    fn name(&self) -> &str {
        "fake"
    }

    async fn ping(&self) -> Result<()> {
        self.record(Call::Ping);
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        self.record(Call::ImageExists(image.to_string()));
        Ok(self.local_images.contains(image))
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        self.record(Call::Pull(image.to_string()));
        if let Some(delay) = self.pull_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_pull {
            return Err(Error::Provisioning(format!("Failed to pull image {}: not found", image)));
        }
        Ok(())
    }

    async fn create_container(&self, name: &str, template: &ProvisioningTemplate) -> Result<String> {
        self.record(Call::Create {
            name: name.to_string(),
            image: template.image.clone(),
        });
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("c{}", state.next_id);
        state.containers.insert(
            id.clone(),
            FakeContainer {
                name: name.to_string(),
                ..Default::default()
            },
        );
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.record(Call::Start(id.to_string()));
        Ok(())
    }

    async fn exec(&self, id: &str, cmd: Vec<String>) -> Result<ExecOutput> {
        self.record(Call::Exec {
            id: id.to_string(),
            cmd: cmd.clone(),
        });

        if cmd.first().map(String::as_str) == Some("sh") {
            let script = cmd.get(2).cloned().unwrap_or_default();
            if let (Some(delay), true) = (self.cleanup_delay, script.starts_with("rm -f ")) {
                tokio::time::sleep(delay).await;
            }
            return Ok(self.run_shell(id, &script));
        }

        // Interpreter run: `<interpreter> <path>`
        let source = cmd.get(1).and_then(|path| self.file(id, path));
        if let Some(delay) = self.exec_delay {
            tokio::time::sleep(delay).await;
        }
        match source {
            Some(source) => Ok((self.program)(&source)),
            None => Ok(failed(2, "can't open file: No such file or directory")),
        }
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        self.record(Call::Stop(id.to_string()));
        if self.fail_stop {
            return Err(Error::Runtime("Failed to stop container: daemon timeout".into()));
        }
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        self.record(Call::Remove(id.to_string()));
        let mut state = self.state.lock().unwrap();
        if let Some(container) = state.containers.get_mut(id) {
            container.removed = true;
        }
        state.foreign.retain(|c| c.id != id);
        Ok(())
    }

    async fn list_containers(&self, name_prefix: &str) -> Result<Vec<ContainerSummary>> {
        self.record(Call::List(name_prefix.to_string()));
        let state = self.state.lock().unwrap();
        let mut summaries: Vec<ContainerSummary> = state
            .containers
            .iter()
            .filter(|(_, c)| !c.removed && c.name.starts_with(name_prefix))
            .map(|(id, c)| ContainerSummary {
                id: id.clone(),
                name: c.name.clone(),
            })
            .collect();
        summaries.extend(
            state
                .foreign
                .iter()
                .filter(|c| c.name.starts_with(name_prefix))
                .cloned(),
        );
        Ok(summaries)
    }
}
