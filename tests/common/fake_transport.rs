//! FakeTransport — a scripted, call-recording [`Transport`].
//!
//! Each host is described by a [`FakeHost`]: its files (with size, mtime and
//! content lines), directories and service units, plus optional scripted
//! failures and latency. Commands are answered the way `ls`, `stat`,
//! `journalctl`, `grep` and `tail` would answer them, including grep's exit
//! status 1 for "no matches".

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use fleetlog_core::command::{ContentTarget, READER_FAILED_MARKER};
use fleetlog_core::{CommandOutput, ExecError, HostId, RemoteCommand, Transport};
use futures::future::BoxFuture;

/// One file in a fake log directory.
#[derive(Debug, Clone)]
pub struct FakeFile {
    pub name: String,
    pub size: u64,
    /// Modification time, epoch seconds.
    pub modified: i64,
    pub lines: Vec<String>,
}

/// Scripted behaviour of one host.
#[derive(Debug, Clone, Default)]
pub struct FakeHost {
    pub files: Vec<FakeFile>,
    pub directories: Vec<String>,
    pub units: Vec<(String, Vec<String>)>,
    /// Every command on this host fails with this error.
    pub unreachable: Option<ExecError>,
    /// Applied before every command.
    pub latency: Duration,
    pub stat_failures: HashSet<String>,
    pub units_failure: Option<ExecError>,
    pub filter_failures: HashSet<String>,
    /// Sources whose pipeline reader (decompressor or journal) fails, so the
    /// consumer sees empty input.
    pub broken_readers: HashSet<String>,
}

/// A recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub host: HostId,
    pub command: RemoteCommand,
}

#[derive(Debug, Default)]
pub struct FakeTransport {
    hosts: Mutex<HashMap<HostId, FakeHost>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(self, id: &str, host: FakeHost) -> Self {
        self.set_host(id, host);
        self
    }

    pub fn set_host(&self, id: &str, host: FakeHost) {
        self.hosts.lock().unwrap().insert(HostId::new(id), host);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn commands_for(&self, id: &str) -> Vec<RemoteCommand> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.host.as_str() == id)
            .map(|call| call.command.clone())
            .collect()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn respond(host: &FakeHost, command: &RemoteCommand) -> Result<CommandOutput, ExecError> {
        match command {
            RemoteCommand::ListDirectory { .. } => {
                let mut files: Vec<&FakeFile> = host.files.iter().collect();
                // `ls -t`: newest first, then by name.
                files.sort_by(|a, b| b.modified.cmp(&a.modified).then(a.name.cmp(&b.name)));
                let mut out: Vec<String> = host.directories.iter().map(|d| format!("{d}/")).collect();
                out.extend(files.iter().map(|f| f.name.clone()));
                Ok(CommandOutput::success(lines(&out)))
            }
            RemoteCommand::StatFile { path } => {
                let file = find_file(host, path).ok_or_else(|| missing(path))?;
                if host.stat_failures.contains(&file.name) {
                    return Err(ExecError::CommandFailed {
                        code: 1,
                        stderr: format!("stat: cannot statx '{path}': Permission denied"),
                    });
                }
                Ok(CommandOutput::success(format!("{} {}\n", file.size, file.modified)))
            }
            RemoteCommand::ListUnits => {
                if let Some(err) = &host.units_failure {
                    return Err(err.clone());
                }
                let names: Vec<String> = host.units.iter().map(|(name, _)| name.clone()).collect();
                Ok(CommandOutput::success(lines(&names)))
            }
            RemoteCommand::FilterContent {
                target,
                query,
                case_sensitive,
                limit,
            } => {
                let (name, content) = content_of(host, target)?;
                if host.broken_readers.contains(&name) {
                    return broken_reader(&name, 1).into_result(command);
                }
                if host.filter_failures.contains(&name) {
                    return Err(ExecError::CommandFailed {
                        code: 2,
                        stderr: format!("grep: {name}: Input/output error"),
                    });
                }
                let needle = if *case_sensitive { query.clone() } else { query.to_lowercase() };
                let matched: Vec<String> = content
                    .iter()
                    .enumerate()
                    .filter(|(_, line)| {
                        if *case_sensitive {
                            line.contains(&needle)
                        } else {
                            line.to_lowercase().contains(&needle)
                        }
                    })
                    .take(*limit)
                    .map(|(idx, line)| format!("{}:{}", idx + 1, line))
                    .collect();
                let output = CommandOutput {
                    exit_code: if matched.is_empty() { 1 } else { 0 },
                    stdout: lines(&matched),
                    stderr: String::new(),
                };
                output.into_result(command)
            }
            RemoteCommand::ReadTail { target, lines: count } => {
                let (name, content) = content_of(host, target)?;
                if host.broken_readers.contains(&name) {
                    return broken_reader(&name, 0).into_result(command);
                }
                let start = content.len().saturating_sub(*count);
                Ok(CommandOutput::success(lines(&content[start..])))
            }
        }
    }
}

/// What the shell hands back when the reader half of a pipeline fails:
/// the consumer's status over empty input, plus the reader's marker.
fn broken_reader(name: &str, consumer_exit: i32) -> CommandOutput {
    CommandOutput {
        stdout: String::new(),
        stderr: format!("gzip: {name}: not in gzip format\n{READER_FAILED_MARKER} 1\n"),
        exit_code: consumer_exit,
    }
}

fn lines(items: &[String]) -> String {
    items.iter().map(|item| format!("{item}\n")).collect()
}

fn missing(path: &str) -> ExecError {
    ExecError::CommandFailed {
        code: 1,
        stderr: format!("cannot access '{path}': No such file or directory"),
    }
}

fn find_file<'a>(host: &'a FakeHost, path: &str) -> Option<&'a FakeFile> {
    host.files
        .iter()
        .find(|file| path.ends_with(&format!("/{}", file.name)))
}

fn content_of(host: &FakeHost, target: &ContentTarget) -> Result<(String, Vec<String>), ExecError> {
    match target {
        ContentTarget::File { path } => find_file(host, path)
            .map(|file| (file.name.clone(), file.lines.clone()))
            .ok_or_else(|| missing(path)),
        ContentTarget::Unit { name } => host
            .units
            .iter()
            .find(|(unit, _)| unit == name)
            .map(|(unit, lines)| (unit.clone(), lines.clone()))
            .ok_or_else(|| missing(name)),
    }
}

impl Transport for FakeTransport {
    fn execute<'a>(
        &'a self,
        host: &'a HostId,
        command: &'a RemoteCommand,
        _timeout: Duration,
    ) -> BoxFuture<'a, Result<CommandOutput, ExecError>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(Call {
                host: host.clone(),
                command: command.clone(),
            });
            let scripted = self.hosts.lock().unwrap().get(host).cloned();
            let Some(scripted) = scripted else {
                return Err(ExecError::HostNotConfigured(host.to_string()));
            };
            if !scripted.latency.is_zero() {
                tokio::time::sleep(scripted.latency).await;
            }
            if let Some(err) = &scripted.unreachable {
                return Err(err.clone());
            }
            Self::respond(&scripted, command)
        })
    }
}
