//! Remote command templates and their fixed output formats.
//!
//! Every command fleetlog runs on a host is one of the [`RemoteCommand`]
//! variants. Rendering goes through [`shell_quote`] for every argument value,
//! and nowhere else builds a command line. The parsers at the bottom of this
//! module are the other half of each template's contract.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::types::SourceKind;

/// Prefix for privilege elevation. `-n` makes sudo fail instead of prompting.
const ELEVATE_PREFIX: &str = "sudo -n ";

/// Written to stderr, followed by the exit status, when the producing half
/// of a content pipeline fails. The shell only reports the consumer's
/// status, so this is the only trace of a broken archive or journal read.
pub const READER_FAILED_MARKER: &str = "__fleetlog_reader_failed";

/// Quote `value` for a POSIX shell: wrap in single quotes, and close, escape
/// and reopen around every embedded single quote.
pub fn shell_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

// ---------------------------------------------------------------------------
// Compression
// ---------------------------------------------------------------------------

/// Compression formats recognised by file suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Bzip2,
    Xz,
}

impl Compression {
    pub fn detect(name: &str) -> Option<Self> {
        if name.ends_with(".gz") {
            Some(Compression::Gzip)
        } else if name.ends_with(".bz2") {
            Some(Compression::Bzip2)
        } else if name.ends_with(".xz") {
            Some(Compression::Xz)
        } else {
            None
        }
    }

    fn decompressor(self) -> &'static str {
        match self {
            Compression::Gzip => "zcat",
            Compression::Bzip2 => "bzcat",
            Compression::Xz => "xzcat",
        }
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// What a content command reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentTarget {
    File { path: String },
    Unit { name: String },
}

impl ContentTarget {
    /// Target for a source named `name` of `kind`, files living in `log_dir`.
    pub fn for_source(log_dir: &str, name: &str, kind: SourceKind) -> Self {
        match kind {
            SourceKind::File => ContentTarget::File {
                path: join_path(log_dir, name),
            },
            SourceKind::ServiceUnit => ContentTarget::Unit {
                name: name.to_string(),
            },
        }
    }

    /// The path or unit name this target refers to.
    pub fn operand(&self) -> &str {
        match self {
            ContentTarget::File { path } => path,
            ContentTarget::Unit { name } => name,
        }
    }

    /// Shell fragment producing the raw (decompressed) content on stdout,
    /// or `None` when the consumer can read the file directly. A failing
    /// reader reports its status through [`READER_FAILED_MARKER`].
    fn reader(&self, prefix: &str) -> Option<String> {
        let reader = match self {
            ContentTarget::File { path } => {
                let compression = Compression::detect(path)?;
                format!("{prefix}{} -- {}", compression.decompressor(), shell_quote(path))
            }
            ContentTarget::Unit { name } => {
                format!("{prefix}journalctl -u {} --no-pager -o cat", shell_quote(name))
            }
        };
        Some(format!(
            "{{ {reader} || echo \"{READER_FAILED_MARKER} $?\" >&2; }}"
        ))
    }
}

/// Join a directory and an entry name with exactly one separator.
pub fn join_path(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

/// The closed set of commands fleetlog issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCommand {
    /// Entries of `dir`, newest first, directories suffixed with `/`.
    ListDirectory { dir: String },
    /// `"<size-bytes> <mtime-epoch-secs>"` for one path.
    StatFile { path: String },
    /// Distinct service units known to the journal, one per line.
    ListUnits,
    /// `"<line>:<text>"` per fixed-string match, at most `limit` lines.
    FilterContent {
        target: ContentTarget,
        query: String,
        case_sensitive: bool,
        limit: usize,
    },
    /// The last `lines` lines of a source.
    ReadTail { target: ContentTarget, lines: usize },
}

impl RemoteCommand {
    pub fn list_directory(dir: impl Into<String>) -> Self {
        RemoteCommand::ListDirectory { dir: dir.into() }
    }

    pub fn stat_file(path: impl Into<String>) -> Self {
        RemoteCommand::StatFile { path: path.into() }
    }

    /// Short label for logs and error messages.
    pub fn label(&self) -> &'static str {
        match self {
            RemoteCommand::ListDirectory { .. } => "list-directory",
            RemoteCommand::StatFile { .. } => "stat-file",
            RemoteCommand::ListUnits => "list-units",
            RemoteCommand::FilterContent { .. } => "filter-content",
            RemoteCommand::ReadTail { .. } => "read-tail",
        }
    }

    /// Whether a non-zero exit status still means success. `grep` exits 1
    /// when nothing matched.
    pub fn accepts_exit(&self, code: i32) -> bool {
        match self {
            RemoteCommand::FilterContent { .. } => code == 0 || code == 1,
            _ => code == 0,
        }
    }

    /// Exit status of a failed pipeline reader that invalidates the output.
    ///
    /// A filter that matched something keeps its matches: grep stopping at
    /// the match limit closes the pipe under the reader.
    pub fn reader_failure(&self, exit_code: i32, stderr: &str) -> Option<i32> {
        let status = parse_reader_failure(stderr)?;
        match self {
            RemoteCommand::FilterContent { .. } if exit_code == 0 => None,
            RemoteCommand::FilterContent { .. } | RemoteCommand::ReadTail { .. } => Some(status),
            _ => None,
        }
    }

    /// Render to a single shell command line.
    pub fn render(&self, elevate: bool) -> String {
        let prefix = if elevate { ELEVATE_PREFIX } else { "" };
        match self {
            RemoteCommand::ListDirectory { dir } => {
                format!("{prefix}ls -p -t -- {}", shell_quote(dir))
            }
            RemoteCommand::StatFile { path } => format!(
                "{prefix}stat -c {} -- {}",
                shell_quote("%s %Y"),
                shell_quote(path)
            ),
            RemoteCommand::ListUnits => {
                format!("{prefix}journalctl -F _SYSTEMD_UNIT --no-pager")
            }
            RemoteCommand::FilterContent {
                target,
                query,
                case_sensitive,
                limit,
            } => {
                let mut grep = format!("grep -n -F -m {limit}");
                if !case_sensitive {
                    grep.push_str(" -i");
                }
                grep.push_str(" -e ");
                grep.push_str(&shell_quote(query));
                match target.reader(prefix) {
                    Some(reader) => format!("{reader} | {grep}"),
                    None => format!("{prefix}{grep} -- {}", shell_quote(target.operand())),
                }
            }
            RemoteCommand::ReadTail { target, lines } => match target {
                ContentTarget::Unit { name } => format!(
                    "{prefix}journalctl -u {} -n {lines} --no-pager",
                    shell_quote(name)
                ),
                ContentTarget::File { path } => match target.reader(prefix) {
                    Some(reader) => format!("{reader} | tail -n {lines}"),
                    None => format!("{prefix}tail -n {lines} -- {}", shell_quote(path)),
                },
            },
        }
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(false))
    }
}

// ---------------------------------------------------------------------------
// Output parsing
// ---------------------------------------------------------------------------

/// Status carried by the last [`READER_FAILED_MARKER`] line of `stderr`.
pub fn parse_reader_failure(stderr: &str) -> Option<i32> {
    stderr
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix(READER_FAILED_MARKER))
        .map(|status| status.trim().parse().unwrap_or(1))
}

/// `stderr` without reader marker lines.
pub fn strip_reader_marker(stderr: &str) -> String {
    stderr
        .lines()
        .filter(|line| !line.trim_start().starts_with(READER_FAILED_MARKER))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One non-directory entry of a directory listing. `rank` is its position
/// in the listing, 0 being the most recently modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedEntry {
    pub name: String,
    pub rank: usize,
}

/// Parse `ls -p -t` output: drop blank lines, directory entries (trailing
/// `/`) and repeated names; keep listing order.
pub fn parse_listing(stdout: &str) -> Vec<ListedEntry> {
    let mut seen = std::collections::HashSet::new();
    stdout
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty() && !line.ends_with('/'))
        .filter(|line| seen.insert(*line))
        .enumerate()
        .map(|(rank, name)| ListedEntry {
            name: name.to_string(),
            rank,
        })
        .collect()
}

/// Parse `stat -c '%s %Y'` output into size and modification time.
pub fn parse_stat(stdout: &str) -> Result<(u64, DateTime<Utc>), String> {
    let mut tokens = stdout.split_whitespace();
    let (Some(size), Some(mtime), None) = (tokens.next(), tokens.next(), tokens.next()) else {
        return Err(format!("expected two tokens, got {:?}", stdout.trim()));
    };
    let size = size
        .parse::<u64>()
        .map_err(|_| format!("invalid size {size:?}"))?;
    let secs = mtime
        .parse::<i64>()
        .map_err(|_| format!("invalid mtime {mtime:?}"))?;
    let modified = DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| format!("mtime {secs} out of range"))?;
    Ok((size, modified))
}

/// Parse journal unit listing: trimmed, non-empty, deduplicated, sorted.
pub fn parse_units(stdout: &str) -> Vec<String> {
    let units: std::collections::BTreeSet<&str> = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    units.into_iter().map(str::to_string).collect()
}

/// A single `"<line>:<text>"` record of filter output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedLine {
    pub line_number: u64,
    pub text: String,
}

/// Parse filter output. Lines without a numeric prefix before the first
/// `:` are skipped.
pub fn parse_matches(stdout: &str) -> Vec<MatchedLine> {
    stdout
        .lines()
        .filter_map(|line| {
            let (number, text) = line.split_once(':')?;
            let line_number = number.parse::<u64>().ok().filter(|n| *n > 0)?;
            Some(MatchedLine {
                line_number,
                text: text.trim_end_matches('\r').to_string(),
            })
        })
        .collect()
}
