//! Hostfile parsing and local identity.
//!
//! One `hostname[:port]` per line. The 1-based position among non-blank
//! lines is the process id, so the file must be byte-identical in peer
//! ordering across every cooperating process. Entries without an
//! explicit port share the configured well-known port.

use std::path::{Path, PathBuf};

use crate::wire::ProcessId;

/// One parsed hostfile line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry {
    pub id: ProcessId,
    pub hostname: String,
    pub port: u16,
}

/// The parsed hostfile: every participant, in file order.
#[derive(Debug, Clone)]
pub struct Hostfile {
    entries: Vec<HostEntry>,
}

impl Hostfile {
    /// Read and parse a hostfile.
    pub fn load(path: &Path, default_port: u16) -> Result<Self, HostfileError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| HostfileError::ReadFailed(path.to_path_buf(), e))?;
        Self::parse(&text, default_port)
    }

    /// Parse hostfile text. Blank lines are skipped without consuming an
    /// id; surrounding whitespace is trimmed.
    pub fn parse(text: &str, default_port: u16) -> Result<Self, HostfileError> {
        let mut entries = Vec::new();
        let mut id: ProcessId = 1;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (hostname, port) = match line.rsplit_once(':') {
                Some((host, port)) => {
                    let port = port
                        .parse()
                        .map_err(|_| HostfileError::BadPort(line.to_string()))?;
                    (host.to_string(), port)
                }
                None => (line.to_string(), default_port),
            };

            entries.push(HostEntry { id, hostname, port });
            id += 1;
        }

        if entries.is_empty() {
            return Err(HostfileError::Empty);
        }

        Ok(Self { entries })
    }

    /// Total number of participants, including the local process.
    pub fn total(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn entries(&self) -> &[HostEntry] {
        &self.entries
    }

    /// Derive the local process id by matching a hostname against the
    /// host parts of the entries.
    ///
    /// Both the name as given and its short form (domain suffix
    /// stripped) are tried. Zero matching lines is an error; so is more
    /// than one, or the two forms matching different lines — ambiguity
    /// is surfaced, never resolved by picking an order.
    pub fn local_id(&self, hostname: &str) -> Result<ProcessId, HostfileError> {
        let short = hostname.split('.').next().unwrap_or(hostname);

        let mut matches: Vec<ProcessId> = Vec::new();
        for entry in &self.entries {
            if entry.hostname == hostname || entry.hostname == short {
                matches.push(entry.id);
            }
        }

        match matches.as_slice() {
            [] => Err(HostfileError::IdentityNotFound(hostname.to_string())),
            [id] => Ok(*id),
            _ => Err(HostfileError::AmbiguousIdentity(hostname.to_string())),
        }
    }
}

/// The machine's own hostname, via gethostname(2).
pub fn local_hostname() -> Result<String, HostfileError> {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return Err(HostfileError::HostnameUnavailable(
            std::io::Error::last_os_error(),
        ));
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum HostfileError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),

    #[error("hostfile has no entries")]
    Empty,

    #[error("bad port in hostfile line: {0}")]
    BadPort(String),

    #[error("local hostname {0} not found in hostfile")]
    IdentityNotFound(String),

    #[error("local hostname {0} matches more than one hostfile line")]
    AmbiguousIdentity(String),

    #[error("could not determine local hostname: {0}")]
    HostnameUnavailable(std::io::Error),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
