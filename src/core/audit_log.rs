//! Hash-chained record of provisioning actions.
//!
//! One JSON object per line. Each entry carries the SHA-256 of its own
//! canonical form and the hash of the entry before it, so edits and
//! deletions in the middle of the log are detectable. Token values are
//! never recorded.

use crate::constants;
use crate::core::file_lock::FileLock;
use crate::core::paths::HostPaths;
use crate::util::fs as ufs;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditResult {
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: Some(detail.into()),
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            detail: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub actor: String,
    /// What the action applied to: a phase name, a unit, a domain.
    pub subject: String,
    pub result: AuditResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_hash: Option<String>,
}

fn actor() -> String {
    match std::env::var("SUDO_USER") {
        Ok(user) if !user.is_empty() => format!("{}(sudo)", user),
        _ => std::env::var("USER").unwrap_or_else(|_| "unknown".to_string()),
    }
}

/// Append one entry, chained to the current tail of the log.
pub fn record(paths: &HostPaths, action: &str, subject: &str, result: AuditResult) -> Result<()> {
    let log_path = paths.audit_log();
    if let Some(dir) = log_path.parent() {
        ufs::ensure_dir(dir, constants::STATE_DIR_MODE)?;
    }
    let _lock = FileLock::exclusive(&paths.audit_lock())?;

    let mut entry = AuditEntry {
        timestamp: Utc::now(),
        action: action.to_string(),
        actor: actor(),
        subject: subject.to_string(),
        result,
        prev_hash: tail_hash(&log_path)?,
        entry_hash: None,
    };
    entry.entry_hash = Some(entry_hash(&entry)?);

    let line = serde_json::to_string(&entry).context("serialize audit entry")?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("open audit log {}", log_path.display()))?;
    writeln!(file, "{}", line).context("write audit entry")?;
    ufs::set_permissions(&log_path, constants::AUDIT_LOG_MODE)?;
    Ok(())
}

/// Like [`record`], but a failure to write is only logged.
pub fn record_quietly(paths: &HostPaths, action: &str, subject: &str, result: AuditResult) {
    if let Err(e) = record(paths, action, subject, result) {
        tracing::warn!(action, subject, error = %e, "audit write failed");
    }
}

/// SHA-256 over the entry with keys sorted and `entry_hash` removed.
fn entry_hash(entry: &AuditEntry) -> Result<String> {
    let mut value = serde_json::to_value(entry).context("serialize for hash")?;
    if let Some(obj) = value.as_object_mut() {
        obj.remove("entry_hash");
    }
    let canonical = serde_json::to_string(&sorted(value)).context("serialize canonical json")?;
    Ok(format!("{:x}", Sha256::digest(canonical.as_bytes())))
}

fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<(String, Value)> = map.into_iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(pairs.into_iter().map(|(k, v)| (k, sorted(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}

const TAIL_CHUNK: u64 = 8192;

/// Hash of the last parseable entry, read backward from the end of the log.
fn tail_hash(path: &Path) -> Result<Option<String>> {
    let mut file = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("open audit log {}", path.display())),
    };
    let mut offset = file
        .metadata()
        .with_context(|| format!("stat audit log {}", path.display()))?
        .len();
    // Bytes before the first newline seen so far; may be a partial line.
    let mut carry: Vec<u8> = Vec::new();

    while offset > 0 {
        let size = TAIL_CHUNK.min(offset);
        offset -= size;
        file.seek(SeekFrom::Start(offset))
            .with_context(|| format!("seek audit log {}", path.display()))?;
        let mut chunk = vec![0u8; size as usize];
        file.read_exact(&mut chunk)
            .with_context(|| format!("read audit log {}", path.display()))?;
        chunk.extend_from_slice(&carry);

        let mut lines: Vec<&[u8]> = chunk.split(|b| *b == b'\n').collect();
        let head = if offset > 0 { Some(lines.remove(0)) } else { None };
        for line in lines.into_iter().rev() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            if let Ok(entry) = serde_json::from_slice::<AuditEntry>(line) {
                return Ok(entry.entry_hash);
            }
        }
        carry = head.map(<[u8]>::to_vec).unwrap_or_default();
    }
    Ok(None)
}

/// Parsed entries and the number of unparseable lines.
fn entries(path: &Path) -> Result<(Vec<AuditEntry>, usize)> {
    let file = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e).with_context(|| format!("open audit log {}", path.display())),
    };
    let mut out = Vec::new();
    let mut malformed = 0;
    for line in BufReader::new(file).lines() {
        let line = line.context("read audit log line")?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditEntry>(&line) {
            Ok(entry) => out.push(entry),
            Err(_) => malformed += 1,
        }
    }
    Ok((out, malformed))
}

/// The last `limit` entries (all of them when `None`), oldest first.
pub fn read_log(paths: &HostPaths, limit: Option<usize>) -> Result<Vec<AuditEntry>> {
    let (mut list, malformed) = entries(&paths.audit_log())?;
    if malformed > 0 {
        tracing::warn!(malformed, "skipped unparseable audit entries");
    }
    if let Some(limit) = limit {
        if list.len() > limit {
            list = list.split_off(list.len() - limit);
        }
    }
    Ok(list)
}

/// Walk the chain. Returns the entry count and one message per break.
pub fn verify_chain(paths: &HostPaths) -> Result<(usize, Vec<String>)> {
    let (list, malformed) = entries(&paths.audit_log())?;
    let mut errors = Vec::new();
    if malformed > 0 {
        errors.push(format!("{} unparseable line(s)", malformed));
    }
    let mut prev: Option<&String> = None;
    for (i, entry) in list.iter().enumerate() {
        let n = i + 1;
        if entry.prev_hash.as_ref() != prev {
            errors.push(format!("entry {}: prev_hash does not match entry {}", n, i));
        }
        match &entry.entry_hash {
            Some(stored) => {
                if &entry_hash(entry)? != stored {
                    errors.push(format!("entry {}: contents do not match entry_hash", n));
                }
            }
            None => errors.push(format!("entry {}: missing entry_hash", n)),
        }
        prev = entry.entry_hash.as_ref();
    }
    Ok((list.len(), errors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn paths() -> (TempDir, HostPaths) {
        let dir = TempDir::new().unwrap();
        let paths = HostPaths::with_root(Some(dir.path().to_path_buf()));
        (dir, paths)
    }

    #[test]
    fn test_entries_chain() {
        let (_dir, paths) = paths();
        record(&paths, "deploy", "packages", AuditResult::ok("installed 3")).unwrap();
        record(&paths, "token.rotate", "filedrop", AuditResult::ok("rotated")).unwrap();

        let list = read_log(&paths, None).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].prev_hash, None);
        assert_eq!(list[1].prev_hash, list[0].entry_hash);

        let (count, errors) = verify_chain(&paths).unwrap();
        assert_eq!(count, 2);
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn test_limit_keeps_newest() {
        let (_dir, paths) = paths();
        for subject in ["a", "b", "c"] {
            record(&paths, "deploy", subject, AuditResult::ok("")).unwrap();
        }
        let list = read_log(&paths, Some(2)).unwrap();
        let subjects: Vec<_> = list.iter().map(|e| e.subject.as_str()).collect();
        assert_eq!(subjects, ["b", "c"]);
    }

    #[test]
    fn test_tampering_detected() {
        let (_dir, paths) = paths();
        record(&paths, "deploy", "certificate", AuditResult::failed("acme timeout")).unwrap();
        record(&paths, "deploy", "certificate", AuditResult::ok("issued")).unwrap();

        let log = paths.audit_log();
        let text = fs::read_to_string(&log).unwrap();
        fs::write(&log, text.replacen("acme timeout", "fine", 1)).unwrap();

        let (_, errors) = verify_chain(&paths).unwrap();
        assert!(errors.iter().any(|e| e.contains("entry 1")), "{:?}", errors);
    }

    #[test]
    fn test_tail_hash_spans_chunks() {
        let (_dir, paths) = paths();
        let long = "x".repeat(3 * TAIL_CHUNK as usize);
        for subject in ["a", "b", "c"] {
            record(&paths, "deploy", subject, AuditResult::failed(&long)).unwrap();
        }
        let log = paths.audit_log();
        let last = read_log(&paths, None).unwrap().pop().unwrap().entry_hash;
        assert!(last.is_some());
        assert_eq!(tail_hash(&log).unwrap(), last);

        let mut file = OpenOptions::new().append(true).open(&log).unwrap();
        writeln!(file, "{{\"truncated\": ").unwrap();
        writeln!(file).unwrap();
        drop(file);
        assert_eq!(tail_hash(&log).unwrap(), last);
    }

    #[test]
    fn test_tail_hash_empty_log() {
        let (_dir, paths) = paths();
        let log = paths.audit_log();
        assert_eq!(tail_hash(&log).unwrap(), None);
        fs::create_dir_all(log.parent().unwrap()).unwrap();
        fs::write(&log, "").unwrap();
        assert_eq!(tail_hash(&log).unwrap(), None);
    }

    #[test]
    fn test_missing_log_is_empty() {
        let (_dir, paths) = paths();
        assert!(read_log(&paths, None).unwrap().is_empty());
        assert_eq!(verify_chain(&paths).unwrap(), (0, Vec::new()));
    }

    #[cfg(unix)]
    #[test]
    fn test_log_mode() {
        let (_dir, paths) = paths();
        record(&paths, "deploy", "x", AuditResult::ok("")).unwrap();
        assert_eq!(ufs::mode(&paths.audit_log()).unwrap(), Some(constants::AUDIT_LOG_MODE));
    }
}
