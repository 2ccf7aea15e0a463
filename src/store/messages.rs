use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::Result;
use crate::model::{Message, MessagePage, MessageQuery};
use crate::store::files::{Fingerprint, fingerprint};
use crate::store::lock::LockManager;
use crate::store::paths::DataLayout;

/// Notified after a room's log changed (append or clear), while the log's
/// lock is still held.
pub trait LogObserver: Send + Sync {
    fn log_changed(&self, room: &str);
}

/// Append-only JSONL message logs, one per room.
#[derive(Clone)]
pub struct MessageLog {
    layout: DataLayout,
    locks: LockManager,
    observers: Vec<Arc<dyn LogObserver>>,
}

impl MessageLog {
    pub fn open(layout: &DataLayout, locks: LockManager) -> Self {
        Self {
            layout: layout.clone(),
            locks,
            observers: Vec::new(),
        }
    }

    /// Register an observer. Done at construction, before the log is shared.
    pub fn with_observer(mut self, observer: Arc<dyn LogObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn log_path(&self, room: &str) -> PathBuf {
        self.layout.messages_log(room)
    }

    fn notify(&self, room: &str) {
        for observer in &self.observers {
            observer.log_changed(room);
        }
    }

    /// Append one record at the end of the room's log.
    pub fn append(&self, room: &str, message: &Message) -> Result<()> {
        let path = self.log_path(room);
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        self.locks.with_lock(&path, || {
            // A writer that died mid-line would otherwise glue its fragment
            // onto this record.
            if ends_without_newline(&path)? {
                line.insert(0, '\n');
            }
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            file.write_all(line.as_bytes())?;
            self.notify(room);
            Ok(())
        })
    }

    /// Read one page of the log. See [`MessageLog::read_snapshot`].
    pub fn read_page(&self, room: &str, query: &MessageQuery) -> Result<MessagePage> {
        Ok(self.read_snapshot(room, query)?.0)
    }

    /// Read one page together with the log fingerprint it was computed from.
    ///
    /// Records are taken oldest first. When the query is mention-filtered only
    /// records mentioning the requester count towards offset and limit.
    pub fn read_snapshot(
        &self,
        room: &str,
        query: &MessageQuery,
    ) -> Result<(MessagePage, Fingerprint)> {
        let path = self.log_path(room);
        self.locks.with_lock(&path, || {
            let fp = fingerprint(&path)?;
            let page = scan_page(&path, query)?;
            Ok((page, fp))
        })
    }

    /// Number of well-formed records in the room's log.
    pub fn count(&self, room: &str) -> Result<usize> {
        let path = self.log_path(room);
        self.locks.with_lock(&path, || count_records(&path))
    }

    /// Truncate the room's log, returning how many records it held.
    pub fn clear(&self, room: &str) -> Result<usize> {
        let path = self.log_path(room);
        let removed = self.locks.with_lock(&path, || {
            if !path.exists() {
                return Ok(0);
            }
            let removed = count_records(&path)?;
            File::create(&path)?;
            self.notify(room);
            Ok(removed)
        })?;
        info!(room, removed, "message log cleared");
        Ok(removed)
    }
}

impl std::fmt::Debug for MessageLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageLog")
            .field("layout", &self.layout)
            .field("locks", &self.locks)
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Well-formed records of a log, oldest first. Lines are read as raw bytes so
/// a record cut mid-character by a crashed writer is skipped like any other
/// malformed line.
struct Records<'a> {
    path: &'a Path,
    reader: BufReader<File>,
    buf: Vec<u8>,
}

impl Iterator for Records<'_> {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {
                    if let Some(message) = parse_record(self.path, &self.buf) {
                        return Some(Ok(message));
                    }
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

fn open_records(path: &Path) -> Result<Option<Records<'_>>> {
    match File::open(path) {
        Ok(file) => Ok(Some(Records {
            path,
            reader: BufReader::new(file),
            buf: Vec::new(),
        })),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn parse_record(path: &Path, raw: &[u8]) -> Option<Message> {
    let raw = raw.trim_ascii();
    if raw.is_empty() {
        return None;
    }
    match serde_json::from_slice(raw) {
        Ok(message) => Some(message),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "skipping malformed log record");
            None
        }
    }
}

fn scan_page(path: &Path, query: &MessageQuery) -> Result<MessagePage> {
    let Some(records) = open_records(path)? else {
        return Ok(MessagePage::default());
    };
    let limit = query.effective_limit();
    let filter = query.mention_filter();

    let mut matched = 0usize;
    let mut messages = Vec::new();
    let mut has_more = false;
    for message in records {
        let message = message?;
        if let Some(agent) = filter
            && !message.mentions_agent(agent)
        {
            continue;
        }
        if matched >= query.offset {
            if messages.len() == limit {
                has_more = true;
                break;
            }
            messages.push(message);
        }
        matched += 1;
    }
    Ok(MessagePage { messages, has_more })
}

fn count_records(path: &Path) -> Result<usize> {
    let Some(records) = open_records(path)? else {
        return Ok(0);
    };
    let mut count = 0;
    for message in records {
        message?;
        count += 1;
    }
    Ok(count)
}

fn ends_without_newline(path: &Path) -> Result<bool> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}
