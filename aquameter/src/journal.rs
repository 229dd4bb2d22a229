//! Append-only point journal backing file stores.
//!
//! Each accepted write is appended as one JSON object per line before it is
//! applied in memory. Opening a store replays the journal from the start.
//!
//! # Recovery
//!
//! A crash in the middle of an append can leave a partial final line. The
//! owning process drops such a tail (and truncates the file to the last
//! complete line) with a warning when it opens the journal; a malformed line
//! anywhere else is reported as [`StoreError::CorruptedJournal`].
//!
//! Other processes read the journal with [`Journal::replay`], which never
//! modifies the file: an unterminated tail may be an append still in
//! progress.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::point::Point;

/// Name of the journal file in the store directory.
pub const JOURNAL_FILE: &str = "points.jsonl";

/// An open journal positioned for appends.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: File,
}

/// Decoded journal content.
struct Decoded {
    points: Vec<Point>,
    /// Length of the prefix made of complete lines.
    complete_len: usize,
    /// The unterminated tail, if it decodes to a point.
    tail: Option<Result<Point, serde_json::Error>>,
}

impl Journal {
    /// Opens (or creates) the journal at `path` for appending and returns it
    /// together with every point it already holds, in write order.
    ///
    /// Only the process that owns the store may call this; it repairs a
    /// partial tail in place.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::JournalRead`] if the file cannot be opened or
    /// read, [`StoreError::CorruptedJournal`] if a complete line fails to
    /// decode, and [`StoreError::JournalWrite`] if a partial tail cannot be
    /// truncated.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<(Self, Vec<Point>), StoreError> {
        let path = path.as_ref().to_path_buf();
        let path_str = path.display().to_string();

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| StoreError::JournalRead {
                path: path_str.clone(),
                source: e,
            })?;

        let mut content = Vec::new();
        file.read_to_end(&mut content)
            .map_err(|e| StoreError::JournalRead {
                path: path_str.clone(),
                source: e,
            })?;

        let Decoded {
            mut points,
            complete_len,
            tail,
        } = decode(&content, &path_str)?;

        match tail {
            None => {}
            Some(Ok(point)) => {
                points.push(point);
                file.write_all(b"\n").map_err(|e| StoreError::JournalWrite {
                    path: path_str.clone(),
                    source: e,
                })?;
            }
            Some(Err(e)) => {
                tracing::warn!(
                    path = %path_str,
                    bytes = content.len() - complete_len,
                    "dropping partial journal tail: {e}"
                );
                file.set_len(complete_len as u64)
                    .map_err(|e| StoreError::JournalWrite {
                        path: path_str.clone(),
                        source: e,
                    })?;
            }
        }

        tracing::debug!(path = %path_str, points = points.len(), "journal replayed");
        Ok((Self { path, file }, points))
    }

    /// Reads every point of the journal at `path` without modifying it.
    ///
    /// A missing file holds no points. An unterminated tail is kept if it
    /// decodes and skipped otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::JournalRead`] if the file cannot be read and
    /// [`StoreError::CorruptedJournal`] if a complete line fails to decode.
    pub fn replay<P: AsRef<Path>>(path: P) -> Result<Vec<Point>, StoreError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        let content = match std::fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::JournalRead {
                    path: path_str,
                    source: e,
                });
            }
        };

        let Decoded { mut points, tail, .. } = decode(&content, &path_str)?;
        match tail {
            Some(Ok(point)) => points.push(point),
            Some(Err(e)) => {
                tracing::debug!(path = %path_str, "ignoring unterminated journal tail: {e}");
            }
            None => {}
        }
        Ok(points)
    }

    /// Appends points as one contiguous write.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Encode`] if a point cannot be serialized and
    /// [`StoreError::JournalWrite`] if the write or flush fails.
    pub fn append(&mut self, points: &[Point]) -> Result<(), StoreError> {
        if points.is_empty() {
            return Ok(());
        }

        let mut buffer = Vec::with_capacity(points.len() * 128);
        for point in points {
            serde_json::to_writer(&mut buffer, point).map_err(|e| StoreError::Encode { source: e })?;
            buffer.push(b'\n');
        }

        self.file
            .write_all(&buffer)
            .and_then(|()| self.file.flush())
            .map_err(|e| StoreError::JournalWrite {
                path: self.path.display().to_string(),
                source: e,
            })
    }
}

fn decode(content: &[u8], display: &str) -> Result<Decoded, StoreError> {
    let complete_len = content
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |pos| pos + 1);

    let mut points = Vec::new();
    for (index, line) in content[..complete_len].split(|&b| b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let point =
            serde_json::from_slice::<Point>(line).map_err(|e| StoreError::CorruptedJournal {
                path: display.to_string(),
                line: index + 1,
                source: e,
            })?;
        points.push(point);
    }

    let tail = &content[complete_len..];
    let tail = (!tail.is_empty()).then(|| serde_json::from_slice::<Point>(tail));

    Ok(Decoded {
        points,
        complete_len,
        tail,
    })
}
