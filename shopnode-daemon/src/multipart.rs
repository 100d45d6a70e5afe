//! `multipart/form-data` bodies for the daemon's add and put endpoints.
//!
//! Directory uploads send one `application/x-directory` part per directory
//! (parents before children) and one file part per regular file. Part names
//! are the slash-joined path relative to the uploaded root's parent,
//! percent-encoded as the daemon expects.
//!
//! File contents are not buffered: [`MultipartBody::finish`] yields a reader
//! that opens each file when its part is reached.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{io_err, DaemonError};

static BOUNDARY_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
enum Segment {
    Bytes(Vec<u8>),
    File { path: PathBuf, len: u64 },
}

impl Segment {
    fn len(&self) -> u64 {
        match self {
            Segment::Bytes(bytes) => bytes.len() as u64,
            Segment::File { len, .. } => *len,
        }
    }
}

#[derive(Debug)]
pub struct MultipartBody {
    boundary: String,
    segments: Vec<Segment>,
    parts: usize,
}

impl Default for MultipartBody {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartBody {
    pub fn new() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let seq = BOUNDARY_SEQ.fetch_add(1, Ordering::Relaxed);
        Self {
            boundary: format!("----shopnode{nanos:x}{:x}{seq:x}", std::process::id()),
            segments: Vec::new(),
            parts: 0,
        }
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn part_count(&self) -> usize {
        self.parts
    }

    /// Exact size of the finished body, closing boundary included.
    pub fn content_length(&self) -> u64 {
        let body: u64 = self.segments.iter().map(Segment::len).sum();
        body + self.closing().len() as u64
    }

    pub fn add_directory(&mut self, name: &str) {
        self.header(name, "application/x-directory");
        self.push_bytes(b"\r\n");
    }

    pub fn add_bytes(&mut self, name: &str, bytes: &[u8]) {
        self.header(name, "application/octet-stream");
        self.push_bytes(bytes);
        self.push_bytes(b"\r\n");
    }

    /// Queue `path` as a part. Only its size is read now.
    pub fn add_file(&mut self, name: &str, path: &Path) -> Result<(), DaemonError> {
        let len = std::fs::metadata(path).map_err(|e| io_err(path, e))?.len();
        self.header(name, "application/octet-stream");
        self.segments.push(Segment::File {
            path: path.to_path_buf(),
            len,
        });
        self.push_bytes(b"\r\n");
        Ok(())
    }

    /// Close the body and return a reader over it.
    pub fn finish(mut self) -> MultipartReader {
        let closing = self.closing();
        self.push_bytes(closing.as_bytes());
        MultipartReader {
            pending: self.segments.into(),
            current: None,
        }
    }

    fn closing(&self) -> String {
        format!("--{}--\r\n", self.boundary)
    }

    fn push_bytes(&mut self, bytes: &[u8]) {
        match self.segments.last_mut() {
            Some(Segment::Bytes(buf)) => buf.extend_from_slice(bytes),
            _ => self.segments.push(Segment::Bytes(bytes.to_vec())),
        }
    }

    fn header(&mut self, name: &str, content_type: &str) {
        self.parts += 1;
        let header = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: {content_type}\r\n\r\n",
            boundary = self.boundary,
            name = percent_encode(name),
        );
        self.push_bytes(header.as_bytes());
    }
}

/// Streaming view of a finished [`MultipartBody`].
pub struct MultipartReader {
    pending: VecDeque<Segment>,
    current: Option<Current>,
}

enum Current {
    Bytes(Cursor<Vec<u8>>),
    File {
        path: PathBuf,
        reader: io::Take<File>,
        remaining: u64,
    },
}

impl MultipartReader {
    fn open_next(&mut self) -> io::Result<bool> {
        let Some(segment) = self.pending.pop_front() else {
            return Ok(false);
        };
        self.current = Some(match segment {
            Segment::Bytes(bytes) => Current::Bytes(Cursor::new(bytes)),
            Segment::File { path, len } => {
                let file = File::open(&path)?;
                Current::File {
                    path,
                    reader: file.take(len),
                    remaining: len,
                }
            }
        });
        Ok(true)
    }
}

impl Read for MultipartReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.current.is_none() && !self.open_next()? {
                return Ok(0);
            }
            let read = match self.current.as_mut() {
                None => 0,
                Some(Current::Bytes(cursor)) => cursor.read(buf)?,
                Some(Current::File {
                    path,
                    reader,
                    remaining,
                }) => {
                    let n = reader.read(buf)?;
                    if n == 0 && *remaining > 0 {
                        // The declared length is already on the wire.
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            format!("{} shrank during upload", path.display()),
                        ));
                    }
                    *remaining -= n as u64;
                    n
                }
            };
            if read > 0 {
                return Ok(read);
            }
            self.current = None;
        }
    }
}

/// Build the upload body for `root`, skipping paths (relative to `root`) in `exclude`.
pub fn directory_body(root: &Path, exclude: &[PathBuf]) -> Result<MultipartBody, DaemonError> {
    let root_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            io_err(
                root,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "directory has no name"),
            )
        })?;
    let meta = std::fs::metadata(root).map_err(|e| io_err(root, e))?;
    if !meta.is_dir() {
        return Err(io_err(
            root,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
        ));
    }

    let mut body = MultipartBody::new();
    body.add_directory(&root_name);
    walk(root, Path::new(""), &root_name, exclude, &mut body)?;
    Ok(body)
}

fn walk(
    dir: &Path,
    relative: &Path,
    prefix: &str,
    exclude: &[PathBuf],
    body: &mut MultipartBody,
) -> Result<(), DaemonError> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| io_err(dir, e))?
        .collect::<Result<_, _>>()
        .map_err(|e| io_err(dir, e))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let rel = relative.join(&file_name);
        if exclude.iter().any(|skip| skip == &rel) {
            tracing::debug!(path = %rel.display(), "excluded from upload");
            continue;
        }
        let name = format!("{prefix}/{file_name}");
        let path = entry.path();
        // Follow symlinks so linked assets are uploaded by content.
        let meta = std::fs::metadata(&path).map_err(|e| io_err(&path, e))?;
        if meta.is_dir() {
            body.add_directory(&name);
            walk(&path, &rel, &name, exclude, body)?;
        } else if meta.is_file() {
            body.add_file(&name, &path)?;
        }
    }
    Ok(())
}

fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}
