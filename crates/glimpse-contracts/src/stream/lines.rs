use std::collections::VecDeque;
use std::io::{self, Read};

use tracing::warn;

const READ_CHUNK_BYTES: usize = 8 * 1024;
/// Longest line kept before it is dropped whole.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Reassembles newline-terminated lines from arbitrarily split byte chunks.
///
/// Bytes are buffered until a `\n` arrives, so a chunk boundary may fall inside
/// a UTF-8 sequence or between `\r` and `\n`. Emitted lines carry no terminator.
///
/// A line longer than the limit is discarded up to its `\n` and never emitted,
/// the same as any other unusable frame.
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    max_line_bytes: usize,
    discarding: bool,
    dropped: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_max_line_bytes(MAX_LINE_BYTES)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line_bytes: max_line_bytes.max(1),
            discarding: false,
            dropped: 0,
        }
    }

    /// Lines dropped for exceeding the length limit.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn push(&mut self, chunk: &[u8], out: &mut Vec<String>) {
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|byte| *byte == b'\n') {
            self.append(&rest[..pos]);
            if self.discarding {
                self.discarding = false;
            } else {
                out.push(take_line(&mut self.pending));
            }
            rest = &rest[pos + 1..];
        }
        self.append(rest);
    }

    /// Flushes an unterminated trailing line, if the stream ended without `\n`.
    pub fn finish(&mut self) -> Option<String> {
        if self.discarding {
            self.discarding = false;
            return None;
        }
        if self.pending.is_empty() {
            return None;
        }
        Some(take_line(&mut self.pending))
    }

    fn append(&mut self, bytes: &[u8]) {
        if self.discarding {
            return;
        }
        if self.pending.len() + bytes.len() > self.max_line_bytes {
            warn!(limit = self.max_line_bytes, "dropping oversized stream line");
            self.pending = Vec::new();
            self.discarding = true;
            self.dropped += 1;
            return;
        }
        self.pending.extend_from_slice(bytes);
    }
}

fn take_line(pending: &mut Vec<u8>) -> String {
    if pending.last() == Some(&b'\r') {
        pending.pop();
    }
    let line = String::from_utf8_lossy(pending).into_owned();
    pending.clear();
    line
}

/// Pull-based line iterator over any reader, backed by a [`LineBuffer`].
///
/// A read error is yielded once and ends the iteration.
pub struct ChunkedLines<R> {
    reader: R,
    buffer: LineBuffer,
    ready: VecDeque<String>,
    scratch: Vec<u8>,
    done: bool,
}

impl<R: Read> ChunkedLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: LineBuffer::new(),
            ready: VecDeque::new(),
            scratch: vec![0u8; READ_CHUNK_BYTES],
            done: false,
        }
    }
}

impl<R: Read> Iterator for ChunkedLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Some(Ok(line));
            }
            if self.done {
                return None;
            }
            match self.reader.read(&mut self.scratch) {
                Ok(0) => {
                    self.done = true;
                    if let Some(line) = self.buffer.finish() {
                        return Some(Ok(line));
                    }
                }
                Ok(read) => {
                    let mut lines = Vec::new();
                    self.buffer.push(&self.scratch[..read], &mut lines);
                    self.ready.extend(lines);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}
