// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed-capacity circular byte buffer backing each session's output capture.
//!
//! Tracks the total number of bytes ever written so consumers can request
//! replay from a global byte offset, or ask for the last N lines. When the
//! buffer wraps, older data is silently discarded — per the design doc's
//! non-goal of preserving terminal output beyond a bounded window.

#[derive(Debug)]
pub struct RingBuffer {
    buf: Vec<u8>,
    capacity: usize,
    write_pos: usize,
    total_written: u64,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self { buf: vec![0u8; capacity.max(1)], capacity: capacity.max(1), write_pos: 0, total_written: 0 }
    }

    pub fn write(&mut self, data: &[u8]) {
        for chunk in data.chunks(self.capacity) {
            let start = self.write_pos;
            let end = start + chunk.len();

            if end <= self.capacity {
                self.buf[start..end].copy_from_slice(chunk);
            } else {
                let first = self.capacity - start;
                self.buf[start..self.capacity].copy_from_slice(&chunk[..first]);
                self.buf[..chunk.len() - first].copy_from_slice(&chunk[first..]);
            }

            self.write_pos = end % self.capacity;
            self.total_written += chunk.len() as u64;
        }
    }

    /// Read bytes from the given global byte offset onward.
    ///
    /// Returns `None` if the offset has already been overwritten or is
    /// beyond the current write position. Otherwise returns up to two
    /// slices covering the requested (possibly wrapped) range.
    pub fn read_from(&self, offset: u64) -> Option<(&[u8], &[u8])> {
        if offset > self.total_written {
            return None;
        }

        let oldest = self.total_written.saturating_sub(self.capacity as u64);
        if offset < oldest {
            return None;
        }

        let available = (self.total_written - offset) as usize;
        if available == 0 {
            return Some((&[], &[]));
        }

        let start = if self.write_pos >= available {
            self.write_pos - available
        } else {
            self.capacity - (available - self.write_pos)
        };

        if start + available <= self.capacity {
            Some((&self.buf[start..start + available], &[]))
        } else {
            let first = self.capacity - start;
            Some((&self.buf[start..self.capacity], &self.buf[..available - first]))
        }
    }

    pub fn available_from(&self, offset: u64) -> u64 {
        if offset > self.total_written {
            return 0;
        }
        let oldest = self.total_written.saturating_sub(self.capacity as u64);
        if offset < oldest {
            return 0;
        }
        self.total_written - offset
    }

    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Return everything currently held, oldest first.
    pub fn snapshot(&self) -> Vec<u8> {
        let oldest = self.total_written.saturating_sub(self.capacity as u64);
        match self.read_from(oldest) {
            Some((a, b)) => {
                let mut out = Vec::with_capacity(a.len() + b.len());
                out.extend_from_slice(a);
                out.extend_from_slice(b);
                out
            }
            None => Vec::new(),
        }
    }

    /// Return the last `n` lines (newline-delimited) of the buffer's
    /// current contents as a lossy UTF-8 string, capped at `max_bytes`.
    pub fn last_lines(&self, n: usize, max_bytes: usize) -> String {
        let data = self.snapshot();
        let text = String::from_utf8_lossy(&data);
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(n);
        let joined = lines[start..].join("\n");
        if joined.len() > max_bytes {
            let target = joined.len() - max_bytes;
            let cut = joined
                .char_indices()
                .map(|(i, _)| i)
                .find(|&i| i >= target)
                .unwrap_or(joined.len());
            joined[cut..].to_string()
        } else {
            joined
        }
    }
}

#[cfg(test)]
#[path = "ring_tests.rs"]
mod tests;
