//! Bounded output sink shared by the script runner, the REPL session and the `/log` poller.
//! Trimming is byte-based from the front; line boundaries are not respected.

use std::sync::Mutex;

/// Default capacity: keep the last ~8 KB of output.
pub const LOG_CAPACITY_BYTES: usize = 8192;

pub struct LogBuffer {
    inner: Mutex<Vec<u8>>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY_BYTES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append and keep only the trailing `capacity` bytes.
    pub fn append(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        let mut buf = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        buf.extend_from_slice(text.as_bytes());
        truncate_front(&mut buf, self.capacity);
    }

    /// Current contents. A multi-byte sequence cut by trimming decodes lossily.
    pub fn read(&self) -> String {
        let buf = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate_front(buf: &mut Vec<u8>, capacity: usize) {
    if buf.len() > capacity {
        let excess = buf.len() - capacity;
        buf.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_append_and_read() {
        let log = LogBuffer::new();
        log.append("hello\n");
        log.append("world\n");
        assert_eq!(log.read(), "hello\nworld\n");
    }

    #[test]
    fn test_overflow_keeps_most_recent_suffix() {
        let log = LogBuffer::with_capacity(16);
        log.append("0123456789");
        log.append("abcdefghij");
        assert_eq!(log.len(), 16);
        assert_eq!(log.len(), log.capacity());
        assert_eq!(log.read(), "456789abcdefghij");
    }

    #[test]
    fn test_single_oversized_append_is_cut_to_capacity() {
        let log = LogBuffer::with_capacity(LOG_CAPACITY_BYTES);
        let big = "x".repeat(LOG_CAPACITY_BYTES * 2 + 7);
        log.append(&big);
        log.append("tail");
        assert_eq!(log.len(), LOG_CAPACITY_BYTES);
        assert!(log.read().ends_with("xxxtail"));
    }

    #[test]
    fn test_trim_ignores_line_boundaries() {
        let log = LogBuffer::with_capacity(5);
        log.append("line one\nline two\n");
        assert_eq!(log.read(), " two\n");
    }

    #[test]
    fn test_concurrent_appends_stay_bounded() {
        let log = Arc::new(LogBuffer::with_capacity(256));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        log.append(&format!("worker {}\n", i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(log.len(), 256);
    }
}
