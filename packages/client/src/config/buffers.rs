//! Pooled read buffers.
//!
//! Each connection checks a `BytesMut` out of the shared [`BufferPool`] for
//! its read buffer and returns it on close, so steady-state traffic reuses a
//! bounded set of allocations instead of allocating per connection.

use std::sync::Mutex;

use bytes::BytesMut;

/// Sizing for the read-buffer pool.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Initial capacity of a freshly checked-out buffer.
    pub read_buffer_size: usize,
    /// Buffers that grew beyond this are dropped on check-in rather than
    /// pooled.
    pub max_buffer_size: usize,
    /// Upper bound on retained free buffers.
    pub max_pooled_buffers: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 8192,      // 8KB
            max_buffer_size: 1_048_576,  // 1MB
            max_pooled_buffers: 64,
        }
    }
}

impl BufferConfig {
    /// Validate the buffer configuration.
    ///
    /// # Errors
    ///
    /// Returns a description of the first offending field.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.read_buffer_size == 0 {
            return Err("read_buffer_size must be greater than 0".to_string());
        }
        if self.max_buffer_size < self.read_buffer_size {
            return Err("max_buffer_size must be >= read_buffer_size".to_string());
        }
        Ok(())
    }
}

/// A bounded free-list of reusable byte buffers.
#[derive(Debug)]
pub struct BufferPool {
    config: BufferConfig,
    free: Mutex<Vec<BytesMut>>,
}

impl BufferPool {
    #[must_use]
    pub fn new(config: BufferConfig) -> Self {
        Self {
            config,
            free: Mutex::new(Vec::new()),
        }
    }

    /// Take a cleared buffer from the free list, or allocate one.
    pub fn checkout(&self) -> BytesMut {
        if let Ok(mut free) = self.free.lock() {
            if let Some(buf) = free.pop() {
                return buf;
            }
        }
        BytesMut::with_capacity(self.config.read_buffer_size)
    }

    /// Return a buffer to the free list. Oversized buffers and overflow
    /// beyond `max_pooled_buffers` are dropped.
    pub fn checkin(&self, mut buf: BytesMut) {
        buf.clear();
        if buf.capacity() == 0 || buf.capacity() > self.config.max_buffer_size {
            return;
        }
        if let Ok(mut free) = self.free.lock() {
            if free.len() < self.config.max_pooled_buffers {
                free.push(buf);
            }
        }
    }

    /// Number of buffers currently pooled.
    pub fn pooled(&self) -> usize {
        self.free.lock().map(|f| f.len()).unwrap_or(0)
    }
}
