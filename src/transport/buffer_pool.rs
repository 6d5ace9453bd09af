use std::sync::Mutex;

use bytes::BytesMut;
use tracing::{debug, trace};

/// Bounded pool of reusable receive buffers.
///
/// Rent/return both take the lock only for the instant of the `Vec` operation, never across an
///  I/O call. Exhaustion grows the pool by allocating a fresh buffer (logged), so renting can
///  never deadlock; returns beyond the configured bound are discarded.
pub struct BufferPool {
    buf_size: usize,
    buffers: Mutex<Vec<BytesMut>>,
}

impl BufferPool {
    pub fn new(buf_size: usize, max_pool_size: usize) -> Self {
        BufferPool {
            buf_size,
            buffers: Mutex::new(Vec::with_capacity(max_pool_size)),
        }
    }

    pub fn buf_size(&self) -> usize {
        self.buf_size
    }

    pub fn get_from_pool(&self) -> BytesMut {
        {
            let mut buffers = self.buffers.lock().unwrap();
            if let Some(buffer) = buffers.pop() {
                trace!("returning buffer from pool");
                return buffer;
            }
        }

        debug!("no buffer in pool: creating new buffer");
        BytesMut::with_capacity(self.buf_size)
    }

    pub fn return_to_pool(&self, mut buffer: BytesMut) {
        assert!(buffer.capacity() >= self.buf_size,
                "returned buffer lost its capacity of {} bytes - was it split without reassembly?",
                self.buf_size);

        buffer.clear();

        let mut buffers = self.buffers.lock().unwrap();
        if buffers.capacity() > buffers.len() {
            trace!("returning buffer to pool");
            buffers.push(buffer);
        }
        else {
            debug!("pool is full: discarding returned buffer");
        }
    }
}
