use std::sync::Mutex;
use bytes::BytesMut;
use tracing::trace;

/// Pool of receive buffers, handed from the listener to workers with each datagram and returned
///  after dispatch.
pub struct ReceiveBufferPool {
    buf_size: usize,
    buffers: Mutex<Vec<BytesMut>>,
}

impl ReceiveBufferPool {
    pub fn new(buf_size: usize, max_pool_size: usize) -> Self {
        ReceiveBufferPool {
            buf_size,
            buffers: Mutex::new(Vec::with_capacity(max_pool_size)),
        }
    }

    /// returns a zero-filled buffer of the pool's buffer size
    pub fn get_from_pool(&self) -> BytesMut {
        let mut result = self.buffers.lock().unwrap()
            .pop()
            .unwrap_or_else(|| {
                trace!("no buffer in pool: creating new buffer");
                BytesMut::with_capacity(self.buf_size)
            });

        result.resize(self.buf_size, 0);
        result
    }

    pub fn return_to_pool(&self, mut buffer: BytesMut) {
        if buffer.capacity() < self.buf_size {
            trace!("discarding returned buffer with insufficient capacity");
            return;
        }

        buffer.clear();

        let mut buffers = self.buffers.lock().unwrap();
        if buffers.capacity() > buffers.len() {
            buffers.push(buffer);
        }
        else {
            trace!("pool is full: discarding returned buffer");
        }
    }
}
