use std::io::{self, Write};

use log::debug;

/// Destination of written XML, with backpressure.
///
/// A sink always accepts the chunk it is given. Returning `false` from
/// [`Sink::write_chunk`] means its buffer is full: the caller must call
/// [`Sink::drain`] before writing anything else.
pub trait Sink {
    fn write_chunk(&mut self, chunk: &str) -> io::Result<bool>;

    /// Blocks until buffered output has been flushed downstream.
    fn drain(&mut self) -> io::Result<()>;

    /// Flushes everything and finishes the output.
    fn end(&mut self) -> io::Result<()>;
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn write_chunk(&mut self, chunk: &str) -> io::Result<bool> {
        (**self).write_chunk(chunk)
    }

    fn drain(&mut self) -> io::Result<()> {
        (**self).drain()
    }

    fn end(&mut self) -> io::Result<()> {
        (**self).end()
    }
}

/// A bounded in-memory buffer in front of any [`Write`].
pub struct BufferedSink<W: Write> {
    inner: W,
    buffer: String,
    capacity: usize,
}

impl<W: Write> BufferedSink<W> {
    pub fn new(inner: W, capacity: usize) -> Self {
        Self {
            inner,
            buffer: String::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Bytes waiting to be drained.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Returns the underlying writer. Undrained bytes are discarded.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Sink for BufferedSink<W> {
    fn write_chunk(&mut self, chunk: &str) -> io::Result<bool> {
        self.buffer.push_str(chunk);
        Ok(self.buffer.len() < self.capacity)
    }

    fn drain(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            debug!("Draining {} buffered bytes", self.buffer.len());
            self.inner.write_all(self.buffer.as_bytes())?;
            self.buffer.clear();
        }
        Ok(())
    }

    fn end(&mut self) -> io::Result<()> {
        self.drain()?;
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signals_full_at_capacity() {
        let mut sink = BufferedSink::new(Vec::new(), 8);
        assert!(sink.write_chunk("1234").unwrap());
        assert!(!sink.write_chunk("5678").unwrap());
        assert_eq!(sink.buffered(), 8);
        assert!(sink.get_ref().is_empty());

        sink.drain().unwrap();
        assert_eq!(sink.buffered(), 0);
        assert_eq!(sink.get_ref().as_slice(), b"12345678");
    }

    #[test]
    fn oversized_chunks_are_accepted_whole() {
        let mut sink = BufferedSink::new(Vec::new(), 2);
        assert!(!sink.write_chunk("abcdef").unwrap());
        sink.end().unwrap();
        assert_eq!(sink.into_inner(), b"abcdef");
    }
}
