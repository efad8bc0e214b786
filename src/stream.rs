//! A buffered full-duplex byte stream over a pluggable transport.
use std::cmp;

use log::trace;

/// Size of the fixed output buffer.
pub const WRITE_BUFFER_SIZE: usize = 4096;

/// A host/port pair naming one side of a connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or address text.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

/// The transport a [`Stream`] performs its I/O through.
///
/// `overflow` must write all of `data` or report failure; `underflow`
/// must append at least one byte to `input` or report end-of-stream /
/// failure. Both may block.
pub trait Transport {
    /// Flushes one output chunk. Returns false on transport failure.
    fn overflow(&mut self, data: &[u8], conn_no: u32) -> bool;
    /// Refills the input buffer. Returns false on end-of-stream or failure.
    fn underflow(&mut self, input: &mut Vec<u8>, conn_no: u32) -> bool;
    /// Whether the transport is still usable.
    fn is_open(&self) -> bool;
    /// Initiates a graceful close.
    fn shutdown(&mut self);
    /// The local side of the connection.
    fn local_endpoint(&self) -> Endpoint;
    /// The remote side of the connection.
    fn remote_endpoint(&self) -> Endpoint;
}

/// A buffered byte stream: a fixed write buffer flushed through
/// `Transport::overflow` and a growable input buffer refilled through
/// `Transport::underflow`.
///
/// `read` returns short only at end-of-stream or transport failure;
/// within one call it loops across as many refills as needed.
pub struct Stream<'t> {
    transport: &'t mut dyn Transport,
    output: [u8; WRITE_BUFFER_SIZE],
    out_len: usize,
    input: Vec<u8>,
    read_pos: usize,
    conn_no: u32,
}

impl<'t> Stream<'t> {
    /// Wraps a transport.
    pub fn new(transport: &'t mut dyn Transport) -> Stream<'t> {
        Stream {
            transport,
            output: [0; WRITE_BUFFER_SIZE],
            out_len: 0,
            input: Vec::new(),
            read_pos: 0,
            conn_no: 0,
        }
    }

    /// Tags subsequent transport calls with a connection sequence number.
    pub fn set_conn_no(&mut self, conn_no: u32) {
        self.conn_no = conn_no;
    }

    /// Whether the transport is still usable.
    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Initiates a graceful close.
    pub fn shutdown(&mut self) {
        self.transport.shutdown();
    }

    /// The local side of the connection.
    pub fn local_endpoint(&self) -> Endpoint {
        self.transport.local_endpoint()
    }

    /// The remote side of the connection.
    pub fn remote_endpoint(&self) -> Endpoint {
        self.transport.remote_endpoint()
    }

    /// Buffers `data`, flushing whenever the write buffer fills. Returns
    /// the number of bytes accepted; short on transport failure.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let mut written = 0;
        while written < data.len() {
            let room = WRITE_BUFFER_SIZE - self.out_len;
            let chunk = cmp::min(room, data.len() - written);
            self.output[self.out_len..self.out_len + chunk]
                .copy_from_slice(&data[written..written + chunk]);
            self.out_len += chunk;
            if self.out_len == WRITE_BUFFER_SIZE && !self.flush() {
                break;
            }
            written += chunk;
        }
        written
    }

    /// Flushes whatever is buffered. Returns false on transport failure.
    pub fn flush(&mut self) -> bool {
        trace!("flush {} buffered bytes", self.out_len);
        if self.transport.overflow(&self.output[..self.out_len], self.conn_no) {
            self.out_len = 0;
            true
        } else {
            false
        }
    }

    /// Reads exactly `buf.len()` bytes unless the stream ends first;
    /// returns the number of bytes read.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut filled = 0;
        while filled < buf.len() {
            if self.read_pos == self.input.len() && !self.refill() {
                break;
            }
            let rest = self.input.len() - self.read_pos;
            let chunk = cmp::min(rest, buf.len() - filled);
            buf[filled..filled + chunk]
                .copy_from_slice(&self.input[self.read_pos..self.read_pos + chunk]);
            self.read_pos += chunk;
            filled += chunk;
        }
        filled
    }

    fn refill(&mut self) -> bool {
        self.input.clear();
        self.read_pos = 0;
        let ok = self.transport.underflow(&mut self.input, self.conn_no);
        trace!("refill ok={} got={}", ok, self.input.len());
        ok && !self.input.is_empty()
    }
}
