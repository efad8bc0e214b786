//! A scripted in-memory transport for tests.
use std::cmp;

use crate::stream::{Endpoint, Transport};

pub struct MockTransport {
    input: Vec<u8>,
    pos: usize,
    output: Vec<u8>,
    open: bool,
    chunk: usize,
    local: Endpoint,
}

impl MockTransport {
    pub fn empty() -> MockTransport {
        MockTransport::with_input(b"")
    }

    pub fn with_input(input: &[u8]) -> MockTransport {
        MockTransport {
            input: input.to_vec(),
            pos: 0,
            output: Vec::new(),
            open: true,
            chunk: usize::MAX,
            local: Endpoint {
                host: "127.0.0.1".to_owned(),
                port: 8080,
            },
        }
    }

    /// Limits each underflow to `n` bytes, to exercise refill loops.
    pub fn chunked(mut self, n: usize) -> MockTransport {
        self.chunk = n;
        self
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn output_str(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    pub fn close(&mut self) {
        self.open = false;
    }
}

impl Transport for MockTransport {
    fn overflow(&mut self, data: &[u8], _conn_no: u32) -> bool {
        if !self.open {
            return false;
        }
        self.output.extend_from_slice(data);
        true
    }

    fn underflow(&mut self, input: &mut Vec<u8>, _conn_no: u32) -> bool {
        if !self.open || self.pos == self.input.len() {
            return false;
        }
        let chunk = cmp::min(self.chunk, self.input.len() - self.pos);
        input.extend_from_slice(&self.input[self.pos..self.pos + chunk]);
        self.pos += chunk;
        true
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn shutdown(&mut self) {
        self.open = false;
    }

    fn local_endpoint(&self) -> Endpoint {
        self.local.clone()
    }

    fn remote_endpoint(&self) -> Endpoint {
        Endpoint {
            host: "127.0.0.1".to_owned(),
            port: 49152,
        }
    }
}
