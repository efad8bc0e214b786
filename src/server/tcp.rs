//! The TCP acceptor: one acceptor thread, one worker thread per
//! connection, with a close path that wakes the acceptor, shuts every
//! live socket down and joins the workers.
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, error, info};

use crate::error::Error;
use crate::server::Server;
use crate::stream::{Endpoint, Stream, Transport};

const READ_CHUNK_SIZE: usize = 8192;

/// A [`Transport`] over a blocking `TcpStream`.
pub struct TcpTransport {
    socket: TcpStream,
    open: bool,
    local: Endpoint,
    remote: Endpoint,
}

impl TcpTransport {
    /// Wraps an accepted socket.
    pub fn new(socket: TcpStream) -> TcpTransport {
        let local = endpoint_of(socket.local_addr());
        let remote = endpoint_of(socket.peer_addr());
        TcpTransport {
            socket,
            open: true,
            local,
            remote,
        }
    }
}

fn endpoint_of(addr: io::Result<SocketAddr>) -> Endpoint {
    match addr {
        Ok(addr) => Endpoint {
            host: addr.ip().to_string(),
            port: addr.port(),
        },
        Err(_) => Endpoint {
            host: String::new(),
            port: 0,
        },
    }
}

impl Transport for TcpTransport {
    fn overflow(&mut self, data: &[u8], _conn_no: u32) -> bool {
        if !self.open {
            return false;
        }
        match self.socket.write_all(data) {
            Ok(()) => true,
            Err(err) => {
                debug!("write failed: {}", err);
                self.open = false;
                false
            }
        }
    }

    fn underflow(&mut self, input: &mut Vec<u8>, _conn_no: u32) -> bool {
        if !self.open {
            return false;
        }
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        match self.socket.read(&mut chunk) {
            Ok(0) => {
                self.open = false;
                false
            }
            Ok(n) => {
                input.extend_from_slice(&chunk[..n]);
                true
            }
            Err(err) => {
                debug!("read failed: {}", err);
                self.open = false;
                false
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn shutdown(&mut self) {
        if self.open {
            self.open = false;
            let _ = self.socket.shutdown(Shutdown::Both);
        }
    }

    fn local_endpoint(&self) -> Endpoint {
        self.local.clone()
    }

    fn remote_endpoint(&self) -> Endpoint {
        self.remote.clone()
    }
}

struct Inner {
    server: Server,
    closing: AtomicBool,
    conns: Mutex<Vec<(u64, TcpStream)>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// A live server: the acceptor is running and connections are being
/// served. Dropping it closes everything down.
pub struct Listening {
    addr: SocketAddr,
    inner: Arc<Inner>,
    acceptor: Option<JoinHandle<()>>,
}

impl Server {
    /// Binds `port` (0 picks a free one) and starts accepting, one
    /// worker thread per connection. Consumes the server; the returned
    /// handle keeps it alive.
    pub fn listen(self, port: u16) -> crate::Result<Listening> {
        let listener =
            TcpListener::bind(("0.0.0.0", port)).map_err(Error::new_listen)?;
        let addr = listener.local_addr().map_err(Error::new_listen)?;
        info!("Starting server at http://{}/", addr);

        let inner = Arc::new(Inner {
            server: self,
            closing: AtomicBool::new(false),
            conns: Mutex::new(Vec::new()),
            workers: Mutex::new(Vec::new()),
        });
        let acceptor_inner = inner.clone();
        let acceptor = thread::Builder::new()
            .name("hearth-acceptor".to_owned())
            .spawn(move || accept_loop(listener, acceptor_inner))
            .map_err(Error::new_listen)?;

        Ok(Listening {
            addr,
            inner,
            acceptor: Some(acceptor),
        })
    }
}

fn accept_loop(listener: TcpListener, inner: Arc<Inner>) {
    let mut next_id = 0u64;
    for conn in listener.incoming() {
        if inner.closing.load(Ordering::SeqCst) {
            break;
        }
        let socket = match conn {
            Ok(socket) => socket,
            Err(err) => {
                error!("{}", Error::new_accept(err));
                continue;
            }
        };

        next_id += 1;
        let id = next_id;
        if let Ok(handle) = socket.try_clone() {
            inner.conns.lock().unwrap().push((id, handle));
        }

        let worker_inner = inner.clone();
        let worker = thread::Builder::new()
            .name(format!("hearth-conn-{}", id))
            .spawn(move || {
                let mut transport = TcpTransport::new(socket);
                {
                    let mut io = Stream::new(&mut transport);
                    worker_inner.server.on_connection(&mut io, false);
                }
                worker_inner
                    .conns
                    .lock()
                    .unwrap()
                    .retain(|(conn_id, _)| *conn_id != id);
            });
        match worker {
            Ok(worker) => inner.workers.lock().unwrap().push(worker),
            Err(err) => error!("spawning connection worker failed: {}", err),
        }
    }
    debug!("acceptor done");
}

impl Listening {
    /// The bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stops accepting, closes every live connection and joins all
    /// threads. Idempotent.
    pub fn close(&mut self) {
        if self.inner.closing.swap(true, Ordering::SeqCst) {
            return;
        }

        // unblock the acceptor with a throwaway connection
        let _ = TcpStream::connect(("127.0.0.1", self.addr.port()));
        if let Some(acceptor) = self.acceptor.take() {
            let _ = acceptor.join();
        }

        for (_, socket) in self.inner.conns.lock().unwrap().drain(..) {
            let _ = socket.shutdown(Shutdown::Both);
        }
        let workers: Vec<_> = self.inner.workers.lock().unwrap().drain(..).collect();
        for worker in workers {
            let _ = worker.join();
        }
    }
}

impl Drop for Listening {
    fn drop(&mut self) {
        self.close();
    }
}
