//! Local TCP forwarding for loopback tunnels.
//!
//! The forwarder binds `127.0.0.1:<local_port>` and relays every accepted
//! connection to the remote host and port, one thread per direction. Every
//! relayed socket is tracked, so dropping the forwarder cuts live connections
//! as well as the accept loop.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

const ACCEPT_POLL: Duration = Duration::from_millis(20);

/// Sockets of the relayed connections, keyed by accept order.
#[derive(Default)]
struct Relays {
    next_id: u64,
    sockets: HashMap<u64, Vec<TcpStream>>,
}

struct Shared {
    remote: (String, u16),
    shutdown: AtomicBool,
    relays: Mutex<Relays>,
}

impl Shared {
    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Tracks `socket` under a fresh relay id.
    fn register(&self, socket: &TcpStream) -> io::Result<u64> {
        let tracked = socket.try_clone()?;

        let mut relays = self.relays.lock();
        relays.next_id += 1;
        let id = relays.next_id;
        relays.sockets.insert(id, vec![tracked]);
        Ok(id)
    }

    /// Adds `socket` to relay `id`. Fails once the forwarder is shutting down,
    /// in which case the caller owns closing it.
    fn attach(&self, id: u64, socket: &TcpStream) -> io::Result<()> {
        let tracked = socket.try_clone()?;

        let mut relays = self.relays.lock();
        if self.is_shutdown() {
            return Err(io::ErrorKind::ConnectionAborted.into());
        }
        relays.sockets.entry(id).or_default().push(tracked);
        Ok(())
    }

    fn forget(&self, id: u64) {
        self.relays.lock().sockets.remove(&id);
    }

    fn close_all(&self) {
        let sockets = std::mem::take(&mut self.relays.lock().sockets);
        for socket in sockets.into_values().flatten() {
            let _ = socket.shutdown(Shutdown::Both);
        }
    }
}

pub(crate) struct Forwarder {
    local_port: u16,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl Forwarder {
    /// Binds the local port and starts accepting.
    ///
    /// # Arguments
    /// * `local_port` - Port to bind on 127.0.0.1, 0 for an ephemeral port
    /// * `remote` - Host and port every accepted connection is relayed to
    pub(crate) fn bind(local_port: u16, remote: (String, u16)) -> io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", local_port))?;
        let local_port = listener.local_addr()?.port();
        listener.set_nonblocking(true)?;

        let shared = Arc::new(Shared {
            remote,
            shutdown: AtomicBool::new(false),
            relays: Mutex::new(Relays::default()),
        });
        let accepting = shared.clone();

        let thread = thread::Builder::new()
            .name(format!("edge-tunnel-{local_port}"))
            .spawn(move || accept_loop(listener, accepting))?;

        debug!(target: "edge_client::engine", local_port, "tunnel listening");

        Ok(Self {
            local_port,
            shared,
            thread: Some(thread),
        })
    }

    pub(crate) fn local_port(&self) -> u16 {
        self.local_port
    }
}

impl Drop for Forwarder {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);

        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        // Relays registered before the join are closed here, later upstream
        // sockets are refused by `attach`.
        self.shared.close_all();

        debug!(target: "edge_client::engine", local_port = self.local_port, "tunnel closed");
    }
}

fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    while !shared.is_shutdown() {
        match listener.accept() {
            Ok((client, peer)) => {
                if let Err(error) = spawn_relay(client, peer, shared.clone()) {
                    warn!(target: "edge_client::engine", %peer, %error, "tunnel relay failed");
                }
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(error) => {
                warn!(target: "edge_client::engine", %error, "tunnel accept failed");
                break;
            }
        }
    }
}

/// Tracks the client socket and hands it to a relay thread, which connects
/// upstream without holding up the accept loop.
fn spawn_relay(client: TcpStream, peer: SocketAddr, shared: Arc<Shared>) -> io::Result<()> {
    client.set_nonblocking(false)?;
    let id = shared.register(&client)?;

    let spawned = thread::Builder::new()
        .name("edge-tunnel-relay".into())
        .spawn(move || {
            if let Err(error) = relay(id, client, &shared) {
                debug!(target: "edge_client::engine", %peer, %error, "tunnel relay ended");
            }
            shared.forget(id);
        });

    spawned.map(|_| ())
}

fn relay(id: u64, client: TcpStream, shared: &Shared) -> io::Result<()> {
    let upstream = match TcpStream::connect((shared.remote.0.as_str(), shared.remote.1)) {
        Ok(upstream) => upstream,
        Err(error) => {
            let _ = client.shutdown(Shutdown::Both);
            return Err(error);
        }
    };

    if let Err(error) = shared.attach(id, &upstream) {
        let _ = upstream.shutdown(Shutdown::Both);
        let _ = client.shutdown(Shutdown::Both);
        return Err(error);
    }

    let client_reader = client.try_clone()?;
    let upstream_writer = upstream.try_clone()?;

    let up = thread::Builder::new()
        .name("edge-tunnel-up".into())
        .spawn(move || pipe(client_reader, upstream_writer))?;
    pipe(upstream, client);

    let _ = up.join();
    Ok(())
}

fn pipe(mut from: TcpStream, mut to: TcpStream) {
    let _ = io::copy(&mut from, &mut to);
    let _ = to.shutdown(Shutdown::Write);
}
