use std::collections::HashMap;
use std::io::{self, prelude::*};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{select, Receiver, Sender};
use log::{debug, error, info};

use super::{backoff::ExponentialBackoff, comm::Communicator};
use crate::error::Error;

const RETRY_WAIT: Duration = Duration::from_millis(50);
const RETRY_MAX_WAIT: Duration = Duration::from_millis(2000);
const RETRY_ATTEMPTS: usize = 40;
const SEND_ATTEMPTS: usize = 3;

/// A communicator whose peers are reached over TCP. Messages are framed by
/// their length and acknowledged by the receiver. A background thread owns
/// the outgoing connections, so `send` only enqueues; another thread
/// accepts connections and forwards every arriving message to `recv`.
///
/// A message the sender thread cannot deliver is fatal: every later `send`
/// or `recv` returns `Error::Communication`, including a `recv` already
/// blocked waiting.
///
pub struct TcpCommunicator {
    rank: usize,
    num_peers: usize,
    round: AtomicU64,
    send_sink: Option<Sender<(usize, Vec<u8>)>>,
    recv_sink: Sender<Vec<u8>>,
    recv_src: Receiver<Vec<u8>>,
    failure: Arc<Mutex<Option<String>>>,
    failure_src: Receiver<()>,
    send_thread: Option<JoinHandle<()>>,
}

impl TcpCommunicator {
    /// Listen on this rank's address in `peers` and start the transport.
    pub fn new(rank: usize, peers: Vec<SocketAddr>) -> Result<Self, Error> {
        let addr = *peers
            .get(rank)
            .ok_or_else(|| Error::Communication(format!("no address for rank {}", rank)))?;
        Self::from_listener(rank, TcpListener::bind(addr)?, peers)
    }

    /// Start the transport on an already bound listener. This allows the
    /// peer addresses to be known before any rank starts, e.g. when binding
    /// to port zero.
    pub fn from_listener(rank: usize, listener: TcpListener, peers: Vec<SocketAddr>) -> Result<Self, Error> {
        Self::from_listener_with_attempts(rank, listener, peers, RETRY_ATTEMPTS)
    }

    /// Like `from_listener`, with the number of connection attempts made
    /// for each message before it is given up on.
    pub fn from_listener_with_attempts(
        rank: usize,
        listener: TcpListener,
        peers: Vec<SocketAddr>,
        connect_attempts: usize) -> Result<Self, Error>
    {
        let (send_sink, send_src) = crossbeam_channel::unbounded();
        let (recv_sink, recv_src) = crossbeam_channel::unbounded();
        let (failure_sink, failure_src) = crossbeam_channel::bounded(1);
        let failure = Arc::new(Mutex::new(None));
        let sender = SerialSender {
            peers: peers.clone(),
            connect_attempts,
            failure: Arc::clone(&failure),
            failure_sink,
        };

        info!("rank {} listening on {}", rank, listener.local_addr()?);
        Self::start_listener(listener, recv_sink.clone());

        Ok(Self {
            rank,
            num_peers: peers.len(),
            round: AtomicU64::new(0),
            send_sink: Some(send_sink),
            recv_sink,
            recv_src,
            failure,
            failure_src,
            send_thread: Some(thread::spawn(move || sender.run(send_src))),
        })
    }

    fn check_failure(&self) -> Result<(), Error> {
        match self.failure.lock() {
            Ok(failure) => match &*failure {
                Some(msg) => Err(Error::Communication(msg.clone())),
                None => Ok(()),
            },
            Err(_) => Err(Error::Communication("sender thread panicked".to_string())),
        }
    }

    fn start_listener(listener: TcpListener, recv_sink: Sender<Vec<u8>>) {
        thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => Self::handle_connection(stream, recv_sink.clone()),
                    Err(e) => error!("failed to accept connection: {}", e),
                }
            }
        });
    }

    fn handle_connection(mut stream: TcpStream, recv_sink: Sender<Vec<u8>>) {
        let remote = stream.peer_addr().map(|a| a.to_string()).unwrap_or_default();
        info!("receiving connection from {}", remote);

        thread::spawn(move || loop {
            let result = read_frame(&mut stream).and_then(|bytes| {
                let size = bytes.len();
                recv_sink
                    .send(bytes)
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
                stream.write_all(&(size as u64).to_le_bytes())
            });
            if let Err(e) = result {
                debug!("connection from {} closed: {}", remote, e);
                break;
            }
        });
    }
}

impl Communicator for TcpCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.num_peers
    }

    fn send(&self, rank: usize, message: Vec<u8>) -> Result<(), Error> {
        self.check_failure()?;

        if rank >= self.num_peers {
            return Err(Error::Communication(format!("no rank {} among {} peers", rank, self.num_peers)));
        }
        self.send_sink
            .as_ref()
            .ok_or_else(|| Error::Communication("sender is shut down".to_string()))?
            .send((rank, message))
            .map_err(|_| Error::Communication("sender thread has exited".to_string()))
    }

    fn recv(&self) -> Result<Vec<u8>, Error> {
        self.check_failure()?;

        select! {
            recv(self.recv_src) -> message => {
                message.map_err(|_| Error::Communication("listener has exited".to_string()))
            }
            recv(self.failure_src) -> _ => {
                self.check_failure()?;
                Err(Error::Communication("sender thread has exited".to_string()))
            }
        }
    }

    fn requeue_recv(&self, message: Vec<u8>) -> Result<(), Error> {
        self.recv_sink
            .send(message)
            .map_err(|_| Error::Communication("receive queue is closed".to_string()))
    }

    fn next_round(&self) -> u64 {
        self.round.fetch_add(1, Ordering::SeqCst)
    }
}

impl Drop for TcpCommunicator {
    fn drop(&mut self) {
        self.send_sink.take();

        if let Some(handle) = self.send_thread.take() {
            if handle.join().is_err() {
                error!("sender thread panicked");
            }
        }
    }
}

/// The outgoing side of a `TcpCommunicator`, run on its own thread.
struct SerialSender {
    peers: Vec<SocketAddr>,
    connect_attempts: usize,
    failure: Arc<Mutex<Option<String>>>,
    failure_sink: Sender<()>,
}

impl SerialSender {
    fn run(self, send_src: Receiver<(usize, Vec<u8>)>) {
        let mut table: HashMap<usize, TcpStream> = HashMap::new();

        for (rank, message) in send_src {
            if let Err(e) = self.deliver(&mut table, rank, &message) {
                let msg = format!("giving up on message to {}: {}", self.peers[rank], e);
                error!("{}", msg);

                if let Ok(mut failure) = self.failure.lock() {
                    failure.get_or_insert(msg);
                }
                self.failure_sink.try_send(()).ok();
                break;
            }
        }
    }

    fn deliver(&self, table: &mut HashMap<usize, TcpStream>, rank: usize, message: &[u8]) -> io::Result<()> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let result = match table.get_mut(&rank) {
                Some(stream) => write_frame(stream, message),
                None => connect_with_retry(self.peers[rank], self.connect_attempts).and_then(|mut stream| {
                    let result = write_frame(&mut stream, message);
                    table.insert(rank, stream);
                    result
                }),
            };
            match result {
                Ok(()) => return Ok(()),
                Err(e) if attempts < SEND_ATTEMPTS => {
                    error!("failed to send message to {}: {}; reconnecting", self.peers[rank], e);
                    table.remove(&rank);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn connect_with_retry(addr: SocketAddr, attempts: usize) -> io::Result<TcpStream> {
    ExponentialBackoff::new(RETRY_WAIT, RETRY_MAX_WAIT, 2, attempts).retry(
        || TcpStream::connect(addr),
        |e, delay| debug!("connect to {} failed: {}; retrying in {:?}", addr, e, delay))
}

/// Write a length-prefixed message, and wait for the receiver to
/// acknowledge its length.
fn write_frame(stream: &mut TcpStream, message: &[u8]) -> io::Result<()> {
    let size = message.len() as u64;
    stream.write_all(&size.to_le_bytes())?;
    stream.write_all(message)?;

    let ack = read_u64(stream)?;
    if ack != size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("sent {} bytes but the receiver acknowledged {}", size, ack)));
    }
    Ok(())
}

fn read_frame<R: Read>(stream: &mut R) -> io::Result<Vec<u8>> {
    let size = read_u64(stream)? as usize;
    let mut buffer = vec![0; size];
    stream.read_exact(&mut buffer)?;
    Ok(buffer)
}

fn read_u64<R: Read>(stream: &mut R) -> io::Result<u64> {
    let mut buffer = [0; 8];
    stream.read_exact(&mut buffer)?;
    Ok(u64::from_le_bytes(buffer))
}
