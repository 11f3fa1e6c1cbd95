use std::io;
use std::net::SocketAddr;

use futures::future::Future;
use tokio_core::net::{TcpStream, TcpStreamNew};
use tokio_core::reactor::Handle;
use tokio_io::{AsyncRead, AsyncWrite};

/// Boxed socket future, as handed out by a [`Reconnector`].
pub type SocketFuture<S> = Box<dyn Future<Item = S, Error = io::Error>>;

/// Produces replacement sockets for a session that decided to retry its
/// handshake over a fresh connection.
pub type Reconnector<S> = Box<dyn FnMut() -> SocketFuture<S>>;

/// Trait for connecting to a peer over some generic transport.
pub trait Transport {
    /// Concrete socket type.
    type Socket: AsyncRead + AsyncWrite + 'static;
    /// Future yielding `Self::Socket` or `io::Error`.
    type FutureSocket: Future<Item = Self::Socket, Error = io::Error> + 'static;

    /// Connect to the given address over this transport, using the supplied `Handle`.
    fn connect(&self, addr: &SocketAddr, handle: &Handle) -> Self::FutureSocket;
}

/// Plain TCP.
#[derive(Copy, Clone)]
pub struct TcpTransport;

impl Transport for TcpTransport {
    type Socket = TcpStream;
    type FutureSocket = TcpStreamNew;

    fn connect(&self, addr: &SocketAddr, handle: &Handle) -> TcpStreamNew {
        TcpStream::connect(addr, handle)
    }
}

/// Build a reconnect hook that re-dials `addr` over `transport` whenever a
/// session asks for a fresh socket.
pub fn reconnector<T>(transport: T, addr: SocketAddr, handle: Handle) -> Reconnector<T::Socket>
where
    T: Transport + 'static,
{
    Box::new(move || Box::new(transport.connect(&addr, &handle)))
}
