//! TCP on top of the reactor.
//!
//! Every type takes the reactor explicitly; nothing is looked up from thread-local state.

use mio::Interest;
use std::future::{Future, poll_fn};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::io::PollEvented;
use crate::reactor::Reactor;

pub struct TcpListener {
    io: PollEvented<mio::net::TcpListener>,
}

impl TcpListener {
    pub fn bind(addr: SocketAddr, reactor: &Arc<Reactor>) -> io::Result<Self> {
        let net = mio::net::TcpListener::bind(addr)?;
        let io = PollEvented::new(net, Interest::READABLE, reactor)?;
        Ok(Self { io })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.io.get_ref().local_addr()
    }

    pub fn accept(&self) -> AcceptFuture<'_> {
        AcceptFuture { listener: self }
    }
}

/// The leaf future for accept.
pub struct AcceptFuture<'a> {
    listener: &'a TcpListener,
}

impl Future for AcceptFuture<'_> {
    type Output = io::Result<(TcpStream, SocketAddr)>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let io = &self.listener.io;
        match io.poll_io(cx, Interest::READABLE, |listener| listener.accept()) {
            Poll::Ready(Ok((stream, addr))) => {
                // The accepted stream gets its own token for both directions
                let stream = TcpStream::from_mio(stream, io.reactor())?;
                Poll::Ready(Ok((stream, addr)))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => Poll::Pending,
        }
    }
}

pub struct TcpStream {
    io: PollEvented<mio::net::TcpStream>,
}

impl TcpStream {
    fn from_mio(stream: mio::net::TcpStream, reactor: &Arc<Reactor>) -> io::Result<Self> {
        let io = PollEvented::new(stream, Interest::READABLE | Interest::WRITABLE, reactor)?;
        Ok(Self { io })
    }

    /// Opens a connection, resolving once the handshake has finished.
    pub async fn connect(addr: SocketAddr, reactor: &Arc<Reactor>) -> io::Result<TcpStream> {
        let stream = Self::from_mio(mio::net::TcpStream::connect(addr)?, reactor)?;
        poll_fn(|cx| {
            stream.io.poll_io(cx, Interest::WRITABLE, |s| {
                if let Some(e) = s.take_error()? {
                    return Err(e);
                }
                match s.peer_addr() {
                    Ok(_) => Ok(()),
                    Err(e) if e.kind() == io::ErrorKind::NotConnected => {
                        Err(io::ErrorKind::WouldBlock.into())
                    }
                    Err(e) => Err(e),
                }
            })
        })
        .await?;
        Ok(stream)
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.io.get_ref().peer_addr()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.io.get_ref().local_addr()
    }

    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        self.io.get_ref().shutdown(how)
    }

    pub fn read<'a>(&'a self, buf: &'a mut [u8]) -> ReadFuture<'a> {
        ReadFuture { socket: self, buf }
    }

    pub fn write<'a>(&'a self, buf: &'a [u8]) -> WriteFuture<'a> {
        WriteFuture { socket: self, buf }
    }

    pub async fn write_all(&self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.write(buf).await? {
                0 => return Err(io::ErrorKind::WriteZero.into()),
                n => buf = &buf[n..],
            }
        }
        Ok(())
    }

    /// Reads until the peer closes its side, appending to `buf`.
    pub fn read_to_end<'a>(&'a self, buf: &'a mut Vec<u8>) -> ReadToEnd<'a> {
        ReadToEnd {
            socket: self,
            buf,
            read: 0,
        }
    }
}

/// The leaf future for read
pub struct ReadFuture<'a> {
    socket: &'a TcpStream,
    buf: &'a mut [u8],
}

impl Future for ReadFuture<'_> {
    type Output = io::Result<usize>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let buf = &mut *this.buf;
        this.socket
            .io
            .poll_io(cx, Interest::READABLE, |mut s| s.read(buf))
    }
}

/// The leaf future for write
pub struct WriteFuture<'a> {
    socket: &'a TcpStream,
    buf: &'a [u8],
}

impl Future for WriteFuture<'_> {
    type Output = io::Result<usize>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let buf = self.buf;
        self.socket
            .io
            .poll_io(cx, Interest::WRITABLE, |mut s| s.write(buf))
    }
}

/// Reads a stream to completion.
///
/// Each poll drains whatever the socket holds; the first `WouldBlock` parks the task at the
/// reactor and a read of zero bytes completes with the total number of bytes read.
pub struct ReadToEnd<'a> {
    socket: &'a TcpStream,
    buf: &'a mut Vec<u8>,
    read: usize,
}

impl Future for ReadToEnd<'_> {
    type Output = io::Result<usize>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut chunk = [0u8; 4096];
        loop {
            match this
                .socket
                .io
                .poll_io(cx, Interest::READABLE, |mut s| s.read(&mut chunk))
            {
                Poll::Ready(Ok(0)) => return Poll::Ready(Ok(this.read)),
                Poll::Ready(Ok(n)) => {
                    this.buf.extend_from_slice(&chunk[..n]);
                    this.read += n;
                }
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
