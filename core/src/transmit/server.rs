use crate::prelude::{GateResult, PacketSink};
use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};

/// Single-client TCP feed.
///
/// The listener is polled without blocking before every write. A newly
/// accepted client replaces the current one; frames sent while nobody is
/// connected, or that fail to write, are dropped.
pub struct TcpTransmitter {
    listener: TcpListener,
    client: Option<(TcpStream, SocketAddr)>,
}

impl TcpTransmitter {
    pub fn bind(address: &str) -> GateResult<Self> {
        let listener = TcpListener::bind(address)?;
        listener.set_nonblocking(true)?;
        log::info!("listening for gate clients on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            client: None,
        })
    }

    pub fn local_addr(&self) -> GateResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// Accepts every pending connection, keeping the newest.
    pub fn poll_accept(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(err) = stream.set_nonblocking(false) {
                        log::warn!("client {}: cannot switch to blocking mode: {}", addr, err);
                        continue;
                    }
                    if let Err(err) = stream.set_nodelay(true) {
                        log::warn!("client {}: cannot disable Nagle: {}", addr, err);
                    }
                    if let Some((_, old)) = &self.client {
                        log::info!("client {} replaced by {}", old, addr);
                    } else {
                        log::info!("client connected: {}", addr);
                    }
                    self.client = Some((stream, addr));
                }
                Err(ref err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => {
                    log::error!("accept failed: {}", err);
                    break;
                }
            }
        }
    }
}

impl PacketSink for TcpTransmitter {
    fn send(&mut self, frame: &[u8]) -> GateResult<bool> {
        self.poll_accept();
        let Some((stream, addr)) = self.client.as_mut() else {
            return Ok(false);
        };
        match stream.write_all(frame) {
            Ok(()) => Ok(true),
            Err(err) => {
                log::warn!("client {} dropped: {}", addr, err);
                self.client = None;
                Ok(false)
            }
        }
    }
}
