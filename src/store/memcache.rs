//! Memcached text protocol transport
//!
//! Only the `set` command is needed:
//!
//! ```text
//! set <key> 0 0 <bytes>\r\n
//! <data>\r\n
//! ```
//!
//! The server answers `STORED\r\n` on success. Any other reply line
//! (`NOT_STORED`, `ERROR`, `CLIENT_ERROR ...`, `SERVER_ERROR ...`) counts
//! as a failed write.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::{Connection, Connector, StoreError};

/// Opens TCP connections to memcached shards
#[derive(Debug, Clone, Default)]
pub struct MemcacheConnector {
    io_timeout: Option<Duration>,
}

impl MemcacheConnector {
    pub fn new(io_timeout: Option<Duration>) -> Self {
        Self { io_timeout }
    }
}

impl Connector for MemcacheConnector {
    fn connect(&self, addr: &str) -> Result<Box<dyn Connection>, StoreError> {
        let stream = open_stream(addr, self.io_timeout).map_err(|source| StoreError::Connect {
            addr: addr.to_string(),
            source,
        })?;
        let reader = stream.try_clone().map_err(|source| StoreError::Connect {
            addr: addr.to_string(),
            source,
        })?;

        Ok(Box::new(MemcacheConnection {
            addr: addr.to_string(),
            reader: BufReader::new(reader),
            writer: stream,
        }))
    }
}

fn open_stream(addr: &str, timeout: Option<Duration>) -> io::Result<TcpStream> {
    let stream = match timeout {
        Some(timeout) => {
            let mut last_err = None;
            let mut connected = None;
            for sock_addr in addr.to_socket_addrs()? {
                match TcpStream::connect_timeout(&sock_addr, timeout) {
                    Ok(stream) => {
                        connected = Some(stream);
                        break;
                    }
                    Err(e) => last_err = Some(e),
                }
            }
            match connected {
                Some(stream) => stream,
                None => {
                    return Err(last_err.unwrap_or_else(|| {
                        io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing")
                    }))
                }
            }
        }
        None => TcpStream::connect(addr)?,
    };

    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// One open link to a memcached server
pub struct MemcacheConnection {
    addr: String,
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl MemcacheConnection {
    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            addr: self.addr.clone(),
            source,
        }
    }
}

impl Connection for MemcacheConnection {
    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut request = Vec::with_capacity(key.len() + value.len() + 32);
        request.extend_from_slice(format!("set {} 0 0 {}\r\n", key, value.len()).as_bytes());
        request.extend_from_slice(value);
        request.extend_from_slice(b"\r\n");

        self.writer
            .write_all(&request)
            .and_then(|_| self.writer.flush())
            .map_err(|e| self.io_error(e))?;

        let mut reply = String::new();
        let read = self
            .reader
            .read_line(&mut reply)
            .map_err(|e| self.io_error(e))?;
        if read == 0 {
            return Err(StoreError::Closed {
                addr: self.addr.clone(),
            });
        }

        match reply.trim_end() {
            "STORED" => Ok(()),
            other => Err(StoreError::Rejected {
                addr: self.addr.clone(),
                reply: other.to_string(),
            }),
        }
    }
}
