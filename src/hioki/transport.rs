use crate::error::LcrError;
use log::debug;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

/// Line terminator of the IM3536 command protocol (carriage return only)
pub const TERMINATOR: u8 = b'\r';

/// Synchronous request/response channel to the instrument.
///
/// Implementations own framing only; timing, retries and verification are
/// layered on top by [`LcrClient`](super::LcrClient).
pub trait Transport {
    /// Send one command line without reading a reply
    fn write(&mut self, line: &str) -> Result<(), LcrError>;

    /// Send one command line and read one terminated reply line
    fn ask(&mut self, line: &str) -> Result<String, LcrError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, line: &str) -> Result<(), LcrError> {
        (**self).write(line)
    }

    fn ask(&mut self, line: &str) -> Result<String, LcrError> {
        (**self).ask(line)
    }
}

/// Connection configuration for the instrument's LAN command port.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use rusty_lcr::ConnectionConfig;
///
/// // Slow measurement speeds with averaging need a longer read timeout
/// let config = ConnectionConfig {
///     read_timeout: Duration::from_secs(60),
///     ..ConnectionConfig::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for establishing the initial TCP connection
    pub connect_timeout: Duration,
    /// Timeout for reading one reply line
    pub read_timeout: Duration,
    /// Timeout for writing one command line
    pub write_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
        }
    }
}

/// Blocking TCP transport with carriage-return framing.
pub struct TcpTransport {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl TcpTransport {
    pub fn connect(address: &str, port: u16, config: &ConnectionConfig) -> Result<Self, LcrError> {
        let socket_addr: SocketAddr = format!("{address}:{port}")
            .parse()
            .map_err(|_| LcrError::InvalidAddress(address.to_string()))?;

        debug!("Connecting to instrument at {socket_addr}");

        let stream = TcpStream::connect_timeout(&socket_addr, config.connect_timeout)
            .map_err(|e| io_error(e, format!("Failed to connect to {socket_addr}")))?;

        Self::from_stream(stream, config)
    }

    pub fn from_stream(stream: TcpStream, config: &ConnectionConfig) -> Result<Self, LcrError> {
        stream.set_read_timeout(Some(config.read_timeout))?;
        stream.set_write_timeout(Some(config.write_timeout))?;
        stream.set_nodelay(true)?;

        let writer = stream
            .try_clone()
            .map_err(|e| io_error(e, "Cloning stream handle".to_string()))?;

        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }

    fn read_line(&mut self) -> Result<String, LcrError> {
        let mut buf = Vec::new();
        let n = self
            .reader
            .read_until(TERMINATOR, &mut buf)
            .map_err(|e| io_error(e, "Reading reply".to_string()))?;

        if n == 0 {
            return Err(LcrError::Io {
                source: std::io::ErrorKind::UnexpectedEof.into(),
                context: "Instrument closed the connection".to_string(),
            });
        }

        // A CR LF terminated reply leaves its LF at the head of the next line
        let line = String::from_utf8_lossy(&buf);
        Ok(line.trim_matches(['\r', '\n']).to_string())
    }
}

impl Transport for TcpTransport {
    fn write(&mut self, line: &str) -> Result<(), LcrError> {
        let mut frame = Vec::with_capacity(line.len() + 1);
        frame.extend_from_slice(line.as_bytes());
        frame.push(TERMINATOR);

        self.writer
            .write_all(&frame)
            .and_then(|_| self.writer.flush())
            .map_err(|e| io_error(e, format!("Writing '{line}'")))
    }

    fn ask(&mut self, line: &str) -> Result<String, LcrError> {
        self.write(line)?;
        self.read_line()
    }
}

fn io_error(source: std::io::Error, context: String) -> LcrError {
    match source.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => LcrError::Timeout,
        _ => LcrError::Io { source, context },
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::Transport;
    use crate::error::LcrError;
    use std::collections::{HashMap, VecDeque};
    use std::time::Instant;

    /// In-memory instrument answering queries from per-command reply queues.
    ///
    /// The last queued reply for a query is sticky, so a single reply models an
    /// instrument that always answers the same way.
    #[derive(Debug, Default)]
    pub struct ScriptedTransport {
        replies: HashMap<String, VecDeque<String>>,
        pub lines: Vec<(Instant, String)>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(mut self, query: &str, reply: &str) -> Self {
            self.replies
                .entry(query.to_string())
                .or_default()
                .push_back(reply.to_string());
            self
        }

        pub fn replies(mut self, query: &str, replies: &[&str]) -> Self {
            for reply in replies {
                self = self.reply(query, reply);
            }
            self
        }

        /// Every line sent, writes and queries alike, in order
        pub fn sent(&self) -> Vec<&str> {
            self.lines.iter().map(|(_, line)| line.as_str()).collect()
        }
    }

    impl Transport for ScriptedTransport {
        fn write(&mut self, line: &str) -> Result<(), LcrError> {
            self.lines.push((Instant::now(), line.to_string()));
            Ok(())
        }

        fn ask(&mut self, line: &str) -> Result<String, LcrError> {
            self.lines.push((Instant::now(), line.to_string()));
            let queue = self.replies.get_mut(line).ok_or(LcrError::Timeout)?;
            if queue.len() > 1 {
                queue.pop_front().ok_or(LcrError::Timeout)
            } else {
                queue.front().cloned().ok_or(LcrError::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;

    fn loopback_pair() -> (TcpTransport, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = thread::spawn(move || listener.accept().unwrap().0);
        let transport =
            TcpTransport::connect("127.0.0.1", port, &ConnectionConfig::default()).unwrap();
        (transport, accept.join().unwrap())
    }

    fn read_command(reader: &mut BufReader<TcpStream>) -> String {
        let mut buf = Vec::new();
        reader.read_until(b'\r', &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_tcp_framing_uses_carriage_return() {
        let (mut transport, peer) = loopback_pair();
        let mut writer = peer.try_clone().unwrap();
        let mut reader = BufReader::new(peer);

        transport.write("*RST").unwrap();
        assert_eq!(read_command(&mut reader), "*RST\r");

        let server = thread::spawn(move || {
            assert_eq!(read_command(&mut reader), "*IDN?\r");
            writer.write_all(b"HIOKI,IM3536,123456789,V1.02\r\n").unwrap();
            assert_eq!(read_command(&mut reader), "*OPC?\r");
            writer.write_all(b"1\r\n").unwrap();
        });

        assert_eq!(transport.ask("*IDN?").unwrap(), "HIOKI,IM3536,123456789,V1.02");
        assert_eq!(transport.ask("*OPC?").unwrap(), "1");
        server.join().unwrap();
    }

    #[test]
    fn test_tcp_closed_connection_is_an_error() {
        let (mut transport, peer) = loopback_pair();
        drop(peer);
        let result = transport.ask("*IDN?");
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_address() {
        let result = TcpTransport::connect("not an ip", 3500, &ConnectionConfig::default());
        assert!(matches!(result, Err(LcrError::InvalidAddress(_))));
    }
}
