//! Raw TCP/TLS transport to a single Redis endpoint
//!
//! The transport knows nothing about commands beyond RESP framing: it
//! writes pre-encoded buffers and decodes replies one at a time, which
//! is what the pipelined transaction layer above needs.

use std::io::{self, BufReader, BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::config::{AuthConfig, StoreConfig, TlsConfig};
use crate::utils::{decode_value, RespEncoder, RespValue, Result, StoreError};

/// One established connection, plain TCP or TLS.
///
/// TCP splits into separate buffered reader/writer halves; TLS keeps the
/// stream inside a single `BufReader` (writes go through `get_mut`) so
/// bytes buffered between pipelined replies are never lost.
#[derive(Debug)]
pub enum RawConnection {
    Tcp {
        writer: BufWriter<TcpStream>,
        reader: BufReader<TcpStream>,
    },
    #[cfg(feature = "native-tls-backend")]
    Tls {
        stream: BufReader<native_tls::TlsStream<TcpStream>>,
    },
}

impl RawConnection {
    fn connect_stream(
        host: &str,
        port: u16,
        connect_timeout: Option<Duration>,
        command_timeout: Option<Duration>,
    ) -> io::Result<TcpStream> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address resolved"))?;

        let stream = match connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout)?,
            None => TcpStream::connect(addr)?,
        };

        stream.set_nodelay(true).ok();
        stream.set_read_timeout(command_timeout)?;
        stream.set_write_timeout(command_timeout)?;
        Ok(stream)
    }

    /// Open a plain TCP connection.
    pub fn connect_tcp(
        host: &str,
        port: u16,
        connect_timeout: Option<Duration>,
        command_timeout: Option<Duration>,
    ) -> io::Result<Self> {
        let stream = Self::connect_stream(host, port, connect_timeout, command_timeout)?;
        let writer = BufWriter::with_capacity(16 * 1024, stream.try_clone()?);
        let reader = BufReader::with_capacity(16 * 1024, stream);
        Ok(RawConnection::Tcp { writer, reader })
    }

    /// Open a TLS connection and complete the handshake.
    #[cfg(feature = "native-tls-backend")]
    pub fn connect_tls(
        host: &str,
        port: u16,
        connect_timeout: Option<Duration>,
        command_timeout: Option<Duration>,
        tls: &TlsConfig,
    ) -> io::Result<Self> {
        use native_tls::{Certificate, Identity, TlsConnector};

        let tls_err = |what: String| io::Error::new(io::ErrorKind::Other, what);

        let mut builder = TlsConnector::builder();

        if let Some(ref bundle) = tls.ca_bundle {
            let pem = std::fs::read(bundle)?;
            let cert = Certificate::from_pem(&pem)
                .map_err(|e| tls_err(format!("invalid CA bundle {}: {}", bundle.display(), e)))?;
            builder.add_root_certificate(cert);
        }

        if let Some(ref dir) = tls.ca_directory {
            for entry in std::fs::read_dir(dir)? {
                let path = entry?.path();
                if !path.is_file() {
                    continue;
                }
                let pem = std::fs::read(&path)?;
                match Certificate::from_pem(&pem) {
                    Ok(cert) => {
                        builder.add_root_certificate(cert);
                    }
                    Err(e) => {
                        debug!("skipping non-certificate file {}: {}", path.display(), e);
                    }
                }
            }
        }

        if let (Some(cert_path), Some(key_path)) = (&tls.client_cert, &tls.client_key) {
            let cert_pem = std::fs::read(cert_path)?;
            let key_pem = std::fs::read(key_path)?;
            let identity = Identity::from_pkcs8(&cert_pem, &key_pem)
                .map_err(|e| tls_err(format!("invalid client identity: {}", e)))?;
            builder.identity(identity);
        }

        let connector = builder
            .build()
            .map_err(|e| tls_err(format!("cannot build TLS connector: {}", e)))?;

        let tcp = Self::connect_stream(host, port, connect_timeout, command_timeout)?;
        let stream = connector
            .connect(host, tcp)
            .map_err(|e| tls_err(format!("TLS handshake with {}:{} failed: {}", host, port, e)))?;

        Ok(RawConnection::Tls {
            stream: BufReader::with_capacity(16 * 1024, stream),
        })
    }

    /// Write an encoded command buffer and flush it to the server.
    pub fn send(&mut self, encoder: &RespEncoder) -> io::Result<()> {
        match self {
            RawConnection::Tcp { writer, .. } => {
                writer.write_all(encoder.as_bytes())?;
                writer.flush()
            }
            #[cfg(feature = "native-tls-backend")]
            RawConnection::Tls { stream } => {
                let inner = stream.get_mut();
                inner.write_all(encoder.as_bytes())?;
                inner.flush()
            }
        }
    }

    /// Read the next pipelined reply.
    pub fn read_reply(&mut self) -> io::Result<RespValue> {
        match self {
            RawConnection::Tcp { reader, .. } => decode_value(reader),
            #[cfg(feature = "native-tls-backend")]
            RawConnection::Tls { stream } => decode_value(stream),
        }
    }

    /// Round-trip a single command.
    pub fn roundtrip(&mut self, encoder: &RespEncoder) -> io::Result<RespValue> {
        self.send(encoder)?;
        self.read_reply()
    }
}

/// Connects and authenticates `RawConnection`s from one shared config.
#[derive(Clone)]
#[derive(Debug)]
pub struct ConnectionFactory {
    connect_timeout: Option<Duration>,
    command_timeout: Option<Duration>,
    non_blocking: bool,
    auth: Option<AuthConfig>,
    tls: Option<TlsConfig>,
}

fn millis(value: u64) -> Option<Duration> {
    if value == 0 {
        None
    } else {
        Some(Duration::from_millis(value))
    }
}

impl ConnectionFactory {
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            connect_timeout: millis(config.connect_timeout_ms),
            command_timeout: millis(config.command_timeout_ms),
            non_blocking: config.non_blocking,
            auth: config.auth.clone(),
            tls: config.tls.clone(),
        }
    }

    /// Connect to `host:port`, complete TLS if configured, authenticate.
    ///
    /// Every failure here is a [`StoreError::ConnectionLost`]: the caller
    /// treats an unbuildable connection the same as a dropped one.
    pub fn create(&self, host: &str, port: u16) -> Result<RawConnection> {
        if self.non_blocking {
            // Advisory only: the transport uses blocking sockets with
            // timeouts.
            debug!("non-blocking connect requested for {}:{}; using timeouts instead", host, port);
        }

        let lost = |what: String| StoreError::ConnectionLost(what);

        let mut conn = match &self.tls {
            #[cfg(feature = "native-tls-backend")]
            Some(tls) => RawConnection::connect_tls(
                host,
                port,
                self.connect_timeout,
                self.command_timeout,
                tls,
            )
            .map_err(|e| lost(format!("cannot connect to {}:{} (tls): {}", host, port, e)))?,
            #[cfg(not(feature = "native-tls-backend"))]
            Some(_) => {
                return Err(lost(format!(
                    "TLS requested for {}:{} but TLS support was not compiled in",
                    host, port
                )));
            }
            None => {
                RawConnection::connect_tcp(host, port, self.connect_timeout, self.command_timeout)
                    .map_err(|e| lost(format!("cannot connect to {}:{}: {}", host, port, e)))?
            }
        };

        if let Some(ref auth) = self.auth {
            let mut encoder = RespEncoder::with_capacity(128);
            match auth.username {
                Some(ref user) => {
                    debug!("ACL-style authentication at {}:{} as {}", host, port, user);
                    encoder.push_command(&[b"AUTH", user.as_bytes(), auth.password.as_bytes()]);
                }
                None => {
                    debug!("default-style authentication at {}:{}", host, port);
                    encoder.push_command(&[b"AUTH", auth.password.as_bytes()]);
                }
            }

            let reply = conn
                .roundtrip(&encoder)
                .map_err(|e| lost(format!("AUTH at {}:{} failed: {}", host, port, e)))?;
            match reply {
                RespValue::SimpleString(ref s) if s == "OK" => {}
                RespValue::Error(e) => {
                    return Err(lost(format!("AUTH at {}:{} rejected: {}", host, port, e)));
                }
                other => {
                    return Err(lost(format!(
                        "unexpected AUTH reply from {}:{}: {}",
                        host,
                        port,
                        other.type_name()
                    )));
                }
            }
        }

        Ok(conn)
    }
}
