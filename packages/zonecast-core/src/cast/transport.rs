//! Transport abstraction for the receiver link.
//!
//! The session engine never touches sockets: it talks to a [`Connection`]
//! (an outbound envelope sink plus an inbound envelope stream) obtained from
//! a [`Transport`]. Production uses [`TlsTransport`], which speaks the CASTV2
//! framing over TLS; tests drive the engine through an in-memory fake built
//! from the same channel pair.

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use super::codec::{map_io_error, read_envelope, write_envelope};
use super::CastError;

/// Buffered envelopes per direction before backpressure kicks in.
const CHANNEL_CAPACITY: usize = 64;

/// A single logical message on a cast sub-channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub source: String,
    pub destination: String,
    pub namespace: String,
    pub payload: serde_json::Value,
}

/// Live link to a receiver.
pub struct Connection {
    outbound: mpsc::Sender<Envelope>,
    inbound: mpsc::Receiver<Envelope>,
}

impl Connection {
    /// Builds a connection from raw channel halves. This is also how test
    /// transports hand a scripted wire to the session engine.
    #[must_use]
    pub fn from_channels(
        outbound: mpsc::Sender<Envelope>,
        inbound: mpsc::Receiver<Envelope>,
    ) -> Self {
        Self { outbound, inbound }
    }

    /// Splits the connection into its send and receive halves.
    #[must_use]
    pub fn split(self) -> (mpsc::Sender<Envelope>, mpsc::Receiver<Envelope>) {
        (self.outbound, self.inbound)
    }
}

/// Something that can open a connection to a receiver endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, address: &str, port: u16) -> Result<Connection, CastError>;
}

/// A sub-channel bound to a fixed (source, destination, namespace) triple.
///
/// Cloning is cheap; all handles of one connection share the writer.
#[derive(Clone)]
pub struct ChannelHandle {
    source: String,
    destination: String,
    namespace: String,
    outbound: mpsc::Sender<Envelope>,
}

impl ChannelHandle {
    #[must_use]
    pub fn new(
        source: &str,
        destination: &str,
        namespace: &str,
        outbound: mpsc::Sender<Envelope>,
    ) -> Self {
        Self {
            source: source.to_string(),
            destination: destination.to_string(),
            namespace: namespace.to_string(),
            outbound,
        }
    }

    /// Sends a payload on this channel.
    ///
    /// Fails with a broken-pipe-class error when the writer task has died,
    /// which the session engine's recovery policy treats like any other
    /// severed transport.
    pub async fn send(&self, payload: serde_json::Value) -> Result<(), CastError> {
        self.outbound
            .send(Envelope {
                source: self.source.clone(),
                destination: self.destination.clone(),
                namespace: self.namespace.clone(),
                payload,
            })
            .await
            .map_err(|_| CastError::TransportClosed("transport writer gone".into()))
    }

    #[must_use]
    pub fn destination(&self) -> &str {
        &self.destination
    }
}

/// Production transport: TLS over TCP with CASTV2 framing.
///
/// Receivers present self-signed device certificates, so certificate and
/// hostname verification are disabled, exactly as every cast sender does.
pub struct TlsTransport {
    connector: tokio_native_tls::TlsConnector,
}

impl TlsTransport {
    pub fn new() -> Result<Self, CastError> {
        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|e| CastError::Connect(format!("TLS setup failed: {e}")))?;
        Ok(Self {
            connector: tokio_native_tls::TlsConnector::from(connector),
        })
    }
}

#[async_trait]
impl Transport for TlsTransport {
    async fn connect(&self, address: &str, port: u16) -> Result<Connection, CastError> {
        let tcp = TcpStream::connect((address, port))
            .await
            .map_err(map_io_error)?;
        let tls = self
            .connector
            .connect(address, tcp)
            .await
            .map_err(|e| CastError::Connect(format!("TLS handshake failed: {e}")))?;
        log::debug!("[Cast] TLS link established to {}:{}", address, port);

        let (read_half, write_half) = tokio::io::split(tls);
        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);

        tokio::spawn(run_writer(write_half, outbound_rx));
        tokio::spawn(run_reader(read_half, inbound_tx));

        Ok(Connection::from_channels(outbound_tx, inbound_rx))
    }
}

/// Drains outbound envelopes onto the socket until the session drops its
/// sender or a write fails.
async fn run_writer<W>(mut writer: W, mut outbound: mpsc::Receiver<Envelope>)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(envelope) = outbound.recv().await {
        if let Err(err) = write_envelope(&mut writer, &envelope).await {
            log::warn!("[Cast] transport write failed: {}", err);
            break;
        }
    }
    // Dropping the receiver makes every pending ChannelHandle send fail with
    // a broken-pipe-class error.
    outbound.close();
}

/// Pumps inbound frames to the session until EOF, a read error, or the
/// session dropping its receiver.
async fn run_reader<R>(mut reader: R, inbound: mpsc::Sender<Envelope>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    loop {
        match read_envelope(&mut reader).await {
            Ok(Some(envelope)) => {
                if inbound.send(envelope).await.is_err() {
                    break;
                }
            }
            Ok(None) => {
                log::debug!("[Cast] receiver closed the connection");
                break;
            }
            Err(err) => {
                log::warn!("[Cast] transport read failed: {}", err);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn channel_handle_stamps_addressing_onto_envelopes() {
        let (tx, mut rx) = mpsc::channel(4);
        let channel = ChannelHandle::new("sender-0", "transport-7", "urn:x-cast:test", tx);
        channel.send(json!({"type": "CONNECT"})).await.unwrap();

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.source, "sender-0");
        assert_eq!(envelope.destination, "transport-7");
        assert_eq!(envelope.namespace, "urn:x-cast:test");
        assert_eq!(envelope.payload, json!({"type": "CONNECT"}));
    }

    #[tokio::test]
    async fn send_after_writer_death_is_a_transport_closed_error() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let channel = ChannelHandle::new("sender-0", "receiver-0", "urn:x-cast:test", tx);
        assert!(matches!(
            channel.send(json!({})).await,
            Err(CastError::TransportClosed(_))
        ));
    }
}
