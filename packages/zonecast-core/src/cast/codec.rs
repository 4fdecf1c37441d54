//! CASTV2 wire format: 4-byte big-endian length prefix followed by a single
//! protobuf `CastMessage`.
//!
//! The message type is small and stable, so the struct is written out with
//! prost derive attributes instead of generating it from a `.proto` at build
//! time. Payloads on every channel this bridge uses are JSON strings.

use bytes::{Buf, BufMut, BytesMut};
use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::transport::Envelope;
use super::CastError;
use crate::protocol_constants::MAX_FRAME_BYTES;

/// CASTV2_1_0, the only protocol version in existence.
const PROTOCOL_VERSION: i32 = 0;

/// Payload is carried in `payload_utf8`.
const PAYLOAD_TYPE_STRING: i32 = 0;

/// The one message type of the Cast socket protocol.
#[derive(Clone, PartialEq, Message)]
pub struct CastMessage {
    #[prost(int32, tag = "1")]
    pub protocol_version: i32,
    #[prost(string, tag = "2")]
    pub source_id: String,
    #[prost(string, tag = "3")]
    pub destination_id: String,
    #[prost(string, tag = "4")]
    pub namespace: String,
    #[prost(int32, tag = "5")]
    pub payload_type: i32,
    #[prost(string, optional, tag = "6")]
    pub payload_utf8: Option<String>,
    #[prost(bytes = "vec", optional, tag = "7")]
    pub payload_binary: Option<Vec<u8>>,
}

/// Encodes an envelope into a length-prefixed frame.
pub fn encode_frame(envelope: &Envelope) -> Result<BytesMut, CastError> {
    let payload =
        serde_json::to_string(&envelope.payload).map_err(|e| CastError::Codec(e.to_string()))?;
    let message = CastMessage {
        protocol_version: PROTOCOL_VERSION,
        source_id: envelope.source.clone(),
        destination_id: envelope.destination.clone(),
        namespace: envelope.namespace.clone(),
        payload_type: PAYLOAD_TYPE_STRING,
        payload_utf8: Some(payload),
        payload_binary: None,
    };

    let body_len = message.encoded_len();
    if body_len > MAX_FRAME_BYTES {
        return Err(CastError::Codec(format!(
            "frame of {body_len} bytes exceeds the {MAX_FRAME_BYTES} byte wire limit"
        )));
    }
    let mut buf = BytesMut::with_capacity(4 + body_len);
    buf.put_u32(body_len as u32);
    message
        .encode(&mut buf)
        .map_err(|e| CastError::Codec(e.to_string()))?;
    Ok(buf)
}

/// Decodes one frame body into an envelope.
pub fn decode_frame(body: &[u8]) -> Result<Envelope, CastError> {
    let message = CastMessage::decode(body).map_err(|e| CastError::Codec(e.to_string()))?;
    let payload = match message.payload_utf8 {
        Some(text) => {
            serde_json::from_str(&text).map_err(|e| CastError::Codec(e.to_string()))?
        }
        // Binary payloads never appear on the channels this bridge binds.
        None => serde_json::Value::Null,
    };
    Ok(Envelope {
        source: message.source_id,
        destination: message.destination_id,
        namespace: message.namespace,
        payload,
    })
}

/// Writes one envelope to the transport.
pub async fn write_envelope<W>(writer: &mut W, envelope: &Envelope) -> Result<(), CastError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(envelope)?;
    writer.write_all(&frame).await.map_err(map_io_error)?;
    writer.flush().await.map_err(map_io_error)
}

/// Reads the next envelope from the transport.
///
/// Returns `Ok(None)` on a clean end-of-stream at a frame boundary; an EOF in
/// the middle of a frame is a transport error.
pub async fn read_envelope<R>(reader: &mut R) -> Result<Option<Envelope>, CastError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(map_io_error(err)),
    }

    let body_len = (&header[..]).get_u32() as usize;
    if body_len > MAX_FRAME_BYTES {
        return Err(CastError::Codec(format!(
            "inbound frame of {body_len} bytes exceeds the {MAX_FRAME_BYTES} byte wire limit"
        )));
    }

    let mut body = vec![0u8; body_len];
    reader.read_exact(&mut body).await.map_err(map_io_error)?;
    decode_frame(&body).map(Some)
}

/// Maps socket errors into the cast error taxonomy. Broken-pipe-class errors
/// get their own variant because the session recovery policy keys off it.
pub(crate) fn map_io_error(err: std::io::Error) -> CastError {
    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::BrokenPipe
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::UnexpectedEof => CastError::TransportClosed(err.to_string()),
        _ => CastError::Connect(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope() -> Envelope {
        Envelope {
            source: "sender-0".into(),
            destination: "receiver-0".into(),
            namespace: "urn:x-cast:com.google.cast.receiver".into(),
            payload: json!({"type": "GET_STATUS", "requestId": 1}),
        }
    }

    #[tokio::test]
    async fn frame_round_trips_through_the_codec() {
        let frame = encode_frame(&envelope()).unwrap();
        let mut cursor = &frame[..];
        let decoded = read_envelope(&mut cursor).await.unwrap().unwrap();
        assert_eq!(decoded, envelope());
    }

    #[test]
    fn frame_carries_big_endian_length_prefix() {
        let frame = encode_frame(&envelope()).unwrap();
        let body_len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(body_len, frame.len() - 4);
    }

    #[test]
    fn oversized_frame_is_rejected_on_encode() {
        let mut env = envelope();
        env.payload = json!({"blob": "x".repeat(MAX_FRAME_BYTES)});
        assert!(matches!(encode_frame(&env), Err(CastError::Codec(_))));
    }

    #[tokio::test]
    async fn oversized_inbound_length_is_rejected() {
        let mut frame = BytesMut::new();
        frame.put_u32((MAX_FRAME_BYTES + 1) as u32);
        let mut cursor = &frame[..];
        assert!(matches!(
            read_envelope(&mut cursor).await,
            Err(CastError::Codec(_))
        ));
    }

    #[tokio::test]
    async fn clean_eof_reads_as_none() {
        let mut cursor: &[u8] = &[];
        assert!(read_envelope(&mut cursor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn truncated_frame_is_a_transport_error() {
        let frame = encode_frame(&envelope()).unwrap();
        let mut cursor = &frame[..frame.len() - 2];
        assert!(matches!(
            read_envelope(&mut cursor).await,
            Err(CastError::TransportClosed(_))
        ));
    }
}
