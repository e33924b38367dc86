//! NSQ TCP protocol (`V2`) codec.
//!
//! Server frames are `[size: u32][frame type: i32][data]`, big-endian, where
//! `size` covers the type and data. Message frames carry
//! `[timestamp: i64][attempts: u16][id: 16 bytes][body]`. Client commands
//! are a newline-terminated line, optionally followed by a sized body.

use std::fmt;
use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use stackdemo_core::{ChannelName, TopicName};
use tokio_util::codec::{Decoder, Encoder};

/// Sent once, before any command, to select protocol version 2.
pub const MAGIC_V2: &[u8] = b"  V2";
/// Response body nsqd sends periodically; must be answered with `NOP`.
pub const HEARTBEAT: &[u8] = b"_heartbeat_";
/// Response body acknowledging `IDENTIFY` and `SUB`.
pub const OK: &[u8] = b"OK";
/// Response body acknowledging `CLS`.
pub const CLOSE_WAIT: &[u8] = b"CLOSE_WAIT";

const FRAME_TYPE_RESPONSE: i32 = 0;
const FRAME_TYPE_ERROR: i32 = 1;
const FRAME_TYPE_MESSAGE: i32 = 2;

const SIZE_LEN: usize = 4;
const FRAME_TYPE_LEN: usize = 4;
const MESSAGE_HEADER_LEN: usize = 8 + 2 + MESSAGE_ID_LEN;
const MESSAGE_ID_LEN: usize = 16;
/// Frames above this size are rejected rather than buffered.
const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Errors from the wire codec and protocol handshake.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame of {size} bytes exceeds limit")]
    FrameTooLarge { size: usize },
    #[error("frame of {size} bytes is too short")]
    FrameTooShort { size: usize },
    #[error("unknown frame type {0}")]
    UnknownFrameType(i32),
    #[error("nsqd error: {0}")]
    Server(String),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("connection closed by nsqd")]
    ConnectionClosed,
}

/// 16-byte message identifier assigned by nsqd.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId([u8; MESSAGE_ID_LEN]);

impl MessageId {
    #[must_use]
    pub fn new(bytes: [u8; MESSAGE_ID_LEN]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({self})")
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// A delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsqMessage {
    pub id: MessageId,
    /// Publish time in nanoseconds since the Unix epoch.
    pub timestamp: i64,
    /// Delivery attempt number, starting at 1.
    pub attempts: u16,
    pub body: Bytes,
}

/// A frame received from nsqd.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Response(Bytes),
    Error(Bytes),
    Message(NsqMessage),
}

impl Frame {
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Self::Response(body) if body.as_ref() == HEARTBEAT)
    }
}

/// A command sent to nsqd.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Client metadata as a JSON body.
    Identify(Bytes),
    Subscribe { topic: TopicName, channel: ChannelName },
    Ready(u32),
    Finish(MessageId),
    Requeue { id: MessageId, delay: Duration },
    Nop,
    Close,
}

/// Stateless codec for [`Frame`]s in and [`Command`]s out.
#[derive(Debug, Clone, Copy, Default)]
pub struct NsqCodec;

impl Decoder for NsqCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        if src.len() < SIZE_LEN {
            return Ok(None);
        }
        let mut size_bytes = [0u8; SIZE_LEN];
        size_bytes.copy_from_slice(&src[..SIZE_LEN]);
        let size = u32::from_be_bytes(size_bytes) as usize;

        if size < FRAME_TYPE_LEN {
            return Err(ProtocolError::FrameTooShort { size });
        }
        if size > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge { size });
        }
        if src.len() < SIZE_LEN + size {
            src.reserve(SIZE_LEN + size - src.len());
            return Ok(None);
        }

        src.advance(SIZE_LEN);
        let frame_type = src.get_i32();
        let data = src.split_to(size - FRAME_TYPE_LEN).freeze();

        match frame_type {
            FRAME_TYPE_RESPONSE => Ok(Some(Frame::Response(data))),
            FRAME_TYPE_ERROR => Ok(Some(Frame::Error(data))),
            FRAME_TYPE_MESSAGE => decode_message(data, size).map(|m| Some(Frame::Message(m))),
            other => Err(ProtocolError::UnknownFrameType(other)),
        }
    }
}

fn decode_message(mut data: Bytes, size: usize) -> Result<NsqMessage, ProtocolError> {
    if data.len() < MESSAGE_HEADER_LEN {
        return Err(ProtocolError::FrameTooShort { size });
    }
    let timestamp = data.get_i64();
    let attempts = data.get_u16();
    let mut id = [0u8; MESSAGE_ID_LEN];
    data.copy_to_slice(&mut id);
    Ok(NsqMessage {
        id: MessageId(id),
        timestamp,
        attempts,
        body: data,
    })
}

impl Encoder<Command> for NsqCodec {
    type Error = ProtocolError;

    fn encode(&mut self, command: Command, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        match command {
            Command::Identify(body) => {
                dst.put_slice(b"IDENTIFY\n");
                put_sized_body(&body, dst)?;
            }
            Command::Subscribe { topic, channel } => {
                dst.put_slice(format!("SUB {topic} {channel}\n").as_bytes());
            }
            Command::Ready(count) => dst.put_slice(format!("RDY {count}\n").as_bytes()),
            Command::Finish(id) => {
                dst.put_slice(b"FIN ");
                dst.put_slice(id.as_bytes());
                dst.put_u8(b'\n');
            }
            Command::Requeue { id, delay } => {
                dst.put_slice(b"REQ ");
                dst.put_slice(id.as_bytes());
                dst.put_slice(format!(" {}\n", delay.as_millis()).as_bytes());
            }
            Command::Nop => dst.put_slice(b"NOP\n"),
            Command::Close => dst.put_slice(b"CLS\n"),
        }
        Ok(())
    }
}

fn put_sized_body(body: &[u8], dst: &mut BytesMut) -> Result<(), ProtocolError> {
    let size = u32::try_from(body.len())
        .map_err(|_| ProtocolError::FrameTooLarge { size: body.len() })?;
    dst.reserve(SIZE_LEN + body.len());
    dst.put_u32(size);
    dst.put_slice(body);
    Ok(())
}

/// Encodes a server frame. Used by tests that stand in for nsqd.
#[cfg(test)]
pub(crate) fn encode_frame(frame_type: i32, data: &[u8]) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_u32(u32::try_from(data.len() + FRAME_TYPE_LEN).unwrap());
    buf.put_i32(frame_type);
    buf.put_slice(data);
    buf
}

/// Encodes a message frame body. Used by tests that stand in for nsqd.
#[cfg(test)]
pub(crate) fn encode_message(id: &[u8; MESSAGE_ID_LEN], attempts: u16, body: &[u8]) -> BytesMut {
    let mut data = BytesMut::new();
    data.put_i64(1_700_000_000_000_000_000);
    data.put_u16(attempts);
    data.put_slice(id);
    data.put_slice(body);
    encode_frame(FRAME_TYPE_MESSAGE, &data)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &[u8; 16] = b"0123456789abcdef";

    fn encode(command: Command) -> BytesMut {
        let mut buf = BytesMut::new();
        NsqCodec.encode(command, &mut buf).unwrap();
        buf
    }

    #[test]
    fn decodes_response_and_heartbeat() {
        let mut buf = encode_frame(FRAME_TYPE_RESPONSE, OK);
        buf.extend_from_slice(&encode_frame(FRAME_TYPE_RESPONSE, HEARTBEAT));

        let first = NsqCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first, Frame::Response(Bytes::from_static(OK)));
        assert!(!first.is_heartbeat());

        let second = NsqCodec.decode(&mut buf).unwrap().unwrap();
        assert!(second.is_heartbeat());
        assert!(buf.is_empty());
    }

    #[test]
    fn waits_for_complete_frame() {
        let full = encode_message(ID, 1, b"{\"id\":\"1\"}");
        let mut buf = BytesMut::from(&full[..10]);
        assert!(NsqCodec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&full[10..]);
        let Some(Frame::Message(message)) = NsqCodec.decode(&mut buf).unwrap() else {
            panic!("expected a message frame");
        };
        assert_eq!(message.id.as_bytes(), ID);
        assert_eq!(message.attempts, 1);
        assert_eq!(message.timestamp, 1_700_000_000_000_000_000);
        assert_eq!(message.body.as_ref(), b"{\"id\":\"1\"}");
    }

    #[test]
    fn decodes_error_frame() {
        let mut buf = encode_frame(FRAME_TYPE_ERROR, b"E_BAD_TOPIC");
        let frame = NsqCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame, Frame::Error(Bytes::from_static(b"E_BAD_TOPIC")));
    }

    #[test]
    fn rejects_unknown_and_oversized_frames() {
        let mut buf = encode_frame(9, b"");
        assert!(matches!(NsqCodec.decode(&mut buf), Err(ProtocolError::UnknownFrameType(9))));

        let mut buf = BytesMut::new();
        buf.put_u32(u32::try_from(MAX_FRAME_SIZE + 1).unwrap());
        assert!(matches!(NsqCodec.decode(&mut buf), Err(ProtocolError::FrameTooLarge { .. })));

        let mut buf = encode_frame(FRAME_TYPE_MESSAGE, b"short");
        assert!(matches!(NsqCodec.decode(&mut buf), Err(ProtocolError::FrameTooShort { .. })));
    }

    #[test]
    fn encodes_line_commands() {
        let topic = TopicName::new("ini_testing_docker").unwrap();
        let channel = ChannelName::new("ini_channel_docker").unwrap();
        assert_eq!(
            &encode(Command::Subscribe { topic, channel })[..],
            b"SUB ini_testing_docker ini_channel_docker\n"
        );
        assert_eq!(&encode(Command::Ready(50))[..], b"RDY 50\n");
        assert_eq!(&encode(Command::Finish(MessageId::new(*ID)))[..], b"FIN 0123456789abcdef\n");
        assert_eq!(
            &encode(Command::Requeue {
                id: MessageId::new(*ID),
                delay: Duration::from_millis(1500),
            })[..],
            b"REQ 0123456789abcdef 1500\n"
        );
        assert_eq!(&encode(Command::Nop)[..], b"NOP\n");
        assert_eq!(&encode(Command::Close)[..], b"CLS\n");
    }

    #[test]
    fn encodes_identify_with_sized_body() {
        let buf = encode(Command::Identify(Bytes::from_static(b"{}")));
        assert_eq!(&buf[..], b"IDENTIFY\n\x00\x00\x00\x02{}");
    }
}
