use std::fmt::{Debug, Display, Formatter};
use anyhow::bail;
use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use crate::sequence_id::SequenceId;
use crate::token::Token;

/// Application defined message tag. Values from [MessageType::FIRST_RESERVED] upwards are used by
///  the protocol itself.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct MessageType(pub u16);

impl MessageType {
    pub const FIRST_RESERVED: MessageType = MessageType(0xFF00);

    pub const HANDSHAKE: MessageType = MessageType(0xFF00);
    pub const TOKEN: MessageType = MessageType(0xFF01);
    pub const ACK: MessageType = MessageType(0xFF02);

    pub fn is_reserved(&self) -> bool {
        self.0 >= Self::FIRST_RESERVED.0
    }
}

impl Debug for MessageType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::HANDSHAKE => write!(f, "HANDSHAKE"),
            Self::TOKEN => write!(f, "TOKEN"),
            Self::ACK => write!(f, "ACK"),
            MessageType(raw) => write!(f, "MessageType({})", raw),
        }
    }
}

impl Display for MessageType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    struct ModeFlags: u8 {
        const RELIABLE = 0b001;
        const SEQUENCED = 0b010;
        const ORDERED = 0b100;
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Delivery {
    /// handed to the application as it arrives
    Unordered,
    /// messages older than the newest delivered message of the same type are dropped
    Sequenced,
    /// messages are buffered until all their predecessors were delivered
    Ordered,
}

/// Delivery mode of a message. 'Reliable' is orthogonal to the delivery order: it only means
///  that the receiver sends an ACK.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Mode {
    pub reliable: bool,
    pub delivery: Delivery,
}

impl Mode {
    pub const NONE: Mode = Mode { reliable: false, delivery: Delivery::Unordered };
    pub const RELIABLE: Mode = Mode { reliable: true, delivery: Delivery::Unordered };
    pub const SEQUENCED: Mode = Mode { reliable: false, delivery: Delivery::Sequenced };
    pub const ORDERED: Mode = Mode { reliable: false, delivery: Delivery::Ordered };
    pub const RELIABLE_SEQUENCED: Mode = Mode { reliable: true, delivery: Delivery::Sequenced };
    pub const RELIABLE_ORDERED: Mode = Mode { reliable: true, delivery: Delivery::Ordered };

    fn to_flags(self) -> ModeFlags {
        let mut flags = match self.delivery {
            Delivery::Unordered => ModeFlags::empty(),
            Delivery::Sequenced => ModeFlags::SEQUENCED,
            Delivery::Ordered => ModeFlags::ORDERED,
        };
        flags.set(ModeFlags::RELIABLE, self.reliable);
        flags
    }

    fn from_flags(raw: u8) -> anyhow::Result<Mode> {
        let Some(flags) = ModeFlags::from_bits(raw) else {
            bail!("unsupported mode flags {:08b}", raw);
        };

        let delivery = match (flags.contains(ModeFlags::SEQUENCED), flags.contains(ModeFlags::ORDERED)) {
            (false, false) => Delivery::Unordered,
            (true, false) => Delivery::Sequenced,
            (false, true) => Delivery::Ordered,
            (true, true) => bail!("mode flags sequenced and ordered are mutually exclusive"),
        };

        Ok(Mode {
            reliable: flags.contains(ModeFlags::RELIABLE),
            delivery,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageHeader {
    pub message_type: MessageType,
    pub mode: Mode,
    /// assigned by the sending side when the message is sent
    pub sequence_id: SequenceId,
    /// `None` only for HANDSHAKE messages
    pub token: Option<Token>,
}

impl MessageHeader {
    pub const PROTOCOL_VERSION_1: u8 = 0;
    pub const SERIALIZED_LEN: usize = 10;

    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_u8(Self::PROTOCOL_VERSION_1);
        buf.put_u16(self.message_type.0);
        buf.put_u8(self.mode.to_flags().bits());
        buf.put_u16(self.sequence_id.to_raw());
        buf.put_u32(self.token.map(|t| t.to_raw()).unwrap_or(0));
    }

    /// reads the token of a serialized message without parsing the rest of the header
    pub fn peek_token(buf: &[u8]) -> Option<Token> {
        if buf.len() < Self::SERIALIZED_LEN {
            return None;
        }
        let mut token_buf = &buf[6..Self::SERIALIZED_LEN];
        Token::from_raw(token_buf.get_u32())
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<MessageHeader> {
        if buf.remaining() < Self::SERIALIZED_LEN {
            bail!("incomplete message header: {} bytes", buf.remaining());
        }

        let protocol_version = buf.get_u8();
        if protocol_version != Self::PROTOCOL_VERSION_1 {
            bail!("unsupported protocol version {}", protocol_version);
        }

        let message_type = MessageType(buf.get_u16());
        let mode = Mode::from_flags(buf.get_u8())?;
        let sequence_id = SequenceId::from_raw(buf.get_u16());
        let token = Token::from_raw(buf.get_u32());

        Ok(MessageHeader {
            message_type,
            mode,
            sequence_id,
            token,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub payload: Bytes,
}

impl Message {
    /// Creates a message for sending. Sequence id and token are filled in when the message is
    ///  sent through a connection.
    pub fn new(message_type: MessageType, mode: Mode, payload: impl Into<Bytes>) -> Message {
        Message {
            header: MessageHeader {
                message_type,
                mode,
                sequence_id: SequenceId::ZERO,
                token: None,
            },
            payload: payload.into(),
        }
    }

    pub fn handshake() -> Message {
        Message::new(MessageType::HANDSHAKE, Mode::NONE, Bytes::new())
    }

    pub fn message_type(&self) -> MessageType {
        self.header.message_type
    }

    pub fn mode(&self) -> Mode {
        self.header.mode
    }

    pub fn sequence_id(&self) -> SequenceId {
        self.header.sequence_id
    }

    pub fn token(&self) -> Option<Token> {
        self.header.token
    }

    pub fn serialized_len(&self) -> usize {
        MessageHeader::SERIALIZED_LEN + self.payload.len()
    }

    pub fn ser(&self, buf: &mut BytesMut) {
        self.header.ser(buf);
        buf.put_slice(&self.payload);
    }

    pub fn deser(mut buf: &[u8]) -> anyhow::Result<Message> {
        let header = MessageHeader::deser(&mut buf)?;
        Ok(Message {
            header,
            payload: Bytes::copy_from_slice(buf),
        })
    }
}

/// The payload of an ACK message, identifying the acknowledged message
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AckPayload {
    pub acked_type: MessageType,
    pub acked_id: SequenceId,
}

impl AckPayload {
    pub const SERIALIZED_LEN: usize = 4;

    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_u16(self.acked_type.0);
        buf.put_u16(self.acked_id.to_raw());
    }

    pub fn deser(mut buf: &[u8]) -> anyhow::Result<AckPayload> {
        if buf.remaining() < Self::SERIALIZED_LEN {
            bail!("incomplete ACK payload: {} bytes", buf.remaining());
        }
        Ok(AckPayload {
            acked_type: MessageType(buf.get_u16()),
            acked_id: SequenceId::from_raw(buf.get_u16()),
        })
    }

    pub fn from_message(message: &Message) -> anyhow::Result<AckPayload> {
        if message.message_type() != MessageType::ACK {
            bail!("not an ACK message: {:?}", message.message_type());
        }
        Self::deser(&message.payload)
    }
}
