//! MQTT 3.1.1 packet types and codec.
//!
//! Decoders never mutate their input and copy topic/payload into owned
//! `Bytes` so packets can outlive the connection's read buffer. Encoders
//! append to a caller-provided `Vec<u8>` and return the bytes written.

use bytes::Bytes;

use crate::error::{ProtocolError, Result};

/// MQTT control packet types (high nibble of the first header byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    Connack = 2,
    Publish = 3,
    Puback = 4,
    Pubrec = 5,
    Pubrel = 6,
    Pubcomp = 7,
    Subscribe = 8,
    Suback = 9,
    Unsubscribe = 10,
    Unsuback = 11,
    Pingreq = 12,
    Pingresp = 13,
    Disconnect = 14,
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(PacketType::Connect),
            2 => Ok(PacketType::Connack),
            3 => Ok(PacketType::Publish),
            4 => Ok(PacketType::Puback),
            5 => Ok(PacketType::Pubrec),
            6 => Ok(PacketType::Pubrel),
            7 => Ok(PacketType::Pubcomp),
            8 => Ok(PacketType::Subscribe),
            9 => Ok(PacketType::Suback),
            10 => Ok(PacketType::Unsubscribe),
            11 => Ok(PacketType::Unsuback),
            12 => Ok(PacketType::Pingreq),
            13 => Ok(PacketType::Pingresp),
            14 => Ok(PacketType::Disconnect),
            _ => Err(ProtocolError::InvalidPacketType(value)),
        }
    }
}

/// Quality of service. The broker grants and delivers at QoS 0 only; higher
/// levels are parsed off the wire so the packet-id field lands in the right
/// place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = ProtocolError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(ProtocolError::MalformedPacket(format!(
                "invalid QoS: {}",
                value
            ))),
        }
    }
}

/// CONNACK return codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnackCode {
    Accepted = 0,
    UnacceptableProtocolVersion = 1,
    IdentifierRejected = 2,
    ServerUnavailable = 3,
    BadUsernamePassword = 4,
    NotAuthorized = 5,
}

/// The fixed header that prefixes every MQTT packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub packet_type: u8,
    pub flags: u8,
    /// Length of the variable header + payload that follow.
    pub remaining_length: usize,
    /// Encoded size of the fixed header itself (1 type byte + 1-4 length bytes).
    pub header_len: usize,
}

impl FixedHeader {
    /// Total size of the packet this header describes.
    pub fn total_len(&self) -> usize {
        self.header_len + self.remaining_length
    }

    /// Parse a fixed header from the front of `buf`.
    ///
    /// Returns `Ok(None)` when more bytes are needed to finish the
    /// remaining-length varint, `Err` when a fifth continuation byte makes
    /// the encoding malformed.
    pub fn parse(buf: &[u8]) -> Result<Option<FixedHeader>> {
        if buf.is_empty() {
            return Ok(None);
        }
        let Some((remaining_length, len_bytes)) = decode_remaining_length(&buf[1..])? else {
            return Ok(None);
        };
        Ok(Some(FixedHeader {
            packet_type: buf[0] >> 4,
            flags: buf[0] & 0x0F,
            remaining_length,
            header_len: 1 + len_bytes,
        }))
    }
}

/// Decode the remaining-length field (1-4 byte varint, 7 data bits per byte).
/// Returns `(value, bytes_consumed)` or `None` if the buffer ends mid-varint.
pub fn decode_remaining_length(buf: &[u8]) -> Result<Option<(usize, usize)>> {
    let mut multiplier = 1usize;
    let mut value = 0usize;

    for (i, &byte) in buf.iter().enumerate() {
        value += ((byte & 0x7F) as usize) * multiplier;

        if multiplier > 128 * 128 * 128 {
            return Err(ProtocolError::InvalidRemainingLength.into());
        }

        if (byte & 0x80) == 0 {
            return Ok(Some((value, i + 1)));
        }

        multiplier *= 128;
    }

    Ok(None)
}

/// Encode a remaining-length value, appending to `buf`. Returns bytes written.
pub fn encode_remaining_length(mut len: usize, buf: &mut Vec<u8>) -> usize {
    let start = buf.len();
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if len == 0 {
            break;
        }
    }
    buf.len() - start
}

/// Decoded MQTT packets the broker acts on. QoS 1/2 acknowledgement packets
/// are parsed so the dispatcher can log and ignore them.
#[derive(Debug, Clone)]
pub enum Packet {
    Connect(Connect),
    Connack(Connack),
    Publish(Publish),
    Puback { packet_id: u16 },
    Pubrec { packet_id: u16 },
    Pubrel { packet_id: u16 },
    Pubcomp { packet_id: u16 },
    Subscribe(Subscribe),
    Suback(Suback),
    Unsubscribe(Unsubscribe),
    Unsuback { packet_id: u16 },
    Pingreq,
    Pingresp,
    Disconnect,
}

/// CONNECT packet data. Will and credential fields are parsed per the flag
/// bits and otherwise ignored by this broker.
#[derive(Debug, Clone)]
pub struct Connect {
    pub protocol_name: String,
    pub protocol_level: u8,
    pub clean_session: bool,
    pub keep_alive: u16,
    pub client_id: String,
    pub will: Option<Will>,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
}

/// Will message configuration (parsed, not honored).
#[derive(Debug, Clone)]
pub struct Will {
    pub topic: String,
    pub message: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// CONNACK packet data.
#[derive(Debug, Clone)]
pub struct Connack {
    pub session_present: bool,
    pub code: ConnackCode,
}

/// PUBLISH packet data.
#[derive(Debug, Clone)]
pub struct Publish {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic: Bytes,
    pub packet_id: Option<u16>,
    pub payload: Bytes,
}

impl Publish {
    /// Topic as UTF-8; decode guarantees validity.
    pub fn topic_str(&self) -> &str {
        std::str::from_utf8(&self.topic).unwrap_or("")
    }
}

/// SUBSCRIBE packet data.
#[derive(Debug, Clone)]
pub struct Subscribe {
    pub packet_id: u16,
    pub topics: Vec<(String, QoS)>,
}

/// SUBACK packet data.
#[derive(Debug, Clone)]
pub struct Suback {
    pub packet_id: u16,
    pub return_codes: Vec<u8>,
}

/// UNSUBSCRIBE packet data.
#[derive(Debug, Clone)]
pub struct Unsubscribe {
    pub packet_id: u16,
    pub topics: Vec<String>,
}

/// Cursor over a packet body.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn u8(&mut self) -> Result<u8> {
        if self.remaining() < 1 {
            return Err(ProtocolError::IncompletePacket { needed: 1, have: 0 }.into());
        }
        let b = self.buf[self.pos];
        self.pos += 1;
        Ok(b)
    }

    fn u16(&mut self) -> Result<u16> {
        if self.remaining() < 2 {
            return Err(ProtocolError::IncompletePacket {
                needed: 2,
                have: self.remaining(),
            }
            .into());
        }
        let val = u16::from_be_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        self.pos += 2;
        Ok(val)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(ProtocolError::IncompletePacket {
                needed: len,
                have: self.remaining(),
            }
            .into());
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// 16-bit big-endian length-prefixed UTF-8 string.
    fn string(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidUtf8.into())
    }

    /// 16-bit big-endian length-prefixed binary data.
    fn binary(&mut self) -> Result<Vec<u8>> {
        let len = self.u16()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}

/// Try to decode one complete packet from `buf`.
///
/// Returns `Ok(Some((packet, bytes_consumed)))` on success, `Ok(None)` when
/// the buffer does not yet hold a whole packet, `Err` on protocol errors.
/// `max_packet_size` caps the total frame size; oversized frames are a
/// protocol error and the caller drops the connection.
pub fn decode_packet(buf: &[u8], max_packet_size: usize) -> Result<Option<(Packet, usize)>> {
    let Some(header) = FixedHeader::parse(buf)? else {
        return Ok(None);
    };

    let total = header.total_len();
    if total > max_packet_size {
        return Err(ProtocolError::PacketTooLarge {
            size: total,
            limit: max_packet_size,
        }
        .into());
    }
    if buf.len() < total {
        return Ok(None);
    }

    let packet_type = PacketType::try_from(header.packet_type)?;
    let body = &buf[header.header_len..total];

    // MQTT-3.8.1-1 / MQTT-3.10.1-1: SUBSCRIBE and UNSUBSCRIBE fixed header
    // flags must be 0b0010.
    if matches!(packet_type, PacketType::Subscribe | PacketType::Unsubscribe)
        && header.flags != 0x02
    {
        return Err(ProtocolError::MalformedPacket(format!(
            "{:?} fixed header flags must be 0x02, got {:#04x}",
            packet_type, header.flags
        ))
        .into());
    }

    let packet = match packet_type {
        PacketType::Connect => decode_connect(body)?,
        PacketType::Publish => decode_publish(header.flags, body)?,
        PacketType::Puback => Packet::Puback {
            packet_id: Reader::new(body).u16()?,
        },
        PacketType::Pubrec => Packet::Pubrec {
            packet_id: Reader::new(body).u16()?,
        },
        PacketType::Pubrel => Packet::Pubrel {
            packet_id: Reader::new(body).u16()?,
        },
        PacketType::Pubcomp => Packet::Pubcomp {
            packet_id: Reader::new(body).u16()?,
        },
        PacketType::Subscribe => decode_subscribe(body)?,
        PacketType::Unsubscribe => decode_unsubscribe(body)?,
        PacketType::Pingreq => Packet::Pingreq,
        PacketType::Disconnect => Packet::Disconnect,
        _ => {
            return Err(ProtocolError::MalformedPacket(format!(
                "unexpected packet type from client: {:?}",
                packet_type
            ))
            .into())
        }
    };

    Ok(Some((packet, total)))
}

fn decode_connect(body: &[u8]) -> Result<Packet> {
    let mut r = Reader::new(body);

    let protocol_name = r.string()?;
    if protocol_name != "MQTT" {
        return Err(ProtocolError::InvalidProtocolName(protocol_name).into());
    }

    // Level is validated by the dispatcher so a CONNACK with return code 1
    // can be sent instead of dropping the connection cold.
    let protocol_level = r.u8()?;

    let flags = r.u8()?;
    if (flags & 0x01) != 0 {
        return Err(ProtocolError::InvalidConnectFlags(flags).into());
    }
    let clean_session = (flags & 0x02) != 0;
    let will_flag = (flags & 0x04) != 0;
    let will_qos = QoS::try_from((flags >> 3) & 0x03)?;
    let will_retain = (flags & 0x20) != 0;
    let password_flag = (flags & 0x40) != 0;
    let username_flag = (flags & 0x80) != 0;

    // MQTT-3.1.2-22: password flag requires username flag.
    if !username_flag && password_flag {
        return Err(ProtocolError::InvalidConnectFlags(flags).into());
    }

    let keep_alive = r.u16()?;
    let client_id = r.string()?;

    let will = if will_flag {
        Some(Will {
            topic: r.string()?,
            message: r.binary()?,
            qos: will_qos,
            retain: will_retain,
        })
    } else {
        None
    };

    let username = if username_flag { Some(r.string()?) } else { None };
    let password = if password_flag { Some(r.binary()?) } else { None };

    Ok(Packet::Connect(Connect {
        protocol_name,
        protocol_level,
        clean_session,
        keep_alive,
        client_id,
        will,
        username,
        password,
    }))
}

fn decode_publish(flags: u8, body: &[u8]) -> Result<Packet> {
    let dup = (flags & 0x08) != 0;
    let qos = QoS::try_from((flags >> 1) & 0x03)?;
    let retain = (flags & 0x01) != 0;

    let mut r = Reader::new(body);
    let topic = r.string()?;
    if topic.is_empty() {
        return Err(ProtocolError::MalformedPacket("empty topic name".into()).into());
    }

    // QoS 0 packets carry no packet id.
    let packet_id = if qos != QoS::AtMostOnce {
        Some(r.u16()?)
    } else {
        None
    };

    let payload = r.take(r.remaining())?;

    Ok(Packet::Publish(Publish {
        dup,
        qos,
        retain,
        topic: Bytes::from(topic.into_bytes()),
        packet_id,
        payload: Bytes::copy_from_slice(payload),
    }))
}

fn decode_subscribe(body: &[u8]) -> Result<Packet> {
    let mut r = Reader::new(body);
    let packet_id = r.u16()?;

    let mut topics = Vec::new();
    while r.remaining() > 0 {
        let topic = r.string()?;
        // MQTT-4.7.3-1: a topic filter must be at least one character.
        if topic.is_empty() {
            return Err(ProtocolError::MalformedPacket("empty topic filter".into()).into());
        }
        let qos = QoS::try_from(r.u8()? & 0x03)?;
        topics.push((topic, qos));
    }

    if topics.is_empty() {
        return Err(ProtocolError::MalformedPacket("SUBSCRIBE with no topics".into()).into());
    }

    Ok(Packet::Subscribe(Subscribe { packet_id, topics }))
}

fn decode_unsubscribe(body: &[u8]) -> Result<Packet> {
    let mut r = Reader::new(body);
    let packet_id = r.u16()?;

    let mut topics = Vec::new();
    while r.remaining() > 0 {
        let topic = r.string()?;
        if topic.is_empty() {
            return Err(ProtocolError::MalformedPacket("empty topic filter".into()).into());
        }
        topics.push(topic);
    }

    if topics.is_empty() {
        return Err(ProtocolError::MalformedPacket("UNSUBSCRIBE with no topics".into()).into());
    }

    Ok(Packet::Unsubscribe(Unsubscribe { packet_id, topics }))
}

/// Encode a CONNACK. Returns bytes written.
pub fn encode_connack(connack: &Connack, buf: &mut Vec<u8>) -> usize {
    buf.push((PacketType::Connack as u8) << 4);
    buf.push(2);
    buf.push(connack.session_present as u8);
    buf.push(connack.code as u8);
    4
}

/// Encode a PUBLISH. Returns bytes written.
pub fn encode_publish(publish: &Publish, buf: &mut Vec<u8>) -> usize {
    let start = buf.len();

    let mut first = (PacketType::Publish as u8) << 4;
    if publish.dup {
        first |= 0x08;
    }
    first |= (publish.qos as u8) << 1;
    if publish.retain {
        first |= 0x01;
    }
    buf.push(first);

    let packet_id_len = if publish.qos != QoS::AtMostOnce { 2 } else { 0 };
    let remaining = 2 + publish.topic.len() + packet_id_len + publish.payload.len();
    encode_remaining_length(remaining, buf);

    buf.extend_from_slice(&(publish.topic.len() as u16).to_be_bytes());
    buf.extend_from_slice(&publish.topic);
    if let Some(id) = publish.packet_id {
        buf.extend_from_slice(&id.to_be_bytes());
    }
    buf.extend_from_slice(&publish.payload);

    buf.len() - start
}

/// Encode a SUBACK. Returns bytes written.
pub fn encode_suback(suback: &Suback, buf: &mut Vec<u8>) -> usize {
    let start = buf.len();
    buf.push((PacketType::Suback as u8) << 4);
    encode_remaining_length(2 + suback.return_codes.len(), buf);
    buf.extend_from_slice(&suback.packet_id.to_be_bytes());
    buf.extend_from_slice(&suback.return_codes);
    buf.len() - start
}

/// Encode an UNSUBACK. Returns bytes written.
pub fn encode_unsuback(packet_id: u16, buf: &mut Vec<u8>) -> usize {
    buf.push((PacketType::Unsuback as u8) << 4);
    buf.push(2);
    buf.extend_from_slice(&packet_id.to_be_bytes());
    4
}

/// Encode a PINGRESP. Returns bytes written.
pub fn encode_pingresp(buf: &mut Vec<u8>) -> usize {
    buf.push((PacketType::Pingresp as u8) << 4);
    buf.push(0);
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 1024 * 1024;

    #[test]
    fn remaining_length_boundaries() {
        assert_eq!(decode_remaining_length(&[0x00]).unwrap(), Some((0, 1)));
        assert_eq!(decode_remaining_length(&[0x7F]).unwrap(), Some((127, 1)));
        assert_eq!(
            decode_remaining_length(&[0x80, 0x01]).unwrap(),
            Some((128, 2))
        );
        assert_eq!(
            decode_remaining_length(&[0x80, 0x80, 0x01]).unwrap(),
            Some((16384, 3))
        );
        assert_eq!(
            decode_remaining_length(&[0xFF, 0xFF, 0xFF, 0x7F]).unwrap(),
            Some((268_435_455, 4))
        );
        // Incomplete varint: wait for more bytes.
        assert_eq!(decode_remaining_length(&[0x80, 0x80]).unwrap(), None);
        // A fifth continuation byte is malformed.
        assert!(decode_remaining_length(&[0x80, 0x80, 0x80, 0x80, 0x01]).is_err());
    }

    #[test]
    fn remaining_length_roundtrip() {
        for value in [0, 1, 127, 128, 16383, 16384, 2_097_151, 2_097_152] {
            let mut buf = Vec::new();
            encode_remaining_length(value, &mut buf);
            let (decoded, consumed) = decode_remaining_length(&buf).unwrap().unwrap();
            assert_eq!(decoded, value);
            assert_eq!(consumed, buf.len());
        }
    }

    #[test]
    fn fixed_header_parse() {
        let header = FixedHeader::parse(&[0x82, 0x05, 0, 0, 0, 0, 0])
            .unwrap()
            .unwrap();
        assert_eq!(header.packet_type, 8);
        assert_eq!(header.flags, 0x02);
        assert_eq!(header.remaining_length, 5);
        assert_eq!(header.header_len, 2);
        assert_eq!(header.total_len(), 7);

        assert!(FixedHeader::parse(&[]).unwrap().is_none());
        assert!(FixedHeader::parse(&[0x30]).unwrap().is_none());
        assert!(FixedHeader::parse(&[0x30, 0x80]).unwrap().is_none());
    }

    #[test]
    fn decode_connect_literal() {
        // CONNECT, clean session, keep-alive 60, zero-length client id.
        let bytes = [
            0x10, 0x0C, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x02, 0x00, 0x3C, 0x00, 0x00,
        ];
        let (packet, consumed) = decode_packet(&bytes, MAX).unwrap().unwrap();
        assert_eq!(consumed, bytes.len());
        let Packet::Connect(c) = packet else {
            panic!("expected CONNECT");
        };
        assert_eq!(c.protocol_name, "MQTT");
        assert_eq!(c.protocol_level, 4);
        assert!(c.clean_session);
        assert_eq!(c.keep_alive, 60);
        assert!(c.client_id.is_empty());
        assert!(c.will.is_none());
        assert!(c.username.is_none());
    }

    #[test]
    fn connack_literal_bytes() {
        let mut buf = Vec::new();
        let n = encode_connack(
            &Connack {
                session_present: false,
                code: ConnackCode::Accepted,
            },
            &mut buf,
        );
        assert_eq!(n, 4);
        assert_eq!(buf, [0x20, 0x02, 0x00, 0x00]);
    }

    #[test]
    fn publish_roundtrip_with_empty_payload() {
        let publish = Publish {
            dup: false,
            qos: QoS::AtMostOnce,
            retain: false,
            topic: Bytes::from_static(b"sensors/temp"),
            packet_id: None,
            payload: Bytes::new(),
        };
        let mut buf = Vec::new();
        encode_publish(&publish, &mut buf);

        let (packet, consumed) = decode_packet(&buf, MAX).unwrap().unwrap();
        assert_eq!(consumed, buf.len());
        let Packet::Publish(p) = packet else {
            panic!("expected PUBLISH");
        };
        assert_eq!(p.topic_str(), "sensors/temp");
        assert!(p.payload.is_empty());
        assert!(p.packet_id.is_none());
    }

    #[test]
    fn publish_qos1_carries_packet_id() {
        let publish = Publish {
            dup: true,
            qos: QoS::AtLeastOnce,
            retain: true,
            topic: Bytes::from_static(b"a/b"),
            packet_id: Some(7),
            payload: Bytes::from_static(b"x"),
        };
        let mut buf = Vec::new();
        encode_publish(&publish, &mut buf);

        let (packet, _) = decode_packet(&buf, MAX).unwrap().unwrap();
        let Packet::Publish(p) = packet else {
            panic!("expected PUBLISH");
        };
        assert!(p.dup);
        assert!(p.retain);
        assert_eq!(p.qos, QoS::AtLeastOnce);
        assert_eq!(p.packet_id, Some(7));
    }

    #[test]
    fn subscribe_flags_must_be_0010() {
        // SUBSCRIBE with flags 0000.
        let bytes = [0x80, 0x08, 0x00, 0x01, 0x00, 0x03, b'a', b'/', b'b', 0x00];
        assert!(decode_packet(&bytes, MAX).is_err());

        let bytes = [0x82, 0x08, 0x00, 0x01, 0x00, 0x03, b'a', b'/', b'b', 0x00];
        let (packet, _) = decode_packet(&bytes, MAX).unwrap().unwrap();
        let Packet::Subscribe(s) = packet else {
            panic!("expected SUBSCRIBE");
        };
        assert_eq!(s.packet_id, 1);
        assert_eq!(s.topics, vec![("a/b".to_string(), QoS::AtMostOnce)]);
    }

    #[test]
    fn unsubscribe_then_unsuback() {
        let bytes = [0xA2, 0x07, 0x00, 0x02, 0x00, 0x03, b'a', b'/', b'b'];
        let (packet, _) = decode_packet(&bytes, MAX).unwrap().unwrap();
        let Packet::Unsubscribe(u) = packet else {
            panic!("expected UNSUBSCRIBE");
        };
        assert_eq!(u.packet_id, 2);
        assert_eq!(u.topics, vec!["a/b".to_string()]);

        let mut buf = Vec::new();
        encode_unsuback(2, &mut buf);
        assert_eq!(buf, [0xB0, 0x02, 0x00, 0x02]);
    }

    #[test]
    fn ping_and_disconnect_headers() {
        let (packet, consumed) = decode_packet(&[0xC0, 0x00], MAX).unwrap().unwrap();
        assert!(matches!(packet, Packet::Pingreq));
        assert_eq!(consumed, 2);

        let (packet, _) = decode_packet(&[0xE0, 0x00], MAX).unwrap().unwrap();
        assert!(matches!(packet, Packet::Disconnect));

        let mut buf = Vec::new();
        encode_pingresp(&mut buf);
        assert_eq!(buf, [0xD0, 0x00]);
    }

    #[test]
    fn incomplete_packet_waits_for_more() {
        // PUBLISH header promising 10 body bytes, only 3 present.
        let bytes = [0x30, 0x0A, 0x00, 0x03, b'a'];
        assert!(decode_packet(&bytes, MAX).unwrap().is_none());
    }

    #[test]
    fn oversized_packet_rejected() {
        let bytes = [0x30, 0xFF, 0xFF, 0xFF, 0x7F];
        assert!(decode_packet(&bytes, 1024).is_err());
    }

    #[test]
    fn suback_echoes_return_codes() {
        let mut buf = Vec::new();
        encode_suback(
            &Suback {
                packet_id: 1,
                return_codes: vec![0, 0],
            },
            &mut buf,
        );
        assert_eq!(buf, [0x90, 0x04, 0x00, 0x01, 0x00, 0x00]);
    }
}
