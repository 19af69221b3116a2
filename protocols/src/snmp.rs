//! Minimal SNMP v1/v2c message codec (BER).
//!
//! Only what community probing needs: encoding a GET and decoding whatever
//! the agent sends back. Lengths up to four octets are supported.

use anyhow::{Context, bail, ensure};

/// `SNMPv2-MIB::sysName.0`
pub const SYS_NAME_OID: &[u32] = &[1, 3, 6, 1, 2, 1, 1, 5, 0];

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnmpVersion {
    V1,
    V2c,
}

impl SnmpVersion {
    fn number(self) -> i64 {
        match self {
            SnmpVersion::V1 => 0,
            SnmpVersion::V2c => 1,
        }
    }

    fn from_number(n: i64) -> anyhow::Result<Self> {
        match n {
            0 => Ok(SnmpVersion::V1),
            1 => Ok(SnmpVersion::V2c),
            other => bail!("unsupported SNMP version field {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduType {
    GetRequest,
    GetResponse,
}

impl PduType {
    fn tag(self) -> u8 {
        match self {
            PduType::GetRequest => 0xA0,
            PduType::GetResponse => 0xA2,
        }
    }

    fn from_tag(tag: u8) -> anyhow::Result<Self> {
        match tag {
            0xA0 => Ok(PduType::GetRequest),
            0xA2 => Ok(PduType::GetResponse),
            other => bail!("unsupported PDU tag {other:#04x}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnmpValue {
    Integer(i64),
    OctetString(Vec<u8>),
    Null,
    ObjectId(Vec<u32>),
    /// Application or context specific types, kept raw.
    Other { tag: u8, data: Vec<u8> },
}

impl SnmpValue {
    pub fn to_display_string(&self) -> String {
        match self {
            SnmpValue::Integer(n) => n.to_string(),
            SnmpValue::OctetString(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            SnmpValue::Null => String::from("null"),
            SnmpValue::ObjectId(oid) => format_oid(oid),
            SnmpValue::Other { tag: 0x80, .. } => String::from("noSuchObject"),
            SnmpValue::Other { tag: 0x81, .. } => String::from("noSuchInstance"),
            SnmpValue::Other { tag: 0x82, .. } => String::from("endOfMibView"),
            SnmpValue::Other { tag, data } => format!("[{tag:#04x}; {} bytes]", data.len()),
        }
    }

    fn encode(&self, out: &mut Vec<u8>) -> anyhow::Result<()> {
        match self {
            SnmpValue::Integer(n) => encode_tlv(TAG_INTEGER, &encode_integer(*n), out),
            SnmpValue::OctetString(bytes) => encode_tlv(TAG_OCTET_STRING, bytes, out),
            SnmpValue::Null => encode_tlv(TAG_NULL, &[], out),
            SnmpValue::ObjectId(oid) => encode_tlv(TAG_OID, &encode_oid(oid)?, out),
            SnmpValue::Other { tag, data } => encode_tlv(*tag, data, out),
        }
        Ok(())
    }

    fn decode(tag: u8, content: &[u8]) -> anyhow::Result<Self> {
        Ok(match tag {
            TAG_INTEGER => SnmpValue::Integer(decode_integer(content)?),
            TAG_OCTET_STRING => SnmpValue::OctetString(content.to_vec()),
            TAG_NULL => SnmpValue::Null,
            TAG_OID => SnmpValue::ObjectId(decode_oid(content)?),
            tag => SnmpValue::Other {
                tag,
                data: content.to_vec(),
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarBind {
    pub oid: Vec<u32>,
    pub value: SnmpValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub version: SnmpVersion,
    pub community: Vec<u8>,
    pub pdu_type: PduType,
    pub request_id: i32,
    pub error_status: i64,
    pub error_index: i64,
    pub varbinds: Vec<VarBind>,
}

impl Message {
    pub fn get_request(version: SnmpVersion, community: &str, request_id: i32, oid: &[u32]) -> Self {
        Self {
            version,
            community: community.as_bytes().to_vec(),
            pdu_type: PduType::GetRequest,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds: vec![VarBind {
                oid: oid.to_vec(),
                value: SnmpValue::Null,
            }],
        }
    }

    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let mut varbind_list: Vec<u8> = Vec::new();
        for varbind in &self.varbinds {
            let mut inner: Vec<u8> = Vec::new();
            encode_tlv(TAG_OID, &encode_oid(&varbind.oid)?, &mut inner);
            varbind.value.encode(&mut inner)?;
            encode_tlv(TAG_SEQUENCE, &inner, &mut varbind_list);
        }

        let mut pdu: Vec<u8> = Vec::new();
        encode_tlv(TAG_INTEGER, &encode_integer(self.request_id.into()), &mut pdu);
        encode_tlv(TAG_INTEGER, &encode_integer(self.error_status), &mut pdu);
        encode_tlv(TAG_INTEGER, &encode_integer(self.error_index), &mut pdu);
        encode_tlv(TAG_SEQUENCE, &varbind_list, &mut pdu);

        let mut message: Vec<u8> = Vec::new();
        encode_tlv(TAG_INTEGER, &encode_integer(self.version.number()), &mut message);
        encode_tlv(TAG_OCTET_STRING, &self.community, &mut message);
        encode_tlv(self.pdu_type.tag(), &pdu, &mut message);

        let mut packet: Vec<u8> = Vec::with_capacity(message.len() + 4);
        encode_tlv(TAG_SEQUENCE, &message, &mut packet);
        Ok(packet)
    }

    pub fn decode(payload: &[u8]) -> anyhow::Result<Self> {
        let mut outer = BerReader::new(payload);
        let mut message = BerReader::new(outer.expect(TAG_SEQUENCE)?);

        let version = SnmpVersion::from_number(decode_integer(message.expect(TAG_INTEGER)?)?)?;
        let community: Vec<u8> = message.expect(TAG_OCTET_STRING)?.to_vec();
        let (pdu_tag, pdu_content) = message.read_tlv()?;
        let pdu_type = PduType::from_tag(pdu_tag)?;

        let mut pdu = BerReader::new(pdu_content);
        let request_id: i32 = i32::try_from(decode_integer(pdu.expect(TAG_INTEGER)?)?)
            .context("request id out of range")?;
        let error_status: i64 = decode_integer(pdu.expect(TAG_INTEGER)?)?;
        let error_index: i64 = decode_integer(pdu.expect(TAG_INTEGER)?)?;

        let mut list = BerReader::new(pdu.expect(TAG_SEQUENCE)?);
        let mut varbinds: Vec<VarBind> = Vec::new();
        while !list.is_empty() {
            let mut varbind = BerReader::new(list.expect(TAG_SEQUENCE)?);
            let oid: Vec<u32> = decode_oid(varbind.expect(TAG_OID)?)?;
            let (tag, content) = varbind.read_tlv()?;
            varbinds.push(VarBind {
                oid,
                value: SnmpValue::decode(tag, content)?,
            });
        }

        Ok(Self {
            version,
            community,
            pdu_type,
            request_id,
            error_status,
            error_index,
            varbinds,
        })
    }
}

/// Encodes a GET request for a single object.
pub fn create_get_packet(
    version: SnmpVersion,
    community: &str,
    request_id: i32,
    oid: &[u32],
) -> anyhow::Result<Vec<u8>> {
    Message::get_request(version, community, request_id, oid).encode()
}

/// Decodes an agent reply, rejecting anything that is not a GetResponse.
pub fn parse_get_response(payload: &[u8]) -> anyhow::Result<Message> {
    let message = Message::decode(payload)?;
    ensure!(
        message.pdu_type == PduType::GetResponse,
        "expected GetResponse, got {:?}",
        message.pdu_type
    );
    Ok(message)
}

pub fn error_status_name(status: i64) -> &'static str {
    match status {
        0 => "noError",
        1 => "tooBig",
        2 => "noSuchName",
        3 => "badValue",
        4 => "readOnly",
        5 => "genErr",
        6 => "noAccess",
        16 => "authorizationError",
        _ => "unknown error",
    }
}

pub fn format_oid(oid: &[u32]) -> String {
    oid.iter()
        .map(|arc| arc.to_string())
        .collect::<Vec<String>>()
        .join(".")
}

fn encode_tlv(tag: u8, content: &[u8], out: &mut Vec<u8>) {
    out.push(tag);
    encode_length(content.len(), out);
    out.extend_from_slice(content);
}

fn encode_length(len: usize, out: &mut Vec<u8>) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip: usize = bytes.iter().take_while(|b| **b == 0).count();
    let significant: &[u8] = &bytes[skip..];
    out.push(0x80 | significant.len() as u8);
    out.extend_from_slice(significant);
}

/// Minimal two's complement big-endian encoding.
fn encode_integer(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start: usize = 0;
    while start < bytes.len() - 1 {
        let redundant_zero = bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0;
        let redundant_ones = bytes[start] == 0xFF && bytes[start + 1] & 0x80 != 0;
        if !(redundant_zero || redundant_ones) {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

fn decode_integer(content: &[u8]) -> anyhow::Result<i64> {
    ensure!(!content.is_empty(), "empty integer");
    ensure!(content.len() <= 8, "integer wider than 64 bits");
    let mut value: i64 = if content[0] & 0x80 != 0 { -1 } else { 0 };
    for byte in content {
        value = (value << 8) | i64::from(*byte);
    }
    Ok(value)
}

fn encode_oid(oid: &[u32]) -> anyhow::Result<Vec<u8>> {
    ensure!(oid.len() >= 2, "object identifier needs at least two arcs");
    ensure!(oid[0] <= 2, "first arc must be 0, 1 or 2");
    ensure!(oid[0] == 2 || oid[1] < 40, "second arc out of range");

    let mut out: Vec<u8> = Vec::with_capacity(oid.len() + 2);
    let first: u32 = (oid[0] * 40)
        .checked_add(oid[1])
        .context("second arc out of range")?;
    encode_subidentifier(first, &mut out);
    for arc in &oid[2..] {
        encode_subidentifier(*arc, &mut out);
    }
    Ok(out)
}

fn encode_subidentifier(mut value: u32, out: &mut Vec<u8>) {
    let mut groups = [0u8; 5];
    let mut count: usize = 0;
    loop {
        groups[count] = (value & 0x7F) as u8;
        value >>= 7;
        count += 1;
        if value == 0 {
            break;
        }
    }
    for idx in (0..count).rev() {
        let continuation: u8 = if idx == 0 { 0 } else { 0x80 };
        out.push(groups[idx] | continuation);
    }
}

fn decode_oid(content: &[u8]) -> anyhow::Result<Vec<u32>> {
    ensure!(!content.is_empty(), "empty object identifier");
    let mut arcs: Vec<u32> = Vec::with_capacity(content.len() + 1);
    let mut value: u32 = 0;
    for (idx, byte) in content.iter().enumerate() {
        value = value
            .checked_mul(128)
            .context("object identifier arc overflows u32")?
            | u32::from(byte & 0x7F);
        if byte & 0x80 != 0 {
            ensure!(idx + 1 < content.len(), "truncated object identifier");
            continue;
        }
        if arcs.is_empty() {
            let (first, second) = match value {
                0..=39 => (0, value),
                40..=79 => (1, value - 40),
                _ => (2, value - 80),
            };
            arcs.push(first);
            arcs.push(second);
        } else {
            arcs.push(value);
        }
        value = 0;
    }
    Ok(arcs)
}

struct BerReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BerReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn read_tlv(&mut self) -> anyhow::Result<(u8, &'a [u8])> {
        let tag: u8 = *self.data.get(self.pos).context("truncated tag")?;
        let first: u8 = *self.data.get(self.pos + 1).context("truncated length")?;
        self.pos += 2;

        let len: usize = if first & 0x80 == 0 {
            usize::from(first)
        } else {
            let octets: usize = usize::from(first & 0x7F);
            ensure!((1..=4).contains(&octets), "unsupported length form {first:#04x}");
            let bytes: &[u8] = self
                .data
                .get(self.pos..self.pos + octets)
                .context("truncated length")?;
            self.pos += octets;
            bytes
                .iter()
                .fold(0usize, |acc, byte| (acc << 8) | usize::from(*byte))
        };

        let end: usize = self.pos.checked_add(len).context("length overflow")?;
        let content: &'a [u8] = self.data.get(self.pos..end).context("truncated value")?;
        self.pos = end;
        Ok((tag, content))
    }

    fn expect(&mut self, tag: u8) -> anyhow::Result<&'a [u8]> {
        let (found, content) = self.read_tlv()?;
        ensure!(found == tag, "expected tag {tag:#04x}, found {found:#04x}");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Captured from `snmpget -v1 -c public <host> sysName.0` with request id 1.
    const SYS_NAME_GET_PUBLIC: &[u8] = &[
        0x30, 0x26, 0x02, 0x01, 0x00, 0x04, 0x06, b'p', b'u', b'b', b'l', b'i', b'c', 0xA0, 0x19,
        0x02, 0x01, 0x01, 0x02, 0x01, 0x00, 0x02, 0x01, 0x00, 0x30, 0x0E, 0x30, 0x0C, 0x06, 0x08,
        0x2B, 0x06, 0x01, 0x02, 0x01, 0x01, 0x05, 0x00, 0x05, 0x00,
    ];

    #[test]
    fn get_request_matches_reference_bytes() {
        let packet = create_get_packet(SnmpVersion::V1, "public", 1, SYS_NAME_OID).unwrap();
        assert_eq!(packet, SYS_NAME_GET_PUBLIC);
    }

    #[test]
    fn decodes_agent_response() {
        let mut reply = Message::decode(SYS_NAME_GET_PUBLIC).unwrap();
        assert_eq!(reply.pdu_type, PduType::GetRequest);
        assert_eq!(reply.community, b"public");

        reply.pdu_type = PduType::GetResponse;
        reply.varbinds[0].value = SnmpValue::OctetString(b"core-sw-01".to_vec());
        let bytes = reply.encode().unwrap();

        let parsed = parse_get_response(&bytes).unwrap();
        assert_eq!(parsed.request_id, 1);
        assert_eq!(parsed.error_status, 0);
        assert_eq!(parsed.varbinds[0].oid, SYS_NAME_OID);
        assert_eq!(parsed.varbinds[0].value.to_display_string(), "core-sw-01");
    }

    #[test]
    fn request_is_not_a_response() {
        assert!(parse_get_response(SYS_NAME_GET_PUBLIC).is_err());
    }

    #[test]
    fn integers_use_minimal_encoding() {
        assert_eq!(encode_integer(0), vec![0x00]);
        assert_eq!(encode_integer(127), vec![0x7F]);
        assert_eq!(encode_integer(128), vec![0x00, 0x80]);
        assert_eq!(encode_integer(-1), vec![0xFF]);
        assert_eq!(encode_integer(-129), vec![0xFF, 0x7F]);
        assert_eq!(decode_integer(&[0xFF, 0x7F]).unwrap(), -129);
        assert_eq!(decode_integer(&[0x00, 0x80]).unwrap(), 128);
    }

    #[test]
    fn long_lengths_and_multibyte_arcs() {
        let mut out = Vec::new();
        encode_length(300, &mut out);
        assert_eq!(out, vec![0x82, 0x01, 0x2C]);

        let oid = [1, 3, 6, 1, 4, 1, 2021, 10, 1, 3, 1];
        let encoded = encode_oid(&oid).unwrap();
        assert_eq!(&encoded[5..7], &[0x8F, 0x65]);
        assert_eq!(decode_oid(&encoded).unwrap(), oid);
    }

    #[test]
    fn truncated_messages_are_rejected() {
        for cut in [1, 10, 20, SYS_NAME_GET_PUBLIC.len() - 1] {
            assert!(
                Message::decode(&SYS_NAME_GET_PUBLIC[..cut]).is_err(),
                "decoded a message cut at {cut}"
            );
        }
    }

    #[test]
    fn v2c_exceptions_render_by_name() {
        let value = SnmpValue::Other {
            tag: 0x80,
            data: Vec::new(),
        };
        assert_eq!(value.to_display_string(), "noSuchObject");
        assert_eq!(error_status_name(2), "noSuchName");
        assert_eq!(format_oid(SYS_NAME_OID), "1.3.6.1.2.1.1.5.0");
    }
}
