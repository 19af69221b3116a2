use anyhow::{Context, ensure};
use pnet::packet::dns::{DnsClass, DnsPacket, DnsQuery, DnsTypes, MutableDnsPacket, Opcode, Retcode};

pub const DNS_HDR_LEN: usize = 12;
const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 253;

/// What a nameserver said about one query, judged from the response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// NOERROR with this many A records in the answer section.
    Answered(u16),
    /// NOERROR without a single A record, e.g. a bare CNAME.
    Empty,
    /// Any other response code.
    Rejected(u8),
}

/// Builds a recursive A query for `domain`.
pub fn create_a_packet(domain: &str, id: u16) -> anyhow::Result<Vec<u8>> {
    let query: DnsQuery = create_a_query(domain)?;
    let q_fixed_len: usize = 4;
    let qlen: usize = query.qname.len() + q_fixed_len;
    let total: usize = DNS_HDR_LEN + qlen;
    let mut buffer: Vec<u8> = vec![0u8; total];

    {
        let mut dns: MutableDnsPacket =
            MutableDnsPacket::new(&mut buffer).context("creating dns header")?;
        dns.set_id(id);
        dns.set_is_response(0);
        dns.set_opcode(Opcode::StandardQuery);
        dns.set_is_authoriative(0);
        dns.set_is_truncated(0);
        dns.set_is_recursion_desirable(1);
        dns.set_is_recursion_available(0);
        dns.set_zero_reserved(0);
        dns.set_is_non_authenticated_data(0);
        dns.set_rcode(Retcode::NoError);
        dns.set_query_count(1);
        dns.set_response_count(0);
        dns.set_authority_rr_count(0);
        dns.set_additional_rr_count(0);
    }

    let mut cursor: usize = DNS_HDR_LEN;

    buffer[cursor..cursor + query.qname.len()].copy_from_slice(&query.qname);
    cursor += query.qname.len();

    let type_bytes: [u8; 2] = query.qtype.0.to_be_bytes();
    buffer[cursor..cursor + 2].copy_from_slice(&type_bytes);
    cursor += 2;

    let class_bytes: [u8; 2] = query.qclass.0.to_be_bytes();
    buffer[cursor..cursor + 2].copy_from_slice(&class_bytes);

    Ok(buffer)
}

const TYPE_A: u16 = 1;
const RR_FIXED_LEN: usize = 10;

/// Reads the verdict of a response to the query with `expected_id`.
///
/// Datagrams that are not a response to that query are errors, so callers
/// can discard them and keep waiting.
pub fn parse_resolution(payload: &[u8], expected_id: u16) -> anyhow::Result<Resolution> {
    let dns: DnsPacket = DnsPacket::new(payload).context("truncated DNS header")?;
    ensure!(dns.get_is_response() == 1, "datagram is a query, not a response");
    ensure!(
        dns.get_id() == expected_id,
        "transaction id {:#06x} does not match {:#06x}",
        dns.get_id(),
        expected_id
    );

    let rcode: u8 = payload[3] & 0x0F;
    if rcode != 0 {
        return Ok(Resolution::Rejected(rcode));
    }

    match count_a_records(payload, dns.get_query_count(), dns.get_response_count())? {
        0 => Ok(Resolution::Empty),
        count => Ok(Resolution::Answered(count)),
    }
}

/// Walks the question and answer sections, counting answers of type A.
fn count_a_records(payload: &[u8], questions: u16, answers: u16) -> anyhow::Result<u16> {
    let mut cursor: usize = DNS_HDR_LEN;
    for _ in 0..questions {
        cursor = skip_name(payload, cursor)? + 4;
    }

    let mut found: u16 = 0;
    for _ in 0..answers {
        cursor = skip_name(payload, cursor)?;
        let fixed = payload
            .get(cursor..cursor + RR_FIXED_LEN)
            .context("truncated answer record")?;
        let rtype: u16 = u16::from_be_bytes([fixed[0], fixed[1]]);
        let rdlength: usize = u16::from_be_bytes([fixed[8], fixed[9]]) as usize;
        cursor += RR_FIXED_LEN + rdlength;
        ensure!(cursor <= payload.len(), "truncated answer data");
        if rtype == TYPE_A {
            found += 1;
        }
    }
    Ok(found)
}

/// Returns the offset just past the name starting at `cursor`.
fn skip_name(payload: &[u8], mut cursor: usize) -> anyhow::Result<usize> {
    loop {
        let len: u8 = *payload.get(cursor).context("truncated name")?;
        match len {
            0 => return Ok(cursor + 1),
            // Compression pointer, always the last element of a name.
            l if l & 0xC0 == 0xC0 => return Ok(cursor + 2),
            l => cursor += 1 + l as usize,
        }
    }
}

pub fn rcode_name(rcode: u8) -> &'static str {
    match rcode {
        0 => "NOERROR",
        1 => "FORMERR",
        2 => "SERVFAIL",
        3 => "NXDOMAIN",
        4 => "NOTIMP",
        5 => "REFUSED",
        _ => "unknown rcode",
    }
}

fn create_a_query(domain: &str) -> anyhow::Result<DnsQuery> {
    let qname: Vec<u8> = encode_dns_name(domain)?;
    let query: DnsQuery = DnsQuery {
        qname,
        qtype: DnsTypes::A,
        qclass: DnsClass(1),
        payload: Vec::new(),
    };
    Ok(query)
}

fn encode_dns_name(name: &str) -> anyhow::Result<Vec<u8>> {
    let name: &str = name.trim_end_matches('.');
    ensure!(!name.is_empty(), "empty domain name");
    ensure!(name.len() <= MAX_NAME_LEN, "domain name too long: {name}");

    let mut encoded: Vec<u8> = Vec::with_capacity(name.len() + 2);
    for label in name.split('.') {
        ensure!(!label.is_empty(), "empty label in {name}");
        ensure!(label.len() <= MAX_LABEL_LEN, "label too long in {name}");
        encoded.push(label.len() as u8);
        encoded.extend_from_slice(label.as_bytes());
    }
    encoded.push(0);
    Ok(encoded)
}
