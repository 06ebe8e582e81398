// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS wire codec.
//!
//! Decodes incoming query packets (header, question section, OPT pseudo-RR
//! with EDNS0 Client Subnet) and encodes full responses. Name compression
//! pointers are followed on decode; encoding writes names uncompressed,
//! which is always legal on the wire. Records of a type the server does not
//! model are skipped on decode rather than rejected, so a query carrying
//! exotic additional data still gets an answer.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use thiserror::Error;

use crate::rr::{Record, RecordClass, RecordData, RecordType};

/// EDNS payload size advertised in responses.
const EDNS_PAYLOAD_SIZE: u16 = 1232;
/// Classic DNS maximum when the client does not advertise EDNS.
pub const MAX_UDP_PLAIN: usize = 512;
/// EDNS option code for Client Subnet (RFC 7871).
const OPTION_CLIENT_SUBNET: u16 = 8;

/// Response codes used by the resolver.
pub mod rcode {
    pub const NOERROR: u8 = 0;
    pub const FORMERR: u8 = 1;
    pub const SERVFAIL: u8 = 2;
    pub const NXDOMAIN: u8 = 3;
    pub const NOTIMP: u8 = 4;
    pub const REFUSED: u8 = 5;
    pub const NXRRSET: u8 = 8;
}

/// Errors raised while decoding or encoding a packet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtoError {
    /// The packet ended in the middle of the named structure.
    #[error("packet truncated while reading {0}")]
    Truncated(&'static str),

    /// A compression pointer jumped outside the packet or into a loop.
    #[error("invalid name compression pointer")]
    BadPointer,

    /// A label length byte used the reserved 0b01/0b10 prefixes.
    #[error("unsupported label type")]
    BadLabelType,

    /// A label was not valid UTF-8.
    #[error("label is not valid UTF-8")]
    BadLabel,

    /// A name or TXT string exceeded wire limits during encoding.
    #[error("{0} too long to encode")]
    TooLong(&'static str),
}

/// Header flag bits in decoded form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub qr: bool,
    pub opcode: u8,
    pub aa: bool,
    pub tc: bool,
    pub rd: bool,
    pub ra: bool,
    pub ad: bool,
    pub cd: bool,
    pub rcode: u8,
}

/// One entry of the question section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: String,
    pub qtype: RecordType,
    pub qclass: RecordClass,
}

/// One EDNS0 Client Subnet option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcsOption {
    pub family: u16,
    pub source_prefix: u8,
    pub scope_prefix: u8,
    pub addr: IpAddr,
}

/// Decoded OPT pseudo-RR state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Edns {
    pub payload_size: u16,
    pub ecs: Vec<EcsOption>,
}

/// A decoded (or to-be-encoded) DNS message.
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub id: u16,
    pub flags: Flags,
    pub questions: Vec<Question>,
    pub answers: Vec<Record>,
    pub authority: Vec<Record>,
    pub additional: Vec<Record>,
    pub edns: Option<Edns>,
}

impl Message {
    /// Builds the reply skeleton for a request: same id, opcode, question
    /// and RD bit; QR set; empty sections. A plain OPT is echoed when the
    /// request carried EDNS.
    #[must_use]
    pub fn reply_to(request: &Message) -> Message {
        Message {
            id: request.id,
            flags: Flags {
                qr: true,
                opcode: request.flags.opcode,
                rd: request.flags.rd,
                ..Flags::default()
            },
            questions: request.questions.clone(),
            edns: request.edns.as_ref().map(|_| Edns {
                payload_size: EDNS_PAYLOAD_SIZE,
                ecs: Vec::new(),
            }),
            ..Message::default()
        }
    }

    /// Decodes a packet.
    pub fn from_bytes(bytes: &[u8]) -> Result<Message, ProtoError> {
        let mut dec = Decoder { bytes, pos: 0 };
        let id = dec.u16("header")?;
        let b2 = dec.u8("header")?;
        let b3 = dec.u8("header")?;
        let flags = Flags {
            qr: b2 & 0x80 != 0,
            opcode: (b2 >> 3) & 0x0F,
            aa: b2 & 0x04 != 0,
            tc: b2 & 0x02 != 0,
            rd: b2 & 0x01 != 0,
            ra: b3 & 0x80 != 0,
            ad: b3 & 0x20 != 0,
            cd: b3 & 0x10 != 0,
            rcode: b3 & 0x0F,
        };
        let qdcount = dec.u16("header")?;
        let ancount = dec.u16("header")?;
        let nscount = dec.u16("header")?;
        let arcount = dec.u16("header")?;

        let mut msg = Message {
            id,
            flags,
            ..Message::default()
        };
        for _ in 0..qdcount {
            let name = dec.name()?;
            let qtype = RecordType(dec.u16("question")?);
            let qclass = RecordClass(dec.u16("question")?);
            msg.questions.push(Question {
                name,
                qtype,
                qclass,
            });
        }
        for _ in 0..ancount {
            if let Some(rr) = dec.record()? {
                msg.answers.push(rr);
            }
        }
        for _ in 0..nscount {
            if let Some(rr) = dec.record()? {
                msg.authority.push(rr);
            }
        }
        for _ in 0..arcount {
            let start_name = dec.name()?;
            let rtype = RecordType(dec.u16("record")?);
            if rtype == RecordType::OPT {
                msg.edns = Some(dec.opt()?);
            } else if let Some(rr) = dec.record_body(start_name, rtype)? {
                msg.additional.push(rr);
            }
        }
        Ok(msg)
    }

    /// Encodes the message.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtoError> {
        let mut out = Vec::with_capacity(512);
        let arcount = self.additional.len() + usize::from(self.edns.is_some());
        out.extend_from_slice(&self.id.to_be_bytes());
        let mut b2 = (self.flags.opcode & 0x0F) << 3;
        if self.flags.qr {
            b2 |= 0x80;
        }
        if self.flags.aa {
            b2 |= 0x04;
        }
        if self.flags.tc {
            b2 |= 0x02;
        }
        if self.flags.rd {
            b2 |= 0x01;
        }
        let mut b3 = self.flags.rcode & 0x0F;
        if self.flags.ra {
            b3 |= 0x80;
        }
        if self.flags.ad {
            b3 |= 0x20;
        }
        if self.flags.cd {
            b3 |= 0x10;
        }
        out.push(b2);
        out.push(b3);
        for count in [
            self.questions.len(),
            self.answers.len(),
            self.authority.len(),
            arcount,
        ] {
            out.extend_from_slice(&(count as u16).to_be_bytes());
        }
        for q in &self.questions {
            encode_name(&mut out, &q.name)?;
            out.extend_from_slice(&q.qtype.0.to_be_bytes());
            out.extend_from_slice(&q.qclass.0.to_be_bytes());
        }
        for rr in self.answers.iter().chain(&self.authority).chain(&self.additional) {
            encode_record(&mut out, rr)?;
        }
        if let Some(edns) = &self.edns {
            // Root name, OPT, requestor payload size in the class field.
            out.push(0);
            out.extend_from_slice(&RecordType::OPT.0.to_be_bytes());
            out.extend_from_slice(&edns.payload_size.to_be_bytes());
            out.extend_from_slice(&0u32.to_be_bytes());
            out.extend_from_slice(&0u16.to_be_bytes());
        }
        Ok(out)
    }

    /// Encodes for a UDP client: when the packet exceeds `limit` the
    /// sections are dropped and the TC bit is set so the client retries
    /// over TCP.
    pub fn to_bytes_udp(&self, limit: usize) -> Result<Vec<u8>, ProtoError> {
        let full = self.to_bytes()?;
        if full.len() <= limit {
            return Ok(full);
        }
        let mut truncated = self.clone();
        truncated.flags.tc = true;
        truncated.answers.clear();
        truncated.authority.clear();
        truncated.additional.clear();
        truncated.to_bytes()
    }

    /// Payload limit a UDP reply must fit, from the client's EDNS
    /// advertisement.
    #[must_use]
    pub fn udp_payload_limit(&self) -> usize {
        self.edns
            .as_ref()
            .map_or(MAX_UDP_PLAIN, |e| usize::from(e.payload_size).max(MAX_UDP_PLAIN))
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn u8(&mut self, what: &'static str) -> Result<u8, ProtoError> {
        let b = *self
            .bytes
            .get(self.pos)
            .ok_or(ProtoError::Truncated(what))?;
        self.pos += 1;
        Ok(b)
    }

    fn u16(&mut self, what: &'static str) -> Result<u16, ProtoError> {
        Ok(u16::from_be_bytes([self.u8(what)?, self.u8(what)?]))
    }

    fn u32(&mut self, what: &'static str) -> Result<u32, ProtoError> {
        Ok(u32::from_be_bytes([
            self.u8(what)?,
            self.u8(what)?,
            self.u8(what)?,
            self.u8(what)?,
        ]))
    }

    fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], ProtoError> {
        let end = self.pos + len;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(ProtoError::Truncated(what))?;
        self.pos = end;
        Ok(slice)
    }

    /// Reads a possibly-compressed name starting at the current position.
    fn name(&mut self) -> Result<String, ProtoError> {
        let (name, next) = decode_name_at(self.bytes, self.pos)?;
        self.pos = next;
        Ok(name)
    }

    /// Reads one resource record; `Ok(None)` when the type is not modelled.
    fn record(&mut self) -> Result<Option<Record>, ProtoError> {
        let name = self.name()?;
        let rtype = RecordType(self.u16("record")?);
        self.record_body(name, rtype)
    }

    fn record_body(
        &mut self,
        name: String,
        rtype: RecordType,
    ) -> Result<Option<Record>, ProtoError> {
        let class = RecordClass(self.u16("record")?);
        let ttl = self.u32("record")?;
        let rdlen = usize::from(self.u16("record")?);
        let rd_start = self.pos;
        let rd_end = rd_start + rdlen;
        if rd_end > self.bytes.len() {
            return Err(ProtoError::Truncated("rdata"));
        }

        let data = match rtype {
            RecordType::A if rdlen == 4 => {
                let b = self.take(4, "A rdata")?;
                Some(RecordData::A(Ipv4Addr::new(b[0], b[1], b[2], b[3])))
            }
            RecordType::AAAA if rdlen == 16 => {
                let b = self.take(16, "AAAA rdata")?;
                let mut octets = [0u8; 16];
                octets.copy_from_slice(b);
                Some(RecordData::Aaaa(Ipv6Addr::from(octets)))
            }
            RecordType::NS => Some(RecordData::Ns(self.name()?)),
            RecordType::CNAME => Some(RecordData::Cname(self.name()?)),
            RecordType::DNAME => Some(RecordData::Dname(self.name()?)),
            RecordType::PTR => Some(RecordData::Ptr(self.name()?)),
            RecordType::SOA => Some(RecordData::Soa {
                mname: self.name()?,
                rname: self.name()?,
                serial: self.u32("SOA")?,
                refresh: self.u32("SOA")?,
                retry: self.u32("SOA")?,
                expire: self.u32("SOA")?,
                minimum: self.u32("SOA")?,
            }),
            RecordType::MX => Some(RecordData::Mx {
                preference: self.u16("MX")?,
                exchange: self.name()?,
            }),
            RecordType::SRV => Some(RecordData::Srv {
                priority: self.u16("SRV")?,
                weight: self.u16("SRV")?,
                port: self.u16("SRV")?,
                target: self.name()?,
            }),
            RecordType::TXT => {
                let mut strings = Vec::new();
                while self.pos < rd_end {
                    let len = usize::from(self.u8("TXT")?);
                    let bytes = self.take(len, "TXT")?;
                    strings.push(
                        String::from_utf8(bytes.to_vec()).map_err(|_| ProtoError::BadLabel)?,
                    );
                }
                Some(RecordData::Txt(strings))
            }
            RecordType::DS => {
                let key_tag = self.u16("DS")?;
                let algorithm = self.u8("DS")?;
                let digest_type = self.u8("DS")?;
                let digest = self.take(rd_end - self.pos, "DS")?.to_vec();
                Some(RecordData::Ds {
                    key_tag,
                    algorithm,
                    digest_type,
                    digest,
                })
            }
            t if t.is_dynamic() => {
                let bytes = self.take(rdlen, "dynamic rdata")?;
                Some(RecordData::Dynamic(
                    String::from_utf8(bytes.to_vec()).map_err(|_| ProtoError::BadLabel)?,
                ))
            }
            _ => None,
        };

        // Land exactly past the rdata whether or not it was modelled.
        self.pos = rd_end;
        Ok(data.map(|data| Record {
            name,
            class,
            rtype,
            ttl,
            data,
        }))
    }

    /// Reads the body of an OPT pseudo-RR (the name and type are already
    /// consumed), extracting Client Subnet options.
    fn opt(&mut self) -> Result<Edns, ProtoError> {
        let payload_size = self.u16("OPT")?;
        let _ttl = self.u32("OPT")?;
        let rdlen = usize::from(self.u16("OPT")?);
        let rd_end = self.pos + rdlen;
        if rd_end > self.bytes.len() {
            return Err(ProtoError::Truncated("OPT rdata"));
        }

        let mut edns = Edns {
            payload_size,
            ecs: Vec::new(),
        };
        while self.pos + 4 <= rd_end {
            let code = self.u16("OPT option")?;
            let len = usize::from(self.u16("OPT option")?);
            let data = self.take(len, "OPT option")?;
            if code != OPTION_CLIENT_SUBNET || data.len() < 4 {
                continue;
            }
            let family = u16::from_be_bytes([data[0], data[1]]);
            let source_prefix = data[2];
            let scope_prefix = data[3];
            let addr_bytes = &data[4..];
            let addr = match family {
                1 => {
                    let mut octets = [0u8; 4];
                    for (i, b) in addr_bytes.iter().take(4).enumerate() {
                        octets[i] = *b;
                    }
                    IpAddr::V4(Ipv4Addr::from(octets))
                }
                2 => {
                    let mut octets = [0u8; 16];
                    for (i, b) in addr_bytes.iter().take(16).enumerate() {
                        octets[i] = *b;
                    }
                    IpAddr::V6(Ipv6Addr::from(octets))
                }
                _ => continue,
            };
            edns.ecs.push(EcsOption {
                family,
                source_prefix,
                scope_prefix,
                addr,
            });
        }
        self.pos = rd_end;
        Ok(edns)
    }
}

/// Follows labels and compression pointers from `start`; returns the name
/// and the position just past the in-place portion.
fn decode_name_at(bytes: &[u8], start: usize) -> Result<(String, usize), ProtoError> {
    let mut labels: Vec<String> = Vec::new();
    let mut pos = start;
    let mut next = None;
    let mut jumps = 0u8;

    loop {
        let len_byte = *bytes.get(pos).ok_or(ProtoError::Truncated("name"))?;
        match len_byte >> 6 {
            0b11 => {
                let second = *bytes.get(pos + 1).ok_or(ProtoError::Truncated("name"))?;
                let target = ((usize::from(len_byte) & 0x3F) << 8) | usize::from(second);
                if next.is_none() {
                    next = Some(pos + 2);
                }
                // Pointers must move strictly backwards; this also bounds
                // the number of jumps.
                if target >= pos {
                    return Err(ProtoError::BadPointer);
                }
                jumps += 1;
                if jumps > 64 {
                    return Err(ProtoError::BadPointer);
                }
                pos = target;
            }
            0b00 => {
                let len = usize::from(len_byte);
                pos += 1;
                if len == 0 {
                    break;
                }
                let label = bytes
                    .get(pos..pos + len)
                    .ok_or(ProtoError::Truncated("label"))?;
                labels.push(
                    String::from_utf8(label.to_vec()).map_err(|_| ProtoError::BadLabel)?,
                );
                pos += len;
            }
            _ => return Err(ProtoError::BadLabelType),
        }
    }

    let name = if labels.is_empty() {
        ".".to_string()
    } else {
        format!("{}.", labels.join("."))
    };
    Ok((name, next.unwrap_or(pos)))
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn encode_name(out: &mut Vec<u8>, name: &str) -> Result<(), ProtoError> {
    let trimmed = name.trim_end_matches('.');
    if name.len() > 255 {
        return Err(ProtoError::TooLong("name"));
    }
    if !trimmed.is_empty() {
        for label in trimmed.split('.') {
            if label.len() > 63 {
                return Err(ProtoError::TooLong("label"));
            }
            out.push(label.len() as u8);
            out.extend_from_slice(label.as_bytes());
        }
    }
    out.push(0);
    Ok(())
}

fn encode_record(out: &mut Vec<u8>, rr: &Record) -> Result<(), ProtoError> {
    encode_name(out, &rr.name)?;
    out.extend_from_slice(&rr.rtype.0.to_be_bytes());
    out.extend_from_slice(&rr.class.0.to_be_bytes());
    out.extend_from_slice(&rr.ttl.to_be_bytes());

    let mut rdata = Vec::new();
    match &rr.data {
        RecordData::A(ip) => rdata.extend_from_slice(&ip.octets()),
        RecordData::Aaaa(ip) => rdata.extend_from_slice(&ip.octets()),
        RecordData::Ns(t)
        | RecordData::Cname(t)
        | RecordData::Dname(t)
        | RecordData::Ptr(t) => encode_name(&mut rdata, t)?,
        RecordData::Soa {
            mname,
            rname,
            serial,
            refresh,
            retry,
            expire,
            minimum,
        } => {
            encode_name(&mut rdata, mname)?;
            encode_name(&mut rdata, rname)?;
            for v in [serial, refresh, retry, expire, minimum] {
                rdata.extend_from_slice(&v.to_be_bytes());
            }
        }
        RecordData::Mx {
            preference,
            exchange,
        } => {
            rdata.extend_from_slice(&preference.to_be_bytes());
            encode_name(&mut rdata, exchange)?;
        }
        RecordData::Srv {
            priority,
            weight,
            port,
            target,
        } => {
            rdata.extend_from_slice(&priority.to_be_bytes());
            rdata.extend_from_slice(&weight.to_be_bytes());
            rdata.extend_from_slice(&port.to_be_bytes());
            encode_name(&mut rdata, target)?;
        }
        RecordData::Txt(strings) => {
            for s in strings {
                if s.len() > 255 {
                    return Err(ProtoError::TooLong("TXT string"));
                }
                rdata.push(s.len() as u8);
                rdata.extend_from_slice(s.as_bytes());
            }
        }
        RecordData::Ds {
            key_tag,
            algorithm,
            digest_type,
            digest,
        } => {
            rdata.extend_from_slice(&key_tag.to_be_bytes());
            rdata.push(*algorithm);
            rdata.push(*digest_type);
            rdata.extend_from_slice(digest);
        }
        RecordData::Dynamic(service) => rdata.extend_from_slice(service.as_bytes()),
    }

    if rdata.len() > usize::from(u16::MAX) {
        return Err(ProtoError::TooLong("rdata"));
    }
    out.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
    out.extend_from_slice(&rdata);
    Ok(())
}
