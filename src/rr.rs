// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Resource-record model.
//!
//! Records are held fully typed: the [`RecordData`] enum carries parsed
//! rdata for every type the server understands, including the seven
//! private dynamic types whose rdata is a single service name. The private
//! types occupy a vendor range well above the IANA registry and each maps
//! bidirectionally to the static type its services produce at query time.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// 16-bit RR type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordType(pub u16);

impl RecordType {
    pub const A: RecordType = RecordType(1);
    pub const NS: RecordType = RecordType(2);
    pub const CNAME: RecordType = RecordType(5);
    pub const SOA: RecordType = RecordType(6);
    pub const PTR: RecordType = RecordType(12);
    pub const MX: RecordType = RecordType(15);
    pub const TXT: RecordType = RecordType(16);
    pub const AAAA: RecordType = RecordType(28);
    pub const SRV: RecordType = RecordType(33);
    pub const DNAME: RecordType = RecordType(39);
    pub const OPT: RecordType = RecordType(41);
    pub const DS: RecordType = RecordType(43);

    // Private range: dynamic records whose rdata names a service.
    pub const DYNC: RecordType = RecordType(0xFF10);
    pub const DYNA: RecordType = RecordType(0xFF11);
    pub const DYNAAAA: RecordType = RecordType(0xFF12);
    pub const DYNTXT: RecordType = RecordType(0xFF13);
    pub const DYNMX: RecordType = RecordType(0xFF14);
    pub const DYNPTR: RecordType = RecordType(0xFF15);
    pub const DYNSRV: RecordType = RecordType(0xFF16);

    /// Parses a master-file type token (case-insensitive).
    #[must_use]
    pub fn from_token(token: &str) -> Option<RecordType> {
        let t = match token.to_ascii_uppercase().as_str() {
            "A" => Self::A,
            "NS" => Self::NS,
            "CNAME" => Self::CNAME,
            "SOA" => Self::SOA,
            "PTR" => Self::PTR,
            "MX" => Self::MX,
            "TXT" => Self::TXT,
            "AAAA" => Self::AAAA,
            "SRV" => Self::SRV,
            "DNAME" => Self::DNAME,
            "DS" => Self::DS,
            "DYNC" => Self::DYNC,
            "DYNA" => Self::DYNA,
            "DYNAAAA" => Self::DYNAAAA,
            "DYNTXT" => Self::DYNTXT,
            "DYNMX" => Self::DYNMX,
            "DYNPTR" => Self::DYNPTR,
            "DYNSRV" => Self::DYNSRV,
            _ => return None,
        };
        Some(t)
    }

    /// True for the private dynamic types.
    #[must_use]
    pub fn is_dynamic(self) -> bool {
        self.static_counterpart().is_some()
    }

    /// The static type a dynamic type expands into.
    #[must_use]
    pub fn static_counterpart(self) -> Option<RecordType> {
        match self {
            Self::DYNC => Some(Self::CNAME),
            Self::DYNA => Some(Self::A),
            Self::DYNAAAA => Some(Self::AAAA),
            Self::DYNTXT => Some(Self::TXT),
            Self::DYNMX => Some(Self::MX),
            Self::DYNPTR => Some(Self::PTR),
            Self::DYNSRV => Some(Self::SRV),
            _ => None,
        }
    }

    /// The dynamic type that expands into this static type.
    #[must_use]
    pub fn dynamic_counterpart(self) -> Option<RecordType> {
        match self {
            Self::CNAME => Some(Self::DYNC),
            Self::A => Some(Self::DYNA),
            Self::AAAA => Some(Self::DYNAAAA),
            Self::TXT => Some(Self::DYNTXT),
            Self::MX => Some(Self::DYNMX),
            Self::PTR => Some(Self::DYNPTR),
            Self::SRV => Some(Self::DYNSRV),
            _ => None,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match *self {
            Self::A => "A",
            Self::NS => "NS",
            Self::CNAME => "CNAME",
            Self::SOA => "SOA",
            Self::PTR => "PTR",
            Self::MX => "MX",
            Self::TXT => "TXT",
            Self::AAAA => "AAAA",
            Self::SRV => "SRV",
            Self::DNAME => "DNAME",
            Self::OPT => "OPT",
            Self::DS => "DS",
            Self::DYNC => "DYNC",
            Self::DYNA => "DYNA",
            Self::DYNAAAA => "DYNAAAA",
            Self::DYNTXT => "DYNTXT",
            Self::DYNMX => "DYNMX",
            Self::DYNPTR => "DYNPTR",
            Self::DYNSRV => "DYNSRV",
            RecordType(code) => return write!(f, "TYPE{code}"),
        };
        f.write_str(token)
    }
}

/// 16-bit RR class code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordClass(pub u16);

impl RecordClass {
    pub const IN: RecordClass = RecordClass(1);
    pub const CH: RecordClass = RecordClass(3);
    pub const ANY: RecordClass = RecordClass(255);
}

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::IN => f.write_str("IN"),
            Self::CH => f.write_str("CH"),
            Self::ANY => f.write_str("ANY"),
            RecordClass(code) => write!(f, "CLASS{code}"),
        }
    }
}

/// Typed rdata for every record type the server serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Ns(String),
    Cname(String),
    Dname(String),
    Ptr(String),
    Soa {
        mname: String,
        rname: String,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    Mx {
        preference: u16,
        exchange: String,
    },
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
    },
    Txt(Vec<String>),
    Ds {
        key_tag: u16,
        algorithm: u8,
        digest_type: u8,
        digest: Vec<u8>,
    },
    /// Rdata of the private dynamic types: the name of a registered
    /// service, resolved at query time.
    Dynamic(String),
}

/// One resource record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Owner name, fully qualified and lower-cased.
    pub name: String,
    pub class: RecordClass,
    pub rtype: RecordType,
    pub ttl: u32,
    pub data: RecordData,
}

impl Record {
    /// Target name carried by name-valued rdata, used for glue and CNAME
    /// chasing.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match &self.data {
            RecordData::Ns(t)
            | RecordData::Cname(t)
            | RecordData::Dname(t)
            | RecordData::Ptr(t)
            | RecordData::Mx { exchange: t, .. }
            | RecordData::Srv { target: t, .. } => Some(t),
            _ => None,
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

impl fmt::Display for Record {
    /// Master-format rendering, reparseable by the zone parser.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {} ", self.name, self.ttl, self.class, self.rtype)?;
        match &self.data {
            RecordData::A(ip) => write!(f, "{ip}"),
            RecordData::Aaaa(ip) => write!(f, "{ip}"),
            RecordData::Ns(t)
            | RecordData::Cname(t)
            | RecordData::Dname(t)
            | RecordData::Ptr(t) => f.write_str(t),
            RecordData::Soa {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => write!(f, "{mname} {rname} {serial} {refresh} {retry} {expire} {minimum}"),
            RecordData::Mx {
                preference,
                exchange,
            } => write!(f, "{preference} {exchange}"),
            RecordData::Srv {
                priority,
                weight,
                port,
                target,
            } => write!(f, "{priority} {weight} {port} {target}"),
            RecordData::Txt(strings) => {
                let quoted: Vec<String> = strings
                    .iter()
                    .map(|s| format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")))
                    .collect();
                f.write_str(&quoted.join(" "))
            }
            RecordData::Ds {
                key_tag,
                algorithm,
                digest_type,
                digest,
            } => write!(f, "{key_tag} {algorithm} {digest_type} {}", hex(digest)),
            RecordData::Dynamic(service) => f.write_str(service),
        }
    }
}
