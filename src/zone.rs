// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Zone-file parsing, zone-tree construction and verification.
//!
//! Zone data arrives in standard master-file syntax (`$ORIGIN`, `$TTL`,
//! parentheses continuation, `;` comments, quoted strings, `@`, relative
//! owners, inherited owner/TTL/class) extended with the seven private
//! dynamic types whose rdata is a single service-name token. A parsed zone
//! becomes a [`ZoneTree`]: a label trie whose nodes carry RRsets and an
//! authoritative flag that turns false at and below delegation points.
//!
//! Parsing works on owned data only; nothing here touches the live
//! registries, so a reload can parse without holding any lock.

use std::collections::HashMap;

use thiserror::Error;

use crate::name::{fqdn, labels};
use crate::rr::{Record, RecordClass, RecordData, RecordType};
use crate::tree::{NameTree, NodeId};

/// Errors raised while parsing or verifying a zone.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ZoneError {
    /// Master-file syntax error.
    #[error("zone parse error at line {line}: {reason}")]
    Parse {
        /// 1-based logical line (parenthesised groups count once)
        line: usize,
        /// What went wrong
        reason: String,
    },

    /// The zone apex has no node in the tree at all.
    #[error("apex node is empty")]
    EmptyApex,

    /// No SOA record at the apex.
    #[error("SOA RR is empty")]
    MissingSoa,

    /// More than one SOA record at the apex.
    #[error("more than 1 SOA RR found")]
    DuplicateSoa,

    /// No NS set at the apex.
    #[error("apex NS not found")]
    MissingApexNs,

    /// A name owns more than one CNAME.
    #[error("more than 1 CNAME RR found at '{name}'")]
    DuplicateCname { name: String },

    /// A CNAME owner also owns RRs of another type.
    #[error("found other RR in CNAME node '{name}'")]
    ForeignRrAtCname { name: String },

    /// A name owns more than one DNAME.
    #[error("more than 1 DNAME RR found at '{name}'")]
    DuplicateDname { name: String },

    /// A DNAME owner has child names.
    #[error("found child node under DNAME node '{name}'")]
    ChildUnderDname { name: String },

    /// A dynamic record references a service that is not registered.
    #[error("zone '{zone}': record '{name}' references unknown service '{service}'")]
    ServiceNotFound {
        zone: String,
        name: String,
        service: String,
    },
}

/// Per-node zone payload: the RRsets owned by this name plus the
/// authoritative flag (false at and below a zone cut).
#[derive(Debug, Default)]
pub struct ZoneNode {
    records: HashMap<RecordType, Vec<Record>>,
    pub auth: bool,
}

impl ZoneNode {
    /// RRset of one type, if present.
    #[must_use]
    pub fn get(&self, rtype: RecordType) -> Option<&[Record]> {
        self.records.get(&rtype).map(Vec::as_slice)
    }

    /// Appends a record under its type.
    pub fn push(&mut self, record: Record) {
        self.records.entry(record.rtype).or_default().push(record);
    }

    /// Iterate over all RRsets at this name.
    pub fn rrsets(&self) -> impl Iterator<Item = (&RecordType, &Vec<Record>)> {
        self.records.iter()
    }
}

/// A loaded zone: label trie of [`ZoneNode`]s.
pub type ZoneTree = NameTree<ZoneNode>;

// ---------------------------------------------------------------------------
// Lexing
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct LogicalLine {
    /// 1-based line number where the entry started.
    number: usize,
    /// Entry began with blank space: the owner is inherited.
    leading_ws: bool,
    tokens: Vec<Token>,
}

#[derive(Debug)]
struct Token {
    text: String,
    quoted: bool,
}

/// Splits master-file text into logical lines of tokens, honouring
/// comments, quoted strings and parentheses continuation.
fn lex(input: &str) -> Result<Vec<LogicalLine>, ZoneError> {
    let mut lines = Vec::new();
    let mut current: Option<LogicalLine> = None;
    let mut parens: u32 = 0;

    for (idx, raw) in input.lines().enumerate() {
        let number = idx + 1;
        let leading_ws = raw.starts_with(' ') || raw.starts_with('\t');
        let mut chars = raw.chars().peekable();
        let mut line = current.take().unwrap_or(LogicalLine {
            number,
            leading_ws,
            tokens: Vec::new(),
        });

        while let Some(c) = chars.next() {
            match c {
                ';' => break,
                '(' => parens += 1,
                ')' => {
                    parens = parens.checked_sub(1).ok_or(ZoneError::Parse {
                        line: number,
                        reason: "unbalanced ')'".to_string(),
                    })?;
                }
                '"' => {
                    let mut text = String::new();
                    loop {
                        match chars.next() {
                            Some('"') => break,
                            Some('\\') => match chars.next() {
                                Some(esc) => text.push(esc),
                                None => {
                                    return Err(ZoneError::Parse {
                                        line: number,
                                        reason: "unterminated escape in quoted string"
                                            .to_string(),
                                    })
                                }
                            },
                            Some(inner) => text.push(inner),
                            None => {
                                return Err(ZoneError::Parse {
                                    line: number,
                                    reason: "unterminated quoted string".to_string(),
                                })
                            }
                        }
                    }
                    line.tokens.push(Token { text, quoted: true });
                }
                c if c.is_whitespace() => {}
                c => {
                    let mut text = String::new();
                    text.push(c);
                    while let Some(&next) = chars.peek() {
                        if next.is_whitespace() || next == ';' || next == '(' || next == ')' {
                            break;
                        }
                        text.push(next);
                        chars.next();
                    }
                    line.tokens.push(Token {
                        text,
                        quoted: false,
                    });
                }
            }
        }

        if parens > 0 {
            current = Some(line);
        } else if !line.tokens.is_empty() {
            lines.push(line);
        }
    }

    if parens > 0 {
        return Err(ZoneError::Parse {
            line: input.lines().count(),
            reason: "unbalanced '(' at end of input".to_string(),
        });
    }
    Ok(lines)
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn parse_err(line: usize, reason: impl Into<String>) -> ZoneError {
    ZoneError::Parse {
        line,
        reason: reason.into(),
    }
}

/// Resolves a possibly-relative name token against the origin.
fn resolve_name(token: &str, origin: &str) -> String {
    if token == "@" {
        origin.to_lowercase()
    } else if token.ends_with('.') {
        token.to_lowercase()
    } else {
        format!("{}.{}", token.to_lowercase(), origin.to_lowercase())
    }
}

fn parse_u32(token: &str, line: usize, what: &str) -> Result<u32, ZoneError> {
    token
        .parse::<u32>()
        .map_err(|_| parse_err(line, format!("invalid {what} '{token}'")))
}

fn parse_u16(token: &str, line: usize, what: &str) -> Result<u16, ZoneError> {
    token
        .parse::<u16>()
        .map_err(|_| parse_err(line, format!("invalid {what} '{token}'")))
}

/// Parses master-file text into records. `origin` is the zone apex; owner,
/// TTL and class inherit from preceding entries as usual.
pub fn parse_zone(input: &str, origin: &str) -> Result<Vec<Record>, ZoneError> {
    let mut origin = fqdn(origin).to_lowercase();
    let mut default_ttl: u32 = 3600;
    let mut last_owner: Option<String> = None;
    let mut last_class = RecordClass::IN;
    let mut records = Vec::new();

    for line in lex(input)? {
        let number = line.number;
        let mut tokens = line.tokens.into_iter().peekable();

        // Directives.
        let is_directive = !line.leading_ws
            && tokens
                .peek()
                .is_some_and(|t| !t.quoted && t.text.starts_with('$'));
        if is_directive {
            let directive = tokens
                .next()
                .ok_or_else(|| parse_err(number, "missing directive"))?;
            let arg = tokens
                .next()
                .ok_or_else(|| parse_err(number, "directive missing argument"))?;
            match directive.text.to_ascii_uppercase().as_str() {
                "$ORIGIN" => origin = fqdn(&arg.text).to_lowercase(),
                "$TTL" => default_ttl = parse_u32(&arg.text, number, "$TTL")?,
                other => return Err(parse_err(number, format!("unsupported directive {other}"))),
            }
            continue;
        }

        // Owner.
        let owner = if line.leading_ws {
            last_owner
                .clone()
                .ok_or_else(|| parse_err(number, "no previous owner to inherit"))?
        } else {
            let token = tokens
                .next()
                .ok_or_else(|| parse_err(number, "missing owner name"))?;
            resolve_name(&token.text, &origin)
        };
        last_owner = Some(owner.clone());

        // Optional TTL and class, in either order, then the type token.
        let mut ttl = default_ttl;
        let mut class = last_class;
        let rtype = loop {
            let token = tokens
                .next()
                .ok_or_else(|| parse_err(number, "missing RR type"))?;
            let upper = token.text.to_ascii_uppercase();
            if token.text.chars().all(|c| c.is_ascii_digit()) {
                ttl = parse_u32(&token.text, number, "TTL")?;
            } else if upper == "IN" {
                class = RecordClass::IN;
            } else if upper == "CH" {
                class = RecordClass::CH;
            } else if let Some(rtype) = RecordType::from_token(&token.text) {
                break rtype;
            } else {
                return Err(parse_err(number, format!("unknown RR type '{}'", token.text)));
            }
        };
        last_class = class;
        default_ttl = ttl;

        let rest: Vec<Token> = tokens.collect();
        let data = parse_rdata(rtype, &rest, &origin, number)?;
        records.push(Record {
            name: owner,
            class,
            rtype,
            ttl,
            data,
        });
    }

    Ok(records)
}

fn expect_args(rest: &[Token], count: usize, line: usize, what: &str) -> Result<(), ZoneError> {
    if rest.len() == count {
        Ok(())
    } else {
        Err(parse_err(
            line,
            format!("{what} takes {count} field(s), got {}", rest.len()),
        ))
    }
}

fn parse_rdata(
    rtype: RecordType,
    rest: &[Token],
    origin: &str,
    line: usize,
) -> Result<RecordData, ZoneError> {
    let data = match rtype {
        RecordType::A => {
            expect_args(rest, 1, line, "A")?;
            RecordData::A(
                rest[0]
                    .text
                    .parse()
                    .map_err(|_| parse_err(line, "invalid IPv4 address"))?,
            )
        }
        RecordType::AAAA => {
            expect_args(rest, 1, line, "AAAA")?;
            RecordData::Aaaa(
                rest[0]
                    .text
                    .parse()
                    .map_err(|_| parse_err(line, "invalid IPv6 address"))?,
            )
        }
        RecordType::NS => {
            expect_args(rest, 1, line, "NS")?;
            RecordData::Ns(resolve_name(&rest[0].text, origin))
        }
        RecordType::CNAME => {
            expect_args(rest, 1, line, "CNAME")?;
            RecordData::Cname(resolve_name(&rest[0].text, origin))
        }
        RecordType::DNAME => {
            expect_args(rest, 1, line, "DNAME")?;
            RecordData::Dname(resolve_name(&rest[0].text, origin))
        }
        RecordType::PTR => {
            expect_args(rest, 1, line, "PTR")?;
            RecordData::Ptr(resolve_name(&rest[0].text, origin))
        }
        RecordType::SOA => {
            expect_args(rest, 7, line, "SOA")?;
            RecordData::Soa {
                mname: resolve_name(&rest[0].text, origin),
                rname: resolve_name(&rest[1].text, origin),
                serial: parse_u32(&rest[2].text, line, "SOA serial")?,
                refresh: parse_u32(&rest[3].text, line, "SOA refresh")?,
                retry: parse_u32(&rest[4].text, line, "SOA retry")?,
                expire: parse_u32(&rest[5].text, line, "SOA expire")?,
                minimum: parse_u32(&rest[6].text, line, "SOA minimum")?,
            }
        }
        RecordType::MX => {
            expect_args(rest, 2, line, "MX")?;
            RecordData::Mx {
                preference: parse_u16(&rest[0].text, line, "MX preference")?,
                exchange: resolve_name(&rest[1].text, origin),
            }
        }
        RecordType::SRV => {
            expect_args(rest, 4, line, "SRV")?;
            RecordData::Srv {
                priority: parse_u16(&rest[0].text, line, "SRV priority")?,
                weight: parse_u16(&rest[1].text, line, "SRV weight")?,
                port: parse_u16(&rest[2].text, line, "SRV port")?,
                target: resolve_name(&rest[3].text, origin),
            }
        }
        RecordType::TXT => {
            if rest.is_empty() {
                return Err(parse_err(line, "TXT needs at least one string"));
            }
            RecordData::Txt(rest.iter().map(|t| t.text.clone()).collect())
        }
        RecordType::DS => {
            expect_args(rest, 4, line, "DS")?;
            let digest = (0..rest[3].text.len())
                .step_by(2)
                .map(|i| {
                    u8::from_str_radix(rest[3].text.get(i..i + 2).unwrap_or("xx"), 16)
                        .map_err(|_| parse_err(line, "invalid DS digest hex"))
                })
                .collect::<Result<Vec<u8>, ZoneError>>()?;
            RecordData::Ds {
                key_tag: parse_u16(&rest[0].text, line, "DS key tag")?,
                algorithm: parse_u16(&rest[1].text, line, "DS algorithm")? as u8,
                digest_type: parse_u16(&rest[2].text, line, "DS digest type")? as u8,
                digest,
            }
        }
        _ if rtype.is_dynamic() => {
            expect_args(rest, 1, line, "dynamic RR")?;
            RecordData::Dynamic(rest[0].text.clone())
        }
        other => return Err(parse_err(line, format!("unsupported RR type {other}"))),
    };
    Ok(data)
}

// ---------------------------------------------------------------------------
// Tree construction & verification
// ---------------------------------------------------------------------------

/// Builds a zone tree from parsed records and collects the names of every
/// service referenced by a dynamic record. The tree root is authoritative;
/// a non-apex NS owner and everything below it is not.
#[must_use]
pub fn build_zone_tree(records: Vec<Record>, origin: &str) -> (ZoneTree, Vec<String>) {
    let origin = fqdn(origin).to_lowercase();
    let mut tree: ZoneTree = NameTree::new();
    tree.node_mut(tree.root()).value.auth = true;
    let mut services = Vec::new();

    for record in records {
        if let RecordData::Dynamic(service) = &record.data {
            if !services.contains(service) {
                services.push(service.clone());
            }
        }
        let owner_labels = labels(&record.name);
        let id = tree.add_node_with(&owner_labels, |parent| ZoneNode {
            records: HashMap::new(),
            auth: parent.auth,
        });
        let delegation = record.rtype == RecordType::NS && fqdn(&record.name) != origin;
        let node = tree.node_mut(id);
        node.value.push(record);
        if delegation {
            node.value.auth = false;
        }
    }

    (tree, services)
}

/// Verifies zone structure: apex present with exactly one SOA and at least
/// one NS, CNAME exclusivity (DNAME next to a CNAME is tolerated), DNAME
/// uniqueness and childlessness — recursively below the apex.
pub fn verify_zone(tree: &ZoneTree, origin_labels: &[String]) -> Result<(), ZoneError> {
    let apex = tree
        .search_node(origin_labels, true)
        .ok_or(ZoneError::EmptyApex)?;
    let apex_node = tree.node(apex);
    let soa = apex_node.value.get(RecordType::SOA).ok_or(ZoneError::MissingSoa)?;
    if soa.len() > 1 {
        return Err(ZoneError::DuplicateSoa);
    }
    if apex_node.value.get(RecordType::NS).is_none() {
        return Err(ZoneError::MissingApexNs);
    }
    verify_node(tree, apex)
}

fn verify_node(tree: &ZoneTree, id: NodeId) -> Result<(), ZoneError> {
    let node = tree.node(id);
    let name = node.label().to_string();

    if let Some(cname) = node.value.get(RecordType::CNAME) {
        if cname.len() > 1 {
            return Err(ZoneError::DuplicateCname { name });
        }
        let foreign = node
            .value
            .rrsets()
            .any(|(&t, _)| t != RecordType::CNAME && t != RecordType::DNAME);
        if foreign {
            return Err(ZoneError::ForeignRrAtCname { name });
        }
    }
    if let Some(dname) = node.value.get(RecordType::DNAME) {
        if dname.len() > 1 {
            return Err(ZoneError::DuplicateDname { name });
        }
        if !node.children().is_empty() {
            return Err(ZoneError::ChildUnderDname { name });
        }
    }

    for &child in node.children().values() {
        verify_node(tree, child)?;
    }
    Ok(())
}

/// Walks upward from a non-authoritative node to the delegation point: the
/// first ancestor-or-self whose parent is authoritative. Returns `None`
/// when called on an authoritative node.
#[must_use]
pub fn find_zone_cut(tree: &ZoneTree, id: NodeId) -> Option<NodeId> {
    if tree.node(id).value.auth {
        return None;
    }
    let mut current = id;
    while let Some(parent) = tree.node(current).parent() {
        if tree.node(parent).value.auth {
            return Some(current);
        }
        current = parent;
    }
    None
}

/// Serialises a zone tree back to master format. The SOA leads; remaining
/// records follow in name order so output is stable across runs.
#[must_use]
pub fn write_zone(tree: &ZoneTree) -> String {
    let mut soa_lines = Vec::new();
    let mut lines = Vec::new();
    tree.walk(|_, node| {
        for (&rtype, rrs) in node.value.rrsets() {
            for rr in rrs {
                if rtype == RecordType::SOA {
                    soa_lines.push(rr.to_string());
                } else {
                    lines.push(rr.to_string());
                }
            }
        }
    });
    lines.sort();
    let mut out = String::new();
    for line in soa_lines.into_iter().chain(lines) {
        out.push_str(&line);
        out.push('\n');
    }
    out
}
