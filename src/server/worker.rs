// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS workers: one task per (listen address, protocol) binding.
//!
//! Workers share the registries through [`ServerState`] and never hold the
//! reload lock: a query clones the `Arc` of the enclosing zone's tree and
//! resolves against that snapshot, so a reload swapping the registry is
//! invisible to in-flight queries.
//!
//! The resolution algorithm walks the zone tree recursively: exact match
//! (static RRset, CNAME chase or dynamic-service expansion), DNAME at an
//! ancestor, wildcard synthesis, or delegation via the zone cut. A budget
//! caps CNAME/DNAME chains.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tracing::{debug, warn};

use crate::name::{fqdn, labels};
use crate::rr::{Record, RecordClass, RecordData, RecordType};
use crate::server::zones::FindZone;
use crate::server::ServerState;
use crate::service::{RequestContext, ServiceError};
use crate::wire::{rcode, Message};
use crate::zone::{find_zone_cut, ZoneTree};

/// CNAME/DNAME chain budget per query.
const RESOLVE_BUDGET: u8 = 16;
/// Largest DNS message accepted from a client.
const MAX_QUERY_SIZE: usize = 65_535;

/// Internal resolution faults; every variant surfaces as SERVFAIL.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// A non-authoritative node had no zone cut above it.
    #[error("failed to find zone cut")]
    ZoneCutMiss,

    /// The registry claims the zone but carries no tree for it.
    #[error("failed to find zone data in zone node")]
    ZoneDataMissing,

    /// Dynamic expansion failed for a reason other than health.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Transport a query arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proto {
    Udp,
    Tcp,
}

/// One listener binding.
pub struct Worker {
    state: Arc<ServerState>,
}

impl Worker {
    #[must_use]
    pub fn new(state: Arc<ServerState>) -> Self {
        Worker { state }
    }

    /// Serves a bound UDP socket forever.
    pub async fn run_udp(self, socket: UdpSocket) {
        let socket = Arc::new(socket);
        let mut buf = vec![0u8; MAX_QUERY_SIZE];
        loop {
            let (len, peer) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!(error = %e, "udp receive failed");
                    continue;
                }
            };
            let packet = buf[..len].to_vec();
            let state = Arc::clone(&self.state);
            let socket = Arc::clone(&socket);
            tokio::spawn(async move {
                if let Some(reply) = handle_packet(&state, &packet, peer, Proto::Udp).await {
                    if let Err(e) = socket.send_to(&reply, peer).await {
                        debug!(peer = %peer, error = %e, "udp send failed");
                    }
                }
            });
        }
    }

    /// Serves a bound TCP listener forever; each connection gets at most
    /// `max_tcp_queries` queries.
    pub async fn run_tcp(self, listener: TcpListener) {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "tcp accept failed");
                    continue;
                }
            };
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                if let Err(e) = serve_tcp(&state, stream, peer).await {
                    debug!(peer = %peer, error = %e, "tcp connection ended");
                }
            });
        }
    }
}

async fn serve_tcp(
    state: &Arc<ServerState>,
    mut stream: TcpStream,
    peer: SocketAddr,
) -> std::io::Result<()> {
    let max_queries = state.config().max_tcp_queries;
    let mut buf = vec![0u8; MAX_QUERY_SIZE];
    for _ in 0..max_queries {
        let len = match stream.read_u16().await {
            Ok(len) => usize::from(len),
            // Normal connection close between queries.
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };
        stream.read_exact(&mut buf[..len]).await?;
        let Some(reply) = handle_packet(state, &buf[..len], peer, Proto::Tcp).await else {
            continue;
        };
        stream.write_u16(reply.len() as u16).await?;
        stream.write_all(&reply).await?;
    }
    Ok(())
}

/// Parses, dispatches and encodes one query. `None` means no reply should
/// be sent (unparseable packet, or a response arrived on the query port).
pub async fn handle_packet(
    state: &Arc<ServerState>,
    packet: &[u8],
    peer: SocketAddr,
    proto: Proto,
) -> Option<Vec<u8>> {
    let request = match Message::from_bytes(packet) {
        Ok(request) => request,
        Err(e) => {
            debug!(peer = %peer, error = %e, "dropping malformed packet");
            return None;
        }
    };
    if request.flags.qr {
        return None;
    }

    let mut reply = Message::reply_to(&request);
    if request.questions.is_empty() {
        reply.flags.rcode = rcode::FORMERR;
    } else {
        match request.questions[0].qclass {
            RecordClass::CH => serve_chaos(&mut reply, &request),
            RecordClass::IN => {
                if let Err(e) = serve_inet(state, &mut reply, &request, peer) {
                    warn!(
                        peer = %peer,
                        qname = %request.questions[0].name,
                        error = %e,
                        "resolution failed"
                    );
                    reply.flags.rcode = rcode::SERVFAIL;
                }
            }
            _ => reply.flags.rcode = rcode::NOTIMP,
        }
    }

    let encoded = match proto {
        Proto::Udp => reply.to_bytes_udp(request.udp_payload_limit()),
        Proto::Tcp => reply.to_bytes(),
    };
    match encoded {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!(peer = %peer, error = %e, "response encoding failed");
            None
        }
    }
}

/// CHAOS class: the conventional server-identity names, TXT only.
fn serve_chaos(reply: &mut Message, request: &Message) {
    let question = &request.questions[0];
    reply.flags.aa = true;

    if question.qtype != RecordType::TXT {
        reply.flags.rcode = rcode::NXRRSET;
        return;
    }
    let qname = fqdn(&question.name).to_lowercase();
    let text = match qname.as_str() {
        "version.bind." | "version.server." => env!("CARGO_PKG_VERSION"),
        "hostname.bind." | "id.server." => "localhost.",
        _ => {
            reply.flags.rcode = rcode::NXRRSET;
            return;
        }
    };
    reply.answers.push(Record {
        name: question.name.clone(),
        class: RecordClass::IN,
        rtype: RecordType::TXT,
        ttl: 0,
        data: RecordData::Txt(vec![text.to_string()]),
    });
    reply.flags.rcode = rcode::NOERROR;
}

/// INET class: find the enclosing zone, resolve, staple authority and
/// glue.
fn serve_inet(
    state: &Arc<ServerState>,
    reply: &mut Message,
    request: &Message,
    peer: SocketAddr,
) -> Result<(), ResolveError> {
    let question = &request.questions[0];
    let qname = fqdn(&question.name).to_lowercase();
    let qtype = question.qtype;

    let (zone_name, zone_tree) = match state.zones.find_zone(&labels(&qname)) {
        FindZone::None => {
            reply.flags.rcode = rcode::REFUSED;
            return Ok(());
        }
        FindZone::NoData(_) => return Err(ResolveError::ZoneDataMissing),
        FindZone::Found(name, tree) => (name, tree),
    };

    let context = RequestContext {
        query_id: request.id,
        remote: peer,
        ecs: request
            .edns
            .as_ref()
            .map(|edns| edns.ecs.clone())
            .unwrap_or_default(),
    };

    reply.flags.rcode = rcode::NXDOMAIN;
    resolve(
        state,
        reply,
        &context,
        &qname,
        &qname,
        qtype,
        &zone_name,
        &zone_tree,
        RESOLVE_BUDGET,
        false,
    )?;

    let minimum_response = state.config().minimum_response;
    if !reply.answers.is_empty()
        && !minimum_response
        && !(qname == zone_name && qtype == RecordType::NS)
    {
        append_rrset(reply, Section::Authority, &zone_tree, &zone_name, RecordType::NS);
    }
    if !reply.authority.is_empty() && !minimum_response {
        let ns_targets: Vec<String> = reply
            .authority
            .iter()
            .filter_map(|rr| match &rr.data {
                RecordData::Ns(target) => Some(target.clone()),
                _ => None,
            })
            .collect();
        for target in ns_targets {
            append_rrset(reply, Section::Additional, &zone_tree, &target, RecordType::A);
            append_rrset(reply, Section::Additional, &zone_tree, &target, RecordType::AAAA);
        }
    }
    if reply.answers.is_empty() && reply.authority.is_empty() {
        append_rrset(reply, Section::Authority, &zone_tree, &zone_name, RecordType::SOA);
    }
    Ok(())
}

enum Section {
    Authority,
    Additional,
}

/// Copies the RRset of `rtype` at `sname` (exact match only) into a reply
/// section.
fn append_rrset(
    reply: &mut Message,
    section: Section,
    zone_tree: &ZoneTree,
    sname: &str,
    rtype: RecordType,
) {
    let Some(id) = zone_tree.search_node(&labels(sname), true) else {
        return;
    };
    if let Some(rrs) = zone_tree.node(id).value.get(rtype) {
        let target = match section {
            Section::Authority => &mut reply.authority,
            Section::Additional => &mut reply.additional,
        };
        target.extend(rrs.iter().cloned());
    }
}

/// Authoritativeness of a node for a query. DS is special: the parent
/// side of the cut is authoritative for it, so the apex itself is not.
fn is_authoritative(auth: bool, node_label: &str, zone_name: &str, qtype: RecordType) -> bool {
    if qtype == RecordType::DS {
        return zone_name != node_label;
    }
    auth
}

#[allow(clippy::too_many_arguments)]
fn resolve(
    state: &Arc<ServerState>,
    reply: &mut Message,
    context: &RequestContext,
    qname: &str,
    sname: &str,
    qtype: RecordType,
    zone_name: &str,
    zone_tree: &ZoneTree,
    budget: u8,
    is_wildcard: bool,
) -> Result<(), ResolveError> {
    if budget == 0 {
        return Ok(());
    }
    let Some(id) = zone_tree.search_node(&labels(sname), is_wildcard) else {
        return Ok(());
    };
    let node = zone_tree.node(id);

    if !is_authoritative(node.value.auth, node.label(), zone_name, qtype) {
        // Below a zone cut: answer with the delegation.
        let cut = find_zone_cut(zone_tree, id).ok_or(ResolveError::ZoneCutMiss)?;
        let cut_node = zone_tree.node(cut);
        if let Some(rrs) = cut_node.value.get(RecordType::NS) {
            reply.authority.extend(rrs.iter().cloned());
        }
        if let Some(rrs) = cut_node.value.get(RecordType::DS) {
            reply.authority.extend(rrs.iter().cloned());
        }
        reply.flags.rcode = rcode::NOERROR;
        reply.flags.aa = false;
        return Ok(());
    }

    if node.label() == sname {
        reply.flags.rcode = rcode::NOERROR;
        if let Some(rrs) = node.value.get(qtype) {
            for rr in rrs {
                let mut rr = rr.clone();
                if is_wildcard {
                    rr.name = qname.to_string();
                }
                reply.answers.push(rr);
            }
        } else if let Some(rrs) = node.value.get(RecordType::CNAME) {
            let cname = rrs[0].clone();
            let target = cname.target().map(str::to_string);
            reply.answers.push(cname);
            if let Some(target) = target {
                resolve(
                    state, reply, context, &target, &target, qtype, zone_name, zone_tree,
                    budget - 1, false,
                )?;
            }
        } else if let Some(dynamic_type) = qtype.dynamic_counterpart() {
            if let Some(rrs) = node.value.get(dynamic_type) {
                let dynamic_rr = &rrs[0];
                if let RecordData::Dynamic(service) = &dynamic_rr.data {
                    match state.services.get_records(context, qtype, service) {
                        Ok(resources) => {
                            for mut rr in resources {
                                rr.name = qname.to_string();
                                rr.class = dynamic_rr.class;
                                rr.ttl = dynamic_rr.ttl;
                                reply.answers.push(rr);
                            }
                        }
                        // No healthy backend: a positive name with an empty
                        // answer, closed by the negative SOA.
                        Err(ServiceError::StatusFailed) => {}
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
    } else if let Some(rrs) = node.value.get(RecordType::DNAME) {
        let mut dname = rrs[0].clone();
        dname.name = qname.to_string();
        dname.ttl = 0;
        reply.authority.push(dname);
    } else if !is_wildcard {
        let sname_labels = labels(sname);
        let parent = sname_labels
            .get(1..)
            .map(|rest| rest.join("."))
            .unwrap_or_default();
        let wildcard = fqdn(&format!("*.{parent}"));
        resolve(
            state, reply, context, qname, &wildcard, qtype, zone_name, zone_tree, budget - 1,
            true,
        )?;
    }
    reply.flags.aa = true;
    Ok(())
}
