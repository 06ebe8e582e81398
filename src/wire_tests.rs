// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `wire.rs`

use std::net::{IpAddr, Ipv4Addr};

use crate::rr::{Record, RecordClass, RecordData, RecordType};
use crate::wire::{Edns, EcsOption, Flags, Message, Question};

fn query(name: &str, qtype: RecordType) -> Message {
    Message {
        id: 0x1234,
        flags: Flags {
            rd: true,
            ..Flags::default()
        },
        questions: vec![Question {
            name: name.to_string(),
            qtype,
            qclass: RecordClass::IN,
        }],
        ..Message::default()
    }
}

#[test]
fn test_query_round_trip() {
    let msg = query("www.example.jp.", RecordType::A);
    let bytes = msg.to_bytes().unwrap();
    let decoded = Message::from_bytes(&bytes).unwrap();
    assert_eq!(decoded.id, 0x1234);
    assert!(decoded.flags.rd);
    assert!(!decoded.flags.qr);
    assert_eq!(decoded.questions.len(), 1);
    assert_eq!(decoded.questions[0].name, "www.example.jp.");
    assert_eq!(decoded.questions[0].qtype, RecordType::A);
}

#[test]
fn test_response_round_trip_all_rdata() {
    let mut msg = query("example.jp.", RecordType::A);
    msg.flags.qr = true;
    msg.flags.aa = true;
    msg.answers = vec![
        Record {
            name: "www.example.jp.".to_string(),
            class: RecordClass::IN,
            rtype: RecordType::A,
            ttl: 300,
            data: RecordData::A(Ipv4Addr::new(192, 0, 2, 1)),
        },
        Record {
            name: "www.example.jp.".to_string(),
            class: RecordClass::IN,
            rtype: RecordType::AAAA,
            ttl: 300,
            data: RecordData::Aaaa("2001:db8::1".parse().unwrap()),
        },
        Record {
            name: "mail.example.jp.".to_string(),
            class: RecordClass::IN,
            rtype: RecordType::MX,
            ttl: 300,
            data: RecordData::Mx {
                preference: 10,
                exchange: "mx.example.jp.".to_string(),
            },
        },
        Record {
            name: "srv.example.jp.".to_string(),
            class: RecordClass::IN,
            rtype: RecordType::SRV,
            ttl: 300,
            data: RecordData::Srv {
                priority: 10,
                weight: 20,
                port: 5060,
                target: "sip.example.jp.".to_string(),
            },
        },
        Record {
            name: "txt.example.jp.".to_string(),
            class: RecordClass::IN,
            rtype: RecordType::TXT,
            ttl: 300,
            data: RecordData::Txt(vec!["hello".to_string(), "world".to_string()]),
        },
    ];
    msg.authority = vec![Record {
        name: "example.jp.".to_string(),
        class: RecordClass::IN,
        rtype: RecordType::SOA,
        ttl: 900,
        data: RecordData::Soa {
            mname: "ns1.example.jp.".to_string(),
            rname: "hostmaster.example.jp.".to_string(),
            serial: 1,
            refresh: 3600,
            retry: 900,
            expire: 1_814_400,
            minimum: 900,
        },
    }];

    let bytes = msg.to_bytes().unwrap();
    let decoded = Message::from_bytes(&bytes).unwrap();
    assert!(decoded.flags.aa);
    assert_eq!(decoded.answers, msg.answers);
    assert_eq!(decoded.authority, msg.authority);
}

#[test]
fn test_compression_pointer_decode() {
    // Header + question for www.example.jp./A, then an answer whose owner
    // is a pointer to offset 12 (the question name).
    let mut bytes = query("www.example.jp.", RecordType::A).to_bytes().unwrap();
    bytes[7] = 1; // ancount = 1
    bytes.extend_from_slice(&[0xC0, 12]); // pointer to question name
    bytes.extend_from_slice(&RecordType::A.0.to_be_bytes());
    bytes.extend_from_slice(&RecordClass::IN.0.to_be_bytes());
    bytes.extend_from_slice(&300u32.to_be_bytes());
    bytes.extend_from_slice(&4u16.to_be_bytes());
    bytes.extend_from_slice(&[192, 0, 2, 1]);

    let decoded = Message::from_bytes(&bytes).unwrap();
    assert_eq!(decoded.answers.len(), 1);
    assert_eq!(decoded.answers[0].name, "www.example.jp.");
    assert_eq!(decoded.answers[0].data, RecordData::A(Ipv4Addr::new(192, 0, 2, 1)));
}

#[test]
fn test_ecs_option_decode() {
    let mut msg = query("www.example.jp.", RecordType::A);
    msg.edns = Some(Edns {
        payload_size: 1232,
        ecs: Vec::new(),
    });
    let mut bytes = msg.to_bytes().unwrap();

    // Rewrite the plain OPT rdata to carry an ECS option for 81.2.69.0/24.
    let opt_rdata: Vec<u8> = {
        let mut o = Vec::new();
        o.extend_from_slice(&8u16.to_be_bytes()); // option code
        o.extend_from_slice(&7u16.to_be_bytes()); // option length
        o.extend_from_slice(&1u16.to_be_bytes()); // family IPv4
        o.push(24); // source prefix
        o.push(0); // scope prefix
        o.extend_from_slice(&[81, 2, 69]);
        o
    };
    let len = bytes.len();
    bytes.truncate(len - 2); // strip the zero rdlen of the plain OPT
    bytes.extend_from_slice(&(opt_rdata.len() as u16).to_be_bytes());
    bytes.extend_from_slice(&opt_rdata);

    let decoded = Message::from_bytes(&bytes).unwrap();
    let edns = decoded.edns.expect("OPT decoded");
    assert_eq!(
        edns.ecs,
        vec![EcsOption {
            family: 1,
            source_prefix: 24,
            scope_prefix: 0,
            addr: IpAddr::V4(Ipv4Addr::new(81, 2, 69, 0)),
        }]
    );
}

#[test]
fn test_reply_to_copies_question_and_echoes_edns() {
    let mut req = query("www.example.jp.", RecordType::A);
    req.edns = Some(Edns {
        payload_size: 4096,
        ecs: Vec::new(),
    });
    let reply = Message::reply_to(&req);
    assert_eq!(reply.id, req.id);
    assert!(reply.flags.qr);
    assert!(reply.flags.rd);
    assert_eq!(reply.questions, req.questions);
    assert!(reply.edns.is_some());
}

#[test]
fn test_udp_truncation_sets_tc() {
    let mut msg = query("www.example.jp.", RecordType::TXT);
    msg.flags.qr = true;
    for i in 0..100 {
        msg.answers.push(Record {
            name: "www.example.jp.".to_string(),
            class: RecordClass::IN,
            rtype: RecordType::TXT,
            ttl: 300,
            data: RecordData::Txt(vec![format!("padding padding padding {i}")]),
        });
    }
    let bytes = msg.to_bytes_udp(512).unwrap();
    assert!(bytes.len() <= 512);
    let decoded = Message::from_bytes(&bytes).unwrap();
    assert!(decoded.flags.tc);
    assert!(decoded.answers.is_empty());
}

#[test]
fn test_bad_pointer_rejected() {
    // A name that is a pointer to itself.
    let mut bytes = vec![0u8; 12];
    bytes[5] = 1; // qdcount = 1
    bytes.extend_from_slice(&[0xC0, 12]);
    bytes.extend_from_slice(&RecordType::A.0.to_be_bytes());
    bytes.extend_from_slice(&RecordClass::IN.0.to_be_bytes());
    assert!(Message::from_bytes(&bytes).is_err());
}
