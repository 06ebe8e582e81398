// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Domain-name helpers shared by the zone tree, the resolver and the
//! service endpoints.
//!
//! All name comparisons in the server are done on lower-cased, fully
//! qualified names; these helpers are the single place that normalisation
//! happens.

/// Returns `name` with a trailing dot appended when missing.
///
/// The empty string normalises to the root name `"."`.
#[must_use]
pub fn fqdn(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

/// Splits a domain name into its label components, lower-cased.
///
/// The root label is implicit: `"www.example.jp."` yields
/// `["www", "example", "jp"]` and both `"."` and `""` yield an empty
/// vector.
#[must_use]
pub fn labels(name: &str) -> Vec<String> {
    name.trim_end_matches('.')
        .split('.')
        .filter(|l| !l.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Address family of an IP literal: `Some(4)`, `Some(6)`, or `None` when
/// the string is not an IP address at all.
#[must_use]
pub fn ip_family(value: &str) -> Option<u8> {
    match value.parse::<std::net::IpAddr>() {
        Ok(std::net::IpAddr::V4(_)) => Some(4),
        Ok(std::net::IpAddr::V6(_)) => Some(6),
        Err(_) => None,
    }
}

/// Loose syntactic check for a domain name: non-empty labels of at most 63
/// octets, 255 octets total, made of letters, digits, `-`, `_` or `*`.
///
/// This is the validation applied to endpoint values of name-valued RR
/// types (CNAME, PTR, MX exchange, SRV target); it intentionally accepts
/// both relative and fully qualified spellings.
#[must_use]
pub fn is_domain_name(name: &str) -> bool {
    let trimmed = name.trim_end_matches('.');
    if trimmed.is_empty() || name.len() > 255 {
        return false;
    }
    trimmed.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '*')
    })
}
