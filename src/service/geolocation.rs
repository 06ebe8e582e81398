// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Geolocation: routes by the querier's location.
//!
//! Source addresses are taken from every EDNS0 Client Subnet option first
//! (an IPv4 database serves family 1, an IPv6 database family 2), then from
//! the transport remote address. The first address that resolves to a
//! configured location key wins; keys are matched in subdivision → country
//! → continent order against upper-cased ISO codes, and a `DEFAULT` child
//! is mandatory as the fallback.

use std::collections::BTreeMap;
use std::net::IpAddr;

use maxminddb::geoip2;
use serde_yaml::Value;

use crate::rr::Record;
use crate::service::{
    field, str_field, RequestContext, ServiceBuild, ServiceError, ServiceNode, ServicePlugins,
};

/// Location key of the mandatory fallback child.
const DEFAULT_LOCATION: &str = "DEFAULT";

pub struct Geolocation {
    ipv4_db: Option<maxminddb::Reader<Vec<u8>>>,
    ipv6_db: Option<maxminddb::Reader<Vec<u8>>>,
    locations: BTreeMap<String, Box<dyn ServiceNode>>,
    path: String,
}

/// The location facts extracted from one database lookup, in match order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GeoRecord {
    pub subdivisions: Vec<String>,
    pub country: Option<String>,
    pub continent: Option<String>,
}

pub fn new(
    plugins: &ServicePlugins,
    build: &mut ServiceBuild,
    path: String,
    node: &Value,
) -> Result<Box<dyn ServiceNode>, ServiceError> {
    let geodb = field(node, "geodbfile").ok_or_else(|| ServiceError::Config {
        path: path.clone(),
        reason: "missing 'geodbfile'".to_string(),
    })?;

    let open = |file: &str| {
        maxminddb::Reader::open_readfile(file).map_err(|e| ServiceError::Config {
            path: path.clone(),
            reason: format!("cannot open geo database '{file}': {e}"),
        })
    };
    let (ipv4_db, ipv6_db) = match geodb {
        Value::String(file) => (Some(open(file)?), None),
        Value::Mapping(_) => {
            let ipv4 = str_field(geodb, "ipv4").map(|f| open(&f)).transpose()?;
            let ipv6 = str_field(geodb, "ipv6").map(|f| open(&f)).transpose()?;
            (ipv4, ipv6)
        }
        _ => {
            return Err(ServiceError::Config {
                path,
                reason: "'geodbfile' must be a path or an {ipv4, ipv6} mapping".to_string(),
            })
        }
    };

    let locations_node = field(node, "locations")
        .and_then(Value::as_mapping)
        .ok_or_else(|| ServiceError::Config {
            path: path.clone(),
            reason: "missing 'locations' mapping".to_string(),
        })?;

    let mut locations = BTreeMap::new();
    for (key, child) in locations_node {
        let location = key.as_str().ok_or_else(|| ServiceError::Config {
            path: path.clone(),
            reason: "location keys must be strings".to_string(),
        })?;
        let child_path = format!("{path}.locations.{}", location.to_lowercase());
        let next = plugins.create(build, child_path, child)?;
        locations.insert(location.to_uppercase(), next);
    }

    if !locations.contains_key(DEFAULT_LOCATION) {
        return Err(ServiceError::Config {
            path,
            reason: "DEFAULT location is not found".to_string(),
        });
    }

    Ok(Box::new(Geolocation {
        ipv4_db,
        ipv6_db,
        locations,
        path,
    }))
}

impl Geolocation {
    /// Looks up every candidate source address, ECS options before the
    /// transport address.
    fn geo_records(&self, request: &RequestContext) -> Vec<GeoRecord> {
        let mut records = Vec::new();
        for ecs in &request.ecs {
            let db = match ecs.family {
                1 => self.ipv4_db.as_ref(),
                2 => self.ipv6_db.as_ref(),
                _ => None,
            };
            if let Some(record) = db.and_then(|db| lookup(db, ecs.addr)) {
                records.push(record);
            }
        }
        let remote = request.remote.ip();
        let db = match remote {
            IpAddr::V4(_) => self.ipv4_db.as_ref(),
            IpAddr::V6(_) => self.ipv6_db.as_ref(),
        };
        if let Some(record) = db.and_then(|db| lookup(db, remote)) {
            records.push(record);
        }
        records
    }
}

impl ServiceNode for Geolocation {
    fn get_records(&self, request: &RequestContext) -> Result<Vec<Record>, ServiceError> {
        for record in self.geo_records(request) {
            if let Some(key) = match_location(&record, |key| self.locations.contains_key(key)) {
                return self.locations[&key].get_records(request);
            }
        }
        self.locations[DEFAULT_LOCATION].get_records(request)
    }

    fn path(&self) -> &str {
        &self.path
    }
}

fn lookup(db: &maxminddb::Reader<Vec<u8>>, addr: IpAddr) -> Option<GeoRecord> {
    let city: geoip2::City = db.lookup(addr).ok()?;
    Some(GeoRecord {
        subdivisions: city
            .subdivisions
            .unwrap_or_default()
            .iter()
            .filter_map(|s| s.iso_code)
            .map(str::to_string)
            .collect(),
        country: city
            .country
            .and_then(|c| c.iso_code)
            .map(str::to_string),
        continent: city
            .continent
            .and_then(|c| c.code)
            .map(str::to_string),
    })
}

/// Picks the winning location key for one lookup result: subdivision ISO
/// code first, then country ISO code, then continent code.
pub fn match_location<F>(record: &GeoRecord, has_location: F) -> Option<String>
where
    F: Fn(&str) -> bool,
{
    for sub in &record.subdivisions {
        if has_location(sub) {
            return Some(sub.clone());
        }
    }
    if let Some(country) = &record.country {
        if has_location(country) {
            return Some(country.clone());
        }
    }
    if let Some(continent) = &record.continent {
        if has_location(continent) {
            return Some(continent.clone());
        }
    }
    None
}
