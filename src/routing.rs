// Copyright (c) "bolt-core" contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::sync::Arc;

use crate::address::Address;
use crate::bolt::BoltMeta;
use crate::error::{BoltError, Result};
use crate::value::ValueReceive;

/// Role a server plays according to the routing table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ServerRole {
    Read,
    Write,
    Route,
}

impl ServerRole {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "READ" => Some(Self::Read),
            "WRITE" => Some(Self::Write),
            "ROUTE" => Some(Self::Route),
            _ => None,
        }
    }
}

/// The raw routing table as produced by a ROUTE response (or, before Bolt
/// 4.3, by the routing-table procedure record). Caching and staleness
/// tracking are the caller's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    pub ttl: i64,
    pub db: Option<String>,
    pub readers: Vec<Arc<Address>>,
    pub writers: Vec<Arc<Address>>,
    pub routers: Vec<Arc<Address>>,
}

impl RoutingTable {
    /// Parse a ROUTE SUCCESS metadata dictionary; the table lives under the
    /// `rt` key.
    pub(crate) fn try_parse(mut meta: BoltMeta) -> Result<Self> {
        let rt = meta
            .remove("rt")
            .ok_or_else(|| BoltError::protocol_error("ROUTE response missing 'rt' entry"))?;
        let rt = rt
            .try_into_map()
            .map_err(|v| BoltError::protocol_error(format!("'rt' was not a map, found {v:?}")))?;
        Self::try_parse_table(rt)
    }

    fn try_parse_table(mut rt: HashMap<String, ValueReceive>) -> Result<Self> {
        let ttl = rt
            .remove("ttl")
            .and_then(|ttl| ttl.try_into_int().ok())
            .ok_or_else(|| BoltError::protocol_error("routing table missing int 'ttl'"))?;
        let db = match rt.remove("db") {
            None | Some(ValueReceive::Null) => None,
            Some(ValueReceive::String(db)) => Some(db),
            Some(v) => {
                return Err(BoltError::protocol_error(format!(
                    "routing table 'db' was not a string, found {v:?}"
                )))
            }
        };
        let servers = rt
            .remove("servers")
            .and_then(|servers| servers.try_into_list().ok())
            .ok_or_else(|| BoltError::protocol_error("routing table missing list 'servers'"))?;

        let mut table = Self {
            ttl,
            db,
            readers: Vec::new(),
            writers: Vec::new(),
            routers: Vec::new(),
        };
        for server in servers {
            let mut server = server.try_into_map().map_err(|v| {
                BoltError::protocol_error(format!("server entry was not a map, found {v:?}"))
            })?;
            let role = server
                .remove("role")
                .and_then(|role| role.try_into_string().ok())
                .ok_or_else(|| BoltError::protocol_error("server entry missing string 'role'"))?;
            let addresses = server
                .remove("addresses")
                .and_then(|addresses| addresses.try_into_list().ok())
                .ok_or_else(|| {
                    BoltError::protocol_error("server entry missing list 'addresses'")
                })?;
            let addresses = addresses
                .into_iter()
                .map(|address| {
                    address
                        .try_into_string()
                        .map(|address| Arc::new(Address::from(address.as_str())))
                        .map_err(|v| {
                            BoltError::protocol_error(format!(
                                "server address was not a string, found {v:?}"
                            ))
                        })
                })
                .collect::<Result<Vec<_>>>()?;
            match ServerRole::from_str(&role) {
                Some(ServerRole::Read) => table.readers = addresses,
                Some(ServerRole::Write) => table.writers = addresses,
                Some(ServerRole::Route) => table.routers = addresses,
                // tolerate roles of future server versions
                None => {}
            }
        }
        Ok(table)
    }

    pub fn servers_with_role(&self, role: ServerRole) -> &[Arc<Address>] {
        match role {
            ServerRole::Read => &self.readers,
            ServerRole::Write => &self.writers,
            ServerRole::Route => &self.routers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_list(entries: &[&str]) -> ValueReceive {
        ValueReceive::List(
            entries
                .iter()
                .map(|e| ValueReceive::String(String::from(*e)))
                .collect(),
        )
    }

    fn server(role: &str, addresses: &[&str]) -> ValueReceive {
        ValueReceive::Map(
            [
                (
                    String::from("role"),
                    ValueReceive::String(String::from(role)),
                ),
                (String::from("addresses"), string_list(addresses)),
            ]
            .into_iter()
            .collect(),
        )
    }

    fn route_meta() -> BoltMeta {
        let rt = ValueReceive::Map(
            [
                (String::from("ttl"), ValueReceive::Integer(300)),
                (
                    String::from("db"),
                    ValueReceive::String(String::from("neo4j")),
                ),
                (
                    String::from("servers"),
                    ValueReceive::List(vec![
                        server("READ", &["reader1:7687", "reader2:7687"]),
                        server("WRITE", &["writer:7687"]),
                        server("ROUTE", &["router:7687"]),
                    ]),
                ),
            ]
            .into_iter()
            .collect(),
        );
        [(String::from("rt"), rt)].into_iter().collect()
    }

    #[test]
    fn test_parse_route_metadata() {
        let table = RoutingTable::try_parse(route_meta()).unwrap();
        assert_eq!(table.ttl, 300);
        assert_eq!(table.db.as_deref(), Some("neo4j"));
        assert_eq!(table.readers.len(), 2);
        assert_eq!(table.writers.len(), 1);
        assert_eq!(table.routers.len(), 1);
        assert_eq!(table.readers[0].host(), "reader1");
        assert_eq!(table.readers[0].port(), 7687);
    }

    #[test]
    fn test_missing_rt_is_protocol_error() {
        let res = RoutingTable::try_parse(BoltMeta::new());
        assert!(matches!(res, Err(BoltError::ProtocolError { .. })));
    }

    #[test]
    fn test_unknown_role_is_tolerated() {
        let mut meta = route_meta();
        let Some(ValueReceive::Map(rt)) = meta.get_mut("rt") else {
            unreachable!()
        };
        let Some(ValueReceive::List(servers)) = rt.get_mut("servers") else {
            unreachable!()
        };
        servers.push(server("FANCY_NEW_ROLE", &["future:7687"]));
        let table = RoutingTable::try_parse(meta).unwrap();
        assert_eq!(table.readers.len(), 2);
    }
}
