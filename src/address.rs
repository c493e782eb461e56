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

use std::fmt::{Display, Formatter};

const DEFAULT_PORT: u16 = 7687;

/// A Bolt server address (host name and port).
///
/// The crate never opens sockets itself; addresses are opaque keys handed to
/// the pool's channel connector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    host: String,
    port: u16,
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl From<(&str, u16)> for Address {
    fn from((host, port): (&str, u16)) -> Self {
        Self::new(host, port)
    }
}

impl From<(String, u16)> for Address {
    fn from((host, port): (String, u16)) -> Self {
        Self::new(host, port)
    }
}

impl From<&str> for Address {
    fn from(host: &str) -> Self {
        match host.rsplit_once(':') {
            Some((host, port)) => match port.parse() {
                Ok(port) => Self::new(host, port),
                Err(_) => Self::new(host, DEFAULT_PORT),
            },
            None => Self::new(host, DEFAULT_PORT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_host_and_port() {
        let address = Address::from("localhost:7688");
        assert_eq!(address.host(), "localhost");
        assert_eq!(address.port(), 7688);
    }

    #[test]
    fn test_from_host_defaults_port() {
        let address = Address::from("localhost");
        assert_eq!(address.host(), "localhost");
        assert_eq!(address.port(), DEFAULT_PORT);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Address::new("example.com", 7687)), "example.com:7687");
    }
}
