//! Endpoints payload as published by the cluster API
//!
//! Only the fields needed to build server addresses are modelled. The serde
//! attributes follow the API's JSON shape so a client can decode straight into
//! these types.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

use crate::target::TargetInfo;

/// Backing addresses of a service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    #[serde(default)]
    pub subsets: Vec<EndpointSubset>,
}

/// Group of addresses sharing the same declared ports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSubset {
    #[serde(default)]
    pub addresses: Vec<EndpointAddress>,
    #[serde(default)]
    pub ports: Vec<EndpointPort>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointAddress {
    pub ip: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointPort {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub port: u16,
}

impl Endpoints {
    /// Build an endpoints object with a single subset
    #[must_use]
    pub fn single_subset(ips: &[&str], ports: Vec<EndpointPort>) -> Self {
        Self {
            subsets: vec![EndpointSubset {
                addresses: ips
                    .iter()
                    .map(|ip| EndpointAddress { ip: (*ip).to_string() })
                    .collect(),
                ports,
            }],
        }
    }

    /// Flatten into server addresses for `target`, in subset then address order.
    ///
    /// A subset without a matching port yields addresses with port 0.
    /// Addresses whose IP does not parse are skipped.
    #[must_use]
    pub fn resolve(&self, target: &TargetInfo) -> Vec<SocketAddr> {
        let mut addrs = Vec::new();

        for subset in &self.subsets {
            let port = subset.resolve_port(target);

            for address in &subset.addresses {
                match address.ip.parse::<IpAddr>() {
                    Ok(ip) => addrs.push(SocketAddr::new(ip, port)),
                    Err(e) => {
                        tracing::warn!(
                            ip = %address.ip,
                            error = %e,
                            "Skipping endpoint address with unparsable IP"
                        );
                    }
                }
            }
        }

        addrs
    }
}

impl EndpointSubset {
    /// First declared port matching the target, or 0
    fn resolve_port(&self, target: &TargetInfo) -> u16 {
        self.ports
            .iter()
            .find(|p| {
                if target.named_port {
                    p.name.as_deref() == Some(target.port.as_str())
                } else {
                    p.port.to_string() == target.port
                }
            })
            .map_or(0, |p| p.port)
    }
}

impl EndpointPort {
    #[must_use]
    pub fn numbered(port: u16) -> Self {
        Self { name: None, port }
    }

    #[must_use]
    pub fn named(name: &str, port: u16) -> Self {
        Self {
            name: Some(name.to_string()),
            port,
        }
    }
}
