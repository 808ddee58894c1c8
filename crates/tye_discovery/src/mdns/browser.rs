use super::codec::{Packet, RecordData};
use crate::candidate::{AsCandidate, DashboardCandidate};
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

/// A resolved service instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdnsService {
    /// Full instance name, e.g. `shop._microsoft-tye._tcp.local`.
    pub instance: String,
    pub target: String,
    pub port: u16,
    pub address: Option<Ipv4Addr>,
    pub text: Vec<String>,
}

impl MdnsService {
    /// The instance label without the service type suffix.
    pub fn short_name(&self) -> &str {
        self.instance
            .split_once('.')
            .map(|(name, _)| name)
            .unwrap_or(&self.instance)
    }
}

impl AsCandidate for MdnsService {
    fn candidate(&self) -> DashboardCandidate {
        DashboardCandidate {
            name_hint: Some(self.short_name().to_string()),
            ..DashboardCandidate::localhost(self.port)
        }
    }
}

/// Folds response packets into the set of visible instances.
///
/// An announced instance stays pending until its SRV record is seen; a PTR
/// with ttl 0 removes it whether pending or visible.
#[derive(Debug)]
pub struct BrowseState {
    service_type: String,
    pending: BTreeSet<String>,
    services: BTreeMap<String, MdnsService>,
}

fn key(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

impl BrowseState {
    pub fn new(service_type: &str) -> Self {
        Self {
            service_type: key(service_type),
            pending: BTreeSet::new(),
            services: BTreeMap::new(),
        }
    }

    /// Whether the packet mentions the service type or an instance we track.
    pub fn is_relevant(&self, packet: &Packet) -> bool {
        packet.records().any(|record| {
            let name = key(&record.name);
            name == self.service_type
                || self.pending.contains(&name)
                || self.services.contains_key(&name)
        })
    }

    pub fn apply(&mut self, packet: &Packet) {
        for record in packet.records() {
            let RecordData::Ptr(instance) = &record.data else {
                continue;
            };
            if key(&record.name) != self.service_type {
                continue;
            }

            let instance = key(instance);
            if record.ttl == 0 {
                tracing::debug!("mDNS instance {} departed", instance);
                self.pending.remove(&instance);
                self.services.remove(&instance);
            } else if !self.services.contains_key(&instance) {
                self.pending.insert(instance);
            }
        }

        let known: Vec<String> = self.pending.iter().cloned().collect();
        for instance in known {
            if let Some(service) = resolve(packet, &instance, None) {
                tracing::debug!("mDNS instance {} resolved at {}:{}", instance, service.target, service.port);
                self.pending.remove(&instance);
                self.services.insert(instance, service);
            }
        }

        for (instance, service) in self.services.iter_mut() {
            if let Some(updated) = resolve(packet, instance, Some(&*service)) {
                *service = updated;
            }
        }
    }

    /// Visible instances ordered by name.
    pub fn services(&self) -> Vec<MdnsService> {
        self.services.values().cloned().collect()
    }
}

/// Applies the packet's SRV, TXT and A records to `current`, or starts a new
/// entry when the packet carries the instance's SRV record.
fn resolve(packet: &Packet, instance: &str, current: Option<&MdnsService>) -> Option<MdnsService> {
    let srv = packet.records().find_map(|record| match &record.data {
        RecordData::Srv { port, target, .. } if key(&record.name) == instance && record.ttl > 0 => {
            Some((key(target), *port))
        }
        _ => None,
    });

    let mut service = match (srv, current) {
        (Some((target, port)), current) => {
            let address = current.filter(|c| c.target == target).and_then(|c| c.address);
            MdnsService {
                instance: instance.to_string(),
                target,
                port,
                address,
                text: current.map(|c| c.text.clone()).unwrap_or_default(),
            }
        }
        (None, Some(current)) => current.clone(),
        (None, None) => return None,
    };

    for record in packet.records() {
        match &record.data {
            RecordData::Txt(text) if key(&record.name) == instance => service.text = text.clone(),
            RecordData::A(address) if key(&record.name) == service.target => service.address = Some(*address),
            _ => {}
        }
    }

    if current == Some(&service) {
        None
    } else {
        Some(service)
    }
}
