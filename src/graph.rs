//! Module graph: the connections and module specs handed to `init`.
//!
//! The readout topology is fixed in shape and parameterized by the number of
//! links:
//!
//!   flxcard_<i> --raw_tp_link_<i>--> datahandler_<i> --+--> data_fragments_q
//!                                         ^             +--> errored_frames_q
//!                          data_requests_<i>            +--> time_sync_q
//!
//! Card readers share `errored_chunks_q`. Card and DTP controllers have no
//! connections. Builders validate the graph before returning it.

use crate::error::{ConfgenError, ConfgenResult};
use crate::params::{Derived, LinkPlacement};
use crate::schema::{ConnectionId, ConnectionRef, Init, ModSpec, Plugin, QueueKind, ServiceType};

use regex::Regex;
use std::collections::BTreeSet;

pub const FRAGMENTS_Q: &str = "data_fragments_q";
pub const ERRORED_CHUNKS_Q: &str = "errored_chunks_q";
pub const ERRORED_FRAMES_Q: &str = "errored_frames_q";
pub const TIME_SYNC_Q: &str = "time_sync_q";
pub const TIME_SYNC_URI: &str = "tcp://127.0.0.1:6000";

pub fn raw_link_uid(link: usize) -> String {
    format!("raw_tp_link_{}", link)
}

pub fn requests_uid(link: usize) -> String {
    format!("data_requests_{}", link)
}

pub fn handler_name(link: usize) -> String {
    format!("datahandler_{}", link)
}

pub fn reader_name(link: usize) -> String {
    format!("flxcard_{}", link)
}

pub fn card_controller_name(card: u32) -> String {
    format!("flxcardctrl_{}", card)
}

pub fn dtp_controller_name(link: usize) -> String {
    format!("dtpctrl_{}", link)
}

/// Name of the single module of the standalone DTP controller app.
pub const STANDALONE_DTP_CONTROLLER: &str = "dtpctrl";

#[derive(Debug, Clone, PartialEq)]
pub struct AppGraph {
    pub connections: Vec<ConnectionId>,
    pub modules: Vec<ModSpec>,
}

impl AppGraph {
    /// Check uniqueness, referential integrity and connection URIs.
    pub fn validate(&self) -> ConfgenResult<()> {
        let uris = UriRules::new()?;
        let mut uids = BTreeSet::new();
        for conn in &self.connections {
            if !uids.insert(conn.uid.as_str()) {
                return Err(ConfgenError::SchemaMismatch(format!(
                    "duplicate connection uid {}",
                    conn.uid
                )));
            }
            uris.check(conn)?;
        }

        let mut names = BTreeSet::new();
        for module in &self.modules {
            if !names.insert(module.inst.as_str()) {
                return Err(ConfgenError::SchemaMismatch(format!(
                    "duplicate module name {}",
                    module.inst
                )));
            }
            let mut ports = BTreeSet::new();
            for r in module.conn_refs() {
                if !uids.contains(r.uid.as_str()) {
                    return Err(ConfgenError::SchemaMismatch(format!(
                        "module {} port {} references missing connection {}",
                        module.inst, r.name, r.uid
                    )));
                }
                if !ports.insert(r.name.as_str()) {
                    return Err(ConfgenError::SchemaMismatch(format!(
                        "module {} declares port {} twice",
                        module.inst, r.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|m| m.inst.as_str())
    }

    #[cfg(test)]
    pub fn module(&self, name: &str) -> Option<&ModSpec> {
        self.modules.iter().find(|m| m.inst == name)
    }

    /// Number of module ports bound to connection `uid`.
    #[cfg(test)]
    pub fn reference_count(&self, uid: &str) -> usize {
        self.modules
            .iter()
            .flat_map(|m| m.conn_refs())
            .filter(|r| r.uid == uid)
            .count()
    }

    pub fn to_init(&self) -> Init {
        Init {
            connections: self.connections.clone(),
            modules: self.modules.clone(),
        }
    }
}

/// Expected URI shape per service type.
struct UriRules {
    queue: Regex,
    net: Regex,
}

impl UriRules {
    fn new() -> ConfgenResult<Self> {
        const QUEUE_URI_RE: &str = r"^queue://(FollySPSC|FollyMPMC):[1-9][0-9]*$";
        const NET_URI_RE: &str = r"^tcp://[^:/]+:[0-9]+$";

        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| ConfgenError::Internal(format!("uri pattern {}: {}", pattern, e)))
        };
        Ok(Self {
            queue: compile(QUEUE_URI_RE)?,
            net: compile(NET_URI_RE)?,
        })
    }

    fn check(&self, conn: &ConnectionId) -> ConfgenResult<()> {
        let re = match conn.service_type {
            ServiceType::Queue => &self.queue,
            ServiceType::NetSender => &self.net,
        };
        if !re.is_match(&conn.uri) {
            return Err(ConfgenError::SchemaMismatch(format!(
                "connection {} has malformed uri {:?} for {:?}",
                conn.uid, conn.uri, conn.service_type
            )));
        }
        Ok(())
    }
}

/// Assemble and validate the readout application graph.
pub fn readout_graph(derived: &Derived) -> ConfgenResult<AppGraph> {
    let links = &derived.links;

    let mut connections = vec![
        ConnectionId::queue(FRAGMENTS_Q, "", QueueKind::FollyMpmc, 100),
        ConnectionId::queue(ERRORED_CHUNKS_Q, "", QueueKind::FollyMpmc, 100),
        ConnectionId::queue(ERRORED_FRAMES_Q, "", QueueKind::FollyMpmc, 10_000),
    ];
    connections.extend(
        links
            .iter()
            .map(|l| ConnectionId::queue(raw_link_uid(l.index), "raw_tp", QueueKind::FollySpsc, 100_000)),
    );
    connections.extend(
        links
            .iter()
            .map(|l| ConnectionId::queue(requests_uid(l.index), "", QueueKind::FollySpsc, 1_000)),
    );
    connections.push(ConnectionId::net_sender(TIME_SYNC_Q, &["Timesync"], TIME_SYNC_URI));

    let mut modules: Vec<ModSpec> = links.iter().map(link_handler).collect();
    modules.extend(links.iter().map(card_reader));
    modules.extend(
        derived
            .card_ids()
            .into_iter()
            .map(|card| ModSpec::new(card_controller_name(card), Plugin::FelixCardController, vec![])),
    );
    modules.extend(
        links
            .iter()
            .map(|l| ModSpec::new(dtp_controller_name(l.index), Plugin::DtpController, vec![])),
    );

    let graph = AppGraph {
        connections,
        modules,
    };
    graph.validate()?;
    Ok(graph)
}

fn link_handler(link: &LinkPlacement) -> ModSpec {
    ModSpec::new(
        handler_name(link.index),
        Plugin::DataLinkHandler,
        vec![
            ConnectionRef::input("raw_input", raw_link_uid(link.index)),
            ConnectionRef::output("timesync_output", TIME_SYNC_Q),
            ConnectionRef::input("request_input", requests_uid(link.index)),
            ConnectionRef::output("fragment_queue", FRAGMENTS_Q),
            ConnectionRef::output("errored_frames", ERRORED_FRAMES_Q),
        ],
    )
}

fn card_reader(link: &LinkPlacement) -> ModSpec {
    ModSpec::new(
        reader_name(link.index),
        Plugin::FelixCardReader,
        vec![
            ConnectionRef::output(format!("output_{}", link.reader_port), raw_link_uid(link.index)),
            ConnectionRef::output("errored_chunks", ERRORED_CHUNKS_Q),
        ],
    )
}

/// Graph of the standalone DTP controller app: one module, no connections.
pub fn dtp_graph() -> AppGraph {
    AppGraph {
        connections: Vec::new(),
        modules: vec![ModSpec::new(
            STANDALONE_DTP_CONTROLLER,
            Plugin::DtpController,
            vec![],
        )],
    }
}
