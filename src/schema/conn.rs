//! Connections and module specs carried by the `init` command.
//!
//! JSON shape:
//! {
//!   "connections": [
//!     { "uid": "raw_tp_link_0", "service_type": "kQueue", "data_type": "raw_tp",
//!       "uri": "queue://FollySPSC:100000", "topics": [] },
//!     ...
//!   ],
//!   "modules": [
//!     { "inst": "datahandler_0", "plugin": "DataLinkHandler",
//!       "data": { "conn_refs": [ { "name": "raw_input", "uid": "raw_tp_link_0", "dir": "kInput" } ] } },
//!     ...
//!   ]
//! }

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceType {
    #[serde(rename = "kQueue")]
    Queue,
    #[serde(rename = "kNetSender")]
    NetSender,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    #[serde(rename = "kInput")]
    Input,
    #[serde(rename = "kOutput")]
    Output,
}

/// In-process queue implementations offered by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    /// Single producer, single consumer.
    FollySpsc,
    /// Multiple producers, multiple consumers.
    FollyMpmc,
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueKind::FollySpsc => f.write_str("FollySPSC"),
            QueueKind::FollyMpmc => f.write_str("FollyMPMC"),
        }
    }
}

/// A named channel between module ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionId {
    pub uid: String,
    pub service_type: ServiceType,
    pub data_type: String,
    pub uri: String,
    pub topics: Vec<String>,
}

impl ConnectionId {
    pub fn queue(uid: impl Into<String>, data_type: &str, kind: QueueKind, capacity: u32) -> Self {
        Self {
            uid: uid.into(),
            service_type: ServiceType::Queue,
            data_type: data_type.to_string(),
            uri: format!("queue://{}:{}", kind, capacity),
            topics: Vec::new(),
        }
    }

    pub fn net_sender(uid: impl Into<String>, topics: &[&str], uri: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            service_type: ServiceType::NetSender,
            data_type: String::new(),
            uri: uri.into(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// A module port bound to a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionRef {
    pub name: String,
    pub uid: String,
    pub dir: Direction,
}

impl ConnectionRef {
    pub fn input(name: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uid: uid.into(),
            dir: Direction::Input,
        }
    }

    pub fn output(name: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uid: uid.into(),
            dir: Direction::Output,
        }
    }
}

/// Module kinds the readout runtime can instantiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Plugin {
    FelixCardReader,
    FelixCardController,
    #[serde(rename = "DTPController")]
    DtpController,
    DataLinkHandler,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModInit {
    pub conn_refs: Vec<ConnectionRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModSpec {
    pub inst: String,
    pub plugin: Plugin,
    pub data: ModInit,
}

impl ModSpec {
    pub fn new(inst: impl Into<String>, plugin: Plugin, conn_refs: Vec<ConnectionRef>) -> Self {
        Self {
            inst: inst.into(),
            plugin,
            data: ModInit { conn_refs },
        }
    }

    pub fn conn_refs(&self) -> &[ConnectionRef] {
        &self.data.conn_refs
    }
}
