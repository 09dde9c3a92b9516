//! Run-control commands.
//!
//! Every command moves the runtime between two states of a fixed state
//! machine; the pair is a property of the command id, so it is derived here
//! instead of being supplied by callers.

use crate::schema::conf::Payload;
use crate::schema::conn::{ConnectionId, ModSpec};
use crate::target::Target;

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum State {
    None,
    Initial,
    Configured,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CmdId {
    Init,
    Conf,
    Start,
    Stop,
    Scrap,
    Reset,
    Record,
    GetRegister,
    SetRegister,
    GetBitfield,
    SetBitfield,
}

impl CmdId {
    /// `(entry_state, exit_state)` of the command.
    pub fn transition(self) -> (State, State) {
        use State::*;
        match self {
            CmdId::Init => (None, Initial),
            CmdId::Conf => (Initial, Configured),
            CmdId::Start => (Configured, Running),
            CmdId::Stop => (Running, Configured),
            CmdId::Scrap => (Configured, Initial),
            CmdId::Reset => (Configured, Configured),
            CmdId::Record
            | CmdId::GetRegister
            | CmdId::SetRegister
            | CmdId::GetBitfield
            | CmdId::SetBitfield => (Running, Running),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CmdId::Init => "init",
            CmdId::Conf => "conf",
            CmdId::Start => "start",
            CmdId::Stop => "stop",
            CmdId::Scrap => "scrap",
            CmdId::Reset => "reset",
            CmdId::Record => "record",
            CmdId::GetRegister => "getregister",
            CmdId::SetRegister => "setregister",
            CmdId::GetBitfield => "getbitfield",
            CmdId::SetBitfield => "setbitfield",
        }
    }
}

impl fmt::Display for CmdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of `init`: the whole module graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Init {
    pub connections: Vec<ConnectionId>,
    pub modules: Vec<ModSpec>,
}

/// One target plus what it receives.
#[derive(Debug, Clone, Serialize)]
pub struct AddressedCmd {
    #[serde(rename = "match")]
    pub target: Target,
    pub data: Payload,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CmdData {
    Init(Init),
    Modules { modules: Vec<AddressedCmd> },
}

#[derive(Debug, Clone, Serialize)]
pub struct RcCommand {
    pub id: CmdId,
    pub entry_state: State,
    pub exit_state: State,
    pub data: CmdData,
}

impl RcCommand {
    pub fn init(init: Init) -> Self {
        let (entry_state, exit_state) = CmdId::Init.transition();
        Self {
            id: CmdId::Init,
            entry_state,
            exit_state,
            data: CmdData::Init(init),
        }
    }

    /// A command broadcast to every module matching each target, in order.
    pub fn addressed(id: CmdId, entries: Vec<(Target, Payload)>) -> Self {
        let (entry_state, exit_state) = id.transition();
        let modules = entries
            .into_iter()
            .map(|(target, data)| AddressedCmd { target, data })
            .collect();
        Self {
            id,
            entry_state,
            exit_state,
            data: CmdData::Modules { modules },
        }
    }

    /// Addressed entries; empty for `init`.
    pub fn entries(&self) -> &[AddressedCmd] {
        match &self.data {
            CmdData::Init(_) => &[],
            CmdData::Modules { modules } => modules,
        }
    }
}
