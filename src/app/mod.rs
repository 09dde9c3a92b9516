//! Command sequence generation.
//!
//! Each application builder returns a [`Document`]: the validated module graph
//! plus the ordered command list. Targets are passed through to the document
//! as written; [`Document::check_targets`] resolves them against the graph
//! afterwards and reports the ones that select nothing.

pub mod dtp;
pub mod readout;

use crate::error::{ConfgenError, ConfgenResult};
use crate::graph::AppGraph;
use crate::schema::{CmdData, CmdId, ModuleConf, Payload, RcCommand};
use crate::target::Target;

use tracing::warn;

/// Build an addressed command from `(target, payload)` pairs.
pub fn addressed<S: AsRef<str>>(id: CmdId, entries: Vec<(S, Payload)>) -> ConfgenResult<RcCommand> {
    let entries = entries
        .into_iter()
        .map(|(target, payload)| Ok((Target::parse(target.as_ref())?, payload)))
        .collect::<ConfgenResult<Vec<_>>>()?;
    Ok(RcCommand::addressed(id, entries))
}

/// A command entry whose target selects no module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unmatched {
    pub cmd: CmdId,
    pub target: String,
}

#[derive(Debug, Clone)]
pub struct Document {
    pub graph: AppGraph,
    pub commands: Vec<RcCommand>,
}

impl Document {
    /// Entries that would reach no module at dispatch time.
    pub fn unmatched_targets(&self) -> Vec<Unmatched> {
        let mut out = Vec::new();
        for cmd in &self.commands {
            for entry in cmd.entries() {
                if entry.target.resolve(self.graph.module_names()).is_empty() {
                    out.push(Unmatched {
                        cmd: cmd.id,
                        target: entry.target.to_string(),
                    });
                }
            }
        }
        out
    }

    /// Warn about zero-match targets, or fail on the first one when `strict`.
    pub fn check_targets(&self, strict: bool) -> ConfgenResult<()> {
        for u in self.unmatched_targets() {
            if strict {
                return Err(ConfgenError::UnmatchedTarget {
                    cmd: u.cmd.to_string(),
                    target: u.target,
                });
            }
            warn!(cmd = %u.cmd, target = %u.target, "command target matches no module");
        }
        Ok(())
    }

    /// Consistency checks beyond the graph itself:
    /// - states agree with the command id
    /// - `init` comes first and carries exactly this graph
    /// - `conf` payloads only reach modules of the matching kind
    /// - latency buffer sizes are aligned and agree within each link handler
    pub fn validate(&self) -> ConfgenResult<()> {
        self.graph.validate()?;

        match self.commands.first() {
            Some(RcCommand {
                data: CmdData::Init(init),
                ..
            }) if init.connections == self.graph.connections
                && init.modules == self.graph.modules => {}
            _ => {
                return Err(ConfgenError::SchemaMismatch(
                    "first command must be init carrying the module graph".to_string(),
                ));
            }
        }

        for cmd in &self.commands {
            if (cmd.entry_state, cmd.exit_state) != cmd.id.transition() {
                return Err(ConfgenError::SchemaMismatch(format!(
                    "command {} moves {:?} -> {:?}",
                    cmd.id, cmd.entry_state, cmd.exit_state
                )));
            }
            if matches!(cmd.data, CmdData::Init(_)) != (cmd.id == CmdId::Init) {
                return Err(ConfgenError::SchemaMismatch(format!(
                    "command {} carries the wrong kind of data",
                    cmd.id
                )));
            }
            for entry in cmd.entries() {
                if let Payload::Conf(conf) = &entry.data {
                    self.check_conf(&entry.target, conf)?;
                }
            }
        }
        Ok(())
    }

    fn check_conf(&self, target: &Target, conf: &ModuleConf) -> ConfgenResult<()> {
        for module in self.graph.modules.iter().filter(|m| target.matches(&m.inst)) {
            if module.plugin != conf.plugin() {
                return Err(ConfgenError::SchemaMismatch(format!(
                    "module {} ({:?}) is configured as {:?}",
                    module.inst,
                    module.plugin,
                    conf.plugin()
                )));
            }
        }
        if let ModuleConf::Readout(rc) = conf {
            let lb = &rc.latencybufferconf;
            if lb.latency_buffer_alignment_size == 0
                || lb.latency_buffer_size % lb.latency_buffer_alignment_size != 0
            {
                return Err(ConfgenError::SchemaMismatch(format!(
                    "latency buffer size {} is not a multiple of {}",
                    lb.latency_buffer_size, lb.latency_buffer_alignment_size
                )));
            }
            if rc.requesthandlerconf.latency_buffer_size != lb.latency_buffer_size {
                return Err(ConfgenError::SchemaMismatch(format!(
                    "request handler buffer size {} differs from latency buffer size {}",
                    rc.requesthandlerconf.latency_buffer_size, lb.latency_buffer_size
                )));
            }
        }
        Ok(())
    }
}
