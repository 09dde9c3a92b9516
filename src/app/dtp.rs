//! Standalone DTP controller application: one `dtpctrl` module driven through
//! init, conf, start, stop and reset.

use crate::app::{addressed, Document};
use crate::error::ConfgenResult;
use crate::graph::{self, STANDALONE_DTP_CONTROLLER};
use crate::params::DtpParams;
use crate::schema::conf::DtpControllerConf;
use crate::schema::{CmdId, ModuleConf, Payload, RcCommand};

pub fn generate(params: &DtpParams) -> ConfgenResult<Document> {
    params.validate()?;
    let graph = graph::dtp_graph();

    let conf = ModuleConf::DtpController(DtpControllerConf {
        connections_file: params.connections_file.clone(),
        device: params.dtp_device_name.clone(),
        uhal_log_level: params.uhal_log_level.to_string(),
        source: None,
        pattern: None,
        threshold: None,
        masks: None,
    });

    let commands = vec![
        RcCommand::init(graph.to_init()),
        addressed(CmdId::Conf, vec![(STANDALONE_DTP_CONTROLLER, conf.into())])?,
        addressed(CmdId::Start, vec![(STANDALONE_DTP_CONTROLLER, Payload::Empty)])?,
        addressed(CmdId::Stop, vec![(STANDALONE_DTP_CONTROLLER, Payload::Empty)])?,
        addressed(CmdId::Reset, vec![(STANDALONE_DTP_CONTROLLER, Payload::Empty)])?,
    ];

    let doc = Document { graph, commands };
    doc.validate()?;
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::UhalLogLevel;
    use crate::schema::cmd::State;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn sequence_ends_with_reset() {
        let doc = generate(&DtpParams::default()).unwrap();
        let ids: Vec<_> = doc.commands.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["init", "conf", "start", "stop", "reset"]);
        let reset = doc.commands.last().unwrap();
        assert_eq!(
            (reset.entry_state, reset.exit_state),
            (State::Configured, State::Configured)
        );
    }

    #[test]
    fn conf_reaches_the_controller() {
        let params = DtpParams {
            dtp_device_name: "flx-1-p2-hf".to_string(),
            uhal_log_level: UhalLogLevel::Debug,
            ..DtpParams::default()
        };
        let doc = generate(&params).unwrap();
        assert!(doc.unmatched_targets().is_empty());

        let conf = serde_json::to_value(&doc.commands[1]).unwrap();
        assert_eq!(
            conf["data"]["modules"],
            json!([{
                "match": "dtpctrl",
                "data": {
                    "connections_file": "${DTPCONTROLS_SHARE}/config/etc/dtp_connections.xml",
                    "device": "flx-1-p2-hf",
                    "uhal_log_level": "debug"
                }
            }])
        );
    }

    #[test]
    fn init_declares_a_single_module() {
        let doc = generate(&DtpParams::default()).unwrap();
        let init = serde_json::to_value(&doc.commands[0]).unwrap();
        assert_eq!(
            init["data"],
            json!({
                "connections": [],
                "modules": [{ "inst": "dtpctrl", "plugin": "DTPController", "data": { "conn_refs": [] } }]
            })
        );
    }

    #[test]
    fn blank_device_is_rejected() {
        let params = DtpParams {
            dtp_device_name: " ".to_string(),
            ..DtpParams::default()
        };
        assert!(generate(&params).is_err());
    }
}
