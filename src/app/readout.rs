//! FELIX readout application: card readers, card controllers, DTP controllers
//! and one data link handler per trigger-primitive link.
//!
//! Sequence: init, conf, start, stop, scrap, then the same-state commands
//! record, getregister, setregister, getbitfield, setbitfield.

use crate::app::{addressed, Document};
use crate::error::ConfgenResult;
use crate::graph::{self, card_controller_name, dtp_controller_name, handler_name, reader_name};
use crate::params::{Derived, LinkPlacement, ReadoutParams, LATENCY_BUFFER_ALIGNMENT, QUEUE_POP_WAIT_MS};
use crate::schema::conf::{
    CardControllerConf, CardLink, CardReaderConf, DtpControllerConf, GetBitfields, GetRegisters,
    LatencyBufferConf, LogicalUnit, RawDataProcessorConf, ReadoutConf, ReadoutModelConf,
    RecordingParams, RegValPair, RequestHandlerConf, SetBitfields, SetRegisters, StartParams,
};
use crate::schema::{CmdId, ModuleConf, Payload, RcCommand};

use tracing::debug;

const CHUNK_TRAILER_SIZE: u32 = 32;
const DMA_BLOCK_SIZE_KB: u32 = 4;
const DMA_MEMORY_SIZE_GB: u32 = 4;
const STREAM_BUFFER_SIZE: u64 = 8 * 1024 * 1024;
const POP_LIMIT_PCT: f64 = 0.8;
const POP_SIZE_PCT: f64 = 0.1;
const TIMESYNC_CONNECTION_NAME: &str = "timesync";
const REGION_ID: u32 = 0;
/// Register read and written by the register access commands.
const PROBE_REGISTER: &str = "REG_MAP_VERSION";

/// Build the full readout document.
pub fn generate(params: &ReadoutParams) -> ConfgenResult<Document> {
    let derived = params.derive()?;
    debug!(
        latency_buffer_size = derived.latency_buffer_size,
        links = derived.links.len(),
        "derived readout parameters"
    );

    let graph = graph::readout_graph(&derived)?;
    let start = Payload::Start(StartParams {
        run: params.run_number,
    });

    let mut commands = vec![
        RcCommand::init(graph.to_init()),
        conf_command(params, &derived)?,
        addressed(
            CmdId::Start,
            vec![
                ("datahandler_.*", start.clone()),
                ("flxcard_.*", start),
                ("dtpctrl_.*", Payload::Empty),
            ],
        )?,
        addressed(
            CmdId::Stop,
            vec![
                ("flxcard_.*", Payload::Empty),
                ("dtpctrl_.*", Payload::Empty),
                ("datahandler_.*", Payload::Empty),
            ],
        )?,
        addressed(CmdId::Scrap, vec![("", Payload::Empty)])?,
    ];
    commands.extend(auxiliary_commands(params)?);

    for cmd in &commands {
        debug!(cmd = %cmd.id, entries = cmd.entries().len(), "built command");
    }

    let doc = Document { graph, commands };
    doc.validate()?;
    Ok(doc)
}

fn conf_command(params: &ReadoutParams, derived: &Derived) -> ConfgenResult<RcCommand> {
    let mut entries: Vec<(String, Payload)> = Vec::new();

    for link in &derived.links {
        let conf = ModuleConf::CardReader(card_reader_conf(link));
        entries.push((reader_name(link.index), conf.into()));
    }
    for card in derived.card_ids() {
        let conf = ModuleConf::CardController(card_controller_conf(params, derived, card));
        entries.push((card_controller_name(card), conf.into()));
    }
    for link in &derived.links {
        let conf = ModuleConf::DtpController(dtp_controller_conf(params, derived, link));
        entries.push((dtp_controller_name(link.index), conf.into()));
    }
    for link in &derived.links {
        let conf = ModuleConf::Readout(readout_conf(params, derived, link));
        entries.push((handler_name(link.index), conf.into()));
    }

    addressed(CmdId::Conf, entries)
}

fn card_reader_conf(link: &LinkPlacement) -> CardReaderConf {
    CardReaderConf {
        card_id: link.card_id,
        logical_unit: link.logical_unit,
        dma_id: 0,
        chunk_trailer_size: CHUNK_TRAILER_SIZE,
        dma_block_size_kb: DMA_BLOCK_SIZE_KB,
        dma_memory_size_gb: DMA_MEMORY_SIZE_GB,
        numa_id: 0,
        links_enabled: vec![link.link_id],
    }
}

fn card_controller_conf(params: &ReadoutParams, derived: &Derived, card: u32) -> CardControllerConf {
    let logical_units = derived
        .links
        .iter()
        .filter(|l| l.card_id == card)
        .map(|l| LogicalUnit {
            log_unit_id: l.logical_unit,
            emu_fanout: params.emu_fanout,
            links: vec![CardLink {
                link_id: l.link_id,
                enabled: true,
                dma_desc: 0,
                superchunk_factor: params.superchunk_factor,
            }],
        })
        .collect();
    CardControllerConf {
        card_id: card,
        logical_units,
    }
}

fn dtp_controller_conf(
    params: &ReadoutParams,
    derived: &Derived,
    link: &LinkPlacement,
) -> DtpControllerConf {
    DtpControllerConf {
        connections_file: params.connections_file.clone(),
        device: link.device.clone(),
        uhal_log_level: params.uhal_log_level.to_string(),
        source: Some(params.source_data.to_string()),
        pattern: Some(params.wibulator_data.clone()),
        threshold: Some(params.threshold),
        masks: Some(derived.masks.clone()),
    }
}

fn readout_conf(params: &ReadoutParams, derived: &Derived, link: &LinkPlacement) -> ReadoutConf {
    let element_id = link.index as u32;
    ReadoutConf {
        readoutmodelconf: ReadoutModelConf {
            source_queue_timeout_ms: QUEUE_POP_WAIT_MS,
            fake_trigger_flag: 1,
            timesync_connection_name: TIMESYNC_CONNECTION_NAME.to_string(),
            region_id: REGION_ID,
            element_id,
        },
        latencybufferconf: LatencyBufferConf {
            latency_buffer_alignment_size: LATENCY_BUFFER_ALIGNMENT,
            latency_buffer_size: derived.latency_buffer_size,
            region_id: REGION_ID,
            element_id,
        },
        rawdataprocessorconf: RawDataProcessorConf {
            region_id: REGION_ID,
            element_id,
            enable_software_tpg: params.enable_software_tpg,
            enable_firmware_tpg: !params.enable_software_tpg,
            emulator_mode: params.emulator_mode,
            channel_map_name: params.tpg_channel_map.to_string(),
        },
        requesthandlerconf: RequestHandlerConf {
            latency_buffer_size: derived.latency_buffer_size,
            pop_limit_pct: POP_LIMIT_PCT,
            pop_size_pct: POP_SIZE_PCT,
            region_id: REGION_ID,
            element_id,
            output_file: params.recording_file(link.index),
            stream_buffer_size: STREAM_BUFFER_SIZE,
            enable_raw_recording: true,
        },
    }
}

fn auxiliary_commands(params: &ReadoutParams) -> ConfgenResult<Vec<RcCommand>> {
    const CONTROLLERS: &str = "flxcardctrl_.*";
    let probe = || RegValPair {
        reg_name: PROBE_REGISTER.to_string(),
        reg_val: 0,
    };

    Ok(vec![
        addressed(
            CmdId::Record,
            vec![(
                "datahandler_.*",
                Payload::Record(RecordingParams {
                    duration: params.record_duration,
                }),
            )],
        )?,
        addressed(
            CmdId::GetRegister,
            vec![(
                CONTROLLERS,
                Payload::GetRegisters(GetRegisters {
                    card_id: 0,
                    log_unit_id: 0,
                    reg_names: vec![PROBE_REGISTER.to_string()],
                }),
            )],
        )?,
        addressed(
            CmdId::SetRegister,
            vec![(
                CONTROLLERS,
                Payload::SetRegisters(SetRegisters {
                    card_id: 0,
                    log_unit_id: 0,
                    reg_val_pairs: vec![probe()],
                }),
            )],
        )?,
        addressed(
            CmdId::GetBitfield,
            vec![(
                CONTROLLERS,
                Payload::GetBitfields(GetBitfields {
                    card_id: 0,
                    log_unit_id: 0,
                    bf_names: vec![PROBE_REGISTER.to_string()],
                }),
            )],
        )?,
        addressed(
            CmdId::SetBitfield,
            vec![(
                CONTROLLERS,
                Payload::SetBitfields(SetBitfields {
                    card_id: 0,
                    log_unit_id: 0,
                    bf_val_pairs: vec![probe()],
                }),
            )],
        )?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ChannelMap;
    use crate::schema::cmd::State;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn default_doc() -> Document {
        generate(&ReadoutParams::default()).unwrap()
    }

    fn conf_for<'a>(doc: &'a Document, module: &str) -> &'a Payload {
        let conf = doc.commands.iter().find(|c| c.id == CmdId::Conf).unwrap();
        &conf
            .entries()
            .iter()
            .find(|e| e.target.as_str() == module)
            .unwrap()
            .data
    }

    #[test]
    fn command_order_and_states() {
        let doc = default_doc();
        let seq: Vec<_> = doc
            .commands
            .iter()
            .map(|c| (c.id.as_str(), c.entry_state, c.exit_state))
            .collect();
        use State::*;
        assert_eq!(
            seq,
            vec![
                ("init", None, Initial),
                ("conf", Initial, Configured),
                ("start", Configured, Running),
                ("stop", Running, Configured),
                ("scrap", Configured, Initial),
                ("record", Running, Running),
                ("getregister", Running, Running),
                ("setregister", Running, Running),
                ("getbitfield", Running, Running),
                ("setbitfield", Running, Running),
            ]
        );
    }

    #[test]
    fn every_target_reaches_a_module() {
        let doc = default_doc();
        assert!(doc.unmatched_targets().is_empty());
        doc.check_targets(true).unwrap();
    }

    #[test]
    fn conf_covers_every_module_once() {
        let doc = default_doc();
        let conf = doc.commands.iter().find(|c| c.id == CmdId::Conf).unwrap();
        let mut targets: Vec<_> = conf.entries().iter().map(|e| e.target.to_string()).collect();
        let mut names: Vec<_> = doc.graph.module_names().map(str::to_string).collect();
        targets.sort();
        names.sort();
        assert_eq!(targets, names);
    }

    #[test]
    fn latency_buffer_uses_rounded_size_everywhere() {
        let params = ReadoutParams {
            data_rate_slowdown_factor: 1.0,
            ..ReadoutParams::default()
        };
        let doc = generate(&params).unwrap();
        let Payload::Conf(ModuleConf::Readout(rc)) = conf_for(&doc, "datahandler_1") else {
            panic!("datahandler_1 is not configured as a link handler");
        };
        assert_eq!(rc.latencybufferconf.latency_buffer_size, 499_712);
        assert_eq!(rc.requesthandlerconf.latency_buffer_size, 499_712);
        assert_eq!(rc.latencybufferconf.element_id, 1);
        assert_eq!(rc.requesthandlerconf.output_file, "raw_output_1.out");
    }

    #[test]
    fn readout_options_flow_into_processor_conf() {
        let params = ReadoutParams {
            enable_software_tpg: true,
            emulator_mode: true,
            tpg_channel_map: ChannelMap::VdColdbox,
            ..ReadoutParams::default()
        };
        let doc = generate(&params).unwrap();
        let value = serde_json::to_value(conf_for(&doc, "datahandler_0")).unwrap();
        assert_eq!(
            value["rawdataprocessorconf"],
            json!({
                "region_id": 0,
                "element_id": 0,
                "enable_software_tpg": true,
                "enable_firmware_tpg": false,
                "emulator_mode": true,
                "channel_map_name": "VDColdboxChannelMap"
            })
        );
    }

    #[test]
    fn dtp_controller_conf_carries_masks_and_unexpanded_path() {
        let doc = default_doc();
        let value = serde_json::to_value(conf_for(&doc, "dtpctrl_1")).unwrap();
        assert_eq!(value["device"], json!("flx-1-p2-hf"));
        assert_eq!(
            value["connections_file"],
            json!("${DTPCONTROLS_SHARE}/config/dtp_connections.xml")
        );
        assert_eq!(value["threshold"], json!(20));
        assert_eq!(value["source"], json!("int"));
        let masks = value["masks"].as_array().unwrap();
        assert_eq!(masks.len(), 20);
        assert_eq!(masks[0], json!(0xffff_fffe_u32));
        assert_eq!(masks[1], json!(0xffff_ffff_u32));
    }

    #[test]
    fn card_controller_lists_both_logical_units() {
        let params = ReadoutParams {
            emu_fanout: true,
            superchunk_factor: 6,
            ..ReadoutParams::default()
        };
        let doc = generate(&params).unwrap();
        let value = serde_json::to_value(conf_for(&doc, "flxcardctrl_0")).unwrap();
        assert_eq!(
            value,
            json!({
                "card_id": 0,
                "logical_units": [
                    { "log_unit_id": 0, "emu_fanout": true,
                      "links": [{ "link_id": 5, "enabled": true, "dma_desc": 0, "superchunk_factor": 6 }] },
                    { "log_unit_id": 1, "emu_fanout": true,
                      "links": [{ "link_id": 5, "enabled": true, "dma_desc": 0, "superchunk_factor": 6 }] }
                ]
            })
        );
    }

    #[test]
    fn start_carries_run_number_except_for_controllers() {
        let params = ReadoutParams {
            run_number: 1234,
            ..ReadoutParams::default()
        };
        let doc = generate(&params).unwrap();
        let start = serde_json::to_value(&doc.commands[2]).unwrap();
        assert_eq!(
            start["data"]["modules"],
            json!([
                { "match": "datahandler_.*", "data": { "run": 1234 } },
                { "match": "flxcard_.*", "data": { "run": 1234 } },
                { "match": "dtpctrl_.*", "data": {} }
            ])
        );
    }

    #[test]
    fn scrap_addresses_every_module() {
        let doc = default_doc();
        let scrap = &doc.commands[4];
        assert_eq!(scrap.id, CmdId::Scrap);
        let entries = scrap.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].target.resolve(doc.graph.module_names()).len(),
            doc.graph.modules.len()
        );
    }

    #[test]
    fn bitfield_commands_target_card_controllers() {
        let doc = default_doc();
        for cmd in &doc.commands[6..] {
            let entries = cmd.entries();
            assert_eq!(entries[0].target.as_str(), "flxcardctrl_.*");
            assert_eq!(
                entries[0].target.resolve(doc.graph.module_names()),
                vec!["flxcardctrl_0"]
            );
        }
    }

    #[test]
    fn more_links_add_card_controllers() {
        let params = ReadoutParams {
            number_of_links: 3,
            ..ReadoutParams::default()
        };
        let doc = generate(&params).unwrap();
        assert!(doc.graph.module("flxcardctrl_1").is_some());
        let value: Value = serde_json::to_value(conf_for(&doc, "flxcardctrl_1")).unwrap();
        assert_eq!(value["logical_units"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn invalid_parameters_abort_generation() {
        let params = ReadoutParams {
            data_rate_slowdown_factor: 0.0,
            ..ReadoutParams::default()
        };
        assert!(generate(&params).is_err());
    }
}
