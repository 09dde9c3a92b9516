//! Per-module command payloads.
//!
//! `conf` payloads depend on the module kind and are grouped in
//! [`ModuleConf`]; everything a command can carry for one target is a
//! [`Payload`].

use crate::schema::conn::Plugin;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// FELIX card reader (`flxcard_*`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardReaderConf {
    pub card_id: u32,
    pub logical_unit: u32,
    pub dma_id: u32,
    pub chunk_trailer_size: u32,
    pub dma_block_size_kb: u32,
    pub dma_memory_size_gb: u32,
    pub numa_id: u32,
    pub links_enabled: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardLink {
    pub link_id: u32,
    pub enabled: bool,
    pub dma_desc: u32,
    pub superchunk_factor: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogicalUnit {
    pub log_unit_id: u32,
    pub emu_fanout: bool,
    pub links: Vec<CardLink>,
}

/// FELIX card controller (`flxcardctrl_*`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardControllerConf {
    pub card_id: u32,
    pub logical_units: Vec<LogicalUnit>,
}

/// DTP pod controller (`dtpctrl*`). The standalone controller app only sets
/// the connection fields; the firmware fields are omitted there.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DtpControllerConf {
    pub connections_file: String,
    pub device: String,
    pub uhal_log_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masks: Option<Vec<u32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadoutModelConf {
    pub source_queue_timeout_ms: u32,
    pub fake_trigger_flag: u32,
    pub timesync_connection_name: String,
    pub region_id: u32,
    pub element_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyBufferConf {
    pub latency_buffer_alignment_size: u64,
    pub latency_buffer_size: u64,
    pub region_id: u32,
    pub element_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawDataProcessorConf {
    pub region_id: u32,
    pub element_id: u32,
    pub enable_software_tpg: bool,
    pub enable_firmware_tpg: bool,
    pub emulator_mode: bool,
    pub channel_map_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestHandlerConf {
    pub latency_buffer_size: u64,
    pub pop_limit_pct: f64,
    pub pop_size_pct: f64,
    pub region_id: u32,
    pub element_id: u32,
    pub output_file: String,
    pub stream_buffer_size: u64,
    pub enable_raw_recording: bool,
}

/// Data link handler (`datahandler_*`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadoutConf {
    pub readoutmodelconf: ReadoutModelConf,
    pub latencybufferconf: LatencyBufferConf,
    pub rawdataprocessorconf: RawDataProcessorConf,
    pub requesthandlerconf: RequestHandlerConf,
}

/// `conf` payload, keyed by module kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ModuleConf {
    CardReader(CardReaderConf),
    CardController(CardControllerConf),
    DtpController(DtpControllerConf),
    Readout(ReadoutConf),
}

impl ModuleConf {
    /// The only module kind able to accept this configuration.
    pub fn plugin(&self) -> Plugin {
        match self {
            ModuleConf::CardReader(_) => Plugin::FelixCardReader,
            ModuleConf::CardController(_) => Plugin::FelixCardController,
            ModuleConf::DtpController(_) => Plugin::DtpController,
            ModuleConf::Readout(_) => Plugin::DataLinkHandler,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartParams {
    pub run: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingParams {
    pub duration: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegValPair {
    pub reg_name: String,
    pub reg_val: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GetRegisters {
    pub card_id: u32,
    pub log_unit_id: u32,
    pub reg_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetRegisters {
    pub card_id: u32,
    pub log_unit_id: u32,
    pub reg_val_pairs: Vec<RegValPair>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GetBitfields {
    pub card_id: u32,
    pub log_unit_id: u32,
    pub bf_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetBitfields {
    pub card_id: u32,
    pub log_unit_id: u32,
    pub bf_val_pairs: Vec<RegValPair>,
}

/// What one addressed entry of a command carries.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Serialized as `{}`.
    Empty,
    Conf(ModuleConf),
    Start(StartParams),
    Record(RecordingParams),
    GetRegisters(GetRegisters),
    SetRegisters(SetRegisters),
    GetBitfields(GetBitfields),
    SetBitfields(SetBitfields),
}

impl From<ModuleConf> for Payload {
    fn from(conf: ModuleConf) -> Self {
        Payload::Conf(conf)
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Payload::Empty => serializer.serialize_map(Some(0))?.end(),
            Payload::Conf(c) => c.serialize(serializer),
            Payload::Start(p) => p.serialize(serializer),
            Payload::Record(p) => p.serialize(serializer),
            Payload::GetRegisters(p) => p.serialize(serializer),
            Payload::SetRegisters(p) => p.serialize(serializer),
            Payload::GetBitfields(p) => p.serialize(serializer),
            Payload::SetBitfields(p) => p.serialize(serializer),
        }
    }
}
