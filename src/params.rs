//! User-facing parameters and the values derived from them.
//!
//! Parameters come from built-in defaults, optionally overlaid by a JSON
//! parameter file (`--config`) and finally by command-line flags. Nothing here
//! touches the filesystem except [`check_output_path`].

use crate::error::{ConfgenError, ConfgenResult};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Local clock speed of the readout hardware.
pub const CLOCK_SPEED_HZ: u64 = 50_000_000;
/// Latency buffers are allocated in 4 KiB aligned blocks.
pub const LATENCY_BUFFER_ALIGNMENT: u64 = 4096;
/// Time the link handlers wait on an empty source queue.
pub const QUEUE_POP_WAIT_MS: u32 = 100;

/// FELIX link carrying trigger primitives on every logical unit.
pub const TP_LINK_ID: u32 = 5;
pub const LOGICAL_UNITS_PER_CARD: usize = 2;
/// Reader output ports are numbered `logical_unit * 6 + link`.
pub const LINKS_PER_LOGICAL_UNIT: u32 = 6;

pub const MASK_LINKS: usize = 5;
pub const MASK_WORDS_PER_LINK: usize = 4;
pub const CHANNELS_PER_LINK: u32 = (MASK_WORDS_PER_LINK as u32) * 32;

/// Number of frames per readout tick; the divisor in the buffer sizing.
const FRAMES_PER_TICK: u64 = 25 * 12;
/// Seconds of data the latency buffer holds at full rate.
const BUFFERED_SECONDS: u64 = 3;

/// Latency buffer element count for a given data-rate slowdown.
///
/// The raw size `3 * CLOCK_SPEED_HZ / (25 * 12 * slowdown)` is truncated and
/// then rounded down to a multiple of [`LATENCY_BUFFER_ALIGNMENT`].
pub fn latency_buffer_size(slowdown: f64) -> ConfgenResult<u64> {
    let raw = raw_latency_buffer_size(slowdown)?;
    Ok(raw - raw % LATENCY_BUFFER_ALIGNMENT)
}

/// Unaligned buffer size, before rounding.
pub fn raw_latency_buffer_size(slowdown: f64) -> ConfgenResult<u64> {
    if !slowdown.is_finite() || slowdown <= 0.0 {
        return Err(ConfgenError::invalid(
            "data_rate_slowdown_factor",
            format!("must be a positive number, got {}", slowdown),
        ));
    }
    let raw = (BUFFERED_SECONDS * CLOCK_SPEED_HZ) as f64 / (FRAMES_PER_TICK as f64 * slowdown);
    if !raw.is_finite() || raw >= u64::MAX as f64 {
        return Err(ConfgenError::invalid(
            "data_rate_slowdown_factor",
            format!("{} is too small, the buffer size does not fit in 64 bits", slowdown),
        ));
    }
    Ok(raw.floor() as u64)
}

/// DTP channel mask words for one controller.
///
/// Every link has [`MASK_WORDS_PER_LINK`] words; a set bit masks the channel
/// off. Each enabled channel is unmasked on every link.
pub fn channel_masks(enabled_channels: &[u32]) -> ConfgenResult<Vec<u32>> {
    let mut link_words = [u32::MAX; MASK_WORDS_PER_LINK];
    for &ch in enabled_channels {
        if ch >= CHANNELS_PER_LINK {
            return Err(ConfgenError::invalid(
                "enabled_channels",
                format!("channel {} out of range 0..{}", ch, CHANNELS_PER_LINK),
            ));
        }
        link_words[(ch / 32) as usize] &= !(1u32 << (ch % 32));
    }
    Ok(link_words.repeat(MASK_LINKS))
}

/// Declares a closed set of string-valued options.
///
/// Parsing goes through `FromStr`, so both clap and serde report unknown names
/// as [`ConfgenError::InvalidParameter`].
macro_rules! named_options {
    ($(#[$meta:meta])* $name:ident, $param:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ConfgenError;

            fn from_str(s: &str) -> ConfgenResult<Self> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ConfgenError::invalid(
                        $param,
                        format!(
                            "unknown value {:?}, expected one of: {}",
                            other,
                            $name::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(", ")
                        ),
                    )),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = ConfgenError;

            fn try_from(s: String) -> ConfgenResult<Self> {
                s.parse()
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> String {
                v.as_str().to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

named_options!(
    /// Channel map used by the raw data processor.
    ChannelMap, "tpg_channel_map" {
        ProtoDuneSp1 => "ProtoDUNESP1ChannelMap",
        VdColdbox => "VDColdboxChannelMap",
    }
);

named_options!(
    /// Where the DTP firmware takes its input from.
    DataSource, "source_data" {
        Internal => "int",
        External => "ext",
    }
);

named_options!(
    /// Verbosity handed to the uHAL hardware access library.
    UhalLogLevel, "uhal_log_level" {
        Fatal => "fatal",
        Error => "error",
        Warning => "warning",
        Notice => "notice",
        Info => "info",
        Debug => "debug",
        Trace => "trace",
    }
);

/// Where one readout link lives in hardware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPlacement {
    pub index: usize,
    pub card_id: u32,
    pub logical_unit: u32,
    pub link_id: u32,
    /// Card reader output port feeding this link's raw queue.
    pub reader_port: u32,
    /// uHAL device name of the DTP pod serving this link.
    pub device: String,
}

impl LinkPlacement {
    pub fn for_link(index: usize) -> Self {
        let logical_unit = (index % LOGICAL_UNITS_PER_CARD) as u32;
        Self {
            index,
            card_id: (index / LOGICAL_UNITS_PER_CARD) as u32,
            logical_unit,
            link_id: TP_LINK_ID,
            reader_port: logical_unit * LINKS_PER_LOGICAL_UNIT + TP_LINK_ID,
            device: format!("flx-{}-p2-hf", index),
        }
    }
}

/// Parameters of the FELIX readout application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadoutParams {
    pub run_number: u32,
    pub number_of_links: usize,
    pub data_rate_slowdown_factor: f64,
    pub emulator_mode: bool,
    pub enable_software_tpg: bool,
    pub superchunk_factor: u32,
    pub emu_fanout: bool,
    pub tpg_channel_map: ChannelMap,
    pub connections_file: String,
    pub uhal_log_level: UhalLogLevel,
    pub source_data: DataSource,
    pub wibulator_data: String,
    pub threshold: u32,
    pub enabled_channels: Vec<u32>,
    pub record_duration: u32,
    pub output_path: String,
}

impl Default for ReadoutParams {
    fn default() -> Self {
        Self {
            run_number: 333,
            number_of_links: 2,
            data_rate_slowdown_factor: 10.0,
            emulator_mode: false,
            enable_software_tpg: false,
            superchunk_factor: 12,
            emu_fanout: false,
            tpg_channel_map: ChannelMap::ProtoDuneSp1,
            connections_file: "${DTPCONTROLS_SHARE}/config/dtp_connections.xml".to_string(),
            uhal_log_level: UhalLogLevel::Notice,
            source_data: DataSource::Internal,
            wibulator_data: "pattern.txt".to_string(),
            threshold: 20,
            enabled_channels: vec![0],
            record_duration: 10,
            output_path: ".".to_string(),
        }
    }
}

/// Values computed once from [`ReadoutParams`] and shared by several modules.
#[derive(Debug, Clone, PartialEq)]
pub struct Derived {
    pub latency_buffer_size: u64,
    pub masks: Vec<u32>,
    pub links: Vec<LinkPlacement>,
}

impl Derived {
    /// Card ids in use, ascending, each listed once.
    pub fn card_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.links.iter().map(|l| l.card_id).collect();
        ids.dedup();
        ids
    }
}

impl ReadoutParams {
    /// Validate every parameter and compute the derived values.
    pub fn derive(&self) -> ConfgenResult<Derived> {
        if self.number_of_links == 0 {
            return Err(ConfgenError::invalid(
                "number_of_links",
                "at least one link is required",
            ));
        }
        if self.superchunk_factor == 0 {
            return Err(ConfgenError::invalid(
                "superchunk_factor",
                "must be at least 1",
            ));
        }
        let latency_buffer_size = latency_buffer_size(self.data_rate_slowdown_factor)?;
        let masks = channel_masks(&self.enabled_channels)?;
        let links = (0..self.number_of_links)
            .map(LinkPlacement::for_link)
            .collect();

        Ok(Derived {
            latency_buffer_size,
            masks,
            links,
        })
    }

    /// File the request handler of `link` records raw data into.
    pub fn recording_file(&self, link: usize) -> String {
        let name = format!("raw_output_{}.out", link);
        if is_current_dir(&self.output_path) {
            name
        } else {
            format!("{}/{}", self.output_path.trim_end_matches('/'), name)
        }
    }
}

/// Parameters of the standalone DTP controller application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DtpParams {
    pub connections_file: String,
    pub dtp_device_name: String,
    pub uhal_log_level: UhalLogLevel,
}

impl Default for DtpParams {
    fn default() -> Self {
        Self {
            connections_file: "${DTPCONTROLS_SHARE}/config/etc/dtp_connections.xml".to_string(),
            dtp_device_name: "flx-0-p2-hf".to_string(),
            uhal_log_level: UhalLogLevel::Notice,
        }
    }
}

impl DtpParams {
    pub fn validate(&self) -> ConfgenResult<()> {
        if self.dtp_device_name.trim().is_empty() {
            return Err(ConfgenError::invalid(
                "dtp_device_name",
                "device name must not be empty",
            ));
        }
        Ok(())
    }
}

/// True if `path` carries a `${VAR}` placeholder left for the runtime to expand.
pub fn has_placeholder(path: &str) -> bool {
    path.contains("${")
}

/// True if `path` names the working directory; `""` counts as `"."`.
fn is_current_dir(path: &str) -> bool {
    path.is_empty() || path == "."
}

/// The recording directory must already exist unless it is expanded downstream.
pub fn check_output_path(path: &str) -> ConfgenResult<()> {
    if is_current_dir(path) || has_placeholder(path) || Path::new(path).is_dir() {
        return Ok(());
    }
    Err(ConfgenError::invalid(
        "output_path",
        format!("directory {} does not exist", path),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn buffer_size_for_full_rate() {
        assert_eq!(raw_latency_buffer_size(1.0).unwrap(), 500_000);
        assert_eq!(500_000 % LATENCY_BUFFER_ALIGNMENT, 288);
        assert_eq!(latency_buffer_size(1.0).unwrap(), 499_712);
        assert_eq!(499_712 % LATENCY_BUFFER_ALIGNMENT, 0);
    }

    #[test]
    fn tiny_slowdown_overflowing_the_buffer_size_is_rejected() {
        for tiny in [1e-300, 1e-310, f64::MIN_POSITIVE] {
            assert!(matches!(
                latency_buffer_size(tiny).unwrap_err(),
                ConfgenError::InvalidParameter {
                    name: "data_rate_slowdown_factor",
                    ..
                }
            ));
            assert!(raw_latency_buffer_size(tiny).is_err());
        }
        assert!(latency_buffer_size(1e-6).is_ok());
    }

    #[test]
    fn buffer_size_is_aligned_and_not_larger_than_raw() {
        for slowdown in [0.25, 0.5, 1.0, 1.5, 2.0, 3.0, 7.0, 10.0, 33.3, 100.0, 1e6] {
            let raw = raw_latency_buffer_size(slowdown).unwrap();
            let size = latency_buffer_size(slowdown).unwrap();
            assert_eq!(size % LATENCY_BUFFER_ALIGNMENT, 0, "slowdown {}", slowdown);
            assert!(size <= raw, "slowdown {}", slowdown);
            assert!(raw - size < LATENCY_BUFFER_ALIGNMENT);
        }
        assert_eq!(latency_buffer_size(10.0).unwrap(), 49_152);
    }

    #[test]
    fn zero_or_negative_slowdown_is_rejected() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = latency_buffer_size(bad).unwrap_err();
            assert!(matches!(
                err,
                ConfgenError::InvalidParameter {
                    name: "data_rate_slowdown_factor",
                    ..
                }
            ));
        }
    }

    #[test]
    fn default_masks_unmask_channel_zero_on_every_link() {
        let masks = channel_masks(&[0]).unwrap();
        let mut expected = Vec::new();
        for _ in 0..MASK_LINKS {
            expected.extend([0xffff_fffe, 0xffff_ffff, 0xffff_ffff, 0xffff_ffff]);
        }
        assert_eq!(masks, expected);
    }

    #[test]
    fn masks_place_channels_in_their_word() {
        let masks = channel_masks(&[1, 33, 127]).unwrap();
        assert_eq!(masks.len(), MASK_LINKS * MASK_WORDS_PER_LINK);
        assert_eq!(&masks[..4], &[0xffff_fffd, 0xffff_fffd, 0xffff_ffff, 0x7fff_ffff]);
        assert_eq!(&masks[4..8], &masks[..4]);
        assert!(channel_masks(&[128]).is_err());
        assert_eq!(channel_masks(&[]).unwrap(), vec![u32::MAX; 20]);
    }

    #[test]
    fn unknown_channel_map_is_invalid() {
        let err = "ProtoDUNEHD".parse::<ChannelMap>().unwrap_err();
        assert!(matches!(
            err,
            ConfgenError::InvalidParameter {
                name: "tpg_channel_map",
                ..
            }
        ));
        assert_eq!(
            "VDColdboxChannelMap".parse::<ChannelMap>().unwrap(),
            ChannelMap::VdColdbox
        );
    }

    #[test]
    fn params_file_overrides_defaults() {
        let params: ReadoutParams = serde_json::from_str(
            r#"{ "run_number": 42, "tpg_channel_map": "VDColdboxChannelMap", "uhal_log_level": "debug" }"#,
        )
        .unwrap();
        assert_eq!(params.run_number, 42);
        assert_eq!(params.tpg_channel_map, ChannelMap::VdColdbox);
        assert_eq!(params.uhal_log_level, UhalLogLevel::Debug);
        assert_eq!(params.number_of_links, 2);

        assert!(serde_json::from_str::<ReadoutParams>(r#"{ "source_data": "usb" }"#).is_err());
        assert!(serde_json::from_str::<ReadoutParams>(r#"{ "runnumber": 1 }"#).is_err());
    }

    #[test]
    fn links_spread_over_logical_units_and_cards() {
        let params = ReadoutParams {
            number_of_links: 3,
            ..ReadoutParams::default()
        };
        let derived = params.derive().unwrap();
        let ports: Vec<_> = derived.links.iter().map(|l| l.reader_port).collect();
        assert_eq!(ports, vec![5, 11, 5]);
        assert_eq!(derived.links[2].card_id, 1);
        assert_eq!(derived.links[1].device, "flx-1-p2-hf");
        assert_eq!(derived.card_ids(), vec![0, 1]);
    }

    #[test]
    fn derive_rejects_degenerate_topologies() {
        let no_links = ReadoutParams {
            number_of_links: 0,
            ..ReadoutParams::default()
        };
        assert!(no_links.derive().is_err());

        let no_superchunk = ReadoutParams {
            superchunk_factor: 0,
            ..ReadoutParams::default()
        };
        assert!(no_superchunk.derive().is_err());
    }

    #[test]
    fn recording_file_follows_output_path() {
        let mut params = ReadoutParams::default();
        assert_eq!(params.recording_file(1), "raw_output_1.out");
        params.output_path = String::new();
        assert_eq!(params.recording_file(1), "raw_output_1.out");
        params.output_path = "/data/run/".to_string();
        assert_eq!(params.recording_file(0), "/data/run/raw_output_0.out");
    }

    #[test]
    fn placeholder_paths_are_not_checked() {
        assert!(check_output_path("${DTPCONTROLS_SHARE}/out").is_ok());
        assert!(check_output_path(".").is_ok());
        assert!(check_output_path("").is_ok());
        assert!(check_output_path("/definitely/not/here").is_err());
    }
}
