use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod app;
mod error;
mod graph;
mod params;
mod render;
mod schema;
mod target;

use params::{ChannelMap, DataSource, DtpParams, ReadoutParams, UhalLogLevel};

pub type Result<T> = anyhow::Result<T>;

#[derive(Parser)]
#[command(name = "readout-confgen")]
#[command(about = "Readout application configuration generator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the FELIX readout application command sequence.
    Readout(ReadoutArgs),

    /// Generate the standalone DTP controller command sequence.
    DtpCtrl(DtpArgs),
}

/// Flags left unset fall back to the parameter file, then to built-in defaults.
#[derive(Args)]
struct ReadoutArgs {
    /// JSON parameter file applied before the flags.
    #[arg(long)]
    config: Option<String>,

    #[arg(short = 'r', long)]
    run_number: Option<u32>,

    #[arg(short = 'n', long)]
    number_of_links: Option<usize>,

    #[arg(short = 's', long)]
    data_rate_slowdown_factor: Option<f64>,

    #[arg(short = 'e', long)]
    emulator_mode: bool,

    #[arg(short = 'g', long)]
    enable_software_tpg: bool,

    #[arg(short = 'S', long)]
    superchunk_factor: Option<u32>,

    #[arg(short = 'E', long)]
    emu_fanout: bool,

    #[arg(short = 'c', long, value_parser = parse_option::<ChannelMap>)]
    tpg_channel_map: Option<ChannelMap>,

    /// Passed through verbatim; `${VAR}` placeholders are expanded by the runtime.
    #[arg(long)]
    connections_file: Option<String>,

    #[arg(short = 'u', long, value_parser = parse_option::<UhalLogLevel>)]
    uhal_log_level: Option<UhalLogLevel>,

    #[arg(long, value_parser = parse_option::<DataSource>)]
    source_data: Option<DataSource>,

    #[arg(short = 'w', long)]
    wibulator_data: Option<String>,

    #[arg(short = 't', long)]
    threshold: Option<u32>,

    /// Channels left unmasked on every DTP link, e.g. `0,1,64`.
    #[arg(long, value_delimiter = ',')]
    enabled_channels: Option<Vec<u32>>,

    /// Seconds of raw data the `record` command captures.
    #[arg(long)]
    record_duration: Option<u32>,

    /// Directory the link handlers record raw data into.
    #[arg(short = 'o', long)]
    output_path: Option<String>,

    /// Fail instead of warning when a command target matches no module.
    #[arg(long)]
    strict_targets: bool,

    #[arg(default_value = "flx_readout.json")]
    json_file: String,
}

#[derive(Args)]
struct DtpArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(short = 'c', long)]
    connections_file: Option<String>,

    #[arg(short = 'd', long)]
    dtp_device_name: Option<String>,

    #[arg(short = 'u', long, value_parser = parse_option::<UhalLogLevel>)]
    uhal_log_level: Option<UhalLogLevel>,

    #[arg(long)]
    strict_targets: bool,

    #[arg(default_value = "dtp_ctrl_app.json")]
    json_file: String,
}

fn parse_option<T>(s: &str) -> std::result::Result<T, error::ConfgenError>
where
    T: std::str::FromStr<Err = error::ConfgenError>,
{
    s.parse()
}

/// Deserialize a parameter file, or fall back to defaults when none is given.
fn load_params<T>(path: Option<&str>) -> Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    use anyhow::Context;

    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("read parameter file {}", path))?;
            let params = serde_json::from_str(&text)
                .with_context(|| format!("parse parameter file {}", path))?;
            Ok(params)
        }
        None => Ok(T::default()),
    }
}

impl ReadoutArgs {
    fn into_params(self) -> Result<(ReadoutParams, String, bool)> {
        let mut p: ReadoutParams = load_params(self.config.as_deref())?;

        macro_rules! overlay {
            ($($field:ident),+ $(,)?) => {
                $(if let Some(v) = self.$field {
                    p.$field = v;
                })+
            };
        }
        overlay!(
            run_number,
            number_of_links,
            data_rate_slowdown_factor,
            superchunk_factor,
            tpg_channel_map,
            connections_file,
            uhal_log_level,
            source_data,
            wibulator_data,
            threshold,
            enabled_channels,
            record_duration,
            output_path,
        );
        p.emulator_mode |= self.emulator_mode;
        p.enable_software_tpg |= self.enable_software_tpg;
        p.emu_fanout |= self.emu_fanout;

        Ok((p, self.json_file, self.strict_targets))
    }
}

impl DtpArgs {
    fn into_params(self) -> Result<(DtpParams, String, bool)> {
        let mut p: DtpParams = load_params(self.config.as_deref())?;
        if let Some(v) = self.connections_file {
            p.connections_file = v;
        }
        if let Some(v) = self.dtp_device_name {
            p.dtp_device_name = v;
        }
        if let Some(v) = self.uhal_log_level {
            p.uhal_log_level = v;
        }
        Ok((p, self.json_file, self.strict_targets))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // 1) Resolve parameters and build the document.
    let (doc, json_file, strict) = match cli.cmd {
        Commands::Readout(args) => {
            let (p, json_file, strict) = args.into_params()?;
            params::check_output_path(&p.output_path)?;
            debug!(params = ?p, "readout parameters");
            (app::readout::generate(&p)?, json_file, strict)
        }
        Commands::DtpCtrl(args) => {
            let (p, json_file, strict) = args.into_params()?;
            debug!(params = ?p, "dtp controller parameters");
            (app::dtp::generate(&p)?, json_file, strict)
        }
    };

    // 2) Report targets that reach nothing.
    doc.check_targets(strict)?;

    // 3) Render and write.
    let text = render::render_commands(&doc.commands)?;
    render::write_document(&json_file, &text)?;
    info!(
        commands = doc.commands.len(),
        modules = doc.graph.modules.len(),
        "'{}' generation completed",
        json_file
    );

    Ok(())
}
