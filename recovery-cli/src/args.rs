use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;

#[derive(Parser, Debug)]
#[command(name = "Recovery CLI")]
#[command(bin_name = "recovery-cli")]
pub struct Cli {
    #[arg(long, global = true, help = "serial port, overrides the config file")]
    pub port: Option<String>,

    #[clap(subcommand)]
    pub mode: ModeSelect,
}

#[derive(Subcommand, Debug)]
pub enum ModeSelect {
    #[command(about = "run the flight software on the host against a trajectory")]
    Simulate(SimulateCli),

    #[command(about = "feed altitudes to a board in simulation mode")]
    Serve(ServeCli),

    #[command(about = "download the flight report")]
    Report(ReportCli),

    #[command(about = "print static and flight parameters")]
    Params,

    #[command(about = "change a flight parameter")]
    SetParam(SetParamCli),

    #[command(about = "restore the factory flight parameters")]
    RestoreParams,

    #[command(about = "erase the recorded flight")]
    Clear,
}

#[derive(Parser, Debug)]
pub struct SimulateCli {
    #[arg(long, help = "csv file with time (s) and altitude (m), synthetic flight if omitted")]
    pub trajectory: Option<PathBuf>,

    #[arg(long, default_value = "flight.eeprom", help = "eeprom image, created if missing")]
    pub eeprom: PathBuf,

    #[arg(long, help = "erase the eeprom image before starting")]
    pub fresh: bool,

    #[arg(long, help = "write the recorded flight path to this csv file")]
    pub csv: Option<PathBuf>,

    #[arg(long, default_value_t = 120.0)]
    pub max_time_s: f64,

    #[arg(long, help = "seed for the altimeter noise")]
    pub seed: Option<u64>,
}

#[derive(Parser, Debug)]
pub struct ServeCli {
    #[arg(help = "csv file with time (s) and altitude (m)")]
    pub trajectory: PathBuf,

    #[arg(long, default_value_t = 5.0, help = "board time (s) at which the trajectory starts")]
    pub delay_s: f64,
}

#[derive(Parser, Debug)]
pub struct ReportCli {
    #[arg(long, help = "write the flight path to this csv file")]
    pub csv: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct SetParamCli {
    #[arg(help = "parameter name, e.g. speed_for_liftoff_detection")]
    pub name: String,
    pub value: i16,

    #[arg(long, help = "also write the parameters to the board's memory")]
    pub persist: bool,
}
