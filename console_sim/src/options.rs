use std::path::PathBuf;

use log::LevelFilter;

use soc_control::config::EstimatorConfig;
use soc_control::estimator::DeadZone;

pub const USAGE: &str = "usage: console_sim [--capacity <Ah>] [--soc <percent>] \
[--threshold <A> | --no-dead-zone] [--state-file <path>] [--headless] [--verbose]";

/// Command line of the simulator
#[derive(Clone, Debug, PartialEq)]
pub struct Options {
    pub config: EstimatorConfig,
    /// real charge of the simulated battery at start
    pub battery_soc_percent: f64,
    pub state_file: PathBuf,
    pub headless: bool,
    pub log_level: LevelFilter,
    pub help: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            config: EstimatorConfig::default(),
            battery_soc_percent: 100.0,
            state_file: PathBuf::from("soc_state.bin"),
            headless: false,
            log_level: LevelFilter::Info,
            help: false,
        }
    }
}

impl Options {
    pub fn parse<I: Iterator<Item = String>>(args: I) -> Result<Options, String> {
        let mut options = Options::default();
        let mut args = args;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--capacity" => options.config.full_capacity_ah = number(&arg, args.next())?,
                "--soc" => options.battery_soc_percent = number(&arg, args.next())?,
                "--threshold" => options.config.dead_zone = DeadZone::Below(number(&arg, args.next())?),
                "--no-dead-zone" => options.config.dead_zone = DeadZone::Disabled,
                "--state-file" => {
                    options.state_file = PathBuf::from(value(&arg, args.next())?);
                }
                "--headless" => options.headless = true,
                "--verbose" => options.log_level = LevelFilter::Debug,
                "--help" | "-h" => options.help = true,
                other => return Err(format!("unknown argument {}\n{}", other, USAGE)),
            }
        }
        // without a screen the meter keeps counting and only logs
        options.config.require_report_sink = !options.headless;
        options.config.validate().map_err(|e| e.to_string())?;
        Ok(options)
    }
}

fn value(flag: &str, value: Option<String>) -> Result<String, String> {
    value.ok_or_else(|| format!("{} needs a value", flag))
}

fn number<T: std::str::FromStr>(flag: &str, value: Option<String>) -> Result<T, String> {
    let value = self::value(flag, value)?;
    value
        .parse()
        .map_err(|_| format!("{} expects a number, got {}", flag, value))
}
