use std::io;
use std::io::Stdout;
use std::thread::sleep;
use std::time::Duration;

use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use log::{error, info};
use tui::backend::CrosstermBackend;
use tui::Terminal;

use soc_control::bsp::delay::Delay;
use soc_control::bsp::pin::Pin;
use soc_control::bsp::report::ReportSink;
use soc_control::control::SocControl;
use soc_control::edt::{Event, EDT};
use soc_control::persistence::CapacityStore;
use soc_control::sampler::Sampler;

use crate::dashboard::{draw_tui, Dashboard};
use crate::file_storage::FileStorage;
use crate::keyboard_pin::keys;
use crate::options::{Options, USAGE};
use crate::sim_battery::{CurrentChannel, SimBattery, VoltageChannel};

mod dashboard;
mod file_storage;
mod keyboard_pin;
mod log_buffer;
mod options;
mod sim_battery;

const LOAD_STEP_A: f64 = 0.5;

/// Calibration really blocks, like on the board
struct ThreadDelay;

impl Delay for ThreadDelay {
    fn delay_ms(&self, ms: u32) {
        sleep(Duration::from_millis(ms as u64));
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = Options::parse(std::env::args().skip(1))?;
    if options.help {
        println!("{}", USAGE);
        return Ok(());
    }
    log_buffer::init(options.headless, options.log_level)?;

    let config = options.config;
    let battery = SimBattery::new(
        config.full_capacity_ah as f64,
        options.battery_soc_percent,
        &config,
    );
    let voltage = VoltageChannel {
        battery: &battery,
        config,
    };
    let current = CurrentChannel {
        battery: &battery,
        config,
    };
    let storage = FileStorage::create(options.state_file.clone());
    let keys = keys();

    let mut terminal = if options.headless {
        None
    } else {
        match open_terminal() {
            Ok(terminal) => Some(terminal),
            Err(e) => {
                error!("cannot open the terminal: {}", e);
                None
            }
        }
    };
    let dashboard = Dashboard::create(terminal.is_some());
    let sink: Option<&dyn ReportSink> = if options.headless {
        None
    } else {
        Some(&dashboard)
    };

    let edt = EDT::create();
    let control = SocControl::new(
        config,
        keys.recalibrate,
        Sampler::new(&voltage, &current, &config),
        &battery,
        &ThreadDelay,
        CapacityStore::new(&storage, config.storage_offset),
        sink,
        &edt,
    )
    .map_err(|e| e.to_string())?;

    info!("state file {}", options.state_file.display());
    if let Err(e) = control.start() {
        close_terminal(&mut terminal)?;
        return Err(e.to_string().into());
    }

    loop {
        if keys.esc.is_down() {
            break;
        }
        if keys.more_load.pressed() {
            battery.change_load(LOAD_STEP_A);
        }
        if keys.less_load.pressed() {
            battery.change_load(-LOAD_STEP_A);
        }
        if keys.no_load.pressed() {
            battery.remove_load();
        }
        if keys.probe.pressed() {
            battery.toggle_probe();
        }

        match edt.poll() {
            Event::Execute { msg } => control.process_message(msg),
            Event::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(ms as u64)).await;
                battery.advance(ms);
            }
            Event::Halt => break,
        }

        if let Some(terminal) = terminal.as_mut() {
            draw_tui(terminal, &dashboard, &battery)?;
        }
    }

    info!(
        "estimated {:.1} %, real {:.1} %",
        control.state().charge.soc_percent(),
        battery.soc_percent()
    );
    close_terminal(&mut terminal)?;
    Ok(())
}

fn open_terminal() -> io::Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn close_terminal(terminal: &mut Option<Terminal<CrosstermBackend<Stdout>>>) -> io::Result<()> {
    if let Some(terminal) = terminal.as_mut() {
        terminal.clear()?;
        disable_raw_mode()?;
    }
    Ok(())
}
