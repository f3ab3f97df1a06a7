use core::convert::TryFrom;
use core::fmt;

use log::{debug, info, warn};
use no_std_compat::cell::Cell;

use crate::bsp::delay::Delay;
use crate::bsp::pin::Pin;
use crate::bsp::report::ReportSink;
use crate::bsp::thermometer::Thermometer;
use crate::calibration::{calibrate, Calibration};
use crate::config::{ConfigError, EstimatorConfig};
use crate::edt::EDT;
use crate::estimator::{tick, ChargeState, EstimatorState, SensorReading};
use crate::persistence::CapacityStore;
use crate::report::Report;
use crate::sampler::Sampler;

#[derive(Clone, Debug, Eq, PartialEq, Copy)]
pub enum Action {
    CheckButton,
    Tick,
    Save,
}

impl Action {
    /// Order of actions due at the same instant: a recalibration request is served before
    /// the tick, and the save stores the result of that tick.
    fn priority(&self) -> u8 {
        match self {
            Action::CheckButton => 0,
            Action::Tick => 1,
            Action::Save => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ControlError {
    Config(ConfigError),
    /// the screen is the only output, running without it makes no sense
    ReportSinkUnavailable,
}

impl From<ConfigError> for ControlError {
    fn from(e: ConfigError) -> Self {
        ControlError::Config(e)
    }
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::Config(e) => write!(f, "invalid configuration: {}", e),
            ControlError::ReportSinkUnavailable => write!(f, "report sink is not available"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ButtonState {
    Released,
    /// recalibration was requested, nothing happens until the button is let go
    AwaitingRelease,
}

/// Recalibration button which remembers how long it has been held down
struct RecalibrationButton<P: Pin> {
    pin: P,
    hold_time: Cell<u32>,
    state: Cell<ButtonState>,
    debounce: u32,
}

impl<P: Pin> RecalibrationButton<P> {
    /// true once per press, after the pin stayed down for the debounce time
    fn check_state(&self, elapsed_time: u32) -> bool {
        if !self.pin.is_down() {
            self.hold_time.set(0);
            self.state.set(ButtonState::Released);
            return false;
        }

        let held = self.hold_time.get().saturating_add(elapsed_time);
        self.hold_time.set(held);

        if self.state.get() == ButtonState::Released && held >= self.debounce {
            self.state.set(ButtonState::AwaitingRelease);
            true
        } else {
            false
        }
    }
}

/// Control loop: samples sensors every tick, integrates the current into the remaining
/// charge, reports it and saves it now and then.
pub struct SocControl<'a, P: Pin> {
    button: RecalibrationButton<P>,
    sampler: Sampler<'a>,
    thermometer: &'a dyn Thermometer,
    delay: &'a dyn Delay,
    store: CapacityStore<'a>,
    sink: Option<&'a dyn ReportSink>,
    edt: &'a EDT<Action>,
    config: EstimatorConfig,
    state: Cell<EstimatorState>,
    last_tick: Cell<u64>,
    last_report: Cell<Option<Report>>,
}

impl<'a, P: Pin> SocControl<'a, P> {
    pub fn new(
        config: EstimatorConfig,
        recalibrate_pin: P,
        sampler: Sampler<'a>,
        thermometer: &'a dyn Thermometer,
        delay: &'a dyn Delay,
        store: CapacityStore<'a>,
        sink: Option<&'a dyn ReportSink>,
        edt: &'a EDT<Action>,
    ) -> Result<Self, ControlError> {
        config.validate()?;
        Ok(SocControl {
            button: RecalibrationButton {
                pin: recalibrate_pin,
                // a button held during boot does not ask for a second calibration
                hold_time: Cell::new(0),
                state: Cell::new(ButtonState::AwaitingRelease),
                debounce: config.button_debounce_ms,
            },
            sampler,
            thermometer,
            delay,
            store,
            sink,
            edt,
            config,
            state: Cell::new(EstimatorState::new(
                ChargeState::full(config.full_capacity_ah),
                Calibration {
                    zero_offset_voltage: 0.0,
                },
            )),
            last_tick: Cell::new(0),
            last_report: Cell::new(None),
        })
    }

    /// Restores the charge, calibrates the current sensor and schedules periodic work
    pub fn start(&self) -> Result<(), ControlError> {
        let sink_available = self.sink.map_or(false, |sink| sink.is_available());
        if !sink_available {
            if self.config.require_report_sink {
                return Err(ControlError::ReportSinkUnavailable);
            }
            warn!("no report sink, running headless");
        }

        let persisted = self.store.load();
        let charge = ChargeState::restore(self.config.full_capacity_ah, persisted);
        if Some(charge.remaining_capacity_ah) == persisted {
            info!("restored {} Ah", charge.remaining_capacity_ah);
        } else {
            info!("no valid stored capacity ({:?}), assuming full", persisted);
        }

        let calibration = self.run_calibration();
        self.state.set(EstimatorState::new(charge, calibration));

        self.last_tick.set(self.edt.now());
        self.schedule(Action::CheckButton);
        self.schedule(Action::Tick);
        self.schedule(Action::Save);
        Ok(())
    }

    pub fn process_message(&self, action: Action) {
        match action {
            Action::CheckButton => self.check_button(),
            Action::Tick => self.tick(),
            Action::Save => self.save(),
        }
    }

    pub fn state(&self) -> EstimatorState {
        self.state.get()
    }

    pub fn last_report(&self) -> Option<Report> {
        self.last_report.get()
    }

    /// Blocks until the new zero offset is measured. There must be no load meanwhile.
    pub fn recalibrate(&self) {
        let calibration = self.run_calibration();
        self.state.set(self.state.get().recalibrated(calibration));
    }

    fn run_calibration(&self) -> Calibration {
        calibrate(
            &self.sampler,
            self.delay,
            self.config.calibration_sample_count,
            self.config.calibration_sample_delay_ms,
        )
    }

    fn check_button(&self) {
        if self.button.check_state(self.config.button_check_period_ms) {
            info!("recalibration requested");
            self.recalibrate();
        }
        self.schedule(Action::CheckButton);
    }

    fn tick(&self) {
        let now = self.edt.now();
        let dt_ms = u32::try_from(now - self.last_tick.get()).unwrap_or(u32::MAX);
        self.last_tick.set(now);

        let reading = SensorReading {
            battery_voltage: self.sampler.read_voltage(),
            current_sensor_voltage: self
                .sampler
                .read_averaged_current_voltage(self.config.current_sample_count),
            temperature_c: self.thermometer.read_celsius(),
        };

        let mut state = self.state.get();
        let report = tick(&mut state, &self.config, &reading, dt_ms);
        self.state.set(state);

        if report.stale {
            warn!("invalid sensor reading {:?}, charge not updated", reading);
        }
        debug!("{}", report);
        if let Some(sink) = self.sink {
            sink.report(&report);
        }
        self.last_report.set(Some(report));

        self.schedule(Action::Tick);
    }

    fn save(&self) {
        let remaining = self.state.get().charge.remaining_capacity_ah;
        match self.store.save(remaining) {
            Ok(()) => debug!("saved {} Ah", remaining),
            Err(e) => warn!("cannot save {} Ah: {}", remaining, e),
        }
        self.schedule(Action::Save);
    }

    fn schedule(&self, action: Action) {
        let delay = match action {
            Action::CheckButton => self.config.button_check_period_ms,
            Action::Tick => self.config.tick_interval_ms,
            Action::Save => self.config.save_interval_ms,
        };
        self.edt
            .schedule_with_priority(delay, action.priority(), action);
    }
}
