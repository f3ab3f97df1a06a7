use std::cell::Cell;

use soc_control::bsp::adc::AdcChannel;
use soc_control::bsp::thermometer::{Thermometer, DISCONNECTED_C};
use soc_control::config::EstimatorConfig;

const MS_PER_HOUR: f64 = 3_600_000.0;
/// Three li-ion cells in series
const EMPTY_VOLTAGE: f64 = 9.0;
const FULL_VOLTAGE: f64 = 12.6;
const INTERNAL_RESISTANCE: f64 = 0.05;
const AMBIENT_C: f64 = 22.0;
/// ADC counts of noise added to every sample, in both directions
const NOISE_COUNTS: i32 = 2;

/// ## Battery, load and sensors which the meter is attached to
///
/// Load is positive when the battery discharges. The current sensor does not output exactly
/// half of the reference at zero load, which is what calibration is for.
///
/// ### Assumptions
/// Open circuit voltage is linear in the state of charge
/// The battery heats up proportionally to the load, Newton's law of cooling brings it back
pub struct SimBattery {
    capacity_ah: f64,
    charge_ah: Cell<f64>,
    load_a: Cell<f64>,
    temperature_c: Cell<f64>,
    probe_connected: Cell<bool>,
    sensor_zero_v: f64,
    sensor_sensitivity: f64,
    noise: Cell<u32>,
}

impl SimBattery {
    pub fn new(capacity_ah: f64, soc_percent: f64, config: &EstimatorConfig) -> Self {
        SimBattery {
            capacity_ah,
            charge_ah: Cell::new(capacity_ah * soc_percent.max(0.0).min(100.0) / 100.0),
            load_a: Cell::new(0.0),
            temperature_c: Cell::new(AMBIENT_C),
            probe_connected: Cell::new(true),
            // a bit off the ideal middle of the range
            sensor_zero_v: config.reference_voltage as f64 / 2.0 - 0.012,
            sensor_sensitivity: config.sensor_sensitivity as f64,
            noise: Cell::new(0x2545_f491),
        }
    }

    /// Lets `ms` milliseconds of the current load pass
    pub fn advance(&self, ms: u32) {
        let load = self.load_a.get();
        let charge = self.charge_ah.get() - load * ms as f64 / MS_PER_HOUR;
        self.charge_ah.set(charge.max(0.0).min(self.capacity_ah));

        let seconds = ms as f64 / 1000.0;
        let heating = 0.02 * load * load;
        let cooling = 0.01 * (self.temperature_c.get() - AMBIENT_C);
        self.temperature_c
            .set(self.temperature_c.get() + (heating - cooling) * seconds);
    }

    pub fn soc_percent(&self) -> f64 {
        self.charge_ah.get() / self.capacity_ah * 100.0
    }

    pub fn load(&self) -> f64 {
        self.load_a.get()
    }

    pub fn change_load(&self, delta_a: f64) {
        self.load_a.set(self.load_a.get() + delta_a);
    }

    pub fn remove_load(&self) {
        self.load_a.set(0.0);
    }

    pub fn toggle_probe(&self) {
        self.probe_connected.set(!self.probe_connected.get());
    }

    pub fn terminal_voltage(&self) -> f64 {
        let open_circuit = EMPTY_VOLTAGE
            + (FULL_VOLTAGE - EMPTY_VOLTAGE) * self.charge_ah.get() / self.capacity_ah;
        open_circuit - self.load_a.get() * INTERNAL_RESISTANCE
    }

    pub fn current_sensor_voltage(&self) -> f64 {
        self.sensor_zero_v - self.load_a.get() * self.sensor_sensitivity
    }

    /// xorshift, just enough to make the samples jitter
    fn noise(&self) -> i32 {
        let mut x = self.noise.get();
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.noise.set(x);
        (x % (2 * NOISE_COUNTS as u32 + 1)) as i32 - NOISE_COUNTS
    }
}

impl Thermometer for SimBattery {
    fn read_celsius(&self) -> f32 {
        if self.probe_connected.get() {
            self.temperature_c.get() as f32
        } else {
            DISCONNECTED_C
        }
    }
}

/// What an ADC pin sees: volts into counts, with noise
fn to_counts(battery: &SimBattery, pin_voltage: f64, config: &EstimatorConfig) -> u16 {
    let max = config.adc_max_count as f64;
    let counts = (pin_voltage / config.reference_voltage as f64 * max).round() as i32;
    (counts + battery.noise()).max(0).min(config.adc_max_count as i32) as u16
}

/// Battery voltage through the resistor divider
pub struct VoltageChannel<'a> {
    pub battery: &'a SimBattery,
    pub config: EstimatorConfig,
}

impl AdcChannel for VoltageChannel<'_> {
    fn read_raw(&self) -> u16 {
        let pin_voltage =
            self.battery.terminal_voltage() / self.config.divider_correction_factor as f64;
        to_counts(self.battery, pin_voltage, &self.config)
    }
}

/// Output of the hall current sensor
pub struct CurrentChannel<'a> {
    pub battery: &'a SimBattery,
    pub config: EstimatorConfig,
}

impl AdcChannel for CurrentChannel<'_> {
    fn read_raw(&self) -> u16 {
        to_counts(self.battery, self.battery.current_sensor_voltage(), &self.config)
    }
}
