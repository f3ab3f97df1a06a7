use crate::bsp::thermometer::DISCONNECTED_C;
use crate::calibration::Calibration;
use crate::config::EstimatorConfig;
use crate::report::Report;

const MS_PER_HOUR: f32 = 3_600_000.0;

/// Small-current filter. Near zero load the sensor offset drifts, so tiny currents are
/// treated as none at the cost of not counting real tiny loads.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DeadZone {
    Disabled,
    /// currents strictly below this magnitude, A, become zero
    Below(f32),
}

impl DeadZone {
    pub fn filter(&self, current: f32) -> f32 {
        match *self {
            DeadZone::Disabled => current,
            DeadZone::Below(threshold) => {
                if current > -threshold && current < threshold {
                    0.0
                } else {
                    current
                }
            }
        }
    }
}

/// Remaining charge, always within `0..=full_capacity_ah`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChargeState {
    pub remaining_capacity_ah: f32,
    pub full_capacity_ah: f32,
}

impl ChargeState {
    pub fn full(full_capacity_ah: f32) -> Self {
        ChargeState {
            remaining_capacity_ah: full_capacity_ah,
            full_capacity_ah,
        }
    }

    /// Continues from a persisted value. Anything missing or outside of the valid
    /// range means the battery is assumed to be full.
    pub fn restore(full_capacity_ah: f32, persisted: Option<f32>) -> Self {
        match persisted {
            Some(remaining) if remaining >= 0.0 && remaining <= full_capacity_ah => ChargeState {
                remaining_capacity_ah: remaining,
                full_capacity_ah,
            },
            _ => ChargeState::full(full_capacity_ah),
        }
    }

    /// Takes `current` (positive is discharging) flowing for `dt_ms` out of the battery
    pub fn integrate(&mut self, current: f32, dt_ms: u32) {
        let charge_delta_ah = current * (dt_ms as f32 / MS_PER_HOUR);
        let remaining = self.remaining_capacity_ah - charge_delta_ah;
        self.remaining_capacity_ah = remaining.min(self.full_capacity_ah).max(0.0);
    }

    pub fn soc_percent(&self) -> f32 {
        self.remaining_capacity_ah / self.full_capacity_ah * 100.0
    }
}

/// Sign convention follows the sensor wiring: output below the offset means discharge
pub fn current_from_sensor(
    zero_offset_voltage: f32,
    current_sensor_voltage: f32,
    sensor_sensitivity: f32,
) -> f32 {
    (zero_offset_voltage - current_sensor_voltage) / sensor_sensitivity
}

/// Produced fresh every tick
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorReading {
    pub battery_voltage: f32,
    pub current_sensor_voltage: f32,
    pub temperature_c: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct LastGood {
    voltage: f32,
    current: f32,
}

/// All the mutable state of the meter, written only by the control loop
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EstimatorState {
    pub charge: ChargeState,
    pub calibration: Calibration,
    last_good: Option<LastGood>,
}

impl EstimatorState {
    pub fn new(charge: ChargeState, calibration: Calibration) -> Self {
        EstimatorState {
            charge,
            calibration,
            last_good: None,
        }
    }

    /// Swaps the zero offset as a whole, never during a tick
    pub fn recalibrated(self, calibration: Calibration) -> Self {
        EstimatorState {
            calibration,
            ..self
        }
    }
}

/// One coulomb counting step.
///
/// Readings with a non finite voltage are not integrated: the report repeats the last
/// good values and is marked stale, so NaN never reaches the stored capacity.
pub fn tick(
    state: &mut EstimatorState,
    config: &EstimatorConfig,
    reading: &SensorReading,
    dt_ms: u32,
) -> Report {
    let temperature_c = valid_temperature(reading.temperature_c);

    if !reading.battery_voltage.is_finite() || !reading.current_sensor_voltage.is_finite() {
        let last = state.last_good.unwrap_or(LastGood {
            voltage: 0.0,
            current: 0.0,
        });
        return Report {
            voltage: last.voltage,
            current: last.current,
            soc_percent: state.charge.soc_percent(),
            temperature_c,
            stale: true,
        };
    }

    let current = current_from_sensor(
        state.calibration.zero_offset_voltage,
        reading.current_sensor_voltage,
        config.sensor_sensitivity,
    );
    let current = config.dead_zone.filter(current);
    state.charge.integrate(current, dt_ms);
    state.last_good = Some(LastGood {
        voltage: reading.battery_voltage,
        current,
    });

    Report {
        voltage: reading.battery_voltage,
        current,
        soc_percent: state.charge.soc_percent(),
        temperature_c,
        stale: false,
    }
}

fn valid_temperature(temperature_c: f32) -> Option<f32> {
    if temperature_c.is_finite() && temperature_c > DISCONNECTED_C {
        Some(temperature_c)
    } else {
        None
    }
}
