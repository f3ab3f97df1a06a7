use core::fmt;

use crate::estimator::DeadZone;

/// Capacity of the reference pack, Ah
pub const FULL_CAPACITY_AH: f32 = 12.064;
/// Compensates the resistor divider in front of the voltage pin
pub const DIVIDER_CORRECTION_FACTOR: f32 = 5.0;
/// Hall sensor output change per ampere, V/A
pub const SENSOR_SENSITIVITY: f32 = 0.066;
pub const REFERENCE_VOLTAGE: f32 = 3.3;
/// 12 bit ADC
pub const ADC_MAX_COUNT: u16 = 4095;
pub const TICK_INTERVAL_MS: u32 = 1000;
pub const SAVE_INTERVAL_MS: u32 = 60 * TICK_INTERVAL_MS;
pub const CALIBRATION_SAMPLE_COUNT: u16 = 1000;
pub const CALIBRATION_SAMPLE_DELAY_MS: u32 = 1;
pub const CURRENT_SAMPLE_COUNT: u16 = 100;
/// Currents below this are sensor noise, A
pub const NOISE_THRESHOLD: f32 = 0.05;
pub const BUTTON_CHECK_PERIOD_MS: u32 = 50;
/// Button has to be held this long before recalibration starts
pub const BUTTON_DEBOUNCE_MS: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConfigError {
    FullCapacity,
    AdcRange,
    ReferenceVoltage,
    SensorSensitivity,
    DividerCorrection,
    TickInterval,
    SaveInterval,
    NoiseThreshold,
    ButtonCheckPeriod,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ConfigError::FullCapacity => "full capacity must be a positive number of Ah",
            ConfigError::AdcRange => "adc max count must be above zero",
            ConfigError::ReferenceVoltage => "reference voltage must be positive",
            ConfigError::SensorSensitivity => "sensor sensitivity must be positive",
            ConfigError::DividerCorrection => "divider correction factor must be positive",
            ConfigError::TickInterval => "tick interval must be above zero",
            ConfigError::SaveInterval => "save interval must not be shorter than a tick",
            ConfigError::NoiseThreshold => "noise threshold must not be negative",
            ConfigError::ButtonCheckPeriod => "button check period must be above zero",
        };
        f.write_str(msg)
    }
}

/// Everything which used to be compile-time constants of the meter
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EstimatorConfig {
    pub full_capacity_ah: f32,
    pub divider_correction_factor: f32,
    pub sensor_sensitivity: f32,
    pub reference_voltage: f32,
    pub adc_max_count: u16,
    pub tick_interval_ms: u32,
    pub save_interval_ms: u32,
    pub calibration_sample_count: u16,
    pub calibration_sample_delay_ms: u32,
    /// samples averaged for the current channel on every tick
    pub current_sample_count: u16,
    pub dead_zone: DeadZone,
    pub button_check_period_ms: u32,
    pub button_debounce_ms: u32,
    /// where the capacity record lives in the non-volatile storage
    pub storage_offset: u32,
    /// refuse to start when the report sink is not there
    pub require_report_sink: bool,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig {
            full_capacity_ah: FULL_CAPACITY_AH,
            divider_correction_factor: DIVIDER_CORRECTION_FACTOR,
            sensor_sensitivity: SENSOR_SENSITIVITY,
            reference_voltage: REFERENCE_VOLTAGE,
            adc_max_count: ADC_MAX_COUNT,
            tick_interval_ms: TICK_INTERVAL_MS,
            save_interval_ms: SAVE_INTERVAL_MS,
            calibration_sample_count: CALIBRATION_SAMPLE_COUNT,
            calibration_sample_delay_ms: CALIBRATION_SAMPLE_DELAY_MS,
            current_sample_count: CURRENT_SAMPLE_COUNT,
            dead_zone: DeadZone::Below(NOISE_THRESHOLD),
            button_check_period_ms: BUTTON_CHECK_PERIOD_MS,
            button_debounce_ms: BUTTON_DEBOUNCE_MS,
            storage_offset: 0,
            require_report_sink: true,
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !positive(self.full_capacity_ah) {
            return Err(ConfigError::FullCapacity);
        }
        if self.adc_max_count == 0 {
            return Err(ConfigError::AdcRange);
        }
        if !positive(self.reference_voltage) {
            return Err(ConfigError::ReferenceVoltage);
        }
        if !positive(self.sensor_sensitivity) {
            return Err(ConfigError::SensorSensitivity);
        }
        if !positive(self.divider_correction_factor) {
            return Err(ConfigError::DividerCorrection);
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::TickInterval);
        }
        if self.save_interval_ms < self.tick_interval_ms {
            return Err(ConfigError::SaveInterval);
        }
        if let DeadZone::Below(threshold) = self.dead_zone {
            if !(threshold >= 0.0) || !threshold.is_finite() {
                return Err(ConfigError::NoiseThreshold);
            }
        }
        if self.button_check_period_ms == 0 {
            return Err(ConfigError::ButtonCheckPeriod);
        }
        Ok(())
    }
}

fn positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}
