use crate::bsp::adc::AdcChannel;
use crate::config::EstimatorConfig;

/// Linear conversion of raw ADC counts into volts at the pin
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdcScale {
    pub reference_voltage: f32,
    pub max_count: u16,
}

impl AdcScale {
    /// `raw` may be a mean of several samples, hence not an integer
    pub fn volts(&self, raw: f32) -> f32 {
        raw / self.max_count as f32 * self.reference_voltage
    }
}

/// Reads the battery voltage and the current sensor output
pub struct Sampler<'a> {
    voltage: &'a dyn AdcChannel,
    current: &'a dyn AdcChannel,
    scale: AdcScale,
    divider_correction_factor: f32,
}

impl<'a> Sampler<'a> {
    pub fn new(
        voltage: &'a dyn AdcChannel,
        current: &'a dyn AdcChannel,
        config: &EstimatorConfig,
    ) -> Self {
        Sampler {
            voltage,
            current,
            scale: AdcScale {
                reference_voltage: config.reference_voltage,
                max_count: config.adc_max_count,
            },
            divider_correction_factor: config.divider_correction_factor,
        }
    }

    pub fn scale(&self) -> AdcScale {
        self.scale
    }

    /// Battery voltage behind the resistor divider
    pub fn read_voltage(&self) -> f32 {
        let pin_voltage = self.scale.volts(self.voltage.read_raw() as f32);
        pin_voltage * self.divider_correction_factor
    }

    /// Mean of `sample_count` back-to-back samples of the current sensor, in volts
    pub fn read_averaged_current_voltage(&self, sample_count: u16) -> f32 {
        self.scale
            .volts(self.mean_current_counts(sample_count, &|| {}))
    }

    /// Averages raw current samples, calling `between` after each sample but the last
    pub(crate) fn mean_current_counts(&self, sample_count: u16, between: &dyn Fn()) -> f32 {
        let samples = sample_count.max(1) as u32;
        let mut sum: u64 = 0;
        for i in 0..samples {
            sum += self.current.read_raw() as u64;
            if i + 1 < samples {
                between();
            }
        }
        sum as f32 / samples as f32
    }
}
