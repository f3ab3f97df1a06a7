use log::info;

use crate::bsp::delay::Delay;
use crate::sampler::Sampler;

/// Output of the current sensor when no current flows through it
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Calibration {
    pub zero_offset_voltage: f32,
}

/// Determines the zero offset of the current sensor.
///
/// The caller must make sure there is no load while this runs. More samples give a more
/// stable offset but block for roughly `sample_count * inter_sample_delay_ms`.
pub fn calibrate(
    sampler: &Sampler,
    delay: &dyn Delay,
    sample_count: u16,
    inter_sample_delay_ms: u32,
) -> Calibration {
    let sample_count = sample_count.max(1);
    let mean = sampler.mean_current_counts(sample_count, &|| {
        delay.delay_ms(inter_sample_delay_ms)
    });
    let calibration = Calibration {
        zero_offset_voltage: sampler.scale().volts(mean),
    };
    info!(
        "calibrated over {} samples: zero offset {} V",
        sample_count, calibration.zero_offset_voltage
    );
    calibration
}
