#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use soc_control::bsp::adc::AdcChannel;
    use soc_control::bsp::delay::Delay;
    use soc_control::bsp::pin::Pin;
    use soc_control::bsp::report::ReportSink;
    use soc_control::bsp::storage::{Storage, StorageError};
    use soc_control::bsp::thermometer::{Thermometer, DISCONNECTED_C};
    use soc_control::config::{EstimatorConfig, BUTTON_CHECK_PERIOD_MS};
    use soc_control::control::{Action, ControlError, SocControl};
    use soc_control::edt::EDT;
    use soc_control::estimator::{current_from_sensor, DeadZone};
    use soc_control::persistence::CapacityStore;
    use soc_control::report::Report;
    use soc_control::sampler::{AdcScale, Sampler};

    const ZERO_COUNTS: u16 = 2048;
    const BATTERY_COUNTS: u16 = 3000;

    #[test]
    fn empty_storage_starts_full() {
        with_bench(config(), None, &|bench| {
            assert_eq!(bench.remaining(), bench.config.full_capacity_ah);
        });
    }

    #[test]
    fn stored_capacity_is_restored() {
        with_bench(config(), Some(6.5f32.to_le_bytes()), &|bench| {
            assert_eq!(bench.remaining(), 6.5);
        });
    }

    #[test]
    fn invalid_stored_capacity_starts_full() {
        let full = config().full_capacity_ah;
        for stored in [f32::NAN, -1.0, full + 0.5].iter() {
            with_bench(config(), Some(stored.to_le_bytes()), &|bench| {
                assert_eq!(bench.remaining(), full, "stored {}", stored);
            });
        }
        // erased flash
        with_bench(config(), Some([0xff; 4]), &|bench| {
            assert_eq!(bench.remaining(), full);
        });
    }

    #[test]
    fn startup_calibrates_the_current_sensor() {
        with_bench(config(), None, &|bench| {
            assert_eq!(bench.zero_offset(), scale().volts(ZERO_COUNTS as f32));
            assert_eq!(
                bench.delayed_ms.get(),
                (config().calibration_sample_count as u32 - 1)
                    * config().calibration_sample_delay_ms
            );
        });
    }

    #[test]
    fn no_current_keeps_the_charge() {
        with_bench(config(), Some(6.5f32.to_le_bytes()), &|bench| {
            (bench.advance_time)(10_000);
            assert_eq!(bench.remaining(), 6.5);
            let report = bench.sink.last.get().unwrap();
            assert_eq!(report.current, 0.0);
            assert_eq!(report.soc_percent, 6.5 / config().full_capacity_ah * 100.0);
        });
    }

    #[test]
    fn one_report_per_tick() {
        with_bench(config(), None, &|bench| {
            (bench.advance_time)(999);
            assert_eq!(bench.sink.reports.get(), 0);
            (bench.advance_time)(1);
            assert_eq!(bench.sink.reports.get(), 1);
            (bench.advance_time)(59_000);
            assert_eq!(bench.sink.reports.get(), 60);
        });
    }

    #[test]
    fn constant_discharge_over_an_hour() {
        let config = EstimatorConfig {
            dead_zone: DeadZone::Disabled,
            ..config()
        };
        with_bench(config, None, &|bench| {
            bench.current_counts.set(ZERO_COUNTS - 82);
            let current = expected_current(ZERO_COUNTS - 82);
            assert!((current - 1.0).abs() < 0.01);

            (bench.advance_time)(3_600_000);

            assert_eq!(bench.sink.reports.get(), 3600);
            let expected = config.full_capacity_ah - current;
            assert!(
                (bench.remaining() - expected).abs() < 0.01,
                "remaining {} expected {}",
                bench.remaining(),
                expected
            );
            assert!((bench.sink.last.get().unwrap().current - current).abs() < 1e-6);
        });
    }

    #[test]
    fn small_currents_are_ignored_by_the_dead_zone() {
        with_bench(config(), None, &|bench| {
            // about 12 mA, below the 50 mA threshold
            bench.current_counts.set(ZERO_COUNTS - 1);
            (bench.advance_time)(60_000);
            assert_eq!(bench.remaining(), config().full_capacity_ah);
        });
    }

    #[test]
    fn small_currents_are_counted_without_the_dead_zone() {
        let config = EstimatorConfig {
            dead_zone: DeadZone::Disabled,
            ..config()
        };
        with_bench(config, None, &|bench| {
            bench.current_counts.set(ZERO_COUNTS - 1);
            (bench.advance_time)(60_000);
            assert!(bench.remaining() < config.full_capacity_ah);
        });
    }

    #[test]
    fn charge_never_leaves_its_bounds() {
        with_bench(config(), Some(0.01f32.to_le_bytes()), &|bench| {
            // strong discharge
            bench.current_counts.set(0);
            for _ in 0..120 {
                (bench.advance_time)(1000);
                let report = bench.sink.last.get().unwrap();
                assert!(bench.remaining() >= 0.0);
                assert!(report.soc_percent >= 0.0 && report.soc_percent <= 100.0);
            }
            assert_eq!(bench.remaining(), 0.0);

            // strong charge
            bench.current_counts.set(4095);
            for _ in 0..7200 {
                (bench.advance_time)(1000);
                assert!(bench.remaining() <= config().full_capacity_ah);
            }
            assert_eq!(bench.remaining(), config().full_capacity_ah);
            assert_eq!(bench.sink.last.get().unwrap().soc_percent, 100.0);
        });
    }

    #[test]
    fn capacity_is_saved_every_minute() {
        with_bench(config(), None, &|bench| {
            bench.current_counts.set(ZERO_COUNTS - 200);
            (bench.advance_time)(59_999);
            assert_eq!(bench.eeprom.record.get(), None);

            (bench.advance_time)(1);
            // the tick due at the same instant is already in the saved value
            assert_eq!(bench.sink.reports.get(), 60);
            assert_eq!(bench.stored(), Some(bench.remaining()));

            (bench.advance_time)(60_000);
            assert_eq!(bench.eeprom.writes.get(), 2);
        });
    }

    #[test]
    fn failing_storage_does_not_stop_the_meter() {
        with_bench(config(), None, &|bench| {
            bench.eeprom.broken.set(true);
            bench.current_counts.set(ZERO_COUNTS - 200);
            (bench.advance_time)(120_000);
            assert_eq!(bench.sink.reports.get(), 120);
            assert_eq!(bench.eeprom.writes.get(), 0);
            assert!(bench.remaining() < config().full_capacity_ah);
        });
    }

    #[test]
    fn button_press_recalibrates() {
        with_bench(config(), None, &|bench| {
            (bench.advance_time)(BUTTON_CHECK_PERIOD_MS);
            bench.current_counts.set(2100);
            bench.press();
            (bench.advance_time)(200);
            assert_eq!(bench.zero_offset(), scale().volts(2100.0));
        });
    }

    #[test]
    fn held_button_recalibrates_once() {
        with_bench(config(), None, &|bench| {
            (bench.advance_time)(BUTTON_CHECK_PERIOD_MS);
            bench.current_counts.set(2100);
            bench.press();
            (bench.advance_time)(200);
            let delayed = bench.delayed_ms.get();

            bench.current_counts.set(2200);
            (bench.advance_time)(5000);
            assert_eq!(bench.zero_offset(), scale().volts(2100.0));
            assert_eq!(bench.delayed_ms.get(), delayed);

            bench.release();
            (bench.advance_time)(200);
            bench.press();
            (bench.advance_time)(200);
            assert_eq!(bench.zero_offset(), scale().volts(2200.0));
        });
    }

    #[test]
    fn short_glitch_does_not_recalibrate() {
        with_bench(config(), None, &|bench| {
            (bench.advance_time)(2 * BUTTON_CHECK_PERIOD_MS);
            bench.current_counts.set(2100);
            bench.press();
            // one check only, shorter than the debounce time
            (bench.advance_time)(BUTTON_CHECK_PERIOD_MS);
            bench.release();
            (bench.advance_time)(500);
            assert_eq!(bench.zero_offset(), scale().volts(ZERO_COUNTS as f32));
        });
    }

    #[test]
    fn button_held_during_boot_is_ignored() {
        with_bench_pressed(config(), None, true, &|bench| {
            bench.current_counts.set(2100);
            (bench.advance_time)(1000);
            assert_eq!(bench.zero_offset(), scale().volts(ZERO_COUNTS as f32));
        });
    }

    #[test]
    fn recalibration_keeps_the_charge() {
        with_bench(config(), Some(6.5f32.to_le_bytes()), &|bench| {
            (bench.advance_time)(BUTTON_CHECK_PERIOD_MS);
            bench.current_counts.set(2100);
            bench.press();
            (bench.advance_time)(200);
            assert_eq!(bench.remaining(), 6.5);
        });
    }

    #[test]
    fn disconnected_probe_reports_no_temperature() {
        with_bench(config(), None, &|bench| {
            bench.temperature.set(DISCONNECTED_C);
            (bench.advance_time)(1000);
            assert_eq!(bench.sink.last.get().unwrap().temperature_c, None);

            bench.temperature.set(f32::NAN);
            (bench.advance_time)(1000);
            let report = bench.sink.last.get().unwrap();
            assert_eq!(report.temperature_c, None);
            assert!(!report.stale);
            assert!(report.soc_percent.is_finite());

            bench.temperature.set(21.5);
            (bench.advance_time)(1000);
            assert_eq!(bench.sink.last.get().unwrap().temperature_c, Some(21.5));
        });
    }

    #[test]
    fn battery_voltage_is_reported() {
        with_bench(config(), None, &|bench| {
            (bench.advance_time)(1000);
            let expected = scale().volts(BATTERY_COUNTS as f32) * config().divider_correction_factor;
            assert_eq!(bench.sink.last.get().unwrap().voltage, expected);
        });
    }

    #[test]
    fn missing_report_sink_is_fatal_when_required() {
        let edt = EDT::create();
        let parts = Parts::new(None);
        let control = parts.control(config(), None, &edt).unwrap();
        assert_eq!(control.start(), Err(ControlError::ReportSinkUnavailable));
        assert_eq!(edt.queue_len(), 0);

        let sink = TestSink::new();
        sink.available.set(false);
        let control = parts.control(config(), Some(&sink), &edt).unwrap();
        assert_eq!(control.start(), Err(ControlError::ReportSinkUnavailable));
    }

    #[test]
    fn headless_meter_keeps_counting() {
        let config = EstimatorConfig {
            require_report_sink: false,
            ..config()
        };
        let edt = EDT::create();
        let parts = Parts::new(None);
        let control = parts.control(config, None, &edt).unwrap();
        assert_eq!(control.start(), Ok(()));
        parts.current.counts.set(ZERO_COUNTS - 200);
        edt.advance_time_by(10_000, &|msg| control.process_message(msg));
        assert!(control.state().charge.remaining_capacity_ah < config.full_capacity_ah);
        assert!(control.last_report().is_some());
    }

    #[test]
    fn meter_keeps_its_cadence_after_49_days() {
        let edt = EDT::create();
        // nothing is queued yet, so this only moves the clock
        edt.advance_time_by(u32::MAX - 120_000, &|_| {});
        let parts = Parts::new(None);
        let sink = TestSink::new();
        let control = parts.control(config(), Some(&sink), &edt).unwrap();
        control.start().unwrap();
        parts.current.counts.set(ZERO_COUNTS - 200);

        edt.advance_time_by(240_000, &|msg| control.process_message(msg));

        assert!(edt.now() > u32::MAX as u64);
        assert_eq!(sink.reports.get(), 240);
        assert_eq!(parts.eeprom.writes.get(), 4);
        let expected = config().full_capacity_ah
            - expected_current(ZERO_COUNTS - 200) * 240.0 / 3600.0;
        assert!((control.state().charge.remaining_capacity_ah - expected).abs() < 0.001);
    }

    #[test]
    fn button_is_served_before_a_tick_due_at_the_same_instant() {
        let config = EstimatorConfig {
            button_check_period_ms: 500,
            button_debounce_ms: 500,
            ..config()
        };
        with_bench(config, None, &|bench| {
            // released at the first check, so the next one may recalibrate
            (bench.advance_time)(500);
            bench.current_counts.set(2100);
            bench.press();
            (bench.advance_time)(500);
            // the tick at 1000 ms already measures against the new offset
            assert_eq!(bench.zero_offset(), scale().volts(2100.0));
            assert_eq!(bench.sink.last.get().unwrap().current, 0.0);
        });
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EstimatorConfig {
            tick_interval_ms: 0,
            ..config()
        };
        let edt = EDT::create();
        let parts = Parts::new(None);
        assert!(matches!(
            parts.control(config, None, &edt),
            Err(ControlError::Config(_))
        ));
    }

    fn config() -> EstimatorConfig {
        EstimatorConfig {
            calibration_sample_count: 10,
            calibration_sample_delay_ms: 1,
            current_sample_count: 4,
            ..EstimatorConfig::default()
        }
    }

    fn scale() -> AdcScale {
        AdcScale {
            reference_voltage: config().reference_voltage,
            max_count: config().adc_max_count,
        }
    }

    fn expected_current(counts: u16) -> f32 {
        current_from_sensor(
            scale().volts(ZERO_COUNTS as f32),
            scale().volts(counts as f32),
            config().sensor_sensitivity,
        )
    }

    struct Bench<'a> {
        config: EstimatorConfig,
        control: &'a SocControl<'a, TestPin<'a>>,
        advance_time: &'a dyn Fn(u32),
        current_counts: &'a Cell<u16>,
        button: &'a Cell<bool>,
        temperature: &'a Cell<f32>,
        delayed_ms: &'a Cell<u32>,
        eeprom: &'a TestEeprom,
        sink: &'a TestSink,
    }

    impl Bench<'_> {
        fn remaining(&self) -> f32 {
            self.control.state().charge.remaining_capacity_ah
        }

        fn zero_offset(&self) -> f32 {
            self.control.state().calibration.zero_offset_voltage
        }

        fn stored(&self) -> Option<f32> {
            self.eeprom.record.get().map(f32::from_le_bytes)
        }

        fn press(&self) {
            self.button.set(true);
        }

        fn release(&self) {
            self.button.set(false);
        }
    }

    /// Peripherals of the meter, without the control itself
    struct Parts {
        voltage: TestAdc,
        current: TestAdc,
        button: Cell<bool>,
        thermometer: TestThermometer,
        delay: TestDelay,
        eeprom: TestEeprom,
    }

    impl Parts {
        fn new(stored: Option<[u8; 4]>) -> Self {
            Parts {
                voltage: TestAdc {
                    counts: Cell::new(BATTERY_COUNTS),
                },
                current: TestAdc {
                    counts: Cell::new(ZERO_COUNTS),
                },
                button: Cell::new(false),
                thermometer: TestThermometer {
                    celsius: Cell::new(25.0),
                },
                delay: TestDelay {
                    total_ms: Cell::new(0),
                },
                eeprom: TestEeprom {
                    record: Cell::new(stored),
                    writes: Cell::new(0),
                    broken: Cell::new(false),
                },
            }
        }

        fn control<'a>(
            &'a self,
            config: EstimatorConfig,
            sink: Option<&'a dyn ReportSink>,
            edt: &'a EDT<Action>,
        ) -> Result<SocControl<'a, TestPin<'a>>, ControlError> {
            SocControl::new(
                config,
                TestPin {
                    is_down: &self.button,
                },
                Sampler::new(&self.voltage, &self.current, &config),
                &self.thermometer,
                &self.delay,
                CapacityStore::new(&self.eeprom, config.storage_offset),
                sink,
                edt,
            )
        }
    }

    fn with_bench(config: EstimatorConfig, stored: Option<[u8; 4]>, block: &dyn Fn(&Bench)) {
        with_bench_pressed(config, stored, false, block)
    }

    fn with_bench_pressed(
        config: EstimatorConfig,
        stored: Option<[u8; 4]>,
        pressed: bool,
        block: &dyn Fn(&Bench),
    ) {
        let parts = Parts::new(stored);
        parts.button.set(pressed);
        let sink = TestSink::new();
        let edt = EDT::create();
        let control = parts.control(config, Some(&sink), &edt).unwrap();
        control.start().unwrap();

        let advance_time = |time: u32| {
            edt.advance_time_by(time, &|msg| {
                control.process_message(msg);
            });
        };

        block(&Bench {
            config,
            control: &control,
            advance_time: &advance_time,
            current_counts: &parts.current.counts,
            button: &parts.button,
            temperature: &parts.thermometer.celsius,
            delayed_ms: &parts.delay.total_ms,
            eeprom: &parts.eeprom,
            sink: &sink,
        });
    }

    struct TestPin<'a> {
        is_down: &'a Cell<bool>,
    }

    impl<'a> Pin for TestPin<'a> {
        /// returns true is pin is tied to the ground
        fn is_down(&self) -> bool {
            self.is_down.get()
        }
    }

    struct TestAdc {
        counts: Cell<u16>,
    }

    impl AdcChannel for TestAdc {
        fn read_raw(&self) -> u16 {
            self.counts.get()
        }
    }

    struct TestThermometer {
        celsius: Cell<f32>,
    }

    impl Thermometer for TestThermometer {
        fn read_celsius(&self) -> f32 {
            self.celsius.get()
        }
    }

    /// Counts the time spent waiting instead of waiting
    struct TestDelay {
        total_ms: Cell<u32>,
    }

    impl Delay for TestDelay {
        fn delay_ms(&self, ms: u32) {
            self.total_ms.set(self.total_ms.get() + ms);
        }
    }

    /// EEPROM which only holds the capacity record
    struct TestEeprom {
        record: Cell<Option<[u8; 4]>>,
        writes: Cell<u32>,
        broken: Cell<bool>,
    }

    impl Storage for TestEeprom {
        fn read(&self, _offset: u32, buf: &mut [u8]) -> Result<(), StorageError> {
            match self.record.get() {
                Some(record) => {
                    buf.copy_from_slice(&record);
                    Ok(())
                }
                None => Err(StorageError::Unwritten),
            }
        }

        fn write(&self, _offset: u32, data: &[u8]) -> Result<(), StorageError> {
            if self.broken.get() {
                return Err(StorageError::Io);
            }
            let mut record = [0u8; 4];
            record.copy_from_slice(data);
            self.record.set(Some(record));
            self.writes.set(self.writes.get() + 1);
            Ok(())
        }
    }

    struct TestSink {
        available: Cell<bool>,
        reports: Cell<u32>,
        last: Cell<Option<Report>>,
    }

    impl TestSink {
        fn new() -> Self {
            TestSink {
                available: Cell::new(true),
                reports: Cell::new(0),
                last: Cell::new(None),
            }
        }
    }

    impl ReportSink for TestSink {
        fn is_available(&self) -> bool {
            self.available.get()
        }

        fn report(&self, report: &Report) {
            self.reports.set(self.reports.get() + 1);
            self.last.set(Some(*report));
        }
    }
}
