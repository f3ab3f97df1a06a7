pub mod pin {
    /// A pin (of a button) which may be down (tied to the ground) or up (floating pin)
    pub trait Pin {
        fn is_down(&self) -> bool;
    }
}

pub mod adc {
    /// One analog input. Every read is a single conversion in `0..=adc_max_count`.
    pub trait AdcChannel {
        fn read_raw(&self) -> u16;
    }
}

pub mod delay {
    /// Blocking wait, used between calibration samples
    pub trait Delay {
        fn delay_ms(&self, ms: u32);
    }
}

pub mod thermometer {
    /// Reading reported by 1-wire probes which do not answer
    pub const DISCONNECTED_C: f32 = -127.0;

    /// Battery temperature probe. May return NaN or [DISCONNECTED_C].
    pub trait Thermometer {
        fn read_celsius(&self) -> f32;
    }
}

pub mod storage {
    use core::fmt;

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub enum StorageError {
        /// Nothing was ever written at the requested location
        Unwritten,
        /// Requested range does not fit into the medium
        OutOfBounds,
        /// The medium failed to complete the operation
        Io,
    }

    impl fmt::Display for StorageError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                StorageError::Unwritten => write!(f, "record was never written"),
                StorageError::OutOfBounds => write!(f, "record does not fit into storage"),
                StorageError::Io => write!(f, "storage i/o failed"),
            }
        }
    }

    /// Non-volatile memory (EEPROM, flash page, file) which survives a power cycle
    pub trait Storage {
        fn read(&self, offset: u32, buf: &mut [u8]) -> Result<(), StorageError>;
        fn write(&self, offset: u32, data: &[u8]) -> Result<(), StorageError>;
    }
}

pub mod report {
    use crate::report::Report;

    /// Screen or log which shows the estimate once per tick
    pub trait ReportSink {
        /// false when the device behind the sink did not initialize
        fn is_available(&self) -> bool {
            true
        }
        fn report(&self, report: &Report);
    }
}
