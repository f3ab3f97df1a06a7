// make `std` available when testing
#![cfg_attr(not(test), no_std)]
pub mod bsp;
pub mod calibration;
pub mod config;
pub mod control;
pub mod edt;
pub mod estimator;
pub mod persistence;
pub mod report;
pub mod sampler;
