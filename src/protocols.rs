//! Device client implementations.
//!
//! Real controller protocols are supplied by the embedding application
//! through [`DeviceConnector`](crate::core::traits::DeviceConnector). This
//! module carries the built-in simulated controller.

pub mod virtual_device;

pub use virtual_device::{
    FailureMode, VirtualConnector, VirtualDevice, VirtualDeviceConfig, VirtualDeviceHandle,
    VIRTUAL_CONTROLLER,
};
