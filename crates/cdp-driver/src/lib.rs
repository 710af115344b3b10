//! Browser control protocol adapter.
//!
//! This crate is the only place that speaks CDP. Everything above it works
//! against the [`Driver`] trait: [`CdpDriver`] drives a real Chromium over
//! a raw command transport, [`FakeDriver`] is the scripted in-memory double
//! the engine's tests run on.

pub mod config;
pub mod driver;
pub mod error;
pub mod fake;
mod js;
pub mod transport;
pub mod types;

pub use config::{detect_chrome_executable, CdpConfig};
pub use driver::{CdpDriver, Driver};
pub use error::{DriverError, DriverErrorKind, DriverResult};
pub use fake::{FakeDriver, FakeEffect, FakeElement};
pub use transport::{CdpTransport, CommandTarget};
pub use types::{ElementHandle, FrameRef, SelectChoice, SelectOption, Strategy, WindowHandle};
