//! Hardware abstraction for scope-daq.
//!
//! - [`capabilities`]: `Stage` and `Camera` driver traits
//! - [`facade`]: the `DeviceFacade` the experiment engine depends on, and
//!   `Instrument`, which implements it over a stage and a camera
//! - [`watchdog`]: timeout protection for device operations
//! - [`mock`]: simulated stage and camera

pub mod capabilities;
pub mod facade;
pub mod mock;
pub mod watchdog;

pub use capabilities::{Camera, Stage};
pub use facade::{CaptureRequest, DeviceFacade, Instrument};
pub use mock::{MockCamera, MockStage};
pub use watchdog::execute_with_timeout;
