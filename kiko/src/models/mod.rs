pub mod calibration;
pub mod hyphyp;
pub mod model;
