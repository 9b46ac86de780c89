//! Price source implementations

pub mod fixed;
pub mod http;

pub use fixed::FixedPriceSource;
pub use http::HttpPriceSource;
