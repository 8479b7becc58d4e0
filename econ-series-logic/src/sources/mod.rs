//! Generic upstream providers of raw observations.

mod http;

pub use http::{HttpJsonSource, HttpSourceSettings};
