pub use anyhow;
pub use backtrace;
pub use chrono;
pub use futures;
pub use http;
pub use hyper;
pub use itertools;
pub use maplit;
pub use ndarray;
pub use num_traits;
pub use once_cell;
pub use rand;
pub use rmp_serde;
pub use serde;
pub use serde_json;
pub use thiserror;
pub use tokio;
pub use tracing;
pub use tracing_subscriber;
