pub use verdict_deps::anyhow::{Context, Error, Result};

#[macro_export]
macro_rules! err {
	($($t:tt)*) => {
		$crate::error::Error::msg(format!($($t)*))
	};
}
