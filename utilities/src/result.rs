use std::error::Error;

/// Shared result alias so ad-hoc errors can be built with `format!(..).into()`
/// and still cross task boundaries.
pub type Result<T> = std::result::Result<T, Box<dyn Error + Send + Sync>>;
