mod concurrency;
mod helpers;
mod logging;

pub use concurrency::*;
pub use helpers::*;
pub use logging::*;
