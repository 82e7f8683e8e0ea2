pub mod proxy;
pub mod response;
pub mod settings;
pub mod stats;

pub use proxy::*;
pub use response::*;
pub use settings::*;
pub use stats::*;
