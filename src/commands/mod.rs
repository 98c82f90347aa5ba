pub mod backup;
pub mod general;

pub use backup::backup;
pub use general::{help, ping};
