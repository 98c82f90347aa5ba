//! Export, flush and import of guild snapshots.

pub mod channels;
pub mod create;
pub mod flush;
pub mod load;
pub mod permissions;

pub use create::{create_backup, CreateOptions, Section};
pub use flush::{flush_guild, FlushCount, FlushSummary};
pub use load::{load_backup, LoadOptions};
