mod cache;
mod inputs;
mod repositories;

pub use cache::UserPermissionCache;
pub use inputs::AccessRequest;
pub use repositories::{
    EntryLocator, EntryRepository, ManagementEntry, ManagementEntryRepository, SnapshotRepository,
};
