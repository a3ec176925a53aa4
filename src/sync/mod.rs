//! Directory tree to bucket mirroring

pub mod batch;
pub mod decision;
pub mod engine;
pub mod index;
pub mod report;
pub mod walker;

pub use batch::PendingUpload;
pub use decision::{classify_file, SyncDecision};
pub use engine::{Phase, TreeSync};
pub use index::RemoteObjectIndex;
pub use report::{EventKind, EventLog, SharedBuffer, SyncReport};
pub use walker::{TreeWalker, WalkEntry};
