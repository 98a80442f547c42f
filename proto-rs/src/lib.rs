pub mod error;
pub mod event;
pub mod reader;
pub mod request;
pub mod snapshot;
pub mod writer;

pub use error::ProtoError;
pub use event::*;
pub use reader::SnapshotReader;
pub use request::*;
pub use snapshot::*;
pub use writer::{ArchiveHeader, MAX_ENTRY_SIZE, SnapshotWriter, decode_snapshot, encode_snapshot};
