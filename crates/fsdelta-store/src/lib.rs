//! Snapshot persistence for fsdelta.
//!
//! Snapshots are stored as a small framed file: a magic number, a format
//! version, a compressed header frame and a compressed record map. The
//! header can be read on its own for quick inspection.
//!
//! ```rust,no_run
//! use fsdelta_store::{load_snapshot, load_snapshot_header};
//!
//! let header = load_snapshot_header("baseline.snap").unwrap();
//! println!("{} files on {}", header.stats.file_count, header.system.hostname);
//!
//! let snapshot = load_snapshot("baseline.snap").unwrap();
//! assert_eq!(snapshot.root_digest, header.root_digest);
//! ```

mod error;
mod store;

pub use error::StoreError;
pub use store::{FORMAT_VERSION, MAGIC, load_snapshot, load_snapshot_header, save_snapshot};
