//! Rolling-hash record store: a single-file, memory-mapped, append-in-a-ring
//! key/value table. A fixed-size hash index over a bounded region, an
//! implicit FIFO log of records carved out of that region, and an online
//! compaction protocol (`rotate_head`/`reclaim_head`) that rotates live
//! records from the head of the log to the tail while reclaiming dead ones.
//!
//! The async network server, client protocol, cluster membership, and
//! replication that sit on top of a store like this are out of scope here;
//! this crate is the persistence core they would be built against.

pub mod config;
pub mod error;
pub mod hash;
pub mod heap;
pub mod layout;
pub mod mapped;
pub mod record;
pub mod ring;

pub use config::RingConfig;
pub use error::{Error, Result};
pub use mapped::MappedRegion;
pub use ring::{Hint, HashRing, PreparedRecord, RecordHandle};
