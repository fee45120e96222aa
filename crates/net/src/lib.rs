#![warn(missing_docs)]
//! Entity frame synchronization between a server and its clients.
//!
//! The server side keeps one [`EntityFrameDatabase`] per connection. Each
//! frame it observes the simulation's entity list, writes the most relevant
//! changes that fit into a packet, and remembers what went out. When the
//! client acknowledges a frame the database folds it into the reference
//! state and re-arms anything an older, unacknowledged frame carried.
//!
//! The client side applies frames with [`ClientEntities`] and echoes
//! [`ClientEntities::latest_frame`] back as the acknowledgement.

mod ack;
pub mod bits;
mod client;
pub mod codec;
mod config;
mod database;
pub mod delta;
mod error;
pub mod msg;
pub mod priority;
mod writer;

pub use ack::AckOutcome;
pub use bits::DeltaBits;
pub use client::{ClientEntities, ClientFrame};
pub use config::{Precision, SyncConfig, WIRE_MAX_ENTITIES};
pub use database::{Commit, CommitEntry, EntityFrameDatabase, PacketLog};
pub use delta::delta_bits;
pub use error::{ProtocolError, SyncError};
pub use msg::{MsgReader, MsgWriter};
pub use priority::{ChainResolution, PRIORITY_LEVELS};
pub use writer::FrameOutcome;
