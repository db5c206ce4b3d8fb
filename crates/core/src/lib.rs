//! RelayCheck Core Types
//!
//! Value types exchanged with relay nodes: channel views, ticket
//! statistics, inbox messages and account information. Shared by the
//! node API bindings and the verification harness.

mod balance;
mod error;
mod messages;
mod tickets;
mod types;

pub use balance::*;
pub use error::*;
pub use messages::*;
pub use tickets::*;
pub use types::*;
