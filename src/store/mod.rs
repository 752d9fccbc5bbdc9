pub mod tickets;
pub mod trips;

pub use tickets::{MemoryTicketStore, TicketQuery, TicketStore};
pub use trips::TripLedger;
