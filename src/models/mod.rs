mod agent;
mod audit_log;
mod concert;
mod order;
mod payment_event;
mod reservation;
mod ticket;

pub use agent::*;
pub use audit_log::*;
pub use concert::*;
pub use order::*;
pub use payment_event::*;
pub use reservation::*;
pub use ticket::*;
