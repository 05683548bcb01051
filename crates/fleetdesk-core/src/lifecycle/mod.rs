// ── Device lending lifecycle ──
//
// The per-device state machine, batch tickets, and the orchestrator that
// runs an operation over many devices against the directory.

mod batch;
mod orchestrator;
mod state;
mod ticket;

pub use batch::{BatchLedger, BatchOperation, BatchOutcome, InvalidIdentifier};
pub use orchestrator::{LifecycleOrchestrator, TicketSender};
pub use state::DeviceLifecycle;
pub use ticket::{LifecycleTicket, OperationKind, TicketStatus};
