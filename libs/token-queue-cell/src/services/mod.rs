pub mod advancer;
pub mod counter;
pub mod display;
pub mod events;
pub mod issuance;
pub mod ledger;
pub mod lifecycle;
pub mod redis_counter;
pub mod supabase_ledger;

pub use advancer::*;
pub use counter::*;
pub use display::*;
pub use events::*;
pub use issuance::*;
pub use ledger::*;
pub use lifecycle::{AppointmentLifecycleService, apply_payment, ensure_completable, transition};
pub use redis_counter::*;
pub use supabase_ledger::*;
