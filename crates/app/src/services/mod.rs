pub mod candidates;
pub mod inflight;
pub mod ledger;
pub mod router;

pub use candidates::{Candidates, is_eligible, iter_candidates};
pub use inflight::{InflightCoordinator, OwnerGuard, Resolution, Ticket};
pub use ledger::{LedgerService, LedgerSnapshot, ModelStatus};
pub use router::{FailedAttempt, RoutedGeneration, RouterService};
