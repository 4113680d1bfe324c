//! Dispatch orchestration — the per-request state machine, the shared
//! dispatch queue and worker pool, the delivery tracker that reconciles
//! asynchronous outcomes, and the campaign submission surface.

pub mod campaign;
pub mod dispatcher;
pub mod ledger;
pub mod orchestrator;
pub mod tracker;
pub mod worker;

pub use campaign::{CampaignRegistry, CampaignService, CampaignStatusReport};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use ledger::DeliveryLedger;
pub use orchestrator::Orchestrator;
pub use tracker::DeliveryTracker;
pub use worker::{spawn_workers, DispatchQueue};
