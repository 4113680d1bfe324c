//! External collaborator seams — customer profile store, message content
//! generator, and per-channel delivery gateways — plus the simulated
//! providers used for tests and local runs.

pub mod content;
pub mod gateway;
pub mod profile_store;
pub mod simulated;

pub use content::{ContentGenerator, MessagePayload, StaticContentGenerator};
pub use gateway::{DeliveryGateway, SendAck, SendFailure};
pub use profile_store::{FailingProfileStore, MemoryProfileStore, ProfileStore};
pub use simulated::{SendBehavior, SimulatedGateway};
