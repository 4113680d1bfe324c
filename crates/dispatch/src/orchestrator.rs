//! Wiring — assembles the engines, stores, gateways, worker pool, and
//! tracker loop into one running orchestrator and exposes the campaign
//! surface.

use courier_core::config::AppConfig;
use courier_core::event_bus::EventSink;
use courier_core::types::{Channel, OutcomeEvent};
use courier_decisioning::{ChannelRanker, FatigueEngine, GuardrailEngine};
use courier_gateways::{ContentGenerator, DeliveryGateway, ProfileStore};
use courier_ratelimit::{BucketStore, RateLimiter};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::campaign::{CampaignRegistry, CampaignService};
use crate::dispatcher::Dispatcher;
use crate::ledger::DeliveryLedger;
use crate::tracker::DeliveryTracker;
use crate::worker::{spawn_workers, DispatchQueue};

pub struct Orchestrator {
    campaigns: CampaignService,
    queue: Arc<DispatchQueue>,
    ledger: Arc<DeliveryLedger>,
    limiter: Arc<RateLimiter>,
    tracker: Arc<DeliveryTracker>,
    workers: Vec<JoinHandle<()>>,
    tracker_handle: JoinHandle<()>,
}

impl Orchestrator {
    /// Build and start the orchestrator: spawns the dispatch worker pool
    /// and the tracker loop over `outcomes`.
    pub fn start(
        config: AppConfig,
        profiles: Arc<dyn ProfileStore>,
        content: Arc<dyn ContentGenerator>,
        gateways: HashMap<Channel, Arc<dyn DeliveryGateway>>,
        bucket_store: Arc<dyn BucketStore>,
        outcomes: mpsc::UnboundedReceiver<OutcomeEvent>,
        event_sink: Arc<dyn EventSink>,
    ) -> Self {
        let queue = Arc::new(DispatchQueue::new());
        let registry = Arc::new(CampaignRegistry::new());
        let ledger = Arc::new(DeliveryLedger::new(config.tracker.suppression_sample_size));
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit, bucket_store));

        let dispatcher = Arc::new(Dispatcher::new(
            config.dispatch.clone(),
            ChannelRanker::new(config.decision.clone()),
            GuardrailEngine::new(),
            FatigueEngine::new(&config.fatigue, Arc::clone(&profiles)),
            Arc::clone(&limiter),
            Arc::clone(&profiles),
            content,
            gateways,
            Arc::clone(&ledger),
            Arc::clone(&event_sink),
        ));

        let tracker = Arc::new(DeliveryTracker::new(
            Arc::clone(&ledger),
            Arc::clone(&profiles),
            Arc::clone(&queue),
            Arc::clone(&registry),
            config.tracker.clone(),
            Arc::clone(&event_sink),
        ));
        let tracker_handle = Arc::clone(&tracker).spawn(outcomes);

        let workers = spawn_workers(
            config.dispatch.workers,
            Arc::clone(&queue),
            dispatcher,
            Arc::clone(&registry),
        );

        let campaigns = CampaignService::new(
            Arc::clone(&queue),
            Arc::clone(&ledger),
            registry,
            event_sink,
        );

        tracing::info!(workers = config.dispatch.workers, "orchestrator started");

        Self {
            campaigns,
            queue,
            ledger,
            limiter,
            tracker,
            workers,
            tracker_handle,
        }
    }

    pub fn campaigns(&self) -> &CampaignService {
        &self.campaigns
    }

    pub fn ledger(&self) -> &Arc<DeliveryLedger> {
        &self.ledger
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn tracker(&self) -> &Arc<DeliveryTracker> {
        &self.tracker
    }

    /// Wait until the queue is drained and no dispatch is in flight.
    /// Retries scheduled by the tracker re-open pending work, so callers
    /// observing retry flows should call this again after emitting
    /// outcomes.
    pub async fn wait_idle(&self) {
        while self.queue.pending() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Drain outstanding work and stop the workers. The tracker loop stops
    /// once the outcome feed's senders are dropped.
    pub async fn shutdown(self) {
        self.queue.close();
        for worker in self.workers {
            let _ = worker.await;
        }
        self.tracker_handle.abort();
        tracing::info!("orchestrator stopped");
    }
}
