use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use crate::services::booking_flow::{BookingFlow, FlowError, SubmitReceipt};
use crate::services::notices::NoticeBus;
use crate::services::sync::WriteError;
use crate::store::BookingCommit;

/// How often the background sweeper looks for idle flows.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Entry {
    flow: BookingFlow,
    touched: Instant,
}

/// Open booking flows keyed by flow id. A flow untouched for `idle_ttl` is
/// dropped by the next sweep unless a submit is in flight.
pub struct FlowRegistry {
    idle_ttl: Duration,
    flows: Mutex<HashMap<String, Entry>>,
}

impl FlowRegistry {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            idle_ttl,
            flows: Mutex::new(HashMap::new()),
        }
    }

    fn flows(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.flows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, flow: BookingFlow) {
        let entry = Entry {
            flow,
            touched: Instant::now(),
        };
        self.flows().insert(entry.flow.id().to_string(), entry);
    }

    /// Runs `step` against one flow and marks it as used.
    pub fn with_flow<T>(
        &self,
        flow_id: &str,
        step: impl FnOnce(&mut BookingFlow) -> Result<T, FlowError>,
    ) -> Result<T, FlowError> {
        let mut flows = self.flows();
        let entry = flows
            .get_mut(flow_id)
            .ok_or_else(|| FlowError::UnknownFlow(flow_id.to_string()))?;
        entry.touched = Instant::now();
        step(&mut entry.flow)
    }

    /// Settles a submit started with `BookingFlow::begin_submit`. A
    /// successful submit removes the flow.
    pub fn finish_submit(
        &self,
        flow_id: &str,
        result: Result<BookingCommit, WriteError>,
        admin_number: &str,
        notices: &NoticeBus,
    ) -> Result<SubmitReceipt, FlowError> {
        let mut flows = self.flows();
        let entry = flows
            .get_mut(flow_id)
            .ok_or_else(|| FlowError::UnknownFlow(flow_id.to_string()))?;
        entry.touched = Instant::now();
        let receipt = entry.flow.finish_submit(result, admin_number, notices)?;
        flows.remove(flow_id);
        Ok(receipt)
    }

    /// Removes a flow that is not mid-submit.
    pub fn close(&self, flow_id: &str) -> Result<(), FlowError> {
        let mut flows = self.flows();
        let entry = flows
            .get(flow_id)
            .ok_or_else(|| FlowError::UnknownFlow(flow_id.to_string()))?;
        if entry.flow.is_busy() {
            return Err(FlowError::Busy);
        }
        flows.remove(flow_id);
        Ok(())
    }

    /// Drops every flow idle for at least `idle_ttl` as of `now`. Returns
    /// how many were dropped.
    pub fn sweep_idle(&self, now: Instant) -> usize {
        let mut flows = self.flows();
        let before = flows.len();
        flows.retain(|_, entry| {
            entry.flow.is_busy() || now.saturating_duration_since(entry.touched) < self.idle_ttl
        });
        let swept = before - flows.len();
        if swept > 0 {
            tracing::info!(swept, open = flows.len(), "idle booking flows dropped");
        }
        swept
    }

    /// Sweeps every `every` until the registry is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let registry = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.sweep_idle(Instant::now());
            }
        })
    }

    pub fn contains(&self, flow_id: &str) -> bool {
        self.flows().contains_key(flow_id)
    }

    pub fn len(&self) -> usize {
        self.flows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::models::sample_lots;
    use crate::services::booking_flow::DetailsUpdate;

    const TTL: Duration = Duration::from_secs(900);

    fn open_flow(seed: u64) -> BookingFlow {
        BookingFlow::open(sample_lots().remove(0), 30, &mut StdRng::seed_from_u64(seed)).unwrap()
    }

    fn flow_at_confirm(seed: u64) -> BookingFlow {
        let mut flow = open_flow(seed);
        let slot = flow
            .slots()
            .iter()
            .find(|s| s.is_available())
            .map(|s| s.id.clone())
            .unwrap();
        flow.select_slot(&slot);
        flow.continue_to_details().unwrap();
        flow.update_details(DetailsUpdate {
            customer_name: Some("Asha".to_string()),
            vehicle_number: Some("KA01AB1234".to_string()),
            whatsapp_number: Some("+91 98450 00000".to_string()),
            duration_hours: Some(2),
        })
        .unwrap();
        flow.review().unwrap();
        flow
    }

    #[test]
    fn test_idle_flows_are_swept() {
        let registry = FlowRegistry::new(TTL);
        let flow = open_flow(1);
        let id = flow.id().to_string();
        registry.insert(flow);

        assert_eq!(registry.sweep_idle(Instant::now()), 0);
        assert!(registry.contains(&id));

        assert_eq!(registry.sweep_idle(Instant::now() + TTL), 1);
        assert!(registry.is_empty());
        assert!(matches!(
            registry.with_flow(&id, |_| Ok(())),
            Err(FlowError::UnknownFlow(_))
        ));
    }

    #[test]
    fn test_busy_flow_survives_sweep() {
        let registry = FlowRegistry::new(TTL);
        let flow = flow_at_confirm(2);
        let id = flow.id().to_string();
        registry.insert(flow);
        registry.with_flow(&id, |f| f.begin_submit(None)).unwrap();

        assert_eq!(registry.sweep_idle(Instant::now() + TTL * 2), 0);
        assert!(registry.contains(&id));
        assert!(matches!(registry.close(&id), Err(FlowError::Busy)));
    }

    #[test]
    fn test_use_keeps_flow_alive() {
        let registry = FlowRegistry::new(Duration::from_millis(50));
        let flow = open_flow(3);
        let id = flow.id().to_string();
        registry.insert(flow);

        std::thread::sleep(Duration::from_millis(60));
        registry.with_flow(&id, |_| Ok(())).unwrap();
        assert_eq!(registry.sweep_idle(Instant::now()), 0);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_sweeper_task_evicts_in_background() {
        let registry = Arc::new(FlowRegistry::new(Duration::from_millis(30)));
        registry.insert(open_flow(4));
        registry.insert(open_flow(5));

        let sweeper = registry.spawn_sweeper(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(registry.is_empty());
        sweeper.abort();
    }
}
