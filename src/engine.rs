// Engine wiring
// Builds every component over one store, one event publisher and the collaborators

use std::sync::Arc;

use crate::collaborators::{AddressDirectory, SupplierService};
use crate::config::EngineConfig;
use crate::delivery::DeliveryTracker;
use crate::events::EventPublisher;
use crate::inventory::InventoryLedger;
use crate::orders::{OrderService, OrderStateMachine};
use crate::pricing::PricingResolver;
use crate::store::EngineStore;
use crate::suppliers::SupplierSelector;

pub struct Engine {
    pub config: Arc<EngineConfig>,
    pub ledger: Arc<InventoryLedger>,
    pub state_machine: Arc<OrderStateMachine>,
    pub orders: OrderService,
    pub tracker: DeliveryTracker,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn EngineStore>,
        events: Arc<dyn EventPublisher>,
        addresses: Arc<dyn AddressDirectory>,
        supplier_service: Arc<dyn SupplierService>,
    ) -> Self {
        let config = Arc::new(config);

        let ledger = Arc::new(InventoryLedger::new(
            store.clone(),
            events.clone(),
            supplier_service.clone(),
            config.reservation_ttl,
            config.reaper_batch_size,
        ));
        let pricing = Arc::new(PricingResolver::new(
            supplier_service.clone(),
            config.static_prices.clone(),
        ));
        let selector = Arc::new(SupplierSelector::new(config.selection));
        let state_machine = Arc::new(OrderStateMachine::new(
            store.clone(),
            events.clone(),
            ledger.clone(),
            config.preparation_lead_time,
        ));

        let orders = OrderService::new(
            store.clone(),
            events.clone(),
            addresses,
            supplier_service,
            ledger.clone(),
            pricing,
            selector,
            state_machine.clone(),
            config.clone(),
        );
        let tracker = DeliveryTracker::new(store, events, state_machine.clone(), config.average_speed_kmh);

        Self {
            config,
            ledger,
            state_machine,
            orders,
            tracker,
        }
    }
}
