// Order orchestration
//
// `create_order` selects, prices and reserves every line inside one
// transaction. Nothing is visible and nothing is held unless all lines fit.

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{AuthUser, Role};
use crate::collaborators::{Address, AddressDirectory, InventorySync, SupplierService};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::{publish_all, DomainEvent, EventPublisher, OrderCreated};
use crate::geo::{haversine_km, Coordinates};
use crate::inventory::ledger::{reserved_event, InventoryLedger};
use crate::inventory::models::{normalize_size, InventoryRecord};
use crate::orders::models::{
    CreateOrderRequest, Order, OrderDetails, OrderItem, OrderItemRequest, OrderPage, OrderPriority,
    OrderStatus, OrderStatusHistory, OrderType, UpdateStatusRequest,
};
use crate::orders::number::generate_order_number;
use crate::orders::price_calculator::PriceCalculator;
use crate::orders::status_machine::{Actor, OrderStateMachine, TransitionOutcome, TransitionRequest};
use crate::pricing::{CustomerClass, PriceQuote, PriceRequest, PricingResolver};
use crate::query::OrderQuery;
use crate::store::{EngineStore, StoreTx};
use crate::suppliers::models::{SupplierOffer, SupplierStock};
use crate::suppliers::SupplierSelector;

/// A priced line waiting for its reservation
struct PlannedLine {
    request: OrderItemRequest,
    cylinder_size: String,
    offer: SupplierOffer,
    supplier_position: Option<Coordinates>,
    quote: PriceQuote,
}

/// Service for order business logic
pub struct OrderService {
    store: Arc<dyn EngineStore>,
    events: Arc<dyn EventPublisher>,
    addresses: Arc<dyn AddressDirectory>,
    supplier_service: Arc<dyn SupplierService>,
    ledger: Arc<InventoryLedger>,
    pricing: Arc<PricingResolver>,
    selector: Arc<SupplierSelector>,
    state_machine: Arc<OrderStateMachine>,
    config: Arc<EngineConfig>,
}

impl OrderService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn EngineStore>,
        events: Arc<dyn EventPublisher>,
        addresses: Arc<dyn AddressDirectory>,
        supplier_service: Arc<dyn SupplierService>,
        ledger: Arc<InventoryLedger>,
        pricing: Arc<PricingResolver>,
        selector: Arc<SupplierSelector>,
        state_machine: Arc<OrderStateMachine>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            events,
            addresses,
            supplier_service,
            ledger,
            pricing,
            selector,
            state_machine,
            config,
        }
    }

    /// Create a new order
    ///
    /// # Arguments
    /// * `customer` - Authenticated customer placing the order
    /// * `auth_token` - Bearer token forwarded to the address and supplier services
    /// * `request` - Delivery address, lines and options
    ///
    /// # Validation
    /// - The address must exist, be active and belong to the customer
    /// - Every gas type must exist and be active
    /// - Each line needs a supplier with enough free stock
    /// - All reservations are taken in ascending inventory record order
    pub async fn create_order(
        &self,
        customer: &AuthUser,
        auth_token: &str,
        request: CreateOrderRequest,
    ) -> EngineResult<OrderDetails> {
        request.validate()?;
        for item in &request.items {
            item.validate()?;
        }

        let now = Utc::now();
        if let Some(date) = request.scheduled_delivery_date {
            if date < now {
                return Err(EngineError::invalid_field(
                    "scheduled_delivery_date",
                    "scheduled delivery date is in the past",
                ));
            }
        }

        let address = self.delivery_address(customer, request.delivery_address_id, auth_token).await?;
        let destination = address.coordinates();
        let is_emergency = request.order_type == OrderType::Emergency;
        let customer_class = CustomerClass::normalize(customer.customer_type.as_deref());

        debug!(
            "Creating {} order with {} lines for customer {} ({})",
            request.order_type.as_str(),
            request.items.len(),
            customer.id,
            customer_class
        );

        let mut tx = self.store.begin().await?;

        let mut lines = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let line = self
                .plan_line(tx.as_mut(), item, destination, is_emergency, customer_class, auth_token)
                .await?;
            lines.push(line);
        }

        let line_totals: Vec<Decimal> = lines
            .iter()
            .map(|line| PriceCalculator::line_total(line.request.quantity, line.quote.unit_price))
            .collect::<EngineResult<_>>()?;
        let distance_km = fee_distance(destination, &lines);
        let totals = PriceCalculator::totals(&self.config, &line_totals, distance_km, is_emergency);

        let order = Order {
            id: Uuid::new_v4(),
            order_number: generate_order_number(now),
            customer_id: customer.id,
            customer_role: customer.role,
            delivery_address_id: address.id,
            order_type: request.order_type,
            priority: if is_emergency {
                OrderPriority::Urgent
            } else {
                OrderPriority::Normal
            },
            status: OrderStatus::Pending,
            subtotal: totals.subtotal,
            tax_amount: totals.tax_amount,
            delivery_fee: totals.delivery_fee,
            emergency_surcharge: totals.emergency_surcharge,
            total_amount: totals.total_amount,
            currency: self.config.currency.clone(),
            special_instructions: request.special_instructions.clone(),
            scheduled_delivery_date: request.scheduled_delivery_date,
            delivery_latitude: address.latitude,
            delivery_longitude: address.longitude,
            cancellation_reason: None,
            cancelled_at: None,
            delivered_at: None,
            created_at: now,
            updated_at: now,
        };
        tx.insert_order(&order).await?;

        let mut items = Vec::with_capacity(lines.len());
        for (line, total_price) in lines.iter().zip(line_totals) {
            let item = OrderItem {
                id: Uuid::new_v4(),
                order_id: order.id,
                supplier_id: line.offer.supplier_id,
                inventory_record_id: line.offer.inventory_record_id,
                gas_type_id: line.request.gas_type_id,
                cylinder_size: line.cylinder_size.clone(),
                quantity: line.request.quantity,
                unit_price: line.quote.unit_price,
                original_price: line.quote.base_price,
                discount_amount: line.quote.discount,
                total_price,
                pricing_rule_id: line.quote.rule_id,
                created_at: now,
            };
            tx.insert_order_item(&item).await?;
            items.push(item);
        }

        let history = OrderStatusHistory {
            id: Uuid::new_v4(),
            order_id: order.id,
            previous_status: None,
            new_status: OrderStatus::Pending,
            changed_by: customer.id,
            changed_by_role: customer.role,
            reason: None,
            created_at: now,
        };
        tx.insert_status_history(&history).await?;

        // Lock order across the whole set, not per line
        let mut holds_needed: Vec<&OrderItem> = items.iter().collect();
        holds_needed.sort_by_key(|item| (item.inventory_record_id, item.id));

        let ttl = self.ledger.default_ttl();
        let mut reserved = Vec::with_capacity(holds_needed.len());
        let mut touched: BTreeMap<Uuid, InventoryRecord> = BTreeMap::new();
        for item in holds_needed {
            let hold = self
                .ledger
                .reserve_record_in(tx.as_mut(), item.inventory_record_id, item.quantity, Some(order.id), ttl)
                .await
                .map_err(|e| e.shortfall_as_business("Insufficient inventory for order"))?;
            reserved.push(reserved_event(&hold.reservation));
            touched.insert(hold.record.id, hold.record);
        }

        tx.commit().await?;

        info!(
            "Order {} created for customer {}: {} lines, total {} {}",
            order.order_number,
            customer.id,
            items.len(),
            order.total_amount,
            order.currency
        );

        let mut supplier_ids: Vec<Uuid> = items.iter().map(|item| item.supplier_id).collect();
        supplier_ids.sort();
        supplier_ids.dedup();

        let mut events = vec![DomainEvent::OrderCreated(OrderCreated {
            event_id: format!("order.created:{}", order.id),
            order_id: order.id,
            order_number: order.order_number.clone(),
            customer_id: order.customer_id,
            supplier_ids,
            order_type: order.order_type,
            total_amount: order.total_amount,
            currency: order.currency.clone(),
            timestamp: order.created_at,
        })];
        events.extend(reserved);
        publish_all(self.events.as_ref(), &events).await;

        self.sync_supplier_inventory(touched.into_values(), auth_token).await;

        Ok(OrderDetails {
            order,
            items,
            status_history: vec![history],
            delivery: None,
        })
    }

    async fn delivery_address(
        &self,
        customer: &AuthUser,
        address_id: Uuid,
        auth_token: &str,
    ) -> EngineResult<Address> {
        let address = self
            .addresses
            .get_address(address_id, auth_token)
            .await?
            .ok_or_else(|| EngineError::invalid_field("delivery_address_id", "delivery address not found"))?;

        if address.customer_id != customer.id {
            return Err(EngineError::invalid_field(
                "delivery_address_id",
                "delivery address does not belong to the customer",
            ));
        }
        if !address.is_active {
            return Err(EngineError::invalid_field(
                "delivery_address_id",
                "delivery address is not active",
            ));
        }
        Ok(address)
    }

    /// Picks the supplier for one line and prices it
    async fn plan_line(
        &self,
        tx: &mut dyn StoreTx,
        item: &OrderItemRequest,
        destination: Option<Coordinates>,
        is_emergency: bool,
        customer_class: CustomerClass,
        auth_token: &str,
    ) -> EngineResult<PlannedLine> {
        let gas_type = tx
            .find_gas_type(item.gas_type_id)
            .await?
            .filter(|gas| gas.is_active)
            .ok_or_else(|| {
                EngineError::invalid_field("gas_type_id", format!("gas type {} is not available", item.gas_type_id))
            })?;

        let cylinder_size = normalize_size(&item.cylinder_size);
        let stocks = tx
            .find_supplier_candidates(gas_type.id, &cylinder_size, item.quantity)
            .await?;
        if stocks.is_empty() {
            return Err(EngineError::business(
                format!(
                    "No supplier has {} x {} {} available",
                    item.quantity, cylinder_size, gas_type.name
                ),
                Some(serde_json::json!({
                    "unavailable_items": [{
                        "gas_type_id": gas_type.id,
                        "cylinder_size": cylinder_size,
                        "requested": item.quantity,
                    }]
                })),
            ));
        }

        let mut offers = Vec::with_capacity(stocks.len());
        let mut positions = HashMap::with_capacity(stocks.len());
        for stock in &stocks {
            let price_request = PriceRequest {
                supplier_id: stock.supplier_id,
                gas_type_id: gas_type.id,
                cylinder_size: cylinder_size.clone(),
                quantity: item.quantity,
                customer_class,
            };
            let unit_price = self.pricing.indicative_price_in(tx, &price_request).await?;
            positions.insert(stock.inventory_record_id, stock.coordinates());
            offers.push(self.offer_for(stock, destination, unit_price));
        }

        let offer = self.selector.select(&offers, is_emergency)?;
        debug!(
            "Line {} x {} goes to supplier {} ({:.1} km)",
            item.quantity, cylinder_size, offer.supplier_name, offer.distance_km
        );

        let quote = self
            .pricing
            .price_in(
                tx,
                &PriceRequest {
                    supplier_id: offer.supplier_id,
                    gas_type_id: gas_type.id,
                    cylinder_size: cylinder_size.clone(),
                    quantity: item.quantity,
                    customer_class,
                },
                auth_token,
            )
            .await?;

        Ok(PlannedLine {
            request: item.clone(),
            supplier_position: positions.get(&offer.inventory_record_id).copied().flatten(),
            cylinder_size,
            offer,
            quote,
        })
    }

    fn offer_for(&self, stock: &SupplierStock, destination: Option<Coordinates>, unit_price: Decimal) -> SupplierOffer {
        // unknown distance ranks as far away as the score's reference point
        let distance_km = match (stock.coordinates(), destination) {
            (Some(from), Some(to)) => haversine_km(from, to),
            _ => self.config.selection.reference,
        };
        SupplierOffer {
            supplier_id: stock.supplier_id,
            supplier_name: stock.supplier_name.clone(),
            inventory_record_id: stock.inventory_record_id,
            rating: stock.rating,
            distance_km,
            unit_price,
        }
    }

    /// Best-effort quantity push; the order is already committed
    async fn sync_supplier_inventory(&self, records: impl Iterator<Item = InventoryRecord>, auth_token: &str) {
        let mut by_supplier: BTreeMap<Uuid, Vec<InventorySync>> = BTreeMap::new();
        for record in records {
            by_supplier.entry(record.supplier_id).or_default().push(InventorySync {
                inventory_record_id: record.id,
                gas_type_id: record.gas_type_id,
                cylinder_size: record.cylinder_size.clone(),
                quantity_available: record.quantity_available,
                quantity_reserved: record.quantity_reserved,
            });
        }

        for (supplier_id, records) in by_supplier {
            if let Err(e) = self
                .supplier_service
                .sync_inventory(supplier_id, &records, auth_token)
                .await
            {
                warn!("Inventory sync to supplier {} failed: {}", supplier_id, e);
            }
        }
    }

    /// Order with items, history and delivery, if `user` may see it
    pub async fn get_order(&self, order_id: Uuid, user: &AuthUser) -> EngineResult<OrderDetails> {
        let mut tx = self.store.begin().await?;
        let order = tx
            .find_order(order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Order", order_id))?;
        let items = tx.find_order_items(order_id).await?;
        let delivery = tx.find_delivery_by_order(order_id).await?;

        let visible = match user.role {
            Role::Admin => true,
            Role::Customer => order.customer_id == user.id,
            Role::Supplier => items.iter().any(|item| item.supplier_id == user.id),
            Role::Driver => delivery
                .as_ref()
                .and_then(|d| d.driver_id)
                .map_or(false, |driver_id| driver_id == user.id),
        };
        if !visible {
            return Err(EngineError::not_found("Order", order_id));
        }

        let status_history = tx.find_status_history(order_id).await?;
        tx.commit().await?;

        Ok(OrderDetails {
            order,
            items,
            status_history,
            delivery,
        })
    }

    /// Filtered page of orders, narrowed to what `user` may see
    pub async fn list_orders(&self, user: &AuthUser, mut query: OrderQuery) -> EngineResult<OrderPage> {
        match user.role {
            Role::Admin => {}
            Role::Customer => query.customer_id = Some(user.id),
            Role::Supplier => query.supplier_id = Some(user.id),
            Role::Driver => {
                return Err(EngineError::Unauthorized(
                    "drivers cannot list orders".to_string(),
                ))
            }
        }

        let mut tx = self.store.begin().await?;
        let orders = tx.list_orders(&query).await?;
        tx.commit().await?;

        Ok(OrderPage {
            orders,
            page: query.page,
            limit: query.limit,
        })
    }

    /// Applies a status change on behalf of `user`
    pub async fn update_status(
        &self,
        order_id: Uuid,
        user: &AuthUser,
        request: UpdateStatusRequest,
    ) -> EngineResult<TransitionOutcome> {
        request.validate()?;
        self.state_machine
            .transition(TransitionRequest {
                order_id,
                to: request.status,
                actor: Actor {
                    id: user.id,
                    role: user.role,
                },
                reason: request.reason,
                driver_id: request.driver_id,
            })
            .await
    }
}

/// Distance charged for delivery: the farthest selected supplier
///
/// `None` when any end of any trip has no coordinates.
fn fee_distance(destination: Option<Coordinates>, lines: &[PlannedLine]) -> Option<f64> {
    let destination = destination?;
    lines.iter().try_fold(0.0_f64, |farthest, line| {
        let from = line.supplier_position?;
        Some(farthest.max(haversine_km(from, destination)))
    })
}
