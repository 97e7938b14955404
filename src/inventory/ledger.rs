// Inventory ledger
//
// Owns every quantity mutation. Each operation locks the inventory row it
// touches before reading its counts; `*_in` variants run inside a caller's
// transaction so sibling holds of one order commit or roll back together.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collaborators::{SupplierItem, SupplierService};
use crate::error::{EngineError, EngineResult};
use crate::events::{publish_all, DomainEvent, EventPublisher, InventoryReleased, InventoryReserved};
use crate::inventory::models::{
    normalize_size, CommitOutcome, InventoryRecord, ItemAvailabilityView, ReapSummary,
    ReleaseOutcome, Reservation, ReservationStatus, Sku,
};
use crate::store::{EngineStore, StoreTx};

/// A reservation together with the locked record it was taken from
#[derive(Debug, Clone, PartialEq)]
pub struct Hold {
    pub reservation: Reservation,
    pub record: InventoryRecord,
}

pub struct InventoryLedger {
    store: Arc<dyn EngineStore>,
    events: Arc<dyn EventPublisher>,
    supplier_service: Arc<dyn SupplierService>,
    default_ttl: Duration,
    reaper_batch_size: i64,
}

fn chrono_ttl(ttl: Duration) -> EngineResult<chrono::Duration> {
    chrono::Duration::from_std(ttl)
        .map_err(|_| EngineError::invalid_field("ttl_seconds", "reservation TTL is out of range"))
}

pub fn reserved_event(reservation: &Reservation) -> DomainEvent {
    DomainEvent::InventoryReserved(InventoryReserved {
        event_id: format!("inventory.reserved:{}", reservation.id),
        reservation_id: reservation.id,
        inventory_record_id: reservation.inventory_record_id,
        order_id: reservation.order_id,
        quantity: reservation.quantity,
        expires_at: reservation.expires_at,
        timestamp: reservation.created_at,
    })
}

pub fn released_event(reservation: &Reservation) -> DomainEvent {
    DomainEvent::InventoryReleased(InventoryReleased {
        event_id: format!("inventory.released:{}", reservation.id),
        reservation_id: reservation.id,
        inventory_record_id: reservation.inventory_record_id,
        order_id: reservation.order_id,
        quantity: reservation.quantity,
        reason: reservation
            .release_reason
            .clone()
            .unwrap_or_else(|| reservation.status.to_string()),
        timestamp: reservation.updated_at,
    })
}

impl InventoryLedger {
    pub fn new(
        store: Arc<dyn EngineStore>,
        events: Arc<dyn EventPublisher>,
        supplier_service: Arc<dyn SupplierService>,
        default_ttl: Duration,
        reaper_batch_size: i64,
    ) -> Self {
        Self {
            store,
            events,
            supplier_service,
            default_ttl,
            reaper_batch_size,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    // Transaction-scoped operations

    /// Reserves `quantity` units of the SKU
    pub async fn reserve_in(
        &self,
        tx: &mut dyn StoreTx,
        sku: &Sku,
        quantity: i32,
        order_id: Option<Uuid>,
        ttl: Duration,
    ) -> EngineResult<Hold> {
        let record = tx
            .lock_inventory_by_sku(sku)
            .await?
            .ok_or_else(|| {
                EngineError::not_found(
                    "Inventory",
                    format!("{}/{}/{}", sku.supplier_id, sku.gas_type_id, sku.cylinder_size),
                )
            })?;
        self.hold(tx, record, quantity, order_id, ttl).await
    }

    /// Reserves against a record already chosen by id
    pub async fn reserve_record_in(
        &self,
        tx: &mut dyn StoreTx,
        inventory_record_id: Uuid,
        quantity: i32,
        order_id: Option<Uuid>,
        ttl: Duration,
    ) -> EngineResult<Hold> {
        let record = tx
            .lock_inventory(inventory_record_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Inventory", inventory_record_id))?;
        self.hold(tx, record, quantity, order_id, ttl).await
    }

    async fn hold(
        &self,
        tx: &mut dyn StoreTx,
        mut record: InventoryRecord,
        quantity: i32,
        order_id: Option<Uuid>,
        ttl: Duration,
    ) -> EngineResult<Hold> {
        if quantity <= 0 {
            return Err(EngineError::invalid_field("quantity", "quantity must be positive"));
        }

        let available = record.free();
        if available < quantity {
            debug!(
                "Reservation of {} on {} refused: {} free",
                quantity, record.id, available
            );
            return Err(EngineError::InsufficientInventory {
                inventory_record_id: record.id,
                requested: quantity,
                available,
            });
        }

        let now = Utc::now();
        record.quantity_reserved += quantity;
        record.updated_at = now;
        tx.save_inventory_quantities(&record).await?;

        let reservation = Reservation {
            id: Uuid::new_v4(),
            inventory_record_id: record.id,
            order_id,
            quantity,
            status: ReservationStatus::Active,
            release_reason: None,
            expires_at: now + chrono_ttl(ttl)?,
            created_at: now,
            updated_at: now,
        };
        tx.insert_reservation(&reservation).await?;

        debug!(
            "Reserved {} on {} (reservation {}, order {:?})",
            quantity, record.id, reservation.id, order_id
        );
        Ok(Hold { reservation, record })
    }

    /// Releases a reservation by id
    pub async fn release_in(
        &self,
        tx: &mut dyn StoreTx,
        reservation_id: Uuid,
        reason: &str,
    ) -> EngineResult<(Reservation, ReleaseOutcome)> {
        let reservation = tx
            .lock_reservation(reservation_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Reservation", reservation_id))?;
        self.release_locked(tx, reservation, reason).await
    }

    /// Releases a reservation the caller has already locked
    ///
    /// Released and expired holds are a no-op; consumed ones are rejected.
    pub async fn release_locked(
        &self,
        tx: &mut dyn StoreTx,
        mut reservation: Reservation,
        reason: &str,
    ) -> EngineResult<(Reservation, ReleaseOutcome)> {
        match reservation.status {
            ReservationStatus::Released | ReservationStatus::Expired => {
                debug!("Reservation {} already {}", reservation.id, reservation.status);
                return Ok((reservation, ReleaseOutcome::AlreadyReleased));
            }
            ReservationStatus::Consumed => {
                return Err(EngineError::validation(format!(
                    "reservation {} has been consumed and cannot be released",
                    reservation.id
                )));
            }
            ReservationStatus::Active => {}
        }

        let now = Utc::now();
        let mut record = self.locked_record(tx, reservation.inventory_record_id).await?;
        record.quantity_reserved = (record.quantity_reserved - reservation.quantity).max(0);
        record.updated_at = now;
        tx.save_inventory_quantities(&record).await?;

        reservation.status = ReservationStatus::Released;
        reservation.release_reason = Some(reason.to_string());
        reservation.updated_at = now;
        tx.update_reservation(&reservation).await?;

        debug!(
            "Released {} on {} (reservation {}): {}",
            reservation.quantity, record.id, reservation.id, reason
        );
        let quantity = reservation.quantity;
        Ok((reservation, ReleaseOutcome::Released { quantity }))
    }

    /// Converts a reservation into a permanent decrement
    pub async fn commit_decrement_in(
        &self,
        tx: &mut dyn StoreTx,
        reservation_id: Uuid,
    ) -> EngineResult<(Reservation, CommitOutcome)> {
        let reservation = tx
            .lock_reservation(reservation_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Reservation", reservation_id))?;
        self.commit_locked(tx, reservation).await
    }

    /// Consumed holds are a no-op; released and expired ones are rejected
    pub async fn commit_locked(
        &self,
        tx: &mut dyn StoreTx,
        mut reservation: Reservation,
    ) -> EngineResult<(Reservation, CommitOutcome)> {
        match reservation.status {
            ReservationStatus::Consumed => {
                return Ok((reservation, CommitOutcome::AlreadyConsumed));
            }
            ReservationStatus::Released | ReservationStatus::Expired => {
                return Err(EngineError::validation(format!(
                    "reservation {} is {} and cannot be committed",
                    reservation.id, reservation.status
                )));
            }
            ReservationStatus::Active => {}
        }

        let now = Utc::now();
        let mut record = self.locked_record(tx, reservation.inventory_record_id).await?;
        record.quantity_available -= reservation.quantity;
        record.quantity_reserved -= reservation.quantity;
        if record.quantity_available < 0 || record.quantity_reserved < 0 {
            return Err(EngineError::Internal(format!(
                "inventory {} is out of balance with reservation {}",
                record.id, reservation.id
            )));
        }
        record.updated_at = now;
        tx.save_inventory_quantities(&record).await?;

        reservation.status = ReservationStatus::Consumed;
        reservation.updated_at = now;
        tx.update_reservation(&reservation).await?;

        if record.is_low_stock() {
            warn!(
                "Low stock on inventory {} (supplier {}, {}): {} free, reorder level {}",
                record.id,
                record.supplier_id,
                record.cylinder_size,
                record.free(),
                record.reorder_level
            );
        }

        let quantity = reservation.quantity;
        Ok((reservation, CommitOutcome::Consumed { quantity }))
    }

    /// Removes stock without a reservation window
    pub async fn direct_decrement_in(
        &self,
        tx: &mut dyn StoreTx,
        sku: &Sku,
        quantity: i32,
    ) -> EngineResult<InventoryRecord> {
        if quantity <= 0 {
            return Err(EngineError::invalid_field("quantity", "quantity must be positive"));
        }
        let mut record = self.locked_record_by_sku(tx, sku).await?;
        let available = record.free();
        if available < quantity {
            return Err(EngineError::InsufficientInventory {
                inventory_record_id: record.id,
                requested: quantity,
                available,
            });
        }
        record.quantity_available -= quantity;
        record.updated_at = Utc::now();
        tx.save_inventory_quantities(&record).await?;
        Ok(record)
    }

    /// Returns stock without a reservation window
    pub async fn direct_increment_in(
        &self,
        tx: &mut dyn StoreTx,
        sku: &Sku,
        quantity: i32,
    ) -> EngineResult<InventoryRecord> {
        if quantity <= 0 {
            return Err(EngineError::invalid_field("quantity", "quantity must be positive"));
        }
        let mut record = self.locked_record_by_sku(tx, sku).await?;
        record.quantity_available = record
            .quantity_available
            .checked_add(quantity)
            .ok_or_else(|| EngineError::invalid_field("quantity", "quantity overflows stock"))?;
        record.updated_at = Utc::now();
        tx.save_inventory_quantities(&record).await?;
        Ok(record)
    }

    /// Expires stale holds of pending orders
    pub async fn reap_expired_in(
        &self,
        tx: &mut dyn StoreTx,
        now: DateTime<Utc>,
    ) -> EngineResult<(ReapSummary, Vec<Reservation>)> {
        let stale = tx.lock_expired_reservations(now, self.reaper_batch_size).await?;
        let mut summary = ReapSummary::default();
        let mut reaped = Vec::with_capacity(stale.len());

        // already sorted by inventory record id
        for mut reservation in stale {
            let mut record = self.locked_record(tx, reservation.inventory_record_id).await?;
            record.quantity_reserved = (record.quantity_reserved - reservation.quantity).max(0);
            record.updated_at = now;
            tx.save_inventory_quantities(&record).await?;

            reservation.status = ReservationStatus::Expired;
            reservation.release_reason = Some("expired".to_string());
            reservation.updated_at = now;
            tx.update_reservation(&reservation).await?;

            summary.reservations += 1;
            summary.quantity += i64::from(reservation.quantity);
            reaped.push(reservation);
        }

        Ok((summary, reaped))
    }

    async fn locked_record(&self, tx: &mut dyn StoreTx, id: Uuid) -> EngineResult<InventoryRecord> {
        tx.lock_inventory(id)
            .await?
            .ok_or_else(|| EngineError::not_found("Inventory", id))
    }

    async fn locked_record_by_sku(&self, tx: &mut dyn StoreTx, sku: &Sku) -> EngineResult<InventoryRecord> {
        tx.lock_inventory_by_sku(sku).await?.ok_or_else(|| {
            EngineError::not_found(
                "Inventory",
                format!("{}/{}/{}", sku.supplier_id, sku.gas_type_id, sku.cylinder_size),
            )
        })
    }

    // Self-contained operations: own transaction, events after commit

    pub async fn reserve(
        &self,
        sku: &Sku,
        quantity: i32,
        order_id: Option<Uuid>,
        ttl: Option<Duration>,
    ) -> EngineResult<Reservation> {
        let mut tx = self.store.begin().await?;
        let hold = self
            .reserve_in(tx.as_mut(), sku, quantity, order_id, ttl.unwrap_or(self.default_ttl))
            .await?;
        tx.commit().await?;

        info!(
            "Reservation {} holds {} on inventory {}",
            hold.reservation.id, quantity, hold.record.id
        );
        publish_all(self.events.as_ref(), &[reserved_event(&hold.reservation)]).await;
        Ok(hold.reservation)
    }

    /// With `owner` set, holds on another supplier's stock look missing
    pub async fn release(
        &self,
        reservation_id: Uuid,
        reason: &str,
        owner: Option<Uuid>,
    ) -> EngineResult<ReleaseOutcome> {
        let mut tx = self.store.begin().await?;
        let reservation = tx
            .lock_reservation(reservation_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Reservation", reservation_id))?;
        if let Some(supplier_id) = owner {
            let record = self.locked_record(tx.as_mut(), reservation.inventory_record_id).await?;
            if record.supplier_id != supplier_id {
                return Err(EngineError::not_found("Reservation", reservation_id));
            }
        }
        let (reservation, outcome) = self.release_locked(tx.as_mut(), reservation, reason).await?;
        tx.commit().await?;

        if let ReleaseOutcome::Released { quantity } = outcome {
            info!("Reservation {} released {} units", reservation.id, quantity);
            publish_all(self.events.as_ref(), &[released_event(&reservation)]).await;
        }
        Ok(outcome)
    }

    pub async fn commit_decrement(&self, reservation_id: Uuid) -> EngineResult<CommitOutcome> {
        let mut tx = self.store.begin().await?;
        let (reservation, outcome) = self.commit_decrement_in(tx.as_mut(), reservation_id).await?;
        tx.commit().await?;

        if let CommitOutcome::Consumed { quantity } = outcome {
            info!("Reservation {} consumed {} units", reservation.id, quantity);
        }
        Ok(outcome)
    }

    pub async fn direct_decrement(&self, sku: &Sku, quantity: i32) -> EngineResult<InventoryRecord> {
        let mut tx = self.store.begin().await?;
        let record = self.direct_decrement_in(tx.as_mut(), sku, quantity).await?;
        tx.commit().await?;
        info!("Decremented inventory {} by {}", record.id, quantity);
        Ok(record)
    }

    pub async fn direct_increment(&self, sku: &Sku, quantity: i32) -> EngineResult<InventoryRecord> {
        let mut tx = self.store.begin().await?;
        let record = self.direct_increment_in(tx.as_mut(), sku, quantity).await?;
        tx.commit().await?;
        info!("Incremented inventory {} by {}", record.id, quantity);
        Ok(record)
    }

    /// One reaper pass in its own transaction
    pub async fn reap_expired(&self) -> EngineResult<ReapSummary> {
        let mut tx = self.store.begin().await?;
        let (summary, reaped) = self.reap_expired_in(tx.as_mut(), Utc::now()).await?;
        tx.commit().await?;

        if summary.reservations > 0 {
            info!(
                "Reaped {} expired reservations, reclaimed {} units",
                summary.reservations, summary.quantity
            );
            let events: Vec<DomainEvent> = reaped.iter().map(released_event).collect();
            publish_all(self.events.as_ref(), &events).await;
        }
        Ok(summary)
    }

    /// Free quantity per item, from the ledger when the supplier keeps stock
    /// here and from the supplier's own service otherwise
    pub async fn check_availability(
        &self,
        supplier_id: Uuid,
        items: &[SupplierItem],
        auth_token: &str,
    ) -> EngineResult<Vec<ItemAvailabilityView>> {
        let mut views = Vec::with_capacity(items.len());
        let mut remote = Vec::new();

        {
            let mut tx = self.store.begin().await?;
            for item in items {
                let sku = Sku::new(supplier_id, item.gas_type_id, item.cylinder_size.as_str());
                match tx.find_inventory_by_sku(&sku).await? {
                    Some(record) => views.push(ItemAvailabilityView {
                        gas_type_id: item.gas_type_id,
                        cylinder_size: sku.cylinder_size,
                        requested: item.quantity,
                        quantity_available: record.free(),
                        available: record.free() >= item.quantity,
                        source: "ledger",
                    }),
                    None => remote.push(item.clone()),
                }
            }
            tx.commit().await?;
        }

        if remote.is_empty() {
            return Ok(views);
        }

        let answers = match self
            .supplier_service
            .check_availability(supplier_id, &remote, auth_token)
            .await
        {
            Ok(answers) => answers,
            Err(e) => {
                warn!("Supplier {} availability check failed: {}", supplier_id, e);
                Default::default()
            }
        };

        for item in remote {
            let answer = answers.get(&item.key()).copied();
            views.push(ItemAvailabilityView {
                gas_type_id: item.gas_type_id,
                cylinder_size: normalize_size(&item.cylinder_size),
                requested: item.quantity,
                quantity_available: answer.map_or(0, |a| a.quantity_available),
                available: answer.map_or(false, |a| a.available),
                source: "supplier_service",
            });
        }
        Ok(views)
    }
}
