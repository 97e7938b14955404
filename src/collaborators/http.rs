// reqwest-backed collaborator clients

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::collaborators::{
    Address, AddressDirectory, InventorySync, ItemAvailability, PricingQuote, SupplierItem,
    SupplierService,
};
use crate::error::{EngineError, EngineResult};
use crate::pricing::models::CustomerClass;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

fn build_client() -> EngineResult<Client> {
    Ok(Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

fn upstream_status(service: &str, status: StatusCode) -> EngineError {
    EngineError::Upstream(format!("{} responded with {}", service, status))
}

pub struct HttpAddressDirectory {
    client: Client,
    base_url: String,
}

impl HttpAddressDirectory {
    pub fn new(base_url: impl Into<String>) -> EngineResult<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl AddressDirectory for HttpAddressDirectory {
    async fn get_address(&self, id: Uuid, auth_token: &str) -> EngineResult<Option<Address>> {
        let url = format!("{}/api/addresses/{}", self.base_url, id);
        debug!("GET {}", url);

        let response = self.client.get(&url).bearer_auth(auth_token).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => Ok(None),
            status if status.is_success() => Ok(Some(response.json::<Address>().await?)),
            status => Err(upstream_status("address service", status)),
        }
    }
}

pub struct HttpSupplierService {
    client: Client,
    base_url: String,
}

impl HttpSupplierService {
    pub fn new(base_url: impl Into<String>) -> EngineResult<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, supplier_id: Uuid, path: &str) -> String {
        format!("{}/api/suppliers/{}/{}", self.base_url, supplier_id, path)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PricingRequest<'a> {
    items: &'a [SupplierItem],
    customer_type: CustomerClass,
}

#[derive(Serialize)]
struct ItemsRequest<'a, T> {
    items: &'a [T],
}

#[derive(Deserialize)]
struct AvailabilityResponse {
    availability: HashMap<String, ItemAvailability>,
}

#[async_trait]
impl SupplierService for HttpSupplierService {
    async fn calculate_pricing(
        &self,
        supplier_id: Uuid,
        items: &[SupplierItem],
        customer_class: CustomerClass,
        auth_token: &str,
    ) -> EngineResult<PricingQuote> {
        let response = self
            .client
            .post(self.url(supplier_id, "pricing/calculate"))
            .bearer_auth(auth_token)
            .json(&PricingRequest {
                items,
                customer_type: customer_class,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(upstream_status("supplier pricing", response.status()));
        }
        let quote: PricingQuote = response.json().await?;
        if quote.items.len() != items.len() {
            return Err(EngineError::Upstream(format!(
                "supplier pricing returned {} lines for {} items",
                quote.items.len(),
                items.len()
            )));
        }
        Ok(quote)
    }

    async fn check_availability(
        &self,
        supplier_id: Uuid,
        items: &[SupplierItem],
        auth_token: &str,
    ) -> EngineResult<HashMap<String, ItemAvailability>> {
        let response = self
            .client
            .post(self.url(supplier_id, "inventory/check"))
            .bearer_auth(auth_token)
            .json(&ItemsRequest { items })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(upstream_status("supplier availability", response.status()));
        }
        Ok(response.json::<AvailabilityResponse>().await?.availability)
    }

    async fn sync_inventory(
        &self,
        supplier_id: Uuid,
        records: &[InventorySync],
        auth_token: &str,
    ) -> EngineResult<()> {
        let response = self
            .client
            .put(self.url(supplier_id, "inventory/sync"))
            .bearer_auth(auth_token)
            .json(&ItemsRequest { items: records })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(upstream_status("supplier inventory sync", response.status()));
        }
        Ok(())
    }
}
