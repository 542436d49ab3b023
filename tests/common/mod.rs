#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use unlock_engine::application::gateways::GatewayRegistry;
use unlock_engine::application::gateways::card::{CARD_PROVIDER, CardGateway};
use unlock_engine::application::gateways::mobile_money::MobileMoneyGateway;
use unlock_engine::application::views::{InitiateUnlockRequest, UnlockSummary};
use unlock_engine::application::{Collaborators, UnlockOrchestrator};
use unlock_engine::config::OrchestratorConfig;
use unlock_engine::domain::catalog::{
    BookingDraft, BookingReceipt, GuestProfile, HostContact, PropertyAddress, PropertyListing,
};
use unlock_engine::domain::money::ExchangeRate;
use unlock_engine::domain::ports::{
    BookingService, BookingServiceRef, CardClient, CollectionRequest, CollectionResponse,
    DepositRequest, DepositResponse, MobileMoneyClient, RepositoryRef,
};
use unlock_engine::domain::unlock::{GatewayStatus, PaymentMethod};
use unlock_engine::error::GatewayError;
use unlock_engine::infrastructure::in_memory::{
    InMemoryBookingService, InMemoryCatalog, InMemoryOutbox, InMemoryRepository,
};
use unlock_engine::infrastructure::sandbox::StaticRateSource;

pub const GUEST: &str = "guest-1";
pub const OTHER_GUEST: &str = "guest-2";
pub const HOST: &str = "host-1";

/// Monthly 250 USD: lower fee tier.
pub const STUDIO: &str = "prop-studio";
/// Monthly 500 USD: upper fee tier, 513 USD deposit.
pub const VILLA: &str = "prop-villa";
/// Monthly 900 USD.
pub const LOFT: &str = "prop-loft";
/// Nightly price only.
pub const CABIN: &str = "prop-cabin";

pub const PHONE: &str = "0788123456";

/// Wallet rail whose answers are queued by the test.
#[derive(Default)]
pub struct ScriptedWallet {
    replies: Mutex<VecDeque<Result<DepositResponse, GatewayError>>>,
    statuses: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<DepositRequest>>,
}

impl ScriptedWallet {
    /// Queues the answer to the next deposit. Unscripted deposits are ACCEPTED.
    pub fn reply_next(&self, reply: Result<DepositResponse, GatewayError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// What a status poll for `reference` will return.
    pub fn report(&self, reference: &str, status: &str) {
        self.statuses
            .lock()
            .unwrap()
            .insert(reference.to_string(), status.to_string());
    }

    pub fn requests(&self) -> Vec<DepositRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl MobileMoneyClient for ScriptedWallet {
    async fn initiate_deposit(&self, request: DepositRequest) -> Result<DepositResponse, GatewayError> {
        self.requests.lock().unwrap().push(request);
        self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(DepositResponse {
                provider_status: Some("ACCEPTED".to_string()),
            })
        })
    }

    async fn deposit_status(&self, reference: &str) -> Result<Option<String>, GatewayError> {
        Ok(self.statuses.lock().unwrap().get(reference).cloned())
    }
}

/// Card rail handing out sequential provider references.
#[derive(Default)]
pub struct ScriptedCards {
    issued: Mutex<u32>,
    statuses: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<CollectionRequest>>,
}

impl ScriptedCards {
    pub fn report(&self, reference: &str, status: &str) {
        self.statuses
            .lock()
            .unwrap()
            .insert(reference.to_string(), status.to_string());
    }

    pub fn requests(&self) -> Vec<CollectionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CardClient for ScriptedCards {
    async fn initiate_collection(
        &self,
        request: CollectionRequest,
    ) -> Result<CollectionResponse, GatewayError> {
        self.requests.lock().unwrap().push(request);
        let mut issued = self.issued.lock().unwrap();
        *issued += 1;
        let provider_reference = format!("XP-{:04}", *issued);
        Ok(CollectionResponse {
            payment_url: format!("https://pay.example.com/checkout/{provider_reference}"),
            provider_reference,
        })
    }

    async fn collection_status(&self, reference: &str) -> Result<Option<String>, GatewayError> {
        Ok(self.statuses.lock().unwrap().get(reference).cloned())
    }
}

/// Holds every booking request until `parties` of them are in flight.
pub struct GatedBookings {
    inner: Arc<InMemoryBookingService>,
    gate: tokio::sync::Barrier,
}

impl GatedBookings {
    pub fn new(inner: Arc<InMemoryBookingService>, parties: usize) -> Self {
        Self {
            inner,
            gate: tokio::sync::Barrier::new(parties),
        }
    }
}

#[async_trait]
impl BookingService for GatedBookings {
    async fn create_booking(
        &self,
        draft: BookingDraft,
    ) -> unlock_engine::error::Result<BookingReceipt> {
        self.gate.wait().await;
        self.inner.create_booking(draft).await
    }
}

pub struct Harness {
    pub orchestrator: Arc<UnlockOrchestrator>,
    pub repository: Arc<InMemoryRepository>,
    pub catalog: Arc<InMemoryCatalog>,
    pub bookings: Arc<InMemoryBookingService>,
    pub outbox: Arc<InMemoryOutbox>,
    pub wallet: Arc<ScriptedWallet>,
    pub cards: Arc<ScriptedCards>,
}

pub fn listing(property_id: &str, monthly: Option<Decimal>) -> PropertyListing {
    PropertyListing {
        property_id: property_id.to_string(),
        title: format!("Listing {property_id}"),
        price_per_month: monthly,
        price_per_night: Some(dec!(40)),
        address: PropertyAddress {
            street: "KG 7 Ave 12".to_string(),
            city: "Kigali".to_string(),
            district: Some("Gasabo".to_string()),
            country: "RW".to_string(),
            latitude: None,
            longitude: None,
        },
        host: HostContact {
            host_id: HOST.to_string(),
            name: "Aline Host".to_string(),
            email: "host@example.com".to_string(),
            phone: Some("+250788000111".to_string()),
        },
    }
}

pub fn guest(user_id: &str) -> GuestProfile {
    GuestProfile {
        user_id: user_id.to_string(),
        name: format!("Guest {user_id}"),
        email: format!("{user_id}@example.com"),
        phone: Some(PHONE.to_string()),
    }
}

async fn seeded_catalog() -> Arc<InMemoryCatalog> {
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.insert_property(listing(STUDIO, Some(dec!(250)))).await;
    catalog.insert_property(listing(VILLA, Some(dec!(500)))).await;
    catalog.insert_property(listing(LOFT, Some(dec!(900)))).await;
    catalog.insert_property(listing(CABIN, None)).await;
    catalog.insert_guest(guest(GUEST)).await;
    catalog.insert_guest(guest(OTHER_GUEST)).await;
    catalog
}

fn wire(
    repository: RepositoryRef,
    catalog: Arc<InMemoryCatalog>,
    bookings: BookingServiceRef,
    outbox: Arc<InMemoryOutbox>,
    wallet: Arc<ScriptedWallet>,
    cards: Arc<ScriptedCards>,
) -> Arc<UnlockOrchestrator> {
    let collaborators = Collaborators {
        repository,
        gateways: GatewayRegistry::new()
            .with(Arc::new(MobileMoneyGateway::new(wallet)))
            .with(Arc::new(CardGateway::new(
                cards,
                "https://app.example.com/unlocks/return",
                "250",
            ))),
        rate_source: Arc::new(StaticRateSource::new(ExchangeRate::new(dec!(1300)).unwrap())),
        catalog: catalog.clone(),
        guests: catalog,
        bookings,
        notifier: outbox,
    };
    Arc::new(UnlockOrchestrator::new(
        collaborators,
        OrchestratorConfig::default(),
    ))
}

pub async fn harness() -> Harness {
    let repository = Arc::new(InMemoryRepository::new());
    let catalog = seeded_catalog().await;
    let bookings = Arc::new(InMemoryBookingService::new());
    let outbox = Arc::new(InMemoryOutbox::new());
    let wallet = Arc::new(ScriptedWallet::default());
    let cards = Arc::new(ScriptedCards::default());

    Harness {
        orchestrator: wire(
            repository.clone(),
            catalog.clone(),
            bookings.clone(),
            outbox.clone(),
            wallet.clone(),
            cards.clone(),
        ),
        repository,
        catalog,
        bookings,
        outbox,
        wallet,
        cards,
    }
}

/// An orchestrator with fresh fakes over a caller-supplied repository.
pub async fn orchestrator_on(repository: RepositoryRef) -> Arc<UnlockOrchestrator> {
    wire(
        repository,
        seeded_catalog().await,
        Arc::new(InMemoryBookingService::new()),
        Arc::new(InMemoryOutbox::new()),
        Arc::new(ScriptedWallet::default()),
        Arc::new(ScriptedCards::default()),
    )
}

/// Like [`orchestrator_on`], with a caller-supplied booking service.
pub async fn orchestrator_with_bookings(
    repository: RepositoryRef,
    bookings: BookingServiceRef,
) -> Arc<UnlockOrchestrator> {
    wire(
        repository,
        seeded_catalog().await,
        bookings,
        Arc::new(InMemoryOutbox::new()),
        Arc::new(ScriptedWallet::default()),
        Arc::new(ScriptedCards::default()),
    )
}

pub fn wallet_request(property_id: &str, method: PaymentMethod) -> InitiateUnlockRequest {
    InitiateUnlockRequest {
        property_id: property_id.to_string(),
        payment_method: method,
        payment_provider: Some("MTN_RW".to_string()),
        phone_number: Some(PHONE.to_string()),
        deal_code: None,
        client_amount: None,
    }
}

pub fn card_request(property_id: &str, method: PaymentMethod) -> InitiateUnlockRequest {
    InitiateUnlockRequest {
        payment_provider: Some(CARD_PROVIDER.to_string()),
        phone_number: None,
        ..wallet_request(property_id, method)
    }
}

pub fn deal_code_request(property_id: &str, code: &str) -> InitiateUnlockRequest {
    InitiateUnlockRequest {
        payment_provider: None,
        phone_number: None,
        deal_code: Some(code.to_string()),
        ..wallet_request(property_id, PaymentMethod::ThreeMonth30Percent)
    }
}

impl Harness {
    /// Pays for an unlock over the wallet rail and confirms it by callback.
    pub async fn completed_unlock(
        &self,
        user_id: &str,
        property_id: &str,
        method: PaymentMethod,
    ) -> UnlockSummary {
        let outcome = self
            .orchestrator
            .initiate_unlock_payment(user_id, wallet_request(property_id, method))
            .await
            .unwrap();
        self.orchestrator
            .process_payment_callback(&outcome.unlock.transaction_reference, GatewayStatus::Completed)
            .await
            .unwrap();
        self.orchestrator
            .list_unlocks(user_id)
            .await
            .unwrap()
            .into_iter()
            .find(|u| u.unlock_id == outcome.unlock.unlock_id)
            .unwrap()
    }
}
