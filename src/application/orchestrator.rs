use super::fees::{calculate_fee, monthly_price};
use super::gateways::GatewayRegistry;
use super::ledger::DealCodeLedger;
use super::rates::RateCache;
use super::views::{
    CallbackOutcome, InitiateUnlockOutcome, InitiateUnlockRequest, UnlockStatusView, UnlockSummary,
    UnlockedProperty,
};
use crate::config::OrchestratorConfig;
use crate::domain::catalog::PropertyListing;
use crate::domain::deal_code::DealCodeUsage;
use crate::domain::notification::Notification;
use crate::domain::ports::{
    BookingServiceRef, CatalogRef, ChargeRequest, GuestDirectoryRef, NotifierRef, PaymentGateway,
    RateSourceRef, Redemption, RedemptionOutcome, RepositoryRef,
};
use crate::domain::unlock::{
    GatewayStatus, NewUnlock, ProviderCode, StatusKind, Transition, UnlockId, UnlockRecord,
};
use crate::error::{Result, UnlockError};
use chrono::{DateTime, Utc};

/// Optimistic writes retried this many times before reporting `Conflict`.
const MAX_WRITE_ATTEMPTS: usize = 3;

/// Base currency of listing prices.
pub(crate) const PRICE_CURRENCY: &str = "USD";

/// External services the orchestrator is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub repository: RepositoryRef,
    pub gateways: GatewayRegistry,
    pub rate_source: RateSourceRef,
    pub catalog: CatalogRef,
    pub guests: GuestDirectoryRef,
    pub bookings: BookingServiceRef,
    pub notifier: NotifierRef,
}

/// Entry point for the address-unlock flows.
///
/// `UnlockOrchestrator` owns no state of its own: every decision is taken
/// against the repository, and every write is conditional on the revision
/// that was read, so concurrent requests and provider callbacks cannot
/// overwrite each other.
pub struct UnlockOrchestrator {
    pub(super) repository: RepositoryRef,
    pub(super) ledger: DealCodeLedger,
    pub(super) gateways: GatewayRegistry,
    pub(super) rates: RateCache,
    pub(super) catalog: CatalogRef,
    pub(super) guests: GuestDirectoryRef,
    pub(super) bookings: BookingServiceRef,
    pub(super) notifier: NotifierRef,
    pub(super) config: OrchestratorConfig,
}

impl UnlockOrchestrator {
    /// Creates a new `UnlockOrchestrator`.
    ///
    /// # Arguments
    ///
    /// * `collaborators` - Storage, payment rails and platform services.
    /// * `config` - Fee schedule, currencies and cache settings.
    pub fn new(collaborators: Collaborators, config: OrchestratorConfig) -> Self {
        let Collaborators {
            repository,
            gateways,
            rate_source,
            catalog,
            guests,
            bookings,
            notifier,
        } = collaborators;
        Self {
            ledger: DealCodeLedger::new(repository.clone(), config.deal_code_validity),
            rates: RateCache::new(rate_source, config.rate_ttl, config.default_rate),
            repository,
            gateways,
            catalog,
            guests,
            bookings,
            notifier,
            config,
        }
    }

    pub fn ledger(&self) -> &DealCodeLedger {
        &self.ledger
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Starts (or resumes) the unlock of a property for `user_id`.
    ///
    /// An open attempt is returned as-is so client retries never charge twice.
    /// A terminal attempt is swapped for the new one in a single write, and
    /// only after the request passed validation; a cancelled attempt stays
    /// stored as history. With a deal code the unlock completes immediately;
    /// otherwise the fee is priced server-side and handed to the rail that
    /// handles the requested provider.
    pub async fn initiate_unlock_payment(
        &self,
        user_id: &str,
        request: InitiateUnlockRequest,
    ) -> Result<InitiateUnlockOutcome> {
        let now = Utc::now();
        let listing = self.listing(&request.property_id).await?;
        monthly_price(&listing)?;

        let mut replaces = None;
        if let Some(existing) = self.repository.find_unlock(user_id, &request.property_id).await? {
            match existing.kind() {
                StatusKind::Pending | StatusKind::Submitted => {
                    tracing::info!(unlock_id = %existing.unlock_id, status = %existing.kind(), "Resuming open unlock attempt");
                    return Ok(self.resumed(existing));
                }
                StatusKind::Completed if request.deal_code.is_none() => {
                    return Err(UnlockError::AlreadyUnlocked {
                        property_id: request.property_id,
                    });
                }
                StatusKind::Completed | StatusKind::Cancelled | StatusKind::Failed => {
                    replaces = Some((existing.unlock_id, existing.revision));
                }
            }
        }

        match request.deal_code.as_deref() {
            Some(code) => {
                self.redeem_deal_code(user_id, code, &request, listing, replaces, now)
                    .await
            }
            None => {
                self.start_payment(user_id, request, listing, replaces, now)
                    .await
            }
        }
    }

    async fn redeem_deal_code(
        &self,
        user_id: &str,
        code: &str,
        request: &InitiateUnlockRequest,
        listing: PropertyListing,
        replaces: Option<(UnlockId, u64)>,
        now: DateTime<Utc>,
    ) -> Result<InitiateUnlockOutcome> {
        let deal_code = self
            .ledger
            .validate_redemption(code, user_id, &request.property_id, now)
            .await?;
        let quote = self
            .rates
            .rate(PRICE_CURRENCY, &self.config.local_currency)
            .await;

        let record = UnlockRecord::redeemed(
            request.property_id.clone(),
            user_id.to_string(),
            request.payment_method,
            quote.rate,
            deal_code.id,
            now,
        );
        let usage = DealCodeUsage {
            deal_code_id: deal_code.id,
            unlock_id: record.unlock_id,
            property_id: record.property_id.clone(),
            user_id: user_id.to_string(),
            used_at: now,
        };

        let unlock = match self
            .repository
            .redeem(Redemption {
                unlock: record,
                replaces,
                usage,
            })
            .await?
        {
            RedemptionOutcome::Redeemed { unlock, code } => {
                tracing::info!(
                    unlock_id = %unlock.unlock_id,
                    property_id = %unlock.property_id,
                    code = %code.code,
                    remaining_unlocks = code.remaining_unlocks,
                    "Unlock paid with deal code"
                );
                self.notify(completed_notification(&unlock)).await;
                unlock
            }
            RedemptionOutcome::AlreadyRedeemed { unlock } => unlock,
        };

        Ok(InitiateUnlockOutcome {
            unlock: self.summary(&unlock),
            resumed: false,
            property: Some(UnlockedProperty::from(listing)),
        })
    }

    async fn start_payment(
        &self,
        user_id: &str,
        request: InitiateUnlockRequest,
        listing: PropertyListing,
        replaces: Option<(UnlockId, u64)>,
        now: DateTime<Utc>,
    ) -> Result<InitiateUnlockOutcome> {
        let provider_raw = request
            .payment_provider
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| UnlockError::ValidationError("payment_provider is required".to_string()))?;
        let provider = ProviderCode::new(provider_raw);
        let gateway = self
            .gateways
            .resolve(&provider)
            .ok_or_else(|| UnlockError::UnsupportedProvider(provider.to_string()))?;
        gateway.preflight(&provider, request.phone_number.as_deref())?;

        let guest = self
            .guests
            .guest(user_id)
            .await?
            .ok_or_else(|| UnlockError::GuestNotFound(user_id.to_string()))?;

        let rate = self
            .rates
            .rate(PRICE_CURRENCY, &self.config.local_currency)
            .await;
        let quote = calculate_fee(&listing, request.payment_method, rate.rate, &self.config.fees)?;
        if let Some(client_amount) = request.client_amount
            && client_amount != quote.amount_local.value()
        {
            tracing::debug!(%client_amount, server_amount = %quote.amount_local, "Ignoring client-side amount");
        }

        let record = UnlockRecord::pending(
            NewUnlock {
                property_id: request.property_id.clone(),
                user_id: user_id.to_string(),
                payment_method: request.payment_method,
                amount_local: quote.amount_local,
                amount_usd: quote.amount_usd,
                exchange_rate: quote.exchange_rate,
                provider,
            },
            now,
        );

        let stored = match replaces {
            Some(previous) => match self.repository.replace_unlock(previous, record.clone()).await {
                Ok(true) => Ok(()),
                Ok(false) => Err(UnlockError::Conflict(format!(
                    "unlock {} changed while being replaced",
                    previous.0
                ))),
                Err(e) => Err(e),
            },
            None => self.repository.insert_unlock(record.clone()).await,
        };
        match stored {
            Ok(()) => {}
            Err(UnlockError::Conflict(reason)) => {
                // Lost the race for the (user, property) slot.
                return match self.repository.find_unlock(user_id, &request.property_id).await? {
                    Some(winner) if winner.status.is_open() => Ok(self.resumed(winner)),
                    Some(winner) if winner.is_completed() => Err(UnlockError::AlreadyUnlocked {
                        property_id: winner.property_id,
                    }),
                    _ => Err(UnlockError::Conflict(reason)),
                };
            }
            Err(e) => return Err(e),
        }

        tracing::info!(
            unlock_id = %record.unlock_id,
            reference = %record.transaction_reference,
            method = %record.payment_method,
            amount_local = %record.amount_local,
            amount_usd = %record.amount_usd,
            rate = %record.exchange_rate,
            provider = %record.provider,
            "Unlock payment initiated"
        );

        let charge = ChargeRequest {
            unlock_id: record.unlock_id,
            reference: record.transaction_reference.clone(),
            provider: record.provider.clone(),
            payment_method: record.payment_method,
            property_id: record.property_id.clone(),
            property_title: listing.title.clone(),
            amount_local: record.amount_local,
            amount_usd: record.amount_usd,
            exchange_rate: record.exchange_rate,
            currency: self.config.local_currency.clone(),
            guest,
            payer_phone: request.phone_number,
        };
        let unlock = self.dispatch(gateway, &charge, record).await?;

        let property = unlock
            .is_completed()
            .then(|| UnlockedProperty::from(listing));
        Ok(InitiateUnlockOutcome {
            unlock: self.summary(&unlock),
            resumed: false,
            property,
        })
    }

    /// Hands the charge to the rail and records what came back.
    ///
    /// A timeout leaves the record PENDING, since the provider may have taken
    /// the money; any other rail failure marks it FAILED so the guest can retry.
    async fn dispatch(
        &self,
        gateway: &dyn PaymentGateway,
        charge: &ChargeRequest,
        record: UnlockRecord,
    ) -> Result<UnlockRecord> {
        match gateway.dispatch(charge).await {
            Ok(receipt) => {
                let now = Utc::now();
                let (unlock, transition) = self
                    .update_with(record.unlock_id, |r| {
                        r.record_dispatch(receipt.provider_reference.clone(), receipt.payment_url.clone(), now);
                        match receipt.status {
                            Some(status) => r.apply_gateway_status(status, now),
                            None => Ok(Transition::Unchanged),
                        }
                    })
                    .await?;
                tracing::info!(
                    unlock_id = %unlock.unlock_id,
                    gateway = gateway.name(),
                    reference = %unlock.transaction_reference,
                    status = %unlock.kind(),
                    "Payment dispatched"
                );
                if let Transition::Changed {
                    to: StatusKind::Completed,
                    ..
                } = transition
                {
                    self.notify(completed_notification(&unlock)).await;
                }
                Ok(unlock)
            }
            Err(source) if source.is_indeterminate() => {
                tracing::warn!(
                    unlock_id = %record.unlock_id,
                    reference = %record.transaction_reference,
                    gateway = gateway.name(),
                    error = %source,
                    "Payment dispatch outcome unknown, left pending for reconciliation"
                );
                Err(UnlockError::GatewayDispatchFailed {
                    reference: record.transaction_reference,
                    status: StatusKind::Pending,
                    source,
                })
            }
            Err(source) => {
                let now = Utc::now();
                let reason = source.to_string();
                let status = match self
                    .update_with(record.unlock_id, |r| {
                        if r.status.is_open() {
                            r.mark_failed(reason.clone(), now)
                        } else {
                            Ok(Transition::Unchanged)
                        }
                    })
                    .await
                {
                    Ok((unlock, _)) => unlock.kind(),
                    Err(e) => {
                        tracing::error!(unlock_id = %record.unlock_id, error = %e, "Could not record failed dispatch");
                        record.kind()
                    }
                };
                tracing::warn!(
                    unlock_id = %record.unlock_id,
                    reference = %record.transaction_reference,
                    gateway = gateway.name(),
                    error = %source,
                    "Payment dispatch failed"
                );
                Err(UnlockError::GatewayDispatchFailed {
                    reference: record.transaction_reference,
                    status,
                    source,
                })
            }
        }
    }

    /// Applies a provider-reported status to the unlock carrying `reference`.
    ///
    /// Replays are harmless: a status the record already reflects is reported
    /// as `Duplicate`, and a report that would break the state machine (for
    /// instance FAILED after COMPLETED) is logged and `Ignored`.
    pub async fn process_payment_callback(
        &self,
        reference: &str,
        reported: GatewayStatus,
    ) -> Result<CallbackOutcome> {
        let Some(record) = self.repository.find_by_reference(reference).await? else {
            tracing::warn!(reference, status = ?reported, "Callback for unknown reference");
            return Ok(CallbackOutcome::NotFound);
        };

        let now = Utc::now();
        match self
            .update_with(record.unlock_id, |r| r.apply_gateway_status(reported, now))
            .await
        {
            Ok((unlock, Transition::Changed { from, to })) => {
                tracing::info!(unlock_id = %unlock.unlock_id, reference, %from, %to, "Payment status updated");
                if to == StatusKind::Completed {
                    self.notify(completed_notification(&unlock)).await;
                }
                Ok(CallbackOutcome::Applied {
                    unlock_id: unlock.unlock_id,
                    from,
                    to,
                })
            }
            Ok((unlock, Transition::Unchanged)) => {
                tracing::debug!(unlock_id = %unlock.unlock_id, reference, status = %unlock.kind(), "Duplicate payment callback");
                Ok(CallbackOutcome::Duplicate {
                    unlock_id: unlock.unlock_id,
                    status: unlock.kind(),
                })
            }
            Err(UnlockError::InvalidTransition { from, to }) => {
                tracing::warn!(unlock_id = %record.unlock_id, reference, %from, %to, "Out-of-order payment callback ignored");
                Ok(CallbackOutcome::Ignored {
                    unlock_id: record.unlock_id,
                    status: from,
                    reason: format!("illegal transition from {from} to {to}"),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Asks the rail for the authoritative status of an open unlock and
    /// applies it like a callback.
    ///
    /// A rail that has no record of the charge confirms it never went
    /// through, so the unlock is marked FAILED and the guest may retry.
    pub async fn reconcile_payment(&self, reference: &str) -> Result<CallbackOutcome> {
        let Some(record) = self.repository.find_by_reference(reference).await? else {
            return Ok(CallbackOutcome::NotFound);
        };
        if !record.status.is_open() {
            return Ok(CallbackOutcome::Duplicate {
                unlock_id: record.unlock_id,
                status: record.kind(),
            });
        }

        let gateway = self
            .gateways
            .resolve(&record.provider)
            .ok_or_else(|| UnlockError::UnsupportedProvider(record.provider.to_string()))?;

        match gateway.fetch_status(reference).await {
            Ok(Some(status)) => self.process_payment_callback(reference, status).await,
            Ok(None) => {
                let now = Utc::now();
                let (unlock, transition) = self
                    .update_with(record.unlock_id, |r| {
                        if r.status.is_open() {
                            r.mark_failed("provider has no record of the charge", now)
                        } else {
                            Ok(Transition::Unchanged)
                        }
                    })
                    .await?;
                tracing::info!(unlock_id = %unlock.unlock_id, reference, "Unknown to provider, marked failed");
                Ok(match transition {
                    Transition::Changed { from, to } => CallbackOutcome::Applied {
                        unlock_id: unlock.unlock_id,
                        from,
                        to,
                    },
                    Transition::Unchanged => CallbackOutcome::Duplicate {
                        unlock_id: unlock.unlock_id,
                        status: unlock.kind(),
                    },
                })
            }
            Err(source) => Err(UnlockError::GatewayDispatchFailed {
                reference: reference.to_string(),
                status: record.kind(),
                source,
            }),
        }
    }

    /// Guest-triggered status poll ("I paid, why is it still pending?").
    pub async fn reconcile_unlock(&self, user_id: &str, unlock_id: UnlockId) -> Result<CallbackOutcome> {
        let record = self.owned_unlock(user_id, unlock_id).await?;
        self.reconcile_payment(&record.transaction_reference).await
    }

    /// Reconciles every open unlock. Individual failures are logged and skipped.
    pub async fn reconcile_open_payments(&self) -> Result<Vec<(String, CallbackOutcome)>> {
        let mut outcomes = Vec::new();
        for record in self.repository.open_unlocks().await? {
            let reference = record.transaction_reference;
            match self.reconcile_payment(&reference).await {
                Ok(outcome) => outcomes.push((reference, outcome)),
                Err(e) => {
                    tracing::warn!(reference = %reference, error = %e, "Reconciliation failed");
                }
            }
        }
        Ok(outcomes)
    }

    /// Where `user_id` stands with a property. Address and host contact are
    /// only revealed once the unlock is COMPLETED.
    pub async fn get_unlock_status(&self, user_id: &str, property_id: &str) -> Result<UnlockStatusView> {
        match self.repository.find_unlock(user_id, property_id).await? {
            None => Ok(UnlockStatusView::NotUnlocked {
                property_id: property_id.to_string(),
            }),
            Some(record) if record.is_completed() => {
                let listing = self.listing(property_id).await?;
                Ok(UnlockStatusView::Unlocked {
                    unlock: self.summary(&record),
                    property: UnlockedProperty::from(listing),
                })
            }
            Some(record) => Ok(UnlockStatusView::Locked {
                unlock: self.summary(&record),
            }),
        }
    }

    pub async fn list_unlocks(&self, user_id: &str) -> Result<Vec<UnlockSummary>> {
        let records = self.repository.unlocks_for_user(user_id).await?;
        Ok(records.iter().map(|r| self.summary(r)).collect())
    }

    // -- shared helpers ------------------------------------------------------

    pub(super) async fn listing(&self, property_id: &str) -> Result<PropertyListing> {
        self.catalog
            .property(property_id)
            .await?
            .ok_or_else(|| UnlockError::PropertyNotFound(property_id.to_string()))
    }

    /// Loads an unlock on behalf of `user_id`, refusing other users' records.
    pub(super) async fn owned_unlock(&self, user_id: &str, unlock_id: UnlockId) -> Result<UnlockRecord> {
        let record = self
            .repository
            .get_unlock(unlock_id)
            .await?
            .ok_or_else(|| UnlockError::UnlockNotFound(unlock_id.to_string()))?;
        if record.user_id != user_id {
            return Err(UnlockError::Unauthorized);
        }
        Ok(record)
    }

    /// Read-modify-write with a revision check, retried on lost races.
    ///
    /// `mutate` runs against a fresh copy on every attempt; when it leaves the
    /// revision untouched nothing is written.
    pub(super) async fn update_with<F>(
        &self,
        unlock_id: UnlockId,
        mut mutate: F,
    ) -> Result<(UnlockRecord, Transition)>
    where
        F: FnMut(&mut UnlockRecord) -> Result<Transition> + Send,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let current = self
                .repository
                .get_unlock(unlock_id)
                .await?
                .ok_or_else(|| UnlockError::UnlockNotFound(unlock_id.to_string()))?;
            let base = current.revision;
            let mut next = current;
            let transition = mutate(&mut next)?;
            if next.revision == base {
                return Ok((next, transition));
            }
            if self.repository.update_unlock(next.clone(), base).await? {
                return Ok((next, transition));
            }
            tracing::debug!(%unlock_id, attempt, "Concurrent unlock update, retrying");
        }
        Err(UnlockError::Conflict(format!(
            "unlock {unlock_id} is being updated concurrently"
        )))
    }

    pub(super) fn summary(&self, record: &UnlockRecord) -> UnlockSummary {
        UnlockSummary::from_record(record, &self.config.local_currency)
    }

    fn resumed(&self, record: UnlockRecord) -> InitiateUnlockOutcome {
        InitiateUnlockOutcome {
            unlock: self.summary(&record),
            resumed: true,
            property: None,
        }
    }

    /// Delivery is best effort; a failing notifier never fails the flow.
    pub(super) async fn notify(&self, notification: Notification) {
        let audience = notification.audience();
        if let Err(e) = self.notifier.notify(notification).await {
            tracing::warn!(?audience, error = %e, "Notification delivery failed");
        }
    }
}

fn completed_notification(unlock: &UnlockRecord) -> Notification {
    Notification::UnlockCompleted {
        unlock_id: unlock.unlock_id,
        property_id: unlock.property_id.clone(),
        user_id: unlock.user_id.clone(),
        payment_method: unlock.payment_method,
        amount_local: unlock.amount_local,
        provider: unlock.provider.to_string(),
    }
}
