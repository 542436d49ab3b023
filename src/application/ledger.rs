use crate::domain::deal_code::{DealCode, DealCodeRejection, DealCodeUsage, generate_code, normalize_code};
use crate::domain::ports::RepositoryRef;
use crate::error::{Result, UnlockError};
use chrono::{DateTime, Duration, Utc};

/// Attempts at drawing an unused code before giving up.
const ISSUE_ATTEMPTS: usize = 5;

/// Issues, validates and reports on deal codes.
///
/// Consumption is not exposed here: a code is only decremented by the
/// repository's atomic redemption, after the dependent unlock is completed.
pub struct DealCodeLedger {
    repository: RepositoryRef,
    validity: Duration,
}

impl DealCodeLedger {
    pub fn new(repository: RepositoryRef, validity: Duration) -> Self {
        Self {
            repository,
            validity,
        }
    }

    /// Looks the code up and checks it for `user_id`, reporting the first
    /// failing reason (existence, ownership, active, remaining, expiry).
    pub async fn validate(&self, code: &str, user_id: &str, now: DateTime<Utc>) -> Result<DealCode> {
        let deal_code = self.lookup(code).await?;
        deal_code
            .check(user_id, now)
            .map_err(UnlockError::InvalidDealCode)?;
        Ok(deal_code)
    }

    /// Like [`DealCodeLedger::validate`], and also refuses to pay for the
    /// property the code was issued on.
    pub async fn validate_redemption(
        &self,
        code: &str,
        user_id: &str,
        property_id: &str,
        now: DateTime<Utc>,
    ) -> Result<DealCode> {
        let deal_code = self.lookup(code).await?;
        deal_code
            .check_redemption(user_id, property_id, now)
            .map_err(UnlockError::InvalidDealCode)?;
        Ok(deal_code)
    }

    async fn lookup(&self, code: &str) -> Result<DealCode> {
        self.repository
            .find_deal_code(&normalize_code(code))
            .await?
            .ok_or(UnlockError::InvalidDealCode(DealCodeRejection::NotFound))
    }

    /// Builds a fresh code that does not collide with an existing one.
    ///
    /// The code is returned unsaved so callers can persist it together with
    /// the state change that earned it.
    pub async fn prepare(&self, user_id: &str, source_property_id: &str, now: DateTime<Utc>) -> Result<DealCode> {
        for _ in 0..ISSUE_ATTEMPTS {
            let candidate = generate_code();
            if self.repository.find_deal_code(&candidate).await?.is_none() {
                return Ok(DealCode::issue(
                    candidate,
                    user_id.to_string(),
                    source_property_id.to_string(),
                    now,
                    self.validity,
                ));
            }
        }
        Err(UnlockError::Conflict(
            "could not generate a unique deal code".to_string(),
        ))
    }

    /// Issues and stores a code on its own.
    pub async fn issue(&self, user_id: &str, source_property_id: &str, now: DateTime<Utc>) -> Result<DealCode> {
        let code = self.prepare(user_id, source_property_id, now).await?;
        self.repository.insert_deal_code(code.clone()).await?;
        tracing::info!(user_id, source_property_id, code = %code.code, expires_at = %code.expires_at, "Deal code issued");
        Ok(code)
    }

    pub async fn codes_for_user(&self, user_id: &str) -> Result<Vec<DealCode>> {
        self.repository.deal_codes_for_user(user_id).await
    }

    /// Redemption history of a code, visible to its owner only.
    pub async fn usage_history(&self, code: &str, user_id: &str) -> Result<Vec<DealCodeUsage>> {
        let deal_code = self.lookup(code).await?;
        if deal_code.user_id != user_id {
            return Err(UnlockError::Unauthorized);
        }
        self.repository.deal_code_usages(deal_code.id).await
    }
}
