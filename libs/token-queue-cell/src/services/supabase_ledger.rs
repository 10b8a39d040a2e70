use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{Appointment, AppointmentStatus, BusinessDate, PaymentStatus, TokenCode};
use crate::services::ledger::AppointmentLedger;
use crate::services::lifecycle;
use crate::TokenQueueError;

const APPOINTMENTS_PATH: &str = "/rest/v1/appointments";
const RETURN_REPRESENTATION: &str = "return=representation";

#[derive(Debug, Deserialize)]
struct TokenRow {
    #[serde(default)]
    token: Option<String>,
}

/// Appointment rows in the `appointments` table behind PostgREST. Every
/// status move is a PATCH filtered on the expected prior state, so the row
/// only changes if nobody moved it first.
pub struct SupabaseAppointmentLedger {
    supabase: SupabaseClient,
}

impl SupabaseAppointmentLedger {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub fn with_client(supabase: SupabaseClient) -> Self {
        Self { supabase }
    }

    async fn fetch(&self, path: &str) -> Result<Option<Appointment>, TokenQueueError> {
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, path, None)
            .await
            .map_err(|e| TokenQueueError::StoreError(e.to_string()))?;

        first_row(rows)
    }

    /// Conditional PATCH; `None` when the filter matched no row.
    async fn patch_where(&self, filter: &str, body: Value) -> Result<Option<Appointment>, TokenQueueError> {
        let path = format!("{}?{}", APPOINTMENTS_PATH, filter);
        let rows: Vec<Value> = self
            .supabase
            .request_with_prefer(Method::PATCH, &path, Some(body), Some(RETURN_REPRESENTATION))
            .await
            .map_err(|e| TokenQueueError::StoreError(e.to_string()))?;

        first_row(rows)
    }

    /// A conditional write matched nothing. Reload the row and replay the
    /// rule locally so the caller gets the real reason; a row that already
    /// sits in the target state is returned as is.
    async fn explain_rejected<F>(&self, id: Uuid, rule: F) -> Result<Appointment, TokenQueueError>
    where
        F: FnOnce(&mut Appointment) -> Result<(), TokenQueueError> + Send,
    {
        let current = self.get(id).await?.ok_or(TokenQueueError::AppointmentNotFound(id))?;

        let mut replayed = current.clone();
        rule(&mut replayed)?;
        if replayed == current {
            return Ok(current);
        }

        warn!("Appointment {} changed between read and conditional update", id);
        Err(TokenQueueError::Conflict(format!(
            "Appointment {} was modified concurrently, retry",
            id
        )))
    }
}

fn first_row(rows: Vec<Value>) -> Result<Option<Appointment>, TokenQueueError> {
    match rows.into_iter().next() {
        Some(row) => Ok(Some(serde_json::from_value(row)?)),
        None => Ok(None),
    }
}

#[async_trait]
impl AppointmentLedger for SupabaseAppointmentLedger {
    async fn insert(&self, appointment: Appointment) -> Result<Appointment, TokenQueueError> {
        let body = serde_json::to_value(&appointment)?;
        let rows: Vec<Value> = self
            .supabase
            .request_with_prefer(Method::POST, APPOINTMENTS_PATH, Some(body), Some(RETURN_REPRESENTATION))
            .await
            .map_err(|e| TokenQueueError::StoreError(e.to_string()))?;

        first_row(rows)?.ok_or_else(|| TokenQueueError::StoreError("Failed to create appointment".to_string()))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, TokenQueueError> {
        debug!("Fetching appointment: {}", id);
        self.fetch(&format!("{}?id=eq.{}&limit=1", APPOINTMENTS_PATH, id)).await
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Appointment>, TokenQueueError> {
        // only well-formed codes reach the query string
        let token = token.trim();
        if token.parse::<TokenCode>().is_err() {
            return Ok(None);
        }
        self.fetch(&format!("{}?token=eq.{}&limit=1", APPOINTMENTS_PATH, token)).await
    }

    async fn booked_paid_tokens(&self, date: BusinessDate) -> Result<Vec<String>, TokenQueueError> {
        let path = format!(
            "{}?select=token&date=eq.{}&status=eq.{}&payment_status=eq.{}&token=like.{}*",
            APPOINTMENTS_PATH,
            date,
            AppointmentStatus::Booked.as_str(),
            PaymentStatus::Paid.as_str(),
            date.token_prefix()
        );
        let rows: Vec<TokenRow> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| TokenQueueError::StoreError(e.to_string()))?;

        Ok(rows.into_iter().filter_map(|row| row.token).collect())
    }

    async fn record_payment(&self, id: Uuid) -> Result<Appointment, TokenQueueError> {
        let filter = format!(
            "id=eq.{}&status=eq.{}",
            id,
            AppointmentStatus::PendingPayment.as_str()
        );
        let body = json!({
            "status": AppointmentStatus::Booked,
            "payment_status": PaymentStatus::Paid,
            "updated_at": Utc::now().to_rfc3339(),
        });

        match self.patch_where(&filter, body).await? {
            Some(appointment) => Ok(appointment),
            None => self.explain_rejected(id, lifecycle::apply_payment).await,
        }
    }

    async fn assign_token(&self, id: Uuid, token: &str) -> Result<bool, TokenQueueError> {
        // empty string and NULL both mean "no token yet"
        let filter = format!("id=eq.{}&or=(token.is.null,token.eq.)", id);
        let body = json!({
            "token": token,
            "updated_at": Utc::now().to_rfc3339(),
        });

        if self.patch_where(&filter, body).await?.is_some() {
            return Ok(true);
        }

        match self.get(id).await? {
            Some(_) => Ok(false),
            None => Err(TokenQueueError::AppointmentNotFound(id)),
        }
    }

    async fn mark_completed(&self, id: Uuid) -> Result<Appointment, TokenQueueError> {
        let filter = format!(
            "id=eq.{}&status=eq.{}&payment_status=eq.{}",
            id,
            AppointmentStatus::Booked.as_str(),
            PaymentStatus::Paid.as_str()
        );
        let body = json!({
            "status": AppointmentStatus::Completed,
            "updated_at": Utc::now().to_rfc3339(),
        });

        match self.patch_where(&filter, body).await? {
            Some(appointment) => Ok(appointment),
            None => {
                self.explain_rejected(id, |appointment| {
                    lifecycle::transition(appointment, AppointmentStatus::Completed)?;
                    if appointment.payment_status != PaymentStatus::Paid {
                        return Err(TokenQueueError::PaymentNotCompleted);
                    }
                    Ok(())
                })
                .await
            }
        }
    }

    async fn cancel(&self, id: Uuid) -> Result<Appointment, TokenQueueError> {
        let filter = format!(
            "id=eq.{}&status=in.({},{})",
            id,
            AppointmentStatus::PendingPayment.as_str(),
            AppointmentStatus::Booked.as_str()
        );
        let body = json!({
            "status": AppointmentStatus::Cancelled,
            "updated_at": Utc::now().to_rfc3339(),
        });

        match self.patch_where(&filter, body).await? {
            Some(appointment) => Ok(appointment),
            None => {
                self.explain_rejected(id, |appointment| {
                    lifecycle::transition(appointment, AppointmentStatus::Cancelled)
                })
                .await
            }
        }
    }
}
