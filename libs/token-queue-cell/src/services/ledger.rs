use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{Appointment, AppointmentStatus, BusinessDate, PaymentStatus};
use crate::services::lifecycle;
use crate::TokenQueueError;

/// Boundary to the booking system that owns appointment rows. Conditional
/// writes (`assign_token`, status moves) are checked by the ledger itself so
/// that concurrent callers cannot both succeed.
#[async_trait]
pub trait AppointmentLedger: Send + Sync {
    async fn insert(&self, appointment: Appointment) -> Result<Appointment, TokenQueueError>;

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, TokenQueueError>;

    async fn find_by_token(&self, token: &str) -> Result<Option<Appointment>, TokenQueueError>;

    /// Tokens of `booked`/`paid` appointments on `date` that carry that
    /// date's `OPD-YYYYMMDD-` prefix.
    async fn booked_paid_tokens(&self, date: BusinessDate) -> Result<Vec<String>, TokenQueueError>;

    /// `pending_payment/pending -> booked/paid`. Returns the row unchanged
    /// when it is already booked and paid.
    async fn record_payment(&self, id: Uuid) -> Result<Appointment, TokenQueueError>;

    /// Writes `token` only when the row has none. Returns whether it wrote.
    async fn assign_token(&self, id: Uuid, token: &str) -> Result<bool, TokenQueueError>;

    async fn mark_completed(&self, id: Uuid) -> Result<Appointment, TokenQueueError>;

    async fn cancel(&self, id: Uuid) -> Result<Appointment, TokenQueueError>;
}

#[derive(Default)]
pub struct InMemoryAppointmentLedger {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update<F>(&self, id: Uuid, apply: F) -> Result<Appointment, TokenQueueError>
    where
        F: FnOnce(&mut Appointment) -> Result<(), TokenQueueError> + Send,
    {
        let mut appointments = self.appointments.write().await;
        let appointment = appointments
            .get_mut(&id)
            .ok_or(TokenQueueError::AppointmentNotFound(id))?;

        let mut draft = appointment.clone();
        apply(&mut draft)?;
        if draft != *appointment {
            draft.updated_at = Utc::now();
            *appointment = draft;
        }
        Ok(appointment.clone())
    }
}

#[async_trait]
impl AppointmentLedger for InMemoryAppointmentLedger {
    async fn insert(&self, appointment: Appointment) -> Result<Appointment, TokenQueueError> {
        let mut appointments = self.appointments.write().await;
        if appointments.contains_key(&appointment.id) {
            return Err(TokenQueueError::ValidationError(format!(
                "appointment {} already exists",
                appointment.id
            )));
        }
        appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, TokenQueueError> {
        Ok(self.appointments.read().await.get(&id).cloned())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Appointment>, TokenQueueError> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(None);
        }
        Ok(self
            .appointments
            .read()
            .await
            .values()
            .find(|a| a.token == token)
            .cloned())
    }

    async fn booked_paid_tokens(&self, date: BusinessDate) -> Result<Vec<String>, TokenQueueError> {
        let prefix = date.token_prefix();
        Ok(self
            .appointments
            .read()
            .await
            .values()
            .filter(|a| a.date == date && a.is_booked_and_paid() && a.token.starts_with(&prefix))
            .map(|a| a.token.clone())
            .collect())
    }

    async fn record_payment(&self, id: Uuid) -> Result<Appointment, TokenQueueError> {
        self.update(id, lifecycle::apply_payment).await
    }

    async fn assign_token(&self, id: Uuid, token: &str) -> Result<bool, TokenQueueError> {
        let mut appointments = self.appointments.write().await;
        let appointment = appointments
            .get_mut(&id)
            .ok_or(TokenQueueError::AppointmentNotFound(id))?;

        if appointment.has_token() {
            return Ok(false);
        }
        appointment.token = token.to_string();
        appointment.updated_at = Utc::now();
        Ok(true)
    }

    async fn mark_completed(&self, id: Uuid) -> Result<Appointment, TokenQueueError> {
        self.update(id, |appointment| {
            lifecycle::transition(appointment, AppointmentStatus::Completed)?;
            if appointment.payment_status != PaymentStatus::Paid {
                return Err(TokenQueueError::PaymentNotCompleted);
            }
            Ok(())
        })
        .await
    }

    async fn cancel(&self, id: Uuid) -> Result<Appointment, TokenQueueError> {
        self.update(id, |appointment| lifecycle::transition(appointment, AppointmentStatus::Cancelled))
            .await
    }
}
