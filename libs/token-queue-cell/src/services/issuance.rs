use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{Appointment, BusinessDate, QueueEvent, TokenCode};
use crate::services::counter::CounterStore;
use crate::services::events::QueueEventPublisher;
use crate::services::ledger::AppointmentLedger;
use crate::TokenQueueError;

pub struct TokenIssuer {
    counters: Arc<dyn CounterStore>,
    ledger: Arc<dyn AppointmentLedger>,
    events: QueueEventPublisher,
}

impl TokenIssuer {
    pub fn new(
        counters: Arc<dyn CounterStore>,
        ledger: Arc<dyn AppointmentLedger>,
        events: QueueEventPublisher,
    ) -> Self {
        Self { counters, ledger, events }
    }

    /// Allocate the next sequence for `date`. Unguarded: every call burns a
    /// number, so callers go through [`TokenIssuer::confirm_payment`].
    pub async fn issue_token(&self, date: BusinessDate) -> Result<TokenCode, TokenQueueError> {
        let counter = self.counters.increment_issued(date).await?;
        Ok(TokenCode::new(date, counter.last_issued))
    }

    /// Called once the payment signature has been verified. Books the
    /// appointment and assigns a token unless it already has one, so a
    /// retried verification returns the first token untouched.
    #[instrument(skip(self))]
    pub async fn confirm_payment(&self, appointment_id: Uuid) -> Result<Appointment, TokenQueueError> {
        let appointment = self.ledger.record_payment(appointment_id).await?;

        if appointment.has_token() {
            info!(
                "Appointment {} already holds token {}, not issuing again",
                appointment_id, appointment.token
            );
            return Ok(appointment);
        }

        let code = self.issue_token(appointment.date).await?;
        let token = code.to_string();

        if self.ledger.assign_token(appointment_id, &token).await? {
            info!("Issued token {} to appointment {}", token, appointment_id);
            self.events.publish(QueueEvent::TokenIssued {
                appointment_id,
                token: token.clone(),
            });
            return Ok(Appointment { token, ..appointment });
        }

        // A concurrent confirmation won the compare-and-set; its token stands
        // and this sequence number stays burned.
        warn!(
            "Appointment {} was tokenised concurrently, discarding sequence {}",
            appointment_id, code.sequence
        );
        self.ledger
            .get(appointment_id)
            .await?
            .ok_or(TokenQueueError::AppointmentNotFound(appointment_id))
    }
}
