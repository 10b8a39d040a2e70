use std::sync::Arc;

use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::models::{Appointment, AppointmentStatus, BusinessDate, CompletionOutcome, DailyCounter, QueueEvent, TokenCode};
use crate::services::counter::CounterStore;
use crate::services::events::QueueEventPublisher;
use crate::services::ledger::AppointmentLedger;
use crate::services::lifecycle::ensure_completable;
use crate::TokenQueueError;

/// New "now serving" value after token `completed` finishes.
///
/// A completion behind the display (`current > completed`) changes nothing.
/// Otherwise the pointer jumps to the next booked and paid token; failing
/// that, to `completed + 1` while issued numbers remain; failing that, it
/// rests on `completed`.
pub fn next_current(current: u32, last_issued: u32, completed: u32, next_booked: Option<u32>) -> u32 {
    if current > completed {
        return current;
    }

    match next_booked {
        Some(next) => next,
        None if completed < last_issued => completed + 1,
        None => completed,
    }
}

/// Smallest sequence above `completed` among `tokens` issued for `date`.
pub fn pick_next_booked<'a, I>(tokens: I, date: BusinessDate, completed: u32) -> Option<u32>
where
    I: IntoIterator<Item = &'a str>,
{
    tokens
        .into_iter()
        .filter_map(|token| token.parse::<TokenCode>().ok())
        .filter(|code| code.date == date && code.sequence > completed)
        .map(|code| code.sequence)
        .min()
}

pub struct CompletionAdvancer {
    counters: Arc<dyn CounterStore>,
    ledger: Arc<dyn AppointmentLedger>,
    events: QueueEventPublisher,
}

impl CompletionAdvancer {
    pub fn new(
        counters: Arc<dyn CounterStore>,
        ledger: Arc<dyn AppointmentLedger>,
        events: QueueEventPublisher,
    ) -> Self {
        Self { counters, ledger, events }
    }

    /// Doctor marks a consultation done by its token code.
    #[instrument(skip(self))]
    pub async fn complete_token(&self, doctor_id: Uuid, token: &str) -> Result<CompletionOutcome, TokenQueueError> {
        let appointment = self
            .ledger
            .find_by_token(token)
            .await?
            .filter(|a| a.doctor_id == doctor_id)
            .ok_or_else(|| TokenQueueError::TokenNotFound(token.trim().to_string()))?;

        self.complete(appointment).await
    }

    /// Doctor marks a consultation done by appointment id.
    #[instrument(skip(self))]
    pub async fn complete_appointment(
        &self,
        doctor_id: Uuid,
        appointment_id: Uuid,
    ) -> Result<CompletionOutcome, TokenQueueError> {
        let appointment = self
            .ledger
            .get(appointment_id)
            .await?
            .filter(|a| a.doctor_id == doctor_id)
            .ok_or(TokenQueueError::AppointmentNotFound(appointment_id))?;

        self.complete(appointment).await
    }

    async fn complete(&self, appointment: Appointment) -> Result<CompletionOutcome, TokenQueueError> {
        ensure_completable(&appointment)?;
        let code = appointment.token_code()?;

        let appointment = if appointment.status == AppointmentStatus::Completed {
            debug!("Appointment {} already completed, re-running advance", appointment.id);
            appointment
        } else {
            let completed = self.ledger.mark_completed(appointment.id).await?;
            info!("Consultation completed for token {}", completed.token);
            self.events.publish(QueueEvent::ConsultationCompleted {
                appointment_id: completed.id,
                doctor_id: completed.doctor_id,
                token: completed.token.clone(),
            });
            completed
        };

        let counter = self.advance_on_complete(code.date, code.sequence).await?;

        Ok(CompletionOutcome {
            appointment,
            token_counter: counter.view(),
        })
    }

    /// Recompute "now serving" for `date` after sequence `completed` finished.
    #[instrument(skip(self))]
    pub async fn advance_on_complete(&self, date: BusinessDate, completed: u32) -> Result<DailyCounter, TokenQueueError> {
        let tokens = self.ledger.booked_paid_tokens(date).await?;
        let next_booked = pick_next_booked(tokens.iter().map(String::as_str), date, completed);

        let transition = self.counters.apply_completion(date, completed, next_booked).await?;

        if transition.moved() {
            info!(
                "Now serving {} for {} (was {}, completed {})",
                transition.counter.current,
                date.key(),
                transition.previous_current,
                completed
            );
            self.events.publish(QueueEvent::CurrentAdvanced {
                date: date.key(),
                from: transition.previous_current,
                to: transition.counter.current,
            });
        } else {
            debug!(
                "Display for {} stays at {} after completing {}",
                date.key(),
                transition.counter.current,
                completed
            );
        }

        Ok(transition.counter)
    }
}
