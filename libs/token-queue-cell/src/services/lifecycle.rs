use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_models::auth::User;

use crate::models::{Appointment, AppointmentStatus, PaymentStatus, QueueEvent};
use crate::services::events::QueueEventPublisher;
use crate::services::ledger::AppointmentLedger;
use crate::TokenQueueError;

/// Move `appointment` to `target`, rejecting edges the lifecycle does not
/// allow. Staying in the same status is a no-op.
pub fn transition(appointment: &mut Appointment, target: AppointmentStatus) -> Result<(), TokenQueueError> {
    if appointment.status == target {
        return Ok(());
    }

    if !appointment.status.can_transition_to(&target) {
        warn!(
            "Invalid status transition attempted for {}: {} -> {}",
            appointment.id, appointment.status, target
        );
        return Err(TokenQueueError::InvalidStatusTransition {
            from: appointment.status,
            to: target,
        });
    }

    debug!("Appointment {} moved {} -> {}", appointment.id, appointment.status, target);
    appointment.status = target;
    Ok(())
}

/// Successful payment verification: `pending_payment/pending -> booked/paid`.
pub fn apply_payment(appointment: &mut Appointment) -> Result<(), TokenQueueError> {
    if appointment.is_booked_and_paid() {
        return Ok(());
    }
    if appointment.status == AppointmentStatus::Booked {
        // booked without a paid flag never happens through this cell
        return Err(TokenQueueError::InvalidStatusTransition {
            from: appointment.status,
            to: AppointmentStatus::Booked,
        });
    }

    transition(appointment, AppointmentStatus::Booked)?;
    appointment.payment_status = PaymentStatus::Paid;
    Ok(())
}

/// Checks run before a consultation may be marked completed. Nothing is
/// written when any of them fails.
pub fn ensure_completable(appointment: &Appointment) -> Result<(), TokenQueueError> {
    if !appointment.has_token() {
        return Err(TokenQueueError::MissingToken);
    }
    if appointment.status == AppointmentStatus::Cancelled {
        return Err(TokenQueueError::AppointmentCancelled);
    }
    if appointment.payment_status != PaymentStatus::Paid {
        return Err(TokenQueueError::PaymentNotCompleted);
    }
    if appointment.status == AppointmentStatus::PendingPayment {
        return Err(TokenQueueError::InvalidStatusTransition {
            from: appointment.status,
            to: AppointmentStatus::Completed,
        });
    }
    Ok(())
}

pub struct AppointmentLifecycleService {
    ledger: Arc<dyn AppointmentLedger>,
    events: QueueEventPublisher,
}

impl AppointmentLifecycleService {
    pub fn new(ledger: Arc<dyn AppointmentLedger>, events: QueueEventPublisher) -> Self {
        Self { ledger, events }
    }

    /// Cancel on behalf of the owning patient or an admin. An assigned
    /// token stays on the row; the advancer skips it.
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn cancel(&self, actor: &User, appointment_id: Uuid) -> Result<Appointment, TokenQueueError> {
        let appointment = self
            .ledger
            .get(appointment_id)
            .await?
            .ok_or(TokenQueueError::AppointmentNotFound(appointment_id))?;

        let is_owner = appointment.patient_id.to_string() == actor.id;
        if !is_owner && !actor.is_admin() {
            return Err(TokenQueueError::Forbidden(
                "Only the patient or an admin may cancel this appointment".to_string(),
            ));
        }

        let cancelled = self.ledger.cancel(appointment_id).await?;
        info!("Appointment {} cancelled", appointment_id);

        self.events.publish(QueueEvent::AppointmentCancelled {
            appointment_id,
            token: cancelled.has_token().then(|| cancelled.token.clone()),
        });

        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    use crate::models::BusinessDate;

    fn appointment() -> Appointment {
        let date = BusinessDate::from_ymd(2025, 2, 1).unwrap();
        Appointment::pending(Uuid::new_v4(), Uuid::new_v4(), date, "09:00")
    }

    #[test]
    fn payment_books_pending_appointment() {
        let mut appt = appointment();
        apply_payment(&mut appt).unwrap();
        assert!(appt.is_booked_and_paid());

        // second verification is harmless
        apply_payment(&mut appt).unwrap();
        assert!(appt.is_booked_and_paid());
    }

    #[test]
    fn payment_cannot_revive_cancelled_appointment() {
        let mut appt = appointment();
        transition(&mut appt, AppointmentStatus::Cancelled).unwrap();
        assert_matches!(
            apply_payment(&mut appt),
            Err(TokenQueueError::InvalidStatusTransition { from: AppointmentStatus::Cancelled, .. })
        );
    }

    #[test]
    fn completion_checks_run_in_order() {
        let mut appt = appointment();
        assert_matches!(ensure_completable(&appt), Err(TokenQueueError::MissingToken));

        appt.token = "OPD-20250201-0001".to_string();
        assert_matches!(ensure_completable(&appt), Err(TokenQueueError::PaymentNotCompleted));

        appt.status = AppointmentStatus::Cancelled;
        assert_matches!(ensure_completable(&appt), Err(TokenQueueError::AppointmentCancelled));

        appt.status = AppointmentStatus::Booked;
        appt.payment_status = PaymentStatus::Paid;
        assert!(ensure_completable(&appt).is_ok());
    }

    #[test]
    fn refunded_booking_cannot_be_completed() {
        let mut appt = appointment();
        apply_payment(&mut appt).unwrap();
        appt.token = "OPD-20250201-0003".to_string();
        appt.payment_status = PaymentStatus::Refunded;

        assert_matches!(ensure_completable(&appt), Err(TokenQueueError::PaymentNotCompleted));
    }

    #[test]
    fn terminal_states_do_not_move() {
        let mut appt = appointment();
        apply_payment(&mut appt).unwrap();
        transition(&mut appt, AppointmentStatus::Completed).unwrap();
        assert_matches!(
            transition(&mut appt, AppointmentStatus::Cancelled),
            Err(TokenQueueError::InvalidStatusTransition { .. })
        );
    }
}
