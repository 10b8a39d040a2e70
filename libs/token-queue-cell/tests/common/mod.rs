#![allow(dead_code)]

use std::sync::Arc;

use uuid::Uuid;

use shared_utils::test_utils::TestConfig;
use token_queue_cell::*;

/// In-memory wiring of the whole cell plus handles to its stores.
pub struct QueueHarness {
    pub state: TokenQueueState,
    pub counters: Arc<InMemoryCounterStore>,
    pub ledger: Arc<InMemoryAppointmentLedger>,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
}

impl QueueHarness {
    pub fn new() -> Self {
        let counters = Arc::new(InMemoryCounterStore::new());
        let ledger = Arc::new(InMemoryAppointmentLedger::new());
        let state = TokenQueueState::new(TestConfig::default().to_arc(), counters.clone(), ledger.clone());

        Self {
            state,
            counters,
            ledger,
            doctor_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
        }
    }

    pub async fn pending(&self, date: BusinessDate) -> Appointment {
        let appointment = Appointment::pending(self.patient_id, self.doctor_id, date, "10:00");
        self.ledger.insert(appointment).await.unwrap()
    }

    /// Pending appointment pushed through payment confirmation.
    pub async fn book(&self, date: BusinessDate) -> Appointment {
        let appointment = self.pending(date).await;
        self.state.issuer.confirm_payment(appointment.id).await.unwrap()
    }

    /// `count` booked appointments holding tokens 1..=count, in order.
    pub async fn book_many(&self, date: BusinessDate, count: usize) -> Vec<Appointment> {
        let mut booked = Vec::with_capacity(count);
        for _ in 0..count {
            booked.push(self.book(date).await);
        }
        booked
    }

    pub async fn counter(&self, date: BusinessDate) -> DailyCounter {
        self.state.board.read_current(date).await.unwrap()
    }

    pub async fn complete(&self, appointment: &Appointment) -> CompletionOutcome {
        self.state
            .advancer
            .complete_token(self.doctor_id, &appointment.token)
            .await
            .unwrap()
    }
}

pub fn clinic_day() -> BusinessDate {
    BusinessDate::from_ymd(2025, 6, 10).unwrap()
}
