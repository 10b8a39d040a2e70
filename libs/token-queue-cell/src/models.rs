use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::TokenQueueError;

pub const TOKEN_PREFIX: &str = "OPD";

// ==============================================================================
// BUSINESS DATE
// ==============================================================================

/// Calendar day a queue belongs to. Serialized as `YYYY-MM-DD`; the counter
/// key and the token code use the compact `YYYYMMDD` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BusinessDate(NaiveDate);

impl BusinessDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Self, TokenQueueError> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| TokenQueueError::InvalidDate(format!("{:04}-{:02}-{:02}", year, month, day)))
    }

    /// Accepts `YYYY-MM-DD` as well as the compact `YYYYMMDD` key.
    pub fn parse(input: &str) -> Result<Self, TokenQueueError> {
        let trimmed = input.trim();
        let format = if trimmed.len() == 8 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            "%Y%m%d"
        } else {
            "%Y-%m-%d"
        };

        NaiveDate::parse_from_str(trimmed, format)
            .map(Self)
            .map_err(|_| TokenQueueError::InvalidDate(trimmed.to_string()))
    }

    /// Today's date in a hospital whose clocks sit `offset_minutes` east of UTC.
    pub fn today(offset_minutes: i32) -> Self {
        let offset = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix());
        Self(Utc::now().with_timezone(&offset).date_naive())
    }

    pub fn key(&self) -> String {
        self.0.format("%Y%m%d").to_string()
    }

    pub fn as_naive(&self) -> NaiveDate {
        self.0
    }

    /// `OPD-YYYYMMDD-`, shared by every token issued on this date.
    pub fn token_prefix(&self) -> String {
        format!("{}-{}-", TOKEN_PREFIX, self.key())
    }
}

impl fmt::Display for BusinessDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl TryFrom<String> for BusinessDate {
    type Error = TokenQueueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BusinessDate> for String {
    fn from(date: BusinessDate) -> Self {
        date.to_string()
    }
}

// ==============================================================================
// TOKEN CODE
// ==============================================================================

/// `OPD-YYYYMMDD-NNNN`. The sequence is zero padded to four digits and
/// simply widens past 9999.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenCode {
    pub date: BusinessDate,
    pub sequence: u32,
}

impl TokenCode {
    pub fn new(date: BusinessDate, sequence: u32) -> Self {
        Self { date, sequence }
    }
}

impl fmt::Display for TokenCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:04}", self.date.token_prefix(), self.sequence)
    }
}

impl FromStr for TokenCode {
    type Err = TokenQueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TokenQueueError::InvalidToken(s.to_string());
        let trimmed = s.trim();

        let rest = trimmed
            .strip_prefix(TOKEN_PREFIX)
            .and_then(|r| r.strip_prefix('-'))
            .ok_or_else(invalid)?;
        let (date_part, sequence_part) = rest.split_once('-').ok_or_else(invalid)?;

        if date_part.len() != 8 || !date_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if sequence_part.len() < 4 || !sequence_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let date = BusinessDate::parse(date_part).map_err(|_| invalid())?;
        let sequence: u32 = sequence_part.parse().map_err(|_| invalid())?;
        if sequence == 0 {
            return Err(invalid());
        }

        Ok(Self { date, sequence })
    }
}

// ==============================================================================
// DAILY COUNTER
// ==============================================================================

/// One row per business day: the last sequence handed out and the number
/// currently being served. Never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCounter {
    pub date: BusinessDate,
    pub last_issued: u32,
    pub current: u32,
    pub updated_at: Option<DateTime<Utc>>,
}

impl DailyCounter {
    pub fn empty(date: BusinessDate) -> Self {
        Self {
            date,
            last_issued: 0,
            current: 0,
            updated_at: None,
        }
    }

    pub fn view(&self) -> TokenCounterView {
        TokenCounterView {
            date: self.date.key(),
            current: self.current,
            last_issued: self.last_issued,
        }
    }
}

/// Result of an atomic completion update on the counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterTransition {
    pub previous_current: u32,
    pub counter: DailyCounter,
}

impl CounterTransition {
    pub fn moved(&self) -> bool {
        self.previous_current != self.counter.current
    }
}

/// Wire shape polled by the kiosk, doctor and admin screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenCounterView {
    pub date: String,
    pub current: u32,
    pub last_issued: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenDisplay {
    pub date: String,
    pub current: u32,
    pub last_issued: u32,
    pub current_token: Option<String>,
}

// ==============================================================================
// APPOINTMENT LEDGER RECORDS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    PendingPayment,
    Booked,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }

    pub fn can_transition_to(&self, target: &AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, target),
            (PendingPayment, Booked) | (PendingPayment, Cancelled) | (Booked, Completed) | (Booked, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::PendingPayment => "pending_payment",
            AppointmentStatus::Booked => "booked",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Only `pending -> paid` happens in this cell. `failed` and `refunded` are
/// written by the payment collaborator and are read here, never set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

/// The part of the booking system's appointment row this cell reads and
/// writes. `token` stays empty until payment is confirmed and is never
/// rewritten afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub date: BusinessDate,
    pub slot: String,
    pub status: AppointmentStatus,
    pub payment_status: PaymentStatus,
    #[serde(default, deserialize_with = "empty_if_null")]
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn empty_if_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Appointment {
    /// A fresh booking awaiting payment.
    pub fn pending(patient_id: Uuid, doctor_id: Uuid, date: BusinessDate, slot: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id,
            date,
            slot: slot.to_string(),
            status: AppointmentStatus::PendingPayment,
            payment_status: PaymentStatus::Pending,
            token: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_token(&self) -> bool {
        !self.token.trim().is_empty()
    }

    pub fn token_code(&self) -> Result<TokenCode, TokenQueueError> {
        if !self.has_token() {
            return Err(TokenQueueError::MissingToken);
        }
        self.token.parse()
    }

    pub fn is_booked_and_paid(&self) -> bool {
        self.status == AppointmentStatus::Booked && self.payment_status == PaymentStatus::Paid
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct DateQuery {
    pub date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetCurrentRequest {
    pub date: String,
    pub current: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOutcome {
    pub appointment: Appointment,
    pub token_counter: TokenCounterView,
}

// ==============================================================================
// QUEUE EVENTS
// ==============================================================================

/// Published after each state change for notification collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    TokenIssued {
        appointment_id: Uuid,
        token: String,
    },
    ConsultationCompleted {
        appointment_id: Uuid,
        doctor_id: Uuid,
        token: String,
    },
    CurrentAdvanced {
        date: String,
        from: u32,
        to: u32,
    },
    CurrentOverridden {
        date: String,
        current: u32,
    },
    AppointmentCancelled {
        appointment_id: Uuid,
        token: Option<String>,
    },
}
