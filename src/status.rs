//! Transaction status and the level-gated transition rules
//!
//! `Status` is the only status vocabulary in the crate. Its approval level is a
//! total function of the variant, so the two can never drift apart. The
//! transition functions here are pure; version checking and persistence live in
//! [`crate::transaction`] and [`crate::store`].
use super::error::{EngineError, ValidationError};
use std::str::FromStr;

/// Number of approval tiers a transaction passes through before it is approved.
pub const APPROVAL_TIERS: u8 = 4;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    #[n(0)]
    Draft,
    #[n(1)]
    PendingL1,
    #[n(2)]
    PendingL2,
    #[n(3)]
    PendingL3,
    #[n(4)]
    PendingL4,
    #[n(5)]
    Approved,
    #[n(6)]
    Rejected,
    #[n(7)]
    Booked,
}

impl Status {
    pub const ALL: [Status; 8] = [
        Status::Draft,
        Status::PendingL1,
        Status::PendingL2,
        Status::PendingL3,
        Status::PendingL4,
        Status::Approved,
        Status::Rejected,
        Status::Booked,
    ];

    /// Canonical approval level. `Rejected` maps to 0: no tier is required to act on it.
    pub fn approval_level(self) -> u8 {
        match self {
            Status::Draft => 0,
            Status::PendingL1 => 1,
            Status::PendingL2 => 2,
            Status::PendingL3 => 3,
            Status::PendingL4 => 4,
            Status::Approved => 5,
            Status::Rejected => 0,
            Status::Booked => 6,
        }
    }

    /// The tier that must act next, if the transaction is awaiting approval.
    pub fn pending_level(self) -> Option<u8> {
        match self {
            Status::PendingL1 => Some(1),
            Status::PendingL2 => Some(2),
            Status::PendingL3 => Some(3),
            Status::PendingL4 => Some(4),
            _ => None,
        }
    }

    pub fn from_pending_level(level: u8) -> Option<Status> {
        match level {
            1 => Some(Status::PendingL1),
            2 => Some(Status::PendingL2),
            3 => Some(Status::PendingL3),
            4 => Some(Status::PendingL4),
            _ => None,
        }
    }

    /// Approved, rejected and booked transactions accept no approval decision.
    pub fn is_decided(self) -> bool {
        matches!(self, Status::Approved | Status::Rejected | Status::Booked)
    }

    /// No transition of any kind leaves these states.
    pub fn is_final(self) -> bool {
        matches!(self, Status::Rejected | Status::Booked)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Draft => "DRAFT",
            Status::PendingL1 => "PENDING_L1",
            Status::PendingL2 => "PENDING_L2",
            Status::PendingL3 => "PENDING_L3",
            Status::PendingL4 => "PENDING_L4",
            Status::Approved => "APPROVED",
            Status::Rejected => "REJECTED",
            Status::Booked => "BOOKED",
        }
    }

    /// DRAFT -> PENDING_L1.
    pub fn submit(self) -> Result<Status, EngineError> {
        match self {
            Status::Draft => Ok(Status::PendingL1),
            s if s.is_decided() => Err(EngineError::TerminalState(s)),
            s => Err(ValidationError::AlreadySubmitted(s).into()),
        }
    }

    /// Advance one tier. Only the tier currently pending may approve.
    pub fn approve(self, actor_level: u8) -> Result<Status, EngineError> {
        let level = self.require_pending(actor_level)?;
        Ok(Status::from_pending_level(level + 1).unwrap_or(Status::Approved))
    }

    /// Terminate the transaction. Same gating as [`Status::approve`].
    pub fn reject(self, actor_level: u8) -> Result<Status, EngineError> {
        self.require_pending(actor_level)?;
        Ok(Status::Rejected)
    }

    /// APPROVED -> BOOKED, the external finance step.
    pub fn book(self) -> Result<Status, EngineError> {
        match self {
            Status::Approved => Ok(Status::Booked),
            s if s.is_final() => Err(EngineError::TerminalState(s)),
            s => Err(ValidationError::NotApproved(s).into()),
        }
    }

    fn require_pending(self, actor_level: u8) -> Result<u8, EngineError> {
        if self.is_decided() {
            return Err(EngineError::TerminalState(self));
        }
        let Some(level) = self.pending_level() else {
            return Err(ValidationError::NotSubmitted.into());
        };
        if actor_level != level {
            return Err(EngineError::Permission {
                actor_level,
                required_level: level,
            });
        }
        Ok(level)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown status '{s}'"))
    }
}
