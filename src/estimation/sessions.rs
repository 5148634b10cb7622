//! Open "add food" dialogs and their pending estimates.
//!
//! # Invariants
//! - A session has at most one pending estimate.
//! - A result is applied only if its session is still open when it arrives;
//!   a successful result closes the session.
//! - A failed or empty result clears the pending flag and keeps the session open.

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::day_key::DayKey;
use crate::ledger::repo_types::MealSlot;

/// Idle sessions opened longer ago than this are dropped on the next open.
/// A session with an estimate in flight is kept until it settles.
pub const SESSION_TTL: Duration = Duration::minutes(30);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSession {
    pub id: Uuid,
    pub day: DayKey,
    pub slot: MealSlot,
    pub analyzing: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub opened_at: OffsetDateTime,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("analysis session {0} is not open")]
    NotOpen(Uuid),
    #[error("analysis session {0} is already analyzing")]
    AlreadyAnalyzing(Uuid),
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    open: HashMap<Uuid, AnalysisSession>,
}

impl SessionRegistry {
    pub fn open(&mut self, day: DayKey, slot: MealSlot, now: OffsetDateTime) -> AnalysisSession {
        let before = self.open.len();
        self.open.retain(|_, s| s.analyzing || now - s.opened_at <= SESSION_TTL);
        if self.open.len() < before {
            debug!(expired = before - self.open.len(), "expired analysis sessions dropped");
        }

        let session = AnalysisSession {
            id: Uuid::new_v4(),
            day,
            slot,
            analyzing: false,
            opened_at: now,
        };
        self.open.insert(session.id, session.clone());
        session
    }

    pub fn get(&self, id: &Uuid) -> Option<&AnalysisSession> {
        self.open.get(id)
    }

    /// Marks the session as analyzing. Rejects a second concurrent call.
    pub fn begin(&mut self, id: Uuid) -> Result<AnalysisSession, SessionError> {
        let session = self.open.get_mut(&id).ok_or(SessionError::NotOpen(id))?;
        if session.analyzing {
            return Err(SessionError::AlreadyAnalyzing(id));
        }
        session.analyzing = true;
        Ok(session.clone())
    }

    /// Closes the session and hands back its target. `None` means it was
    /// closed while the estimate was running and the result must be dropped.
    pub fn settle_success(&mut self, id: Uuid) -> Option<AnalysisSession> {
        self.open.remove(&id)
    }

    /// Clears the pending flag. `false` if the session no longer exists.
    pub fn settle_failure(&mut self, id: Uuid) -> bool {
        match self.open.get_mut(&id) {
            Some(session) => {
                session.analyzing = false;
                true
            }
            None => false,
        }
    }

    pub fn close(&mut self, id: Uuid) -> bool {
        self.open.remove(&id).is_some()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.open.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}
