use std::sync::Arc;

use autodamage_core::{now_unix, SessionId};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::{ClaimCode, FormatError, Occupancy, OccupancyStore};

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("session is already locked to {0}; unlock it first")]
    AlreadyLocked(ClaimCode),
    #[error("reference {0} already correlates two sessions")]
    PartyLimit(ClaimCode),
    #[error("occupancy store: {0:#}")]
    Store(#[from] anyhow::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimState {
    Unset,
    Locked,
}

/// Claim-reference state carried by one user session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimSession {
    pub id: SessionId,
    code: Option<ClaimCode>,
}

impl ClaimSession {
    pub fn new(id: SessionId) -> Self {
        Self { id, code: None }
    }

    pub fn state(&self) -> ClaimState {
        match self.code {
            Some(_) => ClaimState::Locked,
            None => ClaimState::Unset,
        }
    }

    pub fn code(&self) -> Option<&ClaimCode> {
        self.code.as_ref()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ClaimStatus {
    pub session: SessionId,
    pub state: ClaimState,
    pub code: Option<ClaimCode>,
    pub parties: usize,
}

/// Lock/unlock rules on top of a shared occupancy store.
#[derive(Clone)]
pub struct ClaimProtocol {
    store: Arc<dyn OccupancyStore>,
}

impl ClaimProtocol {
    pub fn new(store: Arc<dyn OccupancyStore>) -> Self {
        Self { store }
    }

    /// Rebuild a session's view from the store, for callers that do not keep
    /// sessions in memory between operations.
    pub fn restore(&self, id: SessionId) -> Result<ClaimSession, ClaimError> {
        let code = self.store.code_for(&id)?;
        Ok(ClaimSession { id, code })
    }

    /// Validate `raw` and lock the session to it. A malformed code leaves the
    /// session untouched.
    pub fn lock_str(&self, session: &mut ClaimSession, raw: &str) -> Result<ClaimCode, ClaimError> {
        let code = ClaimCode::parse(raw)?;
        self.lock(session, code.clone())?;
        Ok(code)
    }

    pub fn generate_and_lock(&self, session: &mut ClaimSession) -> Result<ClaimCode, ClaimError> {
        let code = ClaimCode::generate();
        self.lock(session, code.clone())?;
        Ok(code)
    }

    /// Idempotent for the code a session already holds. The store is the
    /// authority on what a session holds, so a fresh `ClaimSession` for an id
    /// that is locked elsewhere is refused too.
    pub fn lock(&self, session: &mut ClaimSession, code: ClaimCode) -> Result<(), ClaimError> {
        if let Some(current) = &session.code {
            if *current != code {
                return Err(ClaimError::AlreadyLocked(current.clone()));
            }
        }
        match self.store.occupy(&code, &session.id, now_unix())? {
            Occupancy::Full => return Err(ClaimError::PartyLimit(code)),
            Occupancy::HeldElsewhere(held) => {
                debug!(session = %session.id, held = %held, code = %code, "lock refused, session holds another code");
                return Err(ClaimError::AlreadyLocked(held));
            }
            Occupancy::AlreadyMember => debug!(session = %session.id, code = %code, "lock repeated"),
            Occupancy::Joined => info!(session = %session.id, code = %code, "claim reference locked"),
        }
        session.code = Some(code);
        Ok(())
    }

    /// Back to `Unset`. Only this session's slot is released; the other
    /// party keeps its lock.
    pub fn unlock(&self, session: &mut ClaimSession) -> Result<Option<ClaimCode>, ClaimError> {
        let Some(code) = session.code.take() else {
            return Ok(None);
        };
        if let Err(err) = self.store.release(&code, &session.id) {
            session.code = Some(code);
            return Err(err.into());
        }
        info!(session = %session.id, code = %code, "claim reference unlocked");
        Ok(Some(code))
    }

    pub fn status(&self, session: &ClaimSession) -> Result<ClaimStatus, ClaimError> {
        let parties = match &session.code {
            Some(code) => self.store.parties(code)?.len(),
            None => 0,
        };
        Ok(ClaimStatus { session: session.id.clone(), state: session.state(), code: session.code.clone(), parties })
    }
}
