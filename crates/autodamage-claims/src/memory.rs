use std::collections::HashMap;
use std::sync::Mutex;

use autodamage_core::SessionId;

use crate::traits::{Occupancy, OccupancyStore, MAX_PARTIES};
use crate::ClaimCode;

/// Occupancy for a single process. Not durable.
#[derive(Default)]
pub struct InMemoryOccupancyStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    // joined order is kept so `parties` is stable
    codes: HashMap<ClaimCode, Vec<(SessionId, i64)>>,
}

impl InMemoryOccupancyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OccupancyStore for InMemoryOccupancyStore {
    fn occupy(&self, code: &ClaimCode, session: &SessionId, now_unix: i64) -> anyhow::Result<Occupancy> {
        let mut inner = self.inner.lock().unwrap();
        let elsewhere = inner
            .codes
            .iter()
            .find(|(c, parties)| *c != code && parties.iter().any(|(s, _)| s == session))
            .map(|(c, _)| c.clone());
        if let Some(held) = elsewhere {
            return Ok(Occupancy::HeldElsewhere(held));
        }
        let parties = inner.codes.entry(code.clone()).or_default();
        if parties.iter().any(|(s, _)| s == session) {
            return Ok(Occupancy::AlreadyMember);
        }
        if parties.len() >= MAX_PARTIES {
            return Ok(Occupancy::Full);
        }
        parties.push((session.clone(), now_unix));
        Ok(Occupancy::Joined)
    }

    fn release(&self, code: &ClaimCode, session: &SessionId) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(parties) = inner.codes.get_mut(code) {
            parties.retain(|(s, _)| s != session);
            if parties.is_empty() {
                inner.codes.remove(code);
            }
        }
        Ok(())
    }

    fn parties(&self, code: &ClaimCode) -> anyhow::Result<Vec<SessionId>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.codes.get(code).map(|p| p.iter().map(|(s, _)| s.clone()).collect()).unwrap_or_default())
    }

    fn code_for(&self, session: &SessionId) -> anyhow::Result<Option<ClaimCode>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .codes
            .iter()
            .find(|(_, parties)| parties.iter().any(|(s, _)| s == session))
            .map(|(code, _)| code.clone()))
    }
}
