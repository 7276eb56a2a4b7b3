use autodamage_core::SessionId;

use crate::ClaimCode;

/// A code correlates at most this many sessions.
pub const MAX_PARTIES: usize = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Occupancy {
    Joined,
    AlreadyMember,
    Full,
    /// The session already holds this other code and must release it first.
    HeldElsewhere(ClaimCode),
}

/// Shared record of which sessions hold which claim code.
///
/// `occupy` must check and join in one atomic step so that two racing
/// sessions can never both become the third party, and a session never holds
/// more than one code.
pub trait OccupancyStore: Send + Sync {
    fn occupy(&self, code: &ClaimCode, session: &SessionId, now_unix: i64) -> anyhow::Result<Occupancy>;
    fn release(&self, code: &ClaimCode, session: &SessionId) -> anyhow::Result<()>;

    fn parties(&self, code: &ClaimCode) -> anyhow::Result<Vec<SessionId>>;
    /// The code a session currently holds, if any.
    fn code_for(&self, session: &SessionId) -> anyhow::Result<Option<ClaimCode>>;
}
