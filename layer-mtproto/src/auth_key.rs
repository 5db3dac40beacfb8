//! Authorization-key object (C5): the long-lived identity plus the
//! exclusive-init guard that runs the handshake engine exactly once.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use layer_crypto::{rsa, AuthKey as CryptoKey};
use tokio::sync::Mutex;

use crate::handshake::{self, Finished};
use crate::transport::Transport;

/// The mutable fields populated once the handshake completes.
#[derive(Clone)]
pub(crate) struct Populated {
    pub(crate) crypto: CryptoKey,
    pub(crate) session_id: i64,
    pub(crate) server_salt: i64,
}

/// `(auth_key, server_salt)` as carried across process restarts.
///
/// `session_id` is deliberately absent: it is regenerated fresh on every
/// load, and `seq_no` always resets to the sentinel `-1`.
#[derive(Clone, Copy)]
pub struct Persisted {
    /// The 256-byte shared secret from a prior handshake.
    pub auth_key: [u8; 256],
    /// The last known server salt.
    pub server_salt: i64,
}

impl Persisted {
    /// Accept the legacy form that carried only `auth_key`; `server_salt`
    /// is then seeded with 8 random bits, per the persistence contract.
    pub fn legacy(auth_key: [u8; 256]) -> Self {
        let mut rnd = [0u8; 1];
        getrandom::getrandom(&mut rnd).expect("getrandom");
        Self { auth_key, server_salt: rnd[0] as i64 }
    }
}

/// Errors from [`AuthKey::obtain`].
#[derive(Debug)]
pub enum ObtainError<E> {
    /// The handshake engine failed; `auth_key` remains empty.
    Handshake(handshake::Error<E>),
}

impl<E: fmt::Display> fmt::Display for ObtainError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handshake(e) => write!(f, "handshake failed: {e}"),
        }
    }
}
impl<E: fmt::Debug + fmt::Display> std::error::Error for ObtainError<E> {}

/// Holds `auth_key`, derived `auth_key_id`, `session_id`, `server_salt`,
/// `seq_no`, guarded by an exclusive `init_lock` covering the handshake.
///
/// Until [`AuthKey::obtain`] succeeds once, the key is empty; it is
/// immutable for the lifetime of this object thereafter. `seq_no` starts
/// at the sentinel `-1` and is never touched internally — see
/// [`crate::session`] for why that's the caller's job.
pub struct AuthKey {
    rsa_key: rsa::Key,
    state: Mutex<Option<Populated>>,
    seq_no: AtomicI64,
}

impl AuthKey {
    /// A fresh, empty `AuthKey` that will run the handshake against
    /// `rsa_key` the first time [`obtain`](Self::obtain) is called.
    pub fn new(rsa_key: rsa::Key) -> Self {
        Self { rsa_key, state: Mutex::new(None), seq_no: AtomicI64::new(-1) }
    }

    /// Reload a previously persisted key, skipping the handshake entirely.
    pub fn from_persisted(rsa_key: rsa::Key, persisted: Persisted) -> Self {
        let session_id = fresh_session_id();
        let crypto = CryptoKey::from_bytes(persisted.auth_key);
        Self {
            rsa_key,
            state: Mutex::new(Some(Populated { crypto, session_id, server_salt: persisted.server_salt })),
            seq_no: AtomicI64::new(-1),
        }
    }

    /// Ensure the key is populated, running the handshake over `transport`
    /// on first call. Subsequent calls return immediately once a key is
    /// present — the common case of no lock contention.
    pub async fn obtain<T: Transport>(&self, transport: &mut T) -> Result<(), ObtainError<T::Error>> {
        let mut guard = self.state.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        let Finished { auth_key, time_offset: _, first_salt } =
            handshake::perform(transport, &self.rsa_key).await.map_err(ObtainError::Handshake)?;

        let session_id = fresh_session_id();
        let crypto = CryptoKey::from_bytes(auth_key);
        *guard = Some(Populated { crypto, session_id, server_salt: first_salt });
        Ok(())
    }

    /// Snapshot of the populated state, or `None` before the first
    /// successful [`obtain`](Self::obtain).
    pub(crate) async fn populated(&self) -> Option<Populated> {
        self.state.lock().await.clone()
    }

    /// The caller-managed sequence counter. Starts at `-1`; this type
    /// never advances it (see §9 of the design notes this core follows:
    /// `box_message` takes an externally supplied `seq_no`).
    pub fn seq_no(&self) -> i64 {
        self.seq_no.load(Ordering::SeqCst)
    }

    /// Overwrite the stored `seq_no`. Exposed so a caller that *does* want
    /// to track it can persist/restore its own counter through this type
    /// rather than keeping a second copy.
    pub fn set_seq_no(&self, value: i64) {
        self.seq_no.store(value, Ordering::SeqCst);
    }
}

fn fresh_session_id() -> i64 {
    let mut rnd = [0u8; 8];
    getrandom::getrandom(&mut rnd).expect("getrandom");
    i64::from_le_bytes(rnd)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> rsa::Key {
        rsa::Key::new("25342889448840415564971689590713473206898847759084779052582026594546022463853940585885215951168491965708222649399180603818074200620463776135424884632162512403163793083921641631564740959529419359595852941166848940585952337613333022396096584117954892216031229237302943701877588456738335398602461675225081791820393153757504952636234951323237820036543581047826906120927972487366805292115792231423684261262330394324750785450942589751755390156647751460719351439969059949569615302809050721500330239005077889855323917509948255722081644689442127297605422579707142646660768825302832201908302295573257427896031830742328565032949", "65537").unwrap()
    }

    #[test]
    fn seq_no_starts_at_sentinel_minus_one() {
        let key = AuthKey::new(test_key());
        assert_eq!(key.seq_no(), -1);
    }

    #[test]
    fn set_seq_no_round_trips() {
        let key = AuthKey::new(test_key());
        key.set_seq_no(7);
        assert_eq!(key.seq_no(), 7);
    }

    #[tokio::test]
    async fn from_persisted_is_immediately_populated() {
        let key = AuthKey::from_persisted(test_key(), Persisted { auth_key: [9u8; 256], server_salt: 42 });
        let state = key.populated().await.expect("populated");
        assert_eq!(state.server_salt, 42);
    }

    #[test]
    fn legacy_persisted_seeds_a_small_salt() {
        let p = Persisted::legacy([1u8; 256]);
        assert!((0..=255).contains(&p.server_salt));
    }
}
