//! Session pipeline (C8): the encrypted read and write paths built on top
//! of a lazily-initialized [`AuthKey`].

use std::collections::VecDeque;
use std::fmt;

use layer_crypto::{aes, ct, derive_key_iv, rsa};
use layer_tl_types::Serializable;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::auth_key::{self, AuthKey};
use crate::message::MessageIdClock;
use crate::transport::{AbridgedTcpTransport, Transport};

const REPLAY_WINDOW_LEN: usize = 64;
const CORRUPTED_AUTH_SENTINEL: [u8; 8] = [0x6C, 0xFE, 0xFF, 0xFF, 0x6C, 0xFE, 0xFF, 0xFF];
const FLOOD_SENTINEL: [u8; 8] = [0x53, 0xFE, 0xFF, 0xFF, 0x53, 0xFE, 0xFF, 0xFF];

/// `2^30` ticks ≈ 1 second in message-id units; clock-skew bounds are
/// expressed in these units (`msg_id` shares its scale with `2^32`, see
/// the `<<2` below).
const PAST_SKEW_TICKS: i64 = 300i64 << 32;
const FUTURE_SKEW_TICKS: i64 = 30i64 << 32;

/// Errors from [`Session::read`].
#[derive(Debug)]
pub enum ReadError<E> {
    /// The transport itself failed.
    Transport(E),
    /// Handshake (auth key init) failed.
    Obtain(auth_key::ObtainError<E>),
    /// Server reported our auth key as corrupted; the connection is unusable.
    CorruptedAuthorization,
    /// Server is rate-limiting this connection.
    FloodWait,
    /// `server_auth_key_id` didn't match ours and wasn't a known sentinel.
    UnknownAuthKeyId,
    /// The underlying AES-IGE/MAC layer rejected the frame.
    Crypto(layer_crypto::DecryptError),
    /// Decrypted plaintext was too short to contain a valid header.
    FrameTooShort,
    /// Trailing padding length fell outside `[12, 1024)`.
    WrongPaddingLength { len: usize },
    /// `session_id` in the frame didn't match ours.
    SessionMismatch,
    /// `msg_id` was even (reserved for client-originated messages).
    EvenMsgId,
    /// `msg_id` was already seen in the replay window.
    DuplicateMessage,
    /// `msg_id` fell outside the acceptable clock-skew window.
    ClockUnsynchronised,
}

impl<E: fmt::Display> fmt::Display for ReadError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Obtain(e) => write!(f, "auth key init failed: {e}"),
            Self::CorruptedAuthorization => write!(f, "server reports corrupted authorization"),
            Self::FloodWait => write!(f, "server is flood-waiting this connection"),
            Self::UnknownAuthKeyId => write!(f, "unknown auth_key_id in inbound frame"),
            Self::Crypto(e) => write!(f, "crypto: {e}"),
            Self::FrameTooShort => write!(f, "decrypted frame too short"),
            Self::WrongPaddingLength { len } => write!(f, "wrong padding length: {len}"),
            Self::SessionMismatch => write!(f, "session_id mismatch"),
            Self::EvenMsgId => write!(f, "even msg_id from server"),
            Self::DuplicateMessage => write!(f, "duplicated message"),
            Self::ClockUnsynchronised => write!(f, "clock unsynchronised"),
        }
    }
}
impl<E: fmt::Debug + fmt::Display> std::error::Error for ReadError<E> {}

/// Errors from [`Session::write`].
#[derive(Debug)]
pub enum WriteError<E> {
    /// The transport itself failed.
    Transport(E),
    /// Handshake (auth key init) failed.
    Obtain(auth_key::ObtainError<E>),
}

impl<E: fmt::Display> fmt::Display for WriteError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Obtain(e) => write!(f, "auth key init failed: {e}"),
        }
    }
}
impl<E: fmt::Debug + fmt::Display> std::error::Error for WriteError<E> {}

/// A decoded inbound message, after all of §4.6's validations pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Server salt carried by this frame (may differ from our stored salt;
    /// mismatches are logged, not fatal).
    pub salt: i64,
    /// The peer's `session_id`, already verified to match ours.
    pub session_id: i64,
    /// The message's id, already verified odd, unseen, and in-window.
    pub msg_id: i64,
    /// Sequence number carried by the frame.
    pub seq_no: i32,
    /// TL-serialized body of the inner message.
    pub body: Vec<u8>,
}

/// A message ready to hand to [`Session::write`], produced by
/// [`Session::box_message`].
pub struct BoxedMessage {
    msg_id: i64,
    seq_no: i32,
    body: Vec<u8>,
}

impl BoxedMessage {
    /// The `msg_id` this message was allocated.
    pub fn msg_id(&self) -> i64 {
        self.msg_id
    }
}

struct ReplayState {
    window: VecDeque<i64>,
}

impl ReplayState {
    fn new() -> Self {
        Self { window: VecDeque::with_capacity(REPLAY_WINDOW_LEN) }
    }

    fn check_and_insert(&mut self, msg_id: i64) -> bool {
        if self.window.contains(&msg_id) {
            return false;
        }
        if self.window.len() == REPLAY_WINDOW_LEN {
            self.window.pop_front();
        }
        self.window.push_back(msg_id);
        true
    }
}

/// A live MTProto connection: an [`AuthKey`] plus the framing pipeline
/// built on top of it.
///
/// `box_message`/`write` are safe to call concurrently with each other —
/// `msg_id` generation is single-writer-safe and the transport serializes
/// its own writes. `read` holds a dedicated lock across one whole inbound
/// frame, so at most one read is ever in flight.
pub struct Session<T: Transport> {
    auth_key: AuthKey,
    transport: Mutex<T>,
    replay: Mutex<ReplayState>,
    clock: MessageIdClock,
}

/// Errors constructing a new [`Session`].
#[derive(Debug)]
pub enum NewSessionError {
    /// Connecting the transport failed.
    Connect(std::io::Error),
    /// The supplied PEM was not a valid RSA public key.
    Pem(rsa::PemError),
}

impl fmt::Display for NewSessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(e) => write!(f, "connect failed: {e}"),
            Self::Pem(e) => write!(f, "invalid RSA public key: {e}"),
        }
    }
}
impl std::error::Error for NewSessionError {}

impl Session<AbridgedTcpTransport> {
    /// Connect to `host:port` over the abridged TCP transport and build a
    /// session pinned to `public_rsa_key_pem`. The handshake does not run
    /// yet — it is lazily triggered by the first [`read`](Self::read) or
    /// [`write`](Self::write).
    pub async fn new(
        host: &str,
        port: u16,
        public_rsa_key_pem: &str,
        persisted: Option<auth_key::Persisted>,
    ) -> Result<Self, NewSessionError> {
        let rsa_key = rsa::Key::from_pem(public_rsa_key_pem).map_err(NewSessionError::Pem)?;
        let transport = AbridgedTcpTransport::connect(host, port).await.map_err(NewSessionError::Connect)?;
        let auth_key = match persisted {
            Some(p) => AuthKey::from_persisted(rsa_key, p),
            None => AuthKey::new(rsa_key),
        };
        Ok(Self::from_parts(transport, auth_key))
    }
}

impl<T: Transport> Session<T> {
    /// Build a session directly from an already-connected transport and an
    /// [`AuthKey`] — the entry point for tests and non-TCP transports.
    pub fn from_parts(transport: T, auth_key: AuthKey) -> Self {
        Self { auth_key, transport: Mutex::new(transport), replay: Mutex::new(ReplayState::new()), clock: MessageIdClock::new() }
    }

    /// Allocate a `msg_id` and frame `body` for a future [`write`](Self::write).
    ///
    /// `seq_no` is entirely caller-managed: this pipeline never increments
    /// it internally (see the design notes on `AuthKey.seq_no`).
    pub fn box_message<S: Serializable>(&self, seq_no: i32, body: &S) -> (BoxedMessage, i64) {
        let id = self.clock.next();
        let mut buf = Vec::new();
        body.serialize(&mut buf);
        (BoxedMessage { msg_id: id.0, seq_no, body: buf }, id.0)
    }

    /// Encrypt and send a previously boxed message.
    pub async fn write(&self, message: BoxedMessage) -> Result<(), WriteError<T::Error>> {
        let mut transport = self.transport.lock().await;
        self.auth_key.obtain(&mut *transport).await.map_err(WriteError::Obtain)?;
        let state = self.auth_key.populated().await.expect("just obtained");

        let mut inner = Vec::with_capacity(32 + message.body.len());
        inner.extend(state.server_salt.to_le_bytes());
        inner.extend(state.session_id.to_le_bytes());
        inner.extend(message.msg_id.to_le_bytes());
        inner.extend(message.seq_no.to_le_bytes());
        inner.extend((message.body.len() as u32).to_le_bytes());
        inner.extend(&message.body);

        // p = ((-(len(inner)+12)) mod 16) + 12, kept in [12, 27].
        let inner_plus_12 = inner.len() + 12;
        let rem = inner_plus_12 % 16;
        let pad_len = if rem == 0 { 0 } else { 16 - rem } + 12;

        let mut padding = vec![0u8; pad_len];
        getrandom::getrandom(&mut padding).expect("getrandom");

        let auth_key_bytes = state.crypto.to_bytes();
        let msg_key_source_part = &auth_key_bytes[88..120];
        let mut hasher = Sha256::new();
        hasher.update(msg_key_source_part);
        hasher.update(&inner);
        hasher.update(&padding);
        let digest: [u8; 32] = hasher.finalize().into();
        let mut msg_key = [0u8; 16];
        msg_key.copy_from_slice(&digest[8..24]);

        let (key, iv) = derive_key_iv(&state.crypto, &msg_key, true);

        let mut plaintext = inner;
        plaintext.extend(&padding);
        aes::ige_encrypt(&mut plaintext, &key, &iv);

        let mut frame = Vec::with_capacity(8 + 16 + plaintext.len());
        frame.extend(state.crypto.key_id());
        frame.extend(msg_key);
        frame.extend(plaintext);

        transport.write(&frame).await.map_err(WriteError::Transport)
    }

    /// Read and decrypt the next inbound message, validating every field
    /// in §4.6 before returning it.
    pub async fn read(&self) -> Result<InboundMessage, ReadError<T::Error>> {
        let mut replay = self.replay.lock().await;

        let mut transport = self.transport.lock().await;
        self.auth_key.obtain(&mut *transport).await.map_err(ReadError::Obtain)?;
        let state = self.auth_key.populated().await.expect("just obtained");

        let mut frame = transport.read_some(usize::MAX).await.map_err(ReadError::Transport)?;
        drop(transport);

        if frame.len() < 8 {
            return Err(ReadError::FrameTooShort);
        }
        let server_auth_key_id: [u8; 8] = frame[..8].try_into().unwrap();
        if server_auth_key_id == CORRUPTED_AUTH_SENTINEL {
            return Err(ReadError::CorruptedAuthorization);
        }
        if server_auth_key_id == FLOOD_SENTINEL {
            return Err(ReadError::FloodWait);
        }
        if !ct::bytes_eq(&server_auth_key_id, &state.crypto.key_id()) {
            return Err(ReadError::UnknownAuthKeyId);
        }

        let plaintext = layer_crypto::decrypt_data_v2(&mut frame, &state.crypto).map_err(ReadError::Crypto)?;
        if plaintext.len() < 32 {
            return Err(ReadError::FrameTooShort);
        }

        let salt = i64::from_le_bytes(plaintext[..8].try_into().unwrap());
        let session_id = i64::from_le_bytes(plaintext[8..16].try_into().unwrap());
        let msg_id = i64::from_le_bytes(plaintext[16..24].try_into().unwrap());
        let seq_no = i32::from_le_bytes(plaintext[24..28].try_into().unwrap());
        let body_len = u32::from_le_bytes(plaintext[28..32].try_into().unwrap()) as usize;

        if 32 + body_len > plaintext.len() {
            return Err(ReadError::FrameTooShort);
        }
        let padding_len = plaintext.len() - 32 - body_len;
        if !(12..1024).contains(&padding_len) {
            return Err(ReadError::WrongPaddingLength { len: padding_len });
        }

        if session_id != state.session_id {
            return Err(ReadError::SessionMismatch);
        }
        if msg_id % 2 == 0 {
            return Err(ReadError::EvenMsgId);
        }
        if !replay.check_and_insert(msg_id) {
            return Err(ReadError::DuplicateMessage);
        }

        let generated = self.clock.current_estimate();
        let delta = msg_id - generated;
        if !(-PAST_SKEW_TICKS..FUTURE_SKEW_TICKS).contains(&delta) {
            return Err(ReadError::ClockUnsynchronised);
        }

        if salt != state.server_salt {
            log::error!("server salt mismatch: got {salt}, expected {}", state.server_salt);
        }

        let body = plaintext[32..32 + body_len].to_vec();
        Ok(InboundMessage { salt, session_id, msg_id, seq_no, body })
    }

    /// Close the underlying transport. Further reads/writes are an error.
    pub async fn stop(&self) -> Result<(), T::Error> {
        self.transport.lock().await.close().await
    }

    /// The session's current `session_id`, once the auth key is populated.
    /// Mainly useful for tests and for persistence/logging call sites that
    /// want to tag a connection without duplicating the random value.
    pub async fn session_id(&self) -> Option<i64> {
        self.auth_key.populated().await.map(|s| s.session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Transport as _;
    use std::collections::VecDeque as Deque;
    use std::sync::Mutex as StdMutex;

    struct MemTransport {
        inbound: StdMutex<Deque<u8>>,
        outbound: StdMutex<Vec<u8>>,
    }

    impl MemTransport {
        fn new() -> Self {
            Self { inbound: StdMutex::new(Deque::new()), outbound: StdMutex::new(Vec::new()) }
        }

        fn push_inbound(&self, bytes: &[u8]) {
            self.inbound.lock().unwrap().extend(bytes);
        }
    }

    impl Transport for MemTransport {
        type Error = std::io::Error;

        async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>, Self::Error> {
            let mut guard = self.inbound.lock().unwrap();
            if guard.len() < n {
                return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read"));
            }
            Ok(guard.drain(..n).collect())
        }

        async fn read_some(&mut self, max: usize) -> Result<Vec<u8>, Self::Error> {
            let mut guard = self.inbound.lock().unwrap();
            let n = max.min(guard.len());
            Ok(guard.drain(..n).collect())
        }

        async fn write(&mut self, data: &[u8]) -> Result<(), Self::Error> {
            self.outbound.lock().unwrap().extend_from_slice(data);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    fn populated_auth_key() -> AuthKey {
        let rsa_key = rsa::Key::new("101", "65537").unwrap();
        AuthKey::from_persisted(rsa_key, auth_key::Persisted { auth_key: [7u8; 256], server_salt: 99 })
    }

    #[tokio::test]
    async fn write_emits_a_frame_tagged_with_our_key_id() {
        let auth_key = populated_auth_key();
        let state = auth_key.populated().await.unwrap();
        let expected_key_id = state.crypto.key_id();

        let transport = MemTransport::new();
        let session = Session::from_parts(transport, auth_key);

        #[derive(Clone)]
        struct Ping(i64);
        impl Serializable for Ping {
            fn serialize(&self, buf: &mut impl Extend<u8>) {
                0x7abe77ecu32.serialize(buf);
                self.0.serialize(buf);
            }
        }

        let (boxed, msg_id) = session.box_message(1, &Ping(42));
        assert_eq!(boxed.msg_id(), msg_id);
        session.write(boxed).await.unwrap();

        let sent = session.transport.lock().await.outbound.lock().unwrap().clone();
        assert!(sent.len() >= 24);
        assert_eq!(&sent[..8], &expected_key_id);
        assert_eq!((sent.len() - 24) % 16, 0);
    }

    #[test]
    fn padding_length_formula_stays_in_spec_range() {
        for inner_len in 0..200usize {
            let inner_plus_12 = inner_len + 12;
            let rem = inner_plus_12 % 16;
            let pad_len = if rem == 0 { 0 } else { 16 - rem } + 12;
            assert!((12..=27).contains(&pad_len), "pad_len {pad_len} out of range for inner_len {inner_len}");
            assert_eq!((inner_len + pad_len) % 16, 0);
        }
    }

    #[tokio::test]
    async fn duplicate_msg_id_is_rejected_by_replay_window() {
        let mut replay = ReplayState::new();
        assert!(replay.check_and_insert(101));
        assert!(!replay.check_and_insert(101));
        assert!(replay.check_and_insert(103));
    }

    #[tokio::test]
    async fn replay_window_evicts_oldest_after_64_entries() {
        let mut replay = ReplayState::new();
        for i in 0..64 {
            assert!(replay.check_and_insert(i * 2 + 1));
        }
        // window full; id 1 should now be evictable-reusable once it rolls off.
        assert!(replay.check_and_insert(200)); // evicts id 1
        assert!(replay.check_and_insert(1)); // now accepted again
    }
}
