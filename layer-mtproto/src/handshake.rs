//! The DH key-exchange handshake engine (C7).
//!
//! Each round is a pure function over an explicit random buffer (`do_stepN`)
//! wrapped by a public entry point that supplies OS randomness (`stepN`).
//! That split keeps the cryptographic logic itself unit-testable without a
//! live peer — tests drive `do_stepN` directly with a fixed buffer, which
//! makes every nonce the test constructs deterministic. [`perform`] is the
//! only part of this module that touches a [`Transport`]: it drives the
//! three request/response rounds end to end and hands back the finished
//! [`AuthKey`] material.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use layer_crypto::{AuthKey as CryptoKey, aes, ct, factorize, generate_key_data_from_nonce, primes, rsa};
use layer_tl_types::{Deserializable, Serializable};
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use sha1::{Digest, Sha1};

use crate::message::{MessageId, PlaintextFrame};
use crate::transport::Transport;
use crate::wire;

// ─── Error ────────────────────────────────────────────────────────────────────

/// Errors that can occur during auth key generation.
#[allow(missing_docs)]
#[derive(Debug)]
pub enum Error<E> {
    Transport(E),
    Decode(layer_tl_types::deserialize::Error),
    InvalidNonce,
    InvalidPqSize { size: usize },
    UnknownFingerprint { fingerprints: Vec<i64> },
    DhParamsFail,
    InvalidServerNonce,
    EncryptedResponseNotPadded { len: usize },
    InvalidDhInnerData { error: layer_tl_types::deserialize::Error },
    GParameterOutOfRange,
    DhGenRetry,
    DhGenFail,
    InvalidAnswerHash,
    InvalidNewNonceHash,
}

impl<E: fmt::Display> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Decode(e) => write!(f, "wire decode error: {e}"),
            Self::InvalidNonce => write!(f, "nonce mismatch"),
            Self::InvalidPqSize { size } => write!(f, "pq size {size} invalid (expected 8)"),
            Self::UnknownFingerprint { fingerprints } => {
                write!(f, "our key's fingerprint not in server list {fingerprints:?}")
            }
            Self::DhParamsFail => write!(f, "server returned DH params failure"),
            Self::InvalidServerNonce => write!(f, "server_nonce mismatch"),
            Self::EncryptedResponseNotPadded { len } => {
                write!(f, "encrypted answer len {len} is not 16-byte aligned")
            }
            Self::InvalidDhInnerData { error } => write!(f, "DH inner data decode error: {error}"),
            Self::GParameterOutOfRange => write!(f, "g/g_a/g_b outside the safe DH range"),
            Self::DhGenRetry => write!(f, "server asked for dh_gen_retry"),
            Self::DhGenFail => write!(f, "server returned dh_gen_fail"),
            Self::InvalidAnswerHash => write!(f, "server_DH_inner_data answer hash mismatch"),
            Self::InvalidNewNonceHash => write!(f, "new_nonce hash mismatch"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for Error<E> {}

// ─── Step state ──────────────────────────────────────────────────────────────

/// State after step 1.
pub struct Step1 {
    nonce: [u8; 16],
}

/// State after step 2.
pub struct Step2 {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce: [u8; 32],
}

/// State after step 3.
pub struct Step3 {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce: [u8; 32],
    gab: BigUint,
    time_offset: i32,
}

/// The final output of a successful auth key handshake.
#[derive(Clone, Debug, PartialEq)]
pub struct Finished {
    /// The 256-byte Telegram authorization key.
    pub auth_key: [u8; 256],
    /// Clock skew in seconds relative to the server.
    pub time_offset: i32,
    /// Initial server salt.
    pub first_salt: i64,
}

// ─── Step 1: req_pq ──────────────────────────────────────────────────────────

/// Generate a `req_pq` request.
pub fn step1<E>() -> Result<(wire::ReqPq, Step1), Error<E>> {
    let mut buf = [0u8; 16];
    getrandom::getrandom(&mut buf).expect("getrandom");
    do_step1(&buf)
}

fn do_step1<E>(random: &[u8; 16]) -> Result<(wire::ReqPq, Step1), Error<E>> {
    let nonce = *random;
    Ok((wire::ReqPq { nonce }, Step1 { nonce }))
}

// ─── Step 2: req_DH_params ───────────────────────────────────────────────────

/// Process `ResPq` and generate `req_DH_params` against our own RSA key.
pub fn step2<E>(
    data: Step1,
    response: wire::ResPq,
    our_key: &rsa::Key,
) -> Result<(wire::ReqDhParams, Step2), Error<E>> {
    let mut rnd = [0u8; 256];
    getrandom::getrandom(&mut rnd).expect("getrandom");
    do_step2(data, response, our_key, &rnd)
}

fn do_step2<E>(
    data: Step1,
    response: wire::ResPq,
    our_key: &rsa::Key,
    random: &[u8; 256],
) -> Result<(wire::ReqDhParams, Step2), Error<E>> {
    let Step1 { nonce } = data;

    check_eq16::<E>(&response.nonce, &nonce)?;

    if response.pq.len() != 8 {
        return Err(Error::InvalidPqSize { size: response.pq.len() });
    }
    let pq = u64::from_be_bytes(response.pq.as_slice().try_into().unwrap());
    let (p, q) = factorize(pq);

    let mut new_nonce = [0u8; 32];
    new_nonce.copy_from_slice(&random[..32]);
    let rnd224: &[u8; 224] = random[32..].try_into().unwrap();

    let p_bytes = trim_be(p);
    let q_bytes = trim_be(q);

    let pq_inner = wire::PqInnerData {
        // Echo the server's own bytes back unchanged rather than
        // re-deriving from the parsed `u64` — re-deriving would drop a
        // leading zero byte whenever `pq < 2^56`. (`p`/`q` are ours to
        // mint, so those are freshly trimmed below.)
        pq: response.pq.clone(),
        p: p_bytes.clone(),
        q: q_bytes.clone(),
        nonce,
        server_nonce: response.server_nonce,
        new_nonce,
    }
    .to_bytes();

    let our_fingerprint = rsa::fingerprint(our_key);
    if !response.server_public_key_fingerprints.contains(&our_fingerprint) {
        return Err(Error::UnknownFingerprint {
            fingerprints: response.server_public_key_fingerprints.clone(),
        });
    }

    let ciphertext = rsa::encrypt_hashed(&pq_inner, our_key, rnd224);

    Ok((
        wire::ReqDhParams {
            nonce,
            server_nonce: response.server_nonce,
            p: p_bytes,
            q: q_bytes,
            public_key_fingerprint: our_fingerprint,
            encrypted_data: ciphertext,
        },
        Step2 { nonce, server_nonce: response.server_nonce, new_nonce },
    ))
}

// ─── Step 3: set_client_DH_params ────────────────────────────────────────────

/// Process `Server_DH_Params` and generate `set_client_DH_params`.
pub fn step3<E>(
    data: Step2,
    response: wire::ServerDhParams,
) -> Result<(wire::SetClientDhParams, Step3), Error<E>> {
    let mut rnd = [0u8; 272]; // 256 for DH `b`, 16 for padding
    getrandom::getrandom(&mut rnd).expect("getrandom");
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i32;
    do_step3(data, response, &rnd, now)
}

fn do_step3<E>(
    data: Step2,
    response: wire::ServerDhParams,
    random: &[u8; 272],
    now: i32,
) -> Result<(wire::SetClientDhParams, Step3), Error<E>> {
    let Step2 { nonce, server_nonce, new_nonce } = data;

    let mut server_dh_ok = match response {
        wire::ServerDhParams::Fail(f) => {
            check_eq16::<E>(&f.nonce, &nonce)?;
            check_eq16_server::<E>(&f.server_nonce, &server_nonce)?;
            let expected_hash = new_nonce_hash_prefix(&new_nonce);
            check_eq16_hash::<E>(&f.new_nonce_hash, &expected_hash)?;
            return Err(Error::DhParamsFail);
        }
        wire::ServerDhParams::Ok(x) => x,
    };

    check_eq16::<E>(&server_dh_ok.nonce, &nonce)?;
    check_eq16_server::<E>(&server_dh_ok.server_nonce, &server_nonce)?;

    if server_dh_ok.encrypted_answer.len() % 16 != 0 {
        return Err(Error::EncryptedResponseNotPadded { len: server_dh_ok.encrypted_answer.len() });
    }

    let (key, iv) = generate_key_data_from_nonce(&server_nonce, &new_nonce);
    aes::ige_decrypt(&mut server_dh_ok.encrypted_answer, &key, &iv);
    let plain = server_dh_ok.encrypted_answer;

    let got_hash: [u8; 20] = plain[..20].try_into().unwrap();
    let inner = wire::ServerDhInnerData::from_bytes(&plain[20..])
        .map_err(|e| Error::InvalidDhInnerData { error: e })?;
    let consumed = inner.to_bytes().len();

    let expected_hash: [u8; 20] = {
        let mut sha = Sha1::new();
        sha.update(&plain[20..20 + consumed]);
        sha.finalize().into()
    };
    if !ct::bytes_eq(&got_hash, &expected_hash) {
        return Err(Error::InvalidAnswerHash);
    }

    check_eq16::<E>(&inner.nonce, &nonce)?;
    check_eq16_server::<E>(&inner.server_nonce, &server_nonce)?;

    let dh_prime = BigUint::from_bytes_be(&inner.dh_prime);
    if !primes::is_safe_dh_prime(inner.g, &dh_prime) {
        return Err(Error::GParameterOutOfRange);
    }
    let g = BigUint::from(inner.g.to_u32().ok_or(Error::GParameterOutOfRange)?);
    let g_a = BigUint::from_bytes_be(&inner.g_a);
    let time_offset = inner.server_time - now;

    let b = BigUint::from_bytes_be(&random[..256]);
    let g_b = g.modpow(&b, &dh_prime);
    let gab = g_a.modpow(&b, &dh_prime);

    let one = BigUint::from(1u32);
    let safety = one.clone() << (2048 - 64);
    check_range::<E>(&g_a, &one, &(&dh_prime - &one))?;
    check_range::<E>(&g_b, &one, &(&dh_prime - &one))?;
    check_range_inclusive::<E>(&g_a, &safety, &(&dh_prime - &safety))?;
    check_range_inclusive::<E>(&g_b, &safety, &(&dh_prime - &safety))?;

    let client_dh_inner = wire::ClientDhInnerData {
        nonce,
        server_nonce,
        retry_id: 0,
        g_b: g_b.to_bytes_be(),
    }
    .to_bytes();

    let digest: [u8; 20] = {
        let mut sha = Sha1::new();
        sha.update(&client_dh_inner);
        sha.finalize().into()
    };

    let pad_len = (16 - ((20 + client_dh_inner.len()) % 16)) % 16;
    let rnd16 = &random[256..256 + pad_len.min(16)];

    let mut hashed = Vec::with_capacity(20 + client_dh_inner.len() + pad_len);
    hashed.extend_from_slice(&digest);
    hashed.extend_from_slice(&client_dh_inner);
    hashed.extend_from_slice(rnd16);

    aes::ige_encrypt(&mut hashed, &key, &iv);

    Ok((
        wire::SetClientDhParams { nonce, server_nonce, encrypted_data: hashed },
        Step3 { nonce, server_nonce, new_nonce, gab, time_offset },
    ))
}

// ─── finish: create_key ──────────────────────────────────────────────────────

/// Finalize the handshake. Returns the ready [`Finished`] on success.
pub fn finish<E>(
    data: Step3,
    response: wire::SetClientDhParamsAnswer,
) -> Result<Finished, Error<E>> {
    let Step3 { nonce, server_nonce, new_nonce, gab, time_offset } = data;

    struct DhData {
        nonce: [u8; 16],
        server_nonce: [u8; 16],
        hash: [u8; 16],
        num: u8,
    }

    let dh = match response {
        wire::SetClientDhParamsAnswer::Ok(x) => {
            DhData { nonce: x.nonce, server_nonce: x.server_nonce, hash: x.new_nonce_hash1, num: 1 }
        }
        wire::SetClientDhParamsAnswer::Retry(x) => {
            DhData { nonce: x.nonce, server_nonce: x.server_nonce, hash: x.new_nonce_hash2, num: 2 }
        }
        wire::SetClientDhParamsAnswer::Fail(x) => {
            DhData { nonce: x.nonce, server_nonce: x.server_nonce, hash: x.new_nonce_hash3, num: 3 }
        }
    };

    check_eq16::<E>(&dh.nonce, &nonce)?;
    check_eq16_server::<E>(&dh.server_nonce, &server_nonce)?;

    let mut key_bytes = [0u8; 256];
    let gab_bytes = gab.to_bytes_be();
    let skip = 256 - gab_bytes.len();
    key_bytes[skip..].copy_from_slice(&gab_bytes);

    let auth_key = CryptoKey::from_bytes(key_bytes);
    let expected_hash = auth_key.calc_new_nonce_hash(&new_nonce, dh.num);
    if !ct::bytes_eq(&dh.hash, &expected_hash) {
        return Err(Error::InvalidNewNonceHash);
    }

    let first_salt = {
        let mut buf = [0u8; 8];
        for ((dst, a), b) in buf.iter_mut().zip(&new_nonce[..8]).zip(&server_nonce[..8]) {
            *dst = a ^ b;
        }
        i64::from_le_bytes(buf)
    };

    match dh.num {
        1 => Ok(Finished { auth_key: auth_key.to_bytes(), time_offset, first_salt }),
        2 => Err(Error::DhGenRetry),
        _ => Err(Error::DhGenFail),
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn trim_be(v: u64) -> Vec<u8> {
    let b = v.to_be_bytes();
    let skip = b.iter().position(|&x| x != 0).unwrap_or(7);
    b[skip..].to_vec()
}

fn new_nonce_hash_prefix(new_nonce: &[u8; 32]) -> [u8; 16] {
    let mut sha = Sha1::new();
    sha.update(new_nonce);
    let digest: [u8; 20] = sha.finalize().into();
    digest[4..].try_into().unwrap()
}

fn check_eq16<E>(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error<E>> {
    if ct::bytes_eq(got, expected) { Ok(()) } else { Err(Error::InvalidNonce) }
}
fn check_eq16_server<E>(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error<E>> {
    if ct::bytes_eq(got, expected) { Ok(()) } else { Err(Error::InvalidServerNonce) }
}
fn check_eq16_hash<E>(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error<E>> {
    if ct::bytes_eq(got, expected) { Ok(()) } else { Err(Error::InvalidNewNonceHash) }
}
fn check_range<E>(val: &BigUint, lo: &BigUint, hi: &BigUint) -> Result<(), Error<E>> {
    if lo < val && val < hi { Ok(()) } else { Err(Error::GParameterOutOfRange) }
}
fn check_range_inclusive<E>(val: &BigUint, lo: &BigUint, hi: &BigUint) -> Result<(), Error<E>> {
    if lo <= val && val <= hi { Ok(()) } else { Err(Error::GParameterOutOfRange) }
}

// ─── Transport-driven engine ─────────────────────────────────────────────────

async fn send_plaintext<T: Transport>(transport: &mut T, body: Vec<u8>) -> Result<(), Error<T::Error>> {
    // Unencrypted handshake frames always carry message_id = 0 (spec §4.4;
    // the original's `_write_unencrypted_message` hardcodes the same).
    let frame = PlaintextFrame { id: MessageId(0), body };
    transport.write(&frame.to_bytes()).await.map_err(Error::Transport)
}

async fn recv_plaintext_body<T: Transport>(transport: &mut T) -> Result<Vec<u8>, Error<T::Error>> {
    let header: [u8; 20] = transport.read_exact(20).await.map_err(Error::Transport)?.try_into().unwrap();
    let (_auth_key_id, MessageId(_id), len) =
        crate::message::PlaintextFrame::parse_header(&header).map_err(|_| Error::InvalidNonce)?;
    transport.read_exact(len as usize).await.map_err(Error::Transport)
}

/// Run the full three-round handshake over `transport` using OS randomness.
pub async fn perform<T: Transport>(transport: &mut T, our_key: &rsa::Key) -> Result<Finished, Error<T::Error>> {
    let mut rnd16 = [0u8; 16];
    getrandom::getrandom(&mut rnd16).expect("getrandom");
    let mut rnd256 = [0u8; 256];
    getrandom::getrandom(&mut rnd256).expect("getrandom");
    let mut rnd272 = [0u8; 272];
    getrandom::getrandom(&mut rnd272).expect("getrandom");
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i32;
    perform_with_random(transport, our_key, &rnd16, &rnd256, &rnd272, now).await
}

/// Run the handshake with explicit randomness — used by [`perform`] and
/// directly by tests that need to know `new_nonce`/`b` ahead of time to
/// script a deterministic peer.
pub async fn perform_with_random<T: Transport>(
    transport: &mut T,
    our_key: &rsa::Key,
    rnd16: &[u8; 16],
    rnd256: &[u8; 256],
    rnd272: &[u8; 272],
    now: i32,
) -> Result<Finished, Error<T::Error>> {
    let (req1, s1) = do_step1::<T::Error>(rnd16)?;
    send_plaintext(transport, req1.to_bytes()).await?;
    let body = recv_plaintext_body(transport).await?;
    let res_pq = wire::ResPq::from_bytes(&body).map_err(Error::Decode)?;

    let (req2, s2) = do_step2::<T::Error>(s1, res_pq, our_key, rnd256)?;
    send_plaintext(transport, req2.to_bytes()).await?;
    let body = recv_plaintext_body(transport).await?;
    let dh_params = wire::ServerDhParams::from_bytes(&body).map_err(Error::Decode)?;

    let (req3, s3) = do_step3::<T::Error>(s2, dh_params, rnd272, now)?;
    send_plaintext(transport, req3.to_bytes()).await?;
    let body = recv_plaintext_body(transport).await?;
    let answer = wire::SetClientDhParamsAnswer::from_bytes(&body).map_err(Error::Decode)?;

    finish(s3, answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use layer_crypto::sha1;

    fn test_key() -> rsa::Key {
        rsa::Key::new(
            "25342889448840415564971689590713473206898847759084779052582026594546022463853940585885215951168491965708222649399180603818074200620463776135424884632162512403163793083921641631564740959529419359595852941166848940585952337613333022396096584117954892216031229237302943701877588456738335398602461675225081791820393153757504952636234951323237820036543581047826906120927972487366805292115792231423684261262330394324750785450942589751755390156647751460719351439969059949569615302809050721500330239005077889855323917509948255722081644689442127297605422579707142646660768825302832201908302295573257427896031830742328565032949",
            "65537",
        )
        .unwrap()
    }

    #[test]
    fn full_handshake_derives_consistent_auth_key() {
        let key = test_key();
        let fp = rsa::fingerprint(&key);

        let nonce = [1u8; 16];
        let (_req1, s1) = do_step1::<std::io::Error>(&nonce).unwrap();

        let pq: u64 = 1470626929934143021;
        let server_nonce = [2u8; 16];
        let res_pq = wire::ResPq {
            nonce,
            server_nonce,
            pq: pq.to_be_bytes().to_vec(),
            server_public_key_fingerprints: vec![fp],
        };

        let rnd256 = [3u8; 256];
        let (req2, s2) = do_step2::<std::io::Error>(s1, res_pq, &key, &rnd256).unwrap();
        assert_eq!(req2.nonce, nonce);
        let new_nonce: [u8; 32] = rnd256[..32].try_into().unwrap();

        let (dh_key, dh_iv) = generate_key_data_from_nonce(&server_nonce, &new_nonce);
        let dh_prime = primes::fixture_dh_prime();
        let g_a = &dh_prime - BigUint::from(999u32);

        let server_time = 1_700_000_000i32;
        let server_inner = wire::ServerDhInnerData {
            nonce,
            server_nonce,
            g: 3,
            dh_prime: dh_prime.to_bytes_be(),
            g_a: g_a.to_bytes_be(),
            server_time,
        };
        let inner_bytes = server_inner.to_bytes();
        let hash = sha1!(&inner_bytes);
        let mut plain = Vec::new();
        plain.extend_from_slice(&hash);
        plain.extend_from_slice(&inner_bytes);
        while plain.len() % 16 != 0 {
            plain.push(0);
        }
        let mut encrypted_answer = plain.clone();
        aes::ige_encrypt(&mut encrypted_answer, &dh_key, &dh_iv);

        let dh_params = wire::ServerDhParams::Ok(wire::ServerDhParamsOk { nonce, server_nonce, encrypted_answer });

        let now = server_time;
        let rnd272 = [4u8; 272];
        let (req3, s3) = do_step3::<std::io::Error>(s2, dh_params, &rnd272, now).unwrap();
        assert_eq!(req3.nonce, nonce);

        let b = BigUint::from_bytes_be(&rnd272[..256]);
        let expected_gab = g_a.modpow(&b, &dh_prime);

        let auth_key_bytes = {
            let mut kb = [0u8; 256];
            let gab_bytes = expected_gab.to_bytes_be();
            kb[256 - gab_bytes.len()..].copy_from_slice(&gab_bytes);
            kb
        };
        let auth_key = CryptoKey::from_bytes(auth_key_bytes);
        let hash1 = auth_key.calc_new_nonce_hash(&new_nonce, 1);

        let answer = wire::SetClientDhParamsAnswer::Ok(wire::DhGenOk { nonce, server_nonce, new_nonce_hash1: hash1 });

        let finished = finish::<std::io::Error>(s3, answer).unwrap();
        assert_eq!(finished.auth_key, auth_key_bytes);
    }

    #[test]
    fn mismatched_nonce_in_res_pq_is_rejected() {
        let key = test_key();
        let (_req1, s1) = do_step1::<std::io::Error>(&[1u8; 16]).unwrap();
        let res_pq = wire::ResPq {
            nonce: [0xffu8; 16], // wrong nonce
            server_nonce: [2u8; 16],
            pq: 1470626929934143021u64.to_be_bytes().to_vec(),
            server_public_key_fingerprints: vec![rsa::fingerprint(&key)],
        };
        let err = do_step2::<std::io::Error>(s1, res_pq, &key, &[3u8; 256]).unwrap_err();
        assert!(matches!(err, Error::InvalidNonce));
    }

    #[test]
    fn unknown_fingerprint_is_rejected() {
        let key = test_key();
        let (_req1, s1) = do_step1::<std::io::Error>(&[1u8; 16]).unwrap();
        let res_pq = wire::ResPq {
            nonce: [1u8; 16],
            server_nonce: [2u8; 16],
            pq: 1470626929934143021u64.to_be_bytes().to_vec(),
            server_public_key_fingerprints: vec![12345],
        };
        let err = do_step2::<std::io::Error>(s1, res_pq, &key, &[3u8; 256]).unwrap_err();
        assert!(matches!(err, Error::UnknownFingerprint { .. }));
    }

    #[test]
    fn unsafe_dh_prime_is_rejected() {
        let key = test_key();
        let nonce = [1u8; 16];
        let server_nonce = [2u8; 16];
        let (_req1, s1) = do_step1::<std::io::Error>(&nonce).unwrap();
        let res_pq = wire::ResPq {
            nonce,
            server_nonce,
            pq: 1470626929934143021u64.to_be_bytes().to_vec(),
            server_public_key_fingerprints: vec![rsa::fingerprint(&key)],
        };
        let rnd256 = [3u8; 256];
        let (_req2, s2) = do_step2::<std::io::Error>(s1, res_pq, &key, &rnd256).unwrap();
        let new_nonce: [u8; 32] = rnd256[..32].try_into().unwrap();
        let (dh_key, dh_iv) = generate_key_data_from_nonce(&server_nonce, &new_nonce);

        // not in the allow-list
        let bogus_prime = BigUint::from(987654321u64);
        let server_inner = wire::ServerDhInnerData {
            nonce,
            server_nonce,
            g: 3,
            dh_prime: bogus_prime.to_bytes_be(),
            g_a: BigUint::from(12345u32).to_bytes_be(),
            server_time: 1_700_000_000,
        };
        let inner_bytes = server_inner.to_bytes();
        let hash = sha1!(&inner_bytes);
        let mut plain = Vec::new();
        plain.extend_from_slice(&hash);
        plain.extend_from_slice(&inner_bytes);
        while plain.len() % 16 != 0 {
            plain.push(0);
        }
        aes::ige_encrypt(&mut plain, &dh_key, &dh_iv);

        let dh_params = wire::ServerDhParams::Ok(wire::ServerDhParamsOk { nonce, server_nonce, encrypted_answer: plain });
        let err = do_step3::<std::io::Error>(s2, dh_params, &[4u8; 272], 1_700_000_000).unwrap_err();
        assert!(matches!(err, Error::GParameterOutOfRange));
    }
}
