//! RSA padding used by Telegram's auth key exchange.

use std::fmt;

use num_bigint::BigUint;
use crate::{aes, sha1, sha256};

/// An RSA public key (n, e).
pub struct Key {
    n: BigUint,
    e: BigUint,
}

/// Errors parsing a PEM-encoded RSA public key.
#[derive(Debug)]
pub enum PemError {
    /// Missing `-----BEGIN ... -----`/`-----END ... -----` markers.
    NoPemMarkers,
    /// The base64 body between the markers didn't decode.
    InvalidBase64,
    /// The decoded bytes aren't a well-formed PKCS#1 `RSAPublicKey` DER sequence.
    MalformedDer,
}

impl fmt::Display for PemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPemMarkers => write!(f, "missing PEM BEGIN/END markers"),
            Self::InvalidBase64 => write!(f, "PEM body is not valid base64"),
            Self::MalformedDer => write!(f, "not a well-formed PKCS#1 RSAPublicKey DER sequence"),
        }
    }
}
impl std::error::Error for PemError {}

impl Key {
    /// Parse decimal `n` and `e` strings.
    pub fn new(n: &str, e: &str) -> Option<Self> {
        Some(Self {
            n: BigUint::parse_bytes(n.as_bytes(), 10)?,
            e: BigUint::parse_bytes(e.as_bytes(), 10)?,
        })
    }

    /// Parse a PEM-encoded PKCS#1 `RSAPublicKey` (`-----BEGIN RSA PUBLIC KEY-----`),
    /// the format Telegram publishes its server keys in.
    pub fn from_pem(pem: &str) -> Result<Self, PemError> {
        let body = pem
            .lines()
            .filter(|l| !l.starts_with("-----"))
            .collect::<String>();
        if body.is_empty() || !pem.contains("-----BEGIN") {
            return Err(PemError::NoPemMarkers);
        }
        use base64::Engine;
        let der = base64::engine::general_purpose::STANDARD
            .decode(body.as_bytes())
            .map_err(|_| PemError::InvalidBase64)?;
        Self::from_der(&der)
    }

    fn from_der(der: &[u8]) -> Result<Self, PemError> {
        let mut cur = DerCursor(der);
        let seq = cur.take_tlv(0x30).ok_or(PemError::MalformedDer)?;
        let mut inner = DerCursor(seq);
        let n = inner.take_tlv(0x02).ok_or(PemError::MalformedDer)?;
        let e = inner.take_tlv(0x02).ok_or(PemError::MalformedDer)?;
        Ok(Self {
            n: BigUint::from_bytes_be(strip_leading_zero(n)),
            e: BigUint::from_bytes_be(strip_leading_zero(e)),
        })
    }
}

fn strip_leading_zero(b: &[u8]) -> &[u8] {
    if b.len() > 1 && b[0] == 0 { &b[1..] } else { b }
}

/// Cursor over a DER buffer, just enough to read nested SEQUENCE/INTEGER TLVs.
struct DerCursor<'a>(&'a [u8]);

impl<'a> DerCursor<'a> {
    /// Read a tag+length+value triple matching `tag`, advancing past it.
    fn take_tlv(&mut self, tag: u8) -> Option<&'a [u8]> {
        let buf = self.0;
        if buf.is_empty() || buf[0] != tag {
            return None;
        }
        let (len, header_len) = if buf[1] & 0x80 == 0 {
            (buf[1] as usize, 2)
        } else {
            let n_len_bytes = (buf[1] & 0x7f) as usize;
            let mut len = 0usize;
            for &b in &buf[2..2 + n_len_bytes] {
                len = (len << 8) | b as usize;
            }
            (len, 2 + n_len_bytes)
        };
        let end = header_len + len;
        if end > buf.len() {
            return None;
        }
        self.0 = &buf[end..];
        Some(&buf[header_len..end])
    }
}

/// Lower 64 bits of the SHA-1 hash of the key's TL `rsa_public_key` encoding,
/// interpreted little-endian — Telegram's RSA key fingerprint.
pub fn fingerprint(key: &Key) -> i64 {
    let mut buf = Vec::new();
    tl_encode_bytes(&key.n.to_bytes_be(), &mut buf);
    tl_encode_bytes(&key.e.to_bytes_be(), &mut buf);
    let digest = sha1!(&buf);
    i64::from_le_bytes(digest[12..20].try_into().unwrap())
}

fn tl_encode_bytes(data: &[u8], out: &mut Vec<u8>) {
    let len = data.len();
    if len <= 253 {
        out.push(len as u8);
    } else {
        out.push(0xfe);
        out.push((len & 0xff) as u8);
        out.push(((len >> 8) & 0xff) as u8);
        out.push(((len >> 16) & 0xff) as u8);
    }
    out.extend_from_slice(data);
    let total = if len <= 253 { 1 + len } else { 4 + len };
    let padding = (4 - (total % 4)) % 4;
    out.extend(std::iter::repeat(0u8).take(padding));
}

fn increment(data: &mut [u8]) {
    let mut i = data.len() - 1;
    loop {
        let (n, overflow) = data[i].overflowing_add(1);
        data[i] = n;
        if overflow {
            i = i.checked_sub(1).unwrap_or(data.len() - 1);
        } else {
            break;
        }
    }
}

/// RSA-encrypt `data` using the MTProto RSA-PAD scheme.
///
/// `random_bytes` must be exactly 224 bytes of secure random data.
/// `data` must be â‰¤ 144 bytes.
pub fn encrypt_hashed(data: &[u8], key: &Key, random_bytes: &[u8; 224]) -> Vec<u8> {
    assert!(data.len() <= 144, "data too large for RSA-PAD");

    // data_with_padding: 192 bytes
    let mut data_with_padding = Vec::with_capacity(192);
    data_with_padding.extend_from_slice(data);
    data_with_padding.extend_from_slice(&random_bytes[..192 - data.len()]);

    // data_pad_reversed
    let data_pad_reversed: Vec<u8> = data_with_padding.iter().copied().rev().collect();

    let mut temp_key: [u8; 32] = random_bytes[192..].try_into().unwrap();

    let key_aes_encrypted = loop {
        // data_with_hash = data_pad_reversed + SHA256(temp_key + data_with_padding)
        let mut data_with_hash = Vec::with_capacity(224);
        data_with_hash.extend_from_slice(&data_pad_reversed);
        data_with_hash.extend_from_slice(&sha256!(&temp_key, &data_with_padding));

        aes::ige_encrypt(&mut data_with_hash, &temp_key, &[0u8; 32]);

        // temp_key_xor = temp_key XOR SHA256(aes_encrypted)
        let hash = sha256!(&data_with_hash);
        let mut xored = temp_key;
        for (a, b) in xored.iter_mut().zip(hash.iter()) { *a ^= b; }

        let mut candidate = Vec::with_capacity(256);
        candidate.extend_from_slice(&xored);
        candidate.extend_from_slice(&data_with_hash);

        if BigUint::from_bytes_be(&candidate) < key.n {
            break candidate;
        }
        increment(&mut temp_key);
    };

    let payload = BigUint::from_bytes_be(&key_aes_encrypted);
    let encrypted = payload.modpow(&key.e, &key.n);
    let mut block = encrypted.to_bytes_be();
    while block.len() < 256 { block.insert(0, 0); }
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_for_same_key() {
        let key = Key::new("25342889448840415564971689590713473206898847759084779052582026594546022463853940585885215951168491965708222649399180603818074200620463776135424884632162512403163793083921641631564740959529419359595852941166848940585952337613333022396096584117954892216031229237302943701877588456738335398602461675225081791820393153757504952636234951323237820036543581047826906120927972487366805292115792231423684261262330394324750785450942589751755390156647751460719351439969059949569615302809050721500330239005077889855323917509948255722081644689442127297605422579707142646660768825302832201908302295573257427896031830742328565032949", "65537").unwrap();
        let a = fingerprint(&key);
        let b = fingerprint(&key);
        assert_eq!(a, b);
    }

    #[test]
    fn different_keys_have_different_fingerprints() {
        let a = Key::new("101", "65537").unwrap();
        let b = Key::new("103", "65537").unwrap();
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn from_pem_rejects_garbage() {
        assert!(Key::from_pem("not a pem").is_err());
    }

    #[test]
    fn from_pem_roundtrips_a_small_key() {
        // PKCS#1 RSAPublicKey SEQUENCE{ INTEGER n=257, INTEGER e=65537 } built by hand.
        let der: &[u8] = &[
            0x30, 0x09, // SEQUENCE, len 9
            0x02, 0x02, 0x01, 0x01, // INTEGER n = 0x0101 = 257
            0x02, 0x03, 0x01, 0x00, 0x01, // INTEGER e = 0x010001 = 65537
        ];
        use base64::Engine;
        let b64 = base64::engine::general_purpose::STANDARD.encode(der);
        let pem = format!("-----BEGIN RSA PUBLIC KEY-----\n{b64}\n-----END RSA PUBLIC KEY-----\n");
        let key = Key::from_pem(&pem).unwrap();
        assert_eq!(key.n, BigUint::from(257u32));
        assert_eq!(key.e, BigUint::from(65537u32));
    }
}
