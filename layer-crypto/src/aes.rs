//! AES-256 in Infinite Garble Extension (IGE) mode.
//!
//! MTProto does not use a standard block cipher mode: IGE chains both the
//! plaintext *and* the ciphertext of the previous block into the next one,
//! so a single corrupted ciphertext byte garbles every following plaintext
//! block on decrypt. `key` is the raw 256-bit AES key; `iv` is 32 bytes,
//! the first half seeding `P_{-1}`, the second half seeding `C_{-1}`.

use aes::Aes256;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit, generic_array::GenericArray};

fn block_cipher(key: &[u8; 32]) -> Aes256 {
    Aes256::new(GenericArray::from_slice(key))
}

fn xor_assign(a: &mut [u8; 16], b: &[u8]) {
    for i in 0..16 {
        a[i] ^= b[i];
    }
}

/// Encrypt `data` in place. `data.len()` must be a multiple of 16.
pub fn ige_encrypt(data: &mut [u8], key: &[u8; 32], iv: &[u8; 32]) {
    assert_eq!(data.len() % 16, 0, "IGE operates on whole 16-byte blocks");
    let cipher = block_cipher(key);
    let mut prev_plain: [u8; 16] = iv[..16].try_into().unwrap();
    let mut prev_cipher: [u8; 16] = iv[16..].try_into().unwrap();

    for block in data.chunks_mut(16) {
        let plain: [u8; 16] = block.try_into().unwrap();
        let mut work = plain;
        xor_assign(&mut work, &prev_cipher);

        let mut ga = GenericArray::clone_from_slice(&work);
        cipher.encrypt_block(&mut ga);
        let mut out: [u8; 16] = ga.into();
        xor_assign(&mut out, &prev_plain);

        block.copy_from_slice(&out);
        prev_plain = plain;
        prev_cipher = out;
    }
}

/// Decrypt `data` in place. `data.len()` must be a multiple of 16.
pub fn ige_decrypt(data: &mut [u8], key: &[u8; 32], iv: &[u8; 32]) {
    assert_eq!(data.len() % 16, 0, "IGE operates on whole 16-byte blocks");
    let cipher = block_cipher(key);
    let mut prev_plain: [u8; 16] = iv[..16].try_into().unwrap();
    let mut prev_cipher: [u8; 16] = iv[16..].try_into().unwrap();

    for block in data.chunks_mut(16) {
        let cipher_block: [u8; 16] = block.try_into().unwrap();
        let mut work = cipher_block;
        xor_assign(&mut work, &prev_plain);

        let mut ga = GenericArray::clone_from_slice(&work);
        cipher.decrypt_block(&mut ga);
        let mut out: [u8; 16] = ga.into();
        xor_assign(&mut out, &prev_cipher);

        block.copy_from_slice(&out);
        prev_plain = out;
        prev_cipher = cipher_block;
    }
}

/// Incremental IGE decryption for a ciphertext that arrives in pieces off
/// the wire. Feeds whole 16-byte blocks through as they become available
/// and buffers any short remainder, so callers can interleave network
/// reads with decryption instead of waiting for the full frame.
pub struct IgeDecryptStream {
    cipher: Aes256,
    prev_plain: [u8; 16],
    prev_cipher: [u8; 16],
    carry: Vec<u8>,
    out: Vec<u8>,
}

impl IgeDecryptStream {
    /// Start a new stream with the given key/iv (same layout as [`ige_decrypt`]).
    pub fn new(key: &[u8; 32], iv: &[u8; 32]) -> Self {
        Self {
            cipher: block_cipher(key),
            prev_plain: iv[..16].try_into().unwrap(),
            prev_cipher: iv[16..].try_into().unwrap(),
            carry: Vec::new(),
            out: Vec::new(),
        }
    }

    /// Feed the next chunk of ciphertext. Returns the number of new
    /// plaintext bytes produced (also appended to [`Self::plaintext`]).
    pub fn feed(&mut self, chunk: &[u8]) -> usize {
        self.carry.extend_from_slice(chunk);
        let whole = (self.carry.len() / 16) * 16;
        let start = self.out.len();

        for i in (0..whole).step_by(16) {
            let cipher_block: [u8; 16] = self.carry[i..i + 16].try_into().unwrap();
            let mut work = cipher_block;
            xor_assign(&mut work, &self.prev_plain);

            let mut ga = GenericArray::clone_from_slice(&work);
            self.cipher.decrypt_block(&mut ga);
            let mut plain: [u8; 16] = ga.into();
            xor_assign(&mut plain, &self.prev_cipher);

            self.out.extend_from_slice(&plain);
            self.prev_plain = plain;
            self.prev_cipher = cipher_block;
        }
        self.carry.drain(..whole);
        self.out.len() - start
    }

    /// All plaintext decrypted so far.
    pub fn plaintext(&self) -> &[u8] {
        &self.out
    }

    /// True if every fed byte has formed a complete 16-byte block.
    pub fn is_block_aligned(&self) -> bool {
        self.carry.is_empty()
    }
}
