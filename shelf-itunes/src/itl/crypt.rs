//! Payload encryption and compression
//!
//! The payload after the `hdfm` header is AES-128 in ECB mode with a fixed
//! key. From major version 10 on only the first 100 KiB are encrypted. A
//! trailing partial block is never encrypted. Inside the encryption the
//! payload may be zlib-compressed.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

const ITL_KEY: &[u8; 16] = b"BHUILuilfghuila3";
const BLOCK_SIZE: usize = 16;
const PARTIAL_ENCRYPTION_LIMIT: usize = 102_400;
const ZLIB_MAGIC: u8 = 0x78;

fn major_version(version: &str) -> Option<u32> {
    version.split('.').next()?.trim().parse().ok()
}

/// Number of leading bytes covered by the cipher
fn encrypted_len(version: &str, len: usize) -> usize {
    let limit = match major_version(version) {
        Some(major) if major >= 10 => len.min(PARTIAL_ENCRYPTION_LIMIT),
        _ => len,
    };
    limit - limit % BLOCK_SIZE
}

pub(super) fn decrypt(version: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = payload.to_vec();
    let cipher = Aes128::new(GenericArray::from_slice(ITL_KEY));
    let limit = encrypted_len(version, out.len());
    for block in out[..limit].chunks_exact_mut(BLOCK_SIZE) {
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
    }
    out
}

pub(super) fn encrypt(version: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = payload.to_vec();
    let cipher = Aes128::new(GenericArray::from_slice(ITL_KEY));
    let limit = encrypted_len(version, out.len());
    for block in out[..limit].chunks_exact_mut(BLOCK_SIZE) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }
    out
}

/// Inflate a zlib payload; anything that is not zlib is returned as is
///
/// The flag tells whether the payload was compressed.
pub(super) fn inflate(data: Vec<u8>) -> (Vec<u8>, bool) {
    if data.first() != Some(&ZLIB_MAGIC) {
        return (data, false);
    }

    let mut out = Vec::with_capacity(data.len() * 4);
    match ZlibDecoder::new(data.as_slice()).read_to_end(&mut out) {
        Ok(_) => (out, true),
        Err(e) => {
            tracing::debug!(error = %e, "Payload starts like zlib but does not inflate, treating as raw");
            (data, false)
        }
    }
}

pub(super) fn deflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypted_len_by_version() {
        assert_eq!(encrypted_len("9.2.1", 200_000), 200_000);
        assert_eq!(encrypted_len("12.9.5.5", 200_000), PARTIAL_ENCRYPTION_LIMIT);
        assert_eq!(encrypted_len("12.0", 40), 32);
        assert_eq!(encrypted_len("", 17), 16);
    }

    #[test]
    fn test_cipher_round_trip_leaves_tail_in_clear() {
        let payload: Vec<u8> = (0..=40u8).collect();
        let sealed = encrypt("12.0", &payload);

        assert_ne!(sealed[..32], payload[..32]);
        assert_eq!(sealed[32..], payload[32..]);
        assert_eq!(decrypt("12.0", &sealed), payload);
    }

    #[test]
    fn test_inflate_passes_raw_data_through() {
        let raw = b"hdsm\0\0\0\x0c".to_vec();
        assert_eq!(inflate(raw.clone()), (raw, false));

        let packed = deflate(b"hdsm payload").unwrap();
        assert_eq!(inflate(packed), (b"hdsm payload".to_vec(), true));
    }
}
