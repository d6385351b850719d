//! AES-256 in IGE mode.
//!
//! `iv` is 32 bytes: the first half seeds the "previous ciphertext" chain,
//! the second half the "previous plaintext" chain.

use aes::Aes256;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};

fn xor_block(dst: &mut [u8], src: &[u8; 16]) {
    for (a, b) in dst.iter_mut().zip(src) {
        *a ^= b;
    }
}

/// Encrypt `buffer` in place. Its length must be a multiple of 16.
pub fn ige_encrypt(buffer: &mut [u8], key: &[u8; 32], iv: &[u8; 32]) {
    assert_eq!(buffer.len() % 16, 0, "IGE input must be block aligned");
    let cipher = Aes256::new(GenericArray::from_slice(key));

    let mut prev_cipher: [u8; 16] = core::array::from_fn(|i| iv[i]);
    let mut prev_plain: [u8; 16] = core::array::from_fn(|i| iv[16 + i]);

    for block in buffer.chunks_exact_mut(16) {
        let plain: [u8; 16] = core::array::from_fn(|i| block[i]);
        xor_block(block, &prev_cipher);
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
        xor_block(block, &prev_plain);
        prev_cipher = core::array::from_fn(|i| block[i]);
        prev_plain = plain;
    }
}

/// Decrypt `buffer` in place. Its length must be a multiple of 16.
pub fn ige_decrypt(buffer: &mut [u8], key: &[u8; 32], iv: &[u8; 32]) {
    assert_eq!(buffer.len() % 16, 0, "IGE input must be block aligned");
    let cipher = Aes256::new(GenericArray::from_slice(key));

    let mut prev_cipher: [u8; 16] = core::array::from_fn(|i| iv[i]);
    let mut prev_plain: [u8; 16] = core::array::from_fn(|i| iv[16 + i]);

    for block in buffer.chunks_exact_mut(16) {
        let ciphertext: [u8; 16] = core::array::from_fn(|i| block[i]);
        xor_block(block, &prev_plain);
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
        xor_block(block, &prev_cipher);
        prev_plain = core::array::from_fn(|i| block[i]);
        prev_cipher = ciphertext;
    }
}
