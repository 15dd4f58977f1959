//! Cryptographic operations for the SCP02 secure channel
//!
//! Session keys are never derived here. They arrive from the key derivation
//! service wrapped under a shared secret and are only unwrapped locally.
//! The remaining operations are the C-MAC computation with its chained ICV
//! and encryption of command data fields.

use cbc_mac::{CbcMac, Mac};
use cipher::{
    BlockDecrypt, BlockEncrypt, BlockEncryptMut, Iv, IvSizeUser, Key, KeyInit, KeyIvInit,
    KeySizeUser,
    block_padding::{Iso7816, RawPadding},
    consts::{U8, U16},
    generic_array::GenericArray,
};
use des::{Des, TdesEde3};

use crate::{Error, Result};

/// C-MAC value
pub type CMac = [u8; 8];

/// DES block size
pub const BLOCK: usize = 8;

/// Key and ICV sizes used by SCP02: two-key 3DES keys, DES-sized chaining values
#[derive(Debug, Clone, Copy)]
pub struct Scp02;

impl KeySizeUser for Scp02 {
    type KeySize = U16;
}

impl IvSizeUser for Scp02 {
    type IvSize = U8;
}

/// Convert a 16-byte slice into an SCP02 key
pub fn key_from_slice(bytes: &[u8]) -> Result<Key<Scp02>> {
    if bytes.len() != 16 {
        return Err(Error::InvalidLength {
            expected: 16,
            actual: bytes.len(),
        });
    }
    Ok(Key::<Scp02>::clone_from_slice(bytes))
}

/// Unwrap a 16-byte session key with the shared secret (two-key 3DES, ECB)
pub fn unwrap_session_key(shared_secret: &Key<Scp02>, wrapped: &[u8]) -> Result<Key<Scp02>> {
    if wrapped.len() != 16 {
        return Err(Error::Crypto("wrapped session key must be 16 bytes"));
    }
    let cipher = TdesEde3::new(&expand_two_key(shared_secret));
    let mut key = Key::<Scp02>::default();
    for (out, chunk) in key.chunks_mut(BLOCK).zip(wrapped.chunks(BLOCK)) {
        let mut block = GenericArray::clone_from_slice(chunk);
        cipher.decrypt_block(&mut block);
        out.copy_from_slice(&block);
    }
    Ok(key)
}

/// ISO 7816-4 padding: `80` then zeros up to the next block boundary
///
/// A full block of padding is added when the input is already aligned.
pub fn pad_iso7816(data: &[u8]) -> Vec<u8> {
    let pos = data.len() % BLOCK;
    let start = data.len() - pos;
    let mut padded = data.to_vec();
    padded.resize(start + BLOCK, 0);
    Iso7816::raw_pad(&mut padded[start..], pos);
    padded
}

/// Encrypt a command data field: ISO padding then 3DES-CBC with a zero IV
pub fn encrypt_data_field(enc_key: &Key<Scp02>, data: &[u8]) -> Vec<u8> {
    let mut padded = pad_iso7816(data);
    let mut encryptor =
        cbc::Encryptor::<TdesEde3>::new(&expand_two_key(enc_key), &Iv::<Scp02>::default());
    for chunk in padded.chunks_mut(BLOCK) {
        encryptor.encrypt_block_mut(GenericArray::from_mut_slice(chunk));
    }
    padded
}

/// ISO 9797-1 MAC algorithm 3 over ISO-padded `data`, chained from `iv`
///
/// Every block but the last goes through single DES; the last through 3DES.
pub fn retail_mac(key: &Key<Scp02>, iv: &Iv<Scp02>, data: &[u8]) -> CMac {
    let padded = pad_iso7816(data);
    let (head, last) = padded.split_at(padded.len() - BLOCK);

    let single = Des::new(GenericArray::from_slice(&key[..8]));
    let triple = TdesEde3::new(&expand_two_key(key));

    let mut chain = *iv;
    for chunk in head.chunks(BLOCK) {
        xor_into(&mut chain, chunk);
        single.encrypt_block(&mut chain);
    }
    xor_into(&mut chain, last);
    triple.encrypt_block(&mut chain);
    chain.into()
}

fn xor_into(acc: &mut Iv<Scp02>, block: &[u8]) {
    acc.iter_mut().zip(block).for_each(|(a, b)| *a ^= b);
}

/// ICV for the next command: the previous C-MAC under single DES with the first key half
pub fn encrypt_icv(mac_key: &Key<Scp02>, icv: &Iv<Scp02>) -> Iv<Scp02> {
    let mut mac = <CbcMac<Des> as Mac>::new(GenericArray::from_slice(&mac_key[..8]));
    mac.update(icv.as_ref());
    mac.finalize().into_bytes()
}

/// K1 K2 as the K1 K2 K1 key expected by the 3DES cipher
pub fn expand_two_key(key: &Key<Scp02>) -> Key<TdesEde3> {
    let mut full = Key::<TdesEde3>::default();
    full[..16].copy_from_slice(key);
    full[16..].copy_from_slice(&key[..8]);
    full
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn wrap(secret: &Key<Scp02>, key: &[u8; 16]) -> Vec<u8> {
        let cipher = TdesEde3::new(&expand_two_key(secret));
        key.chunks(BLOCK)
            .flat_map(|chunk| {
                let mut block = GenericArray::clone_from_slice(chunk);
                cipher.encrypt_block(&mut block);
                block.to_vec()
            })
            .collect()
    }

    #[test]
    fn two_key_expansion_repeats_first_half() {
        let key = Key::<Scp02>::clone_from_slice(&hex!("00112233445566778899aabbccddeeff"));
        assert_eq!(
            expand_two_key(&key).as_slice(),
            hex!("00112233445566778899aabbccddeeff0011223344556677")
        );
    }

    #[test]
    fn test_unwrap_session_key_is_deterministic() {
        let secret = Key::<Scp02>::clone_from_slice(&hex!("404142434445464748494a4b4c4d4e4f"));
        let session = hex!("5b02e75ad63190aece0622936f11abab");
        let wrapped = wrap(&secret, &session);
        assert_ne!(wrapped.as_slice(), session.as_slice());

        let first = unwrap_session_key(&secret, &wrapped).unwrap();
        let second = unwrap_session_key(&secret, &wrapped).unwrap();
        assert_eq!(first.as_slice(), session);
        assert_eq!(first, second);

        assert!(unwrap_session_key(&secret, &wrapped[..15]).is_err());
    }

    #[test]
    fn test_pad_iso7816() {
        assert_eq!(pad_iso7816(&hex!("0102")), hex!("0102800000000000"));
        assert_eq!(
            pad_iso7816(&hex!("0102030405060708")),
            hex!("01020304050607088000000000000000")
        );
    }

    #[test]
    fn test_encrypt_data_field_length() {
        let key = Key::<Scp02>::clone_from_slice(&hex!("404142434445464748494a4b4c4d4e4f"));
        assert_eq!(encrypt_data_field(&key, &[0u8; 7]).len(), 8);
        assert_eq!(encrypt_data_field(&key, &[0u8; 8]).len(), 16);
    }

    #[test]
    fn retail_mac_known_answer() {
        let key = Key::<Scp02>::clone_from_slice(&hex!("5b02e75ad63190aece0622936f11abab"));
        let mac = retail_mac(&key, &Iv::<Scp02>::default(), &hex!("8482010010810b098a8fbb88da"));
        assert_eq!(mac, hex!("5271d7174a5a166a"));
    }
}
