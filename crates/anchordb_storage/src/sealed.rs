//! AES-256-GCM sealed journal wrapper.
//!
//! Every frame is sealed independently:
//! `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
//!
//! The first physical frame of a sealed journal is a key check: a fixed
//! marker sealed with the journal key. Opening with any other key fails
//! to authenticate that frame and reports [`StorageError::KeyMismatch`].

use crate::error::{StorageError, StorageResult};
use crate::journal::Journal;
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

const KEY_CHECK: &[u8] = b"anchordb/sealed-journal/v1";

/// Key used to seal journal frames. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SealingKey {
    bytes: [u8; KEY_SIZE],
}

impl SealingKey {
    /// Creates a key from exactly [`KEY_SIZE`] bytes.
    #[must_use]
    pub const fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Generates a random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for SealingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealingKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A journal whose frames are sealed with AES-256-GCM.
pub struct SealedJournal {
    inner: Box<dyn Journal>,
    cipher: Aes256Gcm,
}

impl SealedJournal {
    /// Wraps `inner`, writing the key check frame if the journal is empty.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::KeyMismatch`] if `inner` already holds frames
    /// that were not sealed with `key`.
    pub fn open(mut inner: Box<dyn Journal>, key: &SealingKey) -> StorageResult<Self> {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));
        let journal = if inner.frame_count() == 0 {
            let check = seal(&cipher, KEY_CHECK)?;
            inner.append(&check)?;
            Self { inner, cipher }
        } else {
            let frames = inner.frames()?;
            let first = frames.first().ok_or(StorageError::KeyMismatch)?;
            match unseal(&cipher, first) {
                Ok(marker) if marker == KEY_CHECK => Self { inner, cipher },
                _ => return Err(StorageError::KeyMismatch),
            }
        };
        Ok(journal)
    }
}

impl Journal for SealedJournal {
    fn append(&mut self, frame: &[u8]) -> StorageResult<u64> {
        let sealed = seal(&self.cipher, frame)?;
        let index = self.inner.append(&sealed)?;
        Ok(index.saturating_sub(1))
    }

    fn frames(&self) -> StorageResult<Vec<Vec<u8>>> {
        self.inner
            .frames()?
            .iter()
            .skip(1)
            .map(|sealed| unseal(&self.cipher, sealed))
            .collect()
    }

    fn frame_count(&self) -> u64 {
        self.inner.frame_count().saturating_sub(1)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.inner.sync()
    }
}

impl std::fmt::Debug for SealedJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedJournal")
            .field("frames", &self.frame_count())
            .field("cipher", &"Aes256Gcm")
            .finish()
    }
}

fn seal(cipher: &Aes256Gcm, plaintext: &[u8]) -> StorageResult<Vec<u8>> {
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| StorageError::Encryption("sealing failed".to_string()))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend(ciphertext);
    Ok(out)
}

fn unseal(cipher: &Aes256Gcm, sealed: &[u8]) -> StorageResult<Vec<u8>> {
    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(StorageError::Encryption("sealed frame too short".to_string()));
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| StorageError::Encryption("frame failed authentication".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryJournal;

    fn reopen(journal: &InMemoryJournal) -> Box<dyn Journal> {
        Box::new(InMemoryJournal::with_bytes(journal.bytes()).unwrap())
    }

    /// Copies the physical (still sealed) frames into a plain journal.
    fn physical_copy(sealed: &SealedJournal) -> InMemoryJournal {
        let mut copy = InMemoryJournal::new();
        for frame in sealed.inner.frames().unwrap() {
            copy.append(&frame).unwrap();
        }
        copy
    }

    #[test]
    fn sealed_frames_roundtrip() {
        let key = SealingKey::new([7u8; KEY_SIZE]);
        let mut journal = SealedJournal::open(Box::new(InMemoryJournal::new()), &key).unwrap();

        assert_eq!(journal.append(b"first commit").unwrap(), 0);
        assert_eq!(journal.append(b"second commit").unwrap(), 1);
        assert_eq!(journal.frame_count(), 2);
        assert_eq!(
            journal.frames().unwrap(),
            vec![b"first commit".to_vec(), b"second commit".to_vec()]
        );
    }

    #[test]
    fn plaintext_is_not_stored() {
        let key = SealingKey::generate();
        let mut journal = SealedJournal::open(Box::new(InMemoryJournal::new()), &key).unwrap();
        journal.append(b"visible-secret").unwrap();

        let physical = physical_copy(&journal).bytes();
        assert!(!physical.windows(14).any(|w| w == b"visible-secret"));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let key = SealingKey::new([1u8; KEY_SIZE]);
        let mut sealed = SealedJournal::open(Box::new(InMemoryJournal::new()), &key).unwrap();
        sealed.append(b"data").unwrap();
        let physical = physical_copy(&sealed);

        let other = SealingKey::new([2u8; KEY_SIZE]);
        let result = SealedJournal::open(reopen(&physical), &other);
        assert!(matches!(result, Err(StorageError::KeyMismatch)));

        let journal = SealedJournal::open(reopen(&physical), &key).unwrap();
        assert_eq!(journal.frames().unwrap(), vec![b"data".to_vec()]);
    }

    #[test]
    fn unsealed_journal_is_rejected() {
        let mut plain = InMemoryJournal::new();
        plain.append(b"header").unwrap();

        let key = SealingKey::generate();
        let result = SealedJournal::open(reopen(&plain), &key);
        assert!(matches!(result, Err(StorageError::KeyMismatch)));
    }

    #[test]
    fn debug_redacts_key() {
        let key = SealingKey::new([9u8; KEY_SIZE]);
        assert!(format!("{key:?}").contains("REDACTED"));
    }
}
