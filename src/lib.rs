//! [OCB3][1] ([RFC 7253][2]): [Authenticated Encryption with Associated
//! Data (AEAD)][3] mode of operation for 128-bit block ciphers, with
//! incremental (streaming) processing of both the associated data and the
//! message.
//!
//! # Security Warning
//!
//! Nonces must never repeat for a given key; the engine does not (and
//! cannot) enforce this. RFC 7253 additionally recommends processing no
//! more than [`BLOCKS_PER_KEY_LIMIT`] blocks under any one key.
//!
//! During streaming decryption, plaintext is returned before the tag has
//! been checked. Nothing a [`Session`] produced may be trusted until
//! [`Session::verify`] succeeds.
//!
//! # Usage
//!
//! Simple usage (allocating, no associated data):
//!
//! ```
//! use ocb3::Aes128Ocb3;
//! use ocb3::aead::{Aead, NewAead, generic_array::GenericArray};
//!
//! let key = GenericArray::from_slice(b"an example key 1");
//! let cipher = Aes128Ocb3::new(key);
//!
//! let nonce = GenericArray::from_slice(b"unique nonce"); // 96-bits; unique per message
//!
//! let ciphertext = cipher.encrypt(nonce, b"plaintext message".as_ref())
//!     .expect("encryption failure!"); // NOTE: handle this error to avoid panics!
//!
//! let plaintext = cipher.decrypt(nonce, ciphertext.as_ref())
//!     .expect("decryption failure!"); // NOTE: handle this error to avoid panics!
//!
//! assert_eq!(&plaintext, b"plaintext message");
//! ```
//!
//! ## Streaming Usage
//!
//! A [`Session`] processes associated data and message incrementally, in
//! arbitrary chunk sizes, with nonces of 1 to 15 bytes and tags of 8 to
//! 16 bytes:
//!
//! ```
//! use aes::Aes128;
//! use ocb3::Session;
//! use ocb3::aead::generic_array::GenericArray;
//! use ocb3::cipher::NewBlockCipher;
//!
//! let key = GenericArray::from_slice(b"an example key 1");
//!
//! let mut session = Session::open(Aes128::new(key), b"unique nonce", 16).unwrap();
//! session.absorb(b"additional data").unwrap();
//! let mut ciphertext = session.encrypt(b"first chunk ").unwrap();
//! ciphertext.extend(session.encrypt(b"second chunk").unwrap());
//! ciphertext.extend(session.finalize_encrypt().unwrap());
//! let tag = session.digest().unwrap();
//!
//! let mut session = Session::open(Aes128::new(key), b"unique nonce", 16).unwrap();
//! session.absorb(b"additional data").unwrap();
//! let mut plaintext = session.decrypt(&ciphertext).unwrap();
//! plaintext.extend(session.finalize_decrypt().unwrap());
//! session.verify(&tag).unwrap();
//!
//! assert_eq!(plaintext, b"first chunk second chunk");
//! ```
//!
//! [1]: https://en.wikipedia.org/wiki/OCB_mode
//! [2]: https://tools.ietf.org/html/rfc7253
//! [3]: https://en.wikipedia.org/wiki/Authenticated_encryption

#![no_std]
#![doc(
    html_logo_url = "https://raw.githubusercontent.com/RustCrypto/meta/master/logo.svg",
    html_favicon_url = "https://raw.githubusercontent.com/RustCrypto/meta/master/logo.svg"
)]
#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

#[cfg(feature = "alloc")]
extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub use aead;
pub use cipher;

mod error;
mod ltree;
mod session;
mod util;

pub use crate::error::Error;
pub use crate::session::Session;

use aead::{AeadCore, AeadInPlace, NewAead};
use cipher::{
    consts::{U0, U12, U16},
    generic_array::GenericArray,
    BlockCipher, BlockDecrypt, BlockEncrypt, NewBlockCipher,
};
use subtle::ConstantTimeEq;

#[cfg(feature = "aes")]
use aes::{Aes128, Aes192, Aes256};

/// Maximum number of blocks processed under a single key recommended by
/// RFC 7253 Section 5. Not enforced: the caller tracks usage across
/// messages.
pub const BLOCKS_PER_KEY_LIMIT: u64 = 1 << 48;

/// OCB3 tags produced by the fixed-size AEAD interface.
pub type Tag = GenericArray<u8, U16>;

/// Tag size used by the fixed-size AEAD interface, in bytes.
const TAG_SIZE: usize = 16;

/// OCB3 with AES-128
#[cfg(feature = "aes")]
pub type Aes128Ocb3 = Ocb3<Aes128>;

/// OCB3 with AES-192
#[cfg(feature = "aes")]
pub type Aes192Ocb3 = Ocb3<Aes192>;

/// OCB3 with AES-256
#[cfg(feature = "aes")]
pub type Aes256Ocb3 = Ocb3<Aes256>;

/// OCB3: nonce-based AEAD mode for 128-bit block ciphers (RFC 7253).
///
/// This type is the one-shot front end with a fixed 96-bit nonce and
/// 128-bit tag; it is generic to support substituting alternative cipher
/// implementations. If in doubt, use the built-in [`Aes128Ocb3`] and
/// [`Aes256Ocb3`] type aliases, or [`Ocb3::session`] for streaming and
/// for other nonce/tag sizes.
#[derive(Clone)]
pub struct Ocb3<C>
where
    C: BlockCipher<BlockSize = U16> + BlockEncrypt + BlockDecrypt + Clone,
{
    /// Keyed block cipher, shared with the sessions this instance opens.
    cipher: C,
}

impl<C> Ocb3<C>
where
    C: BlockCipher<BlockSize = U16> + BlockEncrypt + BlockDecrypt + Clone,
{
    /// Wrap an already-keyed block cipher.
    pub fn from_cipher(cipher: C) -> Self {
        Self { cipher }
    }

    /// Open a streaming [`Session`] for one message.
    ///
    /// Unlike the fixed-size [`AeadCore`] interface, sessions accept
    /// nonces of 1 to 15 bytes and tag lengths of 8 to 16 bytes.
    pub fn session(&self, nonce: &[u8], tag_len: usize) -> Result<Session<C>, Error> {
        Session::open(self.cipher.clone(), nonce, tag_len)
    }
}

impl<C> NewAead for Ocb3<C>
where
    C: BlockCipher<BlockSize = U16> + BlockEncrypt + BlockDecrypt + NewBlockCipher + Clone,
{
    type KeySize = C::KeySize;

    fn new(key: &GenericArray<u8, C::KeySize>) -> Self {
        Self {
            cipher: C::new(key),
        }
    }
}

impl<C> AeadCore for Ocb3<C>
where
    C: BlockCipher<BlockSize = U16> + BlockEncrypt + BlockDecrypt + Clone,
{
    type NonceSize = U12;
    type TagSize = U16;
    type CiphertextOverhead = U0;
}

impl<C> AeadInPlace for Ocb3<C>
where
    C: BlockCipher<BlockSize = U16> + BlockEncrypt + BlockDecrypt + Clone,
{
    fn encrypt_in_place_detached(
        &self,
        nonce: &GenericArray<u8, Self::NonceSize>,
        associated_data: &[u8],
        buffer: &mut [u8],
    ) -> Result<Tag, aead::Error> {
        let mut session = Session::open(self.cipher.clone(), nonce.as_slice(), TAG_SIZE)?;
        session.absorb(associated_data)?;
        session.encrypt_all_in_place(buffer);
        Ok(session.compute_tag().into())
    }

    fn decrypt_in_place_detached(
        &self,
        nonce: &GenericArray<u8, Self::NonceSize>,
        associated_data: &[u8],
        buffer: &mut [u8],
        tag: &Tag,
    ) -> Result<(), aead::Error> {
        let mut session = Session::open(self.cipher.clone(), nonce.as_slice(), TAG_SIZE)?;
        session.absorb(associated_data)?;
        session.decrypt_all_in_place(buffer);
        let expected = session.compute_tag();

        if expected[..].ct_eq(tag.as_slice()).unwrap_u8() == 1 {
            Ok(())
        } else {
            // On MAC verify failure, re-encrypt the plaintext buffer to
            // prevent accidental exposure.
            let mut session = Session::open(self.cipher.clone(), nonce.as_slice(), TAG_SIZE)?;
            session.encrypt_all_in_place(buffer);
            Err(aead::Error)
        }
    }
}
