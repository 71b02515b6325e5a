//! Per-message OCB3 state: nonce-derived offsets, incremental associated
//! data and message processing, and tag finalization.

#[cfg(feature = "alloc")]
use alloc::vec::Vec;
use core::convert::TryInto;

use cipher::{consts::U16, generic_array::GenericArray, BlockCipher, BlockDecrypt, BlockEncrypt};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::error::Error;
use crate::ltree::LTree;
use crate::util::{ntz, xor_in_place};

const BLOCK_SIZE: usize = 16;

/// Phases of the per-message state machine.
///
/// Encryption and decryption may not be mixed within one session, and the
/// tag only becomes available once the corresponding stream was finalized.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Phase {
    Init,
    Ad,
    Encrypt,
    Decrypt,
    EncFinal,
    DecFinal,
    TagReady,
    Closed,
}

/// Accumulator for unaligned tail bytes, always holding fewer than 16.
#[derive(Debug)]
struct Pending {
    buf: [u8; BLOCK_SIZE],
    len: usize,
}

impl Pending {
    fn new() -> Self {
        Self {
            buf: [0u8; BLOCK_SIZE],
            len: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn is_full(&self) -> bool {
        self.len == BLOCK_SIZE
    }

    /// Copy bytes out of `input` until full, returning the unconsumed rest.
    fn fill<'a>(&mut self, input: &'a [u8]) -> &'a [u8] {
        let take = core::cmp::min(BLOCK_SIZE - self.len, input.len());
        self.buf[self.len..self.len + take].copy_from_slice(&input[..take]);
        self.len += take;
        &input[take..]
    }

    fn take(&mut self) -> [u8; BLOCK_SIZE] {
        debug_assert!(self.is_full());
        self.len = 0;
        self.buf
    }

    fn set(&mut self, tail: &[u8]) {
        debug_assert!(tail.len() < BLOCK_SIZE);
        self.buf[..tail.len()].copy_from_slice(tail);
        self.len = tail.len();
    }

    fn bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    fn clear(&mut self) {
        self.len = 0;
    }
}

impl Zeroize for Pending {
    fn zeroize(&mut self) {
        self.buf.zeroize();
        self.len = 0;
    }
}

/// Streaming OCB3 context for a single message.
///
/// A session owns its block cipher and is bound to one (key, nonce) pair;
/// the nonce MUST NOT be reused under the same key. Feed associated data
/// with [`absorb`](Session::absorb), then stream the message through
/// [`encrypt`](Session::encrypt)/[`finalize_encrypt`](Session::finalize_encrypt)
/// (or the `decrypt` pair), and finish with [`digest`](Session::digest) or
/// [`verify`](Session::verify). Up to 15 unaligned bytes are buffered
/// between calls; output otherwise corresponds positionally to the input.
///
/// Sessions are not safe for concurrent mutation. Independent sessions are
/// fully independent. All key-derived material is zeroized on drop.
#[derive(Debug)]
pub struct Session<C>
where
    C: BlockCipher<BlockSize = U16> + BlockEncrypt + BlockDecrypt,
{
    cipher: C,
    tag_len: usize,
    ltree: LTree,
    offset_ad: [u8; BLOCK_SIZE],
    sum_ad: [u8; BLOCK_SIZE],
    blocks_ad: u64,
    pending_ad: Pending,
    offset_msg: [u8; BLOCK_SIZE],
    checksum: [u8; BLOCK_SIZE],
    blocks_msg: u64,
    pending_msg: Pending,
    phase: Phase,
    tag: Option<[u8; BLOCK_SIZE]>,
}

impl<C> Session<C>
where
    C: BlockCipher<BlockSize = U16> + BlockEncrypt + BlockDecrypt,
{
    /// Open a session for one message under `cipher`.
    ///
    /// The nonce is 1 to 15 bytes and must be unique per key; the tag is
    /// truncated to `tag_len` bytes (8 to 16). The tag length is bound
    /// into the initial offset, so the same message under the same nonce
    /// but a different `tag_len` yields unrelated ciphertext.
    pub fn open(cipher: C, nonce: &[u8], tag_len: usize) -> Result<Self, Error> {
        if nonce.is_empty() || nonce.len() > 15 {
            return Err(Error::InvalidNonceLength);
        }
        if tag_len < 8 || tag_len > 16 {
            return Err(Error::InvalidTagLength);
        }

        let mut zeros = [0u8; BLOCK_SIZE];
        cipher.encrypt_block(GenericArray::from_mut_slice(&mut zeros));
        let ltree = LTree::new(zeros);
        let offset_msg = initial_offset(&cipher, nonce, tag_len);

        Ok(Self {
            cipher,
            tag_len,
            ltree,
            offset_ad: [0u8; BLOCK_SIZE],
            sum_ad: [0u8; BLOCK_SIZE],
            blocks_ad: 0,
            pending_ad: Pending::new(),
            offset_msg,
            checksum: [0u8; BLOCK_SIZE],
            blocks_msg: 0,
            pending_msg: Pending::new(),
            phase: Phase::Init,
            tag: None,
        })
    }

    /// Absorb associated data. May be called any number of times, but
    /// only before the first message bytes are fed.
    pub fn absorb(&mut self, associated_data: &[u8]) -> Result<(), Error> {
        match self.phase {
            Phase::Init | Phase::Ad => self.phase = Phase::Ad,
            _ => return Err(self.fail(Error::InvalidSequence)),
        }

        let mut input = associated_data;
        if !self.pending_ad.is_empty() {
            input = self.pending_ad.fill(input);
            if !self.pending_ad.is_full() {
                return Ok(());
            }
            let block = self.pending_ad.take();
            self.absorb_block(&block);
        }
        let mut chunks = input.chunks_exact(BLOCK_SIZE);
        for chunk in &mut chunks {
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(chunk);
            self.absorb_block(&block);
        }
        self.pending_ad.set(chunks.remainder());
        Ok(())
    }

    /// Stream plaintext, returning the ciphertext for every full block
    /// available so far. Up to 15 trailing bytes stay buffered until the
    /// next call or [`finalize_encrypt`](Session::finalize_encrypt).
    #[cfg(feature = "alloc")]
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        match self.phase {
            Phase::Init | Phase::Ad | Phase::Encrypt => self.phase = Phase::Encrypt,
            _ => return Err(self.fail(Error::InvalidSequence)),
        }

        let mut out = Vec::with_capacity(self.pending_msg.len + plaintext.len());
        let mut input = plaintext;
        if !self.pending_msg.is_empty() {
            input = self.pending_msg.fill(input);
            if !self.pending_msg.is_full() {
                return Ok(out);
            }
            let mut block = self.pending_msg.take();
            self.encrypt_block(&mut block);
            out.extend_from_slice(&block);
        }
        let mut chunks = input.chunks_exact(BLOCK_SIZE);
        for chunk in &mut chunks {
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(chunk);
            self.encrypt_block(&mut block);
            out.extend_from_slice(&block);
        }
        self.pending_msg.set(chunks.remainder());
        Ok(out)
    }

    /// Signal end of plaintext, returning the final 0 to 15 ciphertext
    /// bytes. After this only [`digest`](Session::digest) is permitted.
    #[cfg(feature = "alloc")]
    pub fn finalize_encrypt(&mut self) -> Result<Vec<u8>, Error> {
        match self.phase {
            Phase::Init | Phase::Ad | Phase::Encrypt => self.phase = Phase::EncFinal,
            _ => return Err(self.fail(Error::InvalidSequence)),
        }

        let len = self.pending_msg.len;
        let mut tail = [0u8; BLOCK_SIZE];
        tail[..len].copy_from_slice(self.pending_msg.bytes());
        self.pending_msg.clear();

        let mut out = Vec::with_capacity(len);
        if len > 0 {
            self.encrypt_partial(&mut tail[..len]);
            out.extend_from_slice(&tail[..len]);
        }
        Ok(out)
    }

    /// Stream ciphertext, returning the plaintext for every full block
    /// available so far.
    ///
    /// The returned plaintext is NOT yet authenticated; nothing produced
    /// by this session may be trusted until [`verify`](Session::verify)
    /// succeeds.
    #[cfg(feature = "alloc")]
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        match self.phase {
            Phase::Init | Phase::Ad | Phase::Decrypt => self.phase = Phase::Decrypt,
            _ => return Err(self.fail(Error::InvalidSequence)),
        }

        let mut out = Vec::with_capacity(self.pending_msg.len + ciphertext.len());
        let mut input = ciphertext;
        if !self.pending_msg.is_empty() {
            input = self.pending_msg.fill(input);
            if !self.pending_msg.is_full() {
                return Ok(out);
            }
            let mut block = self.pending_msg.take();
            self.decrypt_block(&mut block);
            out.extend_from_slice(&block);
        }
        let mut chunks = input.chunks_exact(BLOCK_SIZE);
        for chunk in &mut chunks {
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(chunk);
            self.decrypt_block(&mut block);
            out.extend_from_slice(&block);
        }
        self.pending_msg.set(chunks.remainder());
        Ok(out)
    }

    /// Signal end of ciphertext, returning the final 0 to 15 plaintext
    /// bytes. After this only [`verify`](Session::verify) is permitted.
    #[cfg(feature = "alloc")]
    pub fn finalize_decrypt(&mut self) -> Result<Vec<u8>, Error> {
        match self.phase {
            Phase::Init | Phase::Ad | Phase::Decrypt => self.phase = Phase::DecFinal,
            _ => return Err(self.fail(Error::InvalidSequence)),
        }

        let len = self.pending_msg.len;
        let mut tail = [0u8; BLOCK_SIZE];
        tail[..len].copy_from_slice(self.pending_msg.bytes());
        self.pending_msg.clear();

        let mut out = Vec::with_capacity(len);
        if len > 0 {
            self.decrypt_partial(&mut tail[..len]);
            out.extend_from_slice(&tail[..len]);
        }
        Ok(out)
    }

    /// Produce the authentication tag, `tag_len` bytes long.
    ///
    /// Permitted on a fresh session (empty message) or once the encrypt
    /// stream was finalized. Repeated calls return the cached tag.
    #[cfg(feature = "alloc")]
    pub fn digest(&mut self) -> Result<Vec<u8>, Error> {
        let tag = match (self.phase, self.tag) {
            (Phase::Init, _) | (Phase::EncFinal, _) => {
                let tag = self.compute_tag();
                self.phase = Phase::TagReady;
                self.tag = Some(tag);
                tag
            }
            (Phase::TagReady, Some(tag)) => tag,
            (Phase::Encrypt, _) if !self.pending_msg.is_empty() => {
                return Err(self.fail(Error::PendingData));
            }
            _ => return Err(self.fail(Error::InvalidSequence)),
        };
        Ok(tag[..self.tag_len].to_vec())
    }

    /// Compare `received` against the computed tag in constant time.
    ///
    /// Permitted on a fresh session (empty message) or once the decrypt
    /// stream was finalized. On mismatch the session is closed and all
    /// previously returned plaintext must be discarded.
    pub fn verify(&mut self, received: &[u8]) -> Result<(), Error> {
        match self.phase {
            Phase::Init | Phase::DecFinal => {}
            Phase::Decrypt if !self.pending_msg.is_empty() => {
                return Err(self.fail(Error::PendingData));
            }
            _ => return Err(self.fail(Error::InvalidSequence)),
        }

        let mut expected = self.compute_tag();
        self.phase = Phase::TagReady;
        let matched = expected[..self.tag_len].ct_eq(received).unwrap_u8() == 1;
        expected.zeroize();
        if matched {
            Ok(())
        } else {
            Err(self.fail(Error::MacMismatch))
        }
    }

    /// Encrypt the whole remaining plaintext and produce the tag in one
    /// call. The ciphertext equals the concatenation of the streaming
    /// calls, including for block-aligned lengths.
    #[cfg(feature = "alloc")]
    pub fn encrypt_and_digest(&mut self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>), Error> {
        let mut ciphertext = self.encrypt(plaintext)?;
        let tail = self.finalize_encrypt()?;
        ciphertext.extend_from_slice(&tail);
        let tag = self.digest()?;
        Ok((ciphertext, tag))
    }

    /// Decrypt the whole remaining ciphertext and verify `tag`, returning
    /// the plaintext only if authentication succeeds.
    #[cfg(feature = "alloc")]
    pub fn decrypt_and_verify(&mut self, ciphertext: &[u8], tag: &[u8]) -> Result<Vec<u8>, Error> {
        let mut plaintext = self.decrypt(ciphertext)?;
        let tail = self.finalize_decrypt()?;
        plaintext.extend_from_slice(&tail);
        self.verify(tag)?;
        Ok(plaintext)
    }

    /// Close the session on `err`; every later call sees `InvalidSequence`.
    fn fail(&mut self, err: Error) -> Error {
        self.phase = Phase::Closed;
        err
    }

    fn encrypt_raw(&self, block: &mut [u8; BLOCK_SIZE]) {
        self.cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }

    fn decrypt_raw(&self, block: &mut [u8; BLOCK_SIZE]) {
        self.cipher.decrypt_block(GenericArray::from_mut_slice(block));
    }

    fn absorb_block(&mut self, block: &[u8; BLOCK_SIZE]) {
        self.blocks_ad += 1;
        let mask = *self.ltree.get(ntz(self.blocks_ad));
        xor_in_place(&mut self.offset_ad, &mask);
        let mut buf = *block;
        xor_in_place(&mut buf, &self.offset_ad);
        self.encrypt_raw(&mut buf);
        xor_in_place(&mut self.sum_ad, &buf);
    }

    fn encrypt_block(&mut self, block: &mut [u8; BLOCK_SIZE]) {
        self.blocks_msg += 1;
        let mask = *self.ltree.get(ntz(self.blocks_msg));
        xor_in_place(&mut self.offset_msg, &mask);
        xor_in_place(&mut self.checksum, block);
        xor_in_place(block, &self.offset_msg);
        self.encrypt_raw(block);
        xor_in_place(block, &self.offset_msg);
    }

    fn decrypt_block(&mut self, block: &mut [u8; BLOCK_SIZE]) {
        self.blocks_msg += 1;
        let mask = *self.ltree.get(ntz(self.blocks_msg));
        xor_in_place(&mut self.offset_msg, &mask);
        xor_in_place(block, &self.offset_msg);
        self.decrypt_raw(block);
        xor_in_place(block, &self.offset_msg);
        xor_in_place(&mut self.checksum, block);
    }

    /// Encrypt a 1..=15 byte tail: keystream from `E_K(offset ^ L_*)`,
    /// checksum over the `P* || 0x80 || 0..` padding.
    fn encrypt_partial(&mut self, tail: &mut [u8]) {
        debug_assert!(!tail.is_empty() && tail.len() < BLOCK_SIZE);
        let star = *self.ltree.star();
        xor_in_place(&mut self.offset_msg, &star);
        let mut pad = self.offset_msg;
        self.encrypt_raw(&mut pad);

        let mut padded = [0u8; BLOCK_SIZE];
        padded[..tail.len()].copy_from_slice(tail);
        padded[tail.len()] = 0x80;
        xor_in_place(&mut self.checksum, &padded);

        for (byte, pad_byte) in tail.iter_mut().zip(pad.iter()) {
            *byte ^= pad_byte;
        }
        pad.zeroize();
        padded.zeroize();
    }

    fn decrypt_partial(&mut self, tail: &mut [u8]) {
        debug_assert!(!tail.is_empty() && tail.len() < BLOCK_SIZE);
        let star = *self.ltree.star();
        xor_in_place(&mut self.offset_msg, &star);
        let mut pad = self.offset_msg;
        self.encrypt_raw(&mut pad);

        for (byte, pad_byte) in tail.iter_mut().zip(pad.iter()) {
            *byte ^= pad_byte;
        }

        let mut padded = [0u8; BLOCK_SIZE];
        padded[..tail.len()].copy_from_slice(tail);
        padded[tail.len()] = 0x80;
        xor_in_place(&mut self.checksum, &padded);
        pad.zeroize();
        padded.zeroize();
    }

    /// `E_K(checksum ^ offset ^ L_$) ^ HASH(K, A)`, absorbing any buffered
    /// associated-data tail first.
    pub(crate) fn compute_tag(&mut self) -> [u8; BLOCK_SIZE] {
        if !self.pending_ad.is_empty() {
            let star = *self.ltree.star();
            xor_in_place(&mut self.offset_ad, &star);
            let mut block = [0u8; BLOCK_SIZE];
            let len = self.pending_ad.len;
            block[..len].copy_from_slice(self.pending_ad.bytes());
            block[len] = 0x80;
            self.pending_ad.clear();
            xor_in_place(&mut block, &self.offset_ad);
            self.encrypt_raw(&mut block);
            xor_in_place(&mut self.sum_ad, &block);
        }

        let mut tag = self.checksum;
        xor_in_place(&mut tag, &self.offset_msg);
        let dollar = *self.ltree.dollar();
        xor_in_place(&mut tag, &dollar);
        self.encrypt_raw(&mut tag);
        xor_in_place(&mut tag, &self.sum_ad);
        tag
    }

    /// Single-pass in-place encryption for the one-shot AEAD front end.
    /// The message stream must be untouched.
    pub(crate) fn encrypt_all_in_place(&mut self, buffer: &mut [u8]) {
        debug_assert!(self.blocks_msg == 0 && self.pending_msg.is_empty());
        let full = buffer.len() - buffer.len() % BLOCK_SIZE;
        let (blocks, tail) = buffer.split_at_mut(full);
        for chunk in blocks.chunks_exact_mut(BLOCK_SIZE) {
            let block: &mut [u8; BLOCK_SIZE] = chunk.try_into().unwrap();
            self.encrypt_block(block);
        }
        if !tail.is_empty() {
            self.encrypt_partial(tail);
        }
        self.phase = Phase::EncFinal;
    }

    /// Single-pass in-place decryption for the one-shot AEAD front end.
    pub(crate) fn decrypt_all_in_place(&mut self, buffer: &mut [u8]) {
        debug_assert!(self.blocks_msg == 0 && self.pending_msg.is_empty());
        let full = buffer.len() - buffer.len() % BLOCK_SIZE;
        let (blocks, tail) = buffer.split_at_mut(full);
        for chunk in blocks.chunks_exact_mut(BLOCK_SIZE) {
            let block: &mut [u8; BLOCK_SIZE] = chunk.try_into().unwrap();
            self.decrypt_block(block);
        }
        if !tail.is_empty() {
            self.decrypt_partial(tail);
        }
        self.phase = Phase::DecFinal;
    }
}

impl<C> Drop for Session<C>
where
    C: BlockCipher<BlockSize = U16> + BlockEncrypt + BlockDecrypt,
{
    fn drop(&mut self) {
        self.ltree.zeroize();
        self.offset_ad.zeroize();
        self.sum_ad.zeroize();
        self.offset_msg.zeroize();
        self.checksum.zeroize();
        self.pending_ad.zeroize();
        self.pending_msg.zeroize();
        if let Some(tag) = self.tag.as_mut() {
            tag.zeroize();
        }
    }
}

/// Derive `Offset_0` from the nonce and tag length (RFC 7253, Section 4.2).
///
/// The nonce block packs `tag_len * 8 mod 128` into the top seven bits,
/// then a `0x01` marker ahead of the right-aligned nonce. The low six bits
/// select a bit-offset window into the 24-byte `Stretch` value.
fn initial_offset<C>(cipher: &C, nonce: &[u8], tag_len: usize) -> [u8; 16]
where
    C: BlockCipher<BlockSize = U16> + BlockEncrypt,
{
    let mut ktop = [0u8; BLOCK_SIZE];
    ktop[0] = (((tag_len * 8) % 128) as u8) << 1;
    ktop[15 - nonce.len()] |= 0x01;
    ktop[BLOCK_SIZE - nonce.len()..].copy_from_slice(nonce);

    let bottom = (ktop[15] & 0x3F) as usize;
    ktop[15] &= 0xC0;
    cipher.encrypt_block(GenericArray::from_mut_slice(&mut ktop));

    let mut stretch = [0u8; 24];
    stretch[..BLOCK_SIZE].copy_from_slice(&ktop);
    for i in 0..8 {
        stretch[BLOCK_SIZE + i] = ktop[i] ^ ktop[i + 1];
    }

    let mut offset = [0u8; BLOCK_SIZE];
    let skip = bottom / 8;
    let shift = bottom % 8;
    if shift == 0 {
        offset.copy_from_slice(&stretch[skip..skip + BLOCK_SIZE]);
    } else {
        for i in 0..BLOCK_SIZE {
            offset[i] = (stretch[skip + i] << shift) | (stretch[skip + i + 1] >> (8 - shift));
        }
    }
    ktop.zeroize();
    stretch.zeroize();
    offset
}
