//! Test vectors from RFC 7253, Appendix A (AES-128).

use aes::Aes128;
use hex_literal::hex;
use ocb3::aead::generic_array::GenericArray;
use ocb3::cipher::NewBlockCipher;
use ocb3::Session;

const KEY: [u8; 16] = hex!("000102030405060708090A0B0C0D0E0F");

fn session(nonce: &[u8], tag_len: usize) -> Session<Aes128> {
    let cipher = Aes128::new(GenericArray::from_slice(&KEY));
    Session::open(cipher, nonce, tag_len).unwrap()
}

/// Encrypt and digest, check against the RFC sample, then round-trip the
/// result through the decrypt side.
fn check(nonce: &[u8], aad: &[u8], plaintext: &[u8], ciphertext: &[u8], tag: &[u8]) {
    let mut s = session(nonce, 16);
    s.absorb(aad).unwrap();
    let (got_ct, got_tag) = s.encrypt_and_digest(plaintext).unwrap();
    assert_eq!(got_ct, ciphertext);
    assert_eq!(got_tag, tag);

    let mut s = session(nonce, 16);
    s.absorb(aad).unwrap();
    assert_eq!(s.decrypt_and_verify(ciphertext, tag).unwrap(), plaintext);
}

#[test]
fn empty_associated_data_and_message() {
    check(
        &hex!("BBAA99887766554433221100"),
        &[],
        &[],
        &[],
        &hex!("785407BFFFC8AD9EDCC5520AC9111EE6"),
    );
}

#[test]
fn eight_byte_associated_data_and_message() {
    check(
        &hex!("BBAA99887766554433221102"),
        &hex!("0001020304050607"),
        &hex!("0001020304050607"),
        &hex!("6820B3657B6F615A"),
        &hex!("5725BDA0D3B4EB3A257C9AF1F8F03009"),
    );
}

#[test]
fn associated_data_only() {
    check(
        &hex!("BBAA99887766554433221103"),
        &hex!("0001020304050607"),
        &[],
        &[],
        &hex!("81017F8203F081277152FADE694A0A00"),
    );
}

#[test]
fn message_only() {
    check(
        &hex!("BBAA99887766554433221104"),
        &[],
        &hex!("0001020304050607"),
        &hex!("45DD69F8F5AAE724"),
        &hex!("14054CD1F35D82760B2CD00D2F99BFA9"),
    );
}

#[test]
fn one_shot_interface_matches_the_rfc_framing() {
    use ocb3::aead::{Aead, NewAead};
    use ocb3::Aes128Ocb3;

    let cipher = Aes128Ocb3::new(GenericArray::from_slice(&KEY));
    let nonce = hex!("BBAA99887766554433221104");

    // The RFC's C column is ciphertext || tag, which is exactly what the
    // allocating `Aead` interface produces.
    let combined = cipher
        .encrypt(
            GenericArray::from_slice(&nonce),
            hex!("0001020304050607").as_ref(),
        )
        .unwrap();
    assert_eq!(
        combined,
        hex!("45DD69F8F5AAE72414054CD1F35D82760B2CD00D2F99BFA9")
    );

    let plaintext = cipher
        .decrypt(GenericArray::from_slice(&nonce), combined.as_slice())
        .unwrap();
    assert_eq!(plaintext, hex!("0001020304050607"));
}

#[test]
fn tag_length_is_bound_into_the_initial_offset() {
    // Shorter tags are not truncations: the tag length enters the nonce
    // block, so both the ciphertext and the tag change with it.
    let nonce = hex!("BBAA99887766554433221105");
    let plaintext = hex!("000102030405060708090A0B0C0D0E0F");

    let (ct16, tag16) = session(&nonce, 16).encrypt_and_digest(&plaintext).unwrap();
    let (ct12, tag12) = session(&nonce, 12).encrypt_and_digest(&plaintext).unwrap();

    assert_eq!(tag16.len(), 16);
    assert_eq!(tag12.len(), 12);
    assert_ne!(ct12, ct16);
    assert_ne!(tag12[..], tag16[..12]);
}
