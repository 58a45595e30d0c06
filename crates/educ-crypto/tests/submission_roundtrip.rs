//! End-to-end submission crypto: professor key pair, student encryption,
//! professor decryption with a pasted envelope.

use std::sync::OnceLock;

use educ_crypto::identity::TRAILER_LEN;
use educ_crypto::{
    append_trailer, decode_envelope, decrypt_submission, encrypt_submission,
    encrypt_submission_hybrid, generate_key_pair, hash_identity, import_private_key,
    split_trailer, CryptoError, KeyPair, MAX_SINGLE_BLOCK_PAYLOAD,
};
use proptest::prelude::*;

fn professor_pair() -> &'static KeyPair {
    static PAIR: OnceLock<KeyPair> = OnceLock::new();
    PAIR.get_or_init(|| generate_key_pair().unwrap())
}

fn unrelated_pair() -> &'static KeyPair {
    static PAIR: OnceLock<KeyPair> = OnceLock::new();
    PAIR.get_or_init(|| generate_key_pair().unwrap())
}

#[test]
fn assignment_key_is_published_as_public_envelope() {
    let pem = professor_pair().public_envelope().unwrap();
    assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
    assert!(pem.ends_with("-----END PUBLIC KEY-----\n"));
    assert_eq!(decode_envelope(&pem).unwrap(), professor_pair().public_der().unwrap());
}

#[test]
fn student_answer_reaches_professor_with_trailer() {
    let pair = professor_pair();
    let public_pem = pair.public_envelope().unwrap();
    let hash = hash_identity("alice@example.com");

    let ct = encrypt_submission("Answer: 42", &hash, &public_pem).unwrap();
    assert_eq!(ct.len(), 344);
    assert!(ct
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'='));

    // The professor pastes the private envelope back in
    let pasted = pair.private_envelope().unwrap();
    let key = import_private_key(pasted.expose()).unwrap();
    let text = decrypt_submission(&ct, &key).unwrap();

    assert_eq!(
        text,
        format!(
            "Answer: 42\n\n--- Hash étudiant (anti-plagiat): {} ---",
            hash_identity("alice@example.com")
        )
    );
}

#[test]
fn unrelated_private_key_is_rejected() {
    let hash = hash_identity("alice@example.com");
    let ct = encrypt_submission(
        "Answer: 42",
        &hash,
        &professor_pair().public_envelope().unwrap(),
    )
    .unwrap();

    let wrong = import_private_key(unrelated_pair().private_envelope().unwrap().expose()).unwrap();
    let err = decrypt_submission(&ct, &wrong).unwrap_err();
    assert!(matches!(err, CryptoError::Decryption(_)));
}

#[test]
fn oversized_single_block_is_refused_but_hybrid_accepts() {
    let pem = professor_pair().public_envelope().unwrap();
    let hash = hash_identity("alice@example.com");
    let answer = "y".repeat(MAX_SINGLE_BLOCK_PAYLOAD - TRAILER_LEN + 1);

    assert!(matches!(
        encrypt_submission(&answer, &hash, &pem),
        Err(CryptoError::Encryption(_))
    ));

    let ct = encrypt_submission_hybrid(&answer, &hash, &pem).unwrap();
    let text = decrypt_submission(&ct, &professor_pair().private_key()).unwrap();
    assert_eq!(text, append_trailer(&answer, &hash));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn single_block_roundtrip_appends_trailer_once(
        answer in "[ -~]{0,85}",
        local in "[a-z]{1,12}",
    ) {
        let pair = professor_pair();
        let email = format!("{local}@example.com");
        let hash = hash_identity(&email);

        let ct = encrypt_submission(&answer, &hash, &pair.public_envelope().unwrap()).unwrap();
        let text = decrypt_submission(&ct, &pair.private_key()).unwrap();

        let (body, found) = split_trailer(&text);
        prop_assert_eq!(body, answer.as_str());
        prop_assert_eq!(found, Some(hash));
        prop_assert_eq!(text.matches("--- Hash étudiant").count(), 1);
    }
}
