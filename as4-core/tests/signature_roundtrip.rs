/*
    Signature Round-Trip Tests

    Signs envelopes, moves them through the wire codec and verifies them on
    the other side. Property tests flip single bytes of the signature value
    and of a payload to check that tampering is always detected.
*/

use as4_core::core_crypto::{
    DigestAlgorithm, KeyReferenceType, SecurityError, SignatureEngine,
};
use as4_core::core_message::{decode, encode, Attachment, Envelope};
use as4_core::test_utils::{pulled_user_message, TestParties, TEST_MPC};
use proptest::prelude::*;

fn over_the_wire(envelope: &Envelope) -> Envelope {
    let wire = encode(envelope);
    decode(Some(wire.content_type.as_str()), &wire.body).unwrap().unwrap()
}

fn signed_message(parties: &TestParties) -> Envelope {
    let envelope = pulled_user_message("um-sig@partner", TEST_MPC);
    SignatureEngine::default().sign(envelope, &parties.partner).unwrap()
}

#[test]
fn test_signature_survives_the_wire_for_each_reference_type() {
    for reference_type in [
        KeyReferenceType::DirectReference,
        KeyReferenceType::IssuerSerial,
        KeyReferenceType::KeyIdentifier,
    ] {
        let parties = TestParties::new(reference_type);
        let received = over_the_wire(&signed_message(&parties));

        let result = SignatureEngine::default()
            .verify(&received, &parties.sender)
            .unwrap();
        assert_eq!(result.reference_type, reference_type);
        assert_eq!(result.certificate, parties.partner_certificate);
    }
}

#[test]
fn test_sha512_digests_verify() {
    let parties = TestParties::default();
    let partner = parties
        .partner
        .as_ref()
        .clone()
        .with_digest_algorithm(DigestAlgorithm::Sha512);
    let sender = parties
        .sender
        .as_ref()
        .clone()
        .with_digest_algorithm(DigestAlgorithm::Sha512);

    let signed = SignatureEngine::default()
        .sign(pulled_user_message("um-512@partner", TEST_MPC), &partner)
        .unwrap();
    let received = over_the_wire(&signed);

    assert!(SignatureEngine::default().verify(&received, &sender).is_ok());
}

#[test]
fn test_replaced_attachment_is_detected_after_transfer() {
    let parties = TestParties::default();
    let mut received = over_the_wire(&signed_message(&parties));
    let content_id = received.attachments[0].content_id.clone();
    received.attachments[0] = Attachment::new(content_id, "application/xml", &b"<Forged/>"[..]);

    assert!(matches!(
        SignatureEngine::default().verify(&received, &parties.sender),
        Err(SecurityError::DigestMismatch(_))
    ));
}

#[test]
fn test_message_signed_by_stranger_is_untrusted() {
    let parties = TestParties::default();
    let strangers = TestParties::default();
    let received = over_the_wire(&signed_message(&strangers));

    assert!(SignatureEngine::default()
        .verify(&received, &parties.sender)
        .is_err());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_flipped_signature_byte_fails(index in 0usize..64, mask in 1u8..=255) {
        let parties = TestParties::default();
        let mut received = over_the_wire(&signed_message(&parties));

        let signature = received
            .security
            .as_mut()
            .and_then(|header| header.signature.as_mut())
            .unwrap();
        let position = index % signature.signature_value.len();
        signature.signature_value[position] ^= mask;

        let result = SignatureEngine::default().verify(&received, &parties.sender);
        prop_assert!(matches!(result, Err(SecurityError::InvalidSignature)));
    }

    #[test]
    fn prop_flipped_payload_byte_fails(index in 0usize..256, mask in 1u8..=255) {
        let parties = TestParties::default();
        let mut received = over_the_wire(&signed_message(&parties));

        let attachment = &mut received.attachments[0];
        let mut data = attachment.data.to_vec();
        let position = index % data.len();
        data[position] ^= mask;
        attachment.data = data.into();

        let result = SignatureEngine::default().verify(&received, &parties.sender);
        prop_assert!(matches!(result, Err(SecurityError::DigestMismatch(_))));
    }
}
