//! Interoperability of the Noise engine with an independent implementation,
//! plus cross-module checks for the signature adapters.

use std::sync::Arc;

use i2p_crypto::dsa::{DomainParameters, DsaPrivateKey};
use i2p_crypto::noise::{HandshakeState, Stage, XK, XK_PROTOCOL_NAME};
use i2p_crypto::obfuscation::{deobfuscate, obfuscate, ZERO_IV};
use i2p_crypto::{Ed25519Signer, Signer, StaticKeypair, Verifier};

const PROLOGUE: &[u8] = b"interop";

fn snow_builder<'a>() -> snow::Builder<'a> {
    snow::Builder::new(XK_PROTOCOL_NAME.parse().unwrap())
}

/// Our initiator against a snow responder.
#[test]
fn test_engine_initiator_with_snow_responder() {
    let alice = StaticKeypair::generate();
    let bob = StaticKeypair::generate();

    let mut ours = HandshakeState::initiator(
        &XK,
        XK_PROTOCOL_NAME,
        PROLOGUE,
        alice.clone(),
        Some(bob.public_key()),
    )
    .unwrap();
    let mut theirs = snow_builder()
        .local_private_key(&bob.private_bytes())
        .prologue(PROLOGUE)
        .build_responder()
        .unwrap();

    let mut buf = vec![0u8; 65535];

    let msg1 = ours.write_message(b"one").unwrap();
    let len = theirs.read_message(&msg1, &mut buf).unwrap();
    assert_eq!(&buf[..len], b"one");

    let len = theirs.write_message(b"two", &mut buf).unwrap();
    assert_eq!(ours.read_message(&buf[..len]).unwrap(), b"two");

    let msg3 = ours.write_message(b"three").unwrap();
    let len = theirs.read_message(&msg3, &mut buf).unwrap();
    assert_eq!(&buf[..len], b"three");

    assert_eq!(&ours.handshake_hash()[..], theirs.get_handshake_hash());
    assert_eq!(
        theirs.get_remote_static().unwrap(),
        &alice.public_key()[..]
    );

    let mut ours = ours.split().unwrap();
    let mut theirs = theirs.into_transport_mode().unwrap();

    let ct = ours.encrypt(b"to snow").unwrap();
    let len = theirs.read_message(&ct, &mut buf).unwrap();
    assert_eq!(&buf[..len], b"to snow");

    let len = theirs.write_message(b"from snow", &mut buf).unwrap();
    assert_eq!(ours.decrypt(&buf[..len]).unwrap(), b"from snow");
}

/// A snow initiator against our responder.
#[test]
fn test_snow_initiator_with_engine_responder() {
    let alice = StaticKeypair::generate();
    let bob = StaticKeypair::generate();

    let mut theirs = snow_builder()
        .local_private_key(&alice.private_bytes())
        .remote_public_key(&bob.public_key())
        .prologue(PROLOGUE)
        .build_initiator()
        .unwrap();
    let mut ours =
        HandshakeState::responder(&XK, XK_PROTOCOL_NAME, PROLOGUE, bob, None).unwrap();

    let mut buf = vec![0u8; 65535];

    let len = theirs.write_message(&[], &mut buf).unwrap();
    assert!(ours.read_message(&buf[..len]).unwrap().is_empty());
    assert_eq!(ours.stage(), Stage::Msg1Received);

    let msg2 = ours.write_message(b"payload").unwrap();
    let len = theirs.read_message(&msg2, &mut buf).unwrap();
    assert_eq!(&buf[..len], b"payload");

    let len = theirs.write_message(&[], &mut buf).unwrap();
    ours.read_message(&buf[..len]).unwrap();
    assert_eq!(ours.remote_static(), Some(alice.public_key()));

    let mut ours = ours.split().unwrap();
    let mut theirs = theirs.into_transport_mode().unwrap();

    for i in 0..10u8 {
        let len = theirs.write_message(&[i; 100], &mut buf).unwrap();
        assert_eq!(ours.decrypt(&buf[..len]).unwrap(), vec![i; 100]);
    }
    assert_eq!(ours.receiving_nonce(), 10);
}

#[test]
fn test_obfuscation_recovers_both_keys() {
    let responder = StaticKeypair::generate();
    let key = responder.public_key();
    let x = StaticKeypair::generate().public_key();
    let y = StaticKeypair::generate().public_key();

    let obf_x = obfuscate(&x, &key, &ZERO_IV).unwrap();
    let obf_y = obfuscate(&y, &key, &ZERO_IV).unwrap();
    assert_ne!(obf_x, obf_y);

    assert_eq!(deobfuscate(&obf_x, &key, &ZERO_IV).unwrap(), x);
    assert_eq!(deobfuscate(&obf_y, &key, &ZERO_IV).unwrap(), y);
}

#[test]
fn test_signers_behind_trait_objects() {
    let params: Arc<DomainParameters> = DomainParameters::network().shared();
    let dsa = DsaPrivateKey::generate(&params);
    let dsa_pub = dsa.public_key(&params).unwrap();
    let ed = Ed25519Signer::generate();
    let ed_verifier = ed.verifier();

    let signers: Vec<(Box<dyn Signer>, Box<dyn Verifier>)> = vec![
        (
            Box::new(dsa.signer(params.clone()).unwrap()),
            Box::new(dsa_pub.verifier(params)),
        ),
        (Box::new(ed), Box::new(ed_verifier)),
    ];

    for (signer, verifier) in &signers {
        let sig = signer.sign(b"descriptor").unwrap();
        assert_eq!(sig.len(), signer.signature_len());
        assert!(verifier.verify(b"descriptor", &sig).is_ok());
        assert!(verifier.verify(b"descriptor!", &sig).is_err());
    }
}
