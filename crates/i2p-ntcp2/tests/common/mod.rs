#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use i2p_crypto::{DomainParameters, DsaPrivateKey, Ed25519Signer, Signer, StaticKeypair};
use i2p_data::{
    Certificate, CryptoKeyType, Date, KeyCertificate, KeysAndCert, Mapping, RouterAddress,
    RouterInfo, SigningKeyType,
};
use i2p_ntcp2::{LocalRouter, Session, SessionTarget, TransportConfig};

pub fn params() -> Arc<DomainParameters> {
    DomainParameters::network().shared()
}

pub fn signed_router_info(
    identity: KeysAndCert,
    static_key: &[u8; 32],
    addr: SocketAddr,
    signer: &dyn Signer,
) -> RouterInfo {
    RouterInfo::sign(
        identity,
        Date::now(),
        vec![RouterAddress::ntcp2(5, addr, static_key, None)],
        Mapping::from_pairs([("caps", "LR")]),
        signer,
    )
    .unwrap()
}

/// A fresh Ed25519 identity and the signer behind it.
pub fn ed25519_identity() -> (KeysAndCert, Ed25519Signer) {
    let signer = Ed25519Signer::generate();
    let key_cert = KeyCertificate::new(SigningKeyType::Ed25519, CryptoKeyType::ElGamal);
    let identity = KeysAndCert::new(
        &[0x11; 256],
        &signer.public_key_bytes(),
        Certificate::key(&key_cert),
    )
    .unwrap();
    (identity, signer)
}

/// A router with an Ed25519 identity and an NTCP2 address at `addr`.
pub fn ed25519_router(addr: SocketAddr) -> LocalRouter {
    let keypair = StaticKeypair::generate();
    let (identity, signer) = ed25519_identity();
    let info = signed_router_info(identity, &keypair.public_key(), addr, &signer);
    LocalRouter::new(info, keypair).unwrap()
}

/// `router`'s descriptor with its identity and addresses intact, re-signed
/// by a key the identity does not carry.
pub fn forged(router: &LocalRouter) -> Arc<RouterInfo> {
    let original = router.router_info();
    let forged = RouterInfo::sign(
        original.identity().clone(),
        Date::now(),
        original.addresses().to_vec(),
        original.options().clone(),
        &Ed25519Signer::generate(),
    )
    .unwrap();
    Arc::new(forged)
}

/// A router with a legacy DSA-SHA1 identity.
pub fn dsa_router(addr: SocketAddr) -> LocalRouter {
    let params = params();
    let keypair = StaticKeypair::generate();
    let private = DsaPrivateKey::generate(&params);
    let public = private.public_key(&params).unwrap();
    let signer = private.signer(params).unwrap();
    let identity = KeysAndCert::new(&[0x22; 256], public.as_bytes(), Certificate::null()).unwrap();
    let info = signed_router_info(identity, &keypair.public_key(), addr, &signer);
    LocalRouter::new(info, keypair).unwrap()
}

pub fn unused_addr() -> SocketAddr {
    "127.0.0.1:9".parse().unwrap()
}

/// Two established sessions joined by an in-memory stream:
/// `(initiator, responder)`.
pub async fn session_pair(
    initiator_config: &TransportConfig,
    responder_config: &TransportConfig,
) -> (Session, Session) {
    let alice = ed25519_router(unused_addr());
    let bob = ed25519_router(unused_addr());
    let target = SessionTarget::from_router_info(bob.router_info().clone(), &params()).unwrap();
    let (a, b) = tokio::io::duplex(64 * 1024);

    let (outbound, inbound) = tokio::join!(
        Session::outbound(a, &alice, &target, initiator_config, params()),
        Session::inbound(b, &bob, responder_config, params()),
    );
    (outbound.unwrap(), inbound.unwrap())
}
