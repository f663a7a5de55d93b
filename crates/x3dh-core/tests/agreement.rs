//! End-to-end agreement between two parties

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sha2::Sha512;

use x3dh_core::crypto::DhPair;
use x3dh_core::{
    Curve, Curve25519, Error, InitialMessage, KeyPair, PreKeyBundle, PreKeyStore, ProtocolConfig,
    ProtocolInitialisation, PublicKey, X3dh,
};

const PROTOCOL: &str = "pangea";

/// Bob's keys published through a plain bundle
struct Bob {
    identity: KeyPair,
    signed_pre_key: KeyPair,
    one_time_pre_key: Option<KeyPair>,
}

impl PreKeyBundle for Bob {
    fn identity_key(&self) -> PublicKey {
        self.identity.public_key()
    }

    fn signed_pre_key(&self) -> PublicKey {
        self.signed_pre_key.public_key()
    }

    fn pre_key_signature(&self) -> &[u8] {
        b""
    }

    fn one_time_pre_key(&self) -> Option<PublicKey> {
        self.one_time_pre_key.as_ref().map(|k| k.public_key())
    }

    fn valid_signature(&self) -> x3dh_core::Result<bool> {
        Ok(true)
    }
}

fn seeded_curve(seed: u64) -> Curve25519<StdRng> {
    Curve25519::new(StdRng::seed_from_u64(seed))
}

#[test]
fn alice_and_bob_agree() {
    let curve = seeded_curve(42);

    let bob = Bob {
        identity: curve.generate_key_pair().unwrap(),
        signed_pre_key: curve.generate_key_pair().unwrap(),
        one_time_pre_key: Some(curve.generate_key_pair().unwrap()),
    };
    let alice_identity = curve.generate_key_pair().unwrap();

    let alice = X3dh::<_>::new(&curve, PROTOCOL, alice_identity.clone());
    let init = alice.calculate_secret(&bob).unwrap();

    let bob_x = X3dh::<_>::new(&curve, PROTOCOL, bob.identity.clone());
    let bob_secret = bob_x
        .secret_from_remote(&ProtocolInitialisation {
            remote_identity_key: alice_identity.public_key(),
            remote_ephemeral_key: init.ephemeral_key,
            my_one_time_pre_key: bob.one_time_pre_key.as_ref().map(|k| k.private_key()),
            my_signed_pre_key: bob.signed_pre_key.private_key(),
        })
        .unwrap();

    assert_eq!(init.shared_secret, bob_secret);
    assert_eq!(init.shared_secret.as_bytes().len(), 32);
}

#[test]
fn signed_bundle_flow_through_store() {
    let curve = Curve25519::from_os_rng();
    let mut bob_keys = PreKeyStore::generate(&curve, &mut rand::rngs::OsRng, 2).unwrap();
    let alice = X3dh::<_>::new(&curve, PROTOCOL, curve.generate_key_pair().unwrap());
    let bob = X3dh::<_>::new(&curve, PROTOCOL, bob_keys.identity().key_pair().clone());

    // Three sessions: two use the remaining one-time pre-keys, the third
    // falls back to the three-term agreement.
    for expected_remaining in [1, 0, 0] {
        let bundle = bob_keys.bundle().unwrap();
        let init = alice.calculate_secret(&bundle).unwrap();
        let message = InitialMessage::for_bundle(alice.identity_key(), &init, &bundle).unwrap();

        let resolved = bob_keys.resolve(&message).unwrap();
        let secret = bob.secret_from_remote(&resolved.initialisation()).unwrap();
        drop(resolved);

        assert_eq!(secret, init.shared_secret);
        assert_eq!(bob_keys.remaining_one_time_pre_keys(), expected_remaining);
    }
}

#[test]
fn tampered_bundle_is_rejected() {
    let curve = Curve25519::from_os_rng();
    let bob_keys = PreKeyStore::generate(&curve, &mut rand::rngs::OsRng, 1).unwrap();
    let mut bundle = bob_keys.bundle().unwrap();
    bundle.signed_pre_key.public_key = curve.generate_key_pair().unwrap().public_key();

    let alice = X3dh::<_>::new(&curve, PROTOCOL, curve.generate_key_pair().unwrap());
    assert!(matches!(
        alice.calculate_secret(&bundle),
        Err(Error::InvalidSignature)
    ));
}

#[test]
fn substituted_signing_key_changes_fingerprint() {
    let curve = Curve25519::from_os_rng();
    let bob_keys = PreKeyStore::generate(&curve, &mut rand::rngs::OsRng, 1).unwrap();
    let mallory_keys = PreKeyStore::generate(&curve, &mut rand::rngs::OsRng, 1).unwrap();

    let genuine = bob_keys.bundle().unwrap();
    let mut forged = genuine.clone();
    let mallory_bundle = mallory_keys.bundle().unwrap();
    forged.verifying_key = mallory_bundle.verifying_key;
    forged.signed_pre_key = mallory_bundle.signed_pre_key;

    // Self-consistent, so the signature alone cannot catch it
    assert!(forged.valid_signature().unwrap());
    assert_eq!(forged.identity_key, genuine.identity_key);

    let published = bob_keys.identity().public_identity().fingerprint();
    assert_eq!(genuine.fingerprint(), published);
    assert_ne!(forged.fingerprint(), published);
}

#[test]
fn hash_choice_must_match() {
    let curve = seeded_curve(7);
    let bob = Bob {
        identity: curve.generate_key_pair().unwrap(),
        signed_pre_key: curve.generate_key_pair().unwrap(),
        one_time_pre_key: None,
    };
    let alice_identity = curve.generate_key_pair().unwrap();

    let alice: X3dh<_, Sha512> = X3dh::new(&curve, PROTOCOL, alice_identity.clone());
    let init = alice.calculate_secret(&bob).unwrap();

    let input = ProtocolInitialisation {
        remote_identity_key: alice_identity.public_key(),
        remote_ephemeral_key: init.ephemeral_key,
        my_one_time_pre_key: None,
        my_signed_pre_key: bob.signed_pre_key.private_key(),
    };
    let bob_sha512: X3dh<_, Sha512> = X3dh::new(&curve, PROTOCOL, bob.identity.clone());
    let bob_sha256 = X3dh::<_>::new(&curve, PROTOCOL, bob.identity.clone());

    assert_eq!(bob_sha512.secret_from_remote(&input).unwrap(), init.shared_secret);
    assert_ne!(bob_sha256.secret_from_remote(&input).unwrap(), init.shared_secret);
}

#[test]
fn concurrent_initiators_share_one_curve() {
    let curve = Curve25519::from_os_rng();
    let bob_keys = PreKeyStore::generate(&curve, &mut rand::rngs::OsRng, 0).unwrap();
    let bundle = bob_keys.bundle().unwrap();
    let alice = X3dh::<_>::new(&curve, PROTOCOL, curve.generate_key_pair().unwrap());

    let ephemerals: Vec<PublicKey> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| alice.calculate_secret(&bundle).unwrap().ephemeral_key))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (i, a) in ephemerals.iter().enumerate() {
        for b in &ephemerals[i + 1..] {
            assert_ne!(a, b);
        }
    }
}

#[test]
fn strict_config_requires_one_time_pre_key() {
    let curve = Curve25519::from_os_rng();
    let bob_keys = PreKeyStore::generate(&curve, &mut rand::rngs::OsRng, 0).unwrap();
    let config = ProtocolConfig::new(PROTOCOL).with_required_one_time_pre_key();
    let alice =
        X3dh::<_>::with_config(&curve, config, curve.generate_key_pair().unwrap()).unwrap();

    assert!(matches!(
        alice.calculate_secret(&bob_keys.bundle().unwrap()),
        Err(Error::MissingOneTimePreKey)
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn secrets_converge(seed in any::<u64>(), with_one_time in any::<bool>()) {
        let curve = seeded_curve(seed);
        let bob = Bob {
            identity: curve.generate_key_pair().unwrap(),
            signed_pre_key: curve.generate_key_pair().unwrap(),
            one_time_pre_key: with_one_time.then(|| curve.generate_key_pair().unwrap()),
        };
        let alice_identity = curve.generate_key_pair().unwrap();

        let alice = X3dh::<_>::new(&curve, PROTOCOL, alice_identity.clone());
        let init = alice.calculate_secret(&bob).unwrap();
        prop_assert_eq!(init.used_one_time_pre_key.is_some(), with_one_time);

        let bob_x = X3dh::<_>::new(&curve, PROTOCOL, bob.identity.clone());
        let bob_secret = bob_x.secret_from_remote(&ProtocolInitialisation {
            remote_identity_key: alice_identity.public_key(),
            remote_ephemeral_key: init.ephemeral_key,
            my_one_time_pre_key: bob.one_time_pre_key.as_ref().map(|k| k.private_key()),
            my_signed_pre_key: bob.signed_pre_key.private_key(),
        }).unwrap();

        prop_assert_eq!(init.shared_secret, bob_secret);
    }

    #[test]
    fn key_exchange_commutes(seed in any::<u64>()) {
        let curve = seeded_curve(seed);
        let a = curve.generate_key_pair().unwrap();
        let b = curve.generate_key_pair().unwrap();

        prop_assert_eq!(
            curve.key_exchange(DhPair::new(a.private_key(), &b.public_key())),
            curve.key_exchange(DhPair::new(b.private_key(), &a.public_key()))
        );
    }
}
