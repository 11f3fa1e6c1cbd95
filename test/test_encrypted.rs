use futures::Future;
use tokio_core::reactor::Core;

use mse_handshake::{
    EncryptionMode, Handshake, HandshakeError, HandshakeErrorKind, HandshakerConfig, PeerIo,
};

use crate::pipe::pipe_pair;
use crate::{any_addr, any_info_hash, peer_id, TestMediator};

fn config(mode: EncryptionMode) -> HandshakerConfig {
    HandshakerConfig::default().with_encryption_mode(mode)
}

fn run_pair(
    out_mode: EncryptionMode,
    in_mode: EncryptionMode,
) -> (Result<(), HandshakeError>, Result<(), HandshakeError>) {
    let mut core = Core::new().unwrap();
    let (end_out, end_in) = pipe_pair();
    let hash = any_info_hash();

    let initiate = Handshake::initiate(
        PeerIo::outgoing(end_out, any_addr()),
        hash,
        TestMediator::new(hash, peer_id(4)),
        config(out_mode),
    )
    .unwrap();
    let accept = Handshake::accept(
        PeerIo::incoming(end_in, any_addr()),
        TestMediator::new(hash, peer_id(5)),
        config(in_mode),
    );

    let (out_result, in_result) = core
        .run(initiate.then(Ok::<_, ()>).join(accept.then(Ok::<_, ()>)))
        .unwrap();

    let out_done = match out_result {
        Ok(ref complete) => {
            assert_eq!(peer_id(5), *complete.peer_id());
            Ok(())
        }
        Err(error) => Err(error),
    };
    let in_done = match in_result {
        Ok(ref complete) => {
            assert_eq!(peer_id(4), *complete.peer_id());
            Ok(())
        }
        Err(error) => Err(error),
    };

    (out_done, in_done)
}

#[test]
fn positive_encrypted_connect() {
    let (out_done, in_done) = run_pair(EncryptionMode::Preferred, EncryptionMode::Preferred);

    assert!(out_done.is_ok());
    assert!(in_done.is_ok());
}

#[test]
fn positive_required_pair_connects() {
    let (out_done, in_done) = run_pair(EncryptionMode::Required, EncryptionMode::Required);

    assert!(out_done.is_ok());
    assert!(in_done.is_ok());
}

#[test]
fn positive_required_initiator_against_clear_preferred_acceptor() {
    // The acceptor prefers cleartext but we only offer RC4, so its tie
    // break has to land on RC4 and the exchange still completes.
    let (out_done, in_done) = run_pair(EncryptionMode::Required, EncryptionMode::ClearPreferred);

    assert!(out_done.is_ok());
    assert!(in_done.is_ok());
}

#[test]
fn positive_clear_preferred_pair_connects_in_plaintext_framing() {
    let (out_done, in_done) = run_pair(
        EncryptionMode::ClearPreferred,
        EncryptionMode::ClearPreferred,
    );

    assert!(out_done.is_ok());
    assert!(in_done.is_ok());
}

#[test]
fn negative_plain_initiator_against_required_acceptor() {
    // Neither side may complete when one requires encryption and the
    // other opens in the clear.
    let (out_done, in_done) = run_pair(EncryptionMode::ClearPreferred, EncryptionMode::Required);

    assert!(out_done.is_err());
    match *in_done.unwrap_err().kind() {
        HandshakeErrorKind::EncryptionWrong => {}
        ref kind => panic!("unexpected incoming error: {:?}", kind),
    }
}

#[test]
fn negative_seed_to_seed_connection_rejected() {
    let mut core = Core::new().unwrap();
    let (end_out, end_in) = pipe_pair();
    let hash = any_info_hash();

    let mut in_mediator = TestMediator::new(hash, peer_id(5));
    in_mediator.torrents[0].is_done = true;
    in_mediator.known_seeds = vec![(1, any_addr())];

    let initiate = Handshake::initiate(
        PeerIo::outgoing(end_out, any_addr()),
        hash,
        TestMediator::new(hash, peer_id(4)),
        config(EncryptionMode::Preferred),
    )
    .unwrap();
    let accept = Handshake::accept(
        PeerIo::incoming(end_in, any_addr()),
        in_mediator,
        config(EncryptionMode::Preferred),
    );

    let (out_result, in_result) = core
        .run(initiate.then(Ok::<_, ()>).join(accept.then(Ok::<_, ()>)))
        .unwrap();

    match *in_result.unwrap_err().kind() {
        HandshakeErrorKind::BothSeeds => {}
        ref kind => panic!("unexpected incoming error: {:?}", kind),
    }
    assert!(out_result.is_err());
}
