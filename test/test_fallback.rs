use std::io;
use std::sync::Arc;

use futures::future::{self, Future};
use tokio_core::reactor::Core;

use mse_handshake::{
    EncryptionMode, Handshake, HandshakeErrorKind, HandshakerConfig, PeerIo, Reconnector,
};

use crate::pipe::{pipe_pair, PipeEnd};
use crate::{any_addr, any_info_hash, peer_id, TestMediator};

fn config(mode: EncryptionMode) -> HandshakerConfig {
    HandshakerConfig::default().with_encryption_mode(mode)
}

fn single_use_reconnector(replacement: PipeEnd) -> Reconnector<PipeEnd> {
    let mut replacement = Some(replacement);

    Box::new(move || {
        let sock = replacement
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "out of sockets"));

        Box::new(future::result(sock))
    })
}

#[test]
fn positive_encrypted_session_falls_back_to_plaintext() {
    let mut core = Core::new().unwrap();
    let hash = any_info_hash();

    // First connection dies before the peer answers the key exchange.
    let (wire, end_first) = pipe_pair();
    drop(wire);

    // The redial lands on a plain speaking acceptor.
    let (end_retry, end_in) = pipe_pair();

    let initiate = Handshake::initiate(
        PeerIo::outgoing(end_first, any_addr()),
        hash,
        TestMediator::new(hash, peer_id(4)),
        config(EncryptionMode::Preferred),
    )
    .unwrap()
    .with_reconnect(single_use_reconnector(end_retry));
    let accept = Handshake::accept(
        PeerIo::incoming(end_in, any_addr()),
        TestMediator::new(hash, peer_id(5)),
        config(EncryptionMode::ClearPreferred),
    );

    let (out_done, in_done) = core.run(initiate.join(accept)).unwrap();

    assert_eq!(peer_id(5), *out_done.peer_id());
    assert_eq!(peer_id(4), *in_done.peer_id());
}

#[test]
fn positive_utp_connect_failure_marks_peer_and_falls_back() {
    let mut core = Core::new().unwrap();
    let hash = any_info_hash();

    let (mut wire, end_first) = pipe_pair();
    wire.poison(io::ErrorKind::TimedOut);

    let (end_retry, end_in) = pipe_pair();

    let out_mediator = Arc::new(TestMediator::new(hash, peer_id(4)));

    let initiate = Handshake::initiate(
        PeerIo::outgoing_utp(end_first, any_addr()),
        hash,
        out_mediator.clone(),
        config(EncryptionMode::Preferred),
    )
    .unwrap()
    .with_reconnect(single_use_reconnector(end_retry));
    let accept = Handshake::accept(
        PeerIo::incoming(end_in, any_addr()),
        TestMediator::new(hash, peer_id(5)),
        config(EncryptionMode::Preferred),
    );

    let (out_done, _in_done) = core.run(initiate.join(accept)).unwrap();

    assert_eq!(peer_id(5), *out_done.peer_id());
    assert_eq!(
        vec![(hash, any_addr())],
        *out_mediator.utp_failures.borrow()
    );

    drop(wire);
}

#[test]
fn negative_required_mode_never_falls_back() {
    let mut core = Core::new().unwrap();
    let hash = any_info_hash();

    let (wire, end_first) = pipe_pair();
    drop(wire);

    let (end_retry, _end_in) = pipe_pair();

    let initiate = Handshake::initiate(
        PeerIo::outgoing(end_first, any_addr()),
        hash,
        TestMediator::new(hash, peer_id(4)),
        config(EncryptionMode::Required),
    )
    .unwrap()
    .with_reconnect(single_use_reconnector(end_retry));

    let result = core.run(initiate);

    match *result.unwrap_err().kind() {
        HandshakeErrorKind::Io(_) => {}
        ref kind => panic!("unexpected error: {:?}", kind),
    }
}

#[test]
fn negative_without_reconnect_hook_the_error_is_fatal() {
    let mut core = Core::new().unwrap();
    let hash = any_info_hash();

    let (wire, end_first) = pipe_pair();
    drop(wire);

    let initiate = Handshake::initiate(
        PeerIo::outgoing(end_first, any_addr()),
        hash,
        TestMediator::new(hash, peer_id(4)),
        config(EncryptionMode::Preferred),
    )
    .unwrap();

    let result = core.run(initiate);

    match *result.unwrap_err().kind() {
        HandshakeErrorKind::Io(_) => {}
        ref kind => panic!("unexpected error: {:?}", kind),
    }
}
