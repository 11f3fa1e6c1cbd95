use std::time::Duration;

use futures::Future;
use tokio_core::reactor::Core;

use mse_handshake::{
    EncryptionMode, Handshake, HandshakeErrorKind, HandshakerConfig, PeerIo,
};

use crate::pipe::pipe_pair;
use crate::{any_addr, any_info_hash, peer_id, TestMediator};

#[test]
fn negative_silent_peer_times_out() {
    let mut core = Core::new().unwrap();
    let hash = any_info_hash();

    // The far end stays alive but never says anything.
    let (_wire, end_out) = pipe_pair();

    let config = HandshakerConfig::default()
        .with_encryption_mode(EncryptionMode::Preferred)
        .with_handshake_timeout(Duration::from_millis(200));

    let initiate = Handshake::initiate(
        PeerIo::outgoing(end_out, any_addr()),
        hash,
        TestMediator::new(hash, peer_id(4)),
        config,
    )
    .unwrap();

    let result = core.run(initiate);

    match *result.unwrap_err().kind() {
        HandshakeErrorKind::Timeout => {}
        ref kind => panic!("unexpected error: {:?}", kind),
    }
}

#[test]
fn positive_fast_exchange_beats_the_deadline() {
    let mut core = Core::new().unwrap();
    let hash = any_info_hash();
    let (end_out, end_in) = pipe_pair();

    let config = HandshakerConfig::default()
        .with_encryption_mode(EncryptionMode::Preferred)
        .with_handshake_timeout(Duration::from_secs(5));

    let initiate = Handshake::initiate(
        PeerIo::outgoing(end_out, any_addr()),
        hash,
        TestMediator::new(hash, peer_id(4)),
        config,
    )
    .unwrap();
    let accept = Handshake::accept(
        PeerIo::incoming(end_in, any_addr()),
        TestMediator::new(hash, peer_id(5)),
        config,
    );

    let (out_done, in_done) = core.run(initiate.join(accept)).unwrap();

    assert_eq!(peer_id(5), *out_done.peer_id());
    assert_eq!(peer_id(4), *in_done.peer_id());
}
