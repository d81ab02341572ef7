use super::*;
use bytes::Bytes;

#[test]
fn peer_id_has_client_tag() {
    let id = PeerId::generate();
    assert_eq!(id.client_tag(), Some("IB0001"));
    assert_ne!(id.0, PeerId::generate().0);
}

#[test]
fn handshake_round_trip() {
    let hs = Handshake::new([1u8; 20], [2u8; 20]);
    let decoded = Handshake::decode(&hs.encode()).unwrap();
    assert_eq!(decoded.info_hash, [1u8; 20]);
    assert_eq!(decoded.peer_id, [2u8; 20]);
    assert!(decoded.supports_extended());
}

#[test]
fn handshake_rejects_wrong_protocol() {
    let mut bytes = Handshake::new([0u8; 20], [0u8; 20]).encode().to_vec();
    bytes[1] = b'X';
    assert!(Handshake::decode(&bytes).is_err());
}

#[test]
fn message_round_trips() {
    let messages = vec![
        Message::KeepAlive,
        Message::Choke,
        Message::Unchoke,
        Message::Interested,
        Message::NotInterested,
        Message::Have { piece: 42 },
        Message::Bitfield(Bytes::from_static(&[0xa0, 0x01])),
        Message::Request {
            index: 3,
            begin: 16384,
            length: 16384,
        },
        Message::Piece {
            index: 3,
            begin: 0,
            data: Bytes::from_static(b"hello"),
        },
        Message::Cancel {
            index: 3,
            begin: 16384,
            length: 16384,
        },
        Message::Extended {
            id: 1,
            payload: Bytes::from_static(b"d1:md6:ut_pexi1eee"),
        },
    ];
    for msg in messages {
        assert_eq!(Message::decode(msg.encode()).unwrap(), msg);
    }
}

#[test]
fn decode_rejects_unknown_id() {
    let frame = Bytes::from_static(&[0, 0, 0, 1, 99]);
    assert!(matches!(
        Message::decode(frame),
        Err(PeerError::UnknownMessageId(99))
    ));
}

#[test]
fn decode_rejects_truncated_payload() {
    // HAVE claims a 4-byte payload but carries none.
    let frame = Bytes::from_static(&[0, 0, 0, 1, 4]);
    assert!(Message::decode(frame).is_err());
}

#[test]
fn bitfield_set_unset_count() {
    let mut bf = Bitfield::new(100);
    assert!(!bf.has(0));
    bf.set(0);
    bf.set(99);
    assert!(bf.has(0) && bf.has(99));
    assert_eq!(bf.count_set(), 2);
    bf.unset(0);
    assert_eq!(bf.count_set(), 1);
    // Out-of-range indices are ignored.
    bf.set(100);
    assert_eq!(bf.count_set(), 1);
}

#[test]
fn bitfield_progress_and_complete() {
    let mut bf = Bitfield::new(2);
    assert_eq!(bf.progress(), 0.0);
    bf.set(0);
    assert_eq!(bf.progress(), 0.5);
    bf.set(1);
    assert!(bf.is_complete());
    assert_eq!(bf.progress(), 1.0);
}

#[test]
fn bitfield_inverted_clears_spare_bits() {
    let bf = Bitfield::new(10);
    let inv = bf.inverted();
    assert_eq!(inv.count_set(), 10);
    assert!(inv.is_complete());
    // Inverting back gives the empty field; spare bits never leak.
    assert_eq!(inv.inverted(), bf);
}

#[test]
fn bitfield_wire_round_trip() {
    let mut bf = Bitfield::new(11);
    bf.set(0);
    bf.set(7);
    bf.set(10);
    let wire = bf.to_wire_bytes();
    assert_eq!(wire.len(), 2);
    assert_eq!(Bitfield::from_wire_bytes(&wire, 11), bf);
}

#[test]
fn bitfield_bencode_round_trip() {
    let mut bf = Bitfield::new(17);
    bf.set(3);
    bf.set(16);
    let encoded = bf.to_bencode();
    assert_eq!(Bitfield::from_bencode(&encoded).unwrap(), bf);
}

#[test]
fn find_rarest_prefers_lowest_count() {
    let len = 8u32;
    let mut remote = Bitfield::new(len);
    remote.set(1);
    remote.set(2);
    remote.set(3);

    // Piece 1 held by two peers, piece 2 by one, piece 3 by none.
    let mut a = Bitfield::new(len);
    a.set(1);
    a.set(2);
    let mut b = Bitfield::new(len);
    b.set(1);
    let swarm = vec![a, b];

    assert_eq!(remote.find_rarest(&swarm, |_| false), Some(3));
    assert_eq!(remote.find_rarest(&swarm, |i| i == 3), Some(2));
    assert_eq!(remote.find_rarest(&swarm, |_| true), None);
}

#[test]
fn find_rarest_tie_breaks_to_lowest_index() {
    let mut remote = Bitfield::new(4);
    remote.set(1);
    remote.set(2);
    assert_eq!(remote.find_rarest(&[], |_| false), Some(1));
}

#[tokio::test]
async fn framed_round_trip_over_duplex() {
    let (client, server) = tokio::io::duplex(4096);
    let mut writer = FrameWriter::new(client);
    let mut reader = FrameReader::new(server);

    writer.send(&Message::Have { piece: 7 }).await.unwrap();
    writer
        .send(&Message::Request {
            index: 7,
            begin: 0,
            length: 16384,
        })
        .await
        .unwrap();

    assert_eq!(reader.recv().await.unwrap(), Message::Have { piece: 7 });
    assert_eq!(
        reader.recv().await.unwrap(),
        Message::Request {
            index: 7,
            begin: 0,
            length: 16384
        }
    );
}

#[tokio::test]
async fn framed_drains_oversize_frames() {
    let (client, server) = tokio::io::duplex(1 << 16);
    let mut reader = FrameReader::new(server);

    // A 10 MiB frame followed by a normal HAVE. The reader must skip the
    // oversize body and return the next frame.
    let oversize = 10 * 1024 * 1024u32;
    let writer_task = tokio::spawn(async move {
        use tokio::io::AsyncWriteExt;
        let mut client = client;
        client.write_all(&oversize.to_be_bytes()).await.unwrap();
        let junk = vec![0xffu8; 64 * 1024];
        let mut left = oversize as usize;
        while left > 0 {
            let n = left.min(junk.len());
            client.write_all(&junk[..n]).await.unwrap();
            left -= n;
        }
        client
            .write_all(&Message::Have { piece: 5 }.encode())
            .await
            .unwrap();
    });

    assert_eq!(reader.recv().await.unwrap(), Message::Have { piece: 5 });
    writer_task.await.unwrap();
}

#[tokio::test]
async fn handshake_exchange_over_duplex() {
    let (mut client, mut server) = tokio::io::duplex(4096);

    let ours = Handshake::new([9u8; 20], [1u8; 20]);
    send_handshake(&mut client, &ours).await.unwrap();
    let got = recv_handshake(&mut server).await.unwrap();
    assert_eq!(got.info_hash, [9u8; 20]);
}

#[test]
fn extended_handshake_round_trip() {
    let ours = ExtendedHandshake::ours("ibit 0.1.0");
    let decoded = ExtendedHandshake::decode(&ours.encode()).unwrap();
    assert_eq!(decoded.id_for(UT_PEX), Some(1));
    assert_eq!(decoded.client.as_deref(), Some("ibit 0.1.0"));
    // Sub-id zero means "not supported".
    let none = ExtendedHandshake::decode(b"d1:md6:ut_pexi0eee").unwrap();
    assert_eq!(none.id_for(UT_PEX), None);
}
