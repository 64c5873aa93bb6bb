//! Integration tests for the wire protocol.
//!
//! Messages are moved through their wire representation (header bytes plus
//! body parts) into a receiving message, the way the connection layer does.

use bytes::Bytes;

use crate::codec::{
    ServerInfo, decode_dump, decode_empty, decode_failure, decode_files, decode_heartbeat,
    decode_interrupt, decode_leader, decode_server, decode_servers, encode_dump, encode_empty,
    encode_failure, encode_files, encode_heartbeat, encode_interrupt, encode_leader,
    encode_server, encode_servers,
};
use crate::error::WireError;
use crate::header::{HEADER_SIZE, Header, WORD_SIZE};
use crate::message::Message;

/// Serializes `message` into wire bytes.
fn to_wire(message: &Message) -> Vec<u8> {
    let mut wire = message.header_bytes().to_vec();
    let (primary, overflow) = message.body_parts();
    wire.extend_from_slice(primary);
    if let Some(overflow) = overflow {
        wire.extend_from_slice(overflow);
    }
    wire
}

/// Receives wire bytes into a fresh message with the given primary capacity.
fn from_wire(wire: &[u8], capacity: usize) -> Message {
    let mut message = Message::with_capacity(capacity);
    let header: &[u8; HEADER_SIZE] = wire[..HEADER_SIZE].try_into().unwrap();
    message.set_received_header(header);

    let mut body = &wire[HEADER_SIZE..];
    let (primary, overflow) = message.body_buffers();
    primary.copy_from_slice(&body[..primary.len()]);
    body = &body[primary.len()..];
    if let Some(overflow) = overflow {
        overflow.copy_from_slice(body);
    }
    message
}

fn transfer(message: &Message, capacity: usize) -> Message {
    let received = from_wire(&to_wire(message), capacity);
    assert_eq!(received.header(), message.header());
    assert_eq!(received.body_len(), message.body_len());
    received
}

#[test]
fn test_request_round_trips() {
    let mut request = Message::with_capacity(16);

    encode_leader(&mut request).unwrap();
    decode_leader(&mut transfer(&request, 16)).unwrap();
    request.reset();

    encode_heartbeat(&mut request, 1_700_000_000).unwrap();
    assert_eq!(decode_heartbeat(&mut transfer(&request, 16)).unwrap(), 1_700_000_000);
    request.reset();

    encode_interrupt(&mut request, 42).unwrap();
    assert_eq!(decode_interrupt(&mut transfer(&request, 16)).unwrap(), 42);
    request.reset();

    encode_dump(&mut request, "a-rather-long-database-name.db").unwrap();
    assert!(request.has_overflow());
    assert_eq!(
        decode_dump(&mut transfer(&request, 16)).unwrap(),
        "a-rather-long-database-name.db"
    );
}

#[test]
fn test_response_round_trips() {
    let mut response = Message::with_capacity(64);

    encode_failure(&mut response, 5, "database is locked").unwrap();
    assert_eq!(
        decode_failure(&mut transfer(&response, 64)).unwrap(),
        WireError::Failure {
            code: 5,
            message: "database is locked".to_string()
        }
    );
    response.reset();

    encode_server(&mut response, "10.0.0.1:9001").unwrap();
    assert_eq!(decode_server(&mut transfer(&response, 64)).unwrap(), "10.0.0.1:9001");
    response.reset();

    let servers = vec![
        ServerInfo {
            id: 1,
            address: "10.0.0.1:9001".to_string(),
        },
        ServerInfo {
            id: 2,
            address: "@node2".to_string(),
        },
    ];
    encode_servers(&mut response, &servers).unwrap();
    assert_eq!(decode_servers(&mut transfer(&response, 64)).unwrap(), servers);
    response.reset();

    encode_empty(&mut response).unwrap();
    decode_empty(&mut transfer(&response, 64)).unwrap();
}

#[test]
fn test_files_round_trip_with_bulk_payload() {
    let main_db: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
    let wal = vec![0x5Au8; 1001];

    let mut response = Message::with_capacity(512);
    encode_files(&mut response, &[("test", &main_db[..]), ("test-wal", &wal[..])]).unwrap();
    assert!(response.has_overflow());

    let mut received = transfer(&response, 512);
    assert!(received.has_overflow());

    let files: Vec<(String, Bytes)> = decode_files(&mut received)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].0, "test");
    assert_eq!(files[0].1, main_db);
    assert_eq!(files[1].0, "test-wal");
    assert_eq!(files[1].1, wal);
}

#[test]
fn test_wire_bytes_are_bit_exact() {
    let mut request = Message::with_capacity(16);
    encode_dump(&mut request, "db").unwrap();

    let wire = to_wire(&request);
    assert_eq!(
        wire,
        vec![1, 0, 0, 0, 15, 0, 0, 0, b'd', b'b', 0, 0, 0, 0, 0, 0]
    );
    assert_eq!(to_wire(&transfer(&request, 8)), wire);
}

#[test]
fn test_truncated_files_response() {
    let mut response = Message::with_capacity(64);
    response.put_u64(2);
    response.put_string("only-one").unwrap();
    response.put_blob(b"data");
    response.put_header(9, 0).unwrap();

    let mut received = transfer(&response, 64);
    let results: Vec<_> = decode_files(&mut received).unwrap().collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert_eq!(results[1], Err(WireError::UnterminatedString));
}

#[test]
fn test_files_response_with_oversized_blob_length() {
    for declared in [u64::MAX, 24] {
        let mut response = Message::with_capacity(16);
        response.put_u64(1);
        response.put_string("a").unwrap();
        response.put_u64(declared);
        response.put_u64(0);
        response.put_header(9, 0).unwrap();

        let mut received = transfer(&response, 16);
        let mut files = decode_files(&mut received).unwrap();
        assert!(matches!(
            files.next(),
            Some(Err(WireError::Truncated { available: 8, .. }))
        ));
        assert!(files.next().is_none());
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn strings_are_word_aligned(name in "[^\\x00]{0,64}") {
            let mut request = Message::with_capacity(32);
            encode_dump(&mut request, &name).unwrap();

            let expected_words = (name.len() + 1).div_ceil(WORD_SIZE);
            prop_assert_eq!(request.header().words as usize, expected_words);
            prop_assert_eq!(request.body_len(), expected_words * WORD_SIZE);

            let wire = to_wire(&request);
            // Padding is all zeros.
            prop_assert!(wire[HEADER_SIZE + name.len()..].iter().all(|&b| b == 0));
        }

        #[test]
        fn strings_decode_across_any_split(name in "[^\\x00]{0,64}", capacity in 0usize..96) {
            let mut request = Message::with_capacity(32);
            encode_dump(&mut request, &name).unwrap();

            let mut received = transfer(&request, capacity);
            prop_assert_eq!(decode_dump(&mut received).unwrap(), name);
            prop_assert_eq!(received.remaining(), 0);
        }

        #[test]
        fn blobs_decode_across_any_split(
            data in prop::collection::vec(any::<u8>(), 0..300),
            capacity in 0usize..400,
        ) {
            let mut response = Message::with_capacity(64);
            encode_files(&mut response, &[("f", &data[..])]).unwrap();

            let body = 8 + 8 + 8 + data.len().div_ceil(WORD_SIZE) * WORD_SIZE;
            prop_assert_eq!(response.header().body_len(), body);

            let mut received = transfer(&response, capacity);
            prop_assert_eq!(received.has_overflow(), body > capacity);

            let mut files = decode_files(&mut received).unwrap();
            let (name, decoded) = files.next().unwrap().unwrap();
            prop_assert_eq!(name, "f");
            prop_assert_eq!(&decoded[..], &data[..]);
            prop_assert!(files.next().is_none());
        }

        #[test]
        fn header_round_trips(words: u32, mtype: u8, flags: u8, extra: u16) {
            let header = Header { words, mtype, flags, extra };
            prop_assert_eq!(Header::decode(&header.encode()), header);
        }
    }
}
