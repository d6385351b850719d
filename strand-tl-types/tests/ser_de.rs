use strand_tl_types::deserialize::Error;
use strand_tl_types::{Cursor, Deserializable, RawVec, Serializable, enums, functions, types};

// ── Primitives ────────────────────────────────────────────────────────────────

#[test]
fn integers_are_little_endian() {
    assert_eq!(0x01020304i32.to_bytes(), [4, 3, 2, 1]);
    assert_eq!((-2i64).to_bytes(), [0xfe, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
    assert_eq!(i64::from_bytes(&i64::MIN.to_bytes()).unwrap(), i64::MIN);
}

#[test]
fn bool_uses_boxed_constructors() {
    assert_eq!(true.to_bytes(), 0x997275b5u32.to_le_bytes());
    assert_eq!(false.to_bytes(), 0xbc799737u32.to_le_bytes());
    assert_eq!(
        bool::from_bytes(&7u32.to_le_bytes()),
        Err(Error::UnexpectedConstructor { id: 7 })
    );
}

#[test]
fn double_roundtrip() {
    let bytes = 1.5f64.to_bytes();
    assert_eq!(bytes.len(), 8);
    assert_eq!(f64::from_bytes(&bytes).unwrap(), 1.5);
}

#[test]
fn int128_is_raw() {
    let v: [u8; 16] = core::array::from_fn(|i| i as u8);
    assert_eq!(v.to_bytes(), v);
    assert_eq!(<[u8; 16]>::from_bytes(&v).unwrap(), v);
}

// ── String / bytes ────────────────────────────────────────────────────────────

#[test]
fn short_bytes_layout() {
    assert_eq!(b"abc".as_slice().to_bytes(), [3, b'a', b'b', b'c']);
    assert_eq!(b"abcd".as_slice().to_bytes(), [4, b'a', b'b', b'c', b'd', 0, 0, 0]);
    assert_eq!(Vec::<u8>::new().to_bytes(), [0, 0, 0, 0]);
}

#[test]
fn long_bytes_use_three_byte_length() {
    let data = vec![0x55u8; 300];
    let bytes = data.to_bytes();
    assert_eq!(&bytes[..4], &[0xfe, 0x2c, 0x01, 0x00]);
    assert_eq!(bytes.len(), 304);
    assert_eq!(Vec::<u8>::from_bytes(&bytes).unwrap(), data);
}

#[test]
fn boundary_length_253_and_254() {
    let short = vec![1u8; 253];
    assert_eq!(short.to_bytes()[0], 253);
    assert_eq!(short.to_bytes().len(), 256);

    let long = vec![1u8; 254];
    assert_eq!(long.to_bytes()[0], 0xfe);
    assert_eq!(long.to_bytes().len(), 260);
    assert_eq!(Vec::<u8>::from_bytes(&long.to_bytes()).unwrap(), long);
}

#[test]
fn string_rejects_invalid_utf8() {
    let bytes = [0xffu8, 0xfe].as_slice().to_bytes();
    assert_eq!(String::from_bytes(&bytes), Err(Error::InvalidUtf8));
}

#[test]
fn string_roundtrip() {
    let s = "привет, mtproto".to_owned();
    let bytes = s.to_bytes();
    assert_eq!(bytes.len() % 4, 0);
    assert_eq!(String::from_bytes(&bytes).unwrap(), s);
}

// ── Vectors ───────────────────────────────────────────────────────────────────

#[test]
fn boxed_vector_layout() {
    let bytes = vec![7i32, 8].to_bytes();
    assert_eq!(&bytes[..4], &0x1cb5c415u32.to_le_bytes());
    assert_eq!(&bytes[4..8], &2i32.to_le_bytes());
    assert_eq!(Vec::<i32>::from_bytes(&bytes).unwrap(), vec![7, 8]);
}

#[test]
fn bare_vector_has_no_header() {
    let bytes = RawVec(vec![1i64, 2]).to_bytes();
    assert_eq!(bytes.len(), 4 + 16);
    assert_eq!(RawVec::<i64>::from_bytes(&bytes).unwrap(), RawVec(vec![1, 2]));
}

#[test]
fn vector_with_impossible_count_is_rejected() {
    let mut bytes = 0x1cb5c415u32.to_le_bytes().to_vec();
    bytes.extend(1_000_000i32.to_le_bytes());
    assert_eq!(Vec::<i64>::from_bytes(&bytes), Err(Error::InvalidLength { len: 1_000_000 }));

    let mut bytes = 0x1cb5c415u32.to_le_bytes().to_vec();
    bytes.extend((-1i32).to_le_bytes());
    assert_eq!(Vec::<i64>::from_bytes(&bytes), Err(Error::InvalidLength { len: -1 }));
}

#[test]
fn truncated_input_is_eof() {
    assert_eq!(i32::from_bytes(&[1, 2]), Err(Error::UnexpectedEof));
    assert_eq!(Vec::<u8>::from_bytes(&[10, 1, 2]), Err(Error::UnexpectedEof));
}

// ── Service schema ────────────────────────────────────────────────────────────

#[test]
fn ping_keeps_its_id() {
    let ping = functions::Ping { ping_id: 0xCADACADA };
    let bytes = ping.to_bytes();
    assert_eq!(&bytes[..4], &0x7abe77ecu32.to_le_bytes());
    assert_eq!(bytes.len(), 12);

    let back = functions::Ping::from_bytes(&bytes).unwrap();
    assert_eq!(back.ping_id, 0xCADACADA);
}

#[test]
fn bare_types_write_no_tag() {
    let pong = types::Pong { msg_id: 1, ping_id: 2 };
    assert_eq!(pong.to_bytes().len(), 16);

    let boxed = enums::Pong::from(pong.clone());
    let bytes = boxed.to_bytes();
    assert_eq!(&bytes[..4], &0x347773c5u32.to_le_bytes());
    assert_eq!(enums::Pong::from_bytes(&bytes).unwrap(), enums::Pong::Pong(pong));
}

#[test]
fn closed_union_picks_variant_by_tag() {
    let salt = types::BadServerSalt {
        bad_msg_id: 44,
        bad_msg_seqno: 3,
        error_code: 48,
        new_server_salt: -9,
    };
    let bytes = enums::BadMsgNotification::from(salt.clone()).to_bytes();
    match enums::BadMsgNotification::from_bytes(&bytes).unwrap() {
        enums::BadMsgNotification::BadServerSalt(s) => assert_eq!(s, salt),
        other => panic!("wrong variant: {other:?}"),
    }
}

#[test]
fn closed_union_rejects_foreign_tag() {
    let bytes = functions::Ping { ping_id: 1 }.to_bytes();
    assert_eq!(
        enums::ServerDhParams::from_bytes(&bytes),
        Err(Error::UnexpectedConstructor { id: 0x7abe77ec })
    );
}

#[test]
fn future_salts_use_bare_inner_vector() {
    let salts = types::FutureSalts {
        req_msg_id: 10,
        now: 20,
        salts: RawVec(vec![types::FutureSalt { valid_since: 1, valid_until: 2, salt: 3 }]),
    };
    // req_msg_id + now + count + one 16-byte salt
    assert_eq!(salts.to_bytes().len(), 8 + 4 + 4 + 16);

    let mut cursor = Cursor::from_slice(&[]);
    assert!(types::FutureSalts::deserialize(&mut cursor).is_err());
}
