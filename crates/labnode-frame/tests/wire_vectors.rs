//! Byte-exact frames as exchanged with the firmware.

use bytes::BytesMut;
use labnode_frame::{
    decode_frame, encode_frame, Frame, FunctionId, Request, Response, Status, DEFAULT_MAX_PAYLOAD,
};

const GET_SOFTWARE_VERSION: [u8; 9] = [0x4C, 0x4E, 0x01, 0x0B, 0x00, 0x00, 0x00, 0xB4, 0x20];

const SET_SETPOINT_Q16: [u8; 13] = [
    0x4C, 0x4E, 0x07, 0x09, 0x00, 0x04, 0x00, 0x00, 0x00, 0x01, 0x00, 0xCF, 0xF5,
];

const SERIAL_ACK_REPLY: [u8; 13] = [
    0x4C, 0x4E, 0x17, 0x0C, 0xF9, 0x04, 0x00, 0x39, 0x30, 0x00, 0x00, 0xD1, 0xC3,
];

fn encode(frame: Frame) -> Vec<u8> {
    let mut wire = BytesMut::new();
    encode_frame(&frame, DEFAULT_MAX_PAYLOAD, &mut wire).expect("frame should encode");
    wire.to_vec()
}

#[test]
fn empty_request_matches_firmware_bytes() {
    let request = Request::new(1, FunctionId::GetSoftwareVersion.into(), Vec::new());
    assert_eq!(encode(request.into_frame()), GET_SOFTWARE_VERSION);
}

#[test]
fn setpoint_request_carries_q16_payload() {
    // 1.0 in Q16.16
    let payload = 0x0001_0000i32.to_le_bytes().to_vec();
    let request = Request::new(7, FunctionId::SetSetpoint.into(), payload);
    assert_eq!(encode(request.into_frame()), SET_SETPOINT_Q16);
}

#[test]
fn ack_reply_decodes_with_payload() {
    let mut buf = BytesMut::from(&SERIAL_ACK_REPLY[..]);
    let response = Response::from(
        decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .expect("reply should decode")
            .expect("reply is complete"),
    );

    assert!(buf.is_empty());
    assert_eq!(response.sequence, 0x17);
    assert_eq!(
        FunctionId::try_from(response.function),
        Ok(FunctionId::GetSerialNumber)
    );
    assert_eq!(response.status, Status::ACK);
    assert!(response.status.is_success());
    assert_eq!(
        u32::from_le_bytes(response.payload.as_ref().try_into().unwrap()),
        12345
    );
}

#[test]
fn back_to_back_frames_decode_in_order() {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&GET_SOFTWARE_VERSION);
    buf.extend_from_slice(&SERIAL_ACK_REPLY);
    buf.extend_from_slice(&SET_SETPOINT_Q16[..5]);

    let first = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
    let second = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
    assert_eq!(first.sequence, 1);
    assert_eq!(second.sequence, 0x17);
    assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());

    buf.extend_from_slice(&SET_SETPOINT_Q16[5..]);
    let third = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
    assert_eq!(third.function, FunctionId::SetSetpoint.as_u8());
    assert!(buf.is_empty());
}

#[test]
fn flipped_bit_anywhere_is_a_framing_error() {
    for index in 2..SERIAL_ACK_REPLY.len() {
        let mut corrupted = SERIAL_ACK_REPLY;
        corrupted[index] ^= 0x01;
        let mut buf = BytesMut::from(&corrupted[..]);
        match decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD) {
            Err(err) => assert!(err.is_framing(), "byte {index}: {err}"),
            // A flipped length bit can make the frame look longer than the buffer.
            Ok(None) => assert!(index == 5 || index == 6, "byte {index}"),
            Ok(Some(frame)) => panic!("byte {index} decoded as {frame:?}"),
        }
    }
}
