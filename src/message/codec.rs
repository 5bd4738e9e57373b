// Copyright 2019 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Low-level message codec functions implementing the RFC 7252 §3 wire
//! format: fixed four-byte header, token, delta-encoded options, and the
//! 0xFF-prefixed payload.

use super::option::*;
use super::*;

/// The smallest buffer that can hold a CoAP message.
pub const MIN_MESSAGE_LEN: usize = 4;

/// Decodes one option from a `core::slice::Iter`, which can be obtained from a byte slice.
/// The iterator is then advanced to the next option.
///
/// Will return `Ok(None)` if it either encounters the payload marker (0xFF) or if the
/// given iterator has been fully consumed.
pub fn decode_option<'a>(
    iter: &mut core::slice::Iter<'a, u8>,
    last_option: OptionNumber,
) -> Result<Option<(OptionNumber, &'a [u8])>, Error> {
    macro_rules! try_next {
        ($iter:expr, $none:expr) => {
            match ($iter).next() {
                Some(x) => *x,
                None => return $none,
            }
        };
    }

    let header: u8 = try_next!(iter, Ok(None));

    if header == 0xFF {
        // Payload marker.
        return Ok(None);
    }

    let key_delta: u16 = match header >> 4 {
        13 => 13u16 + try_next!(iter, Err(Error::Malformed)) as u16,
        14 => {
            let msb = try_next!(iter, Err(Error::Malformed)) as u16;
            let lsb = try_next!(iter, Err(Error::Malformed)) as u16;
            match 269u16.checked_add((msb << 8) | lsb) {
                Some(x) => x,
                None => return Err(Error::Malformed),
            }
        }
        15 => return Err(Error::Malformed),
        key => key as u16,
    };

    let len = match header & 0xF {
        13 => (13 + try_next!(iter, Err(Error::Malformed))) as usize,
        14 => {
            let msb = try_next!(iter, Err(Error::Malformed)) as u16;
            let lsb = try_next!(iter, Err(Error::Malformed)) as u16;
            269usize + (((msb << 8) | lsb) as usize)
        }
        15 => return Err(Error::Malformed),
        len => len as usize,
    };

    if last_option.0 > core::u16::MAX - key_delta {
        // Don't let the option number wrap.
        return Err(Error::Malformed);
    }

    let number = last_option + key_delta;

    if iter.as_slice().len() < len {
        return Err(Error::Malformed);
    }

    if len == 0 {
        return Ok(Some((number, &[])));
    }

    let value: &'a [u8] = &iter.as_slice()[..len];

    iter.nth(len - 1);

    Ok(Some((number, value)))
}

/// Appends the wire encoding of one option (delta header, extended
/// length bytes, and value) to `buffer`.
pub fn encode_option(
    buffer: &mut Vec<u8>,
    prev_key: OptionNumber,
    key: OptionNumber,
    value: &[u8],
) -> Result<(), Error> {
    if prev_key > key {
        return Err(Error::InvalidArgument);
    }

    if value.len() > MAX_OPTION_VALUE_SIZE {
        return Err(Error::InvalidArgument);
    }

    let option_delta = (key - prev_key) as usize;
    let value_len = value.len();

    let header_at = buffer.len();
    buffer.push(0);

    let mut header: u8;

    if option_delta >= 269 {
        header = 14 << 4;
        buffer.push(((option_delta - 269) >> 8) as u8);
        buffer.push((option_delta - 269) as u8);
    } else if option_delta >= 13 {
        header = 13 << 4;
        buffer.push((option_delta - 13) as u8);
    } else {
        header = (option_delta << 4) as u8;
    }

    if value_len >= 269 {
        header |= 14;
        buffer.push(((value_len - 269) >> 8) as u8);
        buffer.push((value_len - 269) as u8);
    } else if value_len >= 13 {
        header |= 13;
        buffer.push((value_len - 13) as u8);
    } else {
        header |= (value_len & 15) as u8;
    }

    buffer[header_at] = header;
    buffer.extend_from_slice(value);

    Ok(())
}

/// Parses a stand-alone UDP CoAP datagram into a [`Message`].
///
/// Fails with [`Error::Malformed`] when the buffer is shorter than four
/// bytes, the version field isn't 1, the token length exceeds eight, an
/// option header runs past the end of the buffer, an option violates its
/// declared length bounds, or the payload marker is not followed by at
/// least one byte. Malformed datagrams must be dropped silently, never
/// acknowledged.
pub fn decode_message(buffer: &[u8]) -> Result<Message, Error> {
    if buffer.len() < MIN_MESSAGE_LEN {
        return Err(Error::Malformed);
    }

    if (buffer[0] & COAP_MSG_VER_MASK) >> COAP_MSG_VER_OFFS != Message::VERSION {
        return Err(Error::Malformed);
    }

    let msg_type = MsgType::from((buffer[0] & COAP_MSG_T_MASK) >> COAP_MSG_T_OFFS);
    let msg_code = MsgCode::try_from(buffer[1]).ok_or(Error::UnknownMessageCode)?;
    let msg_id = buffer[3] as u16 | ((buffer[2] as u16) << 8);

    let token_len = (buffer[0] & COAP_MSG_TKL_MASK) as usize;
    if token_len > MsgToken::MAX_LEN {
        return Err(Error::Malformed);
    }
    if buffer.len() < 4 + token_len {
        return Err(Error::Malformed);
    }
    let token = MsgToken::new(&buffer[4..4 + token_len]);

    let mut options = Options::new();
    let mut iter = buffer[4 + token_len..].iter();
    let mut last_option = OptionNumber::default();
    let mut saw_marker = false;

    loop {
        let remaining = iter.as_slice();
        if remaining.is_empty() {
            break;
        }
        if remaining[0] == 0xFF {
            saw_marker = true;
            iter.next();
            break;
        }

        let (number, value) = match decode_option(&mut iter, last_option)? {
            Some(x) => x,
            None => break,
        };

        let (min, max) = number.value_len_bounds();
        if value.len() < min || value.len() > max {
            return Err(Error::Malformed);
        }

        // Uint values re-canonicalise on the way in; wire values with
        // leading zero bytes decode to the same message as their
        // canonical form.
        let value = match number.value_format() {
            OptionFormat::Uint => {
                let x = try_decode_u32(value).ok_or(Error::Malformed)?;
                encode_u32_vec(x)
            }
            _ => value.to_vec(),
        };

        options
            .insert_bytes(number, &value)
            .map_err(|_| Error::Malformed)?;
        last_option = number;
    }

    let payload = iter.as_slice();

    if saw_marker && payload.is_empty() {
        return Err(Error::Malformed);
    }

    let msg = {
        let mut msg = Message::new(msg_type, msg_code);
        msg.set_msg_id(msg_id);
        msg.set_msg_token(token);
        *msg.options_mut() = options;
        msg.set_payload(payload.to_vec());
        msg
    };

    // An empty message is just the four-byte header; anything more is a
    // message format error.
    if msg.is_empty()
        && (!msg.msg_token().is_empty() || !msg.options().is_empty() || !msg.payload().is_empty())
    {
        return Err(Error::Malformed);
    }

    Ok(msg)
}

/// Serializes a [`Message`] to its wire representation.
///
/// Options come out in ascending number order (the [`Options`] container
/// maintains that invariant), repeats with a delta of zero.
pub fn encode_message(msg: &Message) -> Result<Vec<u8>, Error> {
    let token = msg.msg_token();

    let mut buffer: Vec<u8> =
        Vec::with_capacity(4 + token.len() + 8 * msg.options().len() + msg.payload().len() + 1);

    buffer.push(
        (Message::VERSION << COAP_MSG_VER_OFFS)
            | ((msg.msg_type() as u8) << COAP_MSG_T_OFFS)
            | token.len() as u8,
    );
    buffer.push(msg.msg_code() as u8);
    buffer.push((msg.msg_id() >> 8) as u8);
    buffer.push(msg.msg_id() as u8);
    buffer.extend_from_slice(token.as_bytes());

    let mut last_option = OptionNumber::default();
    for (number, value) in msg.options().iter() {
        encode_option(&mut buffer, last_option, number, value)?;
        last_option = number;
    }

    if !msg.payload().is_empty() {
        buffer.push(0xFF);
        buffer.extend_from_slice(msg.payload());
    }

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::option;

    #[test]
    fn message_codec_rfc7252_fig_16() {
        let mut msg = Message::request(MsgType::Con, MsgCode::MethodGet);
        msg.set_msg_id(0x7d34);
        msg.options_mut().insert(option::URI_PATH, "temperature").unwrap();

        let packet_calc = msg.to_bytes().unwrap();
        let packet_real = &[
            0b01000000, 1, 0x7d, 0x34, 0xbb, b't', b'e', b'm', b'p', b'e', b'r', b'a', b't', b'u',
            b'r', b'e',
        ];
        assert_eq!(packet_real[..], packet_calc[..]);

        let parsed = Message::from_bytes(packet_real).unwrap();
        assert_eq!(MsgType::Con, parsed.msg_type());
        assert_eq!(MsgCode::MethodGet, parsed.msg_code());
        assert_eq!(0x7d34, parsed.msg_id());
        assert_eq!(MsgToken::EMPTY, parsed.msg_token());
        assert!(parsed.payload().is_empty());
        assert_eq!(Some("temperature"), parsed.options().get(option::URI_PATH));
        assert_eq!(msg, parsed);

        let mut msg = Message::response(MsgType::Ack, MsgCode::SuccessContent);
        msg.set_msg_id(0x7d34);
        msg.set_payload(&b"22.3 C"[..]);
        let packet_calc = msg.to_bytes().unwrap();
        let packet_real = &[
            0b01100000, 69, 0x7d, 0x34, 0xff, b'2', b'2', b'.', b'3', b' ', b'C',
        ];
        assert_eq!(packet_real[..], packet_calc[..]);
    }

    #[test]
    fn message_codec_rfc7252_fig_17() {
        let mut msg = Message::request(MsgType::Con, MsgCode::MethodGet);
        msg.set_msg_id(0x7d34);
        msg.set_msg_token(MsgToken::from(0x20u32));
        msg.options_mut().insert(option::URI_PATH, "temperature").unwrap();

        let packet_calc = msg.to_bytes().unwrap();
        let packet_real = &[
            0b01000001, 1, 0x7d, 0x34, 0x20, 0xbb, b't', b'e', b'm', b'p', b'e', b'r', b'a', b't',
            b'u', b'r', b'e',
        ];
        assert_eq!(packet_real[..], packet_calc[..]);
        assert_eq!(msg, Message::from_bytes(packet_real).unwrap());

        let mut msg = Message::response(MsgType::Ack, MsgCode::SuccessContent);
        msg.set_msg_id(0x7d34);
        msg.set_msg_token(MsgToken::from(0x20u32));
        msg.set_payload(&b"22.3 C"[..]);
        let packet_calc = msg.to_bytes().unwrap();
        let packet_real = &[
            0b01100001, 69, 0x7d, 0x34, 0x20, 0xff, b'2', b'2', b'.', b'3', b' ', b'C',
        ];
        assert_eq!(packet_real[..], packet_calc[..]);
    }

    #[test]
    fn message_codec_multiple_options() {
        let mut msg = Message::request(MsgType::Con, MsgCode::MethodPost);
        msg.set_msg_id(0x7d34);
        msg.set_msg_token(MsgToken::from(0x2021u32));
        msg.options_mut()
            .insert(option::CONTENT_FORMAT, ContentFormat::TEXT_PLAIN_UTF8)
            .unwrap();
        msg.options_mut().insert(option::URI_PATH, "temp").unwrap();
        msg.set_payload(&b"22.3 C"[..]);

        let packet_calc = msg.to_bytes().unwrap();
        let packet_real = &[
            0b01000010, 2, 0x7d, 0x34, 0x20, 0x21, 0xb4, b't', b'e', b'm', b'p', 0x10, 0xff, b'2',
            b'2', b'.', b'3', b' ', b'C',
        ];
        assert_eq!(packet_real[..], packet_calc[..]);

        let parsed = Message::from_bytes(packet_real).unwrap();
        assert_eq!(
            Some(ContentFormat::TEXT_PLAIN_UTF8),
            parsed.content_format()
        );
        assert_eq!(b"22.3 C", parsed.payload());
        assert_eq!(msg, parsed);
    }

    #[test]
    fn extended_deltas_and_lengths() {
        let mut msg = Message::request(MsgType::Non, MsgCode::MethodGet);
        msg.set_msg_id(1);
        // Delta 13..268 takes the one-byte extension, >= 269 the two-byte
        // extension; same for lengths.
        msg.options_mut().insert_bytes(OptionNumber(20), b"a").unwrap();
        msg.options_mut().insert_bytes(OptionNumber(300), b"b").unwrap();
        msg.options_mut()
            .insert_bytes(OptionNumber(3000), &[b'c'; 13])
            .unwrap();
        msg.options_mut()
            .insert_bytes(OptionNumber(3000), &[b'd'; 300])
            .unwrap();

        let bytes = msg.to_bytes().unwrap();
        let parsed = Message::from_bytes(&bytes).unwrap();
        assert_eq!(msg, parsed);

        let collected: Vec<(OptionNumber, usize)> =
            parsed.options().iter().map(|(n, v)| (n, v.len())).collect();
        assert_eq!(
            vec![
                (OptionNumber(20), 1),
                (OptionNumber(300), 1),
                (OptionNumber(3000), 13),
                (OptionNumber(3000), 300),
            ],
            collected
        );
    }

    #[test]
    fn uint_canonicalisation() {
        // Observe value 5 encoded wastefully as [0x00, 0x05]: decoding
        // must canonicalise it so that a re-encode round-trips.
        let packet = &[
            0b01000001, 1, 0x12, 0x34, 0xAB, 0x62, 0x00, 0x05,
        ];
        let parsed = Message::from_bytes(packet).unwrap();
        assert_eq!(Some(5), parsed.observe());
        assert_eq!(
            Some(&[0x05][..]),
            parsed.options().get_first(OptionNumber::OBSERVE)
        );

        let reencoded = parsed.to_bytes().unwrap();
        assert_eq!(parsed, Message::from_bytes(&reencoded).unwrap());
    }

    #[test]
    fn malformed_messages() {
        // Too short.
        assert_eq!(Err(Error::Malformed), Message::from_bytes(&[0x40, 0, 0]));

        // Bad version.
        assert_eq!(
            Err(Error::Malformed),
            Message::from_bytes(&[0b10000000, 0, 0, 0])
        );

        // TKL > 8.
        assert_eq!(
            Err(Error::Malformed),
            Message::from_bytes(&[0b01001001, 1, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9])
        );

        // Token length runs past the end.
        assert_eq!(
            Err(Error::Malformed),
            Message::from_bytes(&[0b01000100, 1, 0, 0, 1, 2])
        );

        // Option length extension runs past the end.
        assert_eq!(
            Err(Error::Malformed),
            Message::from_bytes(&[0b01000000, 1, 0, 0, 0x1D])
        );

        // Option value runs past the end.
        assert_eq!(
            Err(Error::Malformed),
            Message::from_bytes(&[0b01000000, 1, 0, 0, 0x13, b'a'])
        );

        // Nibble 15 outside the payload marker.
        assert_eq!(
            Err(Error::Malformed),
            Message::from_bytes(&[0b01000000, 1, 0, 0, 0xF0, 0])
        );

        // Payload marker with zero-length payload.
        assert_eq!(
            Err(Error::Malformed),
            Message::from_bytes(&[0b01000000, 1, 0, 0, 0xFF])
        );

        // Empty code with a token.
        assert_eq!(
            Err(Error::Malformed),
            Message::from_bytes(&[0b01000001, 0, 0, 0, 0xAB])
        );
    }

    #[test]
    fn empty_message_codec() {
        let msg = Message::reset(0x1234);
        let bytes = msg.to_bytes().unwrap();
        assert_eq!(&[0b01110000, 0, 0x12, 0x34][..], &bytes[..]);
        assert_eq!(msg, Message::from_bytes(&bytes).unwrap());

        let msg = Message::empty_ack(0x1234);
        let bytes = msg.to_bytes().unwrap();
        assert_eq!(&[0b01100000, 0, 0x12, 0x34][..], &bytes[..]);
    }

    #[test]
    fn stress_round_trip() {
        use rand::prelude::*;
        use rand::rngs::SmallRng;

        let mut rng = SmallRng::from_seed(Default::default());

        for _ in 0..100 {
            let mut msg = Message::request(MsgType::Con, MsgCode::MethodPut);
            msg.set_msg_id(rng.gen());
            msg.set_msg_token(MsgToken::from(rng.gen::<u32>()));

            for _ in 0..rng.gen_range(0, 8) {
                let number = OptionNumber(rng.gen_range(0, 2000) * 2 + 1200);
                let len = rng.gen_range(0, 20);
                let value: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
                msg.options_mut().insert_bytes(number, &value).unwrap();
            }

            if rng.gen() {
                let len = rng.gen_range(1, 64);
                let payload: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
                msg.set_payload(payload);
            }

            let bytes = msg.to_bytes().unwrap();
            assert_eq!(msg, Message::from_bytes(&bytes).unwrap(), "bytes: {:02x?}", bytes);
        }
    }
}
