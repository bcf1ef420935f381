//! CoAP message model and RFC 7252 datagram framing.
//!
//! ```text
//! [ver:2|type:2|tkl:4][code:8][message_id:16][token:0-8][options...][0xFF payload]
//! ```
//!
//! A [`Message`] is allocated by a transport with a fixed byte capacity;
//! every append checks the encoded size against it and fails with
//! [`TransportError::NoBufs`] instead of growing.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// CoAP protocol version carried in every header.
pub const COAP_VERSION: u8 = 1;

const HEADER_SIZE: usize = 4;
const MAX_TOKEN_LEN: usize = 8;
const PAYLOAD_MARKER: u8 = 0xFF;

/// Option numbers used on the telemetry link.
pub mod option {
    pub const URI_PATH: u16 = 11;
    pub const CONTENT_FORMAT: u16 = 12;
}

/// Errors from decoding a datagram.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("datagram too short: {0} bytes (minimum {HEADER_SIZE})")]
    TooShort(usize),

    #[error("unsupported CoAP version: {0}")]
    UnsupportedVersion(u8),

    #[error("invalid token length: {0}")]
    InvalidTokenLength(u8),

    #[error("option runs past end of datagram")]
    TruncatedOption,

    #[error("reserved option nibble 15")]
    ReservedNibble,

    #[error("payload marker followed by empty payload")]
    EmptyPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Confirmable = 0,
    NonConfirmable = 1,
    Acknowledgement = 2,
    Reset = 3,
}

impl MessageType {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Confirmable,
            1 => Self::NonConfirmable,
            2 => Self::Acknowledgement,
            _ => Self::Reset,
        }
    }
}

/// Request method or response code, `class.detail`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Code(pub u8);

impl Code {
    pub const EMPTY: Code = Code(0x00);
    pub const GET: Code = Code(0x01);
    pub const POST: Code = Code(0x02);
    pub const PUT: Code = Code(0x03);
    pub const DELETE: Code = Code(0x04);
    pub const CREATED: Code = Code(0x41);
    pub const CHANGED: Code = Code(0x44);
    pub const CONTENT: Code = Code(0x45);
    pub const BAD_REQUEST: Code = Code(0x80);
    pub const NOT_FOUND: Code = Code(0x84);

    pub const fn class(self) -> u8 {
        self.0 >> 5
    }

    pub const fn detail(self) -> u8 {
        self.0 & 0x1F
    }

    pub const fn is_request(self) -> bool {
        self.class() == 0 && self.0 != 0
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.detail())
    }
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Code({self})")
    }
}

/// Content-Format option value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentFormat(pub u16);

impl ContentFormat {
    pub const TEXT_PLAIN: ContentFormat = ContentFormat(0);
    pub const JSON: ContentFormat = ContentFormat(50);
    pub const CBOR: ContentFormat = ContentFormat(60);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapOption {
    pub number: u16,
    pub value: Vec<u8>,
}

/// One CoAP message, outbound or decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    message_type: MessageType,
    code: Code,
    message_id: u16,
    token: heapless::Vec<u8, MAX_TOKEN_LEN>,
    options: Vec<CoapOption>,
    payload_marker: bool,
    payload: Vec<u8>,
    capacity: usize,
}

impl Message {
    /// An empty confirmable message limited to `capacity` encoded bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            message_type: MessageType::Confirmable,
            code: Code::EMPTY,
            message_id: 0,
            token: heapless::Vec::new(),
            options: Vec::new(),
            payload_marker: false,
            payload: Vec::new(),
            capacity,
        }
    }

    /// Reset header, options and payload. Capacity is kept.
    pub fn init(&mut self, message_type: MessageType, code: Code) {
        self.message_type = message_type;
        self.code = code;
        self.message_id = 0;
        self.token.clear();
        self.options.clear();
        self.payload_marker = false;
        self.payload.clear();
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message_id(&self) -> u16 {
        self.message_id
    }

    pub fn set_message_id(&mut self, message_id: u16) {
        self.message_id = message_id;
    }

    pub fn token(&self) -> &[u8] {
        &self.token
    }

    pub fn set_token(&mut self, token: &[u8]) -> Result<(), TransportError> {
        let token = heapless::Vec::from_slice(token).map_err(|_| TransportError::InvalidState)?;
        let grown = self.encoded_len() - self.token.len() + token.len();
        if grown > self.capacity {
            return Err(TransportError::NoBufs);
        }
        self.token = token;
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn options(&self) -> &[CoapOption] {
        &self.options
    }

    /// Uri-Path segments joined with `/`.
    pub fn uri_path(&self) -> String {
        self.options
            .iter()
            .filter(|opt| opt.number == option::URI_PATH)
            .map(|opt| String::from_utf8_lossy(&opt.value).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn content_format(&self) -> Option<ContentFormat> {
        let opt = self.options.iter().find(|opt| opt.number == option::CONTENT_FORMAT)?;
        if opt.value.len() > 2 {
            return None;
        }
        let value = opt.value.iter().fold(0u16, |acc, byte| (acc << 8) | u16::from(*byte));
        Some(ContentFormat(value))
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Append one Uri-Path option per `/`-separated segment.
    pub fn append_uri_path(&mut self, path: &str) -> Result<(), TransportError> {
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            self.append_option(option::URI_PATH, segment.as_bytes())?;
        }
        Ok(())
    }

    pub fn append_content_format(&mut self, format: ContentFormat) -> Result<(), TransportError> {
        let bytes = format.0.to_be_bytes();
        let value = match format.0 {
            0 => &bytes[..0],
            1..=0xFF => &bytes[1..],
            _ => &bytes[..],
        };
        self.append_option(option::CONTENT_FORMAT, value)
    }

    /// Insert an option, keeping options ordered by number.
    pub fn append_option(&mut self, number: u16, value: &[u8]) -> Result<(), TransportError> {
        if self.payload_marker {
            return Err(TransportError::InvalidState);
        }
        let at = self.options.partition_point(|opt| opt.number <= number);
        self.options.insert(at, CoapOption { number, value: value.to_vec() });
        if self.encoded_len() > self.capacity {
            self.options.remove(at);
            return Err(TransportError::NoBufs);
        }
        Ok(())
    }

    pub fn set_payload_marker(&mut self) -> Result<(), TransportError> {
        if self.payload_marker {
            return Ok(());
        }
        if self.encoded_len() + 1 > self.capacity {
            return Err(TransportError::NoBufs);
        }
        self.payload_marker = true;
        Ok(())
    }

    /// Append payload bytes. The payload marker must already be set.
    pub fn append_payload(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.payload_marker {
            return Err(TransportError::InvalidState);
        }
        if self.encoded_len() + bytes.len() > self.capacity {
            return Err(TransportError::NoBufs);
        }
        self.payload.extend_from_slice(bytes);
        Ok(())
    }

    /// Size of [`Message::encode`]'s output. Once set, the payload marker is
    /// counted even while the payload is still empty.
    pub fn encoded_len(&self) -> usize {
        let mut len = HEADER_SIZE + self.token.len();
        let mut previous = 0u16;
        for opt in &self.options {
            len += option_header_len(opt.number - previous, opt.value.len()) + opt.value.len();
            previous = opt.number;
        }
        if self.payload_marker {
            len += 1 + self.payload.len();
        }
        len
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.push((COAP_VERSION << 6) | ((self.message_type as u8) << 4) | self.token.len() as u8);
        buf.push(self.code.0);
        buf.extend_from_slice(&self.message_id.to_be_bytes());
        buf.extend_from_slice(&self.token);

        let mut previous = 0u16;
        for opt in &self.options {
            let delta = usize::from(opt.number - previous);
            let (delta_nibble, delta_ext) = split_option_field(delta);
            let (len_nibble, len_ext) = split_option_field(opt.value.len());
            buf.push((delta_nibble << 4) | len_nibble);
            buf.extend_from_slice(&delta_ext);
            buf.extend_from_slice(&len_ext);
            buf.extend_from_slice(&opt.value);
            previous = opt.number;
        }

        // An empty payload never carries a marker.
        if self.payload_marker && !self.payload.is_empty() {
            buf.push(PAYLOAD_MARKER);
            buf.extend_from_slice(&self.payload);
        }
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < HEADER_SIZE {
            return Err(WireError::TooShort(data.len()));
        }

        let version = data[0] >> 6;
        if version != COAP_VERSION {
            return Err(WireError::UnsupportedVersion(version));
        }
        let message_type = MessageType::from_bits(data[0] >> 4);
        let token_len = data[0] & 0x0F;
        if usize::from(token_len) > MAX_TOKEN_LEN {
            return Err(WireError::InvalidTokenLength(token_len));
        }
        let code = Code(data[1]);
        let message_id = u16::from_be_bytes([data[2], data[3]]);

        let mut cursor = HEADER_SIZE;
        let token_end = cursor + usize::from(token_len);
        let token = data.get(cursor..token_end).ok_or(WireError::TooShort(data.len()))?;
        let token = heapless::Vec::from_slice(token)
            .map_err(|_| WireError::InvalidTokenLength(token_len))?;
        cursor = token_end;

        let mut options = Vec::new();
        let mut number = 0usize;
        let mut payload_marker = false;
        let mut payload = Vec::new();
        while cursor < data.len() {
            let byte = data[cursor];
            cursor += 1;
            if byte == PAYLOAD_MARKER {
                if cursor == data.len() {
                    return Err(WireError::EmptyPayload);
                }
                payload_marker = true;
                payload.extend_from_slice(&data[cursor..]);
                break;
            }
            let delta = read_option_field(byte >> 4, data, &mut cursor)?;
            let len = read_option_field(byte & 0x0F, data, &mut cursor)?;
            number += delta;
            let value = data.get(cursor..cursor + len).ok_or(WireError::TruncatedOption)?;
            cursor += len;
            let option_number = u16::try_from(number).map_err(|_| WireError::TruncatedOption)?;
            options.push(CoapOption { number: option_number, value: value.to_vec() });
        }

        Ok(Self {
            message_type,
            code,
            message_id,
            token,
            options,
            payload_marker,
            payload,
            capacity: data.len(),
        })
    }
}

fn option_header_len(delta: u16, len: usize) -> usize {
    1 + split_option_field(usize::from(delta)).1.len() + split_option_field(len).1.len()
}

fn split_option_field(value: usize) -> (u8, heapless::Vec<u8, 2>) {
    let mut ext = heapless::Vec::new();
    if value < 13 {
        (value as u8, ext)
    } else if value < 269 {
        let _ = ext.push((value - 13) as u8);
        (13, ext)
    } else {
        let _ = ext.extend_from_slice(&((value - 269) as u16).to_be_bytes());
        (14, ext)
    }
}

fn read_option_field(nibble: u8, data: &[u8], cursor: &mut usize) -> Result<usize, WireError> {
    match nibble {
        0..=12 => Ok(usize::from(nibble)),
        13 => {
            let byte = *data.get(*cursor).ok_or(WireError::TruncatedOption)?;
            *cursor += 1;
            Ok(usize::from(byte) + 13)
        }
        14 => {
            let bytes = data.get(*cursor..*cursor + 2).ok_or(WireError::TruncatedOption)?;
            *cursor += 2;
            Ok(usize::from(u16::from_be_bytes([bytes[0], bytes[1]])) + 269)
        }
        _ => Err(WireError::ReservedNibble),
    }
}
