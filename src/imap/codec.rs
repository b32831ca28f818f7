use std::{fmt::Debug, io};

use bytes::{BufMut, Bytes, BytesMut};
use imap_proto::{Request, Response, parser::parse_response};
use log::warn;
use tokio_util::codec::{Decoder, Encoder};

/// Frames server output into complete responses, literals included.
#[derive(Debug, Default)]
pub struct ImapCodec;

/// One complete server response, kept as received.
pub struct ResponseData {
    raw: Bytes,
}

impl ResponseData {
    pub fn parsed(&self) -> Response<'_> {
        let (_, response) =
            parse_response(&self.raw).expect("decoded responses should parse again");
        response
    }
}

impl Debug for ResponseData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.raw).trim_end())
    }
}

impl Decoder for ImapCodec {
    type Item = ResponseData;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.is_empty() {
                return Ok(None);
            }
            let consumed = match parse_response(src) {
                Ok((remaining, _)) => Some(src.len() - remaining.len()),
                Err(nom::Err::Incomplete(_)) => return Ok(None),
                Err(nom::Err::Error(_) | nom::Err::Failure(_)) => None,
            };
            if let Some(consumed) = consumed {
                return Ok(Some(ResponseData {
                    raw: src.split_to(consumed).freeze(),
                }));
            }

            let Some(end) = src.windows(2).position(|window| window == b"\r\n") else {
                return Ok(None);
            };
            let line = src.split_to(end + 2);
            warn!(
                "skipping response that cannot be parsed: {:?}",
                String::from_utf8_lossy(&line).trim_end()
            );
        }
    }
}

impl<'a> Encoder<&'a Request<'a>> for ImapCodec {
    type Error = io::Error;

    fn encode(&mut self, request: &'a Request<'a>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let Request(tag, command) = request;
        dst.reserve(tag.len() + command.len() + 3);
        if !tag.is_empty() {
            dst.put_slice(tag);
            dst.put_u8(b' ');
        }
        dst.put_slice(command);
        dst.put_slice(b"\r\n");
        Ok(())
    }
}
