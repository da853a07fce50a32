// @see https://www.mongodb.com/docs/manual/legacy-opcodes/#op_reply

use std::time::Duration;

use bson::Document;

use crate::{
    connection::ResponseBuffers,
    document::DocumentCodec,
    error::{FramingError, Result},
};

use super::header::{REPLY_HEADER_LENGTH, ReplyHeader, read_i32};

/// A validated reply: header plus every document it carried.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyMessage {
    header: ReplyHeader,
    documents: Vec<Document>,
    elapsed: Duration,
}

impl ReplyMessage {
    /// Parses `buffers` as the reply to `request_id`.
    ///
    /// The header is validated before any document is decoded, so a reply that answers some
    /// other request never reaches the codec.
    pub fn parse<D>(
        buffers: &ResponseBuffers,
        codec: &D,
        request_id: i32,
        elapsed: Duration,
    ) -> Result<Self>
    where
        D: DocumentCodec + ?Sized,
    {
        let bytes = buffers.as_bytes();
        let header = ReplyHeader::parse(bytes)?;
        header.validate(request_id)?;

        if usize::try_from(header.message_length).ok() != Some(bytes.len()) {
            return Err(FramingError::Length {
                declared: header.message_length,
                actual: bytes.len(),
            }
            .into());
        }
        let declared = usize::try_from(header.number_returned).map_err(|_| {
            FramingError::DocumentCount {
                declared: header.number_returned,
                actual: 0,
            }
        })?;

        let mut body = &bytes[REPLY_HEADER_LENGTH..];
        let mut documents = Vec::with_capacity(declared.min(64));
        while documents.len() < declared {
            if body.len() < 4 {
                return Err(FramingError::DocumentCount {
                    declared: header.number_returned,
                    actual: documents.len(),
                }
                .into());
            }
            let size = read_i32(body, 0);
            let size = usize::try_from(size)
                .ok()
                .filter(|size| *size >= 5 && *size <= body.len())
                .ok_or(FramingError::Truncated {
                    expected: size.max(5) as usize,
                    actual: body.len(),
                })?;
            documents.push(codec.decode(&body[..size])?);
            body = &body[size..];
        }
        if !body.is_empty() {
            return Err(FramingError::TrailingBytes(body.len()).into());
        }

        Ok(Self {
            header,
            documents,
            elapsed,
        })
    }

    pub fn header(&self) -> &ReplyHeader {
        &self.header
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Builds a complete reply frame answering `response_to`.
#[cfg(test)]
pub(crate) fn encode_reply(response_to: i32, op_code: i32, documents: &[Document]) -> Vec<u8> {
    let mut body = Vec::new();
    for document in documents {
        document.to_writer(&mut body).unwrap();
    }
    let header = ReplyHeader {
        message_length: (REPLY_HEADER_LENGTH + body.len()) as i32,
        request_id: super::message::next_request_id(),
        response_to,
        op_code,
        response_flags: 0,
        cursor_id: 0,
        starting_from: 0,
        number_returned: documents.len() as i32,
    };
    let mut frame = Vec::with_capacity(REPLY_HEADER_LENGTH + body.len());
    header.write_to(&mut frame);
    frame.extend(body);
    frame
}
