use std::io::Write;
use std::path::Path;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::v7::{Event, EventKind};
use crate::utils::ts_rfc3339_opt;
use crate::Dsn;

/// Raised if a envelope cannot be parsed from a given input.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Unexpected end of file
    #[error("unexpected end of file")]
    UnexpectedEof,
    /// Missing envelope header
    #[error("missing envelope header")]
    MissingHeader,
    /// Missing newline after header or payload
    #[error("missing newline after header or payload")]
    MissingNewline,
    /// Invalid envelope header
    #[error("invalid envelope header")]
    InvalidHeader(#[source] serde_json::Error),
    /// Invalid item header
    #[error("invalid item header")]
    InvalidItemHeader(#[source] serde_json::Error),
    /// Invalid item payload
    #[error("invalid item payload")]
    InvalidItemPayload(#[source] serde_json::Error),
    /// The envelope file could not be read
    #[error("could not read envelope")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize, Deserialize, Default)]
struct EnvelopeHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    event_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dsn: Option<Dsn>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "ts_rfc3339_opt"
    )]
    sent_at: Option<SystemTime>,
}

/// An Envelope Item Type.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum EnvelopeItemType {
    Event,
    Transaction,
}

#[derive(Serialize, Deserialize)]
struct EnvelopeItemHeader {
    r#type: EnvelopeItemType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    length: Option<usize>,
}

/// An Envelope Item.
///
/// See the [documentation on Items](https://develop.sentry.dev/sdk/envelopes/#items)
/// for more details.
#[derive(Clone, Debug, PartialEq)]
pub enum EnvelopeItem {
    /// An Event Item.
    Event(Event),
    /// A Transaction Item.
    Transaction(Event),
}

impl EnvelopeItem {
    /// The wrapped event.
    pub fn event(&self) -> &Event {
        match self {
            EnvelopeItem::Event(event) | EnvelopeItem::Transaction(event) => event,
        }
    }

    fn item_type(&self) -> EnvelopeItemType {
        match self {
            EnvelopeItem::Event(_) => EnvelopeItemType::Event,
            EnvelopeItem::Transaction(_) => EnvelopeItemType::Transaction,
        }
    }
}

impl From<Event> for EnvelopeItem {
    fn from(event: Event) -> Self {
        match event.kind {
            EventKind::Message => EnvelopeItem::Event(event),
            EventKind::Transaction => EnvelopeItem::Transaction(event),
        }
    }
}

/// A Sentry Envelope.
///
/// One envelope is written per outbox file.  It starts with a JSON header
/// line, followed by one header line and one payload line per item.
#[derive(Clone, Default, Debug, PartialEq)]
pub struct Envelope {
    event_id: Option<Uuid>,
    dsn: Option<Dsn>,
    sent_at: Option<SystemTime>,
    items: Vec<EnvelopeItem>,
}

impl Envelope {
    /// Creates a new empty Envelope.
    pub fn new() -> Envelope {
        Default::default()
    }

    /// Add a new Envelope Item.
    pub fn add_item<I>(&mut self, item: I)
    where
        I: Into<EnvelopeItem>,
    {
        let item = item.into();
        if self.event_id.is_none() {
            self.event_id = Some(item.event().event_id);
        }
        self.items.push(item);
    }

    /// Sets the DSN written into the envelope header.
    pub fn set_dsn(&mut self, dsn: Option<Dsn>) {
        self.dsn = dsn;
    }

    /// Sets the `sent_at` header.
    pub fn set_sent_at(&mut self, sent_at: SystemTime) {
        self.sent_at = Some(sent_at);
    }

    /// The DSN from the envelope header.
    pub fn dsn(&self) -> Option<&Dsn> {
        self.dsn.as_ref()
    }

    /// Returns the Envelopes Uuid, if any.
    pub fn uuid(&self) -> Option<&Uuid> {
        self.event_id.as_ref()
    }

    /// Create an iterator over all the items.
    pub fn items(&self) -> std::slice::Iter<'_, EnvelopeItem> {
        self.items.iter()
    }

    /// Returns the event of the first item, if any.
    pub fn event(&self) -> Option<&Event> {
        self.items.first().map(EnvelopeItem::event)
    }

    /// Serialize the Envelope into the given [`Write`].
    pub fn to_writer<W>(&self, mut writer: W) -> std::io::Result<()>
    where
        W: Write,
    {
        let header = EnvelopeHeader {
            event_id: self.event_id,
            dsn: self.dsn.clone(),
            sent_at: self.sent_at,
        };
        serde_json::to_writer(&mut writer, &header)?;
        writeln!(writer)?;

        let mut item_buf = Vec::new();
        for item in &self.items {
            // payloads go through a buffer first, the header needs their length
            serde_json::to_writer(&mut item_buf, item.event())?;
            let item_header = EnvelopeItemHeader {
                r#type: item.item_type(),
                length: Some(item_buf.len()),
            };
            serde_json::to_writer(&mut writer, &item_header)?;
            writeln!(writer)?;
            writer.write_all(&item_buf)?;
            writeln!(writer)?;
            item_buf.clear();
        }

        Ok(())
    }

    /// Serializes the Envelope into a byte vector.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut buf = Vec::new();
        self.to_writer(&mut buf).map_err(serde_json::Error::io)?;
        Ok(buf)
    }

    /// Creates a new Envelope from slice.
    pub fn from_slice(slice: &[u8]) -> Result<Envelope, EnvelopeError> {
        let (header, offset) = Self::parse_header(slice)?;
        let items = Self::parse_items(slice, offset)?;

        Ok(Envelope {
            event_id: header.event_id,
            dsn: header.dsn,
            sent_at: header.sent_at,
            items,
        })
    }

    /// Creates a new Envelope from path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Envelope, EnvelopeError> {
        let bytes = std::fs::read(path)?;
        Envelope::from_slice(&bytes)
    }

    fn parse_header(slice: &[u8]) -> Result<(EnvelopeHeader, usize), EnvelopeError> {
        let mut stream = serde_json::Deserializer::from_slice(slice).into_iter();

        let header: EnvelopeHeader = match stream.next() {
            None => return Err(EnvelopeError::MissingHeader),
            Some(Err(error)) => return Err(EnvelopeError::InvalidHeader(error)),
            Some(Ok(header)) => header,
        };

        // Each header is terminated by a UNIX newline.
        Self::require_termination(slice, stream.byte_offset())?;

        Ok((header, stream.byte_offset() + 1))
    }

    fn parse_items(slice: &[u8], mut offset: usize) -> Result<Vec<EnvelopeItem>, EnvelopeError> {
        let mut items = Vec::new();

        while offset < slice.len() {
            let bytes = slice.get(offset..).ok_or(EnvelopeError::UnexpectedEof)?;
            let (item, item_size) = Self::parse_item(bytes)?;
            offset += item_size;
            items.push(item);
        }

        Ok(items)
    }

    fn parse_item(slice: &[u8]) -> Result<(EnvelopeItem, usize), EnvelopeError> {
        let mut stream = serde_json::Deserializer::from_slice(slice).into_iter();

        let header: EnvelopeItemHeader = match stream.next() {
            None => return Err(EnvelopeError::UnexpectedEof),
            Some(Err(error)) => return Err(EnvelopeError::InvalidItemHeader(error)),
            Some(Ok(header)) => header,
        };

        let header_end = stream.byte_offset();
        Self::require_termination(slice, header_end)?;

        let payload_start = std::cmp::min(header_end + 1, slice.len());
        let payload_end = match header.length {
            Some(len) => {
                let payload_end = payload_start + len;
                if slice.len() < payload_end {
                    return Err(EnvelopeError::UnexpectedEof);
                }
                Self::require_termination(slice, payload_end)?;
                payload_end
            }
            None => slice[payload_start..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(slice.len(), |relative_end| payload_start + relative_end),
        };

        let payload = &slice[payload_start..payload_end];
        let item = match header.r#type {
            EnvelopeItemType::Event => serde_json::from_slice(payload).map(EnvelopeItem::Event),
            EnvelopeItemType::Transaction => {
                serde_json::from_slice(payload).map(EnvelopeItem::Transaction)
            }
        }
        .map_err(EnvelopeError::InvalidItemPayload)?;

        Ok((item, payload_end + 1))
    }

    fn require_termination(slice: &[u8], offset: usize) -> Result<(), EnvelopeError> {
        match slice.get(offset) {
            Some(&b'\n') | None => Ok(()),
            Some(_) => Err(EnvelopeError::MissingNewline),
        }
    }
}

impl From<Event> for Envelope {
    fn from(event: Event) -> Self {
        let mut envelope = Self::default();
        envelope.add_item(event);
        envelope
    }
}
