//! Streaming changeset record extraction
//!
//! Delta files and the historical dump share one inner markup: a sequence
//! of `<changeset>` elements with attribute-style fields and nested
//! `<tag k v>` annotation nodes. Inputs range from kilobytes to
//! multi-gigabyte dumps, so extraction is single-pass over an XML event
//! reader; memory use is bounded by one record's markup, never the
//! document.
//!
//! Normalization is identical for both sources:
//!
//! - no `uid` attribute: `user_id = 0`, `user_name = "anonymous"`
//! - bounding box: all four bounds parse or all four default to `0.0`
//! - absent timestamps stay `None`; a missing `closed_at` usually just
//!   means the changeset is still open
//! - duplicate tag keys keep the last value seen
//! - a record without an `id` is dropped, not an error

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::SyncIoBridge;
use tracing::{debug, warn};

use chx_common::time::parse_timestamp;

use crate::models::{ChangesetRecord, ANONYMOUS_USER};

/// Records buffered between the decoder thread and the async consumer
const RECORD_CHANNEL_CAPACITY: usize = 1024;

/// Compression scheme wrapping a changeset document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Minutely delta files
    Gzip,
    /// The historical dump
    Bzip2,
    /// Already-decompressed input
    Plain,
}

impl Compression {
    /// Guess the scheme from a file extension
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some("gz") => Compression::Gzip,
            Some("bz2") => Compression::Bzip2,
            _ => Compression::Plain,
        }
    }
}

/// Single-pass iterator over the changesets in one document.
///
/// The underlying stream is consumed once; the iterator is finite and not
/// restartable. Records missing an `id` are skipped and counted in
/// [`ChangesetExtractor::dropped`].
pub struct ChangesetExtractor<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    limit: Option<usize>,
    emitted: usize,
    dropped: usize,
    done: bool,
}

impl<R: BufRead> ChangesetExtractor<R> {
    /// Extract from an already-decompressed reader
    pub fn new(reader: R, limit: Option<usize>) -> Self {
        Self {
            reader: Reader::from_reader(reader),
            buf: Vec::new(),
            limit,
            emitted: 0,
            dropped: 0,
            done: false,
        }
    }

    /// Records emitted so far
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Records dropped for lacking an `id`
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Collect nested `<tag>` nodes until the enclosing changeset ends.
    /// Duplicate keys keep the last value.
    fn collect_tags(&mut self) -> HashMap<String, String> {
        let mut tags = HashMap::new();
        let mut depth = 0usize;
        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Empty(e)) => {
                    if depth == 0 && e.local_name().as_ref() == b"tag" {
                        insert_tag(&e, &mut tags);
                    }
                }
                Ok(Event::Start(e)) => {
                    if depth == 0 && e.local_name().as_ref() == b"tag" {
                        insert_tag(&e, &mut tags);
                    }
                    depth += 1;
                }
                Ok(Event::End(_)) => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                Ok(Event::Eof) | Err(_) => break,
                Ok(_) => {}
            }
        }
        tags
    }
}

impl ChangesetExtractor<BufReader<Box<dyn Read + Send>>> {
    /// Extract from a compressed byte stream, decoding on the fly
    pub fn from_compressed(
        raw: impl Read + Send + 'static,
        compression: Compression,
        limit: Option<usize>,
    ) -> Self {
        let decoded: Box<dyn Read + Send> = match compression {
            Compression::Gzip => Box::new(flate2::read::GzDecoder::new(raw)),
            Compression::Bzip2 => Box::new(bzip2::read::MultiBzDecoder::new(raw)),
            Compression::Plain => Box::new(raw),
        };
        Self::new(BufReader::new(decoded), limit)
    }
}

/// What one XML event means for extraction
enum Scanned {
    /// `<changeset ...>` with possible children
    Open(HashMap<String, String>),
    /// Self-closing `<changeset .../>`
    Closed(HashMap<String, String>),
    Eof,
    Other,
}

impl<R: BufRead> Iterator for ChangesetExtractor<R> {
    type Item = ChangesetRecord;

    fn next(&mut self) -> Option<ChangesetRecord> {
        loop {
            if self.done {
                return None;
            }
            // The limit applies to emitted records, after the drop rule.
            if self.limit.is_some_and(|limit| self.emitted >= limit) {
                self.done = true;
                return None;
            }

            self.buf.clear();
            let scanned = match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) if e.local_name().as_ref() == b"changeset" => {
                    Scanned::Open(attribute_map(&e))
                }
                Ok(Event::Empty(e)) if e.local_name().as_ref() == b"changeset" => {
                    Scanned::Closed(attribute_map(&e))
                }
                Ok(Event::Eof) => Scanned::Eof,
                Ok(_) => Scanned::Other,
                Err(err) => {
                    warn!(error = %err, "stopping extraction on unreadable markup");
                    Scanned::Eof
                }
            };

            let record = match scanned {
                Scanned::Open(attrs) => {
                    let tags = self.collect_tags();
                    build_record(&attrs, tags)
                }
                Scanned::Closed(attrs) => build_record(&attrs, HashMap::new()),
                Scanned::Eof => {
                    if self.dropped > 0 {
                        debug!(dropped = self.dropped, "changesets without an id discarded");
                    }
                    self.done = true;
                    return None;
                }
                Scanned::Other => continue,
            };

            match record {
                Some(record) => {
                    self.emitted += 1;
                    return Some(record);
                }
                None => self.dropped += 1,
            }
        }
    }
}

/// Copy an element's attributes into an owned map
fn attribute_map(element: &BytesStart<'_>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for attr in element.attributes().with_checks(false).flatten() {
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        if let Ok(value) = attr.unescape_value() {
            map.insert(key, value.into_owned());
        }
    }
    map
}

fn insert_tag(element: &BytesStart<'_>, tags: &mut HashMap<String, String>) {
    let attrs = attribute_map(element);
    if let (Some(k), Some(v)) = (attrs.get("k"), attrs.get("v")) {
        tags.insert(k.clone(), v.clone());
    }
}

/// Normalize one raw element into a record; `None` drops it
fn build_record(
    attrs: &HashMap<String, String>,
    tags: HashMap<String, String>,
) -> Option<ChangesetRecord> {
    // No id, nothing to persist.
    let id = attrs.get("id").and_then(|v| v.parse::<i64>().ok())?;

    let (user_id, user_name) = match attrs.get("uid").and_then(|v| v.parse::<i32>().ok()) {
        Some(uid) => (
            uid,
            attrs
                .get("user")
                .cloned()
                .unwrap_or_else(|| ANONYMOUS_USER.to_string()),
        ),
        None => (0, ANONYMOUS_USER.to_string()),
    };

    let created_at = attrs
        .get("created_at")
        .and_then(|v| parse_timestamp(v).ok());
    let closed_at = attrs.get("closed_at").and_then(|v| parse_timestamp(v).ok());
    let num_changes = attrs.get("num_changes").and_then(|v| v.parse::<i32>().ok());

    // The bounding box is all-or-nothing: any missing bound defaults the
    // whole group.
    let bounds =
        ["min_lon", "max_lon", "min_lat", "max_lat"].map(|k| attrs.get(k).and_then(|v| v.parse::<f64>().ok()));
    let [min_lon, max_lon, min_lat, max_lat] = match bounds {
        [Some(min_lon), Some(max_lon), Some(min_lat), Some(max_lat)] => {
            [min_lon, max_lon, min_lat, max_lat]
        }
        _ => [0.0; 4],
    };

    Some(ChangesetRecord {
        id,
        user_id,
        user_name,
        created_at,
        closed_at,
        num_changes,
        min_lon,
        max_lon,
        min_lat,
        max_lat,
        tags,
    })
}

/// Stream changesets out of a fetched byte stream.
///
/// Decompression and XML parsing run on a blocking thread; records cross
/// a bounded channel, so memory stays proportional to the channel
/// capacity rather than the document size. The stream ends when the
/// document does or when the receiver is dropped.
pub fn stream_changesets<R>(
    raw: R,
    compression: Compression,
    limit: Option<usize>,
) -> ReceiverStream<ChangesetRecord>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let (tx, rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
    tokio::task::spawn_blocking(move || {
        let bridge = SyncIoBridge::new(raw);
        let mut extractor = ChangesetExtractor::from_compressed(bridge, compression, limit);
        for record in extractor.by_ref() {
            if tx.blocking_send(record).is_err() {
                debug!("record receiver dropped, abandoning extraction");
                return;
            }
        }
    });
    ReceiverStream::new(rx)
}
