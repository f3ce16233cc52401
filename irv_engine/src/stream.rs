//! Stream resources: reusable handles over a sequence of items.
//!
//! A resource can be opened for reading any number of times, each read starting a fresh
//! sequence from the first item. Opening it for writing discards the previous contents
//! before the first item is accepted, the same way opening a file for writing truncates it.
//!
//! Read sequences and sinks borrow the resource, so a writer can never be active while a
//! reader is, and the underlying handles (files) are released when the sequence or the sink
//! is dropped, whether iteration finished, stopped early or failed.

use log::debug;
use snafu::{prelude::*, Snafu};

use std::fmt::{Debug, Display};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StreamError {
    #[snafu(display("I/O error on {path}: {source}"))]
    Io {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("{path}: line {lineno} is not valid {encoding} text"))]
    InvalidText {
        path: String,
        lineno: usize,
        encoding: TextEncoding,
    },
    #[snafu(display("{}: character {:?} cannot be written as {}", path, ch, encoding))]
    Unencodable {
        path: String,
        ch: char,
        encoding: TextEncoding,
    },
    #[snafu(display("unknown text encoding '{name}'"))]
    UnknownEncoding { name: String },
    #[snafu(display("cannot decode ballot line '{line}': {reason}"))]
    Decode { line: String, reason: String },
    #[snafu(display("the total weight exceeds {} at ballot #{index}", u64::MAX))]
    WeightOverflow { index: usize },
    /// An error raised while iterating a read sequence.
    ///
    /// For text-backed resources the failing line itself is carried by the inner
    /// [StreamError::Decode] error (see [StreamError::root_cause]).
    #[snafu(display("error on item #{}{}: {}", index, describe_last(last_item), source))]
    ReadItem {
        /// 1-based position of the item that failed.
        index: usize,
        /// The last item read successfully before the failure, if any.
        last_item: Option<String>,
        source: Box<StreamError>,
    },
    #[snafu(display("this resource does not accept writes"))]
    WriteNotSupported {},
}

fn describe_last(last_item: &Option<String>) -> String {
    match last_item {
        Some(item) => format!(" (after {})", item),
        None => String::new(),
    }
}

impl StreamError {
    /// The original error, with any read annotation peeled off.
    pub fn root_cause(&self) -> &StreamError {
        match self {
            StreamError::ReadItem { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// The 1-based index of the failing item, for errors raised while iterating.
    pub fn item_index(&self) -> Option<usize> {
        match self {
            StreamError::ReadItem { index, .. } => Some(*index),
            _ => None,
        }
    }
}

pub type StreamResult<T> = Result<T, StreamError>;

/// A lazily produced read sequence.
pub type ItemStream<'a, T> = Box<dyn Iterator<Item = StreamResult<T>> + 'a>;

/// A readable and writable sequence of items, independent of the backing medium.
pub trait StreamResource<T> {
    /// Opens a fresh read sequence, yielding items in the order they were written.
    fn read(&self) -> StreamResult<ItemStream<'_, T>>;

    /// Opens the resource for writing.
    ///
    /// The previous contents are gone once this returns, even if nothing is sent afterwards.
    fn write(&mut self) -> StreamResult<Box<dyn Sink<T> + '_>>;
}

/// The write side of a resource.
pub trait Sink<T> {
    /// Appends the next item.
    fn send(&mut self, item: T) -> StreamResult<()>;

    /// Flushes pending output and releases the backing handle.
    fn finish(self: Box<Self>) -> StreamResult<()>;
}

/// Replaces the contents of `target` with `items`. Returns the number of items written.
pub fn write_all<T, S, I>(target: &mut S, items: I) -> StreamResult<usize>
where
    S: StreamResource<T> + ?Sized,
    I: IntoIterator<Item = T>,
{
    let mut sink = target.write()?;
    let mut count = 0;
    for item in items {
        sink.send(item)?;
        count += 1;
    }
    sink.finish()?;
    Ok(count)
}

/// Reads every item of a resource into memory.
pub fn read_all<T, S>(source: &S) -> StreamResult<Vec<T>>
where
    S: StreamResource<T> + ?Sized,
{
    source.read()?.collect()
}

/// Replaces the contents of `target` with the items of `source`.
pub fn copy_items<T, S, D>(source: &S, target: &mut D) -> StreamResult<usize>
where
    S: StreamResource<T> + ?Sized,
    D: StreamResource<T> + ?Sized,
{
    let mut sink = target.write()?;
    let mut count = 0;
    for item in source.read()? {
        sink.send(item?)?;
        count += 1;
    }
    sink.finish()?;
    debug!("copy_items: copied {} items", count);
    Ok(count)
}

// Wraps errors raised during iteration with the position of the failing item and the last
// item read before it. Errors that already carry an annotation pass through untouched, so
// stacked resources report the innermost position only once.
struct Annotated<I, T> {
    inner: I,
    index: usize,
    last: Option<T>,
    failed: bool,
}

impl<I, T> Iterator for Annotated<I, T>
where
    I: Iterator<Item = StreamResult<T>>,
    T: Clone + Debug,
{
    type Item = StreamResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let res = self.inner.next()?;
        self.index += 1;
        match res {
            Ok(item) => {
                self.last = Some(item.clone());
                Some(Ok(item))
            }
            Err(e @ StreamError::ReadItem { .. }) => {
                self.failed = true;
                Some(Err(e))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(StreamError::ReadItem {
                    index: self.index,
                    last_item: self.last.take().map(|item| format!("{:?}", item)),
                    source: Box::new(e),
                }))
            }
        }
    }
}

fn annotated<'a, I, T>(inner: I) -> ItemStream<'a, T>
where
    I: Iterator<Item = StreamResult<T>> + 'a,
    T: Clone + Debug + 'a,
{
    Box::new(Annotated {
        inner,
        index: 0,
        last: None,
        failed: false,
    })
}

// ******** In-memory list ********

/// A resource backed by a vector.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ListResource<T> {
    items: Vec<T>,
}

impl<T> ListResource<T> {
    pub fn new() -> ListResource<T> {
        ListResource { items: Vec::new() }
    }

    pub fn from_items(items: Vec<T>) -> ListResource<T> {
        ListResource { items }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Clone + Debug + 'static> StreamResource<T> for ListResource<T> {
    fn read(&self) -> StreamResult<ItemStream<'_, T>> {
        Ok(annotated(self.items.iter().cloned().map(Ok)))
    }

    fn write(&mut self) -> StreamResult<Box<dyn Sink<T> + '_>> {
        self.items.clear();
        Ok(Box::new(ListSink {
            items: &mut self.items,
        }))
    }
}

struct ListSink<'a, T> {
    items: &'a mut Vec<T>,
}

impl<'a, T> Sink<T> for ListSink<'a, T> {
    fn send(&mut self, item: T) -> StreamResult<()> {
        self.items.push(item);
        Ok(())
    }

    fn finish(self: Box<Self>) -> StreamResult<()> {
        Ok(())
    }
}

// ******** In-memory text buffer ********

/// A resource of text lines held in a string, one item per line.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct BufferResource {
    buffer: String,
}

impl BufferResource {
    pub fn new() -> BufferResource {
        BufferResource {
            buffer: String::new(),
        }
    }

    pub fn from_text(text: &str) -> BufferResource {
        BufferResource {
            buffer: text.to_string(),
        }
    }

    pub fn contents(&self) -> &str {
        &self.buffer
    }
}

impl StreamResource<String> for BufferResource {
    fn read(&self) -> StreamResult<ItemStream<'_, String>> {
        Ok(annotated(self.buffer.lines().map(|l| Ok(l.to_string()))))
    }

    fn write(&mut self) -> StreamResult<Box<dyn Sink<String> + '_>> {
        self.buffer.clear();
        Ok(Box::new(BufferSink {
            buffer: &mut self.buffer,
        }))
    }
}

struct BufferSink<'a> {
    buffer: &'a mut String,
}

impl<'a> Sink<String> for BufferSink<'a> {
    fn send(&mut self, item: String) -> StreamResult<()> {
        self.buffer.push_str(&item);
        self.buffer.push('\n');
        Ok(())
    }

    fn finish(self: Box<Self>) -> StreamResult<()> {
        Ok(())
    }
}

// ******** Files ********

/// The text encodings understood by file resources.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
    /// ISO-8859-1: every byte is one character.
    Latin1,
}

impl TextEncoding {
    fn decode(self, bytes: Vec<u8>) -> Option<String> {
        match self {
            TextEncoding::Utf8 => String::from_utf8(bytes).ok(),
            TextEncoding::Latin1 => Some(bytes.iter().map(|&b| b as char).collect()),
        }
    }

    fn encode(self, line: &str) -> Result<Vec<u8>, char> {
        match self {
            TextEncoding::Utf8 => Ok(line.as_bytes().to_vec()),
            TextEncoding::Latin1 => line
                .chars()
                .map(|c| u8::try_from(u32::from(c)).map_err(|_| c))
                .collect(),
        }
    }
}

impl Display for TextEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TextEncoding::Utf8 => write!(f, "utf-8"),
            TextEncoding::Latin1 => write!(f, "latin-1"),
        }
    }
}

impl FromStr for TextEncoding {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(TextEncoding::Latin1),
            _ => UnknownEncodingSnafu { name: s }.fail(),
        }
    }
}

/// A line-oriented text file. Items are the lines, without their line terminators.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct FileResource {
    path: PathBuf,
    encoding: TextEncoding,
}

impl FileResource {
    pub fn new(path: impl Into<PathBuf>, encoding: TextEncoding) -> FileResource {
        FileResource {
            path: path.into(),
            encoding,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }
}

impl StreamResource<String> for FileResource {
    fn read(&self) -> StreamResult<ItemStream<'_, String>> {
        let path = self.display_path();
        let file = File::open(&self.path).context(IoSnafu { path: path.clone() })?;
        debug!("FileResource: opened {} for reading", path);
        Ok(annotated(LineReader {
            reader: BufReader::new(file),
            encoding: self.encoding,
            path,
            lineno: 0,
        }))
    }

    fn write(&mut self) -> StreamResult<Box<dyn Sink<String> + '_>> {
        let path = self.display_path();
        let file = File::create(&self.path).context(IoSnafu { path: path.clone() })?;
        debug!("FileResource: truncated {} for writing", path);
        Ok(Box::new(FileSink {
            writer: BufWriter::new(file),
            encoding: self.encoding,
            path,
        }))
    }
}

struct LineReader {
    reader: BufReader<File>,
    encoding: TextEncoding,
    path: String,
    lineno: usize,
}

impl Iterator for LineReader {
    type Item = StreamResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut buf: Vec<u8> = Vec::new();
        match self.reader.read_until(b'\n', &mut buf) {
            Ok(0) => None,
            Ok(_) => {
                self.lineno += 1;
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }
                let line = self.encoding.decode(buf).context(InvalidTextSnafu {
                    path: self.path.clone(),
                    lineno: self.lineno,
                    encoding: self.encoding,
                });
                Some(line)
            }
            Err(e) => Some(Err(StreamError::Io {
                source: e,
                path: self.path.clone(),
            })),
        }
    }
}

struct FileSink {
    writer: BufWriter<File>,
    encoding: TextEncoding,
    path: String,
}

impl Sink<String> for FileSink {
    fn send(&mut self, item: String) -> StreamResult<()> {
        let bytes = match self.encoding.encode(&item) {
            Ok(b) => b,
            Err(ch) => {
                return UnencodableSnafu {
                    path: self.path.clone(),
                    ch,
                    encoding: self.encoding,
                }
                .fail();
            }
        };
        self.writer
            .write_all(&bytes)
            .and_then(|_| self.writer.write_all(b"\n"))
            .context(IoSnafu {
                path: self.path.clone(),
            })
    }

    fn finish(mut self: Box<Self>) -> StreamResult<()> {
        self.writer.flush().context(IoSnafu {
            path: self.path.clone(),
        })
    }
}

// ******** Converting wrapper ********

/// Presents a resource of `U` items as a resource of `T` items.
///
/// Reading decodes every inner item, writing encodes every item before handing it to the
/// inner resource. The inner resource keeps its own truncation and release behavior.
pub struct ConvertingResource<R, U, T> {
    inner: R,
    decode: fn(U) -> StreamResult<T>,
    encode: fn(&T) -> U,
}

impl<R, U, T> ConvertingResource<R, U, T> {
    pub fn new(
        inner: R,
        decode: fn(U) -> StreamResult<T>,
        encode: fn(&T) -> U,
    ) -> ConvertingResource<R, U, T> {
        ConvertingResource {
            inner,
            decode,
            encode,
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }
}

impl<R: Debug, U, T> Debug for ConvertingResource<R, U, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvertingResource")
            .field("inner", &self.inner)
            .finish()
    }
}

impl<R, U, T> StreamResource<T> for ConvertingResource<R, U, T>
where
    R: StreamResource<U>,
    U: 'static,
    T: Clone + Debug + 'static,
{
    fn read(&self) -> StreamResult<ItemStream<'_, T>> {
        let decode = self.decode;
        let raw = self.inner.read()?;
        Ok(annotated(raw.map(move |r| r.and_then(decode))))
    }

    fn write(&mut self) -> StreamResult<Box<dyn Sink<T> + '_>> {
        let encode = self.encode;
        let inner = self.inner.write()?;
        Ok(Box::new(ConvertingSink { inner, encode }))
    }
}

struct ConvertingSink<'a, U, T> {
    inner: Box<dyn Sink<U> + 'a>,
    encode: fn(&T) -> U,
}

impl<'a, U, T> Sink<T> for ConvertingSink<'a, U, T> {
    fn send(&mut self, item: T) -> StreamResult<()> {
        self.inner.send((self.encode)(&item))
    }

    fn finish(self: Box<Self>) -> StreamResult<()> {
        self.inner.finish()
    }
}

// ******** Null resource ********

/// The empty placeholder resource. Reading yields nothing, writing is refused.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub struct NullResource;

impl<T: 'static> StreamResource<T> for NullResource {
    fn read(&self) -> StreamResult<ItemStream<'_, T>> {
        Ok(Box::new(std::iter::empty()))
    }

    fn write(&mut self) -> StreamResult<Box<dyn Sink<T> + '_>> {
        WriteNotSupportedSnafu {}.fail()
    }
}
