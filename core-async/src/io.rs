//! Async I/O traits and utilities.
//!
//! Download bodies and cache file reads are exposed as boxed [`AsyncRead`]
//! streams; these re-exports keep the trait set consistent across crates.

pub use tokio::io::{
    empty, AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt,
    AsyncWrite, AsyncWriteExt, BufReader, BufWriter, ReadBuf,
};

pub use tokio_util::io::{ReaderStream, StreamReader};
