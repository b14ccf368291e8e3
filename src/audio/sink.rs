//! # Output Channels for Encoded Frames
//!
//! The pipeline pushes each encoded Opus packet into a `FrameSink` as soon as it
//! is produced. The sink is owned by the caller: the pipeline only ever appends,
//! it never reads from or closes it.
//!
//! ## Backpressure:
//! Bounded channels (`tokio::sync::mpsc::Sender`, `std::sync::mpsc::SyncSender`)
//! block the sending thread while the queue is full, so the encoder runs no
//! faster than its consumer drains it.
//!
//! ## Thread Model:
//! Sending is synchronous. With tokio channels this uses `blocking_send`, which
//! must not be called from inside an async task; run the pipeline on
//! `tokio::task::spawn_blocking` (or a plain thread) instead.

use std::fmt;
use std::sync::mpsc as std_mpsc;
use tokio::sync::mpsc as tokio_mpsc;

/// The consumer side of the channel has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkClosed;

impl fmt::Display for SinkClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame sink closed")
    }
}

impl std::error::Error for SinkClosed {}

/// Destination for encoded Opus packets, one call per 20 ms frame.
pub trait FrameSink {
    fn send_frame(&mut self, payload: Vec<u8>) -> Result<(), SinkClosed>;
}

/// Collect frames in memory.
impl FrameSink for Vec<Vec<u8>> {
    fn send_frame(&mut self, payload: Vec<u8>) -> Result<(), SinkClosed> {
        self.push(payload);
        Ok(())
    }
}

impl<S: FrameSink + ?Sized> FrameSink for &mut S {
    fn send_frame(&mut self, payload: Vec<u8>) -> Result<(), SinkClosed> {
        (**self).send_frame(payload)
    }
}

/// Bounded tokio channel; blocks the calling thread while the channel is full.
///
/// ## Rust Concepts:
/// - **T: From<Vec<u8>>**: any message type that can wrap a packet works, so
///   callers can multiplex frames with their own control messages
impl<T: From<Vec<u8>>> FrameSink for tokio_mpsc::Sender<T> {
    fn send_frame(&mut self, payload: Vec<u8>) -> Result<(), SinkClosed> {
        self.blocking_send(T::from(payload)).map_err(|_| SinkClosed)
    }
}

impl<T: From<Vec<u8>>> FrameSink for tokio_mpsc::UnboundedSender<T> {
    fn send_frame(&mut self, payload: Vec<u8>) -> Result<(), SinkClosed> {
        self.send(T::from(payload)).map_err(|_| SinkClosed)
    }
}

impl<T: From<Vec<u8>>> FrameSink for std_mpsc::Sender<T> {
    fn send_frame(&mut self, payload: Vec<u8>) -> Result<(), SinkClosed> {
        self.send(T::from(payload)).map_err(|_| SinkClosed)
    }
}

/// Rendezvous or bounded std channel; blocks until the receiver makes room.
impl<T: From<Vec<u8>>> FrameSink for std_mpsc::SyncSender<T> {
    fn send_frame(&mut self, payload: Vec<u8>) -> Result<(), SinkClosed> {
        self.send(T::from(payload)).map_err(|_| SinkClosed)
    }
}
