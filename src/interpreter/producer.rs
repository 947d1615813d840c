//! Lazily evaluated command sources.
//!
//! A producer yields one source line per pull instead of handing the engine a
//! pre-parsed list. The engine parses each line when it is pulled. This is the
//! seam where an embedded scripting runtime plugs in: it only needs to hand
//! back lines, never to know about frames or commands.

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::mpsc;

/// Failure reported by a producer while generating the next line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("command producer failed: {0}")]
pub struct ProducerError(pub String);

/// Pull-based source of macro lines.
///
/// `Ok(Some(line))` means a line was produced and more may follow;
/// `Ok(None)` means the producer is exhausted and will not be pulled again.
pub trait CommandProducer: Send {
    /// Pull the next source line.
    fn next_line(&mut self) -> BoxFuture<'_, Result<Option<String>, ProducerError>>;
}

/// Producer over any iterator of lines.
pub struct IterProducer<I> {
    lines: I,
}

impl<I> IterProducer<I>
where
    I: Iterator<Item = String> + Send,
{
    /// Wrap an iterator.
    pub fn new(lines: I) -> Self {
        Self { lines }
    }
}

impl<I> CommandProducer for IterProducer<I>
where
    I: Iterator<Item = String> + Send,
{
    fn next_line(&mut self) -> BoxFuture<'_, Result<Option<String>, ProducerError>> {
        let next = self.lines.next();
        Box::pin(async move { Ok(next) })
    }
}

/// Producer fed by a channel, for sources running in their own task.
///
/// Each pull waits for the sending side; dropping every sender ends the
/// stream. A sender may report a failure by sending `Err`.
pub struct ChannelProducer {
    rx: mpsc::Receiver<Result<String, ProducerError>>,
}

impl ChannelProducer {
    /// Create a producer with a bounded buffer, returning the sending half.
    pub fn channel(buffer: usize) -> (mpsc::Sender<Result<String, ProducerError>>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self { rx })
    }
}

impl CommandProducer for ChannelProducer {
    fn next_line(&mut self) -> BoxFuture<'_, Result<Option<String>, ProducerError>> {
        Box::pin(async move { self.rx.recv().await.transpose() })
    }
}
