//! Fan-out of one byte stream into an archive writer and an optional live sink.

use tokio::io::{AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Attached,
    /// The live sink went away; only the archive keeps receiving bytes.
    Detached,
}

pub struct Tee<A, S> {
    archive: A,
    sink: Option<S>,
    bytes: u64,
}

impl<A, S> Tee<A, S>
where
    A: AsyncWrite + Unpin,
    S: AsyncWrite + Unpin,
{
    pub fn new(archive: A, sink: Option<S>) -> Self {
        Self {
            archive,
            sink,
            bytes: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    pub fn sink_state(&self) -> SinkState {
        if self.sink.is_some() {
            SinkState::Attached
        } else {
            SinkState::Detached
        }
    }

    /// Writes `chunk` to the archive, then to the sink.
    ///
    /// Archive errors are returned. A sink error detaches the sink.
    pub async fn write(&mut self, chunk: &[u8]) -> std::io::Result<SinkState> {
        self.archive.write_all(chunk).await?;
        self.bytes += chunk.len() as u64;

        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.write_all(chunk).await {
                tracing::debug!(error = %e, "Live sink closed");
                self.sink = None;
            }
        }

        Ok(self.sink_state())
    }

    /// Flushes the archive and closes the sink, returning the archive writer.
    pub async fn finish(mut self) -> std::io::Result<(A, u64)> {
        self.archive.flush().await?;
        if let Some(mut sink) = self.sink.take() {
            let _ = sink.shutdown().await;
        }
        Ok((self.archive, self.bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_both_destinations_receive_same_bytes() {
        let (writer, mut reader) = tokio::io::duplex(1024);
        let mut tee = Tee::new(Vec::new(), Some(writer));

        let reading = tokio::spawn(async move {
            let mut received = Vec::new();
            reader.read_to_end(&mut received).await.unwrap();
            received
        });

        assert_eq!(tee.write(b"-- header\n").await.unwrap(), SinkState::Attached);
        assert_eq!(tee.write(b"CREATE TABLE t ();\n").await.unwrap(), SinkState::Attached);

        let (archive, bytes) = tee.finish().await.unwrap();
        let received = reading.await.unwrap();

        assert_eq!(bytes, 29);
        assert_eq!(archive, received);
        assert_eq!(archive, b"-- header\nCREATE TABLE t ();\n".to_vec());
    }

    #[tokio::test]
    async fn test_closed_sink_detaches_but_archive_continues() {
        let (writer, reader) = tokio::io::duplex(64);
        drop(reader);
        let mut tee = Tee::new(Vec::new(), Some(writer));

        assert_eq!(tee.write(b"abc").await.unwrap(), SinkState::Detached);
        assert_eq!(tee.write(b"def").await.unwrap(), SinkState::Detached);

        let (archive, bytes) = tee.finish().await.unwrap();
        assert_eq!(archive, b"abcdef".to_vec());
        assert_eq!(bytes, 6);
    }

    #[tokio::test]
    async fn test_archive_only() {
        let mut tee: Tee<Vec<u8>, tokio::io::DuplexStream> = Tee::new(Vec::new(), None);
        assert_eq!(tee.sink_state(), SinkState::Detached);
        tee.write(b"xyz").await.unwrap();
        assert_eq!(tee.bytes_written(), 3);
    }
}
