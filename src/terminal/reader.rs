use std::io::{self, Read};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use super::buffer::TerminalBuffer;
use super::line::{OutputLine, StreamKind};
use super::text::normalize_line;

const READ_CHUNK: usize = 8 * 1024;
/// Longest line kept in one piece; longer output is split at this size.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Reads `source` until EOF, classifying each line and pushing it into `sink`.
/// Lines end at `\n`, `\r\n` or a bare `\r`, so in-place progress updates show
/// up as they are drawn. A read error ends this reader only; the sibling
/// stream keeps going.
pub fn spawn_stream_reader<R>(
    label: &str,
    stream: StreamKind,
    source: R,
    sink: Arc<Mutex<TerminalBuffer>>,
) -> io::Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    let label = label.to_owned();
    thread::Builder::new()
        .name(format!("{label}-{stream}"))
        .spawn(move || read_lines(&label, stream, source, &sink))
}

fn read_lines<R: Read>(label: &str, stream: StreamKind, mut source: R, sink: &Mutex<TerminalBuffer>) {
    let mut framer = LineFramer::default();
    let mut chunk = [0u8; READ_CHUNK];
    let mut push = |segment: &[u8]| {
        let text = normalize_line(&String::from_utf8_lossy(segment));
        let line = OutputLine::capture(stream, text);
        sink.lock().unwrap_or_else(PoisonError::into_inner).push(line);
    };
    loop {
        match source.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => framer.feed(&chunk[..read], &mut push),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => {
                tracing::warn!(instance = label, %stream, "output stream ended: {error}");
                break;
            }
        }
    }
    framer.finish(&mut push);
    tracing::debug!(instance = label, %stream, "output stream closed");
}

/// Splits a byte stream into lines across read boundaries.
#[derive(Debug, Default)]
struct LineFramer {
    pending: Vec<u8>,
    /// The previous byte was a `\r` that already ended a line, so a following
    /// `\n` belongs to it.
    after_cr: bool,
}

impl LineFramer {
    fn feed<F: FnMut(&[u8])>(&mut self, bytes: &[u8], emit: &mut F) {
        for &byte in bytes {
            let after_cr = std::mem::take(&mut self.after_cr);
            match byte {
                b'\n' if after_cr => {}
                b'\n' => self.flush(emit),
                b'\r' if self.pending.is_empty() => {}
                b'\r' => {
                    self.flush(emit);
                    self.after_cr = true;
                }
                _ => {
                    self.pending.push(byte);
                    if self.pending.len() >= MAX_LINE_BYTES {
                        self.flush(emit);
                    }
                }
            }
        }
    }

    fn finish<F: FnMut(&[u8])>(&mut self, emit: &mut F) {
        if !self.pending.is_empty() {
            self.flush(emit);
        }
    }

    fn flush<F: FnMut(&[u8])>(&mut self, emit: &mut F) {
        emit(&self.pending);
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor, Read};
    use std::sync::mpsc::{self, Receiver};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use super::{spawn_stream_reader, MAX_LINE_BYTES};
    use crate::classify::Category;
    use crate::terminal::buffer::TerminalBuffer;
    use crate::terminal::line::StreamKind;

    /// Hands out queued chunks and blocks until the sender is dropped, like a
    /// pipe whose writer is still alive.
    struct LivePipe {
        chunks: Receiver<Vec<u8>>,
    }

    impl Read for LivePipe {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.recv() {
                Ok(chunk) => {
                    let len = chunk.len().min(buf.len());
                    buf[..len].copy_from_slice(&chunk[..len]);
                    Ok(len)
                }
                Err(_) => Ok(0),
            }
        }
    }

    struct BrokenPipe;

    impl Read for BrokenPipe {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "pipe torn down"))
        }
    }

    fn texts(sink: &Mutex<TerminalBuffer>) -> Vec<String> {
        sink.lock()
            .expect("buffer lock")
            .snapshot()
            .iter()
            .map(|line| line.raw_text.clone())
            .collect()
    }

    #[test]
    fn reader_classifies_and_preserves_order() {
        let sink = Arc::new(Mutex::new(TerminalBuffer::new(16)));
        let source = Cursor::new(b"INFO: booting\r\nERROR: disk full\n\xffdone".to_vec());
        spawn_stream_reader("test", StreamKind::Stderr, source, sink.clone())
            .expect("spawn reader")
            .join()
            .expect("join reader");

        let buffer = sink.lock().expect("buffer lock");
        let lines = buffer.snapshot();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].raw_text, "INFO: booting");
        assert_eq!(lines[0].category, Category::Info);
        assert_eq!(lines[1].category, Category::Error);
        assert_eq!(lines[2].raw_text, "\u{fffd}done");
        assert!(lines.iter().all(|line| line.stream == StreamKind::Stderr));
    }

    #[test]
    fn carriage_return_progress_is_captured_while_stream_is_open() {
        let sink = Arc::new(Mutex::new(TerminalBuffer::new(16)));
        let (sender, chunks) = mpsc::channel();
        let reader = spawn_stream_reader("test", StreamKind::Stderr, LivePipe { chunks }, sink.clone())
            .expect("spawn reader");
        sender
            .send(b"Loading model: 10%\r".to_vec())
            .expect("send first chunk");
        sender.send(b"50%\r".to_vec()).expect("send second chunk");

        let deadline = Instant::now() + Duration::from_secs(5);
        while texts(&sink).len() < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(texts(&sink), vec!["Loading model: 10%", "50%"]);
        assert!(!reader.is_finished());

        sender.send(b"100%\r\ndone\n".to_vec()).expect("send tail");
        drop(sender);
        reader.join().expect("join reader");
        assert_eq!(texts(&sink), vec!["Loading model: 10%", "50%", "100%", "done"]);
    }

    #[test]
    fn newline_free_output_is_split_at_the_line_cap() {
        let sink = Arc::new(Mutex::new(TerminalBuffer::new(16)));
        let source = Cursor::new(vec![b'a'; MAX_LINE_BYTES + 10]);
        spawn_stream_reader("test", StreamKind::Stdout, source, sink.clone())
            .expect("spawn reader")
            .join()
            .expect("join reader");

        let lengths = texts(&sink).iter().map(String::len).collect::<Vec<usize>>();
        assert_eq!(lengths, vec![MAX_LINE_BYTES, 10]);
    }

    #[test]
    fn failing_stream_does_not_stop_its_sibling() {
        let sink = Arc::new(Mutex::new(TerminalBuffer::new(16)));
        let broken = spawn_stream_reader("test", StreamKind::Stdout, BrokenPipe, sink.clone())
            .expect("spawn stdout reader");
        let healthy = spawn_stream_reader(
            "test",
            StreamKind::Stderr,
            Cursor::new(b"ERROR: late\n".to_vec()),
            sink.clone(),
        )
        .expect("spawn stderr reader");
        broken.join().expect("join stdout reader");
        healthy.join().expect("join stderr reader");

        let buffer = sink.lock().expect("buffer lock");
        let lines = buffer.snapshot();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].stream, StreamKind::Stderr);
        assert_eq!(lines[0].category, Category::Error);
    }
}
