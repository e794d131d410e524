//! Newline framing with a length cap.
//!
//! Oversized lines are discarded up to their newline and reported, so a
//! client cannot make the server buffer without limit. Bytes that are not
//! UTF-8 are reported instead of failing the read.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

#[derive(Debug, PartialEq, Eq)]
pub enum Line {
    Text(String),
    TooLong,
    NotUtf8,
}

pub struct LineReader<R> {
    inner: BufReader<R>,
    max_len: usize,
    buf: Vec<u8>,
    overflow: bool,
}

fn append(buf: &mut Vec<u8>, overflow: &mut bool, max_len: usize, chunk: &[u8]) {
    if *overflow {
        return;
    }
    if buf.len() + chunk.len() > max_len {
        *overflow = true;
        buf.clear();
    } else {
        buf.extend_from_slice(chunk);
    }
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: BufReader<R>, max_len: usize) -> Self {
        Self {
            inner,
            max_len,
            buf: Vec::new(),
            overflow: false,
        }
    }

    /// Next line without its terminator, `None` at end of stream.
    ///
    /// Cancel safe: partial input stays buffered in `self` between polls.
    pub async fn next_line(&mut self) -> std::io::Result<Option<Line>> {
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                if self.buf.is_empty() && !self.overflow {
                    return Ok(None);
                }
                return Ok(Some(self.take_line()));
            }

            match available.iter().position(|b| *b == b'\n') {
                Some(i) => {
                    append(&mut self.buf, &mut self.overflow, self.max_len, &available[..i]);
                    self.inner.consume(i + 1);
                    return Ok(Some(self.take_line()));
                }
                None => {
                    let n = available.len();
                    append(&mut self.buf, &mut self.overflow, self.max_len, available);
                    self.inner.consume(n);
                }
            }
        }
    }

    fn take_line(&mut self) -> Line {
        if std::mem::take(&mut self.overflow) {
            self.buf.clear();
            return Line::TooLong;
        }
        let mut raw = std::mem::take(&mut self.buf);
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        match String::from_utf8(raw) {
            Ok(text) => Line::Text(text),
            Err(_) => Line::NotUtf8,
        }
    }
}
