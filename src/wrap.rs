//! A sliding window over input that arrives in arbitrarily sized pieces.
//!
//! The parser asks for a number of contiguous _lookahead_ bytes.  If the caller's current buffer
//! holds enough bytes, the window is simply a view of that buffer; otherwise whatever remains is
//! copied into a small backing store and glued to the bytes of the next buffer.  The byte
//! sequence presented to the parser is therefore independent of how the input was chunked.

/// Wrap-around state for one stream of bytes.
///
/// Usage is a loop of,
///
///  1. call [`wrap()`](#method.wrap) to obtain a window of at least `lookahead()` bytes,
///  2. examine the window,
///  3. call [`skip()`](#method.skip) with the number of bytes actually consumed, and possibly
///     [`set_lookahead()`](#method.set_lookahead) to change the amount needed next time.
///
/// Bytes that were inspected but not skipped will be presented again at the start of the next
/// window.
#[derive(Debug, Default)]
pub struct WrapBuffer {
    buf: Vec<u8>,
    // start of the leftover bytes within buf
    start: usize,
    skip: usize,
    lookahead: usize,
}

impl WrapBuffer {
    /// Create a buffer which will initially require `lookahead` contiguous bytes.
    pub fn new(lookahead: usize) -> WrapBuffer {
        WrapBuffer {
            buf: Vec::with_capacity(lookahead),
            start: 0,
            skip: 0,
            lookahead,
        }
    }

    /// The minimum number of bytes that a successful `wrap()` will return.
    pub fn lookahead(&self) -> usize {
        self.lookahead
    }

    /// Change the minimum window size required by the next call to `wrap()`.
    pub fn set_lookahead(&mut self, lookahead: usize) {
        self.lookahead = lookahead;
    }

    /// Commit to having consumed `count` more bytes from the start of the last window.  The
    /// count may exceed the size of that window, in which case bytes are discarded from
    /// subsequent input as it arrives.
    pub fn skip(&mut self, count: usize) {
        self.skip += count;
    }

    /// Number of bytes copied out of earlier input that have yet to be consumed.
    pub fn leftover(&self) -> usize {
        self.buf.len() - self.start
    }

    /// Discard all buffered state, retaining the current lookahead.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.start = 0;
        self.skip = 0;
    }

    /// Apply any pending skip, then return a window of at least `lookahead()` bytes.
    ///
    /// `src` is advanced past any bytes that have been skipped or copied into the backing store.
    /// When the window is taken directly from `src`, `src` is _not_ advanced; a later `skip()`
    /// does that.  Returns `None` when more input is needed, in which case `src` has been
    /// entirely consumed.
    pub fn wrap<'w, 'a: 'w>(&'w mut self, src: &mut &'a [u8]) -> Option<&'w [u8]> {
        if self.skip > 0 {
            let n = self.skip.min(self.leftover());
            self.start += n;
            self.skip -= n;
            if self.leftover() == 0 {
                self.buf.clear();
                self.start = 0;
            }
            if self.skip > 0 {
                let s: &'a [u8] = *src;
                let n = self.skip.min(s.len());
                *src = &s[n..];
                self.skip -= n;
                if self.skip > 0 {
                    return None;
                }
            }
        }

        if self.leftover() == 0 {
            let s: &'a [u8] = *src;
            if s.len() >= self.lookahead {
                return Some(s);
            }
            self.buf.clear();
            self.start = 0;
            self.buf.extend_from_slice(s);
            *src = &s[s.len()..];
            return None;
        }

        let have = self.leftover();
        if have < self.lookahead {
            if self.start > 0 {
                self.buf.drain(..self.start);
                self.start = 0;
            }
            let s: &'a [u8] = *src;
            let n = (self.lookahead - have).min(s.len());
            self.buf.extend_from_slice(&s[..n]);
            *src = &s[n..];
            if self.leftover() < self.lookahead {
                return None;
            }
        }
        Some(&self.buf[self.start..])
    }
}
