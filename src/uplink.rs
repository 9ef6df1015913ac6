//! Line protocol spoken with the network co-processor over UART.
//!
//! ```text
//! -> PUB <json>\n      <- OK\n | ERR\n
//! -> TIME?\n           <- TIME <epoch seconds>\n
//! ```
//!
//! The co-processor owns the network attach and the MQTT session; this
//! side only frames requests and classifies replies.

/// Prefix of a publish request; the JSON batch and `\n` follow.
pub const PUBLISH_PREFIX: [u8; 4] = *b"PUB ";

/// Epoch time request.
pub const TIME_QUERY: [u8; 6] = *b"TIME?\n";

/// Longest reply line we buffer.
pub const MAX_REPLY_LEN: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reply {
    Ack,
    Nak,
    Time(i64),
    Unknown,
}

/// Classify one reply line (without the terminator).
pub fn parse_reply(line: &[u8]) -> Reply {
    let line = trim(line);
    match line {
        b"OK" => Reply::Ack,
        b"ERR" => Reply::Nak,
        _ => line
            .strip_prefix(b"TIME ")
            .and_then(|v| core::str::from_utf8(v).ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|t| *t > 0)
            .map_or(Reply::Unknown, Reply::Time),
    }
}

fn trim(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\r' | b'\n' | b' ') {
        end -= 1;
    }
    &line[..end]
}

/// Accumulates UART bytes into reply lines.
pub struct LineBuffer<const N: usize> {
    buf: heapless::Vec<u8, N>,
    overflowed: bool,
}

impl<const N: usize> LineBuffer<N> {
    pub const fn new() -> Self {
        Self {
            buf: heapless::Vec::new(),
            overflowed: false,
        }
    }

    /// Feed one byte; yields the parsed reply when a `\n` completes a
    /// line.  Over-long lines are dropped whole.
    pub fn push(&mut self, byte: u8) -> Option<Reply> {
        if byte != b'\n' {
            if self.buf.push(byte).is_err() {
                self.overflowed = true;
            }
            return None;
        }
        let reply = (!self.overflowed).then(|| parse_reply(&self.buf));
        self.buf.clear();
        self.overflowed = false;
        reply
    }
}

impl<const N: usize> Default for LineBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed<const N: usize>(lb: &mut LineBuffer<N>, bytes: &[u8]) -> Option<Reply> {
        let mut last = None;
        for b in bytes {
            if let Some(r) = lb.push(*b) {
                last = Some(r);
            }
        }
        last
    }

    #[test]
    fn replies_classified() {
        assert_eq!(parse_reply(b"OK"), Reply::Ack);
        assert_eq!(parse_reply(b"OK\r"), Reply::Ack);
        assert_eq!(parse_reply(b"ERR"), Reply::Nak);
        assert_eq!(parse_reply(b"TIME 1700000000"), Reply::Time(1_700_000_000));
        assert_eq!(parse_reply(b"TIME 0"), Reply::Unknown);
        assert_eq!(parse_reply(b"TIME soon"), Reply::Unknown);
        assert_eq!(parse_reply(b"OKAY"), Reply::Unknown);
        assert_eq!(parse_reply(b""), Reply::Unknown);
    }

    #[test]
    fn lines_assembled_from_bytes() {
        let mut lb: LineBuffer<MAX_REPLY_LEN> = LineBuffer::new();
        assert_eq!(feed(&mut lb, b"O"), None);
        assert_eq!(feed(&mut lb, b"K\r\n"), Some(Reply::Ack));
        assert_eq!(feed(&mut lb, b"TIME 1700000123\n"), Some(Reply::Time(1_700_000_123)));
    }

    #[test]
    fn overlong_line_dropped_then_recovers() {
        let mut lb: LineBuffer<4> = LineBuffer::new();
        assert_eq!(feed(&mut lb, b"OKOKOK\n"), None);
        assert_eq!(feed(&mut lb, b"OK\n"), Some(Reply::Ack));
    }
}
