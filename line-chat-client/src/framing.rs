//! Reassembly of newline-delimited frames from arbitrary socket reads.
//!
//! The buffer works on bytes, so a read that ends inside a multi-byte UTF-8
//! character is held back until the rest of the character arrives, in both
//! modes.

/// Turns a sequence of chunks into complete wire strings.
///
/// Everything after the last `\n` stays buffered. When eager mode is on, a
/// buffered remainder that starts with `<digits>:` is treated as a complete
/// frame and released immediately, for servers that omit the final newline.
/// That check can misfire on a partial read that happens to have the same
/// prefix, which is why it can be switched off. A remainder that is not valid
/// UTF-8 (a character cut in half) is never released early.
#[derive(Debug)]
pub struct FrameReassembler {
    buffer: Vec<u8>,
    eager_unterminated: bool,
}

impl Default for FrameReassembler {
    fn default() -> Self {
        Self::new(true)
    }
}

impl FrameReassembler {
    pub fn new(eager_unterminated: bool) -> Self {
        Self {
            buffer: Vec::new(),
            eager_unterminated,
        }
    }

    /// Appends `chunk` and returns the frames it completed, in arrival order.
    /// Frames are trimmed; blank lines are skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        if let Some(last_newline) = self.buffer.iter().rposition(|&byte| byte == b'\n') {
            let remainder = self.buffer.split_off(last_newline + 1);
            let complete = std::mem::replace(&mut self.buffer, remainder);
            for line in complete.split(|&byte| byte == b'\n') {
                push_trimmed(&mut frames, line);
            }
        }

        if self.eager_unterminated
            && starts_like_frame(&self.buffer)
            && std::str::from_utf8(&self.buffer).is_ok()
        {
            let pending = std::mem::take(&mut self.buffer);
            push_trimmed(&mut frames, &pending);
        }

        frames
    }

    pub fn push_str(&mut self, chunk: &str) -> Vec<String> {
        self.push(chunk.as_bytes())
    }

    /// Bytes held back waiting for a terminator.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

fn push_trimmed(frames: &mut Vec<String>, line: &[u8]) {
    let text = String::from_utf8_lossy(line);
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        frames.push(trimmed.to_string());
    }
}

fn starts_like_frame(buffer: &[u8]) -> bool {
    let digits = buffer.iter().take_while(|byte| byte.is_ascii_digit()).count();
    digits > 0 && buffer.get(digits) == Some(&b':')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    const STREAM: &str = "12:content=hi;toUserId=42\n13:a=b\n";
    const FRAMES: [&str; 2] = ["12:content=hi;toUserId=42", "13:a=b"];

    fn split_push(
        reassembler: &mut FrameReassembler,
        stream: &[u8],
        split: usize,
    ) -> Vec<String> {
        let mut frames = reassembler.push(&stream[..split]);
        frames.extend(reassembler.push(&stream[split..]));
        frames
    }

    #[test]
    fn strict_mode_is_split_independent() {
        for split in 0..=STREAM.len() {
            let mut reassembler = FrameReassembler::new(false);
            let frames = split_push(&mut reassembler, STREAM.as_bytes(), split);
            assert_eq!(frames, FRAMES, "split at {split}");
            assert!(reassembler.pending().is_empty());
        }
    }

    // A first read that stops after `12:` (splits 3..=24) or `13:` (29..=31)
    // looks like a whole frame and is released early. Every other split
    // reproduces the stream exactly.
    #[test]
    fn eager_mode_splits_only_after_a_type_prefix() {
        let misfires = |split: usize| (3..25).contains(&split) || (29..32).contains(&split);

        for split in 0..=STREAM.len() {
            let mut reassembler = FrameReassembler::default();
            let frames = split_push(&mut reassembler, STREAM.as_bytes(), split);

            if misfires(split) {
                assert_ne!(frames, FRAMES, "split at {split}");
                // The bytes all come through, cut into one extra piece.
                assert_eq!(frames.len(), 3, "split at {split}");
                assert_eq!(frames.concat(), STREAM.replace('\n', ""), "split at {split}");
            } else {
                assert_eq!(frames, FRAMES, "split at {split}");
                let decoded: Vec<Message> = frames
                    .iter()
                    .map(|frame| Message::decode(frame).expect("decode"))
                    .collect();
                assert_eq!(decoded[0].field("content"), Some("hi"));
                assert_eq!(decoded[0].field("toUserId"), Some("42"));
                assert_eq!(decoded[1].field("a"), Some("b"));
            }
            assert!(reassembler.pending().is_empty());
        }
    }

    #[test]
    fn large_burst_is_released_whole() {
        let users = (0..200)
            .map(|id| format!("{{\"id\":{id},\"username\":\"user{id}\"}}"))
            .collect::<Vec<_>>()
            .join(",");
        let frame = format!("21:users=[{users}]");
        assert!(frame.len() > 4096);

        let mut reassembler = FrameReassembler::default();
        assert_eq!(reassembler.push_str(&format!("{frame}\n")), vec![frame]);
    }

    #[test]
    fn unterminated_frame_is_released_eagerly() {
        let mut reassembler = FrameReassembler::default();
        let frames = reassembler.push_str("12:content=hi;toUserId=42");
        assert_eq!(frames, vec!["12:content=hi;toUserId=42"]);
        assert!(reassembler.pending().is_empty());
    }

    #[test]
    fn unterminated_frame_waits_in_strict_mode() {
        let mut reassembler = FrameReassembler::new(false);
        assert!(reassembler.push_str("12:content=hi").is_empty());
        assert_eq!(reassembler.pending(), b"12:content=hi");
        assert_eq!(reassembler.push_str("\n"), vec!["12:content=hi"]);
    }

    #[test]
    fn remainder_without_type_prefix_is_retained() {
        let mut reassembler = FrameReassembler::default();
        assert!(reassembler.push_str("1").is_empty());
        assert!(reassembler.push_str("x=1:").is_empty());
        assert_eq!(reassembler.pending(), b"1x=1:");
    }

    #[test]
    fn blank_lines_and_carriage_returns_are_dropped() {
        let mut reassembler = FrameReassembler::new(false);
        let frames = reassembler.push_str("\n\r\n7:\r\n  \n");
        assert_eq!(frames, vec!["7:"]);
    }

    #[test]
    fn multibyte_characters_survive_chunk_boundaries() {
        let stream = "12:content=你好\n".as_bytes();
        for eager in [false, true] {
            // 11 bytes of prefix, then a cut inside the first character.
            for split in [12, 13] {
                let mut reassembler = FrameReassembler::new(eager);
                assert!(reassembler.push(&stream[..split]).is_empty());
                assert_eq!(
                    reassembler.push(&stream[split..]),
                    vec!["12:content=你好"],
                    "eager {eager}, split at {split}"
                );
            }
        }
    }

    #[test]
    fn eager_release_waits_for_a_whole_character() {
        let text = "12:content=你好";
        let mut reassembler = FrameReassembler::default();
        assert!(reassembler.push(&text.as_bytes()[..13]).is_empty());
        assert_eq!(reassembler.push(&text.as_bytes()[13..]), vec![text]);
    }

    #[test]
    fn clear_discards_partial_data() {
        let mut reassembler = FrameReassembler::new(false);
        reassembler.push_str("12:content=");
        reassembler.clear();
        assert!(reassembler.pending().is_empty());
        assert_eq!(reassembler.push_str("13:a=b\n"), vec!["13:a=b"]);
    }
}
