//! Stream Parser: turns an incoming character stream of assistant content
//! into a sequence of tagged [`DeltaOperation`]s.
//!
//! Recognises the literal delimiters `<think>`, `</think>`, `<tool_call>`,
//! `</tool_call>`. Buffers any partial tag that straddles a chunk boundary
//! and re-attempts on the next `parse` call. A stack of open tags means a
//! `<think>` nested inside a `<tool_call>` is interpreted correctly: the
//! current tag is always the top of the stack, or `content` if the stack is
//! empty. Stateful and single-threaded per conversation turn — one
//! `StreamParser` per turn, fed token by token as the LLM streams.
//!
//! The upstream LLM may emit function calls either via a structured
//! `tool_calls` field or embedded in content as XML-like markup
//! (custom-tool-call mode); this one parser handles the inline-markup half
//! of that split so the agent loop doesn't need two code paths.

const OPEN_TAGS: [(&str, DeltaTag); 2] = [("<think>", DeltaTag::Think), ("<tool_call>", DeltaTag::ToolCall)];
const CLOSE_TAGS: [&str; 2] = ["</think>", "</tool_call>"];

/// Which channel a fragment of streamed text belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaTag {
    Content,
    Think,
    ToolCall,
}

/// One fragment of streamed text, tagged with the channel it belongs to.
/// Empty deltas are never emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaOperation {
    pub tag: DeltaTag,
    pub delta: String,
}

/// Tag-stack state machine parsing inline `<think>`/`<tool_call>` markup out
/// of a token stream.
pub struct StreamParser {
    current: DeltaTag,
    buffer: String,
    tag_stack: Vec<DeltaTag>,
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamParser {
    pub fn new() -> Self {
        Self {
            current: DeltaTag::Content,
            buffer: String::new(),
            tag_stack: Vec::new(),
        }
    }

    /// Feeds one more chunk of streamed text, returning every delta
    /// operation that could be resolved from it. Any trailing partial tag is
    /// buffered internally and reconsidered on the next call.
    pub fn parse(&mut self, token: &str) -> Vec<DeltaOperation> {
        let mut work = std::mem::take(&mut self.buffer);
        work.push_str(token);

        let mut ops = Vec::new();
        let mut cursor = 0usize;

        loop {
            match work[cursor..].find('<') {
                None => {
                    if cursor < work.len() {
                        push_op(&mut ops, self.current, &work[cursor..]);
                    }
                    cursor = work.len();
                    break;
                }
                Some(rel) => {
                    let lt = cursor + rel;
                    if lt > cursor {
                        push_op(&mut ops, self.current, &work[cursor..lt]);
                    }

                    if let Some((matched_len, new_tag)) = match_open(&work[lt..]) {
                        self.tag_stack.push(new_tag);
                        self.current = new_tag;
                        cursor = lt + matched_len;
                        continue;
                    }
                    if let Some(matched_len) = match_close(&work[lt..]) {
                        self.tag_stack.pop();
                        self.current = self.tag_stack.last().copied().unwrap_or(DeltaTag::Content);
                        cursor = lt + matched_len;
                        continue;
                    }

                    // `<` doesn't open/close a recognised tag, and may be the
                    // start of one straddling the chunk boundary: buffer from
                    // here and wait for more input.
                    self.buffer = work[lt..].to_string();
                    return ops;
                }
            }
        }

        let _ = cursor;
        ops
    }
}

fn push_op(ops: &mut Vec<DeltaOperation>, tag: DeltaTag, text: &str) {
    if !text.is_empty() {
        ops.push(DeltaOperation {
            tag,
            delta: text.to_string(),
        });
    }
}

/// Tries to match one of the open-tag literals at the start of `text`.
/// Returns `None` both when nothing matches and when `text` is a strict
/// prefix of one of the literals (an as-yet-incomplete tag) — in the latter
/// case the caller buffers and waits, same as a true non-match, since
/// neither can be resolved yet without more input.
fn match_open(text: &str) -> Option<(usize, DeltaTag)> {
    for (literal, tag) in OPEN_TAGS.iter() {
        if text.starts_with(literal) {
            return Some((literal.len(), *tag));
        }
    }
    None
}

fn match_close(text: &str) -> Option<usize> {
    for literal in CLOSE_TAGS.iter() {
        if text.starts_with(literal) {
            return Some(literal.len());
        }
    }
    None
}
