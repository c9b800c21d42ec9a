//! Splitting long replies to fit the platform limit, and ordered delivery.

use crate::error::Result;
use crate::messaging::traits::Responder;
use crate::prompts;

/// Split `text` into chunks of at most `max_len` characters.
///
/// Lines are packed greedily, joined by `\n`. A single line longer than
/// `max_len` is hard-split on character boundaries. Joining the chunks with
/// `\n` gives back the input whenever no line had to be hard-split.
pub fn chunk(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let mut chunks = Vec::new();
    let mut current: Option<(String, usize)> = None;

    for line in text.split('\n') {
        let line_len = line.chars().count();

        if line_len > max_len {
            if let Some((done, _)) = current.take() {
                chunks.push(done);
            }
            let mut pieces = hard_split(line, max_len);
            let last = pieces.pop();
            chunks.extend(pieces);
            current = last.map(|piece| {
                let len = piece.chars().count();
                (piece, len)
            });
            continue;
        }

        current = match current.take() {
            Some((mut open, len)) if len + 1 + line_len <= max_len => {
                open.push('\n');
                open.push_str(line);
                Some((open, len + 1 + line_len))
            }
            Some((done, _)) => {
                chunks.push(done);
                Some((line.to_string(), line_len))
            }
            None => Some((line.to_string(), line_len)),
        };
    }

    if let Some((rest, _)) = current {
        chunks.push(rest);
    }

    chunks
}

fn hard_split(line: &str, max_len: usize) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    chars
        .chunks(max_len)
        .map(|piece| piece.iter().collect())
        .collect()
}

/// Deliver `text` through `responder`: the first chunk as a reply to the
/// trigger, the rest as follow-ups, each awaited before the next is sent.
pub async fn dispatch(responder: &dyn Responder, text: &str, max_len: usize) -> Result<usize> {
    let text = if text.trim().is_empty() {
        prompts::EMPTY_COMPLETION_REPLY
    } else {
        text
    };

    let chunks: Vec<String> = chunk(text, max_len)
        .into_iter()
        .filter(|part| !part.trim().is_empty())
        .collect();

    for (index, part) in chunks.iter().enumerate() {
        if index == 0 {
            responder.reply(part).await?;
        } else {
            responder.follow_up(part).await?;
        }
    }

    tracing::debug!(chunks = chunks.len(), "response delivered");
    Ok(chunks.len())
}
