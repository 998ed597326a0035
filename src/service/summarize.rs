use futures::stream::{self, StreamExt, TryStreamExt};

use super::prompts;
use crate::config::SummaryConfig;
use crate::error::{RagError, Result};
use crate::llm::LanguageModel;

pub const MIN_LINES: usize = 1;
pub const MAX_LINES: usize = 10;

/// Summarize the whole `text` into exactly `lines` lines.
///
/// Text up to `direct_threshold` characters goes to the model in one prompt.
/// Longer text is cut into `chunk_chars` pieces, each piece is summarized on
/// its own (concurrently, order preserved) and the partial summaries are
/// reduced into the final answer.
pub async fn summarize_text(
    llm: &dyn LanguageModel,
    config: &SummaryConfig,
    language: &str,
    text: &str,
    lines: usize,
) -> Result<String> {
    if !(MIN_LINES..=MAX_LINES).contains(&lines) {
        return Err(RagError::Validation(format!(
            "lines must be between {MIN_LINES} and {MAX_LINES}, got {lines}"
        )));
    }

    let chars = text.chars().count();
    let raw = if chars <= config.direct_threshold {
        tracing::info!(chars, lines, "Summarizing directly");
        llm.complete(&prompts::summary(text, lines, language)).await?
    } else {
        let chunks = split_chunks(text, config.chunk_chars);
        let total = chunks.len();
        tracing::info!(chars, chunks = total, lines, "Summarizing hierarchically");

        // Owned prompts keep the per-chunk futures free of borrows into `chunks`.
        let chunk_prompts: Vec<(usize, String)> = chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| (i + 1, prompts::chunk_summary(&chunk, i + 1, total, language)))
            .collect();

        let partials: Vec<String> = stream::iter(chunk_prompts)
            .map(|(part, prompt)| async move {
                let partial = llm.complete(&prompt).await?;
                tracing::debug!(
                    "Chunk {}/{} summarized ({} chars)",
                    part,
                    total,
                    partial.chars().count()
                );
                Ok::<_, RagError>(partial)
            })
            .buffered(config.chunk_concurrency.max(1))
            .try_collect::<Vec<_>>()
            .await?;

        llm.complete(&prompts::reduce(&partials, lines, language)).await?
    };

    shape_lines(&raw, lines)
}

/// Contiguous pieces of at most `chunk_chars` characters.
pub fn split_chunks(text: &str, chunk_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_chars.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

/// Force a model reply into exactly `n` non-empty, unnumbered lines.
///
/// A leading preamble line ending in a colon is dropped. Models miscount:
/// extra lines are folded into the last one, and when there
/// are too few the reply is re-split at sentence ends, then the longest line
/// is halved at a word boundary until the count is reached.
pub fn shape_lines(raw: &str, n: usize) -> Result<String> {
    let mut lines: Vec<String> = raw
        .lines()
        .map(strip_marker)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    // "Summary:" or "요약:" style preamble
    if lines.len() > 1 && lines[0].ends_with([':', '：']) {
        lines.remove(0);
    }

    if lines.is_empty() {
        return Err(RagError::Validation("model returned an empty summary".into()));
    }

    let mut units = if lines.len() >= n {
        lines
    } else {
        let sentences = split_sentences(&lines.join(" "));
        if sentences.len() > lines.len() {
            sentences
        } else {
            lines
        }
    };

    while units.len() > n {
        if let Some(last) = units.pop() {
            if let Some(prev) = units.last_mut() {
                prev.push(' ');
                prev.push_str(&last);
            }
        }
    }

    while units.len() < n {
        let split = units
            .iter()
            .enumerate()
            .filter_map(|(i, u)| split_near_middle(u).map(|parts| (i, u.chars().count(), parts)))
            .max_by_key(|(_, len, _)| *len);
        let Some((longest, _, (head, tail))) = split else {
            return Err(RagError::Validation(format!(
                "summary cannot be shaped into {n} lines: {} available",
                units.len()
            )));
        };
        units[longest] = head;
        units.insert(longest + 1, tail);
    }

    Ok(units.join("\n"))
}

/// Drop list markers such as `1.`, `2)`, `-`, `*`, `•`.
fn strip_marker(line: &str) -> &str {
    let line = line.trim();
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    let rest = if digits > 0 {
        match line[digits..].strip_prefix(['.', ')']) {
            Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest,
            _ => line,
        }
    } else if let Some(rest) = line.strip_prefix(['-', '*', '•', '·']) {
        rest
    } else {
        line
    };
    rest.trim()
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let at_end = matches!(c, '.' | '!' | '?' | '。');
        if at_end && chars.peek().map_or(true, |n| n.is_whitespace()) {
            let sentence = current.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            current.clear();
        }
    }
    let rest = current.trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

fn split_near_middle(line: &str) -> Option<(String, String)> {
    let middle = line.len() / 2;
    let split_at = line
        .char_indices()
        .filter(|(_, c)| c.is_whitespace())
        .map(|(i, _)| i)
        .min_by_key(|&i| i.abs_diff(middle))?;

    let head = line[..split_at].trim();
    let tail = line[split_at..].trim();
    if head.is_empty() || tail.is_empty() {
        return None;
    }
    Some((head.to_string(), tail.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeLlm;
    use std::time::Duration;

    fn config() -> SummaryConfig {
        SummaryConfig::default()
    }

    /// Replies with numbered sentences, as models tend to.
    fn numbered_reply(count: usize) -> String {
        (1..=count)
            .map(|i| format!("{i}. Sentence number {i} about the lecture."))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn assert_exact_lines(summary: &str, n: usize) {
        let lines: Vec<&str> = summary.split('\n').collect();
        assert_eq!(lines.len(), n, "summary: {summary:?}");
        assert!(lines.iter().all(|l| !l.trim().is_empty()));
    }

    #[tokio::test]
    async fn small_text_uses_one_direct_call() {
        let llm = FakeLlm::replying(&numbered_reply(3));
        // about 2 KB of lecture text
        let text = "Binary search halves the interval. ".repeat(58);
        assert!(text.len() <= 2048);

        let summary = summarize_text(&llm, &config(), "English", &text, 3).await.unwrap();

        assert_exact_lines(&summary, 3);
        assert!(!summary.contains("1."));
        assert_eq!(llm.calls(), 1);
        assert!(llm.prompts()[0].contains(&text));
    }

    #[tokio::test]
    async fn threshold_boundary_is_direct() {
        let llm = FakeLlm::replying(&numbered_reply(1));
        let text = "a".repeat(60_000);
        summarize_text(&llm, &config(), "English", &text, 1).await.unwrap();
        assert_eq!(llm.calls(), 1);

        let llm = FakeLlm::replying(&numbered_reply(1));
        let text = "a".repeat(60_001);
        summarize_text(&llm, &config(), "English", &text, 1).await.unwrap();
        assert_eq!(llm.calls(), 5);
    }

    #[tokio::test]
    async fn large_text_maps_four_chunks_then_reduces() {
        let llm = FakeLlm::new(|prompt| {
            if prompt.starts_with("This is part") {
                Ok("Partial point one. Partial point two. Partial point three.".to_string())
            } else {
                Ok(numbered_reply(2))
            }
        });
        let text = "x".repeat(70_000);

        let summary = summarize_text(&llm, &config(), "English", &text, 2).await.unwrap();

        assert_exact_lines(&summary, 2);
        let prompts = llm.prompts();
        let chunk_prompts = prompts.iter().filter(|p| p.starts_with("This is part")).count();
        assert_eq!(chunk_prompts, 4);
        assert_eq!(prompts.len(), 5);
        assert!(prompts[4].contains("Part 4:"));
    }

    #[tokio::test]
    async fn reduce_sees_chunks_in_order_even_when_they_finish_out_of_order() {
        let llm = FakeLlm::new(|prompt| {
            if let Some(rest) = prompt.strip_prefix("This is part ") {
                let part: String = rest.chars().take_while(char::is_ascii_digit).collect();
                Ok(format!("summary-of-{part}"))
            } else {
                Ok("Only line.".to_string())
            }
        })
        .with_delay(|prompt| {
            // first chunk finishes last
            if prompt.starts_with("This is part 1 ") {
                Duration::from_millis(30)
            } else {
                Duration::ZERO
            }
        });
        let text = "y".repeat(70_000);

        summarize_text(&llm, &config(), "English", &text, 1).await.unwrap();

        let reduce = llm.prompts().into_iter().last().unwrap();
        let positions: Vec<usize> = (1..=4)
            .map(|i| reduce.find(&format!("summary-of-{i}")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn every_line_count_is_exact_on_both_paths() {
        let small = "Short lecture text. ".repeat(10);
        let large = "z".repeat(61_000);
        for n in MIN_LINES..=MAX_LINES {
            // a model that always answers with four numbered lines
            let llm = FakeLlm::replying(
                "1. First key idea of the lecture.\n2. Second idea builds on it.\n\
                 3. Third idea is an example.\n4. Fourth idea wraps up the topic.",
            );
            for text in [&small, &large] {
                let summary = summarize_text(&llm, &config(), "English", text, n).await.unwrap();
                assert_exact_lines(&summary, n);
            }
        }
    }

    #[tokio::test]
    async fn failed_chunk_propagates() {
        let llm = FakeLlm::failing();
        let text = "w".repeat(70_000);
        let err = summarize_text(&llm, &config(), "English", &text, 2).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn out_of_range_lines_are_rejected() {
        let llm = FakeLlm::echo();
        for n in [0, 11] {
            let err = summarize_text(&llm, &config(), "English", "text", n).await.unwrap_err();
            assert!(matches!(err, RagError::Validation(_)));
        }
        assert_eq!(llm.calls(), 0);
    }

    #[test]
    fn chunks_are_contiguous_and_char_based() {
        let text = "가나다라마바사".repeat(3);
        let chunks = split_chunks(&text, 5);
        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks.concat(), text);
        assert!(chunks.iter().all(|c| c.chars().count() <= 5));
    }

    #[test]
    fn markers_are_stripped() {
        assert_eq!(strip_marker("1. First"), "First");
        assert_eq!(strip_marker("10) Tenth"), "Tenth");
        assert_eq!(strip_marker("- dash"), "dash");
        assert_eq!(strip_marker("• bullet"), "bullet");
        assert_eq!(strip_marker("3.14 is pi"), "3.14 is pi");
    }

    #[test]
    fn extra_lines_are_merged_into_the_last() {
        let shaped = shape_lines("one\ntwo\nthree\nfour", 2).unwrap();
        assert_eq!(shaped, "one\ntwo three four");
    }

    #[test]
    fn single_paragraph_is_split_at_sentences() {
        let shaped = shape_lines("강의는 정렬을 다룬다. 병합 정렬이 예시다. 시간 복잡도를 비교한다.", 3).unwrap();
        assert_eq!(shaped, "강의는 정렬을 다룬다.\n병합 정렬이 예시다.\n시간 복잡도를 비교한다.");
    }

    #[test]
    fn preamble_line_is_not_counted() {
        let shaped = shape_lines("Summary:\n1. Sorting.\n2. Searching.\n3. Hashing.", 3).unwrap();
        assert_eq!(shaped, "Sorting.\nSearching.\nHashing.");

        let shaped = shape_lines("요약:\n정렬을 다룬다.\n탐색을 다룬다.", 2).unwrap();
        assert_eq!(shaped, "정렬을 다룬다.\n탐색을 다룬다.");
    }

    #[test]
    fn unshapeable_reply_is_a_validation_error() {
        assert!(matches!(shape_lines("word", 2), Err(RagError::Validation(_))));
        assert!(matches!(shape_lines("  \n\n", 1), Err(RagError::Validation(_))));
    }
}
