//! Prompt templates. Every prompt states the answer language explicitly
//! because retrieved context is frequently in a different language.

pub fn ask(question: &str, language: &str) -> String {
    format!(
        "Answer the following question kindly and in {language}.\n\
         Base your answer strictly on the lecture material. If the material does not cover \
         the topic, say so explicitly instead of guessing.\n\n\
         Question: {question}\n\n\
         Answer:"
    )
}

pub fn quiz(count: usize, language: &str) -> String {
    format!(
        "Create {count} multiple-choice quiz questions from this lecture material.\n\n\
         Respond with a JSON array only, no other text:\n\
         [\n  {{\n    \"question\": \"question text\",\n    \"options\": [\"option 1\", \"option 2\", \"option 3\", \"option 4\"],\n    \
         \"correct_answer\": 0,\n    \"explanation\": \"why the answer is correct\"\n  }}\n]\n\n\
         Rules:\n\
         - Exactly {count} objects\n\
         - Focus on the core concepts covered in the lecture\n\
         - Every question has exactly 4 options\n\
         - correct_answer is the 0-based index of the right option (0, 1, 2 or 3)\n\
         - explanation says why that option is correct\n\
         - Medium difficulty\n\
         - Write the questions, options and explanations in {language}"
    )
}

/// The standing rules of every summary that goes back to the caller.
fn line_rules(lines: usize, language: &str) -> String {
    format!(
        "Rules:\n\
         - Exactly {lines} sentences, one per line\n\
         - No numbering, bullets or headings\n\
         - Focus on the key concepts and the most important content\n\
         - Together the lines must read as one coherent narrative\n\
         - Write in {language}"
    )
}

pub fn summary(text: &str, lines: usize, language: &str) -> String {
    format!(
        "Summarize this lecture material in exactly {lines} lines.\n\n{}\n\n\
         Lecture material:\n{text}\n\nSummary:",
        line_rules(lines, language)
    )
}

pub fn chunk_summary(chunk: &str, part: usize, total: usize, language: &str) -> String {
    format!(
        "This is part {part} of {total} of a lecture. Summarize this part in 3 to 5 sentences, \
         keeping the concepts it introduces and their order. Write in {language}.\n\n\
         Part {part}:\n{chunk}\n\nPartial summary:"
    )
}

pub fn reduce(partials: &[String], lines: usize, language: &str) -> String {
    let joined = partials
        .iter()
        .enumerate()
        .map(|(i, p)| format!("Part {}:\n{}", i + 1, p.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Below are partial summaries of consecutive parts of one lecture, in order. \
         Combine them into a single summary of exactly {lines} lines. Remove points repeated \
         across parts.\n\n{}\n\n{joined}\n\nSummary:",
        line_rules(lines, language)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_keeps_part_order() {
        let prompt = reduce(&["first".into(), "second".into()], 2, "English");
        assert!(prompt.find("Part 1:\nfirst").unwrap() < prompt.find("Part 2:\nsecond").unwrap());
        assert!(prompt.contains("exactly 2 lines"));
    }

    #[test]
    fn quiz_prompt_is_valid_format_string() {
        let prompt = quiz(3, "Korean");
        assert!(prompt.contains("\"correct_answer\": 0"));
        assert!(prompt.contains("Exactly 3 objects"));
        assert!(prompt.ends_with("in Korean"));
    }
}
