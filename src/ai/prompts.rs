use std::fmt::Write;

use crate::models::{Facts, SummaryFeedback, Tone};

/// Characters of article body sent to the facts stage.
pub const MAX_ARTICLE_CHARS: usize = 12_000;

/// Summaries included in one digest prompt.
pub const MAX_DIGEST_ITEMS: usize = 50;

pub const FACTS_SYSTEM: &str = r#"You extract structured facts from articles.
Reply with a single JSON object and nothing else, using exactly these keys:
{"key_points": [string], "main_claim": string, "caveats": [string], "keywords": [string]}
Keep key_points to at most 5 short sentences and keywords to at most 8 lowercase terms.
Write in the language of the article."#;

pub const SUMMARY_SYSTEM: &str = r#"You write short summaries of articles from extracted facts.
Reply with a single JSON object and nothing else, using exactly these keys:
{"summary": string, "rating": integer 1-5, "rating_reason": string}
The summary is 2-4 sentences. The rating scores how worth reading the article is.
Never invent facts that are not in the input."#;

pub const DIGEST_SYSTEM: &str = r#"You write a weekly reading digest from a list of article summaries.
Use exactly these four sections, in this order, each starting with a level-2 heading:
## Trend
One paragraph on the overall direction of the week's reading.
## Topics
A bullet list using "- " with one line per notable topic, naming the theme in **bold**.
## Takeaways
A numbered list "1. ", "2. ", ... of at most 5 concrete takeaways.
## Recommendation
One or two sentences recommending what to read or explore next.
Do not add any other headings, preamble or closing remarks."#;

/// Cut `text` at `max_chars` characters, never inside a UTF-8 sequence.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn facts_prompt(title: &str, text: &str) -> String {
    format!(
        "Extract the facts from the following article.\n\nTitle: {}\n\nContent:\n{}",
        title,
        truncate_chars(text, MAX_ARTICLE_CHARS)
    )
}

/// Stage B prompt. Feedback is the owner's own notes on earlier summaries in
/// the same tone, newest first.
pub fn summary_prompt(title: &str, facts: &Facts, tone: Tone, feedback: &[SummaryFeedback]) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Title: {}", title);
    let _ = writeln!(prompt, "Main claim: {}", facts.main_claim);
    write_list(&mut prompt, "Key points", &facts.key_points);
    write_list(&mut prompt, "Caveats", &facts.caveats);
    if !facts.keywords.is_empty() {
        let _ = writeln!(prompt, "Keywords: {}", facts.keywords.join(", "));
    }

    let _ = writeln!(
        prompt,
        "\nWrite the summary in a tone that is {}. The tone changes phrasing only, never the facts.",
        tone.register()
    );

    let notes: Vec<String> = feedback.iter().take(3).filter_map(feedback_line).collect();
    if !notes.is_empty() {
        let _ = writeln!(prompt, "\nThe reader left this feedback on earlier summaries:");
        for note in notes {
            let _ = writeln!(prompt, "- {}", note);
        }
    }
    prompt
}

fn feedback_line(feedback: &SummaryFeedback) -> Option<String> {
    let text = feedback.feedback.trim();
    if text.is_empty() {
        return None;
    }
    Some(match feedback.rating {
        Some(rating) => format!("rated {}/5: {}", rating, text),
        None => text.to_string(),
    })
}

fn write_list(prompt: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(prompt, "{}:", heading);
    for item in items {
        let _ = writeln!(prompt, "- {}", item);
    }
}

/// One summary line of the digest input.
#[derive(Debug, Clone, PartialEq)]
pub struct DigestItem {
    pub title: String,
    pub theme: Option<String>,
    pub summary: String,
}

pub fn digest_prompt(period_label: &str, top_themes: &[String], items: &[DigestItem]) -> String {
    let mut prompt = format!("Reading digest for {}.\n", period_label);
    if !top_themes.is_empty() {
        let _ = writeln!(prompt, "Top themes: {}", top_themes.join(", "));
    }
    let _ = writeln!(prompt, "\nSummaries:");
    for (i, item) in items.iter().take(MAX_DIGEST_ITEMS).enumerate() {
        let _ = writeln!(
            prompt,
            "{}. [{}] {}: {}",
            i + 1,
            item.theme.as_deref().unwrap_or("Unsorted"),
            item.title,
            item.summary
        );
    }
    prompt
}
