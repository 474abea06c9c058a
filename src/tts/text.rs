use tracing::debug;

use crate::errors::{Result, TtsError};
use crate::tts::provider::{Capabilities, SynthesisParams, TextFormat};
use crate::utils::get_cached_regex;

const URL_PATTERN: &str = r"(http://|https://|www\.)[\w\.\-/:\#\?=\&;%\~\+@]+";
const EMAIL_PATTERN: &str = r"[\w.+-]+@[\w-]+\.[\w.-]+";
const CODE_FENCE_PATTERN: &str = r"```[\s\S]*?```";
const HTML_TAG_PATTERN: &str = r"<[^>]+>";
const HTML_ENTITY_PATTERN: &str = r"&(#\d+|#x[0-9a-fA-F]+|[a-zA-Z]+);";
const BOILERPLATE_PATTERN: &str = r"(?im)^[ \t]*(next chapter|previous chapter|prev chapter|table of contents|advertisement|click here[^\n]*|share this[^\n]*)[ \t]*$";
const SEPARATOR_PATTERN: &str = r"(=+|-{3,}|_{3,}|\*{3,}|#{2,}|~{2,}|\|{2,})";
const STANDALONE_SYMBOL_PATTERN: &str = r"[ \t]+[=*#~|_-]+[ \t]+";
const SYMBOL_LINE_PATTERN: &str = r"(?m)^[ \t]*[=*#~|_-]+[ \t]*$";
const PUNCTUATION_RUN_PATTERN: &str = r"(\.{4,}|!{3,}|\?{3,})";
const PAUSE_MARKER: &str = r#"<break time="500ms"/>"#;

/// Text ready for synthesis, in the form a particular provider accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedText {
    pub text: String,
    pub format: TextFormat,
}

fn replace(pattern: &str, text: &str, with: &str) -> Result<String> {
    Ok(get_cached_regex(pattern)?.replace_all(text, with).into_owned())
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Strips markup and page furniture, keeping paragraph breaks.
pub fn clean_text(text: &str) -> Result<String> {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = replace(CODE_FENCE_PATTERN, &text, " ")?;
    let text = replace(HTML_TAG_PATTERN, &text, " ")?;
    let text = decode_entities(&text);
    let text = replace(HTML_ENTITY_PATTERN, &text, " ")?;
    let text = replace(URL_PATTERN, &text, " ")?;
    let text = replace(EMAIL_PATTERN, &text, " ")?;
    let text = replace(BOILERPLATE_PATTERN, &text, "")?;
    let text = replace(SEPARATOR_PATTERN, &text, " ")?;
    let text = replace(STANDALONE_SYMBOL_PATTERN, &text, " ")?;
    let text = replace(SYMBOL_LINE_PATTERN, &text, "")?;

    let text = get_cached_regex(PUNCTUATION_RUN_PATTERN)?
        .replace_all(&text, |caps: &regex::Captures| caps[0][..1].repeat(3))
        .into_owned();

    let text = text.replace('[', "(").replace(']', ")");
    let text = replace(r"[ \t]+", &text, " ")?;
    let text = replace(r"(?m)^ +| +$", &text, "")?;
    let text = replace(r"\n\s*\n\s*\n+", &text, "\n\n")?;

    Ok(text.trim().to_string())
}

/// Cleans `text` and refuses what would be silence.
pub fn prepare(text: &str) -> Result<String> {
    let cleaned = clean_text(text)?;
    if cleaned.is_empty() {
        return Err(TtsError::EmptyText);
    }
    debug!(
        chars = cleaned.chars().count(),
        bytes = cleaned.len(),
        "Prepared text"
    );
    Ok(cleaned)
}

fn paragraphs(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split("\n\n")
        .map(|paragraph| paragraph.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|paragraph| !paragraph.is_empty())
}

pub fn escape_markup(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn prosody_attributes(caps: &Capabilities, params: &SynthesisParams) -> Vec<String> {
    let mut attributes = Vec::new();
    if caps.rate && params.rate != 0 {
        attributes.push(format!(r#"rate="{:+}%""#, params.rate));
    }
    if caps.pitch && params.pitch != 0 {
        attributes.push(format!(r#"pitch="{:+}%""#, params.pitch));
    }
    if caps.volume && params.volume != 0 {
        attributes.push(format!(
            r#"volume="{:+.1}dB""#,
            params.volume as f32 * 6.0 / 50.0
        ));
    }
    attributes
}

/// Shapes cleaned text for one provider.
///
/// Markup-capable providers get `<break>` between paragraphs and `<prosody>`
/// for non-neutral parameters. Everyone else gets plain text where a
/// paragraph end is marked by sentence punctuation.
pub fn build_text_for_conversion(
    text: &str,
    caps: &Capabilities,
    params: &SynthesisParams,
) -> PreparedText {
    let paragraphs: Vec<String> = paragraphs(text).collect();

    if caps.markup {
        let attributes = prosody_attributes(caps, params);
        if paragraphs.len() > 1 || !attributes.is_empty() {
            let body = paragraphs
                .iter()
                .map(|paragraph| escape_markup(paragraph))
                .collect::<Vec<_>>()
                .join(PAUSE_MARKER);
            let body = if attributes.is_empty() {
                body
            } else {
                format!("<prosody {}>{}</prosody>", attributes.join(" "), body)
            };
            return PreparedText {
                text: format!("<speak>{}</speak>", body),
                format: TextFormat::Ssml,
            };
        }
    }

    let last = paragraphs.len().saturating_sub(1);
    let text = paragraphs
        .iter()
        .enumerate()
        .map(|(i, paragraph)| {
            let ends_sentence = paragraph.ends_with(['.', '!', '?', ':', ';', '"', ')']);
            if i < last && !ends_sentence {
                format!("{}.", paragraph)
            } else {
                paragraph.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    PreparedText {
        text,
        format: TextFormat::Plain,
    }
}

/// Sentences of one paragraph, each keeping its closing punctuation.
fn sentences(paragraph: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = paragraph.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        if let Some(&(next, following)) = chars.peek() {
            if following.is_whitespace() {
                sentences.push(paragraph[start..next].trim());
                start = next;
            }
        }
    }
    sentences.push(paragraph[start..].trim());
    sentences.retain(|s| !s.is_empty());
    sentences
}

fn split_oversized(unit: &str, max_bytes: usize, out: &mut Vec<String>) {
    let mut current = String::new();
    for word in unit.split_whitespace() {
        if word.len() > max_bytes {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            let mut piece = String::new();
            for c in word.chars() {
                if piece.len() + c.len_utf8() > max_bytes {
                    out.push(std::mem::take(&mut piece));
                }
                piece.push(c);
            }
            current = piece;
            continue;
        }
        let needed = if current.is_empty() { word.len() } else { word.len() + 1 };
        if current.len() + needed > max_bytes {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        out.push(current);
    }
}

/// Splits text into pieces of at most `max_bytes` UTF-8 bytes.
///
/// Sentence boundaries are preferred, then word boundaries, then character
/// boundaries. Paragraph breaks inside a piece are kept.
pub fn chunk_text(text: &str, max_bytes: usize) -> Vec<String> {
    let max_bytes = max_bytes.max(4);
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if text.len() <= max_bytes {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut paragraph_break = false;

    for paragraph in paragraphs(text) {
        for sentence in sentences(&paragraph) {
            let separator = if current.is_empty() {
                ""
            } else if paragraph_break {
                "\n\n"
            } else {
                " "
            };
            paragraph_break = false;

            if current.len() + separator.len() + sentence.len() <= max_bytes {
                current.push_str(separator);
                current.push_str(sentence);
                continue;
            }

            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            if sentence.len() <= max_bytes {
                current.push_str(sentence);
            } else {
                let mut pieces = Vec::new();
                split_oversized(sentence, max_bytes, &mut pieces);
                if let Some(last) = pieces.pop() {
                    chunks.extend(pieces);
                    current = last;
                }
            }
        }
        paragraph_break = true;
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    debug!(chunks = chunks.len(), max_bytes, "Split text into chunks");
    chunks
}

/// Splits `chunk` further until each piece, once shaped for a provider with
/// `caps`, fits its `max_text_bytes`.
///
/// Escaping and markup can grow a chunk well past its raw size, so pieces are
/// cut by the measured growth ratio and checked again.
pub fn fit_chunk(chunk: String, caps: &Capabilities, params: &SynthesisParams) -> Vec<String> {
    let shaped = build_text_for_conversion(&chunk, caps, params).text.len();
    if shaped <= caps.max_text_bytes || chunk.len() <= 4 {
        return vec![chunk];
    }

    let target = chunk.len() * caps.max_text_bytes / shaped;
    debug!(
        raw = chunk.len(),
        shaped,
        limit = caps.max_text_bytes,
        target,
        "Chunk outgrows provider limit after shaping, splitting"
    );
    chunk_text(&chunk, target)
        .into_iter()
        .flat_map(|piece| fit_chunk(piece, caps, params))
        .collect()
}

/// Restores input order for results tagged with their chunk index.
pub fn reassemble_in_order<T>(mut parts: Vec<(usize, T)>) -> Vec<T> {
    parts.sort_by_key(|(index, _)| *index);
    parts.into_iter().map(|(_, part)| part).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKUP: Capabilities = Capabilities {
        rate: true,
        pitch: true,
        volume: true,
        markup: true,
        chunking: true,
        max_text_bytes: 3000,
    };

    const PLAIN: Capabilities = Capabilities {
        markup: false,
        ..MARKUP
    };

    #[test]
    fn test_clean_text_removes_markup_and_furniture() {
        let raw = "<p>Chapter 1</p>\n\nNext Chapter\n\nShe said &quot;hi&quot; at https://example.com/x?y=1 today.\n\n=====\n\nWait....  what???";
        let cleaned = clean_text(raw).unwrap();
        assert_eq!(
            cleaned,
            "Chapter 1\n\nShe said \"hi\" at today.\n\nWait... what???"
        );
    }

    #[test]
    fn test_clean_text_brackets_and_whitespace() {
        assert_eq!(
            clean_text("  [Note]\t\tkeep   this  ").unwrap(),
            "(Note) keep this"
        );
        assert_eq!(clean_text("a\n\n\n\n\nb").unwrap(), "a\n\nb");
        assert_eq!(clean_text("write to me@example.com now").unwrap(), "write to now");
    }

    #[test]
    fn test_prepare_rejects_empty_result() {
        assert!(matches!(prepare("<div></div>\n----\n"), Err(TtsError::EmptyText)));
        assert!(matches!(prepare("   "), Err(TtsError::EmptyText)));
        assert_eq!(prepare("Hello.").unwrap(), "Hello.");
    }

    #[test]
    fn test_markup_for_capable_provider() {
        let prepared = build_text_for_conversion(
            "First <one>\n\nSecond",
            &MARKUP,
            &SynthesisParams::new(20, 0, -50),
        );
        assert_eq!(prepared.format, TextFormat::Ssml);
        assert_eq!(
            prepared.text,
            r#"<speak><prosody rate="+20%" volume="-6.0dB">First &lt;one&gt;<break time="500ms"/>Second</prosody></speak>"#
        );
    }

    #[test]
    fn test_neutral_single_paragraph_stays_plain() {
        let prepared =
            build_text_for_conversion("Just this.", &MARKUP, &SynthesisParams::default());
        assert_eq!(prepared.format, TextFormat::Plain);
        assert_eq!(prepared.text, "Just this.");
    }

    #[test]
    fn test_plain_text_uses_punctuation_as_pause() {
        let prepared = build_text_for_conversion(
            "Title\n\nBody text here.\n\nEnd",
            &PLAIN,
            &SynthesisParams::new(50, 0, 0),
        );
        assert_eq!(prepared.format, TextFormat::Plain);
        assert_eq!(prepared.text, "Title. Body text here. End");
    }

    #[test]
    fn test_chunk_text_short_input() {
        assert_eq!(chunk_text("Hello.", 100), vec!["Hello."]);
        assert!(chunk_text("  ", 100).is_empty());
    }

    #[test]
    fn test_chunk_text_prefers_sentences() {
        let text = "One two three. Four five six. Seven eight nine.";
        let chunks = chunk_text(text, 30);
        assert_eq!(
            chunks,
            vec!["One two three. Four five six.", "Seven eight nine."]
        );
    }

    #[test]
    fn test_chunk_text_respects_byte_limit_and_order() {
        let text = (0..200)
            .map(|i| format!("Sentence number {} is here. ", i))
            .collect::<String>();
        for max in [40, 97, 500] {
            let chunks = chunk_text(&text, max);
            assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= max));
            let rejoined = chunks.join(" ");
            assert_eq!(
                rejoined.split_whitespace().collect::<Vec<_>>(),
                text.split_whitespace().collect::<Vec<_>>()
            );
        }
    }

    #[test]
    fn test_chunk_text_splits_long_words_on_char_boundaries() {
        let word = "é".repeat(25);
        let chunks = chunk_text(&word, 9);
        assert!(chunks.iter().all(|c| c.len() <= 9));
        assert_eq!(chunks.concat(), word);
    }

    #[test]
    fn test_chunk_text_keeps_paragraph_breaks() {
        let text = "Alpha beta.\n\nGamma delta.\n\nEpsilon zeta eta theta iota.";
        let chunks = chunk_text(text, 30);
        assert_eq!(chunks[0], "Alpha beta.\n\nGamma delta.");
        assert_eq!(chunks[1], "Epsilon zeta eta theta iota.");
    }

    #[test]
    fn test_fit_chunk_accounts_for_escaping() {
        let caps = Capabilities {
            max_text_bytes: 400,
            ..MARKUP
        };
        let params = SynthesisParams::new(10, 0, 0);
        let text = (0..20)
            .map(|i| format!("'Hi {}' she said \"twice\".", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_text(&text, 400);
        assert!(chunks
            .iter()
            .any(|c| build_text_for_conversion(c, &caps, &params).text.len() > 400));

        let fitted: Vec<String> = chunks
            .into_iter()
            .flat_map(|chunk| fit_chunk(chunk, &caps, &params))
            .collect();
        assert!(fitted
            .iter()
            .all(|c| build_text_for_conversion(c, &caps, &params).text.len() <= 400));
        assert_eq!(
            fitted.join(" ").split_whitespace().collect::<Vec<_>>(),
            text.split_whitespace().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_fit_chunk_keeps_chunks_that_fit() {
        let chunk = "Plain words only.".to_string();
        assert_eq!(
            fit_chunk(chunk.clone(), &PLAIN, &SynthesisParams::default()),
            vec![chunk]
        );
    }

    #[test]
    fn test_reassemble_in_order() {
        let parts = vec![(2, "c"), (0, "a"), (3, "d"), (1, "b")];
        assert_eq!(reassemble_in_order(parts), vec!["a", "b", "c", "d"]);
    }
}
