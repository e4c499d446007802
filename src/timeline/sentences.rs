//! Сборка предложений из слов распознавателя.
//!
//! Распознаватель отдает слова с метками времени; предложение заканчивается
//! на слове с завершающим знаком (`.`, `?`, `!`, `।`). Хвост без знака
//! становится последним предложением.

use log::debug;

use crate::types::{RecognizedSentence, RecognizedWord};

const SENTENCE_TERMINATORS: &[char] = &['.', '?', '!', '।'];

/// Группирует слова в предложения
pub fn group_words_into_sentences(words: &[RecognizedWord]) -> Vec<RecognizedSentence> {
    let mut sentences = Vec::new();
    let mut text = String::new();
    let mut start: Option<f64> = None;
    let mut last_end = 0.0;

    for word in words {
        if word.word.trim().is_empty() {
            continue;
        }
        if start.is_none() {
            start = Some(word.start);
        }
        push_word(&mut text, &word.word);
        last_end = word.end;

        if word.word.trim_end().ends_with(SENTENCE_TERMINATORS) {
            if let Some(sentence_start) = start.take() {
                sentences.push(RecognizedSentence {
                    start: sentence_start,
                    end: word.end,
                    text: text.trim().to_string(),
                });
            }
            text.clear();
        }
    }

    if let Some(sentence_start) = start {
        sentences.push(RecognizedSentence {
            start: sentence_start,
            end: last_end,
            text: text.trim().to_string(),
        });
    }

    debug!("Grouped {} words into {} sentences", words.len(), sentences.len());
    sentences
}

/// Слова распознавателя обычно несут ведущий пробел; если нет, добавляем его сами
fn push_word(text: &mut String, word: &str) {
    if !text.is_empty() && !word.starts_with(char::is_whitespace) {
        text.push(' ');
    }
    text.push_str(word);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(start: f64, end: f64, text: &str) -> RecognizedWord {
        RecognizedWord { start, end, word: text.to_string() }
    }

    #[test]
    fn test_split_on_punctuation() {
        let words = vec![
            word(0.5, 0.8, " Hello"),
            word(0.8, 1.2, " there."),
            word(1.6, 1.9, " How"),
            word(1.9, 2.1, " are"),
            word(2.1, 2.5, " you?"),
        ];
        let sentences = group_words_into_sentences(&words);
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0].text, "Hello there.");
        assert_eq!((sentences[0].start, sentences[0].end), (0.5, 1.2));
        assert_eq!(sentences[1].text, "How are you?");
        assert_eq!((sentences[1].start, sentences[1].end), (1.6, 2.5));
    }

    #[test]
    fn test_trailing_words_form_last_sentence() {
        let words = vec![word(0.0, 0.4, "One."), word(1.0, 1.3, "two"), word(1.3, 1.7, "three")];
        let sentences = group_words_into_sentences(&words);
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[1].text, "two three");
        assert_eq!((sentences[1].start, sentences[1].end), (1.0, 1.7));
    }

    #[test]
    fn test_devanagari_danda_ends_sentence() {
        let words = vec![word(0.0, 0.5, " नमस्ते।"), word(0.7, 1.0, " धन्यवाद")];
        let sentences = group_words_into_sentences(&words);
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0].text, "नमस्ते।");
    }

    #[test]
    fn test_empty_input() {
        assert!(group_words_into_sentences(&[]).is_empty());
    }
}
