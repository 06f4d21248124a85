use std::fmt;

use crate::config::VoiceVocabulary;

/// A discrete action derived from one transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceIntent {
    SwitchNext,
    SwitchPrev,
    /// 1-based position in the session list
    SwitchTab(u32),
    /// 1-based position in the window list
    SwitchWindow(u32),
    Summarize,
    /// 1-based choice number
    SelectChoice(u32),
    Refresh,
    /// Unrecognised speech, forwarded literally
    FreeText(String),
}

impl fmt::Display for VoiceIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoiceIntent::SwitchNext => write!(f, "switch-next"),
            VoiceIntent::SwitchPrev => write!(f, "switch-prev"),
            VoiceIntent::SwitchTab(n) => write!(f, "switch-tab({n})"),
            VoiceIntent::SwitchWindow(n) => write!(f, "switch-window({n})"),
            VoiceIntent::Summarize => write!(f, "summarize"),
            VoiceIntent::SelectChoice(n) => write!(f, "select-choice({n})"),
            VoiceIntent::Refresh => write!(f, "refresh"),
            VoiceIntent::FreeText(text) => write!(f, "free-text({text:?})"),
        }
    }
}

/// Outcome of looking for a numbered command
enum Numbered {
    Absent,
    Valid(u32),
    Invalid,
}

/// Maps transcripts onto [`VoiceIntent`]s using a configurable vocabulary.
///
/// Rules are tried in a fixed order and the first match wins: tab number,
/// window number, choice number, next, previous, summarize, refresh.
/// Anything else is free text.
pub struct Interpreter {
    vocabulary: VoiceVocabulary,
}

impl Interpreter {
    pub fn new(vocabulary: &VoiceVocabulary) -> Self {
        let lower = |list: &[String]| -> Vec<String> {
            list.iter()
                .map(|s| normalize(s.trim()))
                .filter(|s| !s.is_empty())
                .collect()
        };

        Self {
            vocabulary: VoiceVocabulary {
                next: lower(&vocabulary.next),
                previous: lower(&vocabulary.previous),
                summarize: lower(&vocabulary.summarize),
                refresh: lower(&vocabulary.refresh),
                tab_prefixes: lower(&vocabulary.tab_prefixes),
                window_prefixes: lower(&vocabulary.window_prefixes),
                choice_prefixes: lower(&vocabulary.choice_prefixes),
                choice_suffixes: lower(&vocabulary.choice_suffixes),
                number_words: vocabulary
                    .number_words
                    .iter()
                    .map(|(word, n)| (normalize(word.trim()), *n))
                    .filter(|(word, _)| !word.is_empty())
                    .collect(),
                max_number: vocabulary.max_number,
            },
        }
    }

    pub fn interpret(&self, transcript: &str) -> VoiceIntent {
        let original = transcript.trim();
        let text = normalize(original);
        let vocab = &self.vocabulary;
        let free_text = || VoiceIntent::FreeText(original.to_string());

        let choice = match self.number_after(&text, &vocab.choice_prefixes) {
            Numbered::Absent => self.number_before(&text, &vocab.choice_suffixes),
            found => found,
        };
        let numbered: [(Numbered, fn(u32) -> VoiceIntent); 3] = [
            (self.number_after(&text, &vocab.tab_prefixes), VoiceIntent::SwitchTab),
            (self.number_after(&text, &vocab.window_prefixes), VoiceIntent::SwitchWindow),
            (choice, VoiceIntent::SelectChoice),
        ];

        for (found, intent) in numbered {
            match found {
                Numbered::Valid(n) => return intent(n),
                Numbered::Invalid => return free_text(),
                Numbered::Absent => {}
            }
        }

        // A bare spoken number ("さん") picks that choice
        let bare = text.trim_end_matches(['。', '.', '!', '！', '?', '？']).trim();
        if let Some(n) = vocab.number_words.get(bare) {
            return match self.check_range(Some(u64::from(*n))) {
                Numbered::Valid(n) => VoiceIntent::SelectChoice(n),
                _ => free_text(),
            };
        }

        let phrases = [
            (&vocab.next, VoiceIntent::SwitchNext),
            (&vocab.previous, VoiceIntent::SwitchPrev),
            (&vocab.summarize, VoiceIntent::Summarize),
            (&vocab.refresh, VoiceIntent::Refresh),
        ];
        for (triggers, intent) in phrases {
            if triggers.iter().any(|t| text.contains(t.as_str())) {
                return intent;
            }
        }

        free_text()
    }

    fn check_range(&self, n: Option<u64>) -> Numbered {
        match n {
            Some(n) if n >= 1 && n <= u64::from(self.vocabulary.max_number) => Numbered::Valid(n as u32),
            _ => Numbered::Invalid,
        }
    }

    /// A number directly following one of `prefixes` ("tab 3", "タブ3", "tab three")
    fn number_after(&self, text: &str, prefixes: &[String]) -> Numbered {
        for prefix in prefixes {
            for (idx, _) in text.match_indices(prefix.as_str()) {
                let rest = text[idx + prefix.len()..].trim_start_matches([' ', '#', '　']);

                let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
                if !digits.is_empty() {
                    return self.check_range(digits.parse().ok());
                }

                let word = self.longest_word(|word| {
                    rest.strip_prefix(word)
                        .is_some_and(|after| !after.starts_with(|c: char| c.is_ascii_alphabetic()))
                });
                if let Some(n) = word {
                    return self.check_range(Some(u64::from(n)));
                }
            }
        }
        Numbered::Absent
    }

    /// A number directly preceding one of `suffixes` ("2番")
    fn number_before(&self, text: &str, suffixes: &[String]) -> Numbered {
        for suffix in suffixes {
            for (idx, _) in text.match_indices(suffix.as_str()) {
                let head = text[..idx].trim_end();
                let digits: String = head
                    .chars()
                    .rev()
                    .take_while(|c| c.is_ascii_digit())
                    .collect::<Vec<_>>()
                    .into_iter()
                    .rev()
                    .collect();
                if !digits.is_empty() {
                    return self.check_range(digits.parse().ok());
                }

                let word = self.longest_word(|word| {
                    head.strip_suffix(word)
                        .is_some_and(|before| !before.ends_with(|c: char| c.is_ascii_alphabetic()))
                });
                if let Some(n) = word {
                    return self.check_range(Some(u64::from(n)));
                }
            }
        }
        Numbered::Absent
    }

    /// Value of the longest number word accepted by `matches`
    fn longest_word(&self, matches: impl Fn(&str) -> bool) -> Option<u32> {
        self.vocabulary
            .number_words
            .iter()
            .filter(|(word, _)| matches(word.as_str()))
            .max_by_key(|(word, _)| word.len())
            .map(|(_, n)| *n)
    }
}

/// Lowercase and fold full-width digits to ASCII
fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '０'..='９' => char::from(b'0' + (c as u32 - '０' as u32) as u8),
            _ => c,
        })
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interpreter() -> Interpreter {
        Interpreter::new(&VoiceVocabulary::default())
    }

    #[test]
    fn test_tab_numbers() {
        let i = interpreter();
        assert_eq!(i.interpret("タブ3"), VoiceIntent::SwitchTab(3));
        assert_eq!(i.interpret("タブ99"), VoiceIntent::SwitchTab(99));
        assert_eq!(i.interpret("Tab 2"), VoiceIntent::SwitchTab(2));
        assert_eq!(i.interpret("go to tab three"), VoiceIntent::SwitchTab(3));
        assert_eq!(i.interpret("タブ３"), VoiceIntent::SwitchTab(3));
    }

    #[test]
    fn test_window_numbers() {
        let i = interpreter();
        assert_eq!(i.interpret("ウィンドウ2"), VoiceIntent::SwitchWindow(2));
        assert_eq!(i.interpret("window #1"), VoiceIntent::SwitchWindow(1));
    }

    #[test]
    fn test_choice_numbers() {
        let i = interpreter();
        assert_eq!(i.interpret("2番"), VoiceIntent::SelectChoice(2));
        assert_eq!(i.interpret("選択1"), VoiceIntent::SelectChoice(1));
        assert_eq!(i.interpret("option four"), VoiceIntent::SelectChoice(4));
    }

    #[test]
    fn test_japanese_number_readings() {
        let i = interpreter();
        assert_eq!(i.interpret("いち"), VoiceIntent::SelectChoice(1));
        assert_eq!(i.interpret("さん。"), VoiceIntent::SelectChoice(3));
        assert_eq!(i.interpret("選択よん"), VoiceIntent::SelectChoice(4));
        assert_eq!(i.interpret("はち番"), VoiceIntent::SelectChoice(8));
        assert_eq!(i.interpret("タブさん"), VoiceIntent::SwitchTab(3));
        assert_eq!(i.interpret("two"), VoiceIntent::SelectChoice(2));
    }

    #[test]
    fn test_number_words_inside_speech_are_free_text() {
        let i = interpreter();
        assert_eq!(i.interpret("に"), VoiceIntent::FreeText("に".to_string()));
        assert_eq!(
            i.interpret("田中さんに聞いて"),
            VoiceIntent::FreeText("田中さんに聞いて".to_string())
        );
        assert_eq!(i.interpret("someone"), VoiceIntent::FreeText("someone".to_string()));
    }

    #[test]
    fn test_custom_number_words() {
        let mut vocabulary = VoiceVocabulary::default();
        vocabulary.number_words.insert("Zwei".to_string(), 2);
        vocabulary.max_number = 3;
        vocabulary.number_words.insert("vier".to_string(), 4);
        let i = Interpreter::new(&vocabulary);
        assert_eq!(i.interpret("zwei"), VoiceIntent::SelectChoice(2));
        assert_eq!(i.interpret("vier"), VoiceIntent::FreeText("vier".to_string()));
    }

    #[test]
    fn test_out_of_range_numbers_become_free_text() {
        let i = interpreter();
        assert_eq!(i.interpret("tab 0"), VoiceIntent::FreeText("tab 0".to_string()));
        assert_eq!(i.interpret("tab 500"), VoiceIntent::FreeText("tab 500".to_string()));
        assert_eq!(
            i.interpret("tab 99999999999999999999"),
            VoiceIntent::FreeText("tab 99999999999999999999".to_string())
        );
    }

    #[test]
    fn test_directional_and_other_commands() {
        let i = interpreter();
        assert_eq!(i.interpret("次のタブ"), VoiceIntent::SwitchNext);
        assert_eq!(i.interpret("Next"), VoiceIntent::SwitchNext);
        assert_eq!(i.interpret("前のタブ"), VoiceIntent::SwitchPrev);
        assert_eq!(i.interpret("要約して"), VoiceIntent::Summarize);
        assert_eq!(i.interpret("please summarize"), VoiceIntent::Summarize);
        assert_eq!(i.interpret("リフレッシュ"), VoiceIntent::Refresh);
    }

    #[test]
    fn test_numbered_commands_win_over_directional() {
        let i = interpreter();
        assert_eq!(i.interpret("next tab 2"), VoiceIntent::SwitchTab(2));
        assert_eq!(i.interpret("summarize window 3"), VoiceIntent::SwitchWindow(3));
    }

    #[test]
    fn test_prefix_inside_other_words_is_not_a_command() {
        let i = interpreter();
        assert_eq!(
            i.interpret("add a table 3 columns wide"),
            VoiceIntent::FreeText("add a table 3 columns wide".to_string())
        );
    }

    #[test]
    fn test_unmatched_is_free_text_preserving_case() {
        let i = interpreter();
        assert_eq!(
            i.interpret("  Run the Test suite  "),
            VoiceIntent::FreeText("Run the Test suite".to_string())
        );
        assert_eq!(i.interpret(""), VoiceIntent::FreeText(String::new()));
    }

    #[test]
    fn test_custom_vocabulary() {
        let vocabulary = VoiceVocabulary {
            next: vec!["Weiter".to_string()],
            max_number: 5,
            ..VoiceVocabulary::default()
        };
        let i = Interpreter::new(&vocabulary);
        assert_eq!(i.interpret("weiter bitte"), VoiceIntent::SwitchNext);
        assert_eq!(i.interpret("tab 6"), VoiceIntent::FreeText("tab 6".to_string()));
    }
}
