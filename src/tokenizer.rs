/// Punctuation that may join two alphanumeric runs into one word when
/// punctuation is not a delimiter (e.g. `don't`, `e-mail`, `v1.2`).
const INTRA_WORD: &[char] = &['\'', '\u{2019}', '-', '_', '.'];

/// Lazy word extraction over a content buffer.
///
/// Words are runs of alphanumeric characters. With `avoid_punctuation`
/// set, a single intra-word punctuation character between two alphanumeric
/// characters does not end the word. With `skip_tag_xml` set, `<...>` spans
/// never produce words. Words shorter than `min_word_size` characters are
/// dropped.
#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    content: &'a str,
    pos: usize,
    avoid_punctuation: bool,
    skip_tag_xml: bool,
    min_word_size: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(content: &'a str) -> Self {
        Self {
            content,
            pos: 0,
            avoid_punctuation: false,
            skip_tag_xml: false,
            min_word_size: 1,
        }
    }

    pub fn avoid_punctuation(mut self, enabled: bool) -> Self {
        self.avoid_punctuation = enabled;
        self
    }

    pub fn skip_tag_xml(mut self, enabled: bool) -> Self {
        self.skip_tag_xml = enabled;
        self
    }

    pub fn min_word_size(mut self, size: usize) -> Self {
        self.min_word_size = size.max(1);
        self
    }

    /// Restart from the beginning of the buffer.
    pub fn reset(&mut self) {
        self.pos = 0;
    }

    fn peek_at(&self, pos: usize) -> Option<char> {
        self.content[pos..].chars().next()
    }

    fn skip_separators(&mut self) {
        while let Some(c) = self.peek_at(self.pos) {
            if c.is_alphanumeric() {
                return;
            }
            if c == '<' && self.skip_tag_xml {
                self.pos = match self.content[self.pos..].find('>') {
                    Some(offset) => self.pos + offset + 1,
                    None => self.content.len(),
                };
                continue;
            }
            self.pos += c.len_utf8();
        }
    }

    fn scan_word(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek_at(self.pos) {
            if c.is_alphanumeric() {
                self.pos += c.len_utf8();
                continue;
            }
            if self.avoid_punctuation && INTRA_WORD.contains(&c) {
                let after = self.pos + c.len_utf8();
                if self.peek_at(after).is_some_and(char::is_alphanumeric) {
                    self.pos = after;
                    continue;
                }
            }
            break;
        }
        &self.content[start..self.pos]
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        loop {
            self.skip_separators();
            if self.pos >= self.content.len() {
                return None;
            }
            let word = self.scan_word();
            if word.chars().count() >= self.min_word_size {
                return Some(word);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(t: Tokenizer<'_>) -> Vec<&str> {
        t.collect()
    }

    #[test]
    fn splits_on_punctuation_and_space() {
        let t = Tokenizer::new("Hello, world! foo-bar baz.");
        assert_eq!(words(t), vec!["Hello", "world", "foo", "bar", "baz"]);
    }

    #[test]
    fn avoid_punctuation_keeps_intra_word_marks() {
        let t = Tokenizer::new("don't stop e-mail v1.2 end. -x")
            .avoid_punctuation(true);
        assert_eq!(
            words(t),
            vec!["don't", "stop", "e-mail", "v1.2", "end", "x"]
        );
    }

    #[test]
    fn skip_tag_xml_ignores_markup() {
        let content = "<date>03/11/2005</date><p class=\"x\">alpha beta</p>";
        let t = Tokenizer::new(content).skip_tag_xml(true);
        assert_eq!(words(t), vec!["03", "11", "2005", "alpha", "beta"]);

        let t = Tokenizer::new(content);
        assert!(words(t).contains(&"date"));
    }

    #[test]
    fn unterminated_tag_consumes_rest() {
        let t = Tokenizer::new("word <never closed").skip_tag_xml(true);
        assert_eq!(words(t), vec!["word"]);
    }

    #[test]
    fn min_word_size_filters_short_words() {
        let t = Tokenizer::new("a an the rust").min_word_size(3);
        assert_eq!(words(t), vec!["the", "rust"]);
    }

    #[test]
    fn unicode_words() {
        let t = Tokenizer::new("caffè über naïve");
        assert_eq!(words(t), vec!["caffè", "über", "naïve"]);
    }

    #[test]
    fn reset_restarts() {
        let mut t = Tokenizer::new("one two");
        assert_eq!(t.next(), Some("one"));
        assert_eq!(t.next(), Some("two"));
        assert_eq!(t.next(), None);
        t.reset();
        assert_eq!(t.next(), Some("one"));
    }

    #[test]
    fn empty_content() {
        assert_eq!(Tokenizer::new("").next(), None);
        assert_eq!(Tokenizer::new(" ,;. ").next(), None);
    }
}
