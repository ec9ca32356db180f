//! GCode Lexer
//!
//! Splits a line into whitespace-separated words and an optional trailing
//! `;` comment. Words borrow from the input line.

/// A word like "G1", "X10.5" or "S255"
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Word<'a> {
    /// Leading character (the address letter for well-formed words)
    pub letter: char,
    /// Everything after the letter
    pub value: &'a str,
    /// The full word as written
    pub text: &'a str,
}

/// A tokenized line
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LexedLine<'a> {
    pub words: Vec<Word<'a>>,
    /// Comment text including the leading `;`
    pub comment: Option<&'a str>,
}

/// Tokenize a line of GCode
pub fn tokenize_line(line: &str) -> LexedLine<'_> {
    let mut lexed = LexedLine::default();
    let mut chars = line.char_indices().peekable();

    while let Some((start_idx, ch)) = chars.next() {
        match ch {
            c if c.is_whitespace() => continue,

            // Semicolon comment: consume rest of line
            ';' => {
                lexed.comment = Some(&line[start_idx..]);
                break;
            }

            letter => {
                let mut end_idx = start_idx + letter.len_utf8();

                while let Some(&(idx, next_ch)) = chars.peek() {
                    if next_ch.is_whitespace() || next_ch == ';' {
                        break;
                    }
                    end_idx = idx + next_ch.len_utf8();
                    chars.next();
                }

                lexed.words.push(Word {
                    letter,
                    value: &line[start_idx + letter.len_utf8()..end_idx],
                    text: &line[start_idx..end_idx],
                });
            }
        }
    }

    lexed
}
