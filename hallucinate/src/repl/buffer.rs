//! Line buffering for partial and multi-line input.

/// Accumulates source lines until they form a complete chunk.
#[derive(Debug, Default)]
pub struct LineBuffer {
    lines: Vec<String>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }

    pub fn source(&self) -> String {
        self.lines.join("\n")
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Take the buffered source and reset.
    pub fn take(&mut self) -> String {
        let source = self.source();
        self.clear();
        source
    }

    /// True while a bracket, string literal or block comment is still open.
    pub fn is_incomplete(&self) -> bool {
        is_incomplete(&self.source())
    }
}

/// Scan `source` for unbalanced openers.
pub fn is_incomplete(source: &str) -> bool {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        Str(char),
        LineComment,
        BlockComment(usize),
    }

    let mut depth: i64 = 0;
    let mut state = State::Code;
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                '"' | '`' | '\'' => state = State::Str(c),
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = State::BlockComment(1);
                }
                _ => {}
            },
            State::Str(quote) => match c {
                '\\' => {
                    chars.next();
                }
                c if c == quote => state = State::Code,
                // Plain and char literals end at the line; only backtick strings span lines.
                '\n' if quote != '`' => state = State::Code,
                _ => {}
            },
            State::LineComment => {
                if c == '\n' {
                    state = State::Code;
                }
            }
            State::BlockComment(nesting) => match c {
                '*' if chars.peek() == Some(&'/') => {
                    chars.next();
                    state = if nesting == 1 {
                        State::Code
                    } else {
                        State::BlockComment(nesting - 1)
                    };
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = State::BlockComment(nesting + 1);
                }
                _ => {}
            },
        }
    }
    depth > 0 || matches!(state, State::Str(_) | State::BlockComment(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_statement_is_complete() {
        assert!(!is_incomplete("let x = 5;"));
        assert!(!is_incomplete("print(\"a { b\");"));
    }

    #[test]
    fn open_block_is_incomplete() {
        assert!(is_incomplete("if true {"));
        assert!(is_incomplete("fn f(a,"));
        assert!(is_incomplete("let xs = ["));
    }

    #[test]
    fn open_backtick_string_is_incomplete() {
        assert!(is_incomplete("let s = `first line"));
        assert!(!is_incomplete("let s = `first\nsecond`;"));
    }

    #[test]
    fn comments_are_ignored() {
        assert!(!is_incomplete("let x = 1; // {"));
        assert!(is_incomplete("/* open"));
        assert!(!is_incomplete("/* { */ let y = 2;"));
    }

    #[test]
    fn buffer_accumulates_lines() {
        let mut buffer = LineBuffer::new();
        buffer.push("if true {");
        assert!(buffer.is_incomplete());
        buffer.push("  print(1);");
        buffer.push("}");
        assert!(!buffer.is_incomplete());
        assert_eq!(buffer.take(), "if true {\n  print(1);\n}");
        assert_eq!(buffer.source(), "");
    }
}
