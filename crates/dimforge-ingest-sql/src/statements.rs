//! Statement splitting.
//!
//! `sqlparser` parses a whole script or nothing; one malformed statement would
//! sink every table in the file. We therefore cut the script into statements
//! ourselves (quote-aware, comments stripped) and hand them to the parser one by one.

/// One statement of the input script, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStatement {
    /// 1-based position among the non-empty statements of the script.
    pub ordinal: usize,
    pub text: String,
}

impl RawStatement {
    /// Short single-line rendering for diagnostics.
    pub fn preview(&self) -> String {
        let flat = self.text.split_whitespace().collect::<Vec<_>>().join(" ");
        if flat.chars().count() <= 72 {
            flat
        } else {
            let cut: String = flat.chars().take(69).collect();
            format!("{cut}...")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Normal,
    Quoted(char),
    LineComment,
    BlockComment,
}

/// Split `sql` on top-level semicolons, dropping `--` and `/* */` comments.
pub fn split_statements(sql: &str) -> Vec<RawStatement> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut state = ScanState::Normal;
    let mut chars = sql.chars().peekable();

    let mut flush = |current: &mut String, out: &mut Vec<RawStatement>| {
        let text = current.trim();
        if !text.is_empty() {
            out.push(RawStatement {
                ordinal: out.len() + 1,
                text: text.to_string(),
            });
        }
        current.clear();
    };

    while let Some(c) = chars.next() {
        match state {
            ScanState::Normal => match c {
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    state = ScanState::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = ScanState::BlockComment;
                    current.push(' ');
                }
                ';' => flush(&mut current, &mut out),
                '\'' | '"' | '`' => {
                    state = ScanState::Quoted(c);
                    current.push(c);
                }
                '[' => {
                    state = ScanState::Quoted(']');
                    current.push(c);
                }
                _ => current.push(c),
            },
            ScanState::Quoted(close) => {
                current.push(c);
                if c == close {
                    state = ScanState::Normal;
                }
            }
            ScanState::LineComment => {
                if c == '\n' {
                    state = ScanState::Normal;
                    current.push('\n');
                }
            }
            ScanState::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = ScanState::Normal;
                }
            }
        }
    }
    flush(&mut current, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_strips_line_comments() {
        let sql = "-- header\nCREATE TABLE a (id INT); -- trailing\n\nCREATE TABLE b (id INT);";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].text, "CREATE TABLE a (id INT)");
        assert_eq!(stmts[1].ordinal, 2);
        assert!(!stmts[1].text.contains("trailing"));
    }

    #[test]
    fn test_split_respects_quotes() {
        let sql = "INSERT INTO t (note) VALUES ('a; b -- not a comment'); SELECT 1";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].text.contains("'a; b -- not a comment'"));
    }

    #[test]
    fn test_split_handles_doubled_quotes_and_block_comments() {
        let sql = "/* one; two */ INSERT INTO t VALUES ('it''s; fine');;";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].text.ends_with("('it''s; fine')"));
    }

    #[test]
    fn test_preview_is_single_line_and_bounded() {
        let stmt = RawStatement {
            ordinal: 1,
            text: format!("CREATE TABLE t (\n  {}\n)", "c INT, ".repeat(40)),
        };
        let preview = stmt.preview();
        assert!(!preview.contains('\n'));
        assert!(preview.ends_with("..."));
    }
}
