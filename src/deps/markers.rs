//! A deliberately small environment-marker evaluator.
//!
//! Only platform variables and `extra` are decided; clauses on anything
//! else (`python_version`, `implementation_name`, ...) count as satisfied.

use regex::Regex;
use std::sync::LazyLock;

use crate::platform::Platform;

static CLAUSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(sys[._]platform|platform_system|os[._]name|platform_machine|extra)\s*(==|!=|not\s+in|in)\s*['"]([^'"]*)['"]"#,
    )
    .expect("valid marker regex")
});

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    And,
    Or,
    Clause(String),
}

/// Splits a marker into parentheses, `and`/`or` and the clauses between
/// them. Quoted values are never split.
fn tokenize(marker: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut clause: Vec<String> = Vec::new();
    let mut word = String::new();
    let mut quote = None;

    fn flush_word(word: &mut String, clause: &mut Vec<String>, tokens: &mut Vec<Token>) {
        match word.as_str() {
            "" => {}
            "and" | "or" => {
                flush_clause(clause, tokens);
                tokens.push(if *word == "and" { Token::And } else { Token::Or });
            }
            _ => clause.push(word.clone()),
        }
        word.clear();
    }

    fn flush_clause(clause: &mut Vec<String>, tokens: &mut Vec<Token>) {
        if !clause.is_empty() {
            tokens.push(Token::Clause(clause.join(" ")));
            clause.clear();
        }
    }

    for c in marker.chars() {
        if let Some(q) = quote {
            word.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                word.push(c);
            }
            '(' | ')' => {
                flush_word(&mut word, &mut clause, &mut tokens);
                flush_clause(&mut clause, &mut tokens);
                tokens.push(if c == '(' { Token::Open } else { Token::Close });
            }
            c if c.is_whitespace() => flush_word(&mut word, &mut clause, &mut tokens),
            c => word.push(c),
        }
    }
    flush_word(&mut word, &mut clause, &mut tokens);
    flush_clause(&mut clause, &mut tokens);
    tokens
}

#[derive(Debug, PartialEq)]
enum Expr {
    Clause(String),
    All(Vec<Expr>),
    Any(Vec<Expr>),
}

impl Expr {
    fn holds(&self, platform: &Platform) -> bool {
        match self {
            Expr::Clause(clause) => clause_holds(clause, platform),
            Expr::All(terms) => terms.iter().all(|t| t.holds(platform)),
            Expr::Any(terms) => terms.iter().any(|t| t.holds(platform)),
        }
    }
}

/// Recursive descent over the tokens; `and` binds tighter than `or`.
/// Malformed input degrades to satisfied clauses instead of failing.
struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn any(&mut self) -> Expr {
        let mut terms = vec![self.all()];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            terms.push(self.all());
        }
        if terms.len() == 1 { terms.remove(0) } else { Expr::Any(terms) }
    }

    fn all(&mut self) -> Expr {
        let mut terms = vec![self.atom()];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            terms.push(self.atom());
        }
        if terms.len() == 1 { terms.remove(0) } else { Expr::All(terms) }
    }

    fn atom(&mut self) -> Expr {
        match self.peek() {
            Some(Token::Open) => {
                self.pos += 1;
                let inner = self.any();
                if self.peek() == Some(&Token::Close) {
                    self.pos += 1;
                }
                inner
            }
            Some(Token::Clause(clause)) => {
                let clause = clause.clone();
                self.pos += 1;
                Expr::Clause(clause)
            }
            _ => Expr::Clause(String::new()),
        }
    }
}

fn parse(marker: &str) -> Expr {
    let tokens = tokenize(marker);
    Parser {
        tokens: &tokens,
        pos: 0,
    }
    .any()
}

/// Whether a requirement guarded by `marker` applies on `platform` with no
/// extras requested.
pub fn marker_applies(marker: &str, platform: &Platform) -> bool {
    parse(marker).holds(platform)
}

fn clause_holds(clause: &str, platform: &Platform) -> bool {
    let clause = clause.trim();
    let Some(caps) = CLAUSE_RE.captures(clause) else {
        return true;
    };
    // legacy metadata writes `sys.platform` / `os.name`
    let actual = match caps[1].replace('.', "_").as_str() {
        "sys_platform" => platform.sys_platform(),
        "platform_system" => platform.platform_system(),
        "os_name" => platform.os_name(),
        "platform_machine" => platform.platform_machine(),
        _ => "",
    };
    let expected = &caps[3];
    let op = caps[2].split_whitespace().collect::<Vec<_>>().join(" ");
    match op.as_str() {
        "==" => actual == expected,
        "!=" => actual != expected,
        "in" => !actual.is_empty() && expected.contains(actual),
        "not in" => actual.is_empty() || !expected.contains(actual),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn windows() -> Platform {
        Platform {
            os: "windows".into(),
            arch: "x86_64".into(),
        }
    }

    #[test]
    fn test_windows_only_markers() {
        let linux = Platform::linux();
        for marker in [
            "sys_platform == 'win32'",
            "platform_system == \"Windows\"",
            "os_name == 'nt'",
            "sys_platform==\"win32\" and python_version<\"3\"",
            "sys.platform == 'win32'",
        ] {
            assert!(!marker_applies(marker, &linux), "{}", marker);
            assert!(marker_applies(marker, &windows()), "{}", marker);
        }
    }

    #[test]
    fn test_negated_and_alternatives() {
        let linux = Platform::linux();
        assert!(marker_applies("sys_platform != 'win32'", &linux));
        assert!(marker_applies(
            "sys_platform == 'darwin' or sys_platform == 'linux'",
            &linux
        ));
        assert!(marker_applies("sys_platform in 'linux darwin'", &linux));
        assert!(!marker_applies("sys_platform not in 'linux darwin'", &linux));
    }

    #[test]
    fn test_parenthesized_groups_bind_first() {
        let linux = Platform::linux();
        let marker = "sys_platform == 'win32' and (python_version < '3' or platform_machine == 'x86_64')";
        assert!(!marker_applies(marker, &linux));
        assert!(marker_applies(marker, &windows()));

        let marker = "(sys_platform == 'win32' or os_name == 'nt') and python_version < '3'";
        assert!(!marker_applies(marker, &linux));
        assert!(marker_applies(marker, &windows()));

        assert!(marker_applies(
            "python_version < '3' or (sys_platform == 'linux' and extra != 'x')",
            &linux
        ));
        assert!(marker_applies("((sys_platform == 'linux'))", &linux));
    }

    #[test]
    fn test_tokenize_keeps_quoted_values() {
        assert_eq!(
            tokenize("sys_platform in 'linux (and) darwin' or(os_name=='nt')"),
            vec![
                Token::Clause("sys_platform in 'linux (and) darwin'".into()),
                Token::Or,
                Token::Open,
                Token::Clause("os_name=='nt'".into()),
                Token::Close,
            ]
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        assert_eq!(
            parse("a == '1' or b == '2' and c == '3'"),
            Expr::Any(vec![
                Expr::Clause("a == '1'".into()),
                Expr::All(vec![
                    Expr::Clause("b == '2'".into()),
                    Expr::Clause("c == '3'".into()),
                ]),
            ])
        );
    }

    #[test]
    fn test_extra_never_applies() {
        assert!(!marker_applies("extra == 'test'", &Platform::linux()));
        assert!(!marker_applies(
            "python_version >= '3' and extra == \"docs\"",
            &Platform::linux()
        ));
    }

    #[test]
    fn test_unknown_variables_are_satisfied() {
        assert!(marker_applies("python_version < '3.4'", &Platform::linux()));
        assert!(marker_applies(
            "(implementation_name == 'cpython')",
            &Platform::linux()
        ));
    }
}
