//! Syntax sanity check for payloads.
//!
//! With the `js-ast` feature the payload is parsed as a standalone script with
//! `boa_parser`, and failing that as a function body, since PDF viewers run
//! document scripts the way `new Function` does and accept a top-level
//! `return`. Without the feature, a lexical delimiter-balance check runs instead
//! so the classifier still reports obviously truncated code.

/// Returns a human-readable description of the first syntax problem found.
pub fn check_syntax(source: &str) -> Result<(), String> {
    #[cfg(feature = "js-ast")]
    {
        parse_script(source)
    }
    #[cfg(not(feature = "js-ast"))]
    {
        check_delimiters(source)
    }
}

#[cfg(feature = "js-ast")]
fn parse_script(source: &str) -> Result<(), String> {
    parse_source(source).or_else(|err| {
        let body = format!("(function () {{\n{source}\n}});");
        parse_source(&body).map_err(|_| err)
    })
}

#[cfg(feature = "js-ast")]
fn parse_source(source: &str) -> Result<(), String> {
    use boa_ast::scope::Scope;
    use boa_interner::Interner;
    use boa_parser::{Parser, Source};

    let mut interner = Interner::default();
    let mut parser = Parser::new(Source::from_bytes(source));
    let scope = Scope::new_global();
    parser
        .parse_script(&scope, &mut interner)
        .map(|_| ())
        .map_err(|err| err.to_string())
}

#[cfg_attr(feature = "js-ast", allow(dead_code))]
pub(crate) fn check_delimiters(source: &str) -> Result<(), String> {
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut chars = source.char_indices().peekable();
    let mut line = 1usize;

    while let Some((_, c)) = chars.next() {
        match c {
            '\n' => line += 1,
            '/' if chars.peek().map(|(_, n)| *n) == Some('/') => {
                for (_, n) in chars.by_ref() {
                    if n == '\n' {
                        line += 1;
                        break;
                    }
                }
            }
            '/' if chars.peek().map(|(_, n)| *n) == Some('*') => {
                chars.next();
                let mut prev = '\0';
                let mut closed = false;
                for (_, n) in chars.by_ref() {
                    if n == '\n' {
                        line += 1;
                    }
                    if prev == '*' && n == '/' {
                        closed = true;
                        break;
                    }
                    prev = n;
                }
                if !closed {
                    return Err(format!("unterminated block comment at line {line}"));
                }
            }
            '\'' | '"' | '`' => {
                let quote = c;
                let start = line;
                let mut closed = false;
                while let Some((_, n)) = chars.next() {
                    match n {
                        '\\' => {
                            chars.next();
                        }
                        '\n' if quote != '`' => break,
                        '\n' => line += 1,
                        _ if n == quote => {
                            closed = true;
                            break;
                        }
                        _ => {}
                    }
                }
                if !closed {
                    return Err(format!("unterminated string literal starting at line {start}"));
                }
            }
            '(' | '[' | '{' => stack.push((c, line)),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match stack.pop() {
                    Some((open, _)) if open == expected => {}
                    Some((open, open_line)) => {
                        return Err(format!(
                            "unexpected '{c}' at line {line}; \
                             '{open}' opened at line {open_line} is still open"
                        ));
                    }
                    None => return Err(format!("unexpected '{c}' at line {line}")),
                }
            }
            _ => {}
        }
    }
    if let Some((open, open_line)) = stack.pop() {
        return Err(format!("unclosed '{open}' opened at line {open_line}"));
    }
    Ok(())
}
