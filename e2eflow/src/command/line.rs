//! Shell-style splitting of command lines.

use crate::errors::{CommandExecutionError, E2eResult};

/// Splits a command line into program and arguments.
///
/// Supports whitespace separation, single quotes (literal), double quotes
/// (with `\"` and `\\` escapes) and backslash escapes outside quotes. No
/// variable expansion, globbing or pipelines.
pub fn split_command_line(line: &str) -> E2eResult<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err(unterminated(line, '\'')),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch @ ('"' | '\\')) => current.push(ch),
                            Some(ch) => {
                                current.push('\\');
                                current.push(ch);
                            }
                            None => return Err(unterminated(line, '"')),
                        },
                        Some(ch) => current.push(ch),
                        None => return Err(unterminated(line, '"')),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(ch) = chars.next() {
                    current.push(ch);
                }
            }
            ch => {
                in_word = true;
                current.push(ch);
            }
        }
    }
    if in_word {
        words.push(current);
    }

    if words.is_empty() {
        return Err(CommandExecutionError::spawn(line, "empty command line").into());
    }
    Ok(words)
}

fn unterminated(line: &str, quote: char) -> crate::errors::E2eError {
    CommandExecutionError::spawn(line, format!("unterminated {quote} quote")).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plain_words() {
        assert_eq!(
            split_command_line("make docker-build IMG=ctrl:current").unwrap(),
            vec!["make", "docker-build", "IMG=ctrl:current"]
        );
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(
            split_command_line("  kind   get\tclusters ").unwrap(),
            vec!["kind", "get", "clusters"]
        );
    }

    #[test]
    fn test_quotes() {
        assert_eq!(
            split_command_line(r#"sh -c 'echo "hi there"' "a \"b\"""#).unwrap(),
            vec!["sh", "-c", r#"echo "hi there""#, r#"a "b""#]
        );
    }

    #[test]
    fn test_empty_quotes_make_an_argument() {
        assert_eq!(split_command_line("echo ''").unwrap(), vec!["echo", ""]);
    }

    #[test]
    fn test_unterminated_quote() {
        let err = split_command_line("echo 'oops").unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn test_empty_line() {
        assert!(split_command_line("   ").is_err());
    }
}
