//! `.scripterrc` configuration file parser.
//!
//! | Directive | Action |
//! |-----------|--------|
//! | `/set <name>=<value>` or `/set <name> <value>` | predefine a global |
//! | `/tick <ms>` | tick interval |
//! | `/ticks <n>` | number of ticks to run, `0` = until interrupted |
//! | `/load <path>` | script to run before command-line scripts |
//! | Lines starting with `;` or `#` | comment, ignored |
//! | Any other `/command` | silently skipped |
//!
//! `/set` values that read as numbers become numbers; everything else is a
//! string.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::script::Value;

pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

/// Host settings read from a config file.
#[derive(Debug, Clone)]
pub struct Config {
    /// Globals to bind before any script runs, in file order.
    pub globals: Vec<(String, Value)>,
    pub tick: Duration,
    /// `None` runs until interrupted.
    pub ticks: Option<u64>,
    /// Scripts to load, relative paths resolved against the config file.
    pub loads: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            globals: Vec::new(),
            tick: DEFAULT_TICK,
            ticks: None,
            loads: Vec::new(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config string.
    ///
    /// Returns the config and a list of any errors on recognised lines.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            let Some(rest) = line.strip_prefix('/') else { continue };

            let (cmd, args_str) = rest
                .split_once(|c: char| c.is_ascii_whitespace())
                .unwrap_or((rest, ""));
            let args_str = args_str.trim();

            let result = match cmd {
                "set" => parse_set(&split_args(args_str)).map(|kv| config.globals.push(kv)),
                "tick" => parse_number(cmd, args_str).map(|ms| {
                    config.tick = Duration::from_millis(ms.max(1));
                }),
                "ticks" => parse_number(cmd, args_str).map(|n| {
                    config.ticks = (n > 0).then_some(n);
                }),
                "load" => match split_args(args_str).as_slice() {
                    [path] => {
                        config.loads.push(PathBuf::from(path));
                        Ok(())
                    }
                    _ => Err("/load: requires exactly one path".to_owned()),
                },
                _ => Ok(()),
            };
            if let Err(message) = result {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        (config, errors)
    }

    /// Read and parse a config file from disk.  Relative `/load` paths are
    /// resolved against the file's directory.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        let (mut config, errors) = Self::load_str(&s);
        if let Some(dir) = path.parent() {
            for load in &mut config.loads {
                if load.is_relative() {
                    *load = dir.join(&*load);
                }
            }
        }
        Ok((config, errors))
    }
}

// ── Argument tokenizer ────────────────────────────────────────────────────────

/// Split `s` into whitespace-delimited tokens, honouring double-quoted strings
/// and `\"` escapes within them.
fn split_args(s: &str) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    cur.push(escaped);
                }
            }
            c if c.is_ascii_whitespace() && !in_quotes => {
                if !cur.is_empty() {
                    args.push(std::mem::take(&mut cur));
                }
            }
            c => cur.push(c),
        }
    }
    if !cur.is_empty() {
        args.push(cur);
    }
    args
}

// ── Directives ────────────────────────────────────────────────────────────────

/// Parse `/set <name>=<value>` or `/set <name> <value>`.
fn parse_set(tokens: &[String]) -> Result<(String, Value), String> {
    let Some(first) = tokens.first() else {
        return Err("/set: requires an argument".into());
    };

    let (name, value) = if let Some((name, value)) = first.split_once('=') {
        let mut value = value.to_owned();
        for extra in &tokens[1..] {
            value.push(' ');
            value.push_str(extra);
        }
        (name.to_owned(), value)
    } else if tokens.len() >= 2 {
        (first.clone(), tokens[1..].join(" "))
    } else {
        return Err(format!("/set: missing value for '{first}'"));
    };

    if name.is_empty() {
        return Err("/set: variable name cannot be empty".into());
    }

    Ok((name, setting_value(&value)))
}

fn setting_value(text: &str) -> Value {
    match text.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => Value::Number(n),
        _ => Value::from(text),
    }
}

fn parse_number(cmd: &str, args: &str) -> Result<u64, String> {
    args.parse()
        .map_err(|_| format!("/{cmd}: expected a whole number, got '{args}'"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn global<'a>(cfg: &'a Config, name: &str) -> Option<&'a Value> {
        cfg.globals.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    #[test]
    fn split_quoted_spaces() {
        assert_eq!(split_args(r#""My Name" 4242"#), ["My Name", "4242"]);
    }

    #[test]
    fn split_escaped_quote_inside_quotes() {
        assert_eq!(split_args(r#""say \"hi\"""#), [r#"say "hi""#]);
    }

    #[test]
    fn set_equals_syntax() {
        let (cfg, errs) = Config::load_str("/set speed=2.5");
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(global(&cfg, "speed"), Some(&Value::Number(2.5)));
    }

    #[test]
    fn set_space_syntax_with_text() {
        let (cfg, errs) = Config::load_str("/set greeting hello world");
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(global(&cfg, "greeting"), Some(&Value::from("hello world")));
    }

    #[test]
    fn set_quoted_value() {
        let (cfg, _) = Config::load_str(r#"/set title="two words""#);
        assert_eq!(global(&cfg, "title"), Some(&Value::from("two words")));
    }

    #[test]
    fn set_errors() {
        let (_, errs) = Config::load_str("/set\n/set lonely\n/set =3");
        let lines: Vec<usize> = errs.iter().map(|e| e.line).collect();
        assert_eq!(lines, [1, 2, 3]);
    }

    #[test]
    fn tick_settings() {
        let (cfg, errs) = Config::load_str("/tick 20\n/ticks 5");
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.tick, Duration::from_millis(20));
        assert_eq!(cfg.ticks, Some(5));

        let (cfg, _) = Config::load_str("/ticks 0");
        assert_eq!(cfg.ticks, None);
    }

    #[test]
    fn bad_tick_is_error_with_line() {
        let (cfg, errs) = Config::load_str("\n/tick fast");
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].line, 2);
        assert_eq!(errs[0].to_string(), "line 2: /tick: expected a whole number, got 'fast'");
        assert_eq!(cfg.tick, DEFAULT_TICK);
    }

    #[test]
    fn comments_and_unknown_commands_skipped() {
        let (cfg, errs) = Config::load_str(
            "; comment\n\
             # another\n\
             /bogus whatever\n\
             plain text\n\
             /set real=yes",
        );
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.globals.len(), 1);
    }

    #[test]
    fn load_file_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scripterrc");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "/load init.sc\n/load /abs/other.sc\n/set lives=3").unwrap();

        let (cfg, errs) = Config::load_file(&path).unwrap();
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.loads, [dir.path().join("init.sc"), PathBuf::from("/abs/other.sc")]);
        assert_eq!(global(&cfg, "lives"), Some(&Value::Number(3.0)));
    }

    #[test]
    fn load_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_file(&dir.path().join("nope")).is_err());
    }
}
