//! Command-line argument parsing.
//!
//! Usage:
//!   scripter [-f[<file>]] [-c<script>] [-t<ticks>] [-i<ms>] [-qd] [<script>...]

use std::path::PathBuf;

use directories::ProjectDirs;

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Which user config file to load.
    pub config: ConfigFile,
    /// Inline script to run after loading config (`-c<script>`).
    pub command: Option<String>,
    /// Number of ticks to run (`-t<n>`); overrides `/ticks`.
    pub ticks: Option<u64>,
    /// Tick interval in milliseconds (`-i<ms>`); overrides `/tick`.
    pub interval_ms: Option<u64>,
    /// Do not echo the result of `-c` (`-q`).
    pub quiet: bool,
    /// Debug logging (`-d`).
    pub debug: bool,
    /// Script files to run, in order.
    pub scripts: Vec<PathBuf>,
}

/// How to choose the user config file.
#[derive(Debug, Default)]
pub enum ConfigFile {
    /// Search the standard locations (default).
    #[default]
    Search,
    /// `-f` with no file argument: skip user config.
    Skip,
    /// `-f<file>`: load this specific file.
    Explicit(PathBuf),
}

pub const USAGE: &str =
    "Usage: scripter [-f[<file>]] [-c<script>] [-t<ticks>] [-i<ms>] [-qd] [<script>...]";

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or(&[]))
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // `--` ends flag processing.
        if arg == "--" {
            args.scripts.extend(argv[i + 1..].iter().map(PathBuf::from));
            break;
        }

        if !arg.starts_with('-') || arg == "-" {
            args.scripts.push(PathBuf::from(arg));
            i += 1;
            continue;
        }

        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'd' => args.debug = true,
                'q' => args.quiet = true,

                // -f[<file>]
                'f' => {
                    if j + 1 < chars.len() {
                        let file: String = chars[j + 1..].iter().collect();
                        args.config = ConfigFile::Explicit(PathBuf::from(file));
                        j = chars.len();
                    } else if i + 1 < argv.len() && !argv[i + 1].starts_with('-') {
                        i += 1;
                        args.config = ConfigFile::Explicit(PathBuf::from(&argv[i]));
                    } else {
                        args.config = ConfigFile::Skip;
                    }
                }

                'c' => {
                    let (value, next) = option_value(argv, i, &chars, j, "-c requires a script")?;
                    args.command = Some(value);
                    i = next;
                    j = chars.len();
                }

                't' => {
                    let (value, next) =
                        option_value(argv, i, &chars, j, "-t requires a tick count")?;
                    args.ticks = Some(parse_count(&value, "tick count")?);
                    i = next;
                    j = chars.len();
                }

                'i' => {
                    let (value, next) =
                        option_value(argv, i, &chars, j, "-i requires an interval")?;
                    args.interval_ms = Some(parse_count(&value, "interval")?);
                    i = next;
                    j = chars.len();
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    Ok(args)
}

/// The value of a value-taking flag: the rest of this argument, or the next
/// argument.  Returns the value and the index of the last argument consumed.
fn option_value(
    argv: &[String],
    i: usize,
    chars: &[char],
    j: usize,
    missing: &str,
) -> Result<(String, usize), String> {
    if j + 1 < chars.len() {
        Ok((chars[j + 1..].iter().collect(), i))
    } else if i + 1 < argv.len() {
        Ok((argv[i + 1].clone(), i + 1))
    } else {
        Err(missing.to_owned())
    }
}

fn parse_count(s: &str, what: &str) -> Result<u64, String> {
    s.parse().map_err(|_| format!("invalid {what}: {s}"))
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// Search for the user config file in the standard locations.
///
/// Order: `$SCRIPTER_CONFIG`, the platform config directory
/// (`scripter/scripterrc`), then `./.scripterrc`.  Returns the first path
/// that exists, or `None`.
pub fn find_user_config() -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Ok(p) = std::env::var("SCRIPTER_CONFIG") {
        candidates.push(PathBuf::from(p));
    }
    if let Some(dirs) = ProjectDirs::from("", "", "scripter") {
        candidates.push(dirs.config_dir().join("scripterrc"));
    }
    candidates.push(PathBuf::from("./.scripterrc"));
    candidates.into_iter().find(|p| p.exists())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
