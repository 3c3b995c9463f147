//! Host driver: owns an [`Interpreter`], loads startup scripts and pumps the
//! tick phases.
//!
//! ```text
//!   ┌──────────────────────────┐
//!   │  tokio::select! over:    │
//!   │   • tick interval        │──► run_tick(Update)
//!   │   • Ctrl-C               │    run_tick(FixedUpdate) × due steps
//!   └──────────────────────────┘
//! ```
//!
//! Script output is flushed to stdout after every step; script errors go to
//! stderr and never stop the loop.

use std::path::Path;
use std::time::{Duration, Instant};

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::Config;
use crate::script::expr::Expr;
use crate::script::stmt::Stmt;
use crate::script::{Interpreter, ScriptError, Value};
use crate::tick::{FixedStep, TickPhase};

/// Failure to load a startup script.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Script {
        path: String,
        #[source]
        source: ScriptError,
    },
}

pub struct Host {
    pub interp: Interpreter,
    fixed: FixedStep,
    /// Write script output to stdout on flush.
    pub echo: bool,
}

impl Host {
    /// A host with the default builtins and the settings of `config`.
    pub fn new(config: &Config) -> Self {
        let mut interp = Interpreter::new();
        interp.bind_global("version", Value::from(env!("CARGO_PKG_VERSION")));
        for (name, value) in &config.globals {
            interp.bind_global(name, value.clone());
        }
        Host {
            interp,
            fixed: FixedStep::new(config.tick),
            echo: true,
        }
    }

    /// The host frame period; also the fixed-step length.
    pub fn tick_interval(&self) -> Duration {
        self.fixed.step()
    }

    /// Read and run one script file.
    pub fn load_script_file(&mut self, path: &Path) -> Result<Value, LoadError> {
        let shown = path.display().to_string();
        let src = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: shown.clone(),
            source,
        })?;
        debug!(path = %shown, "loading script");
        let result = self
            .interp
            .exec_script(&src)
            .map_err(|source| LoadError::Script { path: shown, source });
        self.flush();
        result
    }

    /// Run an inline script.  The value of a trailing expression statement
    /// is the result, echoed unless `quiet` or empty.
    pub fn run_command(&mut self, src: &str, quiet: bool) -> Result<Value, ScriptError> {
        let mut program = self.interp.parse(src)?;
        if let Some(last) = program.stmts.last_mut() {
            if let Stmt::Expr(e) = last {
                let e = std::mem::replace(e, Expr::Literal(Value::Empty));
                *last = Stmt::Return(Some(e));
            }
        }
        let result = self.interp.run(&program);
        self.flush();
        if let Ok(value) = &result {
            if !quiet && !value.is_empty() {
                self.emit(value.to_string());
            }
        }
        result
    }

    /// One host frame: `Update` once, then `FixedUpdate` for every fixed step
    /// that `elapsed` makes due.  Returns the callback errors of the frame.
    pub fn step(&mut self, elapsed: Duration) -> Vec<ScriptError> {
        let mut errors = self.interp.run_tick(TickPhase::Update);
        for _ in 0..self.fixed.advance(elapsed) {
            errors.extend(self.interp.run_tick(TickPhase::FixedUpdate));
        }
        self.flush();
        errors
    }

    /// Drive ticks until `ticks` frames have run (`None`: until Ctrl-C).
    pub async fn run(&mut self, ticks: Option<u64>) {
        if self.interp.ticks.is_empty() {
            debug!("no tick callbacks registered, not entering the loop");
            return;
        }
        let mut timer = interval(self.tick_interval());
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first interval tick completes immediately.
        timer.tick().await;
        let mut last = Instant::now();
        let mut frames: u64 = 0;

        loop {
            if ticks.is_some_and(|n| frames >= n) {
                break;
            }
            tokio::select! {
                _ = timer.tick() => {
                    let now = Instant::now();
                    let elapsed = now - last;
                    last = now;
                    for e in self.step(elapsed) {
                        eprintln!("scripter: {e}");
                    }
                    frames += 1;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!(frames, "interrupted");
                    break;
                }
            }
        }
    }

    /// Take pending script output, writing it to stdout when echoing.
    pub fn flush(&mut self) -> Vec<String> {
        let lines = self.interp.take_output();
        if self.echo {
            for line in &lines {
                println!("{line}");
            }
        }
        lines
    }

    fn emit(&self, line: String) {
        if self.echo {
            println!("{line}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn host() -> Host {
        let mut h = Host::new(&Config::new());
        h.echo = false;
        h
    }

    #[test]
    fn config_globals_are_bound() {
        let (cfg, _) = Config::load_str("/set lives=3\n/set name=bob");
        let mut h = Host::new(&cfg);
        h.echo = false;
        assert_eq!(h.interp.eval_expr("lives + 1").unwrap(), Value::Number(4.0));
        assert_eq!(h.interp.eval_expr("name").unwrap(), Value::from("bob"));
        assert!(h.interp.get_global("version").is_some());
    }

    #[test]
    fn step_runs_update_then_due_fixed_steps() {
        let mut h = host();
        h.run_command(
            "u = 0; f = 0\n\
             onUpdate(function () { u += 1 })\n\
             onFixedUpdate(function () { f += 1 })",
            true,
        )
        .unwrap();
        let tick = h.tick_interval();
        assert!(h.step(tick * 3).is_empty());
        assert_eq!(h.interp.get_global("u"), Some(Value::Number(1.0)));
        assert_eq!(h.interp.get_global("f"), Some(Value::Number(3.0)));
    }

    #[test]
    fn run_command_result_is_trailing_expression() {
        let mut h = host();
        assert_eq!(h.run_command("x = 2\nx * 21", true).unwrap(), Value::Number(42.0));
        assert_eq!(h.run_command("print(1)\nvar y = 3", true).unwrap(), Value::Empty);
        assert_eq!(h.flush(), Vec::<String>::new());
    }

    #[test]
    fn callback_can_remove_itself() {
        let mut h = host();
        h.run_command(
            "n = 0\n\
             id = onUpdate(function () { n++; if (n == 2) { offUpdate(id) } })",
            true,
        )
        .unwrap();
        for _ in 0..4 {
            assert!(h.step(Duration::ZERO).is_empty());
        }
        assert_eq!(h.interp.get_global("n"), Some(Value::Number(2.0)));
        assert!(h.interp.ticks.is_empty());
    }

    #[test]
    fn zero_tick_is_clamped() {
        let mut cfg = Config::new();
        cfg.tick = Duration::ZERO;
        assert_eq!(Host::new(&cfg).tick_interval(), Duration::from_millis(1));
    }

    #[test]
    fn step_collects_callback_errors() {
        let mut h = host();
        h.run_command("onUpdate(function () { nope() })", true).unwrap();
        assert_eq!(h.step(Duration::ZERO).len(), 1);
    }

    #[test]
    fn load_script_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.sc");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "x = ").unwrap();

        let mut h = host();
        let err = h.load_script_file(&path).unwrap_err();
        assert!(matches!(err, LoadError::Script { .. }));
        assert!(err.to_string().starts_with(&path.display().to_string()));

        let missing = h.load_script_file(&dir.path().join("missing.sc")).unwrap_err();
        assert!(matches!(missing, LoadError::Io { .. }));
    }

    #[test]
    fn load_script_file_runs_script() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("init.sc");
        std::fs::write(&path, "print('ready')\nscore = 10\n").unwrap();

        let mut h = host();
        h.load_script_file(&path).unwrap();
        assert_eq!(h.interp.get_global("score"), Some(Value::Number(10.0)));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn run_stops_after_tick_count() {
        let (cfg, _) = Config::load_str("/tick 1");
        let mut h = Host::new(&cfg);
        h.echo = false;
        h.run_command("n = 0; onUpdate(function () { n++ })", true).unwrap();
        h.run(Some(3)).await;
        assert_eq!(h.interp.get_global("n"), Some(Value::Number(3.0)));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn run_returns_without_callbacks() {
        let mut h = host();
        h.run(None).await;
    }
}
