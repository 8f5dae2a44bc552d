//! Agent settings: CLI flags first, then `DIAGSCOPE_AGENT_*` env, then defaults.

use std::path::PathBuf;

use diagscope::EngineConfig;

pub const DEFAULT_PORT: u16 = 5408;

const USAGE: &str = "[--port PORT|-p PORT] [--span SECONDS] [--workers N] PATH...";

/// Why parsing stopped: an explicit help request, or arguments that cannot run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgsError {
    Help(String),
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub port: u16,
    pub span: u32,
    pub workers: Option<usize>,
    pub paths: Vec<PathBuf>,
}

impl AgentConfig {
    /// `env` looks up a variable by name; `main` passes `std::env::var`.
    pub fn parse<I, E>(args: I, env: E) -> Result<Self, ArgsError>
    where
        I: IntoIterator<Item = String>,
        E: Fn(&str) -> Option<String>,
    {
        let mut it = args.into_iter();
        let prog = it.next().unwrap_or_else(|| "diagscope_agent".into());
        let mut port: Option<String> = None;
        let mut span: Option<String> = None;
        let mut workers: Option<String> = None;
        let mut paths = Vec::new();

        while let Some(arg) = it.next() {
            match arg.as_str() {
                "-h" | "--help" => return Err(ArgsError::Help(format!("Usage: {prog} {USAGE}"))),
                "--port" | "-p" => port = it.next(),
                "--span" => span = it.next(),
                "--workers" => workers = it.next(),
                _ if arg.starts_with("--port=") => port = value_of(&arg),
                _ if arg.starts_with("--span=") => span = value_of(&arg),
                _ if arg.starts_with("--workers=") => workers = value_of(&arg),
                _ if arg.starts_with('-') => {
                    return Err(ArgsError::Invalid(format!(
                        "Unknown flag {arg}. Usage: {prog} {USAGE}"
                    )));
                }
                _ => paths.push(PathBuf::from(arg)),
            }
        }
        if paths.is_empty() {
            return Err(ArgsError::Invalid(format!(
                "No input paths. Usage: {prog} {USAGE}"
            )));
        }

        let port = port
            .or_else(|| env("DIAGSCOPE_AGENT_PORT"))
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);
        let span = span
            .or_else(|| env("DIAGSCOPE_AGENT_SPAN"))
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(1)
            .max(1);
        // 0 or unparsable means auto
        let workers = workers
            .or_else(|| env("DIAGSCOPE_AGENT_WORKERS"))
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|n| *n > 0);

        Ok(Self {
            port,
            span,
            workers,
            paths,
        })
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            workers: self.workers,
            ..EngineConfig::default()
        }
        .with_span(self.span)
    }
}

fn value_of(arg: &str) -> Option<String> {
    arg.split_once('=')
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty())
}
