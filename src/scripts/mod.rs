//! Result converters used by the analyzer plugins
//!
//! They run in-process from post-build hooks and are also reachable as
//! hidden subcommands for use on captures copied out by hand.

pub mod convert_clippy;
pub mod filter_infer;
pub mod find_unicode_control;

use anyhow::Result;
use clap::Args;
use filter_infer::FilterOptions;
use find_unicode_control::{CharSet, Scanner};
use std::io::{self, BufReader};
use std::path::PathBuf;

#[derive(Args, Debug, Clone, Default)]
pub struct FilterInferArgs {
    /// Only convert the report, do not filter anything
    #[arg(long)]
    pub only_transform: bool,

    #[arg(long)]
    pub no_biabduction: bool,

    #[arg(long)]
    pub no_inferbo: bool,

    #[arg(long)]
    pub no_uninit: bool,

    #[arg(long)]
    pub no_dead_store: bool,
}

impl FilterInferArgs {
    pub fn options(&self) -> FilterOptions {
        if self.only_transform {
            return FilterOptions::transform_only();
        }
        FilterOptions {
            biabduction: !self.no_biabduction,
            inferbo: !self.no_inferbo,
            uninit: !self.no_uninit,
            dead_store: !self.no_dead_store,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct FindUnicodeControlArgs {
    /// Sources to analyze
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Look for all non-printable characters or bidi controls only
    #[arg(short = 'p', long = "nonprint", value_enum)]
    pub nonprint: Option<CharSet>,

    /// Print per-file notes to stderr
    #[arg(short, long)]
    pub verbose: bool,

    /// Exclude tests (test.* as a component of path)
    #[arg(short = 't', long)]
    pub notests: bool,

    /// Additional path regex to skip (repeatable)
    #[arg(long = "exclude", value_name = "REGEX")]
    pub exclude: Vec<String>,

    /// Additional mime type regex to skip (repeatable)
    #[arg(long = "exclude-mime", value_name = "REGEX")]
    pub exclude_mime: Vec<String>,
}

/// `convert-clippy`: stdin to stdout.
pub fn run_convert_clippy() -> Result<i32> {
    let stdin = io::stdin();
    convert_clippy::convert(stdin.lock(), io::stdout().lock())?;
    Ok(0)
}

/// `filter-infer`: stdin to stdout.
pub fn run_filter_infer(args: &FilterInferArgs) -> Result<i32> {
    let stdin = io::stdin();
    filter_infer::filter(BufReader::new(stdin.lock()), io::stdout().lock(), args.options())?;
    Ok(0)
}

/// `find-unicode-control`: findings go to stdout, the exit code stays 0.
pub fn run_find_unicode_control(args: &FindUnicodeControlArgs) -> Result<i32> {
    let scanner = Scanner::new(
        args.nonprint.unwrap_or_default(),
        args.notests,
        &args.exclude,
        &args.exclude_mime,
    )?;

    let mut out = io::stdout().lock();
    for path in &args.paths {
        if args.verbose {
            scanner.scan(path, path, &mut out, &mut io::stderr().lock())?;
        } else {
            scanner.scan(path, path, &mut out, &mut io::sink())?;
        }
    }
    Ok(0)
}
