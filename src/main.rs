use csmock::cli::commands::{CliArgs, Commands};
use csmock::cli::handlers::{handle_list_tools, handle_scan};
use csmock::scripts::{run_convert_clippy, run_filter_infer, run_find_unicode_control};
use csmock::util::logging::{init_logging, parse_level, LoggingConfig};
use csmock::{exit_code_of, VERSION};

use clap::Parser;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("csmock v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let result = match &args.command {
        Commands::Scan(scan_args) => handle_scan(scan_args).await,
        Commands::ListTools(list_args) => handle_list_tools(list_args),
        Commands::ConvertClippy => run_convert_clippy(),
        Commands::FilterInfer(filter_args) => run_filter_infer(filter_args),
        Commands::FindUnicodeControl(find_args) => run_find_unicode_control(find_args),
    };

    let exit_code = match result {
        Ok(ec) => ec,
        Err(e) => {
            eprintln!("csmock: error: {:#}", e);
            exit_code_of(&e)
        }
    };
    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let mut config = LoggingConfig::from_env();
    if let Some(level_str) = &args.log_level {
        config.level = parse_level(level_str);
    } else if args.verbose {
        config.level = Level::DEBUG;
    } else if args.quiet {
        config.level = Level::ERROR;
    }
    init_logging(config);
}
