//! Subcommand handlers, each returning the process exit code

use super::commands::{ListToolsArgs, ScanArgs};
use super::output::{OutputFormatter, ToolInfo};
use crate::config::CsmockConfig;
use crate::error::ScanError;
use crate::host::{HostEnv, RealHost};
use crate::mock::MockWrapper;
use crate::pipeline::orchestrator::{nvr_from_srpm, pkg_from_srpm};
use crate::pipeline::ScanPipeline;
use crate::plugins::{PluginRegistry, ToolSelection};
use crate::progress::{LoggingHandler, ProgressEvent, ProgressHandler};
use crate::props::ScanProps;
use crate::results::{ScanResults, ScanResultsOptions, SignalState};
use crate::VERSION;
use anyhow::Result;
use std::path::PathBuf;
use tracing::{debug, error};

/// Settings from the environment with the `scan` overrides applied.
pub fn scan_config(args: &ScanArgs) -> Result<CsmockConfig, ScanError> {
    let mut config = CsmockConfig::default();
    if let Some(profile) = &args.mock_profile {
        config.mock_profile = profile.clone();
    }
    if let Some(timeout) = args.cswrap_timeout {
        config.cswrap_timeout_secs = timeout;
    }
    config
        .validate()
        .map_err(|e| ScanError::usage(e.to_string()))?;
    Ok(config)
}

/// Scan properties set directly by the command line, before plugins run.
pub fn initial_props(args: &ScanArgs, config: &CsmockConfig) -> Result<ScanProps, ScanError> {
    if !args.srpm.is_file() {
        return Err(ScanError::usage(format!(
            "SRPM not found: {}",
            args.srpm.display()
        )));
    }
    let pkg = pkg_from_srpm(&args.srpm).ok_or_else(|| {
        ScanError::usage(format!("not a source RPM: {}", args.srpm.display()))
    })?;

    let mut props = ScanProps::new(config.cswrap_timeout_secs);
    props.srpm = Some(std::path::absolute(&args.srpm)?);
    props.pkg = Some(pkg);
    props.shell_cmd_to_build = args.shell_cmd.clone();
    props.install_pkgs.extend(args.install_pkgs());
    props.add_repos.extend(args.add_repos.iter().cloned());
    props.known_false_positives = args.known_false_positives.clone();
    props.print_defects = args.print_defects;
    Ok(props)
}

/// Configures the selected plugins and reports them in configuration order.
pub fn configure_plugins(
    registry: &PluginRegistry,
    selection: &ToolSelection,
    props: &mut ScanProps,
    host: &dyn HostEnv,
    config: &CsmockConfig,
    progress: &dyn ProgressHandler,
) -> Result<Vec<&'static str>, ScanError> {
    let enabled = registry.configure(selection, props, host, config)?;
    progress.on_progress(&ProgressEvent::PluginsConfigured {
        plugins: enabled.iter().map(|name| name.to_string()).collect(),
    });
    Ok(enabled)
}

pub async fn handle_scan(args: &ScanArgs) -> Result<i32> {
    let config = scan_config(args)?;
    debug!("Configuration:\n{}", config);

    let mut props = initial_props(args, &config)?;
    let registry = PluginRegistry::from_args(&args.plugins);
    let selection = ToolSelection {
        tools: args.tools.clone(),
        all_tools: args.all_tools,
    };
    let enabled = configure_plugins(
        &registry,
        &selection,
        &mut props,
        &RealHost::new(),
        &config,
        &LoggingHandler,
    )?;

    let output = match &args.output {
        Some(output) => output.clone(),
        None => {
            let nvr = nvr_from_srpm(&args.srpm).unwrap_or_else(|| "csmock".to_string());
            PathBuf::from(format!("{}.tar.xz", nvr))
        }
    };
    let mut opts = ScanResultsOptions::new(output, "csmock", VERSION);
    opts.keep_going = args.keep_going;
    opts.no_clean = args.no_clean;

    let signals = SignalState::new();
    signals.listen()?;
    let mut results = ScanResults::create(opts, signals)?;
    results.ini_append("enabled-plugins", enabled.join(", "))?;

    let mut mock = MockWrapper::new(&config.mock_bin, &config.mock_profile, &props.add_repos);
    let pipeline = ScanPipeline::new(&config, Some(Box::new(LoggingHandler)))
        .with_no_clean(args.no_clean);

    if let Err(e) = pipeline.execute(&mut results, &mut props, &mut mock).await {
        let fatal = e
            .downcast_ref::<ScanError>()
            .is_some_and(ScanError::is_fatal);
        if !fatal {
            error!("{:#}", e);
            let _ = results.fatal_error(&format!("{:#}", e), 1);
        }
    }

    Ok(results.finish().await?)
}

pub fn handle_list_tools(args: &ListToolsArgs) -> Result<i32> {
    let registry = PluginRegistry::with_defaults();
    let mut tools: Vec<ToolInfo> = registry
        .plugins()
        .into_iter()
        .map(ToolInfo::from_plugin)
        .collect();
    tools.sort_by_key(|t| t.name);

    let formatter = OutputFormatter::new(args.format.into());
    print!("{}", formatter.format_tools(&tools)?);
    if matches!(args.format, super::commands::OutputFormatArg::Json) {
        println!();
    }
    Ok(0)
}
