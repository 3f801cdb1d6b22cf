//! Plugin registry

use super::{
    BanditArgs, BanditPlugin, CbmcArgs, CbmcPlugin, ClangArgs, ClangPlugin, ClippyPlugin,
    CppcheckArgs, CppcheckPlugin, DivineArgs, DivinePlugin, GccArgs, GccPlugin, GitleaksArgs,
    GitleaksPlugin, InferArgs, InferPlugin, Plugin, PluginContext, PylintArgs, PylintPlugin,
    SemgrepArgs, SemgrepPlugin, ShellcheckArgs, ShellcheckPlugin, SmatchPlugin, SnykArgs,
    SnykPlugin, Stability, StraceArgs, StracePlugin, SymbioticArgs, SymbioticPlugin,
    UnicontrolArgs, UnicontrolPlugin, ValgrindArgs, ValgrindPlugin,
};
use crate::config::CsmockConfig;
use crate::error::ScanError;
use crate::host::HostEnv;
use crate::pipeline::ordering::order_plugins;
use crate::props::ScanProps;
use clap::Args;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Tools enabled when neither `--tools` nor `--all-tools` is given.
pub const DEFAULT_TOOLS: &[&str] = &["clang", "cppcheck", "gcc"];

/// Options of every plugin, flattened into the `scan` command.
#[derive(Args, Debug, Clone, Default)]
pub struct PluginArgs {
    #[command(flatten)]
    pub gcc: GccArgs,
    #[command(flatten)]
    pub clang: ClangArgs,
    #[command(flatten)]
    pub cppcheck: CppcheckArgs,
    #[command(flatten)]
    pub shellcheck: ShellcheckArgs,
    #[command(flatten)]
    pub pylint: PylintArgs,
    #[command(flatten)]
    pub bandit: BanditArgs,
    #[command(flatten)]
    pub unicontrol: UnicontrolArgs,
    #[command(flatten)]
    pub infer: InferArgs,
    #[command(flatten)]
    pub valgrind: ValgrindArgs,
    #[command(flatten)]
    pub strace: StraceArgs,
    #[command(flatten)]
    pub divine: DivineArgs,
    #[command(flatten)]
    pub symbiotic: SymbioticArgs,
    #[command(flatten)]
    pub cbmc: CbmcArgs,
    #[command(flatten)]
    pub gitleaks: GitleaksArgs,
    #[command(flatten)]
    pub semgrep: SemgrepArgs,
    #[command(flatten)]
    pub snyk: SnykArgs,
}

/// Which plugins the user asked for.
#[derive(Debug, Clone, Default)]
pub struct ToolSelection {
    /// `--tools`, `None` when not given.
    pub tools: Option<Vec<String>>,
    /// `--all-tools`
    pub all_tools: bool,
}

pub struct PluginRegistry {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    /// All plugins with their default options.
    pub fn with_defaults() -> Self {
        Self::from_args(&PluginArgs::default())
    }

    pub fn from_args(args: &PluginArgs) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(GccPlugin::new(args.gcc.clone())));
        registry.register(Box::new(ClangPlugin::new(args.clang.clone())));
        registry.register(Box::new(CppcheckPlugin::new(args.cppcheck.clone())));
        registry.register(Box::new(SmatchPlugin));
        registry.register(Box::new(ShellcheckPlugin::new(args.shellcheck.clone())));
        registry.register(Box::new(PylintPlugin::new(args.pylint.clone())));
        registry.register(Box::new(BanditPlugin::new(args.bandit.clone())));
        registry.register(Box::new(ClippyPlugin));
        registry.register(Box::new(UnicontrolPlugin::new(args.unicontrol.clone())));
        registry.register(Box::new(InferPlugin::new(args.infer.clone())));
        registry.register(Box::new(ValgrindPlugin::new(args.valgrind.clone())));
        registry.register(Box::new(StracePlugin::new(args.strace.clone())));
        registry.register(Box::new(DivinePlugin::new(args.divine.clone())));
        registry.register(Box::new(SymbioticPlugin::new(args.symbiotic.clone())));
        registry.register(Box::new(CbmcPlugin::new(args.cbmc.clone())));
        registry.register(Box::new(GitleaksPlugin::new(args.gitleaks.clone())));
        registry.register(Box::new(SemgrepPlugin::new(args.semgrep.clone())));
        registry.register(Box::new(SnykPlugin::new(args.snyk.clone())));
        registry
    }

    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn plugins(&self) -> Vec<&dyn Plugin> {
        self.plugins.iter().map(|p| p.as_ref()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&dyn Plugin> {
        self.plugins
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
    }

    /// Names of the plugins to run, validating `--tools`.
    pub fn enabled(&self, selection: &ToolSelection) -> Result<BTreeSet<&'static str>, ScanError> {
        let mut enabled = BTreeSet::new();

        match &selection.tools {
            Some(tools) => {
                for tool in tools.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
                    let plugin = self.get(tool).ok_or_else(|| {
                        ScanError::usage(format!(
                            "unknown tool: {} (use 'csmock list-tools' to see the available tools)",
                            tool
                        ))
                    })?;
                    enabled.insert(plugin.name());
                }
            }
            None if !selection.all_tools => {
                enabled.extend(DEFAULT_TOOLS.iter().filter_map(|t| self.get(t)).map(|p| p.name()));
            }
            None => {}
        }

        for plugin in &self.plugins {
            if selection.all_tools && plugin.stability() == Stability::Stable {
                enabled.insert(plugin.name());
            }
            if plugin.auto_enabled() {
                debug!(plugin = plugin.name(), "Enabled by its options");
                enabled.insert(plugin.name());
            }
        }
        Ok(enabled)
    }

    /// Lets every plugin edit `props`, in dependency order.
    ///
    /// Returns the names of the enabled plugins in the order they were
    /// configured.
    pub fn configure(
        &self,
        selection: &ToolSelection,
        props: &mut ScanProps,
        host: &dyn HostEnv,
        config: &CsmockConfig,
    ) -> Result<Vec<&'static str>, ScanError> {
        let enabled = self.enabled(selection)?;
        let ordered = order_plugins(&self.plugins())?;

        let mut cx = PluginContext {
            props,
            host,
            config,
            all_tools: selection.all_tools,
        };

        let mut configured = Vec::with_capacity(enabled.len());
        for plugin in ordered {
            if enabled.contains(plugin.name()) {
                debug!(plugin = plugin.name(), "Configuring plugin");
                plugin.configure(&mut cx)?;
                configured.push(plugin.name());
            } else {
                plugin.configure_disabled(&mut cx)?;
            }
        }

        info!(plugins = %configured.join(","), "Plugins configured");
        Ok(configured)
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::testing::{test_config, wrapper_host};
    use clap::{CommandFactory, Parser};

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        plugins: PluginArgs,
    }

    fn select(tools: Option<&[&str]>, all_tools: bool) -> ToolSelection {
        ToolSelection {
            tools: tools.map(|t| t.iter().map(|s| s.to_string()).collect()),
            all_tools,
        }
    }

    #[test]
    fn test_plugin_args_are_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_registry_with_defaults() {
        let registry = PluginRegistry::with_defaults();
        assert_eq!(registry.plugins().len(), 18);
        assert!(registry.get("snyk").is_some());
        assert!(registry.get("coverity").is_none());
    }

    #[test]
    fn test_enabled_default_tools() {
        let registry = PluginRegistry::with_defaults();
        let enabled = registry.enabled(&select(None, false)).unwrap();
        assert_eq!(enabled.into_iter().collect::<Vec<_>>(), vec!["clang", "cppcheck", "gcc"]);
    }

    #[test]
    fn test_enabled_explicit_and_unknown() {
        let registry = PluginRegistry::with_defaults();
        let enabled = registry.enabled(&select(Some(&["shellcheck", " pylint"]), false)).unwrap();
        assert_eq!(enabled.into_iter().collect::<Vec<_>>(), vec!["pylint", "shellcheck"]);

        let err = registry.enabled(&select(Some(&["gcc", "lint"]), false)).unwrap_err();
        assert!(matches!(err, ScanError::Usage(ref msg) if msg.contains("unknown tool: lint")));
    }

    #[test]
    fn test_enabled_all_tools_stable_only() {
        let registry = PluginRegistry::with_defaults();
        let enabled = registry.enabled(&select(None, true)).unwrap();
        for plugin in registry.plugins() {
            assert_eq!(
                enabled.contains(plugin.name()),
                plugin.stability() == Stability::Stable,
                "{}",
                plugin.name()
            );
        }
    }

    #[test]
    fn test_enabled_by_options() {
        let cli = Cli::parse_from(["csmock", "--use-host-cppcheck", "--gcc-analyze"]);
        let registry = PluginRegistry::from_args(&cli.plugins);
        let enabled = registry.enabled(&select(Some(&["pylint"]), false)).unwrap();
        assert_eq!(enabled.into_iter().collect::<Vec<_>>(), vec!["cppcheck", "gcc", "pylint"]);
    }

    #[test]
    fn test_configure_in_order() {
        let registry = PluginRegistry::with_defaults();
        let mut props = ScanProps::new(30);
        let configured = registry
            .configure(
                &select(Some(&["shellcheck", "cppcheck", "gcc"]), false),
                &mut props,
                &wrapper_host(),
                &test_config(),
            )
            .unwrap();
        assert_eq!(configured, vec!["gcc", "cppcheck", "shellcheck"]);
        assert!(props.installs("ShellCheck"));
        assert!(props.cswrap_enabled);
    }
}
