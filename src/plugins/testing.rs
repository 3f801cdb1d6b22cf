//! Fixtures for plugin configuration tests

use super::{Plugin, PluginContext};
use crate::config::CsmockConfig;
use crate::error::ScanError;
use crate::host::MockHost;
use crate::props::ScanProps;

const SCRIPTS: &[&str] = &[
    "run-shellcheck.sh",
    "run-pylint.sh",
    "run-bandit.sh",
    "inject-clippy.sh",
    "install-infer.sh",
];

/// A host with every compiler wrapper and helper script installed.
pub fn wrapper_host() -> MockHost {
    let host = MockHost::new().with_home("/home/user");
    for wrapper in ["cswrap", "csclng", "cscppc", "csmatch", "csgcca"] {
        host.add_command(&[wrapper, "--print-path-to-wrap"], &format!("/usr/lib64/{}", wrapper));
    }
    host.add_command(&["/usr/bin/csgcca", "--print-path-to-wrap"], "/usr/lib64/csgcca");
    for script in SCRIPTS {
        host.add_file(format!("/usr/share/csmock/scripts/{}", script), "#!/bin/bash\n");
    }
    host
}

pub fn test_config() -> CsmockConfig {
    CsmockConfig {
        scripts_dir: "/usr/share/csmock/scripts".into(),
        cache_dir: "/var/tmp/csmock".into(),
        ..CsmockConfig::default()
    }
}

pub fn configure_with(
    plugin: &dyn Plugin,
    host: &MockHost,
    props: &mut ScanProps,
) -> Result<(), ScanError> {
    let config = test_config();
    let mut cx = PluginContext {
        props,
        host,
        config: &config,
        all_tools: false,
    };
    plugin.configure(&mut cx)
}

/// Configures `plugin` against [`wrapper_host`] and returns the result.
pub fn configure(plugin: &dyn Plugin) -> Result<ScanProps, ScanError> {
    let mut props = ScanProps::new(30);
    configure_with(plugin, &wrapper_host(), &mut props)?;
    Ok(props)
}
