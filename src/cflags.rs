//! Compiler flags that cswrap adds to or removes from gcc/clang invocations.

use crate::props::Env;
use crate::util::shell::serialize_flags;
use clap::Args;

const DEL_FLAGS_BY_LEVEL_COMMON: &[(u8, &[&str])] = &[(
    0,
    &[
        "-Werror*",
        "-fdiagnostics-color*",
        "-no-canonical-prefixes",
        "-Wno-error=deprecated-register",
    ],
)];

const ADD_FLAGS_BY_LEVEL_COMMON: &[(u8, &[&str])] = &[
    (1, &["-Wall", "-Wextra"]),
    (
        2,
        &[
            "-Wunreachable-code",
            "-Wundef",
            "-Wcast-align",
            "-Wpointer-arith",
            "-Wfloat-equal",
            "-Wshadow",
            "-Wwrite-strings",
            "-Wformat=2",
        ],
    ),
];

const ADD_FLAGS_BY_LEVEL_C_ONLY: &[(u8, &[&str])] =
    &[(0, &["-Wno-unknown-pragmas"]), (2, &["-Wstrict-prototypes"])];

const ADD_FLAGS_BY_LEVEL_CXX_ONLY: &[(u8, &[&str])] =
    &[(2, &["-Wctor-dtor-privacy", "-Woverloaded-virtual"])];

pub const ENV_ADD_CFLAGS: &str = "CSWRAP_ADD_CFLAGS";
pub const ENV_DEL_CFLAGS: &str = "CSWRAP_DEL_CFLAGS";
pub const ENV_ADD_CXXFLAGS: &str = "CSWRAP_ADD_CXXFLAGS";
pub const ENV_DEL_CXXFLAGS: &str = "CSWRAP_DEL_CXXFLAGS";

/// Compiler flags given explicitly on the command line.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomFlagArgs {
    /// Append the given compiler flag when invoking gcc (can be used multiple times)
    #[arg(long = "gcc-add-flag", value_name = "FLAG", allow_hyphen_values = true)]
    pub add: Vec<String>,

    /// Append the given compiler flag when invoking gcc for C (can be used multiple times)
    #[arg(long = "gcc-add-c-only-flag", value_name = "FLAG", allow_hyphen_values = true)]
    pub add_c_only: Vec<String>,

    /// Append the given compiler flag when invoking gcc for C++ (can be used multiple times)
    #[arg(long = "gcc-add-cxx-only-flag", value_name = "FLAG", allow_hyphen_values = true)]
    pub add_cxx_only: Vec<String>,

    /// Drop the given compiler flag when invoking gcc (can be used multiple times)
    #[arg(long = "gcc-del-flag", value_name = "FLAG", allow_hyphen_values = true)]
    pub del: Vec<String>,
}

impl CustomFlagArgs {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty()
            && self.add_c_only.is_empty()
            && self.add_cxx_only.is_empty()
            && self.del.is_empty()
    }

    /// Re-encodes the flags as command-line options.
    pub fn encode(&self) -> String {
        let groups: [(&str, &Vec<String>); 4] = [
            ("--gcc-add-flag", &self.add),
            ("--gcc-add-c-only-flag", &self.add_c_only),
            ("--gcc-add-cxx-only-flag", &self.add_cxx_only),
            ("--gcc-del-flag", &self.del),
        ];

        groups
            .iter()
            .flat_map(|(opt, flags)| flags.iter().map(move |f| format!(" {}='{}'", opt, f)))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagMatrix {
    pub add_cflags: Vec<String>,
    pub del_cflags: Vec<String>,
    pub add_cxxflags: Vec<String>,
    pub del_cxxflags: Vec<String>,
}

fn extend(dst: &mut Vec<String>, flags: &[&str]) {
    dst.extend(flags.iter().map(|f| f.to_string()));
}

fn flags_at(table: &[(u8, &'static [&'static str])], level: u8) -> &'static [&'static str] {
    table
        .iter()
        .find(|(l, _)| *l == level)
        .map(|(_, flags)| *flags)
        .unwrap_or(&[])
}

impl FlagMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags for the given warning level, including all lower levels.
    pub fn by_warning_level(level: u8) -> Self {
        let mut flags = Self::new();
        for l in 0..=level {
            let del = flags_at(DEL_FLAGS_BY_LEVEL_COMMON, l);
            extend(&mut flags.del_cflags, del);
            extend(&mut flags.del_cxxflags, del);

            let add = flags_at(ADD_FLAGS_BY_LEVEL_COMMON, l);
            extend(&mut flags.add_cflags, add);
            extend(&mut flags.add_cxxflags, add);

            extend(&mut flags.add_cflags, flags_at(ADD_FLAGS_BY_LEVEL_C_ONLY, l));
            extend(&mut flags.add_cxxflags, flags_at(ADD_FLAGS_BY_LEVEL_CXX_ONLY, l));
        }
        flags
    }

    pub fn append_flags<S: AsRef<str>>(&mut self, flags: &[S]) {
        for f in flags {
            self.add_cflags.push(f.as_ref().to_string());
            self.add_cxxflags.push(f.as_ref().to_string());
        }
    }

    pub fn remove_flags<S: AsRef<str>>(&mut self, flags: &[S]) {
        for f in flags {
            self.del_cflags.push(f.as_ref().to_string());
            self.del_cxxflags.push(f.as_ref().to_string());
        }
    }

    /// Merges the flags given on the command line. Returns true if there were any.
    pub fn append_custom_flags(&mut self, custom: &CustomFlagArgs) -> bool {
        self.add_cflags.extend(custom.add.iter().cloned());
        self.add_cflags.extend(custom.add_c_only.iter().cloned());

        self.add_cxxflags.extend(custom.add.iter().cloned());
        self.add_cxxflags.extend(custom.add_cxx_only.iter().cloned());

        self.del_cflags.extend(custom.del.iter().cloned());
        self.del_cxxflags.extend(custom.del.iter().cloned());

        !custom.is_empty()
    }

    /// Stores the matrix in the cswrap environment variables.
    ///
    /// Values already present (written by another plugin) are kept and the
    /// new flags are appended to them, skipping duplicates.
    pub fn write_to_env(&self, env: &mut Env) {
        for (var, flags) in [
            (ENV_ADD_CFLAGS, &self.add_cflags),
            (ENV_DEL_CFLAGS, &self.del_cflags),
            (ENV_ADD_CXXFLAGS, &self.add_cxxflags),
            (ENV_DEL_CXXFLAGS, &self.del_cxxflags),
        ] {
            let mut merged: Vec<String> = env
                .get(var)
                .map(|v| {
                    v.split(':')
                        .filter(|f| !f.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            for f in flags {
                if !merged.contains(f) {
                    merged.push(f.clone());
                }
            }
            env.insert(var.to_string(), serialize_flags(&merged, ":"));
        }
    }
}
