//! Toolchain profiles for RISC-V cross-compilation
//!
//! A profile is the resolved flag set, target triple, compiler binary and
//! container image/instance for one `method`. Two built-in profiles exist:
//! bare-metal (the default for any unrecognized method) and linux-hosted.
//! They differ only in triple, ABI, threading support, compiler name and
//! image/instance; optimization and hardening are shared.

use serde::{Deserialize, Serialize};

/// Optimization levels gcc accepts after `-O`
const OPT_LEVELS: &[&str] = &["0", "1", "2", "3", "s", "z", "g", "fast"];

/// Target method discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Freestanding `riscv32-unknown-elf` target
    BareMetal,
    /// Hosted `riscv32-unknown-linux-gnu` target
    Linux,
}

impl Method {
    /// Resolve a `method` value
    ///
    /// Only "linux" selects the hosted target. Anything else, including no
    /// value at all, is bare-metal.
    pub fn from_discriminant(value: Option<&str>) -> Self {
        match value {
            Some("linux") => Method::Linux,
            _ => Method::BareMetal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::BareMetal => "bare_metal",
            Method::Linux => "linux",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Linkage mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Linkage {
    Static,
    Dynamic,
}

/// What happens to the symbol table at link time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StripPolicy {
    /// `-Wl,-s`: drop all symbols
    #[serde(rename = "all")]
    StripAll,
    /// `-Wl,--retain-symbols-file=...`: keep only the allow-listed symbols
    #[serde(rename = "retain")]
    RetainListed,
    /// Leave the symbol table alone
    #[serde(rename = "none")]
    KeepAll,
}

impl std::str::FromStr for StripPolicy {
    type Err = ToolchainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(StripPolicy::StripAll),
            "retain" => Ok(StripPolicy::RetainListed),
            "none" => Ok(StripPolicy::KeepAll),
            other => Err(ToolchainError::UnknownStripPolicy(other.to_string())),
        }
    }
}

/// Named linker workarounds, all off by default
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkerQuirks {
    /// Symbols forced into the link with `--undefined`, for C libraries that
    /// otherwise drop them from a static link
    #[serde(default)]
    pub force_undefined: Vec<String>,
}

impl LinkerQuirks {
    pub fn is_empty(&self) -> bool {
        self.force_undefined.is_empty()
    }

    /// Linker arguments for the enabled quirks
    pub fn linker_args(&self) -> Vec<String> {
        self.force_undefined
            .iter()
            .map(|sym| format!("-Wl,--undefined={}", sym))
            .collect()
    }
}

/// Toolchain profile errors
#[derive(Debug, thiserror::Error)]
pub enum ToolchainError {
    #[error("compiler binary name is empty")]
    EmptyCompiler,

    #[error("-march value must name a 32-bit RISC-V ISA, got '{0}'")]
    InvalidArch(String),

    #[error("unsupported optimization level '{0}'")]
    InvalidOptLevel(String),

    #[error("strip policy 'retain' needs at least one symbol to retain")]
    NoRetainedSymbols,

    #[error("invalid symbol name '{0}'")]
    InvalidSymbol(String),

    #[error("empty extra flag")]
    EmptyFlag,

    #[error("unknown strip policy '{0}' (expected all, retain or none)")]
    UnknownStripPolicy(String),

    #[error("strip policy 'retain' requires a symbol manifest path")]
    MissingManifest,
}

/// Resolved compiler/linker configuration for one method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolchainProfile {
    /// Target triple, e.g. "riscv32-unknown-elf"
    pub triple: String,

    /// Cross-compiler binary name
    pub compiler: String,

    /// ISA string for `-march`
    pub march: String,

    /// ABI string for `-mabi`
    pub mabi: String,

    /// Language standard for `-std`
    pub std: String,

    /// Optimization level, without the `-O`
    pub opt_level: String,

    pub linkage: Linkage,

    /// Adds `-pthread`
    pub threads: bool,

    /// Adds `-fstack-protector`
    pub stack_protector: bool,

    /// Adds `-ffunction-sections -fdata-sections -Wl,--gc-sections`
    pub gc_sections: bool,

    pub strip: StripPolicy,

    /// Symbols kept visible when `strip` is `retain`
    pub retain_symbols: Vec<String>,

    #[serde(default)]
    pub quirks: LinkerQuirks,

    /// Flags appended before the source path
    #[serde(default)]
    pub extra_flags: Vec<String>,

    /// Image for disposable containers
    pub image: String,

    /// Long-lived container instance for exec mode
    pub instance: String,
}

impl ToolchainProfile {
    /// Built-in bare-metal profile
    pub fn bare_metal() -> Self {
        Self {
            triple: "riscv32-unknown-elf".to_string(),
            compiler: "riscv32-unknown-elf-g++".to_string(),
            march: "rv32gc".to_string(),
            mabi: "ilp32".to_string(),
            std: "c++17".to_string(),
            opt_level: "2".to_string(),
            linkage: Linkage::Static,
            threads: false,
            stack_protector: true,
            gc_sections: true,
            strip: StripPolicy::StripAll,
            retain_symbols: vec!["main".to_string()],
            quirks: LinkerQuirks::default(),
            extra_flags: Vec::new(),
            image: "rv-build/riscv32-elf".to_string(),
            instance: "rv-build-elf".to_string(),
        }
    }

    /// Built-in linux-hosted profile
    pub fn linux() -> Self {
        Self {
            triple: "riscv32-unknown-linux-gnu".to_string(),
            compiler: "riscv32-unknown-linux-gnu-g++".to_string(),
            mabi: "ilp32d".to_string(),
            threads: true,
            image: "rv-build/riscv32-linux".to_string(),
            instance: "rv-build-linux".to_string(),
            ..Self::bare_metal()
        }
    }

    /// Built-in profile for a method
    pub fn builtin(method: Method) -> Self {
        match method {
            Method::BareMetal => Self::bare_metal(),
            Method::Linux => Self::linux(),
        }
    }

    /// Validate the profile
    pub fn validate(&self) -> Result<(), ToolchainError> {
        if self.compiler.trim().is_empty() {
            return Err(ToolchainError::EmptyCompiler);
        }
        if !self.march.starts_with("rv32") {
            return Err(ToolchainError::InvalidArch(self.march.clone()));
        }
        if !OPT_LEVELS.contains(&self.opt_level.as_str()) {
            return Err(ToolchainError::InvalidOptLevel(self.opt_level.clone()));
        }
        if self.strip == StripPolicy::RetainListed && self.retain_symbols.is_empty() {
            return Err(ToolchainError::NoRetainedSymbols);
        }
        for sym in self.retain_symbols.iter().chain(&self.quirks.force_undefined) {
            if !is_valid_symbol(sym) {
                return Err(ToolchainError::InvalidSymbol(sym.clone()));
            }
        }
        if self.extra_flags.iter().any(|f| f.is_empty()) {
            return Err(ToolchainError::EmptyFlag);
        }
        Ok(())
    }

    /// Whether a symbol manifest is part of the link
    pub fn needs_symbol_manifest(&self) -> bool {
        self.strip == StripPolicy::RetainListed
    }

    /// Contents of the symbol-retention manifest, one symbol per line
    pub fn retention_manifest(&self) -> String {
        let mut text = self.retain_symbols.join("\n");
        text.push('\n');
        text
    }

    /// Compiler arguments (without the compiler itself)
    ///
    /// Paths are given as they must appear to the compiler, which differs
    /// between a local process and a container.
    pub fn compiler_args(
        &self,
        source: &str,
        output: &str,
        symbol_manifest: Option<&str>,
    ) -> Result<Vec<String>, ToolchainError> {
        let mut args = vec![
            format!("-march={}", self.march),
            format!("-mabi={}", self.mabi),
            format!("-std={}", self.std),
            format!("-O{}", self.opt_level),
        ];
        if self.threads {
            args.push("-pthread".to_string());
        }
        if self.stack_protector {
            args.push("-fstack-protector".to_string());
        }
        if self.linkage == Linkage::Static {
            args.push("-static".to_string());
        }
        args.extend(self.extra_flags.iter().cloned());

        args.push(source.to_string());
        args.push("-o".to_string());
        args.push(output.to_string());

        if self.gc_sections {
            args.push("-ffunction-sections".to_string());
            args.push("-fdata-sections".to_string());
            args.push("-Wl,--gc-sections".to_string());
        }
        args.extend(self.quirks.linker_args());

        match self.strip {
            StripPolicy::StripAll => args.push("-Wl,-s".to_string()),
            StripPolicy::RetainListed => {
                let manifest = symbol_manifest.ok_or(ToolchainError::MissingManifest)?;
                args.push(format!("-Wl,--retain-symbols-file={}", manifest));
            }
            StripPolicy::KeepAll => {}
        }

        Ok(args)
    }
}

/// Resolve the built-in profile for a `method` value
pub fn select_profile(method: Option<&str>) -> ToolchainProfile {
    ToolchainProfile::builtin(Method::from_discriminant(method))
}

fn is_valid_symbol(sym: &str) -> bool {
    !sym.is_empty()
        && sym
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '$')
}
