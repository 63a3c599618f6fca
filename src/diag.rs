// Copyright (c) 2025 ETH Zurich

//! Compiler log parsing.
//!
//! Consumes one captured log and returns typed diagnostics. The patterns
//! are flavor-specific but the output type is uniform, so the resolver
//! never needs to know which compiler produced the text.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

/// A typed error extracted from a compiler log.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Diagnostic {
    /// A file contains an `include` the compiler could not satisfy.
    MissingInclude {
        /// The file that contains the failing include directive.
        file: PathBuf,
        /// The include path as written in the source.
        include: String,
    },
    /// A module or entity is instantiated but nowhere defined.
    MissingModule {
        /// The missing unit name.
        name: String,
        /// The file that instantiates it, when the log names one.
        file: Option<PathBuf>,
    },
    /// A package is referenced but not in the compile set.
    MissingPackage {
        /// The missing package name.
        name: String,
        /// The importing file, when the log names one.
        file: Option<PathBuf>,
    },
    /// An interface is referenced but not in the compile set.
    MissingInterface {
        /// The missing interface name.
        name: String,
    },
    /// A type constructor is unbound (Bluespec).
    MissingType {
        /// The missing type name.
        name: String,
        /// The file the compiler was processing.
        file: Option<PathBuf>,
    },
    /// A variable or function is unbound (Bluespec).
    MissingVariable {
        /// The missing identifier.
        name: String,
    },
    /// A file re-declares a symbol already declared elsewhere.
    DuplicateDeclaration {
        /// The file that defines the duplicate.
        file: PathBuf,
    },
    /// A file failed to parse.
    SyntaxError {
        /// The offending file.
        file: PathBuf,
    },
    /// An instantiation passes parameters or pins the module lacks.
    ParamMismatch {
        /// The file with the mismatching instantiation or declaration.
        file: PathBuf,
        /// The including parent, when the log names one; the parent is the
        /// true cause and is blacklisted instead.
        parent: Option<PathBuf>,
    },
    /// A file uses a preprocessor macro that was never defined.
    UndefinedMacro {
        /// The consuming file.
        file: PathBuf,
    },
    /// A file imports a package that exists nowhere in the tree.
    UnresolvedImport {
        /// The consuming file.
        file: PathBuf,
        /// The package name.
        package: String,
    },
}

impl Diagnostic {
    /// Fix-application priority; lower values are handled first.
    ///
    /// The order matches the resolver contract: satisfy includes before
    /// adding providers, add providers before removing anything, and only
    /// then start excluding offenders.
    pub fn priority(&self) -> u8 {
        match self {
            Diagnostic::MissingInclude { .. } => 0,
            Diagnostic::MissingPackage { .. } => 1,
            Diagnostic::MissingModule { .. } => 2,
            Diagnostic::MissingInterface { .. } => 3,
            Diagnostic::MissingType { .. } => 3,
            Diagnostic::MissingVariable { .. } => 3,
            Diagnostic::DuplicateDeclaration { .. } => 4,
            Diagnostic::SyntaxError { .. } => 5,
            Diagnostic::UndefinedMacro { .. } => 6,
            Diagnostic::ParamMismatch { .. } => 6,
            Diagnostic::UnresolvedImport { .. } => 7,
        }
    }
}

fn push_unique(out: &mut Vec<Diagnostic>, diag: Diagnostic) {
    if !out.contains(&diag) {
        out.push(diag);
    }
}

// ---------------------------------------------------------------------------
// Verilator
// ---------------------------------------------------------------------------

static VL_MISSING_INCLUDE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)%Error:\s+([^:\s]+):\d+:\d+:\s*Cannot\s+find\s+include\s+file:\s*['\x22]?([^'\x22\s]+)",
    )
    .unwrap()
});
static VL_MISSING_MODULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)%Error:\s+([^:\s]+):\d+:\d+:\s*Cannot\s+find\s+file\s+containing\s+module:\s*'([^']+)'")
        .unwrap()
});
static VL_MISSING_MODULE_BARE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Cannot\s+find\s+(?:file\s+containing\s+)?module:?\s*['\x22]([^'\x22]+)['\x22]").unwrap()
});
static VL_MISSING_INTERFACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Cannot\s+find\s+file\s+containing\s+interface:\s*['\x22]([^'\x22]+)['\x22]")
        .unwrap()
});
static VL_MISSING_PACKAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)%Error-PKGNODECL:\s*([^:\s]+):\d+:\d+:\s*Package/class\s+'([^']+)'\s+not\s+found")
        .unwrap()
});
static VL_MISSING_PACKAGE_BARE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:Importing\s+from\s+missing\s+package|Package(?:/class)?)\s+'([^']+)'\s+not\s+found")
        .unwrap()
});
static VL_DUPLICATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)%(?:Warning-MODDUP|Error(?:-MODDUP)?):\s*([^:\s]+):\d+:\d+:\s*Duplicate\s+declaration",
    )
    .unwrap()
});
static VL_SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)%Error:\s+([^:\s]+\.s?vh?):\d+(?::\d+)?:.*(?:syntax\s+error|parse\s+error|unexpected|Too\s+many\s+digits|Expected\s+numeric\s+type)",
    )
    .unwrap()
});
static VL_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)%Error-PINNOTFOUND:\s*([^:\s]+):\d+:\d+:").unwrap()
});
static VL_PARENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.\.\.\s+note:\s+In\s+file\s+included\s+from\s+'?([^'\s]+\.s?vh?)'?").unwrap()
});
static VL_MACRO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)%Error:\s*([^:\s]+):\d+:\d+:\s*Define\s+or\s+directive\s+not\s+defined")
        .unwrap()
});

/// Parse a Verilator lint log.
///
/// The parser distinguishes the file that contains a failing include, the
/// file that instantiates a missing module, and the file that defines a
/// duplicate, since each receives a different fix.
pub fn parse_verilator(log: &str) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    for c in VL_MISSING_INCLUDE.captures_iter(log) {
        push_unique(
            &mut out,
            Diagnostic::MissingInclude {
                file: PathBuf::from(&c[1]),
                include: c[2].to_string(),
            },
        );
    }
    for c in VL_MISSING_PACKAGE.captures_iter(log) {
        push_unique(
            &mut out,
            Diagnostic::MissingPackage {
                name: c[2].to_string(),
                file: Some(PathBuf::from(&c[1])),
            },
        );
    }
    for c in VL_MISSING_PACKAGE_BARE.captures_iter(log) {
        let name = c[1].to_string();
        if !out.iter().any(|d| matches!(d, Diagnostic::MissingPackage { name: n, .. } if *n == name)) {
            out.push(Diagnostic::MissingPackage { name, file: None });
        }
    }
    for c in VL_MISSING_MODULE.captures_iter(log) {
        push_unique(
            &mut out,
            Diagnostic::MissingModule {
                name: c[2].to_string(),
                file: Some(PathBuf::from(&c[1])),
            },
        );
    }
    for c in VL_MISSING_MODULE_BARE.captures_iter(log) {
        let name = c[1].to_string();
        if !out.iter().any(|d| matches!(d, Diagnostic::MissingModule { name: n, .. } if *n == name)) {
            out.push(Diagnostic::MissingModule { name, file: None });
        }
    }
    for c in VL_MISSING_INTERFACE.captures_iter(log) {
        push_unique(
            &mut out,
            Diagnostic::MissingInterface {
                name: c[1].to_string(),
            },
        );
    }
    for c in VL_DUPLICATE.captures_iter(log) {
        push_unique(
            &mut out,
            Diagnostic::DuplicateDeclaration {
                file: PathBuf::from(&c[1]),
            },
        );
    }
    for c in VL_SYNTAX.captures_iter(log) {
        push_unique(
            &mut out,
            Diagnostic::SyntaxError {
                file: PathBuf::from(&c[1]),
            },
        );
    }
    let parent = VL_PARENT
        .captures_iter(log)
        .next()
        .map(|c| PathBuf::from(&c[1]));
    for c in VL_PARAM.captures_iter(log) {
        push_unique(
            &mut out,
            Diagnostic::ParamMismatch {
                file: PathBuf::from(&c[1]),
                parent: parent.clone(),
            },
        );
    }
    for c in VL_MACRO.captures_iter(log) {
        push_unique(
            &mut out,
            Diagnostic::UndefinedMacro {
                file: PathBuf::from(&c[1]),
            },
        );
    }
    out
}

/// Count `%Warning` and `%Error` lines in a Verilator log.
pub fn summarize_verilator(log: &str) -> (usize, usize) {
    let warnings = log.lines().filter(|l| l.starts_with("%Warning")).count();
    let errors = log.lines().filter(|l| l.starts_with("%Error")).count();
    (warnings, errors)
}

/// SystemVerilog reserved words frequently used as identifiers in plain
/// Verilog code.
const SV_KEYWORDS: &[&str] = &[
    "dist", "randomize", "constraint", "covergroup", "inside", "with", "foreach", "unique",
    "priority", "final", "alias", "matches", "tagged", "extern", "pure", "context", "solve",
    "before", "after",
];

/// Detect errors caused by SystemVerilog keywords used as identifiers.
///
/// When this fires on an SV-mode attempt, retrying in Verilog-2005 mode is
/// the fix.
pub fn detect_sv_keyword_conflict(log: &str) -> bool {
    SV_KEYWORDS.iter().any(|kw| {
        log.contains(&format!(
            "syntax error, unexpected {}, expecting IDENTIFIER",
            kw
        ))
    })
}

// ---------------------------------------------------------------------------
// GHDL
// ---------------------------------------------------------------------------

static GHDL_UNIT_NOT_FOUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)([^\s:]+\.vhdl?):\d+:\d+:.*?unit\s+"([^"]+)"\s+not\s+found\s+in\s+library"#)
        .unwrap()
});
static GHDL_NO_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)([^\s:]+\.vhdl?):\d+:\d+:.*?no\s+declaration\s+for\s+"([^"]+)""#).unwrap()
});
static GHDL_NOT_BOUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)instance\s+"[^"]+"\s+of\s+component\s+"([^"]+)"\s+is\s+not\s+bound"#)
        .unwrap()
});
static GHDL_SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([^\s:]+\.vhdl?):\d+:\d+:\s*error:\s*(?:syntax|parse|unexpected)").unwrap()
});

/// Names that the standard libraries provide; never treated as missing.
const VHDL_STD_NAMES: &[&str] = &[
    "std",
    "ieee",
    "work",
    "std_logic",
    "std_logic_vector",
    "std_logic_1164",
    "numeric_std",
];

/// Parse a GHDL analyze/elaborate log.
///
/// GHDL reports both missing entities and missing packages as
/// `unit "X" not found in library "Y"`. The source excerpt reproduced after
/// the error line disambiguates: an `entity <lib>.X` reference means a
/// missing entity, a `use <lib>.X` reference means a missing package.
pub fn parse_ghdl(log: &str) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    let lines: Vec<&str> = log.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        if let Some(c) = GHDL_UNIT_NOT_FOUND.captures(line) {
            let file = PathBuf::from(&c[1]);
            let unit = c[2].to_string();
            if VHDL_STD_NAMES.contains(&unit.to_lowercase().as_str()) {
                continue;
            }
            // Scan the reproduced source excerpt for the reference form.
            let mut is_entity = false;
            let mut is_package = false;
            for context in lines.iter().skip(i + 1).take(3) {
                let lower = context.to_lowercase();
                if lower.contains("error:") {
                    break;
                }
                if lower.contains(&unit.to_lowercase()) {
                    if lower.contains("entity ") {
                        is_entity = true;
                        break;
                    }
                    if lower.contains("use ") {
                        is_package = true;
                        break;
                    }
                }
            }
            if !is_entity && !is_package && i > 0 {
                let prev = lines[i - 1].to_lowercase();
                if prev.contains("use ") && prev.contains(&unit.to_lowercase()) {
                    is_package = true;
                }
            }
            if is_entity {
                push_unique(
                    &mut out,
                    Diagnostic::MissingModule {
                        name: unit,
                        file: Some(file),
                    },
                );
            } else {
                // Default to package: analysis failures on use clauses are
                // the overwhelmingly common case.
                push_unique(
                    &mut out,
                    Diagnostic::MissingPackage {
                        name: unit,
                        file: Some(file),
                    },
                );
            }
        }
    }
    for c in GHDL_NO_DECLARATION.captures_iter(log) {
        let name = c[2].to_string();
        if VHDL_STD_NAMES.contains(&name.to_lowercase().as_str()) {
            continue;
        }
        push_unique(
            &mut out,
            Diagnostic::MissingModule {
                name,
                file: Some(PathBuf::from(&c[1])),
            },
        );
    }
    for c in GHDL_NOT_BOUND.captures_iter(log) {
        let name = c[1].to_string();
        if VHDL_STD_NAMES.contains(&name.to_lowercase().as_str()) {
            continue;
        }
        push_unique(&mut out, Diagnostic::MissingModule { name, file: None });
    }
    for c in GHDL_SYNTAX.captures_iter(log) {
        push_unique(
            &mut out,
            Diagnostic::SyntaxError {
                file: PathBuf::from(&c[1]),
            },
        );
    }
    out
}

// ---------------------------------------------------------------------------
// Bluespec
// ---------------------------------------------------------------------------

static BSC_MISSING_PACKAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Cannot find package\s+[`'](\w+)[`']").unwrap());
static BSC_UNBOUND_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Unbound type constructor\s+[`'](\w+)[`']").unwrap());
static BSC_UNBOUND_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Unbound variable\s+[`'](\w+)[`']").unwrap());
static BSC_ERROR_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"Error:\s+"([^"]+\.bsv)""#).unwrap());

/// Parse a BSV compiler log.
pub fn parse_bsc(log: &str) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    let file = BSC_ERROR_FILE
        .captures_iter(log)
        .next()
        .map(|c| PathBuf::from(&c[1]));
    for c in BSC_MISSING_PACKAGE.captures_iter(log) {
        push_unique(
            &mut out,
            Diagnostic::MissingPackage {
                name: c[1].to_string(),
                file: file.clone(),
            },
        );
    }
    for c in BSC_UNBOUND_TYPE.captures_iter(log) {
        push_unique(
            &mut out,
            Diagnostic::MissingType {
                name: c[1].to_string(),
                file: file.clone(),
            },
        );
    }
    for c in BSC_UNBOUND_VAR.captures_iter(log) {
        push_unique(
            &mut out,
            Diagnostic::MissingVariable {
                name: c[1].to_string(),
            },
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn verilator_missing_include_names_the_including_file() {
        let log = "%Error: rtl/cpu.v:12:5: Cannot find include file: 'config.vh'\n";
        let diags = parse_verilator(log);
        assert_eq!(
            diags,
            vec![Diagnostic::MissingInclude {
                file: PathBuf::from("rtl/cpu.v"),
                include: "config.vh".to_string(),
            }]
        );
    }

    #[test]
    fn verilator_missing_module_names_the_instantiating_file() {
        let log =
            "%Error: rtl/fifo.sv:56:4: Cannot find file containing module: 'mem_1r1w'\n";
        let diags = parse_verilator(log);
        assert_eq!(
            diags,
            vec![Diagnostic::MissingModule {
                name: "mem_1r1w".to_string(),
                file: Some(PathBuf::from("rtl/fifo.sv")),
            }]
        );
    }

    #[test]
    fn verilator_duplicate_names_the_defining_file() {
        let log = "%Warning-MODDUP: vendor/fifo.v:3:1: Duplicate declaration of module: 'fifo'\n";
        let diags = parse_verilator(log);
        assert_eq!(
            diags,
            vec![Diagnostic::DuplicateDeclaration {
                file: PathBuf::from("vendor/fifo.v"),
            }]
        );
    }

    #[test]
    fn verilator_macro_and_package_errors() {
        let log = "\
%Error: vendor/tile.v:31:36: Define or directive not defined: '`TILE_MAX_X'
%Error-PKGNODECL: rtl/core.sv:6:10: Package/class 'bus_pkg' not found
";
        let diags = parse_verilator(log);
        assert!(diags.contains(&Diagnostic::UndefinedMacro {
            file: PathBuf::from("vendor/tile.v")
        }));
        assert!(diags.contains(&Diagnostic::MissingPackage {
            name: "bus_pkg".to_string(),
            file: Some(PathBuf::from("rtl/core.sv")),
        }));
    }

    #[test]
    fn verilator_param_mismatch_prefers_parent() {
        let log = "\
%Error-PINNOTFOUND: lib/dff.sv:26:7: Parameter not found: 'WIDTH'
        rtl/fe_top.sv:69:1: ... note: In file included from 'fe_top.sv'
";
        let diags = parse_verilator(log);
        match diags.iter().find(|d| matches!(d, Diagnostic::ParamMismatch { .. })) {
            Some(Diagnostic::ParamMismatch { file, parent }) => {
                assert_eq!(file, &PathBuf::from("lib/dff.sv"));
                assert_eq!(parent.as_deref(), Some(std::path::Path::new("fe_top.sv")));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn keyword_conflict_detection() {
        let log = "%Error: a.v:5:9: syntax error, unexpected dist, expecting IDENTIFIER\n";
        assert!(detect_sv_keyword_conflict(log));
        assert!(!detect_sv_keyword_conflict("%Error: plain failure\n"));
    }

    #[test]
    fn ghdl_disambiguates_entity_from_package() {
        let entity_log = "\
rtl/core/cpu.vhd:192:45:error: unit \"cpu_frontend\" not found in library \"neorv32\"
  cpu_frontend_inst: entity neorv32.cpu_frontend
                                                ^
";
        let diags = parse_ghdl(entity_log);
        assert_eq!(
            diags,
            vec![Diagnostic::MissingModule {
                name: "cpu_frontend".to_string(),
                file: Some(PathBuf::from("rtl/core/cpu.vhd")),
            }]
        );

        let pkg_log = "\
src/pp_potato.vhd:8:10:error: unit \"pp_types\" not found in library \"work\"
use work.pp_types.all;
         ^
";
        let diags = parse_ghdl(pkg_log);
        assert_eq!(
            diags,
            vec![Diagnostic::MissingPackage {
                name: "pp_types".to_string(),
                file: Some(PathBuf::from("src/pp_potato.vhd")),
            }]
        );
    }

    #[test]
    fn ghdl_filters_standard_libraries() {
        let log = "\
a.vhd:1:1:error: unit \"std_logic_1164\" not found in library \"ieee\"
use ieee.std_logic_1164.all;
";
        assert!(parse_ghdl(log).is_empty());
    }

    #[test]
    fn bsc_errors() {
        let log = "\
Error: \"src/Core.bsv\", line 4, column 8: (T0003)
  Cannot find package `Fifos'
Error: \"src/Core.bsv\", line 9, column 2: (T0004)
  Unbound type constructor `Wd_Addr'
  Unbound variable `fn_decode'
";
        let diags = parse_bsc(log);
        assert!(diags.contains(&Diagnostic::MissingPackage {
            name: "Fifos".to_string(),
            file: Some(PathBuf::from("src/Core.bsv")),
        }));
        assert!(diags.iter().any(
            |d| matches!(d, Diagnostic::MissingType { name, .. } if name == "Wd_Addr")
        ));
        assert!(diags.iter().any(
            |d| matches!(d, Diagnostic::MissingVariable { name } if name == "fn_decode")
        ));
    }

    #[test]
    fn priorities_order_fix_application() {
        let include = Diagnostic::MissingInclude {
            file: PathBuf::from("a.v"),
            include: "x.vh".into(),
        };
        let syntax = Diagnostic::SyntaxError {
            file: PathBuf::from("a.v"),
        };
        assert!(include.priority() < syntax.priority());
    }
}
