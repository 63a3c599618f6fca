// Copyright (c) 2025 ETH Zurich

//! Lexical extraction of HDL units and instantiations.
//!
//! A fixed set of per-flavor patterns is applied to comment-stripped file
//! contents. The extractor is pure: identical inputs yield identical
//! outputs. It does not attempt to parse the languages; it recognizes the
//! declaration and instantiation shapes that matter for dependency
//! discovery, and leaves everything else to the external compiler.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::diagnostic::Warnings;
use crate::flavor::Flavor;
use crate::util;

/// The kind of an extracted unit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnitKind {
    /// A Verilog or SystemVerilog module.
    Module,
    /// A VHDL entity.
    Entity,
    /// A package (any flavor).
    Package,
    /// A SystemVerilog interface.
    Interface,
    /// A Chisel or SpinalHDL module class.
    ChiselModule,
    /// A Bluespec module (identifier begins with `mk`).
    BluespecModule,
}

/// An atomic declaration extracted from a source file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unit {
    /// The declared identifier.
    pub name: String,
    /// The declaring file, repo-relative.
    pub file: PathBuf,
    /// What was declared.
    pub kind: UnitKind,
    /// The flavor the declaration was extracted under.
    pub flavor: Flavor,
}

/// Extraction result over a file set.
#[derive(Clone, Debug, Default)]
pub struct Extraction {
    /// All extracted units, in file walk order.
    pub units: Vec<Unit>,
    /// Instantiated unit names per file.
    pub instantiations: BTreeMap<PathBuf, BTreeSet<String>>,
}

impl Extraction {
    /// The first file declaring `name`, if any.
    pub fn file_of(&self, name: &str) -> Option<&Path> {
        self.units
            .iter()
            .find(|u| u.name == name)
            .map(|u| u.file.as_path())
    }
}

/// Verilog keywords that must never be taken for instantiated module types.
const VERILOG_KEYWORDS: &[&str] = &[
    "always", "assign", "automatic", "begin", "case", "casex", "casez", "default", "defparam",
    "else", "end", "endcase", "endfunction", "endgenerate", "endmodule", "endpackage",
    "endinterface", "endtask", "enum", "for", "forever", "function", "generate", "genvar", "if",
    "initial", "inout", "input", "integer", "localparam", "logic", "module", "negedge", "output",
    "parameter", "posedge", "real", "reg", "repeat", "signed", "struct", "task", "typedef",
    "union", "unsigned", "while", "wire",
];

static VLOG_BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());
static VLOG_LINE_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)//.*$").unwrap());
static VHDL_LINE_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)--.*$").unwrap());

/// Strip comments for the given flavor, preserving line structure.
pub fn strip_comments(flavor: Flavor, text: &str) -> String {
    match flavor {
        Flavor::Vhdl => VHDL_LINE_COMMENT.replace_all(text, "").into_owned(),
        _ => {
            let text = VLOG_BLOCK_COMMENT.replace_all(text, "\n");
            VLOG_LINE_COMMENT.replace_all(&text, "").into_owned()
        }
    }
}

static VLOG_MODULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*module\s+(?:automatic\s+)?([A-Za-z_]\w*)").unwrap());
static VLOG_PACKAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*package\s+([A-Za-z_]\w*)\s*;").unwrap());
static VLOG_INTERFACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*interface\s+([A-Za-z_]\w*)\b").unwrap());
// The parameter group tolerates one level of nested parentheses, which
// covers the ubiquitous `#(.W(32))` form.
static VLOG_INST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*([A-Za-z_]\w*)\s+(?:#\s*\((?:[^()]|\([^()]*\))*\)\s*)?([A-Za-z_]\w*)\s*\(")
        .unwrap()
});

static VHDL_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^\s*entity\s+([A-Za-z]\w*)\s+is\b").unwrap());
static VHDL_PACKAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^\s*package\s+([A-Za-z]\w*)\s+is\b").unwrap());
static VHDL_DIRECT_INST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bentity\s+\w+\.([A-Za-z]\w*)").unwrap());
static VHDL_COMPONENT_INST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*\w+\s*:\s*([A-Za-z]\w*)\s*(?:\r?\n)?\s*(?:port|generic)\s+map\b")
        .unwrap()
});

static CHISEL_MODULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^\s*(?:class|object)\s+(\w+)(?:\[.*?\])?\s*(?:\(.*?\))?\s*extends\s+(?:(?:Raw)?Module|LazyModule|Component)\b",
    )
    .unwrap()
});
static CHISEL_DERIVED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^\s*(?:class|object)\s+(\w+)(?:\[.*?\])?\s*(?:\(.*?\))?\s*extends\s+(\w+(?:Base|Core|Module|Tile|Top|Subsystem))\b",
    )
    .unwrap()
});
static CHISEL_INST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Module\s*\(\s*new\s+(\w+)(?:\(|[\s)])").unwrap());

static BSV_MODULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:\(\*.*?\*\)\s*)*module\s+(?:\[.*?\]\s+)?(mk\w+)").unwrap()
});
static BSV_PACKAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*package\s+(\w+)\s*;").unwrap());
static BSV_INTERFACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*interface\s+(\w+)\s*;").unwrap());
static BSV_INST: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<-\s*(mk\w+)\s*\(").unwrap());

/// Extract units and instantiations from one file's contents.
pub fn extract_file(flavor: Flavor, rel: &Path, text: &str) -> (Vec<Unit>, BTreeSet<String>) {
    let text = strip_comments(flavor, text);
    let mut units = Vec::new();
    let mut insts = BTreeSet::new();
    let unit = |name: &str, kind| Unit {
        name: name.to_string(),
        file: rel.to_path_buf(),
        kind,
        flavor,
    };

    match flavor {
        Flavor::Verilog => {
            for m in VLOG_PACKAGE.captures_iter(&text) {
                units.push(unit(&m[1], UnitKind::Package));
            }
            for m in VLOG_INTERFACE.captures_iter(&text) {
                units.push(unit(&m[1], UnitKind::Interface));
            }
            for m in VLOG_MODULE.captures_iter(&text) {
                units.push(unit(&m[1], UnitKind::Module));
            }
            let declared: BTreeSet<&str> = units.iter().map(|u| u.name.as_str()).collect();
            for m in VLOG_INST.captures_iter(&text) {
                let ty = &m[1];
                if VERILOG_KEYWORDS.contains(&ty) || declared.contains(ty) {
                    continue;
                }
                insts.insert(ty.to_string());
            }
        }
        Flavor::Vhdl => {
            for m in VHDL_PACKAGE.captures_iter(&text) {
                units.push(unit(&m[1], UnitKind::Package));
            }
            for m in VHDL_ENTITY.captures_iter(&text) {
                units.push(unit(&m[1], UnitKind::Entity));
            }
            let declared: BTreeSet<String> =
                units.iter().map(|u| u.name.to_lowercase()).collect();
            for m in VHDL_DIRECT_INST
                .captures_iter(&text)
                .chain(VHDL_COMPONENT_INST.captures_iter(&text))
            {
                let name = m[1].to_lowercase();
                if !declared.contains(&name) {
                    insts.insert(name);
                }
            }
        }
        Flavor::Chisel => {
            for m in CHISEL_MODULE.captures_iter(&text) {
                units.push(unit(&m[1], UnitKind::ChiselModule));
            }
            for m in CHISEL_DERIVED.captures_iter(&text) {
                let name = &m[1];
                if !units.iter().any(|u| u.name == name) {
                    units.push(unit(name, UnitKind::ChiselModule));
                }
            }
            for m in CHISEL_INST.captures_iter(&text) {
                insts.insert(m[1].to_string());
            }
        }
        Flavor::Bluespec => {
            for m in BSV_PACKAGE.captures_iter(&text) {
                units.push(unit(&m[1], UnitKind::Package));
            }
            for m in BSV_INTERFACE.captures_iter(&text) {
                units.push(unit(&m[1], UnitKind::Interface));
            }
            for m in BSV_MODULE.captures_iter(&text) {
                units.push(unit(&m[1], UnitKind::BluespecModule));
            }
            for m in BSV_INST.captures_iter(&text) {
                insts.insert(m[1].to_string());
            }
        }
    }
    (units, insts)
}

/// Extract units and instantiations from a set of repo-relative files.
///
/// Unreadable files are skipped with a warning; the run continues.
pub fn extract(root: &Path, flavor: Flavor, files: &[PathBuf]) -> Extraction {
    let mut out = Extraction::default();
    for rel in files {
        let text = match util::read_file(&root.join(rel)) {
            Ok(t) => t,
            Err(_) => {
                Warnings::SkippingUnreadableFile(rel.clone()).emit();
                continue;
            }
        };
        let (units, insts) = extract_file(flavor, rel, &text);
        out.units.extend(units);
        if !insts.is_empty() {
            out.instantiations.insert(rel.clone(), insts);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn verilog_modules_and_instances() {
        let src = "\
// A cpu.
module cpu (input clk);
  alu #(.W(32)) alu_i (.clk(clk));
  regfile rf (.clk(clk));
  wire foo (bar); // not an instance: keyword filtered
endmodule
";
        let (units, insts) = extract_file(Flavor::Verilog, Path::new("rtl/cpu.v"), src);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "cpu");
        assert_eq!(units[0].kind, UnitKind::Module);
        assert!(insts.contains("alu"));
        assert!(insts.contains("regfile"));
        assert!(!insts.contains("wire"));
    }

    #[test]
    fn verilog_package_and_interface() {
        let src = "package types_pkg;\nendpackage\ninterface bus_if;\nendinterface\n";
        let (units, _) = extract_file(Flavor::Verilog, Path::new("p.sv"), src);
        let kinds: Vec<_> = units.iter().map(|u| u.kind).collect();
        assert!(kinds.contains(&UnitKind::Package));
        assert!(kinds.contains(&UnitKind::Interface));
    }

    #[test]
    fn comments_do_not_declare() {
        let src = "/* module ghost */\n// module ghost2\nmodule real_one;\nendmodule\n";
        let (units, _) = extract_file(Flavor::Verilog, Path::new("a.v"), src);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "real_one");
    }

    #[test]
    fn vhdl_entities_and_instantiations() {
        let src = "\
entity potato is
end potato;
architecture rtl of potato is
begin
  u0: entity work.alu
    port map (clk => clk);
  u1: fifo
    port map (clk => clk);
end rtl;
";
        let (units, insts) = extract_file(Flavor::Vhdl, Path::new("src/potato.vhd"), src);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].kind, UnitKind::Entity);
        assert!(insts.contains("alu"));
        assert!(insts.contains("fifo"));
    }

    #[test]
    fn vhdl_package_declaration() {
        let src = "package pp_types is\nend package;\n";
        let (units, _) = extract_file(Flavor::Vhdl, Path::new("pp_types.vhd"), src);
        assert_eq!(units[0].kind, UnitKind::Package);
        assert_eq!(units[0].name, "pp_types");
    }

    #[test]
    fn chisel_classes() {
        let src = "\
class Core(implicit p: Parameters) extends Module {
  val alu = Module(new Alu(32))
}
class Tile extends CoreBase {
}
";
        let (units, insts) = extract_file(Flavor::Chisel, Path::new("Core.scala"), src);
        let names: Vec<_> = units.iter().map(|u| u.name.as_str()).collect();
        assert!(names.contains(&"Core"));
        assert!(names.contains(&"Tile"));
        assert!(insts.contains("Alu"));
    }

    #[test]
    fn bluespec_modules() {
        let src = "\
package Core;
interface CoreIfc;
endinterface
(* synthesize *)
module mkCore(CoreIfc);
  ALUIfc alu <- mkALU();
endmodule
endpackage
";
        let (units, insts) = extract_file(Flavor::Bluespec, Path::new("Core.bsv"), src);
        let names: Vec<_> = units.iter().map(|u| u.name.as_str()).collect();
        assert!(names.contains(&"mkCore"));
        assert!(names.contains(&"Core"));
        assert!(names.contains(&"CoreIfc"));
        assert!(insts.contains("mkALU"));
    }

    #[test]
    fn extraction_is_pure() {
        let src = "module a; b b_i (); endmodule\n";
        let one = extract_file(Flavor::Verilog, Path::new("a.v"), src);
        let two = extract_file(Flavor::Verilog, Path::new("a.v"), src);
        assert_eq!(one.0, two.0);
        assert_eq!(one.1, two.1);
    }
}
