// Copyright (c) 2025 ETH Zurich

//! Flavor-specific backends.
//!
//! Each hardware description flavor customizes the file extensions, the
//! extraction patterns, the compiler command and flag conventions, the
//! diagnostic patterns, and the ordering rules. Everything else (graph,
//! ranking, resolution, minimization, orchestration) is shared.

pub mod bluespec;
pub mod chisel;
pub mod verilog;
pub mod vhdl;

use std::fmt;
use std::path::Path;

use crate::error::*;

/// A hardware description flavor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Flavor {
    /// Verilog and SystemVerilog, checked with a Verilog linter.
    Verilog,
    /// VHDL, analyzed and elaborated.
    Vhdl,
    /// Chisel or SpinalHDL, driven through a Scala build tool.
    Chisel,
    /// Bluespec SystemVerilog, compiled to Verilog.
    Bluespec,
}

impl Flavor {
    /// All flavors, in detection precedence order.
    pub const ALL: [Flavor; 4] = [
        Flavor::Bluespec,
        Flavor::Chisel,
        Flavor::Vhdl,
        Flavor::Verilog,
    ];

    /// The source file extensions selected for this flavor.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Flavor::Verilog => &["v", "sv", "svh", "vh"],
            Flavor::Vhdl => &["vhd", "vhdl"],
            Flavor::Chisel => &["scala"],
            Flavor::Bluespec => &["bsv"],
        }
    }

    /// The extensions that may carry compilable units (headers excluded).
    pub fn unit_extensions(self) -> &'static [&'static str] {
        match self {
            Flavor::Verilog => &["v", "sv"],
            other => other.extensions(),
        }
    }

    /// Determine the flavor from a file extension.
    pub fn from_extension(ext: &str) -> Option<Flavor> {
        let ext = ext.to_lowercase();
        Flavor::ALL
            .into_iter()
            .find(|f| f.extensions().contains(&ext.as_str()))
    }

    /// The external compiler binary this flavor invokes.
    ///
    /// For Chisel the build tool is detected per repository (`sbt` or
    /// `mill`); the name here is only used for the setup check.
    pub fn compiler(self) -> &'static str {
        match self {
            Flavor::Verilog => "verilator",
            Flavor::Vhdl => "ghdl",
            Flavor::Chisel => "sbt",
            Flavor::Bluespec => "bsc",
        }
    }

    /// The dialect string for the output record, given the predominant
    /// source extension.
    pub fn language_version(self, predominant_ext: &str) -> &'static str {
        match self {
            Flavor::Verilog => match predominant_ext {
                "sv" | "svh" => "2012",
                _ => "2005",
            },
            Flavor::Vhdl => "08",
            // Chisel emits SystemVerilog; Bluespec configs record the BSV
            // toolchain dialect.
            Flavor::Chisel => "2012",
            Flavor::Bluespec => "bsv",
        }
    }

    /// The resolver iteration cap for this flavor.
    pub fn max_iterations(self) -> usize {
        match self {
            Flavor::Vhdl => 20,
            _ => 15,
        }
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Flavor::Verilog => "verilog",
            Flavor::Vhdl => "vhdl",
            Flavor::Chisel => "chisel",
            Flavor::Bluespec => "bluespec",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for Flavor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Flavor> {
        match s.to_lowercase().as_str() {
            "verilog" | "systemverilog" | "sv" => Ok(Flavor::Verilog),
            "vhdl" => Ok(Flavor::Vhdl),
            "chisel" | "spinalhdl" | "scala" => Ok(Flavor::Chisel),
            "bluespec" | "bsv" => Ok(Flavor::Bluespec),
            other => Err(Error::new(format!("Unknown flavor `{}`.", other))),
        }
    }
}

/// Detect the flavor of a repository by counting source files per flavor.
///
/// Bluespec and Chisel trees usually also carry generated or handwritten
/// Verilog, so those flavors take precedence whenever any of their sources
/// are present at all.
pub fn detect(root: &Path) -> Result<Flavor> {
    let mut counts = [0usize; 4];
    for entry in walkdir::WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let ext = entry
            .path()
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if let Some(flavor) = Flavor::from_extension(&ext) {
            let idx = Flavor::ALL.iter().position(|f| *f == flavor).unwrap();
            counts[idx] += 1;
        }
    }
    // Precedence: any BSV or Scala sources select those flavors outright.
    for (idx, flavor) in Flavor::ALL.into_iter().enumerate() {
        match flavor {
            Flavor::Bluespec | Flavor::Chisel if counts[idx] > 0 => return Ok(flavor),
            _ => {}
        }
    }
    // Otherwise the majority of VHDL vs. Verilog sources decides.
    let vhdl = counts[Flavor::ALL.iter().position(|f| *f == Flavor::Vhdl).unwrap()];
    let verilog = counts[Flavor::ALL.iter().position(|f| *f == Flavor::Verilog).unwrap()];
    if vhdl == 0 && verilog == 0 {
        return Err(Error::new(format!(
            "No HDL sources found in {:?}.",
            root
        )));
    }
    if vhdl > verilog {
        Ok(Flavor::Vhdl)
    } else {
        Ok(Flavor::Verilog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_mapping() {
        assert_eq!(Flavor::from_extension("sv"), Some(Flavor::Verilog));
        assert_eq!(Flavor::from_extension("VHD"), Some(Flavor::Vhdl));
        assert_eq!(Flavor::from_extension("scala"), Some(Flavor::Chisel));
        assert_eq!(Flavor::from_extension("bsv"), Some(Flavor::Bluespec));
        assert_eq!(Flavor::from_extension("txt"), None);
    }

    #[test]
    fn language_versions() {
        assert_eq!(Flavor::Verilog.language_version("v"), "2005");
        assert_eq!(Flavor::Verilog.language_version("sv"), "2012");
        assert_eq!(Flavor::Vhdl.language_version("vhd"), "08");
    }

    #[test]
    fn flavor_from_str() {
        assert_eq!("sv".parse::<Flavor>().unwrap(), Flavor::Verilog);
        assert_eq!("VHDL".parse::<Flavor>().unwrap(), Flavor::Vhdl);
        assert!("pascal".parse::<Flavor>().is_err());
    }

    #[test]
    fn detect_prefers_generator_flavors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("core.v"), "module core; endmodule\n").unwrap();
        std::fs::write(dir.path().join("Core.bsv"), "package Core;\nendpackage\n").unwrap();
        assert_eq!(detect(dir.path()).unwrap(), Flavor::Bluespec);
    }

    #[test]
    fn detect_empty_tree_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(detect(dir.path()).is_err());
    }
}
