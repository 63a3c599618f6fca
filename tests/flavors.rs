// Copyright (c) 2025 ETH Zurich

//! End-to-end tests for the VHDL, Bluespec and Chisel backends, with the
//! external toolchains stubbed out on a prepended PATH.

use std::fs;
use std::path::Path;

use assert_cmd::Command;

fn touch(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn stub(bin: &Path, name: &str, script: &str) {
    use std::os::unix::fs::PermissionsExt;
    fs::create_dir_all(bin).unwrap();
    let path = bin.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn hdlscout(bin: &Path) -> Command {
    let mut cmd = Command::cargo_bin("hdlscout").unwrap();
    let path = format!(
        "{}:{}",
        bin.display(),
        std::env::var("PATH").unwrap_or_default()
    );
    cmd.env("PATH", path);
    cmd
}

/// A GHDL stand-in: the analyze step demands the two packages the entity
/// uses until they are on the command line, records what it analyzed in the
/// work directory, and the elaborate step requires the top entity to have
/// been analyzed.
const GHDL_STUB: &str = r#"mode=$1
wd=""
for a in "$@"; do
  case "$a" in --workdir=*) wd=${a#--workdir=} ;; esac
done
if [ "$mode" = "-a" ]; then
  case "$*" in
    *pp_potato.vhd*)
      case "$*" in
        *pp_types.vhd*) : ;;
        *)
          echo 'src/pp_potato.vhd:2:10:error: unit "pp_types" not found in library "work"'
          echo 'use work.pp_types.all;'
          exit 1
          ;;
      esac
      case "$*" in
        *pp_utilities.vhd*) : ;;
        *)
          echo 'src/pp_potato.vhd:3:10:error: unit "pp_utilities" not found in library "work"'
          echo 'use work.pp_utilities.all;'
          exit 1
          ;;
      esac
      ;;
  esac
  case "$*" in
    *pp_utilities.vhd*)
      case "$*" in
        *pp_types.vhd*) : ;;
        *)
          echo 'src/pp_utilities.vhd:2:10:error: unit "pp_types" not found in library "work"'
          echo 'use work.pp_types.all;'
          exit 1
          ;;
      esac
      ;;
  esac
  echo "$*" > "$wd/analyzed.txt"
  exit 0
fi
if [ "$mode" = "-e" ]; then
  grep -q pp_potato "$wd/analyzed.txt" 2>/dev/null || {
    echo 'error: cannot find entity "pp_potato"'
    exit 1
  }
  exit 0
fi
exit 1"#;

#[test]
fn configure_vhdl_multi_package() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path().join("potato");
    touch(
        &repo,
        "src/pp_types.vhd",
        "package pp_types is\nend package;\n",
    );
    touch(
        &repo,
        "src/pp_utilities.vhd",
        "use work.pp_types.all;\npackage pp_utilities is\nend package;\n",
    );
    touch(
        &repo,
        "src/pp_potato.vhd",
        "use work.pp_types.all;\nuse work.pp_utilities.all;\nentity pp_potato is\nend pp_potato;\n",
    );
    let bin = dir.path().join("bin");
    stub(&bin, "ghdl", GHDL_STUB);

    let out = hdlscout(&bin)
        .args(["-d", repo.to_str().unwrap(), "configure", "-n", "potato", "-q"])
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let config: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(config["top_module"], "pp_potato");
    assert_eq!(config["language_version"], "08");
    assert_eq!(config["is_simulable"], true);
    let files: Vec<String> = config["files"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    let pos = |needle: &str| files.iter().position(|f| f.ends_with(needle)).unwrap();
    assert!(pos("pp_types.vhd") < pos("pp_utilities.vhd"));
    assert!(pos("pp_utilities.vhd") < pos("pp_potato.vhd"));
}

#[test]
fn configure_bluespec_wrapped_top() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path().join("mybsv");
    touch(
        &repo,
        "src/ALU.bsv",
        "package ALU;\ninterface ALUIfc;\nendinterface\nmodule mkALU(ALUIfc);\nendmodule\nendpackage\n",
    );
    touch(
        &repo,
        "src/Core.bsv",
        "package Core;\ninterface CoreIfc;\nendinterface\nmodule mkCore(CoreIfc);\n  ALUIfc alu <- mkALU();\nendmodule\nendpackage\n",
    );
    touch(
        &repo,
        "src/Top.bsv",
        "package Top;\ninterface TopIfc;\nendinterface\nmodule mkTop(TopIfc);\n  CoreIfc core <- mkCore();\nendmodule\nendpackage\n",
    );
    let bin = dir.path().join("bin");
    stub(&bin, "bsc", "exit 0");

    let out = hdlscout(&bin)
        .args(["-d", repo.to_str().unwrap(), "configure", "-n", "mybsv", "-q"])
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let config: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let top = config["top_module"].as_str().unwrap();
    assert!(
        top == "mkTop" || top == "mkCore",
        "unexpected top: {}",
        top
    );
    assert_eq!(config["is_simulable"], true);
    let pre_script = config["pre_script"].as_str().unwrap();
    assert!(pre_script.starts_with("bsc -verilog -g mk"));
    assert!(pre_script.contains("-aggressive-conditions"));
}

#[test]
fn configure_chisel_emits_and_falls_through() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path().join("mycpu");
    touch(&repo, "build.sbt", "name := \"mycpu\"\n");
    touch(
        &repo,
        "src/main/scala/Core.scala",
        "package mycpu\nclass Core extends Module {\n}\n",
    );
    touch(
        &repo,
        "src/main/scala/Elaborate.scala",
        "package mycpu\nobject Elaborate extends App {\n  (new chisel3.stage.ChiselStage).emitVerilog(new Core())\n}\n",
    );
    let bin = dir.path().join("bin");
    // The build tool emits Verilog into a known output directory.
    stub(
        &bin,
        "sbt",
        "mkdir -p generated\nprintf 'module Core;\\nendmodule\\n' > generated/Core.v\nexit 0",
    );
    stub(
        &bin,
        "verilator",
        r#"case "$*" in *Core.v*) exit 0 ;; *) echo "%Error: missing Core"; exit 1 ;; esac"#,
    );

    let out = hdlscout(&bin)
        .args(["-d", repo.to_str().unwrap(), "configure", "-n", "mycpu", "-q"])
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let config: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(config["top_module"], "Core");
    assert_eq!(config["is_simulable"], true);
    let pre_script = config["pre_script"].as_str().unwrap();
    assert_eq!(pre_script, "sbt runMain mycpu.Elaborate");
    let files: Vec<String> = config["files"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert!(files.iter().any(|f| f.ends_with("generated/Core.v")));
}
