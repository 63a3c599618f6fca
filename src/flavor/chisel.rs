// Copyright (c) 2025 ETH Zurich

//! The Chisel/SpinalHDL backend.
//!
//! Scala designs cannot be linted directly; a build-tool invocation runs a
//! main application that emits Verilog, and the emitted sources then fall
//! through to the Verilog backend. The backend discovers existing main
//! applications, scores them with an explicit rule list, and tries them in
//! order.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::config::Config;
use crate::driver;
use crate::error::*;
use crate::extract;
use crate::flavor::{verilog, Flavor};
use crate::graph::UnitGraph;
use crate::rank;
use crate::scan;
use crate::sess::Session;
use crate::util;

/// The detected Scala build tool.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BuildTool {
    /// `build.sbt` present.
    Sbt,
    /// `build.sc` present.
    Mill,
}

/// Which Scala HDL dialect the repository uses.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScalaDialect {
    /// Chisel (ChiselStage / emitVerilog).
    Chisel,
    /// SpinalHDL (SpinalVerilog / SpinalConfig).
    SpinalHdl,
}

/// A discovered main application that can emit Verilog.
#[derive(Clone, Debug)]
pub struct MainApp {
    /// The Scala file declaring the object.
    pub file: PathBuf,
    /// The fully qualified class passed to `runMain`.
    pub main_class: String,
    /// The bare object name.
    pub app_name: String,
    /// The module the application instantiates.
    pub instantiated: String,
    /// Whether the main method reads command-line arguments.
    pub requires_args: bool,
    /// The rule-list score.
    pub score: i64,
}

static APP_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"object\s+(\w+)\s+extends\s+App\b").unwrap());
static MAIN_METHOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)object\s+(\w+)\s*\{[^}]*def\s+main\s*\(\s*args\s*:\s*Array\[String\]\s*\)")
        .unwrap()
});
static PACKAGE_DECL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*package\s+([\w.]+)").unwrap());
static NEW_MODULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"new\s+(\w+)\s*[(\[]").unwrap());
static ARGS_USE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"args\s*[(.\[]").unwrap());
static MILL_MODULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*object\s+(\w+)\s+extends\s+\w*ScalaModule").unwrap());

/// SpinalHDL plugin and config class names that are not design modules.
const SPINAL_PLUGINS: &[&str] = &[
    "IBusSimplePlugin",
    "DBusSimplePlugin",
    "IBusCachedPlugin",
    "DBusCachedPlugin",
    "DecoderSimplePlugin",
    "RegFilePlugin",
    "IntAluPlugin",
    "SrcPlugin",
    "FullBarrelShifterPlugin",
    "MulPlugin",
    "DivPlugin",
    "HazardSimplePlugin",
    "DebugPlugin",
    "BranchPlugin",
    "CsrPlugin",
    "YamlPlugin",
];

/// Detect the build tool by the build file at the repository root.
pub fn detect_build_tool(root: &Path) -> Option<BuildTool> {
    if root.join("build.sbt").exists() {
        Some(BuildTool::Sbt)
    } else if root.join("build.sc").exists() {
        Some(BuildTool::Mill)
    } else {
        None
    }
}

/// Detect the Scala HDL dialect by scanning for the emit entry points.
pub fn detect_dialect(root: &Path, files: &[PathBuf]) -> ScalaDialect {
    for rel in files {
        let text = util::read_file(&root.join(rel)).unwrap_or_default();
        if text.contains("SpinalVerilog") || text.contains("SpinalConfig") {
            return ScalaDialect::SpinalHdl;
        }
    }
    ScalaDialect::Chisel
}

/// The module a SpinalHDL application elaborates.
///
/// Plugins and `*Config` classes are instantiated all over Spinal
/// applications; the first `new` that is neither is the design.
fn spinal_instantiated(text: &str) -> Option<String> {
    let spinal_pos = text.find("Spinal")?;
    for c in NEW_MODULE.captures_iter(&text[spinal_pos..]) {
        let name = c[1].to_string();
        if !SPINAL_PLUGINS.contains(&name.as_str()) && !name.ends_with("Config") {
            return Some(name);
        }
    }
    None
}

/// Score one application with the explicit rule list.
///
/// The weights are policy tuned on real repositories: applications that
/// need arguments are disqualified, applications that elaborate the ranked
/// top or carry the repository's name are strongly preferred, and
/// peripheral or simulation wrappers sink.
fn score_app(
    app_name: &str,
    file: &Path,
    text: &str,
    instantiated: &str,
    requires_args: bool,
    top: &str,
    repo_normalized: &str,
) -> i64 {
    let mut score = 0i64;
    if requires_args {
        score -= 50_000;
    }
    if instantiated == top {
        score += 30_000;
    }
    let file_lower = util::file_stem_lower(file);
    let app_lower = app_name.to_lowercase();
    let content_lower = text.to_lowercase();
    let inst_lower = instantiated.to_lowercase();
    if rank::is_peripheral_name(&inst_lower) || ["memory", "mem", "bram"].iter().any(|p| inst_lower.contains(p)) {
        score -= 20_000;
    }
    if app_lower.ends_with("sim") {
        score -= 15_000;
    }
    if app_lower.ends_with("verilog") {
        score += 15_000;
    }
    if app_lower.contains("core") || inst_lower.contains("core") {
        score += 12_000;
    }
    if !repo_normalized.is_empty() {
        let file_normalized: String =
            file_lower.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
        let app_normalized: String =
            app_lower.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
        if repo_normalized == file_normalized || repo_normalized == app_normalized {
            score += 10_000;
        } else if file_normalized.contains(repo_normalized)
            || app_normalized.contains(repo_normalized)
        {
            score += 8_000;
        }
    }
    if file_lower.contains("wishbone") || app_lower.contains("wishbone") {
        score += 20_000;
    }
    if file_lower.contains("cached") || app_lower.contains("cached") {
        score += 2_500;
    }
    if file_lower.contains(&top.to_lowercase()) {
        score += 2_000;
    }
    let soc_count = ["uart", "gpio", "timer", "spi", "i2c", "plic", "clint", "jtag"]
        .iter()
        .filter(|t| content_lower.contains(*t))
        .count();
    score += match soc_count {
        0 => 1_500,
        1 | 2 => 500,
        _ => -2_000,
    };
    if file_lower.contains("demo") || file_lower.contains("example") {
        score -= 1_000;
    }
    if ["briey", "murax", "saxon", "litex"]
        .iter()
        .any(|s| file_lower.contains(s) || app_lower.contains(s))
    {
        score -= 3_000;
    }
    score += text.matches(instantiated).count() as i64 * 10;
    score
}

/// Find every main application that can emit Verilog, best first.
pub fn find_main_apps(
    root: &Path,
    files: &[PathBuf],
    dialect: ScalaDialect,
    top: &str,
    repo_name: &str,
) -> Vec<MainApp> {
    let repo_normalized: String = repo_name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    let mut apps = Vec::new();
    for rel in files {
        let text = util::read_file(&root.join(rel)).unwrap_or_default();
        let (app_name, requires_args) = if let Some(c) = APP_OBJECT.captures(&text) {
            (c[1].to_string(), false)
        } else if let Some(c) = MAIN_METHOD.captures(&text) {
            let tail = &text[c.get(0).unwrap().end()..];
            let window = tail.get(..2000.min(tail.len())).unwrap_or(tail);
            (c[1].to_string(), ARGS_USE.is_match(window))
        } else {
            continue;
        };

        let instantiated = match dialect {
            ScalaDialect::SpinalHdl => {
                if !text.contains("SpinalVerilog") && !text.contains("SpinalConfig") {
                    continue;
                }
                match spinal_instantiated(&text) {
                    Some(m) => m,
                    None => continue,
                }
            }
            ScalaDialect::Chisel => {
                if !text.contains("ChiselStage") && !text.contains("emitVerilog") {
                    continue;
                }
                match NEW_MODULE.captures(&text) {
                    Some(c) => c[1].to_string(),
                    None => continue,
                }
            }
        };

        let main_class = match PACKAGE_DECL.captures(&text) {
            Some(c) => format!("{}.{}", &c[1], app_name),
            None => app_name.clone(),
        };
        let score = score_app(
            &app_name,
            rel,
            &text,
            &instantiated,
            requires_args,
            top,
            &repo_normalized,
        );
        apps.push(MainApp {
            file: rel.clone(),
            main_class,
            app_name,
            instantiated,
            requires_args,
            score,
        });
    }
    apps.sort_by(|a, b| b.score.cmp(&a.score).then(a.main_class.cmp(&b.main_class)));
    apps
}

/// The build-tool command line that runs a main class.
pub fn build_command(root: &Path, tool: BuildTool, main_class: &str) -> (String, Vec<String>) {
    match tool {
        BuildTool::Sbt => (
            "sbt".to_string(),
            vec![format!("runMain {}", main_class)],
        ),
        BuildTool::Mill => {
            let module = util::read_file(&root.join("build.sc"))
                .ok()
                .and_then(|text| MILL_MODULE.captures(&text).map(|c| c[1].to_string()))
                .unwrap_or_else(|| "root".to_string());
            (
                "mill".to_string(),
                vec![format!("{}.runMain", module), main_class.to_string()],
            )
        }
    }
}

/// All Verilog files currently under the tree, for emit-diff detection.
fn verilog_snapshot(root: &Path) -> BTreeSet<PathBuf> {
    scan::all_with_extensions(root, &["v", "sv"]).into_iter().collect()
}

/// Run the full Chisel/SpinalHDL pipeline for a session.
///
/// Runs the best-scored main application through the build tool; the
/// Verilog it emits is then configured by the Verilog backend, and the
/// build-tool command is recorded as the configuration's `pre_script`.
pub fn configure(sess: &Session) -> Result<Config> {
    let tool = detect_build_tool(sess.root).ok_or_else(|| {
        Error::new(format!(
            "No build.sbt or build.sc found in {:?}.",
            sess.root
        ))
    })?;
    let binary = match tool {
        BuildTool::Sbt => "sbt",
        BuildTool::Mill => "mill",
    };
    which::which(binary).map_err(|cause| {
        Error::chain(format!("Build tool `{}` not found on PATH.", binary), cause)
    })?;

    let mut scanned = scan::scan(sess.root, Flavor::Chisel)?;
    scanned.files.retain(|f| {
        !f.components().any(|c| {
            matches!(
                c.as_os_str().to_string_lossy().to_lowercase().as_str(),
                "target" | "project" | "out"
            )
        })
    });
    let extraction = extract::extract(sess.root, Flavor::Chisel, &scanned.files);
    let graph = UnitGraph::from_extraction(&extraction);
    let ranked = rank::rank(&graph, &extraction, &sess.name);
    let top = ranked
        .first()
        .map(|r| r.name.clone())
        .ok_or_else(|| Error::new(format!("No module classes found in {:?}.", sess.root)))?;

    let dialect = detect_dialect(sess.root, &scanned.files);
    let apps = find_main_apps(sess.root, &scanned.files, dialect, &top, &sess.name);
    if apps.is_empty() {
        return Err(Error::new(format!(
            "No Verilog-emitting main application found in {:?}.",
            sess.root
        )));
    }
    if let Some(listing) = util::string_list(apps.iter().map(|a| a.app_name.as_str()), ",", "and")
    {
        log::info!("chisel: found applications {}", listing);
    }

    for app in apps.iter().take(sess.candidate_cap) {
        log::info!(
            "chisel: trying app {} (instantiates {}, score {})",
            app.main_class,
            app.instantiated,
            app.score
        );
        let before = verilog_snapshot(sess.root);
        let (program, args) = build_command(sess.root, tool, &app.main_class);
        let outcome = driver::run(&program, &args, sess.root, sess.timeout, sess.stream)?;
        if !outcome.is_clean() {
            continue;
        }
        let emitted: Vec<PathBuf> = verilog_snapshot(sess.root)
            .difference(&before)
            .cloned()
            .collect();
        if emitted.is_empty() {
            log::info!("chisel: app {} emitted no Verilog", app.main_class);
            continue;
        }

        // Fall through to the Verilog backend over the emitted sources.
        let predominant_ext = emitted
            .iter()
            .filter_map(|f| f.extension().map(|e| e.to_string_lossy().to_lowercase()))
            .next()
            .unwrap_or_else(|| "v".to_string());
        let emitted_scan = scan::Scan {
            files: emitted,
            tb_files: Vec::new(),
            include_dirs: Default::default(),
            predominant_ext,
        };
        let pre_script = format!("{} {}", program, args.join(" "));
        return verilog::configure_scanned(sess, emitted_scan, Some(pre_script));
    }

    // No application produced Verilog: emit a failure record naming the
    // best-ranked module class.
    Ok(Config::new(
        &sess.name,
        &sess.name,
        &top,
        &[],
        &scanned.tb_files,
        &Default::default(),
        &[],
        Flavor::Chisel.language_version(&scanned.predominant_ext),
        false,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn touch(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn build_tool_detection() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(detect_build_tool(dir.path()), None);
        touch(dir.path(), "build.sbt", "name := \"core\"\n");
        assert_eq!(detect_build_tool(dir.path()), Some(BuildTool::Sbt));
    }

    #[test]
    fn mill_module_resolution() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            dir.path(),
            "build.sc",
            "object rtl extends SbtScalaModule {\n}\n",
        );
        let (program, args) = build_command(dir.path(), BuildTool::Mill, "cpu.Elaborate");
        assert_eq!(program, "mill");
        assert_eq!(args, vec!["rtl.runMain".to_string(), "cpu.Elaborate".to_string()]);
    }

    #[test]
    fn sbt_run_main() {
        let dir = tempfile::tempdir().unwrap();
        let (program, args) = build_command(dir.path(), BuildTool::Sbt, "cpu.Elaborate");
        assert_eq!(program, "sbt");
        assert_eq!(args, vec!["runMain cpu.Elaborate".to_string()]);
    }

    #[test]
    fn finds_and_ranks_chisel_apps() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            dir.path(),
            "src/main/scala/Elaborate.scala",
            "package mycpu\nobject Elaborate extends App {\n  (new chisel3.stage.ChiselStage).emitVerilog(new Core())\n}\n",
        );
        touch(
            dir.path(),
            "src/main/scala/UartMain.scala",
            "package mycpu\nobject UartMain extends App {\n  (new chisel3.stage.ChiselStage).emitVerilog(new Uart())\n}\n",
        );
        let files = vec![
            PathBuf::from("src/main/scala/Elaborate.scala"),
            PathBuf::from("src/main/scala/UartMain.scala"),
        ];
        let apps = find_main_apps(dir.path(), &files, ScalaDialect::Chisel, "Core", "mycpu");
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0].main_class, "mycpu.Elaborate");
        assert_eq!(apps[0].instantiated, "Core");
        assert!(apps[0].score > apps[1].score);
    }

    #[test]
    fn spinal_skips_plugins() {
        let text = "\
object CoreVerilog extends App {
  SpinalVerilog {
    val cpu = new VexRiscv(config)
    cpu
  }
}
";
        assert_eq!(spinal_instantiated(text), Some("VexRiscv".to_string()));
        let plugin_text = "SpinalVerilog { new IBusSimplePlugin(x); new MyCore() }";
        assert_eq!(spinal_instantiated(plugin_text), Some("MyCore".to_string()));
    }

    #[test]
    fn args_requiring_apps_are_disqualified() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            dir.path(),
            "src/Gen.scala",
            "package g\nobject Gen {\n  def main(args: Array[String]) = {\n    val dir = args(0)\n    (new chisel3.stage.ChiselStage).emitVerilog(new Core())\n  }\n}\n",
        );
        let apps = find_main_apps(
            dir.path(),
            &[PathBuf::from("src/Gen.scala")],
            ScalaDialect::Chisel,
            "Core",
            "g",
        );
        assert_eq!(apps.len(), 1);
        assert!(apps[0].requires_args);
        assert!(apps[0].score < 0);
    }
}
