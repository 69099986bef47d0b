//! Shared test infrastructure for integration tests.
//!
//! A [`Project`] is a throwaway project root with shell stubs standing in for
//! Meeko and Vina. Stubs are invoked as `sh <script>`, so no exec bit is needed,
//! and every call appends a line to a per-tool calls file.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use tempfile::TempDir;

/// Restricted search path so host installs of the real tools never leak in.
pub const TEST_PATH: &str = "/usr/bin:/bin";

pub type Row = BTreeMap<String, String>;

pub struct Project {
    dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let project = Self { dir };
        for sub in ["3D_Structures", "config", "receptors"] {
            fs::create_dir_all(project.root().join(sub)).expect("mkdir");
        }
        fs::write(
            project.receptor_path(),
            "ATOM      1  N   ALA A   1      11.104   6.134  -6.504  1.00  0.00     0.246 N\n",
        )
        .expect("write receptor");
        project
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    pub fn receptor_path(&self) -> PathBuf {
        self.path("receptors/target_prepared.pdbqt")
    }

    pub fn add_sdf(&self, id: &str) {
        let body = format!("{id}\n  vscreen-test\n\n  2  1  0  0  0  0            999 V2000\nM  END\n$$$$\n");
        fs::write(self.path(&format!("3D_Structures/{id}.sdf")), body).expect("write sdf");
    }

    /// Write both tool stubs and a run.yml pointing at them.
    pub fn install_tools(&self) {
        self.install_tools_with("");
    }

    pub fn install_tools_with(&self, extra_yaml: &str) {
        let meeko = self.write_stub("meeko_stub.sh", &meeko_script(&self.calls_path("meeko"), 0));
        let vina = self.write_stub("vina_stub.sh", &vina_script(&self.calls_path("vina")));
        self.write_run_yml(&format!(
            "tools:\n  meeko_cmd: \"sh {meeko}\"\n  python_exe: /nonexistent/python\n  vina_cmd: \"sh {vina}\"\n  vina_gpu_cmd: \"sh {vina}\"\n{extra_yaml}",
            meeko = meeko.display(),
            vina = vina.display()
        ));
    }

    /// Make the Meeko stub sleep before each item.
    pub fn slow_meeko(&self, seconds: u32) {
        self.write_stub(
            "meeko_stub.sh",
            &meeko_script(&self.calls_path("meeko"), seconds),
        );
    }

    pub fn write_run_yml(&self, text: &str) {
        fs::write(self.path("config/run.yml"), text).expect("write run.yml");
    }

    fn write_stub(&self, name: &str, script: &str) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, script).expect("write stub");
        path
    }

    fn calls_path(&self, tool: &str) -> PathBuf {
        self.path(&format!("{tool}_calls.txt"))
    }

    /// Number of times `tool` ("meeko" or "vina") was invoked.
    pub fn calls(&self, tool: &str) -> usize {
        fs::read_to_string(self.calls_path(tool))
            .map(|text| text.lines().count())
            .unwrap_or(0)
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_vscreen"));
        command
            .args(args)
            .arg("--project")
            .arg(self.root())
            .env("PATH", TEST_PATH)
            .env_remove("RUST_LOG")
            .current_dir(self.root());
        command
    }

    pub fn vscreen(&self, args: &[&str]) -> Output {
        self.command(args).output().expect("run vscreen")
    }

    pub fn spawn(&self, args: &[&str]) -> Child {
        self.command(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn vscreen")
    }

    pub fn manifest_rows(&self) -> Vec<Row> {
        read_csv(&self.path("state/manifest.csv"))
    }

    pub fn row(&self, id: &str) -> Row {
        self.manifest_rows()
            .into_iter()
            .find(|row| row.get("id").map(String::as_str) == Some(id))
            .unwrap_or_else(|| panic!("manifest row {id} missing"))
    }
}

impl Default for Project {
    fn default() -> Self {
        Self::new()
    }
}

pub fn read_csv(path: &Path) -> Vec<Row> {
    let mut reader = csv::Reader::from_path(path)
        .unwrap_or_else(|err| panic!("open {}: {err}", path.display()));
    reader
        .deserialize()
        .map(|row| row.expect("csv row"))
        .collect()
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

pub fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "vscreen failed\nstdout:\n{}\nstderr:\n{}",
        stdout(output),
        stderr(output)
    );
}

/// Writes a ligand PDBQT for `-i`/`-o`. Inputs whose name contains `BROKEN`
/// get a truncated file that fails validation.
fn meeko_script(calls: &Path, sleep_seconds: u32) -> String {
    format!(
        r#"in=""
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -i) in="$2"; shift ;;
    -o) out="$2"; shift ;;
  esac
  shift
done
echo "$in" >> "{calls}"
if [ {sleep_seconds} -gt 0 ]; then sleep {sleep_seconds}; fi
case "$in" in
  *BROKEN*)
    echo "TORSDOF 0" > "$out"
    echo "wrote truncated output"
    exit 0
    ;;
esac
{{
  echo "REMARK  Name = ligand prepared by stub"
  echo "REMARK  1 active torsions:"
  echo "ROOT"
  echo "ATOM      1  C   UNL     1       0.000   0.000   0.000  0.00  0.00    +0.000 C"
  echo "ATOM      2  O   UNL     1       1.200   0.000   0.000  0.00  0.00    -0.300 OA"
  echo "ENDROOT"
  echo "TORSDOF 1"
}} > "$out"
echo "prepared $in"
"#,
        calls = calls.display()
    )
}

/// Writes a two-model pose for `--out`. Ligands named `*LIG002*` score -9.10,
/// everything else -7.50.
fn vina_script(calls: &Path) -> String {
    format!(
        r#"ligand=""
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --ligand) ligand="$2"; shift ;;
    --out) out="$2"; shift ;;
  esac
  shift
done
echo "$ligand" >> "{calls}"
score="-7.500"
case "$ligand" in
  *LIG002*) score="-9.100" ;;
esac
{{
  i=0
  while [ $i -lt 5 ]; do
    echo "REMARK padding line to exceed the minimum output size"
    i=$((i + 1))
  done
  echo "MODEL 1"
  echo "REMARK VINA RESULT:    $score      0.000      0.000"
  echo "ENDMDL"
  echo "MODEL 2"
  echo "REMARK VINA RESULT:    -5.000      1.000      2.000"
  echo "ENDMDL"
}} > "$out"
echo "docking done"
"#,
        calls = calls.display()
    )
}
