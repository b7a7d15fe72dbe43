//! Integration tests for the install/uninstall lifecycle.
//!
//! These tests run the real lifecycle against a temporary directory laid
//! out like a host filesystem, with systemctl and modprobe replaced by an
//! in-memory fake that tracks unit and module state.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use nix::unistd::geteuid;
use tempfile::TempDir;

use f007th_setup::config::Settings;
use f007th_setup::error::SetupError;
use f007th_setup::executor::{ProcessRunner, SubprocessResult};
use f007th_setup::kmod::params_path;
use f007th_setup::lifecycle::{ExecutionContext, Lifecycle, LifecycleState, StepOutcome};

/// Fake host tools: systemctl keeps loaded/active/enabled sets, modprobe
/// edits the fake `/proc/modules`.
struct FakeHost {
    unit_dir: PathBuf,
    proc_modules: PathBuf,
    state: Mutex<HostState>,
}

#[derive(Default)]
struct HostState {
    calls: Vec<String>,
    /// Units systemd has read; refreshed from the unit dir by daemon-reload.
    loaded: HashSet<String>,
    active: HashSet<String>,
    /// Units waiting to be restarted (`ActiveState=activating`).
    restarting: HashSet<String>,
    enabled: HashSet<String>,
    /// Command prefixes that exit 1 without side effects.
    failing: Vec<String>,
    /// modprobe loads the module but still exits 1.
    load_exits_nonzero: bool,
}

impl FakeHost {
    fn new(unit_dir: PathBuf, proc_modules: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            unit_dir,
            proc_modules,
            state: Mutex::new(HostState::default()),
        })
    }

    fn fail_on(&self, prefix: &str) {
        self.state.lock().unwrap().failing.push(prefix.to_string());
    }

    fn clear_failures(&self) {
        self.state.lock().unwrap().failing.clear();
    }

    fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Calls that change host state (everything but state queries).
    fn mutating_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("systemctl show") && !c.contains("is-enabled"))
            .collect()
    }

    fn is_active(&self, unit: &str) -> bool {
        self.state.lock().unwrap().active.contains(unit)
    }

    fn is_enabled(&self, unit: &str) -> bool {
        self.state.lock().unwrap().enabled.contains(unit)
    }

    fn daemon_reload(&self) {
        let loaded: HashSet<String> = fs::read_dir(&self.unit_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .filter(|name| name.ends_with(".service"))
            .collect();
        self.state.lock().unwrap().loaded = loaded;
    }

    /// `systemctl show` output for the properties the lifecycle asks for.
    fn show(&self, unit: &str) -> String {
        let state = self.state.lock().unwrap();
        let loaded = state.loaded.contains(unit);
        let fragment = self.unit_dir.join(unit);
        let active_state = if state.active.contains(unit) {
            "active"
        } else if state.restarting.contains(unit) {
            "activating"
        } else {
            "inactive"
        };
        format!(
            "LoadState={}\nActiveState={}\nFragmentPath={}\nNeedDaemonReload={}\n",
            if loaded { "loaded" } else { "not-found" },
            active_state,
            if loaded { fragment.display().to_string() } else { String::new() },
            if loaded && !fragment.exists() { "yes" } else { "no" },
        )
    }

    fn module_loaded(&self, module: &str) -> bool {
        fs::read_to_string(&self.proc_modules)
            .unwrap_or_default()
            .lines()
            .any(|l| l.split_whitespace().next() == Some(module))
    }

    fn insert_module(&self, module: &str) {
        let mut content = fs::read_to_string(&self.proc_modules).unwrap_or_default();
        content.push_str(&format!("{} 16384 0 - Live 0x0000000000000000\n", module));
        fs::write(&self.proc_modules, content).unwrap();
    }

    fn remove_module(&self, module: &str) {
        let content = fs::read_to_string(&self.proc_modules).unwrap_or_default();
        let kept: String = content
            .lines()
            .filter(|l| l.split_whitespace().next() != Some(module))
            .map(|l| format!("{}\n", l))
            .collect();
        fs::write(&self.proc_modules, kept).unwrap();
    }
}

impl ProcessRunner for FakeHost {
    fn run(&self, program: &str, args: &[&str]) -> Result<SubprocessResult, SetupError> {
        let command = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");

        let (failing, load_exits_nonzero) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(command.clone());
            (
                state.failing.iter().any(|prefix| command.starts_with(prefix.as_str())),
                state.load_exits_nonzero,
            )
        };
        if failing {
            return Ok(SubprocessResult::with_status(1, "", "simulated failure"));
        }

        let ok = || Ok(SubprocessResult::with_status(0, "", ""));

        match (program, args) {
            ("systemctl", ["daemon-reload"]) => {
                self.daemon_reload();
                ok()
            }
            ("systemctl", ["enable", unit]) => {
                self.state.lock().unwrap().enabled.insert(unit.to_string());
                ok()
            }
            ("systemctl", ["disable", unit]) => {
                self.state.lock().unwrap().enabled.remove(*unit);
                ok()
            }
            ("systemctl", ["start", unit]) => {
                self.state.lock().unwrap().active.insert(unit.to_string());
                ok()
            }
            ("systemctl", ["stop", unit]) => {
                let mut state = self.state.lock().unwrap();
                state.active.remove(*unit);
                state.restarting.remove(*unit);
                ok()
            }
            ("systemctl", ["show", _, unit]) => {
                Ok(SubprocessResult::with_status(0, &self.show(unit), ""))
            }
            ("systemctl", ["is-enabled", "--quiet", unit]) => {
                let code = if self.is_enabled(unit) { 0 } else { 1 };
                Ok(SubprocessResult::with_status(code, "", ""))
            }
            ("modprobe", ["-r", module]) => {
                self.remove_module(module);
                ok()
            }
            ("modprobe", [module, ..]) => {
                if !self.module_loaded(module) {
                    self.insert_module(module);
                }
                if load_exits_nonzero {
                    Ok(SubprocessResult::with_status(1, "", "modprobe: ERROR: File exists"))
                } else {
                    ok()
                }
            }
            _ => Ok(SubprocessResult::with_status(127, "", "unknown command")),
        }
    }
}

/// A temporary host filesystem plus the fake tools acting on it.
struct TestHost {
    root: TempDir,
    host: Arc<FakeHost>,
    settings: Settings,
}

impl TestHost {
    fn new() -> Self {
        let root = TempDir::new().expect("Failed to create temp directory");
        let path = root.path();

        fs::create_dir_all(path.join("etc/systemd/system")).unwrap();
        fs::create_dir_all(path.join("etc/modprobe.d")).unwrap();
        fs::create_dir_all(path.join("proc")).unwrap();
        fs::write(path.join("etc/modules"), "# /etc/modules\ni2c-dev\n").unwrap();
        fs::write(
            path.join("proc/modules"),
            "i2c_dev 20480 2 - Live 0x0000000000000000\n",
        )
        .unwrap();

        let mut settings = Settings::default();
        settings.require_root = false;
        settings.paths.unit_dir = path.join("etc/systemd/system");
        settings.paths.modules_load_file = path.join("etc/modules");
        settings.paths.modprobe_dir = path.join("etc/modprobe.d");
        settings.paths.proc_modules = path.join("proc/modules");

        let host = FakeHost::new(
            settings.paths.unit_dir.clone(),
            settings.paths.proc_modules.clone(),
        );

        Self {
            root,
            host,
            settings,
        }
    }

    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::with_runner(self.settings.clone(), self.host.clone())
            .expect("Failed to build lifecycle")
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.root.path().join(relative)
    }

    fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path(relative)).unwrap()
    }

    fn unit_file(&self) -> PathBuf {
        self.path("etc/systemd/system/f007th.service")
    }

    /// Every file under the root with its content.
    fn snapshot(&self) -> BTreeMap<PathBuf, String> {
        let mut files = BTreeMap::new();
        collect_files(self.root.path(), &mut files);
        files
    }
}

fn collect_files(dir: &Path, files: &mut BTreeMap<PathBuf, String>) {
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect_files(&path, files);
        } else {
            files.insert(path.clone(), fs::read_to_string(&path).unwrap());
        }
    }
}

fn step_names(report: &f007th_setup::lifecycle::Report) -> Vec<&str> {
    report.steps.iter().map(|s| s.step.as_str()).collect()
}

fn position(calls: &[String], wanted: &str) -> usize {
    calls
        .iter()
        .position(|c| c == wanted)
        .unwrap_or_else(|| panic!("'{}' not called; calls: {:?}", wanted, calls))
}

#[test]
fn test_install_on_fresh_host() {
    let host = TestHost::new();
    let report = host.lifecycle().install().unwrap();

    assert_eq!(
        step_names(&report),
        vec![
            "module.boot_list.add",
            "module.params.write",
            "module.load",
            "unit.write",
            "unit.daemon_reload",
            "unit.enable",
            "unit.start",
        ]
    );
    assert!(report.steps.iter().all(|s| s.outcome == StepOutcome::Applied));

    assert_eq!(host.read("etc/modules"), "# /etc/modules\ni2c-dev\ngpio_ts\n");
    assert_eq!(
        host.read("etc/modprobe.d/gpio_ts.conf"),
        "options gpio_ts gpios=17\n"
    );

    let unit = fs::read_to_string(host.unit_file()).unwrap();
    assert!(unit.contains("ExecStart=/bin/sh -c \"/home/pi/f007th/f007th-send 17 "));
    assert!(unit.contains("User=pi\n"));
    assert!(unit.contains("Restart=always\n"));

    assert_eq!(
        host.host.mutating_calls(),
        vec![
            "modprobe gpio_ts gpios=17",
            "systemctl daemon-reload",
            "systemctl enable f007th.service",
            "systemctl start f007th.service",
        ]
    );
    assert!(host.host.module_loaded("gpio_ts"));
    assert!(host.host.is_active("f007th.service"));
    assert!(host.host.is_enabled("f007th.service"));
}

#[test]
fn test_install_twice_is_idempotent() {
    let host = TestHost::new();
    let lifecycle = host.lifecycle();

    lifecycle.install().unwrap();
    let after_first = host.snapshot();

    let second = lifecycle.install().unwrap();
    assert_eq!(host.snapshot(), after_first);

    for step in [
        "module.boot_list.add",
        "module.params.write",
        "module.load",
        "unit.write",
    ] {
        assert_eq!(second.outcome(step), Some(&StepOutcome::Unchanged), "{}", step);
    }
    // Boot list still has exactly one entry
    assert_eq!(host.read("etc/modules").matches("gpio_ts").count(), 1);
}

#[test]
fn test_reinstall_overwrites_changed_definition() {
    let mut host = TestHost::new();
    host.lifecycle().install().unwrap();

    host.settings.sensor.gpio = 22;
    let report = host.lifecycle().install().unwrap();

    assert_eq!(report.outcome("unit.write"), Some(&StepOutcome::Applied));
    assert_eq!(report.outcome("module.params.write"), Some(&StepOutcome::Applied));
    assert_eq!(
        host.read("etc/modprobe.d/gpio_ts.conf"),
        "options gpio_ts gpios=22\n"
    );
    let unit = fs::read_to_string(host.unit_file()).unwrap();
    assert!(unit.contains("f007th-send 22 "));
    assert_eq!(unit.matches("[Service]").count(), 1);
}

#[test]
fn test_uninstall_twice_second_run_changes_nothing() {
    let host = TestHost::new();
    let lifecycle = host.lifecycle();
    lifecycle.install().unwrap();

    let first = lifecycle.uninstall().unwrap();
    assert!(first.changed());

    host.host.clear_calls();
    let second = lifecycle.uninstall().unwrap();

    assert!(!second.changed());
    assert!(host.host.mutating_calls().is_empty(), "{:?}", host.host.calls());
}

#[test]
fn test_uninstall_on_clean_host_succeeds() {
    let host = TestHost::new();
    let before = host.snapshot();

    let report = host.lifecycle().uninstall().unwrap();

    assert!(!report.changed());
    assert!(host.host.mutating_calls().is_empty());
    assert_eq!(host.snapshot(), before);
}

#[test]
fn test_install_then_uninstall_leaves_no_residue() {
    let host = TestHost::new();
    let before = host.snapshot();

    let lifecycle = host.lifecycle();
    lifecycle.install().unwrap();
    lifecycle.uninstall().unwrap();

    assert_eq!(host.snapshot(), before);
    assert!(!host.host.is_active("f007th.service"));
    assert!(!host.host.is_enabled("f007th.service"));
}

#[test]
fn test_uninstall_order() {
    let host = TestHost::new();
    let lifecycle = host.lifecycle();
    lifecycle.install().unwrap();
    host.host.clear_calls();

    let report = lifecycle.uninstall().unwrap();
    assert_eq!(
        step_names(&report),
        vec![
            "unit.stop",
            "unit.disable",
            "unit.remove",
            "unit.daemon_reload",
            "module.unload",
            "module.params.remove",
            "module.boot_list.remove",
        ]
    );

    let calls = host.host.mutating_calls();
    let stop = position(&calls, "systemctl stop f007th.service");
    let disable = position(&calls, "systemctl disable f007th.service");
    let reload = position(&calls, "systemctl daemon-reload");
    let unload = position(&calls, "modprobe -r gpio_ts");
    assert!(stop < disable && disable < reload && reload < unload);
}

#[test]
fn test_uninstall_retry_reloads_after_failed_reload() {
    let host = TestHost::new();
    let lifecycle = host.lifecycle();
    lifecycle.install().unwrap();

    host.host.fail_on("systemctl daemon-reload");
    let err = lifecycle.uninstall().unwrap_err();
    assert!(matches!(err, SetupError::StepFailed { ref step, .. } if step == "unit.daemon_reload"));
    assert!(!host.unit_file().exists());

    host.host.clear_failures();
    host.host.clear_calls();
    let retry = lifecycle.uninstall().unwrap();

    assert_eq!(retry.outcome("unit.remove"), Some(&StepOutcome::Unchanged));
    assert_eq!(retry.outcome("unit.daemon_reload"), Some(&StepOutcome::Applied));
    assert!(host.host.calls().contains(&"systemctl daemon-reload".to_string()));

    // systemd has caught up; nothing left to do
    host.host.clear_calls();
    let settled = lifecycle.uninstall().unwrap();
    assert!(!settled.changed());
    assert!(host.host.mutating_calls().is_empty(), "{:?}", host.host.calls());
}

#[test]
fn test_uninstall_stops_unit_waiting_to_restart() {
    let host = TestHost::new();
    let lifecycle = host.lifecycle();
    lifecycle.install().unwrap();
    {
        let mut state = host.host.state.lock().unwrap();
        state.active.remove("f007th.service");
        state.restarting.insert("f007th.service".to_string());
    }

    let report = lifecycle.uninstall().unwrap();

    assert_eq!(report.outcome("unit.stop"), Some(&StepOutcome::Applied));
    assert!(host
        .host
        .mutating_calls()
        .contains(&"systemctl stop f007th.service".to_string()));
    assert!(host.host.state.lock().unwrap().restarting.is_empty());
}

#[test]
fn test_unload_failure_keeps_boot_registration() {
    let host = TestHost::new();
    let lifecycle = host.lifecycle();
    lifecycle.install().unwrap();
    host.host.fail_on("modprobe -r");

    let err = lifecycle.uninstall().unwrap_err();

    assert_eq!(err.code(), "MODULE_LOAD_FAILED");
    assert!(matches!(err, SetupError::StepFailed { ref step, .. } if step == "module.unload"));
    assert!(host.read("etc/modules").contains("gpio_ts\n"));
    assert!(host.path("etc/modprobe.d/gpio_ts.conf").exists());
    // The unit side had already been removed
    assert!(!host.unit_file().exists());
}

#[test]
fn test_remove_boot_load_keeps_other_entries() {
    let host = TestHost::new();
    fs::write(host.path("etc/modules"), "gpio_ts\nothermodule\n").unwrap();

    let lifecycle = host.lifecycle();
    let outcome = lifecycle.modules().remove_boot_load("gpio_ts").unwrap();

    assert_eq!(outcome, StepOutcome::Applied);
    assert_eq!(host.read("etc/modules"), "othermodule\n");
}

#[test]
fn test_set_module_params_replaces_content() {
    let host = TestHost::new();
    let lifecycle = host.lifecycle();
    let modules = lifecycle.modules();
    let params = |pin: &str| BTreeMap::from([("gpios".to_string(), pin.to_string())]);

    modules.set_module_params("gpio_ts", &params("17")).unwrap();
    let path = params_path(&host.settings.paths.modprobe_dir, "gpio_ts");
    assert_eq!(fs::read_to_string(&path).unwrap(), "options gpio_ts gpios=17\n");

    modules.set_module_params("gpio_ts", &params("22")).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "options gpio_ts gpios=22\n");

    assert_eq!(
        modules.clear_module_params("gpio_ts").unwrap(),
        StepOutcome::Applied
    );
    assert!(!path.exists());
}

#[test]
fn test_unload_of_absent_module_makes_no_loader_call() {
    let host = TestHost::new();
    let lifecycle = host.lifecycle();

    let outcome = lifecycle.modules().unload_module("gpio_ts").unwrap();

    assert_eq!(outcome, StepOutcome::Unchanged);
    assert!(host.host.calls().iter().all(|c| !c.starts_with("modprobe")));
}

#[test]
fn test_load_failure_is_not_fatal() {
    let host = TestHost::new();
    host.host.fail_on("modprobe gpio_ts");

    let report = host.lifecycle().install().unwrap();

    assert!(matches!(
        report.outcome("module.load"),
        Some(StepOutcome::Skipped { .. })
    ));
    assert_eq!(report.outcome("unit.start"), Some(&StepOutcome::Applied));
    assert!(host.read("etc/modules").contains("gpio_ts\n"));
    assert!(host.host.is_active("f007th.service"));
}

#[test]
fn test_load_error_when_already_loaded_is_swallowed() {
    let host = TestHost::new();
    host.host.state.lock().unwrap().load_exits_nonzero = true;

    let outcome = host
        .lifecycle()
        .modules()
        .load_module("gpio_ts", &BTreeMap::new())
        .unwrap();

    assert_eq!(outcome, StepOutcome::Unchanged);
    assert!(host.host.module_loaded("gpio_ts"));
}

#[test]
fn test_load_skipped_when_already_loaded() {
    let host = TestHost::new();
    host.host.insert_module("gpio_ts");

    let outcome = host
        .lifecycle()
        .modules()
        .load_module("gpio_ts", &BTreeMap::new())
        .unwrap();

    assert_eq!(outcome, StepOutcome::Unchanged);
    assert!(host.host.calls().is_empty());
}

#[test]
fn test_daemon_reload_failure_aborts_install() {
    let host = TestHost::new();
    host.host.fail_on("systemctl daemon-reload");

    let err = host.lifecycle().install().unwrap_err();

    assert_eq!(err.code(), "SUPERVISION_FAILED");
    assert!(matches!(err, SetupError::StepFailed { ref step, .. } if step == "unit.daemon_reload"));
    let calls = host.host.calls();
    assert!(!calls.iter().any(|c| c.contains("enable") || c.contains("start")));
    assert!(!host.host.is_active("f007th.service"));
}

#[test]
fn test_unwritable_unit_dir_is_write_error() {
    let mut host = TestHost::new();
    let blocker = host.path("not-a-dir");
    fs::write(&blocker, "").unwrap();
    host.settings.paths.unit_dir = blocker.join("system");

    let err = host.lifecycle().install().unwrap_err();

    assert!(matches!(err, SetupError::StepFailed { ref step, .. } if step == "unit.write"));
    assert_eq!(err.code(), "WRITE_FAILED");
    assert!(host.host.calls().iter().all(|c| !c.starts_with("systemctl")));
}

#[test]
fn test_requires_root_when_enforced() {
    if geteuid().is_root() {
        return;
    }
    let mut host = TestHost::new();
    host.settings.require_root = true;
    let before = host.snapshot();

    let lifecycle = host.lifecycle();
    assert!(matches!(lifecycle.install(), Err(SetupError::Permission { .. })));
    assert!(matches!(lifecycle.uninstall(), Err(SetupError::Permission { .. })));
    assert!(host.host.calls().is_empty());
    assert_eq!(host.snapshot(), before);
}

#[test]
fn test_status_follows_lifecycle() {
    let host = TestHost::new();
    let lifecycle = host.lifecycle();

    assert_eq!(lifecycle.status().unwrap().state, LifecycleState::Absent);

    lifecycle.modules().ensure_boot_load("gpio_ts").unwrap();
    assert_eq!(lifecycle.status().unwrap().state, LifecycleState::BootConfigured);

    lifecycle.install().unwrap();
    let status = lifecycle.status().unwrap();
    assert_eq!(status.state, LifecycleState::Active);
    assert!(status.unit_enabled && status.module_loaded && status.params_present);

    lifecycle.units().stop("f007th.service").unwrap();
    assert_eq!(lifecycle.status().unwrap().state, LifecycleState::UnitInstalled);

    lifecycle.uninstall().unwrap();
    assert_eq!(lifecycle.status().unwrap().state, LifecycleState::Absent);
}

#[test]
fn test_unit_manager_install_and_uninstall() {
    let host = TestHost::new();
    let lifecycle = host.lifecycle();
    let units = lifecycle.units();
    let definition = lifecycle.definition();

    let installed = units
        .install_unit(&ExecutionContext::new("install"), definition)
        .unwrap();
    assert_eq!(installed.steps.len(), 4);
    assert!(units.is_installed("f007th.service"));

    let removed = units
        .uninstall_unit(&ExecutionContext::new("uninstall"), "f007th.service")
        .unwrap();
    assert!(removed.changed());
    assert!(!units.is_installed("f007th.service"));

    let again = units
        .uninstall_unit(&ExecutionContext::new("uninstall"), "f007th.service")
        .unwrap();
    assert!(!again.changed());
}

#[test]
fn test_audit_log_records_steps() {
    let mut host = TestHost::new();
    host.settings.audit.enabled = true;
    host.settings.audit.log_path = host.path("var/log/f007th/audit.log");

    host.lifecycle().install().unwrap();

    let content = host.read("var/log/f007th/audit.log");
    let entries: Vec<serde_json::Value> = content
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(entries.len(), 7);
    assert!(entries.iter().all(|e| e["operation"] == "install"));
    assert_eq!(entries[0]["step"], "module.boot_list.add");
    assert_eq!(entries[6]["step"], "unit.start");
    assert_eq!(entries[0]["run_id"], entries[6]["run_id"]);
}
