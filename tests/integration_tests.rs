//! End-to-end CLI tests for the cutover coordinator.
//!
//! Every invocation runs against a temp project directory with its own
//! SQLite database; the data stores are the deterministic demo fixtures,
//! where `users` agrees on both sides and `orders` is short 50 rows in the
//! new store.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn cutover() -> Command {
    cargo_bin_cmd!("cutover")
}

fn temp_project() -> TempDir {
    TempDir::new().unwrap()
}

fn init_project(dir: &TempDir) {
    cutover()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();
}

/// Rewrite the config so the stabilization period does not block
/// completion inside a test run.
fn zero_stabilization(dir: &TempDir) {
    fs::write(
        dir.path().join("cutover.toml"),
        "[validation]\nstabilization_hours = 0\n",
    )
    .unwrap();
}

fn plan_add(dir: &TempDir, table: &str) {
    cutover()
        .current_dir(dir.path())
        .args(["plan", "add", table])
        .assert()
        .success();
}

fn prepare(dir: &TempDir, table: &str) -> assert_cmd::assert::Assert {
    cutover()
        .current_dir(dir.path())
        .args(["prepare", table])
        .assert()
}

fn check_all_gates(dir: &TempDir, table: &str) {
    for gate in [
        "data_consistency",
        "referential_integrity",
        "performance_validation",
        "security_validation",
        "backup_complete",
        "freeze_window_scheduled",
        "team_notified",
        "rollback_plan_ready",
    ] {
        cutover()
            .current_dir(dir.path())
            .args(["gate", table, gate, "--by", "ops"])
            .assert()
            .success();
    }
}

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        cutover().arg("--help").assert().success();
    }

    #[test]
    fn test_version() {
        cutover().arg("--version").assert().success();
    }

    #[test]
    fn test_init_creates_config_and_database() {
        let dir = temp_project();
        cutover()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("cutover.toml"));

        assert!(dir.path().join("cutover.toml").exists());
        assert!(dir.path().join(".cutover/cutover.db").exists());
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = temp_project();
        init_project(&dir);
        cutover()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .failure()
            .code(4);
    }

    #[test]
    fn test_empty_plan_listing() {
        let dir = temp_project();
        init_project(&dir);
        cutover()
            .current_dir(dir.path())
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("No tables in the migration plan"));
    }

    #[test]
    fn test_unknown_table_is_store_internal_error() {
        let dir = temp_project();
        init_project(&dir);
        cutover()
            .current_dir(dir.path())
            .args(["show", "ghost"])
            .assert()
            .failure()
            .code(4)
            .stderr(predicate::str::contains("not part of the migration plan"));
    }

    #[test]
    fn test_unknown_gate_name_is_rejected() {
        let dir = temp_project();
        init_project(&dir);
        plan_add(&dir, "users");
        prepare(&dir, "users").success();
        cutover()
            .current_dir(dir.path())
            .args(["gate", "users", "made_up_gate", "--by", "ops"])
            .assert()
            .failure()
            .code(4);
    }
}

mod consistent_table_flow {
    use super::*;

    #[test]
    fn test_prepare_reports_passed_validation() {
        let dir = temp_project();
        init_project(&dir);
        plan_add(&dir, "users");

        prepare(&dir, "users")
            .success()
            .stdout(predicate::str::contains("passed"))
            .stdout(predicate::str::contains("drift 0.00%"));
    }

    #[test]
    fn test_prepare_is_repeatable() {
        let dir = temp_project();
        init_project(&dir);
        plan_add(&dir, "users");

        prepare(&dir, "users").success();
        prepare(&dir, "users")
            .success()
            .stdout(predicate::str::contains("drift 0.00%"));
    }

    #[test]
    fn test_full_cutover_succeeds() {
        let dir = temp_project();
        init_project(&dir);
        plan_add(&dir, "users");
        prepare(&dir, "users").success();
        check_all_gates(&dir, "users");

        cutover()
            .current_dir(dir.path())
            .args(["cutover", "users", "--actor", "ops"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Cutover complete"));

        cutover()
            .current_dir(dir.path())
            .args(["show", "users"])
            .assert()
            .success()
            .stdout(predicate::str::contains("status:       cutover"))
            .stdout(predicate::str::contains("read=new write=dual"));
    }

    #[test]
    fn test_cutover_leaves_a_completed_window_and_a_job() {
        let dir = temp_project();
        init_project(&dir);
        plan_add(&dir, "users");
        prepare(&dir, "users").success();
        check_all_gates(&dir, "users");
        cutover()
            .current_dir(dir.path())
            .args(["cutover", "users", "--actor", "ops"])
            .assert()
            .success();

        cutover()
            .current_dir(dir.path())
            .arg("windows")
            .assert()
            .success()
            .stdout(predicate::str::contains("completed"))
            .stdout(predicate::str::contains("users"));

        cutover()
            .current_dir(dir.path())
            .args(["jobs", "--table", "users"])
            .assert()
            .success()
            .stdout(predicate::str::contains("incremental"))
            .stdout(predicate::str::contains("1000/1000"));
    }

    #[test]
    fn test_complete_retires_dual_write() {
        let dir = temp_project();
        init_project(&dir);
        zero_stabilization(&dir);
        plan_add(&dir, "users");
        prepare(&dir, "users").success();
        check_all_gates(&dir, "users");
        cutover()
            .current_dir(dir.path())
            .args(["cutover", "users", "--actor", "ops"])
            .assert()
            .success();

        cutover()
            .current_dir(dir.path())
            .args(["complete", "users"])
            .assert()
            .success()
            .stdout(predicate::str::contains("read=new"))
            .stdout(predicate::str::contains("write=new"));

        cutover()
            .current_dir(dir.path())
            .args(["show", "users"])
            .assert()
            .success()
            .stdout(predicate::str::contains("status:       completed"));
    }

    #[test]
    fn test_complete_before_stabilization_is_not_ready() {
        let dir = temp_project();
        init_project(&dir);
        plan_add(&dir, "users");
        prepare(&dir, "users").success();
        check_all_gates(&dir, "users");
        cutover()
            .current_dir(dir.path())
            .args(["cutover", "users", "--actor", "ops"])
            .assert()
            .success();

        // Default stabilization period is 24 hours.
        cutover()
            .current_dir(dir.path())
            .args(["complete", "users"])
            .assert()
            .failure()
            .code(3);
    }
}

mod drifted_table_flow {
    use super::*;

    #[test]
    fn test_prepare_reports_drift() {
        let dir = temp_project();
        init_project(&dir);
        plan_add(&dir, "orders");

        // 950 of 1000 rows made it to the new store: 5% drift.
        prepare(&dir, "orders")
            .success()
            .stdout(predicate::str::contains("failed"))
            .stdout(predicate::str::contains("drift 5.00%"));
    }

    #[test]
    fn test_cutover_is_refused_with_exit_code_3() {
        let dir = temp_project();
        init_project(&dir);
        plan_add(&dir, "orders");
        prepare(&dir, "orders").success();
        check_all_gates(&dir, "orders");

        cutover()
            .current_dir(dir.path())
            .args(["cutover", "orders", "--actor", "ops"])
            .assert()
            .failure()
            .code(3)
            .stderr(predicate::str::contains("not ready"));

        cutover()
            .current_dir(dir.path())
            .args(["show", "orders"])
            .assert()
            .success()
            .stdout(predicate::str::contains("status:       pending"));
    }

    #[test]
    fn test_cutover_without_gates_lists_them() {
        let dir = temp_project();
        init_project(&dir);
        plan_add(&dir, "users");
        prepare(&dir, "users").success();

        cutover()
            .current_dir(dir.path())
            .args(["cutover", "users", "--actor", "ops"])
            .assert()
            .failure()
            .code(3)
            .stderr(predicate::str::contains("missing gates"));
    }
}

mod rollback_flow {
    use super::*;

    fn cut_over_users(dir: &TempDir) {
        plan_add(dir, "users");
        prepare(dir, "users").success();
        check_all_gates(dir, "users");
        cutover()
            .current_dir(dir.path())
            .args(["cutover", "users", "--actor", "ops"])
            .assert()
            .success();
    }

    #[test]
    fn test_rollback_reverts_to_legacy() {
        let dir = temp_project();
        init_project(&dir);
        cut_over_users(&dir);

        cutover()
            .current_dir(dir.path())
            .args([
                "rollback",
                "users",
                "--actor",
                "ops",
                "--reason",
                "drift detected post-cutover",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("Rolled back"));

        cutover()
            .current_dir(dir.path())
            .args(["show", "users"])
            .assert()
            .success()
            .stdout(predicate::str::contains("status:       rolled_back"))
            .stdout(predicate::str::contains("read=legacy write=legacy"));
    }

    #[test]
    fn test_rollback_is_idempotent() {
        let dir = temp_project();
        init_project(&dir);
        cut_over_users(&dir);

        for _ in 0..2 {
            cutover()
                .current_dir(dir.path())
                .args(["rollback", "users", "--actor", "ops", "--reason", "drill"])
                .assert()
                .success();
        }

        cutover()
            .current_dir(dir.path())
            .args(["show", "users"])
            .assert()
            .success()
            .stdout(predicate::str::contains("status:       rolled_back"));
    }

    #[test]
    fn test_retry_reopens_the_table() {
        let dir = temp_project();
        init_project(&dir);
        cut_over_users(&dir);
        cutover()
            .current_dir(dir.path())
            .args(["rollback", "users", "--actor", "ops", "--reason", "drill"])
            .assert()
            .success();

        cutover()
            .current_dir(dir.path())
            .args(["retry", "users"])
            .assert()
            .success()
            .stdout(predicate::str::contains("pending"));

        // The stale validation verdict is gone: cutover needs a new prepare.
        check_all_gates(&dir, "users");
        cutover()
            .current_dir(dir.path())
            .args(["cutover", "users", "--actor", "ops"])
            .assert()
            .failure()
            .code(3);

        // After a fresh prepare the second attempt goes through.
        prepare(&dir, "users").success();
        cutover()
            .current_dir(dir.path())
            .args(["cutover", "users", "--actor", "ops"])
            .assert()
            .success();
    }

    #[test]
    fn test_rollback_of_pending_table_fails() {
        let dir = temp_project();
        init_project(&dir);
        plan_add(&dir, "users");

        cutover()
            .current_dir(dir.path())
            .args(["rollback", "users", "--actor", "ops", "--reason", "nope"])
            .assert()
            .failure()
            .code(4);
    }
}

mod plan_management {
    use super::*;

    #[test]
    fn test_plan_add_is_idempotent() {
        let dir = temp_project();
        init_project(&dir);
        plan_add(&dir, "users");
        prepare(&dir, "users").success();

        // Re-adding must not reset the stored validation.
        plan_add(&dir, "users");
        cutover()
            .current_dir(dir.path())
            .args(["show", "users"])
            .assert()
            .success()
            .stdout(predicate::str::contains("validation:   passed"));
    }

    #[test]
    fn test_list_shows_all_tables() {
        let dir = temp_project();
        init_project(&dir);
        plan_add(&dir, "users");
        plan_add(&dir, "orders");

        cutover()
            .current_dir(dir.path())
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("users"))
            .stdout(predicate::str::contains("orders"))
            .stdout(predicate::str::contains("pending"));
    }
}
