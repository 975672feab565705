//! End-to-end scenarios for the add/reset engine, driven through the binary.

mod common;

use common::{TestRepo, initialized_repo, repo};
use rstest::rstest;

const DEFAULT_MARKER: &str = "# pgit-cli managed exclusions";

fn stderr_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

// =============================================================================
// init
// =============================================================================

#[rstest]
fn init_creates_layout(repo: TestRepo) {
    repo.run_pgit_ok(&["init"]);

    assert!(repo.path().join(".git-private").is_dir());
    assert!(repo.path().join(".private-storage").is_dir());
    assert!(repo.path().join(".private-config.json").is_file());
    assert!(repo.tracked_paths().is_empty());
}

#[rstest]
fn init_twice_fails(repo: TestRepo) {
    repo.run_pgit_ok(&["init"]);
    let second = repo.run_pgit(&["init"]);
    assert!(!second.status.success());
    assert!(stderr_of(&second).contains("already"));
}

#[rstest]
fn add_before_init_fails(repo: TestRepo) {
    repo.write_file("secret.env", "TOKEN=1\n");
    let output = repo.run_pgit(&["add", "secret.env"]);
    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("not initialized"));
    assert!(repo.is_regular_file("secret.env"));
}

// =============================================================================
// E1 — single file happy path
// =============================================================================

#[rstest]
fn e1_single_file_happy_path(initialized_repo: TestRepo) {
    let repo = initialized_repo;
    repo.write_file("secret.env", "TOKEN=hunter2\n");

    repo.run_pgit_ok(&["add", "secret.env"]);

    assert!(repo.path().join(".git-private").is_dir());
    assert!(repo.is_regular_file(".private-storage/secret.env"));
    assert!(repo.is_symlink("secret.env"));
    // The link still reads the original content
    assert_eq!(
        std::fs::read_to_string(repo.path().join("secret.env")).unwrap(),
        "TOKEN=hunter2\n"
    );

    let exclude = repo.exclude_content();
    let lines: Vec<&str> = exclude.lines().collect();
    let marker_pos = lines
        .iter()
        .position(|l| *l == DEFAULT_MARKER)
        .expect("marker line present");
    assert_eq!(lines.get(marker_pos + 1), Some(&"secret.env"));

    assert_eq!(repo.tracked_paths(), vec!["secret.env".to_string()]);

    // The secondary repository has exactly one commit for it
    let log = repo.private_git(&["log", "--oneline"]);
    assert!(log.status.success());
    let log = String::from_utf8_lossy(&log.stdout).into_owned();
    assert_eq!(log.lines().count(), 1);
    assert!(log.contains("secret.env"));
}

#[rstest]
fn add_keeps_primary_status_clean(initialized_repo: TestRepo) {
    let repo = initialized_repo;
    repo.write_file("secret.env", "TOKEN=1\n");
    repo.run_pgit_ok(&["add", "secret.env"]);

    // The symlink is excluded, so the primary repo sees nothing new besides
    // pgit's own files
    let status = repo.git(&["status", "--porcelain"]);
    assert!(
        !status.contains("secret.env"),
        "primary repository still sees secret.env:\n{status}"
    );
}

#[rstest]
fn add_tracked_file_detaches_it_from_the_index(initialized_repo: TestRepo) {
    let repo = initialized_repo;
    repo.commit_file("config.ini", "key=value\n", "Add config");
    assert!(repo.git_output(&["ls-files", "--error-unmatch", "config.ini"]).status.success());

    repo.run_pgit_ok(&["add", "config.ini"]);

    assert!(
        !repo
            .git_output(&["ls-files", "--error-unmatch", "config.ini"])
            .status
            .success(),
        "config.ini should no longer be in the primary index"
    );
    assert!(repo.is_symlink("config.ini"));
    assert!(repo.is_regular_file(".private-storage/config.ini"));
}

#[rstest]
fn add_directory_moves_the_whole_tree(initialized_repo: TestRepo) {
    let repo = initialized_repo;
    repo.write_file("secrets/api.key", "k1\n");
    repo.write_file("secrets/db.pass", "k2\n");

    repo.run_pgit_ok(&["add", "secrets"]);

    assert!(repo.is_symlink("secrets"));
    assert!(repo.path().join(".private-storage/secrets").is_dir());
    assert!(repo.is_regular_file(".private-storage/secrets/api.key"));
    // Reading through the link works
    assert_eq!(
        std::fs::read_to_string(repo.path().join("secrets/db.pass")).unwrap(),
        "k2\n"
    );
    assert_eq!(repo.tracked_paths(), vec!["secrets".to_string()]);
}

// =============================================================================
// E2 — invalid batch rejected before any mutation
// =============================================================================

#[rstest]
fn e2_batch_with_invalid_path_mutates_nothing(initialized_repo: TestRepo) {
    let repo = initialized_repo;
    repo.write_file("a.txt", "a\n");
    repo.write_file("b.txt", "b\n");
    let exclude_before = repo.exclude_content();

    let output = repo.run_pgit(&["add", "a.txt", "../escape", "b.txt"]);
    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("../escape"));

    assert!(repo.is_regular_file("a.txt"));
    assert!(repo.is_regular_file("b.txt"));
    assert!(!repo.path().join(".private-storage/a.txt").exists());
    assert!(!repo.path().join(".private-storage/b.txt").exists());
    assert_eq!(repo.exclude_content(), exclude_before);
    assert!(repo.tracked_paths().is_empty());
}

#[rstest]
fn already_tracked_paths_are_rejected_with_both_sets(initialized_repo: TestRepo) {
    let repo = initialized_repo;
    repo.write_file("a.txt", "a\n");
    repo.run_pgit_ok(&["add", "a.txt"]);

    repo.write_file("b.txt", "b\n");
    let output = repo.run_pgit(&["add", "a.txt", "b.txt"]);
    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("Already tracked"));
    assert!(stderr_of(&output).contains("a.txt"));

    // b.txt untouched
    assert!(repo.is_regular_file("b.txt"));
    assert_eq!(repo.tracked_paths(), vec!["a.txt".to_string()]);
}

// =============================================================================
// E3/E4 — marker handling
// =============================================================================

#[rstest]
fn e3_custom_marker_used_exactly_once(initialized_repo: TestRepo) {
    let repo = initialized_repo;
    let custom = "# custom test marker for pgit";
    repo.set_git_exclude_setting("markerComment", serde_json::json!(custom));
    repo.write_file("f.txt", "f\n");

    repo.run_pgit_ok(&["add", "f.txt"]);

    let exclude = repo.exclude_content();
    assert_eq!(exclude.matches(custom).count(), 1);
    assert_eq!(exclude.matches("f.txt").count(), 1);
    assert!(!exclude.contains(DEFAULT_MARKER));
}

#[rstest]
fn e4_second_add_reuses_the_marker(initialized_repo: TestRepo) {
    let repo = initialized_repo;
    let custom = "# custom test marker for pgit";
    repo.set_git_exclude_setting("markerComment", serde_json::json!(custom));
    repo.write_file("f.txt", "f\n");
    repo.write_file("g.txt", "g\n");

    repo.run_pgit_ok(&["add", "f.txt"]);
    repo.run_pgit_ok(&["add", "g.txt"]);

    let exclude = repo.exclude_content();
    assert_eq!(exclude.matches(custom).count(), 1);
    assert!(exclude.contains("f.txt"));
    assert!(exclude.contains("g.txt"));
}

// =============================================================================
// E5/E6 — disabled exclude integration
// =============================================================================

#[rstest]
fn e5_disabled_with_warn_degrades_gracefully(initialized_repo: TestRepo) {
    let repo = initialized_repo;
    repo.set_git_exclude_setting("enabled", serde_json::json!(false));
    repo.set_git_exclude_setting("fallbackBehavior", serde_json::json!("warn"));
    repo.write_file("x.txt", "x\n");

    let output = repo.run_pgit_ok(&["add", "x.txt"]);
    let stderr = stderr_of(&output);
    assert!(
        stderr.contains("Git exclude operation 'add' for 'x.txt' skipped"),
        "missing warning in stderr: {stderr}"
    );
    // Exactly one warning for the one skipped call
    assert_eq!(stderr.matches("skipped").count(), 1);

    // Everything else still happened
    assert!(repo.is_symlink("x.txt"));
    assert!(repo.is_regular_file(".private-storage/x.txt"));
    assert!(repo.private_git(&["rev-parse", "HEAD"]).status.success());
    assert!(!repo.exclude_content().contains("x.txt"));
}

#[rstest]
fn e5_disabled_with_silent_emits_nothing(initialized_repo: TestRepo) {
    let repo = initialized_repo;
    repo.set_git_exclude_setting("enabled", serde_json::json!(false));
    repo.set_git_exclude_setting("fallbackBehavior", serde_json::json!("silent"));
    repo.write_file("x.txt", "x\n");

    let output = repo.run_pgit_ok(&["add", "x.txt"]);
    assert!(!stderr_of(&output).contains("skipped"));
    assert!(repo.is_symlink("x.txt"));
}

#[rstest]
fn e6_disabled_with_error_fails_and_leaves_no_trace(initialized_repo: TestRepo) {
    let repo = initialized_repo;
    repo.set_git_exclude_setting("enabled", serde_json::json!(false));
    repo.set_git_exclude_setting("fallbackBehavior", serde_json::json!("error"));
    repo.write_file("x.txt", "original bytes\n");

    let output = repo.run_pgit(&["add", "x.txt"]);
    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("exclude integration is disabled"));

    // No filesystem mutation survives
    assert!(repo.is_regular_file("x.txt"));
    assert_eq!(
        std::fs::read_to_string(repo.path().join("x.txt")).unwrap(),
        "original bytes\n"
    );
    assert!(!repo.path().join(".private-storage/x.txt").exists());
    assert!(repo.tracked_paths().is_empty());
}

// =============================================================================
// Batch behavior
// =============================================================================

#[rstest]
fn batch_add_is_atomic_for_all_three(initialized_repo: TestRepo) {
    let repo = initialized_repo;
    for name in ["one.txt", "two.txt", "three.txt"] {
        repo.write_file(name, name);
    }

    repo.run_pgit_ok(&["add", "one.txt", "two.txt", "three.txt"]);

    for name in ["one.txt", "two.txt", "three.txt"] {
        assert!(repo.is_symlink(name), "{name} should be a symlink");
        assert!(
            repo.is_regular_file(&format!(".private-storage/{name}")),
            "{name} should be in storage"
        );
    }
    let mut tracked = repo.tracked_paths();
    tracked.sort();
    assert_eq!(tracked, vec!["one.txt", "three.txt", "two.txt"]);

    // One batch, one secondary commit, message lists all three
    let log = repo.private_git(&["log", "--format=%B", "-n", "1"]);
    let message = String::from_utf8_lossy(&log.stdout).into_owned();
    assert!(message.contains("Files added:"));
    assert!(message.contains("Total: 3 file(s)"));
}

#[rstest]
fn batch_larger_than_chunk_size_lands_in_two_commits(initialized_repo: TestRepo) {
    let repo = initialized_repo;
    let names: Vec<String> = (0..60).map(|i| format!("file{i:02}.txt")).collect();
    for name in &names {
        repo.write_file(name, "payload\n");
    }

    let mut args: Vec<&str> = vec!["add"];
    args.extend(names.iter().map(String::as_str));
    repo.run_pgit_ok(&args);

    assert_eq!(repo.tracked_paths().len(), 60);
    let log = repo.private_git(&["rev-list", "--count", "HEAD"]);
    let count = String::from_utf8_lossy(&log.stdout).trim().to_string();
    assert_eq!(count, "2", "60 paths should commit as two 50/10 chunks");
}

#[rstest]
fn batch_over_limit_is_rejected(initialized_repo: TestRepo) {
    let repo = initialized_repo;
    let names: Vec<String> = (0..101).map(|i| format!("f{i}.txt")).collect();
    let mut args: Vec<&str> = vec!["add"];
    args.extend(names.iter().map(String::as_str));

    let output = repo.run_pgit(&args);
    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("exceeds the limit"));
    assert!(repo.tracked_paths().is_empty());
}

// =============================================================================
// E7 — reset round-trip
// =============================================================================

#[rstest]
fn e7_reset_round_trip_restores_everything(initialized_repo: TestRepo) {
    let repo = initialized_repo;
    repo.write_file("secret.env", "TOKEN=hunter2\n");
    repo.run_pgit_ok(&["add", "secret.env"]);

    let output = repo.run_pgit_ok(&["reset", "--force"]);
    let stdout = stdout_of(&output);
    assert!(stdout.contains("1 restored"), "summary missing: {stdout}");
    assert!(stdout.contains("1 symlink(s) removed"));

    assert!(repo.is_regular_file("secret.env"));
    assert_eq!(
        std::fs::read_to_string(repo.path().join("secret.env")).unwrap(),
        "TOKEN=hunter2\n"
    );
    assert!(!repo.path().join(".git-private").exists());
    assert!(!repo.path().join(".private-storage").exists());
    assert!(!repo.path().join(".private-config.json").exists());

    let exclude = repo.exclude_content();
    assert!(!exclude.contains("secret.env"));
    assert!(!exclude.contains(DEFAULT_MARKER));
}

#[rstest]
fn reset_without_force_cancels_cleanly(initialized_repo: TestRepo) {
    let repo = initialized_repo;
    repo.write_file("secret.env", "TOKEN=1\n");
    repo.run_pgit_ok(&["add", "secret.env"]);

    let output = repo.run_pgit_ok(&["reset"]);
    assert!(stdout_of(&output).contains("cancelled"));

    // Nothing was dismantled
    assert!(repo.is_symlink("secret.env"));
    assert!(repo.path().join(".private-config.json").exists());
}

#[rstest]
fn reset_dry_run_previews_without_mutating(initialized_repo: TestRepo) {
    let repo = initialized_repo;
    repo.write_file("secret.env", "TOKEN=1\n");
    repo.run_pgit_ok(&["add", "secret.env"]);

    let output = repo.run_pgit_ok(&["reset", "--dry-run"]);
    let stdout = stdout_of(&output);
    assert!(stdout.contains("would restore secret.env"));

    assert!(repo.is_symlink("secret.env"));
    assert!(repo.path().join(".private-storage/secret.env").exists());
    assert!(repo.path().join(".private-config.json").exists());
}

#[rstest]
fn reset_sweeps_leaked_backup_sidecars(initialized_repo: TestRepo) {
    let repo = initialized_repo;
    repo.write_file("secret.env", "TOKEN=1\n");
    repo.run_pgit_ok(&["add", "secret.env"]);
    repo.write_file("data.txt.backup.1735776000000.a1b2c3d4", "leaked\n");

    let output = repo.run_pgit_ok(&["reset", "--force"]);
    assert!(stdout_of(&output).contains("1 backup(s) cleaned"));
    assert!(!repo
        .path()
        .join("data.txt.backup.1735776000000.a1b2c3d4")
        .exists());
}

#[rstest]
fn reset_preserves_user_exclude_lines(initialized_repo: TestRepo) {
    let repo = initialized_repo;
    std::fs::create_dir_all(repo.path().join(".git/info")).unwrap();
    std::fs::write(repo.path().join(".git/info/exclude"), "*.log\n").unwrap();
    repo.write_file("secret.env", "TOKEN=1\n");
    repo.run_pgit_ok(&["add", "secret.env"]);
    repo.run_pgit_ok(&["reset", "--force"]);

    let exclude = repo.exclude_content();
    assert!(exclude.contains("*.log"));
    assert!(!exclude.contains("secret.env"));
}

#[rstest]
fn manifest_growth_is_monotone_across_adds(initialized_repo: TestRepo) {
    let repo = initialized_repo;
    repo.write_file("a.txt", "a\n");
    repo.run_pgit_ok(&["add", "a.txt"]);
    assert_eq!(repo.tracked_paths().len(), 1);

    repo.write_file("b.txt", "b\n");
    repo.run_pgit_ok(&["add", "b.txt"]);
    assert_eq!(repo.tracked_paths(), vec!["a.txt", "b.txt"]);

    repo.run_pgit_ok(&["reset", "--force"]);
    assert!(repo.manifest_json().is_none());
}
