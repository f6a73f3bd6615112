//! Apply, plan and outputs integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn apply_creates_stack_and_records_outputs() {
  let env = TestEnv::scaffolded();

  env
    .apply()
    .success()
    .stdout(predicate::str::contains("Apply complete"))
    .stdout(predicate::str::contains("site (created)"))
    .stdout(predicate::str::contains("stage (created)"));

  env
    .cmd()
    .args(["outputs", "websiteEndpoint"])
    .assert()
    .success()
    .stdout("http://site.s3-website-us-east-1.amazonaws.com/\n");

  env
    .cmd()
    .args(["outputs", "apiEndpoint"])
    .assert()
    .success()
    .stdout(predicate::str::starts_with("https://"))
    .stdout(predicate::str::contains(".execute-api.us-east-1.amazonaws.com/dev"));
}

#[test]
fn reapply_changes_nothing() {
  let env = TestEnv::scaffolded();
  env.apply().success();

  env
    .cmd()
    .arg("plan")
    .arg(&env.stack_file)
    .assert()
    .success()
    .stdout(predicate::str::contains("is up to date"));

  let output = env.cmd().args(["-o", "json", "apply"]).arg(&env.stack_file).output().unwrap();
  assert!(output.status.success());
  let json = TestEnv::json(&output.stdout);
  assert_eq!(json["success"], true);
  let resources = json["resources"].as_object().unwrap();
  assert_eq!(resources.len(), 9);
  assert!(resources.values().all(|r| r["action"] == "unchanged"));
}

#[test]
fn plan_before_apply_lists_creates() {
  let env = TestEnv::scaffolded();

  env
    .cmd()
    .arg("plan")
    .arg(&env.stack_file)
    .assert()
    .success()
    .stdout(predicate::str::contains("9 to create"));

  env
    .cmd()
    .args(["apply", "--dry-run"])
    .arg(&env.stack_file)
    .assert()
    .success()
    .stdout(predicate::str::contains("handler (create)"));

  env
    .cmd()
    .arg("status")
    .assert()
    .success()
    .stdout(predicate::str::contains("No state"));
}

#[test]
fn changed_runtime_is_an_update() {
  let env = TestEnv::scaffolded();
  env.apply().success();
  env.edit_stack("nodejs16.x", "nodejs20.x");

  env
    .cmd()
    .arg("plan")
    .arg(&env.stack_file)
    .assert()
    .success()
    .stdout(predicate::str::contains("handler (update: runtime)"));

  env
    .apply()
    .success()
    .stdout(predicate::str::contains("handler (updated: runtime)"));
}

#[test]
fn invalid_runtime_blocks_api_but_publishes_site() {
  let env = TestEnv::scaffolded();
  env.edit_stack("nodejs16.x", "nodejs1.x");

  env
    .apply()
    .failure()
    .stdout(predicate::str::contains("stage (blocked by handler)"))
    .stderr(predicate::str::contains("apiEndpoint not published"));

  env
    .cmd()
    .args(["outputs", "websiteEndpoint"])
    .assert()
    .success();
  env.cmd().args(["outputs", "apiEndpoint"]).assert().failure();

  // Fixing the runtime finishes the stack without touching the bucket.
  env.edit_stack("nodejs1.x", "nodejs16.x");
  let output = env.cmd().args(["-o", "json", "apply"]).arg(&env.stack_file).output().unwrap();
  assert!(output.status.success());
  let json = TestEnv::json(&output.stdout);
  assert_eq!(json["resources"]["site"]["action"], "unchanged");
  assert_eq!(json["resources"]["handler"]["action"], "created");
  assert_eq!(json["outputs"]["apiEndpoint"]["status"], "ready");
}

#[test]
fn invalid_graph_fails_before_any_change() {
  let env = TestEnv::scaffolded();
  env.edit_stack("depends_on = { api, route }", "depends_on = { api }");

  env
    .apply()
    .failure()
    .stderr(predicate::str::contains("does not depend on any route"));

  env
    .cmd()
    .arg("status")
    .assert()
    .success()
    .stdout(predicate::str::contains("No state"));
}

#[test]
fn region_flag_changes_endpoints() {
  let env = TestEnv::scaffolded();
  env.cmd().args(["--region", "eu-west-1", "apply"]).arg(&env.stack_file).assert().success();

  env
    .cmd()
    .args(["--region", "eu-west-1", "outputs", "websiteEndpoint"])
    .assert()
    .success()
    .stdout(predicate::str::contains("s3-website-eu-west-1"));
}

#[test]
fn stacks_keep_separate_state() {
  let env = TestEnv::scaffolded();
  env.cmd().args(["--stack", "prod", "apply"]).arg(&env.stack_file).assert().success();

  env
    .cmd()
    .args(["--stack", "prod", "outputs", "apiEndpoint"])
    .assert()
    .success()
    .stdout(predicate::str::contains("/prod"));
  env
    .cmd()
    .arg("status")
    .assert()
    .success()
    .stdout(predicate::str::contains("No state for stack 'dev'"));
}

#[test]
fn status_lists_resources() {
  let env = TestEnv::scaffolded();
  env.apply().success();

  env
    .cmd()
    .args(["status", "--verbose"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Resources: 9"))
    .stdout(predicate::str::contains("handler (function)"));
}
