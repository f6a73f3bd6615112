//! Destroy command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn destroy_with_no_state_succeeds() {
  let env = TestEnv::scaffolded();

  env
    .cmd()
    .args(["destroy", "--force"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Nothing to destroy"));
}

#[test]
fn destroy_removes_everything() {
  let env = TestEnv::scaffolded();
  env.apply().success();

  env
    .cmd()
    .args(["destroy", "--force"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Destroy complete!"))
    .stdout(predicate::str::contains("Deleted: 9"));

  env
    .cmd()
    .arg("status")
    .assert()
    .success()
    .stdout(predicate::str::contains("No state"));

  // Everything is gone, so the next apply creates the whole stack again.
  env
    .cmd()
    .arg("plan")
    .arg(&env.stack_file)
    .assert()
    .success()
    .stdout(predicate::str::contains("9 to create"));
}

#[test]
fn destroy_is_idempotent() {
  let env = TestEnv::scaffolded();
  env.apply().success();

  env.cmd().args(["destroy", "--force"]).assert().success();
  env
    .cmd()
    .args(["destroy", "--force"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Nothing to destroy"));
}

#[test]
fn destroy_requires_confirmation_when_not_interactive() {
  let env = TestEnv::scaffolded();
  env.apply().success();

  env
    .cmd()
    .arg("destroy")
    .assert()
    .failure()
    .stderr(predicate::str::contains("--force"));

  env
    .cmd()
    .arg("status")
    .assert()
    .success()
    .stdout(predicate::str::contains("Resources: 9"));
}

#[test]
fn destroy_leaves_retained_bucket() {
  let env = TestEnv::scaffolded();
  env.edit_stack("id = \"site\",", "id = \"site\",\n  removal = \"retain\",");
  env.apply().success();

  env
    .cmd()
    .args(["destroy", "--force"])
    .assert()
    .success()
    .stdout(predicate::str::contains("site (retained)"))
    .stdout(predicate::str::contains("Retained: 1"));

  // The retained bucket is no longer tracked; recreating it adopts the live one.
  let output = env.cmd().args(["-o", "json", "apply"]).arg(&env.stack_file).output().unwrap();
  assert!(output.status.success());
  let json = TestEnv::json(&output.stdout);
  assert_eq!(json["resources"]["site"]["action"], "unchanged");
  assert_eq!(json["resources"]["handler"]["action"], "created");
}

#[test]
fn removing_a_resource_deletes_it() {
  let env = TestEnv::scaffolded();
  env.apply().success();
  env.edit_stack("stack.output(\"apiEndpoint\", stage.invoke_url)", "");
  env.edit_stack(
    "local stage = stack.stage({",
    "local stage = nil and stack.stage({",
  );

  env
    .apply()
    .success()
    .stdout(predicate::str::contains("stage (deleted)"));

  env.cmd().args(["outputs", "apiEndpoint"]).assert().failure();
}
