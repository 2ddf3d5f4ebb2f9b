#![cfg(feature = "cli")]

use std::fs;
use std::path::Path;

use approx::assert_relative_eq;
use assert_cmd::Command;
use depth_calib::DepthCalibConfig;
use predicates::prelude::*;
use serde_json::Value;

const TRANSLATION_PAIRS: &str = r#"{
  "pairs": [
    {"id": 4, "source": {"x": 0, "y": 0, "z": 1}, "target": {"x": 10, "y": 10, "z": 11}},
    {"id": 1, "source": {"x": 0, "y": 0, "z": 0}, "target": {"x": 10, "y": 10, "z": 10}},
    {"id": 3, "source": {"x": 0, "y": 1, "z": 0}, "target": {"x": 10, "y": 11, "z": 10}},
    {"id": 2, "source": {"x": 1, "y": 0, "z": 0}, "target": {"x": 11, "y": 10, "z": 10}}
  ]
}"#;

fn cmd() -> Command {
    Command::cargo_bin("depth-calib").expect("binary")
}

fn write(path: &Path, contents: &str) {
    fs::write(path, contents).expect("write fixture");
}

fn rows(fit: &Value) -> Vec<Vec<f64>> {
    fit["transform"]
        .as_array()
        .expect("rows")
        .iter()
        .map(|row| {
            row.as_array()
                .expect("row")
                .iter()
                .map(|v| v.as_f64().expect("number"))
                .collect()
        })
        .collect()
}

#[test]
fn solve_prints_translation_transform() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("pairs.json");
    write(&input, TRANSLATION_PAIRS);

    let out = cmd()
        .args(["solve", "--input"])
        .arg(&input)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let fit: Value = serde_json::from_slice(&out).expect("json");
    let m = rows(&fit);

    let expected = [
        [1.0, 0.0, 0.0, 10.0],
        [0.0, 1.0, 0.0, 10.0],
        [0.0, 0.0, 1.0, 10.0],
        [0.0, 0.0, 0.0, 1.0],
    ];
    for (row, want) in m.iter().zip(expected.iter()) {
        for (a, b) in row.iter().zip(want.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-9);
        }
    }
    assert!(fit["rms_residual"].as_f64().expect("residual") < 1e-9);
}

#[test]
fn solve_then_apply() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("pairs.json");
    let fit_path = dir.path().join("fit.json");
    let points = dir.path().join("points.json");
    write(&input, TRANSLATION_PAIRS);
    write(
        &points,
        r#"[{"id": 9, "position": {"x": 0.5, "y": -0.5, "z": 2.0}}]"#,
    );

    cmd()
        .args(["solve", "--input"])
        .arg(&input)
        .arg("--out")
        .arg(&fit_path)
        .assert()
        .success();
    assert!(fit_path.exists());

    let out = cmd()
        .args(["apply", "--transform"])
        .arg(&fit_path)
        .arg("--points")
        .arg(&points)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: Value = serde_json::from_slice(&out).expect("json");
    let entry = &report["messages"][0];
    assert_eq!(entry["id"], 9);
    assert_relative_eq!(entry["position"]["x"].as_f64().expect("x"), 10.5, epsilon = 1e-9);
    assert_relative_eq!(entry["position"]["y"].as_f64().expect("y"), 9.5, epsilon = 1e-9);
    assert_relative_eq!(entry["position"]["z"].as_f64().expect("z"), 12.0, epsilon = 1e-9);
}

#[test]
fn apply_accepts_bare_rows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let transform = dir.path().join("t.json");
    let points = dir.path().join("points.json");
    write(
        &transform,
        "[[1,0,0,1],[0,1,0,2],[0,0,1,3],[0,0,0,1]]",
    );
    write(
        &points,
        r#"{"messages": [{"id": "Head", "position": {"x": 0, "y": 0, "z": 0}}]}"#,
    );

    cmd()
        .args(["apply", "--transform"])
        .arg(&transform)
        .arg("--points")
        .arg(&points)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"Head\""))
        .stdout(predicate::str::contains("\"z\": 3.0"));
}

#[test]
fn solve_rejects_too_few_pairs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("pairs.json");
    write(
        &input,
        r#"{"pairs": [
            {"id": 1, "source": {"x": 0, "y": 0, "z": 0}, "target": {"x": 1, "y": 1, "z": 1}},
            {"id": 2, "source": {"x": 1, "y": 0, "z": 0}, "target": {"x": 2, "y": 1, "z": 1}}
        ]}"#,
    );

    cmd()
        .args(["solve", "--input"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("InsufficientPoints"));
}

#[test]
fn solve_rejects_duplicate_ids() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("pairs.json");
    let dup = TRANSLATION_PAIRS.replace("\"id\": 4", "\"id\": 1");
    write(&input, &dup);

    cmd()
        .args(["solve", "--input"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("duplicate anchor id"));
}

#[test]
fn centroid_of_square() {
    cmd()
        .args(["centroid", "--vertices", "0,0;2,0;2,2;0,2"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"{"x":1,"y":1}"#));
}

#[test]
fn centroid_truncates_toward_zero() {
    cmd()
        .args(["centroid", "--vertices", "-1,-1;-4,-1;-4,-4;-1,-4"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"{"x":-2,"y":-2}"#));
}

#[test]
fn centroid_of_collinear_points_fails() {
    cmd()
        .args(["centroid", "--vertices", "0,0;1,1;2,2"])
        .assert()
        .failure();
}

#[test]
fn default_config_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("config.json");
    cmd()
        .args(["-v", "default-config", "--out"])
        .arg(&out)
        .assert()
        .success();

    let cfg = DepthCalibConfig::load_json(&out).expect("load");
    assert_eq!(cfg, DepthCalibConfig::default());
}
