use std::fs;
use std::path::Path;
use std::process::Command;

fn spn() -> Command {
    Command::new(env!("CARGO_BIN_EXE_spn"))
}

/// Cosh correlator with a small pseudo-random wobble per configuration.
fn write_input(path: &Path, nt: usize, configs: usize) {
    let rows: Vec<Vec<f64>> = (0..configs)
        .map(|c| {
            (0..nt)
                .map(|t| {
                    let exact = 2.0
                        * ((-0.4 * t as f64).exp() + (-0.4 * (nt - t) as f64).exp());
                    let hash = ((c * 131 + t * 17) as f64 * 12.9898).sin() * 43758.5453;
                    let wobble = 0.04 * (hash - hash.floor() - 0.5);
                    exact * (1.0 + wobble)
                })
                .collect()
        })
        .collect();
    let input = serde_json::json!({ "id": rows });
    fs::write(path, serde_json::to_string(&input).unwrap()).unwrap();
}

#[test]
fn channels_lists_every_preset() {
    let output = spn().arg("channels").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    for name in ["g5", "gk", "id", "g5gk"] {
        assert!(stdout.lines().any(|line| line.starts_with(&format!("{name}\t"))));
    }
}

#[test]
fn first_pass_reports_incomplete_and_writes_plots() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("correlators.json");
    let config = dir.path().join("config.yaml");
    let out = dir.path().join("out");
    write_input(&input, 16, 40);
    fs::write(
        &config,
        "nt: 16\nbootstrap_sample_count: 20\nchannels:\n  id: {}\n",
    )
    .unwrap();

    let output = spn()
        .arg("mesons")
        .arg("--config")
        .arg(&config)
        .arg("--input")
        .arg(&input)
        .arg("--out")
        .arg(&out)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("id: ANALYSIS NOT YET COMPLETE"));
    assert!(out.join("effmass_id.json").exists());
    assert!(out.join("correlator_id.json").exists());
    assert!(!out.join("mass_id.dat").exists());
}

#[test]
fn second_pass_writes_the_result_record() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("correlators.json");
    let config = dir.path().join("config.yaml");
    let out = dir.path().join("out");
    write_input(&input, 16, 40);
    fs::write(
        &config,
        "nt: 16\nbootstrap_sample_count: 20\nthreads: 2\nchannels:\n  id:\n    plateau_start: 4\n    plateau_end: 8\n",
    )
    .unwrap();

    let output = spn()
        .args(["mesons", "--silent", "--config"])
        .arg(&config)
        .arg("--input")
        .arg(&input)
        .arg("--out")
        .arg(&out)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    let record = fs::read_to_string(out.join("mass_id.dat")).unwrap();
    assert!(record.starts_with("id_mass\tid_mass_error\t"));
    assert_eq!(record.lines().count(), 2);
    assert!(out.join("effmass_withfit_id_4_8.json").exists());
    assert!(out.join("report_id.json").exists());
}

#[test]
fn unknown_channel_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("correlators.json");
    let config = dir.path().join("config.yaml");
    write_input(&input, 16, 10);
    fs::write(&config, "nt: 16\nchannels:\n  g7: {}\n").unwrap();

    let output = spn()
        .arg("mesons")
        .arg("--config")
        .arg(&config)
        .arg("--input")
        .arg(&input)
        .arg("--out")
        .arg(dir.path().join("out"))
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
fn flow_reports_both_scales_per_observable() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("flow.json");
    let record = dir.path().join("flow.dat");
    let times: Vec<f64> = (1..=60).map(|i| i as f64 * 0.1).collect();
    let rows = |k: f64| -> Vec<Vec<f64>> {
        (0..30)
            .map(|c| {
                let slope = k * (1.0 + 0.01 * ((c % 5) as f64 - 2.0));
                times.iter().map(|t| slope / t).collect()
            })
            .collect()
    };
    let payload = serde_json::json!({
        "times": times,
        "energies": { "clover": rows(0.1), "plaquette": rows(0.12) },
    });
    fs::write(&input, serde_json::to_string(&payload).unwrap()).unwrap();

    let output = spn()
        .args(["flow", "--samples", "50", "--input"])
        .arg(&input)
        .arg("--out")
        .arg(&record)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("clover_w0 = "));
    assert!(stdout.contains("plaquette_sqrt_8t0 = "));
    let record = fs::read_to_string(record).unwrap();
    assert!(record.starts_with("flow_clover_w0\tflow_clover_w0_error\tflow_clover_sqrt_8t0\t"));
    assert_eq!(record.lines().count(), 2);
}

#[test]
fn flow_fails_when_the_reference_is_out_of_range() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("flow.json");
    let payload = serde_json::json!({
        "times": [0.1, 0.2, 0.3],
        "energies": { "plaquette": [[0.1, 0.05, 0.03], [0.11, 0.05, 0.03]] },
    });
    fs::write(&input, serde_json::to_string(&payload).unwrap()).unwrap();

    let output = spn()
        .args(["flow", "--samples", "10", "--input"])
        .arg(&input)
        .output()
        .unwrap();
    assert!(!output.status.success());
}
