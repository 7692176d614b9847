use std::process::Command;

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_hostbridge"))
}

#[test]
fn operations_lists_command_table() {
    let output = cli()
        .arg("operations")
        .output()
        .expect("failed to run hostbridge operations");
    assert!(
        output.status.success(),
        "CLI exited with {:?}",
        output.status.code()
    );

    let stdout = String::from_utf8(output.stdout).expect("stdout UTF-8");
    for operation in [
        "engine-init",
        "get-engine-driver-count",
        "get-engine-driver-device-info",
        "file-callback-reply",
    ] {
        assert!(
            stdout.lines().any(|line| line.starts_with(operation)),
            "missing {operation} in:\n{stdout}"
        );
    }
}

#[test]
fn unknown_subcommand_fails() {
    let output = cli()
        .arg("launch-missiles")
        .output()
        .expect("failed to run hostbridge");
    assert!(!output.status.success());
}
