//! Unit tests for SSH option construction and session lifecycle.

use super::*;
use crate::test_support::{ScriptedRunner, connection_config, scripted_session};
use rstest::{fixture, rstest};

#[fixture]
fn base_config() -> ConnectionConfig {
    connection_config()
}

fn args_as_strings(args: &[OsString]) -> Vec<String> {
    args.iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect()
}

#[rstest]
fn exec_args_multiplex_over_control_socket() {
    let session = scripted_session(ScriptedRunner::new());
    let args = args_as_strings(&session.build_exec_args("echo ok"));

    assert!(args.contains(&String::from("ControlMaster=auto")), "{args:?}");
    assert!(
        args.contains(&String::from("ControlPath=/tmp/shardcheck-test.sock")),
        "{args:?}"
    );
    assert!(args.contains(&String::from("ControlPersist=10m")), "{args:?}");
    assert_eq!(
        args.get(args.len() - 2).map(String::as_str),
        Some("root@device.local")
    );
    assert_eq!(args.last().map(String::as_str), Some("echo ok"));
}

#[rstest]
fn exec_args_include_identity_and_port(base_config: ConnectionConfig) {
    let cfg = ConnectionConfig {
        identity_file: Some(String::from("/path/to/key")),
        port: 2222,
        ..base_config
    };
    let session = SshSession::new(cfg, ScriptedRunner::new()).expect("config should validate");
    let args = args_as_strings(&session.build_exec_args("true"));

    let port_flag = args.iter().position(|arg| arg == "-p").expect("-p flag");
    assert_eq!(args.get(port_flag + 1).map(String::as_str), Some("2222"));
    let key_flag = args.iter().position(|arg| arg == "-i").expect("-i flag");
    assert_eq!(
        args.get(key_flag + 1).map(String::as_str),
        Some("/path/to/key")
    );
}

#[rstest]
fn strict_host_checking_drops_override(base_config: ConnectionConfig) {
    let cfg = ConnectionConfig {
        ssh_strict_host_key_checking: true,
        ssh_batch_mode: false,
        ..base_config
    };
    let session = SshSession::new(cfg, ScriptedRunner::new()).expect("config should validate");
    let args = args_as_strings(&session.common_ssh_options());

    assert!(!args.contains(&String::from("StrictHostKeyChecking=no")));
    assert!(!args.contains(&String::from("BatchMode=yes")));
}

#[rstest]
fn new_rejects_blank_host(base_config: ConnectionConfig) {
    let cfg = ConnectionConfig {
        host: String::from("  "),
        ..base_config
    };
    let err = SshSession::new(cfg, ScriptedRunner::new()).expect_err("blank host rejected");

    assert!(
        matches!(err, RemoteError::Config(ConfigError::MissingField(ref msg)) if msg.contains("SHARDCHECK_HOST")),
        "unexpected error: {err}"
    );
}

#[rstest]
fn new_allocates_unique_control_sockets(base_config: ConnectionConfig) {
    let first = SshSession::new(base_config.clone(), ScriptedRunner::new()).expect("valid");
    let second = SshSession::new(base_config, ScriptedRunner::new()).expect("valid");

    assert_ne!(first.control_path(), second.control_path());
    let name = first.control_path().file_name().unwrap_or_default();
    assert!(name.starts_with("shardcheck-"), "{name}");
    assert_eq!(name.len(), "shardcheck-".len() + 8, "{name}");
}

#[rstest]
fn control_socket_stays_in_short_temp_dir() {
    let path = control_socket_path(Utf8Path::new("/tmp"), "0a1b2c3d");

    assert_eq!(path, Utf8PathBuf::from("/tmp/shardcheck-0a1b2c3d"));
}

#[rstest]
#[case::macos_temp("/var/folders/7k/abcdefghijklmnopqrstuvwxyz12/T")]
#[case::long_tmpdir(
    "/home/builder/workspace/very/deeply/nested/checkout/target/tmp/integration-runs/current"
)]
fn control_socket_leaves_room_for_ssh_bind_suffix(#[case] temp_dir: &str) {
    let path = control_socket_path(Utf8Path::new(temp_dir), "0a1b2c3d");

    assert!(
        path.as_str().len() + SSH_CONTROL_BIND_SUFFIX < UNIX_SOCKET_PATH_MAX,
        "{path} is too long to bind"
    );
    assert!(path.as_str().ends_with("shardcheck-0a1b2c3d"), "{path}");
}

#[rstest]
fn session_exposes_config_and_renders_control_path_option(base_config: ConnectionConfig) {
    let session =
        SshSession::new(base_config, ScriptedRunner::new()).expect("config should validate");
    let args = args_as_strings(&session.common_ssh_options());
    let control_option = args
        .iter()
        .find(|arg| arg.starts_with("ControlPath="))
        .expect("ControlPath option");

    assert_eq!(session.config().destination(), "root@device.local");
    assert!(
        control_option.len() - "ControlPath=".len() + SSH_CONTROL_BIND_SUFFIX
            < UNIX_SOCKET_PATH_MAX,
        "{control_option}"
    );
}

#[rstest]
fn connect_runs_true_and_reports_failure() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(255), "", "Permission denied (publickey).");
    let session = scripted_session(runner.clone());

    let err = session.connect().expect_err("connect should fail");

    assert_eq!(runner.remote_commands(), vec!["true"]);
    let RemoteError::Connect {
        destination,
        status_text,
        stderr,
    } = err
    else {
        panic!("expected connect error");
    };
    assert_eq!(destination, "root@device.local");
    assert_eq!(status_text, "255");
    assert!(stderr.contains("Permission denied"));
}

#[rstest]
fn close_sends_exit_to_master() {
    let runner = ScriptedRunner::new();
    runner.push_success();
    runner.push_success();
    let session = scripted_session(runner.clone());

    session.connect().expect("connect should succeed");
    session.close().expect("close should succeed");

    let invocations = runner.invocations();
    let close = invocations.last().expect("close invocation");
    assert!(
        close.command_string().ends_with("-O exit root@device.local"),
        "{}",
        close.command_string()
    );
    let args = args_as_strings(&close.args);
    let control = args.iter().position(|arg| arg == "-O").expect("-O flag");
    assert_eq!(args.get(control + 1).map(String::as_str), Some("exit"));
    assert_eq!(close.program, "ssh");
}

#[rstest]
fn execute_maps_ssh_255_to_transport_error() {
    let runner = ScriptedRunner::new();
    runner.push_transport_failure();
    let session = scripted_session(runner);

    let err = session.execute("luna-send").expect_err("transport failure");

    assert!(
        matches!(err, RemoteError::Transport { ref status_text, .. } if status_text == "255"),
        "unexpected error: {err}"
    );
}

#[rstest]
fn execute_passes_remote_failures_through() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(1), r#"{"returnValue":false}"#, "");
    let session = scripted_session(runner);

    let output = session.execute("luna-send").expect("remote status is not transport");

    assert_eq!(output.exit_code, Some(1));
    assert_eq!(output.stdout, r#"{"returnValue":false}"#);
}

#[rstest]
fn execute_surfaces_spawn_failures() {
    let session = scripted_session(ScriptedRunner::new());

    let err = session.execute("luna-send").expect_err("no scripted response");

    assert!(matches!(err, RemoteError::Spawn { .. }), "{err}");
}

#[rstest]
fn process_runner_captures_output_and_status() {
    let output = ProcessCommandRunner
        .run(
            "sh",
            &[
                OsString::from("-c"),
                OsString::from("printf out && printf err 1>&2; exit 3"),
            ],
        )
        .expect("sh should run");

    assert_eq!(output.code, Some(3));
    assert_eq!(output.stdout, "out");
    assert_eq!(output.stderr, "err");
    assert!(!output.is_success());
}

#[rstest]
fn process_runner_reports_missing_program() {
    let err = ProcessCommandRunner
        .run("shardcheck-definitely-missing-binary", &[])
        .expect_err("spawn should fail");

    assert!(matches!(err, RemoteError::Spawn { .. }), "{err}");
}
