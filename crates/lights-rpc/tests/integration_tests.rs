//! Integration tests for the lights-rpc server.
//!
//! Each test spawns the built binary on an OS-assigned port, reads the
//! `RPC_PORT=` line from its stdout and talks length-prefixed JSON-RPC to it.

use base64::Engine as _;
use lights_core::RpcClient;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncBufReadExt;

const CHASE: &str = r#"(module
  (import "env" "set_queued_mode" (func $queued))
  (import "env" "set_pixel" (func $set (param i32 i32 i32 i32)))
  (import "env" "show" (func $show))
  (import "env" "sleep" (func $sleep (param f64)))
  (global $i (mut i32) (i32.const 0))
  (func (export "animate")
    (call $queued)
    (call $set (global.get $i) (i32.const 0) (i32.const 80) (i32.const 0))
    (call $show)
    (global.set $i (i32.rem_u (i32.add (global.get $i) (i32.const 1)) (i32.const 8)))
    (call $sleep (f64.const 0.01))))"#;

struct ServerProcess {
    child: tokio::process::Child,
    client: RpcClient,
    stdout_drain: Option<tokio::task::JoinHandle<()>>,
}

impl ServerProcess {
    async fn call(&self, method: &str, params: Value) -> Value {
        self.client
            .call(method, params)
            .await
            .unwrap_or_else(|e| panic!("{method} failed: {e}"))
    }

    /// Call `method` expecting an error response; returns its code.
    async fn error_code(&self, method: &str, params: Value) -> i32 {
        let response = self.client.request(method, params).await.unwrap();
        response
            .error
            .unwrap_or_else(|| panic!("{method} unexpectedly succeeded"))
            .code
    }

    async fn stop(mut self) {
        if let Some(drain) = self.stdout_drain.take() {
            drain.abort();
        }
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        if let Some(drain) = self.stdout_drain.take() {
            drain.abort();
        }
        let _ = self.child.start_kill();
    }
}

/// Start the binary with `extra_args` and connect a client to it.
async fn start_server(animations_dir: &std::path::Path, extra_args: &[&str]) -> ServerProcess {
    let mut child = tokio::process::Command::new(env!("CARGO_BIN_EXE_lights-rpc"))
        .arg("--host")
        .arg("127.0.0.1")
        .arg("--port")
        .arg("0")
        .arg("--leds")
        .arg("8")
        .arg("--animations-dir")
        .arg(animations_dir)
        .args(extra_args)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .expect("failed to spawn lights-rpc");

    let stdout = child.stdout.take().expect("failed to capture stdout");
    let mut lines = tokio::io::BufReader::new(stdout).lines();

    let port = tokio::time::timeout(Duration::from_secs(20), async {
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(value) = line.strip_prefix("RPC_PORT=") {
                return value.trim().parse::<u16>().ok();
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
    .expect("RPC_PORT line not emitted by lights-rpc");

    let stdout_drain =
        tokio::spawn(async move { while let Ok(Some(_)) = lines.next_line().await {} });

    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let client = RpcClient::connect(addr).await.expect("failed to connect");

    ServerProcess {
        child,
        client,
        stdout_drain: Some(stdout_drain),
    }
}

fn encode(program: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(program.as_bytes())
}

async fn wait_for_animation(server: &ServerProcess, expected: Value) -> bool {
    for _ in 0..100 {
        let state = server.call("state", json!({})).await;
        if state["animation"] == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_health_and_initial_state() {
    let temp_dir = TempDir::new().unwrap();
    let server = start_server(temp_dir.path(), &[]).await;

    assert_eq!(server.call("health_check", json!({})).await, json!({"status": "ok"}));

    let state = server.call("state", json!({})).await;
    assert_eq!(state["leds"], json!(8));
    assert_eq!(state["surface"]["mode"], json!("instant"));
    assert_eq!(state["surface"]["brightness"], json!(1.0));
    assert_eq!(state["animation"], json!(null));

    server.stop().await;
}

#[tokio::test]
async fn test_pixel_commands() {
    let temp_dir = TempDir::new().unwrap();
    let server = start_server(temp_dir.path(), &[]).await;

    let applied = server
        .call(
            "set",
            json!({"position": {"list": [0, 7]}, "color": {"r": 10, "g": 20, "b": 999}}),
        )
        .await;
    assert_eq!(applied, json!({"applied": true}));

    server.call("brightness", json!({"level": 57})).await;
    server.call("mode", json!({"mode": "queue"})).await;
    server.call("fill", json!({"color": {"r": 1, "g": 2, "b": 3}})).await;
    server
        .call("setAll", json!({"colors": [{"r": 9, "g": 9, "b": 9}]}))
        .await;
    server.call("show", json!({})).await;

    let state = server.call("state", json!({})).await;
    let surface = &state["surface"];
    assert_eq!(surface["mode"], json!("queue"));
    assert!((surface["brightness"].as_f64().unwrap() - 0.57).abs() < 1e-6);
    assert_eq!(surface["pixels"][0], json!({"r": 9, "g": 9, "b": 9}));
    assert_eq!(surface["pixels"][7], json!({"r": 1, "g": 2, "b": 3}));

    server.stop().await;
}

#[tokio::test]
async fn test_error_codes() {
    let temp_dir = TempDir::new().unwrap();
    let server = start_server(temp_dir.path(), &[]).await;

    assert_eq!(server.error_code("explode", json!({})).await, -32601);
    assert_eq!(
        server
            .error_code("set", json!({"position": {"single": 8}, "color": {}}))
            .await,
        -32602
    );
    let nine = vec![json!({"r": 0, "g": 0, "b": 0}); 9];
    assert_eq!(server.error_code("setAll", json!({"colors": nine})).await, -32602);
    assert_eq!(server.error_code("brightness", json!({})).await, -32602);

    // The connection survives error responses
    assert_eq!(server.call("health_check", json!({})).await, json!({"status": "ok"}));

    server.stop().await;
}

#[tokio::test]
async fn test_animation_lifecycle() {
    let temp_dir = TempDir::new().unwrap();
    let server = start_server(temp_dir.path(), &[]).await;

    let code = server
        .error_code(
            "registerAnimation",
            json!({"name": "empty", "animation": encode(r#"(module (func (export "draw")))"#)}),
        )
        .await;
    assert_eq!(code, -32005);
    assert!(!temp_dir.path().join("empty.wasm").exists());

    server
        .call(
            "registerAnimation",
            json!({"name": "chase", "animation": encode(CHASE)}),
        )
        .await;
    assert!(temp_dir.path().join("chase.wasm").exists());
    assert_eq!(
        server.call("listAnimations", json!({})).await,
        json!({"animations": ["chase"]})
    );

    assert_eq!(
        server.call("animate", json!({"name": "chase"})).await,
        json!({"queued": true})
    );
    assert!(wait_for_animation(&server, json!("chase")).await);

    for _ in 0..2 {
        server.call("stopAnimation", json!({})).await;
        let state = server.call("state", json!({})).await;
        assert_eq!(state["animation"], json!(null));
        assert_eq!(state["surface"]["mode"], json!("instant"));
    }

    for _ in 0..2 {
        server
            .call("unregisterAnimation", json!({"name": "chase"}))
            .await;
    }
    assert_eq!(
        server.call("animate", json!({"name": "chase"})).await,
        json!({"queued": false})
    );

    server.stop().await;
}

#[tokio::test]
async fn test_disable_sleep_rejects_sleeping_programs() {
    let temp_dir = TempDir::new().unwrap();
    let server = start_server(temp_dir.path(), &["--disable-sleep"]).await;

    let code = server
        .error_code(
            "registerAnimation",
            json!({"name": "chase", "animation": encode(CHASE)}),
        )
        .await;
    assert_eq!(code, -32005);

    server.stop().await;
}

#[tokio::test]
async fn test_registered_animations_survive_restart() {
    let temp_dir = TempDir::new().unwrap();

    let server = start_server(temp_dir.path(), &[]).await;
    server
        .call(
            "registerAnimation",
            json!({"name": "chase", "animation": encode(CHASE)}),
        )
        .await;
    server.stop().await;

    let server = start_server(temp_dir.path(), &[]).await;
    assert_eq!(
        server.call("listAnimations", json!({})).await,
        json!({"animations": ["chase"]})
    );
    assert_eq!(
        server.call("animate", json!({"name": "chase"})).await,
        json!({"queued": true})
    );
    assert!(wait_for_animation(&server, json!("chase")).await);

    server.stop().await;
}
