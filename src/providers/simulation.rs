//! External simulation engine bridge
//!
//! The engine is an opaque child process invoked as
//! `<command> --json [--rpc URL] simulate --from A --to B --value ETH --data HEX --gas N`.
//! It answers with JSON lines on stdout. `step` lines report progress,
//! a `result` or `error` line ends the exchange.

use alloy_primitives::U256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::models::{AppError, AppResult, ErrorCode};
use crate::utils::constants::format_native;

/// One transaction to simulate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationRequest {
    pub sender: String,
    pub to: String,
    /// Wei as decimal string
    pub value_wei: String,
    pub data: String,
    pub gas_limit: u64,
    pub network: String,
    /// HTTP endpoint the engine should read chain state from
    #[serde(default)]
    pub rpc_url: Option<String>,
}

impl SimulationRequest {
    /// Engine arguments; the engine takes the value in native units
    pub fn engine_args(&self) -> AppResult<Vec<String>> {
        let wei = U256::from_str(&self.value_wei)
            .map_err(|_| AppError::bad_request(format!("Invalid value: {}", self.value_wei)))?;

        let mut args = vec!["--json".to_string()];
        if let Some(rpc_url) = &self.rpc_url {
            args.push("--rpc".to_string());
            args.push(rpc_url.clone());
        }
        args.extend([
            "simulate".to_string(),
            "--from".to_string(),
            self.sender.clone(),
            "--to".to_string(),
            self.to.clone(),
            "--value".to_string(),
            format_native(wei),
            "--data".to_string(),
            self.data.clone(),
            "--gas".to_string(),
            self.gas_limit.to_string(),
        ]);
        Ok(args)
    }
}

/// Final verdict from the engine
#[derive(Debug, Clone, Serialize)]
pub struct SimulationOutcome {
    pub record: serde_json::Value,
    pub execution_time_s: Option<f64>,
    /// Progress lines seen before the result
    pub steps: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum EngineLine {
    Step {
        #[serde(default)]
        step: Option<u64>,
    },
    Result {
        record: serde_json::Value,
        #[serde(default)]
        execution_time_s: Option<f64>,
    },
    Error {
        message: String,
    },
    #[serde(other)]
    Other,
}

#[async_trait]
pub trait SimulationBridge: Send + Sync {
    async fn simulate(&self, request: &SimulationRequest) -> AppResult<SimulationOutcome>;
}

/// Spawns the configured command for every request
#[derive(Debug, Clone)]
pub struct ProcessSimulationBridge {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessSimulationBridge {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Whitespace-split command line, e.g. `python main.py`
    pub fn from_command_line(command: &str, timeout: Duration) -> AppResult<Self> {
        let mut parts = command.split_whitespace().map(String::from);
        let program = parts
            .next()
            .ok_or_else(|| AppError::new(ErrorCode::ConfigInvalidValue, "SIMULATION_COMMAND is empty"))?;
        Ok(Self::new(program, parts.collect(), timeout))
    }

    async fn run(&self, request: &SimulationRequest) -> AppResult<SimulationOutcome> {
        let started = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .args(request.engine_args()?)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::with_source(ErrorCode::SimulationFailed, format!("Failed to start {}", self.program), e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::simulation_failed("Engine stdout unavailable"))?;
        let mut lines = BufReader::new(stdout).lines();
        let mut steps = 0;

        while let Some(raw) = lines
            .next_line()
            .await
            .map_err(|e| AppError::with_source(ErrorCode::SimulationFailed, "Failed to read engine output", e))?
        {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let parsed: EngineLine = serde_json::from_str(raw)
                .map_err(|_| AppError::simulation_failed("Engine produced non-JSON output"))?;
            match parsed {
                EngineLine::Step { step } => {
                    steps += 1;
                    debug!(step = step.unwrap_or_default(), "Simulation progress");
                }
                EngineLine::Other => debug!("Ignoring engine line"),
                EngineLine::Error { message } => {
                    return Err(AppError::simulation_failed(message));
                }
                EngineLine::Result {
                    record,
                    execution_time_s,
                } => {
                    return Ok(SimulationOutcome {
                        record,
                        execution_time_s,
                        steps,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    });
                }
            }
        }

        let status = child.wait().await?;
        if status.success() {
            Err(AppError::simulation_failed("Engine exited without a result"))
        } else {
            Err(AppError::simulation_failed(format!("Engine exited with {}", status)))
        }
    }
}

#[async_trait]
impl SimulationBridge for ProcessSimulationBridge {
    async fn simulate(&self, request: &SimulationRequest) -> AppResult<SimulationOutcome> {
        // timing out drops `run`, and with it the child (kill_on_drop)
        match tokio::time::timeout(self.timeout, self.run(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(program = %self.program, timeout_s = self.timeout.as_secs(), "⏱️ Simulation timed out");
                Err(AppError::new(
                    ErrorCode::SimulationTimeout,
                    format!("Simulation exceeded {}s", self.timeout.as_secs()),
                ))
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn request() -> SimulationRequest {
        SimulationRequest {
            sender: "0x1111111111111111111111111111111111111111".to_string(),
            to: "0x2222222222222222222222222222222222222222".to_string(),
            value_wei: "1500000000000000000".to_string(),
            data: "0x".to_string(),
            gas_limit: 100_000,
            network: "sepolia".to_string(),
            rpc_url: None,
        }
    }

    /// `sh -c script engine <args>`: the engine arguments land in `$1..`
    fn sh(script: &str, timeout: Duration) -> ProcessSimulationBridge {
        ProcessSimulationBridge::new(
            "sh",
            vec!["-c".to_string(), script.to_string(), "engine".to_string()],
            timeout,
        )
    }

    #[test]
    fn test_engine_args() {
        let args = request().engine_args().unwrap();
        assert_eq!(
            args,
            vec![
                "--json",
                "simulate",
                "--from",
                "0x1111111111111111111111111111111111111111",
                "--to",
                "0x2222222222222222222222222222222222222222",
                "--value",
                "1.5",
                "--data",
                "0x",
                "--gas",
                "100000",
            ]
        );

        let with_rpc = SimulationRequest {
            rpc_url: Some("https://rpc.example".to_string()),
            value_wei: "0".to_string(),
            ..request()
        };
        let args = with_rpc.engine_args().unwrap();
        assert_eq!(&args[..4], ["--json", "--rpc", "https://rpc.example", "simulate"]);
        assert_eq!(args[9], "0");

        let bad = SimulationRequest {
            value_wei: "lots".to_string(),
            ..request()
        };
        assert_eq!(bad.engine_args().unwrap_err().code, ErrorCode::ApiBadRequest);
    }

    #[tokio::test]
    async fn test_result_after_steps() {
        let bridge = sh(
            r#"[ "$1" = "--json" ] && [ "$2" = "simulate" ] || exit 2
echo '{"type":"step","step":1}'
echo '{"type":"step","step":2}'
echo "{\"type\":\"result\",\"record\":{\"value\":\"$8\",\"gas\":\"${12}\"},\"execution_time_s\":0.5}""#,
            Duration::from_secs(5),
        );
        let outcome = bridge.simulate(&request()).await.unwrap();
        assert_eq!(outcome.steps, 2);
        assert_eq!(outcome.record["value"], "1.5");
        assert_eq!(outcome.record["gas"], "100000");
        assert_eq!(outcome.execution_time_s, Some(0.5));
    }

    #[tokio::test]
    async fn test_engine_error_line() {
        let bridge = sh(
            r#"echo '{"type":"step","step":1}'; echo '{"type":"error","message":"bad sender"}'; exit 1"#,
            Duration::from_secs(5),
        );
        let err = bridge.simulate(&request()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::SimulationFailed);
        assert_eq!(err.message, "bad sender");
    }

    #[tokio::test]
    async fn test_garbage_and_exit_codes() {
        let bridge = sh("echo not-json", Duration::from_secs(5));
        assert_eq!(bridge.simulate(&request()).await.unwrap_err().code, ErrorCode::SimulationFailed);

        let bridge = sh("exit 3", Duration::from_secs(5));
        let err = bridge.simulate(&request()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::SimulationFailed);

        let bridge = sh("exit 0", Duration::from_secs(5));
        let err = bridge.simulate(&request()).await.unwrap_err();
        assert_eq!(err.message, "Engine exited without a result");
    }

    #[tokio::test]
    async fn test_timeout() {
        let bridge = sh("sleep 5", Duration::from_millis(200));
        let err = bridge.simulate(&request()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::SimulationTimeout);
    }

    #[test]
    fn test_from_command_line() {
        let bridge = ProcessSimulationBridge::from_command_line("python main.py", Duration::from_secs(1)).unwrap();
        assert_eq!(bridge.program, "python");
        assert_eq!(bridge.args, vec!["main.py"]);
        assert!(ProcessSimulationBridge::from_command_line("  ", Duration::from_secs(1)).is_err());
    }
}
