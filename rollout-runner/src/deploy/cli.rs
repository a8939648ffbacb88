//! External command invocation for the container tooling

use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

/// Runs `program` with `args`, returning stdout on a zero exit
pub(crate) async fn run(program: &str, args: &[String]) -> Result<String, String> {
    debug!("Running {} {:?}", program, args);

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| format!("failed to run {}: {}", program, e))?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if !output.status.success() {
        let exit_code = output.status.code().unwrap_or(-1);
        let detail = if stderr.is_empty() { stdout } else { stderr };
        return Err(format!("{} exited with {}: {}", program, exit_code, detail));
    }

    Ok(stdout)
}

/// Quotes `value` for a POSIX shell
pub(crate) fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_./:=@%+-,".contains(c));
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}
