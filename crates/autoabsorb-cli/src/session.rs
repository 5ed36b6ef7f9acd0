//! JSON-lines session: one command per input line, one envelope per output
//! line.

use anyhow::Result;
use autoabsorb_gateway::Gateway;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Serve commands until the input closes. Blank lines are ignored.
///
/// Returns the number of commands executed.
pub async fn serve<R, W>(gateway: &Gateway, input: R, mut output: W) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut executed = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        debug!("Command: {}", line);
        let reply = gateway.execute_json(line).await;
        let mut encoded = serde_json::to_vec(&reply)?;
        encoded.push(b'\n');
        output.write_all(&encoded).await?;
        output.flush().await?;
        executed += 1;
    }

    Ok(executed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoabsorb_gateway::GatewayConfig;
    use autoabsorb_hardware::mock::MockReader;
    use serde_json::Value;

    #[tokio::test]
    async fn test_one_envelope_per_command() {
        let (reader, _handle) = MockReader::new();
        let gateway = Gateway::new(reader, GatewayConfig::default());
        let input = concat!(
            "{\"command\":\"Connect\"}\n",
            "\n",
            "{\"command\":\"ReadPlate\",\"wells\":\"A1\"}\n",
            "garbage\n",
        );
        let mut output = Vec::new();

        let executed = serve(&gateway, input.as_bytes(), &mut output).await.unwrap();

        assert_eq!(executed, 3);
        let replies: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0]["device_status"], "Ready");
        assert_eq!(replies[1]["wavelength"], 450);
        assert_eq!(replies[2]["error"]["kind"], "ValidationError");
    }
}
