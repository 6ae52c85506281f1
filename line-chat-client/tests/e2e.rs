use std::{path::Path, process::Stdio, time::Duration};

use anyhow::{Context, Result, anyhow};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpListener,
    process::{Child, ChildStdin, ChildStdout, Command},
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::test]
async fn cli_login_end_to_end() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("line_chat_client");

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?.to_string();

    // Scripted server: answer the login, then wait for the client to leave.
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await?;
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        let login = lines
            .next_line()
            .await?
            .context("client closed before logging in")?;
        if login != "1:password=secret;username=alice" {
            return Err(anyhow!("unexpected login frame '{login}'"));
        }
        writer
            .write_all(b"2:status=0;userId=7;username=alice\n")
            .await?;

        // Drain anything else (heartbeats) until the client hangs up.
        while lines.next_line().await?.is_some() {}
        Ok::<_, anyhow::Error>(())
    });

    let mut client = spawn_client(&binary, &addr).await?;

    client.send_line("/login alice secret").await?;
    let logged_in = read_line_expect(&mut client.stdout, "waiting for login").await?;
    assert_eq!(logged_in, "*** logged in as alice (7)");

    client.send_line("/quit").await?;
    let quit = read_line_expect(&mut client.stdout, "waiting for quit confirmation").await?;
    assert_eq!(quit, "*** leaving chat");

    ensure_success(&mut client.child, "chat client").await?;
    timeout(READ_TIMEOUT, server)
        .await
        .context("server did not see the client hang up")???;

    Ok(())
}

#[tokio::test]
async fn cli_reports_unreachable_server() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("line_chat_client");

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?.to_string();
    drop(listener);

    let mut child = Command::new(&binary)
        .arg("--server")
        .arg(&addr)
        .env("RUST_LOG", "off")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("failed to spawn chat client")?;

    let status = timeout(READ_TIMEOUT, child.wait())
        .await
        .context("client did not exit")??;
    assert!(!status.success());

    Ok(())
}

struct ClientProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ClientProcess {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.stdin
            .write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed to send line '{line}'"))?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }
}

async fn spawn_client(binary: &Path, addr: &str) -> Result<ClientProcess> {
    let mut cmd = Command::new(binary);
    cmd.arg("--server")
        .arg(addr)
        .env("RUST_LOG", "warn")
        .env("RUST_LOG_STYLE", "never")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let mut child = cmd.spawn().context("failed to spawn chat client")?;

    let stdin = child
        .stdin
        .take()
        .context("client stdin missing after spawn")?;
    let stdout = child
        .stdout
        .take()
        .context("client stdout missing after spawn")?;

    let mut process = ClientProcess {
        child,
        stdin,
        stdout: BufReader::new(stdout),
    };

    let banner = read_line_expect(&mut process.stdout, "waiting for connect banner").await?;
    if banner != format!("*** connected to {addr}") {
        return Err(anyhow!("expected connect banner for {addr}, got '{banner}'"));
    }

    Ok(process)
}

async fn read_line_expect(
    reader: &mut BufReader<ChildStdout>,
    description: &str,
) -> Result<String> {
    match read_line(reader).await {
        Ok(Some(line)) => Ok(line),
        Ok(None) => Err(anyhow!("{description}: stream closed")),
        Err(err) => Err(err.context(format!("{description}: failed to read line"))),
    }
}

async fn read_line(reader: &mut BufReader<ChildStdout>) -> Result<Option<String>> {
    let mut line = String::new();
    let bytes_io = match timeout(READ_TIMEOUT, reader.read_line(&mut line)).await {
        Ok(result) => result,
        Err(_) => return Err(anyhow!("timed out waiting for line")),
    };
    if bytes_io? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

async fn ensure_success(child: &mut Child, name: &str) -> Result<()> {
    let status = child
        .wait()
        .await
        .with_context(|| format!("failed to await {name} process"))?;
    if !status.success() {
        return Err(anyhow!("{name} exited with status {status}"));
    }
    Ok(())
}
